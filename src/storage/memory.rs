use super::{Catalog, Table, TableRole, TableSchema};
use crate::core::{DbError, Result, Row, RowKey, Value};
use crate::transaction::Change;
use std::collections::HashMap;

/// The committed state of every table.
///
/// Callers share it behind a `tokio::sync::RwLock`; a commit holds the write
/// lock for the whole apply so readers never see half of a transaction.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    catalog: Catalog,
    tables: HashMap<String, Table>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn create_table(&mut self, schema: TableSchema, role: TableRole) -> Result<()> {
        let name = schema.name().to_string();
        let table = Table::new(schema.clone())?;
        self.catalog = self.catalog.clone().with_table(schema, role)?;
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn get_row(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        Ok(self.get_table(table)?.get(key).cloned())
    }

    pub fn scan_table(&self, table: &str) -> Result<Vec<Row>> {
        Ok(self.get_table(table)?.scan())
    }

    pub fn find_by(&self, table: &str, column: &str, value: &Value) -> Result<Vec<(RowKey, Row)>> {
        self.get_table(table)?.find_by(column, value)
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.get_table(table)?.row_count())
    }

    /// Applies every change or none of them.
    ///
    /// On the first failure the already-applied prefix is reverted in reverse
    /// order and the error is returned.
    pub fn apply(&mut self, changes: &[Change]) -> Result<()> {
        for (applied, change) in changes.iter().enumerate() {
            if let Err(err) = self.apply_one(change) {
                for done in changes[..applied].iter().rev() {
                    if let Err(revert_err) = self.revert_one(done) {
                        log::error!(
                            "failed to revert change on '{}': {}",
                            done.table_name(),
                            revert_err
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_one(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::InsertRow { table, row } => {
                self.get_table_mut(table)?.insert(row.clone())?;
            }
            Change::UpdateRow {
                table,
                key,
                old_row,
                new_row,
            } => {
                let target = self.get_table_mut(table)?;
                match target.get(key) {
                    Some(current) if current == old_row => {}
                    Some(_) => {
                        return Err(DbError::ExecutionError(format!(
                            "Write-write conflict detected on '{}' row {:?}",
                            table, key
                        )));
                    }
                    None => {
                        return Err(DbError::RowNotFound(table.clone(), format!("{:?}", key)));
                    }
                }
                target.replace(key, new_row.clone())?;
            }
            Change::DeleteRow {
                table,
                key,
                old_row,
            } => {
                let target = self.get_table_mut(table)?;
                if target.get(key) != Some(old_row) {
                    return Err(DbError::ExecutionError(format!(
                        "Write-write conflict detected on '{}' row {:?}",
                        table, key
                    )));
                }
                target.remove(key);
            }
        }
        Ok(())
    }

    fn revert_one(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::InsertRow { table, row } => {
                let target = self.get_table_mut(table)?;
                let key = target.key_of(row);
                target.remove(&key);
            }
            Change::UpdateRow {
                table,
                key,
                old_row,
                ..
            } => {
                self.get_table_mut(table)?.replace(key, old_row.clone())?;
            }
            Change::DeleteRow { table, old_row, .. } => {
                self.get_table_mut(table)?.insert(old_row.clone())?;
            }
        }
        Ok(())
    }
}
