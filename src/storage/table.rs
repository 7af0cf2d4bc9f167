use crate::core::{Column, DbError, Result, Row, RowKey, Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Who is allowed to write a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableRole {
    /// Current-truth rows written by application transactions.
    Live,
    /// Shadow rows written only by the lineage writer.
    History,
    /// Revision ledger and activity stream, written only by commit hooks.
    System,
}

impl TableRole {
    pub fn is_application_writable(&self) -> bool {
        matches!(self, TableRole::Live)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowKey, Row>,
    indexes: HashMap<String, BTreeMap<Value, BTreeSet<RowKey>>>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Result<Self> {
        if schema.schema().primary_key_indices().is_empty() {
            return Err(DbError::SchemaError(format!(
                "table '{}' has no primary key",
                schema.name()
            )));
        }
        let mut table = Self {
            schema,
            rows: BTreeMap::new(),
            indexes: HashMap::new(),
        };
        for column in table.schema.indexes.clone() {
            table.build_index(&column)?;
        }
        Ok(table)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn key_of(&self, row: &Row) -> RowKey {
        self.schema
            .schema()
            .primary_key_indices()
            .into_iter()
            .map(|idx| row[idx].clone())
            .collect()
    }

    pub fn insert(&mut self, row: Row) -> Result<RowKey> {
        self.schema.schema().validate_row(&row)?;
        let key = self.key_of(&row);
        if self.rows.contains_key(&key) {
            return Err(DbError::ConstraintViolation(format!(
                "Duplicate primary key {:?} in table '{}'",
                key,
                self.schema.name()
            )));
        }
        self.check_uniqueness(&row, None)?;

        self.update_indexes(&key, &row);
        self.rows.insert(key.clone(), row);
        Ok(key)
    }

    /// Replaces the row stored under `key`. The primary key itself may not change.
    pub fn replace(&mut self, key: &RowKey, new_row: Row) -> Result<Row> {
        self.schema.schema().validate_row(&new_row)?;
        if &self.key_of(&new_row) != key {
            return Err(DbError::ConstraintViolation(format!(
                "Primary key of a row in '{}' cannot change",
                self.schema.name()
            )));
        }
        self.check_uniqueness(&new_row, Some(key))?;

        let old_row = self.rows.get(key).cloned().ok_or_else(|| {
            DbError::RowNotFound(self.schema.name().to_string(), format!("{:?}", key))
        })?;
        self.remove_from_indexes(key, &old_row);
        self.update_indexes(key, &new_row);
        self.rows.insert(key.clone(), new_row);
        Ok(old_row)
    }

    pub fn remove(&mut self, key: &RowKey) -> Option<Row> {
        let row = self.rows.remove(key)?;
        self.remove_from_indexes(key, &row);
        Some(row)
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.rows.contains_key(key)
    }

    /// All rows in primary key order.
    pub fn scan(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows whose `column` equals `value`; `None` when the column is not indexed.
    pub fn scan_index(&self, column: &str, value: &Value) -> Option<Vec<(RowKey, Row)>> {
        let index = self.indexes.get(column)?;
        let Some(keys) = index.get(value) else {
            return Some(Vec::new());
        };
        Some(
            keys.iter()
                .filter_map(|key| self.rows.get(key).map(|row| (key.clone(), row.clone())))
                .collect(),
        )
    }

    /// Index lookup with a full-scan fallback for unindexed columns.
    pub fn find_by(&self, column: &str, value: &Value) -> Result<Vec<(RowKey, Row)>> {
        if let Some(found) = self.scan_index(column, value) {
            return Ok(found);
        }
        let col_idx = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .filter(|(_, row)| &row[col_idx] == value)
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect())
    }

    fn build_index(&mut self, column_name: &str) -> Result<()> {
        let col_idx = self.column_index(column_name)?;
        let mut index: BTreeMap<Value, BTreeSet<RowKey>> = BTreeMap::new();
        for (key, row) in &self.rows {
            index
                .entry(row[col_idx].clone())
                .or_default()
                .insert(key.clone());
        }
        self.indexes.insert(column_name.to_string(), index);
        Ok(())
    }

    fn column_index(&self, column_name: &str) -> Result<usize> {
        self.schema
            .schema()
            .find_column_index(column_name)
            .ok_or_else(|| {
                DbError::ColumnNotFound(column_name.to_string(), self.schema.name.clone())
            })
    }

    fn check_uniqueness(&self, row: &Row, ignore_key: Option<&RowKey>) -> Result<()> {
        for (col_idx, column) in self.schema.schema().columns().iter().enumerate() {
            if !column.unique {
                continue;
            }
            let value = &row[col_idx];
            if value.is_null() {
                continue;
            }
            let clash = self
                .rows
                .iter()
                .any(|(key, existing)| Some(key) != ignore_key && &existing[col_idx] == value);
            if clash {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique constraint violation: Column '{}' already contains value {}",
                    column.name, value
                )));
            }
        }
        Ok(())
    }

    fn update_indexes(&mut self, key: &RowKey, row: &Row) {
        for (col_name, index) in &mut self.indexes {
            if let Some(col_idx) = self.schema.schema.find_column_index(col_name) {
                index
                    .entry(row[col_idx].clone())
                    .or_default()
                    .insert(key.clone());
            }
        }
    }

    fn remove_from_indexes(&mut self, key: &RowKey, row: &Row) {
        for (col_name, index) in &mut self.indexes {
            if let Some(col_idx) = self.schema.schema.find_column_index(col_name) {
                if let Some(keys) = index.get_mut(&row[col_idx]) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(&row[col_idx]);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    schema: Schema,
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            schema: Schema::new(columns),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        self.indexes.push(column.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes.iter().any(|idx| idx == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn tags() -> Table {
        Table::new(
            TableSchema::new(
                "tag",
                vec![
                    Column::new("id", DataType::Text).primary_key(),
                    Column::new("name", DataType::Text).not_null().unique(),
                    Column::new("vocabulary", DataType::Text),
                ],
            )
            .with_index("vocabulary"),
        )
        .unwrap()
    }

    fn row(id: &str, name: &str, vocab: &str) -> Row {
        vec![id.into(), name.into(), vocab.into()]
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = tags();
        let key = table.insert(row("t1", "geo", "v1")).unwrap();
        assert_eq!(key, vec![Value::from("t1")]);
        assert_eq!(table.get(&key).unwrap()[1], Value::from("geo"));
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_duplicate_key_and_unique_column() {
        let mut table = tags();
        table.insert(row("t1", "geo", "v1")).unwrap();
        assert!(table.insert(row("t1", "other", "v1")).is_err());
        assert!(table.insert(row("t2", "geo", "v1")).is_err());
    }

    #[test]
    fn test_replace_maintains_index() {
        let mut table = tags();
        let key = table.insert(row("t1", "geo", "v1")).unwrap();
        let old = table.replace(&key, row("t1", "geo", "v2")).unwrap();
        assert_eq!(old[2], Value::from("v1"));
        assert!(table.scan_index("vocabulary", &"v1".into()).unwrap().is_empty());
        assert_eq!(table.scan_index("vocabulary", &"v2".into()).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_rejects_key_change() {
        let mut table = tags();
        let key = table.insert(row("t1", "geo", "v1")).unwrap();
        assert!(table.replace(&key, row("t9", "geo", "v1")).is_err());
    }

    #[test]
    fn test_find_by_falls_back_to_scan() {
        let mut table = tags();
        table.insert(row("t1", "geo", "v1")).unwrap();
        table.insert(row("t2", "eco", "v1")).unwrap();
        assert_eq!(table.find_by("name", &"eco".into()).unwrap().len(), 1);
        assert!(table.find_by("missing", &"eco".into()).is_err());
    }

    #[test]
    fn test_remove() {
        let mut table = tags();
        let key = table.insert(row("t1", "geo", "v1")).unwrap();
        assert!(table.remove(&key).is_some());
        assert!(table.remove(&key).is_none());
        assert!(table.scan_index("vocabulary", &"v1".into()).unwrap().is_empty());
    }
}
