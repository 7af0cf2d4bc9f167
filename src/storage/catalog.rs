use super::{TableRole, TableSchema};
use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub schema: TableSchema,
    pub role: TableRole,
}

/// Table metadata only; immutable once built, so clones are cheap and lock-free.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Arc<HashMap<String, CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new catalog containing the table; `self` is left untouched.
    pub fn with_table(self, schema: TableSchema, role: TableRole) -> Result<Self> {
        let name = schema.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.insert(name, CatalogEntry { schema, role });

        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    pub fn get_table(&self, name: &str) -> Result<&TableSchema> {
        self.entry(name).map(|entry| &entry.schema)
    }

    pub fn role(&self, name: &str) -> Result<TableRole> {
        self.entry(name).map(|entry| entry.role)
    }

    fn entry(&self, name: &str) -> Result<&CatalogEntry> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn tables_with_role(&self, role: TableRole) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tables
            .iter()
            .filter(|(_, entry)| entry.role == role)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
