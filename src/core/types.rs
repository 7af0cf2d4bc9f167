use serde::{Deserialize, Serialize};

use super::{DataType, DbError, Result, Value};

pub type Row = Vec<Value>;

/// Primary key of a stored row, one value per key column.
pub type RowKey = Vec<Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key_indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, col)| col.primary_key)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} columns, got {}",
                self.columns.len(),
                row.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(row.iter()) {
            column.validate(value)?;
        }
        Ok(())
    }

    /// Builds a `column -> value` JSON object for the row.
    pub fn row_to_json(&self, row: &Row) -> Result<serde_json::Value> {
        if row.len() != self.columns.len() {
            return Err(DbError::Serialization(format!(
                "row has {} values but schema has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        let mut object = serde_json::Map::with_capacity(row.len());
        for (column, value) in self.columns.iter().zip(row.iter()) {
            object.insert(column.name.clone(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(object))
    }
}
