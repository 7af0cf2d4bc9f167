use crate::core::{Column, DataType, DbError, Result, Row, Value};
use crate::lifecycle::Stateful;

use super::descriptor::LiveEntityDescriptor;
use super::{ID_COLUMN, STATE_COLUMN};

/// A typed live entity stored in a versioned table.
pub trait Versioned: Stateful + Sized {
    const TABLE: &'static str;

    /// Live columns, including `id` and `state`.
    fn columns() -> Vec<Column>;

    fn id(&self) -> &str;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;

    fn descriptor() -> LiveEntityDescriptor {
        LiveEntityDescriptor::new(Self::TABLE, Self::columns())
    }
}

/// Capability of owning an activity stream.
pub trait AggregateRoot: Versioned {
    fn object_type() -> &'static str {
        Self::TABLE
    }
}

/// Capability of belonging to an aggregate root for audit grouping.
pub trait AggregateMember: Versioned {
    type Root: AggregateRoot;

    /// Identity of the owning root, if the member currently has one.
    fn root_id(&self) -> Option<String>;

    fn object_type() -> &'static str {
        Self::TABLE
    }
}

pub(crate) fn resolve_member_root<T: AggregateMember>(row: &Row) -> Result<Option<String>> {
    Ok(T::from_row(row)?.root_id())
}

/// The standard `id` column of a live table.
pub fn id_column() -> Column {
    Column::new(ID_COLUMN, DataType::Text).primary_key()
}

/// The standard `state` column of a live table.
pub fn state_column() -> Column {
    Column::new(STATE_COLUMN, DataType::Text).not_null()
}

/// Positional reader used by `Versioned::from_row` implementations.
pub struct RowReader<'a> {
    table: &'static str,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(table: &'static str, row: &'a Row, expected_len: usize) -> Result<Self> {
        if row.len() != expected_len {
            return Err(DbError::Serialization(format!(
                "'{}' row has {} values, expected {}",
                table,
                row.len(),
                expected_len
            )));
        }
        Ok(Self { table, row })
    }

    pub fn value(&self, idx: usize) -> Result<&'a Value> {
        self.row.get(idx).ok_or_else(|| {
            DbError::Serialization(format!(
                "'{}' row has no column {} (width {})",
                self.table,
                idx,
                self.row.len()
            ))
        })
    }

    pub fn text(&self, idx: usize) -> Result<String> {
        let value = self.value(idx)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(idx, "TEXT", value))
    }

    pub fn opt_text(&self, idx: usize) -> Result<Option<String>> {
        match self.value(idx)? {
            Value::Null => Ok(None),
            _ => self.text(idx).map(Some),
        }
    }

    pub fn integer(&self, idx: usize) -> Result<i64> {
        let value = self.value(idx)?;
        value
            .as_i64()
            .ok_or_else(|| self.mismatch(idx, "INTEGER", value))
    }

    pub fn boolean(&self, idx: usize) -> Result<bool> {
        let value = self.value(idx)?;
        value
            .as_bool()
            .ok_or_else(|| self.mismatch(idx, "BOOLEAN", value))
    }

    pub fn state(&self, idx: usize) -> Result<crate::lifecycle::State> {
        crate::lifecycle::State::from_value(self.value(idx)?)
    }

    fn mismatch(&self, idx: usize, expected: &str, found: &Value) -> DbError {
        DbError::TypeMismatch(format!(
            "'{}' column {} expects {}, got {}",
            self.table,
            idx,
            expected,
            found.type_name()
        ))
    }
}
