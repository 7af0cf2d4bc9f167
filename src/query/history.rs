use crate::core::{DbError, Result, Row, Value};
use crate::versioned::{VersionedTable, expiry_sentinel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A history row split into the live snapshot and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub table: String,
    /// Live attribute values at `revision_id`, in live column order.
    pub live: Row,
    pub revision_id: Uuid,
    pub continuity_id: String,
    pub expired_id: Option<Uuid>,
    pub expired_timestamp: DateTime<Utc>,
    pub revision_timestamp: DateTime<Utc>,
    pub current: bool,
}

impl HistoryRow {
    pub fn from_row(table: &VersionedTable, row: &Row) -> Result<Self> {
        let base = table.live_column_count();
        let malformed = || {
            DbError::Serialization(format!(
                "malformed history row in '{}'",
                table.history_name()
            ))
        };
        if row.len() != base + 6 {
            return Err(malformed());
        }
        Ok(Self {
            table: table.name().to_string(),
            live: row[..base].to_vec(),
            revision_id: row[base].as_uuid().ok_or_else(malformed)?,
            continuity_id: row[base + 1].as_str().ok_or_else(malformed)?.to_string(),
            expired_id: match &row[base + 2] {
                Value::Null => None,
                other => Some(other.as_uuid().ok_or_else(malformed)?),
            },
            expired_timestamp: row[base + 3].as_timestamp().ok_or_else(malformed)?,
            revision_timestamp: row[base + 4].as_timestamp().ok_or_else(malformed)?,
            current: row[base + 5].as_bool().ok_or_else(malformed)?,
        })
    }

    /// Nothing has superseded this snapshot yet.
    pub fn is_unexpired(&self) -> bool {
        self.expired_timestamp == expiry_sentinel()
    }

    /// Whether this snapshot was the live state at `at`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.revision_timestamp <= at && at < self.expired_timestamp
    }
}

/// One attribute that differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub column: String,
    pub before: Value,
    pub after: Value,
}
