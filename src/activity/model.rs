use crate::core::{Column, DataType, DbError, Result, Row, Value};
use crate::storage::TableSchema;
use crate::transaction::ChangeCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const ACTIVITY_TABLE: &str = "activity";
pub const ACTIVITY_DETAIL_TABLE: &str = "activity_detail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    New,
    Changed,
    Deleted,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::New => "new",
            ActivityType::Changed => "changed",
            ActivityType::Deleted => "deleted",
        }
    }
}

impl From<ChangeCategory> for ActivityType {
    fn from(category: ChangeCategory) -> Self {
        match category {
            ChangeCategory::New => ActivityType::New,
            ChangeCategory::Changed => ActivityType::Changed,
            ChangeCategory::Deleted => ActivityType::Deleted,
        }
    }
}

impl FromStr for ActivityType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(ActivityType::New),
            "changed" => Ok(ActivityType::Changed),
            "deleted" => Ok(ActivityType::Deleted),
            other => Err(DbError::Serialization(format!(
                "unknown activity type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry per aggregate root per transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Author of the revision that produced the activity.
    pub user_id: String,
    /// Identity of the aggregate root.
    pub object_id: String,
    pub revision_id: Uuid,
    pub activity_type: ActivityType,
    /// Snapshot of the root row after the transaction.
    pub data: serde_json::Value,
}

impl Activity {
    pub fn table_schema() -> TableSchema {
        TableSchema::new(
            ACTIVITY_TABLE,
            vec![
                Column::new("id", DataType::Uuid).primary_key(),
                Column::new("timestamp", DataType::Timestamp).not_null(),
                Column::new("user_id", DataType::Text).not_null(),
                Column::new("object_id", DataType::Text).not_null(),
                Column::new("revision_id", DataType::Uuid).not_null(),
                Column::new("activity_type", DataType::Text).not_null(),
                Column::new("data", DataType::Json).not_null(),
            ],
        )
        .with_index("object_id")
        .with_index("revision_id")
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.timestamp.into(),
            self.user_id.clone().into(),
            self.object_id.clone().into(),
            self.revision_id.into(),
            self.activity_type.as_str().into(),
            Value::Json(self.data.clone()),
        ]
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let malformed = || DbError::Serialization("malformed activity row".to_string());
        if row.len() != 7 {
            return Err(malformed());
        }
        Ok(Self {
            id: row[0].as_uuid().ok_or_else(malformed)?,
            timestamp: row[1].as_timestamp().ok_or_else(malformed)?,
            user_id: row[2].as_str().ok_or_else(malformed)?.to_string(),
            object_id: row[3].as_str().ok_or_else(malformed)?.to_string(),
            revision_id: row[4].as_uuid().ok_or_else(malformed)?,
            activity_type: row[5].as_str().ok_or_else(malformed)?.parse()?,
            data: match &row[6] {
                Value::Json(data) => data.clone(),
                _ => return Err(malformed()),
            },
        })
    }
}

/// Per-object breakdown of an [`Activity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetail {
    pub id: Uuid,
    pub activity_id: Uuid,
    /// Identity of the object that actually changed.
    pub object_id: String,
    pub object_type: String,
    pub activity_type: ActivityType,
    pub data: serde_json::Value,
}

impl ActivityDetail {
    pub fn table_schema() -> TableSchema {
        TableSchema::new(
            ACTIVITY_DETAIL_TABLE,
            vec![
                Column::new("id", DataType::Uuid).primary_key(),
                Column::new("activity_id", DataType::Uuid).not_null(),
                Column::new("object_id", DataType::Text).not_null(),
                Column::new("object_type", DataType::Text).not_null(),
                Column::new("activity_type", DataType::Text).not_null(),
                Column::new("data", DataType::Json).not_null(),
            ],
        )
        .with_index("activity_id")
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.activity_id.into(),
            self.object_id.clone().into(),
            self.object_type.clone().into(),
            self.activity_type.as_str().into(),
            Value::Json(self.data.clone()),
        ]
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let malformed = || DbError::Serialization("malformed activity detail row".to_string());
        if row.len() != 6 {
            return Err(malformed());
        }
        Ok(Self {
            id: row[0].as_uuid().ok_or_else(malformed)?,
            activity_id: row[1].as_uuid().ok_or_else(malformed)?,
            object_id: row[2].as_str().ok_or_else(malformed)?.to_string(),
            object_type: row[3].as_str().ok_or_else(malformed)?.to_string(),
            activity_type: row[4].as_str().ok_or_else(malformed)?.parse()?,
            data: match &row[5] {
                Value::Json(data) => data.clone(),
                _ => return Err(malformed()),
            },
        })
    }
}
