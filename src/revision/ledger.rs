use crate::config::EngineConfig;
use crate::core::{Column, DataType, DbError, Result, Row, Value};
use crate::storage::TableSchema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

pub const REVISION_TABLE: &str = "revision";

/// Metadata of one logical transaction, shared by every history row it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    id: Uuid,
    timestamp: DateTime<Utc>,
    author: String,
    message: String,
    approved_timestamp: Option<DateTime<Utc>>,
}

impl Revision {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Provisional until the owning transaction commits, then sealed.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn approved_timestamp(&self) -> Option<DateTime<Utc>> {
        self.approved_timestamp
    }

    pub fn table_schema() -> TableSchema {
        TableSchema::new(
            REVISION_TABLE,
            vec![
                Column::new("id", DataType::Uuid).primary_key(),
                Column::new("timestamp", DataType::Timestamp).not_null(),
                Column::new("author", DataType::Text).not_null(),
                Column::new("message", DataType::Text).not_null(),
                Column::new("approved_timestamp", DataType::Timestamp),
            ],
        )
        .with_index("timestamp")
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.timestamp.into(),
            self.author.clone().into(),
            self.message.clone().into(),
            self.approved_timestamp.into(),
        ]
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let malformed = || DbError::Serialization("malformed revision row".to_string());
        if row.len() != 5 {
            return Err(malformed());
        }
        Ok(Self {
            id: row[0].as_uuid().ok_or_else(malformed)?,
            timestamp: row[1].as_timestamp().ok_or_else(malformed)?,
            author: row[2].as_str().ok_or_else(malformed)?.to_string(),
            message: row[3].as_str().ok_or_else(malformed)?.to_string(),
            approved_timestamp: match &row[4] {
                Value::Null => None,
                other => Some(other.as_timestamp().ok_or_else(malformed)?),
            },
        })
    }
}

/// Author and message a transaction wants on its revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionInfo {
    author: Option<String>,
    message: Option<String>,
    approved: bool,
}

impl RevisionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Stamps `approved_timestamp` together with the revision timestamp.
    pub fn approved(mut self) -> Self {
        self.approved = true;
        self
    }
}

/// Issues revisions and their timestamps for one database.
///
/// Timestamps are strictly increasing, so sealing at commit time orders
/// revisions by commit.
#[derive(Debug)]
pub struct RevisionLedger {
    last_micros: AtomicI64,
    default_author: String,
    default_message: String,
}

impl RevisionLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            last_micros: AtomicI64::new(i64::MIN),
            default_author: config.default_author.clone(),
            default_message: config.default_message.clone(),
        }
    }

    pub fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        let issued = now.max(previous.saturating_add(1));
        DateTime::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
    }

    fn open(&self, info: &RevisionInfo) -> Revision {
        let timestamp = self.next_timestamp();
        Revision {
            id: Uuid::new_v4(),
            timestamp,
            author: info
                .author
                .clone()
                .unwrap_or_else(|| self.default_author.clone()),
            message: info
                .message
                .clone()
                .unwrap_or_else(|| self.default_message.clone()),
            approved_timestamp: info.approved.then_some(timestamp),
        }
    }
}

/// The transaction-local "current revision" value.
#[derive(Debug, Clone, Default)]
pub struct RevisionSlot {
    info: RevisionInfo,
    revision: Option<Revision>,
}

impl RevisionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_info(&mut self, info: RevisionInfo) -> Result<()> {
        if let Some(existing) = &self.revision {
            return Err(DbError::ContractViolation(format!(
                "revision {} already exists in this transaction; set author and message before first use",
                existing.id
            )));
        }
        self.info = info;
        Ok(())
    }

    /// Returns the transaction's revision, creating it on first use.
    pub fn current(&mut self, ledger: &RevisionLedger) -> &Revision {
        let info = &self.info;
        self.revision.get_or_insert_with(|| ledger.open(info))
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    /// Final timestamp, taken while the commit holds the store's write lock.
    pub fn seal(&mut self, ledger: &RevisionLedger) {
        if let Some(revision) = self.revision.as_mut() {
            let sealed = ledger.next_timestamp();
            revision.timestamp = sealed;
            if revision.approved_timestamp.is_some() {
                revision.approved_timestamp = Some(sealed);
            }
        }
    }
}
