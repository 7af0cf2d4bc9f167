// ============================================================================
// Transaction State Management
// ============================================================================
//
// Active -> Committed/Aborted. Reads see committed storage overlaid with the
// transaction's own buffered writes; nothing reaches storage before commit.
//
// ============================================================================

use super::change::{ObjectRef, WriteSet};
use super::hooks::HookPipeline;
use crate::core::{DbError, Result, Row, Value};
use crate::facade::EngineShared;
use crate::lifecycle::State;
use crate::revision::{Revision, RevisionInfo, RevisionSlot};
use crate::storage::{InMemoryStorage, TableSchema};
use crate::versioned::{STATE_COLUMN, Versioned};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback / failed commit──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// One unit of work against a [`Database`](crate::Database).
///
/// Application code writes live tables only. History, revision and activity
/// rows are produced by the commit hooks.
#[derive(Debug)]
pub struct Transaction {
    pub(super) id: TransactionId,
    pub(super) state: TransactionState,
    pub(super) shared: Arc<EngineShared>,
    pub(super) hooks: Arc<HookPipeline>,
    pub(super) writes: WriteSet,
    pub(super) revision: RevisionSlot,
    start_time: std::time::Instant,
}

impl Transaction {
    pub(crate) fn new(shared: Arc<EngineShared>, hooks: Arc<HookPipeline>) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            shared,
            hooks,
            writes: WriteSet::new(),
            revision: RevisionSlot::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Number of distinct objects written so far.
    pub fn change_count(&self) -> usize {
        self.writes.len()
    }

    pub(super) fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::NoActiveTransaction);
        }
        Ok(())
    }

    /// Row as this transaction sees it.
    pub async fn get(&self, table: &str, id: &str) -> Result<Option<Row>> {
        self.ensure_active()?;
        let object = ObjectRef::new(table, id);
        if let Some(pending) = self.writes.get(&object) {
            return Ok(Some(pending.row.clone()));
        }
        let storage = self.shared.storage.read().await;
        storage.get_row(table, &object.key())
    }

    pub async fn insert(&mut self, table: &str, row: Row) -> Result<()> {
        self.ensure_active()?;
        let shared = Arc::clone(&self.shared);
        let storage = shared.storage.read().await;
        let schema = writable_table(&storage, table)?;
        let object = ObjectRef::new(table, object_id(schema, &row)?);

        let exists = match self.writes.get(&object) {
            Some(_) => true,
            None => storage.get_row(table, &object.key())?.is_some(),
        };
        if exists {
            return Err(DbError::ConstraintViolation(format!(
                "Duplicate primary key '{}' in table '{}'",
                object.id, table
            )));
        }

        self.writes.stage(object, row, None);
        Ok(())
    }

    /// Replaces an existing row. The primary key selects the row.
    pub async fn update(&mut self, table: &str, row: Row) -> Result<()> {
        self.ensure_active()?;
        let shared = Arc::clone(&self.shared);
        let storage = shared.storage.read().await;
        let schema = writable_table(&storage, table)?;
        let object = ObjectRef::new(table, object_id(schema, &row)?);

        if self.writes.get(&object).is_some() {
            self.writes.stage(object, row, None);
            return Ok(());
        }

        let original = storage
            .get_row(table, &object.key())?
            .ok_or_else(|| DbError::RowNotFound(table.to_string(), object.id.clone()))?;
        self.writes.stage(object, row, Some(original));
        Ok(())
    }

    pub async fn set_column(
        &mut self,
        table: &str,
        id: &str,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.ensure_active()?;
        let col_idx = {
            let storage = self.shared.storage.read().await;
            writable_table(&storage, table)?
                .schema()
                .find_column_index(column)
                .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), table.to_string()))?
        };

        let mut row = self
            .get(table, id)
            .await?
            .ok_or_else(|| DbError::RowNotFound(table.to_string(), id.to_string()))?;
        row[col_idx] = value.into();
        self.update(table, row).await
    }

    pub async fn set_state(&mut self, table: &str, id: &str, state: State) -> Result<()> {
        self.set_column(table, id, STATE_COLUMN, state).await
    }

    /// The only sanctioned delete: the row stays and gains one more history row.
    pub async fn soft_delete(&mut self, table: &str, id: &str) -> Result<()> {
        self.set_state(table, id, State::Deleted).await
    }

    pub async fn insert_entity<T: Versioned>(&mut self, entity: &T) -> Result<()> {
        self.insert(T::TABLE, entity.to_row()).await
    }

    /// Inserts or updates, whichever applies.
    pub async fn save_entity<T: Versioned>(&mut self, entity: &T) -> Result<()> {
        if self.get(T::TABLE, entity.id()).await?.is_some() {
            self.update(T::TABLE, entity.to_row()).await
        } else {
            self.insert(T::TABLE, entity.to_row()).await
        }
    }

    pub async fn load_entity<T: Versioned>(&self, id: &str) -> Result<Option<T>> {
        self.get(T::TABLE, id)
            .await?
            .map(|row| T::from_row(&row))
            .transpose()
    }

    /// Author and message for this transaction's revision. Must come before the
    /// revision is first used.
    pub fn set_revision_info(&mut self, info: RevisionInfo) -> Result<()> {
        self.ensure_active()?;
        self.revision.set_info(info)
    }

    /// The revision every history row of this transaction will point at.
    ///
    /// Created on first call; later calls return the same revision. Its
    /// timestamp is sealed at commit.
    pub fn current_revision(&mut self) -> Result<&Revision> {
        self.ensure_active()?;
        Ok(self.revision.current(&self.shared.ledger))
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.writes.clear();
        self.state = TransactionState::Aborted;
        log::debug!("{} rolled back", self.id);
        Ok(())
    }
}

/// Application code may write live tables only.
fn writable_table<'s>(storage: &'s InMemoryStorage, table: &str) -> Result<&'s TableSchema> {
    let catalog = storage.catalog();
    let role = catalog.role(table)?;
    if !role.is_application_writable() {
        return Err(DbError::ContractViolation(format!(
            "table '{}' is written by the commit hooks only ({:?})",
            table, role
        )));
    }
    catalog.get_table(table)
}

fn object_id(schema: &TableSchema, row: &Row) -> Result<String> {
    let columns = schema.schema();
    if row.len() != columns.column_count() {
        return Err(DbError::ExecutionError(format!(
            "Expected {} columns, got {}",
            columns.column_count(),
            row.len()
        )));
    }
    let key = columns.primary_key_indices();
    match key.as_slice() {
        [idx] => row[*idx].as_str().map(str::to_string).ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "primary key of '{}' must be TEXT, got {}",
                schema.name(),
                row[*idx].type_name()
            ))
        }),
        _ => Err(DbError::SchemaError(format!(
            "table '{}' needs a single primary key column",
            schema.name()
        ))),
    }
}
