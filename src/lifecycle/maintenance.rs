use crate::core::{DbError, Result, Row, RowKey, Value};
use crate::facade::EngineShared;
use crate::storage::InMemoryStorage;
use crate::transaction::{Change, ObjectRef};
use crate::versioned::CONTINUITY_ID_COLUMN;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PurgeReport {
    pub live_row_removed: bool,
    pub history_rows_removed: usize,
}

/// Physical removal of rows, bypassing history.
///
/// For tests and compaction only; transactions cannot reach it. Activity rows
/// are never removed.
#[derive(Debug, Clone)]
pub struct Maintenance {
    shared: Arc<EngineShared>,
}

impl Maintenance {
    pub(crate) fn new(shared: Arc<EngineShared>) -> Self {
        Self { shared }
    }

    /// Removes a live row that has no history.
    ///
    /// An entity with history rows is rejected: removing its live row would
    /// orphan its lineage.
    pub async fn purge(&self, table: &str, id: &str) -> Result<()> {
        let mut storage = self.shared.storage.write().await;
        let object = ObjectRef::new(table, id);
        let live = self.live_row(&storage, &object)?.ok_or_else(|| {
            DbError::RowNotFound(table.to_string(), id.to_string())
        })?;

        let history = self.history_rows(&storage, &object)?;
        if !history.is_empty() {
            return Err(DbError::ContractViolation(format!(
                "{} has {} history rows; purge_with_history removes both",
                object,
                history.len()
            )));
        }

        storage.apply(&[Change::DeleteRow {
            table: table.to_string(),
            key: object.key(),
            old_row: live,
        }])?;
        log::info!("purged {}", object);
        Ok(())
    }

    /// Removes a live row together with all of its history rows.
    pub async fn purge_with_history(&self, table: &str, id: &str) -> Result<PurgeReport> {
        let mut storage = self.shared.storage.write().await;
        let object = ObjectRef::new(table, id);
        let live = self.live_row(&storage, &object)?;
        let history = self.history_rows(&storage, &object)?;
        if live.is_none() && history.is_empty() {
            return Err(DbError::RowNotFound(table.to_string(), id.to_string()));
        }

        let report = PurgeReport {
            live_row_removed: live.is_some(),
            history_rows_removed: history.len(),
        };

        let mut changes = Vec::with_capacity(history.len() + 1);
        if let Some(history_table) = self.shared.schema.versioned(table).map(|t| t.history_name()) {
            changes.extend(history.into_iter().map(|(key, old_row)| Change::DeleteRow {
                table: history_table.to_string(),
                key,
                old_row,
            }));
        }
        if let Some(old_row) = live {
            changes.push(Change::DeleteRow {
                table: table.to_string(),
                key: object.key(),
                old_row,
            });
        }
        storage.apply(&changes)?;

        log::info!(
            "purged {} with {} history rows",
            object,
            report.history_rows_removed
        );
        Ok(report)
    }

    fn live_row(&self, storage: &InMemoryStorage, object: &ObjectRef) -> Result<Option<Row>> {
        let role = storage.catalog().role(&object.table)?;
        if !role.is_application_writable() {
            return Err(DbError::ContractViolation(format!(
                "only live rows can be purged, '{}' is {:?}",
                object.table, role
            )));
        }
        storage.get_row(&object.table, &object.key())
    }

    fn history_rows(
        &self,
        storage: &InMemoryStorage,
        object: &ObjectRef,
    ) -> Result<Vec<(RowKey, Row)>> {
        match self.shared.schema.versioned(&object.table) {
            Some(table) => storage.find_by(
                table.history_name(),
                CONTINUITY_ID_COLUMN,
                &Value::from(object.id.as_str()),
            ),
            None => Ok(Vec::new()),
        }
    }
}
