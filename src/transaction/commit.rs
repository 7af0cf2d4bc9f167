use super::change::{Change, ChangeSet};
use super::hooks::{CommitContext, HookPipeline};
use super::state::{Transaction, TransactionId, TransactionState};
use crate::activity::{ACTIVITY_DETAIL_TABLE, ACTIVITY_TABLE};
use crate::core::Result;
use crate::facade::EngineShared;
use crate::revision::REVISION_TABLE;
use crate::storage::{InMemoryStorage, TableRole};
use crate::versioned::STATE_COLUMN;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{Level, event, info_span};
use uuid::Uuid;

/// What one successful commit wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub transaction_id: TransactionId,
    pub revision_id: Option<Uuid>,
    pub revision_timestamp: Option<DateTime<Utc>>,
    pub live_rows_written: usize,
    pub history_rows_written: usize,
    pub activities: usize,
    pub activity_details: usize,
    /// Objects left out of the activity log.
    pub audit_skips: usize,
    /// Best-effort hooks that failed without aborting the commit.
    pub hook_failures: Vec<String>,
}

impl Transaction {
    /// Runs the hook pipeline and applies business rows, the revision, history
    /// and activity rows in one atomic step.
    ///
    /// Any failure leaves storage untouched and the transaction `Aborted`.
    pub async fn commit(&mut self) -> Result<CommitReceipt> {
        self.ensure_active()?;
        let shared = Arc::clone(&self.shared);
        let hooks = Arc::clone(&self.hooks);
        let mut storage = shared.storage.write().await;

        let span = info_span!("commit", txn = %self.id, writes = self.writes.len());
        let _enter = span.enter();

        let result = self.commit_locked(&mut storage, &shared, &hooks);
        self.writes.clear();
        match result {
            Ok(receipt) => {
                self.state = TransactionState::Committed;
                event!(
                    Level::INFO,
                    revision = ?receipt.revision_id,
                    live = receipt.live_rows_written,
                    history = receipt.history_rows_written,
                    activities = receipt.activities,
                    "transaction committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.state = TransactionState::Aborted;
                event!(Level::ERROR, error = %err, "transaction aborted during commit");
                Err(err)
            }
        }
    }

    fn commit_locked(
        &mut self,
        storage: &mut InMemoryStorage,
        shared: &EngineShared,
        hooks: &HookPipeline,
    ) -> Result<CommitReceipt> {
        let change_set = ChangeSet::classify(&self.writes, |table| {
            storage
                .catalog()
                .get_table(table)
                .ok()
                .and_then(|schema| schema.schema().find_column_index(STATE_COLUMN))
        });

        // Commit order decides revision order.
        self.revision.seal(&shared.ledger);

        let outcome = {
            let mut ctx = CommitContext::new(
                self.id,
                storage,
                &shared.schema,
                &shared.config,
                &shared.ledger,
                &mut self.revision,
                &self.writes,
                &change_set,
            );
            hooks.run(&mut ctx)?;
            ctx.finish()
        };

        let mut changes = Vec::with_capacity(1 + self.writes.len() + outcome.staged.len());
        let revision = self.revision.revision();
        if let Some(revision) = revision {
            changes.push(Change::InsertRow {
                table: REVISION_TABLE.to_string(),
                row: revision.to_row(),
            });
        }

        let business = self.writes.to_changes();
        let live_rows_written = business.len();
        changes.extend(business);

        let inserted_into = |predicate: &dyn Fn(&str) -> bool| {
            outcome
                .staged
                .iter()
                .filter(|change| change.is_insert() && predicate(change.table_name()))
                .count()
        };
        let history_rows_written = inserted_into(&|table| {
            storage.catalog().role(table).ok() == Some(TableRole::History)
        });
        let activities = inserted_into(&|table| table == ACTIVITY_TABLE);
        let activity_details = inserted_into(&|table| table == ACTIVITY_DETAIL_TABLE);

        let receipt = CommitReceipt {
            transaction_id: self.id,
            revision_id: revision.map(|r| r.id()),
            revision_timestamp: revision.map(|r| r.timestamp()),
            live_rows_written,
            history_rows_written,
            activities,
            activity_details,
            audit_skips: outcome.audit_skips,
            hook_failures: outcome.hook_failures,
        };

        changes.extend(outcome.staged);
        storage.apply(&changes)?;
        Ok(receipt)
    }
}
