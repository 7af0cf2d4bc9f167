use crate::core::{DbError, Result, Row, RowKey, Value};
use crate::revision::Revision;
use crate::transaction::{Change, CommitContext, CommitHook, HookFailurePolicy, ObjectRef};
use crate::versioned::{CONTINUITY_ID_COLUMN, VersionedTable};

/// Writes one history row per changed versioned object, stamped with the
/// transaction's revision, and expires the row it supersedes.
///
/// Failures abort the commit: business rows never land without their history.
#[derive(Debug, Default)]
pub struct LineageWriter;

impl LineageWriter {
    fn snapshot(
        &self,
        ctx: &CommitContext<'_>,
        table: &VersionedTable,
        object: &ObjectRef,
        revision: &Revision,
    ) -> Result<Vec<Change>> {
        let pending = ctx.pending_row(object).ok_or_else(|| {
            DbError::ExecutionError(format!("{} is in the change set but was never written", object))
        })?;
        let history_row = table.history_row(&pending.row, revision)?;

        let mut changes = Vec::new();
        for (key, previous) in self.unexpired(ctx, table, &object.id)? {
            changes.push(Change::UpdateRow {
                table: table.history_name().to_string(),
                new_row: table.expire_history_row(&previous, revision.id(), revision.timestamp()),
                key,
                old_row: previous,
            });
        }
        changes.push(Change::InsertRow {
            table: table.history_name().to_string(),
            row: history_row,
        });
        Ok(changes)
    }

    fn unexpired(
        &self,
        ctx: &CommitContext<'_>,
        table: &VersionedTable,
        continuity_id: &str,
    ) -> Result<Vec<(RowKey, Row)>> {
        let rows = ctx.storage().find_by(
            table.history_name(),
            CONTINUITY_ID_COLUMN,
            &Value::from(continuity_id),
        )?;
        Ok(rows
            .into_iter()
            .filter(|(_, row)| table.is_unexpired(row))
            .collect())
    }
}

impl CommitHook for LineageWriter {
    fn name(&self) -> &'static str {
        "lineage_writer"
    }

    fn failure_policy(&self) -> HookFailurePolicy {
        HookFailurePolicy::Abort
    }

    fn before_commit(&self, ctx: &mut CommitContext<'_>) -> Result<()> {
        let schema = ctx.schema();
        let targets: Vec<(&VersionedTable, &ObjectRef)> = ctx
            .change_set()
            .iter()
            .filter_map(|(_, object)| schema.versioned(&object.table).map(|table| (table, object)))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let revision = ctx.revision();
        let count = targets.len();
        for (table, object) in targets {
            let changes = self
                .snapshot(ctx, table, object, &revision)
                .map_err(|err| DbError::HistoryWrite(format!("{}: {}", object, err)))?;
            for change in changes {
                ctx.stage(change);
            }
        }
        log::debug!(
            "revision {} stamps {} history rows in {}",
            revision.id(),
            count,
            ctx.transaction_id()
        );
        Ok(())
    }
}
