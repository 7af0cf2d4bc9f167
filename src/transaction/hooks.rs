// ============================================================================
// Commit Hook Pipeline
// ============================================================================
//
// Hooks are registered with the database and run synchronously inside the
// commit of every transaction, in two phases:
//
// - before_flush:  validation over the buffered writes, nothing staged yet
// - before_commit: extra rows staged into the same atomic apply
//
// ============================================================================

use super::change::{Change, ChangeSet, ObjectRef, PendingRow, WriteSet};
use super::state::TransactionId;
use crate::config::EngineConfig;
use crate::core::{DbError, Result, Row};
use crate::revision::{Revision, RevisionLedger, RevisionSlot};
use crate::storage::InMemoryStorage;
use crate::versioned::VersionedSchema;
use std::sync::Arc;

/// What a failing hook does to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFailurePolicy {
    /// The error propagates and the whole transaction rolls back.
    Abort,
    /// Rows the hook staged are discarded, a warning is logged, the commit goes on.
    LogAndContinue,
}

pub trait CommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn failure_policy(&self) -> HookFailurePolicy {
        HookFailurePolicy::Abort
    }

    fn before_flush(&self, _ctx: &CommitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn before_commit(&self, _ctx: &mut CommitContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Everything a hook may look at or stage during one commit.
pub struct CommitContext<'a> {
    transaction_id: TransactionId,
    storage: &'a InMemoryStorage,
    schema: &'a VersionedSchema,
    config: &'a EngineConfig,
    ledger: &'a RevisionLedger,
    revision: &'a mut RevisionSlot,
    writes: &'a WriteSet,
    change_set: &'a ChangeSet,
    staged: Vec<Change>,
    audit_skips: usize,
    hook_failures: Vec<String>,
}

/// Staged rows and diagnostics left once every hook has run.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    pub staged: Vec<Change>,
    pub audit_skips: usize,
    pub hook_failures: Vec<String>,
}

impl<'a> CommitContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transaction_id: TransactionId,
        storage: &'a InMemoryStorage,
        schema: &'a VersionedSchema,
        config: &'a EngineConfig,
        ledger: &'a RevisionLedger,
        revision: &'a mut RevisionSlot,
        writes: &'a WriteSet,
        change_set: &'a ChangeSet,
    ) -> Self {
        Self {
            transaction_id,
            storage,
            schema,
            config,
            ledger,
            revision,
            writes,
            change_set,
            staged: Vec::new(),
            audit_skips: 0,
            hook_failures: Vec::new(),
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Committed state, as of the start of this commit.
    pub fn storage(&self) -> &'a InMemoryStorage {
        self.storage
    }

    pub fn schema(&self) -> &'a VersionedSchema {
        self.schema
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub fn change_set(&self) -> &'a ChangeSet {
        self.change_set
    }

    pub fn writes(&self) -> &'a WriteSet {
        self.writes
    }

    pub fn pending_row(&self, object: &ObjectRef) -> Option<&'a PendingRow> {
        self.writes.get(object)
    }

    pub fn committed_row(&self, object: &ObjectRef) -> Result<Option<Row>> {
        self.storage.get_row(&object.table, &object.key())
    }

    /// The row as it will look after this commit.
    pub fn resolve_row(&self, object: &ObjectRef) -> Result<Option<Row>> {
        match self.pending_row(object) {
            Some(pending) => Ok(Some(pending.row.clone())),
            None => self.committed_row(object),
        }
    }

    /// The transaction's revision, created on first use.
    pub fn revision(&mut self) -> Revision {
        self.revision.current(self.ledger).clone()
    }

    pub fn existing_revision(&self) -> Option<&Revision> {
        self.revision.revision()
    }

    pub fn stage(&mut self, change: Change) {
        self.staged.push(change);
    }

    pub fn staged(&self) -> &[Change] {
        &self.staged
    }

    pub(crate) fn mark(&self) -> usize {
        self.staged.len()
    }

    pub(crate) fn rollback_to(&mut self, mark: usize) {
        self.staged.truncate(mark);
    }

    /// Counts objects the activity log had to leave out.
    pub fn note_audit_skips(&mut self, count: usize) {
        self.audit_skips += count;
    }

    pub(crate) fn finish(self) -> CommitOutcome {
        CommitOutcome {
            staged: self.staged,
            audit_skips: self.audit_skips,
            hook_failures: self.hook_failures,
        }
    }
}

/// Ordered set of commit hooks shared by every transaction of a database.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn CommitHook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn CommitHook>) {
        self.hooks.push(hook);
    }

    pub fn list_hooks(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every `before_flush`, then every `before_commit`.
    pub fn run(&self, ctx: &mut CommitContext<'_>) -> Result<()> {
        for hook in &self.hooks {
            if let Err(err) = hook.before_flush(ctx) {
                Self::handle_failure(hook.as_ref(), "before_flush", err, ctx)?;
            }
        }

        for hook in &self.hooks {
            let mark = ctx.mark();
            if let Err(err) = hook.before_commit(ctx) {
                ctx.rollback_to(mark);
                Self::handle_failure(hook.as_ref(), "before_commit", err, ctx)?;
            }
        }
        Ok(())
    }

    fn handle_failure(
        hook: &dyn CommitHook,
        phase: &str,
        err: DbError,
        ctx: &mut CommitContext<'_>,
    ) -> Result<()> {
        match hook.failure_policy() {
            HookFailurePolicy::Abort => Err(err),
            HookFailurePolicy::LogAndContinue => {
                log::warn!(
                    "commit hook '{}' failed in {} of {}: {}; continuing",
                    hook.name(),
                    phase,
                    ctx.transaction_id,
                    err
                );
                ctx.hook_failures.push(hook.name().to_string());
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list_hooks()).finish()
    }
}
