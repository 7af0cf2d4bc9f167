// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Write-set buffering with commit-time application:
//
// - State Pattern: Active -> Committed/Aborted
// - Command Pattern: reversible row changes, applied all-or-nothing
// - Hook pipeline: validation, lineage and activity rows join the same apply
//
// ============================================================================

pub mod change;
pub mod commit;
pub mod hooks;
pub mod state;

pub use change::{Change, ChangeCategory, ChangeSet, ObjectRef, PendingRow, WriteSet};
pub use commit::CommitReceipt;
pub use hooks::{CommitContext, CommitHook, CommitOutcome, HookFailurePolicy, HookPipeline};
pub use state::{Transaction, TransactionId, TransactionState};
