// ============================================================================
// catalog-revisions Library
// ============================================================================
//
// Versioned domain objects over an in-memory transactional store: every
// committed change to a live row leaves an immutable history row stamped with
// the transaction's revision, and an aggregate-scoped activity log is derived
// from the same unit of work.
//
// ============================================================================

pub mod activity;
pub mod config;
pub mod core;
pub mod facade;
pub mod lifecycle;
pub mod lineage;
pub mod prelude;
pub mod query;
pub mod revision;
pub mod storage;
pub mod transaction;
pub mod versioned;

pub use activity::{Activity, ActivityDetail, ActivityType};
pub use config::EngineConfig;
pub use core::{DataType, DbError, Result, Row, Value};
pub use facade::{Database, Session};
pub use lifecycle::{Maintenance, PurgeReport, State, Stateful};
pub use query::{AttributeChange, HistoryRow};
pub use revision::{Revision, RevisionInfo};
pub use transaction::{
    ChangeCategory, CommitContext, CommitHook, CommitReceipt, HookFailurePolicy, ObjectRef,
    Transaction, TransactionId, TransactionState,
};
pub use versioned::{
    AggregateMember, AggregateRoot, LiveEntityDescriptor, Versioned, VersionedSchema,
};
