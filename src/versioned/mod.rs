//! Versioned entity shaper.
//!
//! Given the live shape of an entity type, derives its history table (all live
//! columns plus revision bookkeeping) and the continuity relation between the
//! two. Runs once when the schema is composed, never per transaction.

use chrono::{DateTime, Utc};

pub mod descriptor;
pub mod entity;
pub mod shaper;

pub use descriptor::{AggregateBinding, LiveEntityDescriptor, RootResolver, RootResolverFn};
pub use entity::{AggregateMember, AggregateRoot, RowReader, Versioned, id_column, state_column};
pub use shaper::{ContinuityRelation, VersionedSchema, VersionedSchemaBuilder, VersionedTable};

pub const ID_COLUMN: &str = "id";
pub const STATE_COLUMN: &str = "state";

pub const REVISION_ID_COLUMN: &str = "revision_id";
pub const CONTINUITY_ID_COLUMN: &str = "continuity_id";
pub const EXPIRED_ID_COLUMN: &str = "expired_id";
pub const EXPIRED_TIMESTAMP_COLUMN: &str = "expired_timestamp";
pub const REVISION_TIMESTAMP_COLUMN: &str = "revision_timestamp";
pub const CURRENT_COLUMN: &str = "current";

/// Bookkeeping columns appended to every history row, in storage order.
pub const HISTORY_COLUMNS: [&str; 6] = [
    REVISION_ID_COLUMN,
    CONTINUITY_ID_COLUMN,
    EXPIRED_ID_COLUMN,
    EXPIRED_TIMESTAMP_COLUMN,
    REVISION_TIMESTAMP_COLUMN,
    CURRENT_COLUMN,
];

pub const DEFAULT_HISTORY_SUFFIX: &str = "_revision";

/// 9999-12-31T00:00:00Z
const EXPIRY_SENTINEL_SECS: i64 = 253_402_214_400;

/// `expired_timestamp` of a history row nothing has superseded yet.
pub fn expiry_sentinel() -> DateTime<Utc> {
    DateTime::from_timestamp(EXPIRY_SENTINEL_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
