//! Revision ledger: the append-only log of transactions (who, when, why).

pub mod ledger;

pub use ledger::{REVISION_TABLE, Revision, RevisionInfo, RevisionLedger, RevisionSlot};
