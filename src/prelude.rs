//! Everything an application needs to declare versioned entities and write them.

pub use crate::core::{Column, DataType, DbError, Result, Row, Value};
pub use crate::lifecycle::{State, Stateful};
pub use crate::revision::RevisionInfo;
pub use crate::versioned::{
    AggregateMember, AggregateRoot, RowReader, Versioned, VersionedSchema, id_column,
    state_column,
};
pub use crate::{Database, EngineConfig, Session, Transaction};
