//! As-of, lineage and activity queries.

pub mod history;
pub mod reader;

pub use history::{AttributeChange, HistoryRow};
pub use reader::HistoryReader;
