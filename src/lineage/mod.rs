//! Commit-time lineage writer.

pub mod writer;

pub use writer::LineageWriter;
