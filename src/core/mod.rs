pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, Row, RowKey, Schema};
pub use value::{DataType, Value};
