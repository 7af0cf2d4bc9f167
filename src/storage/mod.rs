pub mod catalog;
pub mod memory;
pub mod table;

pub use catalog::{Catalog, CatalogEntry};
pub use memory::InMemoryStorage;
pub use table::{Table, TableRole, TableSchema};
