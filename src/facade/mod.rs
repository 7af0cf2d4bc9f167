pub mod database;
pub mod session;

pub(crate) use database::EngineShared;
pub use database::Database;
pub use session::Session;
