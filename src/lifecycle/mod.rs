//! Active/deleted lifecycle shared by live and history rows.

pub mod maintenance;
pub mod state;
pub mod validator;

pub use maintenance::{Maintenance, PurgeReport};
pub use state::{State, Stateful};
pub use validator::StateValidator;
