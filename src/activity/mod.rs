//! Aggregate activity deriver and the activity/activity_detail records.

pub mod deriver;
pub mod model;

pub use deriver::{ActivityDeriver, ActivityPlan, DerivationPhase};
pub use model::{ACTIVITY_DETAIL_TABLE, ACTIVITY_TABLE, Activity, ActivityDetail, ActivityType};
