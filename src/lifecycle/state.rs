use crate::core::{DbError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Soft-delete marker carried by every live and history row.
///
/// Rows are never physically removed by application writes; `Deleted` is the
/// only sanctioned way to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Active,
    Deleted,
    /// Created but awaiting moderation.
    Pending,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Active => "active",
            State::Deleted => "deleted",
            State::Pending => "pending",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, State::Active)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, State::Deleted)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .ok_or_else(|| {
                DbError::TypeMismatch(format!(
                    "state must be TEXT, got {}",
                    value.type_name()
                ))
            })?
            .parse()
    }
}

impl FromStr for State {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(State::Active),
            "deleted" => Ok(State::Deleted),
            "pending" => Ok(State::Pending),
            other => Err(DbError::ConstraintViolation(format!(
                "unknown state '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<State> for Value {
    fn from(state: State) -> Self {
        Value::Text(state.as_str().to_string())
    }
}

/// Typed access to the `state` field of a versioned entity.
pub trait Stateful {
    fn state(&self) -> State;

    fn set_state(&mut self, state: State);

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Soft delete: flips the state, the row stays.
    fn delete(&mut self) {
        self.set_state(State::Deleted);
    }

    fn undelete(&mut self) {
        self.set_state(State::Active);
    }
}
