use super::State;
use crate::core::{DbError, Result};
use crate::transaction::{CommitContext, CommitHook, HookFailurePolicy};

/// Pre-flush validation of every buffered live row.
///
/// Checks the row against its table schema and, for versioned tables, that the
/// state text is one of the known states.
#[derive(Debug, Default)]
pub struct StateValidator;

impl CommitHook for StateValidator {
    fn name(&self) -> &'static str {
        "state_validator"
    }

    fn failure_policy(&self) -> HookFailurePolicy {
        HookFailurePolicy::Abort
    }

    fn before_flush(&self, ctx: &CommitContext<'_>) -> Result<()> {
        let catalog = ctx.storage().catalog();
        for (object, pending) in ctx.writes().iter() {
            let table = catalog.get_table(&object.table)?;
            table.schema().validate_row(&pending.row).map_err(|err| {
                DbError::ConstraintViolation(format!("{}: {}", object, err))
            })?;

            if let Some(versioned) = ctx.schema().versioned(&object.table) {
                State::from_value(&pending.row[versioned.state_index()])
                    .map_err(|err| DbError::ConstraintViolation(format!("{}: {}", object, err)))?;
            }
        }
        Ok(())
    }
}
