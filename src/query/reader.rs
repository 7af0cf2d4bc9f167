use super::history::{AttributeChange, HistoryRow};
use crate::activity::{ACTIVITY_DETAIL_TABLE, ACTIVITY_TABLE, Activity, ActivityDetail};
use crate::core::{DbError, Result, Value};
use crate::revision::{REVISION_TABLE, Revision};
use crate::storage::InMemoryStorage;
use crate::transaction::ObjectRef;
use crate::versioned::{CONTINUITY_ID_COLUMN, REVISION_ID_COLUMN, Versioned, VersionedSchema, VersionedTable};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Read-only queries over history, revisions and activities.
///
/// Borrowed from a storage guard; see the async wrappers on `Database`.
pub struct HistoryReader<'a> {
    storage: &'a InMemoryStorage,
    schema: &'a VersionedSchema,
}

impl<'a> HistoryReader<'a> {
    pub fn new(storage: &'a InMemoryStorage, schema: &'a VersionedSchema) -> Self {
        Self { storage, schema }
    }

    fn versioned(&self, table: &str) -> Result<&'a VersionedTable> {
        self.schema.versioned(table).ok_or_else(|| {
            DbError::SchemaError(format!("table '{}' is not versioned", table))
        })
    }

    /// Every history row of one entity, oldest revision first.
    pub fn lineage(&self, table: &str, id: &str) -> Result<Vec<HistoryRow>> {
        let versioned = self.versioned(table)?;
        let mut rows = self
            .storage
            .find_by(versioned.history_name(), CONTINUITY_ID_COLUMN, &Value::from(id))?
            .iter()
            .map(|(_, row)| HistoryRow::from_row(versioned, row))
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by_key(|row| row.revision_timestamp);
        Ok(rows)
    }

    /// The snapshot with the latest revision timestamp not after `at`.
    pub fn as_of(&self, table: &str, id: &str, at: DateTime<Utc>) -> Result<Option<HistoryRow>> {
        Ok(self
            .lineage(table, id)?
            .into_iter()
            .rev()
            .find(|row| row.revision_timestamp <= at))
    }

    /// The one snapshot nothing has superseded yet.
    pub fn current_history(&self, table: &str, id: &str) -> Result<Option<HistoryRow>> {
        let mut unexpired: Vec<HistoryRow> = self
            .lineage(table, id)?
            .into_iter()
            .filter(HistoryRow::is_unexpired)
            .collect();
        if unexpired.len() > 1 {
            return Err(DbError::ExecutionError(format!(
                "{} unexpired history rows for '{}' in '{}'",
                unexpired.len(),
                id,
                table
            )));
        }
        Ok(unexpired.pop())
    }

    /// Typed as-of reconstruction.
    pub fn reconstruct<T: Versioned>(&self, id: &str, at: DateTime<Utc>) -> Result<Option<T>> {
        self.as_of(T::TABLE, id, at)?
            .map(|row| T::from_row(&row.live))
            .transpose()
    }

    /// Attribute changes of one entity between two of its revisions.
    pub fn diff(
        &self,
        table: &str,
        id: &str,
        from_revision: Uuid,
        to_revision: Uuid,
    ) -> Result<Vec<AttributeChange>> {
        let versioned = self.versioned(table)?;
        let lineage = self.lineage(table, id)?;
        let find = |revision: Uuid| {
            lineage
                .iter()
                .find(|row| row.revision_id == revision)
                .ok_or_else(|| {
                    DbError::RowNotFound(
                        versioned.history_name().to_string(),
                        format!("{}@{}", id, revision),
                    )
                })
        };
        let before = find(from_revision)?;
        let after = find(to_revision)?;

        Ok(versioned
            .live_schema()
            .schema()
            .columns()
            .iter()
            .zip(before.live.iter().zip(after.live.iter()))
            .filter(|(_, (old, new))| old != new)
            .map(|(column, (old, new))| AttributeChange {
                column: column.name.clone(),
                before: old.clone(),
                after: new.clone(),
            })
            .collect())
    }

    pub fn revision(&self, id: Uuid) -> Result<Option<Revision>> {
        self.storage
            .get_row(REVISION_TABLE, &vec![Value::Uuid(id)])?
            .map(|row| Revision::from_row(&row))
            .transpose()
    }

    /// The whole ledger, newest first.
    pub fn revisions(&self) -> Result<Vec<Revision>> {
        let mut revisions = self
            .storage
            .scan_table(REVISION_TABLE)?
            .iter()
            .map(Revision::from_row)
            .collect::<Result<Vec<_>>>()?;
        revisions.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(revisions)
    }

    /// Every entity a revision produced a history row for.
    pub fn revision_contents(&self, revision: Uuid) -> Result<Vec<ObjectRef>> {
        let mut objects = Vec::new();
        for table in self.schema.tables() {
            for (_, row) in self.storage.find_by(
                table.history_name(),
                REVISION_ID_COLUMN,
                &Value::Uuid(revision),
            )? {
                let history = HistoryRow::from_row(table, &row)?;
                objects.push(ObjectRef::new(table.name(), history.continuity_id));
            }
        }
        objects.sort();
        Ok(objects)
    }

    /// All activities, oldest first.
    pub fn activities(&self) -> Result<Vec<Activity>> {
        let mut activities = self
            .storage
            .scan_table(ACTIVITY_TABLE)?
            .iter()
            .map(Activity::from_row)
            .collect::<Result<Vec<_>>>()?;
        activities.sort_by_key(|activity| activity.timestamp);
        Ok(activities)
    }

    /// Activity stream of one aggregate root, oldest first.
    pub fn activities_for(&self, object_id: &str) -> Result<Vec<Activity>> {
        let mut activities = self
            .storage
            .find_by(ACTIVITY_TABLE, "object_id", &Value::from(object_id))?
            .iter()
            .map(|(_, row)| Activity::from_row(row))
            .collect::<Result<Vec<_>>>()?;
        activities.sort_by_key(|activity| activity.timestamp);
        Ok(activities)
    }

    /// Details of one activity, by object type then object id.
    pub fn activity_details(&self, activity_id: Uuid) -> Result<Vec<ActivityDetail>> {
        let mut details = self
            .storage
            .find_by(ACTIVITY_DETAIL_TABLE, "activity_id", &Value::Uuid(activity_id))?
            .iter()
            .map(|(_, row)| ActivityDetail::from_row(row))
            .collect::<Result<Vec<_>>>()?;
        details.sort_by(|a, b| {
            (&a.object_type, &a.object_id).cmp(&(&b.object_type, &b.object_id))
        });
        Ok(details)
    }
}
