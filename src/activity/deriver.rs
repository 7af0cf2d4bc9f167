use super::model::{
    ACTIVITY_DETAIL_TABLE, ACTIVITY_TABLE, Activity, ActivityDetail, ActivityType,
};
use crate::core::{Result, Row};
use crate::revision::Revision;
use crate::transaction::{
    Change, ChangeCategory, CommitContext, CommitHook, HookFailurePolicy, ObjectRef,
};
use crate::versioned::{AggregateBinding, VersionedTable};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Where an [`ActivityPlan`] is in its walk over the change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationPhase {
    ScanningNew,
    ScanningOther,
    Done,
}

/// Activities and details derived from one change set.
///
/// At most one activity per aggregate root. New roots are claimed before any
/// other object is looked at, so a root created in this transaction is never
/// reported as changed or deleted.
#[derive(Debug)]
pub struct ActivityPlan {
    phase: DerivationPhase,
    revision: Revision,
    activities: Vec<Activity>,
    by_root: HashMap<ObjectRef, usize>,
    details: Vec<ActivityDetail>,
    attributed: HashSet<ObjectRef>,
    skipped: usize,
}

impl ActivityPlan {
    pub fn new(revision: Revision) -> Self {
        Self {
            phase: DerivationPhase::ScanningNew,
            revision,
            activities: Vec::new(),
            by_root: HashMap::new(),
            details: Vec::new(),
            attributed: HashSet::new(),
            skipped: 0,
        }
    }

    pub fn phase(&self) -> DerivationPhase {
        self.phase
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn details(&self) -> &[ActivityDetail] {
        &self.details
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Runs both passes over the change set. A plan derives once; later calls
    /// do nothing.
    pub fn derive(&mut self, ctx: &CommitContext<'_>) {
        self.scan_new(ctx);
        self.scan_other(ctx);
    }

    /// Pass 1: one `new` activity per newly created aggregate root.
    fn scan_new(&mut self, ctx: &CommitContext<'_>) {
        if self.phase != DerivationPhase::ScanningNew {
            return;
        }
        for object in ctx.change_set().new_objects() {
            let Some(table) = ctx.schema().versioned(&object.table) else {
                continue;
            };
            if !table.is_root() {
                continue;
            }
            self.attributed.insert(object.clone());
            let Some(snapshot) = self.snapshot(ctx, table, object) else {
                continue;
            };

            let idx = self.open(object.clone(), ActivityType::New, snapshot.clone());
            if ctx.config().record_new_root_detail {
                self.detail(idx, object, table, ActivityType::New, snapshot);
            }
        }
        self.phase = DerivationPhase::ScanningOther;
    }

    /// Pass 2: every other object, grouped under its root, in new, changed,
    /// deleted order.
    fn scan_other(&mut self, ctx: &CommitContext<'_>) {
        // new roots must be claimed first
        if self.phase != DerivationPhase::ScanningOther {
            return;
        }
        for category in ChangeCategory::ORDER {
            for object in ctx.change_set().category(category) {
                if self.attributed.contains(object) {
                    continue;
                }
                self.attribute(ctx, category, object);
            }
        }
        self.phase = DerivationPhase::Done;
    }

    fn attribute(&mut self, ctx: &CommitContext<'_>, category: ChangeCategory, object: &ObjectRef) {
        let Some(table) = ctx.schema().versioned(&object.table) else {
            log::debug!("{} is not versioned; no activity", object);
            return;
        };
        if matches!(table.binding(), AggregateBinding::Unbound) {
            log::debug!("{} belongs to no aggregate; no activity", object);
            return;
        }

        let Some(row) = self.row(ctx, object) else {
            return;
        };
        let root = match table.root_of(&row) {
            Ok(Some((root_table, root_id))) => ObjectRef::new(root_table, root_id),
            Ok(None) => {
                self.skip(object, "has no aggregate root");
                return;
            }
            Err(err) => {
                self.skip(object, &format!("root lookup failed: {}", err));
                return;
            }
        };
        let Some(snapshot) = self.snapshot_row(table, object, &row) else {
            return;
        };

        let idx = match self.by_root.get(&root) {
            Some(idx) => *idx,
            // a new root whose own snapshot failed; never downgrade it to changed
            None if self.attributed.contains(&root) => {
                self.skip(object, "aggregate root has no activity");
                return;
            }
            None => {
                let Some(root_table) = ctx.schema().versioned(&root.table) else {
                    self.skip(object, &format!("root table '{}' is not versioned", root.table));
                    return;
                };
                let Some(root_snapshot) = self.snapshot(ctx, root_table, &root) else {
                    return;
                };
                let activity_type = if ctx.change_set().deleted_objects().contains(&root) {
                    ActivityType::Deleted
                } else {
                    ActivityType::Changed
                };
                self.open(root, activity_type, root_snapshot)
            }
        };
        self.detail(idx, object, table, category.into(), snapshot);
    }

    fn row(&mut self, ctx: &CommitContext<'_>, object: &ObjectRef) -> Option<Row> {
        match ctx.resolve_row(object) {
            Ok(Some(row)) => Some(row),
            Ok(None) => {
                self.skip(object, "row not found");
                None
            }
            Err(err) => {
                self.skip(object, &err.to_string());
                None
            }
        }
    }

    fn snapshot(
        &mut self,
        ctx: &CommitContext<'_>,
        table: &VersionedTable,
        object: &ObjectRef,
    ) -> Option<serde_json::Value> {
        let row = self.row(ctx, object)?;
        self.snapshot_row(table, object, &row)
    }

    fn snapshot_row(
        &mut self,
        table: &VersionedTable,
        object: &ObjectRef,
        row: &Row,
    ) -> Option<serde_json::Value> {
        match table.live_schema().schema().row_to_json(row) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                self.skip(object, &format!("snapshot failed: {}", err));
                None
            }
        }
    }

    fn skip(&mut self, object: &ObjectRef, reason: &str) {
        log::warn!("activity for {} skipped: {}", object, reason);
        self.skipped += 1;
    }

    fn open(&mut self, root: ObjectRef, activity_type: ActivityType, data: serde_json::Value) -> usize {
        let idx = self.activities.len();
        self.activities.push(Activity {
            id: Uuid::new_v4(),
            timestamp: self.revision.timestamp(),
            user_id: self.revision.author().to_string(),
            object_id: root.id.clone(),
            revision_id: self.revision.id(),
            activity_type,
            data,
        });
        self.by_root.insert(root, idx);
        idx
    }

    fn detail(
        &mut self,
        activity: usize,
        object: &ObjectRef,
        table: &VersionedTable,
        activity_type: ActivityType,
        data: serde_json::Value,
    ) {
        self.details.push(ActivityDetail {
            id: Uuid::new_v4(),
            activity_id: self.activities[activity].id,
            object_id: object.id.clone(),
            object_type: table.object_type().to_string(),
            activity_type,
            data,
        });
    }

    /// Rows to insert, activities before their details.
    pub fn into_changes(self) -> Vec<Change> {
        let activities = self.activities.iter().map(|activity| Change::InsertRow {
            table: ACTIVITY_TABLE.to_string(),
            row: activity.to_row(),
        });
        let details = self.details.iter().map(|detail| Change::InsertRow {
            table: ACTIVITY_DETAIL_TABLE.to_string(),
            row: detail.to_row(),
        });
        activities.chain(details).collect()
    }
}

/// Derives the aggregate-scoped activity log at commit. Best effort: problems
/// are logged and counted, never fatal.
#[derive(Debug, Default)]
pub struct ActivityDeriver;

impl CommitHook for ActivityDeriver {
    fn name(&self) -> &'static str {
        "activity_deriver"
    }

    fn failure_policy(&self) -> HookFailurePolicy {
        HookFailurePolicy::LogAndContinue
    }

    fn before_commit(&self, ctx: &mut CommitContext<'_>) -> Result<()> {
        let schema = ctx.schema();
        let touches_versioned = ctx
            .change_set()
            .iter()
            .any(|(_, object)| schema.is_versioned(&object.table));
        if !touches_versioned {
            return Ok(());
        }

        let mut plan = ActivityPlan::new(ctx.revision());
        plan.derive(ctx);

        let skipped = plan.skipped();
        let activities = plan.activities().len();
        for change in plan.into_changes() {
            ctx.stage(change);
        }
        ctx.note_audit_skips(skipped);
        log::debug!(
            "{} activities derived in {} ({} skipped)",
            activities,
            ctx.transaction_id(),
            skipped
        );
        Ok(())
    }
}
