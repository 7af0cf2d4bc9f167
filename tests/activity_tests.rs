mod common;

use catalog_revisions::prelude::*;
use catalog_revisions::{
    ActivityType, CommitContext, CommitHook, HookFailurePolicy, TransactionState,
};
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_new_dataset_with_tags_yields_one_new_activity() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.set_revision_info(RevisionInfo::new().author("alice").message("create"))
        .unwrap();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    txn.insert_entity(&DatasetTag::new("t1", "d1", "geo")).await.unwrap();
    txn.insert_entity(&DatasetTag::new("t2", "d1", "eco")).await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.activities, 1);
    assert_eq!(receipt.activity_details, 3);
    assert_eq!(receipt.audit_skips, 0);

    let activities = db.activities().await.unwrap();
    assert_eq!(activities.len(), 1);
    let activity = &activities[0];
    assert_eq!(activity.object_id, "d1");
    assert_eq!(activity.activity_type, ActivityType::New);
    assert_eq!(activity.user_id, "alice");
    assert_eq!(Some(activity.revision_id), receipt.revision_id);
    assert_eq!(Some(activity.timestamp), receipt.revision_timestamp);
    assert_eq!(activity.data["name"], "census");

    let details = db.activity_details(activity.id).await.unwrap();
    let summary: Vec<(&str, &str, ActivityType)> = details
        .iter()
        .map(|d| (d.object_type.as_str(), d.object_id.as_str(), d.activity_type))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("dataset", "d1", ActivityType::New),
            ("tag", "t1", ActivityType::New),
            ("tag", "t2", ActivityType::New),
        ]
    );
}

#[tokio::test]
async fn test_new_root_detail_can_be_left_out() {
    let db = catalog_db_with(EngineConfig::new().record_new_root_detail(false));
    create_dataset(&db, "d1", &[("t1", "geo")]).await;

    let activities = db.activities().await.unwrap();
    assert_eq!(activities.len(), 1);
    let details = db.activity_details(activities[0].id).await.unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].object_id, "t1");
}

#[tokio::test]
async fn test_new_root_wins_over_changed_member() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[("t1", "geo")]).await;

    // move an existing tag onto a dataset created in the same transaction
    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d2", "housing")).await.unwrap();
    txn.set_column("dataset_tag", "t1", "dataset_id", "d2")
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();
    assert_eq!(receipt.activities, 1);

    let activities = db.activities_for("d2").await.unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].activity_type, ActivityType::New);

    let details = db.activity_details(activities[0].id).await.unwrap();
    let tag = details.iter().find(|d| d.object_id == "t1").unwrap();
    assert_eq!(tag.activity_type, ActivityType::Changed);
    assert_eq!(tag.data["dataset_id"], "d2");

    // the dataset the tag left gets nothing in this revision
    assert_eq!(db.activities_for("d1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_member_changes_group_under_one_changed_activity() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[("t1", "geo"), ("t2", "eco")]).await;

    let mut txn = db.begin();
    txn.set_column("dataset_tag", "t1", "tag", "geography")
        .await
        .unwrap();
    txn.soft_delete("dataset_tag", "t2").await.unwrap();
    txn.insert_entity(&DatasetTag::new("t3", "d1", "pop"))
        .await
        .unwrap();
    txn.insert("resource", resource_row("r1", "d1", "http://example.org/d1.csv"))
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();
    assert_eq!(receipt.activities, 1);
    assert_eq!(receipt.activity_details, 4);

    let activities = db.activities_for("d1").await.unwrap();
    assert_eq!(activities.len(), 2);
    let latest = &activities[1];
    assert_eq!(latest.activity_type, ActivityType::Changed);

    let details = db.activity_details(latest.id).await.unwrap();
    let summary: Vec<(&str, &str, ActivityType)> = details
        .iter()
        .map(|d| (d.object_type.as_str(), d.object_id.as_str(), d.activity_type))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("resource", "r1", ActivityType::New),
            ("tag", "t1", ActivityType::Changed),
            ("tag", "t2", ActivityType::Deleted),
            ("tag", "t3", ActivityType::New),
        ]
    );
}

#[tokio::test]
async fn test_deleting_root_yields_deleted_activity() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[("t1", "geo")]).await;

    let mut txn = db.begin();
    txn.set_column("dataset_tag", "t1", "tag", "geography")
        .await
        .unwrap();
    txn.soft_delete("dataset", "d1").await.unwrap();
    txn.commit().await.unwrap();

    let activities = db.activities_for("d1").await.unwrap();
    assert_eq!(activities.len(), 2);
    assert_eq!(activities[1].activity_type, ActivityType::Deleted);
    assert_eq!(activities[1].data["state"], "deleted");

    let details = db.activity_details(activities[1].id).await.unwrap();
    let types: Vec<_> = details
        .iter()
        .map(|d| (d.object_id.as_str(), d.activity_type))
        .collect();
    assert_eq!(
        types,
        vec![("d1", ActivityType::Deleted), ("t1", ActivityType::Changed)]
    );
}

#[tokio::test]
async fn test_each_touched_root_gets_its_own_activity() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    txn.insert_entity(&Group::new("g1", "Statistics")).await.unwrap();
    let receipt = txn.commit().await.unwrap();
    assert_eq!(receipt.activities, 2);

    let activities = db.activities().await.unwrap();
    let mut roots: Vec<&str> = activities.iter().map(|a| a.object_id.as_str()).collect();
    roots.sort();
    assert_eq!(roots, vec!["d1", "g1"]);
    assert!(activities.iter().all(|a| Some(a.revision_id) == receipt.revision_id));

    let group = activities.iter().find(|a| a.object_id == "g1").unwrap();
    let details = db.activity_details(group.id).await.unwrap();
    assert_eq!(details[0].object_type, "group");
}

#[tokio::test]
async fn test_orphan_member_is_skipped_without_failing_commit() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert_entity(&DatasetTag {
        id: "t1".into(),
        dataset_id: None,
        tag: "stray".into(),
        state: State::Active,
    })
    .await
    .unwrap();
    txn.insert_entity(&DatasetTag::new("t2", "missing", "geo"))
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(txn.state(), TransactionState::Committed);
    assert_eq!(receipt.history_rows_written, 2);
    assert_eq!(receipt.activities, 0);
    assert_eq!(receipt.audit_skips, 2);
    assert!(receipt.hook_failures.is_empty());
    assert!(db.activities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_table_changes_produce_no_activity() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert("setting", vec!["theme".into(), "dark".into()])
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.activities, 0);
    assert_eq!(receipt.audit_skips, 0);
    assert_eq!(db.row_count("activity").await.unwrap(), 0);
}

#[tokio::test]
async fn test_activities_can_be_switched_off() {
    let db = catalog_db_with(EngineConfig::new().emit_activities(false));
    assert!(!db.hooks().contains(&"activity_deriver"));

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.history_rows_written, 1);
    assert_eq!(receipt.activities, 0);
    assert!(db.activities().await.unwrap().is_empty());
}

/// Stages a stray row and then fails; only its own rows should be dropped.
struct FlakyAudit;

impl CommitHook for FlakyAudit {
    fn name(&self) -> &'static str {
        "flaky_audit"
    }

    fn failure_policy(&self) -> HookFailurePolicy {
        HookFailurePolicy::LogAndContinue
    }

    fn before_commit(&self, ctx: &mut CommitContext<'_>) -> Result<()> {
        ctx.stage(catalog_revisions::transaction::Change::InsertRow {
            table: "setting".to_string(),
            row: vec!["audit".into(), "partial".into()],
        });
        Err(DbError::ExecutionError("audit sink unavailable".into()))
    }
}

#[tokio::test]
async fn test_best_effort_hook_failure_keeps_commit() {
    let mut db = catalog_db();
    db.register_hook(Arc::new(FlakyAudit));

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.hook_failures, vec!["flaky_audit".to_string()]);
    assert_eq!(receipt.history_rows_written, 1);
    assert_eq!(receipt.activities, 1);
    assert!(db.get("setting", "audit").await.unwrap().is_none());
    assert!(db.load::<Dataset>("d1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unserializable_root_is_skipped_not_downgraded() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert("survey", survey_row("s1", f64::NAN)).await.unwrap();
    txn.insert("survey_answer", survey_answer_row("a1", "s1", "yes"))
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(txn.state(), TransactionState::Committed);
    assert_eq!(receipt.history_rows_written, 2);
    assert_eq!(receipt.activities, 0);
    assert_eq!(receipt.audit_skips, 2);
    assert!(receipt.hook_failures.is_empty());
    assert!(db.get("survey", "s1").await.unwrap().is_some());

    // a later member change cannot snapshot its root either
    let mut txn = db.begin();
    txn.soft_delete("survey_answer", "a1").await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.history_rows_written, 1);
    assert_eq!(receipt.activities, 0);
    assert_eq!(receipt.audit_skips, 1);
    assert!(db.activities_for("s1").await.unwrap().is_empty());
    assert_eq!(db.lineage("survey_answer", "a1").await.unwrap().len(), 2);
}
