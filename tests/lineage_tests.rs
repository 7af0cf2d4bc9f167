mod common;

use catalog_revisions::prelude::*;
use catalog_revisions::{CommitContext, CommitHook, ObjectRef, TransactionState};
use chrono::Duration;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_dataset_with_two_tags_shares_one_revision() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    txn.insert_entity(&DatasetTag::new("t1", "d1", "geo")).await.unwrap();
    txn.insert_entity(&DatasetTag::new("t2", "d1", "eco")).await.unwrap();
    let revision_id = txn.current_revision().unwrap().id();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.revision_id, Some(revision_id));
    assert_eq!(receipt.live_rows_written, 3);
    assert_eq!(receipt.history_rows_written, 3);

    for (table, id) in [("dataset", "d1"), ("dataset_tag", "t1"), ("dataset_tag", "t2")] {
        let lineage = db.lineage(table, id).await.unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage[0].revision_id, revision_id);
        assert_eq!(lineage[0].continuity_id, id);
        assert!(lineage[0].current);
        assert!(lineage[0].is_unexpired());
    }

    let contents = db.revision_contents(revision_id).await.unwrap();
    assert_eq!(
        contents,
        vec![
            ObjectRef::new("dataset", "d1"),
            ObjectRef::new("dataset_tag", "t1"),
            ObjectRef::new("dataset_tag", "t2"),
        ]
    );
}

#[tokio::test]
async fn test_repeated_writes_produce_one_history_row() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    let mut txn = db.begin();
    for version in 2..=5 {
        txn.set_column("dataset", "d1", "version", version as i64)
            .await
            .unwrap();
    }
    txn.set_column("dataset", "d1", "title", "Final").await.unwrap();
    assert_eq!(txn.change_count(), 1);
    let receipt = txn.commit().await.unwrap();
    assert_eq!(receipt.history_rows_written, 1);

    let lineage = db.lineage("dataset", "d1").await.unwrap();
    assert_eq!(lineage.len(), 2);
    let latest = Dataset::from_row(&lineage[1].live).unwrap();
    assert_eq!(latest.version, 5);
    assert_eq!(latest.title.as_deref(), Some("Final"));
}

#[tokio::test]
async fn test_sequential_revisions_expire_previous_row() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    let mut txn = db.begin();
    txn.set_column("dataset", "d1", "title", "First").await.unwrap();
    let first = txn.commit().await.unwrap();

    let mut txn = db.begin();
    txn.set_column("dataset", "d1", "title", "Second").await.unwrap();
    let second = txn.commit().await.unwrap();

    assert_ne!(first.revision_id, second.revision_id);
    let lineage = db.lineage("dataset", "d1").await.unwrap();
    assert_eq!(lineage.len(), 3);

    let by_first = &lineage[1];
    let by_second = &lineage[2];
    assert_eq!(Some(by_first.revision_id), first.revision_id);
    assert_eq!(by_first.expired_id, second.revision_id);
    assert!(by_first.expired_timestamp <= by_second.revision_timestamp);
    assert!(!by_first.current);

    let unexpired: Vec<_> = lineage.iter().filter(|row| row.is_unexpired()).collect();
    assert_eq!(unexpired.len(), 1);
    assert_eq!(Some(unexpired[0].revision_id), second.revision_id);
    assert_eq!(
        db.current_history("dataset", "d1").await.unwrap().unwrap().revision_id,
        by_second.revision_id
    );
}

#[tokio::test]
async fn test_soft_delete_keeps_live_row_and_adds_history() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    let mut txn = db.begin();
    txn.soft_delete("dataset", "d1").await.unwrap();
    let receipt = txn.commit().await.unwrap();
    assert_eq!(receipt.history_rows_written, 1);

    let live: Dataset = db.load("d1").await.unwrap().unwrap();
    assert_eq!(live.state, State::Deleted);

    let lineage = db.lineage("dataset", "d1").await.unwrap();
    assert_eq!(lineage.len(), 2);
    let snapshot = Dataset::from_row(&lineage[1].live).unwrap();
    assert_eq!(snapshot.state, State::Deleted);
    assert_eq!(lineage[1].continuity_id, "d1");
}

#[tokio::test]
async fn test_as_of_reconstructs_what_was_live() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    let created = txn.commit().await.unwrap();
    let at_creation: Dataset = db.load("d1").await.unwrap().unwrap();

    let mut txn = db.begin();
    txn.set_column("dataset", "d1", "title", "Census 2020").await.unwrap();
    let edited = txn.commit().await.unwrap();
    let after_edit: Dataset = db.load("d1").await.unwrap().unwrap();

    let created_at = created.revision_timestamp.unwrap();
    let edited_at = edited.revision_timestamp.unwrap();
    assert!(edited_at > created_at);

    assert!(
        db.reconstruct::<Dataset>("d1", created_at - Duration::microseconds(1))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(
        db.reconstruct::<Dataset>("d1", created_at).await.unwrap(),
        Some(at_creation.clone())
    );
    assert_eq!(
        db.reconstruct::<Dataset>("d1", edited_at - Duration::microseconds(1))
            .await
            .unwrap(),
        Some(at_creation)
    );
    assert_eq!(
        db.reconstruct::<Dataset>("d1", edited_at).await.unwrap(),
        Some(after_edit)
    );

    let row = db.as_of("dataset", "d1", edited_at).await.unwrap().unwrap();
    assert!(row.covers(edited_at));
}

#[tokio::test]
async fn test_noop_update_writes_nothing() {
    let db = catalog_db();
    let dataset = create_dataset(&db, "d1", &[]).await;

    let mut txn = db.begin();
    txn.save_entity(&dataset).await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.live_rows_written, 0);
    assert_eq!(receipt.history_rows_written, 0);
    assert_eq!(receipt.revision_id, None);
    assert_eq!(db.lineage("dataset", "d1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_plain_tables_are_not_versioned() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert("setting", vec!["theme".into(), "dark".into()])
        .await
        .unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.live_rows_written, 1);
    assert_eq!(receipt.history_rows_written, 0);
    assert_eq!(receipt.revision_id, None);
    assert!(db.revisions().await.unwrap().is_empty());
    assert!(db.lineage("setting", "theme").await.is_err());
}

#[tokio::test]
async fn test_unbound_entity_gets_history_but_no_activity() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert_entity(&Relationship {
        id: "r1".into(),
        subject_id: "d1".into(),
        object_id: "d2".into(),
        kind: "depends_on".into(),
        state: State::Active,
    })
    .await
    .unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.history_rows_written, 1);
    assert_eq!(receipt.activities, 0);
    assert_eq!(receipt.audit_skips, 0);
}

struct FailingWriter;

impl CommitHook for FailingWriter {
    fn name(&self) -> &'static str {
        "failing_writer"
    }

    fn before_commit(&self, _ctx: &mut CommitContext<'_>) -> Result<()> {
        Err(DbError::HistoryWrite("disk full".into()))
    }
}

#[tokio::test]
async fn test_fatal_hook_rolls_back_everything() {
    let mut db = catalog_db();
    db.register_hook(Arc::new(FailingWriter));

    let mut txn = db.begin();
    txn.insert_entity(&Dataset::new("d1", "census")).await.unwrap();
    txn.insert_entity(&DatasetTag::new("t1", "d1", "geo")).await.unwrap();
    let err = txn.commit().await.unwrap_err();

    assert!(matches!(err, DbError::HistoryWrite(_)));
    assert_eq!(txn.state(), TransactionState::Aborted);
    assert_eq!(db.row_count("dataset").await.unwrap(), 0);
    assert_eq!(db.row_count("dataset_revision").await.unwrap(), 0);
    assert_eq!(db.row_count("revision").await.unwrap(), 0);
    assert_eq!(db.row_count("activity").await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_update_conflict_aborts_second_commit() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    let mut first = db.begin();
    let mut second = db.begin();
    first.set_column("dataset", "d1", "title", "A").await.unwrap();
    second.set_column("dataset", "d1", "title", "B").await.unwrap();

    first.commit().await.unwrap();
    let err = second.commit().await.unwrap_err();
    assert!(err.to_string().contains("conflict"));
    assert_eq!(second.state(), TransactionState::Aborted);

    let live: Dataset = db.load("d1").await.unwrap().unwrap();
    assert_eq!(live.title.as_deref(), Some("A"));
    assert_eq!(db.lineage("dataset", "d1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_revision_timestamps_follow_commit_order() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    // revision opened first, committed last
    let mut early = db.begin();
    early.set_column("dataset", "d1", "title", "early").await.unwrap();
    early.current_revision().unwrap();

    let mut late = db.begin();
    late.insert_entity(&Dataset::new("d2", "other")).await.unwrap();
    let late_receipt = late.commit().await.unwrap();
    let early_receipt = early.commit().await.unwrap();

    assert!(early_receipt.revision_timestamp > late_receipt.revision_timestamp);
    let lineage = db.lineage("dataset", "d1").await.unwrap();
    assert_eq!(lineage.len(), 2);
    assert!(lineage[0].expired_timestamp <= lineage[1].revision_timestamp);
}

#[tokio::test]
async fn test_concurrent_writers_keep_single_current_row() {
    let db = catalog_db();
    create_dataset(&db, "d1", &[]).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let mut txn = db.begin();
            txn.insert_entity(&DatasetTag::new(&format!("t{}", i), "d1", "tag"))
                .await
                .unwrap();
            txn.commit().await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(db.row_count("dataset_tag").await.unwrap(), 8);
    assert_eq!(db.revisions().await.unwrap().len(), 9);
    for i in 0..8 {
        let lineage = db.lineage("dataset_tag", &format!("t{}", i)).await.unwrap();
        assert_eq!(lineage.iter().filter(|row| row.is_unexpired()).count(), 1);
    }
}

#[tokio::test]
async fn test_type_only_change_is_versioned() {
    let db = catalog_db();

    let mut txn = db.begin();
    txn.insert("survey", survey_row("s1", 2.0)).await.unwrap();
    txn.commit().await.unwrap();

    let mut txn = db.begin();
    txn.set_column("survey", "s1", "score", 2i64).await.unwrap();
    let receipt = txn.commit().await.unwrap();

    assert_eq!(receipt.live_rows_written, 1);
    assert_eq!(receipt.history_rows_written, 1);
    let live = db.get("survey", "s1").await.unwrap().unwrap();
    assert_eq!(live[1].type_name(), "INTEGER");
    let lineage = db.lineage("survey", "s1").await.unwrap();
    assert_eq!(lineage.len(), 2);
    assert_eq!(lineage[0].live[1].type_name(), "FLOAT");
}
