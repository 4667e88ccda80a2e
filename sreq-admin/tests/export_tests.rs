//! Export → save → restore round trip

mod helpers;

use helpers::{count, full_backup, memory_pool};
use sreq_admin::backup::{
    create_backup, restore, restore_value, BackupDocument, BackupStore, RestoreMode,
    RestoreOptions, COLLECTIONS,
};

#[tokio::test]
async fn test_exported_backup_restores_into_empty_database() {
    let source = memory_pool().await;
    let seeded = restore_value(&source, full_backup(), &RestoreOptions::default())
        .await
        .unwrap();
    assert!(seeded.success, "Errors: {:?}", seeded.details.errors);

    let document = create_backup(&source, "admin").await.unwrap();
    assert_eq!(document.metadata.total_records, 11);

    let dir = tempfile::tempdir().unwrap();
    let store = BackupStore::new(dir.path());
    let filename = store.save(&document).unwrap();

    let loaded = BackupDocument::from_value(store.load(&filename).unwrap()).unwrap();
    assert_eq!(loaded, document);

    let target = memory_pool().await;
    let options = RestoreOptions {
        mode: RestoreMode::Replace,
        ..Default::default()
    };
    let result = restore(&target, &loaded, &options).await.unwrap();

    assert!(result.success, "Errors: {:?}", result.details.errors);
    assert_eq!(result.details.tables_processed, COLLECTIONS.len());
    assert_eq!(result.details.records_restored, 11);

    for collection in COLLECTIONS.iter() {
        assert_eq!(
            count(&source, collection.table).await,
            count(&target, collection.table).await,
            "Row count for {}",
            collection.table
        );
    }
}

#[tokio::test]
async fn test_export_is_stable_across_round_trip() {
    let source = memory_pool().await;
    restore_value(&source, full_backup(), &RestoreOptions::default())
        .await
        .unwrap();
    let first = create_backup(&source, "admin").await.unwrap();

    let target = memory_pool().await;
    restore(&target, &first, &RestoreOptions::default()).await.unwrap();
    let second = create_backup(&target, "admin").await.unwrap();

    // Timestamps in metadata differ; record data must not
    assert_eq!(first.data, second.data);

    let alice = &second.data["users"][0];
    assert_eq!(alice["username"], "alice");
    assert_eq!(alice["createdAt"], "2024-09-01T08:30:00.000Z");
    assert_eq!(second.data["songs"][1]["played"], true);
    assert_eq!(second.data["songs"][1]["playedAt"], "2024-09-02T09:00:00.000Z");
}
