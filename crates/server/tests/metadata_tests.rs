//! Integration tests for the SQLite metadata store.

use farmgate_metadata::models::*;
use farmgate_metadata::repos::{
    FarmRepo, ProfileRepo, ReferenceRepo, SettingsRepo, SystemLogRepo, VisitorRepo,
};
use farmgate_metadata::{MetadataError, ReferenceSource, SqliteStore};
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

async fn open_store() -> (SqliteStore, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = SqliteStore::new(temp_dir.path().join("metadata.db"), None)
        .await
        .expect("Failed to open SQLite store");
    (store, temp_dir)
}

async fn seed_farm(store: &SqliteStore) -> Uuid {
    let now = OffsetDateTime::now_utc();
    let farm = FarmRow {
        farm_id: Uuid::new_v4(),
        farm_name: "Hillside".to_string(),
        owner_profile_id: None,
        address: None,
        created_at: now,
        updated_at: now,
    };
    store.create_farm(&farm).await.unwrap();
    farm.farm_id
}

async fn seed_entry(store: &SqliteStore, farm_id: Uuid, photo_url: Option<&str>) -> Uuid {
    let now = OffsetDateTime::now_utc();
    let entry = VisitorEntryRow {
        entry_id: Uuid::new_v4(),
        farm_id,
        visitor_name: "Kim".to_string(),
        visitor_phone: None,
        purpose: Some("delivery".to_string()),
        vehicle_number: None,
        photo_url: photo_url.map(str::to_string),
        visited_at: now,
        created_at: now,
    };
    store.create_visitor_entry(&entry).await.unwrap();
    entry.entry_id
}

fn log_row(level: &str, action: &str, created_at: OffsetDateTime) -> SystemLogRow {
    SystemLogRow {
        log_id: Uuid::new_v4(),
        level: level.to_string(),
        action: action.to_string(),
        message: format!("{action} at {level}"),
        actor_id: None,
        actor_label: Some("system".to_string()),
        resource_type: None,
        resource_id: None,
        metadata_json: None,
        created_at,
    }
}

#[tokio::test]
async fn test_references_skip_null_and_empty_values() {
    let (store, _dir) = open_store().await;
    let farm_id = seed_farm(&store).await;

    let with_photo = seed_entry(&store, farm_id, Some("https://cdn/visitor-photos/a.jpg")).await;
    seed_entry(&store, farm_id, None).await;
    seed_entry(&store, farm_id, Some("")).await;

    let refs = store
        .list_references(ReferenceSource::VisitorPhotos)
        .await
        .unwrap();
    assert_eq!(
        refs,
        vec![ReferenceRow {
            record_id: with_photo,
            value: "https://cdn/visitor-photos/a.jpg".to_string(),
        }]
    );

    // Profiles are a separate source.
    assert!(
        store
            .list_references(ReferenceSource::ProfileImages)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_profile_image_references_follow_updates() {
    let (store, _dir) = open_store().await;
    let now = OffsetDateTime::now_utc();
    let profile_id = Uuid::new_v4();
    store
        .upsert_profile(&ProfileRow {
            profile_id,
            display_name: Some("Lee".to_string()),
            email: None,
            profile_image: Some("https://lh3.googleusercontent.com/abc".to_string()),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    store
        .set_profile_image(profile_id, Some("https://cdn/profiles/u1/new.png"), now)
        .await
        .unwrap();

    let refs = store
        .list_references(ReferenceSource::ProfileImages)
        .await
        .unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].value, "https://cdn/profiles/u1/new.png");

    let err = store
        .set_profile_image(Uuid::new_v4(), None, now)
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_deleted_entry_drops_its_reference() {
    let (store, _dir) = open_store().await;
    let farm_id = seed_farm(&store).await;
    let entry_id = seed_entry(&store, farm_id, Some("visitor-photos/a.jpg")).await;

    store.delete_visitor_entry(entry_id).await.unwrap();

    assert!(
        store
            .list_references(ReferenceSource::VisitorPhotos)
            .await
            .unwrap()
            .is_empty()
    );
    let err = store.delete_visitor_entry(entry_id).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_system_log_filters_and_purge() {
    let (store, _dir) = open_store().await;
    let now = OffsetDateTime::now_utc();
    let old = now - time::Duration::days(120);

    store
        .create_system_log(&log_row("info", "ORPHAN_FILES_CLEANUP", old))
        .await
        .unwrap();
    store
        .create_system_log(&log_row("warn", "ORPHAN_FILES_CLEANUP", now))
        .await
        .unwrap();
    store
        .create_system_log(&log_row("error", "ORPHAN_FILES_CLEANUP_FAILED", now))
        .await
        .unwrap();

    let all = store
        .list_system_logs(&SystemLogFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    // Newest first.
    assert_eq!(all[2].level, "info");

    let warn_only = store
        .list_system_logs(&SystemLogFilter {
            level: Some("warn".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(warn_only.len(), 1);

    let failed = store
        .list_system_logs(&SystemLogFilter {
            action: Some("ORPHAN_FILES_CLEANUP_FAILED".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].level, "error");

    let purged = store
        .delete_system_logs_before(now - time::Duration::days(90))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(
        store
            .list_system_logs(&SystemLogFilter::default())
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_settings_upsert() {
    let (store, _dir) = open_store().await;
    let now = OffsetDateTime::now_utc();

    assert!(store.get_setting("site.name").await.unwrap().is_none());
    store.set_setting("site.name", "Hillside", now).await.unwrap();
    store.set_setting("site.name", "Valley", now).await.unwrap();
    store.set_setting("alerts.enabled", "true", now).await.unwrap();

    let setting = store.get_setting("site.name").await.unwrap().unwrap();
    assert_eq!(setting.value, "Valley");

    let keys: Vec<String> = store
        .list_settings()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert_eq!(keys, vec!["alerts.enabled", "site.name"]);
}

#[tokio::test]
async fn test_visitor_entries_listed_per_farm() {
    let (store, _dir) = open_store().await;
    let farm_a = seed_farm(&store).await;
    let farm_b = seed_farm(&store).await;
    seed_entry(&store, farm_a, None).await;
    seed_entry(&store, farm_a, None).await;
    seed_entry(&store, farm_b, None).await;

    assert_eq!(store.list_visitor_entries(farm_a, 50).await.unwrap().len(), 2);
    assert_eq!(store.list_visitor_entries(farm_a, 1).await.unwrap().len(), 1);
    assert_eq!(store.list_farms().await.unwrap().len(), 2);
}
