//! Ad inventory synchronization and selection.

mod support;

use std::sync::Arc;

use funnel_sync::remote::{InMemoryRemoteStore, RemoteStore};
use funnel_sync::{
    default_ads, AdInventory, AdPosition, AdRecord, AdRecordPatch, InitOutcome, NewAdRecord,
    Priority, Record, RefreshOutcome, SyncError, SyncOptions,
};
use support::GatedStore;

fn inventory_on(store: &InMemoryRemoteStore) -> AdInventory {
    AdInventory::new(Arc::new(store.clone()), SyncOptions::manual())
}

fn raw_row(store: &InMemoryRemoteStore, id: &str) -> serde_json::Value {
    store
        .rows(AdRecord::TABLE)
        .unwrap_or_default()
        .iter()
        .map(|row| serde_json::from_slice::<serde_json::Value>(row).unwrap())
        .find(|row| row["id"] == id)
        .unwrap()
}

fn stored(store: &InMemoryRemoteStore) -> Vec<AdRecord> {
    store
        .rows(AdRecord::TABLE)
        .unwrap_or_default()
        .iter()
        .map(|row| serde_json::from_slice(row).unwrap())
        .collect()
}

#[tokio::test]
async fn missing_table_is_seeded_with_defaults() {
    let store = InMemoryRemoteStore::new();
    let ads = inventory_on(&store);

    assert_eq!(ads.initialize().await, InitOutcome::Seeded);
    assert_eq!(stored(&store), default_ads());
    assert_eq!(*ads.ads(), default_ads());
}

#[tokio::test]
async fn empty_table_is_loaded_as_empty() {
    let store = InMemoryRemoteStore::new();
    store.replace_rows(AdRecord::TABLE, Vec::new()).await.unwrap();
    let ads = inventory_on(&store);

    assert_eq!(ads.initialize().await, InitOutcome::Loaded);
    assert!(ads.ads().is_empty());
}

#[tokio::test]
async fn legacy_and_broken_rows() {
    let store = InMemoryRemoteStore::new();
    let legacy = br#"{"id":"ad-old","name":"Old","position":"top","active":true,
        "code":"<i>old</i>","frequency":2,"created_at":"2024-01-01T00:00:00Z"}"#;
    store
        .replace_rows(
            AdRecord::TABLE,
            vec![
                ("ad-old".into(), legacy.to_vec()),
                ("ad-bad".into(), br#"{"id":"ad-bad","position":"sidebar"}"#.to_vec()),
            ],
        )
        .await
        .unwrap();
    let ads = inventory_on(&store);
    ads.initialize().await;

    let all = ads.ads();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].payload, "<i>old</i>");
    assert_eq!(all[0].frequency_cap, Some(2));
    assert_eq!(all[0].priority, Priority::Normal);
}

#[tokio::test]
async fn crud_round_trip_through_store() {
    let store = InMemoryRemoteStore::new();
    let ads = inventory_on(&store);
    ads.initialize().await;

    let (created, pending) = ads
        .create(
            NewAdRecord::new("Popup", AdPosition::Interstitial, "<div>pop</div>")
                .with_priority(Priority::High)
                .with_frequency_cap(5),
        )
        .unwrap();
    pending.confirmed().await.unwrap();
    assert!(stored(&store).contains(&created));

    ads.update(
        &created.id,
        AdRecordPatch {
            name: Some("Popup v2".into()),
            ..Default::default()
        },
    )
    .unwrap()
    .confirmed()
    .await
    .unwrap();
    let row = stored(&store).into_iter().find(|ad| ad.id == created.id).unwrap();
    assert_eq!(row.name, "Popup v2");
    assert_eq!(row.created_at, created.created_at);
    assert!(row.updated_at.is_some());

    ads.delete(&created.id).unwrap().confirmed().await.unwrap();
    assert!(stored(&store).iter().all(|ad| ad.id != created.id));
    assert_eq!(ads.get(&created.id), None);
}

#[tokio::test]
async fn activating_ad_without_payload_is_rejected() {
    let store = InMemoryRemoteStore::new();
    let ads = inventory_on(&store);
    ads.initialize().await;

    let (draft, _) = ads
        .create(NewAdRecord::new("Draft", AdPosition::Sticky, "").inactive())
        .unwrap();

    assert!(matches!(
        ads.toggle_active(&draft.id),
        Err(SyncError::Validation(_))
    ));
    assert!(!ads.get(&draft.id).unwrap().active);
}

#[tokio::test]
async fn toggle_survives_stale_refresh() {
    let store = GatedStore::new();
    let ads = AdInventory::new(store.clone(), SyncOptions::manual());
    ads.initialize().await;

    store.hold_reads();
    let refreshing = tokio::spawn({
        let ads = ads.clone();
        async move { ads.refresh().await }
    });
    support::eventually("read to park", || store.parked_reads() == 1).await;

    ads.toggle_active("ad-middle").unwrap().confirmed().await.unwrap();

    store.release_reads();
    assert_eq!(
        refreshing.await.unwrap(),
        Ok(RefreshOutcome::Rebased { replayed: 1 })
    );
    assert!(!ads.get("ad-middle").unwrap().active);
}

#[tokio::test]
async fn delete_by_other_session_then_local_patch_is_not_found() {
    let store = InMemoryRemoteStore::new();
    let ours = inventory_on(&store);
    let theirs = inventory_on(&store);
    ours.initialize().await;
    theirs.initialize().await;

    theirs.delete("ad-bottom").unwrap().confirmed().await.unwrap();
    ours.refresh().await.unwrap();

    assert_eq!(
        ours.toggle_active("ad-bottom").unwrap_err(),
        SyncError::RecordNotFound {
            id: "ad-bottom".into()
        }
    );
}

#[tokio::test]
async fn reset_replaces_all_rows() {
    let store = InMemoryRemoteStore::new();
    let ads = inventory_on(&store);
    ads.initialize().await;

    ads.delete("ad-top").unwrap();
    ads.create(NewAdRecord::new("Extra", AdPosition::Bottom, "<p/>"))
        .unwrap();
    ads.reset_to_defaults().unwrap().confirmed().await.unwrap();

    assert_eq!(*ads.ads(), default_ads());
    assert_eq!(stored(&store), default_ads());
}

#[tokio::test]
async fn selection_respects_cap_and_priority() {
    let store = InMemoryRemoteStore::new();
    let ads = inventory_on(&store);
    ads.initialize().await;

    ads.create(
        NewAdRecord::new("Rare top", AdPosition::Top, "<p>rare</p>")
            .with_priority(Priority::Low)
            .with_frequency_cap(3),
    )
    .unwrap();
    ads.create(NewAdRecord::new("Plain top", AdPosition::Top, "<p>plain</p>"))
        .unwrap();

    let names = |impression| -> Vec<String> {
        ads.ads_for(AdPosition::Top, impression)
            .into_iter()
            .map(|ad| ad.name)
            .collect()
    };

    assert_eq!(names(0), vec!["Top Banner Ad", "Plain top", "Rare top"]);
    assert_eq!(names(1), vec!["Top Banner Ad", "Plain top"]);
    let rare_hits = (0..9).filter(|i| names(*i).contains(&"Rare top".to_string())).count();
    assert_eq!(rare_hits, 3);
}

#[tokio::test]
async fn seeding_keeps_ad_created_during_initial_read() {
    let store = GatedStore::new();
    let ads = AdInventory::new(store.clone(), SyncOptions::manual());

    store.hold_reads();
    let init = tokio::spawn({
        let ads = ads.clone();
        async move { ads.initialize().await }
    });
    support::eventually("initial read to park", || store.parked_reads() == 1).await;

    let (created, pending) = ads
        .create(NewAdRecord::new("Early", AdPosition::Sticky, "<p>early</p>"))
        .unwrap();
    pending.confirmed().await.unwrap();

    store.release_reads();
    assert_eq!(init.await.unwrap(), InitOutcome::Seeded);

    let rows = stored(store.backing());
    assert_eq!(rows.len(), default_ads().len() + 1);
    assert!(rows.contains(&created));

    ads.refresh().await.unwrap();
    assert_eq!(ads.get(&created.id), Some(created));
    assert_eq!(ads.ads().len(), default_ads().len() + 1);
}

#[tokio::test]
async fn unrecognized_priority_is_loaded_ranked_last_and_kept() {
    let store = InMemoryRemoteStore::new();
    let medium = br#"{"id":"ad-medium","name":"Medium","position":"top","active":true,
        "payload":"<p>m</p>","priority":"medium"}"#;
    let low = br#"{"id":"ad-low","name":"Low","position":"top","active":true,
        "payload":"<p>l</p>","priority":"low"}"#;
    store
        .replace_rows(
            AdRecord::TABLE,
            vec![
                ("ad-medium".into(), medium.to_vec()),
                ("ad-low".into(), low.to_vec()),
            ],
        )
        .await
        .unwrap();
    let ads = inventory_on(&store);
    ads.initialize().await;

    let order: Vec<String> = ads
        .ads_for(AdPosition::Top, 0)
        .into_iter()
        .map(|ad| ad.id)
        .collect();
    assert_eq!(order, vec!["ad-low", "ad-medium"]);

    ads.toggle_active("ad-medium").unwrap().confirmed().await.unwrap();
    let row = raw_row(&store, "ad-medium");
    assert_eq!(row["priority"], "medium");
    assert_eq!(row["active"], false);
}

#[tokio::test]
async fn view_threshold_survives_local_edit() {
    let store = InMemoryRemoteStore::new();
    let legacy = br#"{"id":"ad-gated","name":"Gated","position":"middle","active":true,
        "code":"<p>g</p>","view_threshold":3}"#;
    store
        .replace_rows(AdRecord::TABLE, vec![("ad-gated".into(), legacy.to_vec())])
        .await
        .unwrap();
    let ads = inventory_on(&store);
    ads.initialize().await;

    assert_eq!(ads.get("ad-gated").unwrap().view_threshold, Some(3));
    ads.toggle_active("ad-gated").unwrap().confirmed().await.unwrap();

    assert_eq!(raw_row(&store, "ad-gated")["viewThreshold"], 3);
}
