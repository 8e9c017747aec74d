use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::config::AppConfig;
use crate::debounce::Debouncer;
use crate::errors::{AppError, AppResult};
use crate::migration;
use crate::model::{Location, PlacesDocument};
use crate::store::DocumentStore;

/// Owns the authoritative in-memory places list and mirrors mutations to the
/// backing store: inserts and deletes go to the indexed collection per record,
/// everything else rides the debounced metadata save.
pub struct ListSynchronizer {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<PlacesDocument>>,
    saver: Arc<Debouncer>,
    config: AppConfig,
}

impl ListSynchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        state: Arc<Mutex<PlacesDocument>>,
        saver: Arc<Debouncer>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            state,
            saver,
            config,
        }
    }

    /// Fetch the aggregate, migrate the legacy inline shape if present, then
    /// repopulate the list from the indexed collection so every record
    /// carries its store-assigned id.
    pub async fn load(&self) -> AppResult<()> {
        let value = self.store.get(&self.config.document_key).await?;
        let document: PlacesDocument = serde_json::from_value(value)?;
        let legacy = migration::needs_migration(&document);

        let inline = {
            let mut state = self.state.lock();
            state.categories = document.categories;
            state.extra = document.extra;
            state.places.clear();
            document.places
        };

        if legacy {
            // Persist the cleared inline array so the legacy shape is gone
            // from the main document even if nothing else mutates it.
            self.schedule_save();
            let migrated = migration::migrate_inline_places(
                &self.store,
                inline,
                &self.config.places_collection,
            )
            .await?;
            self.state.lock().places = migrated;
            return Ok(());
        }

        self.refresh().await
    }

    /// Replace the in-memory list with the indexed collection contents.
    pub async fn refresh(&self) -> AppResult<()> {
        let places = fetch_locations(&self.store, &self.config.places_collection).await?;
        self.state.lock().places = places;
        Ok(())
    }

    /// Store-first insert: the record is only appended once the store has
    /// assigned it an id, so a failed insert leaves the list unchanged.
    pub async fn insert(&self, location: Location) -> AppResult<Location> {
        let record = serde_json::to_value(&location)?;
        let stored = self
            .store
            .insert(record, &self.config.places_collection)
            .await?;
        let mut inserted = location;
        inserted.id = Some(stored.id);
        self.state.lock().places.push(inserted.clone());
        Ok(inserted)
    }

    /// Bulk ingress path (CSV import). Records are persisted before they
    /// become list members: after the bulk insert the collection is re-read
    /// and records not already known locally are appended in store order, so
    /// imported rows end up id-bearing exactly like single inserts. Returns
    /// the number of records appended.
    pub async fn bulk_insert(&self, locations: Vec<Location>) -> AppResult<usize> {
        if locations.is_empty() {
            return Ok(0);
        }
        let records = locations
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .bulk_insert(records, &self.config.places_collection)
            .await?;

        let fetched = fetch_locations(&self.store, &self.config.places_collection).await?;
        let appended = {
            let mut state = self.state.lock();
            let known: HashSet<String> = state
                .places
                .iter()
                .filter_map(|place| place.id.clone())
                .collect();
            let mut appended = 0;
            for place in fetched {
                let already_listed = place
                    .id
                    .as_ref()
                    .map(|id| known.contains(id))
                    .unwrap_or(false);
                if !already_listed {
                    state.places.push(place);
                    appended += 1;
                }
            }
            appended
        };

        self.schedule_save();
        Ok(appended)
    }

    /// Replace the record at `index` in place. The stored id survives the
    /// edit even when the incoming record does not carry one.
    pub fn update(&self, index: usize, location: Location) -> AppResult<()> {
        {
            let mut state = self.state.lock();
            let slot = state
                .places
                .get_mut(index)
                .ok_or_else(|| AppError::Config(format!("location index {index} out of range")))?;
            let id = slot.id.take();
            *slot = location;
            if slot.id.is_none() {
                slot.id = id;
            }
        }
        self.schedule_save();
        Ok(())
    }

    /// Remove locally first, then delete the backing record by id. A store
    /// failure is reported but the local removal stands.
    pub async fn delete(&self, index: usize) -> AppResult<Location> {
        let removed = {
            let mut state = self.state.lock();
            if index >= state.places.len() {
                return Err(AppError::Config(format!(
                    "location index {index} out of range"
                )));
            }
            state.places.remove(index)
        };

        if let Some(id) = removed.id.as_deref() {
            if let Err(err) = self.store.delete(id, &self.config.places_collection).await {
                warn!(%id, ?err, "failed to delete location record from store");
                return Err(err);
            }
        }
        Ok(removed)
    }

    /// Replace the whole list with a caller-supplied ordering. Position is
    /// carried by the generic metadata save, not per-record writes.
    pub fn reorder(&self, new_order: Vec<Location>) {
        self.state.lock().places = new_order;
        self.schedule_save();
    }

    pub fn places(&self) -> Vec<Location> {
        self.state.lock().places.clone()
    }

    pub fn schedule_save(&self) {
        schedule_metadata_save(
            &self.saver,
            &self.store,
            &self.state,
            &self.config.document_key,
        );
    }
}

/// Read an indexed collection and merge the store-assigned id into each
/// record.
pub(crate) async fn fetch_locations(
    store: &Arc<dyn DocumentStore>,
    collection: &str,
) -> AppResult<Vec<Location>> {
    let records = store
        .search(serde_json::json!({}), collection)
        .await?;
    let mut places = Vec::with_capacity(records.len());
    for record in records {
        let mut place: Location = serde_json::from_value(record.data)?;
        place.id = Some(record.id);
        places.push(place);
    }
    Ok(places)
}

/// Arm the shared debounced save. The snapshot is taken when the timer fires,
/// so the write always carries the latest in-memory state; save failures are
/// logged and the state is left for the next mutation to resave.
pub(crate) fn schedule_metadata_save(
    saver: &Debouncer,
    store: &Arc<dyn DocumentStore>,
    state: &Arc<Mutex<PlacesDocument>>,
    document_key: &str,
) {
    let store = Arc::clone(store);
    let state = Arc::clone(state);
    let key = document_key.to_string();
    saver.schedule(move || async move {
        let snapshot = state.lock().metadata_snapshot();
        if let Err(err) = store.save(snapshot, &key).await {
            warn!(?err, key, "debounced metadata save failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::sleep;

    use crate::model::{Address, Category};
    use crate::store::{MemoryStore, StoreOp};

    use super::*;

    fn location(title: &str) -> Location {
        Location::new(
            title,
            Address {
                name: format!("{title} street"),
                lat: 1.0,
                lng: 2.0,
            },
        )
    }

    fn synchronizer(memory: &Arc<MemoryStore>, debounce_ms: u64) -> ListSynchronizer {
        let store: Arc<dyn DocumentStore> = memory.clone();
        let config = AppConfig {
            save_debounce_ms: debounce_ms,
            ..AppConfig::default()
        };
        ListSynchronizer::new(
            store,
            Arc::new(Mutex::new(PlacesDocument::default())),
            Arc::new(Debouncer::new(Duration::from_millis(debounce_ms))),
            config,
        )
    }

    #[tokio::test]
    async fn insert_assigns_id_and_appends() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);

        let inserted = sync.insert(location("Cafe")).await.unwrap();
        assert!(inserted.id.is_some());

        let places = sync.places();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].title, "Cafe");
        assert_eq!(places[0].id, inserted.id);
    }

    #[tokio::test]
    async fn failed_insert_leaves_list_unchanged() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);

        memory.fail_next(StoreOp::Insert);
        assert!(sync.insert(location("Cafe")).await.is_err());
        assert!(sync.places().is_empty());
        assert_eq!(memory.collection_len("places-list"), 0);
    }

    #[tokio::test]
    async fn load_migrates_legacy_inline_places() {
        let memory = MemoryStore::shared();
        memory.put_document(
            "places",
            json!({
                "categories": [{ "id": "c1", "name": "Food" }],
                "places": [
                    { "title": "Cafe", "address": { "name": "A", "lat": 1.0, "lng": 2.0 } },
                    { "title": "Park", "address": { "name": "B", "lat": 3.0, "lng": 4.0 } }
                ]
            }),
        );
        let sync = synchronizer(&memory, 20);

        sync.load().await.unwrap();
        let places = sync.places();
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].title, "Cafe");
        assert!(places.iter().all(|place| place.id.is_some()));
        assert_eq!(memory.collection_len("places-list"), 2);

        // the cleared inline array is persisted through the debounced save
        sleep(Duration::from_millis(100)).await;
        let saved = memory.document("places").unwrap();
        assert_eq!(saved["places"], json!([]));
        assert_eq!(saved["categories"][0]["name"], "Food");

        // a second load finds nothing inline and changes nothing
        sync.load().await.unwrap();
        assert_eq!(sync.places().len(), 2);
        assert_eq!(memory.collection_len("places-list"), 2);
    }

    #[tokio::test]
    async fn failed_migration_leaves_places_empty() {
        let memory = MemoryStore::shared();
        memory.put_document(
            "places",
            json!({
                "places": [
                    { "title": "Cafe", "address": { "name": "A", "lat": 1.0, "lng": 2.0 } }
                ]
            }),
        );
        let sync = synchronizer(&memory, 600);

        memory.fail_next(StoreOp::BulkInsert);
        assert!(sync.load().await.is_err());
        assert!(sync.places().is_empty());
        assert_eq!(memory.collection_len("places-list"), 0);
    }

    #[tokio::test]
    async fn bulk_insert_persists_and_assigns_ids() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 20);

        sync.insert(location("Existing")).await.unwrap();
        let appended = sync
            .bulk_insert(vec![location("Cafe"), location("Park")])
            .await
            .unwrap();
        assert_eq!(appended, 2);

        let places = sync.places();
        assert_eq!(places.len(), 3);
        assert_eq!(places[0].title, "Existing");
        assert_eq!(places[1].title, "Cafe");
        assert_eq!(places[2].title, "Park");
        assert!(places.iter().all(|place| place.id.is_some()));
    }

    #[tokio::test]
    async fn failed_bulk_insert_applies_nothing() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);

        memory.fail_next(StoreOp::BulkInsert);
        assert!(sync.bulk_insert(vec![location("Cafe")]).await.is_err());
        assert!(sync.places().is_empty());
        assert_eq!(memory.collection_len("places-list"), 0);
    }

    #[tokio::test]
    async fn delete_removes_locally_and_remotely() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);

        sync.insert(location("Cafe")).await.unwrap();
        sync.insert(location("Park")).await.unwrap();

        let removed = sync.delete(0).await.unwrap();
        assert_eq!(removed.title, "Cafe");
        assert_eq!(sync.places().len(), 1);
        assert_eq!(sync.places()[0].title, "Park");
        assert_eq!(memory.collection_len("places-list"), 1);
    }

    #[tokio::test]
    async fn failed_store_delete_still_removes_locally() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);
        sync.insert(location("Cafe")).await.unwrap();

        memory.fail_next(StoreOp::Delete);
        assert!(sync.delete(0).await.is_err());
        assert!(sync.places().is_empty());
    }

    #[tokio::test]
    async fn update_preserves_stored_id() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 20);

        let inserted = sync.insert(location("Cafe")).await.unwrap();
        sync.update(0, location("Renamed Cafe")).unwrap();

        let places = sync.places();
        assert_eq!(places[0].title, "Renamed Cafe");
        assert_eq!(places[0].id, inserted.id);
        assert!(sync.update(5, location("Nope")).is_err());
    }

    #[tokio::test]
    async fn failed_debounced_save_is_logged_not_retried() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 30);

        memory.fail_next(StoreOp::Save);
        sync.reorder(vec![location("A")]);
        sleep(Duration::from_millis(120)).await;
        assert_eq!(memory.save_call_count(), 0);
        assert!(memory.document("places").is_none());

        // the failed window is gone; the next mutation arms a fresh save
        // that carries the state current at fire time
        sync.reorder(vec![location("B"), location("A")]);
        sleep(Duration::from_millis(120)).await;
        assert_eq!(memory.save_call_count(), 1);
        let saved = memory.document("places").unwrap();
        assert_eq!(saved["places"], json!([]));
    }

    #[tokio::test]
    async fn failed_search_during_load_leaves_list_empty() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 600);
        sync.insert(location("Cafe")).await.unwrap();

        memory.fail_next(StoreOp::Search);
        assert!(sync.load().await.is_err());
        assert!(sync.places().is_empty());

        // the next load sees the store intact again
        sync.load().await.unwrap();
        assert_eq!(sync.places().len(), 1);
    }

    #[tokio::test]
    async fn mutations_within_the_window_coalesce_into_one_save() {
        let memory = MemoryStore::shared();
        let sync = synchronizer(&memory, 40);

        sync.update_categories_for_test();
        sync.reorder(vec![location("B"), location("A")]);
        sync.update(0, location("B2")).unwrap();
        assert_eq!(memory.save_call_count(), 0);

        sleep(Duration::from_millis(160)).await;
        assert_eq!(memory.save_call_count(), 1);

        // the fired save carries the final merged state, places stripped
        let saved = memory.document("places").unwrap();
        assert_eq!(saved["places"], json!([]));
        assert_eq!(saved["categories"][0]["name"], "Late addition");
    }

    impl ListSynchronizer {
        fn update_categories_for_test(&self) {
            self.state.lock().categories.push(Category {
                id: "c-test".into(),
                name: "Late addition".into(),
            });
            self.schedule_save();
        }
    }
}
