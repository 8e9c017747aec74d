use std::sync::Arc;

use tracing::warn;

use crate::errors::AppResult;
use crate::model::{Location, PlacesDocument};
use crate::store::DocumentStore;
use crate::sync::fetch_locations;

/// Legacy documents embed the full places array inline; once migrated the
/// inline array is empty and the indexed collection is authoritative.
pub fn needs_migration(document: &PlacesDocument) -> bool {
    !document.places.is_empty()
}

/// Rewrite legacy inline places into the indexed collection and return the
/// collection contents with their store-assigned ids.
///
/// Idempotent from the caller's perspective: with no inline places left this
/// inserts nothing and only re-reads the collection. On bulk-insert failure
/// the error propagates and nothing is reported as migrated, leaving the
/// caller's cleared list empty rather than guessing at partial success.
pub async fn migrate_inline_places(
    store: &Arc<dyn DocumentStore>,
    inline: Vec<Location>,
    collection: &str,
) -> AppResult<Vec<Location>> {
    if !inline.is_empty() {
        warn!(count = inline.len(), "migrating legacy inline places");
        let records = inline
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        store.bulk_insert(records, collection).await?;
    }
    fetch_locations(store, collection).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::model::Address;
    use crate::store::{MemoryStore, StoreOp};

    use super::*;

    fn inline_places(count: usize) -> Vec<Location> {
        (0..count)
            .map(|n| {
                Location::new(
                    format!("Place {n}"),
                    Address {
                        name: format!("{n} Main St"),
                        lat: n as f64,
                        lng: -(n as f64),
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn moves_inline_places_into_the_collection() {
        let memory = MemoryStore::shared();
        let store: Arc<dyn DocumentStore> = memory.clone();

        let migrated = migrate_inline_places(&store, inline_places(3), "places-list")
            .await
            .unwrap();
        assert_eq!(migrated.len(), 3);
        assert_eq!(memory.collection_len("places-list"), 3);
        assert_eq!(migrated[0].title, "Place 0");
        assert!(migrated.iter().all(|place| place.id.is_some()));
    }

    #[tokio::test]
    async fn rerun_without_inline_places_is_a_noop() {
        let memory = MemoryStore::shared();
        let store: Arc<dyn DocumentStore> = memory.clone();

        migrate_inline_places(&store, inline_places(2), "places-list")
            .await
            .unwrap();
        let rerun = migrate_inline_places(&store, Vec::new(), "places-list")
            .await
            .unwrap();
        assert_eq!(rerun.len(), 2);
        assert_eq!(memory.collection_len("places-list"), 2);
    }

    #[tokio::test]
    async fn bulk_insert_failure_propagates_without_inserting() {
        let memory = MemoryStore::shared();
        let store: Arc<dyn DocumentStore> = memory.clone();

        memory.fail_next(StoreOp::BulkInsert);
        let result = migrate_inline_places(&store, inline_places(2), "places-list").await;
        assert!(result.is_err());
        assert_eq!(memory.collection_len("places-list"), 0);
    }

    #[test]
    fn detects_legacy_shape() {
        let mut document = PlacesDocument::default();
        assert!(!needs_migration(&document));
        document.places = inline_places(1);
        assert!(needs_migration(&document));
    }
}
