use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::categories::CategoryManager;
use crate::config::AppConfig;
use crate::csv_io;
use crate::debounce::Debouncer;
use crate::errors::AppResult;
use crate::model::{Category, Location, PlacesDocument};
use crate::store::DocumentStore;
use crate::sync::ListSynchronizer;

/// What the editor pane is currently doing, mirroring the host plugin's
/// add/edit toggle. Purely presentation state; the data core does not depend
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Browsing,
    Adding,
    Editing(usize),
}

/// Facade for the rendering layer: wires the synchronizer, category manager
/// and CSV codec to one shared document state and exposes the callback
/// surface the UI consumes.
pub struct ContentController {
    synchronizer: ListSynchronizer,
    categories: CategoryManager,
    mode: Mutex<EditorMode>,
}

impl ContentController {
    /// Captures the current tokio runtime for the debounced save, so the
    /// synchronous mutation paths can be called from any thread afterwards.
    /// Must itself be called from within a runtime.
    pub fn new(store: Arc<dyn DocumentStore>, config: AppConfig) -> Self {
        let state = Arc::new(Mutex::new(PlacesDocument::default()));
        let saver = Arc::new(Debouncer::new(Duration::from_millis(config.save_debounce_ms)));
        let synchronizer = ListSynchronizer::new(
            Arc::clone(&store),
            Arc::clone(&state),
            Arc::clone(&saver),
            config.clone(),
        );
        let categories = CategoryManager::new(store, state, saver, config);
        Self {
            synchronizer,
            categories,
            mode: Mutex::new(EditorMode::Browsing),
        }
    }

    pub async fn load(&self) -> AppResult<()> {
        self.synchronizer.load().await
    }

    // editor mode

    pub fn begin_add(&self) {
        *self.mode.lock() = EditorMode::Adding;
    }

    pub fn begin_edit(&self, index: usize) {
        *self.mode.lock() = EditorMode::Editing(index);
    }

    pub fn cancel_editing(&self) {
        *self.mode.lock() = EditorMode::Browsing;
    }

    pub fn mode(&self) -> EditorMode {
        *self.mode.lock()
    }

    // locations

    pub async fn submit_new_location(&self, location: Location) -> AppResult<Location> {
        self.cancel_editing();
        self.synchronizer.insert(location).await
    }

    pub fn submit_edited_location(&self, index: usize, location: Location) -> AppResult<()> {
        self.cancel_editing();
        self.synchronizer.update(index, location)
    }

    pub async fn delete_location(&self, index: usize) -> AppResult<Location> {
        self.synchronizer.delete(index).await
    }

    pub fn reorder(&self, new_order: Vec<Location>) {
        self.synchronizer.reorder(new_order);
    }

    pub fn places(&self) -> Vec<Location> {
        self.synchronizer.places()
    }

    // CSV ingress/egress

    /// All-or-nothing: a decode failure inserts nothing. Returns the number
    /// of locations added to the list.
    pub async fn import_csv(&self, bytes: &[u8]) -> AppResult<usize> {
        let locations = csv_io::import_locations(bytes)?;
        let appended = self.synchronizer.bulk_insert(locations).await?;
        self.cancel_editing();
        Ok(appended)
    }

    pub fn export_csv(&self) -> AppResult<String> {
        csv_io::export_locations(&self.synchronizer.places())
    }

    pub fn template_csv(&self) -> AppResult<String> {
        csv_io::template()
    }

    // categories

    pub fn add_category(&self, name: &str) -> Option<Category> {
        self.categories.add(name)
    }

    pub fn rename_category(&self, index: usize, new_name: &str) -> AppResult<()> {
        self.categories.rename(index, new_name)
    }

    pub fn delete_category(&self, index: usize) -> AppResult<Category> {
        self.categories.delete(index)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.categories.categories()
    }
}
