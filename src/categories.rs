use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::debounce::Debouncer;
use crate::errors::{AppError, AppResult};
use crate::model::{Category, PlacesDocument};
use crate::store::DocumentStore;
use crate::sync::schedule_metadata_save;

/// Manages the ordered category set on the shared document. Categories live
/// only in the main document, so every mutation rides the debounced save.
pub struct CategoryManager {
    store: Arc<dyn DocumentStore>,
    state: Arc<Mutex<PlacesDocument>>,
    saver: Arc<Debouncer>,
    config: AppConfig,
}

impl CategoryManager {
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

    /// Append a category with a freshly generated id. A name that is empty
    /// after trimming is silently ignored; it is a validation skip, not an
    /// error. Returns the new category when one was added.
    pub fn add(&self, name: &str) -> Option<Category> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: trimmed.to_string(),
        };
        self.state.lock().categories.push(category.clone());
        self.schedule_save();
        Some(category)
    }

    /// Rename in place. The same trim-and-reject-empty rule as `add` applies;
    /// an empty rename is a no-op rather than a way to blank a category.
    pub fn rename(&self, index: usize, new_name: &str) -> AppResult<()> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.state.lock();
            let category = state
                .categories
                .get_mut(index)
                .ok_or_else(|| AppError::Config(format!("category index {index} out of range")))?;
            category.name = trimmed.to_string();
        }
        self.schedule_save();
        Ok(())
    }

    pub fn delete(&self, index: usize) -> AppResult<Category> {
        let removed = {
            let mut state = self.state.lock();
            if index >= state.categories.len() {
                return Err(AppError::Config(format!(
                    "category index {index} out of range"
                )));
            }
            state.categories.remove(index)
        };
        self.schedule_save();
        Ok(removed)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().categories.clone()
    }

    fn schedule_save(&self) {
        schedule_metadata_save(
            &self.saver,
            &self.store,
            &self.state,
            &self.config.document_key,
        );
    }
}
