mod categories;
mod config;
mod controller;
mod csv_io;
mod db;
mod debounce;
mod errors;
mod migration;
mod model;
mod store;
mod sync;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use categories::CategoryManager;
pub use config::AppConfig;
pub use controller::{ContentController, EditorMode};
pub use csv_io::{export_locations, import_locations, template, CSV_HEADER};
pub use db::SqliteStore;
pub use debounce::Debouncer;
pub use errors::{AppError, AppResult};
pub use migration::{migrate_inline_places, needs_migration};
pub use model::{Address, Category, Location, PlacesDocument};
pub use store::{DocumentStore, MemoryStore, StoreOp, StoredRecord};
pub use sync::ListSynchronizer;

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,places_content=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
