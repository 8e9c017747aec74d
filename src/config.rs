use std::{env, io};

use tracing::debug;

const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 600;
const DEFAULT_DOCUMENT_KEY: &str = "places";
const DEFAULT_PLACES_COLLECTION: &str = "places-list";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Quiescence window for the coalesced metadata save.
    pub save_debounce_ms: u64,
    /// Key of the main document aggregate in the store.
    pub document_key: String,
    /// Name of the indexed per-record collection.
    pub places_collection: String,
    pub database_file_name: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            save_debounce_ms: parse_u64("SAVE_DEBOUNCE_MS", DEFAULT_SAVE_DEBOUNCE_MS),
            document_key: env::var("DOCUMENT_KEY")
                .unwrap_or_else(|_| DEFAULT_DOCUMENT_KEY.to_string()),
            places_collection: env::var("PLACES_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_PLACES_COLLECTION.to_string()),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "places-content.db".to_string()),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            document_key: DEFAULT_DOCUMENT_KEY.to_string(),
            places_collection: DEFAULT_PLACES_COLLECTION.to_string(),
            database_file_name: "places-content.db".to_string(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
