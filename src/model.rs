use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named point on the map. `lat`/`lng` come from parsed text; rows that
/// fail to parse are rejected at the import boundary so NaN never lands here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// A single entry in the ordered places list. `id` is assigned by the store
/// on first successful insert and is absent before that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub address: Address,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub image: String,
}

impl Location {
    pub fn new(title: impl Into<String>, address: Address) -> Self {
        Self {
            id: None,
            title: title.into(),
            address,
            description: String::new(),
            subtitle: String::new(),
            image: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// The main document aggregate. `places` lives inline only in the legacy
/// storage shape; once migrated it is always re-fetched from the indexed
/// collection. `extra` carries any metadata fields this core does not model
/// so the wholesale metadata save never drops them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlacesDocument {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub places: Vec<Location>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlacesDocument {
    /// Everything except `places`, as the payload for the debounced bulk save.
    /// The indexed collection is saved per record; resaving the list wholesale
    /// would blow the size limit of the main document.
    pub fn metadata_snapshot(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "categories".into(),
            serde_json::to_value(&self.categories).unwrap_or(Value::Array(Vec::new())),
        );
        body.insert("places".into(), Value::Array(Vec::new()));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }
}
