use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored preset as the server or the local catalog file records it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresetRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_type: String,
    /// Opaque bag of training settings. Keys are whatever the producing
    /// panel version knew about, consumers must tolerate extras.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub is_builtin: bool,
}

/// The body of a preset save request. The server assigns the id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresetUpload {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_type: String,
    pub config: Map<String, Value>,
}
