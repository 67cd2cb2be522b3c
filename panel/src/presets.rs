use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use comms::specs::preset::{PresetRecord, PresetUpload};
use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::{
    api::ApiClient,
    error::PanelError,
    store::{LOCAL_PRESETS, StateDir},
};

/// Storage tier a preset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetOrigin {
    /// Ships with the panel. Always available, never deletable.
    Builtin,
    /// Lives on the tuning server.
    Server,
    /// Saved on this machine after a server save failed.
    LocalOnly,
}

/// A named, reusable bag of training settings.
#[derive(Debug, Clone)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub description: String,
    pub model_type: String,
    pub config: Map<String, Value>,
    pub origin: PresetOrigin,
    pub is_builtin: bool,
}

impl Preset {
    fn from_record(record: PresetRecord, origin: PresetOrigin) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            model_type: record.model_type,
            config: record.config,
            origin,
            is_builtin: record.is_builtin,
        }
    }
}

/// Every preset the panel can offer, grouped in display order.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    pub builtin: Vec<Preset>,
    pub server_builtin: Vec<Preset>,
    pub server_user: Vec<Preset>,
    pub local: Vec<Preset>,
    /// Set when the server listing failed and only local tiers are shown.
    pub server_error: Option<String>,
}

impl PresetCatalog {
    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.builtin
            .iter()
            .chain(&self.server_builtin)
            .chain(&self.server_user)
            .chain(&self.local)
    }

    pub fn len(&self) -> usize {
        self.builtin.len() + self.server_builtin.len() + self.server_user.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a delete landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(PresetOrigin),
    /// No tier had the id. Deleting the already gone is not an error.
    Missing,
}

/// The outcome of a save, including the tier it actually landed in.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub preset: Preset,
    /// The server error that forced a local save, when one did.
    pub fallback: Option<String>,
}

/// Keys that tie a config to one concrete project or machine. A preset is
/// meant to be portable, so these never survive a save.
pub const PROJECT_FIELDS: &[&str] = &[
    "dataset_path",
    "eval_dataset_path",
    "output_dir",
    "project_name",
    "run_name",
    "wandb_project",
    "wandb_api_key",
    "resume_from",
];

/// Returns `config` without any of the [`PROJECT_FIELDS`]. Applying this to
/// an already stripped bag changes nothing.
pub fn strip_project_fields(config: &Map<String, Value>) -> Map<String, Value> {
    let mut portable = config.clone();
    for field in PROJECT_FIELDS {
        portable.remove(*field);
    }

    portable
}

/// Unifies the three preset tiers behind one lookup surface.
pub struct PresetResolver {
    api: Arc<dyn ApiClient>,
    store: StateDir,
}

impl PresetResolver {
    pub fn new(api: Arc<dyn ApiClient>, store: StateDir) -> Self {
        Self { api, store }
    }

    /// The presets compiled into the panel. Same ids on every machine.
    pub fn builtins() -> Vec<Preset> {
        let specs = [
            (
                "builtin-lora-chat",
                "LoRA chat tune",
                "Supervised chat fine tune with a mid size LoRA adapter.",
                json!({
                    "model_type": "lora",
                    "learning_rate": 2e-4,
                    "epochs": 3,
                    "batch_size": 4,
                    "grad_accum": 4,
                    "max_seq_len": 2048,
                    "warmup_ratio": 0.03,
                    "weight_decay": 0.001,
                    "lora_rank": 16,
                    "lora_alpha": 32,
                    "lora_dropout": 0.05,
                    "save_steps": 100,
                    "logging_steps": 10,
                    "mixed_precision": "fp16",
                    "seed": 42,
                }),
            ),
            (
                "builtin-qlora-small-vram",
                "QLoRA on small VRAM",
                "Quantized adapter tune that fits consumer cards.",
                json!({
                    "model_type": "qlora",
                    "learning_rate": 2e-4,
                    "epochs": 2,
                    "batch_size": 1,
                    "grad_accum": 16,
                    "max_seq_len": 1024,
                    "warmup_ratio": 0.05,
                    "weight_decay": 0.001,
                    "lora_rank": 8,
                    "lora_alpha": 16,
                    "lora_dropout": 0.1,
                    "save_steps": 200,
                    "logging_steps": 10,
                    "mixed_precision": "fp16",
                    "seed": 42,
                }),
            ),
            (
                "builtin-full-tiny",
                "Full tune, tiny model",
                "Classic full parameter run for models that fit in memory.",
                json!({
                    "model_type": "full",
                    "learning_rate": 2e-5,
                    "epochs": 1,
                    "batch_size": 8,
                    "grad_accum": 2,
                    "max_seq_len": 1024,
                    "warmup_ratio": 0.1,
                    "weight_decay": 0.01,
                    "save_steps": 500,
                    "logging_steps": 20,
                    "mixed_precision": "bf16",
                    "seed": 42,
                }),
            ),
        ];

        specs
            .into_iter()
            .map(|(id, name, description, config)| Preset {
                id: id.into(),
                name: name.into(),
                description: description.into(),
                model_type: config["model_type"].as_str().unwrap_or("custom").into(),
                config: into_map(config),
                origin: PresetOrigin::Builtin,
                is_builtin: true,
            })
            .collect()
    }

    /// Gathers every tier into one catalog. A dead server degrades to the
    /// builtin and local tiers with the failure noted on the catalog.
    pub async fn list(&self) -> PresetCatalog {
        let mut catalog = PresetCatalog {
            builtin: Self::builtins(),
            ..PresetCatalog::default()
        };

        match self.api.list_presets().await {
            Ok(records) => {
                for record in records {
                    let preset = Preset::from_record(record, PresetOrigin::Server);
                    if preset.is_builtin {
                        catalog.server_builtin.push(preset);
                    } else {
                        catalog.server_user.push(preset);
                    }
                }
            }
            Err(e) => {
                warn!("preset listing degraded to local tiers: {e}");
                catalog.server_error = Some(e.to_string());
            }
        }

        catalog.local = self
            .local_records()
            .into_iter()
            .map(|r| Preset::from_record(r, PresetOrigin::LocalOnly))
            .collect();

        catalog
    }

    /// Looks one preset up by id. When tiers disagree the builtin wins,
    /// then the local copy, then the server.
    pub async fn get(&self, id: &str) -> Option<Preset> {
        if let Some(preset) = Self::builtins().into_iter().find(|p| p.id == id) {
            return Some(preset);
        }

        if let Some(record) = self.local_records().into_iter().find(|r| r.id == id) {
            return Some(Preset::from_record(record, PresetOrigin::LocalOnly));
        }

        match self.api.fetch_preset(id).await {
            Ok(Some(record)) => Some(Preset::from_record(record, PresetOrigin::Server)),
            Ok(None) => None,
            Err(e) => {
                warn!(preset_id = id; "preset fetch failed: {e}");
                None
            }
        }
    }

    /// Stores the current config as a named preset.
    ///
    /// Project specific keys are stripped first. The server tier is tried
    /// first and a failure drops the preset into local storage instead, the
    /// outcome says which tier took it.
    ///
    /// # Errors
    /// Only when both the server and the local file refuse the preset.
    pub async fn save(
        &self,
        name: &str,
        description: &str,
        config: &Map<String, Value>,
    ) -> Result<SaveOutcome, PanelError> {
        let portable = strip_project_fields(config);
        let model_type = portable
            .get("model_type")
            .and_then(Value::as_str)
            .unwrap_or("custom")
            .to_owned();
        let upload = PresetUpload {
            name: name.to_owned(),
            description: description.to_owned(),
            model_type,
            config: portable,
        };

        match self.api.save_preset(&upload).await {
            Ok(record) => {
                debug!(preset_id = record.id.as_str(); "preset saved on server");
                Ok(SaveOutcome {
                    preset: Preset::from_record(record, PresetOrigin::Server),
                    fallback: None,
                })
            }
            Err(e) => {
                warn!("preset save falling back to local storage: {e}");
                let record = self.stash_local(upload)?;
                Ok(SaveOutcome {
                    preset: Preset::from_record(record, PresetOrigin::LocalOnly),
                    fallback: Some(e.to_string()),
                })
            }
        }
    }

    /// Deletes one preset from whichever tier holds it.
    ///
    /// # Errors
    /// [`PanelError::BuiltinImmutable`] for built in presets, and any
    /// server or storage failure. State is untouched on error.
    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome, PanelError> {
        if Self::builtins().iter().any(|p| p.id == id) {
            return Err(PanelError::BuiltinImmutable { id: id.to_owned() });
        }

        let mut records = self.local_records();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() != before {
            self.write_locals(&records)?;
            return Ok(DeleteOutcome::Deleted(PresetOrigin::LocalOnly));
        }

        match self.api.fetch_preset(id).await? {
            Some(record) if record.is_builtin => {
                return Err(PanelError::BuiltinImmutable { id: id.to_owned() });
            }
            Some(_) => {}
            None => return Ok(DeleteOutcome::Missing),
        }

        if self.api.delete_preset(id).await? {
            Ok(DeleteOutcome::Deleted(PresetOrigin::Server))
        } else {
            Ok(DeleteOutcome::Missing)
        }
    }

    fn local_records(&self) -> Vec<PresetRecord> {
        self.store
            .read::<Vec<PresetRecord>>(LOCAL_PRESETS)
            .unwrap_or_default()
    }

    fn write_locals(&self, records: &[PresetRecord]) -> Result<(), PanelError> {
        self.store
            .write(LOCAL_PRESETS, &records)
            .map_err(|source| PanelError::Storage {
                record: LOCAL_PRESETS,
                source,
            })
    }

    fn stash_local(&self, upload: PresetUpload) -> Result<PresetRecord, PanelError> {
        let mut records = self.local_records();
        let record = PresetRecord {
            id: next_local_id(&records),
            name: upload.name,
            description: upload.description,
            model_type: upload.model_type,
            config: upload.config,
            is_builtin: false,
        };

        records.push(record.clone());
        self.write_locals(&records)?;

        Ok(record)
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => unreachable!("builtin preset configs are object literals"),
    }
}

fn next_local_id(existing: &[PresetRecord]) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let mut id = format!("local-{millis}");
    let mut bump = 1u32;
    while existing.iter().any(|r| r.id == id) {
        id = format!("local-{millis}-{bump}");
        bump += 1;
    }

    id
}
