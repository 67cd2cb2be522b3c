use std::{
    fmt, io,
    time::{Duration, Instant},
};

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::{FORM_CONFIG, StateDir};

/// How long after the last keystroke the draft is flushed to disk.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// The full editable launch configuration.
///
/// This is a superset of every preset bag. Unknown keys in a bag are
/// ignored on load, keys a bag misses fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TuneDraft {
    pub base_model: String,
    pub model_type: String,
    pub dataset_path: String,
    pub output_dir: String,
    pub project_name: String,
    pub learning_rate: f64,
    pub epochs: u32,
    pub batch_size: u32,
    pub grad_accum: u32,
    pub max_seq_len: u32,
    pub warmup_ratio: f64,
    pub weight_decay: f64,
    pub lora_rank: u32,
    pub lora_alpha: u32,
    pub lora_dropout: f64,
    pub save_steps: u32,
    pub logging_steps: u32,
    pub mixed_precision: String,
    pub seed: Option<u64>,
    pub wandb_project: String,
    pub wandb_api_key: String,
    pub resume_from: String,
}

impl Default for TuneDraft {
    fn default() -> Self {
        Self {
            base_model: String::new(),
            model_type: "lora".into(),
            dataset_path: String::new(),
            output_dir: String::new(),
            project_name: String::new(),
            learning_rate: 2e-4,
            epochs: 3,
            batch_size: 4,
            grad_accum: 4,
            max_seq_len: 2048,
            warmup_ratio: 0.03,
            weight_decay: 0.001,
            lora_rank: 16,
            lora_alpha: 32,
            lora_dropout: 0.05,
            save_steps: 100,
            logging_steps: 10,
            mixed_precision: "fp16".into(),
            seed: Some(42),
            wandb_project: String::new(),
            wandb_api_key: String::new(),
            resume_from: String::new(),
        }
    }
}

impl TuneDraft {
    fn uses_adapter(&self) -> bool {
        matches!(self.model_type.as_str(), "lora" | "qlora")
    }
}

/// One failed validation rule, tied to the field that broke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Checks every rule and returns every failure, not just the first.
pub fn validate(draft: &TuneDraft) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let mut fail = |field, message: &str| {
        errors.push(FieldError {
            field,
            message: message.to_owned(),
        });
    };

    if draft.base_model.trim().is_empty() {
        fail("base_model", "required");
    }
    if draft.dataset_path.trim().is_empty() {
        fail("dataset_path", "required");
    }
    if draft.output_dir.trim().is_empty() {
        fail("output_dir", "required");
    }
    if !matches!(draft.model_type.as_str(), "lora" | "qlora" | "full") {
        fail("model_type", "must be one of lora, qlora, full");
    }
    if !(draft.learning_rate.is_finite() && draft.learning_rate > 0.0) {
        fail("learning_rate", "must be a positive number");
    } else if draft.learning_rate > 1.0 {
        fail("learning_rate", "must be at most 1");
    }
    if draft.epochs == 0 {
        fail("epochs", "must be at least 1");
    }
    if draft.batch_size == 0 {
        fail("batch_size", "must be at least 1");
    }
    if draft.grad_accum == 0 {
        fail("grad_accum", "must be at least 1");
    }
    if draft.max_seq_len < 16 {
        fail("max_seq_len", "must be at least 16");
    }
    if !(0.0..=1.0).contains(&draft.warmup_ratio) {
        fail("warmup_ratio", "must be between 0 and 1");
    }
    if !(0.0..=1.0).contains(&draft.weight_decay) {
        fail("weight_decay", "must be between 0 and 1");
    }
    if draft.uses_adapter() {
        if draft.lora_rank == 0 {
            fail("lora_rank", "must be at least 1 for adapter tunes");
        }
        if !(0.0..1.0).contains(&draft.lora_dropout) {
            fail("lora_dropout", "must be below 1 and not negative");
        }
    }
    if !matches!(draft.mixed_precision.as_str(), "fp16" | "bf16" | "off") {
        fail("mixed_precision", "must be one of fp16, bf16, off");
    }

    errors
}

/// The launch form between keystrokes: current draft, validation verdict
/// and the bookkeeping for debounced autosave.
#[derive(Debug)]
pub struct FormState {
    draft: TuneDraft,
    errors: Vec<FieldError>,
    dirty: bool,
    last_edit: Option<Instant>,
    debounce: Duration,
}

impl FormState {
    /// Restores the last persisted draft, or starts from defaults when no
    /// usable record exists.
    pub fn load(store: &StateDir) -> Self {
        let draft = store.read::<TuneDraft>(FORM_CONFIG).unwrap_or_default();
        let errors = validate(&draft);

        Self {
            draft,
            errors,
            dirty: false,
            last_edit: None,
            debounce: DEBOUNCE,
        }
    }

    /// Overrides the autosave window, mainly so tests run in milliseconds.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn draft(&self) -> &TuneDraft {
        &self.draft
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether launching is allowed. Persisting never checks this.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Applies one edit and restarts the autosave clock.
    pub fn edit(&mut self, now: Instant, change: impl FnOnce(&mut TuneDraft)) {
        change(&mut self.draft);
        self.touch(now);
    }

    /// Overwrites the whole draft from a preset bag.
    ///
    /// Keys the bag misses revert to defaults, nothing is merged with the
    /// previous draft. A bag that does not fit the form at all falls back
    /// to plain defaults.
    pub fn apply_preset(&mut self, now: Instant, config: &Map<String, Value>) {
        let mut merged = draft_map(&TuneDraft::default());
        for (key, value) in config {
            merged.insert(key.clone(), value.clone());
        }

        self.draft = match serde_json::from_value(Value::Object(merged)) {
            Ok(draft) => draft,
            Err(e) => {
                warn!("preset bag does not fit the form, using defaults: {e}");
                TuneDraft::default()
            }
        };
        self.touch(now);
    }

    /// Flushes the draft if it is dirty and the debounce window has passed.
    ///
    /// # Returns
    /// Whether a write actually happened. On a storage failure the draft
    /// stays dirty so a later tick tries again.
    pub fn autosave(&mut self, now: Instant, store: &StateDir) -> io::Result<bool> {
        if !self.flush_due(now) {
            return Ok(false);
        }

        store.write(FORM_CONFIG, &self.draft)?;
        self.dirty = false;

        Ok(true)
    }

    /// The draft as the opaque bag that launches and preset saves use.
    pub fn config_bag(&self) -> Map<String, Value> {
        draft_map(&self.draft)
    }

    fn touch(&mut self, now: Instant) {
        self.errors = validate(&self.draft);
        self.dirty = true;
        self.last_edit = Some(now);
    }

    fn flush_due(&self, now: Instant) -> bool {
        let Some(last_edit) = self.last_edit else {
            return false;
        };

        self.dirty && now.duration_since(last_edit) >= self.debounce
    }
}

fn draft_map(draft: &TuneDraft) -> Map<String, Value> {
    match serde_json::to_value(draft) {
        Ok(Value::Object(map)) => map,
        _ => unreachable!("a draft always serializes to an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(store: &StateDir) -> FormState {
        FormState::load(store).with_debounce(Duration::from_millis(500))
    }

    fn temp_store() -> (tempfile::TempDir, StateDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateDir::new(dir.path());
        (dir, store)
    }

    fn filled(draft: &mut TuneDraft) {
        draft.base_model = "meta-llama/Llama-3.2-1B".into();
        draft.dataset_path = "/data/chat.jsonl".into();
        draft.output_dir = "/runs/chat".into();
    }

    #[test]
    fn defaults_only_miss_the_required_paths() {
        let errors = validate(&TuneDraft::default());
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();

        assert_eq!(fields, vec!["base_model", "dataset_path", "output_dir"]);
    }

    #[test]
    fn bad_numbers_are_reported_per_field() {
        let mut draft = TuneDraft::default();
        filled(&mut draft);
        draft.learning_rate = 0.0;
        draft.epochs = 0;
        draft.warmup_ratio = 1.5;

        let errors = validate(&draft);
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();

        assert_eq!(fields, vec!["learning_rate", "epochs", "warmup_ratio"]);
    }

    #[test]
    fn adapter_rules_skip_full_tunes() {
        let mut draft = TuneDraft::default();
        filled(&mut draft);
        draft.lora_rank = 0;

        assert!(validate(&draft).iter().any(|e| e.field == "lora_rank"));

        draft.model_type = "full".into();
        assert!(validate(&draft).iter().all(|e| e.field != "lora_rank"));
    }

    #[test]
    fn autosave_waits_out_the_debounce() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);
        let t0 = Instant::now();

        form.edit(t0, |d| d.epochs = 7);

        assert!(!form.autosave(t0 + Duration::from_millis(300), &store).unwrap());
        assert!(form.autosave(t0 + Duration::from_millis(500), &store).unwrap());
        assert!(!form.dirty());

        // Nothing new to write once flushed.
        assert!(!form.autosave(t0 + Duration::from_millis(900), &store).unwrap());
    }

    #[test]
    fn rapid_edits_collapse_into_one_write() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);
        let t0 = Instant::now();

        form.edit(t0, |d| d.epochs = 5);
        form.edit(t0 + Duration::from_millis(200), |d| d.epochs = 6);
        form.edit(t0 + Duration::from_millis(400), |d| d.epochs = 7);

        let mut writes = 0;
        for tick_ms in [450, 700, 900, 1100] {
            let due = t0 + Duration::from_millis(tick_ms);
            if form.autosave(due, &store).unwrap() {
                writes += 1;
            }
        }

        assert_eq!(writes, 1);
        assert_eq!(store.read::<TuneDraft>(FORM_CONFIG).unwrap().epochs, 7);
    }

    #[test]
    fn invalid_drafts_are_persisted_too() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);
        let t0 = Instant::now();

        form.edit(t0, |d| d.learning_rate = -1.0);
        assert!(!form.is_valid());

        assert!(form.autosave(t0 + Duration::from_secs(1), &store).unwrap());

        let restored = fresh(&store);
        assert_eq!(restored.draft().learning_rate, -1.0);
        assert!(!restored.is_valid());
    }

    #[test]
    fn restore_on_mount_round_trips() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);
        let t0 = Instant::now();

        form.edit(t0, |d| {
            filled(d);
            d.lora_rank = 64;
        });
        form.autosave(t0 + Duration::from_secs(1), &store).unwrap();

        let restored = fresh(&store);
        assert_eq!(restored.draft(), form.draft());
        assert!(!restored.dirty());
    }

    #[test]
    fn apply_preset_reverts_unset_fields() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);
        let t0 = Instant::now();

        form.edit(t0, |d| d.epochs = 9);

        let mut bag = Map::new();
        bag.insert("learning_rate".into(), serde_json::json!(5e-5));
        form.apply_preset(t0 + Duration::from_millis(10), &bag);

        assert_eq!(form.draft().learning_rate, 5e-5);
        assert_eq!(form.draft().epochs, TuneDraft::default().epochs);
        assert!(form.dirty());
    }

    #[test]
    fn unknown_bag_keys_are_ignored() {
        let (_dir, store) = temp_store();
        let mut form = fresh(&store);

        let mut bag = Map::new();
        bag.insert("epochs".into(), serde_json::json!(2));
        bag.insert("flash_attention".into(), serde_json::json!(true));
        form.apply_preset(Instant::now(), &bag);

        assert_eq!(form.draft().epochs, 2);
    }

    #[test]
    fn config_bag_carries_every_field() {
        let form = FormState::load(&temp_store().1);
        let bag = form.config_bag();

        assert!(bag.contains_key("base_model"));
        assert!(bag.contains_key("learning_rate"));
        assert!(bag.contains_key("mixed_precision"));
    }
}
