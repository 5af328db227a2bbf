//! Declarative state store: field registry, per-key reducers, patch merge.
//!
//! Phases never mutate a session directly. They return a [`StatePatch`]
//! and the engine merges it through [`FieldRegistry::apply_patch`], so
//! every write goes through the reducer declared for its key. A patch
//! containing an undeclared key is rejected whole, before any key is
//! merged.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use draftflow_types::error::EngineError;
use draftflow_types::session::{Artifact, ErrorRecord, Session};

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A keyed set of field updates produced by one phase execution.
///
/// Keys are independent; merge order within a patch does not matter.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    entries: BTreeMap<String, Value>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for StatePatch {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

/// Merge behavior for one declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Incoming value replaces the stored value, including explicit null.
    Replace,
    /// Stored value is a list; incoming values are appended in order.
    Append,
    /// Incoming null is ignored; any other value replaces.
    MergeNonNull,
}

/// Declaration of one session field: how it merges and what it starts as.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub reducer: Reducer,
    pub default: Value,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The closed set of session fields and their merge semantics.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: BTreeMap<String, FieldSpec>,
}

/// Append-only list of error records, cleared per phase on later success.
pub const ERRORS_KEY: &str = "errors";

/// Cache of the most recent checkpoint decision's edits, kept so a
/// terminal failure after submission never discards human input.
pub const LAST_DECISION_EDITS_KEY: &str = "last_decision_edits";

impl FieldRegistry {
    /// The field set for the editorial pipeline.
    pub fn standard() -> Self {
        let mut fields = BTreeMap::new();
        let mut declare = |key: &str, reducer: Reducer, default: Value| {
            fields.insert(
                key.to_string(),
                FieldSpec { reducer, default },
            );
        };

        declare("brief", Reducer::Replace, Value::Null);
        declare("source_notes", Reducer::MergeNonNull, Value::Null);
        declare("style_guide", Reducer::MergeNonNull, Value::Null);
        declare("assembled_document", Reducer::Replace, Value::Null);
        declare(LAST_DECISION_EDITS_KEY, Reducer::Replace, Value::Null);
        declare(ERRORS_KEY, Reducer::Append, Value::Array(Vec::new()));

        for artifact in [Artifact::Outline, Artifact::Article] {
            declare(&artifact.value_key(), Reducer::Replace, Value::Null);
            declare(&artifact.approved_key(), Reducer::Replace, Value::Bool(false));
            declare(
                &artifact.revision_count_key(),
                Reducer::Replace,
                Value::from(0u32),
            );
            declare(&artifact.feedback_key(), Reducer::Replace, Value::Null);
            declare(&artifact.previous_key(), Reducer::Replace, Value::Null);
            declare(&artifact.evaluation_key(), Reducer::Replace, Value::Null);
        }

        Self { fields }
    }

    pub fn reducer(&self, key: &str) -> Option<Reducer> {
        self.fields.get(key).map(|spec| spec.reducer)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Canonical zero-state for a new session.
    pub fn default_state(&self) -> HashMap<String, Value> {
        self.fields
            .iter()
            .map(|(key, spec)| (key.clone(), spec.default.clone()))
            .collect()
    }

    pub fn default_value(&self, key: &str) -> Option<Value> {
        self.fields.get(key).map(|spec| spec.default.clone())
    }

    /// Merge a patch into a field map.
    ///
    /// All keys are validated first; an unknown key rejects the whole
    /// patch and leaves the map untouched.
    pub fn apply_patch(
        &self,
        fields: &mut HashMap<String, Value>,
        patch: &StatePatch,
    ) -> Result<(), EngineError> {
        for key in patch.keys() {
            if !self.contains(key) {
                return Err(EngineError::InputValidation(format!(
                    "undeclared state key '{key}'"
                )));
            }
        }

        for (key, incoming) in patch.iter() {
            let spec = &self.fields[key];
            match spec.reducer {
                Reducer::Replace => {
                    fields.insert(key.to_string(), incoming.clone());
                }
                Reducer::Append => {
                    let slot = fields
                        .entry(key.to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !slot.is_array() {
                        *slot = Value::Array(Vec::new());
                    }
                    let list = slot.as_array_mut().unwrap();
                    match incoming {
                        Value::Array(items) => list.extend(items.iter().cloned()),
                        other => list.push(other.clone()),
                    }
                }
                Reducer::MergeNonNull => {
                    if !incoming.is_null() {
                        fields.insert(key.to_string(), incoming.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error-record helpers
// ---------------------------------------------------------------------------

/// Patch fragment appending one error record.
pub fn error_record_patch(record: &ErrorRecord) -> StatePatch {
    let entry = serde_json::to_value(record).unwrap_or(Value::Null);
    StatePatch::new().set(ERRORS_KEY, Value::Array(vec![entry]))
}

/// Drop stored error records for the given phases.
///
/// Called after a phase succeeds (clearing its own earlier failures) and
/// during rollback (clearing records from downstream phases).
pub fn clear_phase_errors(session: &mut Session, phases: &[&str]) {
    let Some(Value::Array(entries)) = session.fields.get_mut(ERRORS_KEY) else {
        return;
    };
    entries.retain(|entry| {
        entry
            .get("phase")
            .and_then(Value::as_str)
            .is_none_or(|phase| !phases.contains(&phase))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use draftflow_types::session::SessionStatus;
    use serde_json::json;
    use uuid::Uuid;

    fn session_with(fields: HashMap<String, Value>) -> Session {
        Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "intake".to_string(),
            fields,
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn default_state_covers_artifact_families() {
        let registry = FieldRegistry::standard();
        let state = registry.default_state();
        assert_eq!(state["outline"], Value::Null);
        assert_eq!(state["outline_approved"], json!(false));
        assert_eq!(state["article_revision_count"], json!(0));
        assert_eq!(state["errors"], json!([]));
        assert_eq!(state["last_decision_edits"], Value::Null);
    }

    #[test]
    fn replace_accepts_explicit_null() {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        registry
            .apply_patch(
                &mut fields,
                &StatePatch::new().set("outline", json!({"sections": ["a"]})),
            )
            .unwrap();
        assert_eq!(fields["outline"], json!({"sections": ["a"]}));

        registry
            .apply_patch(&mut fields, &StatePatch::new().set("outline", Value::Null))
            .unwrap();
        assert_eq!(fields["outline"], Value::Null);
    }

    #[test]
    fn merge_non_null_ignores_null() {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        registry
            .apply_patch(
                &mut fields,
                &StatePatch::new().set("style_guide", json!("AP style")),
            )
            .unwrap();
        registry
            .apply_patch(
                &mut fields,
                &StatePatch::new().set("style_guide", Value::Null),
            )
            .unwrap();
        assert_eq!(fields["style_guide"], json!("AP style"));
    }

    #[test]
    fn append_extends_in_order() {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        registry
            .apply_patch(
                &mut fields,
                &StatePatch::new().set(ERRORS_KEY, json!([{"phase": "a"}])),
            )
            .unwrap();
        registry
            .apply_patch(
                &mut fields,
                &StatePatch::new().set(ERRORS_KEY, json!([{"phase": "b"}])),
            )
            .unwrap();
        assert_eq!(
            fields[ERRORS_KEY],
            json!([{"phase": "a"}, {"phase": "b"}])
        );
    }

    #[test]
    fn unknown_key_rejects_whole_patch() {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        let patch = StatePatch::new()
            .set("outline", json!({"sections": ["a"]}))
            .set("outlnie", json!("typo"));
        let err = registry.apply_patch(&mut fields, &patch).unwrap_err();
        assert!(matches!(err, EngineError::InputValidation(_)));
        // Nothing merged, including the valid key.
        assert_eq!(fields["outline"], Value::Null);
    }

    #[test]
    fn clear_phase_errors_is_selective() {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        fields.insert(
            ERRORS_KEY.to_string(),
            json!([
                {"phase": "generate_outline", "kind": "transient_service", "detail": "x", "at": Utc::now()},
                {"phase": "generate_article", "kind": "schema_validation", "detail": "y", "at": Utc::now()},
            ]),
        );
        let mut session = session_with(fields);
        clear_phase_errors(&mut session, &["generate_outline"]);
        let errors = session.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase, "generate_article");
    }
}
