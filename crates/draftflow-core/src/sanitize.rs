//! Artifact sanitization and structural validation.
//!
//! Generator output passes through here before it is merged: empty
//! fragments are stripped, then the artifact is checked against its
//! structural contract. A value that fails after sanitization becomes a
//! schema-validation error for the phase.

use serde_json::Value;

use draftflow_types::session::Artifact;

/// Strip empty fragments from a generated artifact.
///
/// Outlines lose blank section titles; articles lose surrounding
/// whitespace on the body. Unknown extra keys are left alone.
pub fn sanitize(artifact: Artifact, mut value: Value) -> Value {
    match artifact {
        Artifact::Outline => {
            if let Some(sections) = value.get_mut("sections").and_then(Value::as_array_mut) {
                sections.retain(|s| {
                    s.as_str().is_none_or(|s| !s.trim().is_empty())
                });
                for section in sections.iter_mut() {
                    if let Value::String(s) = section {
                        *s = s.trim().to_string();
                    }
                }
            }
        }
        Artifact::Article => {
            if let Some(Value::String(body)) = value.get_mut("body") {
                *body = body.trim().to_string();
            }
        }
    }
    value
}

/// Check an artifact against its structural contract.
///
/// Returns the failure detail so the caller can build a phase-scoped
/// schema-validation error.
pub fn validate(artifact: Artifact, value: &Value) -> Result<(), String> {
    match artifact {
        Artifact::Outline => {
            let Some(sections) = value.get("sections").and_then(Value::as_array) else {
                return Err("outline is missing a 'sections' array".to_string());
            };
            if sections.is_empty() {
                return Err("outline has no sections".to_string());
            }
            if sections.iter().any(|s| !s.is_string()) {
                return Err("outline sections must be strings".to_string());
            }
            Ok(())
        }
        Artifact::Article => {
            let Some(body) = value.get("body").and_then(Value::as_str) else {
                return Err("article is missing a 'body' string".to_string());
            };
            if body.is_empty() {
                return Err("article body is empty".to_string());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outline_sanitize_strips_blank_sections() {
        let cleaned = sanitize(
            Artifact::Outline,
            json!({"sections": ["  hook ", "", "   ", "body"]}),
        );
        assert_eq!(cleaned, json!({"sections": ["hook", "body"]}));
    }

    #[test]
    fn outline_validation() {
        assert!(validate(Artifact::Outline, &json!({"sections": ["a"]})).is_ok());
        assert!(validate(Artifact::Outline, &json!({"sections": []})).is_err());
        assert!(validate(Artifact::Outline, &json!({"title": "x"})).is_err());
        assert!(validate(Artifact::Outline, &json!({"sections": [1, 2]})).is_err());
    }

    #[test]
    fn article_sanitize_then_validate() {
        let cleaned = sanitize(Artifact::Article, json!({"body": "  text  "}));
        assert_eq!(cleaned, json!({"body": "text"}));
        assert!(validate(Artifact::Article, &cleaned).is_ok());

        let empty = sanitize(Artifact::Article, json!({"body": "   "}));
        assert!(validate(Artifact::Article, &empty).is_err());
        assert!(validate(Artifact::Article, &json!({})).is_err());
    }
}
