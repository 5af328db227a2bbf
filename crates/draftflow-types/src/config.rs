//! Theme configuration for Draftflow sessions.
//!
//! A `ThemeConfig` is resolved once at session start and threaded
//! explicitly into every phase and routing call. There are no
//! module-level mutable singletons and no per-call-site theme branching:
//! the pipeline for a theme is built from this value, once.

use serde::{Deserialize, Serialize};

/// Immutable per-theme configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Theme name (registry key).
    pub theme: String,
    /// Upper bound on revision cycles per artifact before escalation.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Evaluator score an artifact must reach to be offered without an
    /// escalation flag. Configurable, never inferred.
    #[serde(default = "default_quality_bar")]
    pub quality_bar: f32,
    /// Generator model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-call timeout for generator requests, in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub prompts: ArtifactPrompts,
}

fn default_max_revisions() -> u32 {
    3
}

fn default_quality_bar() -> f32 {
    0.7
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generation_timeout_secs() -> u64 {
    60
}

impl ThemeConfig {
    /// A theme with all defaults, used when no theme file overrides it.
    pub fn named(theme: &str) -> Self {
        Self {
            theme: theme.to_string(),
            max_revisions: default_max_revisions(),
            quality_bar: default_quality_bar(),
            model: default_model(),
            generation_timeout_secs: default_generation_timeout_secs(),
            retry: RetryPolicy::default(),
            prompts: ArtifactPrompts::default(),
        }
    }
}

/// Bounded exponential backoff policy for transient generator failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (1-based).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Prompt templates per artifact.
///
/// Templates receive the brief and (on revision) the combined human
/// feedback and evaluator findings; the content rules themselves are an
/// external concern and deliberately not modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPrompts {
    #[serde(default = "default_outline_prompt")]
    pub outline: String,
    #[serde(default = "default_article_prompt")]
    pub article: String,
    #[serde(default = "default_evaluator_prompt")]
    pub evaluator: String,
}

fn default_outline_prompt() -> String {
    "Draft a structured outline for the brief below. Return JSON with a \
     'sections' array."
        .to_string()
}

fn default_article_prompt() -> String {
    "Write the full article following the approved outline. Return JSON \
     with a 'body' string."
        .to_string()
}

fn default_evaluator_prompt() -> String {
    "Score the draft between 0 and 1 and list concrete issues. Return \
     JSON with 'score' and 'issues'."
        .to_string()
}

impl Default for ArtifactPrompts {
    fn default() -> Self {
        Self {
            outline: default_outline_prompt(),
            article: default_article_prompt(),
            evaluator: default_evaluator_prompt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_from_minimal_toml() {
        let config: ThemeConfig = toml::from_str(r#"theme = "editorial""#).unwrap();
        assert_eq!(config.theme, "editorial");
        assert_eq!(config.max_revisions, 3);
        assert!((config.quality_bar - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.prompts.outline.contains("outline"));
    }

    #[test]
    fn overrides_respected() {
        let config: ThemeConfig = toml::from_str(
            r#"
theme = "tech-brief"
max_revisions = 5
quality_bar = 0.85
model = "gpt-4o"

[retry]
max_attempts = 2
base_delay_ms = 100
"#,
        )
        .unwrap();
        assert_eq!(config.max_revisions, 5);
        assert!((config.quality_bar - 0.85).abs() < f32::EPSILON);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_delay_ms, 8_000);
    }

    #[test]
    fn named_theme_uses_defaults() {
        let config = ThemeConfig::named("editorial");
        assert_eq!(config.theme, "editorial");
        assert_eq!(config.generation_timeout_secs, 60);
    }
}
