use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `guidepost.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidepostConfig {
    pub corpus: CorpusConfig,
    pub matcher: MatcherConfig,
    pub engine: EngineSection,
    pub session: SessionConfig,
    pub validator: ValidatorSection,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

// ── Corpus ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding the NODE.md tree.
    pub root: PathBuf,
    /// Hot-reload the corpus when node files change on disk.
    pub watch: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("corpus"),
            watch: false,
        }
    }
}

// ── Matcher ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates below this confidence are dropped (0.0 - 1.0).
    pub min_confidence: f32,
    /// Confidence band within which two candidates tie (0.0 - 1.0).
    pub tie_epsilon: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            tie_epsilon: 0.1,
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Steps per turn after which the Investigation Diary opens for
    /// Secondary/Advanced content.
    pub complexity_threshold: usize,
    /// Hard ceiling on steps per turn.
    pub max_steps_per_turn: usize,
    /// TTL in seconds for facts cached by discover steps.
    pub cache_ttl_secs: i64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            complexity_threshold: 8,
            max_steps_per_turn: 64,
            cache_ttl_secs: 300,
        }
    }
}

// ── Session ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are expired. 0 disables expiry.
    pub max_idle_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_idle_minutes: 240,
        }
    }
}

// ── Validator ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorSection {
    /// Node ids every other node must be reachable from.
    pub entry_points: Vec<String>,
    /// Maximum load/continue hops from any reachable node to a halt.
    pub max_depth: usize,
    /// Node ids allowed to be unreachable (drafts, staging areas).
    pub orphan_allowlist: Vec<String>,
}

impl Default for ValidatorSection {
    fn default() -> Self {
        Self {
            entry_points: vec!["start".into()],
            max_depth: 50,
            orphan_allowlist: vec![],
        }
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database holding sessions and diaries.
    pub db_path: PathBuf,
    /// Persist sessions across restarts. When false, everything is
    /// in-memory and lost on exit.
    pub persist_sessions: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("guidepost.db"),
            persist_sessions: true,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stderr only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

impl Default for GuidepostConfig {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            matcher: MatcherConfig::default(),
            engine: EngineSection::default(),
            session: SessionConfig::default(),
            validator: ValidatorSection::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl GuidepostConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Matcher thresholds ───
        if !(0.0..=1.0).contains(&self.matcher.min_confidence) {
            warnings.push(ConfigWarning {
                field: "matcher.min_confidence".into(),
                message: format!(
                    "min_confidence {} is out of range",
                    self.matcher.min_confidence
                ),
                severity: WarningSeverity::Error,
                hint: Some("Confidence is a fraction between 0.0 and 1.0".into()),
            });
        }
        if !(0.0..=1.0).contains(&self.matcher.tie_epsilon) {
            warnings.push(ConfigWarning {
                field: "matcher.tie_epsilon".into(),
                message: format!("tie_epsilon {} is out of range", self.matcher.tie_epsilon),
                severity: WarningSeverity::Error,
                hint: Some("The tie band is a fraction between 0.0 and 1.0".into()),
            });
        } else if self.matcher.tie_epsilon > 0.5 {
            warnings.push(ConfigWarning {
                field: "matcher.tie_epsilon".into(),
                message: format!(
                    "tie_epsilon {} is very wide — most matches will tie on tier alone",
                    self.matcher.tie_epsilon
                ),
                severity: WarningSeverity::Warning,
                hint: Some("Typical values are 0.05 - 0.15".into()),
            });
        }

        // ── Engine limits ───
        if self.engine.max_steps_per_turn == 0 {
            warnings.push(ConfigWarning {
                field: "engine.max_steps_per_turn".into(),
                message: "max_steps_per_turn is 0 — no workflow can execute".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 64".into()),
            });
        } else if self.engine.complexity_threshold >= self.engine.max_steps_per_turn {
            warnings.push(ConfigWarning {
                field: "engine.complexity_threshold".into(),
                message: "complexity_threshold is at or above max_steps_per_turn — the diary can never open".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Lower the threshold or raise the step ceiling".into()),
            });
        }
        if self.engine.cache_ttl_secs < 0 {
            warnings.push(ConfigWarning {
                field: "engine.cache_ttl_secs".into(),
                message: format!("cache_ttl_secs {} is negative", self.engine.cache_ttl_secs),
                severity: WarningSeverity::Error,
                hint: Some("Use 0 to disable caching".into()),
            });
        }

        // ── Validator ───
        if self.validator.entry_points.is_empty() {
            warnings.push(ConfigWarning {
                field: "validator.entry_points".into(),
                message: "no entry points — every node would be an orphan".into(),
                severity: WarningSeverity::Error,
                hint: Some("List at least one root node id, e.g. [\"start\"]".into()),
            });
        }
        if self.validator.max_depth == 0 {
            warnings.push(ConfigWarning {
                field: "validator.max_depth".into(),
                message: "max_depth is 0 — only halting entry points would pass".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 50".into()),
            });
        }

        // ── Session expiry ───
        if self.session.max_idle_minutes < 0 {
            warnings.push(ConfigWarning {
                field: "session.max_idle_minutes".into(),
                message: format!(
                    "max_idle_minutes {} is negative",
                    self.session.max_idle_minutes
                ),
                severity: WarningSeverity::Error,
                hint: Some("Use 0 to disable idle expiry".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!(
                "Configuration errors:\n  • {}",
                errors.join("\n  • ")
            ));
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let config = GuidepostConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn out_of_range_confidence_is_an_error() {
        let mut config = GuidepostConfig::default();
        config.matcher.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_above_ceiling_warns() {
        let mut config = GuidepostConfig::default();
        config.engine.complexity_threshold = 100;
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.field == "engine.complexity_threshold"));
    }

    #[test]
    fn empty_entry_points_is_an_error() {
        let mut config = GuidepostConfig::default();
        config.validator.entry_points.clear();
        assert!(config.validate().is_err());
    }
}
