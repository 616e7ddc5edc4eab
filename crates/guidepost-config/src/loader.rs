use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use guidepost_core::GuidepostError;

use crate::schema::GuidepostConfig;

/// Loads and reloads the Guidepost configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<GuidepostConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > GUIDEPOST_CONFIG env >
    /// ~/.guidepost/guidepost.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("GUIDEPOST_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".guidepost")
            .join("guidepost.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> guidepost_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<GuidepostConfig>(&raw).map_err(|e| {
                GuidepostError::Config(format!("failed to parse {}: {}", config_path.display(), e))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            GuidepostConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Log warnings, fail on errors.
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(GuidepostError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> GuidepostConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<GuidepostConfig>> {
        Arc::clone(&self.config)
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (GUIDEPOST_CORPUS_ROOT, GUIDEPOST_DB_PATH, ...).
    fn apply_env_overrides(mut config: GuidepostConfig) -> GuidepostConfig {
        if let Ok(v) = std::env::var("GUIDEPOST_CORPUS_ROOT") {
            config.corpus.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GUIDEPOST_DB_PATH") {
            config.storage.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GUIDEPOST_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("GUIDEPOST_MIN_CONFIDENCE") {
            if let Ok(value) = v.parse::<f32>() {
                config.matcher.min_confidence = value;
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> guidepost_core::Result<()> {
        if !self.config_path.exists() {
            return Err(GuidepostError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let raw = std::fs::read_to_string(&self.config_path)?;
        let new_config = toml::from_str::<GuidepostConfig>(&raw).map_err(|e| {
            GuidepostError::Config(format!(
                "failed to parse {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        let new_config = Self::apply_env_overrides(new_config);
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(&dir.path().join("absent.toml"))).unwrap();
        let config = loader.get();
        assert_eq!(config.corpus.root, PathBuf::from("corpus"));
        assert_eq!(config.validator.entry_points, vec!["start".to_string()]);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guidepost.toml");
        std::fs::write(
            &path,
            "[corpus]\nroot = \"/srv/nodes\"\n\n[matcher]\nmin_confidence = 0.4\n",
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        let config = loader.get();
        assert_eq!(config.corpus.root, PathBuf::from("/srv/nodes"));
        assert!((config.matcher.min_confidence - 0.4).abs() < 1e-6);
        // Untouched sections stay at their defaults.
        assert_eq!(config.engine.max_steps_per_turn, 64);
    }

    #[test]
    fn invalid_values_fail_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guidepost.toml");
        std::fs::write(&path, "[matcher]\nmin_confidence = 7.0\n").unwrap();
        assert!(ConfigLoader::load(Some(&path)).is_err());
    }

    #[test]
    fn reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guidepost.toml");
        std::fs::write(&path, "[engine]\nmax_steps_per_turn = 10\n").unwrap();

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().engine.max_steps_per_turn, 10);

        std::fs::write(&path, "[engine]\nmax_steps_per_turn = 20\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().engine.max_steps_per_turn, 20);
    }
}
