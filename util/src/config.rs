//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and mutation for testing or overrides in runtime environments.

use std::env;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock, RwLockReadGuard};

use crate::grading_config::GradingConfig;

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub staging_root: String,
    pub rubric_preset_dir: Option<String>,
    pub grading_config_path: Option<String>,
    pub batch_concurrency: usize,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "doc-grader".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "grader=info".into()),
            staging_root: env::var("STAGING_ROOT").unwrap_or_else(|_| "./staging".into()),
            rubric_preset_dir: env::var("RUBRIC_PRESET_DIR").ok().filter(|s| !s.is_empty()),
            grading_config_path: env::var("GRADING_CONFIG").ok().filter(|s| !s.is_empty()),
            batch_concurrency: env::var("BATCH_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(5),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    pub fn global() -> RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            if let Ok(mut guard) = lock.write() {
                *guard = AppConfig::from_env();
            }
        }
    }

    /// Absolute staging root. Relative values resolve against the current directory.
    pub fn staging_root_path(&self) -> PathBuf {
        let p = PathBuf::from(&self.staging_root);
        if p.is_absolute() {
            p
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(p)
        }
    }

    /// Loads the grading configuration referenced by `GRADING_CONFIG`, or the
    /// defaults when none is set. The env concurrency overrides the file's.
    pub fn grading_config(&self) -> Result<GradingConfig, String> {
        let mut cfg = match &self.grading_config_path {
            Some(path) => GradingConfig::load_from_json(path)?,
            None => GradingConfig::default_config(),
        };
        if env::var("BATCH_CONCURRENCY").is_ok() {
            cfg.batch.concurrency = self.batch_concurrency;
        }
        Ok(cfg.sanitize())
    }

    /// Generic internal setter for any field in the config.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        if let Ok(mut guard) = lock.write() {
            setter(&mut guard);
        }
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_staging_root(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.staging_root = value.into());
    }

    pub fn set_rubric_preset_dir(value: Option<String>) {
        AppConfig::set_field(|cfg| cfg.rubric_preset_dir = value);
    }

    pub fn set_batch_concurrency(value: usize) {
        AppConfig::set_field(|cfg| cfg.batch_concurrency = value.max(1));
    }
}
