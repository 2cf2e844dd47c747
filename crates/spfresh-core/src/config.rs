//! `spfresh-core` Configuration Module
//!
//! Provides configuration file support via `spfresh.toml`, environment variables,
//! and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (explicit thread counts passed to batch calls)
//! 2. Environment variables (`SPFRESH_*`, nested keys separated by `__`)
//! 3. Configuration file (`spfresh.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Engine build configuration section.
///
/// Mirrors the engine's sectioned build parameters (`Base`, `SelectHead`,
/// `BuildHead`, `BuildSSDIndex`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Head index algorithm.
    pub algorithm: String,
    /// Distance calculation method.
    pub distance: String,
    /// Fraction of vectors selected as posting-list heads.
    pub select_head_ratio: f64,
    /// Head graph refine iterations.
    pub refine_iterations: usize,
    /// Posting page limit used while building.
    pub posting_page_limit: usize,
    /// Posting page limit used while searching.
    pub search_posting_page_limit: usize,
    /// Internal candidate count used while building.
    pub internal_result_num: usize,
    /// Internal candidate count used while searching.
    pub search_internal_result_num: usize,
    /// Default result count baked into the engine.
    pub result_num: usize,
    /// Maximum distance ratio for posting-list pruning.
    pub max_dist_ratio: f64,
    /// Scratch directory for the engine build.
    pub tmp_dir: String,
    /// Build thread count used when `build` is passed 0 (0 = auto).
    pub threads: usize,
    /// Normalization flag used by `FreshIndex::build_default`.
    pub normalize: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            algorithm: "BKT".to_string(),
            distance: "L2".to_string(),
            select_head_ratio: 0.2,
            refine_iterations: 3,
            posting_page_limit: 12,
            search_posting_page_limit: 3,
            internal_result_num: 64,
            search_internal_result_num: 32,
            result_num: 10,
            max_dist_ratio: 8.0,
            tmp_dir: "./data/tmp/".to_string(),
            threads: 8,
            normalize: true,
        }
    }
}

/// Default worker counts for batch operations.
///
/// `0` means "use available parallelism".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Insert workers.
    pub insert: usize,
    /// Delete workers.
    pub delete: usize,
    /// Search workers.
    pub search: usize,
}

impl ThreadsConfig {
    /// Resolves a requested worker count against a configured default.
    ///
    /// A non-zero request wins; otherwise the configured value is used, and a
    /// configured `0` falls back to the machine's available parallelism.
    #[must_use]
    pub fn resolve(requested: usize, configured: usize) -> usize {
        if requested > 0 {
            return requested;
        }
        if configured > 0 {
            return configured;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

/// Search configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum `k` accepted by `search`.
    pub max_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_k: 1000 }
    }
}

/// Limits configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum vector dimension.
    pub max_dimension: usize,
    /// Maximum number of worker threads per batch.
    pub max_threads: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 4096,
            max_threads: 256,
        }
    }
}

/// Main `spfresh-core` configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FreshConfig {
    /// Engine build configuration.
    pub build: BuildConfig,
    /// Default worker counts.
    pub threads: ThreadsConfig,
    /// Search configuration.
    pub search: SearchConfig,
    /// Limits configuration.
    pub limits: LimitsConfig,
}

impl FreshConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("spfresh.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SPFRESH_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.build.select_head_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "build.select_head_ratio".to_string(),
                message: format!("value {ratio} is out of range (0, 1]"),
            });
        }

        if self.build.max_dist_ratio <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "build.max_dist_ratio".to_string(),
                message: format!("value {} must be positive", self.build.max_dist_ratio),
            });
        }

        let valid_distances = ["L2", "Cosine", "InnerProduct"];
        if !valid_distances.contains(&self.build.distance.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "build.distance".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.build.distance, valid_distances
                ),
            });
        }

        let valid_algorithms = ["BKT", "KDT"];
        if !valid_algorithms.contains(&self.build.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "build.algorithm".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.build.algorithm, valid_algorithms
                ),
            });
        }

        if self.search.max_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search.max_k".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }

        if self.limits.max_dimension == 0 || self.limits.max_dimension > 65536 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_dimension".to_string(),
                message: format!(
                    "value {} is out of range [1, 65536]",
                    self.limits.max_dimension
                ),
            });
        }

        if self.limits.max_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_threads".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }

        for (key, value) in [
            ("threads.insert", self.threads.insert),
            ("threads.delete", self.threads.delete),
            ("threads.search", self.threads.search),
            ("build.threads", self.build.threads),
        ] {
            if value > self.limits.max_threads {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!(
                        "value {value} exceeds limits.max_threads ({})",
                        self.limits.max_threads
                    ),
                });
            }
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
