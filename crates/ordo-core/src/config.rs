//! Lifecycle configuration.
//!
//! The configuration is usually embedded in an application's TOML settings:
//!
//! ```toml
//! thread_checks = true
//! trace_timings = false
//! disabled = ["Sound", "Joystick"]
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::logging::targets;

/// Errors raised while loading a [`LifecycleConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read lifecycle configuration '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML document is malformed or has wrongly typed keys.
    #[error("invalid lifecycle configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings that control how a [`ModuleRegistry`](crate::ModuleRegistry)
/// drives its modules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Panic when lifecycle calls leave the startup thread.
    ///
    /// Defaults to `true` in debug builds.
    pub thread_checks: bool,
    /// Wrap every `on_init` call in a `tracing` span for profiling.
    pub trace_timings: bool,
    /// Catalog module names skipped by
    /// [`register_modules`](crate::ModuleRegistry::register_modules).
    pub disabled: Vec<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            thread_checks: cfg!(debug_assertions),
            trace_timings: false,
            disabled: Vec::new(),
        }
    }
}

impl LifecycleConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            target: targets::CONFIG,
            path = %path.display(),
            disabled = config.disabled.len(),
            "loaded lifecycle configuration"
        );
        Ok(config)
    }

    /// Disable a catalog module by name.
    pub fn with_disabled(mut self, name: impl Into<String>) -> Self {
        self.disabled.push(name.into());
        self
    }

    /// Enable or disable thread checks.
    pub fn with_thread_checks(mut self, enabled: bool) -> Self {
        self.thread_checks = enabled;
        self
    }

    /// Enable or disable per-module timing spans.
    pub fn with_trace_timings(mut self, enabled: bool) -> Self {
        self.trace_timings = enabled;
        self
    }

    /// Returns `true` if the named module is disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}
