//! Configuration for the riakbox harness.
//!
//! Configuration is loaded from environment variables with sensible defaults.
//! Node settings can be overridden from a TOML file:
//!
//! ```toml
//! [vm_args]
//! "-name" = "dev1@127.0.0.1"
//!
//! [app_config.riak_core]
//! web_port = 8098
//!
//! [app_config.riak_kv]
//! storage_backend = { atom = "riak_kv_bitcask_backend" }
//! ```

use riakbox_core::{default_bin_dir, ConfigMap, ServerOptions, LAUNCHER_NAME};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time allowed for the node to boot, in seconds.
pub const DEFAULT_START_TIMEOUT_SECS: u64 = 60;

/// Default time allowed for the listener after a restart, in seconds.
pub const DEFAULT_RESTART_TIMEOUT_SECS: u64 = 60;

/// Configuration for the riakbox harness.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Directory holding the stock `riak` launcher.
    pub bin_dir: PathBuf,

    /// Sandbox root. Deleted on startup and on exit. A fresh directory
    /// under the system temp dir is used when unset.
    pub tmp_dir: Option<PathBuf>,

    /// Optional TOML file with `[vm_args]` and `[app_config.*]` overrides.
    pub overrides_path: Option<PathBuf>,

    /// Time allowed for the first prompt.
    pub start_timeout: Duration,

    /// Time allowed for the listener after a restarting recycle.
    pub restart_timeout: Duration,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read overrides {}: {source}", path.display())]
    ReadOverrides {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse overrides {}: {source}", path.display())]
    ParseOverrides {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings layered over the node defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
    /// Entries for `vm.args`.
    #[serde(default)]
    pub vm_args: ConfigMap,

    /// Entries for `app.config`, keyed by subsystem.
    #[serde(default)]
    pub app_config: ConfigMap,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            bin_dir: default_bin_dir(),
            tmp_dir: None,
            overrides_path: None,
            start_timeout: Duration::from_secs(DEFAULT_START_TIMEOUT_SECS),
            restart_timeout: Duration::from_secs(DEFAULT_RESTART_TIMEOUT_SECS),
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RIAKBOX_BIN_DIR` | `~/.riak/install/riak/bin` |
    /// | `RIAKBOX_TMP_DIR` | `<system temp>/riakbox/test_server-<id>` |
    /// | `RIAKBOX_OVERRIDES` | none |
    /// | `RIAKBOX_START_TIMEOUT_SECS` | `60` |
    /// | `RIAKBOX_RESTART_TIMEOUT_SECS` | `60` |
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        let secs = |key: &str, fallback: Duration| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            bin_dir: var("RIAKBOX_BIN_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.bin_dir),
            tmp_dir: var("RIAKBOX_TMP_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or(default.tmp_dir),
            overrides_path: var("RIAKBOX_OVERRIDES")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            start_timeout: secs("RIAKBOX_START_TIMEOUT_SECS", default.start_timeout),
            restart_timeout: secs("RIAKBOX_RESTART_TIMEOUT_SECS", default.restart_timeout),
        }
    }

    /// Validate configuration but only log warnings instead of failing.
    pub fn validate_warn(&self) {
        let launcher = self.bin_dir.join(LAUNCHER_NAME);
        if !launcher.exists() {
            tracing::warn!(path = %launcher.display(), "Launcher not found");
        }

        if let Some(path) = &self.overrides_path {
            if !path.exists() {
                tracing::warn!(path = %path.display(), "Overrides file not found");
            }
        }

        if let Some(parent) = self.tmp_dir.as_deref().and_then(Path::parent) {
            if !parent.exists() {
                tracing::warn!(path = %parent.display(), "Sandbox parent directory not found");
            }
        }
    }

    /// Read the overrides file, if one is configured.
    pub fn overrides(&self) -> Result<Overrides, ConfigError> {
        match &self.overrides_path {
            Some(path) => load_overrides(path),
            None => Ok(Overrides::default()),
        }
    }

    /// Build validated server options.
    pub fn server_options(&self, overrides: &Overrides) -> riakbox_core::Result<ServerOptions> {
        let mut builder = ServerOptions::builder().bin_dir(&self.bin_dir);
        if let Some(tmp_dir) = &self.tmp_dir {
            builder = builder.tmp_dir(tmp_dir);
        }
        builder
            .vm_args(overrides.vm_args.clone())
            .app_config(overrides.app_config.clone())
            .start_timeout(self.start_timeout)
            .restart_timeout(self.restart_timeout)
            .build()
    }
}

/// Parse a TOML overrides file.
pub fn load_overrides(path: &Path) -> Result<Overrides, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadOverrides {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::ParseOverrides {
        path: path.to_path_buf(),
        source,
    })
}
