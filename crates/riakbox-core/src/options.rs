//! Server options.

use crate::defaults::{
    default_app_config, default_bin_dir, default_tmp_dir_for, default_vm_args_for, instance_id,
    DEFAULT_PROMPT_TIMEOUT,
    DEFAULT_REAP_GRACE, DEFAULT_RESTART_TIMEOUT, DEFAULT_START_TIMEOUT,
};
use crate::error::{CoreError, Result};
use crate::paths::SandboxPaths;
use crate::probe::ServiceAddr;
use crate::value::{merge, ConfigMap, ConfigValue};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// VM argument carrying the node name.
pub const NODE_NAME_ARG: &str = "-name";

/// Validated options for one test server.
///
/// Both configuration trees are already merged over the defaults.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    tmp_dir: PathBuf,
    bin_dir: PathBuf,
    vm_args: ConfigMap,
    app_config: ConfigMap,
    start_timeout: Duration,
    prompt_timeout: Duration,
    restart_timeout: Duration,
    reap_grace: Duration,
}

impl ServerOptions {
    /// Create a new options builder.
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder::default()
    }

    /// Sandbox root.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Directory holding the launcher template.
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Merged VM arguments.
    pub fn vm_args(&self) -> &ConfigMap {
        &self.vm_args
    }

    /// Merged application config.
    pub fn app_config(&self) -> &ConfigMap {
        &self.app_config
    }

    /// Time allowed for the first prompt.
    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    /// Time allowed for the prompt after a statement.
    pub fn prompt_timeout(&self) -> Duration {
        self.prompt_timeout
    }

    /// Time allowed for the readiness probe after a restart.
    pub fn restart_timeout(&self) -> Duration {
        self.restart_timeout
    }

    /// Time a stopped process gets before it is killed.
    pub fn reap_grace(&self) -> Duration {
        self.reap_grace
    }

    /// The node name from `-name`.
    pub fn node_name(&self) -> &str {
        // presence checked in validate()
        self.vm_args
            .get(NODE_NAME_ARG)
            .and_then(ConfigValue::as_str)
            .unwrap_or_default()
    }

    /// The HTTP listener the readiness probe targets.
    pub fn service_addr(&self) -> Option<ServiceAddr> {
        ServiceAddr::from_app_config(&self.app_config)
    }

    /// `riak_kv.storage_backend`, if set.
    pub fn kv_backend(&self) -> Option<&str> {
        self.app_config
            .get_path(&["riak_kv", "storage_backend"])
            .and_then(ConfigValue::as_str)
    }

    /// Sandbox directories under [`tmp_dir`](Self::tmp_dir).
    pub fn sandbox_paths(&self) -> SandboxPaths {
        SandboxPaths::new(&self.tmp_dir)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        match self.vm_args.get(NODE_NAME_ARG).and_then(ConfigValue::as_str) {
            Some(name) if !name.trim().is_empty() => {}
            _ => {
                return Err(CoreError::InvalidConfig(format!(
                    "vm arg {NODE_NAME_ARG} must be a non-empty string"
                )))
            }
        }
        if let Some((key, _)) = self.vm_args.iter().find(|(_, v)| !v.is_scalar()) {
            return Err(CoreError::InvalidConfig(format!(
                "vm arg {key} must be a scalar"
            )));
        }
        for (what, map) in [("vm arg", &self.vm_args), ("app setting", &self.app_config)] {
            if let Some(key) = non_finite_float(map) {
                return Err(CoreError::InvalidConfig(format!(
                    "{what} {key} must be a finite number"
                )));
            }
        }
        if self.service_addr().is_none() {
            return Err(CoreError::InvalidConfig(
                "riak_core.web_ip and riak_core.web_port (1-65535) are required".into(),
            ));
        }
        if self.tmp_dir.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig("tmp_dir is required".into()));
        }
        Ok(())
    }
}

/// Key of the first NaN or infinite float, searching nested maps.
fn non_finite_float(map: &ConfigMap) -> Option<String> {
    map.iter().find_map(|(key, value)| match value {
        ConfigValue::Float(f) if !f.is_finite() => Some(key.to_string()),
        ConfigValue::Map(inner) => non_finite_float(inner).map(|k| format!("{key}.{k}")),
        _ => None,
    })
}

impl Default for ServerOptions {
    fn default() -> Self {
        let id = instance_id();
        let tmp_dir = default_tmp_dir_for(&id);
        let mut app_config = default_app_config();
        derive_ring_state_dir(&mut app_config, &tmp_dir);
        Self {
            tmp_dir,
            bin_dir: default_bin_dir(),
            vm_args: default_vm_args_for(&id),
            app_config,
            start_timeout: DEFAULT_START_TIMEOUT,
            prompt_timeout: DEFAULT_PROMPT_TIMEOUT,
            restart_timeout: DEFAULT_RESTART_TIMEOUT,
            reap_grace: DEFAULT_REAP_GRACE,
        }
    }
}

/// Builder for [`ServerOptions`].
#[derive(Debug, Default)]
pub struct ServerOptionsBuilder {
    tmp_dir: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    vm_args: ConfigMap,
    app_config: ConfigMap,
    start_timeout: Option<Duration>,
    prompt_timeout: Option<Duration>,
    restart_timeout: Option<Duration>,
    reap_grace: Option<Duration>,
}

impl ServerOptionsBuilder {
    /// Set the sandbox root.
    pub fn tmp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(path.into());
        self
    }

    /// Set the directory holding the `riak` launcher template.
    pub fn bin_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(path.into());
        self
    }

    /// Override one VM argument.
    pub fn vm_arg(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.vm_args.insert(key, value);
        self
    }

    /// Merge VM argument overrides.
    pub fn vm_args(mut self, overrides: ConfigMap) -> Self {
        self.vm_args = merge(&self.vm_args, &overrides);
        self
    }

    /// Merge application config overrides.
    pub fn app_config(mut self, overrides: ConfigMap) -> Self {
        self.app_config = merge(&self.app_config, &overrides);
        self
    }

    /// Override one application setting, e.g. `("riak_core", "web_port", 8098)`.
    pub fn app_setting(
        self,
        subsystem: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Self {
        let overrides = ConfigMap::new().with(subsystem, ConfigMap::new().with(key, value));
        self.app_config(overrides)
    }

    /// Set the time allowed for the first prompt.
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Set the time allowed for the prompt after a statement.
    pub fn prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = Some(timeout);
        self
    }

    /// Set the time allowed for the readiness probe after a restart.
    pub fn restart_timeout(mut self, timeout: Duration) -> Self {
        self.restart_timeout = Some(timeout);
        self
    }

    /// Set the time a stopped process gets before it is killed.
    pub fn reap_grace(mut self, grace: Duration) -> Self {
        self.reap_grace = Some(grace);
        self
    }

    /// Merge overrides over the defaults and validate.
    ///
    /// Relative paths are resolved against the current directory.
    /// `riak_core.ring_state_dir` defaults to `<tmp_dir>/data/ring`.
    pub fn build(self) -> Result<ServerOptions> {
        let defaults = ServerOptions::default();

        let tmp_dir = absolute(self.tmp_dir.unwrap_or(defaults.tmp_dir))?;
        let bin_dir = absolute(self.bin_dir.unwrap_or(defaults.bin_dir))?;

        let mut app_config = merge(&default_app_config(), &self.app_config);
        derive_ring_state_dir(&mut app_config, &tmp_dir);

        let options = ServerOptions {
            tmp_dir,
            bin_dir,
            vm_args: merge(&defaults.vm_args, &self.vm_args),
            app_config,
            start_timeout: self.start_timeout.unwrap_or(defaults.start_timeout),
            prompt_timeout: self.prompt_timeout.unwrap_or(defaults.prompt_timeout),
            restart_timeout: self.restart_timeout.unwrap_or(defaults.restart_timeout),
            reap_grace: self.reap_grace.unwrap_or(defaults.reap_grace),
        };
        options.validate()?;
        Ok(options)
    }
}

fn derive_ring_state_dir(app_config: &mut ConfigMap, tmp_dir: &Path) {
    let ring = SandboxPaths::new(tmp_dir).ring_dir();
    match app_config.get_mut("riak_core") {
        Some(ConfigValue::Map(core)) => {
            if !core.contains_key("ring_state_dir") {
                core.insert("ring_state_dir", ring.to_string_lossy().into_owned());
            }
        }
        // a scalar riak_core is the caller's choice; leave it alone
        Some(_) => {}
        None => {
            app_config.insert(
                "riak_core",
                ConfigMap::new().with("ring_state_dir", ring.to_string_lossy().into_owned()),
            );
        }
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
