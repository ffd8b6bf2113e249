//! Choosing how to return a running node to an empty state.

use crate::probe::ServiceAddr;
use crate::value::{ConfigMap, ConfigValue};
use riakbox_console::ConsoleCommand;

/// In-memory KV backend that supports `reset()` from the console.
pub const KV_TEST_BACKEND: &str = "riak_kv_test_backend";

/// In-memory search backend that supports `reset()` from the console.
pub const SEARCH_TEST_BACKEND: &str = "riak_search_test_backend";

/// How a recycle is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecyclePlan {
    /// Wipe the in-memory backends in place, one statement at a time.
    Reset(Vec<ConsoleCommand>),
    /// Restart every application, then wait until the service listens again.
    Restart(ServiceAddr),
}

impl RecyclePlan {
    /// Pick a plan for the given application config.
    ///
    /// The reset path requires the KV test backend. The search backend is
    /// reset along with it when search is enabled on its test backend.
    /// Returns `None` if a restart is required but no service address is
    /// configured.
    pub fn for_config(app_config: &ConfigMap) -> Option<Self> {
        if !is_atom(app_config, &["riak_kv", "storage_backend"], KV_TEST_BACKEND) {
            return ServiceAddr::from_app_config(app_config).map(RecyclePlan::Restart);
        }

        let mut commands = vec![ConsoleCommand::ResetKv];
        let search_enabled = app_config
            .get_path(&["riak_search", "enabled"])
            .and_then(ConfigValue::as_bool)
            .unwrap_or(false);
        if search_enabled
            && is_atom(app_config, &["riak_search", "search_backend"], SEARCH_TEST_BACKEND)
        {
            commands.push(ConsoleCommand::ResetSearch);
        }
        Some(RecyclePlan::Reset(commands))
    }

    /// Whether the process stays up.
    pub fn is_fast(&self) -> bool {
        matches!(self, RecyclePlan::Reset(_))
    }
}

fn is_atom(config: &ConfigMap, path: &[&str], expected: &str) -> bool {
    config.get_path(path).and_then(ConfigValue::as_str) == Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_app_config;
    use crate::value::merge;

    #[test]
    fn test_default_config_resets_kv_only() {
        assert_eq!(
            RecyclePlan::for_config(&default_app_config()),
            Some(RecyclePlan::Reset(vec![ConsoleCommand::ResetKv]))
        );
    }

    #[test]
    fn test_search_enabled_resets_both() {
        let config = merge(
            &default_app_config(),
            &ConfigMap::new().with("riak_search", ConfigMap::new().with("enabled", true)),
        );
        assert_eq!(
            RecyclePlan::for_config(&config),
            Some(RecyclePlan::Reset(vec![
                ConsoleCommand::ResetKv,
                ConsoleCommand::ResetSearch
            ]))
        );
    }

    #[test]
    fn test_other_backend_restarts() {
        let config = merge(
            &default_app_config(),
            &ConfigMap::new().with(
                "riak_kv",
                ConfigMap::new()
                    .with("storage_backend", ConfigValue::atom("riak_kv_bitcask_backend")),
            ),
        );
        let plan = RecyclePlan::for_config(&config).unwrap();
        assert!(!plan.is_fast());
        assert_eq!(plan, RecyclePlan::Restart(ServiceAddr::new("127.0.0.1", 9000)));
    }

    #[test]
    fn test_restart_without_address() {
        let config = ConfigMap::new().with(
            "riak_kv",
            ConfigMap::new().with("storage_backend", ConfigValue::atom("riak_kv_eleveldb_backend")),
        );
        assert_eq!(RecyclePlan::for_config(&config), None);
    }
}
