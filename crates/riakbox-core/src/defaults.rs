//! Default settings for a disposable test node.

use crate::value::{ConfigMap, ConfigValue};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Time allowed for the first prompt after spawning.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);

/// Time allowed for the prompt after any later console statement.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed for the HTTP listener to come back after `init:restart().`.
pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(60);

/// Time a stopped process gets to exit before it is killed.
pub const DEFAULT_REAP_GRACE: Duration = Duration::from_secs(10);

/// Short random tag shared by a node's default name and sandbox root.
pub fn instance_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// `<system temp>/riakbox/test_server-<id>`, private to one node.
pub fn default_tmp_dir() -> PathBuf {
    default_tmp_dir_for(&instance_id())
}

/// Default sandbox root for the node tagged `id`.
pub fn default_tmp_dir_for(id: &str) -> PathBuf {
    std::env::temp_dir()
        .join("riakbox")
        .join(format!("test_server-{id}"))
}

/// `~/.riak/install/riak/bin`, or `./riak/bin` without a home directory.
pub fn default_bin_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".riak").join("install").join("riak").join("bin"),
        None => PathBuf::from("riak").join("bin"),
    }
}

/// VM arguments with a fresh node name and cookie.
pub fn default_vm_args() -> ConfigMap {
    default_vm_args_for(&instance_id())
}

/// VM arguments for the node tagged `id`, with a fresh cookie.
pub fn default_vm_args_for(id: &str) -> ConfigMap {
    let cookie = Uuid::new_v4().simple().to_string();

    ConfigMap::new()
        .with("-name", format!("riaktest{id}@127.0.0.1"))
        .with("-setcookie", cookie)
        .with("+K", true)
        .with("+A", 64)
        .with("-smp", "enable")
        .with("-env ERL_MAX_PORTS", 4096)
        .with("-env ERL_FULLSWEEP_AFTER", 10)
}

/// Application settings for a single in-memory node.
pub fn default_app_config() -> ConfigMap {
    ConfigMap::new()
        .with(
            "riak_core",
            ConfigMap::new()
                .with("web_ip", "127.0.0.1")
                .with("web_port", 9000)
                .with("handoff_port", 9001)
                .with("ring_creation_size", 64),
        )
        .with(
            "riak_kv",
            ConfigMap::new()
                .with("storage_backend", ConfigValue::atom("riak_kv_test_backend"))
                .with("pb_ip", "127.0.0.1")
                .with("pb_port", 9002)
                .with("js_vm_count", 8)
                .with("js_max_vm_mem", 8)
                .with("js_thread_stack", 16)
                .with("riak_kv_stat", true)
                .with("map_cache_size", 0)
                .with("vnode_cache_entries", 0)
                .with("test", true)
                .with("memory_backend", ConfigMap::new().with("max_memory", 8)),
        )
        .with(
            "riak_search",
            ConfigMap::new()
                .with("enabled", false)
                .with("search_backend", ConfigValue::atom("riak_search_test_backend")),
        )
        .with("luwak", ConfigMap::new().with("enabled", false))
}
