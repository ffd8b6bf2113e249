//! # riakbox-core
//!
//! Disposable Riak nodes for integration test suites.
//!
//! A [`TestServer`] owns a private sandbox directory, generates the launcher
//! script and config files for one node inside it, boots the node in console
//! mode and can wipe its data between tests without a full reboot.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       riakbox-core                         │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  ServerOptions ──▶ ConfigMaterializer ──▶ <tmp>/bin/riak   │
//! │  (defaults +                              <tmp>/etc/*.     │
//! │   overrides)                                               │
//! │                                                            │
//! │  ┌──────────────────┐      ┌────────────────────────────┐  │
//! │  │   TestServer     │─────▶│ ServerHandle               │  │
//! │  │   - prepare()    │      │ (from riakbox-console)     │  │
//! │  │   - start()      │      └────────────────────────────┘  │
//! │  │   - recycle()    │──┐               │ stdin/stdout      │
//! │  │   - stop()       │  │               ▼                   │
//! │  │   - cleanup()    │  │   ┌────────────────────────────┐  │
//! │  └──────────────────┘  │   │ riak console (Erlang VM)   │  │
//! │                        │   └────────────────────────────┘  │
//! │                        ▼                                   │
//! │              RecyclePlan / ReadinessProbe                  │
//! │                                                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use riakbox_core::{ServerOptions, TestServer};
//!
//! # async fn example() -> riakbox_core::Result<()> {
//! let options = ServerOptions::builder()
//!     .bin_dir("/opt/riak/bin")
//!     .app_setting("riak_core", "web_port", 8098)
//!     .build()?;
//!
//! let server = TestServer::new(options).await;
//! server.prepare().await?;
//! server.start().await?;
//!
//! // ... run a test against 127.0.0.1:8098 ...
//!
//! server.recycle().await?;
//!
//! // ... run the next test ...
//!
//! server.cleanup().await;
//! server.wait_for_shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Layered Config**: ordered defaults deep-merged with caller overrides
//! - **Exact Rendering**: `app.config` and `vm.args` in the formats the node reads
//! - **Serialized Lifecycle**: one lock per server, lock-free state reads
//! - **Fast Recycle**: in-place backend reset when the test backend is in use

mod defaults;
mod error;
mod materialize;
mod options;
mod paths;
mod probe;
mod recycle;
mod render;
mod server;
mod state;
mod value;

pub use defaults::{
    default_app_config, default_bin_dir, default_tmp_dir, default_tmp_dir_for, default_vm_args,
    default_vm_args_for, instance_id, DEFAULT_PROMPT_TIMEOUT, DEFAULT_REAP_GRACE,
    DEFAULT_RESTART_TIMEOUT, DEFAULT_START_TIMEOUT,
};
pub use error::{CoreError, Result};
pub use materialize::{render_launcher, substitution_rules, ConfigMaterializer, SubstitutionRule};
pub use options::{ServerOptions, ServerOptionsBuilder, NODE_NAME_ARG};
pub use paths::{SandboxPaths, LAUNCHER_NAME};
pub use probe::{ReadinessProbe, ServiceAddr, TcpProbe};
pub use recycle::{RecyclePlan, KV_TEST_BACKEND, SEARCH_TEST_BACKEND};
pub use render::{render_app_config, render_map, render_vm_args};
pub use server::TestServer;
pub use state::{LifecycleState, StateCell};
pub use value::{merge, ConfigMap, ConfigValue};

pub use riakbox_console::{ConsoleCommand, ConsoleError};
