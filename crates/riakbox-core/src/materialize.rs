//! Writes the launcher script and both config files into a sandbox.

use crate::error::{CoreError, Result};
use crate::options::ServerOptions;
use crate::paths::{SandboxPaths, LAUNCHER_NAME};
use crate::render::{render_app_config, render_vm_args};
use std::path::{Path, PathBuf};

/// Mode of the generated launcher script.
const LAUNCHER_MODE: u32 = 0o755;

/// Line the stock launcher uses to derive its install root.
const BASE_DIR_LINE: &str = "RUNNER_BASE_DIR=${RUNNER_SCRIPT_DIR%/*}";
const BASE_DIR_MARKER: &str = "RUNNER_BASE_DIR=";

/// Rewrites the remainder of any launcher line containing `marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRule {
    /// Assignment prefix to look for, e.g. `RUNNER_ETC_DIR=`.
    pub marker: &'static str,
    /// Text placed after the marker.
    pub value: String,
}

impl SubstitutionRule {
    fn new(marker: &'static str, value: impl Into<String>) -> Self {
        Self {
            marker,
            value: value.into(),
        }
    }

    fn apply(&self, line: &str) -> Option<String> {
        let at = line.find(self.marker)?;
        let keep = at + self.marker.len();
        Some(format!("{}{}", &line[..keep], self.value))
    }
}

/// The rules that point a stock launcher at a sandbox, in priority order.
pub fn substitution_rules(paths: &SandboxPaths) -> Vec<SubstitutionRule> {
    vec![
        SubstitutionRule::new("RUNNER_SCRIPT_DIR=", display(&paths.bin)),
        SubstitutionRule::new("RUNNER_ETC_DIR=", display(&paths.etc)),
        SubstitutionRule::new("RUNNER_LOG_DIR=", display(&paths.log)),
        SubstitutionRule::new("PIPE_DIR=", display(&paths.pipe)),
        SubstitutionRule::new("RUNNER_USER=", ""),
    ]
}

/// Produce a sandbox launcher from the stock `riak` script.
///
/// Each line is rewritten by the first matching rule from
/// [`substitution_rules`]. The line deriving `RUNNER_BASE_DIR` from the
/// script location is pinned to the parent of `bin_dir`, so the launcher
/// still finds the install after being moved into the sandbox. Line
/// endings are preserved.
pub fn render_launcher(template: &str, paths: &SandboxPaths, bin_dir: &Path) -> String {
    let rules = substitution_rules(paths);
    let base_dir = bin_dir.parent().unwrap_or(bin_dir);

    let mut out = String::with_capacity(template.len());
    for raw in template.split_inclusive('\n') {
        let (line, ending) = split_ending(raw);

        if line.trim() == BASE_DIR_LINE {
            let indent = &line[..line.len() - line.trim_start().len()];
            out.push_str(indent);
            out.push_str(BASE_DIR_MARKER);
            out.push_str(&display(base_dir));
        } else {
            match rules.iter().find_map(|rule| rule.apply(line)) {
                Some(rewritten) => out.push_str(&rewritten),
                None => out.push_str(line),
            }
        }
        out.push_str(ending);
    }
    out
}

fn split_ending(raw: &str) -> (&str, &str) {
    if let Some(line) = raw.strip_suffix("\r\n") {
        (line, "\r\n")
    } else if let Some(line) = raw.strip_suffix('\n') {
        (line, "\n")
    } else {
        (raw, "")
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Writes the sandbox files for one set of options.
#[derive(Debug)]
pub struct ConfigMaterializer<'a> {
    options: &'a ServerOptions,
    paths: &'a SandboxPaths,
}

impl<'a> ConfigMaterializer<'a> {
    /// Create a materializer. The sandbox directories must already exist.
    pub fn new(options: &'a ServerOptions, paths: &'a SandboxPaths) -> Self {
        Self { options, paths }
    }

    /// Stock launcher the sandbox copy is derived from.
    pub fn template_path(&self) -> PathBuf {
        self.options.bin_dir().join(LAUNCHER_NAME)
    }

    /// Write `bin/riak`, `etc/vm.args` and `etc/app.config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigWrite`] if the template cannot be read or
    /// any file cannot be written.
    pub async fn materialize(&self) -> Result<()> {
        let template_path = self.template_path();
        let template = tokio::fs::read_to_string(&template_path)
            .await
            .map_err(|e| CoreError::config_write(&template_path, e))?;

        let launcher = self.paths.launcher();
        let script = render_launcher(&template, self.paths, self.options.bin_dir());
        write(&launcher, script).await?;
        set_executable(&launcher).await?;

        write(&self.paths.vm_args(), render_vm_args(self.options.vm_args())).await?;
        write(
            &self.paths.app_config(),
            render_app_config(self.options.app_config()),
        )
        .await?;

        tracing::info!(
            root = %self.paths.root.display(),
            template = %template_path.display(),
            node = %self.options.node_name(),
            "Sandbox materialized"
        );
        Ok(())
    }
}

async fn write(path: &Path, contents: String) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| CoreError::config_write(path, e))?;
    tracing::debug!(path = %path.display(), "Wrote sandbox file");
    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(LAUNCHER_MODE))
        .await
        .map_err(|e| CoreError::config_write(path, e))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConfigValue;

    const STOCK: &str = "#!/bin/sh\n\
        RUNNER_SCRIPT_DIR=$(cd ${0%/*} && pwd)\n\
        \n\
        RUNNER_BASE_DIR=${RUNNER_SCRIPT_DIR%/*}\n\
        RUNNER_ETC_DIR=$RUNNER_BASE_DIR/etc\n\
        RUNNER_LOG_DIR=$RUNNER_BASE_DIR/log\n\
        PIPE_DIR=/tmp/$RUNNER_BASE_DIR/\n\
        RUNNER_USER=riak\n\
        echo done\n";

    #[test]
    fn test_render_launcher() {
        let paths = SandboxPaths::new("/sb");
        let out = render_launcher(STOCK, &paths, Path::new("/opt/riak/bin"));
        assert_eq!(
            out,
            "#!/bin/sh\n\
             RUNNER_SCRIPT_DIR=/sb/bin\n\
             \n\
             RUNNER_BASE_DIR=/opt/riak\n\
             RUNNER_ETC_DIR=/sb/etc\n\
             RUNNER_LOG_DIR=/sb/log\n\
             PIPE_DIR=/sb/pipe\n\
             RUNNER_USER=\n\
             echo done\n"
        );
    }

    #[test]
    fn test_render_launcher_keeps_prefix_and_endings() {
        let paths = SandboxPaths::new("/sb");
        let template =
            "  export RUNNER_LOG_DIR=/var/log/riak\r\n    RUNNER_BASE_DIR=${RUNNER_SCRIPT_DIR%/*}";
        let out = render_launcher(template, &paths, Path::new("/opt/riak/bin"));
        assert_eq!(
            out,
            "  export RUNNER_LOG_DIR=/sb/log\r\n    RUNNER_BASE_DIR=/opt/riak"
        );
    }

    #[test]
    fn test_first_rule_wins() {
        let paths = SandboxPaths::new("/sb");
        // PIPE_DIR= appears after RUNNER_LOG_DIR= in the rule list
        let out = render_launcher("RUNNER_LOG_DIR=x PIPE_DIR=y\n", &paths, Path::new("/r/bin"));
        assert_eq!(out, "RUNNER_LOG_DIR=/sb/log\n");
    }

    #[test]
    fn test_other_base_dir_lines_untouched() {
        let paths = SandboxPaths::new("/sb");
        let line = "RUNNER_BASE_DIR=/custom\n";
        assert_eq!(render_launcher(line, &paths, Path::new("/r/bin")), line);
    }

    async fn materialized(
        template: Option<&str>,
    ) -> (tempfile::TempDir, ServerOptions, Result<()>) {
        let tmp = tempfile::tempdir().unwrap();
        let bin_dir = tmp.path().join("install/bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        if let Some(template) = template {
            std::fs::write(bin_dir.join(LAUNCHER_NAME), template).unwrap();
        }

        let options = ServerOptions::builder()
            .tmp_dir(tmp.path().join("server"))
            .bin_dir(&bin_dir)
            .vm_arg("-name", "unit@127.0.0.1")
            .app_setting("riak_kv", "storage_backend", ConfigValue::atom("riak_kv_test_backend"))
            .build()
            .unwrap();
        let paths = options.sandbox_paths();
        paths.create().await.unwrap();
        let result = ConfigMaterializer::new(&options, &paths).materialize().await;
        (tmp, options, result)
    }

    #[tokio::test]
    async fn test_materialize_writes_files() {
        let (_tmp, options, result) = materialized(Some(STOCK)).await;
        result.unwrap();
        let paths = options.sandbox_paths();

        let script = std::fs::read_to_string(paths.launcher()).unwrap();
        assert!(script.contains(&format!("RUNNER_ETC_DIR={}", paths.etc.display())));

        let vm_args = std::fs::read_to_string(paths.vm_args()).unwrap();
        assert!(vm_args.starts_with("-name unit@127.0.0.1\n"));

        let app_config = std::fs::read_to_string(paths.app_config()).unwrap();
        assert!(app_config.starts_with("[\n    {riak_core, [\n"));
        assert!(app_config.contains("{storage_backend, riak_kv_test_backend}"));
        assert!(app_config.ends_with("]."));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(paths.launcher()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, LAUNCHER_MODE);
        }
    }

    #[tokio::test]
    async fn test_missing_template() {
        let (_tmp, _options, result) = materialized(None).await;
        match result.unwrap_err() {
            CoreError::ConfigWrite { path, .. } => assert!(path.ends_with("install/bin/riak")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_sandbox_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let bin_dir = tmp.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join(LAUNCHER_NAME), STOCK).unwrap();

        let options = ServerOptions::builder()
            .tmp_dir(tmp.path().join("never-created"))
            .bin_dir(&bin_dir)
            .build()
            .unwrap();
        let paths = options.sandbox_paths();
        let err = ConfigMaterializer::new(&options, &paths)
            .materialize()
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ConfigWrite { .. }));
    }
}
