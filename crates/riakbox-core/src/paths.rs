//! Sandbox directory layout.

use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};

/// File name of the launcher script, both in the install and the sandbox.
pub const LAUNCHER_NAME: &str = "riak";

/// The directory tree owned by one test server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPaths {
    /// Sandbox root.
    pub root: PathBuf,
    /// Launcher script.
    pub bin: PathBuf,
    /// Generated config files.
    pub etc: PathBuf,
    /// Node logs.
    pub log: PathBuf,
    /// Node data, including the ring state.
    pub data: PathBuf,
    /// Named pipes used by the launcher.
    pub pipe: PathBuf,
}

impl SandboxPaths {
    /// Derive the layout from a root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            bin: root.join("bin"),
            etc: root.join("etc"),
            log: root.join("log"),
            data: root.join("data"),
            pipe: root.join("pipe"),
            root,
        }
    }

    /// `bin/riak`
    pub fn launcher(&self) -> PathBuf {
        self.bin.join(LAUNCHER_NAME)
    }

    /// `etc/app.config`
    pub fn app_config(&self) -> PathBuf {
        self.etc.join("app.config")
    }

    /// `etc/vm.args`
    pub fn vm_args(&self) -> PathBuf {
        self.etc.join("vm.args")
    }

    /// `data/ring`
    pub fn ring_dir(&self) -> PathBuf {
        self.data.join("ring")
    }

    /// All five directories.
    pub fn dirs(&self) -> [&Path; 5] {
        [&self.bin, &self.etc, &self.log, &self.data, &self.pipe]
    }

    /// Create every directory, including the ring directory.
    pub async fn create(&self) -> Result<()> {
        for dir in self.dirs() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| CoreError::config_write(dir, e))?;
        }
        let ring = self.ring_dir();
        tokio::fs::create_dir_all(&ring)
            .await
            .map_err(|e| CoreError::config_write(&ring, e))?;
        tracing::debug!(root = %self.root.display(), "Sandbox directories created");
        Ok(())
    }

    /// Whether the root exists.
    pub fn exists(&self) -> bool {
        self.root.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = SandboxPaths::new("/tmp/rb");
        assert_eq!(paths.bin, PathBuf::from("/tmp/rb/bin"));
        assert_eq!(paths.pipe, PathBuf::from("/tmp/rb/pipe"));
        assert_eq!(paths.launcher(), PathBuf::from("/tmp/rb/bin/riak"));
        assert_eq!(paths.app_config(), PathBuf::from("/tmp/rb/etc/app.config"));
        assert_eq!(paths.vm_args(), PathBuf::from("/tmp/rb/etc/vm.args"));
        assert_eq!(paths.ring_dir(), PathBuf::from("/tmp/rb/data/ring"));
    }

    #[tokio::test]
    async fn test_create() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = SandboxPaths::new(tmp.path().join("server"));
        paths.create().await.unwrap();
        for dir in paths.dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        assert!(paths.ring_dir().is_dir());
        // idempotent
        paths.create().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_under_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = SandboxPaths::new(blocker.join("server")).create().await.unwrap_err();
        assert!(matches!(err, CoreError::ConfigWrite { .. }));
    }
}
