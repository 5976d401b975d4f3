//! Test environment abstraction for isolated config testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated "home" holding the global `.vfuse/config.toml`
//! - An isolated project root holding the project `.vfuse/config.toml`
//! - A scratch mount point directory
//!
//! # Usage
//!
//! ```ignore
//! use vfuse_config::testing::TestEnvironment;
//!
//! let env = TestEnvironment::new()?;
//! env.write_global_config("[trace]\nenabled = false\n")?;
//! let config = env.load()?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, ConfigError};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Stand-in for the user's home directory
    pub home: PathBuf,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Empty directory usable as a mount point
    pub mount_point: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let home = root.join("home");
        let project_root = root.join("project");
        let mount_point = root.join(format!("mnt-{}", test_id));

        std::fs::create_dir_all(home.join(".vfuse"))?;
        std::fs::create_dir_all(project_root.join(".vfuse"))?;
        std::fs::create_dir_all(&mount_point)?;

        Ok(Self {
            _temp_dir: temp_dir,
            home,
            project_root,
            mount_point,
            test_id,
        })
    }

    /// Path of the global config file inside the fake home
    pub fn global_config_path(&self) -> PathBuf {
        self.home.join(".vfuse").join("config.toml")
    }

    /// Path of the project config file
    pub fn project_config_path(&self) -> PathBuf {
        self.project_root.join(".vfuse").join("config.toml")
    }

    /// Write the global config file
    pub fn write_global_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.global_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write the project config file
    pub fn write_project_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.project_config_path();
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Load config from this environment's files, ignoring the real environment.
    pub fn load(&self) -> Result<Config, ConfigError> {
        Config::load_from(
            Some(&self.global_config_path()),
            Some(&self.project_config_path()),
        )
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
