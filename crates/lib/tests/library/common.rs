//! Shared helpers for library integration tests.

use std::path::PathBuf;

use kiln_lib::Api;
use serde_json::Value;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// A session rooted at a fixed, non-existent directory. Nothing touches disk.
pub fn session_at(root: &str) -> Api {
  Api::with_cwd(root, Value::Null).unwrap()
}

/// Isolated project directory with a session rooted at it.
pub struct TestProject {
  pub temp: TempDir,
  pub api: Api,
}

impl TestProject {
  pub fn new() -> Self {
    Self::with_overrides(Value::Null)
  }

  pub fn with_overrides(overrides: Value) -> Self {
    let temp = TempDir::new().unwrap();
    let api = Api::with_cwd(temp.path(), overrides).unwrap();
    Self { temp, api }
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }
}
