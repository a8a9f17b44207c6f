//! The `kiln.json` project file.
//!
//! ```json
//! {
//!   "options": { "source": "lib", "mains": { "index": "main" } },
//!   "use": ["middleware/compile", "middleware/lint.lua"],
//!   "env": { "NODE_ENV": "production" }
//! }
//! ```
//!
//! Every field is optional. `env` is folded into `options.env` so it reaches the
//! process environment when the session is created.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::consts::{ENV_KEY, PROJECT_FILENAME};
use crate::error::{Error, Result};
use crate::options::deep_merge;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectFile {
  /// Construction-time options for the session.
  pub options: Value,
  /// Middleware modules, relative to the project root.
  #[serde(rename = "use")]
  pub use_: Vec<PathBuf>,
  /// Environment variables exported when the session is created.
  pub env: BTreeMap<String, String>,
}

impl ProjectFile {
  /// Parse the project file at `path`.
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)?;
    let project: ProjectFile = serde_json::from_str(&content)?;
    if !(project.options.is_null() || project.options.is_object()) {
      return Err(Error::invalid_option("options", "expected an object"));
    }
    debug!(path = %path.display(), modules = project.use_.len(), "loaded project file");
    Ok(project)
  }

  /// Load `kiln.json` from `dir` if it exists.
  pub fn discover(dir: &Path) -> Result<Option<Self>> {
    let path = dir.join(PROJECT_FILENAME);
    if path.is_file() {
      Self::load(&path).map(Some)
    } else {
      Ok(None)
    }
  }

  /// The options object with `env` folded in under `options.env`.
  pub fn overrides(&self) -> Value {
    let mut options = match &self.options {
      Value::Object(map) => Value::Object(map.clone()),
      _ => Value::Object(Map::new()),
    };
    if !self.env.is_empty() {
      let env: Map<String, Value> = self
        .env
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
      let mut partial = Map::new();
      partial.insert(ENV_KEY.to_string(), Value::Object(env));
      deep_merge(&mut options, Value::Object(partial));
    }
    options
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn missing_fields_default() {
    let project: ProjectFile = serde_json::from_str("{}").unwrap();
    assert_eq!(project, ProjectFile::default());
    assert_eq!(project.overrides(), json!({}));
  }

  #[test]
  fn env_is_folded_into_options() {
    let project: ProjectFile = serde_json::from_value(json!({
      "options": { "source": "lib", "env": { "A": "1" } },
      "use": ["middleware/compile"],
      "env": { "B": "2" }
    }))
    .unwrap();

    assert_eq!(project.use_, vec![PathBuf::from("middleware/compile")]);
    assert_eq!(
      project.overrides(),
      json!({ "source": "lib", "env": { "A": "1", "B": "2" } })
    );
  }

  #[test]
  fn discover_reads_the_project_file() {
    let dir = TempDir::new().unwrap();
    assert_eq!(ProjectFile::discover(dir.path()).unwrap(), None);

    fs::write(dir.path().join(PROJECT_FILENAME), r#"{ "use": ["a.lua"] }"#).unwrap();
    let project = ProjectFile::discover(dir.path()).unwrap().unwrap();
    assert_eq!(project.use_, vec![PathBuf::from("a.lua")]);
  }

  #[test]
  fn non_object_options_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(PROJECT_FILENAME);
    fs::write(&path, r#"{ "options": [1, 2] }"#).unwrap();
    assert!(matches!(ProjectFile::load(&path), Err(Error::InvalidOption { .. })));

    fs::write(&path, "not json").unwrap();
    assert!(matches!(ProjectFile::load(&path), Err(Error::Json(_))));
  }
}
