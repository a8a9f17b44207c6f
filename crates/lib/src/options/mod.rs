//! The derived options store.
//!
//! Options are an open-ended JSON object plus a handful of well-known path keys.
//! Path keys are stored as a [`PathSlot`]: a `Derived` slot re-computes its value
//! from a base directory every time it is read, a `Pinned` slot holds an explicit
//! absolute path that no longer follows its base.
//!
//! ```text
//! root ──┬── source ──┬── mains.index
//!        │            └── mains.<name>
//!        ├── output
//!        ├── tests
//!        └── node_modules
//! ```
//!
//! Changing `root` moves every derived key under the new root; changing `source`
//! moves every derived entry in `mains`. Pinned keys never move.

pub mod merge;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::consts::{DEFAULT_MAIN, MAINS_KEY, ROOT_KEY};
use crate::error::{Error, Result};
use crate::paths;

pub use merge::{deep_merge, merge_options};

/// Derived path keys and their default suffixes under `root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathKey {
  Source,
  Output,
  Tests,
  NodeModules,
}

impl PathKey {
  /// All derived keys. `Source` comes first so merges resolve entry points
  /// against the updated source directory.
  pub const ALL: [PathKey; 4] = [PathKey::Source, PathKey::Output, PathKey::Tests, PathKey::NodeModules];

  pub fn as_str(self) -> &'static str {
    match self {
      PathKey::Source => "source",
      PathKey::Output => "output",
      PathKey::Tests => "tests",
      PathKey::NodeModules => "node_modules",
    }
  }

  pub fn default_suffix(self) -> &'static str {
    match self {
      PathKey::Source => "./src",
      PathKey::Output => "./build",
      PathKey::Tests => "./test",
      PathKey::NodeModules => "./node_modules",
    }
  }

  pub fn from_key(key: &str) -> Option<Self> {
    PathKey::ALL.into_iter().find(|k| k.as_str() == key)
  }
}

impl fmt::Display for PathKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Resolution state of a single path option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSlot {
  /// Re-derived from the base on every read.
  Derived { suffix: PathBuf },
  /// Explicitly assigned absolute path.
  Pinned(PathBuf),
}

impl PathSlot {
  /// A slot for `suffix`. Absolute suffixes cannot follow a base, so they are pinned.
  pub fn from_suffix(suffix: impl Into<PathBuf>) -> Self {
    let suffix = suffix.into();
    if suffix.is_absolute() {
      PathSlot::Pinned(paths::normalize(&suffix))
    } else {
      PathSlot::Derived { suffix }
    }
  }

  /// Read the slot against `base`.
  pub fn read(&self, base: &Path) -> PathBuf {
    match self {
      PathSlot::Derived { suffix } => paths::resolve(base, suffix),
      PathSlot::Pinned(path) => path.clone(),
    }
  }

  pub fn is_pinned(&self) -> bool {
    matches!(self, PathSlot::Pinned(_))
  }
}

/// The options object shared by every middleware of a build session.
#[derive(Debug, Clone)]
pub struct Options {
  /// Absolute project root. Always pinned.
  root: PathBuf,
  paths: BTreeMap<PathKey, PathSlot>,
  /// Named entry points, derived from `source`.
  mains: BTreeMap<String, PathSlot>,
  /// Every option that is not a well-known key.
  extra: Map<String, Value>,
}

impl Options {
  /// Create a store rooted at `cwd` with every derived key at its default.
  ///
  /// `cwd` must be absolute. [`Options::with_overrides`] resolves a relative
  /// one against the process working directory first.
  pub fn new(cwd: impl AsRef<Path>) -> Self {
    let paths = PathKey::ALL
      .into_iter()
      .map(|key| (key, PathSlot::from_suffix(key.default_suffix())))
      .collect();
    let mut mains = BTreeMap::new();
    mains.insert(DEFAULT_MAIN.to_string(), PathSlot::from_suffix(DEFAULT_MAIN));

    Options {
      root: paths::normalize(cwd.as_ref()),
      paths,
      mains,
      extra: Map::new(),
    }
  }

  /// Create a store rooted at `cwd` and apply construction-time overrides.
  ///
  /// A `mains` object in `overrides` replaces the default entry set. Its relative
  /// values become the entries' suffixes under `source` (the entries stay
  /// derived); absolute values are pinned. Every other key is merged as with
  /// [`Options::merge`].
  ///
  /// # Errors
  ///
  /// * [`Error::Io`] if `cwd` is relative and the working directory cannot be read.
  /// * [`Error::InvalidOption`] if an override has the wrong shape.
  pub fn with_overrides(cwd: impl AsRef<Path>, overrides: Value) -> Result<Self> {
    let mut options = Options::new(std::path::absolute(cwd)?);
    let mut overrides = match overrides {
      Value::Null => return Ok(options),
      Value::Object(map) => map,
      other => {
        return Err(Error::invalid_option(
          "<options>",
          format!("expected an object, found {}", value_kind(&other)),
        ));
      }
    };

    if let Some(mains) = overrides.remove(MAINS_KEY) {
      let entries = expect_mains(&mains)?;
      options.mains = entries
        .into_iter()
        .map(|(name, suffix)| (name, PathSlot::from_suffix(suffix)))
        .collect();
    }

    options.merge(Value::Object(overrides))?;
    Ok(options)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Resolved value of a derived key.
  pub fn path(&self, key: PathKey) -> PathBuf {
    self.slot(key).read(&self.root)
  }

  pub fn source(&self) -> PathBuf {
    self.path(PathKey::Source)
  }

  pub fn output(&self) -> PathBuf {
    self.path(PathKey::Output)
  }

  pub fn tests(&self) -> PathBuf {
    self.path(PathKey::Tests)
  }

  pub fn node_modules(&self) -> PathBuf {
    self.path(PathKey::NodeModules)
  }

  pub fn is_pinned(&self, key: PathKey) -> bool {
    self.slot(key).is_pinned()
  }

  /// Resolved path of the entry point `name`.
  pub fn main(&self, name: &str) -> Option<PathBuf> {
    let source = self.source();
    self.mains.get(name).map(|slot| slot.read(&source))
  }

  pub fn is_main_pinned(&self, name: &str) -> Option<bool> {
    self.mains.get(name).map(PathSlot::is_pinned)
  }

  /// Every entry point, resolved against the current `source`.
  pub fn mains(&self) -> BTreeMap<String, PathBuf> {
    let source = self.source();
    self
      .mains
      .iter()
      .map(|(name, slot)| (name.clone(), slot.read(&source)))
      .collect()
  }

  /// Options that are not well-known keys.
  pub fn extra(&self) -> &Map<String, Value> {
    &self.extra
  }

  /// Move the root. Relative values resolve against the previous root.
  ///
  /// Derived keys follow the new root; pinned keys are untouched.
  pub fn set_root(&mut self, value: impl AsRef<Path>) {
    self.root = paths::resolve(&self.root, value);
  }

  /// Pin a derived key. Relative values resolve against the current root.
  pub fn set_path(&mut self, key: PathKey, value: impl AsRef<Path>) {
    let pinned = paths::resolve(&self.root, value);
    self.paths.insert(key, PathSlot::Pinned(pinned));
  }

  /// Replace the suffix of a derived key without pinning it.
  pub fn rebase(&mut self, key: PathKey, suffix: impl Into<PathBuf>) {
    self.paths.insert(key, PathSlot::from_suffix(suffix));
  }

  /// Pin the entry point `name`. Relative values resolve against the current source.
  pub fn set_main(&mut self, name: impl Into<String>, value: impl AsRef<Path>) {
    let pinned = paths::resolve(&self.source(), value);
    self.mains.insert(name.into(), PathSlot::Pinned(pinned));
  }

  /// Replace the suffix of the entry point `name` without pinning it.
  pub fn rebase_main(&mut self, name: impl Into<String>, suffix: impl Into<PathBuf>) {
    self.mains.insert(name.into(), PathSlot::from_suffix(suffix));
  }

  pub fn remove_main(&mut self, name: &str) -> bool {
    self.mains.remove(name).is_some()
  }

  /// Read any option by key.
  ///
  /// Path keys are returned as strings, `mains` as an object of resolved
  /// strings, and `mains.<name>` as a single resolved entry.
  pub fn get(&self, key: &str) -> Option<Value> {
    if key == ROOT_KEY {
      return Some(path_value(&self.root));
    }
    if let Some(path_key) = PathKey::from_key(key) {
      return Some(path_value(&self.path(path_key)));
    }
    if key == MAINS_KEY {
      let mains = self
        .mains()
        .into_iter()
        .map(|(name, path)| (name, path_value(&path)))
        .collect();
      return Some(Value::Object(mains));
    }
    if let Some(name) = main_entry_name(key) {
      return self.main(name).map(|path| path_value(&path));
    }
    self.extra.get(key).cloned()
  }

  /// Assign any option by key.
  ///
  /// Assigning a path key always pins it. Assigning `mains` replaces the entry
  /// set, pinning every entry. Other keys are stored verbatim.
  ///
  /// # Errors
  ///
  /// * If a path key is given anything other than a string.
  /// * If `mains` is given anything other than an object of strings.
  pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
    if key == ROOT_KEY {
      let root = expect_path(key, &value)?;
      self.set_root(root);
    } else if let Some(path_key) = PathKey::from_key(key) {
      let path = expect_path(key, &value)?;
      self.set_path(path_key, path);
    } else if key == MAINS_KEY {
      let entries = expect_mains(&value)?;
      self.mains.clear();
      for (name, path) in entries {
        self.set_main(name, path);
      }
    } else if let Some(name) = main_entry_name(key) {
      let path = expect_path(key, &value)?;
      self.set_main(name, path);
    } else {
      self.extra.insert(key.to_string(), value);
    }
    Ok(())
  }

  /// Snapshot of every option with all paths resolved.
  pub fn to_value(&self) -> Value {
    let mut map = self.extra.clone();
    map.insert(ROOT_KEY.to_string(), path_value(&self.root));
    for key in PathKey::ALL {
      map.insert(key.as_str().to_string(), path_value(&self.path(key)));
    }
    if let Some(mains) = self.get(MAINS_KEY) {
      map.insert(MAINS_KEY.to_string(), mains);
    }
    Value::Object(map)
  }

  fn slot(&self, key: PathKey) -> &PathSlot {
    // Every key is inserted by `Options::new` and never removed.
    &self.paths[&key]
  }
}

fn path_value(path: &Path) -> Value {
  Value::String(paths::display(path))
}

fn main_entry_name(key: &str) -> Option<&str> {
  key
    .strip_prefix(MAINS_KEY)
    .and_then(|rest| rest.strip_prefix('.'))
    .filter(|name| !name.is_empty())
}

pub(crate) fn expect_path<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
  value
    .as_str()
    .ok_or_else(|| Error::invalid_option(key, format!("expected a path string, found {}", value_kind(value))))
}

pub(crate) fn expect_mains(value: &Value) -> Result<Vec<(String, String)>> {
  let Value::Object(entries) = value else {
    return Err(Error::invalid_option(
      MAINS_KEY,
      format!("expected an object, found {}", value_kind(value)),
    ));
  };
  entries
    .iter()
    .map(|(name, path)| {
      let path = expect_path(&format!("{MAINS_KEY}.{name}"), path)?;
      Ok((name.clone(), path.to_string()))
    })
    .collect()
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
