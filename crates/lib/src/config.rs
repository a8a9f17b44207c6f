//! The build configuration handed to middleware.
//!
//! kiln does not interpret this object. It is a JSON tree that middleware mutate
//! through a small fluent API and that commands serialize with
//! [`BuildConfig::to_config`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::options::deep_merge;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BuildConfig {
  root: Map<String, Value>,
}

impl BuildConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Set the value at a dot-separated path, creating intermediate objects.
  ///
  /// Non-object values found along the way are replaced by objects.
  pub fn set(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
    *self.slot(path) = value.into();
    self
  }

  /// Append to the array at `path`, turning a missing or non-array value into an array.
  pub fn push(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
    let slot = self.slot(path);
    match slot {
      Value::Array(items) => items.push(value.into()),
      other => *other = Value::Array(vec![value.into()]),
    }
    self
  }

  /// Register an entry point: appends `path` to `entry.<name>` unless it is
  /// already listed there.
  pub fn entry(&mut self, name: &str, path: impl Into<Value>) -> &mut Self {
    let key = format!("entry.{name}");
    let path = path.into();
    let listed = matches!(self.get(&key), Some(Value::Array(items)) if items.contains(&path));
    if !listed {
      self.push(&key, path);
    }
    self
  }

  /// Deep-merge a JSON object into the configuration. Non-object values are ignored.
  pub fn merge(&mut self, value: Value) -> &mut Self {
    if value.is_object() {
      let mut current = Value::Object(std::mem::take(&mut self.root));
      deep_merge(&mut current, value);
      if let Value::Object(map) = current {
        self.root = map;
      }
    }
    self
  }

  /// Value at a dot-separated path.
  pub fn get(&self, path: &str) -> Option<&Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(self.root.get(first)?, |value, segment| value.get(segment))
  }

  pub fn is_empty(&self) -> bool {
    self.root.is_empty()
  }

  /// Serialize the configuration into a plain JSON object.
  pub fn to_config(&self) -> Value {
    Value::Object(self.root.clone())
  }

  fn slot(&mut self, path: &str) -> &mut Value {
    let mut segments = path.split('.');
    // `split` always yields at least one segment.
    let first = segments.next().unwrap_or_default();
    let mut current = self.root.entry(first.to_string()).or_insert(Value::Null);
    for segment in segments {
      if !current.is_object() {
        *current = Value::Object(Map::new());
      }
      current = match current {
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        _ => unreachable!("replaced with an object above"),
      };
    }
    current
  }
}
