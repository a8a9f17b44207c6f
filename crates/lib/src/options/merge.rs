//! Deep merging of partial options.
//!
//! Merging happens in two layers. [`deep_merge`] is a plain structural merge of
//! JSON values: objects merge key by key, everything else (arrays included) is
//! replaced wholesale. [`Options::merge`] sits on top and routes the well-known
//! path keys through the store's setters, so every path that appears in a merge
//! ends up pinned while untouched paths keep deriving from their base.

use serde_json::Value;
use tracing::debug;

use super::{Options, PathKey, expect_mains, expect_path, value_kind};
use crate::consts::{MAINS_KEY, ROOT_KEY};
use crate::error::{Error, Result};

/// Merge `source` into `target`.
///
/// When both sides are objects the merge recurses; otherwise `source` replaces
/// `target`. Arrays are never concatenated.
pub fn deep_merge(target: &mut Value, source: Value) {
  match (target, source) {
    (Value::Object(target), Value::Object(source)) => {
      for (key, value) in source {
        match target.get_mut(&key) {
          Some(existing) => deep_merge(existing, value),
          None => {
            target.insert(key, value);
          }
        }
      }
    }
    (target, source) => *target = source,
  }
}

/// Merge `partial` into `target` and return it.
pub fn merge_options(mut target: Options, partial: Value) -> Result<Options> {
  target.merge(partial)?;
  Ok(target)
}

impl Options {
  /// Merge a partial options object into the store.
  ///
  /// `root` is applied first, then the derived path keys (`source` before the
  /// others), then individual `mains` entries, so relative values resolve against
  /// bases updated by the same merge. Each of those is an explicit assignment and
  /// pins the key. Remaining keys are deep-merged into the open-ended options.
  ///
  /// The partial object is validated before anything is applied; an invalid
  /// value leaves the store untouched.
  pub fn merge(&mut self, partial: Value) -> Result<()> {
    let mut partial = match partial {
      Value::Object(map) => map,
      Value::Null => return Ok(()),
      other => {
        return Err(Error::invalid_option(
          "<options>",
          format!("expected an object, found {}", value_kind(&other)),
        ));
      }
    };

    if let Some(root) = partial.get(ROOT_KEY) {
      expect_path(ROOT_KEY, root)?;
    }
    for key in PathKey::ALL {
      if let Some(value) = partial.get(key.as_str()) {
        expect_path(key.as_str(), value)?;
      }
    }
    let mains = match partial.remove(MAINS_KEY) {
      Some(value) => expect_mains(&value)?,
      None => Vec::new(),
    };

    if let Some(root) = partial.remove(ROOT_KEY) {
      self.set(ROOT_KEY, root)?;
    }
    for key in PathKey::ALL {
      if let Some(value) = partial.remove(key.as_str()) {
        self.set(key.as_str(), value)?;
      }
    }
    for (name, path) in mains {
      self.set_main(name, path);
    }

    for (key, value) in partial {
      debug!(key = %key, "merging option");
      match self.extra.get_mut(&key) {
        Some(existing) => deep_merge(existing, value),
        None => {
          self.extra.insert(key, value);
        }
      }
    }

    Ok(())
  }
}
