//! Lexical path resolution.
//!
//! Every derived option in kiln is computed by joining a base directory with a
//! possibly-relative value. Resolution never touches the filesystem: `.` segments
//! are dropped and `..` segments pop the previous component.

use std::path::{Component, Path, PathBuf};

/// Resolve `value` against `base`.
///
/// Absolute values are returned as-is (normalized). Relative values are joined
/// onto `base` and normalized.
///
/// # Example
/// ```
/// use std::path::Path;
/// use kiln_lib::paths::resolve;
///
/// assert_eq!(resolve(Path::new("/work"), "./src"), Path::new("/work/src"));
/// assert_eq!(resolve(Path::new("/work"), "../other"), Path::new("/other"));
/// assert_eq!(resolve(Path::new("/work"), "/abs"), Path::new("/abs"));
/// ```
pub fn resolve(base: &Path, value: impl AsRef<Path>) -> PathBuf {
  let value = value.as_ref();
  if value.is_absolute() {
    normalize(value)
  } else {
    normalize(&base.join(value))
  }
}

/// Normalize a path without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::ParentDir => {
        // Popping past the root is a no-op, so `/..` stays `/`.
        normalized.pop();
      }
      Component::CurDir => {}
      _ => normalized.push(component),
    }
  }
  normalized
}

/// Render a path the way it is stored in the options object.
pub fn display(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}
