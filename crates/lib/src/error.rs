//! Error types for the kiln engine.

use std::path::PathBuf;

use mlua::prelude::LuaError;

/// Errors surfaced by the options store, the registries, and the command pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A value of the wrong shape was handed to the options store.
  #[error("invalid value for option '{key}': {reason}")]
  InvalidOption { key: String, reason: String },

  /// `call` or `run` was invoked with an unknown command name.
  #[error("command '{0}' was not registered")]
  NotRegistered(String),

  /// A middleware module could not be loaded, or did not export a function.
  #[error("failed to load middleware '{}': {reason}", path.display())]
  MiddlewareLoad { path: PathBuf, reason: String },

  /// Lua evaluation error raised by a middleware module.
  #[error("lua error: {0}")]
  Lua(#[from] LuaError),

  /// I/O error.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// JSON (de)serialization error.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// Failure reported by an event handler, a command handler, or a middleware
  /// completion. The original error is kept as-is so callers can match on its
  /// message or downcast it.
  #[error(transparent)]
  Handler(anyhow::Error),
}

impl From<anyhow::Error> for Error {
  /// Recover a kiln error that travelled through a handler, so its variant
  /// survives; anything else becomes [`Error::Handler`].
  fn from(err: anyhow::Error) -> Self {
    err.downcast::<Error>().unwrap_or_else(Error::Handler)
  }
}

impl Error {
  pub(crate) fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
    Error::InvalidOption {
      key: key.into(),
      reason: reason.into(),
    }
  }

  pub(crate) fn middleware_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Error::MiddlewareLoad {
      path: path.into(),
      reason: reason.into(),
    }
  }

  /// Returns the handler failure carried by this error, if any.
  pub fn as_handler(&self) -> Option<&anyhow::Error> {
    match self {
      Error::Handler(err) => Some(err),
      _ => None,
    }
  }

  /// Convert into an `anyhow::Error`, unwrapping handler failures so they are
  /// never wrapped twice.
  pub fn into_anyhow(self) -> anyhow::Error {
    match self {
      Error::Handler(err) => err,
      other => other.into(),
    }
  }
}

/// Result type alias for kiln operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kiln_errors_keep_their_variant_through_anyhow() {
    let err = Error::from(anyhow::Error::from(Error::invalid_option("output", "expected a string")));
    assert!(matches!(err, Error::InvalidOption { ref key, .. } if key == "output"));

    let err = Error::from(anyhow::anyhow!("boom"));
    assert_eq!(err.as_handler().map(|err| err.to_string()).as_deref(), Some("boom"));
  }
}
