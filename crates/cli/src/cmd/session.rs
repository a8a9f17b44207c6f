//! Session setup shared by every subcommand.
//!
//! Options are layered in this order, later layers winning:
//!
//! 1. the project file (`kiln.json` in the working directory, or `--config`)
//! 2. `--option key=value` flags, in the order given
//! 3. `--root`
//!
//! `--option mains.<name>=path` is the exception: it pins that one entry once
//! the session exists, resolved against the final `source`, and leaves the
//! other entries in place.
//!
//! Middleware modules from the project file are loaded before `--use` modules.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use kiln_lib::Api;
use kiln_lib::commands::builtin::register_builtins;
use kiln_lib::consts::{MAINS_KEY, ROOT_KEY};
use kiln_lib::options::deep_merge;
use kiln_lib::project::ProjectFile;

#[derive(Debug, Clone, Default, Args)]
pub struct SessionArgs {
  /// Project file (default: kiln.json in the working directory)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Project root, relative to the working directory
  #[arg(long, global = true)]
  pub root: Option<PathBuf>,

  /// Middleware module to load (repeatable)
  #[arg(long = "use", value_name = "MODULE", global = true)]
  pub modules: Vec<PathBuf>,

  /// Option override as key=value; dotted keys nest, mains.<name> sets one entry (repeatable)
  #[arg(long = "option", value_name = "KEY=VALUE", global = true)]
  pub options: Vec<String>,
}

/// Build a session from the project file and flags, with builtin commands
/// registered and every middleware module applied.
pub fn open_session(args: &SessionArgs) -> Result<Api> {
  let cwd = std::env::current_dir().context("Failed to read working directory")?;
  open_session_at(&cwd, args)
}

fn open_session_at(cwd: &Path, args: &SessionArgs) -> Result<Api> {
  let project = match &args.config {
    Some(path) => ProjectFile::load(path).with_context(|| format!("Failed to load project file: {}", path.display()))?,
    None => ProjectFile::discover(cwd)
      .context("Failed to load project file")?
      .unwrap_or_default(),
  };

  let (overrides, entries) = layer_overrides(&project, args)?;
  let api = Api::with_cwd(cwd, overrides).map_err(kiln_lib::Error::into_anyhow)?;
  for (key, value) in entries {
    api
      .set_option(&key, value)
      .map_err(kiln_lib::Error::into_anyhow)
      .with_context(|| format!("Invalid option '{}'", key))?;
  }
  register_builtins(&api);

  let root = api.options().root().to_path_buf();
  if !root.is_dir() {
    warn!(root = %root.display(), "project root does not exist");
  }

  let modules: Vec<PathBuf> = project
    .use_
    .iter()
    .cloned()
    .chain(args.modules.iter().map(|module| absolute(cwd, module)))
    .collect();
  if !modules.is_empty() {
    debug!(count = modules.len(), "loading middleware modules");
    api
      .use_module(&modules, None)
      .map_err(kiln_lib::Error::into_anyhow)
      .context("Failed to apply middleware")?;
  }

  Ok(api)
}

/// Construction overrides, plus the `mains.<name>` assignments to apply once
/// the session exists.
fn layer_overrides(project: &ProjectFile, args: &SessionArgs) -> Result<(Value, Vec<(String, Value)>)> {
  let mut overrides = project.overrides();
  let mut entries = Vec::new();
  for option in &args.options {
    let (key, value) = parse_option(option)?;
    if is_entry_key(&key) {
      entries.push((key, value));
    } else {
      deep_merge(&mut overrides, nest(&key, value));
    }
  }
  if let Some(root) = &args.root {
    let mut partial = Map::new();
    partial.insert(ROOT_KEY.to_string(), Value::String(root.to_string_lossy().into_owned()));
    deep_merge(&mut overrides, Value::Object(partial));
  }
  Ok((overrides, entries))
}

fn is_entry_key(key: &str) -> bool {
  key
    .strip_prefix(MAINS_KEY)
    .and_then(|rest| rest.strip_prefix('.'))
    .is_some_and(|name| !name.is_empty())
}

/// Split `key=value`, parsing the value as JSON and falling back to a string.
fn parse_option(option: &str) -> Result<(String, Value)> {
  let Some((key, value)) = option.split_once('=') else {
    bail!("Invalid option '{}': expected KEY=VALUE", option);
  };
  let key = key.trim();
  if key.is_empty() {
    bail!("Invalid option '{}': empty key", option);
  }
  Ok((key.to_string(), parse_value(value)))
}

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Turn `a.b.c` and a value into `{ "a": { "b": { "c": value } } }`.
fn nest(key: &str, value: Value) -> Value {
  key.rsplit('.').fold(value, |inner, segment| {
    let mut map = Map::new();
    map.insert(segment.to_string(), inner);
    Value::Object(map)
  })
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() { path.to_path_buf() } else { cwd.join(path) }
}
