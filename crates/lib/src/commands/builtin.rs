//! Commands every session gets: `inspect` and `build`.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, anyhow};
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::Api;
use crate::commands::Outcome;
use crate::consts::BUILD_CONFIG_FILENAME;
use crate::error::Error;
use crate::paths;

/// Event emitted by `build` before entry points are checked.
pub const BUILD_VALIDATE_EVENT: &str = "build:validate";
/// Event emitted by `build` before the configuration is written.
pub const BUILD_EMIT_EVENT: &str = "build:emit";

/// Register `inspect` and `build` on `api`.
pub fn register_builtins(api: &Api) {
  api.register("inspect", |api: &Api, _: &[Value]| api.config().to_config());
  api.register_handler(
    "build",
    Rc::new(|api: &Api, args: &[Value]| {
      let api = api.clone();
      let args = args.to_vec();
      Outcome::Deferred(async move { build(&api, &args).await }.boxed_local())
    }),
  );
}

/// Validate entry points, record them in the build configuration, and write the
/// configuration into the output directory.
async fn build(api: &Api, args: &[Value]) -> anyhow::Result<Value> {
  api.emit_for_all(BUILD_VALIDATE_EVENT, args).await.map_err(Error::into_anyhow)?;

  let (root, output, mains) = {
    let options = api.options();
    (options.root().to_path_buf(), options.output(), options.mains())
  };

  let mut entries = Vec::with_capacity(mains.len());
  for (name, path) in mains {
    let file = locate_entry(&path).ok_or_else(|| {
      anyhow!(
        "Entry module not found: Error: Can't resolve '{}' in '{}'",
        request(&path, &root),
        paths::display(&root)
      )
    })?;
    debug!(entry = %name, path = %file.display(), "resolved entry point");
    entries.push((name, file));
  }

  {
    let mut config = api.config_mut();
    for (name, file) in &entries {
      config.entry(name, paths::display(file));
    }
  }

  api.emit_for_all(BUILD_EMIT_EVENT, args).await.map_err(Error::into_anyhow)?;

  fs::create_dir_all(&output).with_context(|| format!("failed to create '{}'", output.display()))?;
  let target = output.join(BUILD_CONFIG_FILENAME);
  let rendered = serde_json::to_string_pretty(&api.config().to_config())?;
  fs::write(&target, rendered).with_context(|| format!("failed to write '{}'", target.display()))?;

  info!(path = %target.display(), entries = entries.len(), "wrote build configuration");
  Ok(Value::String(paths::display(&target)))
}

/// The file behind an entry point: the path itself, or a sibling file whose
/// stem matches (so `src/index` finds `src/index.js`).
fn locate_entry(path: &Path) -> Option<PathBuf> {
  if path.is_file() {
    return Some(path.to_path_buf());
  }
  let parent = path.parent()?;
  let name = path.file_name()?;
  let mut candidates: Vec<PathBuf> = fs::read_dir(parent)
    .ok()?
    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
    .filter(|candidate| candidate.is_file() && candidate.file_stem() == Some(name))
    .collect();
  candidates.sort();
  candidates.into_iter().next()
}

/// How an entry is named in resolution errors: `./src/index` under `base`,
/// the full path otherwise.
fn request(path: &Path, base: &Path) -> String {
  match path.strip_prefix(base) {
    Ok(relative) => format!("./{}", relative.to_string_lossy().replace('\\', "/")),
    Err(_) => paths::display(path),
  }
}
