//! Implementation of the `kiln options` command.
//!
//! Prints the options every middleware has settled on: the root, the derived
//! paths (marking pinned ones), the entry points, and any other keys.

use anyhow::{Context, Result};

use kiln_lib::Api;
use kiln_lib::options::PathKey;
use kiln_lib::paths;

use crate::cmd::session::open_session;
use crate::output::{OutputFormat, print_info, print_json, print_stat};

pub fn cmd_options(session: &super::SessionArgs, format: OutputFormat) -> Result<()> {
  let api = open_session(session)?;

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;
  rt.block_on(api.apply_sequential())
    .map_err(kiln_lib::Error::into_anyhow)?;

  if format.is_json() {
    return print_json(&api.options().to_value());
  }

  print_text(&api);
  Ok(())
}

fn print_text(api: &Api) {
  let options = api.options();

  print_info("Paths");
  print_stat("root", &paths::display(options.root()));
  for key in PathKey::ALL {
    let mut value = paths::display(&options.path(key));
    if options.is_pinned(key) {
      value.push_str(" (pinned)");
    }
    print_stat(key.as_str(), &value);
  }

  print_info("Entry points");
  for (name, path) in options.mains() {
    let mut value = paths::display(&path);
    if options.is_main_pinned(&name) == Some(true) {
      value.push_str(" (pinned)");
    }
    print_stat(&name, &value);
  }

  if !options.extra().is_empty() {
    print_info("Options");
    for (key, value) in options.extra() {
      print_stat(key, &value.to_string());
    }
  }
}
