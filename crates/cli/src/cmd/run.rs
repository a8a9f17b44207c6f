//! Implementation of `kiln run` and `kiln build`.
//!
//! Opens a session, runs the named command through its lifecycle
//! (`pre<name>`, the handler, `<name>`), and prints the value it resolved with.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cmd::session::{open_session, parse_value};
use crate::output::{OutputFormat, print_json, print_success, print_value};

pub fn cmd_run(session: &super::SessionArgs, command: &str, args: &[String], format: OutputFormat) -> Result<()> {
  let started = Instant::now();
  let api = open_session(session)?;
  let args: Vec<Value> = args.iter().map(|arg| parse_value(arg)).collect();

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;
  let value = rt
    .block_on(api.run(command, args).promise())
    .map_err(kiln_lib::Error::into_anyhow)?;

  if format.is_json() {
    print_json(&value)?;
  } else {
    print_value(&value);
    let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
    print_success(&format!("{} finished in {}", command, humantime::format_duration(elapsed)));
  }

  Ok(())
}
