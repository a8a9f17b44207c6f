//! Implementation of the `kiln inspect` command.

use anyhow::{Context, Result};

use crate::cmd::session::open_session;
use crate::output::print_json;

pub fn cmd_inspect(session: &super::SessionArgs) -> Result<()> {
  let api = open_session(session)?;

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;
  let config = rt
    .block_on(api.run("inspect", Vec::new()).promise())
    .map_err(kiln_lib::Error::into_anyhow)?;

  print_json(&config)
}
