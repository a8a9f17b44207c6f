//! Named commands and the run pipeline.
//!
//! A command handler receives the shared [`Api`] and positional arguments, and
//! either produces its value immediately or hands back a [`Deferred`] value.
//!
//! [`CommandRun::promise`] drives the full pipeline for one invocation:
//!
//! 1. apply every pending middleware in order, awaiting deferred completions
//! 2. emit `pre<name>` and wait for every handler
//! 3. invoke the command and wait for its value
//! 4. emit `<name>` and wait for every handler
//! 5. resolve with the command's value
//!
//! The first failure at any step stops the pipeline and is returned unchanged.
//!
//! # Submodules
//!
//! - [`builtin`] - The `inspect` and `build` commands

pub mod builtin;

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::api::Api;
use crate::consts::PRE_EVENT_PREFIX;
use crate::error::{Error, Result};
use crate::events::Deferred;

/// What a command handler hands back.
pub enum Outcome {
  /// The value (or failure) is already known.
  Ready(anyhow::Result<Value>),
  /// The value arrives later.
  Deferred(Deferred<Value>),
}

impl Outcome {
  /// Wait for the value. Synchronous outcomes resolve without yielding.
  pub async fn settle(self) -> anyhow::Result<Value> {
    match self {
      Outcome::Ready(result) => result,
      Outcome::Deferred(deferred) => deferred.await,
    }
  }

  pub fn is_deferred(&self) -> bool {
    matches!(self, Outcome::Deferred(_))
  }
}

impl From<Value> for Outcome {
  fn from(value: Value) -> Self {
    Outcome::Ready(Ok(value))
  }
}

impl From<()> for Outcome {
  fn from((): ()) -> Self {
    Outcome::Ready(Ok(Value::Null))
  }
}

impl From<anyhow::Result<Value>> for Outcome {
  fn from(result: anyhow::Result<Value>) -> Self {
    Outcome::Ready(result)
  }
}

impl From<Deferred<Value>> for Outcome {
  fn from(deferred: Deferred<Value>) -> Self {
    Outcome::Deferred(deferred)
  }
}

/// A registered command handler.
pub type CommandHandler = Rc<dyn Fn(&Api, &[Value]) -> Outcome>;

/// Commands by name. Registering a name twice replaces the earlier handler.
#[derive(Default, Clone)]
pub struct CommandRegistry {
  commands: BTreeMap<String, CommandHandler>,
}

impl CommandRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `handler` under `name`. Returns `true` if an earlier handler was replaced.
  pub fn register(&mut self, name: impl Into<String>, handler: CommandHandler) -> bool {
    let name = name.into();
    debug!(command = %name, "registered command");
    self.commands.insert(name, handler).is_some()
  }

  pub fn get(&self, name: &str) -> Option<CommandHandler> {
    self.commands.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.commands.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.commands.keys().map(String::as_str)
  }
}

/// A pending invocation created by [`Api::run`]. Nothing happens until
/// [`CommandRun::promise`] is awaited.
#[must_use = "a command run does nothing until `promise` is awaited"]
pub struct CommandRun {
  api: Api,
  name: String,
  args: Vec<Value>,
}

impl CommandRun {
  pub(crate) fn new(api: Api, name: String, args: Vec<Value>) -> Self {
    CommandRun { api, name, args }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn args(&self) -> &[Value] {
    &self.args
  }

  /// Run the pipeline and resolve with the command's value.
  ///
  /// # Errors
  ///
  /// * [`Error::NotRegistered`] if no command is registered under the name once
  ///   every middleware has been applied.
  /// * [`Error::Handler`] carrying the first failure of a middleware completion,
  ///   an event handler, or the command itself.
  pub async fn promise(self) -> Result<Value> {
    let CommandRun { api, name, args } = self;
    let started = Instant::now();

    api.apply_sequential().await?;

    let handler = api
      .command(&name)
      .ok_or_else(|| Error::NotRegistered(name.clone()))?;

    let pre_event = format!("{PRE_EVENT_PREFIX}{name}");
    api.emit_for_all(&pre_event, &args).await?;

    debug!(command = %name, args = args.len(), "invoking command");
    let value = handler(&api, &args).settle().await?;

    api.emit_for_all(&name, &args).await?;

    info!(command = %name, elapsed = ?started.elapsed(), "command finished");
    Ok(value)
  }
}
