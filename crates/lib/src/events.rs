//! Named events with fan-out emission.
//!
//! Handlers are registered per event name and kept in registration order.
//! Emitting an event starts every handler before awaiting any of them, waits for
//! all of them to settle, and then reports results in registration order. If any
//! handler failed, the failure of the earliest-registered one is returned, so the
//! outcome never depends on which handler happened to finish first.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use serde_json::Value;
use tracing::debug;

/// Work that completes later on the current thread.
pub type Deferred<T> = LocalBoxFuture<'static, anyhow::Result<T>>;

/// A registered event handler. Receives the emitted arguments.
pub type EventHandler = Rc<dyn Fn(&[Value]) -> Deferred<Value>>;

#[derive(Default, Clone)]
pub struct EventBus {
  handlers: BTreeMap<String, Vec<EventHandler>>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  /// Subscribe an asynchronous handler to `event`.
  pub fn on<F, Fut>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
  where
    F: Fn(&[Value]) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + 'static,
  {
    self.subscribe(event.into(), Rc::new(move |args| handler(args).boxed_local()))
  }

  /// Subscribe a handler that produces its result immediately.
  pub fn on_sync<F>(&mut self, event: impl Into<String>, handler: F) -> &mut Self
  where
    F: Fn(&[Value]) -> anyhow::Result<Value> + 'static,
  {
    self.subscribe(
      event.into(),
      Rc::new(move |args| future::ready(handler(args)).boxed_local()),
    )
  }

  /// Subscribe an already type-erased handler.
  pub fn subscribe(&mut self, event: String, handler: EventHandler) -> &mut Self {
    let handlers = self.handlers.entry(event).or_default();
    handlers.push(handler);
    debug!(count = handlers.len(), "subscribed event handler");
    self
  }

  /// Snapshot of the handlers for `event`, in registration order.
  pub fn handlers(&self, event: &str) -> Vec<EventHandler> {
    self.handlers.get(event).cloned().unwrap_or_default()
  }

  pub fn listener_count(&self, event: &str) -> usize {
    self.handlers.get(event).map_or(0, Vec::len)
  }

  /// Names of every event with at least one handler.
  pub fn events(&self) -> impl Iterator<Item = &str> {
    self.handlers.keys().map(String::as_str)
  }

  /// Emit `event` to every subscribed handler. See [`emit_all`].
  pub async fn emit_for_all(&self, event: &str, args: &[Value]) -> anyhow::Result<Vec<Value>> {
    emit_all(self.handlers(event), args).await
  }
}

impl fmt::Debug for EventBus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map()
      .entries(self.handlers.iter().map(|(event, handlers)| (event, handlers.len())))
      .finish()
  }
}

/// Run `handlers` concurrently and collect their results in registration order.
///
/// Every handler is invoked before any of them is awaited. Once all of them
/// have settled, the values are returned in registration order, or the error of
/// the earliest-registered failing handler is returned unchanged. No handlers
/// yields an empty vector.
pub async fn emit_all(handlers: Vec<EventHandler>, args: &[Value]) -> anyhow::Result<Vec<Value>> {
  if handlers.is_empty() {
    return Ok(Vec::new());
  }

  debug!(handlers = handlers.len(), "fanning out event");
  let pending: Vec<_> = handlers.iter().map(|handler| handler(args)).collect();
  let settled = future::join_all(pending).await;

  // `collect` stops at the first `Err` in iteration order, which is registration order.
  settled.into_iter().collect()
}
