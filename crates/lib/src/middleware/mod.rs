//! Middleware registration and application.
//!
//! A middleware is a unit of configuration: it receives the shared [`Api`] and an
//! optional options payload, and mutates the options store or the build
//! configuration. Middleware run in registration order. A middleware may finish
//! synchronously or hand back a [`Deferred`] completion; deferred completions are
//! either parked until [`Api::settle`] or awaited one by one when
//! [`Api::apply_sequential`] is used.
//!
//! # Submodules
//!
//! - [`lua`] - Middleware modules written in Lua

pub mod lua;

use std::borrow::Cow;
use std::rc::Rc;

use serde_json::Value;

use crate::api::Api;
use crate::events::Deferred;

/// How a middleware finished.
pub enum Applied {
  /// All work happened synchronously.
  Ready,
  /// Work continues in the returned future.
  Deferred(Deferred<()>),
}

/// A unit of configuration applied to the shared [`Api`].
pub trait Middleware {
  fn apply(&self, api: &Api, options: Option<&Value>) -> anyhow::Result<Applied>;

  /// Name used in logs.
  fn name(&self) -> Cow<'_, str> {
    Cow::Borrowed("<fn>")
  }
}

/// Return types accepted from middleware closures.
pub trait IntoApplied {
  fn into_applied(self) -> anyhow::Result<Applied>;
}

impl IntoApplied for () {
  fn into_applied(self) -> anyhow::Result<Applied> {
    Ok(Applied::Ready)
  }
}

impl IntoApplied for anyhow::Result<()> {
  fn into_applied(self) -> anyhow::Result<Applied> {
    self.map(|()| Applied::Ready)
  }
}

impl IntoApplied for crate::error::Result<()> {
  fn into_applied(self) -> anyhow::Result<Applied> {
    Ok(self.map(|()| Applied::Ready)?)
  }
}

impl IntoApplied for Deferred<()> {
  fn into_applied(self) -> anyhow::Result<Applied> {
    Ok(Applied::Deferred(self))
  }
}

impl IntoApplied for Applied {
  fn into_applied(self) -> anyhow::Result<Applied> {
    Ok(self)
  }
}

impl<F, R> Middleware for F
where
  F: Fn(&Api, Option<&Value>) -> R,
  R: IntoApplied,
{
  fn apply(&self, api: &Api, options: Option<&Value>) -> anyhow::Result<Applied> {
    self(api, options).into_applied()
  }
}

/// A registered middleware and the options captured with it.
#[derive(Clone)]
pub struct MiddlewareEntry {
  pub middleware: Rc<dyn Middleware>,
  pub options: Option<Value>,
}

/// Middleware in registration order, with a cursor marking how many have been applied.
#[derive(Default)]
pub struct MiddlewareRegistry {
  entries: Vec<MiddlewareEntry>,
  applied: usize,
  /// Deferred completions of applied middleware that nobody awaited yet.
  outstanding: Vec<Deferred<()>>,
}

impl MiddlewareRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a middleware. Returns its position.
  pub fn push(&mut self, middleware: Rc<dyn Middleware>, options: Option<Value>) -> usize {
    self.entries.push(MiddlewareEntry { middleware, options });
    self.entries.len() - 1
  }

  /// Hand out the next entry that has not been applied yet and advance the cursor.
  pub fn next_pending(&mut self) -> Option<MiddlewareEntry> {
    let entry = self.entries.get(self.applied)?.clone();
    self.applied += 1;
    Some(entry)
  }

  pub fn pending(&self) -> usize {
    self.entries.len() - self.applied
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Park a deferred completion until someone settles the registry.
  pub fn park(&mut self, completion: Deferred<()>) {
    self.outstanding.push(completion);
  }

  /// Take every parked completion, in the order the middleware were applied.
  pub fn take_outstanding(&mut self) -> Vec<Deferred<()>> {
    std::mem::take(&mut self.outstanding)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn noop() -> Rc<dyn Middleware> {
    Rc::new(|_: &Api, _: Option<&Value>| {})
  }

  #[test]
  fn cursor_hands_out_entries_in_order() {
    let mut registry = MiddlewareRegistry::new();
    registry.push(noop(), None);
    registry.push(noop(), Some(serde_json::json!({ "n": 2 })));
    assert_eq!(registry.pending(), 2);

    let first = registry.next_pending().unwrap();
    assert!(first.options.is_none());
    let second = registry.next_pending().unwrap();
    assert_eq!(second.options, Some(serde_json::json!({ "n": 2 })));
    assert!(registry.next_pending().is_none());

    assert_eq!(registry.pending(), 0);
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn entries_added_later_become_pending() {
    let mut registry = MiddlewareRegistry::new();
    registry.push(noop(), None);
    registry.next_pending();
    registry.push(noop(), None);
    assert_eq!(registry.pending(), 1);
  }
}
