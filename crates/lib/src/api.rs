//! The shared context handed to every middleware, event handler, and command.
//!
//! An [`Api`] is a cheap handle: cloning it yields another reference to the same
//! options store, build configuration, event bus, middleware registry, and
//! command registry. All state lives behind `RefCell`s on a single thread.
//! Borrows are never held across a call into user code or an `.await`, so
//! middleware and handlers are free to call back into the `Api`.

use std::cell::{OnceCell, Ref, RefCell, RefMut};
use std::future::Future;
use std::path::Path;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future;
use mlua::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

use crate::commands::{CommandHandler, CommandRegistry, CommandRun, Outcome};
use crate::config::BuildConfig;
use crate::consts::ENV_KEY;
use crate::error::{Error, Result};
use crate::events::{self, EventBus};
use crate::middleware::lua::{LuaMiddleware, create_runtime};
use crate::middleware::{Applied, Middleware, MiddlewareRegistry};
use crate::options::Options;
use crate::paths;

struct ApiInner {
  options: RefCell<Options>,
  config: RefCell<BuildConfig>,
  events: RefCell<EventBus>,
  middleware: RefCell<MiddlewareRegistry>,
  commands: RefCell<CommandRegistry>,
  lua: OnceCell<Rc<Lua>>,
}

/// Handle to the shared build session.
#[derive(Clone)]
pub struct Api {
  inner: Rc<ApiInner>,
}

/// A handle that does not keep the session alive. Handed to Lua, whose
/// closures are in turn stored on the session.
#[derive(Clone)]
pub(crate) struct WeakApi {
  inner: Weak<ApiInner>,
}

impl WeakApi {
  pub(crate) fn upgrade(&self) -> Option<Api> {
    self.inner.upgrade().map(|inner| Api { inner })
  }
}

impl Api {
  /// Create a session rooted at the process working directory.
  ///
  /// `overrides` is an options object (or `null`). See [`Api::with_cwd`].
  pub fn new(overrides: Value) -> Result<Self> {
    let cwd = std::env::current_dir()?;
    Self::with_cwd(cwd, overrides)
  }

  /// Create a session rooted at `cwd`.
  ///
  /// Overrides are applied as construction-time options: a `mains` object
  /// replaces the default entry set, everything else is merged. If the resulting
  /// options carry an `env` object, each of its entries is exported to the
  /// process environment once, here.
  pub fn with_cwd(cwd: impl AsRef<Path>, overrides: Value) -> Result<Self> {
    let options = Options::with_overrides(cwd, overrides)?;
    export_env(&options);

    let api = Api {
      inner: Rc::new(ApiInner {
        options: RefCell::new(options),
        config: RefCell::new(BuildConfig::new()),
        events: RefCell::new(EventBus::new()),
        middleware: RefCell::new(MiddlewareRegistry::new()),
        commands: RefCell::new(CommandRegistry::new()),
        lua: OnceCell::new(),
      }),
    };
    debug!(root = %paths::display(api.options().root()), "created session");
    Ok(api)
  }

  pub(crate) fn downgrade(&self) -> WeakApi {
    WeakApi {
      inner: Rc::downgrade(&self.inner),
    }
  }

  /// Whether two handles refer to the same session.
  pub fn ptr_eq(&self, other: &Api) -> bool {
    Rc::ptr_eq(&self.inner, &other.inner)
  }

  // Options

  pub fn options(&self) -> Ref<'_, Options> {
    self.inner.options.borrow()
  }

  /// Mutable access to the options store. Drop the guard before calling back
  /// into middleware or handlers.
  pub fn options_mut(&self) -> RefMut<'_, Options> {
    self.inner.options.borrow_mut()
  }

  /// Read any option by key. See [`Options::get`].
  pub fn option(&self, key: &str) -> Option<Value> {
    self.options().get(key)
  }

  /// Assign any option by key. See [`Options::set`].
  pub fn set_option(&self, key: &str, value: Value) -> Result<()> {
    self.options_mut().set(key, value)
  }

  /// Merge a partial options object. See [`Options::merge`].
  pub fn merge_options(&self, partial: Value) -> Result<()> {
    self.options_mut().merge(partial)
  }

  // Build configuration

  pub fn config(&self) -> Ref<'_, BuildConfig> {
    self.inner.config.borrow()
  }

  pub fn config_mut(&self) -> RefMut<'_, BuildConfig> {
    self.inner.config.borrow_mut()
  }

  // Events

  /// Subscribe an asynchronous handler to `event`.
  pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F) -> &Self
  where
    F: Fn(&[Value]) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + 'static,
  {
    self.inner.events.borrow_mut().on(event, handler);
    self
  }

  /// Subscribe a handler that produces its result immediately.
  pub fn on_sync<F>(&self, event: impl Into<String>, handler: F) -> &Self
  where
    F: Fn(&[Value]) -> anyhow::Result<Value> + 'static,
  {
    self.inner.events.borrow_mut().on_sync(event, handler);
    self
  }

  pub fn listener_count(&self, event: &str) -> usize {
    self.inner.events.borrow().listener_count(event)
  }

  /// Emit `event` to every handler and collect their values in registration order.
  ///
  /// # Errors
  ///
  /// * [`Error::Handler`] carrying the failure of the earliest-registered
  ///   handler that failed.
  pub async fn emit_for_all(&self, event: &str, args: &[Value]) -> Result<Vec<Value>> {
    let handlers = self.inner.events.borrow().handlers(event);
    debug!(event, "emitting event");
    Ok(events::emit_all(handlers, args).await?)
  }

  // Middleware

  /// Register a middleware closure and apply it immediately.
  ///
  /// The closure may return `()`, an `anyhow::Result<()>`, or a deferred
  /// completion; deferred completions are awaited by [`Api::settle`] or the next
  /// command run.
  pub fn use_fn<F, R>(&self, middleware: F, options: Option<Value>) -> Result<&Self>
  where
    F: Fn(&Api, Option<&Value>) -> R + 'static,
    R: crate::middleware::IntoApplied,
  {
    self.use_middleware(Rc::new(middleware), options)
  }

  /// Register any [`Middleware`] and apply it immediately.
  pub fn use_middleware(&self, middleware: Rc<dyn Middleware>, options: Option<Value>) -> Result<&Self> {
    self.inner.middleware.borrow_mut().push(middleware, options);
    self.apply()?;
    Ok(self)
  }

  /// Load one or more Lua middleware modules and apply them in list order.
  ///
  /// Relative paths resolve against `root`. Every module is loaded before any of
  /// them is registered, so a module that fails to load registers nothing.
  ///
  /// # Errors
  ///
  /// * [`Error::MiddlewareLoad`] if a module is missing or does not return a function.
  /// * [`Error::Handler`] if a module fails while it is applied.
  pub fn use_module<I, P>(&self, modules: I, options: Option<Value>) -> Result<&Self>
  where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
  {
    let root = self.options().root().to_path_buf();
    let lua = self.lua()?;
    let loaded = modules
      .into_iter()
      .map(|module| LuaMiddleware::load(&lua, &paths::resolve(&root, module)))
      .collect::<Result<Vec<_>>>()?;

    {
      let mut registry = self.inner.middleware.borrow_mut();
      for middleware in loaded {
        registry.push(Rc::new(middleware), options.clone());
      }
    }
    self.apply()?;
    Ok(self)
  }

  /// Register a middleware closure without applying it. It runs on the next
  /// [`Api::apply`] or command run.
  pub fn queue_fn<F, R>(&self, middleware: F, options: Option<Value>) -> &Self
  where
    F: Fn(&Api, Option<&Value>) -> R + 'static,
    R: crate::middleware::IntoApplied,
  {
    self.inner.middleware.borrow_mut().push(Rc::new(middleware), options);
    self
  }

  /// Initiate every pending middleware in registration order.
  ///
  /// Deferred completions are not awaited here; they are parked until
  /// [`Api::settle`] or [`Api::apply_sequential`].
  pub fn apply(&self) -> Result<()> {
    while let Some(entry) = self.next_pending() {
      debug!(middleware = %entry.middleware.name(), "applying middleware");
      match entry.middleware.apply(self, entry.options.as_ref())? {
        Applied::Ready => {}
        Applied::Deferred(completion) => self.inner.middleware.borrow_mut().park(completion),
      }
    }
    Ok(())
  }

  /// Await every parked middleware completion.
  ///
  /// # Errors
  ///
  /// * [`Error::Handler`] carrying the failure of the earliest-applied
  ///   middleware whose completion failed.
  pub async fn settle(&self) -> Result<()> {
    let outstanding = self.inner.middleware.borrow_mut().take_outstanding();
    if outstanding.is_empty() {
      return Ok(());
    }
    debug!(count = outstanding.len(), "settling middleware");
    let settled = future::join_all(outstanding).await;
    settled.into_iter().collect::<anyhow::Result<Vec<()>>>()?;
    Ok(())
  }

  /// Settle parked completions, then apply every pending middleware one at a
  /// time, awaiting each deferred completion before initiating the next entry.
  pub async fn apply_sequential(&self) -> Result<()> {
    self.settle().await?;
    while let Some(entry) = self.next_pending() {
      debug!(middleware = %entry.middleware.name(), "applying middleware in sequence");
      if let Applied::Deferred(completion) = entry.middleware.apply(self, entry.options.as_ref())? {
        completion.await?;
      }
      // Middleware applied along the way may have parked completions of their own.
      self.settle().await?;
    }
    Ok(())
  }

  pub fn middleware_count(&self) -> usize {
    self.inner.middleware.borrow().len()
  }

  fn next_pending(&self) -> Option<crate::middleware::MiddlewareEntry> {
    self.inner.middleware.borrow_mut().next_pending()
  }

  // Commands

  /// Register a command whose handler produces a value, a result, or `()`.
  pub fn register<F, R>(&self, name: impl Into<String>, handler: F) -> &Self
  where
    F: Fn(&Api, &[Value]) -> R + 'static,
    R: Into<Outcome>,
  {
    self.register_handler(
      name,
      Rc::new(move |api: &Api, args: &[Value]| -> Outcome { handler(api, args).into() }),
    )
  }

  /// Register a command whose handler is asynchronous.
  pub fn register_async<F, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
  where
    F: Fn(&Api, &[Value]) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + 'static,
  {
    self.register_handler(
      name,
      Rc::new(move |api: &Api, args: &[Value]| Outcome::Deferred(handler(api, args).boxed_local())),
    )
  }

  /// Register an already type-erased handler. Replaces any handler with the same name.
  pub fn register_handler(&self, name: impl Into<String>, handler: CommandHandler) -> &Self {
    let name = name.into();
    if self.inner.commands.borrow_mut().register(name.clone(), handler) {
      warn!(command = %name, "replaced existing command");
    }
    self
  }

  pub fn command(&self, name: &str) -> Option<CommandHandler> {
    self.inner.commands.borrow().get(name)
  }

  /// Names of every registered command.
  pub fn commands(&self) -> Vec<String> {
    self.inner.commands.borrow().names().map(str::to_string).collect()
  }

  /// Invoke a command directly and hand back its outcome.
  ///
  /// No middleware is applied and no events are emitted.
  ///
  /// # Errors
  ///
  /// * [`Error::NotRegistered`] if `name` is unknown. The handler is not invoked.
  pub fn call(&self, name: &str, args: &[Value]) -> Result<Outcome> {
    let handler = self.command(name).ok_or_else(|| Error::NotRegistered(name.to_string()))?;
    Ok(handler(self, args))
  }

  /// Prepare a full command run. Nothing happens until [`CommandRun::promise`]
  /// is awaited, and an unknown name is only reported there.
  pub fn run(&self, name: impl Into<String>, args: Vec<Value>) -> CommandRun {
    CommandRun::new(self.clone(), name.into(), args)
  }

  // Lua

  /// The session's Lua state, created on first use.
  pub(crate) fn lua(&self) -> Result<Rc<Lua>> {
    if let Some(lua) = self.inner.lua.get() {
      return Ok(lua.clone());
    }
    let lua = Rc::new(create_runtime(self.options().root())?);
    let _ = self.inner.lua.set(lua.clone());
    Ok(lua)
  }
}

/// Export the `env` option to the process environment.
fn export_env(options: &Options) {
  let Some(Value::Object(env)) = options.extra().get(ENV_KEY) else {
    return;
  };
  for (key, value) in env {
    let value = match value {
      Value::String(s) => s.clone(),
      Value::Null => continue,
      other => other.to_string(),
    };
    debug!(key = %key, "exporting environment variable");
    // SAFETY: sessions are created before any worker threads exist; the engine
    // itself is single-threaded.
    unsafe { std::env::set_var(key, value) };
  }
}
