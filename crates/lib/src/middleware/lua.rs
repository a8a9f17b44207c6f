//! Middleware modules written in Lua.
//!
//! A middleware module is a Lua file that returns a function:
//!
//! ```lua
//! return function(api, options)
//!   api:set("output", "dist")
//!   api:config("module.rule.compile.test", "\\.js$")
//! end
//! ```
//!
//! Module files are evaluated with a private environment containing `__dir`, the
//! directory of the file, and falling back to `_G` for everything else.
//!
//! The `api` argument is a userdata wrapping the shared [`Api`]:
//!
//! | method                    | effect                                         |
//! |---------------------------|------------------------------------------------|
//! | `api:get(key)`            | read an option (paths resolved)                |
//! | `api:set(key, value)`     | assign an option (pins path keys)              |
//! | `api:merge(table)`        | deep-merge a partial options table             |
//! | `api:config(path, value)` | set a value in the build configuration         |
//! | `api:on(event, fn)`       | subscribe `fn(...)` to an event                |
//! | `api:register(name, fn)`  | register `fn(api, ...)` as a command           |
//! | `api:use(path, options)`  | load another middleware module                 |

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::FutureExt;
use mlua::prelude::*;
use serde_json::Value;
use tracing::debug;

use super::{Applied, Middleware};
use crate::api::{Api, WeakApi};
use crate::commands::Outcome;
use crate::error::{Error, Result};

/// A Lua function loaded from a middleware module.
pub struct LuaMiddleware {
  path: PathBuf,
  function: LuaFunction,
}

impl LuaMiddleware {
  /// Locate, evaluate, and validate the module at `path`.
  ///
  /// `path` may name the file directly, or omit the extension, in which case
  /// `<path>.lua` and `<path>/init.lua` are tried in that order.
  ///
  /// # Errors
  ///
  /// * [`Error::MiddlewareLoad`] if no file is found, the file fails to
  ///   evaluate, or it returns anything other than a function.
  pub fn load(lua: &Lua, path: &Path) -> Result<Self> {
    let file = locate_module(path).ok_or_else(|| Error::middleware_load(path, "module not found"))?;
    let value = load_file_with_dir(lua, &file).map_err(|e| Error::middleware_load(&file, e.to_string()))?;

    match value {
      LuaValue::Function(function) => {
        debug!(path = %file.display(), "loaded middleware module");
        Ok(LuaMiddleware { path: file, function })
      }
      other => Err(Error::middleware_load(
        &file,
        format!("module must return a function, got {}", other.type_name()),
      )),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Middleware for LuaMiddleware {
  fn apply(&self, api: &Api, options: Option<&Value>) -> anyhow::Result<Applied> {
    let lua = api.lua()?;
    let options = match options {
      Some(options) => lua.to_value(options)?,
      None => LuaValue::Nil,
    };
    self.function.call::<()>((LuaApi::new(api), options))?;
    Ok(Applied::Ready)
  }

  fn name(&self) -> Cow<'_, str> {
    Cow::Owned(self.path.display().to_string())
  }
}

/// Create the Lua state shared by every middleware module of a session.
///
/// `package.path` is extended so `require` finds modules under `root` and
/// `root/lua`.
pub fn create_runtime(root: &Path) -> LuaResult<Lua> {
  let lua = Lua::new();
  let package = lua.globals().get::<LuaTable>("package")?;
  let package_path = package.get::<String>("path")?;
  let root = root.display();
  package.set(
    "path",
    format!("{root}/?.lua;{root}/?/init.lua;{root}/lua/?.lua;{root}/lua/?/init.lua;{package_path}"),
  )?;
  Ok(lua)
}

/// Find the file backing a module reference.
fn locate_module(path: &Path) -> Option<PathBuf> {
  if path.is_file() {
    return Some(path.to_path_buf());
  }
  if path.extension().is_some() {
    return None;
  }
  [path.with_extension("lua"), path.join("init.lua")]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Evaluate a Lua file in an environment that exposes `__dir`.
fn load_file_with_dir(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let canonical_path = dunce::canonicalize(path)
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let content = fs::read_to_string(&canonical_path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical_path.display(), e)))?;

  let dir = canonical_path
    .parent()
    .unwrap_or(Path::new("."))
    .to_string_lossy()
    .into_owned();

  let env = lua.create_table()?;
  env.set("__dir", dir)?;

  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  mt.set("__newindex", lua.globals())?;
  env.set_metatable(Some(mt))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical_path.display()))
    .set_environment(env)
    .eval::<LuaValue>()
}

/// Convert emitted arguments into Lua values.
fn to_lua_args(lua: &Lua, args: &[Value]) -> LuaResult<Vec<LuaValue>> {
  args.iter().map(|arg| lua.to_value(arg)).collect()
}

/// The `api` object handed to Lua middleware.
///
/// Holds the session weakly: Lua closures that keep `api` end up stored on the
/// session as event and command handlers.
struct LuaApi(WeakApi);

impl LuaApi {
  fn new(api: &Api) -> Self {
    LuaApi(api.downgrade())
  }

  fn api(&self) -> LuaResult<Api> {
    self.0.upgrade().ok_or_else(|| LuaError::runtime("build session has been dropped"))
  }
}

impl LuaUserData for LuaApi {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method("get", |lua, this, key: String| match this.api()?.option(&key) {
      Some(value) => lua.to_value(&value),
      None => Ok(LuaValue::Nil),
    });

    methods.add_method("set", |lua, this, (key, value): (String, LuaValue)| {
      let value: Value = lua.from_value(value)?;
      this.api()?.set_option(&key, value).map_err(LuaError::external)
    });

    methods.add_method("merge", |lua, this, partial: LuaValue| {
      let partial: Value = lua.from_value(partial)?;
      this.api()?.merge_options(partial).map_err(LuaError::external)
    });

    methods.add_method("config", |lua, this, (path, value): (String, LuaValue)| {
      let value: Value = lua.from_value(value)?;
      this.api()?.config_mut().set(&path, value);
      Ok(())
    });

    methods.add_method("on", |_, this, (event, function): (String, LuaFunction)| {
      let lua = this.api()?.lua().map_err(LuaError::external)?;
      this.api()?.on_sync(event, move |args| {
        let args = LuaMultiValue::from_vec(to_lua_args(&lua, args)?);
        let result: LuaValue = function.call(args)?;
        Ok(lua.from_value(result)?)
      });
      Ok(())
    });

    methods.add_method("register", |_, this, (name, function): (String, LuaFunction)| {
      let lua = this.api()?.lua().map_err(LuaError::external)?;
      this.api()?.register_handler(
        name,
        Rc::new(move |api: &Api, args: &[Value]| {
          let result = call_command(&lua, &function, api, args);
          Outcome::Deferred(futures::future::ready(result).boxed_local())
        }),
      );
      Ok(())
    });

    methods.add_method("use", |lua, this, (path, options): (String, Option<LuaValue>)| {
      let options = match options {
        Some(options) => Some(lua.from_value::<Value>(options)?),
        None => None,
      };
      this.api()?.use_module([path], options).map(|_| ()).map_err(LuaError::external)
    });
  }
}

fn call_command(lua: &Lua, function: &LuaFunction, api: &Api, args: &[Value]) -> anyhow::Result<Value> {
  let mut values = vec![LuaValue::UserData(lua.create_userdata(LuaApi::new(api))?)];
  values.extend(to_lua_args(lua, args)?);
  let result: LuaValue = function.call(LuaMultiValue::from_vec(values))?;
  Ok(lua.from_value(result)?)
}
