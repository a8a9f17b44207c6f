//! Tests for middleware registration, including Lua modules.

use std::cell::RefCell;
use std::rc::Rc;

use kiln_lib::{Api, Error};
use serde_json::{Value, json};

use super::common::{fixture_path, session_at};

#[test]
fn middleware_receives_the_shared_session_and_no_options() {
  let api = session_at("/work");
  let seen = Rc::new(RefCell::new(None));

  let s = seen.clone();
  let expected = api.clone();
  api
    .use_fn(
      move |received: &Api, options: Option<&Value>| {
        *s.borrow_mut() = Some((received.ptr_eq(&expected), options.cloned()));
      },
      None,
    )
    .unwrap();

  assert_eq!(*seen.borrow(), Some((true, None)));
}

#[test]
fn middleware_options_are_passed_through() {
  let api = session_at("/work");
  api
    .use_fn(
      |api: &Api, options: Option<&Value>| -> anyhow::Result<()> {
        let out = options.and_then(|o| o.get("out")).cloned().unwrap_or(Value::Null);
        api.set_option("output", out)?;
        Ok(())
      },
      Some(json!({ "out": "dist" })),
    )
    .unwrap();

  assert_eq!(api.option("output"), Some(json!("/work/dist")));
}

#[test]
fn middleware_runs_in_registration_order() {
  let api = session_at("/work");
  for name in ["alpha", "beta", "gamma"] {
    api
      .use_fn(
        move |api: &Api, _: Option<&Value>| -> anyhow::Result<()> {
          let mut order = api.option("order").unwrap_or_else(|| json!([]));
          if let Some(items) = order.as_array_mut() {
            items.push(json!(name));
          }
          api.set_option("order", order)?;
          Ok(())
        },
        None,
      )
      .unwrap();
  }

  assert_eq!(api.option("order"), Some(json!(["alpha", "beta", "gamma"])));
}

#[test]
fn lua_module_mutates_the_build_config() {
  let api = session_at("/work");
  api.use_module([fixture_path("compile")], None).unwrap();

  let config = api.config().to_config();
  assert_eq!(config["module"]["rule"]["compile"]["test"], json!("\\.js$"));
  assert_eq!(config["module"]["rule"]["compile"]["use"], json!(["babel"]));
  assert_eq!(api.option("output"), Some(json!("/work/dist")));
}

#[test]
fn lua_module_list_is_applied_in_order() {
  let api = session_at("/work");
  api
    .use_module(
      [fixture_path("compile.lua"), fixture_path("nested")],
      Some(json!({ "out": "first" })),
    )
    .unwrap();

  assert_eq!(api.option("nested"), Some(json!(true)));
  assert_eq!(api.option("output"), Some(json!("/work/nested-dist")));
  assert_eq!(api.middleware_count(), 3);
}

#[test]
fn module_without_a_function_fails_to_load() {
  let api = session_at("/work");
  let err = api
    .use_module([fixture_path("compile"), fixture_path("not_a_function")], None)
    .err()
    .unwrap();

  assert!(matches!(err, Error::MiddlewareLoad { .. }));
  assert!(err.to_string().contains("must return a function, got table"));
  // Nothing from the list was registered.
  assert_eq!(api.middleware_count(), 0);
  assert!(api.config().is_empty());
}

#[test]
fn missing_module_fails_to_load() {
  let api = session_at("/work");
  let err = api.use_module(["does/not/exist"], None).err().unwrap();
  assert!(matches!(err, Error::MiddlewareLoad { .. }));
}

#[tokio::test]
async fn lua_commands_and_events_run_through_the_lifecycle() {
  let api = session_at("/work");
  api.use_module([fixture_path("lifecycle")], None).unwrap();

  let value = api.run("greet", vec![json!("world")]).promise().await.unwrap();
  assert_eq!(value, json!("hello world"));
  assert_eq!(api.option("trace"), Some(json!(["pre", "handler", "post:world"])));
}
