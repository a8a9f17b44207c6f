//! Tests for command registration and the run lifecycle.

use std::cell::RefCell;
use std::rc::Rc;

use kiln_lib::commands::builtin::register_builtins;
use kiln_lib::consts::BUILD_CONFIG_FILENAME;
use kiln_lib::{Api, Error};
use serde_json::{Value, json};

use super::common::{TestProject, session_at};

#[test]
fn call_before_register_is_not_registered() {
  let api = session_at("/work");
  let err = api.call("x", &[]).err().unwrap();
  assert!(matches!(err, Error::NotRegistered(ref name) if name == "x"));
  assert!(err.to_string().contains("was not registered"));
}

#[tokio::test]
async fn call_invokes_the_handler_directly() {
  let api = session_at("/work");
  api.register("sum", |_: &Api, args: &[Value]| {
    json!(args.iter().filter_map(Value::as_i64).sum::<i64>())
  });

  let value = api.call("sum", &[json!(1), json!(2)]).ok().unwrap().settle().await.unwrap();
  assert_eq!(value, json!(3));
}

#[tokio::test]
async fn run_on_an_unknown_name_rejects() {
  let api = session_at("/work");
  let run = api.run("nope", vec![]);
  let err = run.promise().await.unwrap_err();
  assert!(err.to_string().contains("was not registered"));
}

#[tokio::test]
async fn handler_rejection_is_not_wrapped() {
  let api = session_at("/work");
  api.register_async("build", |_, _| async { Err::<Value, _>(anyhow::anyhow!("boom")) });

  let err = api.run("build", vec![]).promise().await.unwrap_err();
  assert_eq!(err.to_string(), "boom");
  assert_eq!(err.into_anyhow().to_string(), "boom");
}

#[tokio::test]
async fn lifecycle_events_wrap_the_handler() {
  let api = session_at("/work");
  let trace = Rc::new(RefCell::new(Vec::new()));

  let t = trace.clone();
  api.on_sync("test", move |_| {
    t.borrow_mut().push("post");
    Ok(Value::Null)
  });
  let t = trace.clone();
  api.on_sync("pretest", move |args| {
    t.borrow_mut().push("pre");
    assert_eq!(args, [json!("arg")]);
    Ok(Value::Null)
  });
  let t = trace.clone();
  api.register("test", move |_: &Api, _: &[Value]| {
    t.borrow_mut().push("handler");
    json!("done")
  });

  let value = api.run("test", vec![json!("arg")]).promise().await.unwrap();
  assert_eq!(value, json!("done"));
  assert_eq!(*trace.borrow(), vec!["pre", "handler", "post"]);
}

#[tokio::test]
async fn pre_event_failure_skips_the_handler() {
  let api = session_at("/work");
  let called = Rc::new(RefCell::new(false));
  api.on_sync("pretest", |_| Err(anyhow::anyhow!("not ready")));
  let c = called.clone();
  api.register("test", move |_: &Api, _: &[Value]| {
    *c.borrow_mut() = true;
  });

  let err = api.run("test", vec![]).promise().await.unwrap_err();
  assert_eq!(err.to_string(), "not ready");
  assert!(!*called.borrow());
}

#[tokio::test]
async fn run_applies_queued_middleware_in_sequence() {
  let api = session_at("/work");
  let order = Rc::new(RefCell::new(Vec::new()));

  let o = order.clone();
  api.queue_fn(
    move |_: &Api, _: Option<&Value>| {
      let o = o.clone();
      let completion: kiln_lib::events::Deferred<()> = Box::pin(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        o.borrow_mut().push("slow");
        Ok::<(), anyhow::Error>(())
      });
      completion
    },
    None,
  );
  let o = order.clone();
  api.queue_fn(move |_: &Api, _: Option<&Value>| o.borrow_mut().push("fast"), None);
  api.register("noop", |_: &Api, _: &[Value]| ());

  api.run("noop", vec![]).promise().await.unwrap();
  assert_eq!(*order.borrow(), vec!["slow", "fast"]);
}

#[tokio::test]
async fn commands_registered_by_middleware_are_visible_to_run() {
  let api = session_at("/work");
  api.queue_fn(
    |api: &Api, _: Option<&Value>| {
      api.register("late", |_: &Api, _: &[Value]| json!("registered late"));
    },
    None,
  );

  let value = api.run("late", vec![]).promise().await.unwrap();
  assert_eq!(value, json!("registered late"));
}

#[tokio::test]
async fn build_writes_the_configuration() {
  let project = TestProject::new();
  project.write_file("src/index.js", "console.log('hi')");
  register_builtins(&project.api);
  project.api.config_mut().set("mode", "production");

  let validated = Rc::new(RefCell::new(false));
  let v = validated.clone();
  project.api.on_sync("build:validate", move |_| {
    *v.borrow_mut() = true;
    Ok(Value::Null)
  });

  let value = project.api.run("build", vec![]).promise().await.unwrap();

  let written = project.path("build").join(BUILD_CONFIG_FILENAME);
  assert!(*validated.borrow());
  assert!(written.is_file());
  assert!(value.as_str().unwrap().ends_with(BUILD_CONFIG_FILENAME));

  let config: Value = serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
  assert_eq!(config["mode"], json!("production"));
  let entry = config["entry"]["index"][0].as_str().unwrap();
  assert!(entry.ends_with("index.js"));
}

#[tokio::test]
async fn build_rejects_missing_entry_points_verbatim() {
  let project = TestProject::with_overrides(json!({ "mains": { "index": "missing" } }));
  register_builtins(&project.api);

  let err = project.api.run("build", vec![]).promise().await.unwrap_err();
  let message = err.to_string();
  assert!(
    message.starts_with("Entry module not found: Error: Can't resolve './src/missing' in '"),
    "unexpected message: {}",
    message
  );
  assert!(!project.path("build").exists());
}
