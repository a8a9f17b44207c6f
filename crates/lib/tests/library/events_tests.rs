//! Tests for fan-out emission through the shared session.

use std::time::Duration;

use serde_json::{Value, json};

use super::common::session_at;

#[tokio::test]
async fn emitting_without_handlers_resolves_empty() {
  let api = session_at("/work");
  assert_eq!(api.emit_for_all("test", &[]).await.unwrap(), Vec::<Value>::new());
}

#[tokio::test]
async fn results_follow_registration_order() {
  let api = session_at("/work");
  for (value, millis) in [("alpha", 25u64), ("beta", 0), ("gamma", 10)] {
    api.on("test", move |_| async move {
      tokio::time::sleep(Duration::from_millis(millis)).await;
      Ok::<_, anyhow::Error>(json!(value))
    });
  }

  let values = api.emit_for_all("test", &[]).await.unwrap();
  assert_eq!(values, vec![json!("alpha"), json!("beta"), json!("gamma")]);
}

#[tokio::test]
async fn a_failing_handler_rejects_the_emit() {
  let api = session_at("/work");
  api.on_sync("test", |_| Ok(json!("alpha")));
  api.on_sync("test", |_| Err(anyhow::anyhow!("beta")));
  api.on_sync("test", |_| Ok(json!("gamma")));

  let err = api.emit_for_all("test", &[]).await.unwrap_err();
  assert_eq!(err.to_string(), "beta");
  assert_eq!(err.as_handler().map(ToString::to_string).as_deref(), Some("beta"));
}

#[tokio::test]
async fn handlers_can_call_back_into_the_session() {
  let api = session_at("/work");
  let session = api.clone();
  api.on_sync("configure", move |args| {
    session.set_option("output", args[0].clone())?;
    Ok(Value::Null)
  });
  assert_eq!(api.listener_count("configure"), 1);

  api.emit_for_all("configure", &[json!("dist")]).await.unwrap();
  assert_eq!(api.option("output"), Some(json!("/work/dist")));
}
