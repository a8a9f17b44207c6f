//! Tests for derived options through the shared session.

use std::path::PathBuf;

use kiln_lib::Api;
use kiln_lib::options::PathKey;
use serde_json::{Value, json};
use serial_test::serial;

use super::common::session_at;

#[test]
#[serial]
fn default_session_is_rooted_at_cwd() {
  let cwd = std::env::current_dir().unwrap();
  let api = Api::new(Value::Null).unwrap();

  assert_eq!(api.options().root(), cwd.as_path());
  assert_eq!(api.options().source(), cwd.join("src"));
}

#[test]
#[serial]
fn relative_cwd_resolves_against_the_working_directory() {
  let cwd = std::env::current_dir().unwrap();
  let api = Api::with_cwd("alpha/../beta", Value::Null).unwrap();

  assert!(api.options().root().is_absolute());
  assert_eq!(api.options().root(), cwd.join("beta").as_path());
  assert_eq!(api.options().output(), cwd.join("beta").join("build"));
}

#[test]
fn relative_root_override_then_absolute_root() {
  let api = Api::with_cwd("/work", json!({ "root": "./alpha" })).unwrap();
  assert_eq!(api.option("root"), Some(json!("/work/alpha")));
  assert_eq!(api.option("source"), Some(json!("/work/alpha/src")));

  api.set_option("root", json!("/beta")).unwrap();
  assert_eq!(api.option("root"), Some(json!("/beta")));
  assert_eq!(api.option("output"), Some(json!("/beta/build")));
  assert_eq!(api.option("mains.index"), Some(json!("/beta/src/index")));
}

#[test]
fn pinned_paths_survive_root_moves_through_the_session() {
  let api = session_at("/work");
  api.set_option("tests", json!("spec")).unwrap();
  api.merge_options(json!({ "root": "/moved" })).unwrap();

  assert!(api.options().is_pinned(PathKey::Tests));
  assert_eq!(api.options().tests(), PathBuf::from("/work/spec"));
  assert_eq!(api.options().node_modules(), PathBuf::from("/moved/node_modules"));
}

#[test]
fn invalid_values_are_rejected_synchronously() {
  let api = session_at("/work");
  let err = api.set_option("output", json!({ "not": "a path" })).unwrap_err();
  assert!(err.to_string().contains("invalid value for option 'output'"));
  assert_eq!(api.option("output"), Some(json!("/work/build")));

  assert!(Api::with_cwd("/work", json!([1, 2, 3])).is_err());
}

#[test]
#[serial]
fn env_option_is_exported_on_creation() {
  temp_env::with_vars([("KILN_TEST_MODE", None::<&str>), ("KILN_TEST_LEVEL", None)], || {
    let _api = Api::with_cwd(
      "/work",
      json!({ "env": { "KILN_TEST_MODE": "production", "KILN_TEST_LEVEL": 3 } }),
    )
    .unwrap();

    assert_eq!(std::env::var("KILN_TEST_MODE").as_deref(), Ok("production"));
    assert_eq!(std::env::var("KILN_TEST_LEVEL").as_deref(), Ok("3"));
  });
}
