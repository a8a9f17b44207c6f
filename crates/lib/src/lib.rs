//! kiln-lib: the configuration engine behind kiln
//!
//! This crate provides the pieces a build session is assembled from:
//! - `Options`: a derived-path-aware options store where paths follow `root` until pinned
//! - `Api`: the shared context handed to middleware, event handlers, and commands
//! - `EventBus`: named events with deterministic fan-out emission
//! - `CommandRegistry`: named commands run through a `pre<name>` / `<name>` lifecycle
//! - `BuildConfig`: the build-tool configuration that middleware mutate

pub mod api;
pub mod commands;
pub mod config;
pub mod consts;
pub mod error;
pub mod events;
pub mod middleware;
pub mod options;
pub mod paths;
pub mod project;

pub use api::Api;
pub use error::{Error, Result};
