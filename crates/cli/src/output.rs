//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output: colored status
//! messages, labelled stats, and JSON or text rendering of command values.

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
}

/// Render a command value for humans: strings verbatim, `null` as nothing,
/// everything else as pretty JSON.
pub fn render_value(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    other => Some(serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())),
  }
}

pub fn print_value(value: &Value) {
  if let Some(rendered) = render_value(value) {
    println!("{}", rendered);
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
