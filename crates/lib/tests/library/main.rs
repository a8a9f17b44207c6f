//! Library integration tests for kiln-lib.

mod common;

mod commands_tests;
mod events_tests;
mod middleware_tests;
mod options_tests;
