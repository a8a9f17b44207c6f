//! Well-known option keys and their defaults.

/// Option key holding the absolute project root.
pub const ROOT_KEY: &str = "root";

/// Option key holding the named entry points.
pub const MAINS_KEY: &str = "mains";

/// Option key whose object value is copied into the process environment.
pub const ENV_KEY: &str = "env";

/// Entry point present in every fresh options store.
pub const DEFAULT_MAIN: &str = "index";

/// Prefix of the event emitted before a command handler runs.
pub const PRE_EVENT_PREFIX: &str = "pre";

/// Default project file read by the CLI.
pub const PROJECT_FILENAME: &str = "kiln.json";

/// File the builtin `build` command writes into the output directory.
pub const BUILD_CONFIG_FILENAME: &str = "kiln.config.json";
