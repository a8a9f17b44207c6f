mod inspect;
mod options;
mod run;
mod session;

pub use inspect::cmd_inspect;
pub use options::cmd_options;
pub use run::cmd_run;
pub use session::SessionArgs;
