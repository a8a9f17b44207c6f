mod cmd;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::SessionArgs;
use output::{OutputFormat, print_error};

/// kiln - composable build configuration
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(flatten)]
  session: SessionArgs,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a registered command through its lifecycle
  Run {
    /// Command name
    command: String,

    /// Arguments passed to the command (parsed as JSON, falling back to strings)
    args: Vec<String>,
  },

  /// Validate entry points and write the build configuration
  Build,

  /// Print the build configuration
  Inspect,

  /// Print the resolved options
  Options,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Run { command, args } => cmd::cmd_run(&cli.session, &command, &args, cli.output),
    Commands::Build => cmd::cmd_run(&cli.session, "build", &[], cli.output),
    Commands::Inspect => cmd::cmd_inspect(&cli.session),
    Commands::Options => cmd::cmd_options(&cli.session, cli.output),
  };

  if let Err(err) = result {
    print_error(&format!("{err:#}"));
    std::process::exit(1);
  }
}
