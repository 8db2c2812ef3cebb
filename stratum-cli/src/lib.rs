//! Command-line surface for `stratum`.
//!
//! The binary loads layered settings, opens one file-backed state store per
//! layer plus the directory-backed local provisioning backend, and then runs
//! one of `plan`, `apply`, `describe-output` or `status` against a single
//! layer per invocation. [`run`] is the entry point shared by the binary and
//! in-process tests.

pub mod cli;
pub mod commands;
pub mod console;
pub mod error;
pub mod render;
pub mod settings;
pub mod telemetry;
pub mod workspace;

pub use cli::{CommandLine, Commands, GlobalArgs, OutputFormat};
pub use console::{Console, StdConsole};
pub use error::{CliError, Result};
pub use settings::Settings;
pub use workspace::Workspace;

/// Execute a parsed command line against `console`.
///
/// # Errors
///
/// Returns the first configuration, gate, planning, apply or output error.
pub fn run(command_line: &CommandLine, console: &mut dyn Console) -> Result<()> {
    let settings = Settings::load(command_line.config_path.as_deref(), &command_line.globals)?;
    let workspace = Workspace::open(settings)?;
    let format = command_line.globals.format;
    match &command_line.command {
        Commands::Plan(args) => commands::plan(&workspace, console, format, args),
        Commands::Apply(args) => commands::apply(&workspace, console, format, args),
        Commands::DescribeOutput(args) => {
            commands::describe_output(&workspace, console, format, args)
        }
        Commands::Status => commands::status(&workspace, console, format),
    }
}
