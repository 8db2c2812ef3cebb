//! Entry point for the `stratum` binary.
//!
//! Errors are reported through `color-eyre`; the exit code reflects the
//! error class so pipelines can tell refusals from failures.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Report;
use stratum_cli::{CommandLine, StdConsole, telemetry};

fn main() -> ExitCode {
    if let Err(report) = color_eyre::install() {
        report_error(&report);
        return ExitCode::FAILURE;
    }
    let command_line = CommandLine::parse();
    match run(&command_line) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = ExitCode::from(&err);
            report_error(&Report::from(err));
            code
        }
    }
}

fn run(command_line: &CommandLine) -> stratum_cli::Result<()> {
    telemetry::init(command_line.globals.log_level.as_deref())?;
    stratum_cli::run(command_line, &mut StdConsole::new())
}

fn report_error(report: &Report) {
    let _unused = writeln!(std::io::stderr().lock(), "Error: {report:?}");
}
