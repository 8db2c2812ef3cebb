//! Terminal access used by commands.
//!
//! Commands never touch the process streams directly; they go through a
//! [`Console`] so tests can script the operator.

use std::io::{self, BufRead, IsTerminal, Write};

use stratum::ExecutionContext;

/// Output, context detection and operator prompts for a command.
pub trait Console {
    /// Stream receiving command results.
    fn out(&mut self) -> &mut dyn Write;

    /// Decide whether an operator is present.
    fn execution_context(&self, ci_env_vars: &[String]) -> ExecutionContext;

    /// Show `prompt` and return the operator's answer without the newline.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the terminal.
    fn ask(&mut self, prompt: &str) -> io::Result<String>;
}

/// The process's standard streams.
///
/// Results go to stdout; prompts go to stderr so piped output stays clean.
#[derive(Debug)]
pub struct StdConsole {
    stdout: io::Stdout,
}

impl StdConsole {
    /// Attach to the process streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn out(&mut self) -> &mut dyn Write {
        &mut self.stdout
    }

    fn execution_context(&self, ci_env_vars: &[String]) -> ExecutionContext {
        ExecutionContext::detect(ci_env_vars)
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(String::new());
        }
        let mut answer = String::new();
        stdin.lock().read_line(&mut answer)?;
        Ok(answer.trim_end_matches(['\r', '\n']).to_owned())
    }
}
