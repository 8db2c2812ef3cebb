//! Shared fixtures for command-line integration tests.

use std::io::{self, Write};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use stratum::ExecutionContext;
use stratum_cli::{CliError, CommandLine, Console};
use tempfile::TempDir;
use test_helpers::SAMPLE_CONFIG;

/// Console with captured output and scripted operator answers.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    /// Everything written to standard output.
    pub output: Vec<u8>,
    /// Whether an operator is present.
    pub interactive: bool,
    /// Answers returned by prompts, in order.
    pub answers: Vec<String>,
    /// Prompts shown so far.
    pub prompts: Vec<String>,
}

impl ScriptedConsole {
    /// An operator at a terminal who will give `answers`.
    pub fn operator(answers: &[&str]) -> Self {
        Self {
            interactive: true,
            answers: answers.iter().rev().map(|answer| (*answer).to_owned()).collect(),
            ..Self::default()
        }
    }

    /// An unattended pipeline.
    pub fn pipeline() -> Self {
        Self::default()
    }

    /// Captured output as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for ScriptedConsole {
    fn out(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    fn execution_context(&self, _ci_env_vars: &[String]) -> ExecutionContext {
        ExecutionContext::from_signals(self.interactive, false)
    }

    fn ask(&mut self, prompt: &str) -> io::Result<String> {
        self.prompts.push(prompt.to_owned());
        Ok(self.answers.pop().unwrap_or_default())
    }
}

/// A temporary project directory holding the sample `stratum.toml`.
pub struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    /// Create a project with the sample topology.
    pub fn sample() -> Result<Self> {
        Self::with_config(SAMPLE_CONFIG)
    }

    /// Create a project with `config` as its topology file.
    pub fn with_config(config: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create project directory")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non UTF-8 temp path {}", path.display()))?;
        std::fs::write(root.join("stratum.toml"), config).context("write stratum.toml")?;
        Ok(Self { _dir: dir, root })
    }

    /// Project directory.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of the topology file.
    pub fn config(&self) -> Utf8PathBuf {
        self.root.join("stratum.toml")
    }

    /// Run `args` in-process against this project.
    pub fn run(&self, console: &mut ScriptedConsole, args: &[&str]) -> Result<(), CliError> {
        let config = self.config();
        let mut argv = vec!["stratum", "--config", config.as_str()];
        argv.extend_from_slice(args);
        let command_line = CommandLine::try_parse_from(argv).map_err(|err| {
            CliError::io("arguments", io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;
        stratum_cli::run(&command_line, console)
    }

    /// Apply `bootstrap` as an operator at a terminal.
    pub fn bootstrap(&self) -> Result<()> {
        let mut console = ScriptedConsole::operator(&["bootstrap"]);
        self.run(&mut console, &["apply", "bootstrap", "--confirm"])?;
        Ok(())
    }
}
