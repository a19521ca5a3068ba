//! Local subprocess execution with output passed straight through to the
//! terminal.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result, SubprocessFailedDetails};
use crate::utils::split::split_unquoted_whitespace;

/// A command line split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn parse(line: &str) -> Result<Self> {
        let mut tokens = split_unquoted_whitespace(line).into_iter();
        let program = tokens.next().ok_or_else(|| {
            Error::validation_invalid_argument("command", "command line is empty", None, None)
        })?;

        Ok(Self {
            program,
            args: tokens.collect(),
        })
    }
}

/// Runs one command line to completion. `Ok` only for exit code 0.
pub trait CommandRunner {
    fn run(&self, command: &str, work_dir: Option<&Path>) -> Result<i32>;
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    run_as_user: Option<String>,
}

impl ProcessRunner {
    /// With `Some(user)` every command runs via `sudo -u <user>`; with
    /// `None` it runs directly as the current user.
    pub fn new(run_as_user: Option<String>) -> Self {
        Self { run_as_user }
    }

    fn build(&self, line: &CommandLine, work_dir: Option<&Path>) -> Command {
        let mut cmd = match &self.run_as_user {
            Some(user) => {
                let mut cmd = Command::new("sudo");
                cmd.args(["-u", user.as_str(), line.program.as_str()]);
                cmd
            }
            None => Command::new(&line.program),
        };
        cmd.args(&line.args);

        if let Some(dir) = work_dir {
            cmd.current_dir(dir);
        }

        // Passthrough to terminal instead of capturing
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        cmd
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &str, work_dir: Option<&Path>) -> Result<i32> {
        let line = CommandLine::parse(command)?;
        crate::log_debug!(
            "exec",
            "Executing command: {} {}",
            line.program,
            line.args.join(" ")
        );

        let status = self
            .build(&line, work_dir)
            .status()
            .map_err(|e| Error::subprocess_spawn_failed(command, e.to_string()))?;

        // Signal termination has no exit code.
        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            return Err(Error::subprocess_failed(SubprocessFailedDetails {
                command: command.to_string(),
                exit_code,
                work_dir: work_dir.map(|d| d.display().to_string()),
            }));
        }

        Ok(exit_code)
    }
}
