#![forbid(unsafe_code)]

use std::time::Duration;

use vigil_exec::{run_with_timeout, ExecError};

use crate::classify::AttemptOutput;
use crate::config::CheckConfiguration;
use crate::error::{BmcError, INSTALL_GUIDANCE};

/// One concrete command line handed to a backend.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub configuration: CheckConfiguration,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.args.iter().any(|a| a == option)
    }
}

/// Runs the model checker. Implemented by the real subprocess runner and by
/// scripted fakes in tests.
pub trait CheckerBackend {
    fn run(&mut self, invocation: &Invocation) -> Result<AttemptOutput, BmcError>;
}

/// Spawns the checker binary under a hard limit of its own `--timeout` plus `grace`.
#[derive(Clone, Debug)]
pub struct EsbmcProcess {
    pub grace: Duration,
}

impl EsbmcProcess {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for EsbmcProcess {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl CheckerBackend for EsbmcProcess {
    fn run(&mut self, invocation: &Invocation) -> Result<AttemptOutput, BmcError> {
        let limit = Duration::from_secs(invocation.configuration.timeout_secs) + self.grace;
        let run = run_with_timeout(&invocation.program, &invocation.args, limit).map_err(
            |e| match e {
                ExecError::NotFound { program } => BmcError::ToolInvocation {
                    binary: program,
                    guidance: INSTALL_GUIDANCE.to_string(),
                },
                other => BmcError::Exec(other),
            },
        )?;
        let output = run.combined_output();
        Ok(AttemptOutput {
            exit_code: run.exit_code,
            output,
            timed_out: run.timed_out,
            duration: run.duration,
        })
    }
}
