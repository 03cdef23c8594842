#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use vigil_backend_c::TranslationArtifact;

use crate::backend::{CheckerBackend, EsbmcProcess};
use crate::classify::{classify, Classification};
use crate::config::CheckConfiguration;
use crate::error::BmcError;
use crate::ladder::{RetryLadder, Stage, Transition};
use crate::truncate::{truncate_output, DEFAULT_MAX_OUTPUT_LEN};

/// Fixed file name the checked C source is written to before every request.
pub const VERIFY_FILE_NAME: &str = "esbmc_verify.c";

#[derive(Clone, Debug)]
pub struct CheckerConfig {
    pub binary: String,
    /// Slack on top of the checker's own `--timeout` before the process group is killed.
    pub grace: Duration,
    pub max_output_len: usize,
    pub output_dir: PathBuf,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            binary: "esbmc".to_string(),
            grace: Duration::from_secs(10),
            max_output_len: DEFAULT_MAX_OUTPUT_LEN,
            output_dir: PathBuf::from("."),
        }
    }
}

impl CheckerConfig {
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_max_output_len(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AttemptRecord {
    pub stage: Stage,
    pub configuration: CheckConfiguration,
    pub command_line: String,
    pub classification: Classification,
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    /// Set when this attempt ended in a repair; names the stripped option.
    pub repaired_option: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerificationOutcome {
    /// Clean exit and an explicit success verdict; nothing else counts.
    pub success: bool,
    pub classification: Classification,
    /// Output of the final attempt, truncated by priority.
    pub output: String,
    pub output_len: usize,
    pub command_line: String,
    pub configuration: CheckConfiguration,
    pub enabled_checks: Vec<String>,
    pub guidance: Option<String>,
    pub saved_file: PathBuf,
    pub attempts: Vec<AttemptRecord>,
}

impl VerificationOutcome {
    /// A verdict was reached: success or a reported property violation.
    pub fn is_informative(&self) -> bool {
        self.classification.is_verdict()
    }
}

pub struct BmcDriver<B: CheckerBackend> {
    backend: B,
    config: CheckerConfig,
}

impl BmcDriver<EsbmcProcess> {
    pub fn esbmc(config: CheckerConfig) -> Self {
        let backend = EsbmcProcess::new(config.grace);
        Self::new(backend, config)
    }
}

impl<B: CheckerBackend> BmcDriver<B> {
    pub fn new(backend: B, config: CheckerConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn verify(
        &mut self,
        artifact: &TranslationArtifact,
        configuration: CheckConfiguration,
    ) -> Result<VerificationOutcome, BmcError> {
        self.verify_c(&artifact.c_source, configuration)
    }

    /// Persist `c_source` to `esbmc_verify.c` and run the retry ladder over it.
    pub fn verify_c(
        &mut self,
        c_source: &str,
        configuration: CheckConfiguration,
    ) -> Result<VerificationOutcome, BmcError> {
        let file = self.persist(c_source)?;
        let mut ladder = RetryLadder::new(configuration);
        let mut attempts = Vec::new();

        info!(%configuration, file = %file.display(), "starting verification");
        loop {
            let stage = ladder.stage();
            let invocation = ladder.invocation(&self.config.binary, &file);
            debug!(command = %invocation.command_line(), ?stage, "running checker");

            let attempt = self.backend.run(&invocation)?;
            let classification = classify(&attempt);
            let transition = ladder.advance(classification, &attempt.output, &invocation);

            attempts.push(AttemptRecord {
                stage,
                configuration: invocation.configuration,
                command_line: invocation.command_line(),
                classification,
                exit_code: attempt.exit_code,
                duration_secs: attempt.duration.as_secs_f64(),
                repaired_option: match &transition {
                    Transition::Repair { option } => Some(option.clone()),
                    _ => None,
                },
            });

            match transition {
                Transition::Repair { option } => {
                    info!(%option, "checker rejected an option; retrying without it");
                }
                Transition::Escalate => {
                    info!(
                        unwind = ladder.configuration().unwind,
                        "unwinding assertion reported; escalating unwind bound"
                    );
                }
                Transition::Degrade => {
                    warn!(
                        configuration = %ladder.configuration(),
                        "checker timed out; retrying with reduced checks"
                    );
                }
                Transition::Finish {
                    classification,
                    guidance,
                } => {
                    let success = classification == Classification::Success;
                    match classification {
                        Classification::TimedOut => warn!("verification timed out after degradation"),
                        c => info!(classification = %c, attempts = attempts.len(), "verification finished"),
                    }
                    return Ok(VerificationOutcome {
                        success,
                        classification,
                        output: truncate_output(&attempt.output, self.config.max_output_len),
                        output_len: attempt.output.len(),
                        command_line: invocation.command_line(),
                        configuration: invocation.configuration,
                        enabled_checks: invocation
                            .configuration
                            .enabled_checks()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                        guidance: guidance.map(str::to_string),
                        saved_file: file,
                        attempts,
                    });
                }
            }
        }
    }

    fn persist(&self, c_source: &str) -> Result<PathBuf, BmcError> {
        let dir = &self.config.output_dir;
        let path = dir.join(VERIFY_FILE_NAME);
        fs::create_dir_all(dir)
            .and_then(|()| fs::write(&path, c_source))
            .map_err(|source| BmcError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}
