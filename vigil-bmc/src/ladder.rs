#![forbid(unsafe_code)]

//! Retry policy for one verification request, as an explicit state machine.
//!
//! ```text
//! Initial --unwinding--> Escalated --unwinding--> done(unwinding-incomplete)
//!    |                       |
//!    +------timed out--------+--> Degraded --timed out--> done(timed-out)
//!
//! any state --option error (once per request)--> same state, option stripped
//! ```

use std::path::Path;

use serde::Serialize;

use crate::backend::Invocation;
use crate::classify::{unrecognised_option, Classification};
use crate::config::CheckConfiguration;

pub const UNWINDING_GUIDANCE: &str = "The loops need more than the maximum unwind bound to be fully explored. \
Add explicit loop bounds, constrain nondeterministic inputs with __ESBMC_assume(), or simplify the loop logic.";

pub const TIMEOUT_GUIDANCE: &str = "The program is too complex to verify within the time limit, even with reduced checks. \
Simplify inputs, bound nondeterministic values (e.g. __ESBMC_assume(n < 1000)), and remove unnecessary code paths.";

/// Options whose value is the following argument.
const VALUED_OPTIONS: &[&str] = &["--unwind", "--timeout"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Initial,
    Escalated,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Rerun at the same stage without the rejected option.
    Repair { option: String },
    Escalate,
    Degrade,
    Finish {
        classification: Classification,
        guidance: Option<&'static str>,
    },
}

#[derive(Clone, Debug)]
pub struct RetryLadder {
    stage: Stage,
    configuration: CheckConfiguration,
    removed_options: Vec<String>,
    repairs_left: u8,
    escalations_left: u8,
    degradations_left: u8,
}

impl RetryLadder {
    pub const REPAIR_BUDGET: u8 = 1;

    pub fn new(configuration: CheckConfiguration) -> Self {
        Self {
            stage: Stage::Initial,
            configuration,
            removed_options: Vec::new(),
            repairs_left: Self::REPAIR_BUDGET,
            escalations_left: 1,
            degradations_left: 1,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn configuration(&self) -> CheckConfiguration {
        self.configuration
    }

    pub fn removed_options(&self) -> &[String] {
        &self.removed_options
    }

    /// Command line for the next attempt, minus any options stripped by repair.
    pub fn invocation(&self, program: &str, file: &Path) -> Invocation {
        let mut args = Vec::new();
        let mut skip_value = false;
        for arg in self.configuration.arguments(file) {
            if skip_value {
                skip_value = false;
                continue;
            }
            if self.removed_options.contains(&arg) {
                skip_value = VALUED_OPTIONS.contains(&arg.as_str());
                continue;
            }
            args.push(arg);
        }
        Invocation {
            program: program.to_string(),
            args,
            configuration: self.configuration,
        }
    }

    /// Decide what follows an attempt that was classified `observed`.
    pub fn advance(&mut self, observed: Classification, output: &str, last: &Invocation) -> Transition {
        match observed {
            Classification::OptionError => {
                let option = unrecognised_option(output).filter(|o| last.has_option(o));
                match option {
                    Some(option) if self.repairs_left > 0 => {
                        self.repairs_left -= 1;
                        self.removed_options.push(option.clone());
                        Transition::Repair { option }
                    }
                    _ => finish(Classification::OptionError, None),
                }
            }
            Classification::UnwindingIncomplete => {
                if self.stage == Stage::Initial && self.escalations_left > 0 {
                    self.escalations_left -= 1;
                    self.stage = Stage::Escalated;
                    self.configuration = self.configuration.escalated();
                    Transition::Escalate
                } else {
                    finish(Classification::UnwindingIncomplete, Some(UNWINDING_GUIDANCE))
                }
            }
            Classification::TimedOut => {
                if self.stage != Stage::Degraded && self.degradations_left > 0 {
                    self.degradations_left -= 1;
                    self.stage = Stage::Degraded;
                    self.configuration = self.configuration.degraded();
                    Transition::Degrade
                } else {
                    finish(Classification::TimedOut, Some(TIMEOUT_GUIDANCE))
                }
            }
            Classification::Success | Classification::ViolationFound | Classification::Inconclusive => {
                finish(observed, None)
            }
        }
    }
}

fn finish(classification: Classification, guidance: Option<&'static str>) -> Transition {
    Transition::Finish {
        classification,
        guidance,
    }
}
