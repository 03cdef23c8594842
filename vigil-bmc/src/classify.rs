#![forbid(unsafe_code)]

use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

pub const SUCCESS_MARKER: &str = "VERIFICATION SUCCESSFUL";
pub const FAILURE_MARKER: &str = "VERIFICATION FAILED";
pub const UNWINDING_MARKER: &str = "unwinding assertion";
const TIMED_OUT_MARKER: &str = "Timed out";
/// Exit status used by `timeout(1)`-style wrappers.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// What one checker run produced.
#[derive(Clone, Debug, Default)]
pub struct AttemptOutput {
    pub exit_code: Option<i32>,
    pub output: String,
    /// The supervisor killed the process at the hard limit.
    pub timed_out: bool,
    pub duration: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Success,
    ViolationFound,
    UnwindingIncomplete,
    TimedOut,
    OptionError,
    /// No verdict and no other recognizable condition.
    Inconclusive,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Success => "success",
            Classification::ViolationFound => "violation-found",
            Classification::UnwindingIncomplete => "unwinding-incomplete",
            Classification::TimedOut => "timed-out",
            Classification::OptionError => "option-error",
            Classification::Inconclusive => "inconclusive",
        }
    }

    /// A verdict was reached, whether or not a property was violated.
    pub fn is_verdict(self) -> bool {
        matches!(self, Classification::Success | Classification::ViolationFound)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag a single attempt. Exactly one tag applies; checked in priority order.
pub fn classify(attempt: &AttemptOutput) -> Classification {
    let out = attempt.output.as_str();
    if unrecognised_option(out).is_some() {
        return Classification::OptionError;
    }
    if out.contains(UNWINDING_MARKER) {
        return Classification::UnwindingIncomplete;
    }
    if out.contains(FAILURE_MARKER) {
        return Classification::ViolationFound;
    }
    if out.contains(SUCCESS_MARKER) && attempt.exit_code == Some(0) {
        return Classification::Success;
    }
    if attempt.timed_out
        || out.contains(TIMED_OUT_MARKER)
        || attempt.exit_code == Some(TIMEOUT_EXIT_CODE)
    {
        return Classification::TimedOut;
    }
    Classification::Inconclusive
}

/// The option named in a checker complaint like `unrecognised option 'foo'`,
/// normalized to its `--foo` form.
pub fn unrecognised_option(output: &str) -> Option<String> {
    let re = Regex::new(r"unrecognised option '([^']+)'").ok()?;
    let name = re.captures(output)?.get(1)?.as_str();
    if name.starts_with("--") {
        Some(name.to_string())
    } else {
        Some(format!("--{}", name.trim_start_matches('-')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(exit_code: i32, output: &str) -> AttemptOutput {
        AttemptOutput {
            exit_code: Some(exit_code),
            output: output.to_string(),
            ..AttemptOutput::default()
        }
    }

    #[test]
    fn success_needs_clean_exit_and_explicit_verdict() {
        assert_eq!(classify(&attempt(0, "VERIFICATION SUCCESSFUL")), Classification::Success);
        assert_eq!(classify(&attempt(0, "Parsing ... done")), Classification::Inconclusive);
        assert_eq!(classify(&attempt(6, "VERIFICATION SUCCESSFUL")), Classification::Inconclusive);
    }

    #[test]
    fn success_is_independent_of_output_length() {
        let mut noise = "Generated 1 VCC(s), 1 remaining after simplification\n".repeat(5_000);
        noise.push_str("VERIFICATION SUCCESSFUL\n");
        assert_eq!(classify(&attempt(0, &noise)), Classification::Success);
    }

    #[test]
    fn violation_wins_over_success_and_timeout() {
        let out = "VERIFICATION SUCCESSFUL\nVERIFICATION FAILED\n";
        assert_eq!(classify(&attempt(0, out)), Classification::ViolationFound);

        let late = AttemptOutput {
            exit_code: None,
            output: "Violated property:\n  division by zero\nVERIFICATION FAILED\n".to_string(),
            timed_out: true,
            duration: Duration::from_secs(70),
        };
        assert_eq!(classify(&late), Classification::ViolationFound);
    }

    #[test]
    fn timeout_indicators() {
        assert_eq!(classify(&attempt(1, "ERROR: Timed out")), Classification::TimedOut);
        assert_eq!(classify(&attempt(124, "")), Classification::TimedOut);
        let killed = AttemptOutput {
            timed_out: true,
            ..AttemptOutput::default()
        };
        assert_eq!(classify(&killed), Classification::TimedOut);
    }

    #[test]
    fn option_names_are_normalized() {
        assert_eq!(
            unrecognised_option("esbmc: unrecognised option 'memory-leak-check'").as_deref(),
            Some("--memory-leak-check")
        );
        assert_eq!(
            unrecognised_option("unrecognised option '--deadlock-check'").as_deref(),
            Some("--deadlock-check")
        );
        assert_eq!(unrecognised_option("unknown flag"), None);
    }
}
