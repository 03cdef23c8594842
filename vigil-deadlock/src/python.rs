#![forbid(unsafe_code)]

//! Monitoring of Python scripts with instrumented locks.
//!
//! The script runs under a prelude that swaps `threading.Lock` and
//! `threading.RLock` for proxies keeping the same wait/hold graph as
//! [`Detector`](crate::Detector). Hazards come back on stderr as
//! marker-prefixed JSON lines, so they survive a kill on timeout.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use vigil_exec::{run_with_timeout, ExecError};

use crate::monitor::run_status;
use crate::report::{DetectionReport, Hazard, RunStatus};

const PRELUDE: &str = include_str!("prelude.py");

/// Prefix of every hazard line the prelude writes.
pub const HAZARD_MARKER: &str = "@@VIGIL_HAZARD@@ ";

pub const DEFAULT_INTERPRETER: &str = "python3";

/// Run `script` under `interpreter` with lock instrumentation and a hard timeout.
pub fn monitor_python(
    interpreter: &str,
    script: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<DetectionReport, ExecError> {
    let io_err = |source| ExecError::Io {
        program: interpreter.to_string(),
        source,
    };
    let mut prelude = tempfile::Builder::new()
        .prefix("vigil-prelude-")
        .suffix(".py")
        .tempfile()
        .map_err(io_err)?;
    prelude.write_all(PRELUDE.as_bytes()).map_err(io_err)?;
    prelude.flush().map_err(io_err)?;

    let mut argv: Vec<OsString> = vec![prelude.path().into(), script.into()];
    argv.extend(args.iter().map(OsString::from));
    debug!(script = %script.display(), interpreter, "running instrumented script");

    let mut run = run_with_timeout(interpreter, &argv, timeout)?;
    let (hazards, stderr) = split_hazards(&run.stderr);
    run.stderr = stderr;

    let status = run_status(&run, interpreter, timeout);
    let report = DetectionReport {
        deadlocked: status == RunStatus::TimedOut,
        status,
        hazards,
        events: Vec::new(),
        elapsed_secs: run.duration.as_secs_f64(),
        timeout_secs: timeout.as_secs_f64(),
        output: Some(run.combined_output()),
    };
    info!(
        clean = report.is_clean(),
        hazards = report.hazards.len(),
        "instrumented script finished"
    );
    Ok(report)
}

/// Write `source` to a scratch file and monitor it like a script on disk.
pub fn monitor_python_source(
    interpreter: &str,
    source: &str,
    timeout: Duration,
) -> Result<DetectionReport, ExecError> {
    let io_err = |source| ExecError::Io {
        program: interpreter.to_string(),
        source,
    };
    let mut script = tempfile::Builder::new()
        .prefix("vigil-monitored-")
        .suffix(".py")
        .tempfile()
        .map_err(io_err)?;
    script.write_all(source.as_bytes()).map_err(io_err)?;
    script.flush().map_err(io_err)?;
    monitor_python(interpreter, script.path(), &[], timeout)
}

/// Pull the hazard records out of `stderr`, returning them and what is left.
fn split_hazards(stderr: &str) -> (Vec<Hazard>, String) {
    let mut hazards = Vec::new();
    let mut rest = String::with_capacity(stderr.len());
    for line in stderr.lines() {
        match line.strip_prefix(HAZARD_MARKER) {
            Some(record) => match serde_json::from_str::<Hazard>(record) {
                Ok(hazard) => hazards.push(hazard),
                Err(e) => warn!(error = %e, "dropping unreadable hazard record"),
            },
            None => {
                rest.push_str(line);
                rest.push('\n');
            }
        }
    }
    (hazards, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::HazardKind;

    #[test]
    fn hazard_lines_are_separated_from_program_output() {
        let stderr = format!(
            "warming up\n{HAZARD_MARKER}{}\nTraceback (most recent call last):\n{HAZARD_MARKER}{{not json\n",
            r#"{"kind": "ordering-inversion", "threads": ["B", "A"], "locks": ["Lock#2", "Lock#1"], "message": "inconsistent lock ordering"}"#
        );
        let (hazards, rest) = split_hazards(&stderr);
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].kind, HazardKind::OrderingInversion);
        assert_eq!(hazards[0].threads, vec!["B", "A"]);
        assert_eq!(rest, "warming up\nTraceback (most recent call last):\n");
    }

    #[test]
    fn prelude_uses_the_same_marker() {
        assert!(PRELUDE.contains(&format!("MARKER = \"{HAZARD_MARKER}\"")));
    }
}
