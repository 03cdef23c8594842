#![forbid(unsafe_code)]

//! Supervised child processes: captured output, a hard wall-clock limit, and
//! process-group termination when that limit expires.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    #[error("program not found: {program}")]
    #[diagnostic(code(vigil::exec::not_found))]
    NotFound { program: String },

    #[error("failed to run {program}: {source}")]
    #[diagnostic(code(vigil::exec::io))]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Outcome of one supervised run.
#[derive(Clone, Debug, Serialize)]
pub struct RawRun {
    /// `None` when the process was killed by a signal (including our own kill).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl RawRun {
    /// stdout followed by stderr, the way the checker's verdicts are scanned.
    pub fn combined_output(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Run `program args..` to completion or until `limit` elapses.
///
/// The child is placed in its own process group so that any helpers it
/// spawns are killed together with it on timeout.
pub fn run_with_timeout<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    limit: Duration,
) -> Result<RawRun, ExecError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!(program, limit_secs = limit.as_secs_f64(), "spawning supervised process");
    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ExecError::NotFound {
            program: program.to_string(),
        },
        _ => ExecError::Io {
            program: program.to_string(),
            source: e,
        },
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let io_err = |source| ExecError::Io {
        program: program.to_string(),
        source,
    };

    let (status, timed_out) = match child.wait_timeout(limit).map_err(io_err)? {
        Some(status) => (Some(status), false),
        None => {
            warn!(program, limit_secs = limit.as_secs_f64(), "hard timeout reached, killing process group");
            kill_group(&mut child);
            let status = child.wait().map_err(io_err)?;
            (Some(status), true)
        }
    };

    let run = RawRun {
        exit_code: status.and_then(|s| s.code()),
        stdout: collect(stdout),
        stderr: collect(stderr),
        timed_out,
        duration: started.elapsed(),
    };
    debug!(
        program,
        exit_code = ?run.exit_code,
        timed_out = run.timed_out,
        elapsed_ms = run.duration.as_millis() as u64,
        "supervised process finished"
    );
    Ok(run)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error just truncates what we captured.
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!(error = %e, "killpg failed, killing child directly");
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_both_streams_and_exit_code() {
        let run = run_with_timeout(
            "sh",
            &["-c", "echo out; echo err >&2; exit 3"],
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(run.exit_code, Some(3));
        assert!(!run.timed_out);
        assert_eq!(run.stdout, "out\n");
        assert_eq!(run.stderr, "err\n");
        assert_eq!(run.combined_output(), "out\nerr\n");
        assert!(!run.succeeded());
    }

    #[test]
    fn timeout_kills_the_whole_group() {
        let started = Instant::now();
        let run = run_with_timeout(
            "sh",
            &["-c", "sleep 30 & sleep 30; echo never"],
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(run.timed_out);
        assert!(run.exit_code.is_none());
        assert!(!run.stdout.contains("never"));
        // Readers would block until the background sleep exits if only the
        // shell had been killed.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn missing_program_is_not_found() {
        let err = run_with_timeout(
            "vigil-definitely-not-a-real-binary",
            &[] as &[&str],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
    }

    #[test]
    fn large_output_does_not_stall() {
        let run = run_with_timeout(
            "sh",
            &["-c", "i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done"],
            Duration::from_secs(20),
        )
        .unwrap();
        assert!(run.succeeded());
        assert_eq!(run.stdout.lines().count(), 20000);
    }
}
