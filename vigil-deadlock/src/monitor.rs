#![forbid(unsafe_code)]

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use std::path::Path;

use tracing::{info, warn};
use vigil_exec::{run_with_timeout, ExecError, RawRun};

use crate::mutex::Detector;
use crate::python::{monitor_python, monitor_python_source, DEFAULT_INTERPRETER};
use crate::report::{DetectionReport, RunStatus};

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Hard wall-clock bound; exceeding it classifies the run as deadlocked.
    pub timeout: Duration,
    /// Interpreter for instrumented Python scripts.
    pub python: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            python: DEFAULT_INTERPRETER.to_string(),
        }
    }
}

impl DetectorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_python(mut self, interpreter: impl Into<String>) -> Self {
        self.python = interpreter.into();
        self
    }

    pub fn monitor_python(&self, script: &Path, args: &[String]) -> Result<DetectionReport, ExecError> {
        monitor_python(&self.python, script, args, self.timeout)
    }

    pub fn monitor_python_source(&self, source: &str) -> Result<DetectionReport, ExecError> {
        monitor_python_source(&self.python, source, self.timeout)
    }

    pub fn monitor<F>(&self, program: F) -> DetectionReport
    where
        F: FnOnce(Arc<Detector>) + Send + 'static,
    {
        monitor(program, self.timeout)
    }

    pub fn monitor_process(&self, program: &str, args: &[String]) -> Result<DetectionReport, ExecError> {
        monitor_process(program, args, self.timeout)
    }
}

/// Run `program` on its own thread with instrumented locks from a fresh
/// [`Detector`], and classify the run.
///
/// The program is expected to join the threads it spawns. If it has not
/// returned within `timeout` it is abandoned (its threads stay blocked) and
/// the run is reported as deadlocked.
pub fn monitor<F>(program: F, timeout: Duration) -> DetectionReport
where
    F: FnOnce(Arc<Detector>) + Send + 'static,
{
    let detector = Detector::new();
    let (tx, rx) = mpsc::channel();
    let for_program = Arc::clone(&detector);
    let started = Instant::now();

    let spawned = thread::Builder::new()
        .name("vigil-monitored".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| program(for_program)));
            // The receiver is gone only if the monitor already gave up.
            let _ = tx.send(result.map_err(panic_message));
        });

    let status = match spawned {
        Err(e) => RunStatus::Panicked {
            message: format!("could not start monitored thread: {e}"),
        },
        Ok(_) => match rx.recv_timeout(timeout) {
            Ok(Ok(())) => RunStatus::Completed,
            Ok(Err(message)) => RunStatus::Panicked { message },
            Err(RecvTimeoutError::Timeout) => RunStatus::TimedOut,
            Err(RecvTimeoutError::Disconnected) => RunStatus::Panicked {
                message: "monitored thread exited without reporting".to_string(),
            },
        },
    };
    if status == RunStatus::TimedOut {
        detector.stop();
        warn!(timeout_secs = timeout.as_secs_f64(), "monitored program did not finish; treating as deadlock");
    }

    let report = DetectionReport {
        deadlocked: status == RunStatus::TimedOut,
        status,
        hazards: detector.hazards(),
        events: detector.events(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        timeout_secs: timeout.as_secs_f64(),
        output: None,
    };
    info!(
        clean = report.is_clean(),
        hazards = report.hazards.len(),
        events = report.events.len(),
        "deadlock monitoring finished"
    );
    report
}

/// Timeout-only monitoring of an external program: locks inside it are not
/// instrumented, so a hang past `timeout` is the only deadlock signal.
pub fn monitor_process(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<DetectionReport, ExecError> {
    let run = run_with_timeout(program, args, timeout)?;
    let status = run_status(&run, program, timeout);
    Ok(DetectionReport {
        deadlocked: run.timed_out,
        status,
        hazards: Vec::new(),
        events: Vec::new(),
        elapsed_secs: run.duration.as_secs_f64(),
        timeout_secs: timeout.as_secs_f64(),
        output: Some(run.combined_output()),
    })
}

pub(crate) fn run_status(run: &RawRun, program: &str, timeout: Duration) -> RunStatus {
    if run.timed_out {
        warn!(program, timeout_secs = timeout.as_secs_f64(), "program did not finish; treating as deadlock");
        RunStatus::TimedOut
    } else if run.exit_code == Some(0) {
        RunStatus::Completed
    } else {
        RunStatus::Failed {
            exit_code: run.exit_code,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "monitored program panicked".to_string()
    }
}
