#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an instrumented lock within one detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LockId(pub u32);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HazardKind {
    CircularWait,
    OrderingInversion,
}

impl HazardKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HazardKind::CircularWait => "circular-wait",
            HazardKind::OrderingInversion => "ordering-inversion",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub kind: HazardKind,
    /// Thread names, in the order they appear in the chain or inversion.
    pub threads: Vec<String>,
    /// Lock names, in the same order.
    pub locks: Vec<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum EventKind {
    Attempt,
    Acquired { waited_ms: f64 },
    Denied,
    Released,
    CircularWait,
    OrderingInversion,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LockEvent {
    /// Milliseconds since the detector was created.
    pub at_ms: f64,
    pub thread: String,
    pub lock: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.thread)?;
        match &self.kind {
            EventKind::Attempt => write!(f, "attempting to acquire {}", self.lock),
            EventKind::Acquired { waited_ms } => {
                write!(f, "acquired {} (waited {:.3}s)", self.lock, waited_ms / 1000.0)
            }
            EventKind::Denied => write!(f, "failed to acquire {}", self.lock),
            EventKind::Released => write!(f, "released {}", self.lock),
            EventKind::CircularWait => write!(f, "CIRCULAR WAIT detected on {}", self.lock),
            EventKind::OrderingInversion => {
                write!(f, "LOCK ORDERING INVERSION detected on {}", self.lock)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    /// An external program exited unsuccessfully.
    Failed { exit_code: Option<i32> },
    Panicked { message: String },
    /// Did not finish within the hard timeout; treated as an actual deadlock.
    TimedOut,
}

#[derive(Clone, Debug, Serialize)]
pub struct DetectionReport {
    #[serde(flatten)]
    pub status: RunStatus,
    pub deadlocked: bool,
    pub hazards: Vec<Hazard>,
    pub events: Vec<LockEvent>,
    pub elapsed_secs: f64,
    pub timeout_secs: f64,
    /// Captured stdout and stderr of an external program.
    pub output: Option<String>,
}

impl DetectionReport {
    /// Finished in time and never recorded a hazard.
    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Completed && self.hazards.is_empty()
    }

    pub fn hazards_of(&self, kind: HazardKind) -> impl Iterator<Item = &Hazard> {
        self.hazards.iter().filter(move |h| h.kind == kind)
    }
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            writeln!(f, "No deadlocks detected ({:.3}s)", self.elapsed_secs)?;
        } else {
            match &self.status {
                RunStatus::TimedOut => {
                    writeln!(f, "DEADLOCK: execution did not complete within {}s", self.timeout_secs)?;
                    writeln!(f, "Threads are blocked waiting for each other.")?;
                }
                RunStatus::Panicked { message } => writeln!(f, "Monitored program panicked: {message}")?,
                RunStatus::Failed { exit_code } => match exit_code {
                    Some(code) => writeln!(f, "Monitored program exited with status {code}")?,
                    None => writeln!(f, "Monitored program was terminated by a signal")?,
                },
                RunStatus::Completed => writeln!(f, "Potential deadlock issues detected")?,
            }
        }

        if !self.hazards.is_empty() {
            writeln!(f, "\n{} potential deadlock issue(s):", self.hazards.len())?;
            for (i, h) in self.hazards.iter().enumerate() {
                writeln!(f, "  {}. [{}] {}", i + 1, h.kind.as_str(), h.message)?;
            }
        }
        if !self.events.is_empty() {
            writeln!(f, "\nLock event trace ({} events):", self.events.len())?;
            for event in &self.events {
                writeln!(f, "  {event}")?;
            }
        }
        if let Some(output) = self.output.as_deref().filter(|o| !o.is_empty()) {
            writeln!(f, "\nProgram output:\n{output}")?;
        }
        Ok(())
    }
}
