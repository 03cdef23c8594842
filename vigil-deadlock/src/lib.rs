#![forbid(unsafe_code)]

//! Runtime deadlock detection through instrumented locks.
//!
//! A monitored program takes its locks from a [`Detector`]. Each acquire runs
//! a circular-wait search over the live wait-for graph before blocking, and
//! each grant checks for lock-ordering inversions against every other
//! thread's history. A hard timeout catches hangs the graph cannot see.
//!
//! Python scripts get the same checks through [`monitor_python`], which runs
//! them with their `threading` locks swapped for instrumented proxies.

mod graph;
mod monitor;
mod mutex;
mod python;
mod report;

pub use monitor::{monitor, monitor_process, DetectorConfig};
pub use python::{monitor_python, monitor_python_source, DEFAULT_INTERPRETER, HAZARD_MARKER};
pub use mutex::{Detector, TrackedGuard, TrackedMutex};
pub use report::{
    DetectionReport, EventKind, Hazard, HazardKind, LockEvent, LockId, RunStatus,
};
