#![forbid(unsafe_code)]

//! Drives an external bounded model checker (ESBMC) over translated C.
//!
//! Each request walks a fixed retry ladder: escalate the unwind bound on
//! unwinding assertions, degrade on timeouts, and strip an option the checker
//! rejects. Only an explicit success verdict with a clean exit is success.

mod backend;
mod classify;
mod config;
mod driver;
mod error;
mod ladder;
mod truncate;

pub use backend::{CheckerBackend, EsbmcProcess, Invocation};
pub use classify::{
    classify, unrecognised_option, AttemptOutput, Classification, FAILURE_MARKER, SUCCESS_MARKER,
    UNWINDING_MARKER,
};
pub use config::{
    CheckConfiguration, CheckFlags, BASE_TIMEOUT_SECS, DEGRADED_TIMEOUT_SECS, DEGRADED_UNWIND,
    EXTENDED_TIMEOUT_SECS, INITIAL_UNWIND, MAX_UNWIND,
};
pub use driver::{AttemptRecord, BmcDriver, CheckerConfig, VerificationOutcome, VERIFY_FILE_NAME};
pub use error::{BmcError, INSTALL_GUIDANCE};
pub use ladder::{RetryLadder, Stage, Transition, TIMEOUT_GUIDANCE, UNWINDING_GUIDANCE};
pub use truncate::{truncate_output, DEFAULT_MAX_OUTPUT_LEN};
