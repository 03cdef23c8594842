#![forbid(unsafe_code)]

use std::fmt;
use std::path::Path;

use serde::Serialize;
use vigil_analyze::CheckKind;

pub const INITIAL_UNWIND: u32 = 10;
pub const MAX_UNWIND: u32 = 20;
pub const DEGRADED_UNWIND: u32 = 5;

pub const BASE_TIMEOUT_SECS: u64 = 30;
/// Used when overflow or memory-leak checking is requested.
pub const EXTENDED_TIMEOUT_SECS: u64 = 60;
pub const DEGRADED_TIMEOUT_SECS: u64 = 30;

/// Property classes the checker should look for.
///
/// Bounds, division-by-zero and pointer checks are on by default in the
/// checker, so only the remaining three turn into command-line options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckFlags {
    pub overflow: bool,
    pub bounds: bool,
    pub div_by_zero: bool,
    pub deadlock: bool,
    pub pointer: bool,
    pub memory_leak: bool,
}

impl CheckFlags {
    pub fn from_recommended(checks: &[CheckKind]) -> Self {
        let mut flags = CheckFlags::default();
        for check in checks {
            match check {
                CheckKind::Overflow => flags.overflow = true,
                CheckKind::Bounds => flags.bounds = true,
                CheckKind::DivByZero => flags.div_by_zero = true,
                CheckKind::Pointer => flags.pointer = true,
            }
        }
        flags
    }

    /// Drops the checks that are opt-in for the checker.
    pub fn without_optional(self) -> Self {
        CheckFlags {
            overflow: false,
            deadlock: false,
            memory_leak: false,
            ..self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CheckConfiguration {
    pub checks: CheckFlags,
    pub unwind: u32,
    pub timeout_secs: u64,
}

impl CheckConfiguration {
    /// First-attempt configuration: moderate unwind, timeout scaled to the checks.
    pub fn new(checks: CheckFlags) -> Self {
        let timeout_secs = if checks.overflow || checks.memory_leak {
            EXTENDED_TIMEOUT_SECS
        } else {
            BASE_TIMEOUT_SECS
        };
        Self {
            checks,
            unwind: INITIAL_UNWIND,
            timeout_secs,
        }
    }

    pub fn with_unwind(mut self, unwind: u32) -> Self {
        self.unwind = unwind.max(1);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    /// Never lowers a bound the caller already raised past the ladder's ceiling.
    pub fn escalated(self) -> Self {
        Self {
            unwind: self.unwind.max(MAX_UNWIND),
            ..self
        }
    }

    pub fn degraded(self) -> Self {
        Self {
            checks: self.checks.without_optional(),
            unwind: self.unwind.min(DEGRADED_UNWIND),
            timeout_secs: DEGRADED_TIMEOUT_SECS,
        }
    }

    /// `<file> --unwind N --timeout S [--overflow-check] [--deadlock-check] [--memory-leak-check]`
    pub fn arguments(&self, file: &Path) -> Vec<String> {
        let mut args = vec![
            file.display().to_string(),
            "--unwind".to_string(),
            self.unwind.to_string(),
            "--timeout".to_string(),
            self.timeout_secs.to_string(),
        ];
        if self.checks.overflow {
            args.push("--overflow-check".to_string());
        }
        if self.checks.deadlock {
            args.push("--deadlock-check".to_string());
        }
        if self.checks.memory_leak {
            args.push("--memory-leak-check".to_string());
        }
        args
    }

    /// Checks in effect for this configuration, for reporting.
    pub fn enabled_checks(&self) -> Vec<&'static str> {
        let mut enabled = vec!["bounds-check", "div-by-zero-check", "pointer-check"];
        if self.checks.overflow {
            enabled.push("overflow");
        }
        if self.checks.deadlock {
            enabled.push("deadlock");
        }
        if self.checks.memory_leak {
            enabled.push("memory-leak");
        }
        enabled
    }
}

impl fmt::Display for CheckConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unwind={} timeout={}s checks=[{}]",
            self.unwind,
            self.timeout_secs,
            self.enabled_checks().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_scales_with_expensive_checks() {
        let plain = CheckConfiguration::new(CheckFlags::default());
        assert_eq!((plain.unwind, plain.timeout_secs), (10, 30));

        let overflow = CheckConfiguration::new(CheckFlags {
            overflow: true,
            ..CheckFlags::default()
        });
        assert_eq!(overflow.timeout_secs, 60);

        let leak = CheckConfiguration::new(CheckFlags {
            memory_leak: true,
            ..CheckFlags::default()
        });
        assert_eq!(leak.timeout_secs, 60);
    }

    #[test]
    fn escalation_keeps_flags_and_degradation_drops_optional_checks() {
        let checks = CheckFlags {
            overflow: true,
            bounds: true,
            deadlock: true,
            memory_leak: true,
            ..CheckFlags::default()
        };
        let cfg = CheckConfiguration::new(checks);

        let up = cfg.escalated();
        assert_eq!(up.unwind, 20);
        assert_eq!(up.checks, checks);
        assert_eq!(up.timeout_secs, cfg.timeout_secs);

        let down = cfg.degraded();
        assert_eq!((down.unwind, down.timeout_secs), (5, 30));
        assert!(!down.checks.overflow && !down.checks.deadlock && !down.checks.memory_leak);
        assert!(down.checks.bounds);
    }

    #[test]
    fn explicit_unwind_survives_the_ladder() {
        let deep = CheckConfiguration::new(CheckFlags::default()).with_unwind(50);
        assert_eq!(deep.escalated().unwind, 50);
        assert_eq!(deep.degraded().unwind, 5);

        let shallow = CheckConfiguration::new(CheckFlags::default()).with_unwind(3);
        assert_eq!(shallow.escalated().unwind, 20);
        assert_eq!(shallow.degraded().unwind, 3);
    }

    #[test]
    fn argument_grammar() {
        let cfg = CheckConfiguration::new(CheckFlags {
            overflow: true,
            deadlock: true,
            ..CheckFlags::default()
        });
        assert_eq!(
            cfg.arguments(Path::new("esbmc_verify.c")),
            vec![
                "esbmc_verify.c",
                "--unwind",
                "10",
                "--timeout",
                "60",
                "--overflow-check",
                "--deadlock-check"
            ]
        );
        assert_eq!(
            cfg.enabled_checks(),
            vec!["bounds-check", "div-by-zero-check", "pointer-check", "overflow", "deadlock"]
        );
    }

    #[test]
    fn analyzer_checks_map_to_flags() {
        let flags = CheckFlags::from_recommended(&[CheckKind::Overflow, CheckKind::DivByZero]);
        assert!(flags.overflow && flags.div_by_zero);
        assert!(!flags.bounds && !flags.pointer && !flags.deadlock);
    }
}
