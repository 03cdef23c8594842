#![forbid(unsafe_code)]

use std::fmt;

use serde::Serialize;

/// Checks the bounded model checker can be asked to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    Overflow,
    Bounds,
    DivByZero,
    Pointer,
}

impl CheckKind {
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Overflow,
        CheckKind::Bounds,
        CheckKind::DivByZero,
        CheckKind::Pointer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckKind::Overflow => "overflow",
            CheckKind::Bounds => "bounds",
            CheckKind::DivByZero => "div-by-zero",
            CheckKind::Pointer => "pointer",
        }
    }

    pub fn parse(s: &str) -> Option<CheckKind> {
        CheckKind::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural features of one analyzed source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeatureProfile {
    /// Declared function names, in source order, without duplicates.
    pub functions: Vec<String>,
    /// Declared class names, in source order, without duplicates.
    pub classes: Vec<String>,
    /// Imported module names (`import a.b` gives `a.b`; `from m import x` gives `m`).
    pub imports: Vec<String>,

    pub has_loops: bool,
    pub has_conditionals: bool,
    pub has_exceptions: bool,
    pub has_type_hints: bool,
    pub has_division: bool,
    pub has_array_access: bool,
    pub has_threading: bool,
    pub has_arithmetic: bool,
    pub has_multiplication: bool,
    pub has_pointer_ops: bool,

    /// Loop counter that increments on every loop entered and never decrements,
    /// so sequential loops after a nested pair still raise it.
    pub max_loop_depth: usize,
    /// True maximum loop nesting.
    pub max_loop_nesting: usize,

    pub recommended_checks: Vec<CheckKind>,
}

impl FeatureProfile {
    pub fn recommends(&self, check: CheckKind) -> bool {
        self.recommended_checks.contains(&check)
    }

    pub fn imports_module(&self, name: &str) -> bool {
        self.imports.iter().any(|m| m == name)
    }
}

/// Recommended checks as a pure function of the feature flags.
pub fn derive_checks(profile: &FeatureProfile) -> Vec<CheckKind> {
    let mut checks = Vec::new();
    if profile.has_arithmetic || profile.has_multiplication {
        checks.push(CheckKind::Overflow);
    }
    if profile.has_array_access {
        checks.push(CheckKind::Bounds);
    }
    if profile.has_division {
        checks.push(CheckKind::DivByZero);
    }
    if profile.has_pointer_ops {
        checks.push(CheckKind::Pointer);
    }
    checks
}
