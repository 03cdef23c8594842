#![forbid(unsafe_code)]

use std::fmt;

use serde::Serialize;

use crate::profile::{CheckKind, FeatureProfile};

/// Follow-up tools worth running on the analyzed source, highest value first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    TypeCheck,
    DeadlockDetector,
    ModelCheck,
    SecurityScan,
    Lint,
    StyleCheck,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::TypeCheck => "type-check",
            Tool::DeadlockDetector => "deadlock-detector",
            Tool::ModelCheck => "model-check",
            Tool::SecurityScan => "security-scan",
            Tool::Lint => "lint",
            Tool::StyleCheck => "style-check",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub tool: Tool,
    pub reason: String,
    /// Checks to enable; only set for `Tool::ModelCheck`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckKind>,
}

impl Recommendation {
    fn new(tool: Tool, reason: &str) -> Self {
        Self {
            tool,
            reason: reason.to_string(),
            checks: Vec::new(),
        }
    }
}

pub fn recommend_tools(profile: &FeatureProfile) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if profile.has_type_hints {
        out.push(Recommendation::new(Tool::TypeCheck, "type annotations present"));
    }
    if profile.has_threading {
        out.push(Recommendation::new(
            Tool::DeadlockDetector,
            "threading in use; translation to C loses threading semantics",
        ));
    } else if !profile.recommended_checks.is_empty() {
        let mut rec = Recommendation::new(Tool::ModelCheck, "translate to C and model check");
        rec.checks = profile.recommended_checks.clone();
        out.push(rec);
    }
    if profile.imports_module("os") || profile.imports_module("subprocess") {
        out.push(Recommendation::new(Tool::SecurityScan, "process or filesystem access"));
    }
    out.push(Recommendation::new(Tool::Lint, "code quality"));
    out.push(Recommendation::new(Tool::StyleCheck, "style"));
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

impl fmt::Display for FeatureProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Structural analysis")?;
        writeln!(f, "  functions: {}", list_or_none(&self.functions))?;
        writeln!(f, "  classes:   {}", list_or_none(&self.classes))?;
        writeln!(f, "  imports:   {}", list_or_none(&self.imports))?;
        writeln!(f)?;
        writeln!(f, "  type hints:        {}", yes_no(self.has_type_hints))?;
        if self.has_loops {
            writeln!(
                f,
                "  loops:             yes (depth counter {}, nesting {})",
                self.max_loop_depth, self.max_loop_nesting
            )?;
        } else {
            writeln!(f, "  loops:             no")?;
        }
        writeln!(f, "  conditionals:      {}", yes_no(self.has_conditionals))?;
        writeln!(f, "  exceptions:        {}", yes_no(self.has_exceptions))?;
        writeln!(f, "  arithmetic:        {}", yes_no(self.has_arithmetic))?;
        writeln!(f, "  multiplication:    {}", yes_no(self.has_multiplication))?;
        writeln!(f, "  division:          {}", yes_no(self.has_division))?;
        writeln!(f, "  subscript access:  {}", yes_no(self.has_array_access))?;
        writeln!(f, "  attribute access:  {}", yes_no(self.has_pointer_ops))?;
        writeln!(f, "  threading:         {}", yes_no(self.has_threading))?;

        let checks: Vec<&str> = self.recommended_checks.iter().map(|c| c.as_str()).collect();
        writeln!(f)?;
        writeln!(
            f,
            "  recommended checks: {}",
            if checks.is_empty() { "none".to_string() } else { checks.join(", ") }
        )?;

        writeln!(f, "  recommended tools:")?;
        for rec in recommend_tools(self) {
            if rec.checks.is_empty() {
                writeln!(f, "    - {} ({})", rec.tool.as_str(), rec.reason)?;
            } else {
                let checks: Vec<&str> = rec.checks.iter().map(|c| c.as_str()).collect();
                writeln!(
                    f,
                    "    - {} ({}; checks: {})",
                    rec.tool.as_str(),
                    rec.reason,
                    checks.join(", ")
                )?;
            }
        }
        Ok(())
    }
}
