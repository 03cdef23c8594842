#![forbid(unsafe_code)]

use std::fmt::Write as _;

use miette::IntoDiagnostic;
use serde::Serialize;
use vigil_analyze::FeatureProfile;
use vigil_backend_c::TranslationArtifact;
use vigil_bmc::VerificationOutcome;

/// What `vigil translate --json` prints: the profile it was fed plus the artifact.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateReport<'a> {
    pub source: String,
    pub analysis: &'a FeatureProfile,
    pub translation: &'a TranslationArtifact,
}

/// What `vigil verify --json` prints.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport<'a> {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<&'a TranslationArtifact>,
    pub verification: &'a VerificationOutcome,
}

pub fn to_json<T: Serialize>(value: &T) -> miette::Result<String> {
    serde_json::to_string_pretty(value).into_diagnostic()
}

pub fn render_translation(artifact: &TranslationArtifact) -> String {
    let mut out = String::new();
    out.push_str(&artifact.c_source);
    if !artifact.c_source.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    match (&artifact.saved_path, &artifact.save_warning) {
        (Some(path), _) => {
            let _ = writeln!(out, "saved to {}", path.display());
        }
        (None, Some(warning)) => {
            let _ = writeln!(out, "warning: {warning}");
        }
        (None, None) => {}
    }
    if !artifact.checks.is_empty() {
        let checks: Vec<&str> = artifact.checks.iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "checks exercised: {}", checks.join(", "));
    }
    if artifact.uses_verifier_convention {
        out.push_str("verifier convention detected: nondet values are unsigned\n");
    }
    out
}

pub fn render_verification(outcome: &VerificationOutcome) -> String {
    let mut out = String::new();
    let verdict = if outcome.success {
        "VERIFICATION SUCCESSFUL"
    } else if outcome.classification.is_verdict() {
        "VERIFICATION FAILED"
    } else {
        "VERIFICATION INCONCLUSIVE"
    };
    let _ = writeln!(out, "{verdict} ({})", outcome.classification);
    let _ = writeln!(out, "command: {}", outcome.command_line);
    let _ = writeln!(out, "checks:  {}", outcome.enabled_checks.join(", "));
    let _ = writeln!(out, "file:    {}", outcome.saved_file.display());

    if outcome.attempts.len() > 1 {
        let _ = writeln!(out, "\nattempts:");
        for (i, a) in outcome.attempts.iter().enumerate() {
            let _ = write!(
                out,
                "  {}. [{:?}] {} -> {} ({:.2}s)",
                i + 1,
                a.stage,
                a.configuration,
                a.classification,
                a.duration_secs
            );
            if let Some(option) = &a.repaired_option {
                let _ = write!(out, ", removed {option}");
            }
            out.push('\n');
        }
    }

    if let Some(guidance) = &outcome.guidance {
        let _ = writeln!(out, "\n{guidance}");
    }
    if !outcome.output.is_empty() {
        let _ = writeln!(out, "\nchecker output:\n{}", outcome.output.trim_end());
    }
    out
}
