#![forbid(unsafe_code)]

use crate::classify::{FAILURE_MARKER, SUCCESS_MARKER};

pub const DEFAULT_MAX_OUTPUT_LEN: usize = 5000;

const BANNER_MARKER: &str = "ESBMC version";
const VIOLATION_MARKER: &str = "Violated property:";
const MAX_IMPORTANT_LINES: usize = 10;
const MAX_VIOLATION_LINES: usize = 25;

/// Shorten checker output for downstream consumers.
///
/// Keeps, in priority order: the version banner, verdict lines, the first
/// property-violation block, and the first error/warning lines. Verdict lines
/// are never dropped.
pub fn truncate_output(output: &str, max_len: usize) -> String {
    if output.len() <= max_len {
        return output.to_string();
    }

    let mut banner = Vec::new();
    let mut verdicts = Vec::new();
    let mut notable = Vec::new();
    let mut violation: Vec<&str> = Vec::new();
    let mut violation_total = 0usize;
    let mut in_violation = false;

    for line in output.lines() {
        if line.contains(BANNER_MARKER) {
            banner.push(line);
        } else if line.contains(SUCCESS_MARKER) || line.contains(FAILURE_MARKER) {
            in_violation = false;
            verdicts.push(line);
        } else if line.contains(VIOLATION_MARKER) {
            // Only the first block is kept; later ones are counted.
            in_violation = violation_total == 0;
            if in_violation {
                violation.push(line);
                violation_total = 1;
            }
        } else if in_violation {
            if line.trim().is_empty() && violation.len() > 1 {
                in_violation = false;
            } else {
                violation_total += 1;
                if violation.len() < MAX_VIOLATION_LINES {
                    violation.push(line);
                }
            }
        } else {
            let lower = line.to_ascii_lowercase();
            if (lower.contains("error:") || lower.contains("warning:"))
                && notable.len() < MAX_IMPORTANT_LINES
            {
                notable.push(line);
            }
        }
    }

    let footer = format!(
        "\n[output truncated: {} chars, key lines kept]",
        output.len()
    );
    let reserved: usize = banner.iter().chain(verdicts.iter()).map(|l| l.len() + 1).sum();
    let mut budget = max_len.saturating_sub(reserved + footer.len());

    let mut out = String::new();
    for line in &banner {
        out.push_str(line);
        out.push('\n');
    }

    if !violation.is_empty() {
        let mut block = String::from("\nViolation details:\n");
        for line in &violation {
            block.push_str(line);
            block.push('\n');
        }
        if violation_total > violation.len() {
            block.push_str(&format!(
                "... [{} more violation lines]\n",
                violation_total - violation.len()
            ));
        }
        if block.len() <= budget {
            budget -= block.len();
            out.push_str(&block);
        }
    }

    let mut notes = String::new();
    for line in &notable {
        if notes.len() + line.len() + 1 > budget {
            break;
        }
        notes.push_str(line);
        notes.push('\n');
    }
    if !notes.is_empty() {
        out.push('\n');
        out.push_str(&notes);
    }

    for line in &verdicts {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&footer);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_is_untouched() {
        let out = "ESBMC version 7.6\nVERIFICATION SUCCESSFUL\n";
        assert_eq!(truncate_output(out, 5000), out);
    }

    #[test]
    fn verdict_survives_long_noise() {
        let mut out = String::from("ESBMC version 7.6 64-bit\n");
        for i in 0..2_000 {
            out.push_str(&format!("Unwinding loop {i} iteration 1 file esbmc_verify.c\n"));
        }
        out.push_str("warning: implicit declaration of function 'nondet_uint'\n");
        out.push_str("VERIFICATION SUCCESSFUL\n");

        let short = truncate_output(&out, 5000);
        assert!(short.len() <= 5000);
        assert!(short.starts_with("ESBMC version 7.6 64-bit\n"));
        assert!(short.contains("warning: implicit declaration"));
        assert!(short.contains("VERIFICATION SUCCESSFUL"));
        assert!(!short.contains("Unwinding loop 1500"));
    }

    #[test]
    fn violation_block_is_bounded() {
        let mut out = "padding line\n".repeat(1_000);
        out.push_str("Violated property:\n  file esbmc_verify.c line 7 function main\n");
        for i in 0..40 {
            out.push_str(&format!("  trace step {i}\n"));
        }
        out.push('\n');
        out.push_str("VERIFICATION FAILED\n");

        let short = truncate_output(&out, 5000);
        assert!(short.contains("Violation details:"));
        assert!(short.contains("Violated property:"));
        assert!(short.contains("trace step 0"));
        assert!(!short.contains("trace step 30"));
        assert!(short.contains("more violation lines"));
        assert!(short.contains("VERIFICATION FAILED"));
    }
}
