#![forbid(unsafe_code)]

//! Lowers a restricted Python subset to C for bounded model checking.
//!
//! Supported: top-level functions with simple bodies, arithmetic, comparisons,
//! `if`/`while`, `for ... in range(...)`, and module-level statements (collected
//! into a synthesized `main`). Anything else becomes a commented placeholder so
//! the artifact stays compilable.

mod emit;

use std::fs;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use vigil_analyze::{CheckKind, FeatureProfile};
use vigil_parse::ParseError;

/// Fixed file name of the persisted artifact, overwritten on every translation.
pub const ARTIFACT_FILE_NAME: &str = "converted_code.c";

#[derive(Debug, Error, Diagnostic)]
pub enum TranslateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error("unsupported input: {reason}")]
    #[diagnostic(
        code(vigil::translate),
        help("define at least one function or module-level statement using arithmetic, comparisons, conditionals or bounded loops")
    )]
    Unsupported { reason: String },
}

#[derive(Clone, Debug)]
pub struct TranslatorConfig {
    /// Directory receiving `converted_code.c`.
    pub output_dir: PathBuf,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl TranslatorConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TranslationArtifact {
    pub c_source: String,
    /// Where the artifact was written; `None` when persisting failed.
    pub saved_path: Option<PathBuf>,
    pub save_warning: Option<String>,
    /// Translator findings first, then the analyzer's checks not already present.
    pub checks: Vec<CheckKind>,
    /// C functions emitted, in source order.
    pub functions: Vec<String>,
    pub uses_verifier_convention: bool,
}

impl TranslationArtifact {
    pub fn exercises(&self, check: CheckKind) -> bool {
        self.checks.contains(&check)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate `source`, merging the analyzer's recommendations when given,
    /// and persist the result to `<output_dir>/converted_code.c`.
    pub fn translate(
        &self,
        source: &str,
        profile: Option<&FeatureProfile>,
    ) -> Result<TranslationArtifact, TranslateError> {
        let module = vigil_parse::parse_module(source)?;
        let emitted = emit::emit_module(&module)?;

        let mut checks = emitted.checks;
        if let Some(profile) = profile {
            for check in &profile.recommended_checks {
                if !checks.contains(check) {
                    checks.push(*check);
                }
            }
        }
        debug!(
            functions = emitted.functions.len(),
            ?checks,
            verifier = emitted.uses_verifier_convention,
            "translated module"
        );

        let mut artifact = TranslationArtifact {
            c_source: emitted.c_source,
            saved_path: None,
            save_warning: None,
            checks,
            functions: emitted.functions,
            uses_verifier_convention: emitted.uses_verifier_convention,
        };
        self.persist(&mut artifact);
        Ok(artifact)
    }

    fn persist(&self, artifact: &mut TranslationArtifact) {
        let path = self.config.output_dir.join(ARTIFACT_FILE_NAME);
        let written = fs::create_dir_all(&self.config.output_dir)
            .and_then(|()| fs::write(&path, &artifact.c_source));
        match written {
            Ok(()) => artifact.saved_path = Some(path),
            Err(e) => {
                let message = format!("could not save {}: {e}", path.display());
                warn!("{message}");
                artifact.save_warning = Some(message);
            }
        }
    }
}

/// Translate with the default configuration (artifact saved in the working directory).
pub fn translate(
    source: &str,
    profile: Option<&FeatureProfile>,
) -> Result<TranslationArtifact, TranslateError> {
    Translator::default().translate(source, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> TranslationArtifact {
        let dir = tempfile::tempdir().unwrap();
        Translator::new(TranslatorConfig::default().with_output_dir(dir.path()))
            .translate(src, None)
            .unwrap()
    }

    #[test]
    fn division_registers_div_by_zero() {
        let art = run("def half(x: int) -> int:\n    return x / 2\n");
        assert!(art.c_source.contains("return x / 2;"));
        assert_eq!(art.checks, vec![CheckKind::DivByZero]);
    }

    #[test]
    fn empty_parameter_list_is_void() {
        let art = run("def zero():\n    return 0\n");
        assert!(art.c_source.contains("int zero(void) {"));
    }

    #[test]
    fn annotation_mapping() {
        let art = run("def g(x: float, s: str, b: bool) -> float:\n    return x\n");
        assert!(art.c_source.contains("float g(float x, char* s, int b) {"));
    }

    #[test]
    fn reassignment_does_not_redeclare() {
        let art = run("def h(n):\n    acc = 0\n    acc = acc + n\n    return acc\n");
        assert!(art.c_source.contains("    int acc = 0;\n"));
        assert!(art.c_source.contains("    acc = (acc + n);\n"));
    }

    #[test]
    fn complex_return_becomes_placeholder() {
        let art = run("def pair(a):\n    return [a, a]\n");
        assert!(art.c_source.contains("return 0;  // Could not convert complex return"));
    }

    #[test]
    fn elif_chain_lowers_to_else_if() {
        let src = "def sign(x):\n    if x > 0:\n        return 1\n    elif x < 0:\n        return -1\n    else:\n        return 0\n";
        let art = run(src);
        assert!(art.c_source.contains("    if (x > 0) {\n"));
        assert!(art.c_source.contains("    } else if (x < 0) {\n"));
        assert!(art.c_source.contains("    } else {\n"));
    }

    #[test]
    fn chained_comparison_is_conjunction() {
        let art = run("def inside(i, n):\n    return 0 <= i < n\n");
        assert!(art.c_source.contains("return ((0 <= i) && (i < n));"));
    }

    #[test]
    fn range_loop_declares_counter_once() {
        let src = "total = 0\nfor i in range(1, 10, 2):\n    total += i\n";
        let art = run(src);
        assert!(art.c_source.contains("    int i;\n"));
        assert!(art.c_source.contains("for (i = 1; i < 10; i += 2) {"));
        assert!(art.c_source.contains("        total += i;\n"));
        assert!(art.exercises(CheckKind::Overflow));
    }

    #[test]
    fn subscript_and_attribute_register_checks() {
        let art = run("def get(xs, i, node):\n    return xs[i] + node.value\n");
        assert!(art.c_source.contains("return xs[i] + node->value;"));
        assert_eq!(
            art.checks,
            vec![CheckKind::Overflow, CheckKind::Bounds, CheckKind::Pointer]
        );
    }

    #[test]
    fn power_is_not_lowered() {
        let art = run("def sq(x):\n    return x ** 2\n");
        assert!(art.c_source.contains("Could not convert complex return"));
        assert!(!art.exercises(CheckKind::Overflow));
    }

    #[test]
    fn user_main_is_renamed() {
        let art = run("def main():\n    return 1\n\nif __name__ == \"__main__\":\n    main()\n");
        assert!(art.c_source.contains("int user_main(void) {"));
        assert!(art.c_source.contains("    user_main();\n"));
        assert_eq!(art.c_source.matches("int main()").count(), 1);
    }

    #[test]
    fn unsupported_statement_keeps_structure() {
        let src = "def f(x):\n    try:\n        x = 1\n    except ValueError:\n        pass\n    return x\n";
        let art = run(src);
        assert!(art.c_source.contains("/* unsupported: try */"));
        assert!(art.c_source.contains("return x;"));
    }

    #[test]
    fn names_first_bound_in_a_branch_are_declared_up_front() {
        let src = "def pick(x):\n    if x > 0:\n        y = 1\n    else:\n        y = 2\n    return y\n";
        let art = run(src);
        let c = &art.c_source;
        let decl = c.find("    int y;\n").unwrap();
        assert!(decl < c.find("    if (x > 0) {").unwrap());
        assert!(c.contains("        y = 1;\n"));
        assert!(c.contains("        y = 2;\n"));
        assert!(!c.contains("int y = "));
        assert!(c.contains("    return y;\n"));
    }

    #[test]
    fn loop_locals_are_declared_in_main() {
        let src = "n = 0\nwhile n < 3:\n    step = n\n    n = step + 1\nassert step == 2\n";
        let art = run(src);
        let c = &art.c_source;
        assert!(c.contains("    int n = 0;\n"));
        let decl = c.find("    int step;\n").unwrap();
        assert!(decl < c.find("while (n < 3) {").unwrap());
        assert!(c.contains("        step = n;\n"));
        assert!(c.contains("assert(step == 2);"));
    }

    #[test]
    fn comparisons_keep_their_grouping_inside_arithmetic() {
        let art = run("def f(a, b):\n    return (a < b) + 1\n");
        assert!(art.c_source.contains("return (a < b) + 1;"));

        let art = run("def g(a, b):\n    x = -(a < b)\n    return x\n");
        assert!(art.c_source.contains("    int x = (-(a < b));\n"));
    }

    #[test]
    fn failed_lowering_registers_no_checks() {
        let art = run("def f(a, b, x):\n    return g(a + b, x ** 2)\n");
        assert!(art.c_source.contains("Could not convert complex return"));
        assert!(art.checks.is_empty());

        let art = run("def h(xs, i):\n    y = xs[i] + [i]\n    return 0\n");
        assert!(art.c_source.contains("/* unsupported: assignment of"));
        assert!(!art.exercises(CheckKind::Bounds));
        assert!(!art.exercises(CheckKind::Overflow));
    }

    #[test]
    fn newer_syntax_becomes_placeholders() {
        let src = "def f(cmd):\n    x = 18446744073709551616\n    match cmd:\n        case 1:\n            return 1\n    return 0\n";
        let art = run(src);
        assert!(art.c_source.contains("/* unsupported: assignment of integer literal wider than 64 bits */"));
        assert!(art.c_source.contains("/* unsupported: match */"));
        assert!(art.c_source.contains("return 0;"));
    }

    #[test]
    fn main_guard_else_is_kept_as_placeholder() {
        let src = "def f():\n    return 1\n\nif __name__ == \"__main__\":\n    f()\nelse:\n    x = 2\n";
        let art = run(src);
        assert!(art.c_source.contains("    f();\n"));
        assert!(art.c_source.contains("/* unsupported: else branch of the __main__ guard */"));
        assert!(!art.c_source.contains("x = 2"));
    }

    #[test]
    fn docstring_only_module_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Translator::new(TranslatorConfig::default().with_output_dir(dir.path()))
            .translate("\"\"\"Nothing here.\"\"\"\n", None)
            .unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }));
        assert!(!dir.path().join(ARTIFACT_FILE_NAME).exists());
    }

    #[test]
    fn syntax_errors_surface_as_parse_errors() {
        let err = translate("def f(:\n", None).unwrap_err();
        assert!(matches!(err, TranslateError::Parse(_)));
    }
}
