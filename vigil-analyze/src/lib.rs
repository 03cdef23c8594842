#![forbid(unsafe_code)]

mod profile;
mod report;
mod walk;

use tracing::debug;
use vigil_ast::Module;

pub use profile::{derive_checks, CheckKind, FeatureProfile};
pub use report::{recommend_tools, Recommendation, Tool};
pub use vigil_parse::ParseError;

/// Parse `source` and classify its structural features.
pub fn analyze(source: &str) -> Result<FeatureProfile, ParseError> {
    let module = vigil_parse::parse_module(source)?;
    Ok(analyze_module(&module))
}

pub fn analyze_module(module: &Module) -> FeatureProfile {
    let profile = walk::FeatureWalker::run(module);
    debug!(
        functions = profile.functions.len(),
        checks = ?profile.recommended_checks,
        "analyzed module"
    );
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication_implies_arithmetic_and_overflow() {
        let p = analyze("def f(a, b):\n    return a * b\n").unwrap();
        assert!(p.has_arithmetic);
        assert!(p.has_multiplication);
        assert_eq!(p.recommended_checks, vec![CheckKind::Overflow]);
    }

    #[test]
    fn division_subscript_and_attribute_map_to_checks() {
        let src = "def g(xs, i, obj):\n    return xs[i] / obj.count\n";
        let p = analyze(src).unwrap();
        assert_eq!(
            p.recommended_checks,
            vec![CheckKind::Bounds, CheckKind::DivByZero, CheckKind::Pointer]
        );
    }

    #[test]
    fn augmented_assignment_counts_as_arithmetic() {
        let p = analyze("total = 0\ntotal += 1\n").unwrap();
        assert!(p.has_arithmetic);
        assert!(p.recommends(CheckKind::Overflow));
    }

    #[test]
    fn loop_depth_counter_accumulates_but_nesting_does_not() {
        let src = "for i in range(3):\n    for j in range(3):\n        pass\nwhile x:\n    pass\n";
        let p = analyze(src).unwrap();
        assert!(p.has_loops);
        // Nested pair followed by a sequential loop.
        assert_eq!(p.max_loop_depth, 3);
        assert_eq!(p.max_loop_nesting, 2);
    }

    #[test]
    fn threading_and_type_hints_are_detected() {
        let src = "from threading import Lock\nimport os\n\ndef run(n: int):\n    pass\n";
        let p = analyze(src).unwrap();
        assert!(p.has_threading);
        assert!(p.has_type_hints);
        assert_eq!(p.imports, vec!["threading".to_string(), "os".to_string()]);

        let tools: Vec<Tool> = recommend_tools(&p).into_iter().map(|r| r.tool).collect();
        assert_eq!(
            tools,
            vec![
                Tool::TypeCheck,
                Tool::DeadlockDetector,
                Tool::SecurityScan,
                Tool::Lint,
                Tool::StyleCheck,
            ]
        );
    }

    #[test]
    fn model_check_recommendation_carries_checks() {
        let p = analyze("x = a / b\n").unwrap();
        let recs = recommend_tools(&p);
        let mc = recs.iter().find(|r| r.tool == Tool::ModelCheck).unwrap();
        assert_eq!(mc.checks, vec![CheckKind::DivByZero]);
    }

    #[test]
    fn conditionals_and_exceptions() {
        let src = "try:\n    if a:\n        raise ValueError()\nexcept ValueError:\n    pass\n";
        let p = analyze(src).unwrap();
        assert!(p.has_conditionals);
        assert!(p.has_exceptions);
        assert!(!p.has_loops);
    }

    #[test]
    fn match_cases_are_walked() {
        let src = "match cmd:\n    case Point(x=0, y=yy) if yy > 0:\n        r = 10 / yy\n    case [first, *rest]:\n        r = rest[first]\n    case _:\n        pass\n";
        let p = analyze(src).unwrap();
        assert!(p.has_conditionals);
        assert!(p.has_division);
        assert!(p.has_array_access);
    }

    #[test]
    fn syntax_error_carries_location() {
        let src = "def f(:\n    pass\n";
        let err = analyze(src).unwrap_err();
        assert_eq!(err.line_col(src).0, 1);
    }

    #[test]
    fn report_lists_functions_and_checks() {
        let p = analyze("class A:\n    pass\n\ndef f(x):\n    return x - 1\n").unwrap();
        let text = p.to_string();
        assert!(text.contains("functions: f"));
        assert!(text.contains("classes:   A"));
        assert!(text.contains("recommended checks: overflow"));
    }

    #[test]
    fn check_kind_names_round_trip() {
        for kind in CheckKind::ALL {
            assert_eq!(CheckKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CheckKind::parse("memory"), None);
    }
}
