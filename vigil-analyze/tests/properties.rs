use proptest::{
    prelude::{any, prop},
    test_runner::{Config, TestCaseError, TestRunner},
};
use vigil_analyze::{analyze, CheckKind};

/// Builds `def f(a, b, c):` returning a left-folded chain of the given operators.
fn program_from_ops(ops: &[u8], operators: &[&str]) -> String {
    let names = ["a", "b", "c", "3", "7"];
    let mut expr = String::from("a");
    for (i, op) in ops.iter().enumerate() {
        let operator = operators[*op as usize % operators.len()];
        let operand = names[(i + *op as usize) % names.len()];
        expr = format!("({expr} {operator} {operand})");
    }
    format!("def f(a, b, c):\n    return {expr}\n")
}

#[test]
fn additive_programs_always_recommend_overflow() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let strat = prop::collection::vec(any::<u8>(), 1..12);

    runner
        .run(&strat, |ops| {
            let src = program_from_ops(&ops, &["+", "-", "*"]);
            let profile = analyze(&src).map_err(|e| TestCaseError::fail(e.to_string()))?;
            if !profile.recommends(CheckKind::Overflow) {
                return Err(TestCaseError::fail(format!("no overflow check for:\n{src}")));
            }
            if profile.recommends(CheckKind::DivByZero) {
                return Err(TestCaseError::fail(format!("spurious div-by-zero for:\n{src}")));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn programs_with_division_recommend_div_by_zero() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let strat = (prop::collection::vec(any::<u8>(), 0..8), any::<u8>());

    runner
        .run(&strat, |(ops, extra)| {
            let mut src = program_from_ops(&ops, &["+", "-", "*", "/"]);
            src.push_str(&format!("\nq = {} / {}\n", extra, u16::from(extra) + 1));
            let profile = analyze(&src).map_err(|e| TestCaseError::fail(e.to_string()))?;
            if !profile.recommends(CheckKind::DivByZero) {
                return Err(TestCaseError::fail(format!("no div-by-zero check for:\n{src}")));
            }
            Ok(())
        })
        .unwrap();
}
