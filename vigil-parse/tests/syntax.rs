use vigil_ast::{BinOp, BoolOp, CmpOp, Constant, ExprKind, ParamKind, PatternKind, StmtKind};
use vigil_parse::{parse_expr, parse_module, parse_source};

#[test]
fn function_with_annotations_and_defaults_parses() {
    let src = "def add(a: int, b: int = 2, *rest, key=None, **kw) -> int:\n    return a + b\n";
    let module = parse_module(src).expect("function should parse");
    let StmtKind::FunctionDef(f) = &module.body[0].kind else {
        panic!("expected a function definition");
    };
    assert_eq!(f.name.node, "add");
    let kinds: Vec<ParamKind> = f.params.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ParamKind::Positional,
            ParamKind::Positional,
            ParamKind::VarArgs,
            ParamKind::KeywordOnly,
            ParamKind::VarKeywords,
        ]
    );
    assert!(f.params[0].annotation.is_some());
    assert!(f.params[1].default.is_some());
    assert!(f.returns.is_some());
    assert_eq!(f.positional_params().count(), 2);
}

#[test]
fn elif_chain_nests_in_orelse() {
    let src = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
    let module = parse_module(src).unwrap();
    let StmtKind::If(outer) = &module.body[0].kind else {
        panic!("expected if");
    };
    assert_eq!(outer.orelse.len(), 1);
    let StmtKind::If(inner) = &outer.orelse[0].kind else {
        panic!("expected nested if for elif");
    };
    assert_eq!(inner.orelse.len(), 1);
}

#[test]
fn chained_comparison_keeps_every_operator() {
    let expr = parse_expr("0 <= i < n").unwrap();
    let ExprKind::Compare { ops, comparators, .. } = expr.kind else {
        panic!("expected comparison");
    };
    assert_eq!(ops, vec![CmpOp::LtE, CmpOp::Lt]);
    assert_eq!(comparators.len(), 2);
}

#[test]
fn not_in_and_is_not_are_single_operators() {
    let expr = parse_expr("a not in b").unwrap();
    assert!(matches!(expr.kind, ExprKind::Compare { ref ops, .. } if ops == &vec![CmpOp::NotIn]));
    let expr = parse_expr("a is not None").unwrap();
    assert!(matches!(expr.kind, ExprKind::Compare { ref ops, .. } if ops == &vec![CmpOp::IsNot]));
}

#[test]
fn arithmetic_precedence_and_power_associativity() {
    let expr = parse_expr("1 + 2 * 3").unwrap();
    let ExprKind::BinOp { op, right, .. } = expr.kind else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOp::Add);
    assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));

    let expr = parse_expr("2 ** 3 ** 2").unwrap();
    let ExprKind::BinOp { op, right, .. } = expr.kind else {
        panic!("expected binop");
    };
    assert_eq!(op, BinOp::Pow);
    assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Pow, .. }));
}

#[test]
fn boolean_operators_flatten() {
    let expr = parse_expr("a and b and c or d").unwrap();
    let ExprKind::BoolOp { op, values } = expr.kind else {
        panic!("expected boolop");
    };
    assert_eq!(op, BoolOp::Or);
    assert!(matches!(&values[0].kind, ExprKind::BoolOp { op: BoolOp::And, values } if values.len() == 3));
}

#[test]
fn imports_record_aliases_and_levels() {
    let src = "import os.path, esbmc as v\nfrom ..pkg import (a, b as c,)\nfrom threading import *\n";
    let module = parse_module(src).unwrap();
    let StmtKind::Import(names) = &module.body[0].kind else {
        panic!("expected import");
    };
    assert_eq!(names[0].name, "os.path");
    assert_eq!(names[1].bound_name(), "v");

    let StmtKind::ImportFrom(from) = &module.body[1].kind else {
        panic!("expected from-import");
    };
    assert_eq!(from.level, 2);
    assert_eq!(from.module.as_deref(), Some("pkg"));
    assert_eq!(from.names.len(), 2);

    let StmtKind::ImportFrom(star) = &module.body[2].kind else {
        panic!("expected from-import");
    };
    assert_eq!(star.names[0].name, "*");
}

#[test]
fn compound_statements_parse() {
    let src = r#"
class Account(Base, metaclass=Meta):
    """Holds a balance."""

    def withdraw(self, amount):
        with self.lock as guard, other:
            try:
                self.balance -= amount
            except ValueError as err:
                raise RuntimeError("bad") from err
            else:
                pass
            finally:
                log()

async def fetch(xs):
    async for x in xs:
        await x
    for i, (a, b) in enumerate(pairs):
        continue
    else:
        return [v * 2 for v in xs if v], {k: v for k, v in d.items()}, {1, 2}
"#;
    let module = parse_source(src).expect("compound statements should parse");
    assert_eq!(module.body.len(), 2);
}

#[test]
fn expressions_with_calls_slices_and_lambdas() {
    let src = "y = f(*args, key=1, **kw)[1:2, ::3].attr\nz = lambda a, b=2: a if b else (yield)\nw = (n := 10)\n";
    parse_module(src).expect("expressions should parse");
}

#[test]
fn multiple_simple_statements_on_one_line() {
    let module = parse_module("a = 1; b = 2; c = a = b\n").unwrap();
    assert_eq!(module.body.len(), 3);
    let StmtKind::Assign(assign) = &module.body[2].kind else {
        panic!("expected assignment");
    };
    assert_eq!(assign.targets.len(), 2);
}

#[test]
fn implicit_string_concatenation() {
    let expr = parse_expr("'a' \"b\"").unwrap();
    assert_eq!(expr.kind, ExprKind::Constant(Constant::Str("ab".to_string())));
}

#[test]
fn missing_colon_is_reported_with_position() {
    let src = "def f(x)\n    return x\n";
    let err = parse_module(src).expect_err("expected parse error");
    assert!(err.message.contains("Colon"), "unexpected message: {}", err.message);
    assert_eq!(err.line_col(src).0, 1);
}

#[test]
fn assignment_to_literal_is_rejected() {
    let err = parse_module("1 = x\n").expect_err("expected parse error");
    assert!(err.message.contains("cannot assign"));
}

#[test]
fn unterminated_call_is_rejected() {
    let err = parse_module("print(\n").expect_err("expected parse error");
    assert!(!err.message.is_empty());
}

#[test]
fn missing_indented_block_is_rejected() {
    let err = parse_module("while True:\nx = 1\n").expect_err("expected parse error");
    assert!(err.message.contains("indented block"));
}

#[test]
fn match_statement_collects_cases_and_patterns() {
    let src = "\
match command.split():
    case [\"go\", direction] if direction:
        x = 1
    case Point(0, y=yy) | Point(x=0) as p:
        x = 2
    case {\"k\": 1, **rest}:
        x = 3
    case -1 | 1.5 | 2+3j | Color.RED:
        x = 4
    case (a, *others):
        x = 5
    case _:
        x = 6
";
    let module = parse_module(src).unwrap();
    let StmtKind::Match(m) = &module.body[0].kind else {
        panic!("expected match statement");
    };
    assert!(matches!(m.subject.kind, ExprKind::Call { .. }));
    assert_eq!(m.cases.len(), 6);

    let first = &m.cases[0];
    assert!(first.guard.is_some());
    assert!(matches!(&first.pattern.kind, PatternKind::Sequence(items) if items.len() == 2));
    assert_eq!(first.pattern.bound_names(), vec!["direction"]);

    let PatternKind::As { pattern, name } = &m.cases[1].pattern.kind else {
        panic!("expected an as-pattern");
    };
    assert_eq!(name.node, "p");
    let PatternKind::Or(alternatives) = &pattern.kind else {
        panic!("expected alternatives");
    };
    let PatternKind::Class { patterns, keywords, .. } = &alternatives[0].kind else {
        panic!("expected class pattern");
    };
    assert_eq!(patterns.len(), 1);
    assert_eq!(keywords[0].0.node, "y");

    let PatternKind::Mapping { keys, rest, .. } = &m.cases[2].pattern.kind else {
        panic!("expected mapping pattern");
    };
    assert_eq!(keys.len(), 1);
    assert_eq!(rest.as_ref().map(|r| r.node.as_str()), Some("rest"));

    let PatternKind::Or(values) = &m.cases[3].pattern.kind else {
        panic!("expected literal alternatives");
    };
    assert_eq!(values.len(), 4);
    assert!(values.iter().all(|v| matches!(v.kind, PatternKind::Value(_))));

    assert_eq!(m.cases[4].pattern.bound_names(), vec!["a", "others"]);
    assert_eq!(m.cases[5].pattern.kind, PatternKind::Capture(None));
}

#[test]
fn match_and_type_stay_usable_as_names() {
    let src = "match = 1\nmatch.x = 2\nmatch(a)\ntype = 3\nprint(type, match)\n";
    let module = parse_module(src).unwrap();
    assert_eq!(module.body.len(), 5);
    assert!(matches!(module.body[0].kind, StmtKind::Assign(_)));
    assert!(matches!(module.body[1].kind, StmtKind::Assign(_)));
    assert!(matches!(module.body[2].kind, StmtKind::Expr(_)));
    assert!(matches!(module.body[3].kind, StmtKind::Assign(_)));
}

#[test]
fn type_alias_statements_parse() {
    let module = parse_module("type Pair = tuple[int, int]\ntype Box[T: int, *Ts, **P] = list[T]\n").unwrap();
    let StmtKind::TypeAlias(plain) = &module.body[0].kind else {
        panic!("expected type alias");
    };
    assert_eq!(plain.name.node, "Pair");
    assert!(plain.type_params.is_empty());
    let StmtKind::TypeAlias(generic) = &module.body[1].kind else {
        panic!("expected generic type alias");
    };
    let params: Vec<&str> = generic.type_params.iter().map(|p| p.node.as_str()).collect();
    assert_eq!(params, vec!["T", "Ts", "P"]);
}

#[test]
fn except_star_marks_the_try() {
    let src = "try:\n    f()\nexcept* ValueError:\n    pass\nexcept* (TypeError, KeyError) as eg:\n    pass\n";
    let module = parse_module(src).unwrap();
    let StmtKind::Try(t) = &module.body[0].kind else {
        panic!("expected try");
    };
    assert!(t.is_star);
    assert_eq!(t.handlers.len(), 2);
    assert_eq!(t.handlers[1].name.as_ref().map(|n| n.node.as_str()), Some("eg"));

    let err = parse_module("try:\n    f()\nexcept* ValueError:\n    pass\nexcept KeyError:\n    pass\n")
        .expect_err("mixed handlers should be rejected");
    assert!(err.message.contains("except*"));
}

#[test]
fn imaginary_and_wide_integer_literals() {
    let expr = parse_expr("2j + 1.5J").unwrap();
    let ExprKind::BinOp { left, right, .. } = expr.kind else {
        panic!("expected addition");
    };
    assert_eq!(left.kind, ExprKind::Constant(Constant::Imaginary(2.0)));
    assert_eq!(right.kind, ExprKind::Constant(Constant::Imaginary(1.5)));

    let expr = parse_expr("18446744073709551616").unwrap();
    assert_eq!(
        expr.kind,
        ExprKind::Constant(Constant::BigInt("18446744073709551616".to_string()))
    );
}
