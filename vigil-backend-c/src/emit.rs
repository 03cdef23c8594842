#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use tracing::debug;
use vigil_analyze::CheckKind;
use vigil_ast::{
    BinOp, BoolOp, CmpOp, Constant, Expr, ExprKind, FunctionDef, IfStmt, Keyword, Module, Stmt,
    StmtKind, UnaryOp,
};

use crate::TranslateError;

/// Module name of the verifier's Python bindings.
const VERIFIER_MODULE: &str = "esbmc";

const INDENT: &str = "    ";

/// Lowered C text, or a short description of the construct that could not be lowered.
type Lowered = Result<String, String>;

pub(crate) struct Emitted {
    pub c_source: String,
    pub checks: Vec<CheckKind>,
    pub functions: Vec<String>,
    pub uses_verifier_convention: bool,
}

/// How the source refers to the verifier's nondeterministic primitives.
#[derive(Default)]
struct VerifierBinding {
    /// Names bound by `import esbmc [as v]`.
    receivers: HashSet<String>,
    /// Bare names bound by `from esbmc import x [as y]`, mapped to the primitive.
    bare: HashMap<String, String>,
    star: bool,
    imported: bool,
}

impl VerifierBinding {
    fn scan(module: &Module) -> Self {
        let mut binding = VerifierBinding::default();
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::Import(names) => {
                    for alias in names.iter().filter(|a| a.name == VERIFIER_MODULE) {
                        binding.imported = true;
                        binding.receivers.insert(alias.bound_name().to_string());
                    }
                }
                StmtKind::ImportFrom(from) if from.module.as_deref() == Some(VERIFIER_MODULE) => {
                    binding.imported = true;
                    for alias in &from.names {
                        if alias.name == "*" {
                            binding.star = true;
                        } else {
                            binding
                                .bare
                                .insert(alias.bound_name().to_string(), alias.name.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        binding
    }

    /// Primitive name for a call target like `v.nondet_uint` or an imported bare name.
    fn primitive_for(&self, func: &Expr) -> Option<String> {
        match &func.kind {
            ExprKind::Attribute { value, attr } => match &value.kind {
                ExprKind::Name(recv) if self.receivers.contains(recv) => Some(attr.node.clone()),
                _ => None,
            },
            ExprKind::Name(name) => {
                if let Some(prim) = self.bare.get(name) {
                    Some(prim.clone())
                } else if self.star && (name.starts_with("nondet_") || name == "assume") {
                    Some(name.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn is_receiver(&self, expr: &Expr) -> bool {
        matches!(&expr.kind, ExprKind::Name(n) if self.receivers.contains(n))
    }
}

fn primitive_ctype(name: &str) -> &'static str {
    match name {
        "nondet_uint" => "unsigned int",
        "nondet_int" => "int",
        "nondet_bool" => "_Bool",
        "nondet_char" => "char",
        "nondet_uchar" => "unsigned char",
        "nondet_short" => "short",
        "nondet_ushort" => "unsigned short",
        "nondet_long" => "long",
        "nondet_ulong" => "unsigned long",
        "nondet_float" => "float",
        "nondet_double" => "double",
        _ => "int",
    }
}

pub(crate) fn emit_module(module: &Module) -> Result<Emitted, TranslateError> {
    let verifier = VerifierBinding::scan(module);
    let mut em = Emitter {
        widen: verifier.imported,
        verifier,
        primitives: Vec::new(),
        checks: Vec::new(),
        scope: HashSet::new(),
        translated: 0,
    };

    let mut functions_c = String::new();
    let mut functions = Vec::new();
    let mut main_body = String::new();

    let mut seen = HashSet::new();
    let mut hoisted = Vec::new();
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {}
            StmtKind::If(i) if is_main_guard(&i.test) => {
                em.collect_locals(&i.body, false, &mut seen, &mut hoisted);
            }
            _ => em.collect_locals(std::slice::from_ref(stmt), false, &mut seen, &mut hoisted),
        }
    }
    em.declare(&mut main_body, hoisted);

    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::FunctionDef(f) if !f.is_async => {
                em.emit_function(&mut functions_c, f);
                functions.push(f.name.node.clone());
            }
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {
                debug!(kind = stmt.kind.describe(), "skipping top-level definition");
                placeholder(&mut functions_c, 0, stmt.kind.describe());
                functions_c.push('\n');
            }
            StmtKind::Import(_) | StmtKind::ImportFrom(_) => {}
            StmtKind::If(i) if is_main_guard(&i.test) => {
                em.emit_block(&mut main_body, &i.body, 1);
                if !i.orelse.is_empty() {
                    placeholder(&mut main_body, 1, "else branch of the __main__ guard");
                }
            }
            _ => {
                em.emit_stmt(&mut main_body, stmt, 1);
            }
        }
    }

    let main_translated = em.translated;
    if functions.is_empty() && main_translated == 0 {
        return Err(TranslateError::Unsupported {
            reason: "no translatable function definitions or module-level statements".to_string(),
        });
    }

    let mut out = String::new();
    out.push_str("#include <stdio.h>\n");
    out.push_str("#include <stdlib.h>\n");
    if !em.widen {
        out.push_str("#include <assert.h>\n");
    }
    out.push('\n');

    if !em.primitives.is_empty() {
        for prim in &em.primitives {
            out.push_str(&format!("{} {}();\n", primitive_ctype(prim), prim));
        }
        out.push('\n');
    }

    out.push_str(&functions_c);

    out.push_str("int main() {\n");
    if main_body.is_empty() {
        out.push_str("    // No module-level statements; entry point for the model checker.\n");
    } else {
        out.push_str(&main_body);
    }
    out.push_str("    return 0;\n");
    out.push_str("}\n");

    Ok(Emitted {
        c_source: out,
        checks: em.checks,
        functions,
        uses_verifier_convention: em.widen,
    })
}

/// `if __name__ == "__main__":` in either operand order.
fn is_main_guard(test: &Expr) -> bool {
    let ExprKind::Compare {
        left,
        ops,
        comparators,
    } = &test.kind
    else {
        return false;
    };
    if ops.as_slice() != [CmpOp::Eq] || comparators.len() != 1 {
        return false;
    }
    let is_name = |e: &Expr| matches!(&e.kind, ExprKind::Name(n) if n == "__name__");
    let is_main = |e: &Expr| matches!(&e.kind, ExprKind::Constant(Constant::Str(s)) if s == "__main__");
    (is_name(left) && is_main(&comparators[0])) || (is_main(left) && is_name(&comparators[0]))
}

/// Arguments of a `range(...)` call with one to three positional arguments.
fn range_args(iter: &Expr) -> Option<&[Expr]> {
    match &iter.kind {
        ExprKind::Call {
            func,
            args,
            keywords,
        } if matches!(&func.kind, ExprKind::Name(n) if n == "range")
            && keywords.is_empty()
            && (1..=3).contains(&args.len()) =>
        {
            Some(args)
        }
        _ => None,
    }
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(
        &stmt.kind,
        StmtKind::Expr(Expr {
            kind: ExprKind::Constant(Constant::Str(_)),
            ..
        })
    )
}

fn line(out: &mut String, level: usize, text: &str) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn placeholder(out: &mut String, level: usize, what: &str) {
    line(out, level, &format!("/* unsupported: {what} */"));
}

fn c_ident(name: &str) -> String {
    const C_KEYWORDS: &[&str] = &[
        "auto", "case", "char", "const", "default", "do", "double", "enum", "extern", "float",
        "goto", "int", "long", "register", "short", "signed", "sizeof", "static", "struct",
        "switch", "typedef", "union", "unsigned", "void", "volatile",
    ];
    if name == "main" {
        "user_main".to_string()
    } else if C_KEYWORDS.contains(&name) {
        format!("py_{name}")
    } else {
        name.to_string()
    }
}

fn c_string_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn binop_symbol(op: BinOp) -> Option<&'static str> {
    match op {
        BinOp::Add => Some("+"),
        BinOp::Sub => Some("-"),
        BinOp::Mul => Some("*"),
        // Integer floor division lowers to C division.
        BinOp::Div | BinOp::FloorDiv => Some("/"),
        BinOp::Mod => Some("%"),
        BinOp::LShift => Some("<<"),
        BinOp::RShift => Some(">>"),
        BinOp::BitOr => Some("|"),
        BinOp::BitXor => Some("^"),
        BinOp::BitAnd => Some("&"),
        BinOp::Pow | BinOp::MatMul => None,
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::NotEq => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        // Identity and membership have no C counterpart.
        CmpOp::Is | CmpOp::IsNot | CmpOp::In | CmpOp::NotIn => {
            debug!(?op, "comparison falls back to ==");
            "=="
        }
    }
}

fn check_for_binop(op: BinOp) -> Option<CheckKind> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => Some(CheckKind::Overflow),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod => Some(CheckKind::DivByZero),
        _ => None,
    }
}

/// Per-call translation state; nothing here outlives one `translate` call.
struct Emitter {
    verifier: VerifierBinding,
    /// Integer types widen to `unsigned int` under the verifier convention.
    widen: bool,
    /// Nondeterministic primitives used, in order of first use.
    primitives: Vec<String>,
    checks: Vec<CheckKind>,
    /// Names declared in the C scope currently being emitted.
    scope: HashSet<String>,
    /// Statements of `main` that lowered to real code.
    translated: usize,
}

impl Emitter {
    fn int_type(&self) -> &'static str {
        if self.widen { "unsigned int" } else { "int" }
    }

    fn map_annotation(&self, annotation: Option<&Expr>) -> &'static str {
        let base = match annotation.map(|a| &a.kind) {
            Some(ExprKind::Name(n)) => match n.as_str() {
                "float" => "float",
                "str" => "char*",
                _ => "int",
            },
            _ => "int",
        };
        if base == "int" { self.int_type() } else { base }
    }

    fn note_check(&mut self, check: CheckKind) {
        if !self.checks.contains(&check) {
            self.checks.push(check);
        }
    }

    fn note_primitive(&mut self, name: &str) {
        if !self.primitives.iter().any(|p| p == name) {
            self.primitives.push(name.to_string());
        }
    }

    fn emit_function(&mut self, out: &mut String, f: &FunctionDef) {
        let ret = self.map_annotation(f.returns.as_ref());
        let mut params = Vec::new();
        let main_scope = std::mem::take(&mut self.scope);

        for p in f.positional_params() {
            let ty = self.map_annotation(p.annotation.as_ref());
            let name = c_ident(&p.name.node);
            params.push(format!("{ty} {name}"));
            self.scope.insert(p.name.node.clone());
        }
        let skipped = f.params.len() - params.len();
        if skipped > 0 {
            debug!(function = %f.name.node, skipped, "dropping variadic or keyword-only parameters");
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };

        out.push_str(&format!("{ret} {}({params}) {{\n", c_ident(&f.name.node)));
        let mut seen = self.scope.clone();
        let mut hoisted = Vec::new();
        self.collect_locals(&f.body, false, &mut seen, &mut hoisted);
        self.declare(out, hoisted);
        let before = self.translated;
        self.emit_block(out, &f.body, 1);
        self.translated = before;
        out.push_str("}\n\n");

        self.scope = main_scope;
    }

    /// Find names whose first binding sits inside a nested block (or in a
    /// tuple target, which is never lowered). C scopes those declarations to
    /// the block, so they are declared once at the top of the function.
    fn collect_locals(
        &self,
        stmts: &[Stmt],
        nested: bool,
        seen: &mut HashSet<String>,
        hoisted: &mut Vec<(String, &'static str)>,
    ) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Assign(a) => {
                    for target in &a.targets {
                        self.bind_target(target, Some(&a.value), None, nested, seen, hoisted);
                    }
                }
                StmtKind::AnnAssign(a) => {
                    let ty = self.map_annotation(Some(&a.annotation));
                    self.bind_target(&a.target, a.value.as_ref(), Some(ty), nested, seen, hoisted);
                }
                StmtKind::For(f) if range_args(&f.iter).is_some() => {
                    self.bind_target(&f.target, None, None, nested, seen, hoisted);
                    self.collect_locals(&f.body, true, seen, hoisted);
                }
                StmtKind::While(w) => self.collect_locals(&w.body, true, seen, hoisted),
                StmtKind::If(i) => {
                    self.collect_locals(&i.body, true, seen, hoisted);
                    self.collect_locals(&i.orelse, true, seen, hoisted);
                }
                _ => {}
            }
        }
    }

    fn bind_target(
        &self,
        target: &Expr,
        value: Option<&Expr>,
        annotated: Option<&'static str>,
        nested: bool,
        seen: &mut HashSet<String>,
        hoisted: &mut Vec<(String, &'static str)>,
    ) {
        match &target.kind {
            ExprKind::Name(n) => {
                if seen.insert(n.clone()) && nested {
                    let ty = annotated
                        .or_else(|| value.map(|v| self.infer_decl_type(v)))
                        .unwrap_or_else(|| self.int_type());
                    hoisted.push((n.clone(), ty));
                }
            }
            ExprKind::Tuple(elts) | ExprKind::List(elts) => {
                for elt in elts {
                    self.bind_target(elt, None, None, true, seen, hoisted);
                }
            }
            ExprKind::Starred(inner) => self.bind_target(inner, None, None, true, seen, hoisted),
            _ => {}
        }
    }

    fn declare(&mut self, out: &mut String, hoisted: Vec<(String, &'static str)>) {
        for (name, ty) in hoisted {
            line(out, 1, &format!("{ty} {};", c_ident(&name)));
            self.scope.insert(name);
        }
    }

    /// Run a lowering step; if it fails, forget the checks and primitives it
    /// registered, since nothing of it reaches the artifact.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        let (checks, primitives) = (self.checks.len(), self.primitives.len());
        let result = f(self);
        if result.is_err() {
            self.checks.truncate(checks);
            self.primitives.truncate(primitives);
        }
        result
    }

    fn emit_block(&mut self, out: &mut String, stmts: &[Stmt], level: usize) {
        for stmt in stmts {
            self.emit_stmt(out, stmt, level);
        }
    }

    fn emit_stmt(&mut self, out: &mut String, stmt: &Stmt, level: usize) {
        match &stmt.kind {
            StmtKind::Return(value) => {
                self.translated += 1;
                self.emit_return(out, value.as_ref(), level);
            }
            StmtKind::If(i) => {
                self.translated += 1;
                self.emit_if(out, i, level);
            }
            StmtKind::While(w) => {
                self.translated += 1;
                let cond = self.lower_condition(&w.test);
                line(out, level, &format!("while ({cond}) {{"));
                self.emit_block(out, &w.body, level + 1);
                line(out, level, "}");
                if !w.orelse.is_empty() {
                    placeholder(out, level, "loop else clause");
                }
            }
            StmtKind::For(f) => self.emit_for(out, stmt, f, level),
            StmtKind::Assign(a) => {
                if a.targets.iter().all(|t| !matches!(t.kind, ExprKind::Tuple(_) | ExprKind::List(_))) {
                    let lowered = self.attempt(|s| {
                        let value = s.lower_bare(&a.value)?;
                        let targets = a
                            .targets
                            .iter()
                            .map(|t| s.lower_target(t))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok((value, targets))
                    });
                    match lowered {
                        Ok((value, targets)) => {
                            self.translated += 1;
                            for (target, lowered) in a.targets.iter().zip(targets) {
                                self.emit_assignment(out, target, lowered, &a.value, &value, None, level);
                            }
                        }
                        Err(what) => placeholder(out, level, &format!("assignment of {what}")),
                    }
                } else {
                    placeholder(out, level, "tuple unpacking");
                }
            }
            StmtKind::AnnAssign(a) => {
                let ty = self.map_annotation(Some(&a.annotation));
                match &a.value {
                    Some(v) => match self.attempt(|s| Ok((s.lower_bare(v)?, s.lower_target(&a.target)?))) {
                        Ok((value, target)) => {
                            self.translated += 1;
                            self.emit_assignment(out, &a.target, target, v, &value, Some(ty), level);
                        }
                        Err(what) => placeholder(out, level, &format!("assignment of {what}")),
                    },
                    None => match &a.target.kind {
                        ExprKind::Name(n) if !self.scope.contains(n) => {
                            self.translated += 1;
                            self.scope.insert(n.clone());
                            line(out, level, &format!("{ty} {};", c_ident(n)));
                        }
                        _ => {}
                    },
                }
            }
            StmtKind::AugAssign(a) => {
                let Some(sym) = binop_symbol(a.op) else {
                    placeholder(out, level, &format!("augmented '{}'", a.op.symbol()));
                    return;
                };
                let lowered = self.attempt(|s| {
                    if let Some(check) = check_for_binop(a.op) {
                        s.note_check(check);
                    }
                    Ok((s.lower_expr(&a.target)?, s.lower_expr(&a.value)?))
                });
                match lowered {
                    Ok((target, value)) => {
                        self.translated += 1;
                        line(out, level, &format!("{target} {sym}= {value};"));
                    }
                    Err(what) => placeholder(out, level, &format!("augmented assignment of {what}")),
                }
            }
            StmtKind::Expr(e) => self.emit_expr_stmt(out, stmt, e, level),
            StmtKind::Assert(a) => {
                let cond = match self.lower_bare(&a.test) {
                    Ok(c) => c,
                    Err(what) => {
                        placeholder(out, level, &format!("assertion over {what}"));
                        return;
                    }
                };
                self.translated += 1;
                if self.widen {
                    let msg = match a.msg.as_ref().map(|m| &m.kind) {
                        Some(ExprKind::Constant(Constant::Str(s))) => c_string_literal(s),
                        _ => "\"assertion\"".to_string(),
                    };
                    line(out, level, &format!("__ESBMC_assert({cond}, {msg});"));
                } else {
                    line(out, level, &format!("assert({cond});"));
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => {
                self.translated += 1;
                line(out, level, "break;");
            }
            StmtKind::Continue => {
                self.translated += 1;
                line(out, level, "continue;");
            }
            StmtKind::Import(_) | StmtKind::ImportFrom(_) | StmtKind::Global(_) | StmtKind::Nonlocal(_) => {}
            other => {
                debug!(kind = other.describe(), "statement lowered to placeholder");
                placeholder(out, level, other.describe());
            }
        }
    }

    fn emit_return(&mut self, out: &mut String, value: Option<&Expr>, level: usize) {
        let Some(value) = value else {
            line(out, level, "return 0;");
            return;
        };
        let lowered = match &value.kind {
            ExprKind::BinOp { left, op, right } => self
                .lower_binop_parts(left, *op, right)
                .map(|(l, sym, r)| format!("{l} {sym} {r}")),
            _ => self.lower_bare(value),
        };
        match lowered {
            Ok(text) => line(out, level, &format!("return {text};")),
            Err(what) => {
                debug!(what = %what, "complex return lowered to placeholder");
                line(out, level, "return 0;  // Could not convert complex return");
            }
        }
    }

    fn emit_if(&mut self, out: &mut String, stmt: &IfStmt, level: usize) {
        let cond = self.lower_condition(&stmt.test);
        line(out, level, &format!("if ({cond}) {{"));
        self.emit_block(out, &stmt.body, level + 1);

        let mut orelse = &stmt.orelse;
        loop {
            match orelse.as_slice() {
                [] => break,
                [
                    Stmt {
                        kind: StmtKind::If(elif),
                        ..
                    },
                ] => {
                    let cond = self.lower_condition(&elif.test);
                    line(out, level, &format!("}} else if ({cond}) {{"));
                    self.emit_block(out, &elif.body, level + 1);
                    orelse = &elif.orelse;
                }
                rest => {
                    line(out, level, "} else {");
                    self.emit_block(out, rest, level + 1);
                    break;
                }
            }
        }
        line(out, level, "}");
    }

    fn emit_for(&mut self, out: &mut String, stmt: &Stmt, f: &vigil_ast::ForStmt, level: usize) {
        let ExprKind::Name(var) = &f.target.kind else {
            placeholder(out, level, "for loop with non-name target");
            return;
        };
        let Some(range) = range_args(&f.iter) else {
            debug!(span = ?stmt.span, "for loop over non-range iterable");
            placeholder(out, level, "for loop over non-range iterable");
            return;
        };

        let lowered: Result<Vec<String>, String> =
            self.attempt(|s| range.iter().map(|a| s.lower_expr(a)).collect());
        let parts = match lowered {
            Ok(parts) => parts,
            Err(what) => {
                placeholder(out, level, &format!("range bound {what}"));
                return;
            }
        };
        let (start, stop, step) = match parts.as_slice() {
            [stop] => ("0".to_string(), stop.clone(), None),
            [start, stop] => (start.clone(), stop.clone(), None),
            [start, stop, step] => (start.clone(), stop.clone(), Some(step.clone())),
            _ => return,
        };
        let descending = range.get(2).is_some_and(|s| {
            matches!(&s.kind, ExprKind::UnaryOp { op: UnaryOp::Neg, .. })
        });

        self.translated += 1;
        let name = c_ident(var);
        if self.scope.insert(var.clone()) {
            line(out, level, &format!("{} {name};", self.int_type()));
        }
        let cmp = if descending { ">" } else { "<" };
        let advance = match step {
            None => format!("{name}++"),
            Some(s) => format!("{name} += {s}"),
        };
        line(
            out,
            level,
            &format!("for ({name} = {start}; {name} {cmp} {stop}; {advance}) {{"),
        );
        self.emit_block(out, &f.body, level + 1);
        line(out, level, "}");
        if !f.orelse.is_empty() {
            placeholder(out, level, "loop else clause");
        }
    }

    /// Lowered text of a non-name assignment target; `None` for a plain name.
    fn lower_target(&mut self, target: &Expr) -> Result<Option<String>, String> {
        match &target.kind {
            ExprKind::Name(_) => Ok(None),
            _ => self.lower_expr(target).map(Some),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_assignment(
        &mut self,
        out: &mut String,
        target: &Expr,
        lowered_target: Option<String>,
        value_expr: &Expr,
        value: &str,
        annotated: Option<&'static str>,
        level: usize,
    ) {
        match (&target.kind, lowered_target) {
            (_, Some(t)) => line(out, level, &format!("{t} = {value};")),
            (ExprKind::Name(n), None) => {
                let name = c_ident(n);
                if self.scope.insert(n.clone()) {
                    let ty = annotated.unwrap_or_else(|| self.infer_decl_type(value_expr));
                    line(out, level, &format!("{ty} {name} = {value};"));
                } else {
                    line(out, level, &format!("{name} = {value};"));
                }
            }
            (_, None) => {}
        }
    }

    fn infer_decl_type(&self, value: &Expr) -> &'static str {
        match &value.kind {
            ExprKind::Call { func, .. } => match self.verifier.primitive_for(func) {
                Some(prim) if prim.starts_with("nondet_") => primitive_ctype(&prim),
                _ => self.int_type(),
            },
            ExprKind::Constant(Constant::Float(_)) => "float",
            ExprKind::Constant(Constant::Str(_)) => "char*",
            _ => self.int_type(),
        }
    }

    fn emit_expr_stmt(&mut self, out: &mut String, stmt: &Stmt, e: &Expr, level: usize) {
        if is_docstring(stmt) {
            return;
        }
        if let ExprKind::Call { func, .. } = &e.kind {
            if matches!(&func.kind, ExprKind::Name(n) if n == "print") {
                debug!("print call elided");
                return;
            }
        }
        match self.lower_expr(e) {
            Ok(text) => {
                self.translated += 1;
                line(out, level, &format!("{text};"));
            }
            Err(what) => placeholder(out, level, &what),
        }
    }

    fn lower_condition(&mut self, test: &Expr) -> String {
        match self.lower_bare(test) {
            Ok(c) => c,
            Err(what) => {
                debug!(what = %what, "condition lowered to placeholder");
                format!("0 /* unsupported condition: {what} */")
            }
        }
    }

    fn lower_binop_parts(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
    ) -> Result<(String, &'static str, String), String> {
        let sym = binop_symbol(op).ok_or_else(|| format!("operator '{}'", op.symbol()))?;
        self.attempt(|s| {
            if let Some(check) = check_for_binop(op) {
                s.note_check(check);
            }
            let l = s.lower_expr(left)?;
            let r = s.lower_expr(right)?;
            Ok((l, sym, r))
        })
    }

    /// Lowering for positions that need no grouping of their own: conditions,
    /// call arguments, right-hand sides. A lone comparison drops its parentheses.
    fn lower_bare(&mut self, expr: &Expr) -> Lowered {
        match &expr.kind {
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => self.attempt(|s| s.lower_compare(left, ops, comparators)),
            _ => self.lower_expr(expr),
        }
    }

    fn lower_compare(&mut self, left: &Expr, ops: &[CmpOp], comparators: &[Expr]) -> Lowered {
        let mut operands = vec![self.lower_expr(left)?];
        for c in comparators {
            operands.push(self.lower_expr(c)?);
        }
        let links: Vec<String> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| format!("{} {} {}", operands[i], cmp_symbol(*op), operands[i + 1]))
            .collect();
        if links.len() == 1 {
            Ok(links.join(""))
        } else {
            let wrapped: Vec<String> = links.into_iter().map(|l| format!("({l})")).collect();
            Ok(format!("({})", wrapped.join(" && ")))
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> Lowered {
        self.attempt(|s| s.lower_node(expr))
    }

    fn lower_node(&mut self, expr: &Expr) -> Lowered {
        match &expr.kind {
            ExprKind::Name(n) => Ok(c_ident(n)),
            ExprKind::Constant(c) => match c {
                Constant::Int(v) => Ok(v.to_string()),
                Constant::Float(v) => Ok(format!("{v:?}")),
                Constant::Str(s) => Ok(c_string_literal(s)),
                Constant::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
                Constant::None => Ok("0".to_string()),
                Constant::BigInt(_) => Err("integer literal wider than 64 bits".to_string()),
                Constant::Bytes(_) | Constant::Imaginary(_) | Constant::Ellipsis => {
                    Err(expr.kind.describe().to_string())
                }
            },
            ExprKind::BinOp { left, op, right } => {
                let (l, sym, r) = self.lower_binop_parts(left, *op, right)?;
                Ok(format!("({l} {sym} {r})"))
            }
            ExprKind::UnaryOp { op, operand } => {
                let inner = self.lower_expr(operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("!({inner})"),
                    UnaryOp::Neg => format!("(-{inner})"),
                    UnaryOp::Pos => format!("(+{inner})"),
                    UnaryOp::Invert => format!("(~{inner})"),
                })
            }
            ExprKind::BoolOp { op, values } => {
                let joiner = match op {
                    BoolOp::And => " && ",
                    BoolOp::Or => " || ",
                };
                let parts = values
                    .iter()
                    .map(|v| self.lower_expr(v).map(|s| format!("({s})")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(joiner)))
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => {
                let lowered = self.lower_compare(left, ops, comparators)?;
                // A chain is already wrapped; a single link is not.
                Ok(if ops.len() == 1 { format!("({lowered})") } else { lowered })
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => self.lower_call(func, args, keywords),
            ExprKind::Attribute { value, attr } => {
                if self.verifier.is_receiver(value) {
                    return Err(format!("verifier attribute '{}'", attr.node));
                }
                self.note_check(CheckKind::Pointer);
                let base = self.lower_expr(value)?;
                Ok(format!("{base}->{}", attr.node))
            }
            ExprKind::Subscript { value, slice } => {
                if matches!(slice.kind, ExprKind::Slice { .. } | ExprKind::Tuple(_)) {
                    return Err(slice.kind.describe().to_string());
                }
                self.note_check(CheckKind::Bounds);
                let base = self.lower_expr(value)?;
                let index = self.lower_expr(slice)?;
                Ok(format!("{base}[{index}]"))
            }
            ExprKind::IfExp { test, body, orelse } => {
                let t = self.lower_expr(test)?;
                let b = self.lower_expr(body)?;
                let o = self.lower_expr(orelse)?;
                Ok(format!("({t} ? {b} : {o})"))
            }
            other => Err(other.describe().to_string()),
        }
    }

    fn lower_call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword]) -> Lowered {
        if !keywords.is_empty() {
            return Err("call with keyword arguments".to_string());
        }
        let args = args
            .iter()
            .map(|a| self.lower_bare(a))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(prim) = self.verifier.primitive_for(func) {
            if prim == "assume" {
                return Ok(format!("__ESBMC_assume({})", args.join(", ")));
            }
            if prim.starts_with("nondet_") {
                self.note_primitive(&prim);
                return Ok(format!("{prim}()"));
            }
            return Err(format!("verifier primitive '{prim}'"));
        }

        match &func.kind {
            ExprKind::Name(n) => match (n.as_str(), args.as_slice()) {
                ("int", [x]) => Ok(format!("(int)({x})")),
                ("float", [x]) => Ok(format!("(float)({x})")),
                ("bool", [x]) => Ok(format!("(({x}) != 0)")),
                ("abs", [x]) => Ok(format!("abs({x})")),
                _ => Ok(format!("{}({})", c_ident(n), args.join(", "))),
            },
            _ => Err(format!("call through {}", func.kind.describe())),
        }
    }
}
