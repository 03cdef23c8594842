#![forbid(unsafe_code)]

use vigil_ast::{
    BinOp, Comprehension, Expr, ExprKind, Keyword, Module, Param, Pattern, PatternKind, Stmt,
    StmtKind,
};

use crate::profile::{derive_checks, FeatureProfile};

/// Single-pass walk over a module, setting feature flags as node kinds appear.
#[derive(Default)]
pub(crate) struct FeatureWalker {
    profile: FeatureProfile,
    loops_entered: usize,
    nesting: usize,
}

impl FeatureWalker {
    pub(crate) fn run(module: &Module) -> FeatureProfile {
        let mut walker = FeatureWalker::default();
        walker.visit_block(&module.body);
        let mut profile = walker.profile;
        profile.recommended_checks = derive_checks(&profile);
        profile
    }

    fn visit_block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::FunctionDef(f) => {
                push_unique(&mut self.profile.functions, &f.name.node);
                if f.returns.is_some() || f.positional_params().any(|p| p.annotation.is_some()) {
                    self.profile.has_type_hints = true;
                }
                self.visit_exprs(&f.decorators);
                self.visit_params(&f.params);
                self.visit_opt(f.returns.as_ref());
                self.visit_block(&f.body);
            }
            StmtKind::ClassDef(c) => {
                push_unique(&mut self.profile.classes, &c.name.node);
                self.visit_exprs(&c.decorators);
                self.visit_exprs(&c.bases);
                self.visit_keywords(&c.keywords);
                self.visit_block(&c.body);
            }
            StmtKind::For(f) => {
                self.enter_loop();
                self.visit_expr(&f.target);
                self.visit_expr(&f.iter);
                self.visit_block(&f.body);
                self.visit_block(&f.orelse);
                self.nesting -= 1;
            }
            StmtKind::While(w) => {
                self.enter_loop();
                self.visit_expr(&w.test);
                self.visit_block(&w.body);
                self.visit_block(&w.orelse);
                self.nesting -= 1;
            }
            StmtKind::If(i) => {
                self.profile.has_conditionals = true;
                self.visit_expr(&i.test);
                self.visit_block(&i.body);
                self.visit_block(&i.orelse);
            }
            StmtKind::Try(t) => {
                self.profile.has_exceptions = true;
                self.visit_block(&t.body);
                for h in &t.handlers {
                    self.visit_opt(h.ty.as_ref());
                    self.visit_block(&h.body);
                }
                self.visit_block(&t.orelse);
                self.visit_block(&t.finalbody);
            }
            StmtKind::Match(m) => {
                self.profile.has_conditionals = true;
                self.visit_expr(&m.subject);
                for case in &m.cases {
                    self.visit_pattern(&case.pattern);
                    self.visit_opt(case.guard.as_ref());
                    self.visit_block(&case.body);
                }
            }
            StmtKind::TypeAlias(t) => {
                self.profile.has_type_hints = true;
                self.visit_expr(&t.value);
            }
            StmtKind::Raise(r) => {
                self.profile.has_exceptions = true;
                self.visit_opt(r.exc.as_ref());
                self.visit_opt(r.cause.as_ref());
            }
            StmtKind::Import(names) => {
                for alias in names {
                    self.note_import(&alias.name);
                }
            }
            StmtKind::ImportFrom(from) => {
                if let Some(module) = &from.module {
                    self.note_import(module);
                }
            }
            StmtKind::Return(value) => self.visit_opt(value.as_ref()),
            StmtKind::Delete(targets) => self.visit_exprs(targets),
            StmtKind::Assign(a) => {
                self.visit_exprs(&a.targets);
                self.visit_expr(&a.value);
            }
            StmtKind::AugAssign(a) => {
                self.visit_expr(&a.target);
                self.note_binop(a.op);
                self.visit_expr(&a.value);
            }
            StmtKind::AnnAssign(a) => {
                self.visit_expr(&a.target);
                self.visit_expr(&a.annotation);
                self.visit_opt(a.value.as_ref());
            }
            StmtKind::With(w) => {
                for item in &w.items {
                    self.visit_expr(&item.context);
                    self.visit_opt(item.binding.as_ref());
                }
                self.visit_block(&w.body);
            }
            StmtKind::Assert(a) => {
                self.visit_expr(&a.test);
                self.visit_opt(a.msg.as_ref());
            }
            StmtKind::Expr(e) => self.visit_expr(e),
            StmtKind::Global(_)
            | StmtKind::Nonlocal(_)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue => {}
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(_) | ExprKind::Constant(_) => {}
            ExprKind::BinOp { left, op, right } => {
                self.note_binop(*op);
                self.visit_expr(left);
                self.visit_expr(right);
            }
            ExprKind::UnaryOp { operand, .. } => self.visit_expr(operand),
            ExprKind::BoolOp { values, .. } => self.visit_exprs(values),
            ExprKind::Compare {
                left, comparators, ..
            } => {
                self.visit_expr(left);
                self.visit_exprs(comparators);
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.visit_expr(func);
                self.visit_exprs(args);
                self.visit_keywords(keywords);
            }
            ExprKind::Attribute { value, .. } => {
                // Attribute chains are rendered through pointer dereference in C.
                self.profile.has_pointer_ops = true;
                self.visit_expr(value);
            }
            ExprKind::Subscript { value, slice } => {
                self.profile.has_array_access = true;
                self.visit_expr(value);
                self.visit_expr(slice);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit_expr(part);
                }
            }
            ExprKind::Starred(inner) | ExprKind::Await(inner) | ExprKind::YieldFrom(inner) => {
                self.visit_expr(inner)
            }
            ExprKind::Yield(inner) => {
                if let Some(inner) = inner {
                    self.visit_expr(inner);
                }
            }
            ExprKind::Tuple(elts) | ExprKind::List(elts) | ExprKind::Set(elts) => {
                self.visit_exprs(elts)
            }
            ExprKind::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    self.visit_expr(key);
                }
                self.visit_exprs(values);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
            }
            ExprKind::Lambda { params, body } => {
                self.visit_params(params);
                self.visit_expr(body);
            }
            ExprKind::ListComp { elt, generators }
            | ExprKind::SetComp { elt, generators }
            | ExprKind::GeneratorExp { elt, generators } => {
                self.visit_expr(elt);
                self.visit_generators(generators);
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.visit_expr(key);
                self.visit_expr(value);
                self.visit_generators(generators);
            }
            ExprKind::NamedExpr { target, value } => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
        }
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        match &pattern.kind {
            PatternKind::Value(e) => self.visit_expr(e),
            PatternKind::Capture(_) | PatternKind::Star(_) => {}
            PatternKind::Sequence(items) | PatternKind::Or(items) => {
                for p in items {
                    self.visit_pattern(p);
                }
            }
            PatternKind::Mapping { keys, patterns, .. } => {
                self.visit_exprs(keys);
                for p in patterns {
                    self.visit_pattern(p);
                }
            }
            PatternKind::Class {
                cls,
                patterns,
                keywords,
            } => {
                self.visit_expr(cls);
                for p in patterns.iter().chain(keywords.iter().map(|(_, p)| p)) {
                    self.visit_pattern(p);
                }
            }
            PatternKind::As { pattern, .. } => self.visit_pattern(pattern),
        }
    }

    fn visit_exprs(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.visit_expr(e);
        }
    }

    fn visit_opt(&mut self, expr: Option<&Expr>) {
        if let Some(e) = expr {
            self.visit_expr(e);
        }
    }

    fn visit_keywords(&mut self, keywords: &[Keyword]) {
        for kw in keywords {
            self.visit_expr(&kw.value);
        }
    }

    fn visit_params(&mut self, params: &[Param]) {
        for p in params {
            self.visit_opt(p.annotation.as_ref());
            self.visit_opt(p.default.as_ref());
        }
    }

    fn visit_generators(&mut self, generators: &[Comprehension]) {
        for g in generators {
            self.visit_expr(&g.target);
            self.visit_expr(&g.iter);
            self.visit_exprs(&g.ifs);
        }
    }

    fn enter_loop(&mut self) {
        self.profile.has_loops = true;
        self.loops_entered += 1;
        self.profile.max_loop_depth = self.profile.max_loop_depth.max(self.loops_entered);
        self.nesting += 1;
        self.profile.max_loop_nesting = self.profile.max_loop_nesting.max(self.nesting);
    }

    fn note_binop(&mut self, op: BinOp) {
        match op {
            BinOp::Add | BinOp::Sub => self.profile.has_arithmetic = true,
            BinOp::Mul => {
                self.profile.has_arithmetic = true;
                self.profile.has_multiplication = true;
            }
            BinOp::Div | BinOp::FloorDiv | BinOp::Mod => self.profile.has_division = true,
            BinOp::MatMul
            | BinOp::Pow
            | BinOp::LShift
            | BinOp::RShift
            | BinOp::BitOr
            | BinOp::BitXor
            | BinOp::BitAnd => {}
        }
    }

    fn note_import(&mut self, module: &str) {
        self.profile.imports.push(module.to_string());
        if module.contains("threading") {
            self.profile.has_threading = true;
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}
