#![forbid(unsafe_code)]

use std::mem;

use vigil_ast::{
    join, span, Alias, AnnAssignStmt, AssertStmt, AssignStmt, AugAssignStmt, BinOp, BoolOp,
    ClassDef, CmpOp, Comprehension, Constant, ExceptHandler, Expr, ExprKind, ForStmt,
    FunctionDef, Ident, IfStmt, ImportFrom, Keyword, Module, Param, ParamKind, RaiseStmt, Span,
    Stmt, StmtKind, TryStmt, TypeAliasStmt, UnaryOp, WhileStmt, WithItem, WithStmt,
};
use vigil_lex::{Token, TokenKind};

use crate::error::ParseError;

mod pattern;

/// Recursive-descent parser over the token stream produced by `vigil_lex`.
pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
}

type Level<'a> = fn(&mut Parser<'a>) -> Result<Expr, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, idx: 0 }
    }

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(TokenKind::Eof) || self.peek_kind().is_none() {
                break;
            }
            if self.at(TokenKind::Indent) {
                return Err(self.error_here("unexpected indent"));
            }
            body.extend(self.parse_stmt()?);
        }
        Ok(Module { body })
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_testlist_star()?;
        self.skip_newlines();
        if !self.at(TokenKind::Eof) {
            return Err(self.error_here("unexpected trailing input after expression"));
        }
        Ok(expr)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let start = self.peek_span_or_end();
        let compound = match self.peek_kind() {
            Some(TokenKind::At) => self.parse_decorated(start)?,
            Some(TokenKind::KwDef) => self.parse_funcdef(start, Vec::new(), false)?,
            Some(TokenKind::KwClass) => self.parse_classdef(start, Vec::new())?,
            Some(TokenKind::KwIf) => self.parse_if()?,
            Some(TokenKind::KwWhile) => self.parse_while(start)?,
            Some(TokenKind::KwFor) => self.parse_for(start, false)?,
            Some(TokenKind::KwTry) => self.parse_try(start)?,
            Some(TokenKind::KwWith) => self.parse_with(start, false)?,
            Some(TokenKind::KwAsync) => self.parse_async(start)?,
            Some(TokenKind::Name(n)) if n == "match" && self.starts_match_stmt() => {
                self.parse_match(start)?
            }
            _ => return self.parse_simple_stmts(),
        };
        Ok(vec![compound])
    }

    fn parse_async(&mut self, start: Span) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwAsync)?;
        match self.peek_kind() {
            Some(TokenKind::KwDef) => self.parse_funcdef(start, Vec::new(), true),
            Some(TokenKind::KwFor) => self.parse_for(start, true),
            Some(TokenKind::KwWith) => self.parse_with(start, true),
            _ => Err(self.error_here("expected 'def', 'for' or 'with' after 'async'")),
        }
    }

    fn parse_decorated(&mut self, start: Span) -> Result<Stmt, ParseError> {
        let mut decorators = Vec::new();
        while self.at(TokenKind::At) {
            self.next();
            decorators.push(self.parse_named_test()?);
            self.expect(TokenKind::Newline)?;
            self.skip_newlines();
        }
        match self.peek_kind() {
            Some(TokenKind::KwDef) => self.parse_funcdef(start, decorators, false),
            Some(TokenKind::KwClass) => self.parse_classdef(start, decorators),
            Some(TokenKind::KwAsync) if matches!(self.peek_kind_n(1), Some(TokenKind::KwDef)) => {
                self.next();
                self.parse_funcdef(start, decorators, true)
            }
            _ => Err(self.error_here("decorators must precede a function or class definition")),
        }
    }

    fn parse_funcdef(
        &mut self,
        start: Span,
        decorators: Vec<Expr>,
        is_async: bool,
    ) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwDef)?;
        let name = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;
        let params = self.parse_params(TokenKind::RParen, true)?;
        self.expect(TokenKind::RParen)?;
        let returns = if self.at(TokenKind::Arrow) {
            self.next();
            Some(self.parse_test()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::FunctionDef(FunctionDef {
                name,
                is_async,
                decorators,
                params,
                returns,
                body,
            }),
        })
    }

    fn parse_classdef(&mut self, start: Span, decorators: Vec<Expr>) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwClass)?;
        let name = self.expect_ident()?;
        let (bases, keywords) = if self.at(TokenKind::LParen) {
            self.next();
            let args = self.parse_call_args()?;
            self.expect(TokenKind::RParen)?;
            args
        } else {
            (Vec::new(), Vec::new())
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::ClassDef(ClassDef {
                name,
                decorators,
                bases,
                keywords,
                body,
            }),
        })
    }

    /// Parses `if` and `elif` headers alike; `elif` becomes a nested `If` in `orelse`.
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let kw = self.expect_any()?;
        let test = self.parse_named_test()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let orelse = if self.at(TokenKind::KwElif) {
            vec![self.parse_if()?]
        } else {
            self.parse_else_suite()?
        };
        Ok(Stmt {
            span: join(kw.span, self.prev_span()),
            kind: StmtKind::If(IfStmt { test, body, orelse }),
        })
    }

    fn parse_while(&mut self, start: Span) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwWhile)?;
        let test = self.parse_named_test()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let orelse = self.parse_else_suite()?;
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::While(WhileStmt { test, body, orelse }),
        })
    }

    fn parse_for(&mut self, start: Span, is_async: bool) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwFor)?;
        let target = self.parse_target_list()?;
        check_assign_target(&target)?;
        self.expect(TokenKind::KwIn)?;
        let iter = self.parse_testlist_star()?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        let orelse = self.parse_else_suite()?;
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::For(ForStmt {
                is_async,
                target,
                iter,
                body,
                orelse,
            }),
        })
    }

    fn parse_try(&mut self, start: Span) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwTry)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        let mut is_star = None;
        while self.at(TokenKind::KwExcept) {
            let kw = self.expect_any()?;
            let star = self.at(TokenKind::Star);
            if star {
                self.next();
            }
            if *is_star.get_or_insert(star) != star {
                return Err(ParseError {
                    message: "cannot mix 'except' and 'except*' in one try statement".to_string(),
                    span: kw.span,
                });
            }
            let ty = if !star && self.at(TokenKind::Colon) {
                None
            } else {
                Some(self.parse_test()?)
            };
            let name = if ty.is_some() && self.at(TokenKind::KwAs) {
                self.next();
                Some(self.expect_ident()?)
            } else {
                None
            };
            self.expect(TokenKind::Colon)?;
            let handler_body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                span: join(kw.span, self.prev_span()),
                ty,
                name,
                body: handler_body,
            });
        }

        let orelse = self.parse_else_suite()?;
        let finalbody = if self.at(TokenKind::KwFinally) {
            self.next();
            self.expect(TokenKind::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(ParseError {
                message: "expected 'except' or 'finally' block".to_string(),
                span: join(start, self.prev_span()),
            });
        }

        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::Try(TryStmt {
                is_star: is_star.unwrap_or(false),
                body,
                handlers,
                orelse,
                finalbody,
            }),
        })
    }

    fn parse_with(&mut self, start: Span, is_async: bool) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::KwWith)?;
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let binding = if self.at(TokenKind::KwAs) {
                self.next();
                let target = self.parse_bitor()?;
                check_assign_target(&target)?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, binding });
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::With(WithStmt {
                is_async,
                items,
                body,
            }),
        })
    }

    fn parse_else_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !self.at(TokenKind::KwElse) {
            return Ok(Vec::new());
        }
        self.next();
        self.expect(TokenKind::Colon)?;
        self.parse_suite()
    }

    /// Either an indented block or simple statements on the header line.
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !self.at(TokenKind::Newline) {
            return self.parse_simple_stmts();
        }
        self.next();
        self.skip_newlines();
        if !self.at(TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        self.next();

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(TokenKind::Dedent) {
                self.next();
                break;
            }
            if self.at(TokenKind::Eof) {
                break;
            }
            body.extend(self.parse_stmt()?);
        }
        Ok(body)
    }

    fn parse_simple_stmts(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = vec![self.parse_small_stmt()?];
        while self.at(TokenKind::Semi) {
            self.next();
            if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_small_stmt()?);
        }
        self.expect_stmt_terminator()?;
        Ok(stmts)
    }

    fn parse_small_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.peek_span_or_end();
        let kind = match self.peek_kind() {
            Some(TokenKind::KwPass) => {
                self.next();
                StmtKind::Pass
            }
            Some(TokenKind::KwBreak) => {
                self.next();
                StmtKind::Break
            }
            Some(TokenKind::KwContinue) => {
                self.next();
                StmtKind::Continue
            }
            Some(TokenKind::KwReturn) => {
                self.next();
                let value = if self.starts_expr() {
                    Some(self.parse_testlist_star()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            Some(TokenKind::KwDel) => {
                self.next();
                let targets = match self.parse_target_list()? {
                    Expr {
                        kind: ExprKind::Tuple(elts),
                        ..
                    } => elts,
                    single => vec![single],
                };
                for t in &targets {
                    check_assign_target(t)?;
                }
                StmtKind::Delete(targets)
            }
            Some(TokenKind::KwRaise) => {
                self.next();
                let exc = if self.starts_expr() {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                let cause = if exc.is_some() && self.at(TokenKind::KwFrom) {
                    self.next();
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Raise(RaiseStmt { exc, cause })
            }
            Some(TokenKind::KwGlobal) => {
                self.next();
                StmtKind::Global(self.parse_name_list()?)
            }
            Some(TokenKind::KwNonlocal) => {
                self.next();
                StmtKind::Nonlocal(self.parse_name_list()?)
            }
            Some(TokenKind::KwAssert) => {
                self.next();
                let test = self.parse_test()?;
                let msg = if self.at(TokenKind::Comma) {
                    self.next();
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert(AssertStmt { test, msg })
            }
            Some(TokenKind::KwImport) => {
                self.next();
                let mut names = vec![self.parse_dotted_as_name()?];
                while self.at(TokenKind::Comma) {
                    self.next();
                    names.push(self.parse_dotted_as_name()?);
                }
                StmtKind::Import(names)
            }
            Some(TokenKind::KwFrom) => self.parse_from_import()?,
            Some(TokenKind::Name(n))
                if n == "type"
                    && matches!(self.peek_kind_n(1), Some(TokenKind::Name(_)))
                    && matches!(self.peek_kind_n(2), Some(TokenKind::Eq | TokenKind::LBracket)) =>
            {
                self.parse_type_alias()?
            }
            _ => return self.parse_expr_stmt(start),
        };
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind,
        })
    }

    fn parse_expr_stmt(&mut self, start: Span) -> Result<Stmt, ParseError> {
        let first = self.parse_testlist_star_or_yield()?;

        if let Some(TokenKind::AugAssign(op)) = self.peek_kind() {
            let op = *op;
            self.next();
            if !matches!(
                first.kind,
                ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
            ) {
                return Err(ParseError {
                    message: format!(
                        "'{}' is an illegal expression for augmented assignment",
                        first.kind.describe()
                    ),
                    span: first.span,
                });
            }
            let value = self.parse_testlist_star_or_yield()?;
            return Ok(Stmt {
                span: join(start, self.prev_span()),
                kind: StmtKind::AugAssign(AugAssignStmt {
                    target: first,
                    op,
                    value,
                }),
            });
        }

        if self.at(TokenKind::Colon) {
            self.next();
            check_assign_target(&first)?;
            let annotation = self.parse_test()?;
            let value = if self.at(TokenKind::Eq) {
                self.next();
                Some(self.parse_testlist_star_or_yield()?)
            } else {
                None
            };
            return Ok(Stmt {
                span: join(start, self.prev_span()),
                kind: StmtKind::AnnAssign(AnnAssignStmt {
                    target: first,
                    annotation,
                    value,
                }),
            });
        }

        if self.at(TokenKind::Eq) {
            let mut targets = Vec::new();
            let mut value = first;
            while self.at(TokenKind::Eq) {
                self.next();
                let rhs = self.parse_testlist_star_or_yield()?;
                targets.push(mem::replace(&mut value, rhs));
            }
            for t in &targets {
                check_assign_target(t)?;
            }
            return Ok(Stmt {
                span: join(start, self.prev_span()),
                kind: StmtKind::Assign(AssignStmt { targets, value }),
            });
        }

        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::Expr(first),
        })
    }

    /// `type Name[T, *Ts, **P] = value`. Bounds and defaults are parsed and dropped.
    fn parse_type_alias(&mut self) -> Result<StmtKind, ParseError> {
        self.next();
        let name = self.expect_ident()?;
        let mut type_params = Vec::new();
        if self.at(TokenKind::LBracket) {
            self.next();
            while !self.at(TokenKind::RBracket) {
                if self.at(TokenKind::Star) || self.at(TokenKind::DoubleStar) {
                    self.next();
                }
                type_params.push(self.expect_ident()?);
                if self.at(TokenKind::Colon) {
                    self.next();
                    self.parse_test()?;
                }
                if self.at(TokenKind::Eq) {
                    self.next();
                    self.parse_test()?;
                }
                if !self.at(TokenKind::Comma) {
                    break;
                }
                self.next();
            }
            self.expect(TokenKind::RBracket)?;
        }
        self.expect(TokenKind::Eq)?;
        let value = self.parse_test()?;
        Ok(StmtKind::TypeAlias(TypeAliasStmt {
            name,
            type_params,
            value,
        }))
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::KwFrom)?;
        let mut level = 0u32;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => level += 1,
                Some(TokenKind::Ellipsis) => level += 3,
                _ => break,
            }
            self.next();
        }
        let module = if matches!(self.peek_kind(), Some(TokenKind::Name(_))) {
            Some(self.parse_dotted_name()?.node)
        } else {
            None
        };
        if level == 0 && module.is_none() {
            return Err(self.error_here("expected module name after 'from'"));
        }
        self.expect(TokenKind::KwImport)?;

        let mut names = Vec::new();
        if self.at(TokenKind::Star) {
            let star = self.expect_any()?;
            names.push(Alias {
                span: star.span,
                name: "*".to_string(),
                asname: None,
            });
        } else if self.at(TokenKind::LParen) {
            self.next();
            while !self.at(TokenKind::RParen) {
                names.push(self.parse_import_as_name()?);
                if !self.at(TokenKind::Comma) {
                    break;
                }
                self.next();
            }
            self.expect(TokenKind::RParen)?;
        } else {
            names.push(self.parse_import_as_name()?);
            while self.at(TokenKind::Comma) {
                self.next();
                names.push(self.parse_import_as_name()?);
            }
        }

        Ok(StmtKind::ImportFrom(ImportFrom {
            module,
            names,
            level,
        }))
    }

    fn parse_dotted_name(&mut self) -> Result<Ident, ParseError> {
        let first = self.expect_ident()?;
        let mut name = first.node;
        let mut sp = first.span;
        while self.at(TokenKind::Dot) {
            self.next();
            let part = self.expect_ident()?;
            name.push('.');
            name.push_str(&part.node);
            sp = join(sp, part.span);
        }
        Ok(Ident::new(sp, name))
    }

    fn parse_dotted_as_name(&mut self) -> Result<Alias, ParseError> {
        let dotted = self.parse_dotted_name()?;
        let asname = self.parse_opt_asname()?;
        Ok(Alias {
            span: join(dotted.span, self.prev_span()),
            name: dotted.node,
            asname,
        })
    }

    fn parse_import_as_name(&mut self) -> Result<Alias, ParseError> {
        let name = self.expect_ident()?;
        let asname = self.parse_opt_asname()?;
        Ok(Alias {
            span: join(name.span, self.prev_span()),
            name: name.node,
            asname,
        })
    }

    fn parse_opt_asname(&mut self) -> Result<Option<Ident>, ParseError> {
        if self.at(TokenKind::KwAs) {
            self.next();
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    fn parse_name_list(&mut self) -> Result<Vec<Ident>, ParseError> {
        let mut names = vec![self.expect_ident()?];
        while self.at(TokenKind::Comma) {
            self.next();
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    fn parse_params(
        &mut self,
        closing: TokenKind,
        allow_annotations: bool,
    ) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        let mut keyword_only = false;

        while !self.at(closing.clone()) {
            let start = self.peek_span_or_end();
            if self.at(TokenKind::Slash) {
                // Positional-only marker.
                self.next();
            } else if self.at(TokenKind::DoubleStar) {
                self.next();
                let name = self.expect_ident()?;
                let annotation = self.parse_opt_annotation(allow_annotations)?;
                params.push(Param {
                    span: join(start, self.prev_span()),
                    name,
                    kind: ParamKind::VarKeywords,
                    annotation,
                    default: None,
                });
            } else if self.at(TokenKind::Star) {
                self.next();
                keyword_only = true;
                if !self.at(TokenKind::Comma) && !self.at(closing.clone()) {
                    let name = self.expect_ident()?;
                    let annotation = self.parse_opt_annotation(allow_annotations)?;
                    params.push(Param {
                        span: join(start, self.prev_span()),
                        name,
                        kind: ParamKind::VarArgs,
                        annotation,
                        default: None,
                    });
                }
            } else {
                let name = self.expect_ident()?;
                let annotation = self.parse_opt_annotation(allow_annotations)?;
                let default = if self.at(TokenKind::Eq) {
                    self.next();
                    Some(self.parse_test()?)
                } else {
                    None
                };
                params.push(Param {
                    span: join(start, self.prev_span()),
                    name,
                    kind: if keyword_only {
                        ParamKind::KeywordOnly
                    } else {
                        ParamKind::Positional
                    },
                    annotation,
                    default,
                });
            }

            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        Ok(params)
    }

    fn parse_opt_annotation(&mut self, allowed: bool) -> Result<Option<Expr>, ParseError> {
        if allowed && self.at(TokenKind::Colon) {
            self.next();
            Ok(Some(self.parse_test()?))
        } else {
            Ok(None)
        }
    }

    // ---- expressions ----

    fn parse_testlist_star_or_yield(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::KwYield) {
            self.parse_yield()
        } else {
            self.parse_testlist_star()
        }
    }

    fn parse_yield(&mut self) -> Result<Expr, ParseError> {
        let kw = self.expect(TokenKind::KwYield)?;
        if self.at(TokenKind::KwFrom) {
            self.next();
            let value = self.parse_test()?;
            return Ok(Expr {
                span: join(kw.span, value.span),
                kind: ExprKind::YieldFrom(Box::new(value)),
            });
        }
        let value = if self.starts_expr() {
            Some(Box::new(self.parse_testlist_star()?))
        } else {
            None
        };
        Ok(Expr {
            span: join(kw.span, self.prev_span()),
            kind: ExprKind::Yield(value),
        })
    }

    /// Comma-separated expressions; more than one (or a trailing comma) makes a tuple.
    fn parse_testlist_star(&mut self) -> Result<Expr, ParseError> {
        self.parse_seq(Self::parse_star_or_named)
    }

    /// Assignment-style targets for `for`, `del` and comprehensions.
    fn parse_target_list(&mut self) -> Result<Expr, ParseError> {
        self.parse_seq(|p| {
            if p.at(TokenKind::Star) {
                p.parse_starred()
            } else {
                p.parse_bitor()
            }
        })
    }

    fn parse_seq(&mut self, item: Level<'a>) -> Result<Expr, ParseError> {
        let first = item(self)?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut elts = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if !self.starts_expr() {
                break;
            }
            elts.push(item(self)?);
        }
        Ok(Expr {
            span: join(start, self.prev_span()),
            kind: ExprKind::Tuple(elts),
        })
    }

    fn parse_starred(&mut self) -> Result<Expr, ParseError> {
        let star = self.expect(TokenKind::Star)?;
        let value = self.parse_bitor()?;
        Ok(Expr {
            span: join(star.span, value.span),
            kind: ExprKind::Starred(Box::new(value)),
        })
    }

    fn parse_star_or_named(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::Star) {
            self.parse_starred()
        } else {
            self.parse_named_test()
        }
    }

    fn parse_named_test(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_test()?;
        if !self.at(TokenKind::Walrus) {
            return Ok(expr);
        }
        if !matches!(expr.kind, ExprKind::Name(_)) {
            return Err(ParseError {
                message: format!("cannot use assignment expression with {}", expr.kind.describe()),
                span: expr.span,
            });
        }
        self.next();
        let value = self.parse_test()?;
        Ok(Expr {
            span: join(expr.span, value.span),
            kind: ExprKind::NamedExpr {
                target: Box::new(expr),
                value: Box::new(value),
            },
        })
    }

    pub fn parse_test(&mut self) -> Result<Expr, ParseError> {
        if self.at(TokenKind::KwLambda) {
            return self.parse_lambda();
        }
        let body = self.parse_or_test()?;
        if !self.at(TokenKind::KwIf) {
            return Ok(body);
        }
        self.next();
        let test = self.parse_or_test()?;
        self.expect(TokenKind::KwElse)?;
        let orelse = self.parse_test()?;
        Ok(Expr {
            span: join(body.span, orelse.span),
            kind: ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
        })
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let kw = self.expect(TokenKind::KwLambda)?;
        let params = self.parse_params(TokenKind::Colon, false)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_test()?;
        Ok(Expr {
            span: join(kw.span, body.span),
            kind: ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
        })
    }

    fn parse_or_test(&mut self) -> Result<Expr, ParseError> {
        self.parse_bool_level(TokenKind::KwOr, BoolOp::Or, Self::parse_and_test)
    }

    fn parse_and_test(&mut self) -> Result<Expr, ParseError> {
        self.parse_bool_level(TokenKind::KwAnd, BoolOp::And, Self::parse_not_test)
    }

    fn parse_bool_level(
        &mut self,
        kw: TokenKind,
        op: BoolOp,
        operand: Level<'a>,
    ) -> Result<Expr, ParseError> {
        let first = operand(self)?;
        if !self.at(kw.clone()) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.at(kw.clone()) {
            self.next();
            values.push(operand(self)?);
        }
        let span = match (values.first(), values.last()) {
            (Some(a), Some(b)) => join(a.span, b.span),
            _ => self.prev_span(),
        };
        Ok(Expr {
            span,
            kind: ExprKind::BoolOp { op, values },
        })
    }

    fn parse_not_test(&mut self) -> Result<Expr, ParseError> {
        if !self.at(TokenKind::KwNot) {
            return self.parse_comparison();
        }
        let kw = self.expect_any()?;
        let operand = self.parse_not_test()?;
        Ok(Expr {
            span: join(kw.span, operand.span),
            kind: ExprKind::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => CmpOp::Lt,
                Some(TokenKind::Gt) => CmpOp::Gt,
                Some(TokenKind::EqEq) => CmpOp::Eq,
                Some(TokenKind::Ge) => CmpOp::GtE,
                Some(TokenKind::Le) => CmpOp::LtE,
                Some(TokenKind::Neq) => CmpOp::NotEq,
                Some(TokenKind::KwIn) => CmpOp::In,
                Some(TokenKind::KwNot) if matches!(self.peek_kind_n(1), Some(TokenKind::KwIn)) => {
                    self.next();
                    CmpOp::NotIn
                }
                Some(TokenKind::KwIs) => {
                    if matches!(self.peek_kind_n(1), Some(TokenKind::KwNot)) {
                        self.next();
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.next();
            ops.push(op);
            comparators.push(self.parse_bitor()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr {
            span: join(left.span, self.prev_span()),
            kind: ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
        })
    }

    fn parse_binary_level(
        &mut self,
        op_of: fn(&TokenKind) -> Option<BinOp>,
        operand: Level<'a>,
    ) -> Result<Expr, ParseError> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek_kind().and_then(op_of) {
            self.next();
            let right = operand(self)?;
            left = Expr {
                span: join(left.span, right.span),
                kind: ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| matches!(k, TokenKind::Pipe).then_some(BinOp::BitOr),
            Self::parse_bitxor,
        )
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| matches!(k, TokenKind::Caret).then_some(BinOp::BitXor),
            Self::parse_bitand,
        )
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| matches!(k, TokenKind::Amp).then_some(BinOp::BitAnd),
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| match k {
                TokenKind::LShift => Some(BinOp::LShift),
                TokenKind::RShift => Some(BinOp::RShift),
                _ => None,
            },
            Self::parse_arith,
        )
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| match k {
                TokenKind::Plus => Some(BinOp::Add),
                TokenKind::Minus => Some(BinOp::Sub),
                _ => None,
            },
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary_level(
            |k| match k {
                TokenKind::Star => Some(BinOp::Mul),
                TokenKind::Slash => Some(BinOp::Div),
                TokenKind::DoubleSlash => Some(BinOp::FloorDiv),
                TokenKind::Percent => Some(BinOp::Mod),
                TokenKind::At => Some(BinOp::MatMul),
                _ => None,
            },
            Self::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            Some(TokenKind::Tilde) => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let tok = self.expect_any()?;
        let operand = self.parse_factor()?;
        Ok(Expr {
            span: join(tok.span, operand.span),
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = if self.at(TokenKind::KwAwait) {
            let kw = self.expect_any()?;
            let value = self.parse_primary()?;
            Expr {
                span: join(kw.span, value.span),
                kind: ExprKind::Await(Box::new(value)),
            }
        } else {
            self.parse_primary()?
        };
        if !self.at(TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.next();
        // Right-associative, and binds tighter than a unary minus on its left.
        let exponent = self.parse_factor()?;
        Ok(Expr {
            span: join(base.span, exponent.span),
            kind: ExprKind::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::LParen) => {
                    self.next();
                    let (args, keywords) = self.parse_call_args()?;
                    let end = self.expect(TokenKind::RParen)?;
                    expr = Expr {
                        span: join(expr.span, end.span),
                        kind: ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.next();
                    let slice = self.parse_subscript_list()?;
                    let end = self.expect(TokenKind::RBracket)?;
                    expr = Expr {
                        span: join(expr.span, end.span),
                        kind: ExprKind::Subscript {
                            value: Box::new(expr),
                            slice: Box::new(slice),
                        },
                    };
                }
                Some(TokenKind::Dot) => {
                    self.next();
                    let attr = self.expect_ident()?;
                    expr = Expr {
                        span: join(expr.span, attr.span),
                        kind: ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), ParseError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.at(TokenKind::RParen) {
            if self.at(TokenKind::Star) {
                let star = self.expect_any()?;
                let value = self.parse_test()?;
                args.push(Expr {
                    span: join(star.span, value.span),
                    kind: ExprKind::Starred(Box::new(value)),
                });
            } else if self.at(TokenKind::DoubleStar) {
                let stars = self.expect_any()?;
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    span: join(stars.span, value.span),
                    arg: None,
                    value,
                });
            } else if matches!(self.peek_kind(), Some(TokenKind::Name(_)))
                && matches!(self.peek_kind_n(1), Some(TokenKind::Eq))
            {
                let name = self.expect_ident()?;
                self.next();
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    span: join(name.span, value.span),
                    arg: Some(name),
                    value,
                });
            } else {
                let arg = self.parse_named_test()?;
                if self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync) {
                    let generators = self.parse_comp_for()?;
                    args.push(Expr {
                        span: join(arg.span, self.prev_span()),
                        kind: ExprKind::GeneratorExp {
                            elt: Box::new(arg),
                            generators,
                        },
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        Ok((args, keywords))
    }

    fn parse_subscript_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_subscript_item()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut elts = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(TokenKind::RBracket) {
                break;
            }
            elts.push(self.parse_subscript_item()?);
        }
        Ok(Expr {
            span: join(start, self.prev_span()),
            kind: ExprKind::Tuple(elts),
        })
    }

    fn parse_subscript_item(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek_span_or_end();
        let lower = if self.at(TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_star_or_named()?;
            if !self.at(TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(TokenKind::Colon)?;
        let upper = if self.starts_expr() {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        let step = if self.at(TokenKind::Colon) {
            self.next();
            if self.starts_expr() {
                Some(Box::new(self.parse_test()?))
            } else {
                None
            }
        } else {
            None
        };
        Ok(Expr {
            span: join(start, self.prev_span()),
            kind: ExprKind::Slice { lower, upper, step },
        })
    }

    fn parse_comp_for(&mut self) -> Result<Vec<Comprehension>, ParseError> {
        let mut generators = Vec::new();
        while self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync) {
            let is_async = self.at(TokenKind::KwAsync);
            if is_async {
                self.next();
            }
            self.expect(TokenKind::KwFor)?;
            let target = self.parse_target_list()?;
            check_assign_target(&target)?;
            self.expect(TokenKind::KwIn)?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.at(TokenKind::KwIf) {
                self.next();
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let tok = self.expect_any()?;
        let kind = match tok.kind {
            TokenKind::Name(name) => ExprKind::Name(name),
            TokenKind::Int(v) => ExprKind::Constant(Constant::Int(v)),
            TokenKind::BigInt(text) => ExprKind::Constant(Constant::BigInt(text)),
            TokenKind::Float(v) => ExprKind::Constant(Constant::Float(v)),
            TokenKind::Imaginary(v) => ExprKind::Constant(Constant::Imaginary(v)),
            TokenKind::Str(s) => {
                // Adjacent literals concatenate.
                let mut s = s;
                let mut sp = tok.span;
                while let Some(TokenKind::Str(more)) = self.peek_kind() {
                    s.push_str(more);
                    sp = join(sp, self.peek_span_or_end());
                    self.next();
                }
                return Ok(Expr {
                    span: sp,
                    kind: ExprKind::Constant(Constant::Str(s)),
                });
            }
            TokenKind::Bytes(b) => {
                let mut b = b;
                let mut sp = tok.span;
                while let Some(TokenKind::Bytes(more)) = self.peek_kind() {
                    b.push_str(more);
                    sp = join(sp, self.peek_span_or_end());
                    self.next();
                }
                return Ok(Expr {
                    span: sp,
                    kind: ExprKind::Constant(Constant::Bytes(b)),
                });
            }
            TokenKind::KwTrue => ExprKind::Constant(Constant::Bool(true)),
            TokenKind::KwFalse => ExprKind::Constant(Constant::Bool(false)),
            TokenKind::KwNone => ExprKind::Constant(Constant::None),
            TokenKind::Ellipsis => ExprKind::Constant(Constant::Ellipsis),
            TokenKind::LParen => return self.parse_paren_atom(tok.span),
            TokenKind::LBracket => return self.parse_list_atom(tok.span),
            TokenKind::LBrace => return self.parse_brace_atom(tok.span),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Dedent => {
                return Err(ParseError {
                    message: "expected expression, found end of line".to_string(),
                    span: tok.span,
                });
            }
            other => {
                return Err(ParseError {
                    message: format!("expected expression, found {other:?}"),
                    span: tok.span,
                });
            }
        };
        Ok(Expr {
            span: tok.span,
            kind,
        })
    }

    fn parse_paren_atom(&mut self, open: Span) -> Result<Expr, ParseError> {
        if self.at(TokenKind::RParen) {
            let end = self.expect_any()?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::Tuple(Vec::new()),
            });
        }
        if self.at(TokenKind::KwYield) {
            let value = self.parse_yield()?;
            self.expect(TokenKind::RParen)?;
            return Ok(value);
        }

        let first = self.parse_star_or_named()?;
        if self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync) {
            let generators = self.parse_comp_for()?;
            let end = self.expect(TokenKind::RParen)?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
            });
        }
        if !self.at(TokenKind::Comma) {
            self.expect(TokenKind::RParen)?;
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(TokenKind::RParen) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        let end = self.expect(TokenKind::RParen)?;
        Ok(Expr {
            span: join(open, end.span),
            kind: ExprKind::Tuple(elts),
        })
    }

    fn parse_list_atom(&mut self, open: Span) -> Result<Expr, ParseError> {
        if self.at(TokenKind::RBracket) {
            let end = self.expect_any()?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::List(Vec::new()),
            });
        }

        let first = self.parse_star_or_named()?;
        if self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync) {
            let generators = self.parse_comp_for()?;
            let end = self.expect(TokenKind::RBracket)?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
            });
        }

        let mut elts = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(TokenKind::RBracket) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        let end = self.expect(TokenKind::RBracket)?;
        Ok(Expr {
            span: join(open, end.span),
            kind: ExprKind::List(elts),
        })
    }

    fn parse_brace_atom(&mut self, open: Span) -> Result<Expr, ParseError> {
        if self.at(TokenKind::RBrace) {
            let end = self.expect_any()?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
            });
        }

        // Dict display (possibly starting with `**mapping`).
        let first_entry = if self.at(TokenKind::DoubleStar) {
            self.next();
            Some((None, self.parse_bitor()?))
        } else {
            None
        };
        let first_key = match first_entry {
            Some(_) => None,
            None => Some(self.parse_star_or_named()?),
        };

        if first_entry.is_some() || self.at(TokenKind::Colon) {
            let (key, value) = match (first_entry, first_key) {
                (Some(entry), _) => entry,
                (None, key) => {
                    self.expect(TokenKind::Colon)?;
                    (key, self.parse_test()?)
                }
            };

            if let (Some(k), true) = (&key, self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync)) {
                let key_expr = k.clone();
                let generators = self.parse_comp_for()?;
                let end = self.expect(TokenKind::RBrace)?;
                return Ok(Expr {
                    span: join(open, end.span),
                    kind: ExprKind::DictComp {
                        key: Box::new(key_expr),
                        value: Box::new(value),
                        generators,
                    },
                });
            }

            let mut keys = vec![key];
            let mut values = vec![value];
            while self.at(TokenKind::Comma) {
                self.next();
                if self.at(TokenKind::RBrace) {
                    break;
                }
                if self.at(TokenKind::DoubleStar) {
                    self.next();
                    keys.push(None);
                    values.push(self.parse_bitor()?);
                } else {
                    keys.push(Some(self.parse_test()?));
                    self.expect(TokenKind::Colon)?;
                    values.push(self.parse_test()?);
                }
            }
            let end = self.expect(TokenKind::RBrace)?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::Dict { keys, values },
            });
        }

        // Set display.
        let first = match first_key {
            Some(e) => e,
            None => return Err(self.error_here("expected set element")),
        };
        if self.at(TokenKind::KwFor) || self.at(TokenKind::KwAsync) {
            let generators = self.parse_comp_for()?;
            let end = self.expect(TokenKind::RBrace)?;
            return Ok(Expr {
                span: join(open, end.span),
                kind: ExprKind::SetComp {
                    elt: Box::new(first),
                    generators,
                },
            });
        }
        let mut elts = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(TokenKind::RBrace) {
                break;
            }
            elts.push(self.parse_star_or_named()?);
        }
        let end = self.expect(TokenKind::RBrace)?;
        Ok(Expr {
            span: join(open, end.span),
            kind: ExprKind::Set(elts),
        })
    }

    // ---- token helpers ----

    fn starts_expr(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Name(_)
                    | TokenKind::Int(_)
                    | TokenKind::BigInt(_)
                    | TokenKind::Float(_)
                    | TokenKind::Imaginary(_)
                    | TokenKind::Str(_)
                    | TokenKind::Bytes(_)
                    | TokenKind::KwTrue
                    | TokenKind::KwFalse
                    | TokenKind::KwNone
                    | TokenKind::KwNot
                    | TokenKind::KwLambda
                    | TokenKind::KwAwait
                    | TokenKind::Ellipsis
                    | TokenKind::LParen
                    | TokenKind::LBracket
                    | TokenKind::LBrace
                    | TokenKind::Minus
                    | TokenKind::Plus
                    | TokenKind::Tilde
                    | TokenKind::Star
            )
        )
    }

    fn skip_newlines(&mut self) {
        while self.at(TokenKind::Newline) {
            self.next();
        }
    }

    fn expect_stmt_terminator(&mut self) -> Result<(), ParseError> {
        if self.at(TokenKind::Newline) {
            self.next();
            Ok(())
        } else if self.at(TokenKind::Eof) || self.at(TokenKind::Dedent) {
            Ok(())
        } else {
            Err(self.error_here("expected end of line"))
        }
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.expect_any()?;
        match tok.kind {
            TokenKind::Name(name) => Ok(Ident::new(tok.span, name)),
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                span: tok.span,
            }),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let tok = self.expect_any()?;
        if mem::discriminant(&tok.kind) == mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError {
                message: format!("expected {expected:?}, found {:?}", tok.kind),
                span: tok.span,
            })
        }
    }

    fn expect_any(&mut self) -> Result<Token, ParseError> {
        let end = self.peek_span_or_end();
        self.next().ok_or_else(|| ParseError {
            message: "unexpected end of input".to_string(),
            span: end,
        })
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            span: self.peek_span_or_end(),
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind()
            .is_some_and(|k| mem::discriminant(k) == mem::discriminant(&kind))
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.idx)?.clone();
        self.idx += 1;
        Some(tok)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_kind_n(&self, n: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx + n).map(|t| &t.kind)
    }

    fn peek_span_or_end(&self) -> Span {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map_or_else(|| span(0, 0), |t| t.span)
    }

    fn prev_span(&self) -> Span {
        self.idx
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| span(0, 0), |t| t.span)
    }
}

fn check_assign_target(expr: &Expr) -> Result<(), ParseError> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Starred(inner) => check_assign_target(inner),
        ExprKind::Tuple(elts) | ExprKind::List(elts) => elts.iter().try_for_each(check_assign_target),
        other => Err(ParseError {
            message: format!("cannot assign to {}", other.describe()),
            span: expr.span,
        }),
    }
}
