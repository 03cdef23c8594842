#![forbid(unsafe_code)]

//! `match` statements and their patterns.
//!
//! `match` is a soft keyword: a line only starts a match statement when
//! it reads as `match <subject>:` followed by an indented block.

use vigil_ast::{
    join, BinOp, Expr, ExprKind, Ident, MatchCase, MatchStmt, Pattern, PatternKind, Span, Stmt,
    StmtKind, UnaryOp,
};
use vigil_lex::TokenKind;

use super::Parser;
use crate::error::ParseError;

impl<'a> Parser<'a> {
    /// Lookahead that leaves the cursor where it was.
    pub(super) fn starts_match_stmt(&mut self) -> bool {
        let saved = self.idx;
        self.next();
        let ok = self.starts_expr()
            && self.parse_match_subject().is_ok()
            && self.at(TokenKind::Colon)
            && matches!(self.peek_kind_n(1), Some(TokenKind::Newline));
        self.idx = saved;
        ok
    }

    pub(super) fn parse_match(&mut self, start: Span) -> Result<Stmt, ParseError> {
        self.next();
        let subject = self.parse_match_subject()?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.skip_newlines();
        if !self.at(TokenKind::Indent) {
            return Err(self.error_here("expected an indented block of 'case' clauses"));
        }
        self.next();

        let mut cases = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(TokenKind::Dedent) {
                self.next();
                break;
            }
            if self.at(TokenKind::Eof) {
                break;
            }
            cases.push(self.parse_case()?);
        }
        if cases.is_empty() {
            return Err(ParseError {
                message: "match statement has no 'case' clauses".to_string(),
                span: start,
            });
        }
        Ok(Stmt {
            span: join(start, self.prev_span()),
            kind: StmtKind::Match(MatchStmt { subject, cases }),
        })
    }

    fn parse_match_subject(&mut self) -> Result<Expr, ParseError> {
        self.parse_seq(Self::parse_star_or_named)
    }

    fn parse_case(&mut self) -> Result<MatchCase, ParseError> {
        let kw = self.expect_any()?;
        if !matches!(&kw.kind, TokenKind::Name(n) if n == "case") {
            return Err(ParseError {
                message: format!("expected 'case', found {:?}", kw.kind),
                span: kw.span,
            });
        }
        let pattern = self.parse_open_pattern()?;
        let guard = if self.at(TokenKind::KwIf) {
            self.next();
            Some(self.parse_named_test()?)
        } else {
            None
        };
        self.expect(TokenKind::Colon)?;
        let body = self.parse_suite()?;
        Ok(MatchCase {
            span: join(kw.span, self.prev_span()),
            pattern,
            guard,
            body,
        })
    }

    /// Top-level pattern, where `case a, *rest:` is an unbracketed sequence.
    fn parse_open_pattern(&mut self) -> Result<Pattern, ParseError> {
        let first = self.parse_maybe_star_pattern()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let start = first.span;
        let mut items = vec![first];
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(TokenKind::Colon) || self.at(TokenKind::KwIf) {
                break;
            }
            items.push(self.parse_maybe_star_pattern()?);
        }
        Ok(Pattern {
            span: join(start, self.prev_span()),
            kind: PatternKind::Sequence(items),
        })
    }

    fn parse_maybe_star_pattern(&mut self) -> Result<Pattern, ParseError> {
        if !self.at(TokenKind::Star) {
            return self.parse_as_pattern();
        }
        let star = self.expect(TokenKind::Star)?;
        let name = self.expect_ident()?;
        Ok(Pattern {
            span: join(star.span, name.span),
            kind: PatternKind::Star(capture(name)),
        })
    }

    fn parse_as_pattern(&mut self) -> Result<Pattern, ParseError> {
        let pattern = self.parse_or_pattern()?;
        if !self.at(TokenKind::KwAs) {
            return Ok(pattern);
        }
        self.next();
        let name = self.expect_ident()?;
        if name.node == "_" {
            return Err(ParseError {
                message: "cannot use '_' as a target".to_string(),
                span: name.span,
            });
        }
        Ok(Pattern {
            span: join(pattern.span, name.span),
            kind: PatternKind::As {
                pattern: Box::new(pattern),
                name,
            },
        })
    }

    fn parse_or_pattern(&mut self) -> Result<Pattern, ParseError> {
        let first = self.parse_closed_pattern()?;
        if !self.at(TokenKind::Pipe) {
            return Ok(first);
        }
        let start = first.span;
        let mut alternatives = vec![first];
        while self.at(TokenKind::Pipe) {
            self.next();
            alternatives.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern {
            span: join(start, self.prev_span()),
            kind: PatternKind::Or(alternatives),
        })
    }

    fn parse_closed_pattern(&mut self) -> Result<Pattern, ParseError> {
        let start = self.peek_span_or_end();
        match self.peek_kind() {
            Some(
                TokenKind::Minus
                | TokenKind::Int(_)
                | TokenKind::BigInt(_)
                | TokenKind::Float(_)
                | TokenKind::Imaginary(_),
            ) => {
                let value = self.parse_number_pattern()?;
                Ok(value_pattern(value))
            }
            Some(
                TokenKind::Str(_)
                | TokenKind::Bytes(_)
                | TokenKind::KwNone
                | TokenKind::KwTrue
                | TokenKind::KwFalse,
            ) => {
                let value = self.parse_atom()?;
                Ok(value_pattern(value))
            }
            Some(TokenKind::Name(_)) => self.parse_name_pattern(),
            Some(TokenKind::LParen) => {
                self.next();
                if self.at(TokenKind::RParen) {
                    self.next();
                    return Ok(Pattern {
                        span: join(start, self.prev_span()),
                        kind: PatternKind::Sequence(Vec::new()),
                    });
                }
                let first = self.parse_maybe_star_pattern()?;
                if self.at(TokenKind::RParen) && !matches!(first.kind, PatternKind::Star(_)) {
                    self.next();
                    return Ok(first);
                }
                let mut items = vec![first];
                self.parse_pattern_items(TokenKind::RParen, &mut items)?;
                Ok(Pattern {
                    span: join(start, self.prev_span()),
                    kind: PatternKind::Sequence(items),
                })
            }
            Some(TokenKind::LBracket) => {
                self.next();
                let mut items = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    items.push(self.parse_maybe_star_pattern()?);
                }
                self.parse_pattern_items(TokenKind::RBracket, &mut items)?;
                Ok(Pattern {
                    span: join(start, self.prev_span()),
                    kind: PatternKind::Sequence(items),
                })
            }
            Some(TokenKind::LBrace) => self.parse_mapping_pattern(),
            _ => Err(self.error_here("expected a pattern")),
        }
    }

    /// Comma-separated tail of a bracketed sequence, through the closer.
    fn parse_pattern_items(
        &mut self,
        close: TokenKind,
        items: &mut Vec<Pattern>,
    ) -> Result<(), ParseError> {
        while self.at(TokenKind::Comma) {
            self.next();
            if self.at(close.clone()) {
                break;
            }
            items.push(self.parse_maybe_star_pattern()?);
        }
        self.expect(close)?;
        Ok(())
    }

    /// Signed number, optionally `real +/- imag` for complex literals.
    fn parse_number_pattern(&mut self) -> Result<Expr, ParseError> {
        let start = self.peek_span_or_end();
        let negative = self.at(TokenKind::Minus);
        if negative {
            self.next();
        }
        if !matches!(
            self.peek_kind(),
            Some(
                TokenKind::Int(_)
                    | TokenKind::BigInt(_)
                    | TokenKind::Float(_)
                    | TokenKind::Imaginary(_)
            )
        ) {
            return Err(self.error_here("expected a number in pattern"));
        }
        let mut value = self.parse_atom()?;
        if negative {
            value = Expr {
                span: join(start, value.span),
                kind: ExprKind::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(value),
                },
            };
        }
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => BinOp::Add,
            Some(TokenKind::Minus) => BinOp::Sub,
            _ => return Ok(value),
        };
        self.next();
        if !matches!(self.peek_kind(), Some(TokenKind::Imaginary(_))) {
            return Err(self.error_here("imaginary number required in complex literal"));
        }
        let imag = self.parse_atom()?;
        Ok(Expr {
            span: join(start, imag.span),
            kind: ExprKind::BinOp {
                left: Box::new(value),
                op,
                right: Box::new(imag),
            },
        })
    }

    /// Capture, wildcard, dotted value, or class pattern.
    fn parse_name_pattern(&mut self) -> Result<Pattern, ParseError> {
        let name = self.expect_ident()?;
        let start = name.span;
        if !self.at(TokenKind::Dot) && !self.at(TokenKind::LParen) {
            return Ok(Pattern {
                span: start,
                kind: PatternKind::Capture(capture(name)),
            });
        }

        let mut path = Expr {
            span: start,
            kind: ExprKind::Name(name.node),
        };
        while self.at(TokenKind::Dot) {
            self.next();
            let attr = self.expect_ident()?;
            path = Expr {
                span: join(path.span, attr.span),
                kind: ExprKind::Attribute {
                    value: Box::new(path),
                    attr,
                },
            };
        }
        if !self.at(TokenKind::LParen) {
            return Ok(value_pattern(path));
        }

        self.next();
        let mut patterns = Vec::new();
        let mut keywords = Vec::new();
        while !self.at(TokenKind::RParen) {
            let is_keyword = matches!(self.peek_kind(), Some(TokenKind::Name(_)))
                && matches!(self.peek_kind_n(1), Some(TokenKind::Eq));
            if is_keyword {
                let key = self.expect_ident()?;
                self.next();
                keywords.push((key, self.parse_as_pattern()?));
            } else if !keywords.is_empty() {
                return Err(self.error_here("positional patterns follow keyword patterns"));
            } else {
                patterns.push(self.parse_as_pattern()?);
            }
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        self.expect(TokenKind::RParen)?;
        Ok(Pattern {
            span: join(start, self.prev_span()),
            kind: PatternKind::Class {
                cls: path,
                patterns,
                keywords,
            },
        })
    }

    fn parse_mapping_pattern(&mut self) -> Result<Pattern, ParseError> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut keys = Vec::new();
        let mut patterns = Vec::new();
        let mut rest = None;
        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::DoubleStar) {
                self.next();
                rest = Some(self.expect_ident()?);
            } else if rest.is_some() {
                return Err(self.error_here("'**' pattern must come last in a mapping"));
            } else {
                let key = self.parse_closed_pattern()?;
                let PatternKind::Value(key) = key.kind else {
                    return Err(ParseError {
                        message: "mapping pattern keys must be literals or dotted names"
                            .to_string(),
                        span: key.span,
                    });
                };
                self.expect(TokenKind::Colon)?;
                keys.push(key);
                patterns.push(self.parse_as_pattern()?);
            }
            if !self.at(TokenKind::Comma) {
                break;
            }
            self.next();
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Pattern {
            span: join(open.span, self.prev_span()),
            kind: PatternKind::Mapping {
                keys,
                patterns,
                rest,
            },
        })
    }
}

fn capture(name: Ident) -> Option<Ident> {
    (name.node != "_").then_some(name)
}

fn value_pattern(value: Expr) -> Pattern {
    Pattern {
        span: value.span,
        kind: PatternKind::Value(value),
    }
}
