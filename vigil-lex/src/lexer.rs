#![forbid(unsafe_code)]

use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;
use vigil_ast::{span_between, BinOp, Span};

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(vigil::lex))]
#[allow(unused_assignments)]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\f]+|#[^\r\n]*|\\\r?\n)")]
enum RawToken {
    #[token("False")]
    KwFalse,
    #[token("None")]
    KwNone,
    #[token("True")]
    KwTrue,
    #[token("and")]
    KwAnd,
    #[token("as")]
    KwAs,
    #[token("assert")]
    KwAssert,
    #[token("async")]
    KwAsync,
    #[token("await")]
    KwAwait,
    #[token("break")]
    KwBreak,
    #[token("class")]
    KwClass,
    #[token("continue")]
    KwContinue,
    #[token("def")]
    KwDef,
    #[token("del")]
    KwDel,
    #[token("elif")]
    KwElif,
    #[token("else")]
    KwElse,
    #[token("except")]
    KwExcept,
    #[token("finally")]
    KwFinally,
    #[token("for")]
    KwFor,
    #[token("from")]
    KwFrom,
    #[token("global")]
    KwGlobal,
    #[token("if")]
    KwIf,
    #[token("import")]
    KwImport,
    #[token("in")]
    KwIn,
    #[token("is")]
    KwIs,
    #[token("lambda")]
    KwLambda,
    #[token("nonlocal")]
    KwNonlocal,
    #[token("not")]
    KwNot,
    #[token("or")]
    KwOr,
    #[token("pass")]
    KwPass,
    #[token("raise")]
    KwRaise,
    #[token("return")]
    KwReturn,
    #[token("try")]
    KwTry,
    #[token("while")]
    KwWhile,
    #[token("with")]
    KwWith,
    #[token("yield")]
    KwYield,

    #[token("->")]
    Arrow,
    #[token("...")]
    Ellipsis,
    #[token(":=")]
    Walrus,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("=")]
    Eq,

    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,

    #[token("+=", |_| BinOp::Add)]
    #[token("-=", |_| BinOp::Sub)]
    #[token("*=", |_| BinOp::Mul)]
    #[token("@=", |_| BinOp::MatMul)]
    #[token("/=", |_| BinOp::Div)]
    #[token("//=", |_| BinOp::FloorDiv)]
    #[token("%=", |_| BinOp::Mod)]
    #[token("**=", |_| BinOp::Pow)]
    #[token("<<=", |_| BinOp::LShift)]
    #[token(">>=", |_| BinOp::RShift)]
    #[token("|=", |_| BinOp::BitOr)]
    #[token("^=", |_| BinOp::BitXor)]
    #[token("&=", |_| BinOp::BitAnd)]
    AugAssign(BinOp),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"0[bB][01_]+", |lex| parse_int_prefixed(lex.slice(), 2))]
    #[regex(r"0[oO][0-7_]+", |lex| parse_int_prefixed(lex.slice(), 8))]
    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| parse_int_prefixed(lex.slice(), 16))]
    #[regex(r"[0-9][0-9_]*", |lex| parse_int_decimal(lex.slice()))]
    Int(Option<IntLiteral>),

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", |lex| parse_float(lex.slice()))]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", |lex| parse_float(lex.slice()))]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", |lex| parse_float(lex.slice()))]
    Float(Option<f64>),

    #[regex(r"[0-9][0-9_]*[jJ]", |lex| parse_imaginary(lex.slice()))]
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?[jJ]", |lex| parse_imaginary(lex.slice()))]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?[jJ]", |lex| parse_imaginary(lex.slice()))]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+[jJ]", |lex| parse_imaginary(lex.slice()))]
    Imaginary(Option<f64>),

    // Single-line literals, with optional r/b/u/f prefixes.
    #[regex(r#"[rRbBuUfF]{0,2}"([^"\\\r\n]|\\.)*""#, lex_single_line)]
    #[regex(r"[rRbBuUfF]{0,2}'([^'\\\r\n]|\\.)*'", lex_single_line)]
    // Triple-quoted literals may span lines; the callback scans for the closer.
    #[regex(r#"[rRbBuUfF]{0,2}""""#, lex_triple_quoted)]
    #[regex(r"[rRbBuUfF]{0,2}'''", lex_triple_quoted)]
    Str(Option<String>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum IntLiteral {
    Small(u64),
    /// Well-formed but wider than `u64`; the text without underscores.
    Wide(String),
}

fn parse_int_decimal(s: &str) -> Option<IntLiteral> {
    let digits = strip_underscores(s)?;
    Some(match digits.parse::<u64>() {
        Ok(n) => IntLiteral::Small(n),
        Err(_) => IntLiteral::Wide(digits),
    })
}

fn parse_int_prefixed(s: &str, radix: u32) -> Option<IntLiteral> {
    let (prefix, rest) = (s.get(..2)?, s.get(2..)?);
    let digits = strip_underscores(rest.trim_start_matches('_'))?;
    // The regex admits only digits of the radix, so the only failure left is overflow.
    Some(match u64::from_str_radix(&digits, radix) {
        Ok(n) => IntLiteral::Small(n),
        Err(_) => IntLiteral::Wide(format!("{prefix}{digits}")),
    })
}

fn parse_float(s: &str) -> Option<f64> {
    s.replace('_', "").parse::<f64>().ok()
}

fn parse_imaginary(s: &str) -> Option<f64> {
    parse_float(&s[..s.len() - 1])
}

fn strip_underscores(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    Some(s.replace('_', ""))
}

fn prefix_len(slice: &str) -> usize {
    slice
        .bytes()
        .take_while(|b| !matches!(b, b'"' | b'\''))
        .count()
}

fn lex_single_line(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let start = prefix_len(s) + 1;
    let end = s.len().saturating_sub(1);
    Some(s.get(start..end).unwrap_or_default().to_string())
}

fn lex_triple_quoted(lex: &mut logos::Lexer<RawToken>) -> Option<String> {
    let s = lex.slice();
    let quote = &s[s.len() - 3..];
    let rest = lex.remainder();

    let bytes = rest.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if rest[i..].starts_with(quote) {
            let body = rest[..i].to_string();
            lex.bump(i + 3);
            return Some(body);
        }
        i += 1;
    }

    // Unterminated: consume the rest so the error span covers it.
    lex.bump(rest.len());
    None
}

/// Visual indentation width of the whitespace in `prefix` (tabs to multiples of 8).
fn indent_width(prefix: &str) -> usize {
    let mut col = 0usize;
    for ch in prefix.chars() {
        match ch {
            '\t' => col = (col / 8 + 1) * 8,
            '\x0c' => col = 0,
            _ => col += 1,
        }
    }
    col
}

pub struct Lexer<'a> {
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<Vec<Token>, LexError> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut indent_stack: Vec<usize> = vec![0];
        let mut depth = 0usize;
        let mut at_line_start = true;

        let mut lex = RawToken::lexer(self.src);
        while let Some(raw) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);

            if matches!(raw, Ok(RawToken::Newline)) {
                // Newlines inside brackets are implicit line joins.
                if depth > 0 {
                    continue;
                }
                let ends_line = tokens.last().is_some_and(|t| {
                    !matches!(t.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent)
                });
                if ends_line {
                    tokens.push(Token {
                        kind: TokenKind::Newline,
                        span,
                    });
                }
                at_line_start = true;
                continue;
            }

            if at_line_start && depth == 0 {
                let line_start = self.src[..range.start]
                    .rfind('\n')
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let col = indent_width(&self.src[line_start..range.start]);
                let current = *indent_stack.last().unwrap_or(&0);
                if col > current {
                    indent_stack.push(col);
                    tokens.push(Token {
                        kind: TokenKind::Indent,
                        span: span_between(line_start, range.start),
                    });
                } else if col < current {
                    while indent_stack.last().is_some_and(|&top| top > col) {
                        indent_stack.pop();
                        tokens.push(Token {
                            kind: TokenKind::Dedent,
                            span: span_between(line_start, range.start),
                        });
                    }
                    if *indent_stack.last().unwrap_or(&usize::MAX) != col {
                        return Err(LexError {
                            message: "unindent does not match any outer indentation level".to_string(),
                            span: span_between(line_start, range.end),
                        });
                    }
                }
            }
            at_line_start = false;

            let kind = match raw {
                Ok(RawToken::KwFalse) => TokenKind::KwFalse,
                Ok(RawToken::KwNone) => TokenKind::KwNone,
                Ok(RawToken::KwTrue) => TokenKind::KwTrue,
                Ok(RawToken::KwAnd) => TokenKind::KwAnd,
                Ok(RawToken::KwAs) => TokenKind::KwAs,
                Ok(RawToken::KwAssert) => TokenKind::KwAssert,
                Ok(RawToken::KwAsync) => TokenKind::KwAsync,
                Ok(RawToken::KwAwait) => TokenKind::KwAwait,
                Ok(RawToken::KwBreak) => TokenKind::KwBreak,
                Ok(RawToken::KwClass) => TokenKind::KwClass,
                Ok(RawToken::KwContinue) => TokenKind::KwContinue,
                Ok(RawToken::KwDef) => TokenKind::KwDef,
                Ok(RawToken::KwDel) => TokenKind::KwDel,
                Ok(RawToken::KwElif) => TokenKind::KwElif,
                Ok(RawToken::KwElse) => TokenKind::KwElse,
                Ok(RawToken::KwExcept) => TokenKind::KwExcept,
                Ok(RawToken::KwFinally) => TokenKind::KwFinally,
                Ok(RawToken::KwFor) => TokenKind::KwFor,
                Ok(RawToken::KwFrom) => TokenKind::KwFrom,
                Ok(RawToken::KwGlobal) => TokenKind::KwGlobal,
                Ok(RawToken::KwIf) => TokenKind::KwIf,
                Ok(RawToken::KwImport) => TokenKind::KwImport,
                Ok(RawToken::KwIn) => TokenKind::KwIn,
                Ok(RawToken::KwIs) => TokenKind::KwIs,
                Ok(RawToken::KwLambda) => TokenKind::KwLambda,
                Ok(RawToken::KwNonlocal) => TokenKind::KwNonlocal,
                Ok(RawToken::KwNot) => TokenKind::KwNot,
                Ok(RawToken::KwOr) => TokenKind::KwOr,
                Ok(RawToken::KwPass) => TokenKind::KwPass,
                Ok(RawToken::KwRaise) => TokenKind::KwRaise,
                Ok(RawToken::KwReturn) => TokenKind::KwReturn,
                Ok(RawToken::KwTry) => TokenKind::KwTry,
                Ok(RawToken::KwWhile) => TokenKind::KwWhile,
                Ok(RawToken::KwWith) => TokenKind::KwWith,
                Ok(RawToken::KwYield) => TokenKind::KwYield,

                Ok(RawToken::Arrow) => TokenKind::Arrow,
                Ok(RawToken::Ellipsis) => TokenKind::Ellipsis,
                Ok(RawToken::Walrus) => TokenKind::Walrus,
                Ok(RawToken::Colon) => TokenKind::Colon,
                Ok(RawToken::Semi) => TokenKind::Semi,
                Ok(RawToken::Comma) => TokenKind::Comma,
                Ok(RawToken::Dot) => TokenKind::Dot,
                Ok(RawToken::At) => TokenKind::At,
                Ok(RawToken::Eq) => TokenKind::Eq,

                Ok(RawToken::EqEq) => TokenKind::EqEq,
                Ok(RawToken::Neq) => TokenKind::Neq,
                Ok(RawToken::Le) => TokenKind::Le,
                Ok(RawToken::Ge) => TokenKind::Ge,
                Ok(RawToken::Lt) => TokenKind::Lt,
                Ok(RawToken::Gt) => TokenKind::Gt,

                Ok(RawToken::Plus) => TokenKind::Plus,
                Ok(RawToken::Minus) => TokenKind::Minus,
                Ok(RawToken::Star) => TokenKind::Star,
                Ok(RawToken::DoubleStar) => TokenKind::DoubleStar,
                Ok(RawToken::Slash) => TokenKind::Slash,
                Ok(RawToken::DoubleSlash) => TokenKind::DoubleSlash,
                Ok(RawToken::Percent) => TokenKind::Percent,
                Ok(RawToken::LShift) => TokenKind::LShift,
                Ok(RawToken::RShift) => TokenKind::RShift,
                Ok(RawToken::Amp) => TokenKind::Amp,
                Ok(RawToken::Pipe) => TokenKind::Pipe,
                Ok(RawToken::Caret) => TokenKind::Caret,
                Ok(RawToken::Tilde) => TokenKind::Tilde,
                Ok(RawToken::AugAssign(op)) => TokenKind::AugAssign(op),

                Ok(RawToken::LParen) => TokenKind::LParen,
                Ok(RawToken::RParen) => TokenKind::RParen,
                Ok(RawToken::LBracket) => TokenKind::LBracket,
                Ok(RawToken::RBracket) => TokenKind::RBracket,
                Ok(RawToken::LBrace) => TokenKind::LBrace,
                Ok(RawToken::RBrace) => TokenKind::RBrace,

                Ok(RawToken::Name(s)) => TokenKind::Name(s),
                Ok(RawToken::Int(Some(IntLiteral::Small(n)))) => TokenKind::Int(n),
                Ok(RawToken::Int(Some(IntLiteral::Wide(text)))) => TokenKind::BigInt(text),
                Ok(RawToken::Int(None)) => {
                    return Err(LexError {
                        message: "invalid integer literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Float(Some(f))) => TokenKind::Float(f),
                Ok(RawToken::Float(None)) => {
                    return Err(LexError {
                        message: "invalid float literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Imaginary(Some(f))) => TokenKind::Imaginary(f),
                Ok(RawToken::Imaginary(None)) => {
                    return Err(LexError {
                        message: "invalid imaginary literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Str(Some(body))) => {
                    let slice = lex.slice();
                    let prefix = &slice[..prefix_len(slice)];
                    if prefix.contains(['b', 'B']) {
                        TokenKind::Bytes(body)
                    } else {
                        TokenKind::Str(body)
                    }
                }
                Ok(RawToken::Str(None)) => {
                    return Err(LexError {
                        message: "unterminated triple-quoted string literal".to_string(),
                        span,
                    });
                }
                Ok(RawToken::Newline) => continue,

                Err(_) => {
                    let slice = lex.slice();
                    let unprefixed = slice.trim_start_matches(['r', 'R', 'b', 'B', 'u', 'U', 'f', 'F']);
                    let message = if unprefixed.starts_with(['"', '\'']) {
                        "unterminated string literal"
                    } else if slice.starts_with(|c: char| c.is_ascii_digit()) {
                        "invalid integer literal"
                    } else {
                        "unexpected character"
                    };
                    return Err(LexError {
                        message: message.to_string(),
                        span,
                    });
                }
            };

            if kind.is_open_bracket() {
                depth += 1;
            } else if kind.is_close_bracket() {
                depth = depth.saturating_sub(1);
            }

            tokens.push(Token { kind, span });
        }

        let end = self.src.len();

        // A final line without a trailing newline still ends a logical line.
        if tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Dedent))
        {
            tokens.push(Token {
                kind: TokenKind::Newline,
                span: span_between(end, end),
            });
        }

        // Close open indents.
        while indent_stack.len() > 1 {
            indent_stack.pop();
            tokens.push(Token {
                kind: TokenKind::Dedent,
                span: span_between(end, end),
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            span: span_between(end, end),
        });

        Ok(tokens)
    }
}
