#![forbid(unsafe_code)]

mod error;
mod parser;

use vigil_lex::Lexer;

pub use error::ParseError;
pub use parser::Parser;

/// Parse a Python module into a `vigil_ast::Module`.
///
/// Lexical errors (bad indentation, unterminated strings) surface as
/// `ParseError` as well, so callers deal with a single error type.
pub fn parse_module(src: &str) -> Result<vigil_ast::Module, ParseError> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_module()
}

pub fn parse_source(src: &str) -> miette::Result<vigil_ast::Module> {
    Ok(parse_module(src)?)
}

pub fn parse_expr(src: &str) -> Result<vigil_ast::Expr, ParseError> {
    let tokens = Lexer::new(src).lex()?;
    let mut parser = Parser::new(&tokens);
    parser.parse_expr_eof()
}
