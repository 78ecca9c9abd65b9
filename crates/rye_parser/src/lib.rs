//! Rye Parser
//!
//! Hand-written scanner and recursive-descent parser for the Rye language.
//! Takes a source string and produces a `rye_ast::Module`. Syntax errors
//! stop the parse of the offending file; semantic diagnostics are the
//! compiler core's job.

pub mod class;
pub mod common;
pub mod expr;
pub mod stmt;
pub mod tokenizer;
pub mod types;

pub use common::ParseError;

use common::Cursor;
use rye_ast::Module;
use tokenizer::{tokenize, TokenKind};

/// Parse a source string into a Rye AST module.
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let toks = tokenize(source);
    let mut cur = Cursor::new(&toks);
    let mut classes = Vec::new();
    while !cur.at_eof() {
        if let TokenKind::Unknown(c) = cur.peek() {
            return Err(ParseError::new(
                format!("unexpected character `{}`", c),
                cur.span(),
            ));
        }
        classes.push(class::parse_class(&mut cur)?);
    }
    Ok(Module {
        classes,
        span: 0..source.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_small_program() {
        let src = "
            public class Program {
              static void Main() {
                Console.WriteLine(\"hello, world\");
              }
            }
        ";
        let module = parse_module(src).expect("program should parse");
        assert_eq!(module.classes.len(), 1);
        assert_eq!(module.classes[0].name.name, "Program");
    }

    #[test]
    fn reports_syntax_errors() {
        assert!(parse_module("class {").is_err());
        assert!(parse_module("class A { int }").is_err());
    }
}
