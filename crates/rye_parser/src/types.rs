//! Type expression parsing.

use crate::common::{Cursor, PResult, ParseError};
use crate::tokenizer::TokenKind;
use rye_ast::{Ident, TypeExpr};

/// True if the current token is a keyword type (never an expression head).
pub fn starts_keyword_type(cur: &Cursor) -> bool {
    matches!(
        cur.peek(),
        TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::StringKw
            | TokenKind::Object
            | TokenKind::Void
    )
}

/// Parses a named base type: a type keyword or a class name.
pub fn parse_type_name(cur: &mut Cursor) -> PResult<Ident> {
    let spelled = match cur.peek() {
        TokenKind::Bool => "bool",
        TokenKind::Char => "char",
        TokenKind::Int => "int",
        TokenKind::Float => "float",
        TokenKind::Double => "double",
        TokenKind::StringKw => "string",
        TokenKind::Object => "object",
        TokenKind::Void => "void",
        TokenKind::Ident(name) => {
            let name = name.clone();
            let span = cur.bump().span;
            return Ok(Ident { name, span });
        }
        _ => return Err(ParseError::new("expected a type", cur.span())),
    };
    let span = cur.bump().span;
    Ok(Ident {
        name: spelled.to_string(),
        span,
    })
}

/// Parses a full type expression: a named base followed by any number of
/// `[]` and `^` suffixes, e.g. `Node^`, `int[]`, `Node^[]`.
pub fn parse_type_expr(cur: &mut Cursor) -> PResult<TypeExpr> {
    let name = parse_type_name(cur)?;
    let start = name.span.start;
    let mut ty = TypeExpr::Name(name);
    loop {
        if cur.peek() == &TokenKind::LeftBracket && cur.peek2() == &TokenKind::RightBracket {
            cur.bump();
            let end = cur.bump().span.end;
            ty = TypeExpr::Array(Box::new(ty), start..end);
        } else if cur.peek() == &TokenKind::Caret {
            let end = cur.bump().span.end;
            ty = TypeExpr::Own(Box::new(ty), start..end);
        } else {
            break;
        }
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(src: &str) -> TypeExpr {
        let toks = tokenize(src);
        let mut cur = Cursor::new(&toks);
        parse_type_expr(&mut cur).expect("type should parse")
    }

    #[test]
    fn parses_suffixes() {
        assert!(matches!(parse("int"), TypeExpr::Name(_)));
        assert!(matches!(parse("Node^"), TypeExpr::Own(_, _)));
        assert!(matches!(parse("int[]"), TypeExpr::Array(_, _)));
        match parse("Node^[]") {
            TypeExpr::Array(inner, _) => assert!(matches!(*inner, TypeExpr::Own(_, _))),
            other => panic!("expected array of owning, got {:?}", other),
        }
    }
}
