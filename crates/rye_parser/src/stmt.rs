//! Statement parsing.

use crate::common::{Cursor, PResult, ParseError};
use crate::expr::parse_expr;
use crate::tokenizer::TokenKind;
use crate::types::{parse_type_expr, starts_keyword_type};
use rye_ast::*;

/// Parses a `{ ... }` block.
pub fn parse_block(cur: &mut Cursor) -> PResult<Block> {
    let start = cur.expect(TokenKind::LeftBrace, "`{`")?.start;
    let mut stmts = Vec::new();
    while cur.peek() != &TokenKind::RightBrace {
        if cur.at_eof() {
            return Err(ParseError::new("unterminated block", cur.span()));
        }
        stmts.push(parse_stmt(cur)?);
    }
    let end = cur.bump().span.end; // `}`
    Ok(Block {
        stmts,
        span: start..end,
    })
}

/// Parses a single statement.
pub fn parse_stmt(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.span().start;
    match cur.peek() {
        TokenKind::LeftBrace => Ok(Stmt::Block(parse_block(cur)?)),
        TokenKind::If => parse_if(cur),
        TokenKind::While => parse_while(cur),
        TokenKind::Do => parse_do(cur),
        TokenKind::For => parse_for(cur),
        TokenKind::Foreach => parse_foreach(cur),
        TokenKind::Switch => parse_switch(cur),
        TokenKind::Break => {
            cur.bump();
            let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
            Ok(Stmt::Break(BreakStmt { span: start..end }))
        }
        TokenKind::Continue => {
            cur.bump();
            let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
            Ok(Stmt::Continue(ContinueStmt { span: start..end }))
        }
        TokenKind::Return => {
            cur.bump();
            let value = if cur.peek() == &TokenKind::Semicolon {
                None
            } else {
                Some(parse_expr(cur)?)
            };
            let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
            Ok(Stmt::Return(ReturnStmt {
                value,
                span: start..end,
            }))
        }
        _ => parse_local_or_expr(cur),
    }
}

/// Disambiguates `T name ...;` from an expression statement. A statement
/// beginning with a keyword type is always a declaration; an identifier
/// head is tried speculatively as a type followed by a name.
fn parse_local_or_expr(cur: &mut Cursor) -> PResult<Stmt> {
    if starts_keyword_type(cur) {
        return parse_local(cur).map(Stmt::Local);
    }
    if matches!(cur.peek(), TokenKind::Ident(_)) {
        let saved = cur.save();
        if parse_type_expr(cur).is_ok() && matches!(cur.peek(), TokenKind::Ident(_)) {
            cur.restore(saved);
            return parse_local(cur).map(Stmt::Local);
        }
        cur.restore(saved);
    }
    let expr = parse_expr(cur)?;
    let start = expr.span().start;
    let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
    Ok(Stmt::Expr(ExprStmt {
        expr,
        span: start..end,
    }))
}

fn parse_local(cur: &mut Cursor) -> PResult<LocalDecl> {
    let ty = parse_type_expr(cur)?;
    let start = ty.span().start;
    let name = cur.expect_ident("a variable name")?;
    let init = if cur.eat(&TokenKind::Eq) {
        Some(parse_expr(cur)?)
    } else {
        None
    };
    let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
    Ok(LocalDecl {
        ty,
        name,
        init,
        span: start..end,
    })
}

fn parse_if(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `if`
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let cond = parse_expr(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;
    let then_branch = Box::new(parse_stmt(cur)?);
    let (else_branch, end) = if cur.eat(&TokenKind::Else) {
        let s = parse_stmt(cur)?;
        let end = s.span().end;
        (Some(Box::new(s)), end)
    } else {
        (None, then_branch.span().end)
    };
    Ok(Stmt::If(IfStmt {
        cond,
        then_branch,
        else_branch,
        span: start..end,
    }))
}

fn parse_while(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `while`
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let cond = parse_expr(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;
    let body = Box::new(parse_stmt(cur)?);
    let end = body.span().end;
    Ok(Stmt::While(WhileStmt {
        cond,
        body,
        span: start..end,
    }))
}

fn parse_do(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `do`
    let body = Box::new(parse_stmt(cur)?);
    cur.expect(TokenKind::While, "`while`")?;
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let cond = parse_expr(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;
    let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
    Ok(Stmt::Do(DoStmt {
        body,
        cond,
        span: start..end,
    }))
}

fn parse_for(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `for`
    cur.expect(TokenKind::LeftParen, "`(`")?;

    let init = if cur.eat(&TokenKind::Semicolon) {
        None
    } else if starts_keyword_type(cur)
        || (matches!(cur.peek(), TokenKind::Ident(_)) && {
            let saved = cur.save();
            let is_decl =
                parse_type_expr(cur).is_ok() && matches!(cur.peek(), TokenKind::Ident(_));
            cur.restore(saved);
            is_decl
        })
    {
        Some(ForInit::Local(parse_local(cur)?))
    } else {
        let e = parse_expr(cur)?;
        cur.expect(TokenKind::Semicolon, "`;`")?;
        Some(ForInit::Expr(e))
    };

    let cond = if cur.peek() == &TokenKind::Semicolon {
        None
    } else {
        Some(parse_expr(cur)?)
    };
    cur.expect(TokenKind::Semicolon, "`;`")?;

    let step = if cur.peek() == &TokenKind::RightParen {
        None
    } else {
        Some(parse_expr(cur)?)
    };
    cur.expect(TokenKind::RightParen, "`)`")?;

    let body = parse_stmt(cur)?;
    let end = body.span().end;
    Ok(Stmt::For(Box::new(ForStmt {
        init,
        cond,
        step,
        body,
        span: start..end,
    })))
}

fn parse_foreach(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `foreach`
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let elem_ty = parse_type_expr(cur)?;
    let name = cur.expect_ident("an element name")?;
    cur.expect(TokenKind::In, "`in`")?;
    let collection = parse_expr(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;
    let body = parse_stmt(cur)?;
    let end = body.span().end;
    Ok(Stmt::Foreach(Box::new(ForeachStmt {
        elem_ty,
        name,
        collection,
        body,
        span: start..end,
    })))
}

fn parse_switch(cur: &mut Cursor) -> PResult<Stmt> {
    let start = cur.bump().span.start; // `switch`
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let scrutinee = parse_expr(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;
    cur.expect(TokenKind::LeftBrace, "`{`")?;

    let mut sections = Vec::new();
    while cur.peek() != &TokenKind::RightBrace {
        if cur.at_eof() {
            return Err(ParseError::new("unterminated switch", cur.span()));
        }
        let sec_start = cur.span().start;
        let mut labels = Vec::new();
        loop {
            match cur.peek() {
                TokenKind::Case => {
                    cur.bump();
                    let e = parse_expr(cur)?;
                    cur.expect(TokenKind::Colon, "`:`")?;
                    labels.push(SwitchLabel::Case(e));
                }
                TokenKind::Default => {
                    let span = cur.bump().span;
                    cur.expect(TokenKind::Colon, "`:`")?;
                    labels.push(SwitchLabel::Default(span));
                }
                _ => break,
            }
        }
        if labels.is_empty() {
            return Err(ParseError::new("expected `case` or `default`", cur.span()));
        }
        let mut body = Vec::new();
        while !matches!(
            cur.peek(),
            TokenKind::Case | TokenKind::Default | TokenKind::RightBrace
        ) {
            if cur.at_eof() {
                return Err(ParseError::new("unterminated switch section", cur.span()));
            }
            body.push(parse_stmt(cur)?);
        }
        let sec_end = cur.prev_span().end;
        sections.push(SwitchSection {
            labels,
            body,
            span: sec_start..sec_end,
        });
    }
    let end = cur.bump().span.end; // `}`
    Ok(Stmt::Switch(SwitchStmt {
        scrutinee,
        sections,
        span: start..end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(src: &str) -> Stmt {
        let toks = tokenize(src);
        let mut cur = Cursor::new(&toks);
        parse_stmt(&mut cur).expect("statement should parse")
    }

    #[test]
    fn local_vs_expr() {
        assert!(matches!(parse("int x;"), Stmt::Local(_)));
        assert!(matches!(parse("Node^ n = take p.next;"), Stmt::Local(_)));
        assert!(matches!(parse("a.b();"), Stmt::Expr(_)));
        assert!(matches!(parse("a[i] = 1;"), Stmt::Expr(_)));
    }

    #[test]
    fn parses_for_with_decl() {
        match parse("for (int i = 0; i < 10; ++i) { }") {
            Stmt::For(f) => {
                assert!(matches!(f.init, Some(ForInit::Local(_))));
                assert!(f.cond.is_some());
                assert!(f.step.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn parses_switch_sections() {
        match parse("switch (x) { case 1: return; case 2: default: break; }") {
            Stmt::Switch(s) => {
                assert_eq!(s.sections.len(), 2);
                assert_eq!(s.sections[1].labels.len(), 2);
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn parses_foreach() {
        assert!(matches!(parse("foreach (Shape s in shapes) { s.Draw(); }"), Stmt::Foreach(_)));
    }
}
