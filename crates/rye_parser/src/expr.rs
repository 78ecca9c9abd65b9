//! Expression parsing.
//!
//! Classic precedence-layered recursive descent. The only speculative spot
//! is the C-style cast: `(T)x` is committed as a cast when the parenthesized
//! tokens parse as a type and the decision rules below say the result can
//! only be a cast.

use crate::common::{Cursor, PResult, ParseError};
use crate::tokenizer::TokenKind;
use crate::types::{parse_type_expr, parse_type_name, starts_keyword_type};
use rye_ast::*;

/// Parses a full expression (assignment level).
pub fn parse_expr(cur: &mut Cursor) -> PResult<Expr> {
    parse_assign(cur)
}

fn parse_assign(cur: &mut Cursor) -> PResult<Expr> {
    let left = parse_cond(cur)?;
    let op = match cur.peek() {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        _ => return Ok(left),
    };
    cur.bump();
    let value = parse_assign(cur)?;
    let span = left.span().start..value.span().end;
    Ok(Expr::Assign(AssignExpr {
        op,
        target: Box::new(left),
        value: Box::new(value),
        span,
    }))
}

fn parse_cond(cur: &mut Cursor) -> PResult<Expr> {
    let cond = parse_or(cur)?;
    if !cur.eat(&TokenKind::Question) {
        return Ok(cond);
    }
    let then_expr = parse_expr(cur)?;
    cur.expect(TokenKind::Colon, "`:`")?;
    let else_expr = parse_cond(cur)?;
    let span = cond.span().start..else_expr.span().end;
    Ok(Expr::Cond(CondExpr {
        cond: Box::new(cond),
        then_expr: Box::new(then_expr),
        else_expr: Box::new(else_expr),
        span,
    }))
}

fn parse_or(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_and(cur)?;
    while cur.eat(&TokenKind::OrOr) {
        let right = parse_and(cur)?;
        left = binary(BinaryOp::Or, left, right);
    }
    Ok(left)
}

fn parse_and(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_equality(cur)?;
    while cur.eat(&TokenKind::AndAnd) {
        let right = parse_equality(cur)?;
        left = binary(BinaryOp::And, left, right);
    }
    Ok(left)
}

fn parse_equality(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_relational(cur)?;
    loop {
        let op = match cur.peek() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            _ => break,
        };
        cur.bump();
        let right = parse_relational(cur)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

fn parse_relational(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_additive(cur)?;
    loop {
        let op = match cur.peek() {
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::Ge,
            _ => break,
        };
        cur.bump();
        let right = parse_additive(cur)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

fn parse_additive(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_multiplicative(cur)?;
    loop {
        let op = match cur.peek() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        cur.bump();
        let right = parse_multiplicative(cur)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

fn parse_multiplicative(cur: &mut Cursor) -> PResult<Expr> {
    let mut left = parse_unary(cur)?;
    loop {
        let op = match cur.peek() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Rem,
            _ => break,
        };
        cur.bump();
        let right = parse_unary(cur)?;
        left = binary(op, left, right);
    }
    Ok(left)
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span().start..right.span().end;
    Expr::Binary(BinaryExpr {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    })
}

fn parse_unary(cur: &mut Cursor) -> PResult<Expr> {
    let start = cur.span().start;
    match cur.peek() {
        TokenKind::Minus => {
            cur.bump();
            let operand = parse_unary(cur)?;
            let span = start..operand.span().end;
            Ok(Expr::Unary(UnaryExpr {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            }))
        }
        TokenKind::Not => {
            cur.bump();
            let operand = parse_unary(cur)?;
            let span = start..operand.span().end;
            Ok(Expr::Unary(UnaryExpr {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            }))
        }
        TokenKind::PlusPlus | TokenKind::MinusMinus => {
            let op = if cur.peek() == &TokenKind::PlusPlus {
                IncrOp::Inc
            } else {
                IncrOp::Dec
            };
            cur.bump();
            let operand = parse_unary(cur)?;
            let span = start..operand.span().end;
            Ok(Expr::Incr(IncrExpr {
                op,
                prefix: true,
                operand: Box::new(operand),
                span,
            }))
        }
        TokenKind::Take => {
            cur.bump();
            let operand = parse_unary(cur)?;
            let span = start..operand.span().end;
            Ok(Expr::Take(TakeExpr {
                operand: Box::new(operand),
                span,
            }))
        }
        TokenKind::LeftParen => {
            if let Some(expr) = try_parse_cast(cur)? {
                Ok(expr)
            } else {
                parse_postfix(cur)
            }
        }
        _ => parse_postfix(cur),
    }
}

/// Attempts to parse `(T)operand` as a cast. Commits when the parenthesized
/// tokens form a type and either the base is a keyword type, the type has
/// `^`/`[]` suffixes, or the token after `)` can only begin an operand
/// (identifier, `this`, `base`, `new`, `take`). Otherwise rewinds and lets
/// the parenthesized-expression path handle it.
fn try_parse_cast(cur: &mut Cursor) -> PResult<Option<Expr>> {
    let saved = cur.save();
    let start = cur.span().start;

    cur.bump(); // `(`
    let kw = starts_keyword_type(cur);
    let ty = match parse_type_expr(cur) {
        Ok(ty) => ty,
        Err(_) => {
            cur.restore(saved);
            return Ok(None);
        }
    };
    if cur.peek() != &TokenKind::RightParen {
        cur.restore(saved);
        return Ok(None);
    }
    let suffixed = !matches!(ty, TypeExpr::Name(_));
    let next_is_operand = matches!(
        cur.peek2(),
        TokenKind::Ident(_) | TokenKind::This | TokenKind::Base | TokenKind::New | TokenKind::Take
    ) || (kw && cur.peek2() == &TokenKind::LeftParen);
    if !(kw || suffixed) && !next_is_operand {
        cur.restore(saved);
        return Ok(None);
    }

    cur.bump(); // `)`
    let operand = parse_unary(cur)?;
    let span = start..operand.span().end;
    Ok(Some(Expr::Cast(CastExpr {
        ty,
        operand: Box::new(operand),
        span,
    })))
}

fn parse_postfix(cur: &mut Cursor) -> PResult<Expr> {
    let mut expr = parse_primary(cur)?;
    loop {
        match cur.peek() {
            TokenKind::Dot => {
                cur.bump();
                let name = cur.expect_ident("a member name")?;
                let span = expr.span().start..name.span.end;
                expr = Expr::Member(MemberExpr {
                    obj: Box::new(expr),
                    name,
                    span,
                });
            }
            TokenKind::LeftBracket => {
                cur.bump();
                let index = parse_expr(cur)?;
                let end = cur.expect(TokenKind::RightBracket, "`]`")?.end;
                let span = expr.span().start..end;
                expr = Expr::Index(IndexExpr {
                    obj: Box::new(expr),
                    index: Box::new(index),
                    span,
                });
            }
            TokenKind::LeftParen => {
                // Only names and member accesses are callable.
                if !matches!(expr, Expr::Name(_) | Expr::Member(_)) {
                    return Err(ParseError::new("this expression is not callable", cur.span()));
                }
                cur.bump();
                let args = parse_args(cur)?;
                let end = cur.expect(TokenKind::RightParen, "`)`")?.end;
                let span = expr.span().start..end;
                expr = Expr::Call(CallExpr {
                    callee: Box::new(expr),
                    args,
                    span,
                });
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if cur.peek() == &TokenKind::PlusPlus {
                    IncrOp::Inc
                } else {
                    IncrOp::Dec
                };
                let end = cur.bump().span.end;
                let span = expr.span().start..end;
                expr = Expr::Incr(IncrExpr {
                    op,
                    prefix: false,
                    operand: Box::new(expr),
                    span,
                });
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_args(cur: &mut Cursor) -> PResult<Vec<Expr>> {
    let mut args = Vec::new();
    if cur.peek() == &TokenKind::RightParen {
        return Ok(args);
    }
    loop {
        args.push(parse_expr(cur)?);
        if !cur.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(args)
}

fn parse_primary(cur: &mut Cursor) -> PResult<Expr> {
    let span = cur.span();
    match cur.peek().clone() {
        TokenKind::IntLit(v) => {
            cur.bump();
            Ok(Expr::Lit(Lit::Int(v), span))
        }
        TokenKind::FloatLit(v) => {
            cur.bump();
            Ok(Expr::Lit(Lit::Float(v), span))
        }
        TokenKind::DoubleLit(v) => {
            cur.bump();
            Ok(Expr::Lit(Lit::Double(v), span))
        }
        TokenKind::CharLit(v) => {
            cur.bump();
            Ok(Expr::Lit(Lit::Char(v), span))
        }
        TokenKind::StrLit(s) => {
            cur.bump();
            Ok(Expr::Lit(Lit::Str(s), span))
        }
        TokenKind::True => {
            cur.bump();
            Ok(Expr::Lit(Lit::Bool(true), span))
        }
        TokenKind::False => {
            cur.bump();
            Ok(Expr::Lit(Lit::Bool(false), span))
        }
        TokenKind::Null => {
            cur.bump();
            Ok(Expr::Lit(Lit::Null, span))
        }
        TokenKind::This => {
            cur.bump();
            Ok(Expr::This(span))
        }
        TokenKind::Base => {
            cur.bump();
            Ok(Expr::Base(span))
        }
        TokenKind::Ident(name) => {
            cur.bump();
            Ok(Expr::Name(Ident { name, span }))
        }
        TokenKind::New => parse_new(cur),
        TokenKind::LeftParen => {
            let start = cur.bump().span.start;
            let inner = parse_expr(cur)?;
            let end = cur.expect(TokenKind::RightParen, "`)`")?.end;
            Ok(Expr::Paren(Box::new(inner), start..end))
        }
        _ => Err(ParseError::new("expected an expression", span)),
    }
}

/// Parses `new C(args)`, `new(pool) C(args)`, and `new T[len]`.
fn parse_new(cur: &mut Cursor) -> PResult<Expr> {
    let start = cur.bump().span.start; // `new`

    let pool = if cur.peek() == &TokenKind::LeftParen {
        cur.bump();
        let pool = parse_expr(cur)?;
        cur.expect(TokenKind::RightParen, "`)` after pool argument")?;
        Some(Box::new(pool))
    } else {
        None
    };

    let name = parse_type_name(cur)?;

    // Element-type suffixes before `[` make this an array allocation:
    // `new Node^[n]` allocates an array of owning pointers.
    let mut elem_ty = TypeExpr::Name(name.clone());
    while cur.peek() == &TokenKind::Caret {
        let end = cur.bump().span.end;
        elem_ty = TypeExpr::Own(Box::new(elem_ty), name.span.start..end);
    }

    if cur.peek() == &TokenKind::LeftBracket {
        if pool.is_some() {
            return Err(ParseError::new("arrays cannot be pool-allocated", cur.span()));
        }
        cur.bump();
        let len = parse_expr(cur)?;
        let end = cur.expect(TokenKind::RightBracket, "`]`")?.end;
        return Ok(Expr::NewArray(NewArrayExpr {
            elem_ty,
            len: Box::new(len),
            span: start..end,
        }));
    }

    if !matches!(elem_ty, TypeExpr::Name(_)) {
        return Err(ParseError::new(
            "`new` constructs an owning value; drop the `^`",
            name.span.clone(),
        ));
    }

    cur.expect(TokenKind::LeftParen, "`(` after class name")?;
    let args = parse_args(cur)?;
    let end = cur.expect(TokenKind::RightParen, "`)`")?.end;
    Ok(Expr::New(NewExpr {
        pool,
        class: name,
        args,
        span: start..end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(src: &str) -> Expr {
        let toks = tokenize(src);
        let mut cur = Cursor::new(&toks);
        parse_expr(&mut cur).expect("expression should parse")
    }

    #[test]
    fn precedence_mul_over_add() {
        match parse("1 + 2 * 3") {
            Expr::Binary(b) => {
                assert_eq!(b.op, BinaryOp::Add);
                assert!(matches!(*b.right, Expr::Binary(ref r) if r.op == BinaryOp::Mul));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn parses_take_of_member() {
        match parse("take list.head") {
            Expr::Take(t) => assert!(matches!(*t.operand, Expr::Member(_))),
            other => panic!("expected take, got {:?}", other),
        }
    }

    #[test]
    fn parses_pool_new() {
        match parse("new(p) Node(1)") {
            Expr::New(n) => {
                assert!(n.pool.is_some());
                assert_eq!(n.class.name, "Node");
                assert_eq!(n.args.len(), 1);
            }
            other => panic!("expected new, got {:?}", other),
        }
    }

    #[test]
    fn parses_array_new() {
        match parse("new Node^[8]") {
            Expr::NewArray(n) => assert!(matches!(n.elem_ty, TypeExpr::Own(_, _))),
            other => panic!("expected array new, got {:?}", other),
        }
    }

    #[test]
    fn cast_vs_paren() {
        assert!(matches!(parse("(int)x"), Expr::Cast(_)));
        assert!(matches!(parse("(Dog)a"), Expr::Cast(_)));
        // A parenthesized operand followed by an operator stays arithmetic.
        match parse("(a) - b") {
            Expr::Binary(b) => assert_eq!(b.op, BinaryOp::Sub),
            other => panic!("expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        match parse("a = b = c") {
            Expr::Assign(a) => assert!(matches!(*a.value, Expr::Assign(_))),
            other => panic!("expected assignment, got {:?}", other),
        }
    }
}
