//! Class and member parsing.

use crate::common::{Cursor, PResult, ParseError};
use crate::expr::parse_expr;
use crate::stmt::parse_block;
use crate::tokenizer::TokenKind;
use crate::types::parse_type_expr;
use rye_ast::*;

/// Parses one class declaration.
pub fn parse_class(cur: &mut Cursor) -> PResult<ClassDecl> {
    let start = cur.span().start;
    let mut attrs = ClassAttrs::default();
    loop {
        match cur.peek() {
            TokenKind::Public => {
                cur.bump();
                attrs.is_public = true;
            }
            TokenKind::Abstract => {
                cur.bump();
                attrs.is_abstract = true;
            }
            TokenKind::Extern => {
                cur.bump();
                attrs.is_extern = true;
            }
            _ => break,
        }
    }
    cur.expect(TokenKind::Class, "`class`")?;
    let name = cur.expect_ident("a class name")?;
    let parent = if cur.eat(&TokenKind::Colon) {
        Some(cur.expect_ident("a base class name")?)
    } else {
        None
    };
    cur.expect(TokenKind::LeftBrace, "`{`")?;
    let mut members = Vec::new();
    while cur.peek() != &TokenKind::RightBrace {
        if cur.at_eof() {
            return Err(ParseError::new("unterminated class body", cur.span()));
        }
        members.push(parse_member(cur, &name.name)?);
    }
    let end = cur.bump().span.end; // `}`
    Ok(ClassDecl {
        name,
        parent,
        attrs,
        members,
        span: start..end,
    })
}

fn parse_member_attrs(cur: &mut Cursor) -> MemberAttrs {
    let mut attrs = MemberAttrs::default();
    loop {
        match cur.peek() {
            TokenKind::Public => attrs.access = Access::Public,
            TokenKind::Protected => attrs.access = Access::Protected,
            TokenKind::Private => attrs.access = Access::Private,
            TokenKind::Static => attrs.is_static = true,
            TokenKind::Const => attrs.is_const = true,
            TokenKind::Virtual => attrs.is_virtual = true,
            TokenKind::Abstract => attrs.is_abstract = true,
            TokenKind::Override => attrs.is_override = true,
            _ => return attrs,
        }
        cur.bump();
    }
}

/// Parses one class member. `class_name` distinguishes constructors from
/// methods: a member whose head identifier is the class name followed by
/// `(` is a constructor.
fn parse_member(cur: &mut Cursor, class_name: &str) -> PResult<MemberDecl> {
    let start = cur.span().start;
    let attrs = parse_member_attrs(cur);

    // Constructor: `Name(...)` where Name is the enclosing class.
    if let TokenKind::Ident(head) = cur.peek() {
        if head == class_name && cur.peek2() == &TokenKind::LeftParen {
            return parse_ctor(cur, attrs, start).map(MemberDecl::Ctor);
        }
    }

    let ty = parse_type_expr(cur)?;

    // Indexer: `T this[P p] { get ... set ... }`.
    if cur.peek() == &TokenKind::This {
        cur.bump();
        cur.expect(TokenKind::LeftBracket, "`[`")?;
        let param = parse_param(cur)?;
        cur.expect(TokenKind::RightBracket, "`]`")?;
        let (getter, setter, end) = parse_accessors(cur, &attrs)?;
        return Ok(MemberDecl::Indexer(IndexerDecl {
            attrs,
            ty,
            param,
            getter,
            setter,
            span: start..end,
        }));
    }

    let name = cur.expect_ident("a member name")?;

    match cur.peek() {
        // Method: `T Name(params) body`.
        TokenKind::LeftParen => {
            cur.bump();
            let params = parse_params(cur)?;
            cur.expect(TokenKind::RightParen, "`)`")?;
            let (body, end) = if cur.peek() == &TokenKind::Semicolon {
                (None, cur.bump().span.end)
            } else {
                let b = parse_block(cur)?;
                let end = b.span.end;
                (Some(b), end)
            };
            Ok(MemberDecl::Method(MethodDecl {
                attrs,
                ret: ty,
                name,
                params,
                body,
                span: start..end,
            }))
        }
        // Property: `T Name { get ... set ... }`.
        TokenKind::LeftBrace => {
            let (getter, setter, end) = parse_accessors(cur, &attrs)?;
            Ok(MemberDecl::Property(PropertyDecl {
                attrs,
                ty,
                name,
                getter,
                setter,
                span: start..end,
            }))
        }
        // Field: `T Name;` or `T Name = init;`.
        _ => {
            let init = if cur.eat(&TokenKind::Eq) {
                Some(parse_expr(cur)?)
            } else {
                None
            };
            let end = cur.expect(TokenKind::Semicolon, "`;`")?.end;
            Ok(MemberDecl::Field(FieldDecl {
                attrs,
                ty,
                name,
                init,
                span: start..end,
            }))
        }
    }
}

fn parse_ctor(cur: &mut Cursor, attrs: MemberAttrs, start: usize) -> PResult<CtorDecl> {
    cur.bump(); // class name
    cur.expect(TokenKind::LeftParen, "`(`")?;
    let params = parse_params(cur)?;
    cur.expect(TokenKind::RightParen, "`)`")?;

    let delegate = if cur.eat(&TokenKind::Colon) {
        let dstart = cur.span().start;
        let kind = match cur.peek() {
            TokenKind::This => DelegateKind::This,
            TokenKind::Base => DelegateKind::Base,
            _ => {
                return Err(ParseError::new(
                    "expected `this` or `base` in constructor header",
                    cur.span(),
                ))
            }
        };
        cur.bump();
        cur.expect(TokenKind::LeftParen, "`(`")?;
        let mut args = Vec::new();
        if cur.peek() != &TokenKind::RightParen {
            loop {
                args.push(parse_expr(cur)?);
                if !cur.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let dend = cur.expect(TokenKind::RightParen, "`)`")?.end;
        Some(CtorCall {
            kind,
            args,
            span: dstart..dend,
        })
    } else {
        None
    };

    let body = parse_block(cur)?;
    let end = body.span.end;
    Ok(CtorDecl {
        attrs,
        params,
        delegate,
        body,
        span: start..end,
    })
}

fn parse_params(cur: &mut Cursor) -> PResult<Vec<Param>> {
    let mut params = Vec::new();
    if cur.peek() == &TokenKind::RightParen {
        return Ok(params);
    }
    loop {
        params.push(parse_param(cur)?);
        if !cur.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok(params)
}

fn parse_param(cur: &mut Cursor) -> PResult<Param> {
    let start = cur.span().start;
    let mode = match cur.peek() {
        TokenKind::Ref => {
            cur.bump();
            ParamMode::Ref
        }
        TokenKind::Out => {
            cur.bump();
            ParamMode::Out
        }
        _ => ParamMode::In,
    };
    let ty = parse_type_expr(cur)?;
    let name = cur.expect_ident("a parameter name")?;
    let end = name.span.end;
    Ok(Param {
        mode,
        ty,
        name,
        span: start..end,
    })
}

/// Parses a `{ get ... set ... }` accessor block. Abstract members write
/// `get;` / `set;` without bodies.
fn parse_accessors(
    cur: &mut Cursor,
    attrs: &MemberAttrs,
) -> PResult<(Option<Accessor>, Option<Accessor>, usize)> {
    cur.expect(TokenKind::LeftBrace, "`{`")?;
    let mut getter = None;
    let mut setter = None;
    while cur.peek() != &TokenKind::RightBrace {
        let a_start = cur.span().start;
        let is_get = match cur.peek() {
            TokenKind::Get => true,
            TokenKind::Set => false,
            _ => return Err(ParseError::new("expected `get` or `set`", cur.span())),
        };
        cur.bump();
        let (body, a_end) = if cur.peek() == &TokenKind::Semicolon {
            if !attrs.is_abstract {
                return Err(ParseError::new(
                    "accessor without a body in a non-abstract member",
                    cur.span(),
                ));
            }
            (None, cur.bump().span.end)
        } else {
            let b = parse_block(cur)?;
            let end = b.span.end;
            (Some(b), end)
        };
        let acc = Accessor {
            body,
            span: a_start..a_end,
        };
        if is_get {
            if getter.is_some() {
                return Err(ParseError::new("duplicate `get` accessor", acc.span));
            }
            getter = Some(acc);
        } else {
            if setter.is_some() {
                return Err(ParseError::new("duplicate `set` accessor", acc.span));
            }
            setter = Some(acc);
        }
    }
    let end = cur.bump().span.end; // `}`
    if getter.is_none() && setter.is_none() {
        return Err(ParseError::new("member declares no accessors", end - 1..end));
    }
    Ok((getter, setter, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(src: &str) -> ClassDecl {
        let toks = tokenize(src);
        let mut cur = Cursor::new(&toks);
        parse_class(&mut cur).expect("class should parse")
    }

    #[test]
    fn parses_fields_methods_ctors() {
        let c = parse(
            "class Node {
               Node^ next;
               int value;
               Node(int v) { value = v; }
               string Speak() { return \"node\"; }
             }",
        );
        assert_eq!(c.name.name, "Node");
        assert_eq!(c.members.len(), 4);
        assert!(matches!(c.members[0], MemberDecl::Field(_)));
        assert!(matches!(c.members[2], MemberDecl::Ctor(_)));
        assert!(matches!(c.members[3], MemberDecl::Method(_)));
    }

    #[test]
    fn parses_property_and_indexer() {
        let c = parse(
            "class S {
               int n_;
               int Count { get { return n_; } set { n_ = value; } }
               char this[int i] { get { return 'x'; } }
             }",
        );
        assert!(matches!(c.members[1], MemberDecl::Property(_)));
        assert!(matches!(c.members[2], MemberDecl::Indexer(_)));
    }

    #[test]
    fn parses_ctor_delegation() {
        let c = parse("class A : B { A() : base(1) { } A(int x) : this() { } }");
        match &c.members[0] {
            MemberDecl::Ctor(ct) => {
                assert_eq!(ct.delegate.as_ref().map(|d| d.kind), Some(DelegateKind::Base));
            }
            other => panic!("expected ctor, got {:?}", other),
        }
        assert_eq!(c.parent.as_ref().map(|p| p.name.as_str()), Some("B"));
    }

    #[test]
    fn parses_abstract_method() {
        let c = parse("abstract class A { abstract string Speak(); }");
        assert!(c.attrs.is_abstract);
        match &c.members[0] {
            MemberDecl::Method(m) => {
                assert!(m.attrs.is_abstract);
                assert!(m.body.is_none());
            }
            other => panic!("expected method, got {:?}", other),
        }
    }

    #[test]
    fn parses_ref_out_params() {
        let c = parse("class A { void F(ref int x, out int y) { y = x; } }");
        match &c.members[0] {
            MemberDecl::Method(m) => {
                assert_eq!(m.params[0].mode, ParamMode::Ref);
                assert_eq!(m.params[1].mode, ParamMode::Out);
            }
            other => panic!("expected method, got {:?}", other),
        }
    }
}
