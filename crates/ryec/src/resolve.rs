//! Name resolution: from parsed modules to a populated registry.
//!
//! Three passes over the parsed classes: create class entries, bind parent
//! pointers, then create members with resolved types. Classes without a
//! written parent derive from the root object class; whether they are
//! *emitted* as object subtypes is a separate decision made during
//! checking. Resolution also adds default constructors where absent, links
//! override methods to their declared targets, and discovers `Main`.

use rye_ast as ast;
use rye_ast::{MemberDecl, ParamMode};

use crate::diagnostics::DiagnosticSink;
use crate::sema::{ClassId, MethodId, MethodKind, Program};
use crate::types::Type;

/// Resolves all parsed modules into the program registry. `modules` pairs
/// each parsed module with its file index in the program.
pub fn resolve_program(prog: &mut Program, modules: &[(usize, ast::Module)], sink: &DiagnosticSink) {
    // Pass 1: create classes.
    let mut created: Vec<(ClassId, usize, ast::ClassDecl)> = Vec::new();
    for (file, module) in modules {
        for class in &module.classes {
            if prog.class_by_name(&class.name.name).is_some() {
                report(prog, sink, *file, class.name.span.start,
                       format!("duplicate class `{}`", class.name.name));
                continue;
            }
            let id = prog.add_class(&class.name.name, None);
            let c = &mut prog.classes[id.0 as usize];
            c.is_public = class.attrs.is_public;
            c.is_abstract = class.attrs.is_abstract;
            c.is_extern = class.attrs.is_extern;
            c.file = *file;
            c.span = class.span.clone();
            created.push((id, *file, class.clone()));
        }
    }

    // Pass 2: bind parents. A class without a written parent derives from
    // the root object class.
    for (id, file, class) in &created {
        let parent = match &class.parent {
            Some(pname) => match prog.class_by_name(&pname.name) {
                Some(pid) if pid != *id => Some(pid),
                Some(_) => {
                    report(prog, sink, *file, pname.span.start,
                           format!("class `{}` cannot derive from itself", class.name.name));
                    Some(prog.object_class)
                }
                None => {
                    report(prog, sink, *file, pname.span.start,
                           format!("unknown base class `{}`", pname.name));
                    Some(prog.object_class)
                }
            },
            None => Some(prog.object_class),
        };
        set_parent(prog, *id, parent);
    }

    // Reject inheritance cycles before any chain walking happens.
    for (id, file, class) in &created {
        let mut seen = vec![*id];
        let mut cur = prog.class(*id).parent;
        while let Some(p) = cur {
            if seen.contains(&p) {
                report(prog, sink, *file, class.name.span.start,
                       format!("inheritance cycle through class `{}`", class.name.name));
                set_parent(prog, *id, Some(prog.object_class));
                break;
            }
            seen.push(p);
            cur = prog.class(p).parent;
        }
    }

    // Pass 3: members.
    for (id, file, class) in &created {
        resolve_members(prog, *id, *file, class, sink);
    }

    // Default constructors for classes that declare none.
    for (id, _file, class) in &created {
        let has_ctor = prog.class(*id).methods.iter()
            .any(|&m| prog.method(m).kind == MethodKind::Ctor);
        if !has_ctor && !prog.class(*id).is_extern {
            let mid = prog.add_method(*id, MethodKind::Ctor, &class.name.name.clone(),
                                      &class.name.name.clone(), Type::Void,
                                      class.span.clone(), prog.class(*id).file);
            prog.methods[mid.0 as usize].body_ast = Some(ast::Block {
                stmts: Vec::new(),
                span: class.span.clone(),
            });
        }
    }

    // Override linking.
    for (id, file, _class) in &created {
        link_overrides(prog, *id, *file, sink);
    }

    discover_main(prog, sink);
}

fn report(prog: &Program, sink: &DiagnosticSink, file: usize, offset: usize, msg: String) {
    let line = prog.line_of(file, offset);
    sink.report(&prog.files[file].path, line, msg);
}

fn set_parent(prog: &mut Program, id: ClassId, parent: Option<ClassId>) {
    prog.classes[id.0 as usize].parent = parent;
    if let Some(p) = parent {
        prog.classes[p.0 as usize].subclasses.borrow_mut().push(id);
    }
}

/// Resolves a written type to the lattice. Reports and returns `None` on
/// unknown names and owning wrappers around value types.
pub fn resolve_type(
    prog: &Program,
    ty: &ast::TypeExpr,
    file: usize,
    sink: &DiagnosticSink,
) -> Option<Type> {
    match ty {
        ast::TypeExpr::Name(id) => match id.name.as_str() {
            "bool" => Some(Type::Bool),
            "char" => Some(Type::Char),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "double" => Some(Type::Double),
            "string" => Some(Type::String),
            "object" => Some(Type::Class(prog.object_class)),
            "void" => Some(Type::Void),
            name => match prog.class_by_name(name) {
                Some(cid) => Some(Type::Class(cid)),
                None => {
                    report(prog, sink, file, id.span.start, format!("unknown type `{}`", name));
                    None
                }
            },
        },
        ast::TypeExpr::Array(inner, _) => {
            let elem = resolve_type(prog, inner, file, sink)?;
            if matches!(elem, Type::Void) {
                report(prog, sink, file, ty.span().start, "array of void".to_string());
                return None;
            }
            Some(Type::Array(Box::new(elem)))
        }
        ast::TypeExpr::Own(inner, _) => {
            let base = resolve_type(prog, inner, file, sink)?;
            if base.is_value() || matches!(base, Type::Void) {
                report(prog, sink, file, ty.span().start,
                       "only non-value types can be owning".to_string());
                return None;
            }
            if base.is_own() {
                report(prog, sink, file, ty.span().start,
                       "double owning wrapper".to_string());
                return None;
            }
            Some(Type::Own(Box::new(base)))
        }
    }
}

fn resolve_params(
    prog: &mut Program,
    mid: MethodId,
    params: &[ast::Param],
    file: usize,
    sink: &DiagnosticSink,
) {
    for p in params {
        let ty = resolve_type(prog, &p.ty, file, sink).unwrap_or(Type::Int);
        if p.mode != ParamMode::In {
            if ty.is_own() {
                report(prog, sink, file, p.span.start,
                       "a ref/out parameter cannot be owning; transfer with `take`".to_string());
            } else if !ty.is_value() {
                report(prog, sink, file, p.span.start,
                       "ref/out parameters must be value types".to_string());
            }
        }
        prog.push_param(mid, &p.name.name, ty, p.mode, p.span.clone());
    }
}

fn resolve_members(
    prog: &mut Program,
    id: ClassId,
    file: usize,
    class: &ast::ClassDecl,
    sink: &DiagnosticSink,
) {
    let class_abstract = prog.class(id).is_abstract;
    for member in &class.members {
        match member {
            MemberDecl::Field(f) => {
                let ty = resolve_type(prog, &f.ty, file, sink).unwrap_or(Type::Int);
                if f.attrs.is_const && f.init.is_none() {
                    report(prog, sink, file, f.span.start,
                           format!("const field `{}` needs an initializer", f.name.name));
                }
                prog.add_field(id, &f.name.name, ty, f.attrs.access, f.attrs.is_static,
                               f.attrs.is_const, f.init.clone(), f.span.clone());
            }
            MemberDecl::Method(m) => {
                let ret = resolve_type(prog, &m.ret, file, sink).unwrap_or(Type::Void);
                let mid = prog.add_method(id, MethodKind::Normal, &m.name.name, &m.name.name,
                                          ret, m.span.clone(), file);
                resolve_params(prog, mid, &m.params, file, sink);
                apply_attrs(prog, mid, &m.attrs, class_abstract, m.body.is_some(), file, sink);
                prog.methods[mid.0 as usize].body_ast = m.body.clone();
            }
            MemberDecl::Ctor(c) => {
                let mid = prog.add_method(id, MethodKind::Ctor, &class.name.name,
                                          &class.name.name, Type::Void, c.span.clone(), file);
                resolve_params(prog, mid, &c.params, file, sink);
                prog.methods[mid.0 as usize].access = c.attrs.access;
                prog.methods[mid.0 as usize].body_ast = Some(c.body.clone());
                prog.methods[mid.0 as usize].delegate_ast = c.delegate.clone();
            }
            MemberDecl::Property(p) => {
                let ty = resolve_type(prog, &p.ty, file, sink).unwrap_or(Type::Int);
                if let Some(get) = &p.getter {
                    let mid = prog.add_method(id, MethodKind::PropGet, &p.name.name,
                                              &format!("get_{}", p.name.name),
                                              ty.clone(), get.span.clone(), file);
                    apply_attrs(prog, mid, &p.attrs, class_abstract, get.body.is_some(), file, sink);
                    prog.methods[mid.0 as usize].body_ast = get.body.clone();
                }
                if let Some(set) = &p.setter {
                    let mid = prog.add_method(id, MethodKind::PropSet, &p.name.name,
                                              &format!("set_{}", p.name.name),
                                              Type::Void, set.span.clone(), file);
                    prog.push_param(mid, "value", ty.clone(), ParamMode::In, set.span.clone());
                    apply_attrs(prog, mid, &p.attrs, class_abstract, set.body.is_some(), file, sink);
                    prog.methods[mid.0 as usize].body_ast = set.body.clone();
                }
            }
            MemberDecl::Indexer(ix) => {
                let ty = resolve_type(prog, &ix.ty, file, sink).unwrap_or(Type::Int);
                let key_ty = resolve_type(prog, &ix.param.ty, file, sink).unwrap_or(Type::Int);
                if let Some(get) = &ix.getter {
                    let mid = prog.add_method(id, MethodKind::IndexGet, "this[]", "get_item",
                                              ty.clone(), get.span.clone(), file);
                    prog.push_param(mid, &ix.param.name.name, key_ty.clone(), ParamMode::In,
                                    ix.param.span.clone());
                    apply_attrs(prog, mid, &ix.attrs, class_abstract, get.body.is_some(), file, sink);
                    prog.methods[mid.0 as usize].body_ast = get.body.clone();
                }
                if let Some(set) = &ix.setter {
                    let mid = prog.add_method(id, MethodKind::IndexSet, "this[]", "set_item",
                                              Type::Void, set.span.clone(), file);
                    prog.push_param(mid, &ix.param.name.name, key_ty.clone(), ParamMode::In,
                                    ix.param.span.clone());
                    prog.push_param(mid, "value", ty.clone(), ParamMode::In, set.span.clone());
                    apply_attrs(prog, mid, &ix.attrs, class_abstract, set.body.is_some(), file, sink);
                    prog.methods[mid.0 as usize].body_ast = set.body.clone();
                }
            }
        }
    }
}

fn apply_attrs(
    prog: &mut Program,
    mid: MethodId,
    attrs: &rye_ast::MemberAttrs,
    class_abstract: bool,
    has_body: bool,
    file: usize,
    sink: &DiagnosticSink,
) {
    let span_start = prog.method(mid).span.start;
    let name = prog.method(mid).name.clone();
    let class_extern = prog.class(prog.method(mid).owner).is_extern;
    let m = &mut prog.methods[mid.0 as usize];
    m.access = attrs.access;
    m.is_static = attrs.is_static;
    m.is_abstract = attrs.is_abstract;
    m.is_override = attrs.is_override;
    // Abstract and override members dispatch virtually.
    m.is_virtual = attrs.is_virtual || attrs.is_abstract || attrs.is_override;
    if attrs.is_abstract && !class_abstract {
        report(prog, sink, file, span_start,
               format!("abstract member `{}` in a non-abstract class", name));
    } else if attrs.is_abstract && has_body {
        report(prog, sink, file, span_start,
               format!("abstract member `{}` cannot have a body", name));
    } else if !attrs.is_abstract && !has_body && !class_extern {
        report(prog, sink, file, span_start,
               format!("member `{}` needs a body", name));
    }
}

/// Links every `override` method to the declared method it overrides and
/// records it in the declared method's override list.
fn link_overrides(prog: &mut Program, id: ClassId, file: usize, sink: &DiagnosticSink) {
    let methods = prog.class(id).methods.clone();
    for mid in methods {
        let m = prog.method(mid);
        if !m.is_override {
            continue;
        }
        let parent = match prog.class(id).parent {
            Some(p) => p,
            None => continue,
        };
        let kind = m.kind;
        let name = m.name.clone();
        let params = m.param_types();
        let span_start = m.span.start;

        let mut target = None;
        for cid in prog.ancestry(parent) {
            for &cand in &prog.class(cid).methods {
                let c = prog.method(cand);
                if c.kind == kind && c.name == name && !c.is_override
                    && c.param_types() == params
                {
                    target = Some(cand);
                    break;
                }
            }
            if target.is_some() {
                break;
            }
        }

        match target {
            Some(base) => {
                if !prog.method(base).is_virtual {
                    report(prog, sink, file, span_start,
                           format!("`{}` overrides a non-virtual member", name));
                }
                if prog.method(base).ret != prog.method(mid).ret {
                    report(prog, sink, file, span_start,
                           format!("`{}` changes the return type of the overridden member", name));
                }
                prog.method(mid).overridden.set(Some(base));
                prog.method(base).overrides.borrow_mut().push(mid);
            }
            None => {
                report(prog, sink, file, span_start,
                       format!("`{}` marked override but no base member matches", name));
            }
        }
    }
}

/// Finds the program entry point: exactly one static `Main`, taking either
/// nothing or `string[]`.
fn discover_main(prog: &Program, sink: &DiagnosticSink) {
    let mut found: Option<(MethodId, bool)> = None;
    let mut duplicate = false;
    for m in &prog.methods {
        if m.kind != MethodKind::Normal || m.name != "Main" || !m.is_static {
            continue;
        }
        if prog.class(m.owner).is_extern {
            continue;
        }
        let params = m.param_types();
        let takes_args = match params.as_slice() {
            [] => false,
            [Type::Array(elem)] if **elem == Type::String => true,
            _ => continue,
        };
        if found.is_some() {
            duplicate = true;
            let line = prog.line_of(m.file, m.span.start);
            sink.report(&prog.files[m.file].path, line, "more than one `Main` method");
        } else {
            found = Some((m.id, takes_args));
        }
    }
    if !duplicate {
        prog.main.set(found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::suppress;

    fn resolve_source(src: &str) -> (Program, DiagnosticSink) {
        let _guard = suppress();
        let mut prog = Program::new();
        let sink = DiagnosticSink::new();
        let module = rye_parser::parse_module(src).expect("parse");
        let file = prog.add_file("test.rye".into(), src.into());
        resolve_program(&mut prog, &[(file, module)], &sink);
        (prog, sink)
    }

    #[test]
    fn classes_get_default_parent_and_ctor() {
        let (prog, sink) = resolve_source(
            "class A { static void Main() { } }",
        );
        assert!(sink.is_empty(), "{:?}", sink.take_all());
        let a = prog.class_by_name("A").unwrap();
        assert_eq!(prog.class(a).parent, Some(prog.object_class));
        assert!(prog.class(a).methods.iter()
            .any(|&m| prog.method(m).kind == MethodKind::Ctor));
        assert!(prog.main.get().is_some());
    }

    #[test]
    fn override_links_to_declared_member() {
        let (prog, sink) = resolve_source(
            "abstract class Animal { abstract string Speak(); static void Main() { } }
             class Dog : Animal { override string Speak() { return \"woof\"; } }",
        );
        assert!(sink.is_empty(), "{:?}", sink.take_all());
        let animal = prog.class_by_name("Animal").unwrap();
        let speak = prog.class(animal).methods.iter()
            .map(|&m| prog.method(m))
            .find(|m| m.name == "Speak")
            .unwrap();
        assert_eq!(speak.overrides.borrow().len(), 1);
    }

    #[test]
    fn rejects_owning_ref_param_and_unknown_types() {
        let (_prog, sink) = resolve_source(
            "class A { void F(ref Missing^ x) { } static void Main() { } }",
        );
        assert!(sink.count() >= 1);
    }

    #[test]
    fn rejects_override_without_base() {
        let (_prog, sink) = resolve_source(
            "class A { override int F() { return 1; } static void Main() { } }",
        );
        assert_eq!(sink.count(), 1);
    }
}
