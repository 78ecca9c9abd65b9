//! Whole-program destruction-set analysis.
//!
//! Two sets are computed over the closed set of class types, both with
//! subtyping collapsed into a prefix-free representation: adding a
//! supertype absorbs subtypes already present, adding a subtype of an
//! existing member is a no-op.
//!
//! *Type-destroys(C)* is what destroying one instance of `C` may destroy:
//! `C` itself, the contents of every owning field of `C` and its
//! ancestors, and everything its subclasses destroy, since a destructor
//! call may dispatch at runtime.
//!
//! *Method-destroys(M)* is what executing `M` may destroy: the union of
//! node-level destruction effects over `M`'s CFG and over everything `M`
//! transitively calls, including all overrides of each callee. The search
//! prunes as soon as the set reaches the root object class.
//!
//! Both are marker-based DFS computations, memoized per entity and run
//! lazily after checking completes.

use crate::sema::{ClassId, MethodId, Program};
use crate::types::Type;

/// A prefix-free set of class types.
#[derive(Debug, Clone, Default)]
pub struct TypeSet {
    classes: Vec<ClassId>,
}

impl TypeSet {
    pub fn new() -> TypeSet {
        TypeSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.iter().copied()
    }

    /// True once the set holds the root object class; nothing can grow it.
    pub fn is_top(&self, prog: &Program) -> bool {
        self.classes.contains(&prog.object_class)
    }

    /// Adds a class, keeping the set prefix-free.
    pub fn add(&mut self, prog: &Program, cid: ClassId) {
        for &existing in &self.classes {
            if prog.is_ancestor_or_self(cid, existing) {
                return; // an ancestor (or cid itself) already covers it
            }
        }
        self.classes.retain(|&existing| !prog.is_ancestor_or_self(existing, cid));
        self.classes.push(cid);
    }

    pub fn union(&mut self, prog: &Program, other: &TypeSet) {
        for cid in other.iter() {
            self.add(prog, cid);
        }
    }

    /// True if destroying some member of the set can affect an instance
    /// whose static class is `cid`: related by subtyping either way.
    pub fn intersects(&self, prog: &Program, cid: ClassId) -> bool {
        self.classes.iter().any(|&existing| {
            prog.is_ancestor_or_self(cid, existing) || prog.is_ancestor_or_self(existing, cid)
        })
    }

    /// True if a value of static type `ty` may be destroyed by this set.
    pub fn intersects_type(&self, prog: &Program, ty: &Type) -> bool {
        match ty.strip_own() {
            Type::Class(c) => {
                if *c == prog.object_class {
                    return !self.is_empty();
                }
                self.intersects(prog, *c)
            }
            Type::String => self.intersects(prog, prog.string_class),
            Type::Array(_) => self.intersects(prog, prog.array_class),
            _ => false,
        }
    }

    pub fn display(&self, prog: &Program) -> String {
        let mut names: Vec<&str> = self
            .classes
            .iter()
            .map(|&c| prog.class(c).name.as_str())
            .collect();
        names.sort_unstable();
        format!("{{{}}}", names.join(", "))
    }
}

/// The destruction contribution of a storage location of type `ty`:
/// owning locations destroy their contents, strings release an instance.
pub fn var_destroys(prog: &Program, ty: &Type) -> TypeSet {
    let mut set = TypeSet::new();
    add_var_destroys(prog, ty, &mut set);
    set
}

fn add_var_destroys(prog: &Program, ty: &Type, set: &mut TypeSet) {
    match ty {
        Type::Own(inner) => match &**inner {
            Type::Class(c) => set.union(prog, &type_destroys(prog, *c)),
            Type::Array(elem) => {
                set.add(prog, prog.array_class);
                add_elem_destroys(prog, elem, set);
            }
            _ => {}
        },
        Type::String => set.add(prog, prog.string_class),
        _ => {}
    }
}

fn add_elem_destroys(prog: &Program, elem: &Type, set: &mut TypeSet) {
    match elem {
        Type::Own(_) => add_var_destroys(prog, elem, set),
        Type::String => set.add(prog, prog.string_class),
        Type::Array(inner) => {
            set.add(prog, prog.array_class);
            add_elem_destroys(prog, inner, set);
        }
        _ => {}
    }
}

/// The set of types possibly destroyed when one instance of `cid` is
/// destroyed. Memoized on the class.
pub fn type_destroys(prog: &Program, cid: ClassId) -> TypeSet {
    if let Some(memo) = prog.class(cid).type_destroys.borrow().as_ref() {
        return memo.clone();
    }

    let mut set = TypeSet::new();

    // Destroying a pool destroys whatever was allocated in it.
    if cid == prog.pool_class {
        set.add(prog, prog.object_class);
        prog.class(cid).type_destroys.replace(Some(set.clone()));
        return set;
    }

    let mark = prog.next_mark();
    let mut stack = vec![cid];
    while let Some(d) = stack.pop() {
        let class = prog.class(d);
        if class.mark.get() == mark {
            continue;
        }
        class.mark.set(mark);
        set.add(prog, d);
        if set.is_top(prog) {
            break;
        }

        // Owning fields of the class and all its ancestors.
        for anc in prog.ancestry(d) {
            for &fid in &prog.class(anc).fields {
                let field = prog.field(fid);
                if field.is_static || field.is_const {
                    continue;
                }
                match &field.ty {
                    Type::Own(inner) => match &**inner {
                        Type::Class(c) => stack.push(*c),
                        Type::Array(elem) => {
                            set.add(prog, prog.array_class);
                            add_elem_destroys(prog, elem, &mut set);
                        }
                        _ => {}
                    },
                    Type::String => set.add(prog, prog.string_class),
                    _ => {}
                }
            }
        }

        // A destructor call on `d` may dispatch to any subclass.
        for &sub in prog.class(d).subclasses.borrow().iter() {
            stack.push(sub);
        }
    }

    prog.class(cid).type_destroys.replace(Some(set.clone()));
    set
}

/// The set of types `mid`'s execution may destroy. Memoized on the method.
pub fn method_destroys(prog: &Program, mid: MethodId) -> TypeSet {
    if let Some(memo) = prog.method(mid).destroys.borrow().as_ref() {
        return memo.clone();
    }

    let mut set = TypeSet::new();
    let mark = prog.next_mark();
    let mut stack = vec![mid];
    while let Some(m) = stack.pop() {
        let method = prog.method(m);
        if method.mark.get() == mark {
            continue;
        }
        method.mark.set(mark);

        // A completed callee's memo is final; use it and prune the walk.
        if m != mid {
            if let Some(memo) = method.destroys.borrow().as_ref() {
                set.union(prog, memo);
                if set.is_top(prog) {
                    break;
                }
                continue;
            }
        }

        if let Some(cfg) = method.cfg.borrow().as_ref() {
            for node in &cfg.nodes {
                for ty in &node.destroys {
                    add_var_destroys(prog, ty, &mut set);
                }
                if let Some(callee) = node.call {
                    stack.push(callee);
                    for &over in prog.method(callee).overrides.borrow().iter() {
                        stack.push(over);
                    }
                }
            }
        }
        if set.is_top(prog) {
            break;
        }
    }

    prog.method(mid).destroys.replace(Some(set.clone()));
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_free_collapse() {
        let mut prog = Program::new();
        let animal = prog.add_class("Animal", Some(prog.object_class));
        let dog = prog.add_class("Dog", Some(animal));
        let mut set = TypeSet::new();
        set.add(&prog, dog);
        assert!(set.intersects(&prog, animal));
        // Adding the supertype absorbs the subtype.
        set.add(&prog, animal);
        assert_eq!(set.iter().count(), 1);
        // Adding a subtype of a member is a no-op.
        set.add(&prog, dog);
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn top_absorbs_everything() {
        let mut prog = Program::new();
        let a = prog.add_class("A", Some(prog.object_class));
        let mut set = TypeSet::new();
        set.add(&prog, prog.object_class);
        assert!(set.is_top(&prog));
        set.add(&prog, a);
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn type_destroys_follows_owning_fields_and_subclasses() {
        let mut prog = Program::new();
        let node = prog.add_class("Node", Some(prog.object_class));
        let leaf = prog.add_class("Leaf", Some(node));
        let extra = prog.add_class("Extra", Some(prog.object_class));
        // Node { Node^ next; }  Leaf : Node { Extra^ e; }
        prog.add_field(node, "next", Type::Own(Box::new(Type::Class(node))),
                       rye_ast::Access::Private, false, false, None, 0..0);
        prog.add_field(leaf, "e", Type::Own(Box::new(Type::Class(extra))),
                       rye_ast::Access::Private, false, false, None, 0..0);
        let set = type_destroys(&prog, node);
        assert!(set.intersects(&prog, node));
        assert!(set.intersects(&prog, leaf));
        // Reached through Leaf's destructor dispatch.
        assert!(set.intersects(&prog, extra));
        let set2 = type_destroys(&prog, extra);
        assert!(!set2.intersects(&prog, node));
    }

    #[test]
    fn pool_destruction_is_top() {
        let prog = Program::new();
        let set = type_destroys(&prog, prog.pool_class);
        assert!(set.is_top(&prog));
    }
}
