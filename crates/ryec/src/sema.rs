//! Class registry and member tables.
//!
//! The registry is the compiler's central data structure: every class,
//! field, method, and parameter ends up here, addressed by small integer
//! ids. Classes are created by the declare pass, members by the resolve
//! pass; checking then fills in method bodies, CFGs, and locals. Analyses
//! and emission only read.
//!
//! Interior mutability (`Cell`/`RefCell`) is used for everything written
//! after construction: the derived class flags, memoized destruction sets,
//! DFS markers, and per-method check results. The compiler is single
//! threaded throughout, so this is purely a convenience for shared access.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use rye_ast::{Access, ParamMode, Span};

use crate::cfg::{Cfg, NodeId};
use crate::destroy::TypeSet;
use crate::hir;
use crate::types::{can_convert, ConvCtx, Type};

/// Identifies a class in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

/// Identifies a method (including constructors and accessors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u32);

/// Identifies a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(pub u32);

/// Identifies a local or parameter within its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

/// What flavor of callable a `Method` is. Properties and indexers are
/// lowered to accessor-method shells that share the member name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Normal,
    Ctor,
    PropGet,
    PropSet,
    IndexGet,
    IndexSet,
}

/// A class in the registry.
#[derive(Debug)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    /// Semantic parent. `None` only for the root object class and for
    /// built-ins that sit outside the object hierarchy (the pool).
    pub parent: Option<ClassId>,
    pub subclasses: RefCell<Vec<ClassId>>,
    pub is_public: bool,
    pub is_abstract: bool,
    pub is_extern: bool,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    /// Set during checking: the class needs RTTI / a virtual destructor.
    pub virtual_needed: Cell<bool>,
    /// Set during checking: the class must be laid out as a subtype of the
    /// root object class in emitted code.
    pub object_inheritance_needed: Cell<bool>,
    /// Set during checking: instances participate in two-pass pool
    /// destruction.
    pub pool_destroy_needed: Cell<bool>,
    /// Memoized destruction set for one instance of this class.
    pub type_destroys: RefCell<Option<TypeSet>>,
    pub mark: Cell<u32>,
    pub file: usize,
    pub span: Span,
}

/// A field in the registry.
#[derive(Debug)]
pub struct Field {
    pub id: FieldId,
    pub owner: ClassId,
    pub name: String,
    pub ty: Type,
    pub access: Access,
    pub is_static: bool,
    pub is_const: bool,
    pub init_ast: Option<rye_ast::Expr>,
    pub init: RefCell<Option<hir::Expr>>,
    pub span: Span,
}

/// A local variable or parameter of a method.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub ty: Type,
    pub mode: ParamMode,
    pub is_param: bool,
    /// Written after initialization.
    pub mutable: Cell<bool>,
    /// Set by the reference-count necessity analysis.
    pub needs_ref: Cell<bool>,
    /// CFG nodes that assign this local.
    pub assigns: RefCell<Vec<NodeId>>,
    /// CFG points at which this local is read, with the source span of the
    /// read for diagnostics.
    pub uses: RefCell<Vec<(NodeId, Span)>>,
    pub span: Span,
}

/// A guarded expression value: an owning or borrowed reference captured at
/// `start` and consumed at `end`. The reference-count analysis decides
/// whether emission must wrap it in a counting handle.
#[derive(Debug)]
pub struct Guard {
    pub start: NodeId,
    pub end: Cell<NodeId>,
    pub local: Option<LocalId>,
    pub ty: Type,
    pub needs_ref: Cell<bool>,
}

/// Identifies a guard within its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardId(pub u32);

/// A method, constructor, or accessor in the registry.
#[derive(Debug)]
pub struct Method {
    pub id: MethodId,
    pub owner: ClassId,
    pub kind: MethodKind,
    pub name: String,
    /// Spelling used in emitted C++ (`get_Count`, `set_item`, ...).
    pub cpp_name: String,
    pub access: Access,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_override: bool,
    pub ret: Type,
    pub param_count: usize,
    /// Locals; the first `param_count` entries are the parameters.
    pub locals: RefCell<Vec<Local>>,
    /// Methods that directly override this one.
    pub overrides: RefCell<Vec<MethodId>>,
    /// The declared method this one overrides, if any.
    pub overridden: Cell<Option<MethodId>>,
    /// Source body; `None` for extern and abstract methods.
    pub body_ast: Option<rye_ast::Block>,
    /// Constructor delegation header, if any.
    pub delegate_ast: Option<rye_ast::CtorCall>,
    /// This constructor's initialization logic must also be callable as an
    /// ordinary method (a subclass delegates into it).
    pub needs_forwarder: Cell<bool>,
    pub cfg: RefCell<Option<Cfg>>,
    pub body: RefCell<Option<hir::Block>>,
    pub guards: RefCell<Vec<Guard>>,
    /// Memoized destruction set of this method's execution.
    pub destroys: RefCell<Option<TypeSet>>,
    pub mark: Cell<u32>,
    pub file: usize,
    pub span: Span,
}

impl Method {
    /// Parameter types, cloned out of the locals table.
    pub fn param_types(&self) -> Vec<Type> {
        self.locals.borrow()[..self.param_count]
            .iter()
            .map(|l| l.ty.clone())
            .collect()
    }

    /// Parameter modes.
    pub fn param_modes(&self) -> Vec<ParamMode> {
        self.locals.borrow()[..self.param_count]
            .iter()
            .map(|l| l.mode)
            .collect()
    }
}

/// A source file registered with the program, for line computation.
#[derive(Debug)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

/// The whole-program registry.
pub struct Program {
    pub classes: Vec<Class>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub files: Vec<SourceFile>,
    class_names: HashMap<String, ClassId>,
    /// Monotonic marker for DFS traversals over classes, methods, and CFG
    /// nodes. Bumped once per traversal; never reset.
    pub marker: Cell<u32>,
    pub object_class: ClassId,
    pub string_class: ClassId,
    pub array_class: ClassId,
    pub pool_class: ClassId,
    /// The discovered entry point and whether it takes `string[]` args.
    pub main: Cell<Option<(MethodId, bool)>>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    /// Creates a program with the built-in classes registered.
    pub fn new() -> Self {
        let mut prog = Program {
            classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            files: Vec::new(),
            class_names: HashMap::new(),
            marker: Cell::new(0),
            object_class: ClassId(0),
            string_class: ClassId(0),
            array_class: ClassId(0),
            pool_class: ClassId(0),
            main: Cell::new(None),
        };
        crate::builtins::register(&mut prog);
        prog
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0 as usize]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    /// Bumps and returns the global traversal marker.
    pub fn next_mark(&self) -> u32 {
        let m = self.marker.get() + 1;
        self.marker.set(m);
        m
    }

    /// Registers a source file, returning its index.
    pub fn add_file(&mut self, path: String, text: String) -> usize {
        self.files.push(SourceFile { path, text });
        self.files.len() - 1
    }

    /// 1-based line number of a byte offset in a registered file.
    pub fn line_of(&self, file: usize, offset: usize) -> u32 {
        let text = &self.files[file].text;
        let mut line = 1u32;
        for (i, b) in text.bytes().enumerate() {
            if i >= offset {
                break;
            }
            if b == b'\n' {
                line += 1;
            }
        }
        line
    }

    /// Creates a class and links it to its parent.
    pub fn add_class(&mut self, name: &str, parent: Option<ClassId>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            id,
            name: name.to_string(),
            parent,
            subclasses: RefCell::new(Vec::new()),
            is_public: false,
            is_abstract: false,
            is_extern: false,
            fields: Vec::new(),
            methods: Vec::new(),
            virtual_needed: Cell::new(false),
            object_inheritance_needed: Cell::new(false),
            pool_destroy_needed: Cell::new(false),
            type_destroys: RefCell::new(None),
            mark: Cell::new(0),
            file: 0,
            span: 0..0,
        });
        if let Some(p) = parent {
            self.classes[p.0 as usize].subclasses.borrow_mut().push(id);
        }
        self.class_names.insert(name.to_string(), id);
        id
    }

    /// Creates a field on a class.
    #[allow(clippy::too_many_arguments)]
    pub fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: Type,
        access: Access,
        is_static: bool,
        is_const: bool,
        init_ast: Option<rye_ast::Expr>,
        span: Span,
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(Field {
            id,
            owner,
            name: name.to_string(),
            ty,
            access,
            is_static,
            is_const,
            init_ast,
            init: RefCell::new(None),
            span,
        });
        self.classes[owner.0 as usize].fields.push(id);
        id
    }

    /// Creates a method shell on a class. Parameters are appended to the
    /// locals table by the caller via `push_param`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_method(
        &mut self,
        owner: ClassId,
        kind: MethodKind,
        name: &str,
        cpp_name: &str,
        ret: Type,
        span: Span,
        file: usize,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(Method {
            id,
            owner,
            kind,
            name: name.to_string(),
            cpp_name: cpp_name.to_string(),
            access: Access::Public,
            is_static: false,
            is_virtual: false,
            is_abstract: false,
            is_override: false,
            ret,
            param_count: 0,
            locals: RefCell::new(Vec::new()),
            overrides: RefCell::new(Vec::new()),
            overridden: Cell::new(None),
            body_ast: None,
            delegate_ast: None,
            needs_forwarder: Cell::new(false),
            cfg: RefCell::new(None),
            body: RefCell::new(None),
            guards: RefCell::new(Vec::new()),
            destroys: RefCell::new(None),
            mark: Cell::new(0),
            file,
            span,
        });
        self.classes[owner.0 as usize].methods.push(id);
        id
    }

    /// Appends a parameter local to a method.
    pub fn push_param(&mut self, method: MethodId, name: &str, ty: Type, mode: ParamMode, span: Span) {
        let m = &mut self.methods[method.0 as usize];
        m.locals.get_mut().push(Local {
            name: name.to_string(),
            ty,
            mode,
            is_param: true,
            mutable: Cell::new(mode != ParamMode::In),
            needs_ref: Cell::new(false),
            assigns: RefCell::new(Vec::new()),
            uses: RefCell::new(Vec::new()),
            span,
        });
        m.param_count += 1;
    }

    /// True if `ancestor` is `class` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut cur = Some(class);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.class(id).parent;
        }
        false
    }

    /// Iterates the inheritance chain from `class` to the root.
    pub fn ancestry(&self, class: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut cur = Some(class);
        while let Some(id) = cur {
            chain.push(id);
            cur = self.class(id).parent;
        }
        chain
    }
}

/// Failure modes of member resolution, used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    Ambiguous,
    /// The best candidate is inaccessible from the caller.
    Inaccessible(MethodId),
    /// The best candidate's parameters don't match the arguments.
    Mismatch(MethodId),
}

/// Whether `member_access` on `owner` is visible from `from` (the class
/// whose body contains the reference; `None` for free contexts).
fn accessible(prog: &Program, owner: ClassId, access: Access, from: Option<ClassId>) -> bool {
    match access {
        Access::Public => true,
        Access::Private => from == Some(owner),
        Access::Protected => match from {
            Some(f) => prog.is_ancestor_or_self(f, owner),
            None => false,
        },
    }
}

/// Finds a field by name along the inheritance chain.
pub fn find_field(prog: &Program, class: ClassId, name: &str) -> Option<FieldId> {
    for cid in prog.ancestry(class) {
        for &fid in &prog.class(cid).fields {
            if prog.field(fid).name == name {
                return Some(fid);
            }
        }
    }
    None
}

/// Number of argument positions that fail to convert, plus any arity
/// difference. Ref/out parameters demand an exact type match.
fn mismatches(prog: &Program, method: &Method, args: &[Type]) -> u32 {
    let locals = method.locals.borrow();
    let params = &locals[..method.param_count];
    let mut n = (params.len() as i64 - args.len() as i64).unsigned_abs() as u32;
    for (param, arg) in params.iter().zip(args.iter()) {
        let ok = match param.mode {
            ParamMode::In => can_convert(prog, arg, &param.ty, ConvCtx::MethodArg, false, false),
            ParamMode::Ref | ParamMode::Out => *arg == param.ty,
        };
        if !ok {
            n += 1;
        }
    }
    n
}

/// Resolves a call to `name` on `class` with the given argument types.
///
/// Candidates are gathered level by level along the inheritance chain.
/// Each candidate scores `100` if inaccessible plus one per argument
/// mismatch; the lowest unique score wins. Two perfect candidates at the
/// same depth are ambiguous, and the search stops at the first depth that
/// produces a unique perfect candidate. Overriding methods are skipped
/// unless `include_overrides` is set: resolution always targets the
/// declared member.
pub fn resolve_call(
    prog: &Program,
    class: ClassId,
    kind: MethodKind,
    name: &str,
    args: &[Type],
    from: Option<ClassId>,
    include_overrides: bool,
) -> Result<MethodId, LookupError> {
    let mut best: Option<(u32, MethodId)> = None;

    for cid in prog.ancestry(class) {
        let mut perfect_here: Option<MethodId> = None;
        let mut perfect_dup = false;
        for &mid in &prog.class(cid).methods {
            let m = prog.method(mid);
            if m.kind != kind || m.name != name {
                continue;
            }
            if m.is_override && !include_overrides {
                continue;
            }
            // Private members are invisible outside their class rather
            // than merely inaccessible.
            if m.access == Access::Private && from != Some(cid) {
                continue;
            }
            let mut score = mismatches(prog, m, args);
            if !accessible(prog, cid, m.access, from) {
                score += 100;
            }
            if score == 0 {
                if perfect_here.is_some() {
                    perfect_dup = true;
                } else {
                    perfect_here = Some(mid);
                }
            }
            match best {
                Some((s, _)) if s <= score => {}
                _ => best = Some((score, mid)),
            }
        }
        if perfect_dup {
            return Err(LookupError::Ambiguous);
        }
        if let Some(mid) = perfect_here {
            return Ok(mid);
        }
    }

    match best {
        Some((score, mid)) if score == 0 => Ok(mid),
        Some((score, mid)) => {
            if score >= 100 {
                Err(LookupError::Inaccessible(mid))
            } else {
                Err(LookupError::Mismatch(mid))
            }
        }
        None => Err(LookupError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_with_params(prog: &mut Program, class: ClassId, name: &str, params: &[Type]) -> MethodId {
        let mid = prog.add_method(class, MethodKind::Normal, name, name, Type::Void, 0..0, 0);
        for (i, ty) in params.iter().enumerate() {
            prog.push_param(mid, &format!("p{}", i), ty.clone(), ParamMode::In, 0..0);
        }
        mid
    }

    #[test]
    fn builtins_are_registered() {
        let prog = Program::new();
        assert_eq!(prog.class(prog.object_class).name, "Object");
        assert!(prog.class_by_name("Console").is_some());
        assert!(prog.class_by_name("String").is_some());
        assert!(prog.class(prog.object_class).parent.is_none());
    }

    #[test]
    fn overload_resolution_prefers_exact_match() {
        let mut prog = Program::new();
        let c = prog.add_class("C", Some(prog.object_class));
        let exact = method_with_params(&mut prog, c, "F", &[Type::Int]);
        let widened = method_with_params(&mut prog, c, "F", &[Type::Double]);
        let got = resolve_call(&prog, c, MethodKind::Normal, "F", &[Type::Int], Some(c), false);
        assert_eq!(got, Ok(exact));
        let got = resolve_call(&prog, c, MethodKind::Normal, "F", &[Type::Double], Some(c), false);
        assert_eq!(got, Ok(widened));
    }

    #[test]
    fn overload_resolution_reports_ambiguity() {
        let mut prog = Program::new();
        let c = prog.add_class("C", Some(prog.object_class));
        method_with_params(&mut prog, c, "F", &[Type::Float]);
        method_with_params(&mut prog, c, "F", &[Type::Double]);
        // int widens to both float and double, so both candidates score
        // zero mismatches and neither wins.
        let got = resolve_call(&prog, c, MethodKind::Normal, "F", &[Type::Int], Some(c), false);
        assert_eq!(got, Err(LookupError::Ambiguous));
    }

    #[test]
    fn lookup_walks_the_inheritance_chain() {
        let mut prog = Program::new();
        let base = prog.add_class("Base", Some(prog.object_class));
        let derived = prog.add_class("Derived", Some(base));
        let inherited = method_with_params(&mut prog, base, "G", &[]);
        let got = resolve_call(&prog, derived, MethodKind::Normal, "G", &[], Some(derived), false);
        assert_eq!(got, Ok(inherited));
    }

    #[test]
    fn overrides_are_skipped_in_resolution() {
        let mut prog = Program::new();
        let base = prog.add_class("Base2", Some(prog.object_class));
        let derived = prog.add_class("Derived2", Some(base));
        let declared = method_with_params(&mut prog, base, "Speak", &[]);
        let over = method_with_params(&mut prog, derived, "Speak", &[]);
        prog.methods[over.0 as usize].is_override = true;
        let got = resolve_call(&prog, derived, MethodKind::Normal, "Speak", &[], Some(derived), false);
        assert_eq!(got, Ok(declared));
    }

    #[test]
    fn private_members_are_invisible_elsewhere() {
        let mut prog = Program::new();
        let a = prog.add_class("A2", Some(prog.object_class));
        let b = prog.add_class("B2", Some(prog.object_class));
        let hidden = method_with_params(&mut prog, a, "H", &[]);
        prog.methods[hidden.0 as usize].access = Access::Private;
        let got = resolve_call(&prog, a, MethodKind::Normal, "H", &[], Some(b), false);
        assert_eq!(got, Err(LookupError::NotFound));
    }
}
