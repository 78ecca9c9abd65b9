//! Class declaration and definition emission.
//!
//! Declarations come first, parent before child, with access-specifier
//! transitions inserted as adjacent members change visibility. Method and
//! constructor bodies, static field definitions, and the entry point are
//! emitted out of line afterwards.
//!
//! Constructor lowering: a class with more than one constructor routes
//! every body through a private `init_` overload; a constructor that is
//! the target of `this(...)` delegation additionally gets a `construct_`
//! forwarder so it can run on an already-constructed object, with the
//! base subobject skip-initialized through the `RyeNoInit` tag
//! constructor. C++ base-constructor syntax covers `base(...)` delegation
//! directly.

use std::fmt::Write;

use rye_ast::{Access, ParamMode};

use super::{Emitter, Slot};
use crate::hir;
use crate::sema::{ClassId, MethodId, MethodKind};
use crate::types::Type;

impl Emitter<'_> {
    /// Spreads the `construct_` requirement up delegation chains: a
    /// forwarder that itself delegates (or implicitly constructs a user
    /// base) needs the target callable as a forwarder too.
    pub(super) fn propagate_forwarders(&self) {
        loop {
            let mut changed = false;
            for method in &self.prog.methods {
                if method.kind != MethodKind::Ctor || !method.needs_forwarder.get() {
                    continue;
                }
                if let Some(target) = self.delegate_target(method.id) {
                    if !self.prog.method(target).needs_forwarder.get() {
                        self.prog.method(target).needs_forwarder.set(true);
                        changed = true;
                    }
                } else if method.delegate_ast.is_none() {
                    if let Some(parent) = self.prog.class(method.owner).parent {
                        let pc = self.prog.class(parent);
                        if !pc.is_extern {
                            if let Some(base_default) = self.parameterless_ctor(parent) {
                                if !self.prog.method(base_default).needs_forwarder.get() {
                                    self.prog.method(base_default).needs_forwarder.set(true);
                                    changed = true;
                                }
                            }
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn parameterless_ctor(&self, cid: ClassId) -> Option<MethodId> {
        self.prog
            .class(cid)
            .methods
            .iter()
            .copied()
            .find(|&m| self.prog.method(m).kind == MethodKind::Ctor && self.prog.method(m).param_count == 0)
    }

    /// The resolved target of a constructor's delegation header, read
    /// from the first statement of its checked body.
    fn delegate_target(&self, mid: MethodId) -> Option<MethodId> {
        let m = self.prog.method(mid);
        m.delegate_ast.as_ref()?;
        let body = m.body.borrow();
        match body.as_ref()?.stmts.first() {
            Some(hir::Stmt::Expr(e)) => match &e.kind {
                hir::ExprKind::Call { method, .. } => Some(*method),
                _ => None,
            },
            _ => None,
        }
    }

    /// The emitted base of a class: the user parent, or the runtime root
    /// chosen by the object-inheritance decision.
    fn base_spelling(&self, cid: ClassId) -> String {
        let class = self.prog.class(cid);
        match class.parent {
            Some(p) if p != self.prog.object_class => self.class_name(p),
            _ => {
                if class.object_inheritance_needed.get() {
                    "Obj".into()
                } else {
                    "RyeBase".into()
                }
            }
        }
    }

    /// Emits an access specifier when it differs from the current one.
    fn access_transition(&mut self, cur: &mut Option<Access>, next: Access) {
        if *cur == Some(next) {
            return;
        }
        *cur = Some(next);
        let spec = match next {
            Access::Public => "public:",
            Access::Protected => "protected:",
            Access::Private => "private:",
        };
        let _ = writeln!(self.out_mut(), " {}", spec);
    }

    /// Parameter list for a signature. Owning parameters arrive raw under
    /// an `_arg` name and are adopted by a handle in the prologue; ref and
    /// out parameters bind by reference.
    fn param_sig(&self, mid: MethodId) -> String {
        let m = self.prog.method(mid);
        let locals = m.locals.borrow();
        let mut parts = Vec::new();
        for local in locals[..m.param_count].iter() {
            let piece = match local.mode {
                ParamMode::Ref | ParamMode::Out => {
                    let (ty, _) = self.slot_type(&local.ty, Slot::Local);
                    format!("{} &{}", ty, local.name)
                }
                ParamMode::In if local.ty.is_own() => {
                    let (ty, _) = self.slot_type(&local.ty, Slot::Param);
                    format!("{}{}_arg", spaced(&ty), local.name)
                }
                ParamMode::In => {
                    let (ty, _) = self.slot_type(&local.ty, Slot::Param);
                    format!("{}{}", spaced(&ty), local.name)
                }
            };
            parts.push(piece);
        }
        parts.join(", ")
    }

    /// Plain parameter-name list, for forwarding `init_(...)` calls.
    fn param_names(&self, mid: MethodId) -> String {
        let m = self.prog.method(mid);
        let locals = m.locals.borrow();
        locals[..m.param_count]
            .iter()
            .map(|l| {
                if l.mode == ParamMode::In && l.ty.is_own() {
                    format!("{}_arg", l.name)
                } else {
                    l.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Handle-adoption prologue for owning parameters.
    fn emit_param_prologues(&mut self, mid: MethodId) {
        let m = self.prog.method(mid);
        let locals = m.locals.borrow();
        let mut lines = Vec::new();
        for local in locals[..m.param_count].iter() {
            if local.mode == ParamMode::In && local.ty.is_own() {
                let (handle, _) = self.slot_type(&local.ty, Slot::Local);
                lines.push(format!("{} {}({}_arg);", handle, local.name, local.name));
            }
        }
        drop(locals);
        for l in lines {
            self.line(&l);
        }
    }

    // ---- class declarations ---------------------------------------------

    pub(super) fn emit_class_decl(&mut self, cid: ClassId) {
        let class = self.prog.class(cid);
        let name = self.class_name(cid);
        let base = self.base_spelling(cid);
        self.open(&format!("class {} : public {} {{", name, base));
        let mut cur = None;

        // Fields.
        let fields = class.fields.clone();
        for fid in fields {
            let f = self.prog.field(fid);
            self.access_transition(&mut cur, f.access);
            if f.is_const {
                let (ty, _) = self.slot_type(&f.ty.clone(), Slot::Field);
                let init = match f.init.borrow().as_ref() {
                    Some(e) => {
                        let s = self.expr_str(e);
                        format!(" = {}", s)
                    }
                    None => String::new(),
                };
                self.line(&format!("static const {}{}{};", spaced(&ty), f.name, init));
            } else if f.is_static {
                let (ty, _) = self.slot_type(&f.ty.clone(), Slot::Field);
                self.line(&format!("static {}{};", spaced(&ty), f.name));
            } else {
                let (ty, is_handle) = self.slot_type(&f.ty.clone(), Slot::Field);
                if is_handle {
                    self.line(&format!("{}{};", spaced(&ty), f.name));
                } else {
                    let default = match f.ty {
                        Type::Bool => " = false",
                        Type::Char | Type::Int => " = 0",
                        Type::Float | Type::Double => " = 0",
                        _ => " = 0", // raw pointers
                    };
                    self.line(&format!("{}{}{};", spaced(&ty), f.name, default));
                }
            }
        }

        // Method prototypes.
        let methods = class.methods.clone();
        for &mid in &methods {
            let m = self.prog.method(mid);
            if m.kind == MethodKind::Ctor {
                continue;
            }
            self.access_transition(&mut cur, m.access);
            let (ret, _) = self.slot_type(&m.ret.clone(), Slot::Return);
            let prefix = if m.is_static {
                "static "
            } else if m.is_virtual {
                "virtual "
            } else {
                ""
            };
            let sig = format!("{}{}{}({})", prefix, spaced(&ret), m.cpp_name, self.param_sig(mid));
            if m.is_abstract {
                self.line(&format!("{} = 0;", sig));
            } else {
                self.line(&format!("{};", sig));
            }
        }

        // Constructors.
        let ctors: Vec<MethodId> = methods
            .iter()
            .copied()
            .filter(|&m| self.prog.method(m).kind == MethodKind::Ctor)
            .collect();
        for &mid in &ctors {
            let m = self.prog.method(mid);
            self.access_transition(&mut cur, m.access);
            self.line(&format!("{}({});", name, self.param_sig(mid)));
        }
        for &mid in &ctors {
            if self.prog.method(mid).needs_forwarder.get() {
                self.access_transition(&mut cur, Access::Protected);
                self.line(&format!("void construct_({});", self.param_sig(mid)));
            }
        }
        if ctors.len() > 1 {
            self.access_transition(&mut cur, Access::Private);
            for &mid in &ctors {
                self.line(&format!("void init_({});", self.param_sig(mid)));
            }
        }

        // Skip-initialization tag constructor for delegation chains.
        self.access_transition(&mut cur, Access::Protected);
        self.line(&format!("{}(RyeNoInit t) : {}(t) {{ }}", name, base));

        if class.virtual_needed.get() {
            self.access_transition(&mut cur, Access::Public);
            self.line(&format!("virtual ~{}() {{ }}", name));
        }
        if class.pool_destroy_needed.get() {
            self.access_transition(&mut cur, Access::Public);
            self.line(&format!("RYE_POOL_OBJECT({})", name));
        }

        self.close("};");
        self.blank();
    }

    // ---- out-of-line definitions ----------------------------------------

    pub(super) fn emit_class_defs(&mut self, cid: ClassId) {
        let class = self.prog.class(cid);
        let name = self.class_name(cid);

        // Static and const field definitions.
        let fields = class.fields.clone();
        for fid in fields {
            let f = self.prog.field(fid);
            if f.is_const {
                let (ty, _) = self.slot_type(&f.ty.clone(), Slot::Field);
                self.line(&format!("const {}{}::{};", spaced(&ty), name, f.name));
            } else if f.is_static {
                let (ty, is_handle) = self.slot_type(&f.ty.clone(), Slot::Field);
                let init = f.init.borrow();
                match (init.as_ref(), is_handle) {
                    (Some(e), false) => {
                        let s = self.expr_str(e);
                        self.line(&format!("{}{}::{} = {};", spaced(&ty), name, f.name, s));
                    }
                    (Some(e), true) => {
                        let s = self.expr_str(e);
                        self.line(&format!("{}{}::{}({});", spaced(&ty), name, f.name, s));
                    }
                    (None, _) => {
                        let default = if is_handle { "" } else { " = 0" };
                        self.line(&format!("{}{}::{}{};", spaced(&ty), name, f.name, default));
                    }
                }
            }
        }

        // Methods.
        let methods = class.methods.clone();
        for &mid in &methods {
            let m = self.prog.method(mid);
            if m.kind == MethodKind::Ctor || m.body.borrow().is_none() {
                continue;
            }
            self.cur_method = Some(mid);
            let (ret, _) = self.slot_type(&m.ret.clone(), Slot::Return);
            self.blank();
            self.open(&format!(
                "{}{}::{}({}) {{",
                spaced(&ret),
                name,
                m.cpp_name,
                self.param_sig(mid)
            ));
            self.emit_param_prologues(mid);
            self.emit_body(mid);
            self.close("}");
            self.cur_method = None;
        }

        // Constructors.
        let ctors: Vec<MethodId> = methods
            .iter()
            .copied()
            .filter(|&m| self.prog.method(m).kind == MethodKind::Ctor && self.prog.method(m).body.borrow().is_some())
            .collect();
        let multi = ctors.len() > 1;
        for &mid in &ctors {
            self.emit_ctor_defs(cid, mid, multi);
        }
        self.cur_method = None;
    }

    fn emit_ctor_defs(&mut self, cid: ClassId, mid: MethodId, multi: bool) {
        let name = self.class_name(cid);
        let m = self.prog.method(mid);
        let delegate_kind = m.delegate_ast.as_ref().map(|d| d.kind);
        // The delegation call sits first in the checked body; the real
        // content follows it.
        let content_start = usize::from(delegate_kind.is_some());
        self.cur_method = Some(mid);

        // The delegation call's emitted argument list, when present.
        let delegate_args = self.delegate_target(mid).map(|target| {
            let body = self.prog.method(mid).body.borrow();
            let args: Vec<String> = match body.as_ref().and_then(|b| b.stmts.first()) {
                Some(hir::Stmt::Expr(e)) => match &e.kind {
                    hir::ExprKind::Call { args, .. } => {
                        args.iter().map(|a| self.expr_str(a)).collect()
                    }
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };
            (target, args)
        });

        // Real constructor.
        let init_list = match delegate_kind {
            Some(rye_ast::DelegateKind::Base) => {
                let (_, args) = delegate_args.as_ref().expect("base delegation has a target");
                format!(" : {}({})", self.base_spelling(cid), args.join(", "))
            }
            Some(rye_ast::DelegateKind::This) => {
                format!(" : {}(rye_no_init)", self.base_spelling(cid))
            }
            None => String::new(),
        };
        self.blank();
        self.open(&format!("{}::{}({}){} {{", name, name, self.param_sig(mid), init_list));
        if delegate_kind == Some(rye_ast::DelegateKind::This) {
            let (_, args) = delegate_args.as_ref().expect("this delegation has a target");
            self.line(&format!("construct_({});", args.join(", ")));
        }
        if multi {
            self.line(&format!("init_({});", self.param_names(mid)));
        } else {
            self.emit_param_prologues(mid);
            if delegate_kind != Some(rye_ast::DelegateKind::This) {
                self.emit_field_inits(cid);
            }
            self.emit_body_from(mid, content_start);
        }
        self.close("}");

        // init_ overload.
        if multi {
            self.blank();
            self.open(&format!("void {}::init_({}) {{", name, self.param_sig(mid)));
            self.emit_param_prologues(mid);
            if delegate_kind != Some(rye_ast::DelegateKind::This) {
                self.emit_field_inits(cid);
            }
            self.emit_body_from(mid, content_start);
            self.close("}");
        }

        // construct_ forwarder: base chain plus the same initialization.
        if self.prog.method(mid).needs_forwarder.get() {
            self.blank();
            self.open(&format!("void {}::construct_({}) {{", name, self.param_sig(mid)));
            match delegate_kind {
                Some(rye_ast::DelegateKind::Base) => {
                    let (_, args) = delegate_args.as_ref().expect("base delegation has a target");
                    self.line(&format!("{}::construct_({});", self.base_spelling(cid), args.join(", ")));
                }
                Some(rye_ast::DelegateKind::This) => {
                    let (_, args) = delegate_args.as_ref().expect("this delegation has a target");
                    self.line(&format!("construct_({});", args.join(", ")));
                }
                None => {
                    if let Some(parent) = self.prog.class(cid).parent {
                        if !self.prog.class(parent).is_extern {
                            self.line(&format!("{}::construct_();", self.class_name(parent)));
                        }
                    }
                }
            }
            if multi {
                self.line(&format!("init_({});", self.param_names(mid)));
            } else {
                self.emit_param_prologues(mid);
                if delegate_kind != Some(rye_ast::DelegateKind::This) {
                    self.emit_field_inits(cid);
                }
                self.emit_body_from(mid, content_start);
            }
            self.close("}");
        }
        self.cur_method = None;
    }

    /// Assignments for this class's own field initializers.
    fn emit_field_inits(&mut self, cid: ClassId) {
        let fields = self.prog.class(cid).fields.clone();
        for fid in fields {
            let f = self.prog.field(fid);
            if f.is_static || f.is_const {
                continue;
            }
            let init = f.init.borrow();
            if let Some(e) = init.as_ref() {
                let s = self.expr_str(e);
                let name = f.name.clone();
                drop(init);
                self.line(&format!("this->{} = {};", name, s));
            }
        }
    }

    // ---- entry point -----------------------------------------------------

    pub(super) fn emit_entry_point(&mut self) {
        let (main, takes_args) = match self.prog.main.get() {
            Some(m) => m,
            None => return,
        };
        let owner = self.class_name(self.prog.method(main).owner);
        self.blank();
        if takes_args {
            self.open("static void rye_main(Arr< StrRef > *args) {");
            self.line(&format!("{}::Main(args);", owner));
            self.close("}");
        } else {
            self.open("static void rye_main() {");
            self.line(&format!("{}::Main();", owner));
            self.close("}");
        }
        self.blank();
        self.open("int main(int argc, char **argv) {");
        self.line("return rye_run_main(rye_main, argc, argv);");
        self.close("}");
    }
}

/// Appends a space unless the spelling already ends with `*` or `&`
/// (pointer declarators hug the name).
pub(super) fn spaced(ty: &str) -> String {
    if ty.ends_with('*') || ty.ends_with('&') {
        ty.to_string()
    } else {
        format!("{} ", ty)
    }
}
