//! Type checking and CFG construction.
//!
//! One `Checker` is built per method body. It walks the AST producing the
//! typed tree while threading the control-flow graph through every
//! statement: the `cur` field is the CFG cursor, advanced by appending
//! nodes and merged through joiners at control-flow merges. The same walk
//! records local uses and assignments, ownership transfers, destruction
//! effects, and the guard spans the reference-count analysis later
//! inspects.
//!
//! Checking continues past a failed member: errors poison the offending
//! expression and the walk goes on collecting more diagnostics.

mod expr;
mod stmt;

use rye_ast as ast;
use rye_ast::{ParamMode, Span};
use std::cell::Cell;

use crate::cfg::{Cfg, NodeId, Place, ENTRY, EXIT, UNREACHABLE};
use crate::diagnostics::DiagnosticSink;
use crate::flow;
use crate::hir;
use crate::sema::{ClassId, Guard, GuardId, Local, LocalId, Method, MethodId, MethodKind, Program};
use crate::types::{can_convert, is_subtype, ConvCtx, Type};

/// A loop or switch on the control stack. `continue_join` is `None` for
/// switches: `continue` passes through to the enclosing loop.
struct LoopCtx {
    break_join: NodeId,
    continue_join: Option<NodeId>,
    depth: usize,
}

/// A recorded `take` site, checked by the ownership-transfer analysis
/// after the method's CFG is complete.
pub struct TakeSite {
    pub node: NodeId,
    pub place: Place,
    pub span: Span,
}

/// Per-method checking state.
pub struct Checker<'a> {
    pub prog: &'a Program,
    pub sink: &'a DiagnosticSink,
    pub owner: ClassId,
    pub file: usize,
    ret: Type,
    is_static: bool,
    locals: Vec<Local>,
    pub cfg: Cfg,
    pub cur: NodeId,
    scopes: Vec<Vec<LocalId>>,
    loops: Vec<LoopCtx>,
    guards: Vec<Guard>,
    take_sites: Vec<TakeSite>,
    /// Owned temporaries of the statement being checked, destroyed at its
    /// end by a synthetic temporaries node.
    temps: Vec<Type>,
}

/// Checks every method body and field initializer in the program.
pub fn check_program(prog: &Program, sink: &DiagnosticSink) {
    for class in &prog.classes {
        if class.is_extern {
            continue;
        }
        for &fid in &class.fields {
            check_field_init(prog, sink, fid);
        }
        for &mid in &class.methods {
            let method = prog.method(mid);
            if method.body_ast.is_some() {
                Checker::run(prog, sink, method);
            }
        }
    }
}

/// Checks a field initializer. Initializers run inside constructors but
/// may not call methods, so they contribute no control flow of their own.
fn check_field_init(prog: &Program, sink: &DiagnosticSink, fid: crate::sema::FieldId) {
    let field = prog.field(fid);
    let init_ast = match &field.init_ast {
        Some(e) => e.clone(),
        None => return,
    };
    let class = prog.class(field.owner);
    let mut ck = Checker {
        prog,
        sink,
        owner: field.owner,
        file: class.file,
        ret: Type::Void,
        is_static: field.is_static,
        locals: Vec::new(),
        cfg: Cfg::new(),
        cur: ENTRY,
        scopes: vec![Vec::new()],
        loops: Vec::new(),
        guards: Vec::new(),
        take_sites: Vec::new(),
        temps: Vec::new(),
    };
    let nodes_before = ck.cfg.nodes.len();
    let value = ck.check_expr(&init_ast);
    let value = ck.coerce(value, &field.ty.clone(), ConvCtx::AssignVar, false, &init_ast.span());
    if ck.cfg.nodes.len() != nodes_before {
        ck.error(&init_ast.span(), "field initializers cannot call methods");
    }
    if field.is_const && !matches!(value.kind, hir::ExprKind::IntLit(_) | hir::ExprKind::DoubleLit(_)
        | hir::ExprKind::FloatLit(_) | hir::ExprKind::BoolLit(_) | hir::ExprKind::CharLit(_)
        | hir::ExprKind::StrLit(_))
    {
        ck.error(&init_ast.span(), format!("const field `{}` needs a literal initializer", field.name));
    }
    field.init.replace(Some(value));
}

impl<'a> Checker<'a> {
    /// Checks one method body, committing the CFG, typed body, locals, and
    /// guards into the registry and running the per-method flow checks.
    pub fn run(prog: &'a Program, sink: &'a DiagnosticSink, method: &'a Method) {
        // Leave the parameter entries in place so resolution against this
        // very method (recursion) still sees its signature; the scratch
        // table replaces them wholesale on commit.
        let params = method.locals.borrow().clone();
        let mut ck = Checker {
            prog,
            sink,
            owner: method.owner,
            file: method.file,
            ret: method.ret.clone(),
            is_static: method.is_static,
            locals: params,
            cfg: Cfg::new(),
            cur: ENTRY,
            scopes: vec![Vec::new()],
            loops: Vec::new(),
            guards: Vec::new(),
            take_sites: Vec::new(),
            temps: Vec::new(),
        };

        // In and ref parameters are assigned at entry; out parameters are
        // what the definite-assignment check tracks to `exit_`.
        for i in 0..ck.locals.len() {
            let lid = LocalId(i as u32);
            ck.scopes[0].push(lid);
            if ck.locals[i].mode != ParamMode::Out {
                ck.locals[i].assigns.borrow_mut().push(ENTRY);
                ck.cfg.add_sets(ENTRY, Place::Local(lid));
            }
        }

        // A constructor may delegate before its body runs. One that does
        // not implicitly runs the base class's parameterless constructor.
        let delegate = method.delegate_ast.clone();
        let mut delegate_hir = None;
        if let Some(d) = &delegate {
            delegate_hir = ck.check_ctor_delegate(d);
        } else if method.kind == MethodKind::Ctor {
            if let Some(parent) = prog.class(method.owner).parent {
                let pc = prog.class(parent);
                if !pc.is_extern {
                    match crate::sema::resolve_call(
                        prog, parent, MethodKind::Ctor, &pc.name, &[], Some(method.owner), false,
                    ) {
                        Ok(base_ctor) => {
                            // The implicit base construction is a call.
                            let n = ck.cfg.add(ck.cur);
                            ck.cfg.set_call(n, base_ctor);
                            ck.cur = n;
                        }
                        Err(_) => ck.error(&method.span, format!(
                            "base class `{}` has no parameterless constructor; delegate with `: base(...)`",
                            pc.name
                        )),
                    }
                }
            }
        }

        let body_ast = method.body_ast.as_ref().expect("checked method has a body");
        let mut body = ck.check_block(body_ast);
        if let Some(d) = delegate_hir {
            body.stmts.insert(0, hir::Stmt::Expr(d));
        }

        // Falling off the end: verify the return type allows it, destroy
        // the owning parameters, and join `exit_`.
        if ck.cur != UNREACHABLE {
            if !matches!(ck.ret, Type::Void) {
                ck.error(&body_ast.span, "not all code paths return a value");
            }
            let end = ck.cfg.add(ck.cur);
            for local in &ck.locals[..method.param_count] {
                if local.mode == ParamMode::In && local.ty.is_own() {
                    ck.cfg.add_destroy(end, local.ty.clone());
                }
            }
            ck.cur = end;
            ck.cfg.join_edge(EXIT, ck.cur);
        }

        flow::check_method_flow(prog, method, &ck.cfg, &ck.locals, &ck.take_sites, sink);

        method.locals.replace(ck.locals);
        method.cfg.replace(Some(ck.cfg));
        method.body.replace(Some(body));
        method.guards.replace(ck.guards);
    }

    /// Checks a `this(...)`/`base(...)` constructor delegation header and
    /// returns the delegated call expression.
    fn check_ctor_delegate(&mut self, d: &ast::CtorCall) -> Option<hir::Expr> {
        let target_class = match d.kind {
            ast::DelegateKind::This => self.owner,
            ast::DelegateKind::Base => match self.prog.class(self.owner).parent {
                Some(p) => p,
                None => {
                    self.error(&d.span, "class has no base class");
                    return None;
                }
            },
        };
        let mut args: Vec<hir::Expr> = Vec::new();
        let mut arg_tys: Vec<Type> = Vec::new();
        for a in &d.args {
            let e = self.check_expr(a);
            arg_tys.push(e.ty.clone());
            args.push(e);
        }
        let ctor_name = self.prog.class(target_class).name.clone();
        let target = match crate::sema::resolve_call(
            self.prog,
            target_class,
            MethodKind::Ctor,
            &ctor_name,
            &arg_tys,
            Some(self.owner),
            false,
        ) {
            Ok(mid) => mid,
            Err(_) => {
                self.error(&d.span, format!("no matching constructor on `{}`", ctor_name));
                return None;
            }
        };
        let args = self.coerce_args(target, args, &d.span);
        // A `this(...)` target must be callable as an ordinary method:
        // C++ constructors cannot be invoked on an existing object.
        if d.kind == ast::DelegateKind::This {
            self.prog.method(target).needs_forwarder.set(true);
        }
        let node = self.cfg.add(self.cur);
        self.cfg.set_call(node, target);
        self.cur = node;
        Some(hir::Expr::new(
            hir::ExprKind::Call {
                method: target,
                recv: Some(Box::new(hir::Expr::new(
                    hir::ExprKind::This,
                    Type::Class(self.owner),
                ))),
                args,
                virtual_call: false,
            },
            Type::Void,
        ))
    }

    // ---- shared helpers -------------------------------------------------

    pub fn error(&self, span: &Span, msg: impl Into<String>) {
        let line = self.prog.line_of(self.file, span.start);
        self.sink.report(&self.prog.files[self.file].path, line, msg);
    }

    /// A poisoned expression after an error; converts to anything.
    pub fn poison(&self) -> hir::Expr {
        hir::Expr::new(hir::ExprKind::NullLit, Type::Error)
    }

    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id.0 as usize]
    }

    /// Looks a name up in the lexical scopes, innermost first.
    pub fn lookup_local(&self, name: &str) -> Option<LocalId> {
        for scope in self.scopes.iter().rev() {
            for &lid in scope.iter().rev() {
                if self.locals[lid.0 as usize].name == name {
                    return Some(lid);
                }
            }
        }
        None
    }

    /// Declares a local in the current scope.
    pub fn declare_local(&mut self, name: &str, ty: Type, span: Span) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local {
            name: name.to_string(),
            ty,
            mode: ParamMode::In,
            is_param: false,
            mutable: Cell::new(false),
            needs_ref: Cell::new(false),
            assigns: std::cell::RefCell::new(Vec::new()),
            uses: std::cell::RefCell::new(Vec::new()),
            span,
        });
        self.scopes.last_mut().expect("scope stack is never empty").push(id);
        id
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Leaves a scope. If the cursor is live, appends a node destroying
    /// the owning and string locals that fall out of scope.
    pub fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        if self.cur == UNREACHABLE {
            return;
        }
        let destroyed: Vec<Type> = scope
            .iter()
            .filter_map(|&lid| stmt::local_destroyed_type(&self.locals[lid.0 as usize]))
            .collect();
        if !destroyed.is_empty() {
            let n = self.cfg.add(self.cur);
            for t in destroyed {
                self.cfg.add_destroy(n, t);
            }
            self.cur = n;
        }
    }

    /// Types destroyed when control leaves every scope deeper than
    /// `depth`. Depth 0 includes the owning parameters.
    pub(super) fn unwound_local_destroys(&self, depth: usize) -> Vec<Type> {
        let mut tys = Vec::new();
        for scope in &self.scopes[depth..] {
            for &lid in scope {
                if let Some(t) = stmt::local_destroyed_type(&self.locals[lid.0 as usize]) {
                    tys.push(t);
                }
            }
        }
        tys
    }

    /// True if the *current* scope already declares `name`.
    pub(super) fn scope_has(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|s| s.iter().any(|&lid| self.locals[lid.0 as usize].name == name))
            .unwrap_or(false)
    }

    pub(super) fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub(super) fn locals_len(&self) -> usize {
        self.locals.len()
    }

    pub(super) fn ret_type(&self) -> Type {
        self.ret.clone()
    }

    pub(super) fn temps_mut(&mut self) -> &mut Vec<Type> {
        &mut self.temps
    }

    pub(super) fn is_static_context(&self) -> bool {
        self.is_static
    }

    pub(super) fn record_take_site(&mut self, node: NodeId, place: Place, span: Span) {
        self.take_sites.push(TakeSite { node, place, span });
    }

    /// Flushes the statement's owned temporaries into a synthetic
    /// temporaries node, making them visible to the destruction analysis.
    pub fn flush_temps(&mut self) {
        if self.temps.is_empty() {
            return;
        }
        let temps = std::mem::take(&mut self.temps);
        if self.cur == UNREACHABLE {
            return;
        }
        let n = self.cfg.add(self.cur);
        for t in temps {
            self.cfg.add_destroy(n, t);
        }
        self.cur = n;
    }

    pub fn note_temp(&mut self, ty: Type) {
        self.temps.push(ty);
    }

    /// Records a guard for a reference value captured at the current
    /// cursor and consumed later; `finish_guard` closes it.
    pub fn open_guard(&mut self, ty: &Type, local: Option<LocalId>) -> Option<GuardId> {
        if !ty.is_reference() || matches!(ty, Type::Null) {
            return None;
        }
        let id = GuardId(self.guards.len() as u32);
        self.guards.push(Guard {
            start: self.cur,
            end: Cell::new(self.cur),
            local,
            ty: ty.clone(),
            needs_ref: Cell::new(false),
        });
        Some(id)
    }

    pub fn finish_guard(&mut self, guard: Option<GuardId>) {
        if let Some(g) = guard {
            self.guards[g.0 as usize].end.set(self.cur);
        }
    }

    /// The local a value expression reads directly, for guard condition 1.
    pub fn underlying_local(e: &hir::Expr) -> Option<LocalId> {
        match &e.kind {
            hir::ExprKind::Local(l) => Some(*l),
            hir::ExprKind::Convert { operand, .. } => Self::underlying_local(operand),
            _ => None,
        }
    }

    // ---- conversions ----------------------------------------------------

    /// Coerces `e` to `to`, materializing the conversion and applying the
    /// class-marking side effects. Errors poison the expression.
    pub fn coerce(
        &mut self,
        e: hir::Expr,
        to: &Type,
        ctx: ConvCtx,
        explicit: bool,
        span: &Span,
    ) -> hir::Expr {
        if matches!(e.ty, Type::Error) || matches!(to, Type::Error) {
            return e;
        }
        if &e.ty == to {
            return e;
        }
        if !can_convert(self.prog, &e.ty, to, ctx, explicit, false) {
            self.error(
                span,
                format!(
                    "cannot convert from `{}` to `{}`",
                    e.ty.display(self.prog),
                    to.display(self.prog)
                ),
            );
            return self.poison();
        }
        self.apply_conversion_marks(&e.ty, to, explicit);
        self.materialize(e, to, span)
    }

    /// The marking side effects of a conversion: explicit conversions need
    /// RTTI on the source class, conversions into an owning wrapper of a
    /// base class need a virtual destructor there, and conversions across
    /// the root-object boundary force object layout on the non-root side.
    fn apply_conversion_marks(&self, from: &Type, to: &Type, explicit: bool) {
        let prog = self.prog;
        let s = from.strip_own();
        let d = to.strip_own();
        if explicit {
            if let Type::Class(c) = s {
                prog.class(*c).virtual_needed.set(true);
            }
        }
        if let Type::Own(inner) = to {
            if let Type::Class(d) = &**inner {
                if s != &**inner {
                    prog.class(*d).virtual_needed.set(true);
                }
            }
        }
        let obj = prog.object_class;
        match (s, d) {
            (Type::Class(c), Type::Class(o)) if *o == obj && *c != obj => {
                prog.class(*c).object_inheritance_needed.set(true);
            }
            (Type::Class(o), Type::Class(c)) if *o == obj && *c != obj => {
                prog.class(*c).object_inheritance_needed.set(true);
            }
            _ => {}
        }
    }

    /// Builds the conversion node once legality is established.
    fn materialize(&mut self, e: hir::Expr, to: &Type, span: &Span) -> hir::Expr {
        let from = e.ty.clone();
        let prog = self.prog;

        // Null just adopts the destination type.
        if matches!(from, Type::Null) {
            let mut out = e;
            out.ty = to.clone();
            return out;
        }

        // Numeric conversions.
        if from.is_simple() && to.is_simple() {
            return hir::Expr::new(
                hir::ExprKind::Convert { kind: hir::ConvertKind::Numeric, operand: Box::new(e) },
                to.clone(),
            );
        }

        // Boxing a simple value: always produces an owning object.
        if from.is_simple() {
            let boxed = hir::Expr::new(
                hir::ExprKind::Convert { kind: hir::ConvertKind::Box, operand: Box::new(e) },
                Type::Own(Box::new(Type::Class(prog.object_class))),
            );
            return self.adjust_ownership(boxed, to);
        }

        // Unboxing.
        if to.is_simple() {
            return hir::Expr::new(
                hir::ExprKind::Convert { kind: hir::ConvertKind::Unbox, operand: Box::new(e) },
                to.clone(),
            );
        }

        // Reference conversions: pick up/downcast on the base types, then
        // fix the ownership axis.
        let s = from.strip_own().clone();
        let d = to.strip_own().clone();
        let based = if s == d {
            e
        } else if is_subtype(prog, &s, &d) {
            let ty = if from.is_own() { d.to_own() } else { d.clone() };
            hir::Expr::new(hir::ExprKind::Convert { kind: hir::ConvertKind::Upcast, operand: Box::new(e) }, ty)
        } else {
            let target = match &d {
                Type::Class(c) => *c,
                Type::String => prog.string_class,
                Type::Array(_) => prog.array_class,
                _ => prog.object_class,
            };
            let ty = if from.is_own() { d.to_own() } else { d.clone() };
            hir::Expr::new(hir::ExprKind::Convert { kind: hir::ConvertKind::Downcast(target), operand: Box::new(e) }, ty)
        };
        let _ = span;
        self.adjust_ownership(based, to)
    }

    /// Fixes the ownership axis after the base conversion: borrowing an
    /// owning rvalue wraps it in a statement-scoped temporary, and string
    /// values adopt owning-ness freely because their handle is counted.
    pub(super) fn adjust_ownership(&mut self, e: hir::Expr, to: &Type) -> hir::Expr {
        if e.ty.is_own() == to.is_own() {
            let mut out = e;
            out.ty = to.clone();
            return out;
        }
        if e.ty.is_own() {
            // Owning value used as a borrow: ownership is dropped here and
            // the value lives to the end of the statement. Boxes destroy
            // only themselves, so they stay out of the destroy sets (the
            // unconditional flag on root-object locals covers aliases).
            let inner_ty = e.ty.strip_own().clone();
            if !matches!(e.kind, hir::ExprKind::Convert { kind: hir::ConvertKind::Box, .. }) {
                self.note_temp(e.ty.clone());
            }
            // A discarded heap allocation becomes a stack temporary.
            let e = match e {
                hir::Expr { kind: hir::ExprKind::New { class, ctor, pool: None, args, .. }, ty, guard } => hir::Expr {
                    kind: hir::ExprKind::New { class, ctor, pool: None, args, stack_temp: true },
                    ty,
                    guard,
                },
                other => other,
            };
            let mut out = hir::Expr::new(
                hir::ExprKind::OwnTemp { operand: Box::new(e) },
                inner_ty,
            );
            out.ty = to.clone();
            return out;
        }
        // Non-owning to owning: only strings get here.
        let mut out = e;
        out.ty = to.clone();
        out
    }

    /// Coerces checked arguments to a resolved method's parameter types.
    pub fn coerce_args(&mut self, target: MethodId, args: Vec<hir::Expr>, span: &Span) -> Vec<hir::Expr> {
        let m = self.prog.method(target);
        let ptys = m.param_types();
        let modes = m.param_modes();
        if args.len() != ptys.len() {
            self.error(span, format!("`{}` expects {} arguments, got {}", m.name, ptys.len(), args.len()));
            return args;
        }
        args.into_iter()
            .zip(ptys.iter().zip(modes.iter()))
            .map(|(a, (pty, mode))| {
                if *mode == ParamMode::In {
                    self.coerce(a, pty, ConvCtx::MethodArg, false, span)
                } else {
                    a
                }
            })
            .collect()
    }
}

/// The type destroyed when a storage location of type `ty` dies, if any.
/// Owning locations destroy their contents; strings release a count that
/// may free the instance. Plain borrows destroy nothing.
pub fn destroyed_type(ty: &Type) -> Option<Type> {
    match ty {
        Type::Own(_) => Some(ty.clone()),
        Type::String => Some(Type::String),
        _ => None,
    }
}
