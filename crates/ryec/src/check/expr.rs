//! Expression checking.
//!
//! Each function produces a typed `hir::Expr`, records CFG effects (call
//! nodes, assignment effects, ownership transfers), local uses, and the
//! guard spans consumed by the reference-count analysis. Reads of owning
//! storage locations borrow: their value type is the stripped base type.
//! Owning values only arise from `new`, `take`, and calls returning `T^`.

use rye_ast as ast;
use rye_ast::{Access, BinaryOp, ParamMode, Span, UnaryOp};

use super::Checker;
use crate::cfg::Place;
use crate::hir;
use crate::sema::{self, GuardId, LocalId, MethodId, MethodKind};
use crate::types::{is_subtype, member_class, ConvCtx, Type};

impl Checker<'_> {
    pub fn check_expr(&mut self, e: &ast::Expr) -> hir::Expr {
        match e {
            ast::Expr::Lit(lit, _) => self.check_lit(lit),
            ast::Expr::Name(id) => self.check_name(id),
            ast::Expr::This(span) => self.check_this(span),
            ast::Expr::Base(span) => {
                self.error(span, "`base` is only valid as a member receiver");
                self.poison()
            }
            ast::Expr::Member(m) => self.check_member(m),
            ast::Expr::Index(ix) => self.check_index(ix),
            ast::Expr::Call(c) => self.check_call(c),
            ast::Expr::New(n) => self.check_new(n),
            ast::Expr::NewArray(n) => self.check_new_array(n),
            ast::Expr::Unary(u) => self.check_unary(u),
            ast::Expr::Binary(b) => self.check_binary(b),
            ast::Expr::Cond(c) => self.check_cond_expr(c),
            ast::Expr::Assign(a) => self.check_assign(a),
            ast::Expr::Incr(i) => self.check_incr(i),
            ast::Expr::Take(t) => self.check_take(t),
            ast::Expr::Cast(c) => self.check_cast(c),
            ast::Expr::Paren(inner, _) => self.check_expr(inner),
        }
    }

    fn check_lit(&mut self, lit: &ast::Lit) -> hir::Expr {
        match lit {
            ast::Lit::Null => hir::Expr::new(hir::ExprKind::NullLit, Type::Null),
            ast::Lit::Bool(b) => hir::Expr::new(hir::ExprKind::BoolLit(*b), Type::Bool),
            ast::Lit::Int(v) => hir::Expr::new(hir::ExprKind::IntLit(*v), Type::Int),
            ast::Lit::Float(v) => hir::Expr::new(hir::ExprKind::FloatLit(*v), Type::Float),
            ast::Lit::Double(v) => hir::Expr::new(hir::ExprKind::DoubleLit(*v), Type::Double),
            ast::Lit::Char(v) => hir::Expr::new(hir::ExprKind::CharLit(*v), Type::Char),
            ast::Lit::Str(s) => hir::Expr::new(hir::ExprKind::StrLit(s.clone()), Type::String),
        }
    }

    fn check_name(&mut self, id: &ast::Ident) -> hir::Expr {
        if let Some(lid) = self.lookup_local(&id.name) {
            return self.read_local(lid, &id.span);
        }
        if let Some(fid) = sema::find_field(self.prog, self.owner, &id.name) {
            return self.read_field(None, fid, &id.span);
        }
        // A property on the current class, read without a receiver.
        if let Ok(getter) = sema::resolve_call(
            self.prog, self.owner, MethodKind::PropGet, &id.name, &[], Some(self.owner), false,
        ) {
            let is_virtual = self.prog.method(getter).is_virtual;
            let recv = Some(self.implicit_this(&id.span));
            return self.emit_call(getter, recv, Vec::new(), is_virtual, &id.span);
        }
        if self.prog.class_by_name(&id.name).is_some() {
            self.error(&id.span, format!("`{}` is a class, not a value", id.name));
        } else {
            self.error(&id.span, format!("unknown name `{}`", id.name));
        }
        self.poison()
    }

    fn check_this(&mut self, span: &Span) -> hir::Expr {
        if self.is_static_context() {
            self.error(span, "`this` in a static context");
            return self.poison();
        }
        hir::Expr::new(hir::ExprKind::This, Type::Class(self.owner))
    }

    fn implicit_this(&mut self, span: &Span) -> Box<hir::Expr> {
        Box::new(self.check_this(span))
    }

    /// Reads a local. Owning locals yield a borrow of the base type.
    fn read_local(&mut self, lid: LocalId, span: &Span) -> hir::Expr {
        let local = self.local(lid);
        local.uses.borrow_mut().push((self.cur, span.clone()));
        let ty = local.ty.strip_own().clone();
        hir::Expr::new(hir::ExprKind::Local(lid), ty)
    }

    /// Reads a field. Owning fields yield a borrow of the base type.
    fn read_field(&mut self, obj: Option<Box<hir::Expr>>, fid: crate::sema::FieldId, span: &Span) -> hir::Expr {
        let field = self.prog.field(fid);
        if !self.field_accessible(fid) {
            self.error(span, format!("field `{}` is inaccessible", field.name));
        }
        if field.is_static || field.is_const {
            return hir::Expr::new(hir::ExprKind::StaticGet(fid), field.ty.strip_own().clone());
        }
        let obj = match obj {
            Some(o) => Some(o),
            None => {
                if self.is_static_context() {
                    self.error(span, format!("field `{}` needs an instance", field.name));
                    return self.poison();
                }
                None
            }
        };
        hir::Expr::new(
            hir::ExprKind::FieldGet { obj, field: fid },
            field.ty.strip_own().clone(),
        )
    }

    fn field_accessible(&self, fid: crate::sema::FieldId) -> bool {
        let field = self.prog.field(fid);
        match field.access {
            Access::Public => true,
            Access::Private => field.owner == self.owner,
            Access::Protected => self.prog.is_ancestor_or_self(self.owner, field.owner),
        }
    }

    fn check_member(&mut self, m: &ast::MemberExpr) -> hir::Expr {
        // Static member access through a class name.
        if let ast::Expr::Name(n) = &*m.obj {
            if self.lookup_local(&n.name).is_none()
                && sema::find_field(self.prog, self.owner, &n.name).is_none()
            {
                if let Some(cid) = self.prog.class_by_name(&n.name) {
                    return self.check_static_member(cid, m);
                }
            }
        }
        // `base.f` reads a field of the parent class through `this`.
        if matches!(&*m.obj, ast::Expr::Base(_)) {
            let parent = match self.prog.class(self.owner).parent {
                Some(p) => p,
                None => {
                    self.error(&m.span, "class has no base class");
                    return self.poison();
                }
            };
            if let Some(fid) = sema::find_field(self.prog, parent, &m.name.name) {
                return self.read_field(None, fid, &m.name.span);
            }
            if let Ok(getter) = sema::resolve_call(
                self.prog, parent, MethodKind::PropGet, &m.name.name, &[], Some(self.owner), false,
            ) {
                let recv = Some(self.implicit_this(&m.span));
                return self.emit_call(getter, recv, Vec::new(), false, &m.span);
            }
            self.error(&m.name.span, format!("no member `{}` on the base class", m.name.name));
            return self.poison();
        }

        let obj = self.check_expr(&m.obj);
        if matches!(obj.ty, Type::Error) {
            return self.poison();
        }
        let cid = match member_class(self.prog, &obj.ty) {
            Some(c) => c,
            None => {
                self.error(&m.span, format!("`{}` has no members", obj.ty.display(self.prog)));
                return self.poison();
            }
        };
        if let Some(fid) = sema::find_field(self.prog, cid, &m.name.name) {
            let f = self.prog.field(fid);
            if f.is_static || f.is_const {
                return hir::Expr::new(hir::ExprKind::StaticGet(fid), f.ty.strip_own().clone());
            }
            return self.read_field(Some(Box::new(obj)), fid, &m.name.span);
        }
        if let Ok(getter) = sema::resolve_call(
            self.prog, cid, MethodKind::PropGet, &m.name.name, &[], Some(self.owner), false,
        ) {
            let is_virtual = self.prog.method(getter).is_virtual;
            return self.emit_call(getter, Some(Box::new(obj)), Vec::new(), is_virtual, &m.span);
        }
        self.error(
            &m.name.span,
            format!("no member `{}` on `{}`", m.name.name, obj.ty.display(self.prog)),
        );
        self.poison()
    }

    fn check_static_member(&mut self, cid: crate::sema::ClassId, m: &ast::MemberExpr) -> hir::Expr {
        if let Some(fid) = sema::find_field(self.prog, cid, &m.name.name) {
            let f = self.prog.field(fid);
            if !f.is_static && !f.is_const {
                self.error(&m.name.span, format!("field `{}` is not static", f.name));
                return self.poison();
            }
            if !self.field_accessible(fid) {
                self.error(&m.name.span, format!("field `{}` is inaccessible", f.name));
            }
            return hir::Expr::new(hir::ExprKind::StaticGet(fid), f.ty.strip_own().clone());
        }
        self.error(
            &m.name.span,
            format!("no static member `{}` on `{}`", m.name.name, self.prog.class(cid).name),
        );
        self.poison()
    }

    fn check_index(&mut self, ix: &ast::IndexExpr) -> hir::Expr {
        let obj = self.check_expr(&ix.obj);
        match obj.ty.strip_own().clone() {
            Type::Array(elem) => {
                let idx = self.check_expr(&ix.index);
                let idx = self.coerce(idx, &Type::Int, ConvCtx::Other, false, &ix.index.span());
                hir::Expr::new(
                    hir::ExprKind::ArrayGet { obj: Box::new(obj), index: Box::new(idx) },
                    elem.strip_own().clone(),
                )
            }
            Type::Error => self.poison(),
            ty => {
                let cid = match member_class(self.prog, &ty) {
                    Some(c) => c,
                    None => {
                        self.error(&ix.span, format!("`{}` cannot be indexed", ty.display(self.prog)));
                        return self.poison();
                    }
                };
                let idx = self.check_expr(&ix.index);
                let idx_ty = idx.ty.clone();
                match sema::resolve_call(
                    self.prog, cid, MethodKind::IndexGet, "this[]", &[idx_ty], Some(self.owner), false,
                ) {
                    Ok(getter) => {
                        let args = self.coerce_args(getter, vec![idx], &ix.span);
                        let is_virtual = self.prog.method(getter).is_virtual;
                        self.emit_call(getter, Some(Box::new(obj)), args, is_virtual, &ix.span)
                    }
                    Err(_) => {
                        self.error(&ix.span, format!("`{}` has no indexer", ty.display(self.prog)));
                        self.poison()
                    }
                }
            }
        }
    }

    /// Adds the call node for an already-resolved target and builds the
    /// call expression. Guards opened for the receiver and arguments are
    /// closed at the call node by the caller.
    fn emit_call(
        &mut self,
        method: MethodId,
        recv: Option<Box<hir::Expr>>,
        args: Vec<hir::Expr>,
        virtual_call: bool,
        _span: &Span,
    ) -> hir::Expr {
        let node = self.cfg.add(self.cur);
        self.cfg.set_call(node, method);
        self.cur = node;
        let ret = self.prog.method(method).ret.clone();
        hir::Expr::new(
            hir::ExprKind::Call { method, recv, args, virtual_call },
            ret,
        )
    }

    fn check_call(&mut self, c: &ast::CallExpr) -> hir::Expr {
        // Work out the receiver and the class to search.
        let (mut recv, search_class, name, name_span, force_nonvirtual) = match &*c.callee {
            ast::Expr::Name(n) => (None, self.owner, n.name.clone(), n.span.clone(), false),
            ast::Expr::Member(m) => {
                if let ast::Expr::Name(obj_name) = &*m.obj {
                    if self.lookup_local(&obj_name.name).is_none()
                        && sema::find_field(self.prog, self.owner, &obj_name.name).is_none()
                        && self.prog.class_by_name(&obj_name.name).is_some()
                    {
                        let cid = self.prog.class_by_name(&obj_name.name).expect("checked above");
                        (None, cid, m.name.name.clone(), m.name.span.clone(), false)
                    } else {
                        let obj = self.check_expr(&m.obj);
                        match member_class(self.prog, &obj.ty) {
                            Some(cid) => (Some(obj), cid, m.name.name.clone(), m.name.span.clone(), false),
                            None => {
                                if !matches!(obj.ty, Type::Error) {
                                    self.error(&m.span, format!("`{}` has no methods", obj.ty.display(self.prog)));
                                }
                                return self.poison();
                            }
                        }
                    }
                } else if matches!(&*m.obj, ast::Expr::Base(_)) {
                    match self.prog.class(self.owner).parent {
                        Some(p) => {
                            let this = self.check_this(&m.span);
                            (Some(this), p, m.name.name.clone(), m.name.span.clone(), true)
                        }
                        None => {
                            self.error(&m.span, "class has no base class");
                            return self.poison();
                        }
                    }
                } else {
                    let obj = self.check_expr(&m.obj);
                    match member_class(self.prog, &obj.ty) {
                        Some(cid) => (Some(obj), cid, m.name.name.clone(), m.name.span.clone(), false),
                        None => {
                            if !matches!(obj.ty, Type::Error) {
                                self.error(&m.span, format!("`{}` has no methods", obj.ty.display(self.prog)));
                            }
                            return self.poison();
                        }
                    }
                }
            }
            other => {
                self.error(&other.span(), "this expression is not callable");
                return self.poison();
            }
        };

        // Guard the receiver value across argument evaluation.
        let recv_guard = match &recv {
            Some(r) => {
                let local = Self::underlying_local(r);
                self.open_guard(&r.ty, local)
            }
            None => None,
        };

        // Evaluate arguments left to right, each guarded to the call.
        let mut args = Vec::new();
        let mut arg_tys = Vec::new();
        let mut arg_guards: Vec<Option<GuardId>> = Vec::new();
        let mut arg_starts = Vec::new();
        for a in &c.args {
            arg_starts.push(self.cur);
            let v = self.check_expr(a);
            let local = Self::underlying_local(&v);
            arg_guards.push(self.open_guard(&v.ty, local));
            arg_tys.push(v.ty.clone());
            args.push(v);
        }

        let target = match sema::resolve_call(
            self.prog, search_class, MethodKind::Normal, &name, &arg_tys, Some(self.owner), false,
        ) {
            Ok(mid) => mid,
            Err(err) => {
                self.report_lookup_error(err, &name, search_class, &name_span);
                return self.poison();
            }
        };
        let target_m = self.prog.method(target);

        // Static/instance agreement.
        if target_m.is_static {
            if recv.is_some() {
                self.error(&name_span, format!("static method `{}` is called through a class name", name));
            }
            recv = None;
        } else if recv.is_none() {
            if self.is_static_context() {
                self.error(&name_span, format!("instance method `{}` in a static context", name));
                return self.poison();
            }
            recv = Some(self.check_this(&name_span));
        }

        let mut args = self.coerce_args(target, args, &c.span);

        // Ref/out arguments must be plain variables; out arguments are
        // writes, not reads.
        let modes = target_m.param_modes();
        let mut out_places: Vec<Place> = Vec::new();
        for (i, mode) in modes.iter().enumerate() {
            if *mode == ParamMode::In || i >= args.len() {
                continue;
            }
            match &args[i].kind {
                hir::ExprKind::Local(lid) => {
                    let local = self.local(*lid);
                    local.mutable.set(true);
                    if *mode == ParamMode::Out {
                        // The argument expression was checked as a read;
                        // retract that use. A bare variable read adds no
                        // nodes, so it was recorded at the pre-argument
                        // cursor.
                        let mut uses = local.uses.borrow_mut();
                        if let Some(pos) = uses.iter().rposition(|(n, _)| *n == arg_starts[i]) {
                            uses.remove(pos);
                        }
                        out_places.push(Place::Local(*lid));
                    }
                    arg_guards[i] = None;
                }
                _ => {
                    self.error(&c.span, "a ref/out argument must be a variable");
                }
            }
        }

        let virtual_call = target_m.is_virtual && !force_nonvirtual;
        let node = self.cfg.add(self.cur);
        self.cfg.set_call(node, target);
        for place in out_places {
            self.cfg.add_sets(node, place);
            if let Place::Local(lid) = place {
                self.local(lid).assigns.borrow_mut().push(node);
            }
        }
        self.cur = node;

        // Close the guards at the call and attach them to the values.
        self.finish_guard(recv_guard);
        if let Some(r) = &mut recv {
            if !matches!(r.kind, hir::ExprKind::OwnTemp { .. }) {
                r.guard = recv_guard;
            }
        }
        for (i, g) in arg_guards.into_iter().enumerate() {
            self.finish_guard(g);
            if let Some(arg) = args.get_mut(i) {
                if !matches!(arg.kind, hir::ExprKind::OwnTemp { .. }) {
                    arg.guard = g;
                }
            }
        }

        let ret = target_m.ret.clone();
        hir::Expr::new(
            hir::ExprKind::Call {
                method: target,
                recv: recv.map(Box::new),
                args,
                virtual_call,
            },
            ret,
        )
    }

    fn report_lookup_error(&self, err: sema::LookupError, name: &str, class: crate::sema::ClassId, span: &Span) {
        let class_name = &self.prog.class(class).name;
        match err {
            sema::LookupError::NotFound => {
                self.error(span, format!("no method `{}` on `{}`", name, class_name))
            }
            sema::LookupError::Ambiguous => {
                self.error(span, format!("ambiguous call to `{}`", name))
            }
            sema::LookupError::Inaccessible(_) => {
                self.error(span, format!("`{}` is inaccessible here", name))
            }
            sema::LookupError::Mismatch(_) => self.error(
                span,
                format!("no overload of `{}` matches these arguments", name),
            ),
        }
    }

    fn check_new(&mut self, n: &ast::NewExpr) -> hir::Expr {
        let cid = match self.prog.class_by_name(&n.class.name) {
            Some(c) => c,
            None => {
                self.error(&n.class.span, format!("unknown class `{}`", n.class.name));
                return self.poison();
            }
        };
        let class = self.prog.class(cid);
        if class.is_abstract {
            self.error(&n.span, format!("cannot instantiate abstract class `{}`", class.name));
        }

        let pool = match &n.pool {
            Some(p) => {
                let pe = self.check_expr(p);
                if !pe.ty.is_class(self.prog.pool_class) && !matches!(pe.ty, Type::Error) {
                    self.error(&p.span(), "the creator argument of `new` must be a pool");
                }
                // Pool-allocated instances are destroyed in two passes;
                // the pool walker reaches them virtually through the
                // object root, so they need both the hooks and the
                // object layout.
                class.pool_destroy_needed.set(true);
                class.virtual_needed.set(true);
                class.object_inheritance_needed.set(true);
                Some(Box::new(pe))
            }
            None => None,
        };

        let mut args = Vec::new();
        let mut arg_tys = Vec::new();
        for a in &n.args {
            let v = self.check_expr(a);
            arg_tys.push(v.ty.clone());
            args.push(v);
        }
        let ctor_name = self.prog.class(cid).name.clone();
        let ctor = match sema::resolve_call(
            self.prog, cid, MethodKind::Ctor, &ctor_name, &arg_tys, Some(self.owner), false,
        ) {
            Ok(mid) => mid,
            Err(err) => {
                self.report_lookup_error(err, &ctor_name, cid, &n.span);
                return self.poison();
            }
        };
        let args = self.coerce_args(ctor, args, &n.span);

        let node = self.cfg.add(self.cur);
        self.cfg.set_call(node, ctor);
        self.cur = node;

        // A pool allocation is owned by the pool, not the expression: the
        // result is a plain reference freed by the pool's two-pass
        // destruction.
        let ty = if pool.is_some() {
            Type::Class(cid)
        } else {
            Type::Own(Box::new(Type::Class(cid)))
        };
        hir::Expr::new(
            hir::ExprKind::New { class: cid, ctor, pool, args, stack_temp: false },
            ty,
        )
    }

    fn check_new_array(&mut self, n: &ast::NewArrayExpr) -> hir::Expr {
        let elem = crate::resolve::resolve_type(self.prog, &n.elem_ty, self.file, self.sink)
            .unwrap_or(Type::Error);
        let len = self.check_expr(&n.len);
        let len = self.coerce(len, &Type::Int, ConvCtx::Other, false, &n.len.span());
        hir::Expr::new(
            hir::ExprKind::NewArray { elem: elem.clone(), len: Box::new(len) },
            Type::Own(Box::new(Type::Array(Box::new(elem)))),
        )
    }

    fn check_unary(&mut self, u: &ast::UnaryExpr) -> hir::Expr {
        let operand = self.check_expr(&u.operand);
        let ty = match (u.op, &operand.ty) {
            (UnaryOp::Neg, t) if t.is_numeric() => t.clone(),
            (UnaryOp::Not, Type::Bool) => Type::Bool,
            (_, Type::Error) => Type::Error,
            (op, t) => {
                let spelled = if op == UnaryOp::Neg { "-" } else { "!" };
                self.error(&u.span, format!("`{}` cannot be applied to `{}`", spelled, t.display(self.prog)));
                Type::Error
            }
        };
        hir::Expr::new(hir::ExprKind::Unary { op: u.op, operand: Box::new(operand) }, ty)
    }

    fn check_binary(&mut self, b: &ast::BinaryExpr) -> hir::Expr {
        use BinaryOp::*;
        // Short-circuit operators merge control flow through a joiner.
        if matches!(b.op, And | Or) {
            let left = self.check_expr(&b.left);
            let left = self.coerce(left, &Type::Bool, ConvCtx::Other, false, &b.left.span());
            let join = self.cfg.new_join();
            self.cfg.join_edge(join, self.cur);
            let right = self.check_expr(&b.right);
            let right = self.coerce(right, &Type::Bool, ConvCtx::Other, false, &b.right.span());
            self.cfg.join_edge(join, self.cur);
            self.cur = self.cfg.combine(join);
            return hir::Expr::new(
                hir::ExprKind::Binary { op: b.op, left: Box::new(left), right: Box::new(right) },
                Type::Bool,
            );
        }

        let left = self.check_expr(&b.left);
        let right = self.check_expr(&b.right);
        if matches!(left.ty, Type::Error) || matches!(right.ty, Type::Error) {
            return self.poison();
        }

        let stringish = |t: &Type| matches!(t, Type::String | Type::Null);

        // String concatenation: either operand a string makes `+` concat;
        // the other side is carried as an object and stringified by the
        // runtime.
        if b.op == Add && (matches!(left.ty, Type::String) || matches!(right.ty, Type::String)) {
            let obj = Type::Class(self.prog.object_class);
            let l = self.coerce(left, &obj, ConvCtx::MethodArg, false, &b.left.span());
            let r = self.coerce(right, &obj, ConvCtx::MethodArg, false, &b.right.span());
            return hir::Expr::new(
                hir::ExprKind::StrConcat { left: Box::new(l), right: Box::new(r) },
                Type::String,
            );
        }

        // String comparison is by value.
        if matches!(b.op, Eq | Ne)
            && stringish(&left.ty)
            && stringish(&right.ty)
            && (matches!(left.ty, Type::String) || matches!(right.ty, Type::String))
        {
            return hir::Expr::new(
                hir::ExprKind::StrCompare { op: b.op, left: Box::new(left), right: Box::new(right) },
                Type::Bool,
            );
        }

        // Reference identity.
        if matches!(b.op, Eq | Ne) && left.ty.is_reference() && right.ty.is_reference() {
            let lt = left.ty.clone();
            let rt = right.ty.clone();
            let related = matches!(lt, Type::Null)
                || matches!(rt, Type::Null)
                || is_subtype(self.prog, &lt, &rt)
                || is_subtype(self.prog, &rt, &lt);
            if !related {
                self.error(&b.span, format!(
                    "`{}` and `{}` can never be the same object",
                    lt.display(self.prog), rt.display(self.prog)
                ));
            }
            return hir::Expr::new(
                hir::ExprKind::Binary { op: b.op, left: Box::new(left), right: Box::new(right) },
                Type::Bool,
            );
        }

        // Boolean equality.
        if matches!(b.op, Eq | Ne) && matches!(left.ty, Type::Bool) && matches!(right.ty, Type::Bool) {
            return hir::Expr::new(
                hir::ExprKind::Binary { op: b.op, left: Box::new(left), right: Box::new(right) },
                Type::Bool,
            );
        }

        // Char comparisons without arithmetic.
        if matches!(b.op, Eq | Ne | Lt | Le | Gt | Ge)
            && matches!(left.ty, Type::Char)
            && matches!(right.ty, Type::Char)
        {
            return hir::Expr::new(
                hir::ExprKind::Binary { op: b.op, left: Box::new(left), right: Box::new(right) },
                Type::Bool,
            );
        }

        // Numeric operators with the usual widening to a common type.
        if left.ty.is_numeric() && right.ty.is_numeric() {
            let common = if matches!(left.ty, Type::Double) || matches!(right.ty, Type::Double) {
                Type::Double
            } else if matches!(left.ty, Type::Float) || matches!(right.ty, Type::Float) {
                Type::Float
            } else {
                Type::Int
            };
            if b.op == Rem && common != Type::Int {
                self.error(&b.span, "`%` requires integer operands");
            }
            let l = self.coerce(left, &common, ConvCtx::Other, false, &b.left.span());
            let r = self.coerce(right, &common, ConvCtx::Other, false, &b.right.span());
            let ty = match b.op {
                Add | Sub | Mul | Div | Rem => common,
                _ => Type::Bool,
            };
            return hir::Expr::new(
                hir::ExprKind::Binary { op: b.op, left: Box::new(l), right: Box::new(r) },
                ty,
            );
        }

        self.error(&b.span, format!(
            "operator cannot be applied to `{}` and `{}`",
            left.ty.display(self.prog), right.ty.display(self.prog)
        ));
        self.poison()
    }

    fn check_cond_expr(&mut self, c: &ast::CondExpr) -> hir::Expr {
        let cond = self.check_expr(&c.cond);
        let cond = self.coerce(cond, &Type::Bool, ConvCtx::Other, false, &c.cond.span());
        let branch = self.cur;
        let join = self.cfg.new_join();

        let then_expr = self.check_expr(&c.then_expr);
        self.cfg.join_edge(join, self.cur);
        self.cur = branch;
        let else_expr = self.check_expr(&c.else_expr);
        self.cfg.join_edge(join, self.cur);
        self.cur = self.cfg.combine(join);

        let (then_expr, else_expr, ty) = self.merge_branches(then_expr, else_expr, &c.span);
        hir::Expr::new(
            hir::ExprKind::Cond {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            ty,
        )
    }

    fn merge_branches(&mut self, t: hir::Expr, e: hir::Expr, span: &Span) -> (hir::Expr, hir::Expr, Type) {
        use crate::types::can_convert;
        if t.ty == e.ty {
            let ty = t.ty.clone();
            return (t, e, ty);
        }
        if can_convert(self.prog, &t.ty, &e.ty, ConvCtx::Other, false, false) {
            let ty = e.ty.clone();
            let t = self.coerce(t, &ty, ConvCtx::Other, false, span);
            return (t, e, ty);
        }
        if can_convert(self.prog, &e.ty, &t.ty, ConvCtx::Other, false, false) {
            let ty = t.ty.clone();
            let e = self.coerce(e, &ty, ConvCtx::Other, false, span);
            return (t, e, ty);
        }
        self.error(span, format!(
            "branches have incompatible types `{}` and `{}`",
            t.ty.display(self.prog), e.ty.display(self.prog)
        ));
        let ty = Type::Error;
        (t, e, ty)
    }

    // ---- places ---------------------------------------------------------

    /// Checks an expression in place (assignable) position. Returns the
    /// place, its declared type (with ownership), and its tracked form.
    /// Reads of the place itself are not recorded here; callers that read
    /// (compound assignment, increment) record the use explicitly.
    fn check_place(&mut self, e: &ast::Expr) -> Option<(hir::PlaceExpr, Type)> {
        match e {
            ast::Expr::Name(id) => {
                if let Some(lid) = self.lookup_local(&id.name) {
                    let ty = self.local(lid).ty.clone();
                    return Some((hir::PlaceExpr::Local(lid), ty));
                }
                if let Some(fid) = sema::find_field(self.prog, self.owner, &id.name) {
                    return self.field_place(None, fid, &id.span);
                }
                self.error(&id.span, format!("unknown name `{}`", id.name));
                None
            }
            ast::Expr::Member(m) => {
                if let ast::Expr::Name(n) = &*m.obj {
                    if self.lookup_local(&n.name).is_none()
                        && sema::find_field(self.prog, self.owner, &n.name).is_none()
                    {
                        if let Some(cid) = self.prog.class_by_name(&n.name) {
                            if let Some(fid) = sema::find_field(self.prog, cid, &m.name.name) {
                                let f = self.prog.field(fid);
                                if !f.is_static {
                                    self.error(&m.name.span, format!("field `{}` is not static", f.name));
                                    return None;
                                }
                                if f.is_const {
                                    self.error(&m.name.span, format!("cannot assign to const field `{}`", f.name));
                                    return None;
                                }
                                return Some((hir::PlaceExpr::Static(fid), f.ty.clone()));
                            }
                            self.error(&m.name.span, format!("no static field `{}`", m.name.name));
                            return None;
                        }
                    }
                }
                if matches!(&*m.obj, ast::Expr::This(_)) {
                    if let Some(fid) = sema::find_field(self.prog, self.owner, &m.name.name) {
                        return self.field_place(None, fid, &m.name.span);
                    }
                }
                let obj = self.check_expr(&m.obj);
                let cid = member_class(self.prog, &obj.ty)?;
                if let Some(fid) = sema::find_field(self.prog, cid, &m.name.name) {
                    return self.field_place(Some(Box::new(obj)), fid, &m.name.span);
                }
                self.error(&m.name.span, format!(
                    "no field `{}` on `{}`", m.name.name, obj.ty.display(self.prog)
                ));
                None
            }
            ast::Expr::Index(ix) => {
                let obj = self.check_expr(&ix.obj);
                match obj.ty.strip_own().clone() {
                    Type::Array(elem) => {
                        let idx = self.check_expr(&ix.index);
                        let idx = self.coerce(idx, &Type::Int, ConvCtx::Other, false, &ix.index.span());
                        Some((
                            hir::PlaceExpr::ArrayElem { obj: Box::new(obj), index: Box::new(idx) },
                            (*elem).clone(),
                        ))
                    }
                    Type::String => {
                        self.error(&ix.span, "strings are immutable");
                        None
                    }
                    Type::Error => None,
                    _ => {
                        self.error(
                            &ix.span,
                            "cannot assign through this receiver; bind it to a variable first",
                        );
                        None
                    }
                }
            }
            ast::Expr::Paren(inner, _) => self.check_place(inner),
            other => {
                self.error(&other.span(), "this expression is not assignable");
                None
            }
        }
    }

    fn field_place(
        &mut self,
        obj: Option<Box<hir::Expr>>,
        fid: crate::sema::FieldId,
        span: &Span,
    ) -> Option<(hir::PlaceExpr, Type)> {
        let f = self.prog.field(fid);
        if f.is_const {
            self.error(span, format!("cannot assign to const field `{}`", f.name));
            return None;
        }
        if !self.field_accessible(fid) {
            self.error(span, format!("field `{}` is inaccessible", f.name));
        }
        if f.is_static {
            return Some((hir::PlaceExpr::Static(fid), f.ty.clone()));
        }
        if obj.is_none() && self.is_static_context() {
            self.error(span, format!("field `{}` needs an instance", f.name));
            return None;
        }
        Some((hir::PlaceExpr::Field { obj, field: fid }, f.ty.clone()))
    }

    fn check_assign(&mut self, a: &ast::AssignExpr) -> hir::Expr {
        // Property and indexer targets lower to setter calls.
        if let Some(done) = self.try_accessor_assign(a) {
            return done;
        }

        let (place, place_ty) = match self.check_place(&a.target) {
            Some(p) => p,
            None => {
                let _ = self.check_expr(&a.value);
                return self.poison();
            }
        };

        let op = match a.op {
            ast::AssignOp::Assign => None,
            ast::AssignOp::Add => Some(BinaryOp::Add),
            ast::AssignOp::Sub => Some(BinaryOp::Sub),
            ast::AssignOp::Mul => Some(BinaryOp::Mul),
            ast::AssignOp::Div => Some(BinaryOp::Div),
        };
        if op.is_some() && !place_ty.is_numeric() {
            self.error(&a.span, "compound assignment requires a numeric target");
        }
        if op.is_some() {
            // A compound assignment reads the place.
            if let hir::PlaceExpr::Local(lid) = &place {
                self.local(*lid).uses.borrow_mut().push((self.cur, a.span.clone()));
            }
        }

        let ctx = match place {
            hir::PlaceExpr::Local(_) => ConvCtx::AssignVar,
            _ => ConvCtx::Other,
        };
        let value = self.check_expr(&a.value);
        let value = if op.is_some() {
            self.coerce(value, &place_ty, ConvCtx::Other, false, &a.value.span())
        } else {
            self.coerce(value, &place_ty, ctx, false, &a.value.span())
        };

        let node = self.cfg.add(self.cur);
        if let Some(tracked) = place.tracked() {
            self.cfg.add_sets(node, tracked);
        }
        if let Some(t) = super::destroyed_type(&place_ty) {
            self.cfg.add_destroy(node, t);
        }
        self.cur = node;
        if let hir::PlaceExpr::Local(lid) = &place {
            let local = self.local(*lid);
            local.mutable.set(true);
            local.assigns.borrow_mut().push(node);
        }

        hir::Expr::new(
            hir::ExprKind::Assign { place, op, value: Box::new(value) },
            place_ty,
        )
    }

    /// Lowers `obj.Prop = v` and `obj[i] = v` to setter calls when the
    /// member is a property or indexer. Returns `None` when the target is
    /// an ordinary storage location.
    fn try_accessor_assign(&mut self, a: &ast::AssignExpr) -> Option<hir::Expr> {
        if a.op != ast::AssignOp::Assign {
            return None;
        }
        match &*a.target {
            // A bare name that is a property of the current class.
            ast::Expr::Name(id) => {
                if self.lookup_local(&id.name).is_some()
                    || sema::find_field(self.prog, self.owner, &id.name).is_some()
                {
                    return None;
                }
                let setter = sema::resolve_call(
                    self.prog, self.owner, MethodKind::PropSet, &id.name, &[], Some(self.owner), false,
                ).ok()?;
                let value = self.check_expr(&a.value);
                let args = self.coerce_args(setter, vec![value], &a.span);
                let recv = Some(self.implicit_this(&id.span));
                let is_virtual = self.prog.method(setter).is_virtual;
                Some(self.emit_call(setter, recv, args, is_virtual, &a.span))
            }
            ast::Expr::Member(m) => {
                // Only when the name is not a field anywhere relevant.
                let recv_is_class = matches!(&*m.obj, ast::Expr::Name(n)
                    if self.lookup_local(&n.name).is_none()
                        && sema::find_field(self.prog, self.owner, &n.name).is_none()
                        && self.prog.class_by_name(&n.name).is_some());
                if recv_is_class {
                    return None;
                }
                let probe_class = match &*m.obj {
                    ast::Expr::This(_) => Some(self.owner),
                    _ => None,
                };
                // Fields win over properties, mirroring member reads.
                if let Some(cid) = probe_class {
                    if sema::find_field(self.prog, cid, &m.name.name).is_some() {
                        return None;
                    }
                    let setter = sema::resolve_call(
                        self.prog, cid, MethodKind::PropSet, &m.name.name, &[], Some(self.owner), false,
                    );
                    if let Ok(setter) = setter {
                        let value = self.check_expr(&a.value);
                        let args = self.coerce_args(setter, vec![value], &a.span);
                        let recv = Some(self.implicit_this(&m.span));
                        let is_virtual = self.prog.method(setter).is_virtual;
                        return Some(self.emit_call(setter, recv, args, is_virtual, &a.span));
                    }
                    return None;
                }
                // Decide field-vs-property from the probed receiver type
                // before checking anything, so the receiver is evaluated
                // exactly once on whichever path wins.
                let obj_ty = self.probe_type(&m.obj)?;
                let cid = member_class(self.prog, &obj_ty)?;
                if sema::find_field(self.prog, cid, &m.name.name).is_some() {
                    return None;
                }
                let setter = sema::resolve_call(
                    self.prog, cid, MethodKind::PropSet, &m.name.name, &[], Some(self.owner), false,
                ).ok()?;
                let obj = self.check_expr(&m.obj);
                let value = self.check_expr(&a.value);
                let args = self.coerce_args(setter, vec![value], &a.span);
                let is_virtual = self.prog.method(setter).is_virtual;
                Some(self.emit_call(setter, Some(Box::new(obj)), args, is_virtual, &a.span))
            }
            ast::Expr::Index(ix) => {
                // Array element stores go through the ordinary path.
                let is_indexer = {
                    let probe = self.probe_type(&ix.obj);
                    match probe {
                        Some(t) => !matches!(t.strip_own(), Type::Array(_) | Type::String),
                        None => false,
                    }
                };
                if !is_indexer {
                    return None;
                }
                let obj = self.check_expr(&ix.obj);
                let cid = member_class(self.prog, &obj.ty)?;
                let idx = self.check_expr(&ix.index);
                let value = self.check_expr(&a.value);
                let setter = sema::resolve_call(
                    self.prog, cid, MethodKind::IndexSet, "this[]",
                    &[idx.ty.clone(), value.ty.clone()], Some(self.owner), false,
                );
                match setter {
                    Ok(setter) => {
                        let args = self.coerce_args(setter, vec![idx, value], &a.span);
                        let is_virtual = self.prog.method(setter).is_virtual;
                        Some(self.emit_call(setter, Some(Box::new(obj)), args, is_virtual, &a.span))
                    }
                    Err(_) => {
                        self.error(&a.span, "no matching indexer setter");
                        Some(self.poison())
                    }
                }
            }
            _ => None,
        }
    }

    /// Best-effort type of an expression without checking it (no effects);
    /// used to steer assignment lowering.
    fn probe_type(&self, e: &ast::Expr) -> Option<Type> {
        match e {
            ast::Expr::Name(id) => {
                if let Some(lid) = self.lookup_local(&id.name) {
                    return Some(self.local(lid).ty.clone());
                }
                sema::find_field(self.prog, self.owner, &id.name)
                    .map(|fid| self.prog.field(fid).ty.clone())
            }
            ast::Expr::This(_) => Some(Type::Class(self.owner)),
            ast::Expr::Paren(inner, _) => self.probe_type(inner),
            ast::Expr::Member(m) => {
                let obj_ty = self.probe_type(&m.obj)?;
                let cid = member_class(self.prog, &obj_ty)?;
                sema::find_field(self.prog, cid, &m.name.name)
                    .map(|fid| self.prog.field(fid).ty.clone())
            }
            _ => None,
        }
    }

    fn check_incr(&mut self, i: &ast::IncrExpr) -> hir::Expr {
        let (place, place_ty) = match self.check_place(&i.operand) {
            Some(p) => p,
            None => return self.poison(),
        };
        if !place_ty.is_numeric() {
            self.error(&i.span, "increment requires a numeric variable");
        }
        if let hir::PlaceExpr::Local(lid) = &place {
            self.local(*lid).uses.borrow_mut().push((self.cur, i.span.clone()));
        }
        let node = self.cfg.add(self.cur);
        if let Some(tracked) = place.tracked() {
            self.cfg.add_sets(node, tracked);
        }
        self.cur = node;
        if let hir::PlaceExpr::Local(lid) = &place {
            let local = self.local(*lid);
            local.mutable.set(true);
            local.assigns.borrow_mut().push(node);
        }
        hir::Expr::new(
            hir::ExprKind::Incr { place, op: i.op, prefix: i.prefix },
            place_ty,
        )
    }

    fn check_take(&mut self, t: &ast::TakeExpr) -> hir::Expr {
        let (place, place_ty) = match self.check_place(&t.operand) {
            Some(p) => p,
            None => return self.poison(),
        };
        if !place_ty.is_own() {
            if !matches!(place_ty, Type::Error) {
                self.error(&t.span, "take requires an owning location");
            }
            return self.poison();
        }
        let node = self.cfg.add(self.cur);
        if let Some(tracked) = place.tracked() {
            self.cfg.set_takes(node, tracked);
            self.record_take_site(node, tracked, t.span.clone());
        }
        self.cur = node;
        hir::Expr::new(hir::ExprKind::Take { place }, place_ty)
    }

    fn check_cast(&mut self, c: &ast::CastExpr) -> hir::Expr {
        let to = match crate::resolve::resolve_type(self.prog, &c.ty, self.file, self.sink) {
            Some(t) => t,
            None => return self.poison(),
        };
        let operand = self.check_expr(&c.operand);
        self.coerce(operand, &to, ConvCtx::Other, true, &c.span)
    }
}
