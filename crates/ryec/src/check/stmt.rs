//! Statement checking: the CFG lowerings for each control construct.

use rye_ast as ast;
use rye_ast::{BinaryOp, IncrOp};

use super::{Checker, LoopCtx};
use crate::cfg::{Place, UNREACHABLE, EXIT};
use crate::hir;
use crate::sema::{Local, LocalId, MethodKind};
use crate::types::{member_class, ConvCtx, Type};

/// The type destroyed when `local` dies. Parameters are borrows unless
/// owning; locals destroy owning and string contents.
pub(super) fn local_destroyed_type(l: &Local) -> Option<Type> {
    if l.is_param {
        if l.mode == rye_ast::ParamMode::In && l.ty.is_own() {
            Some(l.ty.clone())
        } else {
            None
        }
    } else {
        super::destroyed_type(&l.ty)
    }
}

impl Checker<'_> {
    pub fn check_block(&mut self, b: &ast::Block) -> hir::Block {
        self.push_scope();
        let stmts = b.stmts.iter().map(|s| self.check_stmt(s)).collect();
        self.pop_scope();
        hir::Block { stmts }
    }

    pub fn check_stmt(&mut self, s: &ast::Stmt) -> hir::Stmt {
        match s {
            ast::Stmt::Local(d) => self.check_local_decl(d),
            ast::Stmt::Expr(es) => {
                let e = self.check_expr(&es.expr);
                let e = self.discard_value(e);
                self.flush_temps();
                hir::Stmt::Expr(e)
            }
            ast::Stmt::If(i) => self.check_if(i),
            ast::Stmt::While(w) => self.check_while(w),
            ast::Stmt::Do(d) => self.check_do(d),
            ast::Stmt::For(f) => self.check_for(f),
            ast::Stmt::Foreach(f) => self.check_foreach(f),
            ast::Stmt::Switch(sw) => self.check_switch(sw),
            ast::Stmt::Break(b) => self.check_break(&b.span),
            ast::Stmt::Continue(c) => self.check_continue(&c.span),
            ast::Stmt::Return(r) => self.check_return(r),
            ast::Stmt::Block(b) => hir::Stmt::Block(self.check_block(b)),
        }
    }

    fn check_local_decl(&mut self, d: &ast::LocalDecl) -> hir::Stmt {
        let ty = crate::resolve::resolve_type(self.prog, &d.ty, self.file, self.sink)
            .unwrap_or(Type::Error);
        if matches!(ty, Type::Void) {
            self.error(&d.span, "a variable cannot have type void");
        }
        if self.scope_has(&d.name.name) {
            self.error(&d.name.span, format!("`{}` is already declared in this scope", d.name.name));
        }
        let lid = self.declare_local(&d.name.name, ty.clone(), d.name.span.clone());
        let init = match &d.init {
            Some(e) => {
                let v = self.check_expr(e);
                let v = self.coerce(v, &ty, ConvCtx::AssignVar, false, &e.span());
                let n = self.cfg.add(self.cur);
                self.cfg.add_sets(n, Place::Local(lid));
                self.cur = n;
                self.local(lid).assigns.borrow_mut().push(n);
                Some(v)
            }
            None => None,
        };
        self.flush_temps();
        hir::Stmt::Local { local: lid, init }
    }

    /// An expression used as a statement: an owning result loses its
    /// ownership here and becomes a statement-scoped temporary.
    fn discard_value(&mut self, e: hir::Expr) -> hir::Expr {
        if e.ty.is_own() {
            let borrow = e.ty.strip_own().clone();
            self.adjust_ownership(e, &borrow)
        } else {
            e
        }
    }

    fn check_cond(&mut self, e: &ast::Expr) -> hir::Expr {
        let c = self.check_expr(e);
        self.coerce(c, &Type::Bool, ConvCtx::Other, false, &e.span())
    }

    fn check_if(&mut self, i: &ast::IfStmt) -> hir::Stmt {
        let cond = self.check_cond(&i.cond);
        self.flush_temps();
        let branch = self.cur;
        let join = self.cfg.new_join();

        self.push_scope();
        let then_branch = Box::new(self.check_stmt(&i.then_branch));
        self.pop_scope();
        let after_then = self.cur;
        self.cfg.join_edge(join, after_then);

        self.cur = branch;
        let else_branch = match &i.else_branch {
            Some(eb) => {
                self.push_scope();
                let s = self.check_stmt(eb);
                self.pop_scope();
                Some(Box::new(s))
            }
            None => None,
        };
        self.cfg.join_edge(join, self.cur);
        self.cur = self.cfg.combine(join);

        hir::Stmt::If { cond, then_branch, else_branch }
    }

    fn check_while(&mut self, w: &ast::WhileStmt) -> hir::Stmt {
        // The loop-entry joiner collects the pre-loop edge and back edges
        // from fall-through and continue.
        let header = self.cfg.new_join();
        self.cfg.join_edge(header, self.cur);
        self.cur = header;

        let cond = self.check_cond(&w.cond);
        self.flush_temps();
        let branch = self.cur;
        let exit = self.cfg.new_join();

        self.loops.push(LoopCtx {
            break_join: exit,
            continue_join: Some(header),
            depth: self.scope_depth(),
        });
        self.push_scope();
        let body = Box::new(self.check_stmt(&w.body));
        self.pop_scope();
        self.loops.pop();

        self.cfg.join_edge(header, self.cur);
        self.cfg.join_edge(exit, branch);
        self.cur = self.cfg.combine(exit);

        hir::Stmt::While { cond, body }
    }

    fn check_do(&mut self, d: &ast::DoStmt) -> hir::Stmt {
        let header = self.cfg.new_join();
        self.cfg.join_edge(header, self.cur);
        self.cur = header;

        let exit = self.cfg.new_join();
        let cont = self.cfg.new_join();
        self.loops.push(LoopCtx {
            break_join: exit,
            continue_join: Some(cont),
            depth: self.scope_depth(),
        });
        self.push_scope();
        let body = Box::new(self.check_stmt(&d.body));
        self.pop_scope();
        self.loops.pop();

        self.cfg.join_edge(cont, self.cur);
        self.cur = self.cfg.combine(cont);
        let cond = self.check_cond(&d.cond);
        self.flush_temps();
        self.cfg.join_edge(header, self.cur);
        self.cfg.join_edge(exit, self.cur);
        self.cur = self.cfg.combine(exit);

        hir::Stmt::Do { body, cond }
    }

    fn check_for(&mut self, f: &ast::ForStmt) -> hir::Stmt {
        // The initializer scope encloses condition, body, and step.
        self.push_scope();
        let init = match &f.init {
            Some(ast::ForInit::Local(d)) => Some(Box::new(self.check_local_decl(d))),
            Some(ast::ForInit::Expr(e)) => {
                let v = self.check_expr(e);
                let v = self.discard_value(v);
                self.flush_temps();
                Some(Box::new(hir::Stmt::Expr(v)))
            }
            None => None,
        };

        let header = self.cfg.new_join();
        self.cfg.join_edge(header, self.cur);
        self.cur = header;

        let cond = match &f.cond {
            Some(c) => {
                let c = self.check_cond(c);
                self.flush_temps();
                Some(c)
            }
            None => None,
        };
        let branch = self.cur;
        let exit = self.cfg.new_join();
        let step_join = self.cfg.new_join();

        self.loops.push(LoopCtx {
            break_join: exit,
            continue_join: Some(step_join),
            depth: self.scope_depth(),
        });
        self.push_scope();
        let body = Box::new(self.check_stmt(&f.body));
        self.pop_scope();
        self.loops.pop();

        self.cfg.join_edge(step_join, self.cur);
        self.cur = self.cfg.combine(step_join);
        let step = match &f.step {
            Some(e) => {
                let v = self.check_expr(e);
                let v = self.discard_value(v);
                self.flush_temps();
                Some(v)
            }
            None => None,
        };
        self.cfg.join_edge(header, self.cur);

        // Without a condition there is no false edge out of the loop.
        if cond.is_some() {
            self.cfg.join_edge(exit, branch);
        }
        self.cur = self.cfg.combine(exit);
        self.pop_scope();

        hir::Stmt::For { init, cond, step, body }
    }

    /// `foreach (T x in e)` is synthesized as: evaluate the collection
    /// once, then loop an index from 0 to Count-1 reading elements via
    /// the collection's indexer.
    fn check_foreach(&mut self, f: &ast::ForeachStmt) -> hir::Stmt {
        self.push_scope();

        let coll = self.check_expr(&f.collection);
        let coll_ty = coll.ty.clone();
        let tag = self.locals_len();
        let col_local = self.declare_local(&format!("__col{}", tag), coll_ty.clone(), f.span.clone());
        let n = self.cfg.add(self.cur);
        self.cfg.add_sets(n, Place::Local(col_local));
        self.cur = n;
        self.local(col_local).assigns.borrow_mut().push(n);
        self.flush_temps();

        let idx_local = self.declare_local(&format!("__idx{}", tag), Type::Int, f.span.clone());
        let n = self.cfg.add(self.cur);
        self.cfg.add_sets(n, Place::Local(idx_local));
        self.cur = n;
        self.local(idx_local).assigns.borrow_mut().push(n);

        // Count lookup on the collection's class.
        let elem_class = member_class(self.prog, &coll_ty);
        let count_method = elem_class.and_then(|cid| {
            crate::sema::resolve_call(self.prog, cid, MethodKind::PropGet, "Count", &[],
                                      Some(self.owner), false).ok()
        });
        let count_method = match count_method {
            Some(m) => m,
            None => {
                self.error(&f.collection.span(), format!(
                    "`{}` is not enumerable (no Count property)",
                    coll_ty.display(self.prog)
                ));
                self.pop_scope();
                return hir::Stmt::Block(hir::Block { stmts: Vec::new() });
            }
        };

        let header = self.cfg.new_join();
        self.cfg.join_edge(header, self.cur);
        self.cur = header;

        // i < col.Count
        let count_node = self.cfg.add(self.cur);
        self.cfg.set_call(count_node, count_method);
        self.cur = count_node;
        let col_read = |ty: &Type| {
            hir::Expr::new(hir::ExprKind::Local(col_local), ty.strip_own().clone())
        };
        let cond = hir::Expr::new(
            hir::ExprKind::Binary {
                op: BinaryOp::Lt,
                left: Box::new(hir::Expr::new(hir::ExprKind::Local(idx_local), Type::Int)),
                right: Box::new(hir::Expr::new(
                    hir::ExprKind::Call {
                        method: count_method,
                        recv: Some(Box::new(col_read(&coll_ty))),
                        args: Vec::new(),
                        virtual_call: self.prog.method(count_method).is_virtual,
                    },
                    Type::Int,
                )),
            },
            Type::Bool,
        );
        let branch = self.cur;
        let exit = self.cfg.new_join();
        let step_join = self.cfg.new_join();

        self.loops.push(LoopCtx {
            break_join: exit,
            continue_join: Some(step_join),
            depth: self.scope_depth(),
        });
        self.push_scope();

        // T x = col[i];
        let elem_ty = crate::resolve::resolve_type(self.prog, &f.elem_ty, self.file, self.sink)
            .unwrap_or(Type::Error);
        let elem_read = match coll_ty.strip_own() {
            Type::Array(elem) => hir::Expr::new(
                hir::ExprKind::ArrayGet {
                    obj: Box::new(col_read(&coll_ty)),
                    index: Box::new(hir::Expr::new(hir::ExprKind::Local(idx_local), Type::Int)),
                },
                elem.strip_own().clone(),
            ),
            _ => {
                let item = elem_class.and_then(|cid| {
                    crate::sema::resolve_call(self.prog, cid, MethodKind::IndexGet, "this[]",
                                              &[Type::Int], Some(self.owner), false).ok()
                });
                match item {
                    Some(m) => {
                        let n = self.cfg.add(self.cur);
                        self.cfg.set_call(n, m);
                        self.cur = n;
                        hir::Expr::new(
                            hir::ExprKind::Call {
                                method: m,
                                recv: Some(Box::new(col_read(&coll_ty))),
                                args: vec![hir::Expr::new(hir::ExprKind::Local(idx_local), Type::Int)],
                                virtual_call: self.prog.method(m).is_virtual,
                            },
                            self.prog.method(m).ret.clone(),
                        )
                    }
                    None => {
                        self.error(&f.collection.span(), "collection has no indexer");
                        self.poison()
                    }
                }
            }
        };
        let elem_read = self.coerce(elem_read, &elem_ty, ConvCtx::AssignVar, false, &f.span);
        let elem_local = self.declare_local(&f.name.name, elem_ty, f.name.span.clone());
        let n = self.cfg.add(self.cur);
        self.cfg.add_sets(n, Place::Local(elem_local));
        self.cur = n;
        self.local(elem_local).assigns.borrow_mut().push(n);

        let user_body = self.check_stmt(&f.body);
        self.pop_scope();
        self.loops.pop();

        // ++i and the back edge.
        self.cfg.join_edge(step_join, self.cur);
        self.cur = self.cfg.combine(step_join);
        if self.cur != UNREACHABLE {
            let n = self.cfg.add(self.cur);
            self.cfg.add_sets(n, Place::Local(idx_local));
            self.cur = n;
            self.local(idx_local).assigns.borrow_mut().push(n);
        }
        self.cfg.join_edge(header, self.cur);
        self.cfg.join_edge(exit, branch);
        self.cur = self.cfg.combine(exit);
        self.pop_scope();

        let body = hir::Stmt::Block(hir::Block {
            stmts: vec![
                hir::Stmt::Local { local: elem_local, init: Some(elem_read) },
                user_body,
            ],
        });
        hir::Stmt::Block(hir::Block {
            stmts: vec![
                hir::Stmt::Local { local: col_local, init: Some(coll) },
                hir::Stmt::Local {
                    local: idx_local,
                    init: Some(hir::Expr::new(hir::ExprKind::IntLit(0), Type::Int)),
                },
                hir::Stmt::For {
                    init: None,
                    cond: Some(cond),
                    step: Some(hir::Expr::new(
                        hir::ExprKind::Incr {
                            place: hir::PlaceExpr::Local(idx_local),
                            op: IncrOp::Inc,
                            prefix: true,
                        },
                        Type::Int,
                    )),
                    body: Box::new(body),
                },
            ],
        })
    }

    fn check_switch(&mut self, sw: &ast::SwitchStmt) -> hir::Stmt {
        let scrutinee = self.check_expr(&sw.scrutinee);
        let scrutinee_ty = match scrutinee.ty {
            Type::Int | Type::Char => scrutinee.ty.clone(),
            Type::Error => Type::Error,
            _ => {
                self.error(&sw.scrutinee.span(), "switch requires an int or char scrutinee");
                Type::Error
            }
        };
        self.flush_temps();
        let branch = self.cur;
        let exit = self.cfg.new_join();

        self.loops.push(LoopCtx {
            break_join: exit,
            continue_join: None,
            depth: self.scope_depth(),
        });

        let mut seen_values: Vec<i64> = Vec::new();
        let mut has_default = false;
        let mut sections = Vec::new();
        for section in &sw.sections {
            self.cur = branch;
            let mut labels = Vec::new();
            for label in &section.labels {
                match label {
                    ast::SwitchLabel::Case(e) => {
                        let l = self.check_expr(e);
                        let l = self.coerce(l, &scrutinee_ty, ConvCtx::Other, false, &e.span());
                        let val = match &l.kind {
                            hir::ExprKind::IntLit(v) => Some(*v as i64),
                            hir::ExprKind::CharLit(v) => Some(*v as i64),
                            _ => None,
                        };
                        match val {
                            Some(v) if seen_values.contains(&v) => {
                                self.error(&e.span(), "duplicate case value");
                            }
                            Some(v) => seen_values.push(v),
                            None => self.error(&e.span(), "case labels must be literal values"),
                        }
                        labels.push(Some(l));
                    }
                    ast::SwitchLabel::Default(span) => {
                        if has_default {
                            self.error(span, "duplicate default section");
                        }
                        has_default = true;
                        labels.push(None);
                    }
                }
            }
            self.push_scope();
            let body: Vec<hir::Stmt> = section.body.iter().map(|s| self.check_stmt(s)).collect();
            self.pop_scope();
            // Falling out of a section into the next one is an error: every
            // section must end in a jump.
            if self.cur != UNREACHABLE {
                self.error(&section.span, "switch section falls through; end it with break or return");
            }
            sections.push(hir::SwitchSection { labels, body });
        }
        self.loops.pop();

        if !has_default {
            self.cfg.join_edge(exit, branch);
        }
        self.cur = self.cfg.combine(exit);

        hir::Stmt::Switch { scrutinee, sections }
    }

    fn check_break(&mut self, span: &rye_ast::Span) -> hir::Stmt {
        let (target, depth) = match self.loops.last() {
            Some(ctx) => (ctx.break_join, ctx.depth),
            None => {
                self.error(span, "break outside a loop or switch");
                return hir::Stmt::Break;
            }
        };
        self.jump(target, depth);
        hir::Stmt::Break
    }

    fn check_continue(&mut self, span: &rye_ast::Span) -> hir::Stmt {
        let target = self.loops.iter().rev().find_map(|ctx| {
            ctx.continue_join.map(|j| (j, ctx.depth))
        });
        let (target, depth) = match target {
            Some(t) => t,
            None => {
                self.error(span, "continue outside a loop");
                return hir::Stmt::Continue;
            }
        };
        self.jump(target, depth);
        hir::Stmt::Continue
    }

    /// A jump out of the scopes deeper than `depth`: destroys exactly the
    /// locals of the scopes being left, then joins the target.
    fn jump(&mut self, target: crate::cfg::NodeId, depth: usize) {
        let destroyed = self.unwound_local_destroys(depth);
        let n = self.cfg.add(self.cur);
        for t in destroyed {
            self.cfg.add_destroy(n, t);
        }
        self.cur = n;
        self.cfg.join_edge(target, self.cur);
        self.cur = UNREACHABLE;
    }

    fn check_return(&mut self, r: &ast::ReturnStmt) -> hir::Stmt {
        let ret_ty = self.ret_type();
        let value = match (&r.value, matches!(ret_ty, Type::Void)) {
            (Some(e), true) => {
                self.error(&r.span, "void method returns a value");
                let _ = self.check_expr(e);
                None
            }
            (Some(e), false) => {
                let v = self.check_expr(e);
                Some(self.coerce(v, &ret_ty, ConvCtx::Other, false, &e.span()))
            }
            (None, false) => {
                self.error(&r.span, "non-void method returns without a value");
                None
            }
            (None, true) => None,
        };

        // Temporaries, then every live scope's locals, then the owning
        // parameters die on the way out.
        let mut destroyed = std::mem::take(self.temps_mut());
        destroyed.extend(self.unwound_local_destroys(0));
        let n = self.cfg.add(self.cur);
        for t in destroyed {
            self.cfg.add_destroy(n, t);
        }
        self.cur = n;
        self.cfg.join_edge(EXIT, self.cur);
        self.cur = UNREACHABLE;

        hir::Stmt::Return(value)
    }
}
