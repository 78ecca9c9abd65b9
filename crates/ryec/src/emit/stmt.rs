//! Statement emission.
//!
//! Scope-based destruction falls out of C++ block structure: handles
//! declared in a block release when the block exits on any path, which is
//! exactly what the CFG's scope-end destroy nodes modeled.

use super::{decls::spaced, Emitter, Slot};
use crate::hir;
use crate::sema::{LocalId, MethodId};
use crate::types::Type;

impl Emitter<'_> {
    pub(super) fn emit_body(&mut self, mid: MethodId) {
        self.emit_body_from(mid, 0);
    }

    pub(super) fn emit_body_from(&mut self, mid: MethodId, start: usize) {
        let body = self.prog.method(mid).body.borrow();
        if let Some(block) = body.as_ref() {
            for s in block.stmts.iter().skip(start) {
                self.emit_stmt(s);
            }
        }
    }

    fn emit_stmt(&mut self, s: &hir::Stmt) {
        match s {
            hir::Stmt::Local { local, init } => {
                let decl = self.local_decl(*local, init.as_ref());
                self.line(&decl);
            }
            hir::Stmt::Expr(e) => {
                let s = self.expr_str(e);
                self.line(&format!("{};", s));
            }
            hir::Stmt::If { cond, then_branch, else_branch } => {
                let c = self.expr_str(cond);
                self.open(&format!("if ({}) {{", c));
                self.emit_stmt(then_branch);
                match else_branch {
                    Some(eb) => {
                        self.close("} else {");
                        self.indent_in();
                        self.emit_stmt(eb);
                        self.close("}");
                    }
                    None => self.close("}"),
                }
            }
            hir::Stmt::While { cond, body } => {
                let c = self.expr_str(cond);
                self.open(&format!("while ({}) {{", c));
                self.emit_stmt(body);
                self.close("}");
            }
            hir::Stmt::Do { body, cond } => {
                self.open("do {");
                self.emit_stmt(body);
                let c = self.expr_str(cond);
                self.close(&format!("}} while ({});", c));
            }
            hir::Stmt::For { init, cond, step, body } => {
                let init_s = match init {
                    Some(s) => self.stmt_inline(s),
                    None => String::new(),
                };
                let cond_s = match cond {
                    Some(c) => self.expr_str(c),
                    None => String::new(),
                };
                let step_s = match step {
                    Some(s) => self.expr_str(s),
                    None => String::new(),
                };
                self.open(&format!("for ({}; {}; {}) {{", init_s, cond_s, step_s));
                self.emit_stmt(body);
                self.close("}");
            }
            hir::Stmt::Switch { scrutinee, sections } => {
                let s = self.expr_str(scrutinee);
                self.open(&format!("switch ({}) {{", s));
                for section in sections {
                    for label in &section.labels {
                        match label {
                            Some(e) => {
                                let l = self.expr_str(e);
                                self.line(&format!("case {}:", l));
                            }
                            None => self.line("default:"),
                        }
                    }
                    self.indent_in();
                    for st in &section.body {
                        self.emit_stmt(st);
                    }
                    self.indent_out();
                }
                self.close("}");
            }
            hir::Stmt::Break => self.line("break;"),
            hir::Stmt::Continue => self.line("continue;"),
            hir::Stmt::Return(value) => match value {
                Some(e) => {
                    let v = self.expr_str(e);
                    self.line(&format!("return {};", v));
                }
                None => self.line("return;"),
            },
            hir::Stmt::Block(b) => {
                self.open("{");
                for st in &b.stmts {
                    self.emit_stmt(st);
                }
                self.close("}");
            }
        }
    }

    /// Spells a local declaration. Handles initialize with constructor
    /// syntax, everything else with `=`.
    fn local_decl(&mut self, lid: LocalId, init: Option<&hir::Expr>) -> String {
        let mid = self.cur_method.expect("local declaration outside a method");
        let (name, ty, needs_ref) = {
            let m = self.prog.method(mid);
            let locals = m.locals.borrow();
            let l = &locals[lid.0 as usize];
            (l.name.clone(), l.ty.clone(), l.needs_ref.get())
        };
        let slot = if needs_ref && matches!(ty, Type::Class(_) | Type::Array(_)) {
            Slot::CountedLocal
        } else {
            Slot::Local
        };
        let (cpp, is_handle) = self.slot_type(&ty, slot);
        match init {
            Some(e) => {
                let v = self.expr_str(e);
                if is_handle {
                    format!("{}{}({});", spaced(&cpp), name, v)
                } else {
                    format!("{}{} = {};", spaced(&cpp), name, v)
                }
            }
            None => format!("{}{};", spaced(&cpp), name),
        }
    }

    /// A statement spelled inline in a `for` header, without the
    /// terminating semicolon.
    fn stmt_inline(&mut self, s: &hir::Stmt) -> String {
        let spelled = match s {
            hir::Stmt::Local { local, init } => self.local_decl(*local, init.as_ref()),
            hir::Stmt::Expr(e) => format!("{};", self.expr_str(e)),
            _ => String::from(";"),
        };
        spelled.trim_end_matches(';').to_string()
    }
}
