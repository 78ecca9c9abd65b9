//! Reference-count necessity analysis.
//!
//! Decides, for each non-owning reference local and each guarded
//! expression value, whether emitted code must hold it in a counting
//! handle. A local needs one iff a forward walk from one of its
//! assignments reaches a node that can destroy its type before another
//! assignment kills the binding. A guarded value needs one iff the
//! variable it came from may be reassigned between capture and use (moot
//! when there is no variable) and some node in between can destroy its
//! type.
//!
//! Locals of the root object type are flagged unconditionally: a string
//! reached through an object alias is not otherwise modeled by the
//! destruction sets.
//!
//! With `-r` everything eligible is flagged, turning the optimization off.

use crate::cfg::{Cfg, Node, NodeId, Place};
use crate::destroy::{method_destroys, var_destroys};
use crate::sema::{LocalId, Method, Program};
use crate::types::Type;

/// Runs the analysis over every checked method. `pessimistic` is `-r`.
pub fn analyze(prog: &Program, pessimistic: bool) {
    for class in &prog.classes {
        if class.is_extern {
            continue;
        }
        for &mid in &class.methods {
            let method = prog.method(mid);
            if method.cfg.borrow().is_some() {
                analyze_method(prog, method, pessimistic);
            }
        }
    }
}

/// True if executing `node` can destroy a value of static type `ty`:
/// either the method called here destroys it, or the node's own
/// destruction effects cover it.
fn can_destroy(prog: &Program, node: &Node, ty: &Type) -> bool {
    if let Some(callee) = node.call {
        if method_destroys(prog, callee).intersects_type(prog, ty) {
            return true;
        }
    }
    node.destroys
        .iter()
        .any(|d| var_destroys(prog, d).intersects_type(prog, ty))
}

/// Non-owning reference locals are the analysis subjects. Owning, string,
/// and object-typed storage always uses a managing handle anyway.
fn eligible_local(prog: &Program, ty: &Type) -> LocalClass {
    match ty {
        Type::Class(c) if *c == prog.object_class => LocalClass::RootObject,
        Type::Class(_) | Type::Array(_) => LocalClass::Analyzed,
        _ => LocalClass::Skip,
    }
}

enum LocalClass {
    Analyzed,
    RootObject,
    Skip,
}

fn analyze_method(prog: &Program, method: &Method, pessimistic: bool) {
    let cfg_ref = method.cfg.borrow();
    let cfg = cfg_ref.as_ref().expect("analyze_method needs a CFG");
    let succs = cfg.successors();
    let locals = method.locals.borrow();

    for (i, local) in locals.iter().enumerate() {
        if local.is_param {
            // A parameter borrow is guarded on the caller's side for the
            // whole call.
            continue;
        }
        match eligible_local(prog, &local.ty) {
            LocalClass::Skip => {}
            LocalClass::RootObject => local.needs_ref.set(true),
            LocalClass::Analyzed => {
                if pessimistic {
                    local.needs_ref.set(true);
                    continue;
                }
                let lid = LocalId(i as u32);
                let assigns = local.assigns.borrow().clone();
                if local_binding_endangered(prog, cfg, &succs, lid, &assigns, &local.ty) {
                    local.needs_ref.set(true);
                }
            }
        }
    }

    for guard in method.guards.borrow().iter() {
        // Owning values are not endangered by destruction of their type;
        // everything else reference-like is a borrow that can dangle (or,
        // for strings, a count that keeps the value alive).
        let eligible = matches!(guard.ty, Type::String | Type::Class(_) | Type::Array(_));
        if !eligible {
            continue;
        }
        if pessimistic {
            guard.needs_ref.set(true);
            continue;
        }
        let (destroyed, reassigned) =
            span_effects(prog, cfg, &succs, guard.start, guard.end.get(), guard.local, &guard.ty);
        let var_may_change = match guard.local {
            Some(_) => reassigned,
            None => true,
        };
        if destroyed && var_may_change {
            guard.needs_ref.set(true);
        }
    }
}

/// Forward walk from every assignment of `lid`: true if some path reaches
/// a node that can destroy `ty` before the next assignment of `lid`.
fn local_binding_endangered(
    prog: &Program,
    cfg: &Cfg,
    succs: &[Vec<NodeId>],
    lid: LocalId,
    assigns: &[NodeId],
    ty: &Type,
) -> bool {
    let place = Place::Local(lid);
    for &assign in assigns {
        let mark = prog.next_mark();
        let mut stack: Vec<NodeId> = succs[assign.0 as usize].clone();
        while let Some(id) = stack.pop() {
            let node = cfg.node(id);
            if node.mark.get() == mark {
                continue;
            }
            node.mark.set(mark);
            if can_destroy(prog, node, ty) {
                return true;
            }
            if node.sets.contains(&place) {
                continue; // the binding is replaced here
            }
            stack.extend_from_slice(&succs[id.0 as usize]);
        }
    }
    false
}

/// Effects of the nodes strictly after `start` up to and including `end`:
/// whether any can destroy `ty`, and whether any reassigns `local`.
fn span_effects(
    prog: &Program,
    cfg: &Cfg,
    succs: &[Vec<NodeId>],
    start: NodeId,
    end: NodeId,
    local: Option<LocalId>,
    ty: &Type,
) -> (bool, bool) {
    if start == end {
        return (false, false);
    }
    let place = local.map(Place::Local);
    let mark = prog.next_mark();
    let mut destroyed = false;
    let mut reassigned = false;
    let mut stack: Vec<NodeId> = succs[start.0 as usize].clone();
    while let Some(id) = stack.pop() {
        let node = cfg.node(id);
        if node.mark.get() == mark {
            continue;
        }
        node.mark.set(mark);
        if can_destroy(prog, node, ty) {
            destroyed = true;
        }
        if let Some(p) = place {
            if node.sets.contains(&p) {
                reassigned = true;
            }
        }
        if id == end {
            continue; // the consuming node ends the span
        }
        stack.extend_from_slice(&succs[id.0 as usize]);
    }
    (destroyed, reassigned)
}
