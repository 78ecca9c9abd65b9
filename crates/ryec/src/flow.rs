//! Definite-assignment and ownership-transfer checking.
//!
//! Both checks are backward walks over the finished CFG. For every use of
//! every local, the walk runs from the use toward the entry, stopping at
//! nodes that assign the local; reaching a node with no predecessor means
//! some path uses the value unassigned. Out parameters run the same walk
//! from the method's `exit_` joiner. `take` sites run it to find a second
//! transfer on the same path.
//!
//! Each walk stamps nodes with a fresh marker from the program counter,
//! so no per-walk visited sets are allocated.

use rye_ast::ParamMode;

use crate::cfg::{Cfg, NodeId, Place, EXIT};
use crate::check::TakeSite;
use crate::diagnostics::DiagnosticSink;
use crate::sema::{Local, Method, Program};

/// Runs the per-method flow checks once its CFG is complete.
pub fn check_method_flow(
    prog: &Program,
    method: &Method,
    cfg: &Cfg,
    locals: &[Local],
    take_sites: &[TakeSite],
    sink: &DiagnosticSink,
) {
    for (i, local) in locals.iter().enumerate() {
        let place = Place::Local(crate::sema::LocalId(i as u32));
        for (node, span) in local.uses.borrow().iter() {
            check_use(prog, method, cfg, local, place, *node, span, sink);
        }
    }

    for (i, local) in locals.iter().enumerate() {
        if local.is_param && local.mode == ParamMode::Out {
            let place = Place::Local(crate::sema::LocalId(i as u32));
            check_out_param(prog, method, cfg, local, place, sink);
        }
    }

    for site in take_sites {
        check_take_site(prog, method, cfg, locals, site, sink);
    }
}

fn report(prog: &Program, method: &Method, span_start: usize, msg: String, sink: &DiagnosticSink) {
    let line = prog.line_of(method.file, span_start);
    sink.report(&prog.files[method.file].path, line, msg);
}

/// What a backward walk ran into first on some path.
enum WalkResult {
    /// Every path hit an assignment of the place.
    Assigned,
    /// Some path reached a node with no predecessor.
    Start,
    /// Some path crossed an ownership transfer of the place.
    Taken,
}

/// Walks backwards from `from` (inclusive), stopping at assignments of
/// `place`. Transfers of `place` win over reaching the start.
fn walk_back(prog: &Program, cfg: &Cfg, place: Place, from: NodeId) -> WalkResult {
    let mark = prog.next_mark();
    let mut stack = vec![from];
    let mut reached_start = false;
    while let Some(id) = stack.pop() {
        let node = cfg.node(id);
        if node.mark.get() == mark {
            continue;
        }
        node.mark.set(mark);
        if node.takes == Some(place) {
            return WalkResult::Taken;
        }
        if node.sets.contains(&place) {
            continue;
        }
        if node.preds.is_empty() {
            reached_start = true;
            continue;
        }
        stack.extend_from_slice(&node.preds);
    }
    if reached_start {
        WalkResult::Start
    } else {
        WalkResult::Assigned
    }
}

fn check_use(
    prog: &Program,
    method: &Method,
    cfg: &Cfg,
    local: &Local,
    place: Place,
    use_node: NodeId,
    span: &rye_ast::Span,
    sink: &DiagnosticSink,
) {
    match walk_back(prog, cfg, place, use_node) {
        WalkResult::Assigned => {}
        WalkResult::Start => report(
            prog,
            method,
            span.start,
            format!("`{}` may be used before it is assigned", local.name),
            sink,
        ),
        WalkResult::Taken => report(
            prog,
            method,
            span.start,
            format!("`{}` may be used after its ownership is transferred", local.name),
            sink,
        ),
    }
}

fn check_out_param(
    prog: &Program,
    method: &Method,
    cfg: &Cfg,
    local: &Local,
    place: Place,
    sink: &DiagnosticSink,
) {
    // A method that never reaches exit_ has nothing to prove.
    if cfg.node(EXIT).preds.is_empty() {
        return;
    }
    if matches!(walk_back(prog, cfg, place, EXIT), WalkResult::Start) {
        report(
            prog,
            method,
            method.span.start,
            format!("out parameter `{}` must be assigned before the method returns", local.name),
            sink,
        );
    }
}

fn check_take_site(
    prog: &Program,
    method: &Method,
    cfg: &Cfg,
    locals: &[Local],
    site: &TakeSite,
    sink: &DiagnosticSink,
) {
    // Walk from the predecessors so the site's own transfer is not seen.
    let mark = prog.next_mark();
    let mut stack: Vec<NodeId> = cfg.node(site.node).preds.clone();
    let mut reached_start = false;
    while let Some(id) = stack.pop() {
        let node = cfg.node(id);
        if node.mark.get() == mark {
            continue;
        }
        node.mark.set(mark);
        if node.takes == Some(site.place) {
            report(
                prog,
                method,
                site.span.start,
                "can't transfer ownership; it was already transferred on this path".to_string(),
                sink,
            );
            return;
        }
        if node.sets.contains(&site.place) {
            continue;
        }
        if node.preds.is_empty() {
            reached_start = true;
            continue;
        }
        stack.extend_from_slice(&node.preds);
    }
    // An owning local taken before any assignment is a use of an
    // unassigned value.
    if reached_start {
        if let Place::Local(lid) = site.place {
            let local = &locals[lid.0 as usize];
            if !local.is_param {
                report(
                    prog,
                    method,
                    site.span.start,
                    format!("`{}` may be used before it is assigned", local.name),
                    sink,
                );
            }
        }
    }
}
