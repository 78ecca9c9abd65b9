//! Per-method control-flow graph.
//!
//! The graph is threaded through checking: the checker holds a cursor (the
//! current node) and appends nodes as it walks statements. Two node kinds
//! exist: plain nodes with a single predecessor, and joiners that collect
//! edges from several predecessors at control-flow merges. A joiner with no
//! incoming edges reduces to the unreachable node and one with a single
//! edge reduces to that edge; downstream analyses rely on this and never
//! walk empty joiners.
//!
//! Traversals stamp nodes with a marker drawn from the program-wide
//! counter instead of keeping per-traversal visited sets.

use std::cell::Cell;

use crate::sema::{LocalId, FieldId, MethodId};
use crate::types::Type;

/// Identifies a node within its method's CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// A storage location tracked by the flow analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Local(LocalId),
    /// A field of `this`.
    ThisField(FieldId),
    /// A field reached through a local.
    LocalField(LocalId, FieldId),
}

/// Node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The synthetic method entry. Has no predecessors.
    Entry,
    /// The cursor value after a jump; nothing flows out of it.
    Unreachable,
    /// A program point with a fixed single predecessor.
    Plain,
    /// A control-flow merge with any number of predecessors.
    Join,
}

/// One CFG node with the effect queries the analyses use.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub preds: Vec<NodeId>,
    pub mark: Cell<u32>,
    /// The method called at this node, if any.
    pub call: Option<MethodId>,
    /// Places assigned by this node. A call assigns every out argument,
    /// so this is a list.
    pub sets: Vec<Place>,
    /// The place ownership is transferred away from at this node, if any.
    pub takes: Option<Place>,
    /// Static types destroyed when execution passes this node: locals
    /// going out of scope, owning values overwritten by assignment, and
    /// statement-end temporaries.
    pub destroys: Vec<Type>,
}

impl Node {
    fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            preds: Vec::new(),
            mark: Cell::new(0),
            call: None,
            sets: Vec::new(),
            takes: None,
            destroys: Vec::new(),
        }
    }
}

/// The per-method graph. Node 0 is the entry, node 1 the shared
/// unreachable node, node 2 the `exit_` joiner collecting all returns.
#[derive(Debug)]
pub struct Cfg {
    pub nodes: Vec<Node>,
}

pub const ENTRY: NodeId = NodeId(0);
pub const UNREACHABLE: NodeId = NodeId(1);
pub const EXIT: NodeId = NodeId(2);

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

impl Cfg {
    pub fn new() -> Cfg {
        let mut cfg = Cfg { nodes: Vec::new() };
        cfg.nodes.push(Node::new(NodeKind::Entry));
        cfg.nodes.push(Node::new(NodeKind::Unreachable));
        cfg.nodes.push(Node::new(NodeKind::Join)); // exit_
        cfg
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Appends a plain node after `pred` and returns it. Appending after
    /// the unreachable node produces a node that no traversal from the
    /// entry can reach.
    pub fn add(&mut self, pred: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut n = Node::new(NodeKind::Plain);
        n.preds.push(pred);
        self.nodes.push(n);
        id
    }

    /// Creates an empty joiner.
    pub fn new_join(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(NodeKind::Join));
        id
    }

    /// Adds an incoming edge to a joiner. Edges from the unreachable node
    /// are dropped: dead paths never merge.
    pub fn join_edge(&mut self, join: NodeId, from: NodeId) {
        if from == UNREACHABLE {
            return;
        }
        self.node_mut(join).preds.push(from);
    }

    /// Reduces a finished joiner: no incoming edges means the point is
    /// unreachable, exactly one means the joiner forwards that edge.
    pub fn combine(&mut self, join: NodeId) -> NodeId {
        match self.node(join).preds.len() {
            0 => UNREACHABLE,
            1 => self.node(join).preds[0],
            _ => join,
        }
    }

    /// Records a call effect on a node.
    pub fn set_call(&mut self, id: NodeId, method: MethodId) {
        self.node_mut(id).call = Some(method);
    }

    /// Records an assignment effect on a node.
    pub fn add_sets(&mut self, id: NodeId, place: Place) {
        self.node_mut(id).sets.push(place);
    }

    /// Records an ownership-transfer effect on a node.
    pub fn set_takes(&mut self, id: NodeId, place: Place) {
        self.node_mut(id).takes = Some(place);
    }

    /// Adds a destroyed type to a node.
    pub fn add_destroy(&mut self, id: NodeId, ty: Type) {
        self.node_mut(id).destroys.push(ty);
    }

    /// Successor lists, derived from the predecessor edges. Built once per
    /// analysis pass that needs forward walks.
    pub fn successors(&self) -> Vec<Vec<NodeId>> {
        let mut succs = vec![Vec::new(); self.nodes.len()];
        for (i, n) in self.nodes.iter().enumerate() {
            for &p in &n.preds {
                succs[p.0 as usize].push(NodeId(i as u32));
            }
        }
        succs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joiner_reduction() {
        let mut cfg = Cfg::new();
        let a = cfg.add(ENTRY);
        let j = cfg.new_join();
        // No edges: unreachable.
        assert_eq!(cfg.combine(j), UNREACHABLE);
        // One edge: forwards.
        let j2 = cfg.new_join();
        cfg.join_edge(j2, a);
        assert_eq!(cfg.combine(j2), a);
        // Two edges: stays a joiner.
        let b = cfg.add(ENTRY);
        let j3 = cfg.new_join();
        cfg.join_edge(j3, a);
        cfg.join_edge(j3, b);
        assert_eq!(cfg.combine(j3), j3);
    }

    #[test]
    fn dead_edges_are_dropped() {
        let mut cfg = Cfg::new();
        let j = cfg.new_join();
        cfg.join_edge(j, UNREACHABLE);
        assert_eq!(cfg.combine(j), UNREACHABLE);
    }

    #[test]
    fn successors_invert_preds() {
        let mut cfg = Cfg::new();
        let a = cfg.add(ENTRY);
        let b = cfg.add(a);
        let succs = cfg.successors();
        assert!(succs[ENTRY.0 as usize].contains(&a));
        assert!(succs[a.0 as usize].contains(&b));
    }
}
