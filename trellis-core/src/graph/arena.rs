//! Node Arena
//!
//! All nodes live in one slot map owned by the thread's runtime. Edges are
//! plain [`NodeId`]s in both directions, so adding and removing them never
//! touches a reference count and a removed node cannot be reached through a
//! stale id.

use slotmap::SlotMap;

use super::node::{NodeId, NodeKind, NodeState, ReactiveNode};

/// The dependency graph and ownership tree of one runtime.
#[derive(Default)]
pub(crate) struct Graph {
    nodes: SlotMap<NodeId, ReactiveNode>,
    next_seq: u64,
}

impl Graph {
    /// Add a node of the given kind and return its id.
    pub(crate) fn insert(&mut self, kind: NodeKind) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.insert(ReactiveNode::new(kind, seq))
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&ReactiveNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut ReactiveNode> {
        self.nodes.get_mut(id)
    }

    /// The node's state, or `Disposed` if it is gone from the arena.
    pub(crate) fn state(&self, id: NodeId) -> NodeState {
        self.nodes
            .get(id)
            .map_or(NodeState::Disposed, |node| node.state)
    }

    pub(crate) fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|node| node.kind)
    }

    /// Add a dependency edge: `observer` read `source`.
    ///
    /// Both sides are updated. Edges to or from a disposed node are ignored.
    pub(crate) fn add_edge(&mut self, source: NodeId, observer: NodeId) {
        let live = |node: Option<&ReactiveNode>| node.is_some_and(|n| !n.is_disposed());
        if !live(self.nodes.get(source)) || !live(self.nodes.get(observer)) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(source) {
            node.observers.insert(observer);
        }
        if let Some(node) = self.nodes.get_mut(observer) {
            node.sources.insert(source);
        }
    }

    /// Remove a dependency edge.
    pub(crate) fn remove_edge(&mut self, source: NodeId, observer: NodeId) {
        if let Some(node) = self.nodes.get_mut(source) {
            node.observers.shift_remove(&observer);
        }
        if let Some(node) = self.nodes.get_mut(observer) {
            node.sources.shift_remove(&source);
        }
    }

    /// Drop every source and observer edge of `id`.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let sources = std::mem::take(&mut node.sources);
        let observers = std::mem::take(&mut node.observers);

        for source in sources {
            if let Some(source) = self.nodes.get_mut(source) {
                source.observers.shift_remove(&id);
            }
        }
        for observer in observers {
            if let Some(observer) = self.nodes.get_mut(observer) {
                observer.sources.shift_remove(&id);
            }
        }
    }

    /// Remove a node from the arena.
    ///
    /// Also removes all edges involving this node and unlinks it from its
    /// parent. Children must already have been removed.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<ReactiveNode> {
        self.detach(id);
        let node = self.nodes.remove(id)?;
        debug_assert!(
            node.children.iter().all(|child| !self.nodes.contains_key(*child)),
            "node removed before its children"
        );
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|child| *child != id);
        }
        Some(node)
    }

    /// Get the total number of nodes in the graph.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeId, &ReactiveNode)> {
        self.nodes.iter()
    }
}
