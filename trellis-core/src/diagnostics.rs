//! Graph Snapshots
//!
//! A point-in-time, serializable view of the current thread's reactive
//! graph, for debugging tools and tests.

use serde::Serialize;
use slotmap::Key;

use crate::graph::{NodeId, NodeKind, NodeState};
use crate::reactive::Runtime;

/// One node of a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    /// Stable numeric form of the node id.
    pub id: u64,
    pub kind: NodeKind,
    pub state: NodeState,
    pub name: Option<String>,
    /// Id of the owning node, if any.
    pub parent: Option<u64>,
    pub sources: usize,
    pub observers: usize,
    pub children: usize,
    pub cleanups: usize,
}

/// Every live node, in creation order, plus the queue length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub pending: usize,
}

impl GraphSnapshot {
    /// Find a node by id.
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        let id = id.data().as_ffi();
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Count nodes of a kind.
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|node| node.kind == kind).count()
    }
}

/// Take a snapshot of the current thread's graph.
pub fn snapshot() -> GraphSnapshot {
    Runtime::with(|rt| {
        let graph = rt.graph.borrow();
        let mut nodes: Vec<(u64, NodeSnapshot)> = graph
            .iter()
            .map(|(id, node)| {
                let snapshot = NodeSnapshot {
                    id: id.data().as_ffi(),
                    kind: node.kind,
                    state: node.state,
                    name: node.name.as_ref().map(|name| name.to_string()),
                    parent: node.parent.map(|parent| parent.data().as_ffi()),
                    sources: node.sources.len(),
                    observers: node.observers.len(),
                    children: node.children.len(),
                    cleanups: node.cleanups.len(),
                };
                (node.seq, snapshot)
            })
            .collect();
        nodes.sort_by_key(|(seq, _)| *seq);

        GraphSnapshot {
            nodes: nodes.into_iter().map(|(_, node)| node).collect(),
            pending: rt.scheduler.borrow().len(),
        }
    })
}
