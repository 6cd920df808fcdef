//! Update Scheduler
//!
//! The scheduler owns the two effect queues and the push half of the
//! push-pull update algorithm.
//!
//! # Algorithm
//!
//! 1. When a source changes, its direct observers are marked `Dirty`.
//! 2. Everything downstream of them is marked `Check`, transitively. A node
//!    that is already at least as stale stops the walk.
//! 3. Every effect or resource that goes from `Clean` to stale is queued,
//!    exactly once, on the queue for its phase.
//! 4. The flush (see the runtime) pops queued nodes render phase first, then
//!    in creation order, and pulls each one up to date. Pulling resolves
//!    sources before observers, so nothing ever sees a half-updated graph.

use std::collections::BTreeSet;

use smallvec::SmallVec;

use super::arena::Graph;
use super::node::{NodeId, NodeState, Phase};

/// The render and user queues.
///
/// Entries are keyed by creation sequence so each phase runs in creation
/// order, and a node cannot be queued twice.
#[derive(Debug, Default)]
pub(crate) struct UpdateScheduler {
    render: BTreeSet<(u64, NodeId)>,
    user: BTreeSet<(u64, NodeId)>,
}

impl UpdateScheduler {
    fn queue_mut(&mut self, phase: Phase) -> &mut BTreeSet<(u64, NodeId)> {
        match phase {
            Phase::Render => &mut self.render,
            Phase::User => &mut self.user,
        }
    }

    /// Queue a node if its kind is scheduled at all.
    pub(crate) fn enqueue(&mut self, graph: &Graph, id: NodeId) {
        if let Some(node) = graph.get(id) {
            if let Some(phase) = node.kind.phase() {
                self.queue_mut(phase).insert((node.seq, id));
            }
        }
    }

    /// Drop a node from whichever queue holds it.
    pub(crate) fn dequeue(&mut self, graph: &Graph, id: NodeId) {
        if let Some(node) = graph.get(id) {
            if let Some(phase) = node.kind.phase() {
                self.queue_mut(phase).remove(&(node.seq, id));
            }
        }
    }

    /// The next node to flush: render phase first, then creation order.
    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        self.render
            .pop_first()
            .or_else(|| self.user.pop_first())
            .map(|(_, id)| id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.render.is_empty() && self.user.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.render.len() + self.user.len()
    }

    pub(crate) fn clear(&mut self) {
        self.render.clear();
        self.user.clear();
    }

    /// Mark every direct observer of `source` with `state` and everything
    /// downstream of them `Check`.
    pub(crate) fn mark_observers(&mut self, graph: &mut Graph, source: NodeId, state: NodeState) {
        let observers: SmallVec<[NodeId; 8]> = match graph.get(source) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return,
        };
        for observer in observers {
            self.mark(graph, observer, state);
        }
    }

    /// A computation re-ran with a new value: mark its observers `Dirty`.
    ///
    /// An observer that is running and still `Clean` is skipped. It is the
    /// reader that pulled `source` up to date and already sees the new value.
    pub(crate) fn mark_recomputed(&mut self, graph: &mut Graph, source: NodeId) -> usize {
        let observers: SmallVec<[NodeId; 8]> = match graph.get(source) {
            Some(node) => node.observers.iter().copied().collect(),
            None => return 0,
        };
        let mut marked = 0;
        for observer in observers {
            let reading = graph
                .get(observer)
                .is_some_and(|node| node.running && node.is_clean());
            if reading {
                tracing::trace!(?source, ?observer, "observer already reading fresh value");
                continue;
            }
            marked += self.mark(graph, observer, NodeState::Dirty);
        }
        marked
    }

    /// Mark `start` with `state` and propagate `Check` downstream.
    ///
    /// Returns the number of nodes whose state changed.
    pub(crate) fn mark(&mut self, graph: &mut Graph, start: NodeId, state: NodeState) -> usize {
        let mut marked = 0;
        let mut stack: SmallVec<[(NodeId, NodeState); 16]> = SmallVec::new();
        stack.push((start, state));

        while let Some((id, state)) = stack.pop() {
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            // Already at least this stale, or disposed.
            if node.state >= state {
                continue;
            }
            let was_clean = node.is_clean();
            node.state = state;
            marked += 1;
            tracing::trace!(?id, ?state, "marked stale");

            if was_clean {
                if let Some(phase) = node.kind.phase() {
                    let seq = node.seq;
                    self.queue_mut(phase).insert((seq, id));
                }
            }
            stack.extend(node.observers.iter().map(|o| (*o, NodeState::Check)));
        }
        marked
    }
}
