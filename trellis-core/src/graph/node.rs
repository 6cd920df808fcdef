//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Every signal, memo, effect, resource and plain ownership scope is one
//! [`ReactiveNode`] in the arena, addressed by a [`NodeId`].

use std::borrow::Cow;
use std::rc::Rc;

use indexmap::IndexSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::reactive::{Cleanup, ContextMap, Subscriber};

slotmap::new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Ids are versioned: once a node is removed, its id never resolves to a
    /// different node that later reuses the slot.
    pub struct NodeId;
}

/// What kind of node this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// An ownership scope with no computation of its own.
    Scope,

    /// A source node (signal). These are the roots of the graph.
    /// They have no sources, only observers.
    Signal,

    /// A derived node (memo). Caches its computed value.
    Memo,

    /// A side-effecting computation.
    Effect(EffectKind),

    /// A computation that starts async work and commits its results into
    /// signals.
    Resource,
}

/// The tag an effect is created with. Decides which queue it runs from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// The default for `create_effect`. Runs in the user phase.
    #[default]
    Pure,

    /// Runs in the render phase, before any user-phase effect.
    Render,

    /// Runs in the user phase.
    User,
}

/// The queue a scheduled node is flushed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Render effects and resource fetchers.
    Render,
    /// Pure and user effects.
    User,
}

impl NodeKind {
    /// Whether the node runs a function under dependency tracking.
    pub fn is_computation(self) -> bool {
        matches!(self, NodeKind::Memo | NodeKind::Effect(_) | NodeKind::Resource)
    }

    /// The queue this node is scheduled on when it goes stale, if any.
    /// Memos are lazy and never scheduled.
    pub fn phase(self) -> Option<Phase> {
        match self {
            NodeKind::Effect(EffectKind::Render) | NodeKind::Resource => Some(Phase::Render),
            NodeKind::Effect(EffectKind::Pure | EffectKind::User) => Some(Phase::User),
            NodeKind::Scope | NodeKind::Signal | NodeKind::Memo => None,
        }
    }
}

/// Lifecycle state of a node.
///
/// The ordering matters: marking only ever moves a node to a greater state,
/// and `Disposed` is greater than everything so it is never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// The node's value is up-to-date.
    Clean,

    /// Some ancestor may have changed. Sources must be resolved before we
    /// know whether this node has to re-run.
    Check,

    /// A direct source changed. The node must re-run before it is read.
    Dirty,

    /// Terminal. The node is detached from the graph.
    Disposed,
}

/// A node in the dependency graph.
pub(crate) struct ReactiveNode {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,

    /// Creation order. Queued effects run in this order within a phase.
    pub(crate) seq: u64,

    /// Set while the node's function is on the stack.
    pub(crate) running: bool,

    pub(crate) name: Option<Cow<'static, str>>,

    /// The work this node re-runs. `None` for signals and scopes.
    pub(crate) subscriber: Option<Rc<dyn Subscriber>>,

    /// Nodes read during the last run, in first-read order.
    pub(crate) sources: IndexSet<NodeId>,

    /// Nodes that read this one during their last run.
    pub(crate) observers: IndexSet<NodeId>,

    /// Ownership. Signals are never owned.
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) cleanups: SmallVec<[Cleanup; 2]>,

    /// Copy-on-write context map, shared with the parent until this node
    /// provides a value of its own.
    pub(crate) contexts: Option<Rc<ContextMap>>,
}

impl ReactiveNode {
    /// Create a new node with the given kind.
    pub(crate) fn new(kind: NodeKind, seq: u64) -> Self {
        Self {
            kind,
            // Computations start dirty so their first run is a normal update.
            state: if kind.is_computation() {
                NodeState::Dirty
            } else {
                NodeState::Clean
            },
            seq,
            running: false,
            name: None,
            subscriber: None,
            sources: IndexSet::new(),
            observers: IndexSet::new(),
            parent: None,
            children: Vec::new(),
            cleanups: SmallVec::new(),
            contexts: None,
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.state == NodeState::Clean
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state == NodeState::Disposed
    }
}

impl std::fmt::Debug for ReactiveNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveNode")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("observers", &self.observers.len())
            .field("children", &self.children.len())
            .finish()
    }
}
