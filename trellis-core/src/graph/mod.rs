//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive values and computations, plus the ownership tree that decides
//! when computations are torn down.
//!
//! # Overview
//!
//! - Nodes represent signals, memos, effects, resources and plain scopes.
//! - Dependency edges point both ways: a source lists its observers and an
//!   observer lists its sources, so a write can walk downstream and a read
//!   can walk upstream.
//! - Ownership edges (parent/children) are separate from dependency edges.
//!
//! # Design Decisions
//!
//! 1. Nodes live in a slot map and refer to each other by [`NodeId`]. The
//!    graph is full of cycles (source <-> observer, parent <-> child) and ids
//!    keep all of them cheap and free of lifetime hazards.
//!
//! 2. Node states are ordered (`Clean < Check < Dirty < Disposed`) so marking
//!    is a single comparison and never resurrects a disposed node.
//!
//! 3. Scheduling is a pair of ordered queues rather than a global topological
//!    sort. Order between dependent nodes falls out of pulling sources first.

mod arena;
mod node;
mod scheduler;

pub(crate) use arena::Graph;
pub(crate) use node::ReactiveNode;
pub use node::{EffectKind, NodeId, NodeKind, NodeState, Phase};
pub(crate) use scheduler::UpdateScheduler;
