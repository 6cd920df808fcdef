//! Subscriber types for the reactive system.
//!
//! A Subscriber is the work behind any node that depends on reactive values:
//! memos, effects and async resources. The runtime stores one per node and
//! calls it whenever the node has to re-run.

use crate::graph::NodeId;

/// The re-runnable half of a computation node.
///
/// The runtime has already made the node the current observer and owner
/// when `run` is called, so reads inside it are tracked against the node.
pub(crate) trait Subscriber {
    /// Re-run the node's function.
    ///
    /// Returns whether the node's value changed, which decides if its
    /// observers are marked dirty.
    fn run(&self, id: NodeId) -> bool;

    /// Called once, after the node has been removed from the graph.
    fn dispose(&self) {}
}
