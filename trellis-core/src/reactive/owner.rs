//! Ownership Tree
//!
//! Every memo, effect and resource is owned by the scope or computation that
//! was current when it was created. Disposing an owner disposes everything
//! below it first (post-order), then runs the owner's own cleanups in the
//! order they were registered. A computation cleans its children and
//! cleanups the same way before each re-run.

use std::fmt;

use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind, NodeState};

use super::runtime::Runtime;

/// A function run when its owner is cleaned up or disposed.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    /// Wrap a function as a cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// What an effect body may return: nothing, or a cleanup for this run.
pub trait IntoCleanup {
    /// Convert into an optional cleanup.
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

impl IntoCleanup for Option<Cleanup> {
    fn into_cleanup(self) -> Option<Cleanup> {
        self
    }
}

/// A handle to a node of the ownership tree.
///
/// Scopes, memos, effects and resources are all owners. Handles are plain
/// ids; the node itself lives until it or an ancestor is disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    id: NodeId,
}

impl Owner {
    /// The owner new nodes and cleanups currently attach to, if any.
    pub fn current() -> Option<Owner> {
        Runtime::with(|rt| rt.owner.get()).map(|id| Owner { id })
    }

    /// Get the owner's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run `f` with this as the current owner.
    pub fn run_in<T>(&self, f: impl FnOnce() -> T) -> T {
        Runtime::with(|rt| rt.with_owner(Some(self.id), f))
    }

    /// Register a cleanup on this owner.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) -> Result<(), ReactiveError> {
        Runtime::with(|rt| rt.with_owner(Some(self.id), || rt.on_cleanup(Cleanup::new(f))))
    }

    /// Dispose this owner and everything it owns.
    ///
    /// Disposing twice, or from inside one of its own cleanups, is a no-op.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose_node(self.id));
    }

    /// Whether this owner has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::node_state(self.id) == NodeState::Disposed
    }
}

/// Run `f` in a new scope owned by the current owner.
///
/// `f` receives the scope so it can dispose it later. The previous owner is
/// restored afterward, even if `f` panics. Reads directly inside `f` are not
/// tracked.
pub fn create_scope<T>(f: impl FnOnce(Owner) -> T) -> T {
    Runtime::with(|rt| {
        let id = rt.create_node(NodeKind::Scope, None, None);
        rt.with_owner(Some(id), || rt.untrack(|| f(Owner { id })))
    })
}

/// Like [`create_scope`], but the new scope has no parent and is only
/// disposed explicitly.
pub fn create_root<T>(f: impl FnOnce(Owner) -> T) -> T {
    Runtime::with(|rt| {
        let id = rt.create_root();
        rt.with_owner(Some(id), || rt.untrack(|| f(Owner { id })))
    })
}

/// Register a cleanup on the current owner.
///
/// Returns [`ReactiveError::NoOwner`] outside of any scope; the cleanup is
/// dropped without running in that case.
pub fn on_cleanup(f: impl FnOnce() + 'static) -> Result<(), ReactiveError> {
    Runtime::with(|rt| rt.on_cleanup(Cleanup::new(f)))
}
