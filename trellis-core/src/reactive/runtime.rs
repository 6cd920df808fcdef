//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! effects and resources. It owns the node arena, the effect queues and the
//! two "current" pointers: the observer that reads are tracked against and
//! the owner that new nodes and cleanups attach to.
//!
//! # How It Works
//!
//! 1. Reading a signal or memo while an observer is set records an edge in
//!    both directions.
//!
//! 2. Writing a signal marks its observers `Dirty` and everything further
//!    downstream `Check`, queueing any effect that was clean.
//!
//! 3. A flush pops queued effects (render phase first) and pulls each one up
//!    to date. Pulling a `Check` node first pulls its sources in read order;
//!    if none of them actually changed the node goes back to `Clean` without
//!    running. Memos are only ever pulled, never pushed.
//!
//! # Thread Safety
//!
//! Each thread has its own runtime in thread-local storage. Reactive handles
//! are `!Send`, so a node can only be reached from the thread that made it.
//! The current observer and owner are saved and restored by guards around
//! every tracked region, including during unwinding.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::config::{FlushMode, RuntimeConfig};
use crate::error::ReactiveError;
use crate::graph::{Graph, NodeId, NodeKind, NodeState, UpdateScheduler};

use super::owner::Cleanup;
use super::subscriber::Subscriber;

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

/// The reactive runtime of the current thread.
///
/// There is exactly one per thread and it is created lazily. Most code never
/// touches it directly; the associated functions here are for introspection.
#[derive(Default)]
pub struct Runtime {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) scheduler: RefCell<UpdateScheduler>,
    pub(crate) observer: Cell<Option<NodeId>>,
    pub(crate) owner: Cell<Option<NodeId>>,
    pub(crate) batch_depth: Cell<usize>,
    pub(crate) flushing: Cell<bool>,
    pub(crate) config: RefCell<RuntimeConfig>,
}

impl Runtime {
    /// Run `f` with this thread's runtime.
    pub(crate) fn with<T>(f: impl FnOnce(&Runtime) -> T) -> T {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but returns `None` while the thread is
    /// shutting down. Used from `Drop` impls.
    pub(crate) fn try_with<T>(f: impl FnOnce(&Runtime) -> T) -> Option<T> {
        RUNTIME.try_with(f).ok()
    }

    /// Get the computation currently being tracked, if any.
    pub fn current_observer() -> Option<NodeId> {
        Self::with(|rt| rt.observer.get())
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        Self::current_observer().is_some()
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        Self::with(|rt| rt.graph.borrow().len())
    }

    /// State of a node, `Disposed` if it no longer exists.
    pub fn node_state(id: NodeId) -> NodeState {
        Self::with(|rt| rt.graph.borrow().state(id))
    }

    // ------------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------------

    /// Add a node. Everything except signals is owned by the current owner,
    /// if there is one, and inherits its contexts.
    pub(crate) fn create_node(
        &self,
        kind: NodeKind,
        subscriber: Option<Rc<dyn Subscriber>>,
        name: Option<std::borrow::Cow<'static, str>>,
    ) -> NodeId {
        let owner = match kind {
            NodeKind::Signal => None,
            _ => self.owner.get(),
        };
        let mut graph = self.graph.borrow_mut();
        let id = graph.insert(kind);

        // A disposed owner adopts nothing.
        let inherited = owner
            .and_then(|owner| graph.get_mut(owner).map(|parent| (owner, parent)))
            .filter(|(_, parent)| !parent.is_disposed())
            .map(|(owner, parent)| {
                parent.children.push(id);
                (owner, parent.contexts.clone())
            });
        let owner = inherited.as_ref().map(|(owner, _)| *owner);
        if let Some(node) = graph.get_mut(id) {
            node.subscriber = subscriber;
            node.name = name;
            if let Some((parent, contexts)) = inherited {
                node.parent = Some(parent);
                node.contexts = contexts;
            }
        }
        drop(graph);

        if kind.is_computation() && owner.is_none() {
            tracing::warn!(
                ?id,
                ?kind,
                "computation created outside of an owner will never be disposed automatically"
            );
        } else {
            tracing::debug!(?id, ?kind, ?owner, "created reactive node");
        }
        id
    }

    /// Add a root scope with no parent.
    pub(crate) fn create_root(&self) -> NodeId {
        let id = self.graph.borrow_mut().insert(NodeKind::Scope);
        tracing::debug!(?id, "created root scope");
        id
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Record that the current observer read `source`.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(observer) = self.observer.get() {
            if observer != source {
                self.graph.borrow_mut().add_edge(source, observer);
            }
        }
    }

    /// Run `f` with tracking suspended.
    pub(crate) fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = ObserverGuard {
            rt: self,
            prev: self.observer.replace(None),
        };
        f()
    }

    /// Run `f` with `owner` as the current owner.
    pub(crate) fn with_owner<T>(&self, owner: Option<NodeId>, f: impl FnOnce() -> T) -> T {
        let _guard = OwnerGuard {
            rt: self,
            prev: self.owner.replace(owner),
        };
        f()
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// A source's value changed: mark downstream and flush if allowed.
    pub(crate) fn notify_changed(&self, source: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            self.scheduler
                .borrow_mut()
                .mark_observers(&mut graph, source, NodeState::Dirty);
        }
        if self.batch_depth.get() == 0 {
            self.auto_flush();
        }
    }

    /// Run `f` as one batch. Nested batches flatten into the outermost one,
    /// which flushes when it exits.
    pub(crate) fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        self.batch_depth.set(self.batch_depth.get() + 1);
        let guard = BatchGuard { rt: self };
        let value = f();
        drop(guard);
        if self.batch_depth.get() == 0 {
            self.auto_flush();
        }
        value
    }

    fn auto_flush(&self) {
        let mode = self.config.borrow().flush_mode;
        if mode == FlushMode::Sync {
            self.flush();
        }
    }

    /// Run queued effects until both queues are empty.
    pub(crate) fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        let _guard = FlushGuard { rt: self };
        let limit = self.config.borrow().max_flush_iterations;
        let mut runs = 0usize;

        loop {
            let next = self.scheduler.borrow_mut().pop();
            let Some(id) = next else {
                break;
            };

            runs += 1;
            if runs > limit {
                tracing::error!(limit, "flush iteration limit exceeded, dropping queued effects");
                self.scheduler.borrow_mut().clear();
                panic!("{}", ReactiveError::FlushLimit(limit));
            }

            tracing::trace!(?id, "flushing");
            let requeue = RequeueOnUnwind { rt: self, id };
            self.update_if_necessary(id);
            drop(requeue);
        }
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    /// Bring `id` up to date.
    ///
    /// `Check` nodes resolve their sources in read order first and only run
    /// if one of them changed value. `Dirty` nodes run. Anything else returns
    /// immediately.
    pub(crate) fn update_if_necessary(&self, id: NodeId) {
        let sources: SmallVec<[NodeId; 8]> = {
            let graph = self.graph.borrow();
            let Some(node) = graph.get(id) else {
                return;
            };
            if node.running {
                return;
            }
            match node.state {
                NodeState::Clean | NodeState::Disposed => return,
                NodeState::Check => node.sources.iter().copied().collect(),
                NodeState::Dirty => SmallVec::new(),
            }
        };

        for source in sources {
            let is_computation = self
                .graph
                .borrow()
                .kind(source)
                .is_some_and(NodeKind::is_computation);
            if is_computation {
                self.update_if_necessary(source);
            }
            // A source that re-ran with a new value marks us dirty.
            if self.graph.borrow().state(id) >= NodeState::Dirty {
                break;
            }
        }

        let state = self.graph.borrow().state(id);
        match state {
            NodeState::Dirty => self.run_computation(id),
            NodeState::Check => {
                if let Some(node) = self.graph.borrow_mut().get_mut(id) {
                    node.state = NodeState::Clean;
                }
                tracing::trace!(?id, "check resolved clean");
            }
            NodeState::Clean | NodeState::Disposed => {}
        }
    }

    /// Re-run a computation under tracking and propagate if its value
    /// changed.
    pub(crate) fn run_computation(&self, id: NodeId) {
        let Some(subscriber) = self
            .graph
            .borrow()
            .get(id)
            .and_then(|node| node.subscriber.clone())
        else {
            return;
        };

        self.batch(|| {
            // Nested computations and cleanups from the previous run go first.
            self.clean_node(id);
            {
                let mut graph = self.graph.borrow_mut();
                match graph.get_mut(id) {
                    Some(node) if !node.is_disposed() => node.state = NodeState::Clean,
                    _ => return,
                }
            }

            tracing::trace!(?id, "running computation");
            let changed = {
                let _frame = TrackingFrame::enter(self, id);
                subscriber.run(id)
            };

            if changed {
                let mut graph = self.graph.borrow_mut();
                self.scheduler.borrow_mut().mark_recomputed(&mut graph, id);
            }
        });
    }

    /// Whether a read of `id` right now would re-enter its own evaluation.
    pub(crate) fn is_running(&self, id: NodeId) -> bool {
        self.graph.borrow().get(id).is_some_and(|node| node.running)
    }

    /// Mark a node dirty and queue it, as if a direct source had changed.
    pub(crate) fn invalidate(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            self.scheduler
                .borrow_mut()
                .mark(&mut graph, id, NodeState::Dirty);
        }
        if self.batch_depth.get() == 0 {
            self.auto_flush();
        }
    }

    // ------------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------------

    /// Register a cleanup on the current owner.
    pub(crate) fn on_cleanup(&self, cleanup: Cleanup) -> Result<(), ReactiveError> {
        let Some(owner) = self.owner.get() else {
            tracing::warn!("on_cleanup called with no owner; cleanup will never run");
            return Err(ReactiveError::NoOwner);
        };
        let rejected = {
            let mut graph = self.graph.borrow_mut();
            match graph.get_mut(owner) {
                Some(node) if !node.is_disposed() => {
                    node.cleanups.push(cleanup);
                    None
                }
                _ => Some(cleanup),
            }
        };
        // The owner is already being torn down; run it now rather than leak it.
        if let Some(cleanup) = rejected {
            tracing::debug!(?owner, "owner already disposed, running cleanup immediately");
            cleanup.run();
        }
        Ok(())
    }

    /// Dispose the children of `id` and run its cleanups, leaving the node
    /// itself alive. Done before every re-run.
    fn clean_node(&self, id: NodeId) {
        let (children, cleanups) = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            (
                std::mem::take(&mut node.children),
                std::mem::take(&mut node.cleanups),
            )
        };
        for child in children {
            self.dispose_node(child);
        }
        // Cleanups run in registration order.
        for cleanup in cleanups {
            cleanup.run();
        }
    }

    /// Dispose `id` and everything it owns.
    ///
    /// Idempotent; a node that is already being disposed is left alone.
    pub(crate) fn dispose_node(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            if node.is_disposed() {
                return;
            }
            self.scheduler.borrow_mut().dequeue(&graph, id);
            if let Some(node) = graph.get_mut(id) {
                node.state = NodeState::Disposed;
            }
        }
        tracing::debug!(?id, "disposing reactive node");

        self.clean_node(id);

        let node = self.graph.borrow_mut().remove(id);
        if let Some(subscriber) = node.and_then(|node| node.subscriber) {
            subscriber.dispose();
        }
    }

    /// Remove a signal whose last handle was dropped.
    pub(crate) fn remove_source(&self, id: NodeId) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.remove(id);
        }
    }
}

/// Run `f` without tracking any reads it makes.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    Runtime::with(|rt| rt.untrack(f))
}

/// Run `f` with effect flushing deferred until the outermost batch exits.
///
/// However many signals `f` writes, each affected effect runs once.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    Runtime::with(|rt| rt.batch(f))
}

/// Run every queued effect now.
///
/// Needed under [`FlushMode::Manual`]; a no-op when called from inside a
/// flush.
pub fn flush() {
    Runtime::with(|rt| rt.flush());
}

/// Whether a batch is open on this thread.
pub fn is_batching() -> bool {
    Runtime::with(|rt| rt.batch_depth.get() > 0)
}

/// Whether any effect or resource is waiting to run.
pub fn has_pending_effects() -> bool {
    Runtime::with(|rt| !rt.scheduler.borrow().is_empty())
}

/// Restores the previous observer.
struct ObserverGuard<'a> {
    rt: &'a Runtime,
    prev: Option<NodeId>,
}

impl Drop for ObserverGuard<'_> {
    fn drop(&mut self) {
        self.rt.observer.set(self.prev);
    }
}

/// Restores the previous owner.
struct OwnerGuard<'a> {
    rt: &'a Runtime,
    prev: Option<NodeId>,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.rt.owner.set(self.prev);
    }
}

struct BatchGuard<'a> {
    rt: &'a Runtime,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.rt.batch_depth.set(self.rt.batch_depth.get() - 1);
    }
}

struct FlushGuard<'a> {
    rt: &'a Runtime,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.rt.flushing.set(false);
    }
}

/// Puts a node back on its queue if resolving it panicked, so a later
/// flush retries it.
struct RequeueOnUnwind<'a> {
    rt: &'a Runtime,
    id: NodeId,
}

impl Drop for RequeueOnUnwind<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let (Ok(graph), Ok(mut scheduler)) =
            (self.rt.graph.try_borrow(), self.rt.scheduler.try_borrow_mut())
        else {
            return;
        };
        if graph.get(self.id).is_some_and(|node| !node.is_clean() && !node.is_disposed()) {
            scheduler.enqueue(&graph, self.id);
        }
    }
}

/// One run of a computation.
///
/// Entering makes the node the current observer and owner and sets its
/// source set aside. Leaving restores both pointers and drops the edges to
/// any old source the run did not read again.
struct TrackingFrame<'a> {
    rt: &'a Runtime,
    id: NodeId,
    prev_observer: Option<NodeId>,
    prev_owner: Option<NodeId>,
    old_sources: IndexSet<NodeId>,
}

impl<'a> TrackingFrame<'a> {
    fn enter(rt: &'a Runtime, id: NodeId) -> Self {
        let old_sources = {
            let mut graph = rt.graph.borrow_mut();
            match graph.get_mut(id) {
                Some(node) => {
                    node.running = true;
                    std::mem::take(&mut node.sources)
                }
                None => IndexSet::new(),
            }
        };
        Self {
            rt,
            id,
            prev_observer: rt.observer.replace(Some(id)),
            prev_owner: rt.owner.replace(Some(id)),
            old_sources,
        }
    }
}

impl Drop for TrackingFrame<'_> {
    fn drop(&mut self) {
        self.rt.observer.set(self.prev_observer);
        self.rt.owner.set(self.prev_owner);

        let panicking = std::thread::panicking();
        let Ok(mut graph) = self.rt.graph.try_borrow_mut() else {
            return;
        };
        let old_sources = std::mem::take(&mut self.old_sources);
        let Some(node) = graph.get_mut(self.id) else {
            // Disposed mid-run: drop whatever edges are left.
            for source in old_sources {
                graph.remove_edge(source, self.id);
            }
            return;
        };
        node.running = false;

        if panicking {
            // Keep every subscription and retry on the next read or flush.
            node.sources.extend(old_sources);
            if !node.is_disposed() {
                node.state = NodeState::Dirty;
            }
            if let Ok(mut scheduler) = self.rt.scheduler.try_borrow_mut() {
                scheduler.enqueue(&graph, self.id);
            }
            return;
        }

        let stale: SmallVec<[NodeId; 8]> = old_sources
            .into_iter()
            .filter(|source| !node.sources.contains(source))
            .collect();
        for source in stale {
            tracing::trace!(observer = ?self.id, ?source, "pruning stale edge");
            if let Some(source) = graph.get_mut(source) {
                source.observers.shift_remove(&self.id);
            }
        }
    }
}
