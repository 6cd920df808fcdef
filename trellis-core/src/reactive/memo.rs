//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On creation, the memo runs its computation once to cache a value and
//!    discover its sources.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a direct source changes, the memo is marked `Dirty`; when
//!    something further upstream changes it is marked `Check`.
//!
//! 4. On next access, a `Check` memo first brings its sources up to date.
//!    If none of them produced a new value it goes back to `Clean` and
//!    returns its cache without running.
//!
//! 5. If it does re-run and the new value equals the old one (per its
//!    [`Equality`]), its own observers are not marked dirty.
//!
//! # Why This Matters
//!
//! A memo read by many observers, or read many times, still computes at
//! most once per change, and a change that does not affect its result stops
//! propagating at the memo.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind, NodeState};

use super::runtime::Runtime;
use super::signal::Equality;
use super::subscriber::Subscriber;

type ComputeFn<T> = Box<dyn FnMut(Option<&T>) -> T>;

/// Options for [`Memo::with_options`].
pub struct MemoOptions<T> {
    /// Change detection for recomputed values. [`Equality::Never`] makes
    /// every recompute propagate.
    pub equals: Equality<T>,
    /// Debug name shown in diagnostics.
    pub name: Option<Cow<'static, str>>,
}

impl<T: PartialEq + 'static> Default for MemoOptions<T> {
    fn default() -> Self {
        Self {
            equals: Equality::default(),
            name: None,
        }
    }
}

struct MemoInner<T> {
    compute: RefCell<Option<ComputeFn<T>>>,
    value: RefCell<Option<T>>,
    equals: Equality<T>,
}

impl<T: 'static> Subscriber for MemoInner<T> {
    fn run(&self, id: NodeId) -> bool {
        let Ok(mut compute) = self.compute.try_borrow_mut() else {
            panic!("{}", ReactiveError::Cycle(id));
        };
        let Some(compute) = compute.as_mut() else {
            return false;
        };

        let next = compute(self.value.borrow().as_ref());

        let changed = match self.value.borrow().as_ref() {
            Some(prev) => !self.equals.equals(prev, &next),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(next);
        }
        changed
    }

    fn dispose(&self) {
        // Release captured state; a memo disposed from inside its own
        // computation keeps the closure until that run unwinds.
        if let Ok(mut compute) = self.compute.try_borrow_mut() {
            compute.take();
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Handles are cheap to clone and share the cache. The memo itself belongs
/// to the owner it was created under.
pub struct Memo<T: 'static> {
    id: NodeId,
    inner: Rc<MemoInner<T>>,
}

impl<T: 'static> Memo<T> {
    /// Create a memo compared with `PartialEq`.
    ///
    /// The computation receives the previous value (`None` on the first
    /// run) and runs once immediately.
    pub fn new(compute: impl FnMut(Option<&T>) -> T + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(compute, MemoOptions::default())
    }

    /// Create a memo with custom equality and an optional name.
    pub fn with_options(
        compute: impl FnMut(Option<&T>) -> T + 'static,
        options: MemoOptions<T>,
    ) -> Self {
        let inner = Rc::new(MemoInner {
            compute: RefCell::new(Some(Box::new(compute))),
            value: RefCell::new(None),
            equals: options.equals,
        });
        let id = Runtime::with(|rt| {
            let id = rt.create_node(NodeKind::Memo, Some(inner.clone()), options.name);
            rt.update_if_necessary(id);
            id
        });
        Self { id, inner }
    }

    /// Get the memo's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Borrow the up-to-date value, tracking the memo if a computation is
    /// running.
    pub fn try_with<U>(&self, f: impl FnOnce(&T) -> U) -> Result<U, ReactiveError> {
        Runtime::with(|rt| {
            if rt.is_running(self.id) {
                return Err(ReactiveError::Cycle(self.id));
            }
            rt.update_if_necessary(self.id);
            if rt.graph.borrow().state(self.id) == NodeState::Disposed {
                return Err(ReactiveError::Disposed(self.id));
            }
            rt.track(self.id);
            Ok(())
        })?;

        let value = self.inner.value.borrow();
        value.as_ref().map(f).ok_or(ReactiveError::Disposed(self.id))
    }

    /// Get the up-to-date value.
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Borrow the up-to-date value.
    ///
    /// # Panics
    ///
    /// Panics if the memo was disposed or reads itself.
    #[track_caller]
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the up-to-date value.
    ///
    /// # Panics
    ///
    /// Panics if the memo was disposed or reads itself.
    #[track_caller]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the up-to-date value without tracking it.
    #[track_caller]
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        Runtime::with(|rt| rt.untrack(|| self.get()))
    }

    /// Get the current state without resolving it.
    pub fn state(&self) -> NodeState {
        Runtime::node_state(self.id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Dispose the memo and everything it owns.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose_node(self.id));
    }

    /// Whether the memo has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state() == NodeState::Disposed
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Create a memo compared with `PartialEq`.
pub fn create_memo<T: PartialEq + 'static>(
    compute: impl FnMut(Option<&T>) -> T + 'static,
) -> Memo<T> {
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
