//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computation is running, the signal
//!    registers that computation as an observer (and the computation
//!    records the signal as a source).
//!
//! 2. When a signal's value changes, its observers are marked dirty and
//!    everything downstream of them is marked for checking.
//!
//! 3. Outside a batch the write then flushes queued effects before it
//!    returns (unless the runtime is configured for manual flushing).
//!
//! A write whose value is equal to the current one, according to the
//! signal's [`Equality`], changes nothing and notifies nobody.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A node in the runtime's arena (its observer set)
//! - The value and equality function behind an `Rc` shared by all handles
//!
//! The node is removed when the last handle is dropped.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::graph::{NodeId, NodeKind};

use super::runtime::Runtime;

/// Decides whether a new value counts as a change.
pub enum Equality<T> {
    /// Values are equal when the function returns `true`.
    Custom(Rc<dyn Fn(&T, &T) -> bool>),

    /// Nothing is ever equal: every write propagates.
    Never,
}

impl<T> Equality<T> {
    /// Compare with a custom function.
    pub fn custom(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Equality::Custom(Rc::new(f))
    }

    pub(crate) fn equals(&self, a: &T, b: &T) -> bool {
        match self {
            Equality::Custom(f) => f(a, b),
            Equality::Never => false,
        }
    }
}

/// `PartialEq`, the default for signals and memos.
impl<T: PartialEq + 'static> Default for Equality<T> {
    fn default() -> Self {
        Equality::Custom(Rc::new(|a: &T, b: &T| a == b))
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        match self {
            Equality::Custom(f) => Equality::Custom(f.clone()),
            Equality::Never => Equality::Never,
        }
    }
}

impl<T> Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equality::Custom(_) => f.write_str("Equality::Custom"),
            Equality::Never => f.write_str("Equality::Never"),
        }
    }
}

/// Options for [`Signal::with_options`].
pub struct SignalOptions<T> {
    /// Change detection for writes.
    pub equals: Equality<T>,
    /// Debug name shown in diagnostics.
    pub name: Option<Cow<'static, str>>,
}

impl<T: PartialEq + 'static> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            equals: Equality::default(),
            name: None,
        }
    }
}

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equals: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.remove_source(self.id));
    }
}

/// A reactive signal holding a value of type T.
///
/// Handles are cheap to clone and all share the same value.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value, compared with
    /// `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a new signal with custom equality and an optional name.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        let id = Runtime::with(|rt| rt.create_node(NodeKind::Signal, None, options.name));
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                equals: options.equals,
            }),
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while a computation is running, this also registers that
    /// computation as an observer.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking like [`Signal::get`].
    ///
    /// `f` must not write to this signal.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        Runtime::with(|rt| rt.track(self.inner.id));
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify observers.
    ///
    /// Returns whether the value changed, not the stored value: `T` is not
    /// required to be `Clone` for writes. Read it back with
    /// [`Signal::get_untracked`]. An equal value is dropped and nothing is
    /// notified.
    pub fn set(&self, value: T) -> bool {
        let unchanged = {
            let current = self.inner.value.borrow();
            self.inner.equals.equals(&current, &value)
        };
        if unchanged {
            tracing::trace!(id = ?self.inner.id, "signal write suppressed by equality");
            return false;
        }

        *self.inner.value.borrow_mut() = value;
        Runtime::with(|rt| rt.notify_changed(self.inner.id));
        true
    }

    /// Update the value using a function of the previous one.
    ///
    /// Returns whether the value changed, like [`Signal::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Get the number of computations currently observing this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with(|rt| {
            rt.graph
                .borrow()
                .get(self.inner.id)
                .map_or(0, |node| node.observers.len())
        })
    }

    /// Split into a read-only and a write-only handle.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (ReadSignal(self.clone()), WriteSignal(self))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// The getter half of [`create_signal`].
pub struct ReadSignal<T: 'static>(Signal<T>);

impl<T: 'static> ReadSignal<T> {
    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.0.id()
    }

    /// See [`Signal::get`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.get()
    }

    /// See [`Signal::with`].
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        self.0.with(f)
    }

    /// See [`Signal::get_untracked`].
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.get_untracked()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.0).finish()
    }
}

/// The setter half of [`create_signal`].
pub struct WriteSignal<T: 'static>(Signal<T>);

impl<T: 'static> WriteSignal<T> {
    /// See [`Signal::set`].
    pub fn set(&self, value: T) -> bool {
        self.0.set(value)
    }

    /// See [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        self.0.update(f)
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Debug + 'static> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.0).finish()
    }
}

/// Create a signal and return its getter and setter.
pub fn create_signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
