//! Reactive Primitives
//!
//! This module implements the reactive system: signals, memos, effects and
//! async resources, plus the ownership tree that decides when they die.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies actually changed, and only when read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are eager: a write flushes them (or the end
//! of the enclosing batch does).
//!
//! ## Resources
//!
//! A Resource runs a fetcher that may hand back a future or a stream, and
//! exposes the settled value synchronously. Only the latest fetch may commit.
//!
//! ## Owners
//!
//! Memos, effects and resources belong to the scope or computation that
//! created them. Disposing an owner disposes everything below it and runs its
//! cleanups; re-running a computation does the same to what its last run
//! created. Owners also carry [contexts](Context).
//!
//! # Implementation Notes
//!
//! Dependencies are tracked through a thread-local runtime. When a signal is
//! read, the runtime checks whether a computation is running and, if so,
//! records the edge. Writes push staleness down the graph; reads pull values
//! up to date, sources strictly before observers, so no computation ever sees
//! a mix of old and new inputs.

mod context;
mod effect;
mod memo;
mod owner;
mod resource;
mod runtime;
mod signal;
mod subscriber;

pub use context::{create_context, get_context, has_context, set_context, Context};
pub use effect::{
    create_effect, create_effect_with_options, create_render_effect, create_user_effect, Effect,
    EffectOptions,
};
pub use memo::{create_memo, Memo, MemoOptions};
pub use owner::{create_root, create_scope, on_cleanup, Cleanup, IntoCleanup, Owner};
pub use resource::{create_async, create_async_with_options, AsyncSource, Resource, ResourceOptions};
pub use runtime::{batch, flush, has_pending_effects, is_batching, untrack, Runtime};
pub use signal::{create_signal, Equality, ReadSignal, Signal, SignalOptions, WriteSignal};

pub(crate) use context::ContextMap;
pub(crate) use subscriber::Subscriber;
