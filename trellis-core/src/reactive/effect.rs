//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. An effect has two halves. The compute half runs under tracking and
//!    produces a value; the effect half receives that value and the previous
//!    one and does the side effect, untracked.
//!
//! 2. When created, the effect runs immediately to establish its initial
//!    dependencies. Inside a batch or a flush it is queued instead and runs
//!    in the current flush.
//!
//! 3. When a dependency changes, the effect is queued. Render effects run
//!    before pure and user effects; within a phase, effects run in creation
//!    order.
//!
//! 4. Before re-running, the effect disposes whatever it created during
//!    its last run and runs its cleanups.
//!
//! # Differences from Memo
//!
//! - Memos are lazy (compute on access); effects are eager (run on flush).
//! - Nothing can depend on an effect.
//!
//! # Cleanup
//!
//! The effect half may return a [`Cleanup`]. It runs before the next run and
//! when the effect is disposed, as does anything registered with
//! [`on_cleanup`](super::on_cleanup) while the effect was running.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::{EffectKind, NodeId, NodeKind, NodeState};

use super::owner::{Cleanup, IntoCleanup};
use super::runtime::Runtime;
use super::subscriber::Subscriber;

type ComputeFn<T> = Box<dyn FnMut(Option<&T>) -> T>;
type EffectFn<T> = Box<dyn FnMut(&T, Option<&T>) -> Option<Cleanup>>;

/// Options for [`create_effect_with_options`].
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Which queue the effect runs from.
    pub kind: EffectKind,
    /// Debug name shown in diagnostics.
    pub name: Option<Cow<'static, str>>,
}

struct EffectInner<T> {
    compute: RefCell<ComputeFn<T>>,
    effect: RefCell<EffectFn<T>>,
    value: RefCell<Option<T>>,
    runs: Cell<usize>,
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn run(&self, id: NodeId) -> bool {
        let Ok(mut compute) = self.compute.try_borrow_mut() else {
            panic!("{}", ReactiveError::Cycle(id));
        };
        let next = compute(self.value.borrow().as_ref());
        drop(compute);

        Runtime::with(|rt| {
            let cleanup = rt.untrack(|| {
                let mut effect = self.effect.borrow_mut();
                effect(&next, self.value.borrow().as_ref())
            });
            // The effect node is the current owner for the whole run.
            if let Some(cleanup) = cleanup {
                if let Err(err) = rt.on_cleanup(cleanup) {
                    tracing::warn!(?id, %err, "effect cleanup dropped");
                }
            }
        });

        *self.value.borrow_mut() = Some(next);
        self.runs.set(self.runs.get() + 1);
        false
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle is a cheap id; dropping it does not stop the effect. Dispose
/// the effect or its owner for that.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{create_root, Effect, Signal};
///
/// create_root(|root| {
///     let count = Signal::new(0);
///     let c = count.clone();
///     let _effect = Effect::new(move || println!("Count is: {}", c.get()));
///
///     count.set(5); // Prints: "Count is: 5"
///     root.dispose();
/// });
/// ```
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    kind: EffectKind,
    runs: Rc<dyn Fn() -> usize>,
}

impl Effect {
    /// Create a pure effect from a single tracked closure.
    pub fn new(mut f: impl FnMut() + 'static) -> Self {
        create_effect(move |_: Option<&()>| f(), |_, _| ())
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Which queue the effect runs from.
    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Number of times the effect has run.
    pub fn run_count(&self) -> usize {
        (self.runs)()
    }

    /// Dispose the effect. It never runs again and its cleanups run now.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose_node(self.id));
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::node_state(self.id) == NodeState::Disposed
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect with explicit options.
///
/// `compute` runs tracked and receives its previous result (`initial` on
/// the first run). `effect` runs untracked with the new and previous
/// values and may return a [`Cleanup`].
pub fn create_effect_with_options<T, R>(
    compute: impl FnMut(Option<&T>) -> T + 'static,
    mut effect: impl FnMut(&T, Option<&T>) -> R + 'static,
    initial: Option<T>,
    options: EffectOptions,
) -> Effect
where
    T: 'static,
    R: IntoCleanup,
{
    let inner = Rc::new(EffectInner {
        compute: RefCell::new(Box::new(compute) as ComputeFn<T>),
        effect: RefCell::new(Box::new(move |value: &T, prev: Option<&T>| {
            effect(value, prev).into_cleanup()
        }) as EffectFn<T>),
        value: RefCell::new(initial),
        runs: Cell::new(0),
    });

    let kind = options.kind;
    let id = Runtime::with(|rt| {
        let id = rt.create_node(NodeKind::Effect(kind), Some(inner.clone()), options.name);
        if rt.batch_depth.get() > 0 || rt.flushing.get() {
            let graph = rt.graph.borrow();
            rt.scheduler.borrow_mut().enqueue(&graph, id);
        } else {
            rt.update_if_necessary(id);
        }
        id
    });

    Effect {
        id,
        kind,
        runs: Rc::new(move || inner.runs.get()),
    }
}

/// Create a pure effect, flushed in the user phase.
pub fn create_effect<T, R>(
    compute: impl FnMut(Option<&T>) -> T + 'static,
    effect: impl FnMut(&T, Option<&T>) -> R + 'static,
) -> Effect
where
    T: 'static,
    R: IntoCleanup,
{
    create_effect_with_options(compute, effect, None, EffectOptions::default())
}

/// Create a render effect, flushed before every user-phase effect.
pub fn create_render_effect<T, R>(
    compute: impl FnMut(Option<&T>) -> T + 'static,
    effect: impl FnMut(&T, Option<&T>) -> R + 'static,
) -> Effect
where
    T: 'static,
    R: IntoCleanup,
{
    create_effect_with_options(
        compute,
        effect,
        None,
        EffectOptions {
            kind: EffectKind::Render,
            name: None,
        },
    )
}

/// Create an effect tagged as a user effect, flushed in the user phase.
pub fn create_user_effect<T, R>(
    compute: impl FnMut(Option<&T>) -> T + 'static,
    effect: impl FnMut(&T, Option<&T>) -> R + 'static,
) -> Effect
where
    T: 'static,
    R: IntoCleanup,
{
    create_effect_with_options(
        compute,
        effect,
        None,
        EffectOptions {
            kind: EffectKind::User,
            name: None,
        },
    )
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
