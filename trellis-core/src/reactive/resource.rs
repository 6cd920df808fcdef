//! Async Resources
//!
//! A resource is a computation whose result arrives later. Its fetcher runs
//! tracked like an effect and returns an [`AsyncSource`]: a value that is
//! already there, a future, or a stream of values.
//!
//! Every run of the fetcher starts a new *generation*. A future or stream
//! item only commits into the resource if its generation is still the latest
//! one and the resource has not been disposed; anything else is dropped.
//! Nothing is cancelled: superseded work runs to completion and its result
//! is ignored.
//!
//! Futures and streams are driven by `tokio::task::spawn_local`, so a
//! resource that goes async must live inside a [`tokio::task::LocalSet`].

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::{LocalBoxStream, Stream, StreamExt};

use crate::error::{ReactiveError, ResourceError};
use crate::graph::{NodeId, NodeKind, NodeState};

use super::runtime::Runtime;
use super::signal::{Equality, Signal, SignalOptions};
use super::subscriber::Subscriber;

/// What a resource fetcher produces on each run.
pub enum AsyncSource<T> {
    /// Already settled; commits during the run.
    Ready(Result<T, ResourceError>),

    /// Settles once; the resource is loading until then.
    Future(LocalBoxFuture<'static, Result<T, ResourceError>>),

    /// Each item commits as it arrives.
    Stream(LocalBoxStream<'static, Result<T, ResourceError>>),
}

impl<T: 'static> AsyncSource<T> {
    /// A value available right away.
    pub fn ready(value: T) -> Self {
        AsyncSource::Ready(Ok(value))
    }

    /// A failure available right away.
    pub fn failed(err: impl Into<ResourceError>) -> Self {
        AsyncSource::Ready(Err(err.into()))
    }

    /// Wrap a future.
    pub fn future<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + 'static,
        E: Into<ResourceError>,
    {
        AsyncSource::Future(future.map(|result| result.map_err(Into::into)).boxed_local())
    }

    /// Wrap a stream.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + 'static,
        E: Into<ResourceError>,
    {
        AsyncSource::Stream(stream.map(|item| item.map_err(Into::into)).boxed_local())
    }
}

impl<T> fmt::Debug for AsyncSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncSource::Ready(Ok(_)) => f.write_str("AsyncSource::Ready(Ok(..))"),
            AsyncSource::Ready(Err(err)) => write!(f, "AsyncSource::Ready(Err({err}))"),
            AsyncSource::Future(_) => f.write_str("AsyncSource::Future(..)"),
            AsyncSource::Stream(_) => f.write_str("AsyncSource::Stream(..)"),
        }
    }
}

/// Options for [`create_async_with_options`].
pub struct ResourceOptions<T> {
    /// Value readable before the first fetch settles.
    pub initial: Option<T>,
    /// Debug name shown in diagnostics.
    pub name: Option<Cow<'static, str>>,
}

impl<T> Default for ResourceOptions<T> {
    fn default() -> Self {
        Self {
            initial: None,
            name: None,
        }
    }
}

/// State shared between the resource node, its handles and in-flight tasks.
struct ResourceState<T: 'static> {
    value: Signal<Option<T>>,
    loading: Signal<bool>,
    error: Signal<Option<ResourceError>>,
    generation: Cell<u64>,
    disposed: Cell<bool>,
}

impl<T: 'static> ResourceState<T> {
    fn new(initial: Option<T>) -> Self {
        let same_error = |a: &Option<ResourceError>, b: &Option<ResourceError>| match (a, b) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            (None, None) => true,
            _ => false,
        };
        Self {
            value: Signal::with_options(
                initial,
                SignalOptions {
                    equals: Equality::Never,
                    name: Some("resource.value".into()),
                },
            ),
            loading: Signal::with_options(
                false,
                SignalOptions {
                    equals: Equality::default(),
                    name: Some("resource.loading".into()),
                },
            ),
            error: Signal::with_options(
                None,
                SignalOptions {
                    equals: Equality::custom(same_error),
                    name: Some("resource.error".into()),
                },
            ),
            generation: Cell::new(0),
            disposed: Cell::new(false),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.disposed.get() && self.generation.get() == generation
    }

    fn start_loading(&self) {
        Runtime::with(|rt| {
            rt.batch(|| {
                self.error.set(None);
                self.loading.set(true);
            })
        });
    }

    /// Commit a settled result if `generation` is still the latest.
    fn commit(&self, generation: u64, result: Result<T, ResourceError>) {
        if !self.is_current(generation) {
            tracing::debug!(
                generation,
                latest = self.generation.get(),
                disposed = self.disposed.get(),
                "discarding superseded resource result"
            );
            return;
        }
        Runtime::with(|rt| {
            rt.batch(|| {
                match result {
                    Ok(value) => {
                        self.error.set(None);
                        self.value.set(Some(value));
                    }
                    Err(err) => {
                        tracing::debug!(generation, %err, "resource fetch failed");
                        self.error.set(Some(err));
                    }
                }
                self.loading.set(false);
            })
        });
    }

    /// A stream ended; stop loading if it was still the latest.
    fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.loading.set(false);
        }
    }
}

type FetchFn<T> = Box<dyn FnMut() -> AsyncSource<T>>;

struct ResourceInner<T: 'static> {
    fetcher: RefCell<FetchFn<T>>,
    state: Rc<ResourceState<T>>,
}

impl<T: 'static> Subscriber for ResourceInner<T> {
    fn run(&self, id: NodeId) -> bool {
        let Ok(mut fetcher) = self.fetcher.try_borrow_mut() else {
            panic!("{}", ReactiveError::Cycle(id));
        };
        let generation = self.state.generation.get() + 1;
        self.state.generation.set(generation);
        tracing::trace!(?id, generation, "starting fetch");
        let source = fetcher();
        drop(fetcher);

        match source {
            AsyncSource::Ready(result) => self.state.commit(generation, result),
            AsyncSource::Future(future) => {
                self.state.start_loading();
                let state = Rc::clone(&self.state);
                tokio::task::spawn_local(async move {
                    let result = future.await;
                    state.commit(generation, result);
                });
            }
            AsyncSource::Stream(mut stream) => {
                self.state.start_loading();
                let state = Rc::clone(&self.state);
                tokio::task::spawn_local(async move {
                    while let Some(item) = stream.next().await {
                        if !state.is_current(generation) {
                            tracing::debug!(generation, "abandoning superseded resource stream");
                            return;
                        }
                        state.commit(generation, item);
                    }
                    state.finish(generation);
                });
            }
        }
        // Readers depend on the state signals, not on the node.
        false
    }

    fn dispose(&self) {
        self.state.disposed.set(true);
    }
}

/// A value produced by async work, readable synchronously.
///
/// [`Resource::read`] reports a pending fetch as [`ReactiveError::NotReady`]
/// and a failed one as [`ReactiveError::Resource`], so callers can tell
/// "not yet" from "failed".
pub struct Resource<T: 'static> {
    id: NodeId,
    state: Rc<ResourceState<T>>,
}

impl<T: 'static> Resource<T> {
    /// Get the resource's node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read the settled value.
    ///
    /// In order: a stored error is returned as [`ReactiveError::Resource`];
    /// a fetch in flight, or no value at all, is [`ReactiveError::NotReady`];
    /// otherwise the latest value. Tracks all three.
    pub fn read(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        Runtime::with(|rt| rt.update_if_necessary(self.id));
        if self.is_disposed() {
            return Err(ReactiveError::Disposed(self.id));
        }
        if let Some(err) = self.state.error.get() {
            return Err(ReactiveError::Resource(err));
        }
        if self.state.loading.get() {
            return Err(ReactiveError::NotReady);
        }
        self.state.value.get().ok_or(ReactiveError::NotReady)
    }

    /// The last good value, or the initial one, whatever is in flight.
    pub fn latest(&self) -> Option<T>
    where
        T: Clone,
    {
        self.state.value.get()
    }

    /// Whether a future or stream from the latest fetch is still pending.
    pub fn loading(&self) -> bool {
        self.state.loading.get()
    }

    /// The error the latest fetch settled with, if any.
    pub fn error(&self) -> Option<ResourceError> {
        self.state.error.get()
    }

    /// Number of fetches started so far.
    pub fn generation(&self) -> u64 {
        self.state.generation.get()
    }

    /// Run the fetcher again even though no source changed.
    pub fn refetch(&self) {
        if self.is_disposed() {
            return;
        }
        Runtime::with(|rt| rt.invalidate(self.id));
    }

    /// Dispose the resource. Results still in flight are dropped.
    pub fn dispose(&self) {
        Runtime::with(|rt| rt.dispose_node(self.id));
    }

    /// Whether the resource has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.get() || Runtime::node_state(self.id) == NodeState::Disposed
    }
}

impl<T: 'static> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("generation", &self.generation())
            .field("loading", &self.state.loading.get_untracked())
            .field("error", &self.state.error.get_untracked())
            .finish_non_exhaustive()
    }
}

/// Create a resource with explicit options.
///
/// The fetcher runs right away (queued instead inside a batch or flush) and
/// again whenever something it read changes.
///
/// # Panics
///
/// Spawning a future or stream panics outside a [`tokio::task::LocalSet`].
pub fn create_async_with_options<T: 'static>(
    fetcher: impl FnMut() -> AsyncSource<T> + 'static,
    options: ResourceOptions<T>,
) -> Resource<T> {
    let state = Rc::new(ResourceState::new(options.initial));
    let inner = Rc::new(ResourceInner {
        fetcher: RefCell::new(Box::new(fetcher) as FetchFn<T>),
        state: Rc::clone(&state),
    });

    let id = Runtime::with(|rt| {
        let id = rt.create_node(NodeKind::Resource, Some(inner), options.name);
        if rt.batch_depth.get() > 0 || rt.flushing.get() {
            let graph = rt.graph.borrow();
            rt.scheduler.borrow_mut().enqueue(&graph, id);
        } else {
            rt.update_if_necessary(id);
        }
        id
    });

    Resource { id, state }
}

/// Create a resource, optionally seeded with a value readable before the
/// first fetch settles.
pub fn create_async<T: 'static>(
    fetcher: impl FnMut() -> AsyncSource<T> + 'static,
    initial: Option<T>,
) -> Resource<T> {
    create_async_with_options(
        fetcher,
        ResourceOptions {
            initial,
            name: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, Signal};

    #[test]
    fn ready_value_commits_immediately() {
        create_root(|_| {
            let resource = create_async(|| AsyncSource::ready(7), None);
            assert_eq!(resource.read().unwrap(), 7);
            assert!(!resource.loading());
            assert_eq!(resource.generation(), 1);
        });
    }

    #[test]
    fn refetches_when_source_changes() {
        create_root(|_| {
            let id = Signal::new(1);
            let i = id.clone();
            let resource = create_async(move || AsyncSource::ready(i.get() * 100), None);

            id.set(2);
            assert_eq!(resource.read().unwrap(), 200);
            assert_eq!(resource.generation(), 2);
        });
    }

    #[test]
    fn error_is_returned_before_value() {
        create_root(|_| {
            let fail = Signal::new(false);
            let f = fail.clone();
            let resource = create_async(
                move || {
                    if f.get() {
                        AsyncSource::failed(ResourceError::msg("offline"))
                    } else {
                        AsyncSource::ready("ok")
                    }
                },
                None,
            );

            fail.set(true);
            let err = resource.read().unwrap_err();
            assert!(matches!(err, ReactiveError::Resource(_)));
            assert_eq!(err.to_string(), "resource failed: offline");
            // The last good value survives the failure.
            assert_eq!(resource.latest(), Some("ok"));

            fail.set(false);
            assert_eq!(resource.read().unwrap(), "ok");
            assert!(resource.error().is_none());
        });
    }

    #[test]
    fn refetch_starts_a_new_generation() {
        create_root(|_| {
            let calls = Rc::new(Cell::new(0));
            let c = calls.clone();
            let resource = create_async(
                move || {
                    c.set(c.get() + 1);
                    AsyncSource::ready(c.get())
                },
                None,
            );

            resource.refetch();
            assert_eq!(resource.generation(), 2);
            assert_eq!(resource.read().unwrap(), 2);
        });
    }

    #[test]
    fn initial_value_is_latest_before_first_commit() {
        create_root(|_| {
            let resource = create_async_with_options(
                || AsyncSource::failed(ResourceError::msg("nope")),
                ResourceOptions {
                    initial: Some(5),
                    name: Some("seeded".into()),
                },
            );
            assert_eq!(resource.latest(), Some(5));
            assert!(resource.read().is_err());
        });
    }

    #[test]
    fn disposed_resource_ignores_refetch() {
        let calls = Rc::new(Cell::new(0));
        let resource = create_root(|_| {
            let c = calls.clone();
            create_async(
                move || {
                    c.set(c.get() + 1);
                    AsyncSource::ready(())
                },
                None,
            )
        });

        resource.dispose();
        resource.refetch();
        assert_eq!(calls.get(), 1);
        assert!(matches!(resource.read(), Err(ReactiveError::Disposed(_))));
    }
}
