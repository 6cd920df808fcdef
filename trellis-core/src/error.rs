//! Error types for the reactive runtime.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::graph::NodeId;

/// Errors reported by the reactive runtime.
///
/// User code that fails inside a compute or effect body panics; those panics
/// unwind to whoever triggered the flush. The variants here cover misuse of
/// the runtime itself and the states an async resource can be read in.
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// An operation that needs a current owner ran outside of any scope.
    #[error("no reactive owner is active")]
    NoOwner,

    /// `get_context` found neither a provided value nor a default.
    #[error("context `{name}` was not provided and has no default")]
    ContextNotFound {
        /// Type name of the context value.
        name: &'static str,
    },

    /// An async resource was read before any value resolved.
    #[error("resource is not ready")]
    NotReady,

    /// An async resource's fetcher failed.
    #[error("resource failed: {0}")]
    Resource(ResourceError),

    /// The node was disposed and can no longer be read.
    #[error("reactive node {0:?} has been disposed")]
    Disposed(NodeId),

    /// A computation read itself while it was being evaluated.
    #[error("cycle detected while evaluating reactive node {0:?}")]
    Cycle(NodeId),

    /// A single flush ran more effects than the configured limit.
    #[error("flush exceeded {0} effect runs; likely an update loop")]
    FlushLimit(usize),
}

impl ReactiveError {
    /// Whether this is the "still pending" condition of an async resource.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ReactiveError::NotReady)
    }
}

/// The failure an async resource settled with.
///
/// Wraps any error type behind an `Rc` so it can be stored in a signal and
/// handed out to every reader.
#[derive(Clone)]
pub struct ResourceError(Rc<dyn Error + 'static>);

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

impl ResourceError {
    /// Builds an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self(Rc::new(Message(message.to_string())))
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Whether two handles refer to the same underlying error.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<E> From<E> for ResourceError
where
    E: Error + 'static,
{
    fn from(err: E) -> Self {
        Self(Rc::new(err))
    }
}

impl fmt::Debug for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResourceError").field(&self.0).finish()
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_is_distinguished() {
        assert!(ReactiveError::NotReady.is_not_ready());
        assert!(!ReactiveError::NoOwner.is_not_ready());
        assert!(!ReactiveError::Resource(ResourceError::msg("boom")).is_not_ready());
    }

    #[test]
    fn resource_error_wraps_std_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = ResourceError::from(io);
        assert_eq!(err.to_string(), "disk on fire");

        let copy = err.clone();
        assert!(copy.ptr_eq(&err));
        assert!(!ResourceError::msg("disk on fire").ptr_eq(&err));
    }

    #[test]
    fn messages_render() {
        let err = ReactiveError::ContextNotFound { name: "Theme" };
        assert_eq!(
            err.to_string(),
            "context `Theme` was not provided and has no default"
        );
        let err = ReactiveError::Resource(ResourceError::msg("timeout"));
        assert_eq!(err.to_string(), "resource failed: timeout");
    }
}
