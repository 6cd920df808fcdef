//! Context Registry
//!
//! Contexts pass values down the ownership tree without threading them
//! through every call. A [`Context`] is an opaque token; the value provided
//! for it lives in the context map of the owner that called
//! [`set_context`], and is found by walking up from the current owner.
//!
//! # Implementation
//!
//! Each node holds an `Rc` to a map from token id to value. A new node shares
//! its parent's map. Providing a value copies the map and inserts into the
//! copy, so a parent's map is never mutated by a child.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::ReactiveError;

use super::runtime::Runtime;

/// Unique identifier for a context token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ContextId(u64);

impl ContextId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type ContextMap = IndexMap<ContextId, Rc<dyn Any>>;

/// A context token.
///
/// Lookups go by token identity, never by type or name: two contexts of the
/// same type are independent.
pub struct Context<T: 'static> {
    id: ContextId,
    default: Option<Rc<T>>,
}

impl<T: 'static> Context<T> {
    /// A context with no default; reading it unprovided is an error.
    pub fn new() -> Self {
        Self {
            id: ContextId::new(),
            default: None,
        }
    }

    /// A context that falls back to `default` when not provided.
    pub fn with_default(default: T) -> Self {
        Self {
            id: ContextId::new(),
            default: Some(Rc::new(default)),
        }
    }
}

impl<T: 'static> Default for Context<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Create a new context token, optionally with a default value.
pub fn create_context<T: 'static>(default: Option<T>) -> Context<T> {
    match default {
        Some(default) => Context::with_default(default),
        None => Context::new(),
    }
}

/// Provide `value` for `context` on the current owner and everything created
/// under it.
pub fn set_context<T: 'static>(context: &Context<T>, value: T) -> Result<(), ReactiveError> {
    Runtime::with(|rt| {
        let owner = rt.owner.get().ok_or(ReactiveError::NoOwner)?;
        let mut graph = rt.graph.borrow_mut();
        let node = graph.get_mut(owner).ok_or(ReactiveError::Disposed(owner))?;

        let mut map = node.contexts.as_deref().cloned().unwrap_or_default();
        map.insert(context.id, Rc::new(value));
        node.contexts = Some(Rc::new(map));
        Ok(())
    })
}

/// Find the value provided for `context` by the current owner or its
/// nearest ancestor.
fn lookup<T: 'static>(context: &Context<T>) -> Result<Option<Rc<dyn Any>>, ReactiveError> {
    Runtime::with(|rt| {
        let owner = rt.owner.get().ok_or(ReactiveError::NoOwner)?;
        let graph = rt.graph.borrow();
        let mut current = Some(owner);
        while let Some(node) = current.and_then(|id| graph.get(id)) {
            if let Some(value) = node.contexts.as_ref().and_then(|map| map.get(&context.id)) {
                return Ok(Some(value.clone()));
            }
            current = node.parent;
        }
        Ok(None)
    })
}

/// Read the value of `context`.
///
/// Falls back to the context's default. Fails with
/// [`ReactiveError::NoOwner`] outside of any scope and with
/// [`ReactiveError::ContextNotFound`] when there is neither a provided value
/// nor a default.
pub fn get_context<T: Clone + 'static>(context: &Context<T>) -> Result<T, ReactiveError> {
    let provided = lookup(context)?;
    if let Some(value) = provided.as_ref().and_then(|v| v.downcast_ref::<T>()) {
        return Ok(value.clone());
    }
    context
        .default
        .as_deref()
        .cloned()
        .ok_or(ReactiveError::ContextNotFound {
            name: std::any::type_name::<T>(),
        })
}

/// Whether a value was provided for `context` above the current owner.
/// Defaults do not count.
pub fn has_context<T: 'static>(context: &Context<T>) -> bool {
    matches!(lookup(context), Ok(Some(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{create_root, create_scope};

    #[test]
    fn context_ids_are_unique() {
        let a = Context::<u32>::new();
        let b = Context::<u32>::new();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn provided_values_keep_insertion_order() {
        let first = Context::<u32>::new();
        let second = Context::<u32>::new();
        create_root(|root| {
            set_context(&first, 1).unwrap();
            set_context(&second, 2).unwrap();
            set_context(&first, 3).unwrap();

            let keys: Vec<ContextId> = Runtime::with(|rt| {
                let graph = rt.graph.borrow();
                let map = graph.get(root.id()).unwrap().contexts.clone().unwrap();
                map.keys().copied().collect()
            });
            assert_eq!(keys, [first.id, second.id]);
            assert_eq!(get_context(&first).unwrap(), 3);
        });
    }

    #[test]
    fn child_sees_parent_value() {
        let theme = Context::<&'static str>::new();
        create_root(|_| {
            set_context(&theme, "dark").unwrap();
            create_scope(|_| {
                create_scope(|_| {
                    assert_eq!(get_context(&theme).unwrap(), "dark");
                    assert!(has_context(&theme));
                });
            });
        });
    }

    #[test]
    fn child_override_does_not_leak_to_parent() {
        let depth = Context::<u32>::new();
        create_root(|_| {
            set_context(&depth, 1).unwrap();
            create_scope(|_| {
                set_context(&depth, 2).unwrap();
                assert_eq!(get_context(&depth).unwrap(), 2);
            });
            assert_eq!(get_context(&depth).unwrap(), 1);
        });
    }

    #[test]
    fn value_set_after_child_creation_is_found() {
        let label = Context::<String>::new();
        create_root(|root| {
            let child = create_scope(|child| child);
            root.run_in(|| set_context(&label, "late".to_string()).unwrap());
            child.run_in(|| assert_eq!(get_context(&label).unwrap(), "late"));
        });
    }

    #[test]
    fn default_used_when_not_provided() {
        let size = create_context(Some(12u8));
        create_root(|_| {
            assert_eq!(get_context(&size).unwrap(), 12);
            assert!(!has_context(&size));
        });
    }

    #[test]
    fn missing_context_is_an_error() {
        let missing = create_context::<i64>(None);
        create_root(|_| {
            let err = get_context(&missing).unwrap_err();
            assert!(matches!(err, ReactiveError::ContextNotFound { .. }));
        });
    }

    #[test]
    fn no_owner_is_an_error() {
        let ctx = Context::with_default(1);
        assert!(matches!(get_context(&ctx), Err(ReactiveError::NoOwner)));
        assert!(matches!(set_context(&ctx, 2), Err(ReactiveError::NoOwner)));
        assert!(!has_context(&ctx));
    }

    #[test]
    fn same_type_different_tokens() {
        let a = Context::<u32>::new();
        let b = Context::<u32>::new();
        create_root(|_| {
            set_context(&a, 7).unwrap();
            assert_eq!(get_context(&a).unwrap(), 7);
            assert!(get_context(&b).is_err());
        });
    }
}
