//! Trellis Core
//!
//! This crate provides the fine-grained reactive runtime behind Trellis.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Async resources with out-of-order completion handling
//! - An ownership tree with scoped cleanup and contexts
//! - A push-pull update algorithm with render and user effect queues
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The public primitives and the per-thread runtime
//! - `graph`: Node storage, node states and the effect scheduler
//! - `config`: Per-thread scheduler settings
//! - `diagnostics`: Serializable snapshots of the graph
//! - `error`: The error type shared by all of the above
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{create_root, Effect, Memo, Signal};
//!
//! create_root(|root| {
//!     // Create a signal
//!     let count = Signal::new(0);
//!
//!     // Create a derived value
//!     let c = count.clone();
//!     let doubled = Memo::new(move |_| c.get() * 2);
//!
//!     // Create an effect
//!     let (c, d) = (count.clone(), doubled.clone());
//!     Effect::new(move || {
//!         println!("Count: {}, Doubled: {}", c.get(), d.get());
//!     });
//!
//!     // Update the signal
//!     count.set(5);
//!     // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//!
//!     root.dispose();
//! });
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod reactive;

pub use config::{config, configure, FlushMode, RuntimeConfig};
pub use diagnostics::{snapshot, GraphSnapshot, NodeSnapshot};
pub use error::{ReactiveError, ResourceError};
pub use reactive::{batch, flush, untrack};
