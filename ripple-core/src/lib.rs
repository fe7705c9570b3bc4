//! Ripple Core
//!
//! This crate provides the reactivity engine behind the Ripple
//! view-binding layer. It implements:
//!
//! - Reactive primitives (refs, computeds, effects, watchers)
//! - Batched effect scheduling with a runaway-loop guard
//! - Effect scopes for bulk teardown of reactive subtrees
//! - A dynamic object model with deep reactive proxies
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, dependency tracking and the runtime
//! - `data`: Dynamic values, shared objects and arrays, reactive proxies
//! - `config`: Runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::reactive::{computed, effect, tick, Ref};
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let count_clone = count.clone();
//! let doubled = computed(move || count_clone.get() * 2);
//!
//! // Create an effect
//! let (count_clone, doubled_clone) = (count.clone(), doubled.clone());
//! effect(move || {
//!     println!("Count: {}, Doubled: {}", count_clone.get(), doubled_clone.get());
//! });
//!
//! // Update the ref, then let the scheduler flush
//! count.set(5);
//! tick()?;
//! // Effect re-ran, printed: "Count: 5, Doubled: 10"
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod reactive;

pub use config::RuntimeConfig;
pub use data::{reactive, Array, Data, Object, Reactive};
pub use error::{ReactiveError, Result};
