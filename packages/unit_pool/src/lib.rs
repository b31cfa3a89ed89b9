//! This package provides [`LocalUnitPool`] and [`UnitPool`], pools of reusable units with a
//! take/return lifecycle and an optional maximum instance count.
//!
//! A unit is a value produced by a factory and handed out by the pool. Taking a unit reuses
//! the most recently returned one or creates a new one; returning it makes it available
//! again. Pools are typically used for objects that are expensive to create and are needed
//! in bursts, such as visual effects, projectiles or scratch buffers.
//!
//! # Features
//!
//! - **Bounded or unbounded**: [`take()`][LocalUnitPool::take] and
//!   [`try_take()`][LocalUnitPool::try_take] respect the maximum instance count,
//!   [`take_aggressive()`][LocalUnitPool::take_aggressive] grows past it.
//! - **Ownership validation**: returning a unit to a pool that does not own it is an error
//!   or is ignored, depending on [`OwnershipChecks`].
//! - **Lifecycle hooks**: per-pool `on_taken`/`on_returned` hooks, optionally delegating to
//!   the [`UnitCallbacks`] implementation of the pooled type.
//! - **Notifications**: observers subscribe to take and return events of a pool and can be
//!   removed again via their [`Subscription`].
//! - **Scoped guards**: [`LocalUnitGuard`] and [`UnitGuard`] return their unit on drop.
//! - **Lazy scoped pools**: a [`PoolRef`] creates its pool on first use in a [`PoolScope`].
//! - **Thread-safe and single-threaded variants**: [`UnitPool`] for multi-threaded use,
//!   [`LocalUnitPool`] for single-threaded use without locking.
//!
//! # Example
//!
//! ```rust
//! use unit_pool::{Error, LocalUnitPool};
//!
//! let pool = LocalUnitPool::builder()
//!     .factory(|| String::with_capacity(64))
//!     .max_instances(2)
//!     .build();
//!
//! let first = pool.take().unwrap();
//! let second = pool.take().unwrap();
//!
//! // The pool is full and nothing is available.
//! assert!(matches!(
//!     pool.take(),
//!     Err(Error::CapacityExceeded { max_instances: 2 })
//! ));
//!
//! first.return_to_pool().unwrap();
//!
//! // The returned unit is reused.
//! let third = pool.take().unwrap();
//! assert!(third.ptr_eq(&first));
//!
//! assert_eq!(pool.len(), 2);
//! assert_eq!(pool.used(), 2);
//! # drop(second);
//! ```
//!
//! # Logging
//!
//! The package emits [`tracing`] events when pools grow, shrink, are rebuilt or destroyed and
//! when units change hands. It never installs a subscriber.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod builder;
mod callbacks;
mod constants;
mod error;
mod local_builder;
mod local_pool;
mod local_unit;
mod observers;
mod ownership_checks;
mod pool;
mod pool_core;
mod pool_ref;
mod unit;

pub use builder::*;
pub use callbacks::*;
pub use error::*;
pub use local_builder::*;
pub use local_pool::*;
pub use local_unit::*;
pub use observers::*;
pub use ownership_checks::*;
pub use pool::*;
pub use pool_ref::*;
pub use unit::*;
