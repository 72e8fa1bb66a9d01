// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Page serialization scheduler and eviction coordination.
//!
//! Many threads mutate shared in-memory page structures; a background
//! coordinator evicts pages under memory pressure. This module provides the
//! choreography between them:
//!
//! - [`SerialScheduler::serialize`] runs a mutation closure under a
//!   process-wide short-held lock, in one of three modes: exclusive,
//!   re-entrant, or evict (wake the coordinator and block until it
//!   acknowledges).
//! - [`SerialScheduler::complete_mutation`] is the single completion path:
//!   it credits the page's write generation, publishes the result with
//!   release semantics, and wakes the owning session.
//! - [`EvictionCoordinator`] is the on-demand background thread; it reclaims
//!   pages through the [`EvictionTarget`] trait and completes the sessions
//!   sleeping on it.
//!
//! Lock-free readers validate against [`Page`] write generations and retry
//! instead of blocking.

mod error;
mod evict;
mod page;
mod scheduler;
mod session;

pub use error::{MutationError, MutationResult};
pub use evict::{EvictionCoordinator, EvictionTarget, EvictorHandle};
pub use page::Page;
pub use scheduler::{SerialContext, SerialMode, SerialScheduler};
pub use session::{OpState, Session};
