//! Runtime support for coordinated batches.
//!
//! This module provides the ambient coordination context that lets one
//! batch scope span several independent stores.

mod context;

pub(crate) use context::PendingFlush;
pub use context::{batch, batch_async, BatchContext};
