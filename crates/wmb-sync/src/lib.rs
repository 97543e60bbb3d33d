//! Checklist synchronization against a [`DocumentStore`].
//!
//! The store has no nested collections, foreign keys or cross-collection
//! transactions. [`ChecklistSync`] keeps the `checklists` and `items`
//! collections consistent by sequencing store calls itself and folding every
//! sub-operation outcome into one [`SyncResult`].
//!
//! Writes are best-effort: a failed sub-operation is reported, never rolled
//! back, so a partial create, update or delete can leave documents behind.
//!
//! [`DocumentStore`]: wmb_core::store::DocumentStore
//! [`SyncResult`]: wmb_core::outcome::SyncResult

mod locks;
mod service;

pub use locks::{KeyGuard, KeyedLocks};
pub use service::{ChecklistSync, Outcome};

#[cfg(test)]
mod tests;
