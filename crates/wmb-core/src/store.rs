//! The `DocumentStore` trait: the remote document database contract.
//!
//! The trait is implemented by storage backends (e.g. `wmb-store-sqlite`).
//! `wmb-sync` depends on this abstraction, not on any concrete backend.
//!
//! The store is schema-flexible and addressed by collection name and document
//! id. It offers no transactions across collections and no cascades.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Collection holding one document per checklist, keyed by checklist id.
pub const CHECKLISTS: &str = "checklists";

/// Collection holding one document per item, keyed by item id and filterable
/// by `listId`.
pub const ITEMS: &str = "items";

// ─── Document ────────────────────────────────────────────────────────────────

/// A stored document: its id and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id:   String,
  pub body: Value,
}

impl Document {
  /// Decode the body into a typed record.
  pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
    Ok(T::deserialize(&self.body)?)
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Bound on store error types.
///
/// A store reports `is_canceled` when the call was abandoned rather than
/// rejected (e.g. the connection was closed underneath it).
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  fn is_canceled(&self) -> bool { false }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a document store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait DocumentStore: Send + Sync {
  type Error: StoreFailure;

  /// Retrieve a document by id. Returns `None` if not found.
  fn get<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  /// Return every document in `collection` whose top-level `field` equals
  /// `value`, in insertion order. An empty result is not an error.
  fn find_by_field<'a>(
    &'a self,
    collection: &'a str,
    field: &'a str,
    value: &'a Value,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Create or overwrite the document at `id`.
  ///
  /// Overwriting keeps the document's original insertion position.
  fn set<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    body: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Merge `fields` into the top level of an existing document.
  ///
  /// Returns an error if the document does not exist.
  fn update_fields<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    fields: Map<String, Value>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete the document at `id`. Deleting a missing document succeeds.
  fn delete<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
