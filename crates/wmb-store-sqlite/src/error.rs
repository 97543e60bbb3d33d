//! Error type for `wmb-store-sqlite`.

use thiserror::Error;
use wmb_core::store::StoreFailure;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A field-level update targeted a document that does not exist.
  #[error("document not found: {collection}/{id}")]
  DocumentNotFound { collection: String, id: String },

  #[error("document {collection}/{id} is not a JSON object")]
  NotAnObject { collection: String, id: String },

  /// Field names are restricted to letters, digits and `_`.
  #[error("invalid field name: {0:?}")]
  InvalidField(String),
}

impl StoreFailure for Error {
  fn is_canceled(&self) -> bool {
    matches!(self, Self::Database(tokio_rusqlite::Error::ConnectionClosed))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
