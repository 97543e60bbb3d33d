//! Encoding and decoding helpers between store types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Document bodies are stored as
//! compact JSON text.

use chrono::{DateTime, Utc};
use serde_json::Value;
use wmb_core::store::Document;

use crate::{Error, Result};

// ─── DateTime<Utc>
// ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Field paths
// ──────────────────────────────────────────────────────────────

/// Turn a top-level field name into a `json_extract` path.
pub fn field_path(field: &str) -> Result<String> {
  let valid = !field.is_empty()
    && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
  if !valid {
    return Err(Error::InvalidField(field.to_owned()));
  }
  Ok(format!("$.{field}"))
}

// ─── Bodies
// ───────────────────────────────────────────────────────────────────

pub fn encode_body(body: &Value) -> Result<String> {
  Ok(serde_json::to_string(body)?)
}

/// Raw column values for one document row.
pub struct RawDocument {
  pub doc_id: String,
  pub body:   String,
}

impl RawDocument {
  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      id:   self.doc_id,
      body: serde_json::from_str(&self.body)?,
    })
  }
}
