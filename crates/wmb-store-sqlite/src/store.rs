//! [`SqliteDocumentStore`] — the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde_json::{Map, Value};

use wmb_core::store::{Document, DocumentStore};

use crate::{
  encode::{encode_body, encode_dt, field_path, RawDocument},
  schema::SCHEMA,
  Error, Result,
};

/// Result of a field-level update, decided on the connection thread.
enum Patch {
  Applied,
  Missing,
  NotAnObject,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A document store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteDocumentStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteDocumentStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Count the documents in `collection`.
  pub async fn count(&self, collection: &str) -> Result<usize> {
    let collection = collection.to_owned();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM documents WHERE collection = ?1",
          rusqlite::params![collection],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(n as usize)
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteDocumentStore {
  type Error = Error;

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    let collection = collection.to_owned();
    let id         = id.to_owned();

    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT doc_id, body FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![collection, id],
            |row| {
              Ok(RawDocument {
                doc_id: row.get(0)?,
                body:   row.get(1)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn find_by_field(
    &self,
    collection: &str,
    field:      &str,
    value:      &Value,
  ) -> Result<Vec<Document>> {
    let collection = collection.to_owned();
    let path       = field_path(field)?;
    let value_json = encode_body(value)?;

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        // Comparing against json_extract of the literal puts both sides in
        // SQL's representation of the JSON value (text, integer, real).
        let mut stmt = conn.prepare(
          "SELECT doc_id, body FROM documents
           WHERE collection = ?1
             AND json_extract(body, ?2) = json_extract(?3, '$')
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![collection, path, value_json], |row| {
            Ok(RawDocument {
              doc_id: row.get(0)?,
              body:   row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn set(&self, collection: &str, id: &str, body: Value) -> Result<()> {
    let collection = collection.to_owned();
    let id         = id.to_owned();
    let body_str   = encode_body(&body)?;
    let now        = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, doc_id, body, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (collection, doc_id)
           DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
          rusqlite::params![collection, id, body_str, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_fields(
    &self,
    collection: &str,
    id:         &str,
    fields:     Map<String, Value>,
  ) -> Result<()> {
    let coll = collection.to_owned();
    let key  = id.to_owned();
    let now  = encode_dt(Utc::now());

    let patch = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let current: Option<String> = tx
          .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
            rusqlite::params![coll, key],
            |row| row.get(0),
          )
          .optional()?;

        let Some(current) = current else {
          return Ok(Patch::Missing);
        };
        let Ok(Value::Object(mut body)) = serde_json::from_str::<Value>(&current) else {
          return Ok(Patch::NotAnObject);
        };

        body.extend(fields);
        let merged = Value::Object(body).to_string();

        tx.execute(
          "UPDATE documents SET body = ?3, updated_at = ?4
           WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![coll, key, merged, now],
        )?;
        tx.commit()?;
        Ok(Patch::Applied)
      })
      .await?;

    match patch {
      Patch::Applied => Ok(()),
      Patch::Missing => Err(Error::DocumentNotFound {
        collection: collection.to_owned(),
        id:         id.to_owned(),
      }),
      Patch::NotAnObject => Err(Error::NotAnObject {
        collection: collection.to_owned(),
        id:         id.to_owned(),
      }),
    }
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<()> {
    let collection = collection.to_owned();
    let id         = id.to_owned();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2",
          rusqlite::params![collection, id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
