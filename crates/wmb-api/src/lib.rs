//! JSON REST API for WatchMyBack checklist sync.
//!
//! Exposes an axum [`Router`] backed by a [`ChecklistSync`] over any
//! [`DocumentStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", wmb_api::api_router(sync.clone()))
//! ```

pub mod checklists;
pub mod error;

use std::path::PathBuf;

use axum::{
  Router,
  routing::{get, post},
};
use serde::Deserialize;
use wmb_core::store::DocumentStore;
use wmb_sync::ChecklistSync;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `WMB_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  /// SQLite file holding the document store; `~` is expanded.
  pub store_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `sync`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(sync: ChecklistSync<S>) -> Router<()>
where
  S: DocumentStore + 'static,
{
  Router::new()
    .route(
      "/users/{user_id}/checklists",
      get(checklists::list_for_user::<S>).delete(checklists::delete_for_user::<S>),
    )
    .route("/checklists", post(checklists::create::<S>))
    .route(
      "/checklists/{id}",
      get(checklists::get_one::<S>)
        .put(checklists::update::<S>)
        .delete(checklists::delete_one::<S>),
    )
    .with_state(sync)
}

// ─── Integration tests ────────────────────────────────────────────────────────
