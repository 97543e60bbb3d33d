//! Handlers for checklist endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/users/:user_id/checklists` | Empty array when the user owns none |
//! | `DELETE` | `/users/:user_id/checklists` | Returns `{"deleted": n}` |
//! | `POST`   | `/checklists` | Body: array of checklists with items; 409 if an id is taken |
//! | `GET`    | `/checklists/:id` | 404 if not found |
//! | `PUT`    | `/checklists/:id` | Body: checklist with its new items |
//! | `DELETE` | `/checklists/:id` | |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde_json::json;
use wmb_core::{checklist::ChecklistWithItems, outcome::SyncResult, store::DocumentStore};
use wmb_sync::{ChecklistSync, Outcome};

use crate::error::ApiError;

/// Turn a sync outcome into a handler result.
fn settle<T, S: DocumentStore>(outcome: Outcome<T, S>) -> Result<T, ApiError> {
  match outcome {
    SyncResult::Success(value) => Ok(value),
    SyncResult::Error(err) => Err(ApiError::from_sync(err)),
    SyncResult::Canceled(c) => Err(ApiError::Canceled(c.to_string())),
  }
}

// ─── Per user ────────────────────────────────────────────────────────────────

/// `GET /users/:user_id/checklists`
pub async fn list_for_user<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Path(user_id): Path<String>,
) -> Result<Json<Vec<ChecklistWithItems>>, ApiError> {
  let views = settle::<_, S>(sync.fetch_user_checklists(&user_id).await)?;
  Ok(Json(views))
}

/// `DELETE /users/:user_id/checklists`
pub async fn delete_for_user<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let deleted = settle::<_, S>(sync.delete_user_checklists(&user_id).await)?;
  Ok(Json(json!({ "deleted": deleted })))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /checklists` — body: `[{"checklist": {..}, "items": [..]}, ..]`
pub async fn create<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Json(body): Json<Vec<ChecklistWithItems>>,
) -> Result<impl IntoResponse, ApiError> {
  settle::<_, S>(sync.create_checklists(&body).await)?;
  Ok((StatusCode::CREATED, Json(body)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /checklists/:id`
pub async fn get_one<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Path(id): Path<String>,
) -> Result<Json<ChecklistWithItems>, ApiError> {
  settle::<_, S>(sync.fetch_checklist(&id).await)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("checklist {id}")))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /checklists/:id` — body: `{"checklist": {..}, "items": [..]}`
///
/// The body's checklist id must match the path.
pub async fn update<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Path(id): Path<String>,
  Json(body): Json<ChecklistWithItems>,
) -> Result<StatusCode, ApiError> {
  if body.checklist.id != id {
    return Err(ApiError::BadRequest(format!(
      "body checklist id {:?} does not match path id {id:?}",
      body.checklist.id
    )));
  }
  settle::<_, S>(sync.update_checklist(&body.checklist, &body.items).await)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /checklists/:id`
pub async fn delete_one<S: DocumentStore>(
  State(sync): State<ChecklistSync<S>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
  settle::<_, S>(sync.delete_checklist(&id).await)?;
  Ok(StatusCode::NO_CONTENT)
}
