//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use wmb_core::outcome::{Operation, SyncError};

/// One failed sub-operation, as reported to clients.
#[derive(Debug, Serialize)]
pub struct FailureReport {
  pub operation: Operation,
  pub cause:     String,
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The input clashes with documents already stored.
  #[error("conflict: {0}")]
  Conflict(String),

  /// One or more store sub-operations failed.
  #[error("{} sub-operation(s) failed", .0.len())]
  Sync(Vec<FailureReport>),

  #[error("{0}")]
  Canceled(String),
}

impl ApiError {
  /// Input clashing with stored documents becomes 409, other invalid input
  /// 400; anything that reached the store becomes a per-operation failure
  /// report.
  pub fn from_sync<E: std::fmt::Display>(err: SyncError<E>) -> Self {
    if err.is_conflict() {
      return Self::Conflict(err.to_string());
    }
    if err.is_validation() {
      return Self::BadRequest(err.to_string());
    }
    let reports = err
      .failures
      .into_iter()
      .map(|f| FailureReport {
        cause:     f.cause.to_string(),
        operation: f.op,
      })
      .collect();
    Self::Sync(reports)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::NotFound(m) => {
        (StatusCode::NOT_FOUND, Json(json!({ "error": m }))).into_response()
      }
      ApiError::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": m }))).into_response()
      }
      ApiError::Conflict(m) => {
        (StatusCode::CONFLICT, Json(json!({ "error": m }))).into_response()
      }
      ApiError::Sync(failures) => {
        let message = format!("{} sub-operation(s) failed", failures.len());
        (
          StatusCode::BAD_GATEWAY,
          Json(json!({ "error": message, "failures": failures })),
        )
          .into_response()
      }
      ApiError::Canceled(m) => {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": m }))).into_response()
      }
    }
  }
}
