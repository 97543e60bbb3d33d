//! Error types for `wmb-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("checklist id must not be empty")]
  EmptyChecklistId,

  #[error("item id must not be empty (checklist {0})")]
  EmptyItemId(String),

  #[error("item {item_id} belongs to checklist {list_id}, not {checklist_id}")]
  ForeignItem {
    item_id:      String,
    list_id:      String,
    checklist_id: String,
  },

  #[error("checklist {0} appears more than once in the batch")]
  DuplicateChecklist(String),

  #[error("duplicate item id {0}")]
  DuplicateItem(String),

  #[error("checklist {0} already exists")]
  ChecklistExists(String),

  #[error("item {item_id} is already stored under checklist {list_id}")]
  ItemTaken { item_id: String, list_id: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// The input clashes with what is already stored, rather than being
  /// malformed on its own.
  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::ChecklistExists(_) | Self::ItemTaken { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
