//! Checklist types: the parent document, its items, and the read-time join.
//!
//! A checklist and its items live in two separate collections. Items point at
//! their parent through `list_id`; the store knows nothing about the relation,
//! so the invariants below are enforced here before anything is written.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Document field names, as stored. Filters and patches are expressed in
/// these terms.
pub mod fields {
  pub const USER_ID:   &str = "userId";
  pub const TRIP_TYPE: &str = "tripType";
  pub const NAME:      &str = "name";
  pub const LIST_ID:   &str = "listId";
  pub const CHECKED:   &str = "checked";
}

/// Generate a fresh opaque identifier.
pub fn generate_id() -> String { Uuid::new_v4().to_string() }

// ─── Checklist ───────────────────────────────────────────────────────────────

/// A named, categorized, user-owned list of things to bring on a trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
  pub id:        String,
  pub user_id:   String,
  /// Category tag, e.g. `"hiking"` or `"kayak"`.
  pub trip_type: String,
  pub name:      String,
}

impl Checklist {
  /// Build a checklist with a freshly generated id.
  pub fn new(
    user_id: impl Into<String>,
    trip_type: impl Into<String>,
    name: impl Into<String>,
  ) -> Self {
    Self {
      id:        generate_id(),
      user_id:   user_id.into(),
      trip_type: trip_type.into(),
      name:      name.into(),
    }
  }
}

// ─── Item ────────────────────────────────────────────────────────────────────

/// A single checkable entry belonging to one checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
  pub id:      String,
  /// Id of the parent [`Checklist`].
  pub list_id: String,
  pub name:    String,
  #[serde(default)]
  pub checked: bool,
}

impl ChecklistItem {
  /// Build an unchecked item with a freshly generated id.
  pub fn new(list_id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id:      generate_id(),
      list_id: list_id.into(),
      name:    name.into(),
      checked: false,
    }
  }

  pub fn checked(mut self, checked: bool) -> Self {
    self.checked = checked;
    self
  }
}

// ─── Composite view ──────────────────────────────────────────────────────────

/// A checklist joined with its items. Never stored as a unit; rebuilt on
/// every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistWithItems {
  pub checklist: Checklist,
  /// Items in insertion order.
  #[serde(default)]
  pub items:     Vec<ChecklistItem>,
}

impl ChecklistWithItems {
  pub fn new(checklist: Checklist) -> Self {
    Self { checklist, items: Vec::new() }
  }

  /// Append a new item bound to this checklist.
  pub fn with_item(mut self, name: impl Into<String>, checked: bool) -> Self {
    let item = ChecklistItem::new(self.checklist.id.clone(), name).checked(checked);
    self.items.push(item);
    self
  }

  pub fn validate(&self) -> Result<()> {
    validate_items(&self.checklist, &self.items)
  }
}

/// Check that `items` may be stored as the complete item set of `checklist`.
///
/// Every item must carry a non-empty id, point at `checklist`, and appear at
/// most once.
pub fn validate_items(checklist: &Checklist, items: &[ChecklistItem]) -> Result<()> {
  if checklist.id.is_empty() {
    return Err(Error::EmptyChecklistId);
  }

  let mut seen = HashSet::with_capacity(items.len());
  for item in items {
    if item.id.is_empty() {
      return Err(Error::EmptyItemId(checklist.id.clone()));
    }
    if item.list_id != checklist.id {
      return Err(Error::ForeignItem {
        item_id:      item.id.clone(),
        list_id:      item.list_id.clone(),
        checklist_id: checklist.id.clone(),
      });
    }
    if !seen.insert(item.id.as_str()) {
      return Err(Error::DuplicateItem(item.id.clone()));
    }
  }
  Ok(())
}
