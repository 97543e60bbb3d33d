//! Tests for `ChecklistSync` over an in-memory SQLite document store.
//!
//! `FaultyStore` wraps the real store so individual calls can be made to fail,
//! report cancellation, or stall.

use std::{
  sync::{Arc, Mutex},
  time::Duration,
};

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wmb_core::{
  checklist::{Checklist, ChecklistItem, ChecklistWithItems},
  outcome::{Operation, SyncResult},
  store::{Document, DocumentStore, StoreFailure, CHECKLISTS, ITEMS},
};
use wmb_store_sqlite::SqliteDocumentStore;

use crate::ChecklistSync;

// ─── Fault-injecting store ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
  Get,
  Find,
  Set,
  Update,
  Delete,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
  Fail,
  Cancel,
}

struct Rule {
  call:       Call,
  collection: &'static str,
  /// Document id, or the filter value for `Find`.
  key:        String,
  fault:      Fault,
}

#[derive(Debug, Error)]
enum FaultError {
  #[error("injected failure on {0}")]
  Injected(String),
  #[error("connection closed")]
  Closed,
  #[error(transparent)]
  Inner(#[from] wmb_store_sqlite::Error),
}

impl StoreFailure for FaultError {
  fn is_canceled(&self) -> bool { matches!(self, Self::Closed) }
}

struct FaultyStore {
  inner: SqliteDocumentStore,
  rules: Mutex<Vec<Rule>>,
  delay: Option<Duration>,
}

impl FaultyStore {
  async fn new() -> Self {
    Self {
      inner: SqliteDocumentStore::open_in_memory().await.unwrap(),
      rules: Mutex::new(Vec::new()),
      delay: None,
    }
  }

  async fn slow(delay: Duration) -> Self {
    Self { delay: Some(delay), ..Self::new().await }
  }

  fn inject(&self, call: Call, collection: &'static str, key: &str, fault: Fault) {
    self.rules.lock().unwrap().push(Rule {
      call,
      collection,
      key: key.to_owned(),
      fault,
    });
  }

  fn heal(&self) { self.rules.lock().unwrap().clear(); }

  async fn check(&self, call: Call, collection: &str, key: &str) -> Result<(), FaultError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    let rules = self.rules.lock().unwrap();
    let hit = rules
      .iter()
      .find(|r| r.call == call && r.collection == collection && r.key == key);
    match hit.map(|r| r.fault) {
      None => Ok(()),
      Some(Fault::Fail) => Err(FaultError::Injected(format!("{collection}/{key}"))),
      Some(Fault::Cancel) => Err(FaultError::Closed),
    }
  }
}

impl DocumentStore for FaultyStore {
  type Error = FaultError;

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, FaultError> {
    self.check(Call::Get, collection, id).await?;
    Ok(self.inner.get(collection, id).await?)
  }

  async fn find_by_field(
    &self,
    collection: &str,
    field: &str,
    value: &Value,
  ) -> Result<Vec<Document>, FaultError> {
    let key = value.as_str().unwrap_or_default().to_owned();
    self.check(Call::Find, collection, &key).await?;
    Ok(self.inner.find_by_field(collection, field, value).await?)
  }

  async fn set(&self, collection: &str, id: &str, body: Value) -> Result<(), FaultError> {
    self.check(Call::Set, collection, id).await?;
    Ok(self.inner.set(collection, id, body).await?)
  }

  async fn update_fields(
    &self,
    collection: &str,
    id: &str,
    fields: Map<String, Value>,
  ) -> Result<(), FaultError> {
    self.check(Call::Update, collection, id).await?;
    Ok(self.inner.update_fields(collection, id, fields).await?)
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<(), FaultError> {
    self.check(Call::Delete, collection, id).await?;
    Ok(self.inner.delete(collection, id).await?)
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn sync() -> ChecklistSync<FaultyStore> {
  ChecklistSync::new(Arc::new(FaultyStore::new().await))
}

fn checklist(id: &str, owner: &str) -> Checklist {
  Checklist {
    id:        id.into(),
    user_id:   owner.into(),
    trip_type: "hiking".into(),
    name:      format!("{id} list"),
  }
}

fn item(id: &str, list_id: &str, name: &str, checked: bool) -> ChecklistItem {
  ChecklistItem {
    id:      id.into(),
    list_id: list_id.into(),
    name:    name.into(),
    checked,
  }
}

fn camping(id: &str, owner: &str) -> ChecklistWithItems {
  ChecklistWithItems {
    checklist: checklist(id, owner),
    items:     vec![
      item(&format!("{id}-tent"), id, "tent", false),
      item(&format!("{id}-stove"), id, "stove", true),
    ],
  }
}

fn failed_ops<T: std::fmt::Debug, E: std::fmt::Debug>(result: SyncResult<T, E>) -> Vec<Operation> {
  match result {
    SyncResult::Error(err) => err.operations().cloned().collect(),
    other => panic!("expected error, got {other:?}"),
  }
}

async fn fetch(s: &ChecklistSync<FaultyStore>, id: &str) -> Option<ChecklistWithItems> {
  match s.fetch_checklist(id).await {
    SyncResult::Success(view) => view,
    other => panic!("fetch failed: {other:?}"),
  }
}

// ─── Create / fetch ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_fetch_returns_items_with_flags() {
  let s = sync().await;
  let view = ChecklistWithItems {
    checklist: checklist("c1", "u1"),
    items:     vec![
      item("i-tent", "c1", "tent", false),
      item("i-stove", "c1", "stove", true),
    ],
  };

  assert!(s.create_checklists(&[view.clone()]).await.is_success());

  let fetched = fetch(&s, "c1").await.expect("checklist exists");
  assert_eq!(fetched.checklist, view.checklist);
  let stove = fetched.items.iter().find(|i| i.name == "stove").unwrap();
  let tent = fetched.items.iter().find(|i| i.name == "tent").unwrap();
  assert!(stove.checked);
  assert!(!tent.checked);
}

#[tokio::test]
async fn fetch_returns_items_in_insertion_order() {
  let s = sync().await;
  let view = ChecklistWithItems::new(checklist("c1", "u1"))
    .with_item("map", false)
    .with_item("compass", false)
    .with_item("headlamp", true)
    .with_item("water", false);

  assert!(s.create_checklists(&[view.clone()]).await.is_success());

  let fetched = fetch(&s, "c1").await.unwrap();
  assert_eq!(fetched, view);
}

#[tokio::test]
async fn create_empty_batch_succeeds() {
  let s = sync().await;
  assert!(s.create_checklists(&[]).await.is_success());
}

#[tokio::test]
async fn fetch_missing_checklist_is_none() {
  let s = sync().await;
  assert!(fetch(&s, "ghost").await.is_none());
}

#[tokio::test]
async fn orphaned_items_do_not_resurrect_a_checklist() {
  let s = sync().await;
  let orphan = serde_json::to_value(item("i1", "gone", "rope", false)).unwrap();
  s.store().inner.set(ITEMS, "i1", orphan).await.unwrap();

  assert!(fetch(&s, "gone").await.is_none());
}

#[tokio::test]
async fn concurrent_creates_do_not_mix_items() {
  let s = sync().await;
  let a = camping("a", "u1");
  let b = camping("b", "u2");

  let (ra, rb) = tokio::join!(
    s.create_checklists(std::slice::from_ref(&a)),
    s.create_checklists(std::slice::from_ref(&b)),
  );
  assert!(ra.is_success());
  assert!(rb.is_success());

  assert_eq!(fetch(&s, "a").await.unwrap(), a);
  assert_eq!(fetch(&s, "b").await.unwrap(), b);
}

#[tokio::test]
async fn create_over_existing_checklist_is_rejected() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let takeover = ChecklistWithItems {
    checklist: checklist("c1", "u2"),
    items:     vec![item("rope", "c1", "rope", false)],
  };
  let SyncResult::Error(err) = s.create_checklists(&[takeover]).await else {
    panic!("expected error");
  };
  assert!(err.is_conflict());
  let ops: Vec<_> = err.operations().cloned().collect();
  assert_eq!(ops, vec![Operation::WriteChecklist("c1".into())]);

  assert_eq!(fetch(&s, "c1").await.unwrap(), camping("c1", "u1"));
  assert_eq!(s.store().inner.count(ITEMS).await.unwrap(), 2);
}

#[tokio::test]
async fn create_rejects_items_stored_under_another_checklist() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let poacher = ChecklistWithItems {
    checklist: checklist("c2", "u1"),
    items:     vec![item("c1-tent", "c2", "tent", false)],
  };
  let SyncResult::Error(err) = s.create_checklists(&[poacher]).await else {
    panic!("expected error");
  };
  assert!(err.is_conflict());

  assert!(fetch(&s, "c2").await.is_none());
  assert_eq!(fetch(&s, "c1").await.unwrap(), camping("c1", "u1"));
}

#[tokio::test]
async fn create_clears_items_left_by_a_partial_delete() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());
  s.store().inject(Call::Delete, ITEMS, "c1-stove", Fault::Fail);
  assert!(!s.delete_checklist("c1").await.is_success());
  s.store().heal();

  let fresh = ChecklistWithItems {
    checklist: checklist("c1", "u1"),
    items:     vec![item("rope", "c1", "rope", false)],
  };
  assert!(s.create_checklists(std::slice::from_ref(&fresh)).await.is_success());

  assert_eq!(fetch(&s, "c1").await.unwrap(), fresh);
}

// ─── User listing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetch_user_checklists_only_returns_owned() {
  let s = sync().await;
  let batch = [camping("c1", "u1"), camping("c2", "u2"), camping("c3", "u1")];
  assert!(s.create_checklists(&batch).await.is_success());

  let SyncResult::Success(views) = s.fetch_user_checklists("u1").await else {
    panic!("expected success");
  };
  let ids: Vec<_> = views.iter().map(|v| v.checklist.id.as_str()).collect();
  assert_eq!(ids, vec!["c1", "c3"]);
  assert!(views.iter().all(|v| v.items.len() == 2));
  assert!(views
    .iter()
    .all(|v| v.items.iter().all(|i| i.list_id == v.checklist.id)));
}

#[tokio::test]
async fn fetch_user_checklists_for_unknown_user_is_empty() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let SyncResult::Success(views) = s.fetch_user_checklists("nobody").await else {
    panic!("expected success");
  };
  assert!(views.is_empty());
}

#[tokio::test]
async fn item_fetch_failure_fails_the_batch_and_names_the_checklist() {
  let s = sync().await;
  let batch = [camping("c1", "u1"), camping("c2", "u1")];
  assert!(s.create_checklists(&batch).await.is_success());

  s.store().inject(Call::Find, ITEMS, "c2", Fault::Fail);

  let ops = failed_ops(s.fetch_user_checklists("u1").await);
  assert_eq!(ops, vec![Operation::FetchItems("c2".into())]);
}

#[tokio::test]
async fn fetch_user_checklists_skips_checklist_deleted_mid_call() {
  let s = ChecklistSync::new(Arc::new(
    FaultyStore::slow(Duration::from_millis(50)).await,
  ));
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let (listed, deleted) = tokio::join!(s.fetch_user_checklists("u1"), async {
    tokio::time::sleep(Duration::from_millis(25)).await;
    s.delete_checklist("c1").await
  });
  assert!(deleted.is_success());

  let SyncResult::Success(views) = listed else {
    panic!("expected success");
  };
  assert!(views.is_empty(), "deleted checklist listed: {views:?}");
}

#[tokio::test]
async fn owner_query_failure_is_reported() {
  let s = sync().await;
  s.store().inject(Call::Find, CHECKLISTS, "u1", Fault::Fail);

  let ops = failed_ops(s.fetch_user_checklists("u1").await);
  assert_eq!(ops, vec![Operation::FetchChecklists("u1".into())]);
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_replaces_items_and_patches_fields() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let mut changed = checklist("c1", "u1");
  changed.trip_type = "kayak".into();
  changed.name = "River run".into();
  let new_items = vec![
    item("n1", "c1", "paddle", false),
    item("n2", "c1", "dry bag", true),
  ];

  assert!(s.update_checklist(&changed, &new_items).await.is_success());

  let fetched = fetch(&s, "c1").await.unwrap();
  assert_eq!(fetched.checklist, changed);
  assert_eq!(fetched.items, new_items);
}

#[tokio::test]
async fn update_never_changes_owner() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let hijack = checklist("c1", "mallory");
  assert!(s.update_checklist(&hijack, &[]).await.is_success());

  let fetched = fetch(&s, "c1").await.unwrap();
  assert_eq!(fetched.checklist.user_id, "u1");
  assert!(fetched.items.is_empty());
}

#[tokio::test]
async fn update_with_failed_delete_keeps_old_items_and_skips_writes() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());
  s.store().inject(Call::Delete, ITEMS, "c1-tent", Fault::Fail);

  let new_items = vec![item("n1", "c1", "paddle", false)];
  let ops = failed_ops(s.update_checklist(&checklist("c1", "u1"), &new_items).await);
  assert_eq!(ops, vec![Operation::DeleteItem("c1-tent".into())]);

  let fetched = fetch(&s, "c1").await.unwrap();
  let names: Vec<_> = fetched.items.iter().map(|i| i.name.as_str()).collect();
  assert_eq!(names, vec!["tent"]);
}

#[tokio::test]
async fn update_of_missing_checklist_reports_patch_failure() {
  let s = sync().await;
  let ops = failed_ops(s.update_checklist(&checklist("ghost", "u1"), &[]).await);
  assert_eq!(ops, vec![Operation::PatchChecklist("ghost".into())]);
}

#[tokio::test]
async fn update_rejects_foreign_items_before_writing() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let stray = vec![item("x", "c2", "rope", false)];
  let SyncResult::Error(err) = s.update_checklist(&checklist("c1", "u1"), &stray).await else {
    panic!("expected error");
  };
  assert!(err.is_validation());

  assert_eq!(fetch(&s, "c1").await.unwrap(), camping("c1", "u1"));
}

#[tokio::test]
async fn update_cannot_take_items_of_another_checklist() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1"), camping("c2", "u1")]).await.is_success());

  let stolen = vec![item("c1-tent", "c2", "tent", false)];
  let SyncResult::Error(err) = s.update_checklist(&checklist("c2", "u1"), &stolen).await else {
    panic!("expected error");
  };
  assert!(err.is_conflict());
  let ops: Vec<_> = err.operations().cloned().collect();
  assert_eq!(ops, vec![Operation::WriteItem("c1-tent".into())]);

  assert_eq!(fetch(&s, "c1").await.unwrap(), camping("c1", "u1"));
  assert_eq!(fetch(&s, "c2").await.unwrap(), camping("c2", "u1"));
}

#[tokio::test]
async fn update_may_rewrite_its_own_items() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let kept = vec![item("c1-tent", "c1", "tent", true)];
  assert!(s.update_checklist(&checklist("c1", "u1"), &kept).await.is_success());

  assert_eq!(fetch(&s, "c1").await.unwrap().items, kept);
}

#[tokio::test]
async fn concurrent_updates_of_one_checklist_do_not_interleave() {
  let s = ChecklistSync::new(Arc::new(
    FaultyStore::slow(Duration::from_millis(2)).await,
  ));
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());

  let first: Vec<_> = (0..4)
    .map(|n| item(&format!("a{n}"), "c1", "first", false))
    .collect();
  let second: Vec<_> = (0..4)
    .map(|n| item(&format!("b{n}"), "c1", "second", false))
    .collect();
  let target = checklist("c1", "u1");

  let (r1, r2) = tokio::join!(
    s.update_checklist(&target, &first),
    s.update_checklist(&target, &second),
  );
  assert!(r1.is_success());
  assert!(r2.is_success());

  let mut ids: Vec<_> = fetch(&s, "c1").await.unwrap().items.into_iter().map(|i| i.id).collect();
  ids.sort();
  let first_ids: Vec<_> = first.iter().map(|i| i.id.clone()).collect();
  let second_ids: Vec<_> = second.iter().map(|i| i.id.clone()).collect();
  assert!(ids == first_ids || ids == second_ids, "mixed item sets: {ids:?}");
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_then_fetch_is_none_and_items_are_gone() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1"), camping("c2", "u1")]).await.is_success());

  assert!(s.delete_checklist("c1").await.is_success());

  assert!(fetch(&s, "c1").await.is_none());
  let leftover = s
    .store()
    .inner
    .find_by_field(ITEMS, "listId", &json!("c1"))
    .await
    .unwrap();
  assert!(leftover.is_empty());
  assert_eq!(fetch(&s, "c2").await.unwrap(), camping("c2", "u1"));
}

#[tokio::test]
async fn partial_delete_leaves_orphans_and_reports_them() {
  let s = sync().await;
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_success());
  s.store().inject(Call::Delete, ITEMS, "c1-stove", Fault::Fail);

  let ops = failed_ops(s.delete_checklist("c1").await);
  assert_eq!(ops, vec![Operation::DeleteItem("c1-stove".into())]);

  assert!(fetch(&s, "c1").await.is_none());
  assert_eq!(s.store().inner.count(ITEMS).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_user_checklists_cascades() {
  let s = sync().await;
  let batch = [camping("c1", "u1"), camping("c2", "u1"), camping("c3", "u2")];
  assert!(s.create_checklists(&batch).await.is_success());

  let SyncResult::Success(n) = s.delete_user_checklists("u1").await else {
    panic!("expected success");
  };
  assert_eq!(n, 2);

  let SyncResult::Success(left) = s.fetch_user_checklists("u1").await else {
    panic!("expected success");
  };
  assert!(left.is_empty());
  assert_eq!(s.store().inner.count(CHECKLISTS).await.unwrap(), 1);
  assert_eq!(s.store().inner.count(ITEMS).await.unwrap(), 2);
}

// ─── Failure aggregation ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_reports_every_failed_write_without_rollback() {
  let s = sync().await;
  s.store().inject(Call::Set, ITEMS, "c1-stove", Fault::Fail);
  s.store().inject(Call::Set, CHECKLISTS, "c2", Fault::Fail);

  let mut ops = failed_ops(
    s.create_checklists(&[camping("c1", "u1"), camping("c2", "u1")]).await,
  );
  ops.sort_by_key(|op| op.to_string());
  assert_eq!(ops, vec![
    Operation::WriteChecklist("c2".into()),
    Operation::WriteItem("c1-stove".into()),
  ]);

  s.store().heal();
  let c1 = fetch(&s, "c1").await.unwrap();
  assert_eq!(c1.items.len(), 1);
  assert_eq!(s.store().inner.count(ITEMS).await.unwrap(), 3);
}

#[tokio::test]
async fn create_rejects_duplicate_checklists_in_batch() {
  let s = sync().await;
  let ops = failed_ops(
    s.create_checklists(&[camping("c1", "u1"), camping("c1", "u1")]).await,
  );
  assert_eq!(ops, vec![Operation::Validate("c1".into())]);
  assert_eq!(s.store().inner.count(CHECKLISTS).await.unwrap(), 0);
}

#[tokio::test]
async fn create_rejects_item_ids_shared_across_checklists() {
  let s = sync().await;
  let a = ChecklistWithItems {
    checklist: checklist("a", "u1"),
    items:     vec![item("shared", "a", "map", false)],
  };
  let b = ChecklistWithItems {
    checklist: checklist("b", "u1"),
    items:     vec![item("shared", "b", "map", false)],
  };

  let SyncResult::Error(err) = s.create_checklists(&[a, b]).await else {
    panic!("expected error");
  };
  assert!(err.is_validation());
  assert_eq!(s.store().inner.count(ITEMS).await.unwrap(), 0);
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn canceled_scope_returns_canceled() {
  let store = Arc::new(FaultyStore::new().await);
  let token = CancellationToken::new();
  let s = ChecklistSync::with_cancellation(store, token.clone());

  token.cancel();

  assert!(s.fetch_user_checklists("u1").await.is_canceled());
  assert!(s.create_checklists(&[camping("c1", "u1")]).await.is_canceled());
  assert_eq!(s.store().inner.count(CHECKLISTS).await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_abandons_in_flight_operation() {
  let store = Arc::new(FaultyStore::slow(Duration::from_secs(5)).await);
  let token = CancellationToken::new();
  let s = ChecklistSync::with_cancellation(store, token.clone());

  let canceller = tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();
  });

  let result = tokio::time::timeout(Duration::from_secs(1), s.delete_checklist("c1"))
    .await
    .expect("cancellation should end the call promptly");
  assert!(result.is_canceled());
  canceller.await.unwrap();
}

#[tokio::test]
async fn store_cancellation_surfaces_as_canceled() {
  let s = sync().await;
  s.store().inject(Call::Find, CHECKLISTS, "u1", Fault::Cancel);
  assert!(s.fetch_user_checklists("u1").await.is_canceled());
}

#[tokio::test]
async fn mixed_cancel_and_failure_is_an_error() {
  let s = sync().await;
  s.store().inject(Call::Set, CHECKLISTS, "c1", Fault::Cancel);
  s.store().inject(Call::Set, ITEMS, "c1-tent", Fault::Fail);

  let ops = failed_ops(s.create_checklists(&[camping("c1", "u1")]).await);
  assert_eq!(ops.len(), 2);
}
