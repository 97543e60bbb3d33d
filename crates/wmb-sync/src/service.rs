//! [`ChecklistSync`] — create, fetch, update and delete checklists across the
//! `checklists` and `items` collections.

use std::{collections::HashSet, future::Future, sync::Arc};

use futures::future::join_all;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use wmb_core::{
  checklist::{fields, validate_items, Checklist, ChecklistItem, ChecklistWithItems},
  outcome::{Canceled, Cause, Failure, Operation, SyncResult},
  store::{Document, DocumentStore, StoreFailure, CHECKLISTS, ITEMS},
  Error,
};

/// The result type of every [`ChecklistSync`] operation for store `S`.
pub type Outcome<T, S> = SyncResult<T, <S as DocumentStore>::Error>;

type FailureOf<S> = Failure<<S as DocumentStore>::Error>;

// ─── Service ─────────────────────────────────────────────────────────────────

/// Keeps checklists and their items in sync in a [`DocumentStore`].
///
/// Every public operation waits for all of its store calls; calls that do not
/// depend on each other run concurrently. Operations touching the same
/// checklist are serialized through an identifier-scoped lock.
///
/// When the cancellation token fires, in-flight operations are dropped where
/// they stand and return [`SyncResult::Canceled`]. Nothing is undone.
///
/// Cloning is cheap and clones share the store, the locks and the token.
pub struct ChecklistSync<S> {
  store:  Arc<S>,
  locks:  Arc<crate::KeyedLocks>,
  cancel: CancellationToken,
}

impl<S> Clone for ChecklistSync<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      locks:  Arc::clone(&self.locks),
      cancel: self.cancel.clone(),
    }
  }
}

impl<S: DocumentStore> ChecklistSync<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self::with_cancellation(store, CancellationToken::new())
  }

  /// Build a service whose operations are abandoned when `cancel` fires.
  pub fn with_cancellation(store: Arc<S>, cancel: CancellationToken) -> Self {
    Self {
      store,
      locks: Arc::new(crate::KeyedLocks::new()),
      cancel,
    }
  }

  pub fn store(&self) -> &S { &self.store }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Every checklist owned by `user_id`, each joined with its items.
  ///
  /// Owning nothing is an empty success. If any checklist cannot be read the
  /// whole call fails, with the failures of every affected checklist.
  ///
  /// Each checklist is re-read under its lock, so one deleted after the owner
  /// query is left out and one patched meanwhile is returned as patched.
  pub async fn fetch_user_checklists(
    &self,
    user_id: &str,
  ) -> Outcome<Vec<ChecklistWithItems>, S> {
    self
      .scoped(async {
        let checklists = match self.user_checklists(user_id).await {
          Ok(checklists) => checklists,
          Err(failure) => return self.finish(Vec::new(), vec![failure]),
        };

        let loads = checklists.iter().map(|c| self.load_locked(&c.id));
        let results = join_all(loads).await;

        let mut views = Vec::with_capacity(checklists.len());
        let mut failures = Vec::new();
        for result in results {
          match result {
            Ok(Some(view)) => views.push(view),
            Ok(None) => {}
            Err(errs) => failures.extend(errs),
          }
        }

        debug!(user_id, checklists = views.len(), "fetched user checklists");
        self.finish(views, failures)
      })
      .await
  }

  /// One checklist joined with its items, or `None` if the checklist
  /// document does not exist.
  pub async fn fetch_checklist(
    &self,
    checklist_id: &str,
  ) -> Outcome<Option<ChecklistWithItems>, S> {
    self
      .scoped(async {
        let _guard = self.locks.lock(checklist_id).await;
        match self.load(checklist_id).await {
          Ok(view) => SyncResult::Success(view),
          Err(failures) => self.finish(None, failures),
        }
      })
      .await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Write every checklist and all of its items.
  ///
  /// Succeeds only if every write succeeded. Nothing is written when the input
  /// is invalid, when a checklist id is already taken, or when an item id is
  /// stored under another checklist. Store failures are not rolled back.
  pub async fn create_checklists(&self, checklists: &[ChecklistWithItems]) -> Outcome<(), S> {
    let invalid = validate_batch(checklists);
    if !invalid.is_empty() {
      return self.finish((), invalid);
    }

    self
      .scoped(async {
        let items: Vec<&ChecklistItem> = checklists.iter().flat_map(|v| &v.items).collect();
        let mut keys: Vec<String> = checklists.iter().map(|v| v.checklist.id.clone()).collect();
        keys.extend(items.iter().map(|item| item_key(item)));
        let _guard = self.locks.lock_all(keys).await;

        let checks = checklists.iter().map(|v| self.check_vacant(&v.checklist.id));
        let (taken, claims) = futures::join!(join_all(checks), self.check_claims(&items));
        let conflicts: Vec<_> = taken.into_iter().flatten().chain(claims).collect();
        if !conflicts.is_empty() {
          return self.finish((), conflicts);
        }

        let writes = checklists.iter().map(|view| self.write_checklist(view));
        let failures: Vec<_> = join_all(writes).await.into_iter().flatten().collect();
        debug!(checklists = checklists.len(), failed = failures.len(), "created checklists");
        self.finish((), failures)
      })
      .await
  }

  /// Patch the checklist's trip type and name, and replace its item set with
  /// `items`.
  ///
  /// The patch runs concurrently with the replacement. Replacement deletes
  /// every existing item first and writes `items` only if all deletes
  /// succeeded. The owner is never changed. Nothing is written if an item id
  /// is stored under another checklist.
  pub async fn update_checklist(
    &self,
    checklist: &Checklist,
    items: &[ChecklistItem],
  ) -> Outcome<(), S> {
    if let Err(e) = validate_items(checklist, items) {
      return self.finish((), vec![Failure::invalid(
        Operation::Validate(checklist.id.clone()),
        e,
      )]);
    }

    self
      .scoped(async {
        let items_ref: Vec<&ChecklistItem> = items.iter().collect();
        let mut keys = vec![checklist.id.clone()];
        keys.extend(items.iter().map(item_key));
        let _guard = self.locks.lock_all(keys).await;

        let conflicts = self.check_claims(&items_ref).await;
        if !conflicts.is_empty() {
          return self.finish((), conflicts);
        }

        let patch = async {
          let mut changes = Map::new();
          changes.insert(fields::TRIP_TYPE.to_owned(), Value::from(checklist.trip_type.as_str()));
          changes.insert(fields::NAME.to_owned(), Value::from(checklist.name.as_str()));
          self
            .store
            .update_fields(CHECKLISTS, &checklist.id, changes)
            .await
            .err()
            .map(|e| Failure::store(Operation::PatchChecklist(checklist.id.clone()), e))
        };

        let replace = async {
          let failures = self.delete_items(&checklist.id).await;
          if !failures.is_empty() {
            warn!(checklist_id = %checklist.id, "item deletion failed; new items not written");
            return failures;
          }
          self.write_items(items).await
        };

        let (patch, mut failures) = futures::join!(patch, replace);
        failures.extend(patch);

        debug!(checklist_id = %checklist.id, items = items.len(), "updated checklist");
        self.finish((), failures)
      })
      .await
  }

  /// Delete the checklist document and every item pointing at it.
  ///
  /// Both run concurrently. If the checklist goes but some items stay, they
  /// are left orphaned.
  pub async fn delete_checklist(&self, checklist_id: &str) -> Outcome<(), S> {
    self
      .scoped(async {
        let _guard = self.locks.lock(checklist_id).await;
        let failures = self.remove_checklist(checklist_id).await;
        debug!(checklist_id, "deleted checklist");
        self.finish((), failures)
      })
      .await
  }

  /// Delete every checklist owned by `user_id`, with their items. Used when
  /// the user themself is removed.
  pub async fn delete_user_checklists(&self, user_id: &str) -> Outcome<usize, S> {
    self
      .scoped(async {
        let checklists = match self.user_checklists(user_id).await {
          Ok(checklists) => checklists,
          Err(failure) => return self.finish(0, vec![failure]),
        };

        let deletions = checklists.iter().map(|c| self.remove_checklist_locked(&c.id));
        let failures: Vec<_> = join_all(deletions).await.into_iter().flatten().collect();

        debug!(user_id, checklists = checklists.len(), "deleted user checklists");
        self.finish(checklists.len(), failures)
      })
      .await
  }

  // ── Sub-operations ────────────────────────────────────────────────────────

  async fn user_checklists(&self, user_id: &str) -> Result<Vec<Checklist>, FailureOf<S>> {
    let op = || Operation::FetchChecklists(user_id.to_owned());
    let owner = Value::from(user_id);
    let docs = self
      .store
      .find_by_field(CHECKLISTS, fields::USER_ID, &owner)
      .await
      .map_err(|e| Failure::store(op(), e))?;
    decode_all(&docs).map_err(|e| Failure::malformed(op(), e))
  }

  async fn fetch_items(&self, checklist_id: &str) -> Result<Vec<ChecklistItem>, FailureOf<S>> {
    let op = || Operation::FetchItems(checklist_id.to_owned());
    let parent = Value::from(checklist_id);
    let docs = self
      .store
      .find_by_field(ITEMS, fields::LIST_ID, &parent)
      .await
      .map_err(|e| Failure::store(op(), e))?;
    decode_all(&docs).map_err(|e| Failure::malformed(op(), e))
  }

  /// Write one document, returning the failure if there was one.
  async fn put(
    &self,
    collection: &'static str,
    id: &str,
    body: Result<Value, Error>,
    op: Operation,
  ) -> Option<FailureOf<S>> {
    let body = match body {
      Ok(body) => body,
      Err(e) => return Some(Failure::invalid(op, e)),
    };
    self
      .store
      .set(collection, id, body)
      .await
      .err()
      .map(|e| Failure::store(op, e))
  }

  async fn write_items(&self, items: &[ChecklistItem]) -> Vec<FailureOf<S>> {
    let writes = items.iter().map(|item| {
      self.put(ITEMS, &item.id, encode(item), Operation::WriteItem(item.id.clone()))
    });
    join_all(writes).await.into_iter().flatten().collect()
  }

  async fn delete_items(&self, checklist_id: &str) -> Vec<FailureOf<S>> {
    let items = match self.fetch_items(checklist_id).await {
      Ok(items) => items,
      Err(failure) => return vec![failure],
    };

    let deletes = items.iter().map(|item| self.delete_item(&item.id));
    join_all(deletes).await.into_iter().flatten().collect()
  }

  async fn delete_item(&self, item_id: &str) -> Option<FailureOf<S>> {
    self
      .store
      .delete(ITEMS, item_id)
      .await
      .err()
      .map(|e| Failure::store(Operation::DeleteItem(item_id.to_owned()), e))
  }

  /// Read a checklist document and its items concurrently; `None` when the
  /// document does not exist.
  async fn load(
    &self,
    checklist_id: &str,
  ) -> Result<Option<ChecklistWithItems>, Vec<FailureOf<S>>> {
    let (doc, items) = futures::join!(
      self.store.get(CHECKLISTS, checklist_id),
      self.fetch_items(checklist_id),
    );

    let (doc, items) = match (doc, items) {
      (Ok(doc), Ok(items)) => (doc, items),
      (doc, items) => {
        let mut failures = Vec::new();
        if let Err(e) = doc {
          failures.push(Failure::store(Operation::FetchChecklist(checklist_id.to_owned()), e));
        }
        failures.extend(items.err());
        return Err(failures);
      }
    };

    let Some(doc) = doc else {
      if !items.is_empty() {
        warn!(checklist_id, orphans = items.len(), "items exist without their checklist");
      }
      return Ok(None);
    };

    match doc.decode::<Checklist>() {
      Ok(checklist) => Ok(Some(ChecklistWithItems { checklist, items })),
      Err(e) => Err(vec![Failure::malformed(
        Operation::FetchChecklist(checklist_id.to_owned()),
        e,
      )]),
    }
  }

  async fn load_locked(
    &self,
    checklist_id: &str,
  ) -> Result<Option<ChecklistWithItems>, Vec<FailureOf<S>>> {
    let _guard = self.locks.lock(checklist_id).await;
    self.load(checklist_id).await
  }

  /// Fail unless no checklist document exists at `checklist_id`.
  async fn check_vacant(&self, checklist_id: &str) -> Option<FailureOf<S>> {
    match self.store.get(CHECKLISTS, checklist_id).await {
      Ok(None) => None,
      Ok(Some(_)) => Some(Failure::invalid(
        Operation::WriteChecklist(checklist_id.to_owned()),
        Error::ChecklistExists(checklist_id.to_owned()),
      )),
      Err(e) => Some(Failure::store(Operation::FetchChecklist(checklist_id.to_owned()), e)),
    }
  }

  /// Check that no item in `items` is stored under a different checklist.
  async fn check_claims(&self, items: &[&ChecklistItem]) -> Vec<FailureOf<S>> {
    let claims = items.iter().map(|item| self.check_claim(item));
    join_all(claims).await.into_iter().flatten().collect()
  }

  async fn check_claim(&self, item: &ChecklistItem) -> Option<FailureOf<S>> {
    let op = || Operation::FetchItem(item.id.clone());
    let doc = match self.store.get(ITEMS, &item.id).await {
      Ok(Some(doc)) => doc,
      Ok(None) => return None,
      Err(e) => return Some(Failure::store(op(), e)),
    };
    match doc.decode::<ChecklistItem>() {
      Ok(stored) if stored.list_id == item.list_id => None,
      Ok(stored) => Some(Failure::invalid(
        Operation::WriteItem(item.id.clone()),
        Error::ItemTaken { item_id: item.id.clone(), list_id: stored.list_id },
      )),
      Err(e) => Some(Failure::malformed(op(), e)),
    }
  }

  /// Write one new checklist and its items.
  ///
  /// Items already pointing at the checklist, left behind by a partial
  /// delete, are removed first; if that fails nothing is written.
  async fn write_checklist(&self, view: &ChecklistWithItems) -> Vec<FailureOf<S>> {
    let checklist = &view.checklist;
    let leftovers = self.delete_items(&checklist.id).await;
    if !leftovers.is_empty() {
      warn!(checklist_id = %checklist.id, "stale items could not be cleared; checklist not written");
      return leftovers;
    }

    let (doc, mut failures) = futures::join!(
      self.put(
        CHECKLISTS,
        &checklist.id,
        encode(checklist),
        Operation::WriteChecklist(checklist.id.clone()),
      ),
      self.write_items(&view.items),
    );
    failures.extend(doc);
    failures
  }

  async fn remove_checklist_locked(&self, checklist_id: &str) -> Vec<FailureOf<S>> {
    let _guard = self.locks.lock(checklist_id).await;
    self.remove_checklist(checklist_id).await
  }

  /// Delete a checklist document and its items; the caller holds the lock.
  async fn remove_checklist(&self, checklist_id: &str) -> Vec<FailureOf<S>> {
    let delete_doc = async {
      self
        .store
        .delete(CHECKLISTS, checklist_id)
        .await
        .err()
        .map(|e| Failure::store(Operation::DeleteChecklist(checklist_id.to_owned()), e))
    };

    let (doc, mut failures) = futures::join!(delete_doc, self.delete_items(checklist_id));
    failures.extend(doc);
    if !failures.is_empty() {
      warn!(checklist_id, failed = failures.len(), "checklist only partially deleted");
    }
    failures
  }

  // ── Outcome plumbing ──────────────────────────────────────────────────────

  /// Run `work` unless the service is canceled first.
  async fn scoped<T>(&self, work: impl Future<Output = Outcome<T, S>>) -> Outcome<T, S> {
    tokio::select! {
      biased;
      _ = self.cancel.cancelled() => {
        warn!("sync operation abandoned by cancellation");
        SyncResult::Canceled(Canceled::new("sync scope canceled"))
      }
      outcome = work => outcome,
    }
  }

  /// Fold collected failures into an outcome.
  ///
  /// When every failure is the store reporting a canceled call, the outcome
  /// is `Canceled` rather than `Error`.
  fn finish<T>(&self, value: T, failures: Vec<FailureOf<S>>) -> Outcome<T, S> {
    if failures.is_empty() {
      return SyncResult::Success(value);
    }

    let all_canceled = failures
      .iter()
      .all(|f| matches!(&f.cause, Cause::Store(e) if e.is_canceled()));
    if all_canceled {
      let reason = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
      return SyncResult::Canceled(Canceled::new(reason));
    }

    for failure in &failures {
      warn!(op = %failure.op, cause = %failure.cause, "sync sub-operation failed");
    }
    SyncResult::from_failures(value, failures)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Lock key for an item id, kept apart from checklist ids.
fn item_key(item: &ChecklistItem) -> String { format!("item:{}", item.id) }

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, Error> {
  Ok(serde_json::to_value(value)?)
}

fn decode_all<T: serde::de::DeserializeOwned>(docs: &[Document]) -> Result<Vec<T>, Error> {
  docs.iter().map(Document::decode).collect()
}

/// Check a create batch: each checklist's own invariants, plus no checklist
/// or item id appearing twice across the batch.
fn validate_batch<E>(checklists: &[ChecklistWithItems]) -> Vec<Failure<E>> {
  let mut failures = Vec::new();
  let mut checklist_ids = HashSet::new();
  let mut item_ids = HashSet::new();

  for view in checklists {
    let id = &view.checklist.id;
    let op = || Operation::Validate(id.clone());

    if let Err(e) = view.validate() {
      failures.push(Failure::invalid(op(), e));
      continue;
    }
    if !checklist_ids.insert(id.as_str()) {
      failures.push(Failure::invalid(op(), Error::DuplicateChecklist(id.clone())));
      continue;
    }
    if let Some(dup) = view.items.iter().find(|i| !item_ids.insert(i.id.as_str())) {
      failures.push(Failure::invalid(op(), Error::DuplicateItem(dup.id.clone())));
    }
  }
  failures
}
