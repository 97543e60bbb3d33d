//! The three-way result returned by every sync operation.
//!
//! Cancellation is its own variant so callers cannot mistake a torn-down call
//! for a failed one. Failures carry every `(operation, cause)` pair that went
//! wrong, not just a flag.

use std::fmt;

use serde::Serialize;

// ─── Operation ───────────────────────────────────────────────────────────────

/// The store sub-operation a failure is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum Operation {
  /// Query for every checklist owned by a user.
  FetchChecklists(String),
  /// Read one checklist document.
  FetchChecklist(String),
  /// Query for the items of one checklist.
  FetchItems(String),
  /// Read one item document.
  FetchItem(String),
  WriteChecklist(String),
  WriteItem(String),
  /// Field-level update of a checklist's mutable fields.
  PatchChecklist(String),
  DeleteChecklist(String),
  DeleteItem(String),
  /// Input rejected before any store call was made.
  Validate(String),
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::FetchChecklists(user) => write!(f, "fetch checklists of user {user}"),
      Self::FetchChecklist(id) => write!(f, "fetch checklist {id}"),
      Self::FetchItems(id) => write!(f, "fetch items of checklist {id}"),
      Self::FetchItem(id) => write!(f, "fetch item {id}"),
      Self::WriteChecklist(id) => write!(f, "write checklist {id}"),
      Self::WriteItem(id) => write!(f, "write item {id}"),
      Self::PatchChecklist(id) => write!(f, "patch checklist {id}"),
      Self::DeleteChecklist(id) => write!(f, "delete checklist {id}"),
      Self::DeleteItem(id) => write!(f, "delete item {id}"),
      Self::Validate(id) => write!(f, "validate checklist {id}"),
    }
  }
}

// ─── Failures ────────────────────────────────────────────────────────────────

/// Why a sub-operation failed.
#[derive(Debug)]
pub enum Cause<E> {
  /// The store rejected or could not complete the call.
  Store(E),
  /// The input violated a checklist invariant.
  Invalid(crate::Error),
  /// A stored document could not be decoded.
  Malformed(crate::Error),
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Store(e) => write!(f, "store error: {e}"),
      Self::Invalid(e) => write!(f, "invalid input: {e}"),
      Self::Malformed(e) => write!(f, "malformed document: {e}"),
    }
  }
}

/// One failed sub-operation.
#[derive(Debug)]
pub struct Failure<E> {
  pub op:    Operation,
  pub cause: Cause<E>,
}

impl<E> Failure<E> {
  pub fn store(op: Operation, cause: E) -> Self {
    Self { op, cause: Cause::Store(cause) }
  }

  pub fn invalid(op: Operation, cause: crate::Error) -> Self {
    Self { op, cause: Cause::Invalid(cause) }
  }

  pub fn malformed(op: Operation, cause: crate::Error) -> Self {
    Self { op, cause: Cause::Malformed(cause) }
  }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.op, self.cause)
  }
}

/// Every failure collected while running one sync operation.
#[derive(Debug)]
pub struct SyncError<E> {
  pub failures: Vec<Failure<E>>,
}

impl<E> SyncError<E> {
  pub fn new(failures: Vec<Failure<E>>) -> Self { Self { failures } }

  /// `true` when nothing reached the store because the input was rejected.
  pub fn is_validation(&self) -> bool {
    !self.failures.is_empty()
      && self
        .failures
        .iter()
        .all(|f| matches!(f.cause, Cause::Invalid(_)))
  }

  /// `true` when the input was rejected because it clashes with stored
  /// documents: an existing checklist, or an item owned by another checklist.
  pub fn is_conflict(&self) -> bool {
    self.is_validation()
      && self
        .failures
        .iter()
        .any(|f| matches!(&f.cause, Cause::Invalid(e) if e.is_conflict()))
  }

  pub fn operations(&self) -> impl Iterator<Item = &Operation> {
    self.failures.iter().map(|f| &f.op)
  }
}

impl<E: fmt::Display> fmt::Display for SyncError<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} sub-operation(s) failed", self.failures.len())?;
    for (i, failure) in self.failures.iter().enumerate() {
      let sep = if i == 0 { ": " } else { "; " };
      write!(f, "{sep}{failure}")?;
    }
    Ok(())
  }
}

impl<E: std::error::Error + 'static> std::error::Error for SyncError<E> {}

/// The operation scope was torn down before the call completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canceled {
  pub reason: String,
}

impl Canceled {
  pub fn new(reason: impl Into<String>) -> Self {
    Self { reason: reason.into() }
  }
}

impl fmt::Display for Canceled {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "canceled: {}", self.reason)
  }
}

// ─── SyncResult ──────────────────────────────────────────────────────────────

/// Outcome of a sync operation. Match on it exhaustively.
#[derive(Debug)]
#[must_use]
pub enum SyncResult<T, E> {
  Success(T),
  Error(SyncError<E>),
  Canceled(Canceled),
}

impl<T, E> SyncResult<T, E> {
  pub fn is_success(&self) -> bool { matches!(self, Self::Success(_)) }

  pub fn is_canceled(&self) -> bool { matches!(self, Self::Canceled(_)) }

  /// Success when `failures` is empty, otherwise an aggregate error.
  pub fn from_failures(value: T, failures: Vec<Failure<E>>) -> Self {
    if failures.is_empty() {
      Self::Success(value)
    } else {
      Self::Error(SyncError::new(failures))
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SyncResult<U, E> {
    match self {
      Self::Success(v) => SyncResult::Success(f(v)),
      Self::Error(e) => SyncResult::Error(e),
      Self::Canceled(c) => SyncResult::Canceled(c),
    }
  }

  /// The success value, discarding errors and cancellation.
  pub fn ok(self) -> Option<T> {
    match self {
      Self::Success(v) => Some(v),
      Self::Error(_) | Self::Canceled(_) => None,
    }
  }
}
