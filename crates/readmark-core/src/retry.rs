//! Bounded retry for the reading write path.
//!
//! Two writers marking the same (reader, item) pair for the first time can
//! both miss the existing row and both try to insert. The loser sees a
//! uniqueness conflict; re-running the attempt finds the winner's row and
//! updates it. A second conflict means something other than that single race
//! is going on, and is surfaced.

use std::future::Future;

use crate::{
  Error,
  reading::{Reading, ReadingKey, SaveOutcome},
};

/// Extra attempts allowed after a uniqueness conflict.
pub const MAX_CONFLICT_RETRIES: usize = 1;

/// Run `attempt` until it persists a reading, retrying at most
/// [`MAX_CONFLICT_RETRIES`] times on [`SaveOutcome::Conflict`].
///
/// Errors from `attempt` are returned immediately and never retried.
pub async fn save_with_retry<F, Fut, E>(key: &ReadingKey, mut attempt: F) -> Result<Reading, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<SaveOutcome, E>>,
  E: From<Error>,
{
  let mut retries = 0;
  loop {
    match attempt().await? {
      SaveOutcome::Created(reading) | SaveOutcome::Updated(reading) => return Ok(reading),
      SaveOutcome::Conflict if retries < MAX_CONFLICT_RETRIES => {
        retries += 1;
        tracing::warn!(%key, retries, "reading insert conflicted, retrying");
      }
      SaveOutcome::Conflict => return Err(Error::DuplicateReading(key.clone()).into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{item::ItemType, reading::ReadingState};

  #[derive(Debug)]
  enum TestError {
    Core(Error),
    Backend,
  }

  impl From<Error> for TestError {
    fn from(e: Error) -> Self { Self::Core(e) }
  }

  fn key() -> ReadingKey {
    ReadingKey {
      reader_id: Uuid::new_v4(),
      item_id:   Uuid::new_v4(),
      item_type: ItemType::from("comment"),
    }
  }

  fn reading(key: &ReadingKey) -> Reading {
    let now = Utc::now();
    Reading {
      reader_id:  key.reader_id,
      item_id:    key.item_id,
      item_type:  key.item_type.clone(),
      state:      ReadingState::Read,
      created_at: now,
      updated_at: now,
    }
  }

  /// Replays `outcomes` in order, counting calls.
  async fn run(outcomes: Vec<Result<SaveOutcome, TestError>>) -> (Result<Reading, TestError>, usize) {
    let key = key();
    let calls = AtomicUsize::new(0);
    let mut outcomes = outcomes.into_iter();
    let result = save_with_retry(&key, || {
      calls.fetch_add(1, Ordering::SeqCst);
      let next = outcomes.next().unwrap_or(Err(TestError::Backend));
      async move { next }
    })
    .await;
    (result, calls.load(Ordering::SeqCst))
  }

  #[tokio::test]
  async fn first_success_is_returned() {
    let k = key();
    let (result, calls) = run(vec![Ok(SaveOutcome::Created(reading(&k)))]).await;
    assert_eq!(result.unwrap().item_id, k.item_id);
    assert_eq!(calls, 1);
  }

  #[tokio::test]
  async fn single_conflict_is_retried() {
    let k = key();
    let (result, calls) =
      run(vec![Ok(SaveOutcome::Conflict), Ok(SaveOutcome::Updated(reading(&k)))]).await;
    assert!(result.is_ok());
    assert_eq!(calls, 2);
  }

  #[tokio::test]
  async fn second_conflict_is_fatal() {
    let (result, calls) = run(vec![
      Ok(SaveOutcome::Conflict),
      Ok(SaveOutcome::Conflict),
      Ok(SaveOutcome::Conflict),
    ])
    .await;
    assert!(matches!(result, Err(TestError::Core(Error::DuplicateReading(_)))));
    assert_eq!(calls, 2);
  }

  #[tokio::test]
  async fn backend_errors_are_not_retried() {
    let k = key();
    let (result, calls) =
      run(vec![Err(TestError::Backend), Ok(SaveOutcome::Created(reading(&k)))]).await;
    assert!(matches!(result, Err(TestError::Backend)));
    assert_eq!(calls, 1);
  }
}
