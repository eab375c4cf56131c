use chrono::{
  DateTime,
  Utc
};
use tracing::{
  info,
  instrument
};

use crate::prompt::Prompter;
use crate::selection::SelectionController;
use crate::store::OrderedTaskStore;

#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkDelete {
  /// Nothing was selected; no prompt was shown.
  Empty,
  Declined,
  Deleted(usize)
}

/// Marks every selected task completed. Returns how many changed state.
#[instrument(skip(
  store, selection, now
))]
pub fn bulk_complete(
  store: &mut OrderedTaskStore,
  selection: &SelectionController,
  now: DateTime<Utc>
) -> usize {
  store.set_completed_many(
    &selection.ids(),
    true,
    now
  )
}

#[instrument(skip(
  store, selection, now
))]
pub fn bulk_uncomplete(
  store: &mut OrderedTaskStore,
  selection: &SelectionController,
  now: DateTime<Utc>
) -> usize {
  store.set_completed_many(
    &selection.ids(),
    false,
    now
  )
}

/// Deletes the selection after confirmation and leaves it empty.
#[instrument(skip(
  store, selection, prompter
))]
pub fn bulk_delete(
  store: &mut OrderedTaskStore,
  selection: &mut SelectionController,
  prompter: &mut dyn Prompter
) -> BulkDelete {
  let count = selection.len();
  if count == 0 {
    return BulkDelete::Empty;
  }

  let noun =
    if count == 1 { "task" } else { "tasks" };
  if !prompter.confirm(&format!(
    "Delete {count} selected {noun}?"
  )) {
    info!(count, "bulk delete declined");
    return BulkDelete::Declined;
  }

  let ids = selection.ids();
  let removed =
    store.remove_many(&ids, selection);
  selection.clear();
  BulkDelete::Deleted(removed)
}
