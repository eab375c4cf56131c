use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::task::TaskId;

/// Summary shown on the "select all" checkbox.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
  None,
  Partial,
  All
}

/// Snapshot handed to the presentation layer.
#[derive(
  Debug, Clone, PartialEq, Eq, Serialize,
)]
pub struct SelectionState {
  pub mode:      bool,
  pub selected:  Vec<TaskId>,
  pub anchor:    Option<TaskId>,
  pub tri_state: TriState
}

#[derive(Debug, Clone, Default)]
pub struct SelectionController {
  selected: BTreeSet<TaskId>,
  anchor:   Option<TaskId>
}

impl SelectionController {
  /// Toggles `id`, or with `shift` and an anchor set, adds the inclusive
  /// range between the anchor and `id` over `ordered_ids`. Ids missing
  /// from `ordered_ids` are ignored.
  pub fn toggle(
    &mut self,
    id: TaskId,
    shift: bool,
    ordered_ids: &[TaskId]
  ) {
    let Some(end) = ordered_ids
      .iter()
      .position(|&t| t == id)
    else {
      debug!(
        id,
        "ignoring selection of unknown \
         task"
      );
      return;
    };

    if shift
      && let Some(anchor) = self.anchor
      && let Some(start) = ordered_ids
        .iter()
        .position(|&t| t == anchor)
    {
      let (lo, hi) = if start <= end {
        (start, end)
      } else {
        (end, start)
      };
      self
        .selected
        .extend(&ordered_ids[lo..=hi]);
      debug!(
        anchor,
        id,
        added = hi - lo + 1,
        "range selection"
      );
      return;
    }

    if !self.selected.remove(&id) {
      self.selected.insert(id);
    }
    self.anchor = Some(id);
  }

  pub fn select_all(
    &mut self,
    checked: bool,
    ids: &[TaskId]
  ) {
    if checked {
      self
        .selected
        .extend(ids.iter().copied());
    } else {
      self.clear();
    }
  }

  /// Drops ids that no longer reference a task.
  pub fn prune(
    &mut self,
    removed: &[TaskId]
  ) {
    for id in removed {
      self.selected.remove(id);
    }
    if self.anchor.is_some_and(|anchor| {
      removed.contains(&anchor)
    }) {
      self.anchor = None;
    }
  }

  pub fn clear(&mut self) {
    self.selected.clear();
    self.anchor = None;
  }

  pub fn state(
    &self,
    total: usize
  ) -> TriState {
    match self.selected.len() {
      | 0 => TriState::None,
      | n if n >= total => TriState::All,
      | _ => TriState::Partial
    }
  }

  pub fn is_selected(
    &self,
    id: TaskId
  ) -> bool {
    self.selected.contains(&id)
  }

  pub fn ids(&self) -> Vec<TaskId> {
    self.selected.iter().copied().collect()
  }

  pub fn len(&self) -> usize {
    self.selected.len()
  }

  pub fn is_empty(&self) -> bool {
    self.selected.is_empty()
  }

  pub fn anchor(
    &self
  ) -> Option<TaskId> {
    self.anchor
  }
}
