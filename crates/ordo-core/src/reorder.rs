use std::fmt;
use std::str::FromStr;

use tracing::{
  debug,
  info
};

use crate::error::TodoError;
use crate::store::OrderedTaskStore;
use crate::task::TaskId;

/// Where the dragged task lands relative to the drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
  Before,
  After
}

impl FromStr for Position {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "before" => Ok(Self::Before),
      | "after" => Ok(Self::After),
      | _ => Err(TodoError::invalid(
        "position", s
      ))
    }
  }
}

impl fmt::Display for Position {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::Before => "before",
      | Self::After => "after"
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Up,
  Down
}

impl FromStr for Direction {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "up" => Ok(Self::Up),
      | "down" => Ok(Self::Down),
      | _ => Err(TodoError::invalid(
        "direction",
        s
      ))
    }
  }
}

/// Result of a reorder request. None of these are errors.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moved {
  Moved,
  /// Self-drop, boundary move, unknown id, or a stale drag session.
  NoOp,
  /// Refused because a filter or search hides part of the list.
  Blocked
}

/// Computes the sequence after moving `dragged` next to `target`.
/// Returns `None` for a self-move or when either id is absent.
pub fn plan_move(
  ids: &[TaskId],
  dragged: TaskId,
  target: TaskId,
  position: Position
) -> Option<Vec<TaskId>> {
  if dragged == target
    || !ids.contains(&dragged)
  {
    return None;
  }

  let mut rest: Vec<TaskId> = ids
    .iter()
    .copied()
    .filter(|&id| id != dragged)
    .collect();
  let target_idx = rest
    .iter()
    .position(|&id| id == target)?;
  let insert_at = match position {
    | Position::Before => target_idx,
    | Position::After => target_idx + 1
  };
  rest.insert(insert_at, dragged);
  Some(rest)
}

/// The neighbour a keyboard move swaps with, or `None` at either end.
pub fn neighbour(
  ids: &[TaskId],
  id: TaskId,
  direction: Direction
) -> Option<(TaskId, Position)> {
  let idx =
    ids.iter().position(|&t| t == id)?;
  match direction {
    | Direction::Up if idx > 0 => {
      Some((ids[idx - 1], Position::Before))
    }
    | Direction::Down
      if idx + 1 < ids.len() =>
    {
      Some((ids[idx + 1], Position::After))
    }
    | _ => None
  }
}

/// Moves `dragged` before or after `target` and renumbers every task to
/// `0..n-1`.
#[tracing::instrument(skip(store))]
pub fn move_task(
  store: &mut OrderedTaskStore,
  dragged: TaskId,
  target: TaskId,
  position: Position
) -> Moved {
  let Some(sequence) = plan_move(
    &store.ids_in_order(),
    dragged,
    target,
    position
  ) else {
    debug!("reorder is a no-op");
    return Moved::NoOp;
  };
  store.renumber(&sequence);
  info!(dragged, target, %position, "reordered task");
  Moved::Moved
}

/// Keyboard variant: shifts `id` one slot in the global sequence.
#[tracing::instrument(skip(store))]
pub fn move_relative(
  store: &mut OrderedTaskStore,
  id: TaskId,
  direction: Direction
) -> Moved {
  match neighbour(
    &store.ids_in_order(),
    id,
    direction
  ) {
    | Some((target, position)) => {
      move_task(store, id, target, position)
    }
    | None => {
      debug!("already at boundary");
      Moved::NoOp
    }
  }
}

/// Input-device-neutral drag session: `begin_move` when a drag starts,
/// `complete_move` on drop.
#[derive(Debug, Clone, Default)]
pub struct MoveSession {
  dragging: Option<TaskId>
}

impl MoveSession {
  pub fn begin_move(&mut self, id: TaskId) {
    debug!(id, "drag started");
    self.dragging = Some(id);
  }

  /// Finishes the drag. A drop that does not match the task being dragged
  /// ends the session without moving anything.
  pub fn complete_move(
    &mut self,
    store: &mut OrderedTaskStore,
    id: TaskId,
    target: TaskId,
    position: Position
  ) -> Moved {
    match self.dragging.take() {
      | Some(dragging) if dragging == id => {
        move_task(store, id, target, position)
      }
      | other => {
        debug!(
          ?other,
          id,
          "drop without matching drag"
        );
        Moved::NoOp
      }
    }
  }

  pub fn cancel_move(&mut self) {
    self.dragging = None;
  }

  pub fn dragging(
    &self
  ) -> Option<TaskId> {
    self.dragging
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    Direction,
    MoveSession,
    Moved,
    Position,
    move_relative,
    move_task,
    neighbour,
    plan_move
  };
  use crate::gateway::PersistenceGateway;
  use crate::selection::SelectionController;
  use crate::storage::MemoryStorage;
  use crate::store::OrderedTaskStore;
  use crate::task::NewTask;

  fn store_with(
    texts: &[&str]
  ) -> OrderedTaskStore {
    let now = Utc
      .with_ymd_and_hms(
        2025, 7, 1, 0, 0, 0
      )
      .unwrap();
    let mut store =
      OrderedTaskStore::load(
        PersistenceGateway::new(
          MemoryStorage::default()
        ),
        now
      );
    for text in texts {
      store
        .add(NewTask::text(*text), now)
        .unwrap();
    }
    store
  }

  fn texts(
    store: &OrderedTaskStore
  ) -> Vec<String> {
    store
      .list()
      .into_iter()
      .map(|t| t.text)
      .collect()
  }

  fn orders(
    store: &OrderedTaskStore
  ) -> Vec<i64> {
    store
      .list()
      .into_iter()
      .map(|t| t.order)
      .collect()
  }

  #[test]
  fn plan_move_inserts_relative_to_target()
  {
    assert_eq!(
      plan_move(
        &[1, 2, 3],
        1,
        3,
        Position::After
      ),
      Some(vec![2, 3, 1])
    );
    assert_eq!(
      plan_move(
        &[1, 2, 3],
        3,
        1,
        Position::Before
      ),
      Some(vec![3, 1, 2])
    );
    assert_eq!(
      plan_move(
        &[1, 2, 3],
        2,
        2,
        Position::After
      ),
      None
    );
    assert_eq!(
      plan_move(
        &[1, 2, 3],
        9,
        2,
        Position::After
      ),
      None
    );
    assert_eq!(
      plan_move(
        &[1, 2, 3],
        1,
        9,
        Position::After
      ),
      None
    );
  }

  #[test]
  fn move_after_last_puts_first_at_tail()
  {
    let mut store =
      store_with(&["A", "B", "C"]);
    assert_eq!(
      move_task(
        &mut store,
        1,
        3,
        Position::After
      ),
      Moved::Moved
    );
    assert_eq!(
      texts(&store),
      vec!["B", "C", "A"]
    );
    assert_eq!(
      orders(&store),
      vec![0, 1, 2]
    );
  }

  #[test]
  fn move_renumbers_sparse_orders() {
    let mut store =
      store_with(&["A", "B", "C", "D"]);
    let mut selection =
      SelectionController::default();
    store
      .remove(2, &mut selection)
      .unwrap();
    // orders are now 0, 2, 3
    assert_eq!(
      move_task(
        &mut store,
        4,
        1,
        Position::Before
      ),
      Moved::Moved
    );
    assert_eq!(
      texts(&store),
      vec!["D", "A", "C"]
    );
    assert_eq!(
      orders(&store),
      vec![0, 1, 2]
    );
  }

  #[test]
  fn self_drop_changes_nothing() {
    let mut store =
      store_with(&["A", "B"]);
    assert_eq!(
      move_task(
        &mut store,
        2,
        2,
        Position::Before
      ),
      Moved::NoOp
    );
    assert_eq!(
      texts(&store),
      vec!["A", "B"]
    );
  }

  #[test]
  fn keyboard_moves_stop_at_boundaries()
  {
    let mut store =
      store_with(&["A", "B", "C"]);
    assert_eq!(
      move_relative(
        &mut store,
        1,
        Direction::Up
      ),
      Moved::NoOp
    );
    assert_eq!(
      move_relative(
        &mut store,
        3,
        Direction::Down
      ),
      Moved::NoOp
    );

    assert_eq!(
      move_relative(
        &mut store,
        1,
        Direction::Down
      ),
      Moved::Moved
    );
    assert_eq!(
      texts(&store),
      vec!["B", "A", "C"]
    );
    assert_eq!(
      move_relative(
        &mut store,
        3,
        Direction::Up
      ),
      Moved::Moved
    );
    assert_eq!(
      texts(&store),
      vec!["B", "C", "A"]
    );
  }

  #[test]
  fn neighbour_lookup() {
    assert_eq!(
      neighbour(&[4, 5, 6], 5, Direction::Up),
      Some((4, Position::Before))
    );
    assert_eq!(
      neighbour(
        &[4, 5, 6],
        5,
        Direction::Down
      ),
      Some((6, Position::After))
    );
    assert_eq!(
      neighbour(
        &[4, 5, 6],
        7,
        Direction::Down
      ),
      None
    );
  }

  #[test]
  fn drag_session_requires_matching_begin()
  {
    let mut store =
      store_with(&["A", "B", "C"]);
    let mut session =
      MoveSession::default();

    assert_eq!(
      session.complete_move(
        &mut store,
        1,
        3,
        Position::After
      ),
      Moved::NoOp
    );

    session.begin_move(3);
    assert_eq!(session.dragging(), Some(3));
    assert_eq!(
      session.complete_move(
        &mut store,
        3,
        1,
        Position::Before
      ),
      Moved::Moved
    );
    assert_eq!(
      texts(&store),
      vec!["C", "A", "B"]
    );
    assert_eq!(session.dragging(), None);

    session.begin_move(2);
    session.cancel_move();
    assert_eq!(
      session.complete_move(
        &mut store,
        2,
        3,
        Position::Before
      ),
      Moved::NoOp
    );
  }
}
