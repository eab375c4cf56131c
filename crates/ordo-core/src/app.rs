use std::time::{
  Duration,
  Instant
};

use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument
};

use crate::bulk::{
  self,
  BulkDelete
};
use crate::datetime::stored_precision;
use crate::debounce::{
  DEFAULT_SEARCH_DEBOUNCE,
  Debouncer
};
use crate::due::{
  DueClassifier,
  DueRange,
  LocalDueClassifier
};
use crate::error::TodoError;
use crate::filter::{
  StatusFilter,
  ViewQuery,
  view
};
use crate::import::{
  self,
  ImportFormat
};
use crate::prompt::Prompter;
use crate::reorder::{
  self,
  Direction,
  MoveSession,
  Moved,
  Position
};
use crate::selection::{
  SelectionController,
  SelectionState
};
use crate::store::OrderedTaskStore;
use crate::task::{
  CategoryId,
  NewTask,
  Task,
  TaskId,
  TaskPatch
};

/// Wall-clock and monotonic time of one user event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
  pub wall: DateTime<Utc>,
  pub mono: Instant
}

impl Tick {
  pub fn now() -> Self {
    Self {
      wall: stored_precision(Utc::now()),
      mono: Instant::now()
    }
  }
}

/// Every user-level mutation the controller understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  Add(NewTask),
  Update {
    id:    TaskId,
    patch: TaskPatch
  },
  Toggle(TaskId),
  Delete(TaskId),
  Duplicate(TaskId),

  Move {
    dragged:  TaskId,
    target:   TaskId,
    position: Position
  },
  MoveRelative {
    id:        TaskId,
    direction: Direction
  },
  BeginMove(TaskId),
  CompleteMove {
    id:       TaskId,
    target:   TaskId,
    position: Position
  },
  CancelMove,

  ToggleSelectionMode,
  Select {
    id:    TaskId,
    shift: bool
  },
  SelectAll(bool),
  BulkComplete,
  BulkUncomplete,
  BulkDelete,

  SetStatus(StatusFilter),
  /// A search keystroke. Applied once the debounce window passes.
  SearchInput(String),
  SetCategoryFilter(Option<CategoryId>),
  SetTagFilter(Option<String>),
  SetDueFilter(Option<DueRange>),
  ClearFilters,

  AddCategory {
    name:  String,
    color: String
  },
  RenameCategory {
    id:   CategoryId,
    name: String
  },
  DeleteCategory(CategoryId),

  Import {
    payload: String,
    format:  ImportFormat
  }
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Added(TaskId),
  Updated(TaskId),
  Toggled {
    id:        TaskId,
    completed: bool
  },
  Deleted(TaskId),
  Duplicated(TaskId),
  Reordered(Moved),
  DragStarted(TaskId),
  SelectionChanged(SelectionState),
  BulkUpdated(usize),
  BulkDeleted(BulkDelete),
  ViewChanged,
  SearchScheduled,
  CategoryAdded(CategoryId),
  CategoryRenamed(CategoryId),
  CategoryDeleted {
    id:       CategoryId,
    detached: usize
  },
  Imported(usize),
  /// Silently ignored input, such as blank task text or a selection click
  /// outside selection mode.
  Rejected
}

/// The single owner of the engine state. Handlers call [`App::apply`] and
/// render from [`App::view`] and [`App::selection_state`].
pub struct App {
  store:          OrderedTaskStore,
  selection:      SelectionController,
  selection_mode: bool,
  query:          ViewQuery,
  search:         Debouncer<String>,
  drag:           MoveSession,
  classifier:     Box<dyn DueClassifier>
}

impl App {
  pub fn new(
    store: OrderedTaskStore
  ) -> Self {
    Self::with_parts(
      store,
      Box::new(
        LocalDueClassifier::default()
      ),
      DEFAULT_SEARCH_DEBOUNCE
    )
  }

  pub fn with_parts(
    store: OrderedTaskStore,
    classifier: Box<dyn DueClassifier>,
    search_debounce: Duration
  ) -> Self {
    Self {
      store,
      selection: SelectionController::default(),
      selection_mode: false,
      query: ViewQuery::default(),
      search: Debouncer::new(
        search_debounce
      ),
      drag: MoveSession::default(),
      classifier
    }
  }

  pub fn store(
    &self
  ) -> &OrderedTaskStore {
    &self.store
  }

  pub fn query(&self) -> &ViewQuery {
    &self.query
  }

  pub fn selection_mode(&self) -> bool {
    self.selection_mode
  }

  pub fn dragging(
    &self
  ) -> Option<TaskId> {
    self.drag.dragging()
  }

  /// The full collection in display order.
  pub fn list(&self) -> Vec<Task> {
    self.store.list()
  }

  /// The filtered projection of [`App::list`].
  pub fn view(
    &self,
    now: DateTime<Utc>
  ) -> Vec<Task> {
    view(
      &self.store.list(),
      &self.query,
      self.classifier.as_ref(),
      now
    )
  }

  /// Projects the list through an ad-hoc query, leaving the active one
  /// alone.
  pub fn view_with(
    &self,
    query: &ViewQuery,
    now: DateTime<Utc>
  ) -> Vec<Task> {
    view(
      &self.store.list(),
      query,
      self.classifier.as_ref(),
      now
    )
  }

  pub fn selection_state(
    &self
  ) -> SelectionState {
    SelectionState {
      mode:      self.selection_mode,
      selected:  self.selection.ids(),
      anchor:    self.selection.anchor(),
      tri_state: self
        .selection
        .state(self.store.len())
    }
  }

  /// Applies a search whose debounce window has elapsed. Returns true when
  /// the query changed.
  pub fn poll_search(
    &mut self,
    now: Instant
  ) -> bool {
    match self.search.poll(now) {
      | Some(search) => {
        debug!(%search, "search applied");
        self.query.search = search;
        true
      }
      | None => false
    }
  }

  pub fn search_pending(&self) -> bool {
    self.search.is_pending()
  }

  #[instrument(skip(
    self, prompter, tick
  ))]
  pub fn apply(
    &mut self,
    action: Action,
    prompter: &mut dyn Prompter,
    tick: Tick
  ) -> Result<Outcome, TodoError> {
    match self
      .dispatch(action, prompter, tick)
    {
      | Err(TodoError::EmptyText) => {
        debug!("blank text rejected");
        Ok(Outcome::Rejected)
      }
      | other => other
    }
  }

  fn dispatch(
    &mut self,
    action: Action,
    prompter: &mut dyn Prompter,
    tick: Tick
  ) -> Result<Outcome, TodoError> {
    let now = tick.wall;
    match action {
      | Action::Add(new) => self
        .store
        .add(new, now)
        .map(Outcome::Added),
      | Action::Update {
        id,
        patch
      } => {
        self.store.update(id, patch, now)?;
        Ok(Outcome::Updated(id))
      }
      | Action::Toggle(id) => {
        let completed =
          self.store.toggle(id, now)?;
        Ok(Outcome::Toggled {
          id,
          completed
        })
      }
      | Action::Delete(id) => {
        self
          .store
          .remove(id, &mut self.selection)?;
        Ok(Outcome::Deleted(id))
      }
      | Action::Duplicate(id) => self
        .store
        .duplicate(id, now)
        .map(Outcome::Duplicated),

      | Action::Move {
        dragged,
        target,
        position
      } => {
        let moved = if self.reorder_blocked()
        {
          Moved::Blocked
        } else {
          reorder::move_task(
            &mut self.store,
            dragged,
            target,
            position
          )
        };
        Ok(Outcome::Reordered(moved))
      }
      | Action::MoveRelative {
        id,
        direction
      } => {
        let moved = if self.reorder_blocked()
        {
          Moved::Blocked
        } else {
          reorder::move_relative(
            &mut self.store,
            id,
            direction
          )
        };
        Ok(Outcome::Reordered(moved))
      }
      | Action::BeginMove(id) => {
        if !self.store.contains(id) {
          return Err(
            TodoError::UnknownTask(id)
          );
        }
        self.drag.begin_move(id);
        Ok(Outcome::DragStarted(id))
      }
      | Action::CompleteMove {
        id,
        target,
        position
      } => {
        let moved = if self.reorder_blocked()
        {
          self.drag.cancel_move();
          Moved::Blocked
        } else {
          self.drag.complete_move(
            &mut self.store,
            id,
            target,
            position
          )
        };
        Ok(Outcome::Reordered(moved))
      }
      | Action::CancelMove => {
        self.drag.cancel_move();
        Ok(Outcome::Reordered(Moved::NoOp))
      }

      | Action::ToggleSelectionMode => {
        self.selection_mode =
          !self.selection_mode;
        self.selection.clear();
        info!(
          mode = self.selection_mode,
          "selection mode toggled"
        );
        Ok(Outcome::SelectionChanged(
          self.selection_state()
        ))
      }
      | Action::Select {
        id,
        shift
      } => {
        if !self.selection_mode {
          return Ok(Outcome::Rejected);
        }
        self.selection.toggle(
          id,
          shift,
          &self.store.ids_in_order()
        );
        Ok(Outcome::SelectionChanged(
          self.selection_state()
        ))
      }
      | Action::SelectAll(checked) => {
        if !self.selection_mode {
          return Ok(Outcome::Rejected);
        }
        self.selection.select_all(
          checked,
          &self.store.ids_in_order()
        );
        Ok(Outcome::SelectionChanged(
          self.selection_state()
        ))
      }
      | Action::BulkComplete => {
        Ok(Outcome::BulkUpdated(
          bulk::bulk_complete(
            &mut self.store,
            &self.selection,
            now
          )
        ))
      }
      | Action::BulkUncomplete => {
        Ok(Outcome::BulkUpdated(
          bulk::bulk_uncomplete(
            &mut self.store,
            &self.selection,
            now
          )
        ))
      }
      | Action::BulkDelete => {
        Ok(Outcome::BulkDeleted(
          bulk::bulk_delete(
            &mut self.store,
            &mut self.selection,
            prompter
          )
        ))
      }

      | Action::SetStatus(status) => {
        self.query.status = status;
        Ok(Outcome::ViewChanged)
      }
      | Action::SearchInput(search) => {
        self
          .search
          .schedule(search, tick.mono);
        Ok(Outcome::SearchScheduled)
      }
      | Action::SetCategoryFilter(
        category_id
      ) => {
        if let Some(id) = category_id
          && self
            .store
            .category(id)
            .is_none()
        {
          return Err(
            TodoError::UnknownCategory(id)
          );
        }
        self.query.category_id =
          category_id;
        Ok(Outcome::ViewChanged)
      }
      | Action::SetTagFilter(tag) => {
        self.query.tag = tag
          .map(|t| t.trim().to_string())
          .filter(|t| !t.is_empty());
        Ok(Outcome::ViewChanged)
      }
      | Action::SetDueFilter(range) => {
        self.query.due_range = range;
        Ok(Outcome::ViewChanged)
      }
      | Action::ClearFilters => {
        self.search.cancel_pending();
        self.query = ViewQuery::default();
        Ok(Outcome::ViewChanged)
      }

      | Action::AddCategory {
        name,
        color
      } => self
        .store
        .add_category(&name, &color)
        .map(Outcome::CategoryAdded),
      | Action::RenameCategory {
        id,
        name
      } => {
        self
          .store
          .rename_category(id, &name)?;
        Ok(Outcome::CategoryRenamed(id))
      }
      | Action::DeleteCategory(id) => {
        let detached =
          self.store.remove_category(id)?;
        if self.query.category_id
          == Some(id)
        {
          self.query.category_id = None;
        }
        Ok(Outcome::CategoryDeleted {
          id,
          detached
        })
      }

      | Action::Import {
        payload,
        format
      } => import::import(
        &mut self.store,
        &mut self.selection,
        &payload,
        format,
        prompter,
        now
      )
      .map(Outcome::Imported)
    }
  }

  fn reorder_blocked(&self) -> bool {
    let blocked = self.query.is_active();
    if blocked {
      debug!(
        "reorder refused while the list \
         is filtered"
      );
    }
    blocked
  }
}
