use std::collections::{
  BTreeSet,
  HashMap
};

use chrono::{
  DateTime,
  Utc
};
use regex::Regex;
use tracing::{
  debug,
  info
};

use crate::datetime::stored_precision;
use crate::error::TodoError;
use crate::gateway::PersistenceGateway;
use crate::selection::SelectionController;
use crate::task::{
  Category,
  CategoryId,
  NewTask,
  Task,
  TaskId,
  TaskPatch,
  clean_tags
};

const DUPLICATE_SUFFIX: &str = " (copy)";

/// In-memory mirror of the persisted collections. Every public mutation
/// writes through the gateway before it returns.
#[derive(Debug)]
pub struct OrderedTaskStore {
  gateway:          PersistenceGateway,
  tasks:            Vec<Task>,
  categories:       Vec<Category>,
  next_id:          TaskId,
  next_category_id: CategoryId
}

impl OrderedTaskStore {
  #[tracing::instrument(skip(
    gateway, now
  ))]
  pub fn load(
    gateway: PersistenceGateway,
    now: DateTime<Utc>
  ) -> Self {
    let tasks = gateway.load_tasks(now);
    let categories =
      gateway.load_categories();
    let next_id = tasks
      .iter()
      .map(|t| t.id)
      .max()
      .unwrap_or(0)
      + 1;
    let next_category_id = categories
      .iter()
      .map(|c| c.id)
      .max()
      .unwrap_or(0)
      + 1;

    info!(
      tasks = tasks.len(),
      categories = categories.len(),
      next_id,
      "loaded task store"
    );

    Self {
      gateway,
      tasks,
      categories,
      next_id,
      next_category_id
    }
  }

  pub fn gateway(
    &self
  ) -> &PersistenceGateway {
    &self.gateway
  }

  /// Tasks in display sequence. Equal `order` values keep storage order.
  pub fn list(&self) -> Vec<Task> {
    let mut sorted = self.tasks.clone();
    sorted.sort_by_key(|t| t.order);
    sorted
  }

  pub fn ids_in_order(
    &self
  ) -> Vec<TaskId> {
    let mut refs: Vec<&Task> =
      self.tasks.iter().collect();
    refs.sort_by_key(|t| t.order);
    refs
      .into_iter()
      .map(|t| t.id)
      .collect()
  }

  pub fn get(
    &self,
    id: TaskId
  ) -> Option<&Task> {
    self.tasks.iter().find(|t| t.id == id)
  }

  pub fn contains(
    &self,
    id: TaskId
  ) -> bool {
    self.get(id).is_some()
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  #[tracing::instrument(
    skip(self, new, now),
    fields(text = %new.text)
  )]
  pub fn add(
    &mut self,
    new: NewTask,
    now: DateTime<Utc>
  ) -> Result<TaskId, TodoError> {
    let text = new.text.trim();
    if text.is_empty() {
      return Err(TodoError::EmptyText);
    }
    if let Some(category_id) =
      new.category_id
    {
      self.ensure_category(category_id)?;
    }

    let id = self.allocate_id();
    let mut task = Task::new(
      id,
      text.to_string(),
      self.tasks.len() as i64,
      now
    );
    task.category_id = new.category_id;
    task.tags = clean_tags(new.tags);
    task.due_date =
      new.due_date.map(stored_precision);
    self.tasks.push(task);
    self.persist_tasks();

    info!(id, "added task");
    Ok(id)
  }

  /// Deletes one task and drops it from `selection` in the same step.
  #[tracing::instrument(skip(
    self, selection
  ))]
  pub fn remove(
    &mut self,
    id: TaskId,
    selection: &mut SelectionController
  ) -> Result<Task, TodoError> {
    let idx = self
      .tasks
      .iter()
      .position(|t| t.id == id)
      .ok_or(TodoError::UnknownTask(id))?;
    let task = self.tasks.remove(idx);
    selection.prune(&[id]);
    self.persist_tasks();

    info!(id, "removed task");
    Ok(task)
  }

  /// Deletes every listed task that exists; returns how many were removed.
  #[tracing::instrument(
    skip(self, ids, selection),
    fields(requested = ids.len())
  )]
  pub fn remove_many(
    &mut self,
    ids: &[TaskId],
    selection: &mut SelectionController
  ) -> usize {
    let doomed: BTreeSet<TaskId> =
      ids.iter().copied().collect();
    let before = self.tasks.len();
    self
      .tasks
      .retain(|t| !doomed.contains(&t.id));
    let removed =
      before - self.tasks.len();
    selection.prune(ids);
    self.persist_tasks();

    info!(removed, "removed tasks");
    removed
  }

  /// Drops every task and the whole selection. The id counter keeps
  /// counting so cleared ids are never handed out again.
  #[tracing::instrument(skip(
    self, selection
  ))]
  pub fn clear(
    &mut self,
    selection: &mut SelectionController
  ) {
    let before = self.tasks.len();
    self.tasks.clear();
    selection.clear();
    self.persist_tasks();
    info!(
      removed = before,
      "cleared task store"
    );
  }

  /// Applies a partial update. `order` is never touched here.
  #[tracing::instrument(skip(
    self, patch, now
  ))]
  pub fn update(
    &mut self,
    id: TaskId,
    patch: TaskPatch,
    now: DateTime<Utc>
  ) -> Result<(), TodoError> {
    let text = match patch
      .text
      .as_deref()
      .map(str::trim)
    {
      | Some("") => {
        return Err(TodoError::EmptyText);
      }
      | Some(text) => {
        Some(text.to_string())
      }
      | None => None
    };
    if let Some(Some(category_id)) =
      patch.category_id
    {
      self.ensure_category(category_id)?;
    }

    let task = self.task_mut(id)?;
    if let Some(text) = text {
      task.text = text;
    }
    if let Some(completed) =
      patch.completed
    {
      task.set_completed(completed, now);
    }
    if let Some(category_id) =
      patch.category_id
    {
      task.category_id = category_id;
    }
    if let Some(tags) = patch.tags {
      task.tags = clean_tags(tags);
    }
    if let Some(due_date) = patch.due_date
    {
      task.due_date =
        due_date.map(stored_precision);
    }
    self.persist_tasks();

    debug!(id, "updated task");
    Ok(())
  }

  /// Flips completion; returns the new state.
  #[tracing::instrument(skip(self, now))]
  pub fn toggle(
    &mut self,
    id: TaskId,
    now: DateTime<Utc>
  ) -> Result<bool, TodoError> {
    let task = self.task_mut(id)?;
    let completed = !task.completed;
    task.set_completed(completed, now);
    self.persist_tasks();
    Ok(completed)
  }

  /// Sets completion on each listed task that exists. Tasks already in the
  /// requested state keep their timestamps. Returns how many changed.
  #[tracing::instrument(
    skip(self, ids, now),
    fields(requested = ids.len())
  )]
  pub fn set_completed_many(
    &mut self,
    ids: &[TaskId],
    completed: bool,
    now: DateTime<Utc>
  ) -> usize {
    let wanted: BTreeSet<TaskId> =
      ids.iter().copied().collect();
    let changed = self
      .tasks
      .iter_mut()
      .filter(|t| wanted.contains(&t.id))
      .map(|t| {
        t.set_completed(completed, now)
      })
      .filter(|&changed| changed)
      .count();
    self.persist_tasks();

    info!(
      changed,
      completed,
      "bulk completion update"
    );
    changed
  }

  /// Appends an incomplete copy of `id` at the tail.
  #[tracing::instrument(skip(self, now))]
  pub fn duplicate(
    &mut self,
    id: TaskId,
    now: DateTime<Utc>
  ) -> Result<TaskId, TodoError> {
    let original = self
      .get(id)
      .cloned()
      .ok_or(TodoError::UnknownTask(id))?;
    let new_id = self.allocate_id();
    let mut copy = Task::new(
      new_id,
      format!(
        "{}{DUPLICATE_SUFFIX}",
        original.text
      ),
      self.tasks.len() as i64,
      now
    );
    copy.category_id =
      original.category_id;
    copy.tags = original.tags;
    copy.due_date = original.due_date;
    self.tasks.push(copy);
    self.persist_tasks();

    info!(
      original = id,
      id = new_id,
      "duplicated task"
    );
    Ok(new_id)
  }

  /// Rewrites `order` to match `sequence` (0-based) and persists. Tasks not
  /// named in `sequence` keep their position after the named ones.
  #[tracing::instrument(
    skip(self, sequence),
    fields(len = sequence.len())
  )]
  pub(crate) fn renumber(
    &mut self,
    sequence: &[TaskId]
  ) {
    let positions: HashMap<TaskId, i64> =
      sequence
        .iter()
        .enumerate()
        .map(|(idx, &id)| (id, idx as i64))
        .collect();
    let mut tail = sequence.len() as i64;
    let ordered = self.ids_in_order();
    for id in ordered {
      let order = match positions.get(&id)
      {
        | Some(&order) => order,
        | None => {
          tail += 1;
          tail - 1
        }
      };
      if let Ok(task) = self.task_mut(id) {
        task.order = order;
      }
    }
    self.persist_tasks();
  }

  /// Hands out the next id. Ids are never reused within a session.
  pub(crate) fn allocate_id(
    &mut self
  ) -> TaskId {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  /// Appends prepared tasks without persisting; callers follow up with
  /// [`Self::persist_tasks`].
  pub(crate) fn push_unsaved(
    &mut self,
    task: Task
  ) {
    self.tasks.push(task);
  }

  pub(crate) fn persist_tasks(
    &mut self
  ) {
    self.gateway.save_tasks(&self.tasks);
  }

  pub fn categories(&self) -> &[Category] {
    &self.categories
  }

  pub fn category(
    &self,
    id: CategoryId
  ) -> Option<&Category> {
    self
      .categories
      .iter()
      .find(|c| c.id == id)
  }

  #[tracing::instrument(skip(self))]
  pub fn add_category(
    &mut self,
    name: &str,
    color: &str
  ) -> Result<CategoryId, TodoError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(
        TodoError::EmptyCategoryName
      );
    }
    let color = validate_color(color)?;

    let id = self.next_category_id;
    self.next_category_id += 1;
    self.categories.push(Category {
      id,
      name: name.to_string(),
      color
    });
    self
      .gateway
      .save_categories(&self.categories);

    info!(id, "added category");
    Ok(id)
  }

  #[tracing::instrument(skip(self))]
  pub fn rename_category(
    &mut self,
    id: CategoryId,
    name: &str
  ) -> Result<(), TodoError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(
        TodoError::EmptyCategoryName
      );
    }
    let category = self
      .categories
      .iter_mut()
      .find(|c| c.id == id)
      .ok_or(TodoError::UnknownCategory(
        id
      ))?;
    category.name = name.to_string();
    self
      .gateway
      .save_categories(&self.categories);
    Ok(())
  }

  /// Deletes a category and detaches every task pointing at it. Returns the
  /// number of tasks detached.
  #[tracing::instrument(skip(self))]
  pub fn remove_category(
    &mut self,
    id: CategoryId
  ) -> Result<usize, TodoError> {
    self.ensure_category(id)?;
    self.categories.retain(|c| c.id != id);

    let mut detached = 0;
    for task in self
      .tasks
      .iter_mut()
      .filter(|t| t.category_id == Some(id))
    {
      task.category_id = None;
      detached += 1;
    }
    self
      .gateway
      .save_categories(&self.categories);
    self.persist_tasks();

    info!(
      id,
      detached, "removed category"
    );
    Ok(detached)
  }

  /// Sorted, de-duplicated tag vocabulary across all tasks.
  pub fn all_tags(&self) -> Vec<String> {
    self
      .tasks
      .iter()
      .flat_map(|t| t.tags.iter().cloned())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  fn ensure_category(
    &self,
    id: CategoryId
  ) -> Result<(), TodoError> {
    if self.category(id).is_some() {
      Ok(())
    } else {
      Err(TodoError::UnknownCategory(id))
    }
  }

  fn task_mut(
    &mut self,
    id: TaskId
  ) -> Result<&mut Task, TodoError> {
    self
      .tasks
      .iter_mut()
      .find(|t| t.id == id)
      .ok_or(TodoError::UnknownTask(id))
  }
}

fn validate_color(
  raw: &str
) -> Result<String, TodoError> {
  let color_re =
    Regex::new(r"^#[0-9A-Fa-f]{6}$")
      .map_err(|_| {
        TodoError::InvalidColor(
          raw.to_string()
        )
      })?;
  let trimmed = raw.trim();
  if color_re.is_match(trimmed) {
    Ok(trimmed.to_ascii_lowercase())
  } else {
    Err(TodoError::InvalidColor(
      raw.to_string()
    ))
  }
}
