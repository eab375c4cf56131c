use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::{
  iso_date_serde,
  stored_precision
};

pub type TaskId = u64;
pub type CategoryId = u64;

/// One row of the `todos` collection, in the camelCase wire shape.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq
)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: TaskId,

  pub text: String,

  pub completed: bool,

  pub order: i64,

  #[serde(with = "iso_date_serde")]
  pub created_at: DateTime<Utc>,

  #[serde(
    default,
    with = "iso_date_serde::option"
  )]
  pub completed_at:
    Option<DateTime<Utc>>,

  #[serde(default)]
  pub category_id: Option<CategoryId>,

  #[serde(default)]
  pub tags: Vec<String>,

  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "iso_date_serde::option"
  )]
  pub due_date: Option<DateTime<Utc>>
}

impl Task {
  pub fn new(
    id: TaskId,
    text: String,
    order: i64,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      id,
      text,
      completed: false,
      order,
      created_at: stored_precision(now),
      completed_at: None,
      category_id: None,
      tags: vec![],
      due_date: None
    }
  }

  /// Sets the completion flag, stamping or clearing `completed_at` only on
  /// an actual transition. Returns whether anything changed.
  pub fn set_completed(
    &mut self,
    completed: bool,
    now: DateTime<Utc>
  ) -> bool {
    if self.completed == completed {
      return false;
    }
    self.completed = completed;
    self.completed_at = completed
      .then(|| stored_precision(now));
    true
  }

  pub fn has_tag(
    &self,
    tag: &str
  ) -> bool {
    self.tags.iter().any(|t| t == tag)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq
)]
pub struct Category {
  pub id:    CategoryId,
  pub name:  String,
  pub color: String
}

/// Input for creating a task.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct NewTask {
  pub text:        String,
  pub category_id: Option<CategoryId>,
  pub tags:        Vec<String>,
  pub due_date:    Option<DateTime<Utc>>
}

impl NewTask {
  pub fn text(
    text: impl Into<String>
  ) -> Self {
    Self {
      text: text.into(),
      ..Self::default()
    }
  }
}

/// Partial update. `None` leaves a field alone; the nested options on
/// `category_id` and `due_date` let callers clear those fields.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskPatch {
  pub text:        Option<String>,
  pub completed:   Option<bool>,
  pub category_id:
    Option<Option<CategoryId>>,
  pub tags:        Option<Vec<String>>,
  pub due_date:
    Option<Option<DateTime<Utc>>>
}

impl TaskPatch {
  pub fn is_empty(&self) -> bool {
    self.text.is_none()
      && self.completed.is_none()
      && self.category_id.is_none()
      && self.tags.is_none()
      && self.due_date.is_none()
  }
}

/// Splits the space-separated tag entry format, dropping blanks.
pub fn parse_tags(
  input: &str
) -> Vec<String> {
  input
    .split_whitespace()
    .map(str::to_string)
    .collect()
}

pub(crate) fn clean_tags(
  tags: Vec<String>
) -> Vec<String> {
  tags
    .into_iter()
    .map(|tag| tag.trim().to_string())
    .filter(|tag| !tag.is_empty())
    .collect()
}
