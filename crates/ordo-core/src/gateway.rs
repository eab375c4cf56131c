use chrono::{
  DateTime,
  Utc
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{
  debug,
  error,
  warn
};

use crate::datetime::{
  parse_iso,
  stored_precision
};
use crate::storage::KeyValueStorage;
use crate::task::{
  Category,
  CategoryId,
  Task,
  TaskId,
  clean_tags
};

pub const TODOS_KEY: &str = "todos";
pub const CATEGORIES_KEY: &str =
  "categories";

/// Stored task as it may appear from older releases: everything except the
/// identity and text can be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
  id:           Option<TaskId>,
  text:         Option<String>,
  #[serde(default)]
  completed:    Option<bool>,
  #[serde(default)]
  order:        Option<i64>,
  #[serde(default)]
  created_at:   Option<String>,
  #[serde(default)]
  completed_at: Option<String>,
  #[serde(default)]
  category_id:  Option<CategoryId>,
  #[serde(default)]
  tags:         Option<Vec<String>>,
  #[serde(default)]
  due_date:     Option<String>
}

impl StoredTask {
  fn normalize(
    self,
    index: usize,
    now: DateTime<Utc>
  ) -> Option<Task> {
    let id = self.id?;
    let text = self.text?;
    Some(Task {
      id,
      text,
      completed: self
        .completed
        .unwrap_or(false),
      order: self
        .order
        .unwrap_or(index as i64),
      created_at: self
        .created_at
        .as_deref()
        .and_then(parse_iso)
        .unwrap_or_else(|| {
          stored_precision(now)
        }),
      completed_at: self
        .completed_at
        .as_deref()
        .and_then(parse_iso),
      category_id: self.category_id,
      tags: clean_tags(
        self.tags.unwrap_or_default()
      ),
      due_date: self
        .due_date
        .as_deref()
        .and_then(parse_iso)
    })
  }
}

/// Reads and writes the task and category collections. Both directions fail
/// open: unreadable data loads as empty, and failed writes are logged.
pub struct PersistenceGateway {
  storage: Box<dyn KeyValueStorage>
}

impl std::fmt::Debug
  for PersistenceGateway
{
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("PersistenceGateway")
      .finish_non_exhaustive()
  }
}

impl PersistenceGateway {
  pub fn new(
    storage: impl KeyValueStorage + 'static
  ) -> Self {
    Self {
      storage: Box::new(storage)
    }
  }

  pub fn storage(
    &self
  ) -> &dyn KeyValueStorage {
    self.storage.as_ref()
  }

  #[tracing::instrument(skip(self, now))]
  pub fn load_tasks(
    &self,
    now: DateTime<Utc>
  ) -> Vec<Task> {
    let Some(records) =
      self.read_array(TODOS_KEY)
    else {
      return vec![];
    };

    let mut out =
      Vec::with_capacity(records.len());
    for (index, record) in
      records.into_iter().enumerate()
    {
      let stored = match serde_json::from_value::<
        StoredTask
      >(record)
      {
        | Ok(stored) => stored,
        | Err(err) => {
          warn!(index, error = %err, "skipping unreadable stored task");
          continue;
        }
      };
      match stored.normalize(index, now) {
        | Some(task) => out.push(task),
        | None => warn!(
          index,
          "skipping stored task without \
           id or text"
        )
      }
    }

    debug!(
      count = out.len(),
      "loaded tasks"
    );
    out
  }

  #[tracing::instrument(
    skip(self, tasks),
    fields(count = tasks.len())
  )]
  pub fn save_tasks(
    &mut self,
    tasks: &[Task]
  ) {
    self.write_json(TODOS_KEY, tasks);
  }

  #[tracing::instrument(skip(self))]
  pub fn load_categories(
    &self
  ) -> Vec<Category> {
    let Some(records) =
      self.read_array(CATEGORIES_KEY)
    else {
      return vec![];
    };

    records
      .into_iter()
      .enumerate()
      .filter_map(|(index, record)| {
        serde_json::from_value::<Category>(
          record
        )
        .map_err(|err| {
          warn!(index, error = %err, "skipping unreadable stored category");
        })
        .ok()
      })
      .collect()
  }

  #[tracing::instrument(
    skip(self, categories),
    fields(count = categories.len())
  )]
  pub fn save_categories(
    &mut self,
    categories: &[Category]
  ) {
    self.write_json(
      CATEGORIES_KEY,
      categories
    );
  }

  fn read_array(
    &self,
    key: &str
  ) -> Option<Vec<Value>> {
    let raw =
      match self.storage.get_item(key) {
        | Ok(Some(raw)) => raw,
        | Ok(None) => return None,
        | Err(err) => {
          warn!(key, error = %err, "failed reading stored value; starting empty");
          return None;
        }
      };

    match serde_json::from_str::<Value>(
      &raw
    ) {
      | Ok(Value::Array(records)) => {
        Some(records)
      }
      | Ok(other) => {
        warn!(
          key,
          kind = value_kind(&other),
          "stored value is not an \
           array; starting empty"
        );
        None
      }
      | Err(err) => {
        warn!(key, error = %err, "stored value is corrupted; starting empty");
        None
      }
    }
  }

  fn write_json<
    T: serde::Serialize + ?Sized
  >(
    &mut self,
    key: &str,
    value: &T
  ) {
    let payload =
      match serde_json::to_string(value)
      {
        | Ok(payload) => payload,
        | Err(err) => {
          error!(key, error = %err, "failed serializing value");
          return;
        }
      };
    if let Err(err) =
      self.storage.set_item(key, &payload)
    {
      error!(key, error = %err, "failed saving value");
    }
  }
}

fn value_kind(
  value: &Value
) -> &'static str {
  match value {
    | Value::Null => "null",
    | Value::Bool(_) => "bool",
    | Value::Number(_) => "number",
    | Value::String(_) => "string",
    | Value::Array(_) => "array",
    | Value::Object(_) => "object"
  }
}
