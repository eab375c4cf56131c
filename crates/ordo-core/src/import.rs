use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{
  DateTime,
  Utc
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::datetime::parse_iso;
use crate::error::TodoError;
use crate::prompt::Prompter;
use crate::selection::SelectionController;
use crate::store::OrderedTaskStore;
use crate::task::{
  CategoryId,
  Task,
  clean_tags
};

const FALLBACK_TEXT: &str =
  "Imported task";
const REPLACE_PROMPT: &str =
  "There are existing tasks.\nOK: \
   delete them and replace with the \
   imported data\nCancel: append the \
   imported data";
const CSV_FORMAT_ALERT: &str =
  "The CSV file is not in the \
   expected format. Use the exported \
   header and one task per line.";
const JSON_FORMAT_ALERT: &str =
  "The file is not in a valid \
   format. Choose a valid JSON or CSV \
   file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
  Json,
  Csv
}

impl ImportFormat {
  /// Infers the format from a file extension.
  pub fn from_path(
    path: &Path
  ) -> Option<Self> {
    let ext = path
      .extension()?
      .to_str()?
      .to_ascii_lowercase();
    ext.parse().ok()
  }
}

impl FromStr for ImportFormat {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "json" => Ok(Self::Json),
      | "csv" => Ok(Self::Csv),
      | _ => Err(TodoError::invalid(
        "format", s
      ))
    }
  }
}

impl fmt::Display for ImportFormat {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::Json => "json",
      | Self::Csv => "csv"
    })
  }
}

/// A parsed record waiting for a fresh id. Identifiers and order values in
/// the payload are never carried over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportCandidate {
  pub text:         String,
  pub completed:    bool,
  pub created_at:   Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub category_id:  Option<CategoryId>,
  pub tags:         Vec<String>,
  pub due_date:     Option<DateTime<Utc>>
}

#[derive(Debug, Deserialize)]
struct JsonImportTask {
  #[serde(default)]
  text:            Option<String>,
  #[serde(default, rename = "テキスト")]
  text_ja:         Option<String>,
  #[serde(default)]
  completed:       Option<Value>,
  #[serde(default, rename = "完了")]
  completed_ja:    Option<Value>,
  #[serde(default, rename = "createdAt")]
  created_at:      Option<String>,
  #[serde(default, rename = "作成日時")]
  created_at_ja:   Option<String>,
  #[serde(default, rename = "completedAt")]
  completed_at:    Option<String>,
  #[serde(default, rename = "完了日時")]
  completed_at_ja: Option<String>,
  #[serde(default, rename = "categoryId")]
  category_id:     Option<CategoryId>,
  #[serde(default)]
  tags:            Option<Vec<String>>,
  #[serde(default, rename = "dueDate")]
  due_date:        Option<String>
}

impl JsonImportTask {
  fn into_candidate(
    self
  ) -> ImportCandidate {
    let completed = self
      .completed
      .as_ref()
      .map(is_true)
      .unwrap_or(false)
      || self
        .completed_ja
        .as_ref()
        .map(is_true)
        .unwrap_or(false);

    ImportCandidate {
      text: pick_text(
        self.text.as_deref(),
        self.text_ja.as_deref()
      ),
      completed,
      created_at: self
        .created_at
        .or(self.created_at_ja)
        .as_deref()
        .and_then(parse_iso),
      completed_at: self
        .completed_at
        .or(self.completed_at_ja)
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
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
  Id,
  Text,
  Completed,
  CreatedAt,
  CompletedAt,
  Order
}

const REQUIRED_COLUMNS: [Column; 6] = [
  Column::Id,
  Column::Text,
  Column::Completed,
  Column::CreatedAt,
  Column::CompletedAt,
  Column::Order
];

fn column_for(
  header: &str
) -> Option<Column> {
  match header.trim() {
    | "ID" | "id" => Some(Column::Id),
    | "テキスト" | "text" => {
      Some(Column::Text)
    }
    | "完了" | "completed" => {
      Some(Column::Completed)
    }
    | "作成日時" | "createdAt" => {
      Some(Column::CreatedAt)
    }
    | "完了日時" | "completedAt" => {
      Some(Column::CompletedAt)
    }
    | "順序" | "order" => {
      Some(Column::Order)
    }
    | _ => None
  }
}

/// Parses a payload completely, without touching any state.
#[instrument(skip(payload))]
pub fn parse_payload(
  payload: &str,
  format: ImportFormat
) -> Result<Vec<ImportCandidate>, TodoError>
{
  match format {
    | ImportFormat::Json => {
      parse_json(payload)
    }
    | ImportFormat::Csv => {
      parse_csv(payload)
    }
  }
}

fn parse_json(
  payload: &str
) -> Result<Vec<ImportCandidate>, TodoError>
{
  let root: Value =
    serde_json::from_str(payload.trim())
      .map_err(|err| {
        TodoError::ImportFormat(format!(
          "invalid JSON: {err}"
        ))
      })?;

  let items = match root {
    | Value::Array(items) => items,
    | Value::Object(mut map) => {
      match map.remove("todos") {
        | Some(Value::Array(items)) => {
          items
        }
        | _ => {
          return Err(
            TodoError::ImportFormat(
              "expected a `todos` array"
                .to_string()
            )
          );
        }
      }
    }
    | _ => {
      return Err(
        TodoError::ImportFormat(
          "expected an array of tasks"
            .to_string()
        )
      );
    }
  };

  items
    .into_iter()
    .enumerate()
    .map(|(idx, item)| {
      serde_json::from_value::<
        JsonImportTask
      >(item)
      .map(JsonImportTask::into_candidate)
      .map_err(|err| {
        TodoError::ImportFormat(format!(
          "task {} is malformed: {err}",
          idx + 1
        ))
      })
    })
    .collect()
}

fn parse_csv(
  payload: &str
) -> Result<Vec<ImportCandidate>, TodoError>
{
  let mut reader =
    csv::ReaderBuilder::new()
      .has_headers(true)
      .flexible(false)
      .trim(csv::Trim::All)
      .from_reader(payload.as_bytes());

  let columns: Vec<Option<Column>> =
    reader
      .headers()
      .map_err(|err| {
        TodoError::ImportFormat(format!(
          "CSV header is unreadable: {err}"
        ))
      })?
      .iter()
      .map(column_for)
      .collect();

  if let Some(missing) = REQUIRED_COLUMNS
    .iter()
    .find(|col| {
      !columns.contains(&Some(**col))
    })
  {
    return Err(TodoError::ImportFormat(
      format!(
        "CSV header is missing the \
         {missing:?} column"
      )
    ));
  }

  let mut out = Vec::new();
  for (idx, record) in
    reader.records().enumerate()
  {
    let record = record.map_err(|err| {
      TodoError::ImportFormat(format!(
        "CSV row {} is malformed: {err}",
        idx + 1
      ))
    })?;

    let mut candidate =
      ImportCandidate::default();
    let mut text = None;
    for (column, value) in
      columns.iter().zip(record.iter())
    {
      match column {
        | Some(Column::Text) => {
          text = Some(value);
        }
        | Some(Column::Completed) => {
          candidate.completed =
            value == "true";
        }
        | Some(Column::CreatedAt) => {
          candidate.created_at =
            parse_iso(value);
        }
        | Some(Column::CompletedAt) => {
          candidate.completed_at =
            parse_iso(value);
        }
        | Some(Column::Id)
        | Some(Column::Order)
        | None => {}
      }
    }
    candidate.text =
      pick_text(text, None);
    out.push(candidate);
  }

  if out.is_empty() {
    return Err(TodoError::ImportFormat(
      "CSV has a header but no rows"
        .to_string()
    ));
  }

  Ok(out)
}

/// Parses `payload` and merges it into the store. On a format error the
/// user is alerted and nothing is mutated.
///
/// A non-empty store prompts for replace (confirm) or merge (decline).
/// Every record gets a fresh id and is appended in file order.
#[instrument(skip(
  store, selection, payload, prompter,
  now
))]
pub fn import(
  store: &mut OrderedTaskStore,
  selection: &mut SelectionController,
  payload: &str,
  format: ImportFormat,
  prompter: &mut dyn Prompter,
  now: DateTime<Utc>
) -> Result<usize, TodoError> {
  let candidates =
    match parse_payload(payload, format)
    {
      | Ok(candidates) => candidates,
      | Err(err) => {
        warn!(error = %err, %format, "import rejected");
        prompter.alert(match format {
          | ImportFormat::Csv => {
            CSV_FORMAT_ALERT
          }
          | ImportFormat::Json => {
            JSON_FORMAT_ALERT
          }
        });
        return Err(err);
      }
    };

  if !store.is_empty() {
    if prompter.confirm(REPLACE_PROMPT)
    {
      info!(
        existing = store.len(),
        "replacing existing tasks"
      );
      store.clear(selection);
    } else {
      debug!(
        existing = store.len(),
        "merging into existing tasks"
      );
    }
  }

  let count = candidates.len();
  for candidate in candidates {
    let task = build_task(
      store, candidate, now
    );
    store.push_unsaved(task);
  }
  store.persist_tasks();

  info!(count, "imported tasks");
  prompter.alert(&format!(
    "Imported {count} task(s)."
  ));
  Ok(count)
}

fn build_task(
  store: &mut OrderedTaskStore,
  candidate: ImportCandidate,
  now: DateTime<Utc>
) -> Task {
  let order = store.len() as i64;
  let id = store.allocate_id();
  let mut task = Task::new(
    id,
    candidate.text,
    order,
    candidate.created_at.unwrap_or(now)
  );
  task.completed = candidate.completed;
  task.completed_at = candidate
    .completed_at
    .filter(|_| candidate.completed);
  task.category_id = candidate
    .category_id
    .filter(|cid| {
      store.category(*cid).is_some()
    });
  task.tags = candidate.tags;
  task.due_date = candidate.due_date;
  task
}

fn pick_text(
  primary: Option<&str>,
  fallback: Option<&str>
) -> String {
  [primary, fallback]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|text| !text.is_empty())
    .unwrap_or(FALLBACK_TEXT)
    .to_string()
}

fn is_true(value: &Value) -> bool {
  match value {
    | Value::Bool(b) => *b,
    | Value::String(s) => s == "true",
    | _ => false
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::{
    ImportFormat,
    parse_payload
  };
  use crate::error::TodoError;

  #[test]
  fn json_accepts_wrapped_and_bare_arrays()
  {
    let wrapped = r#"{"exportDate":"x","todos":[{"id":99,"text":"a","completed":true}]}"#;
    let bare = r#"[{"テキスト":"b","完了":"true"},{"text":"  "}]"#;

    let a = parse_payload(
      wrapped,
      ImportFormat::Json
    )
    .unwrap();
    assert_eq!(a.len(), 1);
    assert!(a[0].completed);

    let b = parse_payload(
      bare,
      ImportFormat::Json
    )
    .unwrap();
    assert_eq!(b[0].text, "b");
    assert!(b[0].completed);
    assert_eq!(b[1].text, "Imported task");
  }

  #[test]
  fn json_shape_errors() {
    for bad in [
      "{oops",
      r#"{"items":[]}"#,
      "42",
      r#"[{"text": 5}]"#
    ] {
      assert!(matches!(
        parse_payload(
          bad,
          ImportFormat::Json
        ),
        Err(TodoError::ImportFormat(_))
      ));
    }
  }

  #[test]
  fn csv_requires_full_header_and_matching_rows()
  {
    let good = "ID,テキスト,完了,作成日時,完了日時,順序\n\
                5,\"milk, eggs\",false,2025-01-01T00:00:00.000Z,,0\r\n\
                \n\
                6,\"done\",true,,2025-01-02T00:00:00.000Z,1\n";
    let rows = parse_payload(
      good,
      ImportFormat::Csv
    )
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].text, "milk, eggs");
    assert!(rows[1].completed);
    assert!(rows[1].completed_at.is_some());
    assert!(rows[1].created_at.is_none());

    let english = "id,text,completed,createdAt,completedAt,order\n1,a,false,,,0";
    assert_eq!(
      parse_payload(
        english,
        ImportFormat::Csv
      )
      .unwrap()
      .len(),
      1
    );

    let short_header =
      "ID,テキスト,完了\n1,a,false";
    let ragged = "ID,テキスト,完了,作成日時,完了日時,順序\n1,a,false";
    let header_only = "ID,テキスト,完了,作成日時,完了日時,順序\n";
    for bad in
      [short_header, ragged, header_only, ""]
    {
      assert!(matches!(
        parse_payload(
          bad,
          ImportFormat::Csv
        ),
        Err(TodoError::ImportFormat(_))
      ));
    }
  }

  #[test]
  fn format_from_extension() {
    assert_eq!(
      ImportFormat::from_path(
        Path::new("backup.JSON")
      ),
      Some(ImportFormat::Json)
    );
    assert_eq!(
      ImportFormat::from_path(
        Path::new("todo-data.csv")
      ),
      Some(ImportFormat::Csv)
    );
    assert_eq!(
      ImportFormat::from_path(
        Path::new("notes.txt")
      ),
      None
    );
  }
}
