use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Days,
  Months,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::instrument;

use crate::datetime::{
  format_iso,
  start_of_day,
  to_project_date
};
use crate::error::TodoError;
use crate::task::{
  Category,
  Task
};

pub const CSV_HEADER: [&str; 6] = [
  "ID",
  "テキスト",
  "完了",
  "作成日時",
  "完了日時",
  "順序",
];

/// Window applied to `createdAt` before counting statistics.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
  #[default]
  All,
  Today,
  Week,
  Month
}

impl DateRange {
  /// Earliest creation time still inside the range.
  pub fn start(
    self,
    now: DateTime<Utc>,
    tz: &Tz
  ) -> Option<DateTime<Utc>> {
    match self {
      | Self::All => None,
      | Self::Today => {
        Some(start_of_day(now, tz))
      }
      | Self::Week => {
        now.checked_sub_days(Days::new(7))
      }
      | Self::Month => now
        .checked_sub_months(Months::new(1))
    }
  }
}

impl FromStr for DateRange {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(Self::All),
      | "today" => Ok(Self::Today),
      | "week" => Ok(Self::Week),
      | "month" => Ok(Self::Month),
      | _ => Err(TodoError::invalid(
        "date range",
        s
      ))
    }
  }
}

impl fmt::Display for DateRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::All => "all",
      | Self::Today => "today",
      | Self::Week => "week",
      | Self::Month => "month"
    })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Serialize
)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
  pub total:           usize,
  pub completed:       usize,
  pub incomplete:      usize,
  /// Percentage rounded to one decimal place.
  pub completion_rate: f64
}

pub fn statistics(
  tasks: &[Task],
  range: DateRange,
  now: DateTime<Utc>,
  tz: &Tz
) -> Statistics {
  let start = range.start(now, tz);
  let in_range: Vec<&Task> = tasks
    .iter()
    .filter(|t| {
      start.is_none_or(|start| {
        t.created_at >= start
      })
    })
    .collect();

  let total = in_range.len();
  let completed = in_range
    .iter()
    .filter(|t| t.completed)
    .count();
  let completion_rate = if total == 0 {
    0.0
  } else {
    (completed as f64 / total as f64
      * 1000.0)
      .round()
      / 10.0
  };

  Statistics {
    total,
    completed,
    incomplete: total - completed,
    completion_rate
  }
}

/// Consecutive days, ending today, with at least one completion.
pub fn completion_streak(
  tasks: &[Task],
  now: DateTime<Utc>,
  tz: &Tz
) -> u32 {
  let days = completion_days(tasks, tz);
  let mut day = to_project_date(now, tz);
  let mut streak = 0;
  while days.contains(&day) {
    streak += 1;
    match day.pred_opt() {
      | Some(prev) => day = prev,
      | None => break
    }
  }
  streak
}

/// Completion counts for the last seven days, oldest first.
pub fn daily_completions(
  tasks: &[Task],
  now: DateTime<Utc>,
  tz: &Tz
) -> Vec<(NaiveDate, usize)> {
  let today = to_project_date(now, tz);
  (0..7u64)
    .rev()
    .filter_map(|back| {
      today.checked_sub_days(Days::new(back))
    })
    .map(|day| {
      let count = tasks
        .iter()
        .filter(|t| t.completed)
        .filter_map(|t| t.completed_at)
        .filter(|at| {
          to_project_date(*at, tz) == day
        })
        .count();
      (day, count)
    })
    .collect()
}

fn completion_days(
  tasks: &[Task],
  tz: &Tz
) -> BTreeSet<NaiveDate> {
  tasks
    .iter()
    .filter(|t| t.completed)
    .filter_map(|t| t.completed_at)
    .map(|at| to_project_date(at, tz))
    .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
  export_date: String,
  date_range:  DateRange,
  statistics:  Statistics,
  todos:       &'a [Task],
  categories:  &'a [Category]
}

/// Pretty-printed JSON document; its `todos` array is accepted back by
/// import.
#[instrument(skip(
  tasks, categories, now, tz
))]
pub fn export_json(
  tasks: &[Task],
  categories: &[Category],
  range: DateRange,
  now: DateTime<Utc>,
  tz: &Tz
) -> anyhow::Result<String> {
  let doc = JsonExport {
    export_date: format_iso(now),
    date_range: range,
    statistics: statistics(
      tasks, range, now, tz
    ),
    todos: tasks,
    categories
  };
  Ok(serde_json::to_string_pretty(&doc)?)
}

/// One record per task, in the order given. Text is quoted only when it
/// holds a delimiter, quote or line break.
#[instrument(
  skip(tasks),
  fields(count = tasks.len())
)]
pub fn export_csv(
  tasks: &[Task]
) -> anyhow::Result<String> {
  let mut writer =
    csv::WriterBuilder::new()
      .terminator(csv::Terminator::Any(
        b'\n'
      ))
      .from_writer(vec![]);
  writer.write_record(CSV_HEADER)?;
  for t in tasks {
    writer.write_record([
      t.id.to_string(),
      t.text.clone(),
      t.completed.to_string(),
      format_iso(t.created_at),
      t.completed_at
        .map(format_iso)
        .unwrap_or_default(),
      t.order.to_string(),
    ])?;
  }
  let bytes =
    writer.into_inner().map_err(|err| {
      anyhow!(
        "failed finishing CSV export: {}",
        err.error()
      )
    })?;
  Ok(String::from_utf8(bytes)?)
}

/// `json` exports statistics with the data; `csv` exports the data only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
  Stats,
  Data
}

impl FromStr for ExportKind {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "json" => Ok(Self::Stats),
      | "csv" => Ok(Self::Data),
      | _ => Err(TodoError::invalid(
        "export format",
        s
      ))
    }
  }
}

/// `todo-stats-YYYY-MM-DD.json` or `todo-data-YYYY-MM-DD.csv`, dated in UTC.
pub fn export_file_name(
  kind: ExportKind,
  now: DateTime<Utc>
) -> String {
  let date = now.format("%Y-%m-%d");
  match kind {
    | ExportKind::Stats => {
      format!("todo-stats-{date}.json")
    }
    | ExportKind::Data => {
      format!("todo-data-{date}.csv")
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };

  use super::{
    DateRange,
    ExportKind,
    completion_streak,
    daily_completions,
    export_csv,
    export_file_name,
    export_json,
    statistics
  };
  use crate::import::{
    ImportFormat,
    parse_payload
  };
  use crate::task::Task;

  fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2025, 5, d, h, 0, 0)
      .unwrap()
  }

  fn task(
    id: u64,
    created: DateTime<Utc>,
    done_at: Option<DateTime<Utc>>
  ) -> Task {
    let mut t = Task::new(
      id,
      format!("task {id}"),
      id as i64 - 1,
      created
    );
    if let Some(done) = done_at {
      t.set_completed(true, done);
    }
    t
  }

  #[test]
  fn statistics_filter_by_creation_window()
  {
    let now = at(20, 12);
    let tasks = vec![
      task(1, at(1, 0), Some(at(2, 0))),
      task(2, at(15, 0), None),
      task(3, at(20, 1), Some(at(20, 2))),
    ];
    let utc = chrono_tz::UTC;

    let all = statistics(
      &tasks,
      DateRange::All,
      now,
      &utc
    );
    assert_eq!(
      (
        all.total,
        all.completed,
        all.incomplete
      ),
      (3, 2, 1)
    );
    assert_eq!(all.completion_rate, 66.7);

    assert_eq!(
      statistics(
        &tasks,
        DateRange::Week,
        now,
        &utc
      )
      .total,
      2
    );
    assert_eq!(
      statistics(
        &tasks,
        DateRange::Today,
        now,
        &utc
      )
      .total,
      1
    );
    assert_eq!(
      statistics(
        &[],
        DateRange::Month,
        now,
        &utc
      )
      .completion_rate,
      0.0
    );
  }

  #[test]
  fn streak_stops_at_first_gap() {
    let utc = chrono_tz::UTC;
    let tasks = vec![
      task(1, at(1, 0), Some(at(20, 9))),
      task(2, at(1, 0), Some(at(19, 9))),
      task(3, at(1, 0), Some(at(17, 9))),
    ];
    assert_eq!(
      completion_streak(
        &tasks,
        at(20, 12),
        &utc
      ),
      2
    );
    assert_eq!(
      completion_streak(
        &tasks,
        at(21, 12),
        &utc
      ),
      0
    );

    let daily = daily_completions(
      &tasks,
      at(20, 12),
      &utc
    );
    assert_eq!(daily.len(), 7);
    assert_eq!(
      daily.last().map(|(_, n)| *n),
      Some(1)
    );
  }

  #[test]
  fn csv_quotes_text_and_leaves_blank_timestamps()
  {
    let mut t = task(4, at(1, 0), None);
    t.text = r#"say "hi", ok"#.to_string();
    let out = export_csv(&[t]).unwrap();
    let mut lines = out.lines();
    assert_eq!(
      lines.next(),
      Some(
        "ID,テキスト,完了,作成日時,完了日時,順序"
      )
    );
    assert_eq!(
      lines.next(),
      Some(
        r#"4,"say ""hi"", ok",false,2025-05-01T00:00:00.000Z,,3"#
      )
    );
    assert_eq!(lines.next(), None);
  }

  #[test]
  fn multiline_text_survives_csv_reimport()
  {
    let mut first =
      task(1, at(1, 0), Some(at(2, 0)));
    first.text =
      "line one\nline two".to_string();
    let mut second = task(2, at(3, 0), None);
    second.text =
      "quoted \"name\", with comma"
        .to_string();

    let out =
      export_csv(&[first, second]).unwrap();
    let back = parse_payload(
      &out,
      ImportFormat::Csv
    )
    .unwrap();

    assert_eq!(back.len(), 2);
    assert_eq!(
      back[0].text,
      "line one\nline two"
    );
    assert!(back[0].completed);
    assert_eq!(
      back[0].completed_at,
      Some(at(2, 0))
    );
    assert_eq!(
      back[1].text,
      "quoted \"name\", with comma"
    );
    assert_eq!(
      back[1].created_at,
      Some(at(3, 0))
    );
  }

  #[test]
  fn json_export_is_importable() {
    let now = at(20, 12);
    let tasks = vec![
      task(1, at(1, 0), Some(at(2, 0))),
      task(2, at(3, 0), None),
    ];
    let out = export_json(
      &tasks,
      &[],
      DateRange::All,
      now,
      &chrono_tz::UTC
    )
    .unwrap();

    let doc: serde_json::Value =
      serde_json::from_str(&out).unwrap();
    assert_eq!(doc["dateRange"], "all");
    assert_eq!(
      doc["statistics"]["completionRate"],
      50.0
    );
    assert!(
      doc["categories"]
        .as_array()
        .unwrap()
        .is_empty()
    );

    let back = parse_payload(
      &out,
      ImportFormat::Json
    )
    .unwrap();
    assert_eq!(back.len(), 2);
    assert!(back[0].completed);
    assert_eq!(
      back[0].completed_at,
      Some(at(2, 0))
    );
  }

  #[test]
  fn file_names_carry_the_date() {
    let now = at(9, 23);
    assert_eq!(
      export_file_name(
        ExportKind::Stats,
        now
      ),
      "todo-stats-2025-05-09.json"
    );
    assert_eq!(
      export_file_name(
        ExportKind::Data,
        now
      ),
      "todo-data-2025-05-09.csv"
    );
  }
}
