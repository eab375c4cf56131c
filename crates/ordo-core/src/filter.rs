use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::due::{
  DueClassifier,
  DueRange
};
use crate::error::TodoError;
use crate::task::{
  CategoryId,
  Task
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Incomplete,
  Completed
}

impl FromStr for StatusFilter {
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
      | "incomplete" | "open" => {
        Ok(Self::Incomplete)
      }
      | "completed" | "done" => {
        Ok(Self::Completed)
      }
      | _ => Err(TodoError::invalid(
        "status", s
      ))
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::All => "all",
      | Self::Incomplete => "incomplete",
      | Self::Completed => "completed"
    })
  }
}

/// Predicates for the visible list. Every set field must match.
#[derive(
  Debug, Clone, PartialEq, Eq, Default,
)]
pub struct ViewQuery {
  pub status:      StatusFilter,
  pub search:      String,
  pub category_id: Option<CategoryId>,
  pub tag:         Option<String>,
  pub due_range:   Option<DueRange>
}

impl ViewQuery {
  /// True when some task could be hidden by this query.
  pub fn is_active(&self) -> bool {
    self.status != StatusFilter::All
      || !self.search.trim().is_empty()
      || self.category_id.is_some()
      || self.tag.is_some()
      || self.due_range.is_some()
  }

  pub fn matches(
    &self,
    task: &Task,
    classifier: &dyn DueClassifier,
    now: DateTime<Utc>
  ) -> bool {
    let status_ok = match self.status {
      | StatusFilter::All => true,
      | StatusFilter::Incomplete => {
        !task.completed
      }
      | StatusFilter::Completed => {
        task.completed
      }
    };
    if !status_ok {
      return false;
    }

    let needle =
      self.search.trim().to_lowercase();
    if !needle.is_empty()
      && !task
        .text
        .to_lowercase()
        .contains(&needle)
    {
      return false;
    }

    if let Some(category_id) =
      self.category_id
      && task.category_id
        != Some(category_id)
    {
      return false;
    }

    if let Some(tag) = self.tag.as_deref()
      && !task.has_tag(tag)
    {
      return false;
    }

    if let Some(range) = self.due_range
      && !classifier.in_range(
        task.due_date,
        range,
        now
      )
    {
      return false;
    }

    true
  }
}

/// Projects `tasks` onto the subset matching `query`, keeping input order.
/// Reads nothing but its arguments.
#[tracing::instrument(skip_all, fields(
  total = tasks.len()
))]
pub fn view(
  tasks: &[Task],
  query: &ViewQuery,
  classifier: &dyn DueClassifier,
  now: DateTime<Utc>
) -> Vec<Task> {
  let out: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      query.matches(
        task, classifier, now
      )
    })
    .cloned()
    .collect();
  trace!(
    visible = out.len(),
    "computed view"
  );
  out
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    StatusFilter,
    ViewQuery,
    view
  };
  use crate::due::{
    DueRange,
    LocalDueClassifier
  };
  use crate::task::Task;

  fn sample() -> Vec<Task> {
    let now = Utc
      .with_ymd_and_hms(
        2025, 9, 1, 12, 0, 0
      )
      .unwrap();
    let mut milk = Task::new(
      1,
      "Buy Milk".to_string(),
      0,
      now
    );
    milk.tags = vec![
      "shopping".to_string(),
    ];
    milk.category_id = Some(1);

    let mut report = Task::new(
      2,
      "Write report".to_string(),
      1,
      now
    );
    report.set_completed(true, now);
    report.due_date =
      Some(now - Duration::days(1));

    let mut milk_again = Task::new(
      3,
      "milk the cow".to_string(),
      2,
      now
    );
    milk_again.due_date =
      Some(now + Duration::days(2));

    vec![milk, report, milk_again]
  }

  fn ids(tasks: &[Task]) -> Vec<u64> {
    tasks.iter().map(|t| t.id).collect()
  }

  #[test]
  fn predicates_compose_with_and() {
    let now = Utc
      .with_ymd_and_hms(
        2025, 9, 1, 12, 0, 0
      )
      .unwrap();
    let classifier =
      LocalDueClassifier::new(
        chrono_tz::UTC
      );
    let tasks = sample();

    let query = ViewQuery {
      search: "MILK".to_string(),
      ..ViewQuery::default()
    };
    assert_eq!(
      ids(&view(
        &tasks,
        &query,
        &classifier,
        now
      )),
      vec![1, 3]
    );

    let query = ViewQuery {
      search: "milk".to_string(),
      tag: Some("shopping".to_string()),
      ..ViewQuery::default()
    };
    assert_eq!(
      ids(&view(
        &tasks,
        &query,
        &classifier,
        now
      )),
      vec![1]
    );

    let query = ViewQuery {
      status: StatusFilter::Completed,
      due_range: Some(DueRange::Overdue),
      ..ViewQuery::default()
    };
    assert_eq!(
      ids(&view(
        &tasks,
        &query,
        &classifier,
        now
      )),
      vec![2]
    );

    let query = ViewQuery {
      status: StatusFilter::Incomplete,
      category_id: Some(1),
      ..ViewQuery::default()
    };
    assert_eq!(
      ids(&view(
        &tasks,
        &query,
        &classifier,
        now
      )),
      vec![1]
    );
  }

  #[test]
  fn view_is_idempotent_and_order_preserving()
  {
    let now = Utc
      .with_ymd_and_hms(
        2025, 9, 1, 12, 0, 0
      )
      .unwrap();
    let classifier =
      LocalDueClassifier::new(
        chrono_tz::UTC
      );
    let mut tasks = sample();
    tasks.reverse();
    let query = ViewQuery {
      due_range: Some(DueRange::NoDue),
      ..ViewQuery::default()
    };
    assert!(query.is_active());

    let first =
      view(&tasks, &query, &classifier, now);
    let second =
      view(&tasks, &query, &classifier, now);
    assert_eq!(first, second);

    let all = view(
      &tasks,
      &ViewQuery::default(),
      &classifier,
      now
    );
    assert_eq!(ids(&all), vec![3, 2, 1]);
    assert!(!ViewQuery::default().is_active());
  }
}
