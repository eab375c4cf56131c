use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  Duration,
  Utc
};
use chrono_tz::Tz;

use crate::datetime::{
  project_timezone,
  to_project_date
};
use crate::error::TodoError;

/// Due-date bucket used by the list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueRange {
  Overdue,
  Today,
  Week,
  NoDue
}

impl FromStr for DueRange {
  type Err = TodoError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "overdue" => Ok(Self::Overdue),
      | "today" => Ok(Self::Today),
      | "week" => Ok(Self::Week),
      | "no-due" | "nodue" | "none" => {
        Ok(Self::NoDue)
      }
      | _ => Err(TodoError::invalid(
        "due range",
        s
      ))
    }
  }
}

impl fmt::Display for DueRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | Self::Overdue => "overdue",
      | Self::Today => "today",
      | Self::Week => "week",
      | Self::NoDue => "no-due"
    })
  }
}

/// Decides whether a due date falls in a bucket.
pub trait DueClassifier {
  fn in_range(
    &self,
    due: Option<DateTime<Utc>>,
    range: DueRange,
    now: DateTime<Utc>
  ) -> bool;
}

/// Buckets by calendar day in a fixed timezone.
#[derive(Debug, Clone, Copy)]
pub struct LocalDueClassifier {
  tz: Tz
}

impl LocalDueClassifier {
  pub fn new(tz: Tz) -> Self {
    Self { tz }
  }
}

impl Default for LocalDueClassifier {
  fn default() -> Self {
    Self::new(*project_timezone())
  }
}

impl DueClassifier for LocalDueClassifier {
  fn in_range(
    &self,
    due: Option<DateTime<Utc>>,
    range: DueRange,
    now: DateTime<Utc>
  ) -> bool {
    match (range, due) {
      | (DueRange::NoDue, due) => {
        due.is_none()
      }
      | (_, None) => false,
      | (DueRange::Overdue, Some(due)) => {
        due < now
      }
      | (DueRange::Today, Some(due)) => {
        to_project_date(due, &self.tz)
          == to_project_date(now, &self.tz)
      }
      | (DueRange::Week, Some(due)) => {
        due >= now
          && due <= now + Duration::days(7)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    DueClassifier,
    DueRange,
    LocalDueClassifier
  };

  #[test]
  fn buckets_follow_calendar_and_window()
  {
    let classifier =
      LocalDueClassifier::new(
        chrono_tz::UTC
      );
    let now = Utc
      .with_ymd_and_hms(
        2025, 8, 10, 12, 0, 0
      )
      .unwrap();

    let earlier_today =
      Some(now - Duration::hours(2));
    assert!(classifier.in_range(
      earlier_today,
      DueRange::Overdue,
      now
    ));
    assert!(classifier.in_range(
      earlier_today,
      DueRange::Today,
      now
    ));
    assert!(!classifier.in_range(
      earlier_today,
      DueRange::Week,
      now
    ));

    let in_three_days =
      Some(now + Duration::days(3));
    assert!(classifier.in_range(
      in_three_days,
      DueRange::Week,
      now
    ));
    assert!(!classifier.in_range(
      in_three_days,
      DueRange::Today,
      now
    ));

    assert!(classifier.in_range(
      None,
      DueRange::NoDue,
      now
    ));
    assert!(!classifier.in_range(
      None,
      DueRange::Overdue,
      now
    ));
    assert!(!classifier.in_range(
      in_three_days,
      DueRange::NoDue,
      now
    ));
  }

  #[test]
  fn parses_filter_names() {
    assert_eq!(
      "no-due".parse::<DueRange>().unwrap(),
      DueRange::NoDue
    );
    assert_eq!(
      "Week".parse::<DueRange>().unwrap(),
      DueRange::Week
    );
    assert!(
      "later".parse::<DueRange>().is_err()
    );
  }
}
