use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  SecondsFormat,
  SubsecRound,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "ordo-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "ORDO_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "ORDO_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone used to decide what "today" means for due buckets and
/// statistics.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

/// Start of the calendar day containing `now`, in `tz`, as UTC.
#[must_use]
pub fn start_of_day(
  now: DateTime<Utc>,
  tz: &Tz
) -> DateTime<Utc> {
  let date = to_project_date(now, tz);
  local_to_utc(
    date.and_time(NaiveTime::MIN),
    tz
  )
  .unwrap_or(now)
}

/// Formats a timestamp the way browsers print `Date#toISOString`.
#[must_use]
pub fn format_iso(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

/// Drops everything below the millisecond, which is all the stored format
/// keeps. Timestamps are cut here before they reach a task so a save and a
/// reload give back the same value.
#[must_use]
pub fn stored_precision(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.trunc_subsecs(3)
}

/// Lenient ISO-8601 reader: full RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS]`
/// taken as UTC, or a bare date at midnight UTC.
#[must_use]
pub fn parse_iso(
  raw: &str
) -> Option<DateTime<Utc>> {
  parse_iso_exact(raw)
    .map(stored_precision)
}

fn parse_iso_exact(
  raw: &str
) -> Option<DateTime<Utc>> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Some(dt.with_timezone(&Utc));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return Some(ndt.and_utc());
    }
  }

  NaiveDate::parse_from_str(
    trimmed, "%Y-%m-%d"
  )
  .ok()
  .map(|date| {
    date.and_time(NaiveTime::MIN).and_utc()
  })
}

/// Parses a user-entered due date. Naive values are read as wall-clock time
/// in `tz`; a bare date means the end of that day.
pub fn parse_due_input(
  raw: &str,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let trimmed = raw.trim();

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Ok(stored_precision(
      dt.with_timezone(&Utc)
    ));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return local_to_utc(ndt, tz)
        .ok_or_else(|| {
          anyhow::anyhow!(
            "due date {trimmed} does \
             not exist in {tz}"
          )
        });
    }
  }

  let date = NaiveDate::parse_from_str(
    trimmed, "%Y-%m-%d"
  )
  .map_err(|_| {
    anyhow::anyhow!(
      "unrecognized due date: \
       {trimmed}"
    )
  })?;
  let end_of_day = date
    .and_hms_opt(23, 59, 0)
    .ok_or_else(|| {
      anyhow::anyhow!(
        "invalid due date: {trimmed}"
      )
    })?;
  local_to_utc(end_of_day, tz)
    .ok_or_else(|| {
      anyhow::anyhow!(
        "due date {trimmed} does not \
         exist in {tz}"
      )
    })
}

fn local_to_utc(
  ndt: NaiveDateTime,
  tz: &Tz
) -> Option<DateTime<Utc>> {
  match tz.from_local_datetime(&ndt) {
    | LocalResult::Single(dt) => {
      Some(dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      earliest,
      _
    ) => Some(
      earliest.with_timezone(&Utc)
    ),
    | LocalResult::None => None
  }
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "resolved project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone; ignoring"
      );
      None
    }
  }
}

/// Serde adapter for the `createdAt` / `completedAt` / `dueDate` fields.
pub mod iso_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso(*dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso(&raw).ok_or_else(
      || {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      }
    )
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => serializer
          .serialize_str(
            &super::super::format_iso(
              *value
            )
          ),
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let raw = Option::<String>::deserialize(
        deserializer
      )?;
      match raw {
        | None => Ok(None),
        | Some(text)
          if text.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(text) => {
          super::super::parse_iso(&text)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid timestamp: \
                   {text}"
                )
              )
            })
        }
      }
    }
  }
}
