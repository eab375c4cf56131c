use std::io::{
  self,
  IsTerminal,
  Write
};

use anyhow::anyhow;
use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::export::{
  DateRange,
  Statistics
};
use crate::selection::{
  SelectionState,
  TriState
};
use crate::task::{
  Category,
  Task
};

#[derive(Debug, Clone)]
pub struct Renderer {
  color: bool,
  tz:    Tz
}

impl Renderer {
  pub fn new(
    cfg: &Config,
    tz: Tz
  ) -> anyhow::Result<Self> {
    let color_cfg = cfg
      .get("color")
      .unwrap_or_else(|| "on".to_string());
    let color = match color_cfg
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => true,
      | "off" | "no" | "false" | "0" => {
        false
      }
      | other => {
        return Err(anyhow!(
          "invalid color setting: {other}"
        ));
      }
    };

    Ok(Self {
      color,
      tz
    })
  }

  /// Tasks in the order given. With a selection snapshot in selection mode,
  /// a leading column marks the selected rows.
  #[tracing::instrument(
    skip_all,
    fields(rows = tasks.len())
  )]
  pub fn print_task_table(
    &self,
    out: &mut dyn Write,
    tasks: &[Task],
    categories: &[Category],
    selection: Option<&SelectionState>,
    now: DateTime<Utc>
  ) -> anyhow::Result<()> {
    if tasks.is_empty() {
      writeln!(out, "No tasks.")?;
      return Ok(());
    }

    let marking =
      selection.filter(|s| s.mode);
    let mut headers = Vec::new();
    if marking.is_some() {
      headers.push("Sel".to_string());
    }
    headers.extend(
      [
        "ID", "Done", "Task", "Category",
        "Tags", "Due",
      ]
      .map(String::from)
    );

    let mut rows =
      Vec::with_capacity(tasks.len());
    for task in tasks {
      let mut row =
        Vec::with_capacity(headers.len());
      if let Some(state) = marking {
        let mark = if state
          .selected
          .contains(&task.id)
        {
          "[x]"
        } else {
          "[ ]"
        };
        row.push(mark.to_string());
      }

      let due = task
        .due_date
        .map(|date| {
          date
            .with_timezone(&self.tz)
            .format("%Y-%m-%d %H:%M")
            .to_string()
        })
        .unwrap_or_default();
      let due = match task.due_date {
        | Some(when)
          if when < now
            && !task.completed =>
        {
          self.paint(&due, "31")
        }
        | _ => due
      };

      let category = task
        .category_id
        .and_then(|id| {
          categories
            .iter()
            .find(|c| c.id == id)
        })
        .map(|c| {
          self.paint_hex(&c.name, &c.color)
        })
        .unwrap_or_default();

      let text = if task.completed {
        self.paint(&task.text, "9")
      } else {
        task.text.clone()
      };

      row.push(
        self.paint(&task.id.to_string(), "33")
      );
      row.push(
        if task.completed { "x" } else { "" }
          .to_string()
      );
      row.push(text);
      row.push(category);
      row.push(
        task
          .tags
          .iter()
          .map(|tag| format!("+{tag}"))
          .collect::<Vec<_>>()
          .join(" ")
      );
      row.push(due);
      rows.push(row);
    }

    write_table(out, headers, rows)
  }

  pub fn print_selection(
    &self,
    out: &mut dyn Write,
    state: &SelectionState
  ) -> anyhow::Result<()> {
    if !state.mode {
      writeln!(out, "Selection mode off.")?;
      return Ok(());
    }
    let summary = match state.tri_state {
      | TriState::None => "none",
      | TriState::Partial => "some",
      | TriState::All => "all"
    };
    writeln!(
      out,
      "{} selected ({summary}).",
      state.selected.len()
    )?;
    Ok(())
  }

  pub fn print_categories(
    &self,
    out: &mut dyn Write,
    categories: &[Category]
  ) -> anyhow::Result<()> {
    if categories.is_empty() {
      writeln!(out, "No categories.")?;
      return Ok(());
    }
    let rows = categories
      .iter()
      .map(|c| {
        vec![
          c.id.to_string(),
          self.paint_hex(&c.name, &c.color),
          c.color.clone(),
        ]
      })
      .collect();
    write_table(
      out,
      ["ID", "Name", "Color"]
        .map(String::from)
        .to_vec(),
      rows
    )
  }

  pub fn print_stats(
    &self,
    out: &mut dyn Write,
    range: DateRange,
    stats: &Statistics,
    streak: u32,
    daily: &[(NaiveDate, usize)]
  ) -> anyhow::Result<()> {
    writeln!(out, "Range       {range}")?;
    writeln!(
      out,
      "Total       {}",
      stats.total
    )?;
    writeln!(
      out,
      "Completed   {}",
      stats.completed
    )?;
    writeln!(
      out,
      "Incomplete  {}",
      stats.incomplete
    )?;
    writeln!(
      out,
      "Rate        {:.1}%",
      stats.completion_rate
    )?;
    writeln!(
      out,
      "Streak      {streak} day(s)"
    )?;

    let peak = daily
      .iter()
      .map(|(_, n)| *n)
      .max()
      .unwrap_or(0)
      .max(1);
    for (day, count) in daily {
      let bar = "#".repeat(count * 20 / peak);
      writeln!(
        out,
        "{}  {bar} {count}",
        day.format("%m-%d")
      )?;
    }
    Ok(())
  }

  fn paint(
    &self,
    text: &str,
    code: &str
  ) -> String {
    if !self.color
      || !io::stdout().is_terminal()
    {
      return text.to_string();
    }
    format!("\x1b[{code}m{text}\x1b[0m")
  }

  fn paint_hex(
    &self,
    text: &str,
    hex: &str
  ) -> String {
    match parse_hex(hex) {
      | Some((r, g, b)) => self.paint(
        text,
        &format!("38;2;{r};{g};{b}")
      ),
      | None => text.to_string()
    }
  }
}

fn parse_hex(
  hex: &str
) -> Option<(u8, u8, u8)> {
  let digits = hex.strip_prefix('#')?;
  if digits.len() != 6 {
    return None;
  }
  let channel =
    |range: std::ops::Range<usize>| {
      u8::from_str_radix(
        digits.get(range)?,
        16
      )
      .ok()
    };
  Some((
    channel(0..2)?,
    channel(2..4)?,
    channel(4..6)?
  ))
}

fn write_table(
  writer: &mut dyn Write,
  headers: Vec<String>,
  rows: Vec<Vec<String>>
) -> anyhow::Result<()> {
  let column_count = headers.len();
  let mut widths = vec![0usize; column_count];

  for (idx, header) in
    headers.iter().enumerate()
  {
    widths[idx] = widths[idx].max(
      UnicodeWidthStr::width(
        header.as_str()
      )
    );
  }

  for row in &rows {
    for (idx, cell) in
      row.iter().enumerate()
    {
      widths[idx] = widths[idx].max(
        UnicodeWidthStr::width(
          strip_ansi(cell).as_str()
        )
      );
    }
  }

  for idx in 0..column_count {
    write!(
      writer,
      "{:width$} ",
      headers[idx],
      width = widths[idx]
    )?;
  }
  writeln!(writer)?;

  for width in &widths {
    write!(
      writer,
      "{:-<width$} ",
      "",
      width = *width
    )?;
  }
  writeln!(writer)?;

  for row in rows {
    for (idx, cell) in
      row.iter().enumerate()
    {
      let visible_width =
        UnicodeWidthStr::width(
          strip_ansi(cell).as_str()
        );
      let padding = widths[idx]
        .saturating_sub(visible_width);
      write!(
        writer,
        "{}{} ",
        cell,
        " ".repeat(padding)
      )?;
    }
    writeln!(writer)?;
  }

  Ok(())
}

fn strip_ansi(s: &str) -> String {
  let mut out =
    String::with_capacity(s.len());
  let mut escaped = false;

  for ch in s.chars() {
    if escaped {
      if ch == 'm' {
        escaped = false;
      }
      continue;
    }

    if ch == '\x1b' {
      escaped = true;
      continue;
    }

    out.push(ch);
  }

  out
}
