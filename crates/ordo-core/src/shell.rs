use std::io::{
  self,
  Write
};

use clap::Parser;
use tracing::{
  debug,
  instrument
};

use crate::app::{
  Action,
  Outcome,
  Tick
};
use crate::cli::{
  BulkCommand,
  ShellCommand,
  ShellLine,
  split_words
};
use crate::commands::{
  self,
  Session,
  describe_bulk_delete,
  report_move
};

const PROMPT: &str = "ordo> ";
const NEED_MODE: &str =
  "Enter selection mode first with \
   `mode`.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlow {
  Continue,
  Quit
}

/// Reads lines until end of input or `quit`. Errors from one line are
/// printed and the session carries on.
#[instrument(skip_all)]
pub fn run_shell(
  session: &mut Session,
  next_line: &mut dyn FnMut() -> io::Result<
    Option<String>
  >,
  out: &mut dyn Write
) -> anyhow::Result<()> {
  loop {
    write!(out, "{PROMPT}")?;
    out.flush()?;

    let Some(line) = next_line()? else {
      writeln!(out)?;
      break;
    };

    match execute_line(
      session,
      &line,
      out,
      Tick::now()
    ) {
      | Ok(ShellFlow::Quit) => break,
      | Ok(ShellFlow::Continue) => {}
      | Err(err) => {
        writeln!(out, "error: {err:#}")?
      }
    }
  }
  Ok(())
}

/// Runs a single shell line at `tick`.
pub fn execute_line(
  session: &mut Session,
  line: &str,
  out: &mut dyn Write,
  tick: Tick
) -> anyhow::Result<ShellFlow> {
  let words = split_words(line);
  if words.is_empty() {
    return Ok(ShellFlow::Continue);
  }

  let parsed =
    match ShellLine::try_parse_from(words) {
      | Ok(parsed) => parsed,
      | Err(err) => {
        write!(out, "{}", err.render())?;
        return Ok(ShellFlow::Continue);
      }
    };

  if session.app.poll_search(tick.mono) {
    debug!(
      "pending search applied before \
       command"
    );
  }

  match parsed.command {
    | ShellCommand::Task(cmd) => {
      commands::dispatch(
        session, cmd, out, tick
      )?
    }
    | ShellCommand::Mode => {
      let _ = session.apply(
        Action::ToggleSelectionMode,
        tick
      )?;
      print_selection(session, out)?;
    }
    | ShellCommand::Select {
      id,
      shift
    } => select(session, out, id, shift, tick)?,
    | ShellCommand::Shift {
      id
    } => select(session, out, id, true, tick)?,
    | ShellCommand::SelectAll => {
      select_all(session, out, true, tick)?
    }
    | ShellCommand::SelectNone => {
      select_all(session, out, false, tick)?
    }
    | ShellCommand::Bulk(cmd) => {
      bulk(session, out, cmd, tick)?
    }
    | ShellCommand::Drag {
      id
    } => {
      let _ = session
        .apply(Action::BeginMove(id), tick)?;
      writeln!(out, "Dragging task {id}.")?;
    }
    | ShellCommand::Drop {
      target,
      position
    } => match session.app.dragging() {
      | Some(id) => {
        let outcome = session.apply(
          Action::CompleteMove {
            id,
            target,
            position
          },
          tick
        )?;
        report_move(out, id, outcome)?;
      }
      | None => writeln!(
        out,
        "Nothing is being dragged."
      )?
    },
    | ShellCommand::Cancel => {
      let _ = session
        .apply(Action::CancelMove, tick)?;
    }
    | ShellCommand::Search {
      query
    } => {
      let _ = session.apply(
        Action::SearchInput(query.join(" ")),
        tick
      )?;
    }
    | ShellCommand::Status {
      status
    } => {
      let _ = session.apply(
        Action::SetStatus(status),
        tick
      )?;
    }
    | ShellCommand::Filter {
      category,
      tag,
      due
    } => {
      let _ = session.apply(
        Action::SetCategoryFilter(category),
        tick
      )?;
      let _ = session.apply(
        Action::SetTagFilter(tag),
        tick
      )?;
      let _ = session.apply(
        Action::SetDueFilter(due),
        tick
      )?;
    }
    | ShellCommand::Clear => {
      let _ = session
        .apply(Action::ClearFilters, tick)?;
    }
    | ShellCommand::View => {
      let tasks = session.app.view(tick.wall);
      let state =
        session.app.selection_state();
      session.renderer().print_task_table(
        out,
        &tasks,
        session.app.store().categories(),
        Some(&state),
        tick.wall
      )?;
      if state.mode {
        session
          .renderer()
          .print_selection(out, &state)?;
      }
    }
    | ShellCommand::Quit => {
      return Ok(ShellFlow::Quit);
    }
  }

  Ok(ShellFlow::Continue)
}

fn select(
  session: &mut Session,
  out: &mut dyn Write,
  id: u64,
  shift: bool,
  tick: Tick
) -> anyhow::Result<()> {
  let outcome = session.apply(
    Action::Select {
      id,
      shift
    },
    tick
  )?;
  if outcome == Outcome::Rejected {
    writeln!(out, "{NEED_MODE}")?;
    return Ok(());
  }
  print_selection(session, out)
}

fn select_all(
  session: &mut Session,
  out: &mut dyn Write,
  checked: bool,
  tick: Tick
) -> anyhow::Result<()> {
  let outcome = session.apply(
    Action::SelectAll(checked),
    tick
  )?;
  if outcome == Outcome::Rejected {
    writeln!(out, "{NEED_MODE}")?;
    return Ok(());
  }
  print_selection(session, out)
}

fn bulk(
  session: &mut Session,
  out: &mut dyn Write,
  cmd: BulkCommand,
  tick: Tick
) -> anyhow::Result<()> {
  match cmd {
    | BulkCommand::Done => {
      if let Outcome::BulkUpdated(n) = session
        .apply(Action::BulkComplete, tick)?
      {
        writeln!(
          out,
          "Completed {n} task(s)."
        )?;
      }
    }
    | BulkCommand::Undo => {
      if let Outcome::BulkUpdated(n) = session
        .apply(Action::BulkUncomplete, tick)?
      {
        writeln!(
          out,
          "Reopened {n} task(s)."
        )?;
      }
    }
    | BulkCommand::Delete => {
      if let Outcome::BulkDeleted(result) =
        session
          .apply(Action::BulkDelete, tick)?
      {
        writeln!(
          out,
          "{}",
          describe_bulk_delete(result)
        )?;
      }
    }
  }
  Ok(())
}

fn print_selection(
  session: &Session,
  out: &mut dyn Write
) -> anyhow::Result<()> {
  session.renderer().print_selection(
    out,
    &session.app.selection_state()
  )
}

#[cfg(test)]
mod tests {
  use std::time::{
    Duration,
    Instant
  };

  use chrono::{
    DateTime,
    TimeZone,
    Utc
  };

  use super::{
    ShellFlow,
    execute_line,
    run_shell
  };
  use crate::app::{
    App,
    Tick
  };
  use crate::commands::Session;
  use crate::config::Config;
  use crate::due::LocalDueClassifier;
  use crate::export::DateRange;
  use crate::gateway::PersistenceGateway;
  use crate::prompt::ScriptedPrompter;
  use crate::render::Renderer;
  use crate::storage::MemoryStorage;
  use crate::store::OrderedTaskStore;

  fn wall(h: u32) -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2025, 9, 1, h, 0, 0)
      .unwrap()
  }

  fn session(answers: &[bool]) -> Session {
    let store = OrderedTaskStore::load(
      PersistenceGateway::new(
        MemoryStorage::default()
      ),
      wall(8)
    );
    let app = App::with_parts(
      store,
      Box::new(LocalDueClassifier::new(
        chrono_tz::UTC
      )),
      Duration::from_millis(300)
    );
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "color".to_string(),
      "off".to_string()
    )]);
    Session::new(
      app,
      Box::new(ScriptedPrompter::answering(
        answers.iter().copied()
      )),
      Renderer::new(&cfg, chrono_tz::UTC)
        .unwrap(),
      chrono_tz::UTC,
      DateRange::All
    )
  }

  fn run(
    session: &mut Session,
    line: &str,
    tick: Tick
  ) -> String {
    let mut out = Vec::new();
    assert_eq!(
      execute_line(
        session, line, &mut out, tick
      )
      .unwrap(),
      ShellFlow::Continue
    );
    String::from_utf8(out).unwrap()
  }

  fn texts(
    session: &Session
  ) -> Vec<String> {
    session
      .app
      .list()
      .into_iter()
      .map(|t| t.text)
      .collect()
  }

  #[test]
  fn range_select_then_bulk_delete() {
    let tick = Tick {
      wall: wall(9),
      mono: Instant::now()
    };
    let mut s = session(&[true]);
    for text in ["a", "b", "c", "d"] {
      run(
        &mut s,
        &format!("add {text}"),
        tick
      );
    }

    assert!(
      run(&mut s, "select 1", tick)
        .contains("Enter selection mode")
    );
    assert!(
      run(&mut s, "mode", tick)
        .contains("0 selected")
    );
    run(&mut s, "select 1", tick);
    assert!(
      run(&mut s, "shift 3", tick)
        .contains("3 selected (some)")
    );

    let view = run(&mut s, "view", tick);
    assert!(view.contains("[x]"));
    assert!(view.contains("[ ]"));

    assert_eq!(
      run(&mut s, "bulk delete", tick),
      "Deleted 3 task(s).\n"
    );
    assert_eq!(texts(&s), ["d"]);
    assert!(
      s.app
        .selection_state()
        .selected
        .is_empty()
    );
  }

  #[test]
  fn drag_and_drop_respects_filters() {
    let tick = Tick {
      wall: wall(9),
      mono: Instant::now()
    };
    let mut s = session(&[]);
    for text in ["a", "b", "c"] {
      run(
        &mut s,
        &format!("add {text}"),
        tick
      );
    }

    run(&mut s, "status incomplete", tick);
    run(&mut s, "drag 1", tick);
    assert!(
      run(&mut s, "drop 3 after", tick)
        .contains("Clear the filters")
    );
    assert_eq!(texts(&s), ["a", "b", "c"]);

    run(&mut s, "clear", tick);
    assert!(
      run(&mut s, "drop 3 after", tick)
        .contains("Nothing is being dragged")
    );
    run(&mut s, "drag 1", tick);
    assert_eq!(
      run(&mut s, "drop 3 after", tick),
      "Moved task 1.\n"
    );
    assert_eq!(texts(&s), ["b", "c", "a"]);
  }

  #[test]
  fn search_waits_for_the_quiet_period()
  {
    let start = Instant::now();
    let at = |ms: u64| Tick {
      wall: wall(9),
      mono: start
        + Duration::from_millis(ms)
    };
    let mut s = session(&[]);
    run(&mut s, "add milk", at(0));
    run(&mut s, "add bread", at(0));

    run(&mut s, "search mil", at(0));
    assert!(
      run(&mut s, "view", at(100))
        .contains("bread")
    );
    let later = run(&mut s, "view", at(400));
    assert!(later.contains("milk"));
    assert!(!later.contains("bread"));
  }

  #[test]
  fn loop_stops_on_quit_and_reports_errors()
  {
    let mut lines = vec![
      "bogus".to_string(),
      "delete 99".to_string(),
      "quit".to_string(),
    ]
    .into_iter();
    let mut next =
      move || -> std::io::Result<
        Option<String>
      > { Ok(lines.next()) };
    let mut s = session(&[]);
    let mut out = Vec::new();
    run_shell(&mut s, &mut next, &mut out)
      .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(
      text.contains(
        "error: unknown task id 99"
      )
    );
    assert_eq!(
      text.matches("ordo> ").count(),
      3
    );
  }
}
