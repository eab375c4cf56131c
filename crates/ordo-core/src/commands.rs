use std::fs;
use std::io::{
  self,
  Read,
  Write
};
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono_tz::Tz;
use tracing::{
  debug,
  info,
  instrument
};

use crate::app::{
  Action,
  App,
  Outcome,
  Tick
};
use crate::bulk::BulkDelete;
use crate::cli::{
  CategoryCommand,
  ListArgs,
  TaskCommand
};
use crate::datetime::parse_due_input;
use crate::export::{
  DateRange,
  ExportKind,
  completion_streak,
  daily_completions,
  export_csv,
  export_file_name,
  export_json,
  statistics
};
use crate::filter::{
  StatusFilter,
  ViewQuery
};
use crate::import::ImportFormat;
use crate::prompt::Prompter;
use crate::reorder::{
  Direction,
  Moved,
  Position
};
use crate::render::Renderer;
use crate::task::{
  NewTask,
  TaskId,
  TaskPatch,
  parse_tags
};

/// Everything one CLI invocation or shell session needs: the controller plus
/// its presentation collaborators.
pub struct Session {
  pub app:      App,
  prompter:     Box<dyn Prompter>,
  renderer:     Renderer,
  tz:           Tz,
  export_range: DateRange
}

impl Session {
  pub fn new(
    app: App,
    prompter: Box<dyn Prompter>,
    renderer: Renderer,
    tz: Tz,
    export_range: DateRange
  ) -> Self {
    Self {
      app,
      prompter,
      renderer,
      tz,
      export_range
    }
  }

  pub fn renderer(&self) -> &Renderer {
    &self.renderer
  }

  /// Runs one action against the controller with this session's prompter.
  pub fn apply(
    &mut self,
    action: Action,
    tick: Tick
  ) -> anyhow::Result<Outcome> {
    Ok(self.app.apply(
      action,
      self.prompter.as_mut(),
      tick
    )?)
  }
}

#[instrument(skip(session, out, tick))]
pub fn dispatch(
  session: &mut Session,
  command: TaskCommand,
  out: &mut dyn Write,
  tick: Tick
) -> anyhow::Result<()> {
  match command {
    | TaskCommand::Add {
      text,
      category,
      tags,
      due
    } => cmd_add(
      session, out, text, category, tags,
      due, tick
    ),
    | TaskCommand::List(args) => {
      cmd_list(session, out, args, tick)
    }
    | TaskCommand::Done {
      id
    } => cmd_set_completed(
      session, out, id, true, tick
    ),
    | TaskCommand::Undo {
      id
    } => cmd_set_completed(
      session, out, id, false, tick
    ),
    | TaskCommand::Edit {
      id,
      text
    } => {
      let patch = TaskPatch {
        text: Some(text.join(" ")),
        ..TaskPatch::default()
      };
      if let Outcome::Updated(id) = session
        .apply(
          Action::Update {
            id,
            patch
          },
          tick
        )?
      {
        writeln!(out, "Modified task {id}.")?;
      }
      Ok(())
    }
    | TaskCommand::Delete {
      id
    } => {
      let _ = session
        .apply(Action::Delete(id), tick)?;
      writeln!(out, "Deleted task {id}.")?;
      Ok(())
    }
    | TaskCommand::Duplicate {
      id
    } => {
      if let Outcome::Duplicated(copy) =
        session.apply(
          Action::Duplicate(id),
          tick
        )?
      {
        writeln!(
          out,
          "Created task {copy} (copy of \
           {id})."
        )?;
      }
      Ok(())
    }
    | TaskCommand::Move {
      id,
      target,
      before,
      after: _
    } => {
      let position = if before {
        Position::Before
      } else {
        Position::After
      };
      let outcome = session.apply(
        Action::Move {
          dragged: id,
          target,
          position
        },
        tick
      )?;
      report_move(out, id, outcome)
    }
    | TaskCommand::Up {
      id
    } => cmd_step(
      session,
      out,
      id,
      Direction::Up,
      tick
    ),
    | TaskCommand::Down {
      id
    } => cmd_step(
      session,
      out,
      id,
      Direction::Down,
      tick
    ),
    | TaskCommand::Category(cmd) => {
      cmd_category(session, out, cmd, tick)
    }
    | TaskCommand::Stats {
      range
    } => cmd_stats(session, out, range, tick),
    | TaskCommand::Export {
      format,
      range,
      output
    } => cmd_export(
      session, out, format, range, output,
      tick
    ),
    | TaskCommand::Import {
      path,
      format
    } => cmd_import(
      session, out, &path, format, tick
    )
  }
}

#[instrument(skip(
  session, out, text, tags, tick
))]
fn cmd_add(
  session: &mut Session,
  out: &mut dyn Write,
  text: Vec<String>,
  category: Option<u64>,
  tags: Vec<String>,
  due: Option<String>,
  tick: Tick
) -> anyhow::Result<()> {
  info!("command add");

  let due_date = due
    .as_deref()
    .map(|raw| {
      parse_due_input(raw, &session.tz)
    })
    .transpose()?;
  let new = NewTask {
    text: text.join(" "),
    category_id: category,
    tags: tags
      .iter()
      .flat_map(|t| parse_tags(t))
      .collect(),
    due_date
  };

  match session
    .apply(Action::Add(new), tick)?
  {
    | Outcome::Added(id) => {
      writeln!(out, "Created task {id}.")?
    }
    | other => {
      debug!(?other, "add produced no task")
    }
  }
  Ok(())
}

#[instrument(skip(session, out, tick))]
fn cmd_list(
  session: &mut Session,
  out: &mut dyn Write,
  args: ListArgs,
  tick: Tick
) -> anyhow::Result<()> {
  let query = ViewQuery {
    status:      args
      .status
      .unwrap_or(StatusFilter::All),
    search:      args
      .search
      .unwrap_or_default(),
    category_id: args.category,
    tag:         args.tag,
    due_range:   args.due
  };
  let tasks = session
    .app
    .view_with(&query, tick.wall);
  debug!(
    visible = tasks.len(),
    "listing tasks"
  );

  session.renderer.print_task_table(
    out,
    &tasks,
    session.app.store().categories(),
    Some(&session.app.selection_state()),
    tick.wall
  )
}

fn cmd_set_completed(
  session: &mut Session,
  out: &mut dyn Write,
  id: TaskId,
  completed: bool,
  tick: Tick
) -> anyhow::Result<()> {
  let patch = TaskPatch {
    completed: Some(completed),
    ..TaskPatch::default()
  };
  let _ = session.apply(
    Action::Update {
      id,
      patch
    },
    tick
  )?;
  if completed {
    writeln!(out, "Completed task {id}.")?;
  } else {
    writeln!(out, "Reopened task {id}.")?;
  }
  Ok(())
}

fn cmd_step(
  session: &mut Session,
  out: &mut dyn Write,
  id: TaskId,
  direction: Direction,
  tick: Tick
) -> anyhow::Result<()> {
  if !session.app.store().contains(id) {
    return Err(anyhow!(
      "unknown task id {id}"
    ));
  }
  let outcome = session.apply(
    Action::MoveRelative {
      id,
      direction
    },
    tick
  )?;
  report_move(out, id, outcome)
}

pub(crate) fn report_move(
  out: &mut dyn Write,
  id: TaskId,
  outcome: Outcome
) -> anyhow::Result<()> {
  match outcome {
    | Outcome::Reordered(Moved::Moved) => {
      writeln!(out, "Moved task {id}.")?
    }
    | Outcome::Reordered(Moved::NoOp) => {
      writeln!(out, "Nothing to move.")?
    }
    | Outcome::Reordered(
      Moved::Blocked
    ) => writeln!(
      out,
      "Clear the filters before \
       reordering."
    )?,
    | other => debug!(
      ?other,
      "unexpected reorder outcome"
    )
  }
  Ok(())
}

#[instrument(skip(session, out, tick))]
fn cmd_category(
  session: &mut Session,
  out: &mut dyn Write,
  cmd: CategoryCommand,
  tick: Tick
) -> anyhow::Result<()> {
  match cmd {
    | CategoryCommand::Add {
      name,
      color
    } => {
      let action = Action::AddCategory {
        name: name.join(" "),
        color
      };
      if let Outcome::CategoryAdded(id) =
        session.apply(action, tick)?
      {
        writeln!(
          out,
          "Created category {id}."
        )?;
      }
    }
    | CategoryCommand::Rename {
      id,
      name
    } => {
      let _ = session.apply(
        Action::RenameCategory {
          id,
          name: name.join(" ")
        },
        tick
      )?;
      writeln!(
        out,
        "Renamed category {id}."
      )?;
    }
    | CategoryCommand::Delete {
      id
    } => {
      if let Outcome::CategoryDeleted {
        detached,
        ..
      } = session.apply(
        Action::DeleteCategory(id),
        tick
      )? {
        writeln!(
          out,
          "Deleted category {id}; \
           {detached} task(s) \
           uncategorized."
        )?;
      }
    }
    | CategoryCommand::List => {
      session.renderer.print_categories(
        out,
        session.app.store().categories()
      )?;
    }
  }
  Ok(())
}

fn cmd_stats(
  session: &mut Session,
  out: &mut dyn Write,
  range: Option<DateRange>,
  tick: Tick
) -> anyhow::Result<()> {
  let range =
    range.unwrap_or(session.export_range);
  let tasks = session.app.list();
  let stats = statistics(
    &tasks,
    range,
    tick.wall,
    &session.tz
  );
  let streak = completion_streak(
    &tasks,
    tick.wall,
    &session.tz
  );
  let daily = daily_completions(
    &tasks,
    tick.wall,
    &session.tz
  );
  session.renderer.print_stats(
    out, range, &stats, streak, &daily
  )
}

#[instrument(skip(session, out, tick))]
fn cmd_export(
  session: &mut Session,
  out: &mut dyn Write,
  kind: ExportKind,
  range: Option<DateRange>,
  output: Option<PathBuf>,
  tick: Tick
) -> anyhow::Result<()> {
  info!("command export");

  let range =
    range.unwrap_or(session.export_range);
  let tasks = session.app.list();
  let body = match kind {
    | ExportKind::Stats => export_json(
      &tasks,
      session.app.store().categories(),
      range,
      tick.wall,
      &session.tz
    )?,
    | ExportKind::Data => {
      export_csv(&tasks)?
    }
  };

  let path = output.unwrap_or_else(|| {
    PathBuf::from(export_file_name(
      kind, tick.wall
    ))
  });
  if path.as_os_str() == "-" {
    writeln!(out, "{}", body.trim_end())?;
    return Ok(());
  }

  fs::write(&path, body).with_context(
    || {
      format!(
        "failed to write {}",
        path.display()
      )
    }
  )?;
  writeln!(
    out,
    "Exported {} task(s) to {}.",
    tasks.len(),
    path.display()
  )?;
  Ok(())
}

#[instrument(skip(session, out, tick))]
fn cmd_import(
  session: &mut Session,
  out: &mut dyn Write,
  path: &Path,
  format: Option<ImportFormat>,
  tick: Tick
) -> anyhow::Result<()> {
  info!("command import");

  let format = format
    .or_else(|| {
      ImportFormat::from_path(path)
    })
    .ok_or_else(|| {
      anyhow!(
        "cannot tell the format of {}; \
         pass --format json or --format \
         csv",
        path.display()
      )
    })?;

  let payload = if path.as_os_str() == "-"
  {
    let mut buf = String::new();
    io::stdin()
      .read_to_string(&mut buf)
      .context(
        "failed reading import data from \
         stdin"
      )?;
    buf
  } else {
    fs::read_to_string(path).with_context(
      || {
        format!(
          "failed to read {}",
          path.display()
        )
      }
    )?
  };

  let outcome = session.apply(
    Action::Import {
      payload,
      format
    },
    tick
  )?;
  debug!(?outcome, "import finished");
  out.flush()?;
  Ok(())
}

/// Human-readable line for a bulk delete result.
pub(crate) fn describe_bulk_delete(
  result: BulkDelete
) -> String {
  match result {
    | BulkDelete::Empty => {
      "Nothing selected.".to_string()
    }
    | BulkDelete::Declined => {
      "Delete cancelled.".to_string()
    }
    | BulkDelete::Deleted(n) => {
      format!("Deleted {n} task(s).")
    }
  }
}
