use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{
  ArgAction,
  Args,
  Parser,
  Subcommand
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::due::DueRange;
use crate::export::{
  DateRange,
  ExportKind
};
use crate::filter::StatusFilter;
use crate::import::ImportFormat;
use crate::reorder::Position;
use crate::task::{
  CategoryId,
  TaskId
};

pub const DEFAULT_CATEGORY_COLOR: &str =
  "#667eea";

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
  pub cleaned_args: Vec<OsString>,
  pub rc_overrides: Vec<(String, String)>
}

#[derive(Debug, Clone)]
pub struct KeyVal {
  pub key:   String,
  pub value: String
}

impl std::str::FromStr for KeyVal {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let (k, v) =
      s.split_once('=').ok_or_else(|| {
        anyhow!(
          "expected KEY=VALUE, got: {s}"
        )
      })?;
    Ok(Self {
      key:   k.trim().to_string(),
      value: v.trim().to_string()
    })
  }
}

#[derive(Parser, Debug, Clone)]
#[command(
  name = "ordo",
  version,
  about = "Ordo: an ordered task list with bulk editing",
  disable_help_subcommand = true
)]
pub struct GlobalCli {
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count
  )]
  pub verbose: u8,

  #[arg(
    short = 'q',
    long = "quiet",
    action = ArgAction::Count
  )]
  pub quiet: u8,

  #[arg(
    long = "rc",
    value_parser = clap::builder::ValueParser::new(
      |s: &str| s.parse::<KeyVal>()
    ),
    action = ArgAction::Append
  )]
  pub rc_overrides: Vec<KeyVal>,

  #[arg(long = "ordorc")]
  pub ordorc: Option<PathBuf>,

  #[arg(long = "data")]
  pub data: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Option<Command>
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  #[command(flatten)]
  Task(TaskCommand),

  /// Interactive session that keeps selection and drag state between lines.
  Shell
}

/// Commands available both from the command line and inside `shell`.
#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommand {
  /// Add a task at the end of the list.
  Add {
    #[arg(required = true, num_args = 1..)]
    text:     Vec<String>,
    #[arg(long)]
    category: Option<CategoryId>,
    #[arg(
      long = "tag",
      action = ArgAction::Append
    )]
    tags:     Vec<String>,
    /// YYYY-MM-DD, YYYY-MM-DDTHH:MM, or RFC 3339.
    #[arg(long)]
    due:      Option<String>
  },
  /// Show the list, optionally filtered.
  List(ListArgs),
  Done {
    id: TaskId
  },
  Undo {
    id: TaskId
  },
  Edit {
    id:   TaskId,
    #[arg(required = true, num_args = 1..)]
    text: Vec<String>
  },
  Delete {
    id: TaskId
  },
  Duplicate {
    id: TaskId
  },
  /// Place a task before or after another one.
  Move {
    id:     TaskId,
    target: TaskId,
    #[arg(
      long,
      conflicts_with = "after",
      required_unless_present = "after"
    )]
    before: bool,
    #[arg(long)]
    after:  bool
  },
  Up {
    id: TaskId
  },
  Down {
    id: TaskId
  },
  #[command(subcommand)]
  Category(CategoryCommand),
  Stats {
    #[arg(long)]
    range: Option<DateRange>
  },
  Export {
    /// `json` (statistics and data) or `csv` (data only).
    #[arg(long, default_value = "json")]
    format: ExportKind,
    #[arg(long)]
    range:  Option<DateRange>,
    /// Destination file; `-` writes to stdout. Defaults to a dated name.
    #[arg(long)]
    output: Option<PathBuf>
  },
  Import {
    /// Source file; `-` reads stdin and needs `--format`.
    path:   PathBuf,
    #[arg(long)]
    format: Option<ImportFormat>
  }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
  #[arg(long)]
  pub status:   Option<StatusFilter>,
  #[arg(long)]
  pub search:   Option<String>,
  #[arg(long)]
  pub category: Option<CategoryId>,
  #[arg(long)]
  pub tag:      Option<String>,
  #[arg(long)]
  pub due:      Option<DueRange>
}

#[derive(Subcommand, Debug, Clone)]
pub enum CategoryCommand {
  Add {
    #[arg(required = true, num_args = 1..)]
    name:  Vec<String>,
    #[arg(
      long,
      default_value = DEFAULT_CATEGORY_COLOR
    )]
    color: String
  },
  Rename {
    id:   CategoryId,
    #[arg(required = true, num_args = 1..)]
    name: Vec<String>
  },
  Delete {
    id: CategoryId
  },
  List
}

/// One line typed into `ordo shell`.
#[derive(Parser, Debug, Clone)]
#[command(
  name = "ordo",
  no_binary_name = true,
  disable_help_subcommand = true,
  disable_version_flag = true
)]
pub struct ShellLine {
  #[command(subcommand)]
  pub command: ShellCommand
}

#[derive(Subcommand, Debug, Clone)]
pub enum ShellCommand {
  #[command(flatten)]
  Task(TaskCommand),

  /// Enter or leave selection mode. Either way the selection is cleared.
  Mode,
  /// Toggle one task in the selection.
  Select {
    id:    TaskId,
    #[arg(long)]
    shift: bool
  },
  /// Select the range from the last clicked task to this one.
  Shift {
    id: TaskId
  },
  #[command(name = "all")]
  SelectAll,
  #[command(name = "none")]
  SelectNone,
  #[command(subcommand)]
  Bulk(BulkCommand),
  Drag {
    id: TaskId
  },
  Drop {
    target:   TaskId,
    position: Position
  },
  Cancel,
  Search {
    query: Vec<String>
  },
  Status {
    status: StatusFilter
  },
  Filter {
    #[arg(long)]
    category: Option<CategoryId>,
    #[arg(long)]
    tag:      Option<String>,
    #[arg(long)]
    due:      Option<DueRange>
  },
  Clear,
  /// Show the filtered view with selection markers.
  View,
  #[command(alias = "exit")]
  Quit
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum BulkCommand {
  Done,
  Undo,
  Delete
}

pub fn init_tracing(
  verbose: u8,
  quiet: u8
) -> anyhow::Result<()> {
  let default_level = if quiet >= 2 {
    "error"
  } else if quiet == 1 {
    "warn"
  } else if verbose >= 3 {
    "trace"
  } else if verbose == 2 {
    "debug"
  } else if verbose == 1 {
    "info"
  } else {
    "warn"
  };

  let env_filter =
    EnvFilter::try_from_default_env()
      .or_else(|_| {
        EnvFilter::try_new(default_level)
      })
      .map_err(|e| {
        anyhow!(
          "invalid RUST_LOG / log filter: \
           {e}"
        )
      })?;

  let init_result =
    tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_level(true)
      .with_writer(std::io::stderr)
      .with_ansi(
        std::io::stderr().is_terminal()
      )
      .try_init();

  if let Err(err) = init_result {
    debug!(error = %err, "tracing subscriber already set, continuing");
  }

  Ok(())
}

/// Pulls positional `rc.key=value` (or `rc.key:value`) overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(
  raw: &[OsString]
) -> anyhow::Result<PreprocessedArgs> {
  let mut cleaned =
    Vec::with_capacity(raw.len());
  let mut overrides: Vec<(
    String,
    String
  )> = Vec::new();

  let mut iter = raw.iter().cloned();
  if let Some(bin) = iter.next() {
    cleaned.push(bin);
  }

  for arg in iter {
    let s = arg.to_string_lossy();
    if let Some(rest) = s.strip_prefix("rc.")
    {
      let parsed = rest
        .split_once('=')
        .or_else(|| rest.split_once(':'))
        .map(|(k, v)| {
          (format!("rc.{k}"), v.to_string())
        });

      if let Some((k, v)) = parsed {
        debug!(key = %k, value = %v, "captured positional rc override");
        overrides.push((k, v));
        continue;
      }
    }

    cleaned.push(arg);
  }

  Ok(PreprocessedArgs {
    cleaned_args: cleaned,
    rc_overrides: overrides
  })
}

/// Splits a shell line into words. Double quotes group words and `""` inside
/// quotes is a literal quote.
pub fn split_words(
  line: &str
) -> Vec<String> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut in_quotes = false;
  let mut quoted = false;
  let mut chars = line.chars().peekable();

  while let Some(ch) = chars.next() {
    match ch {
      | '"'
        if in_quotes
          && chars.peek() == Some(&'"') =>
      {
        current.push('"');
        chars.next();
      }
      | '"' => {
        in_quotes = !in_quotes;
        quoted = true;
      }
      | c if c.is_whitespace()
        && !in_quotes =>
      {
        if !current.is_empty() || quoted {
          words.push(std::mem::take(
            &mut current
          ));
        }
        quoted = false;
      }
      | c => current.push(c)
    }
  }
  if !current.is_empty() || quoted {
    words.push(current);
  }
  words
}
