pub mod app;
pub mod bulk;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod debounce;
pub mod due;
pub mod error;
pub mod export;
pub mod filter;
pub mod gateway;
pub mod import;
pub mod prompt;
pub mod render;
pub mod reorder;
pub mod selection;
pub mod shell;
pub mod storage;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::io::{
  self,
  Write
};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::app::{
  App,
  Tick
};
use crate::cli::{
  Command,
  ListArgs,
  TaskCommand
};
use crate::config::ConfirmPolicy;
use crate::due::LocalDueClassifier;
use crate::gateway::PersistenceGateway;
use crate::prompt::{
  AssumePrompter,
  Prompter,
  StdioPrompter
};
use crate::storage::FileStorage;
use crate::store::OrderedTaskStore;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting ordo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.ordorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    FileStorage::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open storage at \
           {}",
          data_dir.display()
        )
      })?;

  let tz = *datetime::project_timezone();
  let store = OrderedTaskStore::load(
    PersistenceGateway::new(storage),
    Utc::now()
  );
  let app = App::with_parts(
    store,
    Box::new(LocalDueClassifier::new(
      tz
    )),
    cfg.search_debounce()?
  );

  let prompter: Box<dyn Prompter> =
    match cfg.confirm_policy()? {
      | ConfirmPolicy::Ask => {
        Box::new(StdioPrompter)
      }
      | ConfirmPolicy::AlwaysYes => {
        Box::new(AssumePrompter {
          answer: true
        })
      }
      | ConfirmPolicy::AlwaysNo => {
        Box::new(AssumePrompter {
          answer: false
        })
      }
    };

  let renderer =
    render::Renderer::new(&cfg, tz)?;
  let mut session =
    commands::Session::new(
      app,
      prompter,
      renderer,
      tz,
      cfg.export_range()?
    );

  let stdout = io::stdout();
  let mut out = stdout.lock();
  match cli.command {
    | Some(Command::Shell) => {
      let mut next_line =
        || -> io::Result<Option<String>> {
        let mut line = String::new();
        match io::stdin()
          .read_line(&mut line)?
        {
          | 0 => Ok(None),
          | _ => Ok(Some(line))
        }
      };
      shell::run_shell(
        &mut session,
        &mut next_line,
        &mut out
      )?;
    }
    | Some(Command::Task(cmd)) => {
      commands::dispatch(
        &mut session,
        cmd,
        &mut out,
        Tick::now()
      )?;
    }
    | None => {
      commands::dispatch(
        &mut session,
        TaskCommand::List(
          ListArgs::default()
        ),
        &mut out,
        Tick::now()
      )?;
    }
  }
  out.flush()?;

  info!("done");
  Ok(())
}
