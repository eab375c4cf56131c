use std::collections::VecDeque;
use std::io::{
  self,
  Write
};

use tracing::{
  debug,
  warn
};

/// Blocking dialogs the engine asks before destructive or merge decisions.
pub trait Prompter {
  fn confirm(
    &mut self,
    message: &str
  ) -> bool;

  fn alert(&mut self, message: &str);
}

/// Asks on stderr and reads a `y`/`n` line from stdin. End of input counts
/// as "no".
#[derive(Debug, Default)]
pub struct StdioPrompter;

impl Prompter for StdioPrompter {
  fn confirm(
    &mut self,
    message: &str
  ) -> bool {
    let mut err = io::stderr().lock();
    let _ = write!(err, "{message} [y/N] ");
    let _ = err.flush();
    drop(err);

    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
      | Ok(0) => false,
      | Ok(_) => matches!(
        line
          .trim()
          .to_ascii_lowercase()
          .as_str(),
        "y" | "yes"
      ),
      | Err(err) => {
        warn!(error = %err, "failed reading confirmation; treating as no");
        false
      }
    }
  }

  fn alert(&mut self, message: &str) {
    println!("{message}");
  }
}

/// Answers every confirmation the same way without asking.
#[derive(Debug, Clone, Copy)]
pub struct AssumePrompter {
  pub answer: bool
}

impl Prompter for AssumePrompter {
  fn confirm(
    &mut self,
    message: &str
  ) -> bool {
    debug!(
      answer = self.answer,
      message,
      "auto-answered confirmation"
    );
    self.answer
  }

  fn alert(&mut self, message: &str) {
    println!("{message}");
  }
}

/// Replays canned answers and records what was asked. Runs out to "no".
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompter {
  answers:      VecDeque<bool>,
  pub confirms: Vec<String>,
  pub alerts:   Vec<String>
}

impl ScriptedPrompter {
  pub fn answering(
    answers: impl IntoIterator<Item = bool>
  ) -> Self {
    Self {
      answers: answers
        .into_iter()
        .collect(),
      ..Self::default()
    }
  }
}

impl Prompter for ScriptedPrompter {
  fn confirm(
    &mut self,
    message: &str
  ) -> bool {
    self
      .confirms
      .push(message.to_string());
    self
      .answers
      .pop_front()
      .unwrap_or(false)
  }

  fn alert(&mut self, message: &str) {
    self.alerts.push(message.to_string());
  }
}
