use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::debounce::DEFAULT_SEARCH_DEBOUNCE;
use crate::export::DateRange;

const RC_ENV_VAR: &str = "ORDORC";
const RC_FILE_NAME: &str = ".ordorc";

/// How confirmation dialogs are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPolicy {
  Ask,
  AlwaysYes,
  AlwaysNo
}

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      ("data.location", "~/.ordo"),
      ("color", "on"),
      ("search.debounce", "300"),
      ("confirm", "ask"),
      ("export.daterange", "all")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(ordorc = %path.display(), "loading ordorc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no ordorc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn search_debounce(
    &self
  ) -> anyhow::Result<Duration> {
    match self.map.get("search.debounce")
    {
      | Some(raw) => {
        let ms: u64 =
          raw.trim().parse().with_context(
            || {
              format!(
                "search.debounce must be \
                 milliseconds, got {raw:?}"
              )
            }
          )?;
        Ok(Duration::from_millis(ms))
      }
      | None => {
        Ok(DEFAULT_SEARCH_DEBOUNCE)
      }
    }
  }

  pub fn confirm_policy(
    &self
  ) -> anyhow::Result<ConfirmPolicy> {
    let raw = self
      .get("confirm")
      .unwrap_or_else(|| "ask".into());
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "ask" => Ok(ConfirmPolicy::Ask),
      | "yes" => {
        Ok(ConfirmPolicy::AlwaysYes)
      }
      | "no" => {
        Ok(ConfirmPolicy::AlwaysNo)
      }
      | other => Err(anyhow!(
        "confirm must be ask, yes or \
         no, got {other:?}"
      ))
    }
  }

  pub fn export_range(
    &self
  ) -> anyhow::Result<DateRange> {
    let raw = self
      .get("export.daterange")
      .unwrap_or_else(|| "all".into());
    Ok(raw.parse()?)
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let mut active = Vec::new();
    self.load_nested(path, &mut active)
  }

  /// `active` holds the canonical paths of the files currently being
  /// read, outermost first.
  #[tracing::instrument(skip(
    self, active
  ))]
  fn load_nested(
    &mut self,
    path: &Path,
    active: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let canonical =
      fs::canonicalize(&path)
        .unwrap_or_else(|_| {
          path.clone()
        });
    if active.contains(&canonical) {
      return Err(anyhow!(
        "include cycle: {} is already \
         being loaded",
        path.display()
      ));
    }
    active.push(canonical);

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self.load_nested(
            &include_path,
            active
          )?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    active.pop();
    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  if let Some(xdg) = dirs::config_dir() {
    let candidate =
      xdg.join("ordo").join("ordorc");
    if candidate.exists() {
      return Ok(Some(candidate));
    }
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".ordo"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
