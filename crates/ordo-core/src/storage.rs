use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info
};

/// String-keyed, string-valued durable storage, shaped like the browser's
/// `localStorage`.
pub trait KeyValueStorage {
  fn get_item(
    &self,
    key: &str
  ) -> anyhow::Result<Option<String>>;

  fn set_item(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()>;
}

/// One file per key inside a data directory. Writes go through a temp file
/// in the same directory and are renamed into place.
#[derive(Debug)]
pub struct FileStorage {
  pub data_dir: PathBuf
}

impl FileStorage {
  #[tracing::instrument(skip(data_dir))]
  pub fn open(
    data_dir: &Path
  ) -> anyhow::Result<Self> {
    let data_dir = data_dir.to_path_buf();
    fs::create_dir_all(&data_dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          data_dir.display()
        )
      })?;

    info!(data_dir = %data_dir.display(), "opened file storage");
    Ok(Self { data_dir })
  }

  pub fn path_for(
    &self,
    key: &str
  ) -> PathBuf {
    self
      .data_dir
      .join(format!("{key}.json"))
  }
}

impl KeyValueStorage for FileStorage {
  #[tracing::instrument(skip(self))]
  fn get_item(
    &self,
    key: &str
  ) -> anyhow::Result<Option<String>> {
    let path = self.path_for(key);
    if !path.exists() {
      debug!(file = %path.display(), "no stored value");
      return Ok(None);
    }
    let raw = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed reading {}",
          path.display()
        )
      })?;
    Ok(Some(raw))
  }

  #[tracing::instrument(skip(
    self, value
  ))]
  fn set_item(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let path = self.path_for(key);
    debug!(
      file = %path.display(),
      bytes = value.len(),
      "writing value atomically"
    );

    let mut temp =
      NamedTempFile::new_in(
        &self.data_dir
      )?;
    temp.write_all(value.as_bytes())?;
    temp.flush()?;
    temp.persist(&path).map_err(
      |err| {
        anyhow!(
          "failed to persist {}: {}",
          path.display(),
          err
        )
      }
    )?;
    Ok(())
  }
}

/// Volatile storage for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
  items: HashMap<String, String>
}

impl MemoryStorage {
  pub fn with_item(
    mut self,
    key: &str,
    value: &str
  ) -> Self {
    self.items.insert(
      key.to_string(),
      value.to_string()
    );
    self
  }
}

impl KeyValueStorage for MemoryStorage {
  fn get_item(
    &self,
    key: &str
  ) -> anyhow::Result<Option<String>> {
    Ok(self.items.get(key).cloned())
  }

  fn set_item(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    self.items.insert(
      key.to_string(),
      value.to_string()
    );
    Ok(())
  }
}
