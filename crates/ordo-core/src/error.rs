use thiserror::Error;

use crate::task::{
  CategoryId,
  TaskId
};

/// Failures raised by the task engine itself.
///
/// Storage parse failures never show up here: the gateway recovers from them
/// and hands back an empty collection.
#[derive(
  Debug, Error, Clone, PartialEq, Eq,
)]
pub enum TodoError {
  #[error("task text cannot be empty")]
  EmptyText,

  #[error("unknown task id {0}")]
  UnknownTask(TaskId),

  #[error("unknown category id {0}")]
  UnknownCategory(CategoryId),

  #[error(
    "category name cannot be empty"
  )]
  EmptyCategoryName,

  #[error(
    "invalid category color {0:?}; \
     expected #RRGGBB"
  )]
  InvalidColor(String),

  #[error("import failed: {0}")]
  ImportFormat(String),

  #[error("invalid {kind}: {value:?}")]
  InvalidValue {
    kind:  &'static str,
    value: String
  }
}

impl TodoError {
  pub(crate) fn invalid(
    kind: &'static str,
    value: &str
  ) -> Self {
    Self::InvalidValue {
      kind,
      value: value.to_string()
    }
  }
}
