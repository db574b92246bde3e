//! Core shared errors (renderer-agnostic).

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid scene description: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Failed to serialize scene description: {0}")]
    Serialize(#[from] ron::Error),
    #[error("Body '{body}' names parent '{parent}', which is not declared before it")]
    UnknownParent { body: String, parent: String },
    #[error("Body name '{0}' is used more than once")]
    DuplicateBody(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
