//! Error types for content stores, commands and editing sessions
//!
//! Programmer errors against the segments repository (double detach, closing
//! a source that is still attached) are not represented here: they panic,
//! because they mean an ownership invariant has already been broken.

use thiserror::Error;

/// Failure of a single content store operation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("range {offset}+{len} is out of bounds (document size {size})")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("document is read-only")]
    ReadOnly,
}

/// Failure while executing, undoing or redoing a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Command cannot be undone: {0}")]
    CannotUndo(String),

    #[error("Command cannot be redone: {0}")]
    CannotRedo(String),

    #[error("Undo history is inconsistent after a failed undo/redo; reload the document")]
    InconsistentHistory,

    #[error("Command failed half way and could not be rolled back: {0}")]
    PartiallyApplied(#[source] Box<CommandError>),
}

/// Failure of a session-level operation (open, save, mode switch)
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(StoreError),

    #[error("No document file is attached to this session")]
    NoDocument,
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Io(err) => SessionError::Io(err),
            other => SessionError::Store(other),
        }
    }
}

/// Result of a content store operation
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a command or history operation
pub type CommandResult<T> = Result<T, CommandError>;

/// Result of a session operation
pub type SessionResult<T> = Result<T, SessionError>;
