//! Editor module: commands, undo history, and the editing session

pub mod command;
pub mod events;
mod history;
mod session;

pub use command::{Command, CompoundCommand, EditCommand};
pub use events::{EditListener, Listeners};
pub use history::{UndoHistory, DEFAULT_MAX_UNDO_STEPS};
pub use session::{EditingSession, UserChoice};
