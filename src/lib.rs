//! binedit: an editing-session engine for binary documents
//!
//! A session keeps one open document in either an in-memory buffer or a
//! copy-on-write overlay over the file on disk, records every edit as an
//! undoable command, and can move the document between the two backings.

pub mod content;
pub mod editor;
pub mod error;
pub mod settings;

pub use content::{ContentStore, HandlingMode, SegmentsRepository};
pub use editor::{Command, EditCommand, EditingSession, UndoHistory, UserChoice};
pub use error::{CommandError, SessionError, StoreError};
pub use settings::SessionSettings;
