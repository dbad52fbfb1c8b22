//! Reversible commands applied to a content store

use std::fmt;

use crate::content::ContentStore;
use crate::error::{CommandError, CommandResult};

/// A named, reversible mutation of a content store
///
/// `undo` followed by `redo` must reproduce exactly the bytes that existed
/// right after the original `execute`.
pub trait Command: fmt::Debug {
    /// Human-readable caption, e.g. for an "Undo ..." menu entry
    fn caption(&self) -> &str;

    /// Apply the command for the first time
    fn execute(&mut self, store: &mut ContentStore) -> CommandResult<()>;

    /// Revert the command
    fn undo(&mut self, store: &mut ContentStore) -> CommandResult<()>;

    /// Re-apply a reverted command
    fn redo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        self.execute(store)
    }

    fn can_undo(&self) -> bool {
        true
    }

    fn can_redo(&self) -> bool {
        true
    }
}

/// The basic byte edits
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditCommand {
    /// Insert `data` at `offset`
    Insert { offset: u64, data: Vec<u8> },
    /// Remove `len` bytes at `offset`; `removed` is captured on execute
    Remove {
        offset: u64,
        len: u64,
        removed: Vec<u8>,
    },
    /// Overwrite bytes at `offset`, possibly past the end; `replaced` is captured on execute
    Overwrite {
        offset: u64,
        data: Vec<u8>,
        replaced: Vec<u8>,
    },
}

impl EditCommand {
    pub fn insert(offset: u64, data: impl Into<Vec<u8>>) -> Self {
        EditCommand::Insert {
            offset,
            data: data.into(),
        }
    }

    pub fn remove(offset: u64, len: u64) -> Self {
        EditCommand::Remove {
            offset,
            len,
            removed: Vec::new(),
        }
    }

    pub fn overwrite(offset: u64, data: impl Into<Vec<u8>>) -> Self {
        EditCommand::Overwrite {
            offset,
            data: data.into(),
            replaced: Vec::new(),
        }
    }

    /// Describe a removal that was already applied to the store
    pub fn removed(offset: u64, removed: impl Into<Vec<u8>>) -> Self {
        let removed = removed.into();
        EditCommand::Remove {
            offset,
            len: removed.len() as u64,
            removed,
        }
    }

    /// Describe an overwrite that was already applied to the store.
    /// Only the first `data.len()` bytes of `replaced` were covered.
    pub fn overwritten(offset: u64, data: impl Into<Vec<u8>>, replaced: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let mut replaced = replaced.into();
        replaced.truncate(data.len());
        EditCommand::Overwrite {
            offset,
            data,
            replaced,
        }
    }
}

impl Command for EditCommand {
    fn caption(&self) -> &str {
        match self {
            EditCommand::Insert { .. } => "Insert data",
            EditCommand::Remove { .. } => "Remove data",
            EditCommand::Overwrite { .. } => "Modify data",
        }
    }

    fn execute(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        match self {
            EditCommand::Insert { offset, data } => store.insert(*offset, data)?,
            EditCommand::Remove {
                offset,
                len,
                removed,
            } => {
                let bytes = store.read(*offset, *len)?;
                store.remove(*offset, *len)?;
                *removed = bytes;
            }
            EditCommand::Overwrite {
                offset,
                data,
                replaced,
            } => {
                let available = store.size().saturating_sub(*offset);
                let bytes = store.read(*offset, (data.len() as u64).min(available))?;
                store.write(*offset, data)?;
                *replaced = bytes;
            }
        }
        Ok(())
    }

    fn undo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        match self {
            EditCommand::Insert { offset, data } => store.remove(*offset, data.len() as u64)?,
            EditCommand::Remove {
                offset, removed, ..
            } => store.insert(*offset, removed)?,
            EditCommand::Overwrite {
                offset,
                data,
                replaced,
            } => {
                store.write(*offset, replaced)?;
                let grown = data.len().saturating_sub(replaced.len()) as u64;
                if grown > 0 {
                    store.remove(*offset + replaced.len() as u64, grown)?;
                }
            }
        }
        Ok(())
    }
}

/// Several commands undone and redone as one history step
#[derive(Debug)]
pub struct CompoundCommand {
    caption: String,
    commands: Vec<Box<dyn Command>>,
}

impl CompoundCommand {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            commands: Vec::new(),
        }
    }

    /// Append a child command
    pub fn with(mut self, command: impl Command + 'static) -> Self {
        self.commands.push(Box::new(command));
        self
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for CompoundCommand {
    fn caption(&self) -> &str {
        &self.caption
    }

    /// Executes children in order. If one fails, the ones already applied
    /// are undone so the store is left as it was. When that rollback fails
    /// too, the original error comes back wrapped in `PartiallyApplied`.
    fn execute(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        for idx in 0..self.commands.len() {
            if let Err(e) = self.commands[idx].execute(store) {
                for applied in self.commands[..idx].iter_mut().rev() {
                    if let Err(rollback) = applied.undo(store) {
                        log::error!(
                            "Rolling back '{}' failed after '{}': {}",
                            self.caption,
                            e,
                            rollback
                        );
                        return Err(CommandError::PartiallyApplied(Box::new(e)));
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn undo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        for command in self.commands.iter_mut().rev() {
            command.undo(store)?;
        }
        Ok(())
    }

    fn redo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        for command in &mut self.commands {
            command.redo(store)?;
        }
        Ok(())
    }

    fn can_undo(&self) -> bool {
        self.commands.iter().all(|c| c.can_undo())
    }

    fn can_redo(&self) -> bool {
        self.commands.iter().all(|c| c.can_redo())
    }
}
