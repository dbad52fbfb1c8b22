//! Undo/redo history management
//!
//! The history is a linear list of applied commands with a cursor
//! (`command_position`) and a sync point (the position at the last save).
//! Commands before the cursor can be undone, commands after it redone.
//! Recording a new command after an undo discards the redoable tail.
//!
//! ```text
//! commands:  [c0] [c1] [c2] [c3]
//!                        ^ position = 3 (c0..c2 applied, c3 redoable)
//!             sync point = 1  -> modified
//! ```

use std::collections::VecDeque;
use std::rc::Rc;

use super::command::Command;
use super::events::{EditListener, Listeners};
use crate::content::ContentStore;
use crate::error::{CommandError, CommandResult};

/// Default maximum number of commands kept in history
pub const DEFAULT_MAX_UNDO_STEPS: usize = 1000;

/// Linear undo/redo history
#[derive(Debug)]
pub struct UndoHistory {
    /// Recorded commands, oldest first
    commands: VecDeque<Box<dyn Command>>,

    /// Number of commands currently applied, counted from the oldest kept one
    position: usize,

    /// Position at the last save; `None` once that state can no longer be reached
    sync_point: Option<usize>,

    /// Maximum number of commands kept; `None` means unbounded
    limit: Option<usize>,

    /// Cleared when an undo/redo step failed half way
    consistent: bool,

    listeners: Listeners,
}

impl UndoHistory {
    /// Create a new empty history with the default size limit
    pub fn new() -> Self {
        Self::with_limit(Some(DEFAULT_MAX_UNDO_STEPS))
    }

    /// Create a new empty history keeping at most `limit` commands
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            commands: VecDeque::new(),
            position: 0,
            sync_point: Some(0),
            limit,
            consistent: true,
            listeners: Listeners::default(),
        }
    }

    /// Change the size limit, dropping the oldest commands if needed
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
        if self.trim_to_limit() {
            self.listeners.position_changed(self.position);
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    // ========== Recording ==========

    /// Execute a command against `store` and record it
    ///
    /// If the command fails it is not recorded and the position is unchanged.
    /// A command that fails without restoring the store marks the history
    /// inconsistent.
    pub fn execute(
        &mut self,
        store: &mut ContentStore,
        mut command: Box<dyn Command>,
    ) -> CommandResult<()> {
        self.ensure_consistent()?;
        if let Err(e) = command.execute(store) {
            if matches!(e, CommandError::PartiallyApplied(_)) {
                log::error!("'{}' left the document half edited, history is now inconsistent", command.caption());
                self.consistent = false;
            }
            return Err(e);
        }
        self.record(command);
        Ok(())
    }

    /// Record a command whose effect has already been applied to the store
    pub fn add_command(&mut self, command: Box<dyn Command>) -> CommandResult<()> {
        self.ensure_consistent()?;
        self.record(command);
        Ok(())
    }

    fn record(&mut self, command: Box<dyn Command>) {
        // Branching history not supported: drop the redoable tail
        if self.position < self.commands.len() {
            self.commands.truncate(self.position);
            if self.sync_point.is_some_and(|sync| sync > self.position) {
                self.sync_point = None;
            }
        }

        let caption = command.caption().to_string();
        self.commands.push_back(command);
        self.position += 1;
        self.trim_to_limit();

        self.listeners.command_added(&caption);
        self.listeners.position_changed(self.position);
    }

    /// Drop the oldest commands beyond the limit. Returns whether anything was dropped.
    fn trim_to_limit(&mut self) -> bool {
        let Some(limit) = self.limit else {
            return false;
        };
        let mut trimmed = false;
        while self.commands.len() > limit {
            self.commands.pop_front();
            self.position = self.position.saturating_sub(1);
            self.sync_point = self.sync_point.and_then(|sync| sync.checked_sub(1));
            trimmed = true;
        }
        trimmed
    }

    fn ensure_consistent(&self) -> CommandResult<()> {
        if self.consistent {
            Ok(())
        } else {
            Err(CommandError::InconsistentHistory)
        }
    }

    // ========== Undo / Redo ==========

    /// Undo the command just before the cursor
    ///
    /// If the command's undo fails the position is unchanged and the history
    /// is marked inconsistent: the store may be half reverted.
    pub fn undo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        self.ensure_consistent()?;
        if self.position == 0 {
            return Err(CommandError::NothingToUndo);
        }
        let command = &mut self.commands[self.position - 1];
        if !command.can_undo() {
            return Err(CommandError::CannotUndo(command.caption().to_string()));
        }
        if let Err(e) = command.undo(store) {
            log::error!("Undo of '{}' failed, history is now inconsistent: {}", command.caption(), e);
            self.consistent = false;
            return Err(e);
        }
        self.position -= 1;
        self.listeners.position_changed(self.position);
        Ok(())
    }

    /// Redo the command just after the cursor
    pub fn redo(&mut self, store: &mut ContentStore) -> CommandResult<()> {
        self.ensure_consistent()?;
        if self.position >= self.commands.len() {
            return Err(CommandError::NothingToRedo);
        }
        let command = &mut self.commands[self.position];
        if !command.can_redo() {
            return Err(CommandError::CannotRedo(command.caption().to_string()));
        }
        if let Err(e) = command.redo(store) {
            log::error!("Redo of '{}' failed, history is now inconsistent: {}", command.caption(), e);
            self.consistent = false;
            return Err(e);
        }
        self.position += 1;
        self.listeners.position_changed(self.position);
        Ok(())
    }

    /// Undo `count` commands one at a time, stopping at the first failure
    pub fn undo_steps(&mut self, store: &mut ContentStore, count: usize) -> CommandResult<()> {
        for _ in 0..count {
            self.undo(store)?;
        }
        Ok(())
    }

    /// Redo `count` commands one at a time, stopping at the first failure
    pub fn redo_steps(&mut self, store: &mut ContentStore, count: usize) -> CommandResult<()> {
        for _ in 0..count {
            self.redo(store)?;
        }
        Ok(())
    }

    /// Move the cursor to `target` by undoing or redoing single steps
    pub fn set_command_position(
        &mut self,
        store: &mut ContentStore,
        target: usize,
    ) -> CommandResult<()> {
        if target > self.commands.len() {
            return Err(CommandError::NothingToRedo);
        }
        if target < self.position {
            self.undo_steps(store, self.position - target)
        } else {
            self.redo_steps(store, target - self.position)
        }
    }

    // ========== Sync point ==========

    /// Mark the current position as the saved state
    pub fn set_sync_point(&mut self) {
        self.sync_point = Some(self.position);
        self.listeners.position_changed(self.position);
    }

    /// Drop all commands and reset position and sync point to 0
    pub fn clear(&mut self) {
        self.commands.clear();
        self.position = 0;
        self.sync_point = Some(0);
        self.consistent = true;
        self.listeners.position_changed(self.position);
    }

    /// Whether the current position differs from the last saved one
    pub fn is_modified(&self) -> bool {
        self.sync_point != Some(self.position)
    }

    // ========== Queries ==========

    /// Number of commands currently applied
    pub fn command_position(&self) -> usize {
        self.position
    }

    /// Position at the last save, `None` if it fell out of the history
    pub fn sync_point(&self) -> Option<usize> {
        self.sync_point
    }

    /// Number of recorded commands (applied and redoable)
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        self.consistent
            && self.position > 0
            && self.commands[self.position - 1].can_undo()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        self.consistent
            && self.position < self.commands.len()
            && self.commands[self.position].can_redo()
    }

    /// Caption of the command the next undo would revert
    pub fn undo_caption(&self) -> Option<&str> {
        self.position
            .checked_sub(1)
            .and_then(|idx| self.commands.get(idx))
            .map(|c| c.caption())
    }

    /// Caption of the command the next redo would re-apply
    pub fn redo_caption(&self) -> Option<&str> {
        self.commands.get(self.position).map(|c| c.caption())
    }

    // ========== Listeners ==========

    pub fn add_listener(&mut self, listener: Rc<dyn EditListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&mut self, listener: &Rc<dyn EditListener>) {
        self.listeners.remove(listener);
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}
