//! Editing session: one open document, its backing store and its history
//!
//! The session exclusively owns its current [`ContentStore`]. Replacing the
//! store (open, close, mode switch) is the only place a store is disposed,
//! and a replacement store is always fully loaded before the old one goes
//! away, so a failed open leaves the session exactly as it was.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::command::Command;
use super::events::EditListener;
use super::history::UndoHistory;
use crate::content::{ContentStore, HandlingMode, RepositoryHandle};
use crate::error::{CommandError, CommandResult, SessionError, SessionResult, StoreError, StoreResult};
use crate::settings::SessionSettings;

/// Answer to "the document has unsaved changes" before a reload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserChoice {
    /// Save first, then continue
    Save,
    /// Drop the changes and continue
    Discard,
    /// Abort the operation
    Cancel,
}

/// State of one open binary document
#[derive(Debug)]
pub struct EditingSession {
    repository: RepositoryHandle,
    store: ContentStore,
    history: UndoHistory,

    /// Document identity used by `save`; `None` for unnamed documents
    document_path: Option<PathBuf>,

    /// Whether the document was opened for writing
    writable: bool,
}

impl EditingSession {
    /// Create a session holding an empty, unnamed, writable document
    pub fn new(repository: RepositoryHandle) -> Self {
        Self {
            repository,
            store: ContentStore::empty(),
            history: UndoHistory::new(),
            document_path: None,
            writable: true,
        }
    }

    /// Create a session configured from user settings
    pub fn with_settings(repository: RepositoryHandle, settings: &SessionSettings) -> Self {
        let mut session = Self::new(repository);
        session.history.set_limit(settings.max_undo_steps);
        session
    }

    // ========== Accessors ==========

    /// Which backing currently holds the document
    pub fn handling_mode(&self) -> HandlingMode {
        self.store.handling_mode()
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document_path.as_deref()
    }

    pub fn is_writable(&self) -> bool {
        self.store.is_writable()
    }

    pub fn content(&self) -> &ContentStore {
        &self.store
    }

    /// Direct access to the store, for edits recorded with [`Self::add_command`]
    pub fn content_mut(&mut self) -> &mut ContentStore {
        &mut self.store
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    pub fn document_size(&self) -> u64 {
        self.store.size()
    }

    pub fn read(&self, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        self.store.read(offset, len)
    }

    /// Whether the history position differs from the last save
    pub fn is_modified(&self) -> bool {
        self.history.is_modified()
    }

    /// Modified, or not yet saved anywhere
    pub fn has_unsaved_changes(&self) -> bool {
        self.is_modified() || self.document_path.is_none()
    }

    pub fn add_listener(&mut self, listener: Rc<dyn EditListener>) {
        self.history.add_listener(listener);
    }

    pub fn remove_listener(&mut self, listener: &Rc<dyn EditListener>) {
        self.history.remove_listener(listener);
    }

    fn notify_size(&self) {
        self.history.listeners().size_changed(self.store.size());
    }

    /// Install `store` as current and dispose the previous one
    fn replace_store(&mut self, store: ContentStore) {
        let old = std::mem::replace(&mut self.store, store);
        old.dispose();
    }

    fn reset_history(&mut self) {
        self.history.clear();
        self.history.set_sync_point();
    }

    // ========== Open / Save / Close ==========

    /// Open `path` under `mode`, replacing the current document
    ///
    /// On failure the previous document stays current and undisposed.
    pub fn open(
        &mut self,
        path: impl Into<PathBuf>,
        writable: bool,
        mode: HandlingMode,
    ) -> SessionResult<()> {
        let path = path.into();
        let store = ContentStore::load(&path, writable, mode, &self.repository)?;
        self.replace_store(store);

        log::info!(
            "Opened {} ({} bytes, {} mode{})",
            path.display(),
            self.store.size(),
            mode,
            if writable { "" } else { ", read-only" }
        );
        self.document_path = Some(path);
        self.writable = writable;
        self.reset_history();
        self.notify_size();
        Ok(())
    }

    /// Load an unnamed document from a stream
    pub fn open_stream(&mut self, reader: impl Read, mode: HandlingMode) -> SessionResult<()> {
        let store = ContentStore::from_reader(reader, mode, &self.repository)?;
        self.replace_store(store);

        log::info!("Opened stream ({} bytes, {} mode)", self.store.size(), mode);
        self.document_path = None;
        self.writable = true;
        self.reset_history();
        self.notify_size();
        Ok(())
    }

    /// Replace the document with an empty, unnamed one
    pub fn new_document(&mut self, mode: HandlingMode) -> SessionResult<()> {
        let store = ContentStore::empty_of(mode, &self.repository)?;
        self.replace_store(store);

        log::info!("New document ({} mode)", mode);
        self.document_path = None;
        self.writable = true;
        self.reset_history();
        self.notify_size();
        Ok(())
    }

    /// Attach a document identity without any I/O
    pub fn set_document_path(&mut self, path: impl Into<PathBuf>) {
        self.document_path = Some(path.into());
    }

    /// Write the document back to its file
    ///
    /// On failure the sync point does not move and the document stays modified.
    pub fn save(&mut self) -> SessionResult<()> {
        let path = self.document_path.clone().ok_or(SessionError::NoDocument)?;
        if !self.store.is_writable() {
            return Err(StoreError::ReadOnly.into());
        }

        self.store.flush(&path, &self.repository)?;
        self.history.set_sync_point();
        log::info!("Saved {} ({} bytes)", path.display(), self.store.size());
        Ok(())
    }

    /// Write the document to `path` and make it the document identity
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> SessionResult<()> {
        let path = path.into();
        if !self.store.is_writable() {
            return Err(StoreError::ReadOnly.into());
        }

        self.store.flush(&path, &self.repository)?;
        self.history.set_sync_point();
        log::info!("Saved as {} ({} bytes)", path.display(), self.store.size());
        self.document_path = Some(path);
        Ok(())
    }

    /// Dispose the current store and leave an empty one in its place
    ///
    /// History is left as is; a closed session is expected to be discarded.
    pub fn close(&mut self) {
        self.replace_store(ContentStore::empty());
        if let Some(path) = self.document_path.take() {
            log::info!("Closed {}", path.display());
        }
        self.writable = true;
        self.notify_size();
    }

    /// Move the document to another backing
    ///
    /// A document with a file is reloaded from disk under `mode`; if it is
    /// modified, `confirm` decides whether to save first, discard, or abort.
    /// An unnamed document has its bytes copied into a new store. Either way
    /// the history is reset and the document ends up unmodified.
    pub fn switch_handling_mode<F>(&mut self, mode: HandlingMode, mut confirm: F) -> SessionResult<()>
    where
        F: FnMut() -> UserChoice,
    {
        let current = self.handling_mode();
        if mode == current {
            return Ok(());
        }

        if let Some(path) = self.document_path.clone() {
            if self.is_modified() {
                match confirm() {
                    UserChoice::Cancel => {
                        log::debug!("Switch to {} mode cancelled", mode);
                        return Ok(());
                    }
                    UserChoice::Save => self.save()?,
                    UserChoice::Discard => {
                        log::info!("Discarding changes to {}", path.display());
                    }
                }
            }
            self.open(path, self.writable, mode)?;
        } else {
            let mut store = ContentStore::empty_of(mode, &self.repository)?;
            if let Err(e) = store.insert_all_from(&self.store) {
                store.dispose();
                return Err(e.into());
            }
            self.replace_store(store);
            self.writable = true;
            self.history.clear();
            self.notify_size();
        }

        log::info!("Switched handling mode from {} to {}", current, mode);
        Ok(())
    }

    // ========== Commands ==========

    /// Execute a command against the document and record it
    pub fn execute<C: Command + 'static>(&mut self, command: C) -> CommandResult<()> {
        self.history.execute(&mut self.store, Box::new(command))?;
        self.notify_size();
        Ok(())
    }

    /// Record a command whose edit was already applied through [`Self::content_mut`]
    pub fn add_command<C: Command + 'static>(&mut self, command: C) -> CommandResult<()> {
        self.history.add_command(Box::new(command))?;
        self.notify_size();
        Ok(())
    }

    pub fn undo(&mut self) -> CommandResult<()> {
        self.history.undo(&mut self.store)?;
        self.notify_size();
        Ok(())
    }

    pub fn redo(&mut self) -> CommandResult<()> {
        self.history.redo(&mut self.store)?;
        self.notify_size();
        Ok(())
    }

    /// Undo `count` steps; stops at the first failure
    pub fn undo_steps(&mut self, count: usize) -> CommandResult<()> {
        for _ in 0..count {
            self.undo()?;
        }
        Ok(())
    }

    /// Redo `count` steps; stops at the first failure
    pub fn redo_steps(&mut self, count: usize) -> CommandResult<()> {
        for _ in 0..count {
            self.redo()?;
        }
        Ok(())
    }

    /// Undo or redo single steps until the history cursor is at `target`
    pub fn set_command_position(&mut self, target: usize) -> CommandResult<()> {
        if target > self.history.command_count() {
            return Err(CommandError::NothingToRedo);
        }
        let position = self.history.command_position();
        if target < position {
            self.undo_steps(position - target)
        } else {
            self.redo_steps(target - position)
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_caption(&self) -> Option<&str> {
        self.history.undo_caption()
    }

    pub fn redo_caption(&self) -> Option<&str> {
        self.history.redo_caption()
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        let store = std::mem::replace(&mut self.store, ContentStore::empty());
        store.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SegmentsRepository;
    use crate::editor::command::{CompoundCommand, EditCommand};
    use crate::editor::events::testing::RecordingListener;

    fn fixture(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.bin");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn contents(session: &EditingSession) -> Vec<u8> {
        session.read(0, session.document_size()).unwrap()
    }

    fn never_asked() -> UserChoice {
        panic!("confirmation requested for an unmodified document")
    }

    #[test]
    fn test_save_requires_document_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = EditingSession::new(SegmentsRepository::shared());

        session.execute(EditCommand::insert(0, b"abc".to_vec())).unwrap();
        assert!(session.is_modified());
        assert_eq!(session.document_size(), 3);

        assert!(matches!(session.save(), Err(SessionError::NoDocument)));
        assert!(session.is_modified());

        let path = dir.path().join("new.bin");
        session.set_document_path(&path);
        session.save().unwrap();

        assert!(!session.is_modified());
        assert!(!session.has_unsaved_changes());
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_delta_remove_then_undo_restores_file_bytes() {
        let (_dir, path) = fixture(b"0123456789");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Delta).unwrap();

        session.execute(EditCommand::remove(0, 5)).unwrap();
        assert_eq!(session.document_size(), 5);

        session.undo().unwrap();
        assert_eq!(session.document_size(), 10);
        assert_eq!(contents(&session), b"0123456789");
        assert!(!session.is_modified());
        // Editing never touched the file itself
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    }

    #[test]
    fn test_open_starts_unmodified() {
        let (_dir, path) = fixture(b"abc");
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();

        session.open(&path, true, HandlingMode::Memory).unwrap();

        assert!(!session.is_modified());
        assert_eq!(session.history().command_count(), 0);
        assert_eq!(session.document_path(), Some(path.as_path()));
        assert_eq!(contents(&session), b"abc");
    }

    #[test]
    fn test_failed_open_keeps_current_document() {
        let (dir, path) = fixture(b"keep me");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Delta).unwrap();
        session.execute(EditCommand::insert(0, b">".to_vec())).unwrap();

        let result = session.open(dir.path().join("missing.bin"), true, HandlingMode::Delta);

        assert!(matches!(result, Err(SessionError::Io(_))));
        assert_eq!(contents(&session), b">keep me");
        assert_eq!(session.document_path(), Some(path.as_path()));
        assert!(session.is_modified());
        assert_eq!(repo.borrow().source_count(), 1);
    }

    #[test]
    fn test_save_writes_edits_and_clears_modified() {
        let (_dir, path) = fixture(b"0123456789");
        for mode in [HandlingMode::Memory, HandlingMode::Delta] {
            std::fs::write(&path, b"0123456789").unwrap();
            let mut session = EditingSession::new(SegmentsRepository::shared());
            session.open(&path, true, mode).unwrap();
            session.execute(EditCommand::overwrite(8, b"XYZ".to_vec())).unwrap();
            session.execute(EditCommand::remove(0, 2)).unwrap();

            session.save().unwrap();

            assert!(!session.is_modified(), "{mode}");
            assert_eq!(std::fs::read(&path).unwrap(), b"234567XYZ", "{mode}");

            // Undoing after a save makes the document dirty again
            session.undo().unwrap();
            assert!(session.is_modified());
        }
    }

    #[test]
    fn test_failed_save_keeps_document_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.execute(EditCommand::insert(0, b"data".to_vec())).unwrap();
        session.set_document_path(dir.path().join("no-such-dir").join("out.bin"));

        assert!(session.save().is_err());

        assert!(session.is_modified());
        assert_eq!(contents(&session), b"data");
    }

    #[test]
    fn test_read_only_document_cannot_be_saved() {
        let (_dir, path) = fixture(b"abc");
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.open(&path, false, HandlingMode::Memory).unwrap();

        assert!(!session.is_writable());
        assert!(matches!(
            session.execute(EditCommand::insert(0, b"x".to_vec())),
            Err(CommandError::Store(StoreError::ReadOnly))
        ));
        assert!(matches!(session.save(), Err(SessionError::Store(StoreError::ReadOnly))));
        assert_eq!(session.history().command_count(), 0);
    }

    #[test]
    fn test_save_as_moves_identity() {
        let (dir, path) = fixture(b"original");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Delta).unwrap();
        session.execute(EditCommand::insert(8, b"+".to_vec())).unwrap();

        let copy = dir.path().join("copy.bin");
        session.save_as(&copy).unwrap();

        assert_eq!(session.document_path(), Some(copy.as_path()));
        assert!(!session.is_modified());
        assert_eq!(std::fs::read(&copy).unwrap(), b"original+");
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
        assert_eq!(session.content().backing_path(), Some(copy.clone()));
        assert_eq!(repo.borrow().source_count(), 1);
    }

    #[test]
    fn test_switch_cancel_changes_nothing() {
        let (_dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Memory).unwrap();
        session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();

        let mut asked = 0;
        session
            .switch_handling_mode(HandlingMode::Delta, || {
                asked += 1;
                UserChoice::Cancel
            })
            .unwrap();

        assert_eq!(asked, 1);
        assert_eq!(session.handling_mode(), HandlingMode::Memory);
        assert!(session.is_modified());
        assert_eq!(contents(&session), b"xabc");
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[test]
    fn test_switch_discard_reloads_saved_state() {
        let (_dir, path) = fixture(b"abc");
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.open(&path, true, HandlingMode::Memory).unwrap();
        session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();

        session
            .switch_handling_mode(HandlingMode::Delta, || UserChoice::Discard)
            .unwrap();

        assert_eq!(session.handling_mode(), HandlingMode::Delta);
        assert!(!session.is_modified());
        assert_eq!(contents(&session), b"abc");
        assert!(!session.can_undo());
    }

    #[test]
    fn test_switch_save_keeps_edits() {
        let (_dir, path) = fixture(b"abc");
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.open(&path, true, HandlingMode::Delta).unwrap();
        session.execute(EditCommand::remove(1, 1)).unwrap();

        session
            .switch_handling_mode(HandlingMode::Memory, || UserChoice::Save)
            .unwrap();

        assert_eq!(session.handling_mode(), HandlingMode::Memory);
        assert!(!session.is_modified());
        assert_eq!(contents(&session), b"ac");
        assert_eq!(std::fs::read(&path).unwrap(), b"ac");
    }

    #[test]
    fn test_switch_save_failure_keeps_mode() {
        let (dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Memory).unwrap();
        session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();
        session.set_document_path(dir.path().join("missing-dir").join("document.bin"));

        let result = session.switch_handling_mode(HandlingMode::Delta, || UserChoice::Save);

        assert!(matches!(result, Err(SessionError::Io(_))));
        assert_eq!(session.handling_mode(), HandlingMode::Memory);
        assert!(session.is_modified());
        assert_eq!(contents(&session), b"xabc");
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[test]
    fn test_switch_reload_failure_keeps_memory_store() {
        let (_dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Memory).unwrap();
        session.execute(EditCommand::insert(3, b"!".to_vec())).unwrap();
        std::fs::remove_file(&path).unwrap();

        let result = session.switch_handling_mode(HandlingMode::Delta, || UserChoice::Discard);

        assert!(matches!(result, Err(SessionError::Io(_))));
        assert_eq!(session.handling_mode(), HandlingMode::Memory);
        assert_eq!(contents(&session), b"abc!");
        assert!(session.is_modified());
        assert!(session.can_undo());
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_switch_reload_failure_keeps_delta_store() {
        let (_dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Delta).unwrap();
        session.execute(EditCommand::remove(0, 1)).unwrap();
        std::fs::remove_file(&path).unwrap();

        let result = session.switch_handling_mode(HandlingMode::Memory, || UserChoice::Discard);

        assert!(matches!(result, Err(SessionError::Io(_))));
        assert_eq!(session.handling_mode(), HandlingMode::Delta);
        // Still attached: the unlinked file stays readable through the open source
        assert_eq!(repo.borrow().source_count(), 1);
        assert_eq!(repo.borrow().document_count(), 1);
        assert_eq!(contents(&session), b"bc");
        assert!(session.is_modified());
    }

    #[test]
    fn test_switch_round_trip_is_lossless() {
        let (_dir, path) = fixture(b"hello, world");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Memory).unwrap();

        session.switch_handling_mode(HandlingMode::Delta, never_asked).unwrap();
        assert_eq!(session.handling_mode(), HandlingMode::Delta);
        assert_eq!(repo.borrow().source_count(), 1);

        session.switch_handling_mode(HandlingMode::Memory, never_asked).unwrap();
        assert_eq!(session.handling_mode(), HandlingMode::Memory);
        assert_eq!(contents(&session), b"hello, world");
        assert!(!session.is_modified());
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[test]
    fn test_switch_same_mode_is_noop() {
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.execute(EditCommand::insert(0, b"abc".to_vec())).unwrap();

        session.switch_handling_mode(HandlingMode::Memory, never_asked).unwrap();

        assert!(session.is_modified());
        assert!(session.can_undo());
    }

    #[test]
    fn test_switch_unnamed_document_migrates_bytes() {
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.execute(EditCommand::insert(0, b"unsaved".to_vec())).unwrap();

        session.switch_handling_mode(HandlingMode::Delta, never_asked).unwrap();

        assert_eq!(session.handling_mode(), HandlingMode::Delta);
        assert_eq!(contents(&session), b"unsaved");
        assert!(!session.is_modified());
        assert!(session.has_unsaved_changes());
        assert_eq!(session.history().command_count(), 0);
        // No file is involved
        assert_eq!(repo.borrow().source_count(), 0);
        assert_eq!(repo.borrow().document_count(), 1);

        session.switch_handling_mode(HandlingMode::Memory, never_asked).unwrap();
        assert_eq!(contents(&session), b"unsaved");
        assert_eq!(repo.borrow().document_count(), 0);
    }

    #[test]
    fn test_size_notification_per_mutation() {
        let recorder = Rc::new(RecordingListener::default());
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.add_listener(recorder.clone());

        session.execute(EditCommand::insert(0, b"abcd".to_vec())).unwrap();
        session.execute(EditCommand::remove(0, 1)).unwrap();
        session.undo().unwrap();
        session.redo().unwrap();

        assert_eq!(recorder.sizes.get(), 4);
        assert_eq!(recorder.last_size.get(), Some(3));
        assert_eq!(recorder.commands.get(), 2);

        // A failed command changes nothing and notifies nothing
        assert!(session.execute(EditCommand::remove(10, 1)).is_err());
        assert_eq!(recorder.sizes.get(), 4);
    }

    #[test]
    fn test_compound_command_is_one_step() {
        let recorder = Rc::new(RecordingListener::default());
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.add_listener(recorder.clone());
        session.execute(EditCommand::insert(0, b"abc".to_vec())).unwrap();

        let replace = CompoundCommand::new("Replace")
            .with(EditCommand::remove(0, 3))
            .with(EditCommand::insert(0, b"xyz".to_vec()));
        session.execute(replace).unwrap();

        assert_eq!(recorder.sizes.get(), 2);
        assert_eq!(session.undo_caption(), Some("Replace"));
        session.undo().unwrap();
        assert_eq!(contents(&session), b"abc");
        assert_eq!(session.redo_caption(), Some("Replace"));
    }

    #[test]
    fn test_add_command_records_pre_applied_edit() {
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.execute(EditCommand::insert(0, b"abc".to_vec())).unwrap();

        session.content_mut().remove(1, 1).unwrap();
        session.add_command(EditCommand::removed(1, b"b".to_vec())).unwrap();

        assert_eq!(contents(&session), b"ac");
        session.undo().unwrap();
        assert_eq!(contents(&session), b"abc");
        assert_eq!(session.history().command_position(), 1);
    }

    #[test]
    fn test_set_command_position_walks_history() {
        let recorder = Rc::new(RecordingListener::default());
        let mut session = EditingSession::new(SegmentsRepository::shared());
        for byte in b"abcd" {
            session.execute(EditCommand::insert(session.document_size(), vec![*byte])).unwrap();
        }
        session.add_listener(recorder.clone());

        session.set_command_position(1).unwrap();
        assert_eq!(contents(&session), b"a");
        assert_eq!(recorder.sizes.get(), 3);

        session.set_command_position(3).unwrap();
        assert_eq!(contents(&session), b"abc");
        assert!(session.set_command_position(5).is_err());
    }

    #[test]
    fn test_close_releases_repository_source() {
        let (_dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        let mut session = EditingSession::new(repo.clone());
        session.open(&path, true, HandlingMode::Delta).unwrap();
        session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();

        session.close();

        assert_eq!(repo.borrow().source_count(), 0);
        assert_eq!(repo.borrow().document_count(), 0);
        assert_eq!(session.document_size(), 0);
        assert_eq!(session.document_path(), None);
        assert_eq!(session.handling_mode(), HandlingMode::Memory);
    }

    #[test]
    fn test_drop_releases_repository_source() {
        let (_dir, path) = fixture(b"abc");
        let repo = SegmentsRepository::shared();
        {
            let mut session = EditingSession::new(repo.clone());
            session.open(&path, false, HandlingMode::Delta).unwrap();
            assert_eq!(repo.borrow().source_count(), 1);
        }
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[test]
    fn test_two_sessions_share_a_source() {
        let (_dir, path) = fixture(b"shared");
        let repo = SegmentsRepository::shared();
        let mut first = EditingSession::new(repo.clone());
        let mut second = EditingSession::new(repo.clone());
        first.open(&path, true, HandlingMode::Delta).unwrap();
        second.open(&path, true, HandlingMode::Delta).unwrap();
        assert_eq!(repo.borrow().source_count(), 1);

        first.execute(EditCommand::insert(0, b"1:".to_vec())).unwrap();
        first.save().unwrap();

        assert_eq!(contents(&second), b"shared");
        assert_eq!(contents(&first), b"1:shared");

        first.close();
        second.close();
        assert_eq!(repo.borrow().source_count(), 0);
    }

    #[test]
    fn test_memory_save_is_seen_by_later_delta_open() {
        let (_dir, path) = fixture(b"old");
        let repo = SegmentsRepository::shared();
        let mut viewer = EditingSession::new(repo.clone());
        viewer.open(&path, true, HandlingMode::Delta).unwrap();

        let mut writer = EditingSession::new(repo.clone());
        writer.open(&path, true, HandlingMode::Memory).unwrap();
        writer.execute(EditCommand::overwrite(0, b"NEW!".to_vec())).unwrap();
        writer.save().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"NEW!");

        let mut third = EditingSession::new(repo.clone());
        third.open(&path, true, HandlingMode::Delta).unwrap();
        assert_eq!(contents(&third), b"NEW!");
        assert_eq!(contents(&viewer), b"old");

        // Saving the fresh view must build on the newer file
        third.execute(EditCommand::insert(4, b"+".to_vec())).unwrap();
        third.save().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"NEW!+");
        assert_eq!(contents(&viewer), b"old");
    }

    #[test]
    fn test_with_settings_applies_undo_limit() {
        let settings = SessionSettings {
            max_undo_steps: Some(2),
            ..Default::default()
        };
        let mut session = EditingSession::with_settings(SegmentsRepository::shared(), &settings);
        for _ in 0..3 {
            session.execute(EditCommand::insert(0, b"x".to_vec())).unwrap();
        }

        assert_eq!(session.history().command_count(), 2);
        session.undo_steps(2).unwrap();
        assert!(matches!(session.undo(), Err(CommandError::NothingToUndo)));
        assert_eq!(contents(&session), b"x");
        assert!(session.is_modified());
    }

    #[test]
    fn test_open_stream_is_unnamed() {
        let mut session = EditingSession::new(SegmentsRepository::shared());
        session.open_stream(&b"streamed"[..], HandlingMode::Delta).unwrap();

        assert_eq!(contents(&session), b"streamed");
        assert!(!session.is_modified());
        assert!(session.has_unsaved_changes());
        assert!(matches!(session.save(), Err(SessionError::NoDocument)));
    }
}
