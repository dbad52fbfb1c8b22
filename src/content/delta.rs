//! File-backed, copy-on-write document
//!
//! A [`DeltaDocument`] is a thin handle: its segment layout and the open
//! file live in the shared [`SegmentsRepository`](super::SegmentsRepository).
//! Only the bytes that editing adds are held in memory.

use std::path::{Path, PathBuf};

use super::repository::{DocumentId, RepositoryHandle};
use crate::error::StoreResult;

/// Handle to a document registered in the segments repository
///
/// Bounds and write-access checks are done by [`super::ContentStore`].
#[derive(Debug)]
pub struct DeltaDocument {
    repository: RepositoryHandle,
    id: DocumentId,
    writable: bool,
    released: bool,
}

impl DeltaDocument {
    /// Open `path` as a file source and attach a new document to it
    pub fn open(repository: &RepositoryHandle, path: &Path, writable: bool) -> StoreResult<Self> {
        let mut repo = repository.borrow_mut();
        let source = repo.open_source(path, writable)?;
        let id = match repo.create_document(Some(source)) {
            Ok(id) => id,
            Err(e) => {
                repo.close_source(source);
                return Err(e.into());
            }
        };
        drop(repo);

        Ok(Self {
            repository: repository.clone(),
            id,
            writable,
            released: false,
        })
    }

    /// Create an empty document with no backing file
    pub fn empty(repository: &RepositoryHandle) -> StoreResult<Self> {
        let id = repository.borrow_mut().create_document(None)?;
        Ok(Self {
            repository: repository.clone(),
            id,
            writable: true,
            released: false,
        })
    }

    pub fn size(&self) -> u64 {
        self.repository.borrow().document_size(self.id)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Path of the backing file, if the document has one
    pub fn path(&self) -> Option<PathBuf> {
        self.repository
            .borrow()
            .document_path(self.id)
            .map(Path::to_path_buf)
    }

    pub fn read(&self, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        let mut buf = vec![0; len as usize];
        self.repository.borrow().read(self.id, offset, &mut buf)?;
        Ok(buf)
    }

    pub fn insert(&mut self, offset: u64, bytes: &[u8]) {
        self.repository.borrow_mut().insert(self.id, offset, bytes);
    }

    pub fn remove(&mut self, offset: u64, len: u64) {
        self.repository.borrow_mut().remove(self.id, offset, len);
    }

    /// Overwrite bytes at `offset`, growing the document if the write runs past the end
    pub fn write(&mut self, offset: u64, bytes: &[u8]) {
        let mut repo = self.repository.borrow_mut();
        let overlap = (bytes.len() as u64).min(repo.document_size(self.id) - offset);
        repo.remove(self.id, offset, overlap);
        repo.insert(self.id, offset, bytes);
    }

    /// Merge the edits into `dest`
    ///
    /// When `dest` is the backing file this is an in-place save; otherwise
    /// the document is written to `dest` and re-attached to it.
    pub fn flush(&mut self, dest: &Path) -> StoreResult<()> {
        self.repository.borrow_mut().save_document_as(self.id, dest)?;
        Ok(())
    }

    /// Detach from the backing source, then close it
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut repo = self.repository.borrow_mut();
        if let Some(source) = repo.detach_document(self.id) {
            repo.close_source(source);
        }
    }
}

impl Drop for DeltaDocument {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        log::warn!("Delta document {:?} dropped without dispose, releasing it", self.id);
        if self.repository.try_borrow_mut().is_ok() {
            self.release();
        }
    }
}
