//! Content stores: the bytes of one open document
//!
//! A [`ContentStore`] is either a fully loaded [`ByteBuffer`] (memory mode)
//! or a file-backed [`DeltaDocument`] (delta mode). Both arms accept the same
//! operations with the same bounds and access checks, so callers only see
//! the difference through [`ContentStore::handling_mode`].

mod buffer;
mod delta;
mod persist;
mod repository;
mod segments;

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub use buffer::ByteBuffer;
pub use delta::DeltaDocument;
pub use repository::{DocumentId, RepositoryHandle, SegmentsRepository, SourceId};

/// Chunk size used when streaming bytes from one store into another
pub const COPY_CHUNK_SIZE: u64 = 64 * 1024;

/// Which backing a session keeps its document in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlingMode {
    /// Whole document loaded into memory
    #[default]
    Memory,
    /// Copy-on-write overlay over the file on disk
    Delta,
}

impl fmt::Display for HandlingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlingMode::Memory => write!(f, "memory"),
            HandlingMode::Delta => write!(f, "delta"),
        }
    }
}

impl FromStr for HandlingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(HandlingMode::Memory),
            "delta" => Ok(HandlingMode::Delta),
            other => Err(format!("Unknown handling mode: {}", other)),
        }
    }
}

/// The bytes of one open document
#[derive(Debug)]
pub enum ContentStore {
    Buffer(ByteBuffer),
    Delta(DeltaDocument),
}

fn check_range(offset: u64, len: u64, size: u64) -> StoreResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(StoreError::OutOfBounds { offset, len, size }),
    }
}

impl ContentStore {
    /// An empty, writable in-memory store
    pub fn empty() -> Self {
        ContentStore::Buffer(ByteBuffer::new(true))
    }

    /// An empty, writable store of the given mode, not connected to any file
    pub fn empty_of(mode: HandlingMode, repository: &RepositoryHandle) -> StoreResult<Self> {
        Ok(match mode {
            HandlingMode::Memory => Self::empty(),
            HandlingMode::Delta => ContentStore::Delta(DeltaDocument::empty(repository)?),
        })
    }

    /// Load a file under the given mode
    ///
    /// Memory mode reads the whole file. Delta mode opens a file source
    /// (read-write when `writable`) and copies nothing up front.
    pub fn load(
        path: &Path,
        writable: bool,
        mode: HandlingMode,
        repository: &RepositoryHandle,
    ) -> StoreResult<Self> {
        Ok(match mode {
            HandlingMode::Memory => ContentStore::Buffer(ByteBuffer::load(path, writable)?),
            HandlingMode::Delta => {
                ContentStore::Delta(DeltaDocument::open(repository, path, writable)?)
            }
        })
    }

    /// Load an unnamed document from a stream
    pub fn from_reader(
        mut reader: impl Read,
        mode: HandlingMode,
        repository: &RepositoryHandle,
    ) -> StoreResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(match mode {
            HandlingMode::Memory => ContentStore::Buffer(ByteBuffer::from_bytes(data, true)),
            HandlingMode::Delta => {
                let mut doc = DeltaDocument::empty(repository)?;
                doc.insert(0, &data);
                ContentStore::Delta(doc)
            }
        })
    }

    pub fn handling_mode(&self) -> HandlingMode {
        match self {
            ContentStore::Buffer(_) => HandlingMode::Memory,
            ContentStore::Delta(_) => HandlingMode::Delta,
        }
    }

    /// Document size in bytes
    pub fn size(&self) -> u64 {
        match self {
            ContentStore::Buffer(buffer) => buffer.size(),
            ContentStore::Delta(doc) => doc.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether edits are accepted
    pub fn is_writable(&self) -> bool {
        match self {
            ContentStore::Buffer(buffer) => buffer.is_writable(),
            ContentStore::Delta(doc) => doc.is_writable(),
        }
    }

    /// Path of the backing file for delta documents
    pub fn backing_path(&self) -> Option<PathBuf> {
        match self {
            ContentStore::Buffer(_) => None,
            ContentStore::Delta(doc) => doc.path(),
        }
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    /// Read `len` bytes starting at `offset`
    pub fn read(&self, offset: u64, len: u64) -> StoreResult<Vec<u8>> {
        check_range(offset, len, self.size())?;
        match self {
            ContentStore::Buffer(buffer) => Ok(buffer.read(offset, len)),
            ContentStore::Delta(doc) => doc.read(offset, len),
        }
    }

    /// Overwrite bytes at `offset`; writing past the end grows the document
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        check_range(offset, 0, self.size())?;
        match self {
            ContentStore::Buffer(buffer) => buffer.write(offset, bytes),
            ContentStore::Delta(doc) => doc.write(offset, bytes),
        }
        Ok(())
    }

    /// Insert bytes at `offset` (which may equal the size)
    pub fn insert(&mut self, offset: u64, bytes: &[u8]) -> StoreResult<()> {
        self.check_writable()?;
        check_range(offset, 0, self.size())?;
        match self {
            ContentStore::Buffer(buffer) => buffer.insert(offset, bytes),
            ContentStore::Delta(doc) => doc.insert(offset, bytes),
        }
        Ok(())
    }

    /// Remove `len` bytes starting at `offset`
    pub fn remove(&mut self, offset: u64, len: u64) -> StoreResult<()> {
        self.check_writable()?;
        check_range(offset, len, self.size())?;
        match self {
            ContentStore::Buffer(buffer) => buffer.remove(offset, len),
            ContentStore::Delta(doc) => doc.remove(offset, len),
        }
        Ok(())
    }

    /// Insert the entire content of `other` at offset 0, streaming in chunks
    ///
    /// Used when migrating an unnamed document between backings; ignores the
    /// read-only flag of `self`.
    pub fn insert_all_from(&mut self, other: &ContentStore) -> StoreResult<()> {
        let total = other.size();
        let mut copied = 0;
        while copied < total {
            let len = COPY_CHUNK_SIZE.min(total - copied);
            let chunk = other.read(copied, len)?;
            match self {
                ContentStore::Buffer(buffer) => buffer.insert(copied, &chunk),
                ContentStore::Delta(doc) => doc.insert(copied, &chunk),
            }
            copied += len;
        }
        Ok(())
    }

    /// Write the current content to `dest`
    ///
    /// Memory mode serializes the whole buffer. Delta mode merges the edits
    /// into the backing file (in place when `dest` is that file). Both go
    /// through `repository` so other documents on `dest` stay consistent. On failure
    /// the in-memory state is untouched so the save can be retried.
    pub fn flush(&mut self, dest: &Path, repository: &RepositoryHandle) -> StoreResult<()> {
        match self {
            ContentStore::Buffer(buffer) => buffer.flush(dest, repository),
            ContentStore::Delta(doc) => doc.flush(dest),
        }
    }

    /// Release the store: free the buffer, or detach and close the file source
    pub fn dispose(self) {
        match self {
            ContentStore::Buffer(buffer) => buffer.dispose(),
            ContentStore::Delta(doc) => doc.dispose(),
        }
    }
}
