//! Shared repository of file sources and the delta documents built on them
//!
//! ## Reference protocol
//!
//! A delta document backed by a file goes through four steps, always in
//! this order:
//!
//! 1. [`SegmentsRepository::open_source`] - open (or share) a file source
//! 2. [`SegmentsRepository::create_document`] - attach a document to it
//! 3. [`SegmentsRepository::detach_document`] - detach the document
//! 4. [`SegmentsRepository::close_source`] - release the source
//!
//! A source stays open while its open count is non-zero. Closing a source
//! while the caller's document is still attached, detaching a document twice
//! or closing an unknown source are programmer errors and panic with a
//! `protocol violation` message.
//!
//! Every write to disk goes through the repository, including memory-mode
//! saves ([`SegmentsRepository::replace_file`]). Documents sharing one file
//! (several views of the same path) are kept consistent: before a file is
//! replaced, every other document that still reads from it gets its
//! file-backed segments copied into memory, and open handles are then
//! moved to the new file.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::NamedTempFile;

use super::persist::{commit_file, copy_range, is_same_file, read_range, stage_file};
use super::segments::{Piece, SegmentList};

/// Shared handle to the repository, created once and passed to every session
pub type RepositoryHandle = Rc<RefCell<SegmentsRepository>>;

/// Identifier of an open file source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Identifier of a delta document registered in the repository
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

/// An open file handle with its reference counts
#[derive(Debug)]
struct FileSource {
    path: PathBuf,
    file: File,
    writable: bool,
    /// Number of `open_source` calls not yet balanced by `close_source`
    open_count: usize,
    /// Number of documents currently attached
    attached: usize,
}

#[derive(Debug)]
struct DocumentEntry {
    source: Option<SourceId>,
    segments: SegmentList,
}

/// Owner of all file sources and delta document layouts
#[derive(Debug, Default)]
pub struct SegmentsRepository {
    sources: HashMap<SourceId, FileSource>,
    documents: HashMap<DocumentId, DocumentEntry>,
    next_id: u64,
}

fn violation(message: fmt::Arguments<'_>) -> ! {
    panic!("protocol violation: {message}")
}

fn open_file(path: &Path, writable: bool) -> io::Result<File> {
    if writable {
        OpenOptions::new().read(true).write(true).open(path)
    } else {
        File::open(path)
    }
}

impl SegmentsRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty repository wrapped in a shareable handle
    pub fn shared() -> RepositoryHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // ========== Sources ==========

    /// Open a file source, sharing an existing one for the same path and access mode
    ///
    /// A shared source whose file has since been replaced on disk is reopened
    /// first; documents already reading it keep the bytes they had.
    pub fn open_source(&mut self, path: &Path, writable: bool) -> io::Result<SourceId> {
        let shared = self
            .sources
            .iter()
            .find(|(_, s)| s.path == path && s.writable == writable)
            .map(|(id, _)| *id);

        if let Some(id) = shared {
            if !is_same_file(&self.source(id).file, path)? {
                log::debug!("Source {:?} for {} is stale, reopening", id, path.display());
                let file = open_file(path, writable)?;
                self.materialize_on(path, None)?;
                self.refresh_handles(path, Some(id));
                if let Some(source) = self.sources.get_mut(&id) {
                    source.file = file;
                }
            }
            if let Some(source) = self.sources.get_mut(&id) {
                source.open_count += 1;
                log::debug!(
                    "Sharing source {:?} for {} (open count {})",
                    id,
                    path.display(),
                    source.open_count
                );
            }
            return Ok(id);
        }

        let file = open_file(path, writable)?;
        let id = SourceId(self.allocate_id());
        self.sources.insert(
            id,
            FileSource {
                path: path.to_path_buf(),
                file,
                writable,
                open_count: 1,
                attached: 0,
            },
        );
        log::debug!(
            "Opened source {:?} for {} ({})",
            id,
            path.display(),
            if writable { "read-write" } else { "read-only" }
        );
        Ok(id)
    }

    /// Release one open reference to a source, closing the file on the last one
    ///
    /// # Panics
    ///
    /// If the source is unknown (already closed) or if closing would leave
    /// more attached documents than open references, which means the caller
    /// did not detach its document first.
    pub fn close_source(&mut self, id: SourceId) {
        let Some(source) = self.sources.get_mut(&id) else {
            violation(format_args!("close of unknown or already closed source {id:?}"));
        };
        if source.attached >= source.open_count {
            violation(format_args!(
                "close of source {id:?} ({}) while a document is still attached",
                source.path.display()
            ));
        }
        source.open_count -= 1;
        if source.open_count == 0 {
            if let Some(source) = self.sources.remove(&id) {
                log::debug!("Closed source {:?} for {}", id, source.path.display());
            }
        }
    }

    /// Number of open file sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// `(open_count, attached)` for a source, or `None` once it has been closed
    pub fn source_references(&self, id: SourceId) -> Option<(usize, usize)> {
        self.sources.get(&id).map(|s| (s.open_count, s.attached))
    }

    fn source(&self, id: SourceId) -> &FileSource {
        self.sources
            .get(&id)
            .unwrap_or_else(|| violation(format_args!("use of closed source {id:?}")))
    }

    fn source_file(&self, id: Option<SourceId>) -> &File {
        match id {
            Some(id) => &self.source(id).file,
            None => violation(format_args!("file-backed segment in a document without a source")),
        }
    }

    // ========== Documents ==========

    /// Register a document, attaching it to `source` when given
    ///
    /// A document with a source starts as a single segment covering the whole
    /// file; without one it starts empty.
    pub fn create_document(&mut self, source: Option<SourceId>) -> io::Result<DocumentId> {
        let segments = match source {
            Some(source_id) => {
                let Some(file_source) = self.sources.get_mut(&source_id) else {
                    violation(format_args!("attach to closed source {source_id:?}"));
                };
                let len = file_source.file.metadata()?.len();
                file_source.attached += 1;
                SegmentList::from_source(len)
            }
            None => SegmentList::new(),
        };

        let id = DocumentId(self.allocate_id());
        self.documents.insert(id, DocumentEntry { source, segments });
        log::debug!("Created document {:?} (source {:?})", id, source);
        Ok(id)
    }

    /// Unregister a document and detach it from its source
    ///
    /// Returns the source the document was attached to; the caller still owns
    /// one open reference to it and must pass it to [`Self::close_source`].
    ///
    /// # Panics
    ///
    /// If the document is unknown (already detached).
    pub fn detach_document(&mut self, id: DocumentId) -> Option<SourceId> {
        let Some(entry) = self.documents.remove(&id) else {
            violation(format_args!("detach of unknown or already detached document {id:?}"));
        };
        if let Some(source_id) = entry.source {
            match self.sources.get_mut(&source_id) {
                Some(source) => source.attached -= 1,
                None => violation(format_args!(
                    "document {id:?} was attached to closed source {source_id:?}"
                )),
            }
        }
        log::debug!("Detached document {:?} (source {:?})", id, entry.source);
        entry.source
    }

    /// Number of registered documents
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    fn entry(&self, id: DocumentId) -> &DocumentEntry {
        self.documents
            .get(&id)
            .unwrap_or_else(|| violation(format_args!("use of detached document {id:?}")))
    }

    fn entry_mut(&mut self, id: DocumentId) -> &mut DocumentEntry {
        self.documents
            .get_mut(&id)
            .unwrap_or_else(|| violation(format_args!("use of detached document {id:?}")))
    }

    /// Logical size of a document
    pub fn document_size(&self, id: DocumentId) -> u64 {
        self.entry(id).segments.size()
    }

    /// Path of the file a document is backed by, if any
    pub fn document_path(&self, id: DocumentId) -> Option<&Path> {
        self.entry(id).source.map(|s| self.source(s).path.as_path())
    }

    /// Whether a document's backing source was opened read-write
    pub fn document_source_writable(&self, id: DocumentId) -> Option<bool> {
        self.entry(id).source.map(|s| self.source(s).writable)
    }

    /// Read `buf.len()` bytes at `offset`. The caller checks bounds.
    pub fn read(&self, id: DocumentId, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let entry = self.entry(id);
        let mut pos = 0;
        entry
            .segments
            .for_each_piece(offset, buf.len() as u64, |piece| {
                match piece {
                    Piece::Source { offset, len } => {
                        let end = pos + len as usize;
                        read_range(self.source_file(entry.source), offset, &mut buf[pos..end])?;
                        pos = end;
                    }
                    Piece::Added(bytes) => {
                        buf[pos..pos + bytes.len()].copy_from_slice(bytes);
                        pos += bytes.len();
                    }
                }
                Ok::<(), io::Error>(())
            })
    }

    /// Insert bytes into a document. The caller checks bounds.
    pub fn insert(&mut self, id: DocumentId, offset: u64, data: &[u8]) {
        self.entry_mut(id).segments.insert(offset, data);
    }

    /// Remove bytes from a document. The caller checks bounds.
    pub fn remove(&mut self, id: DocumentId, offset: u64, len: u64) {
        self.entry_mut(id).segments.remove(offset, len);
    }

    // ========== Saving ==========

    /// Replace the file at `path` with the bytes produced by `write`
    ///
    /// Used for content that does not live in the repository (memory-mode
    /// saves). Documents reading `path` keep their current bytes and every
    /// source on `path` is reopened on the new file. If writing fails,
    /// nothing changes.
    pub fn replace_file(
        &mut self,
        path: &Path,
        write: impl FnOnce(&mut dyn Write) -> io::Result<()>,
    ) -> io::Result<()> {
        let staged = stage_file(path, write)?;
        self.materialize_on(path, None)?;
        commit_file(staged, path)?;
        self.refresh_handles(path, None);

        log::debug!("Replaced {}", path.display());
        Ok(())
    }

    /// Merge a document's edits back into its own backing file
    ///
    /// The new contents are written to a temporary file and renamed over the
    /// original, so insertions and removals that change the file length are
    /// safe. On success the document is reset to a single segment over the
    /// new file. If writing fails, no document changes.
    pub fn save_document(&mut self, id: DocumentId) -> io::Result<()> {
        let Some(source_id) = self.entry(id).source else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "document has no backing file",
            ));
        };
        let source = self.source(source_id);
        if !source.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} was opened read-only", source.path.display()),
            ));
        }
        let path = source.path.clone();

        let staged = self.stage_document(id, &path)?;
        self.materialize_on(&path, Some(id))?;
        commit_file(staged, &path)?;

        let file = open_file(&path, true)?;
        let len = file.metadata()?.len();
        self.refresh_handles(&path, Some(source_id));
        if let Some(source) = self.sources.get_mut(&source_id) {
            source.file = file;
        }
        self.entry_mut(id).segments = SegmentList::from_source(len);

        log::debug!("Saved document {:?} to {} ({} bytes)", id, path.display(), len);
        Ok(())
    }

    /// Write a document to `dest` and re-attach it to a source on that path
    ///
    /// The document's previous source, if any, is detached and closed
    /// afterwards. On failure the document keeps its previous source.
    pub fn save_document_as(&mut self, id: DocumentId, dest: &Path) -> io::Result<()> {
        if self.document_path(id) == Some(dest) {
            return self.save_document(id);
        }

        let staged = self.stage_document(id, dest)?;
        self.materialize_on(dest, Some(id))?;
        commit_file(staged, dest)?;
        self.refresh_handles(dest, None);

        let len = fs::metadata(dest)?.len();
        let new_source = self.open_source(dest, true)?;
        if let Some(source) = self.sources.get_mut(&new_source) {
            source.attached += 1;
        }

        let entry = self.entry_mut(id);
        let old_source = entry.source.replace(new_source);
        entry.segments = SegmentList::from_source(len);

        if let Some(old_source) = old_source {
            if let Some(source) = self.sources.get_mut(&old_source) {
                source.attached -= 1;
            }
            self.close_source(old_source);
        }

        log::debug!("Saved document {:?} as {} ({} bytes)", id, dest.display(), len);
        Ok(())
    }

    /// Stream a document's bytes into a staged replacement for `dest`
    fn stage_document(&self, id: DocumentId, dest: &Path) -> io::Result<NamedTempFile> {
        let entry = self.entry(id);
        stage_file(dest, |out| {
            entry
                .segments
                .for_each_piece(0, entry.segments.size(), |piece| match piece {
                    Piece::Source { offset, len } => {
                        copy_range(self.source_file(entry.source), offset, len, out)
                    }
                    Piece::Added(bytes) => out.write_all(bytes),
                })
        })
    }

    /// Copy file-backed segments into memory for every document reading `path`,
    /// except `except`
    fn materialize_on(&mut self, path: &Path, except: Option<DocumentId>) -> io::Result<()> {
        let affected: Vec<DocumentId> = self
            .documents
            .iter()
            .filter(|(doc_id, entry)| {
                Some(**doc_id) != except
                    && entry.segments.references_source()
                    && entry
                        .source
                        .and_then(|s| self.sources.get(&s))
                        .is_some_and(|s| s.path == path)
            })
            .map(|(doc_id, _)| *doc_id)
            .collect();

        for doc_id in affected {
            let entry = self.entry_mut(doc_id);
            let source = entry.source;
            let mut segments = std::mem::take(&mut entry.segments);

            let result = {
                let file = self.source_file(source);
                segments.materialize(|offset, len| {
                    let mut buf = vec![0; len as usize];
                    read_range(file, offset, &mut buf)?;
                    Ok::<_, io::Error>(buf)
                })
            };
            self.entry_mut(doc_id).segments = segments;
            result?;
            log::debug!(
                "Copied file-backed data of document {:?} into memory before replacing {}",
                doc_id,
                path.display()
            );
        }
        Ok(())
    }

    /// Reopen handles of sources on `path` after the file was replaced
    fn refresh_handles(&mut self, path: &Path, skip: Option<SourceId>) {
        for (id, source) in self.sources.iter_mut() {
            if Some(*id) == skip || source.path != path {
                continue;
            }
            match open_file(path, source.writable) {
                Ok(file) => source.file = file,
                Err(e) => log::warn!("Failed to reopen {} for source {:?}: {}", path.display(), id, e),
            }
        }
    }
}
