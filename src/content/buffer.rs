//! Fully loaded, exclusively owned byte buffer

use std::io::Write;
use std::path::Path;

use super::repository::RepositoryHandle;
use crate::error::StoreResult;

/// Document bytes held entirely in memory
///
/// Bounds and write-access checks are done by [`super::ContentStore`]; the
/// methods here assume valid ranges.
#[derive(Debug, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    writable: bool,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new(writable: bool) -> Self {
        Self {
            data: Vec::new(),
            writable,
        }
    }

    /// Wrap already loaded bytes
    pub fn from_bytes(data: Vec<u8>, writable: bool) -> Self {
        Self { data, writable }
    }

    /// Load a whole file into memory
    pub fn load(path: &Path, writable: bool) -> StoreResult<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::from_bytes(data, writable))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn read(&self, offset: u64, len: u64) -> Vec<u8> {
        let start = offset as usize;
        self.data[start..start + len as usize].to_vec()
    }

    pub fn insert(&mut self, offset: u64, bytes: &[u8]) {
        let offset = offset as usize;
        self.data.splice(offset..offset, bytes.iter().copied());
    }

    pub fn remove(&mut self, offset: u64, len: u64) {
        let start = offset as usize;
        self.data.drain(start..start + len as usize);
    }

    /// Overwrite bytes at `offset`, growing the buffer if the write runs past the end
    pub fn write(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        let overlap = bytes.len().min(self.data.len() - start);
        self.data[start..start + overlap].copy_from_slice(&bytes[..overlap]);
        self.data.extend_from_slice(&bytes[overlap..]);
    }

    /// Serialize the whole buffer to `dest`
    ///
    /// The file is replaced through the repository so delta documents open
    /// on the same path never read through a stale handle.
    pub fn flush(&self, dest: &Path, repository: &RepositoryHandle) -> StoreResult<()> {
        repository
            .borrow_mut()
            .replace_file(dest, |out| out.write_all(&self.data))?;
        Ok(())
    }

    /// Release the memory held by the buffer
    pub fn dispose(mut self) {
        self.data = Vec::new();
    }
}
