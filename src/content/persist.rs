//! File access helpers: atomic replacement and positioned reads

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Stream new contents for `dest` into a temporary sibling file
///
/// The temporary file lives in the destination directory so the final rename
/// stays on one filesystem. It is flushed to disk and carries the permissions
/// of the file it will replace. Nothing at `dest` changes until
/// [`commit_file`]; dropping the returned file removes it.
pub fn stage_file(
    dest: &Path,
    write: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> io::Result<NamedTempFile> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    // Keep the permissions of the file being replaced
    if let Ok(metadata) = fs::metadata(dest) {
        if let Err(e) = fs::set_permissions(temp.path(), metadata.permissions()) {
            log::warn!("Failed to copy permissions to {}: {}", dest.display(), e);
        }
    }
    Ok(temp)
}

/// Rename a staged file over `dest`
pub fn commit_file(staged: NamedTempFile, dest: &Path) -> io::Result<()> {
    staged.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Whether `file` is still the file found at `path`
///
/// False once `path` has been replaced (for example by a rename over it).
#[cfg(unix)]
pub fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let (open, current) = (file.metadata()?, fs::metadata(path)?);
    Ok(open.dev() == current.dev() && open.ino() == current.ino())
}

/// Whether `file` is still the file found at `path`
#[cfg(not(unix))]
pub fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    let (open, current) = (file.metadata()?, fs::metadata(path)?);
    Ok(open.len() == current.len() && open.modified().ok() == current.modified().ok())
}

/// Fill `buf` from `file` starting at `offset`
pub fn read_range(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)
}

/// Stream `len` bytes of `file` starting at `offset` into `out`
pub fn copy_range(file: &File, offset: u64, len: u64, out: &mut dyn Write) -> io::Result<()> {
    let mut reader = file;
    reader.seek(SeekFrom::Start(offset))?;
    let copied = io::copy(&mut reader.take(len), out)?;
    if copied != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("backing file ended after {copied} of {len} bytes"),
        ));
    }
    Ok(())
}
