//! Writing the patched module back to disk.
//!
//! In-place saves write a temporary sibling first (fsync'd) and only touch the
//! original file once that write has succeeded. A failure between the backup
//! rename and the final rename leaves `<file>.bak` in place without the
//! patched file; nothing guards that window.

use crate::error::PatchError;
use crate::model::{Module, ModuleProvider, WriterOptions};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

/// What a save produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    /// Where the previous file was moved, when a backup was requested.
    pub backup: Option<PathBuf>,
    pub bytes_written: usize,
    /// xxh3 of the written image.
    pub checksum: u64,
}

/// `<file>.bak`, next to the original.
pub fn backup_path(file: &Path) -> PathBuf {
    let mut name: OsString = file.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Serialize the module through the provider into memory.
pub fn render<P: ModuleProvider + ?Sized>(
    provider: &P,
    module: &Module,
    options: WriterOptions,
) -> Result<Vec<u8>, PatchError> {
    let mut buffer = Vec::new();
    provider.write(module, &mut buffer, options)?;
    Ok(buffer)
}

/// Write the module to an explicit destination.
pub fn save_to<P: ModuleProvider + ?Sized>(
    provider: &P,
    module: &Module,
    options: WriterOptions,
    destination: &Path,
) -> Result<SaveReport, PatchError> {
    let bytes = render(provider, module, options)?;
    let temp = write_sibling(destination, &bytes)?;
    temp.persist(destination).map_err(|e| PatchError::Io {
        path: destination.to_path_buf(),
        source: e.error,
    })?;

    let report = SaveReport {
        path: destination.to_path_buf(),
        backup: None,
        bytes_written: bytes.len(),
        checksum: xxh3_64(&bytes),
    };
    info!(path = %destination.display(), bytes = report.bytes_written, "saved module");
    Ok(report)
}

/// Replace the module's backing file, optionally keeping the old one as
/// `<file>.bak`. An existing backup is overwritten.
pub fn save_in_place<P: ModuleProvider + ?Sized>(
    provider: &P,
    module: &Module,
    options: WriterOptions,
    file: &Path,
    backup: bool,
) -> Result<SaveReport, PatchError> {
    let bytes = render(provider, module, options)?;
    let temp = write_sibling(file, &bytes)?;

    let backup_file = if backup {
        let bak = backup_path(file);
        if bak.exists() {
            fs::remove_file(&bak).map_err(|source| io_error(&bak, source))?;
        }
        fs::rename(file, &bak).map_err(|source| io_error(file, source))?;
        Some(bak)
    } else {
        if file.exists() {
            fs::remove_file(file).map_err(|source| io_error(file, source))?;
        }
        None
    };

    temp.persist(file).map_err(|e| io_error(file, e.error))?;

    let report = SaveReport {
        path: file.to_path_buf(),
        backup: backup_file,
        bytes_written: bytes.len(),
        checksum: xxh3_64(&bytes),
    };
    info!(
        path = %file.display(),
        backup = ?report.backup,
        bytes = report.bytes_written,
        "saved module in place"
    );
    Ok(report)
}

/// Write `bytes` to a fsync'd temporary file in the same directory as `path`.
fn write_sibling(path: &Path, bytes: &[u8]) -> Result<NamedTempFile, PatchError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
    temp.write_all(bytes)
        .map_err(|source| io_error(temp.path(), source))?;
    temp.as_file()
        .sync_all()
        .map_err(|source| io_error(temp.path(), source))?;
    Ok(temp)
}

fn io_error(path: &Path, source: std::io::Error) -> PatchError {
    PatchError::Io {
        path: path.to_path_buf(),
        source,
    }
}
