//! Scoped shared/exclusive locks on individual task files.
//!
//! [`TaskFileGuard`] opens a task file and takes an `fs2` lock on it in one
//! non-blocking step. The lock is held for as long as the guard lives and is
//! released when the guard is dropped, on every exit path. Locks are taken
//! per open handle, so two handles in the same process contend exactly like
//! two processes do.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

/// The kind of access a guard holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers at once, excluded by a writer.
    Shared,
    /// A single writer, excluding everyone else.
    Exclusive,
}

/// An open task file holding a shared or exclusive lock.
#[derive(Debug)]
pub struct TaskFileGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl TaskFileGuard {
    /// Opens `path` and tries to lock it without blocking.
    ///
    /// Returns `Ok(None)` when another handle holds a conflicting lock, so
    /// the caller can retry later. A missing file surfaces as an
    /// [`io::ErrorKind::NotFound`] error.
    pub fn try_acquire(path: &Path, mode: LockMode) -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(mode == LockMode::Exclusive)
            .open(path)?;

        // Fully qualified: std's `File` has inherent lock methods with
        // different signatures on newer toolchains.
        let locked = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };

        match locked {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
                mode,
            })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Lock mode held by this guard.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Reads the whole file from the start.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Truncates the file and writes `bytes` in its place, then syncs.
    ///
    /// Only valid under an exclusive lock.
    pub fn rewrite(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.mode != LockMode::Exclusive {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "task file rewrite requires an exclusive lock",
            ));
        }
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()
    }
}

impl Drop for TaskFileGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), error = %err, "failed to unlock task file");
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    match (err.raw_os_error(), contended.raw_os_error()) {
        (Some(actual), Some(expected)) => actual == expected,
        _ => err.kind() == io::ErrorKind::WouldBlock,
    }
}
