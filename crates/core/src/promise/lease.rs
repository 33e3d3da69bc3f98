//! Owner leases for the directory-backed store.
//!
//! Every open [`FilePromiseStore`](super::FilePromiseStore) holds an
//! exclusive `flock` on `owners/{token}.lock`. Pending records carry the
//! token of the store that created them. A token whose lock file is gone,
//! or can be locked by someone else, belongs to a store that is no longer
//! open, so nothing will ever settle its pending records.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Subdirectory of the state directory holding lock files.
pub(crate) const OWNERS_DIR: &str = "owners";

/// Exclusive lease held for as long as the store is open.
#[derive(Debug)]
pub(crate) struct OwnerLease {
    token: String,
    file: File,
    path: PathBuf,
}

impl OwnerLease {
    pub(crate) fn acquire(state_dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(state_dir.join(OWNERS_DIR))?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let path = lease_path(state_dir, &token);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        if !try_lock(&file)? {
            return Err(io::Error::new(
                ErrorKind::WouldBlock,
                format!("lease {} is already held", path.display()),
            ));
        }
        Ok(Self { token, file, path })
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for OwnerLease {
    fn drop(&mut self) {
        unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Whether the store that issued `token` is still open in some process.
pub(crate) fn is_held(state_dir: &Path, token: &str) -> io::Result<bool> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Ok(false);
    }
    let path = lease_path(state_dir, token);
    let file = match OpenOptions::new().write(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if try_lock(&file)? {
        // The owner died without releasing; the file is ours to remove.
        unlock(&file);
        let _ = std::fs::remove_file(&path);
        Ok(false)
    } else {
        Ok(true)
    }
}

fn lease_path(state_dir: &Path, token: &str) -> PathBuf {
    state_dir.join(OWNERS_DIR).join(format!("{token}.lock"))
}

/// `Ok(false)` when another open file description holds the lock.
#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    // Safety: the descriptor is owned by `file` and open for the whole call.
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Without `flock` every lease counts as held, so no record is ever
/// treated as abandoned.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<bool> {
    Ok(false)
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    // Safety: as in `try_lock`.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
