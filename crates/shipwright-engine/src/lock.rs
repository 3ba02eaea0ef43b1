//! Run lock: one `start`/`resume`/`reset` drives the pipeline state at a time.
//!
//! The lock file is created with `create_new`, so two processes can never both
//! believe they created it. A lock is abandoned when its owning process is gone
//! or when it is older than its TTL; an abandoned lock is replaced. The file is
//! removed when the `RunLock` is dropped.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, warn};

use shipwright_utils::error::LockError;
use shipwright_utils::paths;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60 * 60);

/// Reads of a lock file that may still be mid-write
const MAX_READ_RETRIES: u32 = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Create attempts; each retry follows removal of an abandoned lock.
const MAX_CREATE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            created_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// What sits at the lock path when `create_new` fails
#[derive(Debug)]
enum ExistingLock {
    Owned(LockInfo),
    /// Empty or truncated after every retry: the writer died before finishing
    Unwritten,
    /// Removed by its owner between our create and read
    Gone,
}

#[derive(Debug)]
pub struct RunLock {
    path: Utf8PathBuf,
    info: LockInfo,
}

impl RunLock {
    /// Take the lock at `path`.
    ///
    /// An existing lock is replaced when its process is no longer running, when
    /// it is older than `ttl`, or when it was never fully written.
    ///
    /// # Errors
    ///
    /// `LockError::Held` when a live lock exists, `LockError::Corrupted` when
    /// the existing file holds something other than a lock record.
    pub fn acquire(path: &Utf8Path, ttl: Duration) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_string(),
                source,
            })?;
        }

        for _ in 0..MAX_CREATE_ATTEMPTS {
            match Self::create(path) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_string(),
                        source,
                    });
                }
            }

            match Self::read_existing(path)? {
                ExistingLock::Gone => continue,
                ExistingLock::Unwritten => {
                    warn!(path = %path, "Replacing run lock that was never fully written");
                }
                ExistingLock::Owned(existing) => {
                    let age = existing.age(Utc::now());
                    let alive = is_process_running(existing.pid);
                    if alive && age <= ttl {
                        return Err(LockError::Held {
                            pid: existing.pid,
                            age_secs: age.as_secs(),
                        });
                    }
                    warn!(
                        path = %path,
                        pid = existing.pid,
                        alive = alive,
                        age_secs = age.as_secs(),
                        "Replacing abandoned run lock"
                    );
                }
            }
            remove_if_present(path)?;
        }

        // Someone else recreated it between our removal and retry.
        match Self::read_existing(path)? {
            ExistingLock::Owned(existing) => Err(LockError::Held {
                pid: existing.pid,
                age_secs: existing.age(Utc::now()).as_secs(),
            }),
            _ => Err(LockError::Corrupted {
                path: path.to_string(),
                reason: "lock changed hands while being replaced".to_string(),
            }),
        }
    }

    fn create(path: &Utf8Path) -> io::Result<Self> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let info = LockInfo::current();
        let json = serde_json::to_string(&info).map_err(io::Error::other)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        debug!(path = %path, pid = info.pid, "Acquired run lock");
        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    fn read_existing(path: &Utf8Path) -> Result<ExistingLock, LockError> {
        for attempt in 1..=MAX_READ_RETRIES {
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ExistingLock::Gone),
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_string(),
                        source,
                    });
                }
            };

            match serde_json::from_str::<LockInfo>(&raw) {
                Ok(info) => return Ok(ExistingLock::Owned(info)),
                Err(e) => {
                    let incomplete = e.is_eof() || raw.trim().is_empty();
                    if !incomplete {
                        return Err(LockError::Corrupted {
                            path: path.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    if attempt < MAX_READ_RETRIES {
                        std::thread::sleep(READ_RETRY_DELAY);
                    }
                }
            }
        }
        Ok(ExistingLock::Unwritten)
    }

    #[must_use]
    pub fn info(&self) -> &LockInfo {
        &self.info
    }
}

fn remove_if_present(path: &Utf8Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Io {
            path: path.to_string(),
            source,
        }),
    }
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // pid 0 and negative values address process groups, not a process.
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs the existence and permission checks.
    let rc = unsafe { libc::kill(pid, 0) };
    // EPERM: the process exists but belongs to someone else.
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::minwinbase::STILL_ACTIVE;
    use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
    use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

    // SAFETY: the handle is checked for null and closed on every path.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        let mut exit_code: u32 = 0;
        let ok = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        ok != 0 && exit_code == STILL_ACTIVE
    }
}

/// No liveness probe here; only the TTL can expire a lock.
#[cfg(not(any(unix, windows)))]
fn is_process_running(_pid: u32) -> bool {
    true
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path, error = %e, "Failed to release run lock");
        }
    }
}
