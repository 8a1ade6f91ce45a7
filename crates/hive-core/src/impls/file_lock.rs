//! LockFile - プロセス間の排他ロック（ロックファイル方式）
//!
//! `create_new` でロックファイルを作れた側が所有者になります。
//! Drop でロックファイルを削除するので、パニックや早期 return でも解放されます。
//!
//! 一定時間以上更新されていないロックファイルは、クラッシュしたプロセスの残骸とみなして
//! 取り除きます（stale lock）。一意な名前へ rename してから削除するので、
//! 同じ残骸を複数プロセスが同時に壊しても勝つのは 1 つだけです。

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};
use ulid::Ulid;

use crate::domain::HiveError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Held inter-process lock. Dropping it removes the lock file.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Block until the lock at `path` is acquired or `timeout` elapses.
    ///
    /// Runs on a blocking thread; callers in async code go through
    /// `spawn_blocking`.
    pub fn acquire(path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self, HiveError> {
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // 診断用に pid を書いておく（失敗しても所有権には影響しない）
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(path = %path.display(), "acquired board lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path, stale_after) && break_stale(path, stale_after) {
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(HiveError::Busy(format!(
                            "timed out after {}ms waiting for {}",
                            timeout.as_millis(),
                            path.display()
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    return Err(HiveError::Store(format!(
                        "cannot create lock file {}: {}",
                        path.display(),
                        err
                    )));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "failed to remove board lock");
        }
    }
}

/// Move a stale lock aside and delete it.
///
/// The rename is atomic, so when several processes see the same stale
/// file only one of them wins it. Returns whether this caller did.
fn break_stale(path: &Path, stale_after: Duration) -> bool {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".stale-{}", Ulid::new()));
    let aside = PathBuf::from(aside);

    if fs::rename(path, &aside).is_err() {
        return false;
    }
    // rename は mtime を変えないので、移した後でもう一度確かめる
    if !is_stale(&aside, stale_after) {
        debug!(path = %path.display(), "lock was renewed before it could be broken");
        let _ = fs::hard_link(&aside, path);
        let _ = fs::remove_file(&aside);
        return false;
    }
    warn!(
        path = %path.display(),
        stale_after_ms = stale_after.as_millis() as u64,
        "breaking stale board lock"
    );
    if let Err(err) = fs::remove_file(&aside) {
        warn!(path = %aside.display(), error = %err, "failed to remove stale lock");
    }
    true
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|meta| meta.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn drop_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".board.lock");

        let lock = LockFile::acquire(&path, Duration::from_millis(100), Duration::from_secs(60))
            .unwrap();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn second_holder_times_out_as_busy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".board.lock");

        let _held = LockFile::acquire(&path, Duration::from_millis(100), Duration::from_secs(60))
            .unwrap();
        let err = LockFile::acquire(&path, Duration::from_millis(60), Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, HiveError::Busy(_)));
    }

    #[test]
    fn stale_lock_is_broken() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".board.lock");
        fs::write(&path, "12345\n").unwrap();
        thread::sleep(Duration::from_millis(30));

        let lock = LockFile::acquire(&path, Duration::from_millis(100), Duration::from_millis(10));
        assert!(lock.is_ok());
        // 退避したファイルも残らない
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn fresh_lock_is_put_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".board.lock");
        fs::write(&path, "12345\n").unwrap();

        assert!(!break_stale(&path, Duration::from_secs(60)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "12345\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
