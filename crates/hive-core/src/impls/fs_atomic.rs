//! 一時ファイル + fsync + rename による置き換え書き込み

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use ulid::Ulid;

use crate::domain::HiveError;

/// Replace `target` with `bytes`. On failure the previous content stays.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), HiveError> {
    let dir = target
        .parent()
        .ok_or_else(|| HiveError::Store(format!("{} has no parent directory", target.display())))?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{name}.{}.tmp", Ulid::new()));

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|_| fs::rename(&tmp, target)) {
        let _ = fs::remove_file(&tmp);
        return Err(HiveError::Store(format!(
            "cannot replace {}: {err}",
            target.display()
        )));
    }

    // ディレクトリエントリの永続化（未対応の環境では無視）
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    Ok(())
}
