//! Secret rotation: timestamped backups and atomic file replacement

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;

const BACKUP_TIMESTAMP: &str = "%Y-%m-%d_%H-%M-%S";

/// Choose a backup location for `path` that does not exist yet.
///
/// The first choice is `<path>.<YYYY-MM-DD_HH-MM-SS>.backup`; a second
/// rotation in the same second gets `<path>.<timestamp>.1.backup`, and so on.
pub fn backup_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format(BACKUP_TIMESTAMP).to_string();
    let base = path.as_os_str().to_string_lossy().into_owned();

    let candidate = PathBuf::from(format!("{base}.{stamp}.backup"));
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 1u32;
    loop {
        let candidate = PathBuf::from(format!("{base}.{stamp}.{n}.backup"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Atomically replace `path` with `content`.
///
/// Writes to a temp file in the same directory (mode 0600 on Unix), flushes
/// it, then renames over the target so readers never see a partial file.
pub async fn atomic_replace(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&tmp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
