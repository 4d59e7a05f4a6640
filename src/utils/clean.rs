use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{fs, time};
use tracing::{debug, info, warn};

/// Periodically removes uploads older than `ttl` from `dir`.
pub async fn task(dir: PathBuf, ttl: Duration, every: Duration) {
    let mut tick = time::interval(every);
    loop {
        tick.tick().await;
        match sweep(&dir, ttl).await {
            Ok(0) => {}
            Ok(n) => info!(removed = n, dir = %dir.display(), "stale files swept"),
            Err(e) => warn!(error = %e, dir = %dir.display(), "sweep failed"),
        }
    }
}

/// One pass; returns how many files were deleted. A missing directory is empty.
pub async fn sweep(dir: &Path, ttl: Duration) -> std::io::Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() { continue; }
        let age = now.duration_since(meta.modified()?).unwrap_or_default();
        if age >= ttl {
            // a concurrent download may still hold it open; unlinking is fine on unix
            if fs::remove_file(entry.path()).await.is_ok() {
                debug!(path = %entry.path().display(), "removed");
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_only_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(sweep(dir.path(), Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(dir.path().join("a.txt").exists());

        assert_eq!(sweep(dir.path(), Duration::ZERO).await.unwrap(), 1);
        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never-created");
        assert_eq!(sweep(&gone, Duration::ZERO).await.unwrap(), 0);
    }
}
