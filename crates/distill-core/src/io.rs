use crate::error::{DistillError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tempfile::NamedTempFile;

/// How long [`ProjectLock::acquire`] waits before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(20);
/// A lock file older than this is left over from a crashed process.
const LOCK_STALE: Duration = Duration::from_secs(60);

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Readers see either the previous content or the new content, never a mix.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`atomic_write`], but fails with `AlreadyExists` instead of replacing
/// an existing file.
pub fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist_noclobber(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// ProjectLock
// ---------------------------------------------------------------------------

/// Exclusive project-wide lock held across processes.
///
/// The lock is a file created with `create_new`; whoever creates it owns the
/// lock until the guard drops and removes it.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_within(path, LOCK_TIMEOUT)
    }

    pub fn acquire_within(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // Owner pid is informational only.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        tracing::warn!(path = %path.display(), "removing stale lock file");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(DistillError::Locked(path.display().to_string()));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > LOCK_STALE)
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Read a YAML file, treating a missing or blank file as `None`.
pub fn read_yaml_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_yaml::from_str(&content)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.md");
        atomic_write(&path, b"# Operating Rules\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# Operating Rules\n"
        );
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("postmortem/nested/PM-001-x.yaml");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proposal.yaml");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn write_new_refuses_to_replace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("postmortem/PM-001-x.yaml");
        write_new(&path, b"first").unwrap();
        let err = write_new(&path, b"second").unwrap_err();
        assert!(matches!(err, DistillError::Io(ref e) if e.kind() == ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".distill/distill.lock");
        let held = ProjectLock::acquire(&path).unwrap();
        assert!(path.exists());
        let err = ProjectLock::acquire_within(&path, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, DistillError::Locked(_)));
        drop(held);
        assert!(!path.exists());
        ProjectLock::acquire_within(&path, Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn lock_serialises_threads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("distill.lock");
        let counter = dir.path().join("counter");
        std::fs::write(&counter, "0").unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        let _lock = ProjectLock::acquire(&path).unwrap();
                        let n: u32 = std::fs::read_to_string(&counter).unwrap().parse().unwrap();
                        std::fs::write(&counter, (n + 1).to_string()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(std::fs::read_to_string(&counter).unwrap(), "80");
    }

    #[test]
    fn read_yaml_opt_blank_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.yaml");
        std::fs::write(&path, "  \n").unwrap();
        let v: Option<Vec<String>> = read_yaml_opt(&path).unwrap();
        assert!(v.is_none());
        let missing: Option<Vec<String>> = read_yaml_opt(&dir.path().join("nope.yaml")).unwrap();
        assert!(missing.is_none());
    }
}
