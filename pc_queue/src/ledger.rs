use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::LedgerError;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError {
    let path = path.display().to_string();
    move |source| LedgerError::Io { path, source }
}

/// Exclusive claim on a ledger, held as a `{ledger}.lock` file that is
/// created atomically and removed on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    pub fn lock_path(ledger_path: &Path) -> PathBuf {
        let mut name = ledger_path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// # Errors
    /// [`LedgerError::Locked`] if another process holds the lock.
    pub async fn acquire(ledger_path: &Path) -> Result<Self, LedgerError> {
        let path = Self::lock_path(ledger_path);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                // constructed first so a failed write still removes the file
                let lock = Self { path };
                // the pid only helps a human find the owner of a stale lock
                file.write_all(format!("{}\n", std::process::id()).as_bytes())
                    .await
                    .map_err(io_error(&lock.path))?;
                Ok(lock)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(LedgerError::Locked {
                    path: ledger_path.display().to_string(),
                    lock: path.display().to_string(),
                })
            }
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}

impl Drop for LedgerLock {
    // drop cannot await, and removing one small file does not block for long
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "failed to remove ledger lock {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// The set of segment file names already uploaded.
///
/// Backed by a newline-delimited file that is only ever appended to.
/// Duplicate and blank lines are tolerated.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashSet<String>,
    // set when the file does not end with a newline yet
    needs_separator: bool,
    _lock: Option<LedgerLock>,
}

impl Ledger {
    /// Read the ledger. A missing file is an empty ledger.
    ///
    /// # Errors
    /// If the file exists but cannot be read.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                String::new()
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        // names are kept verbatim, segment names may start or end with
        // spaces; lines() already drops CRLF endings
        let entries: HashSet<String> = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ToString::to_string)
            .collect();

        tracing::debug!(
            "loaded {} ledger entries from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries,
            needs_separator: !contents.is_empty() && !contents.ends_with('\n'),
            _lock: None,
        })
    }

    /// Lock the ledger for this process, then read it. The lock is released
    /// when the ledger is dropped.
    ///
    /// # Errors
    /// [`LedgerError::Locked`] when another run holds the lock, or any
    /// error of [`Ledger::load`].
    pub async fn open_exclusive(
        path: impl Into<PathBuf>,
    ) -> Result<Self, LedgerError> {
        let path = path.into();
        let lock = LedgerLock::acquire(&path).await?;

        let ledger = Self::load(path).await?;

        Ok(Self {
            _lock: Some(lock),
            ..ledger
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains(file_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a file name and flush it to disk before returning.
    ///
    /// # Errors
    /// If the ledger file cannot be opened or written.
    pub async fn record(&mut self, file_name: &str) -> Result<(), LedgerError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error(&self.path))?;

        let mut line = String::with_capacity(file_name.len() + 2);
        if self.needs_separator {
            line.push('\n');
        }
        line.push_str(file_name);
        line.push('\n');

        file.write_all(line.as_bytes())
            .await
            .map_err(io_error(&self.path))?;
        file.sync_data().await.map_err(io_error(&self.path))?;

        self.needs_separator = false;
        self.entries.insert(file_name.to_string());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("uploaded.txt"))
            .await
            .unwrap();

        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_blank_and_duplicate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded.txt");
        tokio::fs::write(&path, "a_part_1.mp4\n\n  \na_part_1.mp4\nb_part_1.mp4\n")
            .await
            .unwrap();

        let ledger = Ledger::load(&path).await.unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("a_part_1.mp4"));
        assert!(ledger.contains("b_part_1.mp4"));
    }

    #[tokio::test]
    async fn test_names_with_surrounding_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded.txt");
        tokio::fs::write(&path, " Talk_part_1.mp4\r\nTalk _part_2.mp4 \n   \n")
            .await
            .unwrap();

        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.record(" Talk_part_3.mp4").await.unwrap();

        let reloaded = Ledger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains(" Talk_part_1.mp4"));
        assert!(reloaded.contains("Talk _part_2.mp4 "));
        assert!(reloaded.contains(" Talk_part_3.mp4"));
        assert!(!reloaded.contains("Talk_part_1.mp4"));
    }

    #[tokio::test]
    async fn test_record_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded.txt");
        // edited by hand, no trailing newline
        tokio::fs::write(&path, "a_part_1.mp4").await.unwrap();

        let mut ledger = Ledger::load(&path).await.unwrap();
        ledger.record("a_part_2.mp4").await.unwrap();
        ledger.record("a_part_3.mp4").await.unwrap();

        assert!(ledger.contains("a_part_3.mp4"));
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "a_part_1.mp4\na_part_2.mp4\na_part_3.mp4\n"
        );
    }

    #[tokio::test]
    async fn test_exclusive_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploaded.txt");

        let ledger = Ledger::open_exclusive(&path).await.unwrap();
        assert!(LedgerLock::lock_path(&path).exists());

        let second = Ledger::open_exclusive(&path).await;
        assert!(matches!(second, Err(LedgerError::Locked { .. })));

        drop(ledger);
        assert!(!LedgerLock::lock_path(&path).exists());
        assert!(Ledger::open_exclusive(&path).await.is_ok());
    }
}
