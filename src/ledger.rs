//! Persistent dedup ledger
//!
//! The ledger is the set of item identifiers already acquired into one
//! destination directory. It is stored next to the downloads as a sorted,
//! pretty-printed JSON array so it can be inspected and edited by hand.
//!
//! Reads fail soft: a missing, unreadable or corrupt ledger behaves as an
//! empty set. Writes go to a sibling temp file which is then renamed over the
//! ledger, so readers never observe a half-written file and a crash before the
//! rename leaves the previous ledger intact.

use crate::error::LedgerError;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Shared handle to one ledger file
///
/// All workers of a batch share a single `Ledger` (behind an `Arc`). Every
/// [`record`](Ledger::record) call runs its read-merge-insert-persist cycle
/// while holding the handle's mutex, so concurrent recordings are never lost.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    ids: Mutex<HashSet<String>>,
}

impl Ledger {
    /// Open the ledger at `path`, loading its current contents
    ///
    /// Never fails; see [`Ledger::load`].
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = Self::load(&path).await;
        tracing::debug!(path = %path.display(), entries = ids.len(), "Ledger opened");
        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    /// Load the identifier set stored at `path`
    ///
    /// Returns an empty set if the file is absent. Read and parse errors are
    /// logged as warnings and also yield an empty set.
    pub async fn load(path: &Path) -> HashSet<String> {
        match read_ids(path).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Ledger unreadable, starting with an empty ledger");
                HashSet::new()
            }
        }
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has been recorded
    pub async fn contains(&self, id: &str) -> bool {
        self.ids.lock().await.contains(id)
    }

    /// Number of recorded identifiers
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Whether the ledger has no entries
    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    /// Copy of the current membership
    pub async fn snapshot(&self) -> HashSet<String> {
        self.ids.lock().await.clone()
    }

    /// Add `id` and persist the full set
    ///
    /// Entries written to the file by other processes since the last load are
    /// merged in first. Returns `true` if `id` was not previously recorded.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the set cannot be persisted. The in-memory
    /// set keeps the new entry either way.
    pub async fn record(&self, id: &str) -> Result<bool, LedgerError> {
        let mut ids = self.ids.lock().await;

        match read_ids(&self.path).await {
            Ok(on_disk) => ids.extend(on_disk),
            Err(e) => {
                tracing::warn!(error = %e, "Could not re-read ledger before recording, keeping in-memory state");
            }
        }

        let inserted = ids.insert(id.to_string());
        persist(&self.path, &ids).await?;

        tracing::debug!(item_id = %id, entries = ids.len(), "Recorded item in ledger");
        Ok(inserted)
    }
}

/// Sibling temp file used while persisting `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read the ledger strictly, surfacing errors
///
/// A missing file is not an error and yields an empty set.
pub(crate) async fn read_ids(path: &Path) -> Result<HashSet<String>, LedgerError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let ids: Vec<String> = serde_json::from_slice(&bytes).map_err(|source| LedgerError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ids.into_iter().collect())
}

/// Write `ids` to the temp file next to `path` and flush it to disk
pub(crate) async fn stage(path: &Path, ids: &HashSet<String>) -> Result<PathBuf, LedgerError> {
    let sorted: BTreeSet<&String> = ids.iter().collect();
    let bytes = serde_json::to_vec_pretty(&sorted).map_err(LedgerError::Serialize)?;

    let tmp = temp_path(path);
    let write_err = |source| LedgerError::Write {
        path: tmp.clone(),
        source,
    };

    let mut file = tokio::fs::File::create(&tmp).await.map_err(write_err)?;
    file.write_all(&bytes).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;

    Ok(tmp)
}

/// Atomically move a staged temp file over the ledger
pub(crate) async fn commit(tmp: &Path, path: &Path) -> Result<(), LedgerError> {
    if let Err(source) = tokio::fs::rename(tmp, path).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(LedgerError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

async fn persist(path: &Path, ids: &HashSet<String>) -> Result<(), LedgerError> {
    let tmp = stage(path, ids).await?;
    commit(&tmp, path).await
}
