//! Spent-nullifier stores.
//!
//! The spent set is append-only. The only mutation is
//! [`NullifierStore::insert_if_absent`], an atomic compare-and-insert, so two
//! concurrent requests carrying the same nullifier can never both be recorded.

use crate::context::ContextId;
use crate::error::{ProtocolError, Result};
use crate::utils::{field_to_bytes, FieldElement, FIELD_BYTES};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

type SpentKey = (ContextId, [u8; FIELD_BYTES]);

fn spent_key(context: ContextId, nullifier_hash: FieldElement) -> SpentKey {
    (context, field_to_bytes(nullifier_hash))
}

/// Durable set of `(context, nullifier hash)` pairs.
pub trait NullifierStore: Send + Sync {
    fn contains(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool>;

    /// Records the pair if absent. Returns `false` if it was already spent.
    fn insert_if_absent(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool>;
}

impl<S: NullifierStore + ?Sized> NullifierStore for std::sync::Arc<S> {
    fn contains(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        (**self).contains(context, nullifier_hash)
    }

    fn insert_if_absent(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        (**self).insert_if_absent(context, nullifier_hash)
    }
}

/// Process-local spent set.
#[derive(Debug, Default)]
pub struct MemoryNullifierStore {
    spent: RwLock<HashSet<SpentKey>>,
}

impl MemoryNullifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.read().is_empty()
    }
}

impl NullifierStore for MemoryNullifierStore {
    fn contains(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        Ok(self
            .spent
            .read()
            .contains(&spent_key(context, nullifier_hash)))
    }

    fn insert_if_absent(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        Ok(self.spent.write().insert(spent_key(context, nullifier_hash)))
    }
}

/// Spent set persisted as an append-only text file.
///
/// One `context_hex:nullifier_hex` pair per line. The file is read once at
/// open; afterwards the in-memory index answers lookups and every new pair is
/// appended and flushed under the same lock that checked it.
#[derive(Debug)]
pub struct FileNullifierStore {
    path: PathBuf,
    spent: Mutex<HashSet<SpentKey>>,
}

fn parse_hex32(s: &str, what: &str) -> Result<[u8; FIELD_BYTES]> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| ProtocolError::Storage(format!("invalid {what} hex '{s}': {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ProtocolError::Storage(format!("{what} must be {FIELD_BYTES} bytes")))
}

impl FileNullifierStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// A final line without its newline is the remains of an interrupted
    /// append; it is logged and cut off. Any other malformed line is a
    /// [`ProtocolError::Storage`] error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                ProtocolError::Storage(format!(
                    "failed to open nullifier file {}: {e}",
                    path.display()
                ))
            })?;

        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| {
            ProtocolError::Storage(format!("failed to read nullifier file: {e}"))
        })?;

        let complete = content.rfind('\n').map_or(0, |i| i + 1);
        if complete < content.len() {
            warn!(
                "Discarding incomplete trailing entry in {}: '{}'",
                path.display(),
                &content[complete..]
            );
            file.set_len(complete as u64).map_err(|e| {
                ProtocolError::Storage(format!("failed to truncate nullifier file: {e}"))
            })?;
        }

        let mut spent = HashSet::new();
        for (line_no, line) in content[..complete].lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (ctx, hash) = line.split_once(':').ok_or_else(|| {
                ProtocolError::Storage(format!("malformed entry at line {}", line_no + 1))
            })?;
            spent.insert((
                ContextId(parse_hex32(ctx, "context")?),
                parse_hex32(hash, "nullifier")?,
            ));
        }

        info!(
            "Loaded {} spent nullifiers from {}",
            spent.len(),
            path.display()
        );

        Ok(Self {
            path,
            spent: Mutex::new(spent),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.spent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.lock().is_empty()
    }
}

impl NullifierStore for FileNullifierStore {
    fn contains(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        Ok(self
            .spent
            .lock()
            .contains(&spent_key(context, nullifier_hash)))
    }

    fn insert_if_absent(&self, context: ContextId, nullifier_hash: FieldElement) -> Result<bool> {
        let key = spent_key(context, nullifier_hash);
        let mut spent = self.spent.lock();
        if spent.contains(&key) {
            return Ok(false);
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| ProtocolError::Storage(format!("failed to open nullifier file: {e}")))?;
        // One write per entry so an interrupted append leaves at most a
        // newline-less tail, which `open` discards.
        let entry = format!("{}:{}\n", hex::encode(key.0 .0), hex::encode(key.1));
        file.write_all(entry.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| ProtocolError::Storage(format!("failed to record nullifier: {e}")))?;

        debug!("Recorded nullifier {} for context {}", hex::encode(key.1), key.0);
        spent.insert(key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pasta_curves::pallas;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn ctx(n: u64) -> ContextId {
        ContextId::from_field(pallas::Base::from(n))
    }

    #[test]
    fn test_memory_insert_if_absent() {
        let store = MemoryNullifierStore::new();
        let hash = pallas::Base::from(42);
        assert!(!store.contains(ctx(1), hash).unwrap());
        assert!(store.insert_if_absent(ctx(1), hash).unwrap());
        assert!(!store.insert_if_absent(ctx(1), hash).unwrap());
        assert!(store.contains(ctx(1), hash).unwrap());
        assert!(store.insert_if_absent(ctx(2), hash).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_concurrent_inserts_record_once() {
        let store = Arc::new(MemoryNullifierStore::new());
        let hash = pallas::Base::from(9);
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = Arc::clone(&store);
                    s.spawn(move || store.insert_if_absent(ctx(1), hash).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("spent.txt");
        let hash = pallas::Base::from(1234);

        {
            let store = FileNullifierStore::open(&path).unwrap();
            assert!(store.insert_if_absent(ctx(1), hash).unwrap());
            assert!(!store.insert_if_absent(ctx(1), hash).unwrap());
        }

        let reopened = FileNullifierStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains(ctx(1), hash).unwrap());
        assert!(!reopened.insert_if_absent(ctx(1), hash).unwrap());
        assert!(reopened.insert_if_absent(ctx(2), hash).unwrap());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("spent.txt");
        fs::write(&path, "not-a-valid-line\n").unwrap();
        assert!(matches!(
            FileNullifierStore::open(&path),
            Err(ProtocolError::Storage(_))
        ));
    }

    #[test]
    fn test_file_store_drops_interrupted_append() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("spent.txt");
        let first = pallas::Base::from(7);
        {
            let store = FileNullifierStore::open(&path).unwrap();
            assert!(store.insert_if_absent(ctx(1), first).unwrap());
        }
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"0a1b2c:3d").unwrap();
        drop(file);

        let store = FileNullifierStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(ctx(1), first).unwrap());
        assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));

        let second = pallas::Base::from(8);
        assert!(store.insert_if_absent(ctx(1), second).unwrap());
        drop(store);

        let reopened = FileNullifierStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains(ctx(1), second).unwrap());
    }
}
