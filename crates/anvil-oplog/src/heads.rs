//! The operation heads pointer.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anvil_types::OperationId;
use tracing::debug;

use crate::error::{OplogError, OplogResult};

/// Compare-and-swap handle on the set of operation heads.
///
/// This is the only mutable state shared between writers. Implementations
/// must make `compare_and_swap` atomic with respect to every other call on
/// the same handle.
pub trait OpHeadsStore: Send + Sync {
    /// Read the current head set.
    fn get(&self) -> OplogResult<BTreeSet<OperationId>>;

    /// Replace the head set with `new` if it still equals `expected`.
    ///
    /// Returns `Ok(false)` without changing anything when another writer got
    /// there first.
    fn compare_and_swap(
        &self,
        expected: &BTreeSet<OperationId>,
        new: BTreeSet<OperationId>,
    ) -> OplogResult<bool>;
}

/// Head set held in memory.
#[derive(Debug, Default)]
pub struct InMemoryOpHeads {
    heads: Mutex<BTreeSet<OperationId>>,
}

impl InMemoryOpHeads {
    pub fn new(initial: BTreeSet<OperationId>) -> Self {
        Self {
            heads: Mutex::new(initial),
        }
    }
}

impl OpHeadsStore for InMemoryOpHeads {
    fn get(&self) -> OplogResult<BTreeSet<OperationId>> {
        Ok(self.heads.lock().map_err(|_| OplogError::LockPoisoned)?.clone())
    }

    fn compare_and_swap(
        &self,
        expected: &BTreeSet<OperationId>,
        new: BTreeSet<OperationId>,
    ) -> OplogResult<bool> {
        let mut heads = self.heads.lock().map_err(|_| OplogError::LockPoisoned)?;
        if *heads != *expected {
            return Ok(false);
        }
        *heads = new;
        Ok(true)
    }
}

/// Head set persisted in a single file, one hex id per line.
///
/// Every update writes a temp file next to the target and renames it over
/// the old one, so readers always see a complete head set. The in-process
/// mutex serializes compare-and-swap within one server process.
#[derive(Debug)]
pub struct FileOpHeads {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileOpHeads {
    /// Create the heads file with an initial head set, replacing any
    /// existing one.
    pub fn init(path: impl AsRef<Path>, initial: &BTreeSet<OperationId>) -> OplogResult<Self> {
        let heads = Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        };
        heads.write(initial)?;
        Ok(heads)
    }

    /// Open an existing heads file.
    pub fn open(path: impl AsRef<Path>) -> OplogResult<Self> {
        let heads = Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        };
        heads.read()?;
        Ok(heads)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> OplogResult<BTreeSet<OperationId>> {
        let text = fs::read_to_string(&self.path)?;
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                OperationId::from_hex(line)
                    .map_err(|e| OplogError::CorruptHeads(format!("{line:?}: {e}")))
            })
            .collect()
    }

    fn write(&self, heads: &BTreeSet<OperationId>) -> OplogResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        for id in heads {
            writeln!(tmp, "{}", id.to_hex())?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| OplogError::Io(e.error))?;
        Ok(())
    }
}

impl OpHeadsStore for FileOpHeads {
    fn get(&self) -> OplogResult<BTreeSet<OperationId>> {
        let _guard = self.lock.lock().map_err(|_| OplogError::LockPoisoned)?;
        self.read()
    }

    fn compare_and_swap(
        &self,
        expected: &BTreeSet<OperationId>,
        new: BTreeSet<OperationId>,
    ) -> OplogResult<bool> {
        let _guard = self.lock.lock().map_err(|_| OplogError::LockPoisoned)?;
        let current = self.read()?;
        if current != *expected {
            debug!(
                expected = expected.len(),
                current = current.len(),
                "op heads moved, CAS refused"
            );
            return Ok(false);
        }
        self.write(&new)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_types::ObjectId;

    fn op(b: u8) -> OperationId {
        OperationId::new(ObjectId::from_hash([b; 32]))
    }

    fn check_cas(store: &dyn OpHeadsStore) {
        let initial = store.get().unwrap();
        let next = BTreeSet::from([op(2), op(3)]);
        assert!(store.compare_and_swap(&initial, next.clone()).unwrap());
        assert_eq!(store.get().unwrap(), next);

        // A stale expectation is refused and leaves the heads alone.
        assert!(!store.compare_and_swap(&initial, BTreeSet::from([op(9)])).unwrap());
        assert_eq!(store.get().unwrap(), next);
    }

    #[test]
    fn memory_cas() {
        check_cas(&InMemoryOpHeads::new(BTreeSet::from([op(1)])));
    }

    #[test]
    fn file_cas() {
        let dir = tempfile::tempdir().unwrap();
        let heads = FileOpHeads::init(dir.path().join("op_heads"), &BTreeSet::from([op(1)])).unwrap();
        check_cas(&heads);
    }

    #[test]
    fn file_heads_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op_heads");
        let set = BTreeSet::from([op(4), op(5)]);
        FileOpHeads::init(&path, &set).unwrap();
        assert_eq!(FileOpHeads::open(&path).unwrap().get().unwrap(), set);
    }

    #[test]
    fn corrupt_heads_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op_heads");
        fs::write(&path, "not-hex\n").unwrap();
        assert!(matches!(
            FileOpHeads::open(&path),
            Err(OplogError::CorruptHeads(_))
        ));
    }

    #[test]
    fn concurrent_cas_has_one_winner() {
        let heads = std::sync::Arc::new(InMemoryOpHeads::new(BTreeSet::from([op(0)])));
        let expected = BTreeSet::from([op(0)]);
        let handles: Vec<_> = (1..=8u8)
            .map(|i| {
                let heads = heads.clone();
                let expected = expected.clone();
                std::thread::spawn(move || {
                    heads.compare_and_swap(&expected, BTreeSet::from([op(i)])).unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
