use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anvil_merge::{ConflictNote, StoreAncestry, ViewMerger};
use anvil_oplog::{
    root_operation, FileOpHeads, InMemoryOpHeads, OpHeadsStore, OperationGraph, OplogError,
};
use anvil_pack::{ObjectCollector, PackEntry, PackReader};
use anvil_store::{
    Commit, FileObjectStore, InMemoryObjectStore, ObjectKind, ObjectStore, ObjectStoreExt,
    Operation, OperationMetadata, Signature, Tree, View,
};
use anvil_types::{ChangeId, CommitId, FileId, ObjectId, OperationId, SymlinkId, Timestamp, TreeId};
use tracing::{debug, info, warn};

use crate::error::{RepoError, RepoResult};
use crate::transaction::Transaction;

const STORE_DIR: &str = "store";
const OP_HEADS_FILE: &str = "op_heads";

/// Tag key under which the acting principal is recorded on push operations.
pub const PRINCIPAL_TAG: &str = "principal";

/// What a push installed.
#[derive(Clone, Debug)]
pub struct PushOutcome {
    /// The single operation head after the push.
    pub new_head: OperationId,
    /// The view of `new_head`.
    pub view: View,
    /// The incoming head descended from the server head; no merge was needed.
    pub fast_forward: bool,
    /// References that merging left conflicted, sorted.
    pub conflicts: Vec<ConflictNote>,
    /// How many head-install attempts it took.
    pub attempts: u32,
}

impl PushOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Operations and objects a peer lacks, ready to be packed.
#[derive(Clone, Debug, Default)]
pub struct Outgoing {
    /// Parents first.
    pub operations: Vec<OperationId>,
    /// Dependency order: files, trees, commits, views, operations.
    pub entries: Vec<PackEntry>,
}

/// An Anvil repository: an object store plus the operation log over it.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Repository {
    store: Arc<dyn ObjectStore>,
    graph: Arc<OperationGraph>,
    path: Option<PathBuf>,
}

impl Repository {
    /// A fresh repository held entirely in memory.
    pub fn init_in_memory() -> RepoResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let root = write_root(store.as_ref())?;
        let heads: Arc<dyn OpHeadsStore> = Arc::new(InMemoryOpHeads::new(BTreeSet::from([root])));
        Ok(Self::from_parts(store, heads, None))
    }

    /// Create a repository on disk at `path`.
    ///
    /// Layout: `path/store/{commits,trees,files,operations}` and
    /// `path/op_heads`.
    pub fn init(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        if path.join(OP_HEADS_FILE).exists() {
            return Err(RepoError::AlreadyExists(path.to_path_buf()));
        }
        fs::create_dir_all(path)?;
        let store: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::init(path.join(STORE_DIR))?);
        let root = write_root(store.as_ref())?;
        let heads: Arc<dyn OpHeadsStore> = Arc::new(FileOpHeads::init(
            path.join(OP_HEADS_FILE),
            &BTreeSet::from([root]),
        )?);
        info!(path = %path.display(), root = %root.short_hex(), "initialized repository");
        Ok(Self::from_parts(store, heads, Some(path.to_path_buf())))
    }

    /// Open an existing on-disk repository.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        if !path.join(OP_HEADS_FILE).is_file() {
            return Err(RepoError::NotInitialized(path.to_path_buf()));
        }
        let store: Arc<dyn ObjectStore> = Arc::new(FileObjectStore::open(path.join(STORE_DIR))?);
        let heads: Arc<dyn OpHeadsStore> = Arc::new(FileOpHeads::open(path.join(OP_HEADS_FILE))?);
        debug!(path = %path.display(), "opened repository");
        Ok(Self::from_parts(store, heads, Some(path.to_path_buf())))
    }

    /// Assemble a repository from existing handles. The store must already
    /// hold every operation named by `heads`.
    pub fn from_parts(
        store: Arc<dyn ObjectStore>,
        heads: Arc<dyn OpHeadsStore>,
        path: Option<PathBuf>,
    ) -> Self {
        let graph = Arc::new(OperationGraph::new(store.clone(), heads));
        Self { store, graph, path }
    }

    /// Bound on head-install attempts for appends, pushes and reconciliation.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        let heads = self.graph.heads_store().clone();
        self.graph = Arc::new(OperationGraph::new(self.store.clone(), heads).with_max_retries(max_retries));
        self
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn graph(&self) -> &Arc<OperationGraph> {
        &self.graph
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn heads(&self) -> RepoResult<BTreeSet<OperationId>> {
        Ok(self.graph.current_heads()?)
    }

    pub fn operation(&self, id: &OperationId) -> RepoResult<Arc<Operation>> {
        Ok(self.graph.get(id)?)
    }

    /// The view recorded by operation `id`.
    pub fn view_at(&self, id: &OperationId) -> RepoResult<View> {
        let op = self.graph.get(id)?;
        Ok(self.store.read_object::<View>(op.view_id)?)
    }

    /// Operations reachable from the heads, newest first.
    pub fn log(&self, limit: usize) -> RepoResult<Vec<(OperationId, Arc<Operation>)>> {
        let heads = self.heads()?;
        let all = self.graph.ancestors(&heads)?;
        let ordered = self.graph.topological_order(all)?;
        ordered
            .into_iter()
            .rev()
            .take(limit)
            .map(|id| Ok((id, self.graph.get(&id)?)))
            .collect()
    }

    // ---------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------

    pub fn write_file(&self, contents: &[u8]) -> RepoResult<FileId> {
        Ok(self.store.write_file(contents)?)
    }

    pub fn write_symlink(&self, target: &str) -> RepoResult<SymlinkId> {
        Ok(self.store.write_symlink(target)?)
    }

    pub fn write_tree(&self, tree: &Tree) -> RepoResult<TreeId> {
        Ok(self.store.write_object(tree)?)
    }

    pub fn write_commit(&self, commit: &Commit) -> RepoResult<CommitId> {
        Ok(self.store.write_object(commit)?)
    }

    /// Create a commit for a new change on top of `parents`.
    pub fn new_commit(
        &self,
        parents: Vec<CommitId>,
        tree: TreeId,
        description: impl Into<String>,
        author: Signature,
    ) -> RepoResult<CommitId> {
        let commit = Commit {
            parents,
            predecessors: Vec::new(),
            root_tree: vec![tree],
            change_id: ChangeId::generate(),
            description: description.into(),
            committer: author.clone(),
            author,
            secure_sig: None,
        };
        self.write_commit(&commit)
    }

    // ---------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------

    /// Start a transaction on the current (reconciled) head.
    pub fn start_transaction(
        &self,
        description: impl Into<String>,
        actor: impl Into<String>,
    ) -> RepoResult<Transaction<'_>> {
        let actor = actor.into();
        let base = self.reconcile_heads(&actor)?;
        let view = self.view_at(&base)?;
        Ok(Transaction::new(
            self,
            base,
            view,
            OperationMetadata::now(description, actor),
        ))
    }

    /// Collapse divergent heads into one by folding pairwise merges.
    ///
    /// Returns the single head. With one head already, nothing is written.
    pub fn reconcile_heads(&self, actor: &str) -> RepoResult<OperationId> {
        let max = self.graph.max_retries();
        for attempt in 1..=max {
            let current = self.heads()?;
            let (head, notes) = self.fold_heads(&current, actor)?;
            if current.len() == 1 {
                return Ok(head);
            }
            if self.graph.update_heads(&current, BTreeSet::from([head]))? {
                info!(
                    op = %head.short_hex(),
                    merged = current.len(),
                    conflicts = notes.len(),
                    "reconciled divergent heads"
                );
                return Ok(head);
            }
            warn!(attempt, "op heads moved during reconciliation, retrying");
        }
        Err(OplogError::RaceExceeded { attempts: max }.into())
    }

    /// Install the pushed operation heads `incoming`.
    ///
    /// The operations must already be stored. Fast-forwards when the server
    /// head is an ancestor of the incoming head; otherwise merges the two
    /// views over their common ancestor and records a merge operation whose
    /// parents are exactly the two divergent heads. Head installation is a
    /// compare-and-swap retried up to the configured bound.
    pub fn install_incoming(
        &self,
        incoming: &BTreeSet<OperationId>,
        principal: &str,
    ) -> RepoResult<PushOutcome> {
        for id in incoming {
            if !self.graph.contains(id)? {
                return Err(OplogError::UnknownOperation(*id).into());
            }
        }

        // Stamped once so a retry against unchanged heads rewrites the same
        // merge operation.
        let meta = OperationMetadata::now("push", principal).with_tag(PRINCIPAL_TAG, principal);
        let max = self.graph.max_retries();
        for attempt in 1..=max {
            let current = self.heads()?;
            let (server_head, mut conflicts) = self.fold_heads(&current, principal)?;
            let (incoming_head, incoming_conflicts) = self.fold_heads(incoming, principal)?;
            conflicts.extend(incoming_conflicts);

            let fast_forward = self.graph.is_ancestor(&server_head, &incoming_head)?;
            let (new_head, merge_conflicts) =
                self.merge_operations(server_head, incoming_head, meta.clone())?;
            conflicts.extend(merge_conflicts);

            if self.graph.update_heads(&current, BTreeSet::from([new_head]))? {
                let conflicts: Vec<ConflictNote> =
                    conflicts.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
                info!(
                    op = %new_head.short_hex(),
                    fast_forward,
                    conflicts = conflicts.len(),
                    attempt,
                    "installed pushed operations"
                );
                return Ok(PushOutcome {
                    new_head,
                    view: self.view_at(&new_head)?,
                    fast_forward,
                    conflicts,
                    attempts: attempt,
                });
            }
            warn!(attempt, "op heads moved during push, retrying");
        }
        Err(OplogError::RaceExceeded { attempts: max }.into())
    }

    /// Fold a head set into one operation, merging pairwise in id order.
    fn fold_heads(
        &self,
        heads: &BTreeSet<OperationId>,
        actor: &str,
    ) -> RepoResult<(OperationId, Vec<ConflictNote>)> {
        let mut iter = heads.iter().copied();
        let mut acc = iter
            .next()
            .ok_or_else(|| OplogError::CorruptHeads("empty head set".into()))?;
        let mut conflicts = Vec::new();
        for next in iter {
            let meta = self.reconcile_metadata(acc, next, actor)?;
            let (merged, notes) = self.merge_operations(acc, next, meta)?;
            acc = merged;
            conflicts.extend(notes);
        }
        Ok((acc, conflicts))
    }

    /// Reconcile merges are stamped with the later parent's end time, so
    /// folding the same heads again yields the same operation id.
    fn reconcile_metadata(
        &self,
        left: OperationId,
        right: OperationId,
        actor: &str,
    ) -> RepoResult<OperationMetadata> {
        let left_end = self.graph.get(&left)?.metadata.end_time;
        let right_end = self.graph.get(&right)?.metadata.end_time;
        Ok(OperationMetadata::at(
            left_end.max(right_end),
            "reconcile divergent operations",
            actor,
        ))
    }

    /// Merge two operations. When one already contains the other, that one
    /// is returned and nothing is written.
    fn merge_operations(
        &self,
        left: OperationId,
        right: OperationId,
        metadata: OperationMetadata,
    ) -> RepoResult<(OperationId, Vec<ConflictNote>)> {
        if self.graph.is_ancestor(&left, &right)? {
            return Ok((right, Vec::new()));
        }
        if self.graph.is_ancestor(&right, &left)? {
            return Ok((left, Vec::new()));
        }

        let base = self
            .graph
            .find_common_ancestor(&BTreeSet::from([left]), &BTreeSet::from([right]))?;
        let base_view = match base {
            Some(id) => self.view_at(&id)?,
            None => View::empty(),
        };
        let left_view = self.view_at(&left)?;
        let right_view = self.view_at(&right)?;

        let ancestry = StoreAncestry::new(self.store.clone());
        let outcome = ViewMerger::new(&ancestry).merge(&base_view, &left_view, &right_view)?;
        let view_id = self.store.write_object(&outcome.view)?;
        let op = Operation::new(view_id, vec![left, right], metadata);
        let id = self.graph.insert(&op)?;
        debug!(
            op = %id.short_hex(),
            left = %left.short_hex(),
            right = %right.short_hex(),
            base = ?base.map(|b| b.short_hex()),
            conflicts = outcome.conflicts.len(),
            "merged divergent operations"
        );
        Ok((id, outcome.conflicts))
    }

    // ---------------------------------------------------------------
    // Transfer
    // ---------------------------------------------------------------

    /// What a peer that already has `known` (and their history) is missing
    /// to reach our current heads.
    ///
    /// Ids in `known` that this repository has never seen are ignored.
    pub fn outgoing(&self, known: &BTreeSet<OperationId>) -> RepoResult<Outgoing> {
        let mut recognized = BTreeSet::new();
        for id in known {
            if self.graph.contains(id)? {
                recognized.insert(*id);
            }
        }
        let heads = self.heads()?;
        let operations = self.graph.operations_between(&heads, &recognized)?;
        if operations.is_empty() {
            return Ok(Outgoing::default());
        }

        let collector = ObjectCollector::new(self.store.as_ref());
        let have_commits = collector.reachable_commits(collector.view_commits(&recognized)?)?;
        let entries = collector.collect(&operations, &have_commits)?;
        debug!(
            operations = operations.len(),
            objects = entries.len(),
            known = recognized.len(),
            "computed outgoing objects"
        );
        Ok(Outgoing {
            operations,
            entries,
        })
    }

    /// Validate and store a batch of objects, all or nothing.
    pub fn apply_entries(&self, entries: Vec<PackEntry>) -> RepoResult<usize> {
        let pairs: Vec<_> = entries.into_iter().map(PackEntry::into_pair).collect();
        let written = self.store.apply_batch(&pairs)?;
        debug!(objects = pairs.len(), written = written.len(), "applied object batch");
        Ok(written.len())
    }

    /// Decode, verify and store a pack. Returns the decoded entries' ids and
    /// kinds in pack order.
    pub fn apply_pack(
        &self,
        pack: &[u8],
        reader: &PackReader,
    ) -> RepoResult<Vec<(ObjectId, ObjectKind)>> {
        let entries = reader.read_all(pack)?;
        let index = entries.iter().map(|e| (e.id, e.kind())).collect();
        self.apply_entries(entries)?;
        Ok(index)
    }

    /// Register stored operations with the log without moving heads.
    pub fn insert_operations(&self, ops: &[OperationId]) -> RepoResult<()> {
        for id in ops {
            let op = self.store.read_object::<Operation>(*id)?;
            self.graph.insert(&op)?;
        }
        Ok(())
    }

    /// Register stored operations (parents first) and fold them into the
    /// heads. Operations this log already had are accepted but never come
    /// back as heads next to their own descendants.
    pub fn import_operations(&self, ops: &[OperationId]) -> RepoResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.insert_operations(ops)?;
        let heads = self.graph.add_heads(&ops.iter().copied().collect())?;
        debug!(imported = ops.len(), heads = heads.len(), "imported operations");
        Ok(())
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("graph", &self.graph)
            .finish()
    }
}

/// Store the empty view and the root operation. Both are deterministic, so
/// every repository starts from the same root.
fn write_root(store: &dyn ObjectStore) -> RepoResult<OperationId> {
    let view_id = store.write_object(&View::empty())?;
    Ok(store.write_object(&root_operation(view_id))?)
}

/// A signature stamped now, for helpers and tests.
pub fn signature_now(name: &str, email: &str) -> Signature {
    Signature::new(name, email, Timestamp::now())
}
