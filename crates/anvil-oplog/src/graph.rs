//! The operation DAG and its ancestry queries.
//!
//! [`OperationGraph`] stores operations in the object store and caches the
//! decoded ones in memory (operations are immutable, so the cache never goes
//! stale). Heads live behind an [`OpHeadsStore`].
//!
//! # Invariants
//!
//! - Every parent of a stored operation is itself stored.
//! - Every operation's view is stored before the operation.
//! - Heads only change through compare-and-swap.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use anvil_store::{ObjectStore, ObjectStoreExt, Operation, OperationMetadata, StoreError, StoreObject};
use anvil_types::{OperationId, Timestamp, ViewId};
use tracing::{debug, warn};

use crate::error::{OplogError, OplogResult};
use crate::heads::OpHeadsStore;

/// Default bound on compare-and-swap attempts when installing heads.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

/// The operation every repository starts from.
///
/// It is fully deterministic (epoch timestamps, no actor), so independently
/// initialized repositories share it and always have a common ancestor.
pub fn root_operation(view_id: ViewId) -> Operation {
    Operation::new(
        view_id,
        Vec::new(),
        OperationMetadata {
            start_time: Timestamp::epoch(),
            end_time: Timestamp::epoch(),
            description: "root".into(),
            actor: String::new(),
            tags: Default::default(),
        },
    )
}

/// Operation DAG backed by an object store, plus the heads pointer.
pub struct OperationGraph {
    store: Arc<dyn ObjectStore>,
    heads: Arc<dyn OpHeadsStore>,
    max_retries: u32,
    ops: RwLock<HashMap<OperationId, Arc<Operation>>>,
    generations: RwLock<HashMap<OperationId, u64>>,
}

impl OperationGraph {
    pub fn new(store: Arc<dyn ObjectStore>, heads: Arc<dyn OpHeadsStore>) -> Self {
        Self {
            store,
            heads,
            max_retries: DEFAULT_MAX_RETRIES,
            ops: RwLock::new(HashMap::new()),
            generations: RwLock::new(HashMap::new()),
        }
    }

    /// Override the bound on head-install attempts (minimum 1).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn heads_store(&self) -> &Arc<dyn OpHeadsStore> {
        &self.heads
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Load an operation, failing with [`OplogError::UnknownOperation`].
    pub fn get(&self, id: &OperationId) -> OplogResult<Arc<Operation>> {
        if let Some(op) = self.ops.read().map_err(|_| OplogError::LockPoisoned)?.get(id) {
            return Ok(op.clone());
        }
        let op = match self.store.read_object::<Operation>(*id) {
            Ok(op) => Arc::new(op),
            Err(StoreError::NotFound(_)) => return Err(OplogError::UnknownOperation(*id)),
            Err(e) => return Err(e.into()),
        };
        self.ops
            .write()
            .map_err(|_| OplogError::LockPoisoned)?
            .insert(*id, op.clone());
        Ok(op)
    }

    pub fn contains(&self, id: &OperationId) -> OplogResult<bool> {
        if self.ops.read().map_err(|_| OplogError::LockPoisoned)?.contains_key(id) {
            return Ok(true);
        }
        Ok(self.store.exists(&(*id).into())?)
    }

    pub fn current_heads(&self) -> OplogResult<BTreeSet<OperationId>> {
        self.heads.get()
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Validate and store an operation without touching the heads.
    pub fn insert(&self, op: &Operation) -> OplogResult<OperationId> {
        let id = op.compute_id()?;
        for parent in &op.parents {
            if !self.contains(parent)? {
                return Err(OplogError::DanglingParent {
                    op: id,
                    parent: *parent,
                });
            }
        }
        if !self.store.exists(&op.view_id.into())? {
            return Err(OplogError::MissingView {
                op: id,
                view: op.view_id,
            });
        }
        self.store.write_object(op)?;
        self.ops
            .write()
            .map_err(|_| OplogError::LockPoisoned)?
            .insert(id, Arc::new(op.clone()));
        debug!(op = %id.short_hex(), parents = op.parents.len(), "stored operation");
        Ok(id)
    }

    /// Store an operation and make it a head, replacing its parents.
    ///
    /// The head update is a compare-and-swap loop bounded by
    /// [`max_retries`](Self::max_retries).
    pub fn append(&self, op: &Operation) -> OplogResult<OperationId> {
        let id = self.insert(op)?;
        for attempt in 1..=self.max_retries {
            let current = self.heads.get()?;
            let mut next: BTreeSet<OperationId> = current
                .iter()
                .filter(|h| !op.parents.contains(h))
                .copied()
                .collect();
            next.insert(id);
            if self.heads.compare_and_swap(&current, next)? {
                debug!(op = %id.short_hex(), attempt, "appended operation");
                return Ok(id);
            }
            warn!(op = %id.short_hex(), attempt, "op heads changed during append, retrying");
        }
        Err(OplogError::RaceExceeded {
            attempts: self.max_retries,
        })
    }

    /// Install `new` as the head set if the heads still equal `expected`.
    pub fn update_heads(
        &self,
        expected: &BTreeSet<OperationId>,
        new: BTreeSet<OperationId>,
    ) -> OplogResult<bool> {
        self.heads.compare_and_swap(expected, new)
    }

    /// Merge already stored operations into the head set.
    ///
    /// The installed set is the current heads plus `ops`, minus every
    /// operation that is an ancestor of another member, so operations the
    /// log already holds are absorbed without reappearing as heads.
    pub fn add_heads(&self, ops: &BTreeSet<OperationId>) -> OplogResult<BTreeSet<OperationId>> {
        for attempt in 1..=self.max_retries {
            let current = self.heads.get()?;
            let next = self.reduce_heads(current.union(ops).copied().collect())?;
            if next == current {
                return Ok(current);
            }
            if self.heads.compare_and_swap(&current, next.clone())? {
                debug!(added = ops.len(), heads = next.len(), attempt, "merged into heads");
                return Ok(next);
            }
            warn!(attempt, "op heads changed while adding heads, retrying");
        }
        Err(OplogError::RaceExceeded {
            attempts: self.max_retries,
        })
    }

    /// Drop every member that is reachable from another member.
    pub fn reduce_heads(&self, ids: BTreeSet<OperationId>) -> OplogResult<BTreeSet<OperationId>> {
        if ids.len() < 2 {
            return Ok(ids);
        }
        let mut parents = BTreeSet::new();
        for id in &ids {
            parents.extend(self.get(id)?.parents.iter().copied());
        }
        let hidden = self.ancestors(&parents)?;
        Ok(ids.into_iter().filter(|id| !hidden.contains(id)).collect())
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    /// Length of the longest parent path from this operation to a root.
    pub fn generation(&self, id: &OperationId) -> OplogResult<u64> {
        if let Some(g) = self.cached_generation(id)? {
            return Ok(g);
        }
        // Iterative post-order walk; operation chains can be very long.
        let mut stack = vec![*id];
        while let Some(top) = stack.last().copied() {
            if self.cached_generation(&top)?.is_some() {
                stack.pop();
                continue;
            }
            let op = self.get(&top)?;
            let mut pending = Vec::new();
            let mut max_parent: Option<u64> = None;
            for parent in &op.parents {
                match self.cached_generation(parent)? {
                    Some(g) => max_parent = Some(max_parent.map_or(g, |m| m.max(g))),
                    None => pending.push(*parent),
                }
            }
            if pending.is_empty() {
                let g = max_parent.map_or(0, |m| m + 1);
                self.generations
                    .write()
                    .map_err(|_| OplogError::LockPoisoned)?
                    .insert(top, g);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }
        self.cached_generation(id)?
            .ok_or(OplogError::UnknownOperation(*id))
    }

    fn cached_generation(&self, id: &OperationId) -> OplogResult<Option<u64>> {
        Ok(self
            .generations
            .read()
            .map_err(|_| OplogError::LockPoisoned)?
            .get(id)
            .copied())
    }

    /// Every operation reachable from `ids`, the starting ones included.
    /// Ids the store does not know are skipped.
    pub fn ancestors<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a OperationId>,
    ) -> OplogResult<HashSet<OperationId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for id in ids {
            if self.contains(id)? && visited.insert(*id) {
                queue.push_back(*id);
            }
        }
        while let Some(current) = queue.pop_front() {
            for parent in &self.get(&current)?.parents {
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        Ok(visited)
    }

    /// Whether `ancestor` is reachable from `descendant`. Every operation is
    /// its own ancestor.
    pub fn is_ancestor(&self, ancestor: &OperationId, descendant: &OperationId) -> OplogResult<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        if !self.contains(descendant)? {
            return Ok(false);
        }
        let target_gen = match self.contains(ancestor)? {
            true => self.generation(ancestor)?,
            false => return Ok(false),
        };
        let mut visited = HashSet::from([*descendant]);
        let mut queue = VecDeque::from([*descendant]);
        while let Some(current) = queue.pop_front() {
            for parent in &self.get(&current)?.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                // Generations only shrink going up, so nothing below the
                // ancestor's generation can lead to it.
                if self.generation(parent)? > target_gen && visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        Ok(false)
    }

    /// The most recent operation reachable from both sets.
    ///
    /// "Most recent" is the highest generation; ties go to the smallest id.
    /// Unknown ids are ignored. `None` means the sets share no history.
    pub fn find_common_ancestor(
        &self,
        a: &BTreeSet<OperationId>,
        b: &BTreeSet<OperationId>,
    ) -> OplogResult<Option<OperationId>> {
        let from_a = self.ancestors(a)?;
        let from_b = self.ancestors(b)?;
        let mut best: Option<(u64, OperationId)> = None;
        for id in from_a.intersection(&from_b) {
            let g = self.generation(id)?;
            best = match best {
                Some((bg, bid)) if bg > g || (bg == g && bid < *id) => Some((bg, bid)),
                _ => Some((g, *id)),
            };
        }
        Ok(best.map(|(_, id)| id))
    }

    /// Sort operations so that every parent precedes its children.
    ///
    /// Ordered by generation, then by id, which is deterministic and places
    /// parents first even when they are connected through operations
    /// outside the given set.
    pub fn topological_order(
        &self,
        ids: impl IntoIterator<Item = OperationId>,
    ) -> OplogResult<Vec<OperationId>> {
        let mut keyed = ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|id| Ok((self.generation(&id)?, id)))
            .collect::<OplogResult<Vec<_>>>()?;
        keyed.sort();
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }

    /// Operations reachable from `heads` but not from `known`, parents first.
    pub fn operations_between(
        &self,
        heads: &BTreeSet<OperationId>,
        known: &BTreeSet<OperationId>,
    ) -> OplogResult<Vec<OperationId>> {
        let have = self.ancestors(known)?;
        let wanted = self
            .ancestors(heads)?
            .into_iter()
            .filter(|id| !have.contains(id));
        self.topological_order(wanted)
    }
}

impl std::fmt::Debug for OperationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationGraph")
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heads::InMemoryOpHeads;
    use anvil_store::{InMemoryObjectStore, View};

    struct Fixture {
        graph: OperationGraph,
        view: ViewId,
        root: OperationId,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let view = store.write_object(&View::empty()).unwrap();
        let root_op = root_operation(view);
        let root = store.write_object(&root_op).unwrap();
        let heads = Arc::new(InMemoryOpHeads::new(BTreeSet::from([root])));
        Fixture {
            graph: OperationGraph::new(store, heads),
            view,
            root,
        }
    }

    fn op(f: &Fixture, name: &str, parents: &[OperationId]) -> Operation {
        let mut meta = OperationMetadata::now(name, "test");
        meta.start_time = Timestamp::epoch();
        meta.end_time = Timestamp::epoch();
        Operation::new(f.view, parents.to_vec(), meta)
    }

    // ---------------------------------------------------------------
    // insert / append
    // ---------------------------------------------------------------

    #[test]
    fn root_operation_is_deterministic() {
        let view = View::empty().compute_id().unwrap();
        assert_eq!(
            root_operation(view).compute_id().unwrap(),
            root_operation(view).compute_id().unwrap()
        );
    }

    #[test]
    fn append_replaces_parent_head() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        assert_eq!(f.graph.current_heads().unwrap(), BTreeSet::from([a]));
        let b = f.graph.append(&op(&f, "b", &[a])).unwrap();
        assert_eq!(f.graph.current_heads().unwrap(), BTreeSet::from([b]));
    }

    #[test]
    fn divergent_appends_leave_two_heads() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.append(&op(&f, "b", &[f.root])).unwrap();
        assert_eq!(f.graph.current_heads().unwrap(), BTreeSet::from([a, b]));
    }

    #[test]
    fn insert_leaves_heads_alone() {
        let f = fixture();
        let a = f.graph.insert(&op(&f, "a", &[f.root])).unwrap();
        assert!(f.graph.contains(&a).unwrap());
        assert_eq!(f.graph.current_heads().unwrap(), BTreeSet::from([f.root]));
    }

    #[test]
    fn append_rejects_dangling_parent() {
        let f = fixture();
        let ghost = OperationId::new(anvil_types::ObjectId::from_hash([0xee; 32]));
        let err = f.graph.append(&op(&f, "x", &[ghost])).unwrap_err();
        assert!(matches!(err, OplogError::DanglingParent { parent, .. } if parent == ghost));
        assert_eq!(f.graph.current_heads().unwrap(), BTreeSet::from([f.root]));
    }

    #[test]
    fn insert_rejects_missing_view() {
        let f = fixture();
        let mut bad = op(&f, "x", &[f.root]);
        bad.view_id = ViewId::new(anvil_types::ObjectId::from_hash([0xdd; 32]));
        assert!(matches!(
            f.graph.insert(&bad),
            Err(OplogError::MissingView { .. })
        ));
    }

    #[test]
    fn get_unknown_operation() {
        let f = fixture();
        let ghost = OperationId::new(anvil_types::ObjectId::from_hash([1; 32]));
        assert!(matches!(
            f.graph.get(&ghost),
            Err(OplogError::UnknownOperation(id)) if id == ghost
        ));
    }

    #[test]
    fn add_heads_absorbs_known_ancestors() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.append(&op(&f, "b", &[a])).unwrap();
        let side = f.graph.insert(&op(&f, "side", &[f.root])).unwrap();

        let heads = f.graph.add_heads(&BTreeSet::from([f.root, a, side])).unwrap();
        assert_eq!(heads, BTreeSet::from([b, side]));
        assert_eq!(f.graph.current_heads().unwrap(), heads);

        // Nothing new: the heads stay put.
        assert_eq!(f.graph.add_heads(&BTreeSet::from([a])).unwrap(), heads);
    }

    #[test]
    fn reduce_heads_keeps_only_maxima() {
        let f = fixture();
        let a = f.graph.insert(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.insert(&op(&f, "b", &[a])).unwrap();
        let c = f.graph.insert(&op(&f, "c", &[f.root])).unwrap();
        assert_eq!(
            f.graph.reduce_heads(BTreeSet::from([f.root, a, b, c])).unwrap(),
            BTreeSet::from([b, c])
        );
    }

    // ---------------------------------------------------------------
    // Bounded retries
    // ---------------------------------------------------------------

    struct AlwaysMoving(InMemoryOpHeads);

    impl OpHeadsStore for AlwaysMoving {
        fn get(&self) -> OplogResult<BTreeSet<OperationId>> {
            self.0.get()
        }

        fn compare_and_swap(
            &self,
            _expected: &BTreeSet<OperationId>,
            _new: BTreeSet<OperationId>,
        ) -> OplogResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn append_gives_up_after_bounded_retries() {
        let f = fixture();
        let heads = Arc::new(AlwaysMoving(InMemoryOpHeads::new(BTreeSet::from([f.root]))));
        let graph = OperationGraph::new(f.graph.store().clone(), heads).with_max_retries(3);
        let err = graph.append(&op(&f, "a", &[f.root])).unwrap_err();
        assert!(matches!(err, OplogError::RaceExceeded { attempts: 3 }));
    }

    #[test]
    fn concurrent_appends_all_land() {
        let f = Arc::new(fixture());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let f = f.clone();
                std::thread::spawn(move || {
                    let root = f.root;
                    f.graph.append(&op(&f, &format!("w{i}"), &[root])).unwrap()
                })
            })
            .collect();
        let ids: BTreeSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(f.graph.current_heads().unwrap(), ids);
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    #[test]
    fn generations_follow_longest_path() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.append(&op(&f, "b", &[a])).unwrap();
        let c = f.graph.insert(&op(&f, "c", &[f.root])).unwrap();
        let m = f.graph.insert(&op(&f, "m", &[b, c])).unwrap();
        assert_eq!(f.graph.generation(&f.root).unwrap(), 0);
        assert_eq!(f.graph.generation(&c).unwrap(), 1);
        assert_eq!(f.graph.generation(&m).unwrap(), 3);
    }

    #[test]
    fn common_ancestor_of_divergent_heads() {
        let f = fixture();
        let base = f.graph.append(&op(&f, "base", &[f.root])).unwrap();
        let left = f.graph.append(&op(&f, "left", &[base])).unwrap();
        let right = f.graph.insert(&op(&f, "right", &[base])).unwrap();
        let right2 = f.graph.insert(&op(&f, "right2", &[right])).unwrap();
        assert_eq!(
            f.graph
                .find_common_ancestor(&BTreeSet::from([left]), &BTreeSet::from([right2]))
                .unwrap(),
            Some(base)
        );
        // An ancestor of the other side is itself the common ancestor.
        assert_eq!(
            f.graph
                .find_common_ancestor(&BTreeSet::from([base]), &BTreeSet::from([right2]))
                .unwrap(),
            Some(base)
        );
    }

    #[test]
    fn common_ancestor_tie_breaks_on_smallest_id() {
        let f = fixture();
        let a = f.graph.insert(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.insert(&op(&f, "b", &[f.root])).unwrap();
        let m1 = f.graph.insert(&op(&f, "m1", &[a, b])).unwrap();
        let m2 = f.graph.insert(&op(&f, "m2", &[b, a])).unwrap();
        let found = f
            .graph
            .find_common_ancestor(&BTreeSet::from([m1]), &BTreeSet::from([m2]))
            .unwrap();
        assert_eq!(found, Some(a.min(b)));
    }

    #[test]
    fn common_ancestor_ignores_unknown_ids() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let ghost = OperationId::new(anvil_types::ObjectId::from_hash([0x42; 32]));
        assert_eq!(
            f.graph
                .find_common_ancestor(&BTreeSet::from([a, ghost]), &BTreeSet::from([f.root]))
                .unwrap(),
            Some(f.root)
        );
        assert_eq!(
            f.graph
                .find_common_ancestor(&BTreeSet::from([ghost]), &BTreeSet::from([a]))
                .unwrap(),
            None
        );
    }

    #[test]
    fn is_ancestor_queries() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.append(&op(&f, "b", &[a])).unwrap();
        let side = f.graph.insert(&op(&f, "side", &[f.root])).unwrap();
        assert!(f.graph.is_ancestor(&f.root, &b).unwrap());
        assert!(f.graph.is_ancestor(&a, &b).unwrap());
        assert!(f.graph.is_ancestor(&b, &b).unwrap());
        assert!(!f.graph.is_ancestor(&b, &a).unwrap());
        assert!(!f.graph.is_ancestor(&side, &b).unwrap());
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let f = fixture();
        let a = f.graph.insert(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.insert(&op(&f, "b", &[a])).unwrap();
        let c = f.graph.insert(&op(&f, "c", &[f.root])).unwrap();
        let m = f.graph.insert(&op(&f, "m", &[b, c])).unwrap();
        let order = f.graph.topological_order([m, c, b, a, f.root]).unwrap();
        let pos = |id: &OperationId| order.iter().position(|x| x == id).unwrap();
        assert_eq!(order.len(), 5);
        assert_eq!(order[0], f.root);
        assert!(pos(&a) < pos(&b));
        assert!(pos(&b) < pos(&m));
        assert!(pos(&c) < pos(&m));
        assert_eq!(pos(&a).min(pos(&c)), 1);
    }

    #[test]
    fn operations_between_excludes_known_history() {
        let f = fixture();
        let a = f.graph.append(&op(&f, "a", &[f.root])).unwrap();
        let b = f.graph.append(&op(&f, "b", &[a])).unwrap();
        let c = f.graph.append(&op(&f, "c", &[b])).unwrap();
        let missing = f
            .graph
            .operations_between(&BTreeSet::from([c]), &BTreeSet::from([a]))
            .unwrap();
        assert_eq!(missing, vec![b, c]);
        assert!(f
            .graph
            .operations_between(&BTreeSet::from([c]), &BTreeSet::from([c]))
            .unwrap()
            .is_empty());
    }
}
