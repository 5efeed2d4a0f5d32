use std::collections::{BTreeMap, BTreeSet};

use anvil_refs::{RefKind, RefTarget};
use anvil_types::{CommitId, ObjectId, OperationId, Timestamp, ViewId};
use serde::{Deserialize, Serialize};

use crate::object::{ObjectKind, StoreObject};

/// Snapshot of repository state recorded by an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub head_ids: BTreeSet<CommitId>,
    pub bookmarks: BTreeMap<String, RefTarget>,
    pub tags: BTreeMap<String, RefTarget>,
    /// Workspace id to the commit it has checked out.
    pub workspaces: BTreeMap<String, RefTarget>,
}

impl View {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn refs(&self, kind: RefKind) -> &BTreeMap<String, RefTarget> {
        match kind {
            RefKind::Bookmark => &self.bookmarks,
            RefKind::Tag => &self.tags,
            RefKind::Workspace => &self.workspaces,
        }
    }

    pub fn refs_mut(&mut self, kind: RefKind) -> &mut BTreeMap<String, RefTarget> {
        match kind {
            RefKind::Bookmark => &mut self.bookmarks,
            RefKind::Tag => &mut self.tags,
            RefKind::Workspace => &mut self.workspaces,
        }
    }

    pub fn get_ref(&self, kind: RefKind, name: &str) -> Option<&RefTarget> {
        self.refs(kind).get(name)
    }

    /// Set or (with `None`) remove a reference.
    pub fn set_ref(&mut self, kind: RefKind, name: &str, target: Option<RefTarget>) {
        match target {
            Some(target) => {
                self.refs_mut(kind).insert(name.to_string(), target);
            }
            None => {
                self.refs_mut(kind).remove(name);
            }
        }
    }

    /// All references currently holding a conflicted target.
    pub fn conflicted_refs(&self) -> Vec<(RefKind, &str)> {
        [RefKind::Bookmark, RefKind::Tag, RefKind::Workspace]
            .into_iter()
            .flat_map(|kind| {
                self.refs(kind)
                    .iter()
                    .filter(|(_, t)| t.is_conflicted())
                    .map(move |(name, _)| (kind, name.as_str()))
            })
            .collect()
    }

    /// Every commit the view names: heads and all reference members.
    pub fn all_commit_ids(&self) -> BTreeSet<CommitId> {
        let mut ids = self.head_ids.clone();
        for map in [&self.bookmarks, &self.tags, &self.workspaces] {
            for target in map.values() {
                ids.extend(target.members());
            }
        }
        ids
    }

    pub(crate) fn references(&self) -> Vec<ObjectId> {
        self.all_commit_ids().into_iter().map(ObjectId::from).collect()
    }
}

impl StoreObject for View {
    const KIND: ObjectKind = ObjectKind::View;
    type Id = ViewId;
}

/// Descriptive data attached to an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Short description such as "push" or "bookmark-move".
    pub description: String,
    /// Principal that performed the operation.
    pub actor: String,
    pub tags: BTreeMap<String, String>,
}

impl OperationMetadata {
    /// Metadata stamped with the current time for both start and end.
    pub fn now(description: impl Into<String>, actor: impl Into<String>) -> Self {
        Self::at(Timestamp::now(), description, actor)
    }

    /// Metadata stamped with `time` for both start and end.
    pub fn at(time: Timestamp, description: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            start_time: time,
            end_time: time,
            description: description.into(),
            actor: actor.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// One node of the operation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub view_id: ViewId,
    pub parents: Vec<OperationId>,
    pub metadata: OperationMetadata,
}

impl Operation {
    pub fn new(view_id: ViewId, parents: Vec<OperationId>, metadata: OperationMetadata) -> Self {
        Self {
            view_id,
            parents,
            metadata,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub(crate) fn references(&self) -> Vec<ObjectId> {
        std::iter::once(ObjectId::from(self.view_id))
            .chain(self.parents.iter().map(|p| ObjectId::from(*p)))
            .collect()
    }
}

impl StoreObject for Operation {
    const KIND: ObjectKind = ObjectKind::Operation;
    type Id = OperationId;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(b: u8) -> CommitId {
        CommitId::new(ObjectId::from_hash([b; 32]))
    }

    #[test]
    fn set_and_remove_refs() {
        let mut view = View::empty();
        view.set_ref(RefKind::Bookmark, "main", Some(RefTarget::normal(cid(1))));
        assert_eq!(
            view.get_ref(RefKind::Bookmark, "main"),
            Some(&RefTarget::normal(cid(1)))
        );
        assert!(view.get_ref(RefKind::Tag, "main").is_none());
        view.set_ref(RefKind::Bookmark, "main", None);
        assert!(view.bookmarks.is_empty());
    }

    #[test]
    fn all_commit_ids_flattens_conflicts() {
        let mut view = View::empty();
        view.head_ids.insert(cid(1));
        view.bookmarks.insert(
            "main".into(),
            RefTarget::from_terms(BTreeSet::from([cid(2), cid(3)]), true).unwrap(),
        );
        view.workspaces.insert("default".into(), RefTarget::normal(cid(1)));
        assert_eq!(view.all_commit_ids(), BTreeSet::from([cid(1), cid(2), cid(3)]));
        assert_eq!(view.conflicted_refs(), vec![(RefKind::Bookmark, "main")]);
    }

    #[test]
    fn view_encoding_is_order_independent() {
        let mut a = View::empty();
        a.bookmarks.insert("z".into(), RefTarget::normal(cid(1)));
        a.bookmarks.insert("a".into(), RefTarget::normal(cid(2)));
        let mut b = View::empty();
        b.bookmarks.insert("a".into(), RefTarget::normal(cid(2)));
        b.bookmarks.insert("z".into(), RefTarget::normal(cid(1)));
        assert_eq!(a.compute_id().unwrap(), b.compute_id().unwrap());
    }

    #[test]
    fn operation_references_view_and_parents() {
        let op = Operation::new(
            ViewId::new(ObjectId::from_hash([5; 32])),
            vec![OperationId::new(ObjectId::from_hash([6; 32]))],
            OperationMetadata::now("push", "alice").with_tag("client", "anvil"),
        );
        assert!(!op.is_root());
        assert_eq!(
            op.references(),
            vec![ObjectId::from_hash([5; 32]), ObjectId::from_hash([6; 32])]
        );
        let decoded = Operation::from_stored_object(&op.to_stored_object().unwrap()).unwrap();
        assert_eq!(decoded, op);
    }
}
