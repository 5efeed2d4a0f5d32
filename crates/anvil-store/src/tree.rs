use std::collections::BTreeMap;

use anvil_types::{FileId, ObjectId, SymlinkId, TreeId};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoreObject};

/// The value stored under one name in a [`Tree`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeValue {
    File { id: FileId, executable: bool },
    Symlink(SymlinkId),
    Tree(TreeId),
    /// Unresolved content conflict: the competing values, kept as they were.
    Conflict(Vec<TreeValue>),
}

impl TreeValue {
    fn collect_references(&self, out: &mut Vec<ObjectId>) {
        match self {
            TreeValue::File { id, .. } => out.push((*id).into()),
            TreeValue::Symlink(id) => out.push((*id).into()),
            TreeValue::Tree(id) => out.push((*id).into()),
            TreeValue::Conflict(terms) => {
                for term in terms {
                    term.collect_references(out);
                }
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TreeValue::Conflict(_))
    }
}

/// Directory listing: entries keyed by name, always in sorted order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: BTreeMap<String, TreeValue>,
}

impl Tree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, validating the name.
    pub fn insert(&mut self, name: impl Into<String>, value: TreeValue) -> StoreResult<()> {
        let name = name.into();
        validate_entry_name(&name).map_err(|reason| StoreError::CorruptObject {
            id: ObjectId::null(),
            reason,
        })?;
        self.entries.insert(name, value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<TreeValue> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TreeValue> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &TreeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child trees, for walking the tree top-down.
    pub fn subtrees(&self) -> impl Iterator<Item = TreeId> + '_ {
        self.entries.values().filter_map(|v| match v {
            TreeValue::Tree(id) => Some(*id),
            _ => None,
        })
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.values().any(TreeValue::is_conflict)
    }

    pub(crate) fn references(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        for value in self.entries.values() {
            value.collect_references(&mut out);
        }
        out
    }

    fn check_names(&self) -> Result<(), String> {
        self.entries.keys().try_for_each(|n| validate_entry_name(n))
    }
}

impl StoreObject for Tree {
    const KIND: ObjectKind = ObjectKind::Tree;
    type Id = TreeId;

    fn from_stored_object(obj: &crate::object::StoredObject) -> StoreResult<Self> {
        if obj.kind != Self::KIND {
            return Err(StoreError::KindMismatch {
                id: obj.compute_id(),
                expected: Self::KIND,
                actual: obj.kind,
            });
        }
        let tree: Tree =
            serde_json::from_slice(&obj.data).map_err(|e| StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: e.to_string(),
            })?;
        tree.check_names().map_err(|reason| StoreError::CorruptObject {
            id: obj.compute_id(),
            reason,
        })?;
        Ok(tree)
    }
}

fn validate_entry_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("invalid tree entry name {name:?}"));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(format!("tree entry name {name:?} contains a separator"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::StoredObject;

    fn file(b: u8) -> TreeValue {
        TreeValue::File {
            id: FileId::new(ObjectId::from_hash([b; 32])),
            executable: false,
        }
    }

    #[test]
    fn insertion_order_does_not_change_encoding() {
        let mut a = Tree::empty();
        a.insert("b.txt", file(2)).unwrap();
        a.insert("a.txt", file(1)).unwrap();

        let mut b = Tree::empty();
        b.insert("a.txt", file(1)).unwrap();
        b.insert("b.txt", file(2)).unwrap();

        assert_eq!(
            a.to_stored_object().unwrap(),
            b.to_stored_object().unwrap()
        );
        let names: Vec<&str> = a.entries().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn rejects_bad_entry_names() {
        let mut t = Tree::empty();
        assert!(t.insert("", file(1)).is_err());
        assert!(t.insert("..", file(1)).is_err());
        assert!(t.insert("a/b", file(1)).is_err());
        assert!(t.insert("ok", file(1)).is_ok());
    }

    #[test]
    fn decoding_rejects_smuggled_names() {
        let obj = StoredObject::new(
            ObjectKind::Tree,
            br#"{"entries":{"../escape":{"Symlink":"0000000000000000000000000000000000000000000000000000000000000000"}}}"#.to_vec(),
        );
        assert!(matches!(
            Tree::from_stored_object(&obj),
            Err(StoreError::CorruptObject { .. })
        ));
    }

    #[test]
    fn references_include_conflict_terms() {
        let mut t = Tree::empty();
        t.insert("x", TreeValue::Conflict(vec![file(1), file(2)])).unwrap();
        t.insert("sub", TreeValue::Tree(TreeId::new(ObjectId::from_hash([3; 32]))))
            .unwrap();
        let refs = t.references();
        assert_eq!(refs.len(), 3);
        assert!(t.has_conflicts());
        assert_eq!(t.subtrees().count(), 1);
    }

    #[test]
    fn kind_is_checked_on_decode() {
        let obj = StoredObject::new(ObjectKind::File, b"{}".to_vec());
        assert!(matches!(
            Tree::from_stored_object(&obj),
            Err(StoreError::KindMismatch { .. })
        ));
    }
}
