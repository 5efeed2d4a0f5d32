//! The view merge rules.

use std::collections::{BTreeMap, BTreeSet};

use anvil_refs::{RefKind, RefTarget};
use anvil_store::View;
use anvil_types::CommitId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ancestry::CommitAncestry;
use crate::error::MergeResult;

/// A reference the merge could not reconcile.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictNote {
    pub kind: RefKind,
    pub name: String,
}

impl std::fmt::Display for ConflictNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Result of merging two views.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    pub view: View,
    /// Sorted by kind then name.
    pub conflicts: Vec<ConflictNote>,
}

impl MergeOutcome {
    fn clean(view: View) -> Self {
        Self {
            view,
            conflicts: Vec::new(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge one reference.
///
/// Returns the merged target (`None` = absent) and whether the sides moved
/// it in incompatible directions. Absence is a value like any other: a
/// deletion racing a move yields a conflict with an absent term.
pub fn merge_ref_target(
    base: Option<&RefTarget>,
    left: Option<&RefTarget>,
    right: Option<&RefTarget>,
) -> (Option<RefTarget>, bool) {
    if left == right || right == base {
        return (left.cloned(), false);
    }
    if left == base {
        return (right.cloned(), false);
    }
    let members: BTreeSet<CommitId> = left
        .into_iter()
        .chain(right)
        .flat_map(RefTarget::members)
        .collect();
    let absent = [left, right]
        .into_iter()
        .any(|side| side.map_or(true, RefTarget::has_absent_term));
    let merged = RefTarget::from_terms(members, absent);
    let conflicted = merged.as_ref().is_some_and(RefTarget::is_conflicted);
    (merged, conflicted)
}

/// Deterministic 3-way merge of views.
pub struct ViewMerger<'a> {
    ancestry: &'a dyn CommitAncestry,
}

impl<'a> ViewMerger<'a> {
    pub fn new(ancestry: &'a dyn CommitAncestry) -> Self {
        Self { ancestry }
    }

    /// Merge `left` and `right`, both descended from `base`.
    pub fn merge(&self, base: &View, left: &View, right: &View) -> MergeResult<MergeOutcome> {
        if left == right || right == base {
            return Ok(MergeOutcome::clean(left.clone()));
        }
        if left == base {
            return Ok(MergeOutcome::clean(right.clone()));
        }

        let mut view = View {
            head_ids: self.merge_heads(left, right)?,
            ..View::empty()
        };
        let mut conflicts = Vec::new();
        for kind in [RefKind::Bookmark, RefKind::Tag, RefKind::Workspace] {
            let (merged, notes) = merge_ref_map(kind, base.refs(kind), left.refs(kind), right.refs(kind));
            *view.refs_mut(kind) = merged;
            conflicts.extend(notes);
        }
        conflicts.sort();

        debug!(
            heads = view.head_ids.len(),
            conflicts = conflicts.len(),
            "merged views"
        );
        Ok(MergeOutcome { view, conflicts })
    }

    /// Union of both head sets, minus anything that is an ancestor of
    /// another member.
    fn merge_heads(&self, left: &View, right: &View) -> MergeResult<BTreeSet<CommitId>> {
        let union: BTreeSet<CommitId> = left.head_ids.union(&right.head_ids).copied().collect();
        if union.len() < 2 {
            return Ok(union);
        }
        let hidden = self.ancestry.strict_ancestors(&union)?;
        Ok(union.into_iter().filter(|id| !hidden.contains(id)).collect())
    }
}

fn merge_ref_map(
    kind: RefKind,
    base: &BTreeMap<String, RefTarget>,
    left: &BTreeMap<String, RefTarget>,
    right: &BTreeMap<String, RefTarget>,
) -> (BTreeMap<String, RefTarget>, Vec<ConflictNote>) {
    let names: BTreeSet<&String> = base.keys().chain(left.keys()).chain(right.keys()).collect();
    let mut merged = BTreeMap::new();
    let mut notes = Vec::new();
    for name in names {
        let (target, conflicted) =
            merge_ref_target(base.get(name), left.get(name), right.get(name));
        if conflicted {
            notes.push(ConflictNote {
                kind,
                name: name.clone(),
            });
        }
        if let Some(target) = target {
            merged.insert(name.clone(), target);
        }
    }
    (merged, notes)
}
