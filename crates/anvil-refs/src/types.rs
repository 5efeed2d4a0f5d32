//! Core reference types.

use std::collections::BTreeSet;
use std::fmt;

use anvil_types::CommitId;
use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};

/// The value a named reference points at.
///
/// A conflict records every competing commit plus, when one side deleted
/// the reference, an absent term. It always holds at least two terms; a
/// single survivor collapses back through [`RefTarget::from_terms`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    Normal(CommitId),
    Conflicted {
        members: BTreeSet<CommitId>,
        absent: bool,
    },
}

impl RefTarget {
    pub fn normal(id: CommitId) -> Self {
        RefTarget::Normal(id)
    }

    /// Build a conflict between commits, rejecting sets that would not be
    /// a conflict.
    pub fn conflicted(ids: BTreeSet<CommitId>) -> Result<Self> {
        if ids.len() < 2 {
            return Err(RefError::DegenerateConflict(ids.len()));
        }
        Ok(RefTarget::Conflicted {
            members: ids,
            absent: false,
        })
    }

    /// Collapse a set of terms: nothing (or only the absent term) is absent,
    /// one commit alone is `Normal`, anything else is `Conflicted`.
    pub fn from_terms(mut ids: BTreeSet<CommitId>, absent: bool) -> Option<Self> {
        match (ids.len(), absent) {
            (0, _) => None,
            (1, false) => ids.pop_first().map(RefTarget::Normal),
            _ => Some(RefTarget::Conflicted {
                members: ids,
                absent,
            }),
        }
    }

    /// [`from_terms`](Self::from_terms) without an absent term.
    pub fn from_members(ids: BTreeSet<CommitId>) -> Option<Self> {
        Self::from_terms(ids, false)
    }

    /// All commits this target names.
    pub fn members(&self) -> BTreeSet<CommitId> {
        match self {
            RefTarget::Normal(id) => BTreeSet::from([*id]),
            RefTarget::Conflicted { members, .. } => members.clone(),
        }
    }

    /// Whether a deletion competes with the commits of this conflict.
    pub fn has_absent_term(&self) -> bool {
        matches!(self, RefTarget::Conflicted { absent: true, .. })
    }

    pub fn as_normal(&self) -> Option<&CommitId> {
        match self {
            RefTarget::Normal(id) => Some(id),
            RefTarget::Conflicted { .. } => None,
        }
    }

    pub fn is_conflicted(&self) -> bool {
        matches!(self, RefTarget::Conflicted { .. })
    }

    pub fn contains(&self, id: &CommitId) -> bool {
        match self {
            RefTarget::Normal(n) => n == id,
            RefTarget::Conflicted { members, .. } => members.contains(id),
        }
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Normal(id) => write!(f, "{}", id.short_hex()),
            RefTarget::Conflicted { members, absent } => {
                let mut parts: Vec<String> = members.iter().map(|id| id.short_hex()).collect();
                if *absent {
                    parts.push("absent".to_string());
                }
                write!(f, "conflict{{{}}}", parts.join(", "))
            }
        }
    }
}

/// Which namespace of a view a reference lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RefKind {
    Bookmark,
    Tag,
    Workspace,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Bookmark => "bookmark",
            RefKind::Tag => "tag",
            RefKind::Workspace => "workspace",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested change to one named reference, as carried by a push.
///
/// `old` is what the client believed the reference held (absent as `None`),
/// `new` is where it should point after the push (`None` deletes it).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    pub kind: RefKind,
    pub name: String,
    pub old: Option<CommitId>,
    pub new: Option<CommitId>,
}

impl RefUpdate {
    pub fn bookmark(name: impl Into<String>, old: Option<CommitId>, new: Option<CommitId>) -> Self {
        Self {
            kind: RefKind::Bookmark,
            name: name.into(),
            old,
            new,
        }
    }

    /// Check the name against the rules for its namespace.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            RefKind::Workspace => crate::names::validate_workspace_name(&self.name),
            kind => crate::names::validate_ref_name(kind, &self.name),
        }
    }
}
