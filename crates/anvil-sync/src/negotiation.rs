//! Deciding what to advertise and how requested updates turned out.

use std::collections::BTreeSet;

use anvil_protocol::RefResult;
use anvil_refs::{RefTarget, RefUpdate};
use anvil_repo::{RepoResult, Repository};
use anvil_store::View;
use anvil_types::OperationId;

/// Operations a client advertises: its heads, then the most recent
/// ancestors up to `limit` in total.
pub fn advertised_ops(repo: &Repository, limit: usize) -> RepoResult<Vec<OperationId>> {
    let heads = repo.heads()?;
    let mut ops: Vec<OperationId> = heads.iter().copied().collect();
    for (id, _) in repo.log(limit)? {
        if ops.len() >= limit.max(heads.len()) {
            break;
        }
        if !heads.contains(&id) {
            ops.push(id);
        }
    }
    Ok(ops)
}

/// The advertised operations this repository also holds.
pub fn recognized(repo: &Repository, advertised: &[OperationId]) -> RepoResult<BTreeSet<OperationId>> {
    let mut known = BTreeSet::new();
    for id in advertised {
        if repo.graph().contains(id)? {
            known.insert(*id);
        }
    }
    Ok(known)
}

/// Compare each requested update with where the reference ended up.
pub fn ref_results(updates: &[RefUpdate], view: &View) -> Vec<RefResult> {
    updates
        .iter()
        .map(|update| {
            let current = view.get_ref(update.kind, &update.name);
            let wanted = update.new.map(RefTarget::normal);
            match current {
                c if c == wanted.as_ref() => RefResult::Ok {
                    kind: update.kind,
                    name: update.name.clone(),
                },
                Some(target)
                    if target.is_conflicted()
                        && update
                            .new
                            .map_or(target.has_absent_term(), |id| target.contains(&id)) =>
                {
                    RefResult::Conflict {
                        kind: update.kind,
                        name: update.name.clone(),
                        target: target.clone(),
                    }
                }
                _ => RefResult::Stale {
                    kind: update.kind,
                    name: update.name.clone(),
                    current: current.cloned(),
                },
            }
        })
        .collect()
}

/// Every update rejected for the same reason.
pub fn rejected(updates: &[RefUpdate], reason: &str) -> Vec<RefResult> {
    updates
        .iter()
        .map(|update| RefResult::Rejected {
            kind: update.kind,
            name: update.name.clone(),
            reason: reason.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_refs::RefKind;
    use anvil_types::{CommitId, ObjectId};

    fn cid(b: u8) -> CommitId {
        CommitId::new(ObjectId::from_hash([b; 32]))
    }

    fn view_with(name: &str, target: Option<RefTarget>) -> View {
        let mut view = View::empty();
        view.set_ref(RefKind::Bookmark, name, target);
        view
    }

    #[test]
    fn matching_update_is_ok() {
        let view = view_with("main", Some(RefTarget::normal(cid(1))));
        let results = ref_results(&[RefUpdate::bookmark("main", None, Some(cid(1)))], &view);
        assert!(results[0].is_ok());
    }

    #[test]
    fn deletion_is_ok_when_absent() {
        let view = View::empty();
        let results = ref_results(&[RefUpdate::bookmark("gone", Some(cid(1)), None)], &view);
        assert!(results[0].is_ok());
    }

    #[test]
    fn conflicted_update_reports_members() {
        let target = RefTarget::conflicted(BTreeSet::from([cid(1), cid(2)])).unwrap();
        let view = view_with("main", Some(target.clone()));
        let results = ref_results(&[RefUpdate::bookmark("main", None, Some(cid(2)))], &view);
        assert_eq!(
            results[0],
            RefResult::Conflict {
                kind: RefKind::Bookmark,
                name: "main".into(),
                target
            }
        );
    }

    #[test]
    fn deletion_racing_a_move_reports_conflict() {
        let target = RefTarget::from_terms(BTreeSet::from([cid(4)]), true).unwrap();
        let view = view_with("main", Some(target.clone()));
        let results = ref_results(&[RefUpdate::bookmark("main", Some(cid(1)), None)], &view);
        assert_eq!(
            results[0],
            RefResult::Conflict {
                kind: RefKind::Bookmark,
                name: "main".into(),
                target
            }
        );
    }

    #[test]
    fn overtaken_update_is_stale() {
        let view = view_with("main", Some(RefTarget::normal(cid(3))));
        let results = ref_results(&[RefUpdate::bookmark("main", None, Some(cid(2)))], &view);
        assert!(matches!(&results[0], RefResult::Stale { current: Some(_), .. }));
    }

    #[test]
    fn advertises_heads_first() {
        let repo = Repository::init_in_memory().unwrap();
        let root = repo.heads().unwrap().into_iter().next().unwrap();
        let tree = repo.write_tree(&anvil_store::Tree::empty()).unwrap();
        let commit = repo
            .new_commit(vec![], tree, "empty", anvil_repo::signature_now("Ada", "ada@example.com"))
            .unwrap();
        let mut tx = repo.start_transaction("add head", "ada").unwrap();
        tx.add_head(commit);
        let head = tx.commit().unwrap();
        let ops = advertised_ops(&repo, 10).unwrap();
        assert_eq!(ops, vec![head, root]);
        assert_eq!(advertised_ops(&repo, 1).unwrap(), vec![head]);
        assert_eq!(recognized(&repo, &ops).unwrap(), BTreeSet::from([head, root]));
    }
}
