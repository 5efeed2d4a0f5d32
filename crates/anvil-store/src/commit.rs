use anvil_crypto::{SigningKey, VerifyingKey};
use anvil_types::{ChangeId, CommitId, ObjectId, Timestamp, TreeId};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::object::{ObjectKind, StoreObject};

/// Who made a commit, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp: Timestamp,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
        }
    }
}

/// Detached ed25519 signature over the commit's unsigned canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureSig {
    pub key: VerifyingKey,
    pub sig: anvil_crypto::Signature,
}

/// Result of checking a commit's [`SecureSig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureStatus {
    Unsigned,
    /// Valid signature; carries the signer's key fingerprint.
    Good(String),
    Bad,
}

/// A commit.
///
/// `root_tree` is a merge of tree ids: one term is a resolved tree, several
/// terms are an unresolved content conflict, zero terms is the empty tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub parents: Vec<CommitId>,
    pub predecessors: Vec<CommitId>,
    pub root_tree: Vec<TreeId>,
    pub change_id: ChangeId,
    pub description: String,
    pub author: Signature,
    pub committer: Signature,
    pub secure_sig: Option<SecureSig>,
}

impl Commit {
    pub fn has_conflict(&self) -> bool {
        self.root_tree.len() > 1
    }

    /// Canonical bytes with the signature stripped; this is what gets signed.
    pub fn unsigned_bytes(&self) -> StoreResult<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.secure_sig = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Attach a signature made with `key`, replacing any existing one.
    pub fn sign(mut self, key: &SigningKey) -> StoreResult<Self> {
        let sig = key.sign_commit(&self.unsigned_bytes()?);
        self.secure_sig = Some(SecureSig {
            key: key.verifying_key(),
            sig,
        });
        Ok(self)
    }

    pub fn verify_signature(&self) -> StoreResult<SignatureStatus> {
        let Some(secure) = &self.secure_sig else {
            return Ok(SignatureStatus::Unsigned);
        };
        Ok(match secure.key.verify_commit(&self.unsigned_bytes()?, &secure.sig) {
            Ok(()) => SignatureStatus::Good(secure.key.fingerprint()),
            Err(_) => SignatureStatus::Bad,
        })
    }

    pub(crate) fn references(&self) -> Vec<ObjectId> {
        self.parents
            .iter()
            .map(|p| ObjectId::from(*p))
            .chain(self.root_tree.iter().map(|t| ObjectId::from(*t)))
            .collect()
    }
}

impl StoreObject for Commit {
    const KIND: ObjectKind = ObjectKind::Commit;
    type Id = CommitId;
}
