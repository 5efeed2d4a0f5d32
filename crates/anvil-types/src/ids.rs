//! Typed identifiers for each object kind.
//!
//! All of them wrap an [`ObjectId`]; the wrapper only exists so a commit id
//! cannot be passed where a tree id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ObjectId;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ObjectId);

        impl $name {
            /// Wrap a raw object id.
            pub const fn new(id: ObjectId) -> Self {
                Self(id)
            }

            /// The underlying untyped object id.
            pub fn object_id(&self) -> &ObjectId {
                &self.0
            }

            /// Hex-encoded string representation.
            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            /// Short hex representation, used in logs.
            pub fn short_hex(&self) -> String {
                self.0.short_hex()
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self, TypeError> {
                ObjectId::from_hex(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.short_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<ObjectId> for $name {
            fn from(id: ObjectId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

typed_id!(
    /// Identifier of a commit object.
    CommitId
);
typed_id!(
    /// Identifier of a tree object.
    TreeId
);
typed_id!(
    /// Identifier of a file content object.
    FileId
);
typed_id!(
    /// Identifier of a symlink target object.
    SymlinkId
);
typed_id!(
    /// Identifier of a view snapshot.
    ViewId
);
typed_id!(
    /// Identifier of an operation in the operation log.
    OperationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ids_wrap_and_unwrap() {
        let raw = ObjectId::from_hash([9; 32]);
        let commit = CommitId::new(raw);
        assert_eq!(*commit.object_id(), raw);
        assert_eq!(ObjectId::from(commit), raw);
    }

    #[test]
    fn debug_names_the_kind() {
        let op = OperationId::new(ObjectId::from_hash([1; 32]));
        assert!(format!("{op:?}").starts_with("OperationId("));
    }

    #[test]
    fn typed_hex_roundtrip() {
        let view = ViewId::new(ObjectId::from_hash([0x42; 32]));
        assert_eq!(ViewId::from_hex(&view.to_hex()).unwrap(), view);
    }

    #[test]
    fn serde_is_transparent() {
        let raw = ObjectId::from_hash([5; 32]);
        let a = serde_json::to_string(&raw).unwrap();
        let b = serde_json::to_string(&TreeId::new(raw)).unwrap();
        assert_eq!(a, b);
    }
}
