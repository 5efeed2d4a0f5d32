use anvil_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"anvil-commit-v1"`) that is
/// prepended to every hash computation, so a file and a tree with identical
/// bytes never share an id. This is also what lets the object store look an
/// id up across its namespaces without ambiguity.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self::new("anvil-commit-v1");
    /// Hasher for tree objects.
    pub const TREE: Self = Self::new("anvil-tree-v1");
    /// Hasher for file content.
    pub const FILE: Self = Self::new("anvil-file-v1");
    /// Hasher for symlink targets.
    pub const SYMLINK: Self = Self::new("anvil-symlink-v1");
    /// Hasher for view snapshots.
    pub const VIEW: Self = Self::new("anvil-view-v1");
    /// Hasher for operations.
    pub const OPERATION: Self = Self::new("anvil-operation-v1");

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// Raw BLAKE3 hash without domain separation, used for pack checksums.
    pub fn raw_hash(data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
