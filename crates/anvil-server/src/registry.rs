//! Lazily opened repositories under one root directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anvil_refs::validate_repo_name;
use anvil_repo::{RepoError, Repository};
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

/// Maps repository names to directories under `root` and keeps each opened
/// repository alive for the life of the server, so concurrent sessions share
/// one operation graph.
pub struct RepoRegistry {
    root: PathBuf,
    head_install_retries: u32,
    open: Mutex<HashMap<String, Arc<Repository>>>,
}

impl RepoRegistry {
    pub fn new(root: impl Into<PathBuf>, head_install_retries: u32) -> Self {
        Self {
            root: root.into(),
            head_install_retries,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository called `name`, opening it on first use.
    pub fn open(&self, name: &str) -> ServerResult<Arc<Repository>> {
        let path = self.path_for(name)?;
        let mut open = self.lock()?;
        if let Some(repo) = open.get(name) {
            return Ok(repo.clone());
        }
        let repo = match Repository::open(&path) {
            Ok(repo) => repo,
            Err(RepoError::NotInitialized(_)) => {
                return Err(ServerError::RepoNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let repo = Arc::new(repo.with_max_retries(self.head_install_retries));
        debug!(repository = name, path = %path.display(), "opened repository");
        open.insert(name.to_string(), repo.clone());
        Ok(repo)
    }

    /// Initialize a new repository called `name`.
    pub fn create(&self, name: &str) -> ServerResult<Arc<Repository>> {
        let path = self.path_for(name)?;
        let mut open = self.lock()?;
        let repo = Arc::new(Repository::init(&path)?.with_max_retries(self.head_install_retries));
        info!(repository = name, path = %path.display(), "created repository");
        open.insert(name.to_string(), repo.clone());
        Ok(repo)
    }

    /// Names of the repositories opened so far, sorted.
    pub fn loaded(&self) -> ServerResult<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> ServerResult<PathBuf> {
        validate_repo_name(name).map_err(|e| ServerError::InvalidRepoName(e.to_string()))?;
        Ok(self.root.join(name))
    }

    fn lock(&self) -> ServerResult<std::sync::MutexGuard<'_, HashMap<String, Arc<Repository>>>> {
        self.open
            .lock()
            .map_err(|_| ServerError::Internal("repository registry lock poisoned".into()))
    }
}

impl std::fmt::Debug for RepoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoRegistry")
            .field("root", &self.root)
            .field("head_install_retries", &self.head_install_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_open_returns_the_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RepoRegistry::new(dir.path(), 8);
        let created = registry.create("demo").unwrap();
        let opened = registry.open("demo").unwrap();
        assert!(Arc::ptr_eq(&created, &opened));
        assert_eq!(registry.loaded().unwrap(), vec!["demo".to_string()]);
    }

    #[test]
    fn opens_existing_repositories_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path().join("on-disk")).unwrap();
        let registry = RepoRegistry::new(dir.path(), 5);
        let repo = registry.open("on-disk").unwrap();
        assert_eq!(repo.graph().max_retries(), 5);
    }

    #[test]
    fn unknown_and_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RepoRegistry::new(dir.path(), 8);
        assert!(matches!(registry.open("missing"), Err(ServerError::RepoNotFound(_))));
        assert!(matches!(registry.open("../etc"), Err(ServerError::InvalidRepoName(_))));
        assert!(matches!(registry.open(".."), Err(ServerError::InvalidRepoName(_))));
    }
}
