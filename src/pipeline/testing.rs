//! Test doubles shared by the pipeline unit tests.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use git2::Repository;
use tempfile::TempDir;

use super::github::{RepoHandle, RepoHost, RepoOwner};
use crate::errors::HostError;

/// Bare repository whose HEAD names `main`, like a fresh hosted repo.
pub fn init_remote(path: &Path) {
    let repo = Repository::init_bare(path).unwrap();
    repo.set_head("refs/heads/main").unwrap();
}

/// In-memory repository host whose clone URLs are local bare repositories.
pub struct LocalRepoHost {
    remotes: TempDir,
    existing: Mutex<Vec<String>>,
    /// When set, every create call fails with this status as `Unauthorized`
    pub fail_create: Option<u16>,
}

impl LocalRepoHost {
    pub fn new() -> Self {
        Self {
            remotes: tempfile::tempdir().unwrap(),
            existing: Mutex::new(Vec::new()),
            fail_create: None,
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            fail_create: Some(status),
            ..Self::new()
        }
    }

    pub fn handle(&self, name: &str) -> RepoHandle {
        let path = self.remotes.path().join(format!("{}.git", name));
        RepoHandle {
            name: name.into(),
            full_name: format!("octo/{}", name),
            html_url: format!("https://github.com/octo/{}", name),
            clone_url: path.to_string_lossy().to_string(),
            owner: RepoOwner {
                login: "octo".into(),
            },
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.existing.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepoHost for LocalRepoHost {
    async fn create_repository(&self, name: &str) -> Result<RepoHandle, HostError> {
        if let Some(status) = self.fail_create {
            return Err(HostError::Unauthorized { status });
        }
        let mut existing = self.existing.lock().unwrap();
        if existing.iter().any(|n| n == name) {
            return Err(HostError::AlreadyExists { name: name.into() });
        }
        existing.push(name.to_string());
        let handle = self.handle(name);
        init_remote(Path::new(&handle.clone_url));
        Ok(handle)
    }

    async fn get_repository(&self, name: &str) -> Result<RepoHandle, HostError> {
        if self.existing.lock().unwrap().iter().any(|n| n == name) {
            Ok(self.handle(name))
        } else {
            Err(HostError::NotFound {
                full_name: format!("octo/{}", name),
            })
        }
    }
}
