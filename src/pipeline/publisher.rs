use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{
    BranchType, Cred, CredentialType, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    Signature,
};
use tracing::{debug, info, warn};

use super::github::{RepoHandle, RepoHost};
use super::models::ArtifactSet;
use super::outcome::{CheckoutKind, PushOutcome, RepoAcquisition};
use crate::config::GitHubConfig;
use crate::errors::{HostError, PipelineError};
use crate::util::is_valid_repo_name;

const REMOTE_NAME: &str = "origin";

/// Local git settings for the publish step.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub primary_branch: String,
    pub fallback_branch: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
}

impl From<&GitHubConfig> for PublishSettings {
    fn from(config: &GitHubConfig) -> Self {
        Self {
            primary_branch: config.primary_branch.clone(),
            fallback_branch: config.fallback_branch.clone(),
            commit_message: config.commit_message.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }
}

/// Everything the later stages need from a publish.
#[derive(Debug, Clone)]
pub struct Published {
    pub repo: RepoHandle,
    pub local_path: PathBuf,
    pub acquisition: RepoAcquisition,
    pub checkout: CheckoutKind,
    pub commit: String,
    pub push: PushOutcome,
}

/// Try each branch in order, stopping at the first successful push.
/// Failures are collected, never raised.
pub fn push_with_fallback<F>(branches: &[&str], mut push: F) -> PushOutcome
where
    F: FnMut(&str) -> Result<(), String>,
{
    let mut attempts = 0;
    let mut last_error = String::from("no branches to push");
    for branch in branches {
        attempts += 1;
        match push(branch) {
            Ok(()) => {
                return PushOutcome::Pushed {
                    branch: branch.to_string(),
                    attempts,
                };
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "Push failed");
                last_error = e;
            }
        }
    }
    PushOutcome::Unpushed {
        attempts,
        last_error,
    }
}

fn remote_callbacks<'a>(token: Option<&'a str>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut offered = false;
    callbacks.credentials(move |_url, _username, allowed| {
        // libgit2 re-invokes this after a rejected credential; offer it once.
        match token {
            Some(token) if !offered && allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                offered = true;
                Cred::userpass_plaintext("x-access-token", token)
            }
            _ => Err(git2::Error::from_str("no usable credentials for remote")),
        }
    });
    callbacks.push_update_reference(|refname, status| match status {
        Some(message) => Err(git2::Error::from_str(&format!(
            "remote rejected {}: {}",
            refname, message
        ))),
        None => Ok(()),
    });
    callbacks
}

/// Clone `url` into `path`, or initialize a fresh repository with `url` as
/// its remote when the clone fails. Any existing directory is replaced.
pub fn prepare_working_copy(
    path: &Path,
    url: &str,
    token: Option<&str>,
) -> Result<(Repository, CheckoutKind), PipelineError> {
    let io_err = |source: std::io::Error| PipelineError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(io_err)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut fetch = git2::FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(token));
    match git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, path)
    {
        Ok(repo) => return Ok((repo, CheckoutKind::Cloned)),
        Err(e) => {
            debug!(url = %url, error = %e, "Clone failed, initializing fresh repository");
        }
    }

    if path.exists() {
        std::fs::remove_dir_all(path).map_err(io_err)?;
    }
    std::fs::create_dir_all(path).map_err(io_err)?;
    let wc_err = |source: git2::Error| PipelineError::WorkingCopy {
        path: path.to_path_buf(),
        source,
    };
    let repo = Repository::init(path).map_err(wc_err)?;
    repo.remote(REMOTE_NAME, url).map_err(wc_err)?;
    Ok((repo, CheckoutKind::Initialized))
}

/// When HEAD is unborn after a clone, base it on the first of `branches`
/// that exists on the remote. Returns the branch used, if any.
pub fn align_head(repo: &Repository, branches: &[&str]) -> Result<Option<String>, git2::Error> {
    if repo.head().is_ok() {
        return Ok(None);
    }
    for branch in branches {
        let remote_ref = format!("refs/remotes/{}/{}", REMOTE_NAME, branch);
        let Ok(reference) = repo.find_reference(&remote_ref) else {
            continue;
        };
        let commit = reference.peel_to_commit()?;
        repo.branch(branch, &commit, true)?;
        repo.set_head(&format!("refs/heads/{}", branch))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
        return Ok(Some(branch.to_string()));
    }
    Ok(None)
}

/// Write every artifact below `root`, creating parent directories and
/// overwriting existing files.
pub fn write_artifacts(root: &Path, artifacts: &ArtifactSet) -> Result<(), PipelineError> {
    for artifact in artifacts.iter() {
        let full_path = root.join(&artifact.path);
        let write_err = |source| PipelineError::ArtifactWrite {
            path: full_path.clone(),
            source,
        };
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(&full_path, &artifact.content).map_err(write_err)?;
    }
    Ok(())
}

/// Stage everything and create one commit on HEAD. Returns the commit id.
pub fn commit_all(
    repo: &Repository,
    message: &str,
    signature: &Signature<'_>,
) -> Result<git2::Oid, git2::Error> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    // Unborn HEAD (fresh init or empty clone) has no parent
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), signature, signature, message, &tree, &parents)
}

/// Point local `branch` at `commit` and push it to the remote branch of the
/// same name.
pub fn push_branch(
    repo: &Repository,
    branch: &str,
    commit: git2::Oid,
    token: Option<&str>,
) -> Result<(), git2::Error> {
    let up_to_date = repo
        .find_branch(branch, BranchType::Local)
        .ok()
        .and_then(|b| b.get().target())
        == Some(commit);
    if !up_to_date {
        let target = repo.find_commit(commit)?;
        repo.branch(branch, &target, true)?;
    }

    let mut remote = repo.find_remote(REMOTE_NAME)?;
    let mut options = PushOptions::new();
    options.remote_callbacks(remote_callbacks(token));
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
    remote.push(&[refspec.as_str()], Some(&mut options))
}

/// Serializes access to working copies so two runs never share one.
/// Entries live only while some run holds or waits for them.
#[derive(Default, Clone)]
struct RepoLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RepoLocks {
    async fn acquire(&self, name: &str) -> RepoLockGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(map.entry(name.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        RepoLockGuard {
            locks: self.clone(),
            name: name.to_string(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

struct RepoLockGuard {
    locks: RepoLocks,
    name: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this handle remain: nobody else holds or waits
        let idle = Arc::strong_count(&self.lock) == 2
            && map
                .get(&self.name)
                .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock));
        if idle {
            map.remove(&self.name);
        }
    }
}

/// Publishes an artifact set to a hosted repository.
pub struct RepositoryPublisher {
    host: Arc<dyn RepoHost>,
    workspace: PathBuf,
    settings: PublishSettings,
    token: Option<String>,
    locks: RepoLocks,
}

impl RepositoryPublisher {
    pub fn new(
        host: Arc<dyn RepoHost>,
        workspace: impl Into<PathBuf>,
        settings: PublishSettings,
        token: Option<String>,
    ) -> Self {
        Self {
            host,
            workspace: workspace.into(),
            settings,
            token,
            locks: RepoLocks::default(),
        }
    }

    /// Create the repository, or reuse it when the name is already taken.
    pub async fn acquire_repository(
        &self,
        name: &str,
    ) -> Result<(RepoHandle, RepoAcquisition), PipelineError> {
        let repo_err = |source: HostError| PipelineError::Repository {
            name: name.to_string(),
            source,
        };
        match self.host.create_repository(name).await {
            Ok(repo) => {
                info!(repo = %repo.full_name, "Repository created");
                Ok((repo, RepoAcquisition::Created))
            }
            Err(HostError::AlreadyExists { .. }) => {
                let repo = self.host.get_repository(name).await.map_err(repo_err)?;
                info!(repo = %repo.full_name, "Repository already exists, reusing it");
                Ok((repo, RepoAcquisition::Reused))
            }
            Err(e) => Err(repo_err(e)),
        }
    }

    /// Acquire the repository, write the artifacts to a fresh working copy,
    /// commit once and push. Push failure is reported in the result, not
    /// raised.
    pub async fn publish(
        &self,
        project_name: &str,
        artifacts: &ArtifactSet,
    ) -> Result<Published, PipelineError> {
        if !is_valid_repo_name(project_name) {
            return Err(anyhow::anyhow!("Invalid project name '{}'", project_name).into());
        }
        let (repo, acquisition) = self.acquire_repository(project_name).await?;
        if !is_valid_repo_name(&repo.name) {
            return Err(
                anyhow::anyhow!("Host returned unusable repository name '{}'", repo.name).into(),
            );
        }

        let local_path = self.workspace.join(&repo.name);
        let _lock = self.locks.acquire(&repo.name).await;

        let path = local_path.clone();
        let url = repo.clone_url.clone();
        let artifacts = artifacts.clone();
        let settings = self.settings.clone();
        let token = self.token.clone();
        let (checkout, commit, push) = tokio::task::spawn_blocking(move || {
            sync_working_copy(&path, &url, &artifacts, &settings, token.as_deref())
        })
        .await
        .map_err(|e| PipelineError::Panicked(format!("publish worker: {}", e)))??;

        Ok(Published {
            repo,
            local_path,
            acquisition,
            checkout,
            commit,
            push,
        })
    }
}

fn sync_working_copy(
    path: &Path,
    url: &str,
    artifacts: &ArtifactSet,
    settings: &PublishSettings,
    token: Option<&str>,
) -> Result<(CheckoutKind, String, PushOutcome), PipelineError> {
    let branches = [
        settings.primary_branch.as_str(),
        settings.fallback_branch.as_str(),
    ];
    let (repo, checkout) = prepare_working_copy(path, url, token)?;
    if let Some(branch) = align_head(&repo, &branches).map_err(|source| {
        PipelineError::WorkingCopy {
            path: path.to_path_buf(),
            source,
        }
    })? {
        debug!(branch = %branch, "Checked out remote branch");
    }
    write_artifacts(path, artifacts)?;

    let signature = Signature::now(&settings.author_name, &settings.author_email)
        .map_err(PipelineError::Commit)?;
    let commit =
        commit_all(&repo, &settings.commit_message, &signature).map_err(PipelineError::Commit)?;

    let push = push_with_fallback(&branches, |branch| {
        push_branch(&repo, branch, commit, token).map_err(|e| e.message().to_string())
    });
    Ok((checkout, commit.to_string(), push))
}
