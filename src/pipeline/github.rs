use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::GitHubConfig;
use crate::errors::HostError;

const USER_AGENT: &str = "autoship";
const API_VERSION: &str = "2022-11-28";

/// Owner of a hosted repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoOwner {
    pub login: String,
}

/// A hosted repository (subset of fields we care about).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoHandle {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    pub owner: RepoOwner,
}

impl RepoHandle {
    /// Conventional GitHub Pages URL for this repository.
    pub fn pages_url(&self) -> String {
        format!("https://{}.github.io/{}", self.owner.login, self.name)
    }
}

/// Create-or-get operations on the version-control host.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Create a repository for the authenticated user. A name collision is
    /// reported as [`HostError::AlreadyExists`].
    async fn create_repository(&self, name: &str) -> Result<RepoHandle, HostError>;

    /// Look up an existing repository of the authenticated user.
    async fn get_repository(&self, name: &str) -> Result<RepoHandle, HostError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or(ErrorBody {
            message: body.chars().take(200).collect(),
            errors: Vec::new(),
        })
    }

    fn full_message(&self) -> String {
        let details: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{} ({})", self.message, details.join("; "))
        }
    }
}

/// Map a failed repository-creation response onto a [`HostError`].
fn classify_create_failure(status: u16, body: &str, name: &str) -> HostError {
    let parsed = ErrorBody::parse(body);
    let message = parsed.full_message();
    match status {
        401 | 403 => HostError::Unauthorized { status },
        422 if message.to_lowercase().contains("already exists") => HostError::AlreadyExists {
            name: name.to_string(),
        },
        _ => HostError::Api { status, message },
    }
}

fn classify_failure(status: u16, body: &str) -> HostError {
    match status {
        401 | 403 => HostError::Unauthorized { status },
        _ => HostError::Api {
            status,
            message: ErrorBody::parse(body).full_message(),
        },
    }
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Serialize)]
struct PagesSource<'a> {
    branch: &'a str,
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct EnablePagesRequest<'a> {
    source: PagesSource<'a>,
}

/// GitHub REST client for repositories and Pages.
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
    description: String,
    private: bool,
    login: OnceCell<String>,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            description: config.repo_description.clone(),
            private: config.private,
            login: OnceCell::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Login of the authenticated user, fetched once.
    pub async fn login(&self) -> Result<&str, HostError> {
        self.login
            .get_or_try_init(|| async {
                let resp = self.request(reqwest::Method::GET, "/user").send().await?;
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(classify_failure(status.as_u16(), &body));
                }
                let owner: RepoOwner = resp.json().await?;
                Ok::<String, HostError>(owner.login)
            })
            .await
            .map(String::as_str)
    }

    /// Enable Pages for `repo` serving `branch`. An already-enabled site
    /// (HTTP 409) counts as success. Returns the conventional site URL.
    pub async fn enable_pages(
        &self,
        repo: &RepoHandle,
        branch: &str,
        path: &str,
    ) -> Result<String, HostError> {
        let body = EnablePagesRequest {
            source: PagesSource { branch, path },
        };
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/pages", repo.full_name),
            )
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            debug!(repo = %repo.full_name, status = status.as_u16(), "Pages enabled");
            return Ok(repo.pages_url());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body))
    }
}

#[async_trait]
impl RepoHost for GitHubClient {
    async fn create_repository(&self, name: &str) -> Result<RepoHandle, HostError> {
        let body = CreateRepoRequest {
            name,
            description: &self.description,
            private: self.private,
            auto_init: false,
        };
        let resp = self
            .request(reqwest::Method::POST, "/user/repos")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_create_failure(status.as_u16(), &body, name));
        }
        Ok(resp.json::<RepoHandle>().await?)
    }

    async fn get_repository(&self, name: &str) -> Result<RepoHandle, HostError> {
        let login = self.login().await?;
        let full_name = format!("{}/{}", login, name);
        let resp = self
            .request(reqwest::Method::GET, &format!("/repos/{}", full_name))
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(HostError::NotFound { full_name });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }
        Ok(resp.json::<RepoHandle>().await?)
    }
}
