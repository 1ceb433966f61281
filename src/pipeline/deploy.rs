use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::github::{GitHubClient, RepoHandle};
use super::outcome::DeployOutcome;
use crate::config::{Credentials, DeployConfig, GitHubConfig, ProviderKind};
use crate::errors::DeployError;
use crate::util::panic_message;

/// One way of putting a published repository online.
#[async_trait]
pub trait DeployProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the live URL. Any error means "this provider is unavailable".
    /// `branch` is the branch the run pushed, if any; providers fall back to
    /// their configured branch when it is `None`.
    async fn deploy(
        &self,
        repo: &RepoHandle,
        local_path: &Path,
        branch: Option<&str>,
    ) -> Result<String, DeployError>;
}

#[derive(Debug, Serialize)]
struct GitSource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    repo: &'a str,
    #[serde(rename = "ref")]
    git_ref: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateDeploymentRequest<'a> {
    name: &'a str,
    #[serde(rename = "gitSource")]
    git_source: GitSource<'a>,
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Vercel deployment tied to the pushed branch.
pub struct VercelProvider {
    client: reqwest::Client,
    api_url: String,
    token: String,
    default_ref: String,
}

impl VercelProvider {
    const NAME: &'static str = "vercel";

    pub fn new(api_url: &str, token: &str, default_ref: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            default_ref: default_ref.to_string(),
        }
    }
}

#[async_trait]
impl DeployProvider for VercelProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn deploy(
        &self,
        repo: &RepoHandle,
        _local_path: &Path,
        branch: Option<&str>,
    ) -> Result<String, DeployError> {
        let body = CreateDeploymentRequest {
            name: &repo.name,
            git_source: GitSource {
                kind: "github",
                repo: &repo.full_name,
                git_ref: branch.unwrap_or(&self.default_ref),
            },
        };
        let resp = self
            .client
            .post(format!("{}/v13/deployments", self.api_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DeployError::Status {
                provider: Self::NAME,
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let deployment: DeploymentResponse = resp.json().await?;
        match deployment.url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(format!("https://{}", url.trim())),
            None => Err(DeployError::MissingUrl {
                provider: Self::NAME,
            }),
        }
    }
}

/// GitHub Pages on the repository itself.
pub struct PagesProvider {
    github: Arc<GitHubClient>,
    default_branch: String,
    path: String,
}

impl PagesProvider {
    pub fn new(github: Arc<GitHubClient>, default_branch: &str, path: &str) -> Self {
        Self {
            github,
            default_branch: default_branch.to_string(),
            path: path.to_string(),
        }
    }
}

#[async_trait]
impl DeployProvider for PagesProvider {
    fn name(&self) -> &str {
        "pages"
    }

    async fn deploy(
        &self,
        repo: &RepoHandle,
        _local_path: &Path,
        branch: Option<&str>,
    ) -> Result<String, DeployError> {
        let branch = branch.unwrap_or(&self.default_branch);
        Ok(self.github.enable_pages(repo, branch, &self.path).await?)
    }
}

/// Walks the provider chain in order and degrades to the repository URL.
pub struct DeploymentResolver {
    providers: Vec<Box<dyn DeployProvider>>,
}

impl DeploymentResolver {
    pub fn new(providers: Vec<Box<dyn DeployProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain in configured order. Vercel is left out when no
    /// token is available.
    pub fn from_config(
        deploy: &DeployConfig,
        github_config: &GitHubConfig,
        credentials: &Credentials,
        github: Arc<GitHubClient>,
    ) -> Self {
        let mut providers: Vec<Box<dyn DeployProvider>> = Vec::new();
        for kind in &deploy.providers {
            match kind {
                ProviderKind::Vercel => match credentials.vercel_token.as_deref() {
                    Some(token) => providers.push(Box::new(VercelProvider::new(
                        &deploy.vercel_api_url,
                        token,
                        &github_config.primary_branch,
                    ))),
                    None => info!("VERCEL_TOKEN not set, skipping vercel provider"),
                },
                ProviderKind::Pages => providers.push(Box::new(PagesProvider::new(
                    Arc::clone(&github),
                    &github_config.pages_branch,
                    &github_config.pages_path,
                ))),
            }
        }
        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First provider success wins. Never fails: when every provider is
    /// unavailable the repository's web URL is returned as `Degraded`. A
    /// provider that panics counts as unavailable.
    pub async fn deploy(
        &self,
        repo: &RepoHandle,
        local_path: &Path,
        branch: Option<&str>,
    ) -> DeployOutcome {
        for provider in &self.providers {
            let attempt = AssertUnwindSafe(provider.deploy(repo, local_path, branch))
                .catch_unwind()
                .await;
            match attempt {
                Ok(Ok(url)) => {
                    info!(provider = provider.name(), url = %url, "Deployment succeeded");
                    return DeployOutcome::Deployed {
                        provider: provider.name().to_string(),
                        url,
                    };
                }
                Ok(Err(e)) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Deployment provider unavailable"
                    );
                }
                Err(payload) => {
                    warn!(
                        provider = provider.name(),
                        panic = %panic_message(payload),
                        "Deployment provider unavailable"
                    );
                }
            }
        }
        DeployOutcome::Degraded {
            url: repo.html_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HostError;
    use crate::pipeline::github::RepoOwner;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn repo() -> RepoHandle {
        RepoHandle {
            name: "counter-demo".into(),
            full_name: "octo/counter-demo".into(),
            html_url: "https://github.com/octo/counter-demo".into(),
            clone_url: "https://github.com/octo/counter-demo.git".into(),
            owner: RepoOwner {
                login: "octo".into(),
            },
        }
    }

    /// Scripted provider that records the order it was called in.
    struct FakeProvider {
        name: &'static str,
        url: Option<&'static str>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl DeployProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn deploy(
            &self,
            _repo: &RepoHandle,
            _path: &Path,
            _branch: Option<&str>,
        ) -> Result<String, DeployError> {
            self.calls.lock().unwrap().push(self.name);
            match self.url {
                Some(url) => Ok(url.to_string()),
                None => Err(DeployError::Host(HostError::Api {
                    status: 500,
                    message: "boom".into(),
                })),
            }
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl DeployProvider for PanickingProvider {
        fn name(&self) -> &str {
            "exploding"
        }

        async fn deploy(
            &self,
            _repo: &RepoHandle,
            _path: &Path,
            _branch: Option<&str>,
        ) -> Result<String, DeployError> {
            panic!("provider exploded");
        }
    }

    /// Reports the branch it was handed as its URL.
    struct BranchEcho;

    #[async_trait]
    impl DeployProvider for BranchEcho {
        fn name(&self) -> &str {
            "echo"
        }

        async fn deploy(
            &self,
            _repo: &RepoHandle,
            _path: &Path,
            branch: Option<&str>,
        ) -> Result<String, DeployError> {
            Ok(branch.unwrap_or("<none>").to_string())
        }
    }

    fn chain(
        spec: &[(&'static str, Option<&'static str>)],
    ) -> (DeploymentResolver, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let providers = spec
            .iter()
            .map(|&(name, url)| {
                Box::new(FakeProvider {
                    name,
                    url,
                    calls: calls.clone(),
                }) as Box<dyn DeployProvider>
            })
            .collect();
        (DeploymentResolver::new(providers), calls)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let (resolver, calls) = chain(&[
            ("vercel", Some("https://counter-demo.vercel.app")),
            ("pages", Some("https://octo.github.io/counter-demo")),
        ]);
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(outcome.provider(), Some("vercel"));
        assert_eq!(*calls.lock().unwrap(), vec!["vercel"]);
    }

    #[tokio::test]
    async fn test_failure_falls_through_in_order() {
        let (resolver, calls) = chain(&[
            ("vercel", None),
            ("pages", Some("https://octo.github.io/counter-demo")),
        ]);
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(
            outcome,
            DeployOutcome::Deployed {
                provider: "pages".into(),
                url: "https://octo.github.io/counter-demo".into()
            }
        );
        assert_eq!(*calls.lock().unwrap(), vec!["vercel", "pages"]);
    }

    #[tokio::test]
    async fn test_all_failures_degrade_to_repo_url() {
        let (resolver, calls) = chain(&[("pages", None), ("vercel", None)]);
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(
            outcome,
            DeployOutcome::Degraded {
                url: "https://github.com/octo/counter-demo".into()
            }
        );
        assert_eq!(*calls.lock().unwrap(), vec!["pages", "vercel"]);
    }

    #[tokio::test]
    async fn test_panicking_provider_is_skipped() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolver = DeploymentResolver::new(vec![
            Box::new(PanickingProvider),
            Box::new(FakeProvider {
                name: "pages",
                url: Some("https://octo.github.io/counter-demo"),
                calls: calls.clone(),
            }),
        ]);
        let outcome = resolver.deploy(&repo(), Path::new("."), Some("main")).await;
        assert_eq!(outcome.provider(), Some("pages"));
        assert_eq!(*calls.lock().unwrap(), vec!["pages"]);
    }

    #[tokio::test]
    async fn test_only_panicking_provider_degrades() {
        let resolver = DeploymentResolver::new(vec![Box::new(PanickingProvider)]);
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(
            outcome,
            DeployOutcome::Degraded {
                url: "https://github.com/octo/counter-demo".into()
            }
        );
    }

    #[tokio::test]
    async fn test_pushed_branch_reaches_provider() {
        let resolver = DeploymentResolver::new(vec![Box::new(BranchEcho)]);
        let outcome = resolver.deploy(&repo(), Path::new("."), Some("master")).await;
        assert_eq!(outcome.url(), "master");
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(outcome.url(), "<none>");
    }

    #[tokio::test]
    async fn test_empty_chain_degrades() {
        let resolver = DeploymentResolver::new(Vec::new());
        let outcome = resolver.deploy(&repo(), Path::new("."), None).await;
        assert_eq!(outcome.url(), "https://github.com/octo/counter-demo");
    }

    fn credentials(vercel: Option<&str>) -> Credentials {
        Credentials {
            gemini_api_key: "key".into(),
            github_token: "ghp_x".into(),
            vercel_token: vercel.map(String::from),
        }
    }

    #[test]
    fn test_from_config_follows_configured_order() {
        let github = Arc::new(GitHubClient::new(&GitHubConfig::default(), "ghp_x"));
        let deploy = DeployConfig {
            providers: vec![ProviderKind::Pages, ProviderKind::Vercel],
            ..DeployConfig::default()
        };
        let resolver = DeploymentResolver::from_config(
            &deploy,
            &GitHubConfig::default(),
            &credentials(Some("vtok")),
            github,
        );
        assert_eq!(resolver.provider_names(), vec!["pages", "vercel"]);
    }

    #[test]
    fn test_from_config_skips_vercel_without_token() {
        let github = Arc::new(GitHubClient::new(&GitHubConfig::default(), "ghp_x"));
        let resolver = DeploymentResolver::from_config(
            &DeployConfig::default(),
            &GitHubConfig::default(),
            &credentials(None),
            github,
        );
        assert_eq!(resolver.provider_names(), vec!["pages"]);
    }

    // ── VercelProvider against a local mock API ──────────────────────

    type Captured = Arc<Mutex<Option<Value>>>;

    async fn mock_vercel(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let app = Router::new()
            .route(
                "/v13/deployments",
                post(
                    move |State(captured): State<Captured>, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            *captured.lock().unwrap() = Some(body);
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), captured)
    }

    #[tokio::test]
    async fn test_vercel_success_returns_https_url() {
        let (base, captured) =
            mock_vercel(StatusCode::OK, json!({"id": "dpl_1", "url": "counter-demo.vercel.app"}))
                .await;
        let provider = VercelProvider::new(&base, "vtok", "main");
        let url = provider
            .deploy(&repo(), Path::new("."), None)
            .await
            .unwrap();
        assert_eq!(url, "https://counter-demo.vercel.app");

        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["name"], "counter-demo");
        assert_eq!(body["gitSource"]["type"], "github");
        assert_eq!(body["gitSource"]["repo"], "octo/counter-demo");
        assert_eq!(body["gitSource"]["ref"], "main");
    }

    #[tokio::test]
    async fn test_vercel_deploys_the_pushed_branch() {
        let (base, captured) =
            mock_vercel(StatusCode::OK, json!({"url": "counter-demo.vercel.app"})).await;
        let provider = VercelProvider::new(&base, "vtok", "main");
        provider
            .deploy(&repo(), Path::new("."), Some("master"))
            .await
            .unwrap();
        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["gitSource"]["ref"], "master");
    }

    #[tokio::test]
    async fn test_vercel_missing_url_is_failure() {
        let (base, _) = mock_vercel(StatusCode::OK, json!({"id": "dpl_1"})).await;
        let provider = VercelProvider::new(&base, "vtok", "main");
        let err = provider
            .deploy(&repo(), Path::new("."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingUrl { .. }));
    }

    #[tokio::test]
    async fn test_vercel_error_status_is_failure() {
        let (base, _) =
            mock_vercel(StatusCode::FORBIDDEN, json!({"error": {"code": "forbidden"}})).await;
        let provider = VercelProvider::new(&base, "vtok", "main");
        let err = provider
            .deploy(&repo(), Path::new("."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Status { status: 403, .. }));
    }
}
