//! Layered configuration for autoship.
//!
//! Settings come from an optional `autoship.toml`, then environment overrides,
//! then CLI flags. Credentials are read from the environment only (a `.env`
//! file is loaded first when present).
//!
//! # Configuration File Format
//!
//! ```toml
//! workspace = "workspace"
//! log_dir = "logs"
//!
//! [model]
//! name = "gemini-2.0-flash"
//! request_delay_ms = 1000
//!
//! [github]
//! primary_branch = "main"
//! fallback_branch = "master"
//!
//! [deploy]
//! providers = ["vercel", "pages"]
//!
//! [server]
//! port = 8080
//! max_concurrent_runs = 4
//! progress_ttl_secs = 3600
//! progress_capacity = 1024
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "autoship.toml";

pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const VERCEL_TOKEN: &str = "VERCEL_TOKEN";

/// Deployment providers that can appear in `[deploy].providers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Paid hosting API, only attempted when `VERCEL_TOKEN` is set
    Vercel,
    /// Repository-native static hosting
    Pages,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Vercel => write!(f, "vercel"),
            ProviderKind::Pages => write!(f, "pages"),
        }
    }
}

/// Generative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_api_url")]
    pub api_url: String,
    /// Minimum delay between consecutive model calls during generation
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_url: default_model_api_url(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl ModelConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Version-control host and local git settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_repo_description")]
    pub repo_description: String,
    #[serde(default = "default_primary_branch")]
    pub primary_branch: String,
    #[serde(default = "default_fallback_branch")]
    pub fallback_branch: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    /// Branch GitHub Pages serves when the run pushed nothing
    #[serde(default = "default_primary_branch")]
    pub pages_branch: String,
    #[serde(default = "default_pages_path")]
    pub pages_path: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            private: false,
            repo_description: default_repo_description(),
            primary_branch: default_primary_branch(),
            fallback_branch: default_fallback_branch(),
            commit_message: default_commit_message(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            pages_branch: default_primary_branch(),
            pages_path: default_pages_path(),
        }
    }
}

/// Deployment provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Providers tried in order; the first success wins
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderKind>,
    #[serde(default = "default_vercel_api_url")]
    pub vercel_api_url: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            vercel_api_url: default_vercel_api_url(),
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Progress channels idle longer than this are evicted
    #[serde(default = "default_progress_ttl_secs")]
    pub progress_ttl_secs: u64,
    /// Upper bound on retained progress channels
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_runs: default_max_concurrent_runs(),
            progress_ttl_secs: default_progress_ttl_secs(),
            progress_capacity: default_progress_capacity(),
            cors: true,
        }
    }
}

impl ServerConfig {
    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for local working copies
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Directory for rolling log files (stderr only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            log_dir: None,
            model: ModelConfig::default(),
            github: GitHubConfig::default(),
            deploy: DeployConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from `./autoship.toml` when no
    /// path is given and that file exists. Environment overrides are applied
    /// and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `PORT`, `AUTOSHIP_WORKSPACE` and `AUTOSHIP_MODEL` overrides.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(workspace) = lookup("AUTOSHIP_WORKSPACE").filter(|w| !w.is_empty()) {
            self.workspace = PathBuf::from(workspace);
        }
        if let Some(model) = lookup("AUTOSHIP_MODEL").filter(|m| !m.is_empty()) {
            self.model.name = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_concurrent_runs == 0 {
            return Err(ConfigError::Invalid(
                "server.max_concurrent_runs must be at least 1".into(),
            ));
        }
        if self.server.progress_capacity == 0 {
            return Err(ConfigError::Invalid(
                "server.progress_capacity must be at least 1".into(),
            ));
        }
        if self.github.primary_branch.trim().is_empty()
            || self.github.fallback_branch.trim().is_empty()
        {
            return Err(ConfigError::Invalid("branch names must not be empty".into()));
        }
        let mut seen = Vec::new();
        for provider in &self.deploy.providers {
            if seen.contains(provider) {
                return Err(ConfigError::Invalid(format!(
                    "deploy provider '{}' listed twice",
                    provider
                )));
            }
            seen.push(*provider);
        }
        Ok(())
    }
}

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
];

/// Format check only: does not verify the token is active or scoped.
pub fn has_known_github_prefix(token: &str) -> bool {
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// API credentials, read from the environment only.
#[derive(Clone)]
pub struct Credentials {
    pub gemini_api_key: String,
    pub github_token: String,
    pub vercel_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini_api_key", &"<redacted>")
            .field("github_token", &"<redacted>")
            .field("vercel_token", &self.vercel_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment. Missing or empty
    /// required credentials are fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingCredential { name })
        };
        let credentials = Self {
            gemini_api_key: required(GEMINI_API_KEY)?,
            github_token: required(GITHUB_TOKEN)?,
            vercel_token: lookup(VERCEL_TOKEN).filter(|v| !v.trim().is_empty()),
        };
        // Legacy 40-hex tokens are still accepted
        if !has_known_github_prefix(&credentials.github_token) {
            warn!("{} does not start with a known GitHub token prefix", GITHUB_TOKEN);
        }
        Ok(credentials)
    }
}

fn default_model_name() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_model_api_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_repo_description() -> String {
    "Project created automatically by autoship".to_string()
}

fn default_primary_branch() -> String {
    "main".to_string()
}

fn default_fallback_branch() -> String {
    "master".to_string()
}

fn default_commit_message() -> String {
    "Initial commit by autoship".to_string()
}

fn default_author_name() -> String {
    "autoship".to_string()
}

fn default_author_email() -> String {
    "autoship@localhost".to_string()
}

fn default_pages_path() -> String {
    "/".to_string()
}

fn default_providers() -> Vec<ProviderKind> {
    vec![ProviderKind::Vercel, ProviderKind::Pages]
}

fn default_vercel_api_url() -> String {
    "https://api.vercel.com".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_progress_ttl_secs() -> u64 {
    3600
}

fn default_progress_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

fn default_workspace() -> PathBuf {
    PathBuf::from("workspace")
}
