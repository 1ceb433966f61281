//! Typed error hierarchy for autoship.
//!
//! The enums follow the three failure tiers of a run:
//! - `ConfigError`: fatal to the process, raised before any run starts
//! - `GenerationError` / `HostError`: raised by external collaborators and
//!   usually absorbed by a stage fallback
//! - `PipelineError`: fatal to a single run, caught by the controller

use std::path::PathBuf;

use thiserror::Error;

/// Startup-time configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required credential {name}: set it in the environment or a .env file")]
    MissingCredential { name: &'static str },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the generative text model.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generative model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generative model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generative model returned no text")]
    Empty,

    #[error("{0}")]
    Scripted(String),
}

/// Failures of the version-control hosting API.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Repository {name} already exists")]
    AlreadyExists { name: String },

    #[error("Repository {full_name} not found")]
    NotFound { full_name: String },

    #[error("Hosting API rejected the credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("Hosting API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Hosting API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure of a single deployment provider. The resolver treats every
/// variant as "provider unavailable" and moves on.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} response did not contain a deployment URL")]
    MissingUrl { provider: &'static str },

    #[error("Deployment request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Errors that end a run in the `error` stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to acquire repository {name}: {source}")]
    Repository {
        name: String,
        #[source]
        source: HostError,
    },

    #[error("Failed to prepare working copy at {path}: {source}")]
    WorkingCopy {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("Failed to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to commit generated files: {0}")]
    Commit(#[source] git2::Error),

    #[error("Stage worker panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
