//! Stage outcomes that keep "expected and handled" failures visible.
//!
//! A stage returns `Ok(outcome)` when it produced a usable value, either the
//! real one or a fallback, and `Err` only for failures that end the run.

/// A value produced either by the primary path or by a fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Fresh(T),
    Recovered { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn recovered(value: T, reason: impl Into<String>) -> Self {
        Self::Recovered {
            value,
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Fresh(value) | Self::Recovered { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Fresh(value) | Self::Recovered { value, .. } => value,
        }
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }

    /// Why the fallback was used, if it was.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fresh(_) => None,
            Self::Recovered { reason, .. } => Some(reason),
        }
    }
}

/// How the remote repository was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoAcquisition {
    Created,
    /// Creation collided with an existing repository, which is reused
    Reused,
}

/// How the local working copy was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Cloned,
    /// Clone failed; a fresh repository was initialized with the remote added
    Initialized,
}

/// Result of pushing the commit. Neither variant fails the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed { branch: String, attempts: u32 },
    Unpushed { attempts: u32, last_error: String },
}

impl PushOutcome {
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Pushed { branch, .. } => Some(branch),
            Self::Unpushed { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pushed { attempts, .. } | Self::Unpushed { attempts, .. } => *attempts,
        }
    }
}

/// Result of the deployment chain. `Degraded` is an accepted completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed { provider: String, url: String },
    Degraded { url: String },
}

impl DeployOutcome {
    pub fn url(&self) -> &str {
        match self {
            Self::Deployed { url, .. } | Self::Degraded { url } => url,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Deployed { provider, .. } => Some(provider),
            Self::Degraded { .. } => None,
        }
    }
}
