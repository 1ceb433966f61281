
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable input to a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreationRequest {
    pub description: String,
    pub project_name: String,
}

/// One file the plan asks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSpec {
    pub path: String,
    #[serde(default, alias = "descricao")]
    pub description: String,
}

/// Structured build plan resolved from a description.
///
/// Accepts both the English keys and the Portuguese keys of older prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    #[serde(default = "default_kind", alias = "type", alias = "tipo")]
    pub kind: String,
    #[serde(default, alias = "tecnologias")]
    pub technologies: Vec<String>,
    #[serde(default, alias = "arquivos")]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub features: Vec<String>,
}

fn default_kind() -> String {
    "web-app".to_string()
}

impl Plan {
    /// The fixed plan used whenever the model output is unusable.
    pub fn fallback() -> Self {
        Plan {
            kind: default_kind(),
            technologies: vec!["HTML".into(), "CSS".into(), "JavaScript".into()],
            files: vec![
                FileSpec {
                    path: "index.html".into(),
                    description: "Main page".into(),
                },
                FileSpec {
                    path: "style.css".into(),
                    description: "Styles".into(),
                },
                FileSpec {
                    path: "script.js".into(),
                    description: "Logic".into(),
                },
            ],
            features: vec!["Responsive interface".into(), "Modern design".into()],
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// One generated file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub path: String,
    pub content: String,
}

/// Generated files keyed by relative path, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSet {
    entries: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the artifact at `path`. A replaced entry moves to
    /// the end so insertion order reflects the last write.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        self.entries.retain(|a| a.path != path);
        self.entries.push(Artifact {
            path,
            content: content.into(),
        });
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|a| a.path == path)
            .map(|a| a.content.as_str())
    }

    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|a| a.path.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stage of a run. Strictly linear, with `Error` absorbing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Planning,
    Generating,
    Publishing,
    Deploying,
    Complete,
    Error,
}

impl RunStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Generating => "generating",
            Self::Publishing => "publishing",
            Self::Deploying => "deploying",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether the state machine may move from `self` to `to`.
    pub fn can_transition_to(&self, to: RunStage) -> bool {
        matches!(
            (self, to),
            (Self::Planning, Self::Generating)
                | (Self::Generating, Self::Publishing)
                | (Self::Publishing, Self::Deploying)
                | (Self::Deploying, Self::Complete)
        ) || (!self.is_terminal() && to == Self::Error)
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable state of one run, owned by the controller.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub id: String,
    pub stage: RunStage,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: RunStage::Planning,
            started_at: Utc::now(),
        }
    }

    /// Move to `next`, refusing transitions the state machine forbids.
    pub fn advance(&mut self, next: RunStage) -> Result<(), String> {
        if !self.stage.can_transition_to(next) {
            return Err(format!(
                "invalid stage transition {} -> {}",
                self.stage, next
            ));
        }
        self.stage = next;
        Ok(())
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_url: Option<String>,
    /// Provider that served `deploy_url`; absent when deployment degraded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl RunResult {
    pub fn succeeded(
        repo_url: String,
        deploy_url: String,
        deploy_provider: Option<String>,
        files: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            repo_url: Some(repo_url),
            deploy_url: Some(deploy_url),
            deploy_provider,
            files,
            ..Self::default()
        }
    }

    pub fn failed(error: String, trace: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            trace: Some(trace),
            ..Self::default()
        }
    }
}

/// Human-readable progress message for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    #[serde(rename = "step")]
    pub stage: RunStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
}

impl ProgressEvent {
    pub fn new(stage: RunStage, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage,
            result: None,
        }
    }

    pub fn terminal(stage: RunStage, message: impl Into<String>, result: RunResult) -> Self {
        Self {
            message: message.into(),
            stage,
            result: Some(result),
        }
    }
}
