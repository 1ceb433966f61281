use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::models::{ArtifactSet, FileSpec, Plan};
use super::outcome::Outcome;
use crate::llm::GenerativeClient;
use crate::util::{strip_code_fence, title_case};

pub const README_PATH: &str = "README.md";

/// Planned files that get a model call. A planned root README in any case
/// is skipped, since the synthesized README replaces it.
pub fn planned_files(plan: &Plan) -> impl Iterator<Item = &FileSpec> {
    plan.files
        .iter()
        .filter(|spec| !spec.path.eq_ignore_ascii_case(README_PATH))
}

/// Enforces a minimum interval between consecutive model calls.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Sleep until `min_interval` has passed since the previous call, then
    /// record this call. The first call never waits.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Broad content category used to pick a fallback body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Markup,
    Style,
    Script,
    Other,
}

impl FileCategory {
    pub fn from_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" => Self::Markup,
            "css" | "scss" | "sass" | "less" => Self::Style,
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => Self::Script,
            _ => Self::Other,
        }
    }
}

/// Minimal, syntactically valid body for a file whose generation failed.
pub fn fallback_content(spec: &FileSpec, description: &str) -> String {
    let summary = if spec.description.trim().is_empty() {
        spec.path.as_str()
    } else {
        spec.description.trim()
    };
    match FileCategory::from_path(&spec.path) {
        FileCategory::Markup => format!(
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n\
             \x20   <meta charset=\"UTF-8\">\n\
             \x20   <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             \x20   <title>{title}</title>\n\
             \x20   <link rel=\"stylesheet\" href=\"style.css\">\n\
             </head>\n\
             <body>\n\
             \x20   <main>\n\
             \x20       <h1>{title}</h1>\n\
             \x20       <p>{body}</p>\n\
             \x20   </main>\n\
             \x20   <script src=\"script.js\"></script>\n\
             </body>\n\
             </html>\n",
            title = escape_html(summary),
            body = escape_html(description),
        ),
        FileCategory::Style => "* {\n    box-sizing: border-box;\n}\n\n\
             body {\n    margin: 0;\n    font-family: system-ui, sans-serif;\n    \
             line-height: 1.5;\n    color: #1f2933;\n    background: #f5f7fa;\n}\n\n\
             main {\n    max-width: 960px;\n    margin: 0 auto;\n    padding: 2rem 1rem;\n}\n"
            .to_string(),
        FileCategory::Script => format!(
            "// {}\ndocument.addEventListener('DOMContentLoaded', () => {{\n    console.log('{} loaded');\n}});\n",
            single_line(summary),
            escape_js(&spec.path),
        ),
        FileCategory::Other => format!("{}\n\n{}\n", summary, description),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn escape_js(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn single_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" ")
}

/// README assembled from the plan. Deterministic; no model call.
pub fn render_readme(description: &str, plan: &Plan) -> String {
    let features = if plan.features.is_empty() {
        "- (none listed)".to_string()
    } else {
        plan.features
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let technologies = if plan.technologies.is_empty() {
        "(none listed)".to_string()
    } else {
        plan.technologies.join(", ")
    };
    format!(
        "# {title}\n\n\
         Project created automatically by autoship.\n\n\
         ## Description\n{description}\n\n\
         ## Technologies\n{technologies}\n\n\
         ## Features\n{features}\n\n\
         ## Deploy\n\
         This project was deployed automatically.\n",
        title = title_case(&plan.kind),
    )
}

fn build_file_prompt(description: &str, plan: &Plan, spec: &FileSpec) -> String {
    format!(
        "Create the file {path} for this project.\n\n\
         PROJECT DESCRIPTION: {description}\n\n\
         FILE DESCRIPTION: {file_description}\n\n\
         TECHNOLOGIES: {technologies}\n\n\
         FEATURES: {features}\n\n\
         IMPORTANT:\n\
         - Complete, working code\n\
         - No unnecessary explanatory comments\n\
         - Modern, responsive design\n\
         - For HTML include the full document structure\n\n\
         Return ONLY the code, without explanations.",
        path = spec.path,
        file_description = spec.description,
        technologies = plan.technologies.join(", "),
        features = plan.features.join(", "),
    )
}

/// Produces file contents for a plan, one model call per file.
pub struct ArtifactGenerator {
    client: Arc<dyn GenerativeClient>,
    request_delay: Duration,
}

impl ArtifactGenerator {
    pub fn new(client: Arc<dyn GenerativeClient>, request_delay: Duration) -> Self {
        Self {
            client,
            request_delay,
        }
    }

    /// Generate one file. Call errors and empty output yield the fallback body.
    pub async fn generate_file(
        &self,
        description: &str,
        plan: &Plan,
        spec: &FileSpec,
    ) -> Outcome<String> {
        let prompt = build_file_prompt(description, plan, spec);
        match self.client.generate(&prompt).await {
            Ok(raw) => {
                let code = strip_code_fence(&raw).trim();
                if code.is_empty() {
                    warn!(path = %spec.path, "Model returned empty content, using template");
                    Outcome::recovered(fallback_content(spec, description), "empty model output")
                } else {
                    Outcome::Fresh(code.to_string())
                }
            }
            Err(e) => {
                warn!(path = %spec.path, error = %e, "Generation failed, using template");
                Outcome::recovered(
                    fallback_content(spec, description),
                    format!("model call failed: {}", e),
                )
            }
        }
    }

    /// Generate every planned file in plan order, then append the README.
    ///
    /// `on_file` is invoked after each planned file with its outcome so the
    /// caller can report progress. Never fails.
    pub async fn generate<F>(&self, description: &str, plan: &Plan, mut on_file: F) -> ArtifactSet
    where
        F: FnMut(&FileSpec, &Outcome<String>),
    {
        let mut artifacts = ArtifactSet::new();
        let mut pacer = RequestPacer::new(self.request_delay);

        for spec in planned_files(plan) {
            pacer.wait().await;
            debug!(path = %spec.path, "Generating file");
            let outcome = self.generate_file(description, plan, spec).await;
            on_file(spec, &outcome);
            artifacts.insert(spec.path.clone(), outcome.into_value());
        }

        artifacts.insert(README_PATH, render_readme(description, plan));
        artifacts
    }
}
