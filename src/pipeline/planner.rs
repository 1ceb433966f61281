use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::models::Plan;
use super::outcome::Outcome;
use crate::llm::GenerativeClient;
use crate::util::{extract_json_object, strip_code_fence};

const PLANNER_PROMPT: &str = r#"You are an expert software architect. Produce a practical plan for the project described below.

Respond with JSON only, matching this schema:
{
  "type": "web-app" | "landing-page" | "dashboard" | "api",
  "technologies": ["HTML", "CSS", "JavaScript"],
  "files": [
    {"path": "index.html", "description": "Main page"},
    {"path": "style.css", "description": "Styles"}
  ],
  "features": ["Feature 1", "Feature 2"]
}

Rules:
- Paths are relative and unique.
- Keep the file list small and focused on something functional and modern.
"#;

/// Parse model output into a plan.
///
/// Code fences are stripped first; if the body is still not JSON the
/// outermost `{...}` object is tried. Unsafe or duplicate paths are dropped.
pub fn parse_plan(raw: &str) -> Result<Plan> {
    let body = strip_code_fence(raw).trim();
    let plan: Plan = match serde_json::from_str(body) {
        Ok(plan) => plan,
        Err(first_err) => {
            let object = extract_json_object(body)
                .with_context(|| format!("No JSON object in plan response: {}", first_err))?;
            serde_json::from_str(&object).context("Failed to parse plan response as JSON")?
        }
    };
    let plan = sanitize(plan);
    if plan.files.is_empty() {
        anyhow::bail!("Plan contains no usable files");
    }
    Ok(plan)
}

fn sanitize(mut plan: Plan) -> Plan {
    let mut seen = HashSet::new();
    plan.files.retain_mut(|file| {
        file.path = file.path.trim().to_string();
        if !is_safe_relative_path(&file.path) {
            warn!(path = %file.path, "Dropping unsafe path from plan");
            return false;
        }
        if !seen.insert(file.path.clone()) {
            debug!(path = %file.path, "Dropping duplicate path from plan");
            return false;
        }
        true
    });
    plan
}

/// A non-empty relative path that cannot escape the working copy or touch `.git`.
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let mut components = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) if part != ".git" => components += 1,
            _ => return false,
        }
    }
    components > 0
}

/// Resolves a description into a [`Plan`] with one model call and a fixed
/// fallback.
pub struct PlanResolver {
    client: Arc<dyn GenerativeClient>,
}

impl PlanResolver {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    /// Never fails: model errors and unusable output yield [`Plan::fallback`].
    pub async fn resolve(&self, description: &str) -> Outcome<Plan> {
        let prompt = build_prompt(description);
        let response = match self.client.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Plan request failed, using fallback plan");
                return Outcome::recovered(Plan::fallback(), format!("model call failed: {}", e));
            }
        };
        match parse_plan(&response) {
            Ok(plan) => Outcome::Fresh(plan),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Unusable plan response, using fallback plan");
                debug!(
                    raw = %response.chars().take(500).collect::<String>(),
                    "Raw plan response"
                );
                Outcome::recovered(Plan::fallback(), format!("{:#}", e))
            }
        }
    }
}

fn build_prompt(description: &str) -> String {
    format!("{}\n## Project\n{}\n", PLANNER_PROMPT, description)
}
