use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::{CreationRequest, ProgressEvent, RunScheduler};
use crate::util::is_valid_repo_name;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub scheduler: RunScheduler,
    pub github_configured: bool,
    pub gemini_configured: bool,
}

pub type SharedState = Arc<AppState>;

// ── Request / response payloads ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectResponse {
    pub success: bool,
    pub project_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub messages: Vec<ProgressEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub github_configured: bool,
    pub gemini_configured: bool,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/create", post(create_project))
        .route("/progress/{project_id}", get(get_progress))
        .route("/health", get(health_check))
}

fn validate(req: CreateProjectRequest) -> Result<CreationRequest, ApiError> {
    let description = req.description.trim();
    let project_name = req.project_name.trim();
    if description.is_empty() || project_name.is_empty() {
        return Err(ApiError::BadRequest(
            "description and project_name are required".into(),
        ));
    }
    if !is_valid_repo_name(project_name) {
        return Err(ApiError::BadRequest(format!(
            "Invalid project_name '{}': use up to 100 letters, digits, '.', '-' or '_'",
            project_name
        )));
    }
    Ok(CreationRequest {
        description: description.to_string(),
        project_name: project_name.to_string(),
    })
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = validate(req)?;
    let project_name = request.project_name.clone();
    let submission = state.scheduler.submit(request);
    info!(run_id = %submission.run_id, project = %project_name, "Accepted creation request");
    Ok((
        StatusCode::ACCEPTED,
        Json(CreateProjectResponse {
            success: true,
            project_id: submission.run_id,
            message: format!("Project {} creation started", project_name),
        }),
    ))
}

async fn get_progress(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    state
        .scheduler
        .registry()
        .drain(&project_id)
        .map(|messages| Json(ProgressResponse { messages }))
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", project_id)))
}

async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: env!("CARGO_PKG_NAME").into(),
        github_configured: state.github_configured,
        gemini_configured: state.gemini_configured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitHubConfig;
    use crate::llm::MockGenerativeClient;
    use crate::pipeline::testing::LocalRepoHost;
    use crate::pipeline::{
        ArtifactGenerator, DeploymentResolver, PipelineController, PlanResolver, ProgressRegistry,
        PublishSettings, RepositoryPublisher, RunStage,
    };
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app() -> (Router, SharedState, TempDir) {
        let workspace = tempfile::tempdir().unwrap();
        let client = Arc::new(MockGenerativeClient::failing("offline"));
        let controller = PipelineController::new(
            PlanResolver::new(client.clone()),
            ArtifactGenerator::new(client, Duration::ZERO),
            RepositoryPublisher::new(
                Arc::new(LocalRepoHost::new()),
                workspace.path(),
                PublishSettings::from(&GitHubConfig::default()),
                None,
            ),
            DeploymentResolver::new(Vec::new()),
        );
        let registry = Arc::new(ProgressRegistry::new(Duration::from_secs(60), 16));
        let state = Arc::new(AppState {
            scheduler: RunScheduler::new(Arc::new(controller), registry, 2),
            github_configured: true,
            gemini_configured: false,
        });
        (api_router().with_state(state.clone()), state, workspace)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_create(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_credentials() {
        let (app, _, _ws) = test_app();
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = body_json(response.into_body()).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.service, "autoship");
        assert!(health.github_configured);
        assert!(!health.gemini_configured);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_fields() {
        let (app, _, _ws) = test_app();
        for body in [
            serde_json::json!({"description": "", "project_name": "demo"}),
            serde_json::json!({"description": "a page", "project_name": "   "}),
            serde_json::json!({"description": "a page"}),
        ] {
            let response = app.clone().oneshot(post_create(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let err: serde_json::Value = body_json(response.into_body()).await;
            assert!(err["error"].as_str().unwrap().contains("required"));
        }
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_project_name() {
        let (app, state, _ws) = test_app();
        let response = app
            .oneshot(post_create(
                serde_json::json!({"description": "a page", "project_name": "my project/../x"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.scheduler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_create_accepts_and_progress_drains() {
        let (app, _, _ws) = test_app();
        let response = app
            .clone()
            .oneshot(post_create(serde_json::json!({
                "description": "simple counter page",
                "project_name": "counter-demo"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let created: CreateProjectResponse = body_json(response.into_body()).await;
        assert!(created.success);
        assert!(created.project_id.starts_with("counter-demo-"));

        // Poll until the run reports a terminal event.
        let mut events = Vec::new();
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get(&format!("/progress/{}", created.project_id)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let progress: ProgressResponse = body_json(response.into_body()).await;
            events.extend(progress.messages);
            if events.last().is_some_and(|e| e.stage.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        assert_eq!(events.first().unwrap().message, "Request accepted, starting...");
        let last = events.last().unwrap();
        assert_eq!(last.stage, RunStage::Complete);
        assert!(last.result.as_ref().unwrap().success);
        assert_eq!(events.iter().filter(|e| e.result.is_some()).count(), 1);
    }

    #[tokio::test]
    async fn test_progress_unknown_id_is_404() {
        let (app, _, _ws) = test_app();
        let response = app.oneshot(get("/progress/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let err: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(err["error"], "Project nope not found");
    }

    #[tokio::test]
    async fn test_progress_serializes_step_field() {
        let (app, _, _ws) = test_app();
        let response = app
            .clone()
            .oneshot(post_create(
                serde_json::json!({"description": "d", "project_name": "step-demo"}),
            ))
            .await
            .unwrap();
        let created: CreateProjectResponse = body_json(response.into_body()).await;

        let response = app
            .oneshot(get(&format!("/progress/{}", created.project_id)))
            .await
            .unwrap();
        let raw: serde_json::Value = body_json(response.into_body()).await;
        let first = &raw["messages"][0];
        assert_eq!(first["step"], "planning");
        assert!(first.get("result").is_none());
    }
}
