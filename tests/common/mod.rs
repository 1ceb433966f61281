//! In-process mock of the GitHub and Vercel APIs.
//!
//! Repositories created through the mock are local bare repositories, so
//! clone and push run against real git without leaving the machine.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tempfile::TempDir;

pub const TOKEN: &str = "ghp_testtoken";
pub const OWNER: &str = "octo";

#[derive(Default)]
pub struct Recorded {
    pub created: Vec<String>,
    pub pages_requests: Vec<(String, Value)>,
    pub deployments: Vec<Value>,
}

struct MockState {
    remotes: PathBuf,
    repos: Mutex<HashSet<String>>,
    pages_enabled: Mutex<HashSet<String>>,
    vercel_url: Option<String>,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct MockApi {
    pub base_url: String,
    pub recorded: Arc<Mutex<Recorded>>,
    remotes: TempDir,
}

impl MockApi {
    /// Start the mock. `vercel_url` is the host returned by deployments;
    /// `None` makes every deployment request fail with 500.
    pub async fn start(vercel_url: Option<&str>) -> Self {
        let remotes = tempfile::tempdir().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = Arc::new(MockState {
            remotes: remotes.path().to_path_buf(),
            repos: Mutex::new(HashSet::new()),
            pages_enabled: Mutex::new(HashSet::new()),
            vercel_url: vercel_url.map(String::from),
            recorded: recorded.clone(),
        });

        let app = Router::new()
            .route("/user", get(user))
            .route("/user/repos", post(create_repo))
            .route("/repos/{owner}/{name}", get(get_repo))
            .route("/repos/{owner}/{name}/pages", post(enable_pages))
            .route("/v13/deployments", post(create_deployment))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            recorded,
            remotes,
        }
    }

    pub fn remote_path(&self, name: &str) -> PathBuf {
        self.remotes.path().join(format!("{}.git", name))
    }

    /// Commit at `refs/heads/<branch>` of the bare remote, if any.
    pub fn remote_head(&self, name: &str, branch: &str) -> Option<git2::Oid> {
        let repo = git2::Repository::open_bare(self.remote_path(name)).ok()?;
        let reference = repo.find_reference(&format!("refs/heads/{}", branch)).ok()?;
        reference.target()
    }

    /// Move the remote's history to `master` (now its HEAD) and replace
    /// `main` with an unrelated root commit, so a later push to `main` is
    /// rejected as non-fast-forward while `master` still accepts one.
    pub fn diverge_main(&self, name: &str) {
        let repo = git2::Repository::open_bare(self.remote_path(name)).unwrap();
        let history = repo
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        repo.branch("master", &history, true).unwrap();
        repo.set_head("refs/heads/master").unwrap();

        let signature = git2::Signature::now("someone", "someone@example.com").unwrap();
        let empty_tree = repo.treebuilder(None).unwrap().write().unwrap();
        let empty_tree = repo.find_tree(empty_tree).unwrap();
        let unrelated = repo
            .commit(None, &signature, &signature, "unrelated", &empty_tree, &[])
            .unwrap();
        repo.reference("refs/heads/main", unrelated, true, "diverge main")
            .unwrap();
    }

    /// Paths in the tree at `refs/heads/<branch>` of the bare remote.
    pub fn remote_files(&self, name: &str, branch: &str) -> Vec<String> {
        let repo = git2::Repository::open_bare(self.remote_path(name)).unwrap();
        let commit = repo
            .find_reference(&format!("refs/heads/{}", branch))
            .unwrap()
            .peel_to_commit()
            .unwrap();
        let mut files = Vec::new();
        commit
            .tree()
            .unwrap()
            .walk(git2::TreeWalkMode::PreOrder, |root, entry| {
                if entry.kind() == Some(git2::ObjectType::Blob) {
                    files.push(format!("{}{}", root, entry.name().unwrap_or_default()));
                }
                git2::TreeWalkResult::Ok
            })
            .unwrap();
        files.sort();
        files
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Bad credentials"})),
    )
        .into_response()
}

fn repo_json(state: &MockState, name: &str) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{}/{}", OWNER, name),
        "private": false,
        "html_url": format!("https://github.com/{}/{}", OWNER, name),
        "clone_url": state.remotes.join(format!("{}.git", name)).to_string_lossy(),
        "default_branch": "main",
        "owner": {"login": OWNER, "id": 7}
    })
}

async fn user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"login": OWNER, "id": 7})).into_response()
}

async fn create_repo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if !state.repos.lock().unwrap().insert(name.clone()) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Repository creation failed.",
                "errors": [{"resource": "Repository", "code": "custom", "field": "name",
                            "message": "name already exists on this account"}]
            })),
        )
            .into_response();
    }
    let bare = git2::Repository::init_bare(state.remotes.join(format!("{}.git", name))).unwrap();
    bare.set_head("refs/heads/main").unwrap();
    state.recorded.lock().unwrap().created.push(name.clone());
    (StatusCode::CREATED, Json(repo_json(&state, &name))).into_response()
}

async fn get_repo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((owner, name)): Path<(String, String)>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    if owner != OWNER || !state.repos.lock().unwrap().contains(&name) {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    }
    Json(repo_json(&state, &name)).into_response()
}

async fn enable_pages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((_owner, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    state
        .recorded
        .lock()
        .unwrap()
        .pages_requests
        .push((name.clone(), body));
    if !state.pages_enabled.lock().unwrap().insert(name) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"message": "GitHub Pages is already enabled."})),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({"status": "queued"}))).into_response()
}

async fn create_deployment(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Response {
    state.recorded.lock().unwrap().deployments.push(body);
    match &state.vercel_url {
        Some(url) => Json(json!({"id": "dpl_1", "url": url})).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "internal"}})),
        )
            .into_response(),
    }
}
