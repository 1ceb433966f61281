use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use super::deploy::DeploymentResolver;
use super::generator::{ArtifactGenerator, README_PATH, planned_files};
use super::github::GitHubClient;
use super::models::{CreationRequest, ProgressEvent, RunResult, RunStage, RunState};
use super::outcome::{PushOutcome, RepoAcquisition};
use super::planner::PlanResolver;
use super::progress::{ProgressRegistry, ProgressSender};
use super::publisher::{PublishSettings, RepositoryPublisher};
use crate::config::{AppConfig, Credentials};
use crate::errors::PipelineError;
use crate::llm::GenerativeClient;
use crate::util::panic_message;

/// Run identifier: the project name plus a random suffix so repeated
/// requests for one project never share a progress channel.
pub fn new_run_id(project_name: &str) -> String {
    format!("{}-{}", project_name, Uuid::new_v4().simple())
}

/// Drives one run through planning, generation, publishing and deployment.
pub struct PipelineController {
    planner: PlanResolver,
    generator: ArtifactGenerator,
    publisher: RepositoryPublisher,
    deployer: DeploymentResolver,
}

impl PipelineController {
    pub fn new(
        planner: PlanResolver,
        generator: ArtifactGenerator,
        publisher: RepositoryPublisher,
        deployer: DeploymentResolver,
    ) -> Self {
        Self {
            planner,
            generator,
            publisher,
            deployer,
        }
    }

    /// Wire the production stages: the given model client, GitHub for
    /// repositories and Pages, and the configured deploy chain.
    pub fn from_config(
        config: &AppConfig,
        credentials: &Credentials,
        client: Arc<dyn GenerativeClient>,
    ) -> Self {
        let github = Arc::new(GitHubClient::new(&config.github, &credentials.github_token));
        let publisher = RepositoryPublisher::new(
            github.clone(),
            &config.workspace,
            PublishSettings::from(&config.github),
            Some(credentials.github_token.clone()),
        );
        let deployer =
            DeploymentResolver::from_config(&config.deploy, &config.github, credentials, github);
        Self::new(
            PlanResolver::new(client.clone()),
            ArtifactGenerator::new(client, config.model.request_delay()),
            publisher,
            deployer,
        )
    }

    /// Execute one run. Never fails and never panics outward: anything the
    /// stages cannot absorb becomes a failure [`RunResult`], announced by a
    /// final `error` event.
    pub async fn run(&self, request: &CreationRequest, progress: &ProgressSender) -> RunResult {
        let mut state = RunState::new(progress.run_id());
        let span = info_span!("run", run_id = %state.id, project = %request.project_name);

        let outcome = AssertUnwindSafe(self.execute(request, &mut state, progress))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        let failure = match outcome {
            Ok(Ok(result)) => {
                let _ = state.advance(RunStage::Complete);
                let elapsed = chrono::Utc::now() - state.started_at;
                info!(elapsed_ms = elapsed.num_milliseconds(), "Run complete");
                progress.emit(ProgressEvent::terminal(
                    RunStage::Complete,
                    "Project created successfully!",
                    result.clone(),
                ));
                return result;
            }
            Ok(Err(e)) => e,
            Err(payload) => PipelineError::Panicked(panic_message(payload)),
        };

        let failed_in = state.stage;
        let _ = state.advance(RunStage::Error);
        let err = anyhow::Error::new(failure);
        let message = format!("{:#}", err);
        error!(stage = %failed_in, error = %message, "Run failed");
        let result = RunResult::failed(message.clone(), format!("{:?}", err));
        progress.emit(ProgressEvent::terminal(
            RunStage::Error,
            format!("Error: {}", message),
            result.clone(),
        ));
        result
    }

    fn enter(
        state: &mut RunState,
        stage: RunStage,
        progress: &ProgressSender,
        message: &str,
    ) -> Result<(), PipelineError> {
        state
            .advance(stage)
            .map_err(|e| PipelineError::Other(anyhow::anyhow!(e)))?;
        progress.send(stage, message);
        Ok(())
    }

    async fn execute(
        &self,
        request: &CreationRequest,
        state: &mut RunState,
        progress: &ProgressSender,
    ) -> Result<RunResult, PipelineError> {
        progress.send(RunStage::Planning, "Analyzing description and planning project...");
        let plan = self.planner.resolve(&request.description).await;
        if let Some(reason) = plan.reason() {
            progress.send(
                RunStage::Planning,
                format!("Could not use the model plan ({}), using default plan", reason),
            );
        }
        let plan = plan.into_value();
        progress.send(
            RunStage::Planning,
            format!("Plan ready: {} with {} files", plan.kind, plan.files.len()),
        );

        Self::enter(state, RunStage::Generating, progress, "Generating code...")?;
        let total = planned_files(&plan).count();
        let mut done = 0;
        let artifacts = self
            .generator
            .generate(&request.description, &plan, |spec, outcome| {
                done += 1;
                let message = match outcome.reason() {
                    None => format!("Generated {} ({}/{})", spec.path, done, total),
                    Some(reason) => format!(
                        "Generated {} from template ({}/{}): {}",
                        spec.path, done, total, reason
                    ),
                };
                progress.send(RunStage::Generating, message);
            })
            .await;
        progress.send(RunStage::Generating, format!("Generated {}", README_PATH));

        Self::enter(
            state,
            RunStage::Publishing,
            progress,
            &format!("Publishing repository {}...", request.project_name),
        )?;
        let published = self
            .publisher
            .publish(&request.project_name, &artifacts)
            .await?;
        progress.send(
            RunStage::Publishing,
            match published.acquisition {
                RepoAcquisition::Created => {
                    format!("Created repository {}", published.repo.full_name)
                }
                RepoAcquisition::Reused => {
                    format!("Reusing existing repository {}", published.repo.full_name)
                }
            },
        );
        progress.send(
            RunStage::Publishing,
            match &published.push {
                PushOutcome::Pushed { branch, .. } => format!("Pushed to branch {}", branch),
                PushOutcome::Unpushed { last_error, .. } => {
                    format!("Push failed, continuing with local commit: {}", last_error)
                }
            },
        );

        Self::enter(state, RunStage::Deploying, progress, "Deploying...")?;
        let deployment = self
            .deployer
            .deploy(
                &published.repo,
                &published.local_path,
                published.push.branch(),
            )
            .await;
        progress.send(
            RunStage::Deploying,
            match deployment.provider() {
                Some(provider) => format!("Deployed with {}: {}", provider, deployment.url()),
                None => format!(
                    "No deployment provider available, using repository URL {}",
                    deployment.url()
                ),
            },
        );

        Ok(RunResult::succeeded(
            published.repo.html_url.clone(),
            deployment.url().to_string(),
            deployment.provider().map(String::from),
            artifacts.paths(),
        ))
    }
}

/// A run handed to the scheduler.
pub struct Submission {
    pub run_id: String,
    pub handle: JoinHandle<RunResult>,
}

/// Fires runs as background tasks, at most `max_concurrent_runs` at a time.
/// Queued runs wait for a permit; their progress channel exists immediately.
#[derive(Clone)]
pub struct RunScheduler {
    controller: Arc<PipelineController>,
    registry: Arc<ProgressRegistry>,
    permits: Arc<Semaphore>,
}

impl RunScheduler {
    pub fn new(
        controller: Arc<PipelineController>,
        registry: Arc<ProgressRegistry>,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            controller,
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    pub fn registry(&self) -> &Arc<ProgressRegistry> {
        &self.registry
    }

    pub fn submit(&self, request: CreationRequest) -> Submission {
        let run_id = new_run_id(&request.project_name);
        let progress = self.registry.create(&run_id);
        progress.send(RunStage::Planning, "Request accepted, starting...");

        let controller = Arc::clone(&self.controller);
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let result =
                        RunResult::failed(format!("Scheduler closed: {}", e), String::new());
                    progress.emit(ProgressEvent::terminal(
                        RunStage::Error,
                        "Error: scheduler closed",
                        result.clone(),
                    ));
                    return result;
                }
            };
            controller.run(&request, &progress).await
        });

        info!(run_id = %run_id, "Run submitted");
        Submission { run_id, handle }
    }
}
