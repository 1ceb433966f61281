//! Foreground pipeline run: `autoship create`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use autoship::config::{AppConfig, Credentials};
use autoship::llm::GeminiClient;
use autoship::pipeline::progress::channel;
use autoship::pipeline::runner::new_run_id;
use autoship::pipeline::{CreationRequest, PipelineController, ProgressEvent, RunStage};
use autoship::util::is_valid_repo_name;

/// `project-<unix seconds>`, used when no name is given.
fn default_project_name() -> String {
    format!("project-{}", chrono::Utc::now().timestamp())
}

fn print_event(event: &ProgressEvent) {
    let stage = format!("[{}]", event.stage);
    let stage = match event.stage {
        RunStage::Complete => console::style(stage).green().bold(),
        RunStage::Error => console::style(stage).red().bold(),
        _ => console::style(stage).cyan(),
    };
    println!("{} {}", stage, event.message);
}

pub async fn cmd_create(
    config: AppConfig,
    description: &str,
    project_name: Option<String>,
) -> Result<()> {
    let description = description.trim();
    if description.is_empty() {
        bail!("Description must not be empty");
    }
    let project_name = project_name.unwrap_or_else(default_project_name);
    if !is_valid_repo_name(&project_name) {
        bail!(
            "Invalid project name '{}': use up to 100 letters, digits, '.', '-' or '_'",
            project_name
        );
    }

    let credentials = Credentials::from_env()?;
    std::fs::create_dir_all(&config.workspace).with_context(|| {
        format!(
            "Failed to create workspace directory {}",
            config.workspace.display()
        )
    })?;

    let client = Arc::new(GeminiClient::new(&config.model, &credentials.gemini_api_key));
    let controller = PipelineController::from_config(&config, &credentials, client);
    let request = CreationRequest {
        description: description.to_string(),
        project_name,
    };

    println!(
        "{} {}",
        console::style("autoship").bold().cyan(),
        console::style(&request.project_name).bold()
    );

    let (progress, mut events) = channel(new_run_id(&request.project_name));
    let run = tokio::spawn(async move { controller.run(&request, &progress).await });
    while let Some(event) = events.recv().await {
        print_event(&event);
    }
    let result = run.await.context("Pipeline task failed")?;

    println!();
    if !result.success {
        bail!(
            "Project creation failed: {}",
            result.error.unwrap_or_else(|| "unknown error".into())
        );
    }
    if let Some(repo_url) = &result.repo_url {
        println!("  {} {}", console::style("Repository:").bold(), repo_url);
    }
    if let Some(deploy_url) = &result.deploy_url {
        let label = match &result.deploy_provider {
            Some(provider) => format!("Deployed ({}):", provider),
            None => "Deployed:".to_string(),
        };
        println!("  {} {}", console::style(label).bold(), deploy_url);
    }
    println!("  {} {}", console::style("Files:").bold(), result.files.join(", "));
    Ok(())
}
