//! Stage pipeline: description in, published and deployed repository out.
//!
//! ## Overview
//!
//! A run moves strictly forward through planning, generation, publishing and
//! deployment. Every stage absorbs the failures it expects (malformed model
//! output, name collisions, empty remotes, rejected pushes, unavailable
//! deploy providers) and reports them through [`outcome`] types. Only what a
//! stage cannot absorb reaches the controller, which turns it into a failure
//! [`RunResult`] instead of propagating it.
//!
//! ## Module Map
//!
//! ```text
//! ┌────────────┐ submit ┌───────────────────────────────────────────────┐
//! │ HTTP / CLI │ ─────> │  runner.rs   (RunScheduler, PipelineController)│
//! │            │ <───── │     │                                          │
//! └────────────┘  drain │     │ PlanResolver::resolve()  → Plan          │
//!        ^              │     v                                          │
//!        │              │  planner.rs                                    │
//!        │              │     │ ArtifactGenerator::generate() → Artifacts│
//!        │              │     v                                          │
//!        │              │  generator.rs                                  │
//!        │              │     │ RepositoryPublisher::publish()           │
//!        │              │     v                                          │
//!        │              │  publisher.rs ──> github.rs (RepoHost)         │
//!        │              │     │ DeploymentResolver::deploy()             │
//!        │              │     v                                          │
//!        │              │  deploy.rs   (Vercel, Pages)                   │
//!        │              └───────────────────────────────────────────────┘
//!        │                   │ ProgressEvent per step
//!        └──── progress.rs <─┘ (ProgressRegistry, one channel per run)
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                              |
//! |-----------|-------------------------------------------------------------|
//! | `models`  | `CreationRequest`, `Plan`, `ArtifactSet`, `RunStage`, `RunResult` |
//! | `outcome` | `Outcome<T>` and the per-stage outcome enums                |
//! | `github`  | GitHub REST client: repositories and Pages                  |

pub mod deploy;
pub mod generator;
pub mod github;
pub mod models;
pub mod outcome;
pub mod planner;
pub mod progress;
pub mod publisher;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use deploy::{DeployProvider, DeploymentResolver, PagesProvider, VercelProvider};
pub use generator::ArtifactGenerator;
pub use github::{GitHubClient, RepoHandle, RepoHost};
pub use models::{
    Artifact, ArtifactSet, CreationRequest, FileSpec, Plan, ProgressEvent, RunResult, RunStage,
    RunState,
};
pub use outcome::{CheckoutKind, DeployOutcome, Outcome, PushOutcome, RepoAcquisition};
pub use planner::PlanResolver;
pub use progress::{ProgressReceiver, ProgressRegistry, ProgressSender};
pub use publisher::{PublishSettings, Published, RepositoryPublisher};
pub use runner::{PipelineController, RunScheduler, Submission};
