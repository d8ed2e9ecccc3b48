use std::sync::Arc;

use buildhub_core::build::TemplateWorkspace;
use buildhub_core::JobStore;
use buildhub_events::EventBus;

use crate::build::{BuildOrchestrator, BuildRunner};
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// In-memory registry of build jobs.
    pub jobs: Arc<JobStore>,
    /// Per-job progress event fan-out.
    pub event_bus: Arc<EventBus>,
    /// Per-job working directories, shared with the retention task.
    pub workspace: TemplateWorkspace,
    /// Accepts submissions and runs builds in the background.
    pub orchestrator: Arc<BuildOrchestrator>,
}

impl AppState {
    /// Wire up the job store, event bus, runner and orchestrator from `config`.
    pub fn new(config: &ServerConfig) -> Self {
        let build = &config.build;

        let jobs = Arc::new(JobStore::new());
        let event_bus = Arc::new(EventBus::with_close_grace(
            Arc::clone(&jobs),
            build.stream_grace,
        ));
        let runner = Arc::new(BuildRunner::new(
            Arc::clone(&event_bus),
            build.command.clone(),
            build.timeout,
        ));
        let workspace = TemplateWorkspace::new(
            build.templates_dir.clone(),
            build.builds_dir.clone(),
            build.target_file.clone(),
        );
        let orchestrator = Arc::new(BuildOrchestrator::new(
            Arc::clone(&jobs),
            Arc::clone(&event_bus),
            workspace.clone(),
            runner,
        ));

        Self {
            jobs,
            event_bus,
            workspace,
            orchestrator,
        }
    }
}
