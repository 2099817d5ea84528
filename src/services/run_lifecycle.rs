use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ExecutionParameters, ReportNodeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Initialized, waiting to be executed
    Pending,
    Running,
    /// Abort requested, the walk stops at the next composition check
    Aborting,
    Ended,
}

/// View of a run tracked by the lifecycle manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub plan_id: String,
    pub user_id: Option<String>,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub root_report_node_id: String,
    pub status: ReportNodeStatus,
}

/// Run driver contract used by the scheduler
#[async_trait]
pub trait RunLifecycle: Send + Sync {
    async fn initialize_run(&self, parameters: ExecutionParameters) -> Result<String>;
    async fn execute_run(&self, run_id: &str) -> Result<RunResult>;
    async fn abort(&self, run_id: &str) -> Result<()>;
    /// Drop a run that was initialized but never started
    async fn discard_run(&self, run_id: &str) -> Result<()>;
    fn active_runs(&self) -> Vec<RunSummary>;
}
