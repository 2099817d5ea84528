//! # Execution Engine
//!
//! Run driver of the execution core. A run goes through three steps:
//!
//! 1. [`initialize_run`](RunLifecycle::initialize_run) records a pending run
//!    and builds its [`ExecutionContext`]
//! 2. [`execute_run`](RunLifecycle::execute_run) resolves the plan, creates
//!    the root report node, then walks the plan tree (skeleton, then execution)
//! 3. the run record is dropped once the walk finished
//!
//! [`abort`](RunLifecycle::abort) interrupts a run cooperatively. The walk
//! stops at the next composition check and the run ends `INTERRUPTED`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stepper_core::config::StepperConfig;
//! use stepper_core::engine::ExecutionEngine;
//! use stepper_core::execution::ExecutionServices;
//! use stepper_core::models::{ExecutionParameters, Plan, PlanNode};
//! use stepper_core::services::{FunctionDispatcher, InMemoryPlanStore, PlanStore, TokenBroker};
//!
//! # async fn example(
//! #     broker: Arc<dyn TokenBroker>,
//! #     dispatcher: Arc<dyn FunctionDispatcher>,
//! # ) -> stepper_core::Result<()> {
//! let plans = Arc::new(InMemoryPlanStore::new());
//! let plan = Plan::new("smoke", PlanNode::sequence("Main"));
//! let plan_id = plan.id.clone();
//! plans.save(plan).await?;
//!
//! let engine = ExecutionEngine::new(
//!     Arc::new(StepperConfig::default()),
//!     ExecutionServices::new(broker, dispatcher),
//!     plans,
//! );
//! let result = engine.run(ExecutionParameters::for_plan(plan_id)).await?;
//! println!("run {} ended {}", result.run_id, result.status);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::StepperConfig;
use crate::error::{Result, StepperError};
use crate::execution::{ExecutionContext, ExecutionServices};
use crate::logging::log_run_operation;
use crate::models::{ExecutionParameters, ReportNode, ReportNodeStatus};
use crate::orchestration::framework::{self, elapsed_ms};
use crate::services::{PlanStore, RunLifecycle, RunResult, RunState, RunSummary};

struct RunEntry {
    summary: RunSummary,
    context: Arc<ExecutionContext>,
}

/// Drives plan runs on top of the execution services
pub struct ExecutionEngine {
    config: Arc<StepperConfig>,
    services: ExecutionServices,
    plan_store: Arc<dyn PlanStore>,
    runs: DashMap<String, RunEntry>,
}

impl ExecutionEngine {
    pub fn new(
        config: Arc<StepperConfig>,
        services: ExecutionServices,
        plan_store: Arc<dyn PlanStore>,
    ) -> Self {
        info!("Creating ExecutionEngine");
        Self {
            config,
            services,
            plan_store,
            runs: DashMap::new(),
        }
    }

    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    pub fn services(&self) -> &ExecutionServices {
        &self.services
    }

    /// Initialize and execute a run in one go
    pub async fn run(&self, parameters: ExecutionParameters) -> Result<RunResult> {
        let run_id = self.initialize_run(parameters).await?;
        self.execute_run(&run_id).await
    }

    async fn walk(&self, ctx: &ExecutionContext) -> Result<RunResult> {
        let plan_id = &ctx.parameters().plan_id;
        let plan = self
            .plan_store
            .get(plan_id)
            .await?
            .ok_or_else(|| StepperError::PlanNotFound(plan_id.clone()))?;

        let mut root = ReportNode::root(ctx.run_id(), plan.name());
        let vars = ctx.variables();
        vars.open_scope(&root.id, None);
        for (key, value) in &ctx.parameters().variables {
            vars.put(&root.id, key.clone(), value.clone());
        }
        self.services.report_store.save(&root).await?;
        let started = Instant::now();

        framework::create_skeleton(ctx, &root, &plan.root, &[]).await;
        let result = framework::execute(ctx, &root, &plan.root, &[]).await;

        root.status = if ctx.is_interrupted() {
            ReportNodeStatus::Interrupted
        } else {
            ctx.severity().compose([result.status])
        };
        root.duration_ms = Some(elapsed_ms(started));
        if let Err(e) = self.services.report_store.save(&root).await {
            warn!(run_id = %ctx.run_id(), error = %e, "Unable to persist the run's root report node");
        }
        vars.release_scope(&root.id);

        Ok(RunResult {
            run_id: ctx.run_id().to_string(),
            root_report_node_id: root.id,
            status: root.status,
        })
    }
}

#[async_trait]
impl RunLifecycle for ExecutionEngine {
    #[instrument(skip(self, parameters), fields(plan_id = %parameters.plan_id))]
    async fn initialize_run(&self, parameters: ExecutionParameters) -> Result<String> {
        let run_id = Uuid::new_v4().to_string();
        let summary = RunSummary {
            run_id: run_id.clone(),
            plan_id: parameters.plan_id.clone(),
            user_id: parameters.user_id.clone(),
            state: RunState::Pending,
            started_at: None,
        };
        let context = ExecutionContext::new(
            run_id.clone(),
            parameters,
            Arc::clone(&self.config),
            self.services.clone(),
        )?;

        self.runs.insert(
            run_id.clone(),
            RunEntry {
                summary,
                context: Arc::new(context),
            },
        );
        log_run_operation("initialize", &run_id, "pending", None);
        Ok(run_id)
    }

    #[instrument(skip(self))]
    async fn execute_run(&self, run_id: &str) -> Result<RunResult> {
        let context = {
            let mut entry = self
                .runs
                .get_mut(run_id)
                .ok_or_else(|| StepperError::RunNotFound(run_id.to_string()))?;
            match entry.summary.state {
                RunState::Pending => entry.summary.state = RunState::Running,
                RunState::Aborting => {}
                RunState::Running | RunState::Ended => {
                    return Err(StepperError::Validation(format!(
                        "run {run_id} has already been started"
                    )));
                }
            }
            entry.summary.started_at = Some(Utc::now());
            Arc::clone(&entry.context)
        };

        log_run_operation("execute", run_id, "running", None);
        let result = self.walk(&context).await;
        self.runs.remove(run_id);

        match &result {
            Ok(run) => log_run_operation("execute", run_id, &run.status.to_string(), None),
            Err(e) => log_run_operation("execute", run_id, "error", Some(&e.to_string())),
        }
        result
    }

    #[instrument(skip(self))]
    async fn abort(&self, run_id: &str) -> Result<()> {
        let mut entry = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| StepperError::RunNotFound(run_id.to_string()))?;
        entry.summary.state = RunState::Aborting;
        entry.context.interrupt();
        log_run_operation("abort", run_id, "aborting", None);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn discard_run(&self, run_id: &str) -> Result<()> {
        let removed = self
            .runs
            .remove_if(run_id, |_, entry| entry.summary.state == RunState::Pending);
        if removed.is_none() {
            return Err(StepperError::Validation(format!(
                "run {run_id} is not pending"
            )));
        }
        log_run_operation("discard", run_id, "discarded", None);
        Ok(())
    }

    fn active_runs(&self) -> Vec<RunSummary> {
        let mut runs: Vec<RunSummary> = self
            .runs
            .iter()
            .map(|entry| entry.summary.clone())
            .collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        runs
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("active_runs", &self.runs.len())
            .finish()
    }
}
