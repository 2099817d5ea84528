use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::settings::SchedulerSettings;
use crate::error::{Result, StepperError};
use crate::logging::log_schedule_operation;
use crate::models::ExecutionParameters;
use crate::services::{
    RunLifecycle, RunSummary, ScheduledTaskStore, TriggerFiring, TriggerListener, TriggerService,
};

/// Turns trigger firings into runs of the run driver
pub struct Executor {
    runs: Arc<dyn RunLifecycle>,
    task_store: Arc<dyn ScheduledTaskStore>,
    trigger: Arc<dyn TriggerService>,
    settings: SchedulerSettings,
}

impl Executor {
    pub fn new(
        runs: Arc<dyn RunLifecycle>,
        task_store: Arc<dyn ScheduledTaskStore>,
        trigger: Arc<dyn TriggerService>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            runs,
            task_store,
            trigger,
            settings,
        }
    }

    /// Initialize a run and have the trigger service execute it as soon as possible
    #[instrument(skip(self, parameters), fields(plan_id = %parameters.plan_id))]
    pub async fn execute(&self, parameters: ExecutionParameters) -> Result<String> {
        let run_id = self.runs.initialize_run(parameters).await?;
        if let Err(e) = self.trigger.fire_once(&run_id).await {
            error!(run_id = %run_id, error = %e, "Unable to submit run, discarding it");
            if let Err(discard) = self.runs.discard_run(&run_id).await {
                error!(run_id = %run_id, error = %discard, "Unable to discard run");
            }
            return Err(e);
        }
        info!(run_id = %run_id, "Run submitted");
        Ok(run_id)
    }

    pub fn current_runs(&self) -> Vec<RunSummary> {
        self.runs.active_runs()
    }

    async fn handle(&self, firing: TriggerFiring) -> Result<()> {
        let run_id = match (firing.run_id, firing.task_id) {
            (Some(run_id), _) => run_id,
            (None, Some(task_id)) => {
                let task = self
                    .task_store
                    .get(&task_id)
                    .await?
                    .ok_or_else(|| StepperError::ScheduledTaskNotFound(task_id.clone()))?;

                let mut parameters = task.execution_parameters;
                if let Some(user) = self.settings.execution_username().await? {
                    parameters.user_id = Some(user);
                }
                let run_id = self.runs.initialize_run(parameters).await?;
                log_schedule_operation(
                    "fire",
                    &task_id,
                    task.attributes.get(crate::constants::NAME_ATTRIBUTE).map(String::as_str),
                    "run_initialized",
                    Some(&run_id),
                );
                run_id
            }
            (None, None) => {
                return Err(StepperError::Scheduling(
                    "trigger fired without task or run".to_string(),
                ))
            }
        };

        let result = self.runs.execute_run(&run_id).await?;
        info!(run_id = %run_id, status = %result.status, "Scheduled run ended");
        Ok(())
    }
}

#[async_trait]
impl TriggerListener for Executor {
    async fn on_fire(&self, firing: TriggerFiring) {
        if let Err(e) = self.handle(firing.clone()).await {
            error!(
                task_id = ?firing.task_id,
                run_id = ?firing.run_id,
                error = %e,
                "Triggered execution failed"
            );
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}
