use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::executor::Executor;
use super::settings::SchedulerSettings;
use crate::config::SchedulerConfig;
use crate::error::{Result, StepperError};
use crate::logging::log_schedule_operation;
use crate::models::{ExecutionParameters, ScheduledTask};
use crate::services::{
    RunLifecycle, RunSummary, ScheduledTaskStore, SettingsStore, TriggerListener, TriggerService,
};

/// Invoked after a scheduled task was removed, e.g. to clean up references to it
#[async_trait]
pub trait TaskRemovalHook: Send + Sync {
    async fn on_task_removed(&self, task_id: &str);
}

/// Keeps persisted scheduled tasks and trigger registrations consistent
pub struct ExecutionScheduler {
    task_store: Arc<dyn ScheduledTaskStore>,
    trigger: Arc<dyn TriggerService>,
    settings: SchedulerSettings,
    executor: Arc<Executor>,
    removal_hooks: RwLock<Vec<Arc<dyn TaskRemovalHook>>>,
}

impl ExecutionScheduler {
    pub fn new(
        config: &SchedulerConfig,
        task_store: Arc<dyn ScheduledTaskStore>,
        settings_store: Arc<dyn SettingsStore>,
        trigger: Arc<dyn TriggerService>,
        runs: Arc<dyn RunLifecycle>,
    ) -> Self {
        let settings = SchedulerSettings::new(settings_store, config);
        let executor = Arc::new(Executor::new(
            runs,
            Arc::clone(&task_store),
            Arc::clone(&trigger),
            settings.clone(),
        ));
        Self {
            task_store,
            trigger,
            settings,
            executor,
            removal_hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn add_removal_hook(&self, hook: Arc<dyn TaskRemovalHook>) {
        self.removal_hooks.write().push(hook);
    }

    /// Start the trigger service and, when enabled, register every active task
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let listener: Arc<dyn TriggerListener> = Arc::clone(&self.executor) as Arc<dyn TriggerListener>;
        self.trigger.start(listener).await?;

        if self.settings.is_enabled().await? {
            self.register_active_tasks().await?;
        } else {
            info!("Scheduler disabled, no task registered");
        }
        Ok(())
    }

    /// Validate, activate if new and requested, (un)register, then persist
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn add_or_update(
        &self,
        mut task: ScheduledTask,
        auto_activate: bool,
    ) -> Result<ScheduledTask> {
        self.trigger.validate(&task.cron_expression)?;

        let existed = self.task_store.get(&task.id).await?.is_some();
        if !existed && auto_activate {
            task.active = true;
        }

        if task.active && self.settings.is_enabled().await? {
            self.register_or_deactivate(&mut task).await;
        } else if existed && !task.active {
            self.trigger.unregister(&task.id).await?;
        }

        self.task_store.save(&task).await?;
        log_schedule_operation(
            if existed { "update" } else { "add" },
            &task.id,
            task.name(),
            if task.active { "active" } else { "inactive" },
            None,
        );
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn enable(&self, task_id: &str) -> Result<ScheduledTask> {
        let mut task = self.task(task_id).await?;
        task.active = true;
        if self.settings.is_enabled().await? {
            self.register_or_deactivate(&mut task).await;
        }
        self.task_store.save(&task).await?;
        log_schedule_operation(
            "enable",
            &task.id,
            task.name(),
            if task.active { "active" } else { "inactive" },
            None,
        );
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn disable(&self, task_id: &str) -> Result<ScheduledTask> {
        let mut task = self.task(task_id).await?;
        task.active = false;
        self.task_store.save(&task).await?;
        if self.settings.is_enabled().await? {
            self.trigger.unregister(&task.id).await?;
        }
        log_schedule_operation("disable", &task.id, task.name(), "inactive", None);
        Ok(task)
    }

    /// Delete the task, unregister its trigger, then notify the removal hooks
    #[instrument(skip(self))]
    pub async fn remove(&self, task_id: &str) -> Result<()> {
        self.task_store.remove(task_id).await?;
        self.trigger.unregister(task_id).await?;

        let hooks: Vec<Arc<dyn TaskRemovalHook>> = self.removal_hooks.read().clone();
        for hook in hooks {
            hook.on_task_removed(task_id).await;
        }
        log_schedule_operation("remove", task_id, None, "removed", None);
        Ok(())
    }

    /// Turn the scheduler on and register every active task
    #[instrument(skip(self))]
    pub async fn enable_all(&self) -> Result<()> {
        self.settings.set_enabled(true).await?;
        self.register_active_tasks().await
    }

    /// Turn the scheduler off and unregister every active task
    #[instrument(skip(self))]
    pub async fn disable_all(&self) -> Result<()> {
        self.settings.set_enabled(false).await?;
        for task in self.task_store.get_active().await? {
            self.trigger.unregister(&task.id).await?;
        }
        info!("Scheduler disabled");
        Ok(())
    }

    /// Run a task now as `user`, bypassing its recurrence. Returns the run id.
    #[instrument(skip(self))]
    pub async fn execute_now(&self, task_id: &str, user: Option<&str>) -> Result<String> {
        let task = self.task(task_id).await?;
        let mut parameters = task.execution_parameters;
        parameters.user_id = user.map(str::to_string);
        self.executor.execute(parameters).await
    }

    /// Ad-hoc run of arbitrary parameters. Returns the run id.
    pub async fn execute(&self, parameters: ExecutionParameters) -> Result<String> {
        self.executor.execute(parameters).await
    }

    pub async fn get_active_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.task_store.get_active().await
    }

    pub async fn get_all_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.task_store.get_all().await
    }

    pub fn current_runs(&self) -> Vec<RunSummary> {
        self.executor.current_runs()
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down scheduler");
        self.trigger.shutdown().await
    }

    async fn task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| StepperError::ScheduledTaskNotFound(task_id.to_string()))
    }

    async fn register_active_tasks(&self) -> Result<()> {
        for mut task in self.task_store.get_active().await? {
            if !self.register_or_deactivate(&mut task).await {
                self.task_store.save(&task).await?;
            }
        }
        Ok(())
    }

    /// Register the task's trigger. On failure, or when it can never fire
    /// again, the task is deactivated and false returned.
    async fn register_or_deactivate(&self, task: &mut ScheduledTask) -> bool {
        match self.trigger.register(&task.id, &task.cron_expression).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    task_id = %task.id,
                    cron = %task.cron_expression,
                    "Trigger can never fire again, deactivating task"
                );
                self.unregister_logged(&task.id).await;
                task.active = false;
                false
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Unable to register trigger, deactivating task");
                self.unregister_logged(&task.id).await;
                task.active = false;
                false
            }
        }
    }

    async fn unregister_logged(&self, task_id: &str) {
        if let Err(e) = self.trigger.unregister(task_id).await {
            warn!(task_id = %task_id, error = %e, "Unable to unregister trigger");
        }
    }
}

impl std::fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("settings", &self.settings)
            .field("removal_hooks", &self.removal_hooks.read().len())
            .finish()
    }
}
