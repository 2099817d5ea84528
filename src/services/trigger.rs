//! Recurring and one-shot trigger contract.
//!
//! The cron engine itself lives outside this crate. [`InMemoryTriggerService`]
//! keeps registrations in memory, fires on demand and bounds concurrent firings
//! with a semaphore sized like the executor thread pool.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, StepperError};

/// One firing of a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerFiring {
    /// Set for recurring schedules
    pub task_id: Option<String>,
    /// Set for one-shot firings of an already initialized run
    pub run_id: Option<String>,
}

/// Receives trigger firings, typically the scheduler's executor
#[async_trait]
pub trait TriggerListener: Send + Sync {
    async fn on_fire(&self, firing: TriggerFiring);
}

#[async_trait]
pub trait TriggerService: Send + Sync {
    /// Reject malformed recurrence expressions before anything is persisted
    fn validate(&self, cron_expression: &str) -> Result<()>;

    /// Register or replace the trigger of a task. Returns whether it may fire again.
    async fn register(&self, task_id: &str, cron_expression: &str) -> Result<bool>;

    async fn unregister(&self, task_id: &str) -> Result<()>;

    /// Fire an initialized run once, as soon as a worker is free
    async fn fire_once(&self, run_id: &str) -> Result<()>;

    async fn start(&self, listener: Arc<dyn TriggerListener>) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;
}

pub struct InMemoryTriggerService {
    registrations: DashMap<String, String>,
    never_firing: RwLock<HashSet<String>>,
    failing_tasks: RwLock<HashSet<String>>,
    listener: RwLock<Option<Arc<dyn TriggerListener>>>,
    workers: Arc<Semaphore>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for InMemoryTriggerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTriggerService")
            .field("registrations", &self.registrations.len())
            .field("started", &self.listener.read().is_some())
            .finish()
    }
}

impl InMemoryTriggerService {
    pub fn new(executor_threads: usize) -> Self {
        Self {
            registrations: DashMap::new(),
            never_firing: RwLock::new(HashSet::new()),
            failing_tasks: RwLock::new(HashSet::new()),
            listener: RwLock::new(None),
            workers: Arc::new(Semaphore::new(executor_threads.max(1))),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Registrations with this expression report that they can never fire again
    pub fn mark_never_firing(&self, cron_expression: &str) {
        self.never_firing.write().insert(cron_expression.to_string());
    }

    /// Registrations of this task fail
    pub fn mark_failing(&self, task_id: &str) {
        self.failing_tasks.write().insert(task_id.to_string());
    }

    pub fn is_registered(&self, task_id: &str) -> bool {
        self.registrations.contains_key(task_id)
    }

    pub fn registered_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registrations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Fire the recurring trigger of a registered task, as the cron engine would
    pub async fn fire(&self, task_id: &str) -> Result<()> {
        if !self.is_registered(task_id) {
            return Err(StepperError::Scheduling(format!(
                "no trigger registered for task {task_id}"
            )));
        }
        self.spawn_firing(TriggerFiring {
            task_id: Some(task_id.to_string()),
            run_id: None,
        })
    }

    /// Wait for every firing spawned so far
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Trigger firing task failed");
            }
        }
    }

    fn spawn_firing(&self, firing: TriggerFiring) -> Result<()> {
        let listener = self
            .listener
            .read()
            .clone()
            .ok_or_else(|| StepperError::Scheduling("trigger service not started".to_string()))?;
        let workers = Arc::clone(&self.workers);

        let handle = tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            listener.on_fire(firing).await;
        });
        self.pending.lock().push(handle);
        Ok(())
    }
}

#[async_trait]
impl TriggerService for InMemoryTriggerService {
    fn validate(&self, cron_expression: &str) -> Result<()> {
        let fields = cron_expression.split_whitespace().count();
        if !(6..=7).contains(&fields) {
            return Err(StepperError::InvalidCronExpression {
                expression: cron_expression.to_string(),
                reason: format!("expected 6 or 7 fields, found {fields}"),
            });
        }
        Ok(())
    }

    async fn register(&self, task_id: &str, cron_expression: &str) -> Result<bool> {
        self.validate(cron_expression)?;
        if self.failing_tasks.read().contains(task_id) {
            return Err(StepperError::Scheduling(format!(
                "unable to schedule task {task_id}"
            )));
        }
        debug!(task_id = %task_id, cron = %cron_expression, "Registering trigger");
        self.registrations
            .insert(task_id.to_string(), cron_expression.to_string());
        Ok(!self.never_firing.read().contains(cron_expression))
    }

    async fn unregister(&self, task_id: &str) -> Result<()> {
        self.registrations.remove(task_id);
        Ok(())
    }

    async fn fire_once(&self, run_id: &str) -> Result<()> {
        self.spawn_firing(TriggerFiring {
            task_id: None,
            run_id: Some(run_id.to_string()),
        })
    }

    async fn start(&self, listener: Arc<dyn TriggerListener>) -> Result<()> {
        *self.listener.write() = Some(listener);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.wait_idle().await;
        *self.listener.write() = None;
        self.workers.close();
        Ok(())
    }
}
