//! Persistence contracts for plans, scheduled tasks, settings and attachments,
//! with in-memory implementations.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Attachment, Plan, ScheduledTask};

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get(&self, plan_id: &str) -> Result<Option<Plan>>;
    async fn save(&self, plan: Plan) -> Result<()>;
}

#[async_trait]
pub trait ScheduledTaskStore: Send + Sync {
    async fn save(&self, task: &ScheduledTask) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>>;
    async fn get_active(&self) -> Result<Vec<ScheduledTask>>;
    async fn get_all(&self) -> Result<Vec<ScheduledTask>>;
}

/// Persisted global key/value settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Returns the identifier of the stored attachment
    async fn save(&self, run_id: &str, attachment: &Attachment) -> Result<String>;
    async fn get(&self, id: &str) -> Result<Option<Attachment>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPlanStore {
    plans: DashMap<String, Plan>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn get(&self, plan_id: &str) -> Result<Option<Plan>> {
        Ok(self.plans.get(plan_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, plan: Plan) -> Result<()> {
        self.plans.insert(plan.id.clone(), plan);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScheduledTaskStore {
    tasks: DashMap<String, ScheduledTask>,
}

impl InMemoryScheduledTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut tasks: Vec<ScheduledTask>) -> Vec<ScheduledTask> {
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }
}

#[async_trait]
impl ScheduledTaskStore for InMemoryScheduledTaskStore {
    async fn save(&self, task: &ScheduledTask) -> Result<()> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.tasks.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_active(&self) -> Result<Vec<ScheduledTask>> {
        Ok(Self::sorted(
            self.tasks
                .iter()
                .filter(|entry| entry.active)
                .map(|entry| entry.value().clone())
                .collect(),
        ))
    }

    async fn get_all(&self) -> Result<Vec<ScheduledTask>> {
        Ok(Self::sorted(
            self.tasks.iter().map(|entry| entry.value().clone()).collect(),
        ))
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: DashMap<String, String>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.settings.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAttachmentStore {
    attachments: DashMap<String, (String, Attachment)>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn save(&self, run_id: &str, attachment: &Attachment) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.attachments
            .insert(id.clone(), (run_id.to_string(), attachment.clone()));
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Attachment>> {
        Ok(self
            .attachments
            .get(id)
            .map(|entry| entry.value().1.clone()))
    }
}
