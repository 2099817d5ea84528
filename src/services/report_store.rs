use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::models::ReportNode;

/// Persistence facade for report nodes
#[async_trait]
pub trait ReportNodeStore: Send + Sync {
    async fn save(&self, node: &ReportNode) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<ReportNode>>;
    async fn get_by_parent_and_node(
        &self,
        parent_id: &str,
        node_id: &str,
    ) -> Result<Option<ReportNode>>;
    async fn get_children(&self, id: &str) -> Result<Vec<ReportNode>>;
}

/// Report node store kept in memory, counting writes
#[derive(Debug, Default)]
pub struct InMemoryReportNodeStore {
    nodes: DashMap<String, ReportNode>,
    saves: AtomicUsize,
    saves_per_node: DashMap<String, usize>,
}

impl InMemoryReportNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `save` calls for one report node
    pub fn saves_of(&self, report_node_id: &str) -> usize {
        self.saves_per_node
            .get(report_node_id)
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stored nodes originating from a plan node
    pub fn find_by_node_id(&self, node_id: &str) -> Vec<ReportNode> {
        self.nodes
            .iter()
            .filter(|entry| entry.node_id == node_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn all(&self) -> Vec<ReportNode> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl ReportNodeStore for InMemoryReportNodeStore {
    async fn save(&self, node: &ReportNode) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.saves_per_node.entry(node.id.clone()).or_insert(0) += 1;
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.nodes.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ReportNode>> {
        Ok(self.nodes.get(id).map(|entry| entry.value().clone()))
    }

    async fn get_by_parent_and_node(
        &self,
        parent_id: &str,
        node_id: &str,
    ) -> Result<Option<ReportNode>> {
        Ok(self
            .nodes
            .iter()
            .find(|entry| entry.parent_id.as_deref() == Some(parent_id) && entry.node_id == node_id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_children(&self, id: &str) -> Result<Vec<ReportNode>> {
        let mut children: Vec<ReportNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.parent_id.as_deref() == Some(id))
            .map(|entry| entry.value().clone())
            .collect();
        children.sort_by_key(|node| node.execution_time);
        Ok(children)
    }
}
