use dashmap::DashMap;

use crate::models::ReportNode;

/// Report nodes currently in flight in one run, keyed by report node id
#[derive(Debug, Default)]
pub struct ReportNodeCache {
    nodes: DashMap<String, ReportNode>,
}

impl ReportNodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, node: &ReportNode) {
        self.nodes.insert(node.id.clone(), node.clone());
    }

    pub fn get(&self, id: &str) -> Option<ReportNode> {
        self.nodes.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) {
        self.nodes.remove(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
