use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::plan_node::{NodeType, PlanNode};
use crate::constants::NAME_ATTRIBUTE;

/// Run-level selection of plan nodes. Nodes that are not selected are SKIPPED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "values", rename_all = "snake_case")]
pub enum NodeFilter {
    IncludeIds(HashSet<String>),
    ExcludeIds(HashSet<String>),
    IncludeTypes(HashSet<NodeType>),
}

impl NodeFilter {
    pub fn is_selected(&self, node: &PlanNode) -> bool {
        match self {
            Self::IncludeIds(ids) => ids.contains(&node.id),
            Self::ExcludeIds(ids) => !ids.contains(&node.id),
            Self::IncludeTypes(types) => types.contains(&node.node_type()),
        }
    }
}

/// What to run and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParameters {
    pub plan_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filter: Option<NodeFilter>,
    /// Initial run variables
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Dispatch nodes pass without leasing tokens; composition never halts
    #[serde(default)]
    pub simulate: bool,
}

impl ExecutionParameters {
    pub fn for_plan(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            user_id: None,
            description: None,
            filter: None,
            variables: HashMap::new(),
            simulate: false,
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Persisted recurrence definition plus the run parameters it spawns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub attributes: HashMap<String, String>,
    pub cron_expression: String,
    pub active: bool,
    pub execution_parameters: ExecutionParameters,
}

impl ScheduledTask {
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        execution_parameters: ExecutionParameters,
    ) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(NAME_ATTRIBUTE.to_string(), name.into());
        Self {
            id: Uuid::new_v4().to_string(),
            attributes,
            cron_expression: cron_expression.into(),
            active: false,
            execution_parameters,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.attributes.get(NAME_ATTRIBUTE).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_filters() {
        let node = PlanNode::sequence("a").with_id("n1");

        let include = NodeFilter::IncludeIds(["n1".to_string()].into_iter().collect());
        let exclude = NodeFilter::ExcludeIds(["n1".to_string()].into_iter().collect());
        let by_type = NodeFilter::IncludeTypes([NodeType::Echo].into_iter().collect());

        assert!(include.is_selected(&node));
        assert!(!exclude.is_selected(&node));
        assert!(!by_type.is_selected(&node));
    }

    #[test]
    fn test_new_task_is_inactive() {
        let task = ScheduledTask::new("nightly", "0 0 2 * * ?", ExecutionParameters::for_plan("p1"));
        assert!(!task.active);
        assert_eq!(task.name(), Some("nightly"));
    }
}
