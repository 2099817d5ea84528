use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::function::{ErrorKind, Measure};
use super::plan_node::{NodeType, PlanNode};
use super::report_status::ReportNodeStatus;

/// Error recorded on a report node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNodeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reference to a stored attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Per-run execution record of one plan node instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportNode {
    pub id: String,
    pub parent_id: Option<String>,
    /// Originating plan node
    pub node_id: String,
    pub run_id: String,
    pub name: String,
    pub node_type: Option<NodeType>,
    pub status: ReportNodeStatus,
    pub execution_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<ReportNodeError>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    #[serde(default)]
    pub custom_attributes: HashMap<String, String>,
    /// Payload sent to a dispatched function
    #[serde(default)]
    pub input: Option<Value>,
    /// Payload returned by a dispatched function
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub function_id: Option<String>,
    #[serde(default)]
    pub agent_url: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    /// Orphan nodes are never persisted
    #[serde(skip)]
    pub orphan: bool,
}

impl ReportNode {
    /// Fresh NORUN node for `node` below `parent`
    pub fn for_plan_node(parent: &ReportNode, node: &PlanNode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: Some(parent.id.clone()),
            node_id: node.id.clone(),
            run_id: parent.run_id.clone(),
            name: node.name().to_string(),
            node_type: Some(node.node_type()),
            status: ReportNodeStatus::Norun,
            execution_time: None,
            duration_ms: None,
            error: None,
            attachments: Vec::new(),
            custom_attributes: HashMap::new(),
            input: None,
            output: None,
            function_id: None,
            agent_url: None,
            token_id: None,
            measures: Vec::new(),
            orphan: false,
        }
    }

    /// Root of a run's report tree; it has no originating plan node of its own
    pub fn root(run_id: impl Into<String>, name: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            node_id: String::new(),
            run_id,
            name: name.into(),
            node_type: None,
            status: ReportNodeStatus::Running,
            execution_time: Some(Utc::now()),
            duration_ms: None,
            error: None,
            attachments: Vec::new(),
            custom_attributes: HashMap::new(),
            input: None,
            output: None,
            function_id: None,
            agent_url: None,
            token_id: None,
            measures: Vec::new(),
            orphan: false,
        }
    }

    pub fn set_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some(ReportNodeError {
            kind,
            message: message.into(),
        });
    }

    pub fn add_custom_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom_attributes.insert(key.into(), value.into());
    }
}
