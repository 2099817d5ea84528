use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::unexpected_kind;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::models::{NodeKind, NodeType, PlanNode, ReportNode, ReportNodeStatus};
use crate::orchestration::handler::NodeHandler;

/// Attribute of the report node carrying the echoed text
pub const ECHO_ATTRIBUTE: &str = "echo";

/// Logs a value and records it on the report node
pub struct EchoHandler;

#[async_trait]
impl NodeHandler for EchoHandler {
    async fn create_skeleton(
        &self,
        _ctx: &ExecutionContext,
        _report: &mut ReportNode,
        _node: &PlanNode,
    ) -> Result<()> {
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        let NodeKind::Echo { text } = &node.kind else {
            return Err(unexpected_kind(NodeType::Echo, node));
        };
        let text = match ctx.resolve(text, &report.id)? {
            Value::String(text) => text,
            other => other.to_string(),
        };

        info!(run_id = %ctx.run_id(), report_node_id = %report.id, "{text}");
        report.add_custom_attribute(ECHO_ATTRIBUTE, text);
        report.status = ReportNodeStatus::Passed;
        Ok(())
    }
}
