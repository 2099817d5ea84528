use async_trait::async_trait;

use super::unexpected_kind;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::models::{DynamicValue, ErrorKind, NodeKind, NodeType, PlanNode, ReportNode, ReportNodeStatus};
use crate::orchestration::handler::NodeHandler;

/// Boolean assertion: PASSED when the expression holds, FAILED otherwise
pub struct CheckHandler;

#[async_trait]
impl NodeHandler for CheckHandler {
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
        let NodeKind::Check { expression } = &node.kind else {
            return Err(unexpected_kind(NodeType::Check, node));
        };

        if ctx.resolve(expression, &report.id)? {
            report.status = ReportNodeStatus::Passed;
        } else {
            let described = match expression {
                DynamicValue::Expression { expression } => expression.clone(),
                DynamicValue::Value(value) => value.to_string(),
            };
            report.set_error(ErrorKind::Business, format!("Check failed: {described}"));
            report.status = ReportNodeStatus::Failed;
        }
        Ok(())
    }
}
