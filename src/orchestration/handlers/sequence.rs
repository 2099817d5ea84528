use async_trait::async_trait;

use super::unexpected_kind;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::models::{NodeKind, NodeType, PlanNode, ReportNode};
use crate::orchestration::handler::NodeHandler;
use crate::orchestration::sequential;

/// Runs its children in order, stopping at the first failure unless
/// `continue_on_error` holds
pub struct SequenceHandler;

#[async_trait]
impl NodeHandler for SequenceHandler {
    async fn create_skeleton(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        sequential::create_children_skeleton(ctx, report, node).await
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        let NodeKind::Sequence { continue_on_error } = &node.kind else {
            return Err(unexpected_kind(NodeType::Sequence, node));
        };
        let continue_on_error = continue_on_error
            .as_ref()
            .map(|value| ctx.resolve(value, &report.id))
            .transpose()?;

        sequential::execute_children(ctx, report, node.step_children(), continue_on_error).await
    }
}
