use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::unexpected_kind;
use crate::constants::bindings;
use crate::error::Result;
use crate::execution::{ExecutionContext, VariableValue};
use crate::models::{NodeKind, NodeType, PlanNode, ReportNode};
use crate::orchestration::handler::NodeHandler;
use crate::orchestration::{framework, sequential};
use crate::routing::{Criterion, SelectionCriteria, SessionContext};

/// Opens a remote-worker session for its subtree.
///
/// Tokens acquired by dispatches below the node are kept by the session and
/// all released once the children completed, whatever their outcome.
pub struct SessionHandler;

#[async_trait]
impl NodeHandler for SessionHandler {
    async fn create_skeleton(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        sequential::create_children_skeleton(ctx, report, node).await
    }

    fn runs_property_children(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        let NodeKind::Session { routing_criteria } = &node.kind else {
            return Err(unexpected_kind(NodeType::Session, node));
        };

        let mut criteria = SelectionCriteria::new();
        for (attribute, pattern) in routing_criteria {
            let pattern = ctx.resolve(pattern, &report.id)?;
            criteria.insert(attribute.clone(), Criterion::mandatory(attribute.clone(), &pattern)?);
        }

        let session = Arc::new(SessionContext::new(criteria));
        ctx.variables().put(
            &report.id,
            bindings::SESSION_CONTEXT,
            VariableValue::Session(Arc::clone(&session)),
        );

        let outcome =
            sequential::execute_children(ctx, report, node.step_children(), None).await;
        if outcome.is_ok() {
            framework::execute_property_children(ctx, report, node).await;
        }

        let held = session.token_count().await;
        debug!(report_node_id = %report.id, tokens = held, "Closing session");
        let released = session.release_tokens(ctx.router().broker()).await;
        ctx.variables().remove(&report.id, bindings::SESSION_CONTEXT);

        outcome.and(released)
    }
}
