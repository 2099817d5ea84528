use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::unexpected_kind;
use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::models::{NodeKind, NodeType, PlanNode, ReportNode, ReportNodeStatus};
use crate::orchestration::handler::NodeHandler;

/// Assigns a run variable.
///
/// The variable is updated in the scope that defines it. Undefined variables
/// are created in the scope of the parent node so that siblings see them.
/// As a property child the variable is defined in the parent's own scope
/// before the parent's body runs.
pub struct SetHandler;

impl SetHandler {
    fn assign(ctx: &ExecutionContext, scope_id: &str, fallback_scope: &str, key: &str, value: Value) {
        if !ctx.variables().update(scope_id, key, value.clone()) {
            ctx.variables().put(fallback_scope, key, value);
        }
    }
}

#[async_trait]
impl NodeHandler for SetHandler {
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
        let NodeKind::Set { key, value } = &node.kind else {
            return Err(unexpected_kind(NodeType::Set, node));
        };
        let value = ctx.resolve(value, &report.id)?;

        if !node.property {
            let fallback = report.parent_id.as_deref().unwrap_or(&report.id);
            Self::assign(ctx, &report.id, fallback, key, value.clone());
        }

        let rendered = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        report.add_custom_attribute(key.clone(), rendered);
        report.status = ReportNodeStatus::Passed;
        Ok(())
    }

    async fn init_property(
        &self,
        ctx: &ExecutionContext,
        parent: &ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        let NodeKind::Set { key, value } = &node.kind else {
            return Err(unexpected_kind(NodeType::Set, node));
        };
        let value = ctx.resolve(value, &parent.id)?;
        debug!(variable = %key, report_node_id = %parent.id, "Initializing property");
        ctx.variables().put(&parent.id, key.clone(), value);
        Ok(())
    }
}
