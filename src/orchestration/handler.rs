use async_trait::async_trait;

use crate::error::Result;
use crate::execution::ExecutionContext;
use crate::models::{PlanNode, ReportNode};

/// Type-specific behavior of one plan-node type.
///
/// Handlers only implement the body of each phase. Report node binding,
/// persistence, callbacks and failure capture are done by
/// [`framework`](super::framework) around them. Errors returned here end up
/// as `TECHNICAL_ERROR` on `report`.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Build the skeleton below `report`, typically by recursing into children
    async fn create_skeleton(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()>;

    /// Run the node and set the terminal status of `report`
    async fn execute(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()>;

    /// Called for property children before their parent's body runs
    async fn init_property(
        &self,
        _ctx: &ExecutionContext,
        _parent: &ReportNode,
        _node: &PlanNode,
    ) -> Result<()> {
        Ok(())
    }

    /// Whether `execute` runs the trailing property children itself, for
    /// nodes holding resources those children need
    fn runs_property_children(&self) -> bool {
        false
    }
}
