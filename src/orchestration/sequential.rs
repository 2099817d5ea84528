//! Ordered execution of a container's children with status composition.

use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

use super::framework::{self, ExtraVariables};
use crate::constants::variables;
use crate::error::{Result, StepperError};
use crate::execution::{ExecutionContext, VariableValue};
use crate::models::{PlanNode, ReportNode, ReportNodeStatus, StatusComposer};

/// What the composition loop learned from one child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildOutcome {
    pub status: ReportNodeStatus,
    pub halt: bool,
}

impl ChildOutcome {
    /// Decide whether the container stops after a child ended in `status`.
    ///
    /// Failures halt unless the run is simulated, or one of these (first
    /// present wins) says to continue: the one-shot override left by the
    /// child, the child's own override, the container policy.
    pub fn evaluate(
        ctx: &ExecutionContext,
        status: ReportNodeStatus,
        continue_once: Option<bool>,
        child_override: Option<bool>,
        container_policy: Option<bool>,
    ) -> Self {
        let halt = status.is_failure()
            && !ctx.is_simulation()
            && !continue_once
                .or(child_override)
                .or(container_policy)
                .unwrap_or(false);
        Self { status, halt }
    }
}

/// Skeleton phase of every step child of `node`
pub async fn create_children_skeleton(
    ctx: &ExecutionContext,
    report: &ReportNode,
    node: &PlanNode,
) -> Result<()> {
    for child in node.step_children() {
        framework::create_skeleton(ctx, report, child, &[]).await;
    }
    Ok(())
}

/// Run `children` in order below `report` and set its composite status
pub async fn execute_children<'n>(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    children: impl IntoIterator<Item = &'n PlanNode>,
    continue_on_error: Option<bool>,
) -> Result<()> {
    execute_children_with(ctx, report, children, continue_on_error, &[]).await
}

/// [`execute_children`] with extra variables applied to every child
pub async fn execute_children_with<'n>(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    children: impl IntoIterator<Item = &'n PlanNode>,
    continue_on_error: Option<bool>,
    extra: &ExtraVariables,
) -> Result<()> {
    let children: Vec<&PlanNode> = children.into_iter().collect();
    let initial = if children.is_empty() {
        ReportNodeStatus::Passed
    } else {
        report.status
    };
    let mut composer = StatusComposer::new(initial, ctx.severity());

    for child in children {
        if ctx.is_interrupted() {
            debug!(report_node_id = %report.id, "Run interrupted, remaining children are not executed");
            break;
        }

        let result = framework::execute(ctx, report, child, extra).await;
        composer.add(result.status);

        let continue_once = take_continue_once(ctx, &report.id)?;
        let child_override = child
            .continue_parent_on_error
            .as_ref()
            .map(|value| ctx.resolve(value, &report.id))
            .transpose()?;
        let outcome = ChildOutcome::evaluate(
            ctx,
            result.status,
            continue_once,
            child_override,
            continue_on_error,
        );
        if outcome.halt {
            debug!(
                report_node_id = %report.id,
                child = %result.name,
                status = %outcome.status,
                "Child failed, stopping container"
            );
            break;
        }
    }

    report.status = match forced_status(ctx, &report.id) {
        Some(forced) => forced,
        None if ctx.is_interrupted() => ReportNodeStatus::Interrupted,
        None => composer.status(),
    };
    Ok(())
}

/// Consume the one-shot continue flag left in the container's own scope
fn take_continue_once(ctx: &ExecutionContext, scope_id: &str) -> Result<Option<bool>> {
    let Some(value) = ctx
        .variables()
        .remove(scope_id, variables::CONTINUE_ON_ERROR_ONCE)
    else {
        return Ok(None);
    };
    match value {
        VariableValue::Json(Value::Bool(flag)) => Ok(Some(flag)),
        VariableValue::Json(Value::String(raw)) => raw.trim().parse::<bool>().map(Some).map_err(|_| {
            StepperError::Validation(format!(
                "variable '{}' is not a boolean: {raw}",
                variables::CONTINUE_ON_ERROR_ONCE
            ))
        }),
        other => Err(StepperError::Validation(format!(
            "variable '{}' is not a boolean: {other:?}",
            variables::CONTINUE_ON_ERROR_ONCE
        ))),
    }
}

fn forced_status(ctx: &ExecutionContext, scope_id: &str) -> Option<ReportNodeStatus> {
    let raw = ctx
        .variables()
        .get_as_string(scope_id, variables::FORCE_PARENT_STATUS)?;
    match ReportNodeStatus::from_str(raw.trim()) {
        Ok(status) => Some(status),
        Err(reason) => {
            warn!(%reason, "Ignoring invalid forced parent status");
            None
        }
    }
}
