use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::unexpected_kind;
use crate::error::{Result, StepperError};
use crate::execution::{ExecutionContext, VariableValue};
use crate::models::{NodeKind, NodeType, PlanNode, ReportNode, ReportNodeStatus, StatusComposer};
use crate::orchestration::framework;
use crate::orchestration::handler::NodeHandler;

/// Loop variable that ends the loop after the current iteration when set to true
pub const BREAK_VARIABLE: &str = "break";
pub const ITERATIONS_ATTRIBUTE: &str = "iterations";
pub const FAILED_ITERATIONS_ATTRIBUTE: &str = "failed_iterations";

/// Numeric loop.
///
/// Every pass runs the loop's children inside a synthetic sequence node named
/// `Iteration<counter>`, with the counter variable bound in its scope.
pub struct ForLoopHandler;

impl ForLoopHandler {
    fn iteration_node(node: &PlanNode, counter: i64) -> PlanNode {
        PlanNode::sequence(format!("Iteration{counter}"))
            .with_id(format!("{}:{counter}", node.id))
            .with_children(node.step_children().cloned())
    }
}

fn in_range(counter: i64, end: i64, increment: i64) -> bool {
    if increment > 0 {
        counter <= end
    } else {
        counter >= end
    }
}

#[async_trait]
impl NodeHandler for ForLoopHandler {
    async fn create_skeleton(
        &self,
        _ctx: &ExecutionContext,
        _report: &mut ReportNode,
        _node: &PlanNode,
    ) -> Result<()> {
        // Iterations are only known at execution time
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        node: &PlanNode,
    ) -> Result<()> {
        let NodeKind::ForLoop(spec) = &node.kind else {
            return Err(unexpected_kind(NodeType::ForLoop, node));
        };
        let scope = report.id.clone();
        let start = ctx.resolve(&spec.start, &scope)?;
        let end = ctx.resolve(&spec.end, &scope)?;
        let increment = ctx.resolve(&spec.increment, &scope)?;
        if increment == 0 {
            return Err(StepperError::Validation(format!(
                "loop '{}' has a zero increment",
                node.name()
            )));
        }
        let max_failed_loops = spec
            .max_failed_loops
            .as_ref()
            .map(|value| ctx.resolve(value, &scope))
            .transpose()?;

        ctx.variables().put(&scope, BREAK_VARIABLE, json!(false));

        let mut composer = StatusComposer::new(ReportNodeStatus::Norun, ctx.severity());
        let mut iterations = 0_i64;
        let mut failed_iterations = 0_i64;
        let mut counter = start;

        while in_range(counter, end, increment) {
            if ctx.is_interrupted() {
                break;
            }

            let iteration = Self::iteration_node(node, counter);
            let extra = [(
                spec.counter_variable.clone(),
                VariableValue::Json(json!(counter)),
            )];
            let result = framework::execute(ctx, report, &iteration, &extra).await;
            composer.add(result.status);
            iterations += 1;

            if result.status.is_failure() {
                failed_iterations += 1;
                if max_failed_loops.is_some_and(|max| failed_iterations >= max) {
                    debug!(loop_name = %node.name(), failed_iterations, "Maximum number of failed iterations reached");
                    break;
                }
            }
            if ctx.variables().get_as_bool(&scope, BREAK_VARIABLE, false)? {
                debug!(loop_name = %node.name(), counter, "Loop break requested");
                break;
            }

            counter = match counter.checked_add(increment) {
                Some(next) => next,
                None => break,
            };
        }

        report.add_custom_attribute(ITERATIONS_ATTRIBUTE, iterations.to_string());
        report.add_custom_attribute(FAILED_ITERATIONS_ATTRIBUTE, failed_iterations.to_string());
        report.status = if ctx.is_interrupted() {
            ReportNodeStatus::Interrupted
        } else {
            composer.status()
        };
        Ok(())
    }
}
