//! # Node Handler Framework
//!
//! Two-phase walk shared by every plan-node type.
//!
//! ## Phases
//!
//! - **Skeleton** ([`create_skeleton`]): materializes the expected report tree
//!   before anything runs. Nodes are only persisted when they ask for it and no
//!   ancestor suppressed its own skeleton.
//! - **Execution** ([`execute`]): binds the skeleton node when one exists
//!   (or creates a fresh one), runs the type-specific [`NodeHandler`] and
//!   applies the persistence policy.
//!
//! Failures never escape a node. They are recorded as `TECHNICAL_ERROR` on
//! the report node, with an `exception.log` attachment unless the failure is
//! a plan validation error.
//!
//! [`NodeHandler`]: super::handler::NodeHandler

use chrono::Utc;
use futures::future::BoxFuture;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::StepperConfig;
use crate::constants::{bindings, variables};
use crate::error::{Result, StepperError};
use crate::execution::{ExecutionCallbacks, ExecutionContext, VariableValue};
use crate::logging::log_node_operation;
use crate::models::{ErrorKind, PlanNode, ReportNode, ReportNodeStatus};

/// Variables applied to a node's scope before it runs, e.g. a loop counter
pub type ExtraVariables = [(String, VariableValue)];

/// Effective persistence policy for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    pub before: bool,
    pub after: bool,
    pub only_non_passed: bool,
}

impl PersistPolicy {
    pub fn from_config(config: &StepperConfig) -> Self {
        Self {
            before: config.execution.persist_before,
            after: config.execution.persist_after,
            only_non_passed: config.execution.persist_only_non_passed,
        }
    }

    /// Configuration defaults overridden by run variables visible from `scope_id`
    pub fn resolve(ctx: &ExecutionContext, scope_id: &str) -> Result<Self> {
        let defaults = Self::from_config(ctx.config());
        let vars = ctx.variables();
        Ok(Self {
            before: vars.get_as_bool(scope_id, variables::PERSIST_BEFORE, defaults.before)?,
            after: vars.get_as_bool(scope_id, variables::PERSIST_AFTER, defaults.after)?,
            only_non_passed: vars.get_as_bool(
                scope_id,
                variables::PERSIST_ONLY_NON_PASSED,
                defaults.only_non_passed,
            )?,
        })
    }

    pub fn writes_before(&self, node: &PlanNode) -> bool {
        node.persist_node && self.before && !self.only_non_passed
    }

    pub fn writes_after(&self, node: &PlanNode, status: ReportNodeStatus) -> bool {
        node.persist_node
            && self.after
            && !(self.only_non_passed && status == ReportNodeStatus::Passed)
    }
}

/// Skeleton phase for `node` below `parent`
pub fn create_skeleton<'a>(
    ctx: &'a ExecutionContext,
    parent: &'a ReportNode,
    node: &'a PlanNode,
    extra: &'a ExtraVariables,
) -> BoxFuture<'a, ReportNode> {
    Box::pin(async move {
        let mut report = ReportNode::for_plan_node(parent, node);
        report.orphan = parent.orphan || !node.create_skeleton;
        before_delegation(ctx, parent, node, &report, extra);

        if let Err(e) = build_skeleton(ctx, &mut report, node).await {
            warn!(
                run_id = %ctx.run_id(),
                node_id = %node.id,
                error = %e,
                "Skeleton creation failed, the node will be initialized on execution"
            );
            ctx.mark_not_initialized(&node.id);
            fail_with_error(ctx, &mut report, e, false).await;
        }

        if node.create_skeleton && !report.orphan {
            save_logged(ctx, &report).await;
        }

        ctx.callbacks()
            .after_report_node_skeleton_creation(ctx, &report)
            .await;
        after_delegation(ctx, parent, &report);
        report
    })
}

async fn build_skeleton(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    node: &PlanNode,
) -> Result<()> {
    if !ctx.is_node_selected(node) {
        report.status = ReportNodeStatus::Skipped;
        return Ok(());
    }
    let handler = ctx.handlers().get(node.node_type())?;
    handler.create_skeleton(ctx, report, node).await
}

/// Execution phase for `node` below `parent`. Always yields a report node.
pub fn execute<'a>(
    ctx: &'a ExecutionContext,
    parent: &'a ReportNode,
    node: &'a PlanNode,
    extra: &'a ExtraVariables,
) -> BoxFuture<'a, ReportNode> {
    Box::pin(async move {
        match ctx.resolve(&node.skip_node, &parent.id) {
            Ok(false) => {}
            Ok(true) => return skip(ctx, parent, node, None).await,
            Err(e) => return skip(ctx, parent, node, Some(e)).await,
        }

        if ctx.take_not_initialized(&node.id) {
            debug!(node_id = %node.id, "Creating missing skeleton before execution");
            create_skeleton(ctx, parent, node, extra).await;
        }

        let mut report = bind_report_node(ctx, parent, node).await;
        report.status = ReportNodeStatus::Running;
        report.error = None;
        report.execution_time = Some(Utc::now());
        before_delegation(ctx, parent, node, &report, extra);
        let started = Instant::now();

        let policy = PersistPolicy::resolve(ctx, &report.id);
        let after_policy = policy
            .as_ref()
            .copied()
            .unwrap_or_else(|_| PersistPolicy::from_config(ctx.config()));

        let outcome = match policy {
            Ok(policy) => run_handler(ctx, &mut report, node, &policy).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            fail_with_error(ctx, &mut report, e, true).await;
        }

        report.duration_ms = Some(elapsed_ms(started));
        if after_policy.writes_after(node, report.status) {
            save_logged(ctx, &report).await;
        }

        ctx.callbacks().after_report_node_execution(ctx, &report).await;
        after_delegation(ctx, parent, &report);

        log_node_operation(
            "execute",
            ctx.run_id(),
            Some(&report.id),
            Some(&report.name),
            &report.status.to_string(),
            None,
        );
        report
    })
}

async fn run_handler(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    node: &PlanNode,
    policy: &PersistPolicy,
) -> Result<()> {
    let handler = ctx.handlers().get(node.node_type())?;
    ctx.callbacks().before_report_node_execution(ctx, report).await;

    if !ctx.is_node_selected(node) {
        report.status = ReportNodeStatus::Skipped;
        return Ok(());
    }

    if policy.writes_before(node) {
        ctx.report_store().save(report).await?;
    }

    for property in node.property_children() {
        ctx.handlers()
            .get(property.node_type())?
            .init_property(ctx, report, property)
            .await?;
    }

    handler.execute(ctx, report, node).await?;

    if !handler.runs_property_children() {
        execute_property_children(ctx, report, node).await;
    }
    Ok(())
}

/// Execute the property children of `node` below `report` and fold their
/// statuses into it
pub async fn execute_property_children(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    node: &PlanNode,
) {
    let severity = ctx.severity();
    for property in node.property_children() {
        let result = execute(ctx, report, property, &[]).await;
        report.status = severity.most_severe(report.status, result.status);
    }
}

/// Short-circuit for nodes whose `skip_node` holds or cannot be evaluated
async fn skip(
    ctx: &ExecutionContext,
    parent: &ReportNode,
    node: &PlanNode,
    error: Option<StepperError>,
) -> ReportNode {
    let mut report = bind_report_node(ctx, parent, node).await;
    report.execution_time = Some(Utc::now());
    report.duration_ms = Some(0);
    match error {
        None => report.status = ReportNodeStatus::Skipped,
        Some(e) => {
            warn!(node_id = %node.id, error = %e, "Unable to evaluate skip condition");
            report.status = ReportNodeStatus::TechnicalError;
            report.set_error(ErrorKind::Technical, e.to_string());
        }
    }

    let policy = PersistPolicy::resolve(ctx, &parent.id)
        .unwrap_or_else(|_| PersistPolicy::from_config(ctx.config()));
    if policy.writes_after(node, report.status) {
        save_logged(ctx, &report).await;
    }

    ctx.callbacks().after_report_node_execution(ctx, &report).await;
    ctx.variables()
        .put(&parent.id, bindings::LAST_REPORT, report.id.clone());
    report
}

/// The skeleton node of `node` below `parent` if one was persisted, else a fresh one
async fn bind_report_node(
    ctx: &ExecutionContext,
    parent: &ReportNode,
    node: &PlanNode,
) -> ReportNode {
    if node.create_skeleton {
        match ctx
            .report_store()
            .get_by_parent_and_node(&parent.id, &node.id)
            .await
        {
            Ok(Some(existing)) => return existing,
            Ok(None) => {
                debug!(node_id = %node.id, "No skeleton node found, creating a new report node");
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Skeleton lookup failed, creating a new report node");
            }
        }
    }
    ReportNode::for_plan_node(parent, node)
}

fn before_delegation(
    ctx: &ExecutionContext,
    parent: &ReportNode,
    node: &PlanNode,
    report: &ReportNode,
    extra: &ExtraVariables,
) {
    let vars = ctx.variables();
    vars.open_scope(&report.id, Some(&parent.id));
    ctx.report_node_cache().put(report);

    for (key, value) in extra {
        vars.put(&report.id, key.clone(), value.clone());
    }
    for path in &node.attachments {
        if let Some(file_name) = path.file_name() {
            vars.put(
                &report.id,
                format!("{}{}", bindings::FILE_PREFIX, file_name.to_string_lossy()),
                VariableValue::File(path.clone()),
            );
        }
    }
    vars.put(&parent.id, bindings::CURRENT_ARTEFACT, node.name());
}

fn after_delegation(ctx: &ExecutionContext, parent: &ReportNode, report: &ReportNode) {
    ctx.report_node_cache().remove(&report.id);
    ctx.variables().release_scope(&report.id);
    ctx.variables()
        .put(&parent.id, bindings::LAST_REPORT, report.id.clone());
}

/// Record `error` on `report` as a technical error
pub(crate) async fn fail_with_error(
    ctx: &ExecutionContext,
    report: &mut ReportNode,
    error: StepperError,
    attach: bool,
) {
    warn!(
        run_id = %ctx.run_id(),
        report_node_id = %report.id,
        node_name = %report.name,
        error = %error,
        "Report node failed"
    );
    report.status = ReportNodeStatus::TechnicalError;
    report.set_error(ErrorKind::Technical, error.to_string());

    if attach && !error.is_validation() {
        if let Err(e) = ctx.attachments().attach_error(report, &error).await {
            debug!(report_node_id = %report.id, error = %e, "Exception attachment skipped");
        }
    }
}

async fn save_logged(ctx: &ExecutionContext, report: &ReportNode) {
    if let Err(e) = ctx.report_store().save(report).await {
        warn!(report_node_id = %report.id, error = %e, "Unable to persist report node");
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

/// Delete `report` and its persisted descendants, firing `rollback_report_node` for each
pub fn remove_report_node<'a>(
    ctx: &'a ExecutionContext,
    report: &'a ReportNode,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for child in ctx.report_store().get_children(&report.id).await? {
            remove_report_node(ctx, &child).await?;
        }
        ctx.report_store().remove(&report.id).await?;
        ctx.callbacks().rollback_report_node(ctx, report).await;
        Ok(())
    })
}
