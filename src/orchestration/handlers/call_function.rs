use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use super::unexpected_kind;
use crate::constants::{bindings, variables, NAME_ATTRIBUTE};
use crate::error::{Result, StepperError};
use crate::execution::{ExecutionCallbacks, ExecutionContext, VariableValue};
use crate::models::{
    resolve_dynamic_json, CallFunctionSpec, ErrorKind, Function, FunctionReference, NodeKind,
    NodeType, Output, PlanNode, ReportNode, ReportNodeStatus, Token, TokenOwner,
};
use crate::orchestration::handler::NodeHandler;
use crate::orchestration::sequential;
use crate::routing::{parse_active_versions, Criterion, SelectionCriteria, SharedSession, TokenRequest};

/// Dispatches a function to a worker.
///
/// The function is resolved, its payload built from the current bindings and
/// the call routed to a token. Business errors end as FAILED, infrastructure
/// errors as TECHNICAL_ERROR. Declared children run afterwards with the call
/// report bound, whatever the outcome of the call.
pub struct CallFunctionHandler;

impl CallFunctionHandler {
    async fn locate(
        ctx: &ExecutionContext,
        scope_id: &str,
        reference: &FunctionReference,
    ) -> Result<Function> {
        match reference {
            FunctionReference::Id(id) => ctx.locator().by_id(id).await,
            FunctionReference::Attributes(attributes) => {
                let mut resolved = HashMap::with_capacity(attributes.len());
                for (key, value) in attributes {
                    resolved.insert(key.clone(), ctx.resolve(value, scope_id)?);
                }
                let active_versions = parse_active_versions(
                    ctx.variables()
                        .get_as_string(scope_id, variables::ACTIVE_VERSIONS)
                        .as_deref(),
                );
                ctx.locator().by_attributes(&resolved, &active_versions).await
            }
        }
    }

    fn session(ctx: &ExecutionContext, scope_id: &str) -> Option<SharedSession> {
        match ctx.variables().get(scope_id, bindings::SESSION_CONTEXT) {
            Some(VariableValue::Session(session)) => Some(session),
            _ => None,
        }
    }

    fn call_criteria(
        ctx: &ExecutionContext,
        scope_id: &str,
        spec: &CallFunctionSpec,
    ) -> Result<SelectionCriteria> {
        let mut criteria = SelectionCriteria::new();
        for (attribute, pattern) in &spec.routing_criteria {
            let pattern = ctx.resolve(pattern, scope_id)?;
            criteria.insert(attribute.clone(), Criterion::mandatory(attribute.clone(), &pattern)?);
        }
        Ok(criteria)
    }

    /// Select a token, call the function and record the output on `report`
    #[instrument(skip_all, fields(function_id = %function.id, report_node_id = %report.id))]
    async fn dispatch(
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        spec: &CallFunctionSpec,
        function: &Function,
        input: &Value,
    ) -> Result<()> {
        let scope = report.id.clone();
        let session = Self::session(ctx, &scope);
        let force_local = !ctx.resolve(&spec.remote, &scope)?;

        let token = ctx
            .router()
            .select_token(TokenRequest {
                function,
                call_criteria: Self::call_criteria(ctx, &scope, spec)?,
                variables: ctx
                    .variables()
                    .with_prefix(&scope, &ctx.config().routing.route_prefix),
                session: session.as_deref(),
                force_local,
                owner: TokenOwner {
                    run_id: ctx.run_id().to_string(),
                    report_node_id: report.id.clone(),
                    description: function.name().map(str::to_string),
                },
            })
            .await?;
        report.agent_url = Some(token.agent_url.clone());
        report.token_id = Some(token.id.clone());

        let outcome = Self::call(ctx, report, spec, function, input, &token).await;

        if session.is_none() {
            if let Err(e) = ctx.router().broker().release_token(&token.id).await {
                if outcome.is_ok() {
                    return Err(e);
                }
                warn!(token_id = %token.id, error = %e, "Unable to release token after failed call");
            }
        }
        outcome
    }

    async fn call(
        ctx: &ExecutionContext,
        report: &mut ReportNode,
        spec: &CallFunctionSpec,
        function: &Function,
        input: &Value,
        token: &Token,
    ) -> Result<()> {
        let output = ctx
            .services()
            .dispatcher
            .call(&token.id, function, input)
            .await?;
        ctx.callbacks()
            .after_function_execution(ctx, report, function, &output)
            .await;

        Self::record_output(ctx, report, output.clone()).await;

        match spec.result_variable.as_deref().map(str::trim) {
            Some(variable) if !variable.is_empty() => {
                drain_output(ctx, &report.id, variable, output.payload.as_ref())
            }
            _ => Ok(()),
        }
    }

    async fn record_output(ctx: &ExecutionContext, report: &mut ReportNode, output: Output) {
        report.status = match &output.error {
            None => ReportNodeStatus::Passed,
            Some(error) => {
                report.set_error(error.kind, error.message.clone());
                match error.kind {
                    ErrorKind::Business => ReportNodeStatus::Failed,
                    ErrorKind::Technical => ReportNodeStatus::TechnicalError,
                }
            }
        };

        if let Some(payload) = &output.payload {
            ctx.variables()
                .put(&report.id, bindings::OUTPUT, payload.clone());
            if let Some(parent_id) = &report.parent_id {
                ctx.variables()
                    .put(parent_id, bindings::PREVIOUS, payload.clone());
            }
            report.output = Some(payload.clone());
        }

        for attachment in output.attachments {
            let name = attachment.name.clone();
            if let Err(e) = ctx.attachments().attach(report, attachment).await {
                debug!(attachment = %name, error = %e, "Attachment skipped");
            }
        }
        report.measures = output.measures;
    }
}

/// Validate `input` against the function's declared JSON schema
fn validate_input(function: &Function, input: &Value) -> Result<()> {
    let Some(schema) = &function.schema else {
        return Ok(());
    };
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        StepperError::Validation(format!("invalid schema of function {}: {e}", function.id))
    })?;
    let errors: Vec<String> = validator.iter_errors(input).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StepperError::Validation(format!(
            "input of function {} does not match its schema: {}",
            function.id,
            errors.join("; ")
        )))
    }
}

/// Scalar fields of an output payload rendered as strings
fn scalar_fields(payload: &Map<String, Value>) -> HashMap<String, String> {
    payload
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            Value::Bool(b) => Some((key.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}

/// Copy an output payload into the run variable named `variable`.
///
/// A map receives the scalar fields. A data set receives one row per object
/// of every array-of-objects field, then one row of the scalar fields.
fn drain_output(
    ctx: &ExecutionContext,
    scope_id: &str,
    variable: &str,
    payload: Option<&Value>,
) -> Result<()> {
    let target = ctx.variables().get(scope_id, variable);
    let empty = Map::new();
    let payload = payload.and_then(Value::as_object).unwrap_or(&empty);
    let scalars = scalar_fields(payload);

    match target {
        Some(VariableValue::Map(map)) => {
            map.lock().extend(scalars);
            Ok(())
        }
        Some(VariableValue::DataSink(sink)) => {
            for value in payload.values() {
                if let Value::Array(items) = value {
                    for row in items.iter().filter_map(Value::as_object) {
                        sink.add_row(scalar_fields(row))?;
                    }
                }
            }
            if !scalars.is_empty() {
                sink.add_row(scalars)?;
            }
            Ok(())
        }
        _ => Err(StepperError::InvalidDrainTarget(variable.to_string())),
    }
}

#[async_trait]
impl NodeHandler for CallFunctionHandler {
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
        let NodeKind::CallFunction(spec) = &node.kind else {
            return Err(unexpected_kind(NodeType::CallFunction, node));
        };
        let scope = report.id.clone();

        let function = Self::locate(ctx, &scope, &spec.function).await?;
        report.function_id = Some(function.id.clone());
        if !node.attributes.contains_key(NAME_ATTRIBUTE) {
            if let Some(name) = function.name() {
                report.name = name.to_string();
            }
        }

        let input = resolve_dynamic_json(
            &spec.argument,
            ctx.services().evaluator.as_ref(),
            &ctx.bindings(&scope),
        )?;
        report.input = Some(input.clone());
        ctx.callbacks()
            .before_function_execution(ctx, report, &function)
            .await;

        if ctx.config().execution.enforce_schemas {
            validate_input(&function, &input)?;
        }

        let outcome = if ctx.is_simulation() {
            report.output = Some(Value::Object(Map::new()));
            report.status = ReportNodeStatus::Passed;
            Ok(())
        } else {
            Self::dispatch(ctx, report, spec, &function, &input).await
        };

        let children = if node.step_children().next().is_some() {
            ctx.variables()
                .put(&scope, bindings::CALL_REPORT, report.id.clone());
            sequential::execute_children(ctx, report, node.step_children(), Some(true)).await
        } else {
            Ok(())
        };

        outcome.and(children)
    }
}
