//! Shared in-memory collaborators for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use stepper_core::config::StepperConfig;
use stepper_core::engine::ExecutionEngine;
use stepper_core::execution::{ExecutionCallbacks, ExecutionContext, ExecutionServices};
use stepper_core::models::{
    CallFunctionSpec, DynamicValue, ExecutionParameters, Function, FunctionReference, NodeKind,
    Output, Plan, PlanNode, ReportNode, Token, TokenOwner,
};
use stepper_core::routing::{affinity_score, SelectionCriteria};
use stepper_core::scheduler::TaskRemovalHook;
use stepper_core::services::{
    FunctionDispatcher, InMemoryAttachmentStore, InMemoryFunctionStore, InMemoryPlanStore,
    InMemoryReportNodeStore, InMemoryTriggerService, PlanStore, RunLifecycle, RunResult,
    RunSummary, TokenBroker, TriggerListener, TriggerService,
};
use stepper_core::{Result, StepperError};

/// Token broker leasing tokens from a fixed set of worker profiles and
/// recording every acquisition and release
#[derive(Debug, Default)]
pub struct RecordingTokenBroker {
    profiles: Vec<HashMap<String, String>>,
    remote_acquisitions: AtomicUsize,
    local_acquisitions: AtomicUsize,
    session_requests: AtomicUsize,
    acquired: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
    failing_releases: Mutex<bool>,
}

impl RecordingTokenBroker {
    /// Broker with a single worker profile without attributes
    pub fn new() -> Self {
        Self::with_profiles(vec![HashMap::new()])
    }

    pub fn with_profiles(profiles: Vec<HashMap<String, String>>) -> Self {
        Self {
            profiles,
            ..Self::default()
        }
    }

    pub fn fail_releases(&self) {
        *self.failing_releases.lock() = true;
    }

    pub fn remote_acquisitions(&self) -> usize {
        self.remote_acquisitions.load(Ordering::SeqCst)
    }

    pub fn local_acquisitions(&self) -> usize {
        self.local_acquisitions.load(Ordering::SeqCst)
    }

    pub fn session_requests(&self) -> usize {
        self.session_requests.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> Vec<String> {
        self.acquired.lock().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }
}

#[async_trait]
impl TokenBroker for RecordingTokenBroker {
    async fn get_local_token(&self) -> Result<Token> {
        self.local_acquisitions.fetch_add(1, Ordering::SeqCst);
        let token = Token {
            id: format!("local-{}", Uuid::new_v4()),
            local: true,
            attributes: HashMap::new(),
            agent_url: "local".to_string(),
        };
        self.acquired.lock().push(token.id.clone());
        Ok(token)
    }

    async fn get_token(
        &self,
        _pretender_attributes: &HashMap<String, String>,
        criteria: &SelectionCriteria,
        open_session: bool,
        _owner: &TokenOwner,
    ) -> Result<Token> {
        let profile = self
            .profiles
            .iter()
            .find(|profile| affinity_score(criteria, profile) > 0)
            .ok_or_else(|| StepperError::TokenBroker("no matching worker".to_string()))?;

        self.remote_acquisitions.fetch_add(1, Ordering::SeqCst);
        if open_session {
            self.session_requests.fetch_add(1, Ordering::SeqCst);
        }
        let token = Token {
            id: format!("remote-{}", Uuid::new_v4()),
            local: false,
            attributes: profile.clone(),
            agent_url: "http://agent:8080".to_string(),
        };
        self.acquired.lock().push(token.id.clone());
        Ok(token)
    }

    async fn release_token(&self, token_id: &str) -> Result<()> {
        self.released.lock().push(token_id.to_string());
        if *self.failing_releases.lock() {
            return Err(StepperError::TokenRelease {
                token_id: token_id.to_string(),
                reason: "agent unreachable".to_string(),
            });
        }
        Ok(())
    }
}

/// Dispatcher answering per function name, `{"ok": true}` by default
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    outputs: Mutex<HashMap<String, Output>>,
    calls: Mutex<Vec<(String, String, Value)>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, function_name: &str, output: Output) {
        self.outputs.lock().insert(function_name.to_string(), output);
    }

    /// `(function name, token id, input)` of every call, in order
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FunctionDispatcher for ScriptedDispatcher {
    async fn call(&self, token_id: &str, function: &Function, input: &Value) -> Result<Output> {
        let name = function.name().unwrap_or_default().to_string();
        self.calls
            .lock()
            .push((name.clone(), token_id.to_string(), input.clone()));
        Ok(self
            .outputs
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Output::passed(json!({"ok": true}))))
    }
}

/// Keeps every report node seen by the callbacks
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    skeletons: Mutex<Vec<ReportNode>>,
    executed: Mutex<Vec<ReportNode>>,
}

impl RecordingCallbacks {
    pub fn skeletons(&self) -> Vec<ReportNode> {
        self.skeletons.lock().clone()
    }

    pub fn executed(&self) -> Vec<ReportNode> {
        self.executed.lock().clone()
    }

    pub fn executed_node(&self, node_id: &str) -> Vec<ReportNode> {
        self.executed()
            .into_iter()
            .filter(|report| report.node_id == node_id)
            .collect()
    }

    pub fn skeleton_node(&self, node_id: &str) -> Vec<ReportNode> {
        self.skeletons()
            .into_iter()
            .filter(|report| report.node_id == node_id)
            .collect()
    }
}

#[async_trait]
impl ExecutionCallbacks for RecordingCallbacks {
    async fn after_report_node_skeleton_creation(&self, _ctx: &ExecutionContext, node: &ReportNode) {
        self.skeletons.lock().push(node.clone());
    }

    async fn after_report_node_execution(&self, _ctx: &ExecutionContext, node: &ReportNode) {
        self.executed.lock().push(node.clone());
    }
}

/// Engine over in-memory collaborators
pub struct Harness {
    pub broker: Arc<RecordingTokenBroker>,
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub reports: Arc<InMemoryReportNodeStore>,
    pub plans: Arc<InMemoryPlanStore>,
    pub functions: Arc<InMemoryFunctionStore>,
    pub attachments: Arc<InMemoryAttachmentStore>,
    pub callbacks: Arc<RecordingCallbacks>,
    pub engine: Arc<ExecutionEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(StepperConfig::default(), RecordingTokenBroker::new(), Vec::new())
    }

    pub fn with_config(config: StepperConfig) -> Self {
        Self::build(config, RecordingTokenBroker::new(), Vec::new())
    }

    pub fn with_broker(broker: RecordingTokenBroker) -> Self {
        Self::build(StepperConfig::default(), broker, Vec::new())
    }

    pub fn with_callback(callback: Arc<dyn ExecutionCallbacks>) -> Self {
        Self::build(StepperConfig::default(), RecordingTokenBroker::new(), vec![callback])
    }

    fn build(
        config: StepperConfig,
        broker: RecordingTokenBroker,
        extra_callbacks: Vec<Arc<dyn ExecutionCallbacks>>,
    ) -> Self {
        let broker = Arc::new(broker);
        let dispatcher = Arc::new(ScriptedDispatcher::new());
        let reports = Arc::new(InMemoryReportNodeStore::new());
        let plans = Arc::new(InMemoryPlanStore::new());
        let functions = Arc::new(InMemoryFunctionStore::new());
        let attachments = Arc::new(InMemoryAttachmentStore::new());
        let callbacks = Arc::new(RecordingCallbacks::default());

        let mut services = ExecutionServices::new(
            Arc::clone(&broker) as Arc<dyn TokenBroker>,
            Arc::clone(&dispatcher) as Arc<dyn FunctionDispatcher>,
        )
        .with_report_store(Arc::clone(&reports) as _)
        .with_function_store(Arc::clone(&functions) as _)
        .with_attachment_store(Arc::clone(&attachments) as _)
        .with_callback(Arc::clone(&callbacks) as _);
        for callback in extra_callbacks {
            services = services.with_callback(callback);
        }

        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(config),
            services,
            Arc::clone(&plans) as Arc<dyn PlanStore>,
        ));

        Self {
            broker,
            dispatcher,
            reports,
            plans,
            functions,
            attachments,
            callbacks,
            engine,
        }
    }

    pub fn register_function(&self, function: Function) {
        self.functions.save(function);
    }

    pub async fn store_plan(&self, root: PlanNode) -> String {
        let plan = Plan::new("test plan", root);
        let plan_id = plan.id.clone();
        self.plans.save(plan).await.unwrap();
        plan_id
    }

    pub async fn run(&self, root: PlanNode) -> RunResult {
        self.run_with(root, |parameters| parameters).await
    }

    pub async fn run_with(
        &self,
        root: PlanNode,
        customize: impl FnOnce(ExecutionParameters) -> ExecutionParameters,
    ) -> RunResult {
        let plan_id = self.store_plan(root).await;
        self.engine
            .run(customize(ExecutionParameters::for_plan(plan_id)))
            .await
            .unwrap()
    }

    /// Writes of every report node except the run's root
    pub fn node_writes(&self, run: &RunResult) -> usize {
        self.reports.save_count() - self.reports.saves_of(&run.root_report_node_id)
    }
}

pub fn echo(name: &str, text: &str) -> PlanNode {
    PlanNode::new(
        name,
        NodeKind::Echo {
            text: DynamicValue::Value(json!(text)),
        },
    )
}

pub fn check(name: &str, expression: &str) -> PlanNode {
    PlanNode::new(
        name,
        NodeKind::Check {
            expression: DynamicValue::expression(expression),
        },
    )
}

pub fn set(name: &str, key: &str, value: Value) -> PlanNode {
    PlanNode::new(
        name,
        NodeKind::Set {
            key: key.to_string(),
            value: DynamicValue::Value(value),
        },
    )
}

pub fn call_spec(function_name: &str) -> CallFunctionSpec {
    let mut attributes = HashMap::new();
    attributes.insert("name".to_string(), DynamicValue::Value(function_name.to_string()));
    CallFunctionSpec {
        function: FunctionReference::Attributes(attributes),
        argument: json!({}),
        routing_criteria: HashMap::new(),
        result_variable: None,
        remote: DynamicValue::Value(true),
    }
}

pub fn call(name: &str, function_name: &str) -> PlanNode {
    PlanNode::new(name, NodeKind::CallFunction(call_spec(function_name)))
}

pub fn session(name: &str, children: Vec<PlanNode>) -> PlanNode {
    PlanNode::new(
        name,
        NodeKind::Session {
            routing_criteria: HashMap::new(),
        },
    )
    .with_children(children)
}

pub fn profile(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Trigger service delegating to [`InMemoryTriggerService`] and logging every
/// registration change
pub struct RecordingTriggerService {
    pub inner: InMemoryTriggerService,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingTriggerService {
    pub fn new(events: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            inner: InMemoryTriggerService::new(4),
            events,
        }
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().iter().filter(|e| e.as_str() == event).count()
    }
}

#[async_trait]
impl TriggerService for RecordingTriggerService {
    fn validate(&self, cron_expression: &str) -> Result<()> {
        self.inner.validate(cron_expression)
    }

    async fn register(&self, task_id: &str, cron_expression: &str) -> Result<bool> {
        self.events.lock().push(format!("register:{task_id}"));
        self.inner.register(task_id, cron_expression).await
    }

    async fn unregister(&self, task_id: &str) -> Result<()> {
        self.events.lock().push(format!("unregister:{task_id}"));
        self.inner.unregister(task_id).await
    }

    async fn fire_once(&self, run_id: &str) -> Result<()> {
        self.inner.fire_once(run_id).await
    }

    async fn start(&self, listener: Arc<dyn TriggerListener>) -> Result<()> {
        self.inner.start(listener).await
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}

/// Removal hook appending `hook:<task id>` to a shared event log
pub struct RecordingRemovalHook {
    pub events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl TaskRemovalHook for RecordingRemovalHook {
    async fn on_task_removed(&self, task_id: &str) {
        self.events.lock().push(format!("hook:{task_id}"));
    }
}

/// Run driver delegating to an engine and keeping the parameters of every initialized run
pub struct RecordingRuns {
    pub engine: Arc<ExecutionEngine>,
    pub initialized: Mutex<Vec<ExecutionParameters>>,
    pub results: Mutex<Vec<RunResult>>,
}

impl RecordingRuns {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            initialized: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RunLifecycle for RecordingRuns {
    async fn initialize_run(&self, parameters: ExecutionParameters) -> Result<String> {
        self.initialized.lock().push(parameters.clone());
        self.engine.initialize_run(parameters).await
    }

    async fn execute_run(&self, run_id: &str) -> Result<RunResult> {
        let result = self.engine.execute_run(run_id).await?;
        self.results.lock().push(result.clone());
        Ok(result)
    }

    async fn abort(&self, run_id: &str) -> Result<()> {
        self.engine.abort(run_id).await
    }

    async fn discard_run(&self, run_id: &str) -> Result<()> {
        self.engine.discard_run(run_id).await
    }

    fn active_runs(&self) -> Vec<RunSummary> {
        self.engine.active_runs()
    }
}

/// Distinct values of a list
pub fn distinct(values: &[String]) -> HashSet<String> {
    values.iter().cloned().collect()
}
