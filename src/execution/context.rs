//! Per-run execution state.
//!
//! An [`ExecutionContext`] is created when a run starts and dropped when it
//! ends. It is passed by reference through the whole tree walk and never
//! shared between runs.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::attachments::AttachmentManager;
use super::cache::ReportNodeCache;
use super::callbacks::{CallbackChain, ExecutionCallbacks};
use super::variables::VariablesManager;
use crate::config::StepperConfig;
use crate::constants::variables;
use crate::error::{Result, StepperError};
use crate::models::{DynamicValue, ExecutionParameters, PlanNode, SeverityOrder};
use crate::orchestration::registry::HandlerRegistry;
use crate::routing::{FunctionLocator, FunctionRouter};
use crate::services::{
    AttachmentStore, Bindings, ExpressionEvaluator, FunctionDispatcher, FunctionStore,
    FunctionTypeRegistry, InMemoryAttachmentStore, InMemoryFunctionStore, InMemoryReportNodeStore,
    ReportNodeStore, SimpleExpressionEvaluator, TokenBroker,
};

/// Collaborators shared by every run of an engine
#[derive(Clone)]
pub struct ExecutionServices {
    pub report_store: Arc<dyn ReportNodeStore>,
    pub evaluator: Arc<dyn ExpressionEvaluator>,
    pub function_store: Arc<dyn FunctionStore>,
    pub function_types: Option<Arc<dyn FunctionTypeRegistry>>,
    pub token_broker: Arc<dyn TokenBroker>,
    pub dispatcher: Arc<dyn FunctionDispatcher>,
    pub attachment_store: Arc<dyn AttachmentStore>,
    pub handlers: Arc<HandlerRegistry>,
    pub callbacks: Vec<Arc<dyn ExecutionCallbacks>>,
}

impl ExecutionServices {
    /// In-memory stores, the simple evaluator and the default handlers around
    /// the given broker and dispatcher
    pub fn new(token_broker: Arc<dyn TokenBroker>, dispatcher: Arc<dyn FunctionDispatcher>) -> Self {
        Self {
            report_store: Arc::new(InMemoryReportNodeStore::new()),
            evaluator: Arc::new(SimpleExpressionEvaluator),
            function_store: Arc::new(InMemoryFunctionStore::new()),
            function_types: None,
            token_broker,
            dispatcher,
            attachment_store: Arc::new(InMemoryAttachmentStore::new()),
            handlers: Arc::new(HandlerRegistry::with_defaults()),
            callbacks: Vec::new(),
        }
    }

    pub fn with_report_store(mut self, store: Arc<dyn ReportNodeStore>) -> Self {
        self.report_store = store;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_function_store(mut self, store: Arc<dyn FunctionStore>) -> Self {
        self.function_store = store;
        self
    }

    pub fn with_function_types(mut self, registry: Arc<dyn FunctionTypeRegistry>) -> Self {
        self.function_types = Some(registry);
        self
    }

    pub fn with_attachment_store(mut self, store: Arc<dyn AttachmentStore>) -> Self {
        self.attachment_store = store;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn ExecutionCallbacks>) -> Self {
        self.callbacks.push(callback);
        self
    }
}

pub struct ExecutionContext {
    run_id: String,
    parameters: ExecutionParameters,
    config: Arc<StepperConfig>,
    severity: SeverityOrder,
    services: ExecutionServices,
    callbacks: CallbackChain,
    variables: VariablesManager,
    report_node_cache: ReportNodeCache,
    /// Plan nodes whose skeleton creation failed and must be retried lazily
    not_initialized: Mutex<HashSet<String>>,
    interrupted: AtomicBool,
    attachments: AttachmentManager,
    router: FunctionRouter,
    locator: FunctionLocator,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<String>,
        parameters: ExecutionParameters,
        config: Arc<StepperConfig>,
        services: ExecutionServices,
    ) -> Result<Self> {
        let run_id = run_id.into();
        let severity = config.execution.severity_order()?;

        let quota = match parameters.variables.get(variables::ATTACHMENT_QUOTA) {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                StepperError::Validation(format!(
                    "variable '{}' is not an integer: {raw}",
                    variables::ATTACHMENT_QUOTA
                ))
            })?,
            None => config.execution.attachment_quota,
        };

        let attachments =
            AttachmentManager::new(Arc::clone(&services.attachment_store), run_id.clone(), quota);
        let router = FunctionRouter::new(
            Arc::clone(&services.token_broker),
            services.function_types.clone(),
            config.routing.route_prefix.clone(),
        );
        let locator = FunctionLocator::new(
            Arc::clone(&services.function_store),
            config.routing.version_attribute.clone(),
        );
        let callbacks = CallbackChain::new(services.callbacks.clone());

        Ok(Self {
            run_id,
            parameters,
            config,
            severity,
            services,
            callbacks,
            variables: VariablesManager::new(),
            report_node_cache: ReportNodeCache::new(),
            not_initialized: Mutex::new(HashSet::new()),
            interrupted: AtomicBool::new(false),
            attachments,
            router,
            locator,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn parameters(&self) -> &ExecutionParameters {
        &self.parameters
    }

    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    pub fn severity(&self) -> SeverityOrder {
        self.severity
    }

    pub fn services(&self) -> &ExecutionServices {
        &self.services
    }

    pub fn report_store(&self) -> &dyn ReportNodeStore {
        self.services.report_store.as_ref()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.services.handlers
    }

    pub fn callbacks(&self) -> &CallbackChain {
        &self.callbacks
    }

    pub fn variables(&self) -> &VariablesManager {
        &self.variables
    }

    pub fn report_node_cache(&self) -> &ReportNodeCache {
        &self.report_node_cache
    }

    pub fn attachments(&self) -> &AttachmentManager {
        &self.attachments
    }

    pub fn router(&self) -> &FunctionRouter {
        &self.router
    }

    pub fn locator(&self) -> &FunctionLocator {
        &self.locator
    }

    pub fn is_simulation(&self) -> bool {
        self.parameters.simulate
    }

    /// Request cooperative cancellation, observed between children
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_node_selected(&self, node: &PlanNode) -> bool {
        self.parameters
            .filter
            .as_ref()
            .map(|filter| filter.is_selected(node))
            .unwrap_or(true)
    }

    pub(crate) fn mark_not_initialized(&self, node_id: &str) {
        self.not_initialized.lock().insert(node_id.to_string());
    }

    /// Consume the pending lazy-skeleton marker of a node
    pub(crate) fn take_not_initialized(&self, node_id: &str) -> bool {
        self.not_initialized.lock().remove(node_id)
    }

    pub fn bindings(&self, scope_id: &str) -> Bindings {
        self.variables.bindings(scope_id)
    }

    /// Resolve a dynamic field against the bindings visible from `scope_id`
    pub fn resolve<T>(&self, value: &DynamicValue<T>, scope_id: &str) -> Result<T>
    where
        T: DeserializeOwned + Clone,
    {
        match value {
            DynamicValue::Value(v) => Ok(v.clone()),
            DynamicValue::Expression { .. } => {
                value.resolve(self.services.evaluator.as_ref(), &self.bindings(scope_id))
            }
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("plan_id", &self.parameters.plan_id)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
