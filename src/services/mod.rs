//! # Collaborator Contracts
//!
//! Traits for everything the execution core consumes but does not own:
//! persistence, the token broker, remote dispatch, the trigger engine,
//! expression evaluation and run lifecycle management. In-memory
//! implementations are provided for embedding and tests.

pub mod expression;
pub mod function_store;
pub mod report_store;
pub mod run_lifecycle;
pub mod stores;
pub mod token_broker;
pub mod trigger;

pub use expression::{Bindings, ExpressionEvaluator, SimpleExpressionEvaluator};
pub use function_store::{
    FunctionStore, FunctionTypeRegistry, InMemoryFunctionStore, StaticFunctionTypeRegistry,
};
pub use report_store::{InMemoryReportNodeStore, ReportNodeStore};
pub use run_lifecycle::{RunLifecycle, RunResult, RunState, RunSummary};
pub use stores::{
    AttachmentStore, InMemoryAttachmentStore, InMemoryPlanStore, InMemoryScheduledTaskStore,
    InMemorySettingsStore, PlanStore, ScheduledTaskStore, SettingsStore,
};
pub use token_broker::{FunctionDispatcher, TokenBroker};
pub use trigger::{InMemoryTriggerService, TriggerFiring, TriggerListener, TriggerService};
