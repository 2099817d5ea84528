//! # Execution Context
//!
//! Per-run state threaded through the plan-tree walk: scoped variables, the
//! in-flight report node cache, the attachment quota, callbacks and the
//! cooperative interrupt flag.

pub mod attachments;
pub mod cache;
pub mod callbacks;
pub mod context;
pub mod variables;

pub use attachments::AttachmentManager;
pub use cache::ReportNodeCache;
pub use callbacks::{CallbackChain, ExecutionCallbacks};
pub use context::{ExecutionContext, ExecutionServices};
pub use variables::{DataSetSink, InMemoryDataSet, VariableValue, VariablesManager};
