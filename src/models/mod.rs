//! # Data Model
//!
//! Plan trees, report trees, functions and tokens, scheduled tasks.

pub mod function;
pub mod plan_node;
pub mod report_node;
pub mod report_status;
pub mod scheduled_task;

pub use function::{
    Attachment, ErrorKind, Function, FunctionError, Measure, Output, Token, TokenOwner,
};
pub use plan_node::{
    resolve_dynamic_json, CallFunctionSpec, DynamicValue, ForLoopSpec, FunctionReference,
    NodeKind, NodeType, Plan, PlanNode,
};
pub use report_node::{AttachmentMeta, ReportNode, ReportNodeError};
pub use report_status::{ReportNodeStatus, SeverityOrder, StatusComposer};
pub use scheduled_task::{ExecutionParameters, NodeFilter, ScheduledTask};
