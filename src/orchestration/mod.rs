//! # Orchestration
//!
//! The plan-tree walk and the behavior of every node type.
//!
//! ## Core Components
//!
//! - **framework**: two-phase (skeleton, execution) walk wrapping every node,
//!   persistence policy and failure capture
//! - **sequential**: ordered child execution with status composition, used by
//!   every container type
//! - **handler**: the [`NodeHandler`] contract implemented per node type
//! - **registry**: [`HandlerRegistry`] mapping node types to handlers
//! - **handlers**: built-in node types (sequence, loop, session, dispatch,
//!   echo, set, check)

pub mod framework;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod sequential;

pub use framework::{create_skeleton, execute, remove_report_node, ExtraVariables, PersistPolicy};
pub use handler::NodeHandler;
pub use registry::{HandlerRegistry, RegistryStats};
pub use sequential::{execute_children, ChildOutcome};
