//! Handlers of the built-in node types.

mod call_function;
mod check;
mod echo;
mod for_loop;
mod sequence;
mod session;
mod set;

pub use call_function::CallFunctionHandler;
pub use check::CheckHandler;
pub use echo::EchoHandler;
pub use for_loop::ForLoopHandler;
pub use sequence::SequenceHandler;
pub use session::SessionHandler;
pub use set::SetHandler;

use crate::error::StepperError;
use crate::models::{NodeType, PlanNode};

/// A handler was invoked with a node of another type
fn unexpected_kind(expected: NodeType, node: &PlanNode) -> StepperError {
    StepperError::Internal(format!(
        "{expected} handler invoked for {} node '{}'",
        node.node_type(),
        node.name()
    ))
}
