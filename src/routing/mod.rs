//! # Remote-Worker Routing
//!
//! Function lookup, routing criteria and token selection, including
//! session-scoped token reuse.

pub mod criteria;
pub mod locator;
pub mod router;
pub mod session;

pub use criteria::{affinity_score, Criterion, SelectionCriteria};
pub use locator::{parse_active_versions, FunctionLocator};
pub use router::{FunctionRouter, TokenRequest};
pub use session::{SessionContext, SharedSession};
