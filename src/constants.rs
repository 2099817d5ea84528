//! # System Constants
//!
//! Well-known variable, binding and setting names shared by the execution
//! engine, the routing layer and the scheduler.

/// Run variables that tune the execution engine for a single run
pub mod variables {
    pub const PERSIST_BEFORE: &str = "tec.execution.reportnodes.persistbefore";
    pub const PERSIST_AFTER: &str = "tec.execution.reportnodes.persistafter";
    pub const PERSIST_ONLY_NON_PASSED: &str = "tec.execution.reportnodes.persistonlynonpassed";
    pub const ATTACHMENT_QUOTA: &str = "tec.quota.attachments";
    /// Comma separated list of function versions allowed for this run
    pub const ACTIVE_VERSIONS: &str = "tec.activeversions";
    /// Set by a child to decide, for that child only, whether its parent continues after a failure
    pub const CONTINUE_ON_ERROR_ONCE: &str = "tec.continueonerror.once";
    /// Overrides the composite status of the container being composed
    pub const FORCE_PARENT_STATUS: &str = "tec.forceparentstatus";
}

/// Bindings maintained by the framework and visible to expressions
pub mod bindings {
    pub const CURRENT_ARTEFACT: &str = "currentArtefact";
    pub const LAST_REPORT: &str = "report";
    pub const OUTPUT: &str = "output";
    pub const PREVIOUS: &str = "previous";
    pub const CALL_REPORT: &str = "callReport";
    pub const FILE_PREFIX: &str = "file:";
    /// Variable holding the active session context
    pub const SESSION_CONTEXT: &str = "##sessionContext##";
}

/// Keys of the persisted global settings
pub mod settings {
    pub const SCHEDULER_ENABLED: &str = "scheduler_enabled";
    pub const SCHEDULER_EXECUTION_USERNAME: &str = "scheduler_execution_username";
}

/// Attachment naming
pub mod attachments {
    pub const EXCEPTION_ATTACHMENT_NAME: &str = "exception.log";
    pub const TEXT_MIME_TYPE: &str = "text/plain";
}

/// Fallback name for nodes without a `name` attribute
pub const UNNAMED_NODE: &str = "Unnamed";

/// Attribute key holding a node, function or task name
pub const NAME_ATTRIBUTE: &str = "name";
