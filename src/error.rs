//! Error types for the Stepper execution core.
//!

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepperError {
    /// Plan or input validation failure. Never produces an exception attachment.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Expression error: evaluating '{expression}': {reason}")]
    Expression { expression: String, reason: String },
    #[error("Function not found: {0}")]
    FunctionNotFound(String),
    #[error("Report node not found: {0}")]
    ReportNodeNotFound(String),
    #[error("Scheduled task not found: {0}")]
    ScheduledTaskNotFound(String),
    #[error("Plan not found: {0}")]
    PlanNotFound(String),
    #[error("Run not found: {0}")]
    RunNotFound(String),
    #[error("No handler registered for node type '{0}'")]
    HandlerNotFound(String),
    #[error("Token broker error: {0}")]
    TokenBroker(String),
    #[error("Dispatch error: {0}")]
    Dispatch(String),
    #[error("Attachment quota of {quota} exceeded, skipping '{name}'")]
    AttachmentQuotaExceeded { name: String, quota: i64 },
    #[error("Attachment store error: {0}")]
    AttachmentStore(String),
    #[error("The variable '{0}' is neither a map nor a data set handle")]
    InvalidDrainTarget(String),
    #[error("Unable to release token {token_id}: {reason}")]
    TokenRelease { token_id: String, reason: String },
    #[error("{} token releases failed: {}", .0.len(), format_release_failures(.0))]
    MultipleTokenRelease(Vec<StepperError>),
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },
    #[error("Scheduling error: {0}")]
    Scheduling(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_release_failures(errors: &[StepperError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl StepperError {
    /// Validation failures are reported on the node but not attached as diagnostics
    pub fn is_validation(&self) -> bool {
        matches!(self, StepperError::Validation(_))
    }

    pub fn expression(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        StepperError::Expression {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for StepperError {
    fn from(error: serde_json::Error) -> Self {
        StepperError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for StepperError {
    fn from(error: ConfigurationError) -> Self {
        StepperError::Configuration(error.to_string())
    }
}

impl From<regex::Error> for StepperError {
    fn from(error: regex::Error) -> Self {
        StepperError::Validation(format!("Invalid selection pattern: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, StepperError>;
