//! # Stepper Configuration System
//!
//! Layered configuration for the execution core: built-in defaults, then an
//! optional `stepper-config.*` file, then an environment specific
//! `stepper-config.<env>.*` file, then `STEPPER__SECTION__KEY` environment
//! variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stepper_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let persist_before = manager.config().execution.persist_before;
//! let quota = manager.config().execution.attachment_quota;
//! # Ok(())
//! # }
//! ```
//!
//! Several execution settings can additionally be overridden per run through
//! run variables, see [`crate::constants::variables`].

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::models::report_status::{ReportNodeStatus, SeverityOrder};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StepperConfig {
    pub execution: ExecutionConfig,
    pub scheduler: SchedulerConfig,
    pub routing: RoutingConfig,
}

/// Plan-tree execution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Write the RUNNING report node before the node body executes
    pub persist_before: bool,
    /// Write the terminal report node after the node body executes
    pub persist_after: bool,
    /// Overrides both flags above: only terminal nodes that did not pass are written
    pub persist_only_non_passed: bool,
    /// Validate call payloads against the function's declared schema
    pub enforce_schemas: bool,
    /// Maximum number of attachments captured per run
    pub attachment_quota: i64,
    /// Most severe first
    pub status_severity_order: Vec<ReportNodeStatus>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            persist_before: true,
            persist_after: true,
            persist_only_non_passed: false,
            enforce_schemas: false,
            attachment_quota: 100,
            status_severity_order: ReportNodeStatus::default_severity_order().to_vec(),
        }
    }
}

impl ExecutionConfig {
    pub fn severity_order(&self) -> ConfigResult<SeverityOrder> {
        SeverityOrder::new(self.status_severity_order.clone()).map_err(|e| {
            ConfigurationError::invalid_value(
                "execution.status_severity_order",
                format!("{:?}", self.status_severity_order),
                e,
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker thread sizing hint handed to the trigger service
    pub executor_threads: usize,
    /// Value of the scheduler-enabled setting when the settings store has none
    pub default_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            executor_threads: 30,
            default_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Run variables starting with this prefix become mandatory routing criteria
    pub route_prefix: String,
    /// Function attribute holding the version compared against active versions
    pub version_attribute: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            route_prefix: "route_to_".to_string(),
            version_attribute: "version".to_string(),
        }
    }
}

impl StepperConfig {
    /// Validate configuration values that serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.attachment_quota < 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.attachment_quota",
                self.execution.attachment_quota.to_string(),
                "must be zero or positive",
            ));
        }

        self.execution.severity_order()?;

        if self.scheduler.executor_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.executor_threads",
                "0",
                "at least one executor thread is required",
            ));
        }

        if self.routing.route_prefix.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "routing.route_prefix",
                "",
                "an empty prefix would turn every variable into a routing criterion",
            ));
        }

        if self.routing.version_attribute.is_empty() {
            return Err(ConfigurationError::validation_error(
                "routing.version_attribute must not be empty",
            ));
        }

        Ok(())
    }
}
