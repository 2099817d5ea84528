#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Stepper Core
//!
//! Execution orchestration core: runs plan trees against remote workers and
//! schedules recurring executions.
//!
//! ## Overview
//!
//! A **plan** is a tree of typed nodes (sequences, loops, sessions, function
//! calls, assertions). Running a plan produces a parallel **report tree**
//! whose nodes record status, timing, errors, attachments and measures.
//! Function calls are routed to worker **tokens** leased from an external
//! token broker, reusing tokens inside sessions by attribute affinity.
//!
//! ## Architecture
//!
//! - **Two-phase walk**: an optional skeleton phase materializes the report
//!   tree before execution; execution reuses skeleton nodes when present
//! - **Status composition**: container status is the most severe child
//!   status under a configurable severity order
//! - **Persistence policy**: report node writes before and after execution,
//!   or only for non-passed nodes to bound write volume of large loops
//! - **Collaborator traits**: stores, the token broker, remote dispatch, the
//!   trigger engine and expression evaluation are all injected
//!
//! ## Module Organization
//!
//! - [`models`] - Plans, report nodes, functions, tokens, scheduled tasks
//! - [`execution`] - Per-run context, variables, callbacks, attachments
//! - [`orchestration`] - Node handler framework and built-in node types
//! - [`routing`] - Function lookup and token selection
//! - [`engine`] - Run driver
//! - [`scheduler`] - Recurring execution of plans
//! - [`services`] - Collaborator contracts and in-memory implementations
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stepper_core::config::ConfigManager;
//! use stepper_core::engine::ExecutionEngine;
//! use stepper_core::execution::ExecutionServices;
//! use stepper_core::models::ExecutionParameters;
//! use stepper_core::services::{FunctionDispatcher, InMemoryPlanStore, TokenBroker};
//!
//! # async fn example(
//! #     broker: Arc<dyn TokenBroker>,
//! #     dispatcher: Arc<dyn FunctionDispatcher>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! stepper_core::logging::init_structured_logging();
//! let config = ConfigManager::load()?;
//!
//! let engine = ExecutionEngine::new(
//!     Arc::new(config.config().clone()),
//!     ExecutionServices::new(broker, dispatcher),
//!     Arc::new(InMemoryPlanStore::new()),
//! );
//! let result = engine.run(ExecutionParameters::for_plan("nightly-regression")).await?;
//! println!("{} -> {}", result.run_id, result.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod routing;
pub mod scheduler;
pub mod services;

pub use config::{ConfigManager, ExecutionConfig, RoutingConfig, SchedulerConfig, StepperConfig};
pub use engine::ExecutionEngine;
pub use error::{Result, StepperError};
pub use execution::{ExecutionCallbacks, ExecutionContext, ExecutionServices};
pub use models::{
    ExecutionParameters, Plan, PlanNode, ReportNode, ReportNodeStatus, ScheduledTask,
};
pub use orchestration::{HandlerRegistry, NodeHandler};
pub use scheduler::ExecutionScheduler;
