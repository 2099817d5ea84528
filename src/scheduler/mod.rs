//! # Execution Scheduler
//!
//! Recurring execution of plans. Scheduled tasks are persisted through a
//! [`ScheduledTaskStore`](crate::services::ScheduledTaskStore) and registered
//! with an external [`TriggerService`](crate::services::TriggerService) while
//! both the task and the scheduler as a whole are enabled.
//!
//! ## Core Components
//!
//! - **ExecutionScheduler**: task lifecycle (add, enable, disable, remove) and
//!   the global enable switch
//! - **Executor**: trigger listener turning firings into runs
//! - **SchedulerSettings**: persisted scheduler settings with configured defaults
//!
//! Registration failures never leave a task half scheduled: the task is
//! logged and deactivated instead.

pub mod execution_scheduler;
pub mod executor;
pub mod settings;

pub use execution_scheduler::{ExecutionScheduler, TaskRemovalHook};
pub use executor::Executor;
pub use settings::SchedulerSettings;
