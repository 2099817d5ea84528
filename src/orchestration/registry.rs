//! # Node Handler Registry
//!
//! Maps every [`NodeType`] to the [`NodeHandler`] that runs it. The engine
//! ships with handlers for all built-in node types; embedders may replace any
//! of them before the registry is handed to the execution services.
//!
//! ```rust
//! use std::sync::Arc;
//! use stepper_core::models::NodeType;
//! use stepper_core::orchestration::handlers::EchoHandler;
//! use stepper_core::orchestration::registry::HandlerRegistry;
//!
//! let mut registry = HandlerRegistry::with_defaults();
//! registry.register(NodeType::Echo, Arc::new(EchoHandler));
//! assert!(registry.get(NodeType::Echo).is_ok());
//! assert_eq!(registry.stats().total_handlers, 7);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::handler::NodeHandler;
use super::handlers::{
    CallFunctionHandler, CheckHandler, EchoHandler, ForLoopHandler, SequenceHandler,
    SessionHandler, SetHandler,
};
use crate::error::{Result, StepperError};
use crate::models::NodeType;

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_handlers: usize,
    pub node_types: Vec<NodeType>,
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every built-in node type
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(NodeType::Sequence, Arc::new(SequenceHandler));
        registry.register(NodeType::ForLoop, Arc::new(ForLoopHandler));
        registry.register(NodeType::Session, Arc::new(SessionHandler));
        registry.register(NodeType::CallFunction, Arc::new(CallFunctionHandler));
        registry.register(NodeType::Echo, Arc::new(EchoHandler));
        registry.register(NodeType::Set, Arc::new(SetHandler));
        registry.register(NodeType::Check, Arc::new(CheckHandler));
        registry
    }

    /// Register `handler` for `node_type`, replacing any previous one
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        debug!(node_type = %node_type, "Registering node handler");
        self.handlers.insert(node_type, handler);
    }

    pub fn get(&self, node_type: NodeType) -> Result<Arc<dyn NodeHandler>> {
        self.handlers
            .get(&node_type)
            .cloned()
            .ok_or_else(|| StepperError::HandlerNotFound(node_type.to_string()))
    }

    pub fn stats(&self) -> RegistryStats {
        let mut node_types: Vec<NodeType> = self.handlers.keys().copied().collect();
        node_types.sort_by_key(|t| t.to_string());
        RegistryStats {
            total_handlers: self.handlers.len(),
            node_types,
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("node_types", &self.stats().node_types)
            .finish()
    }
}
