use async_trait::async_trait;
use std::sync::Arc;

use super::context::ExecutionContext;
use crate::models::{Function, Output, ReportNode};

/// Hooks invoked around the plan-tree walk. Every hook defaults to a no-op.
#[async_trait]
pub trait ExecutionCallbacks: Send + Sync {
    async fn before_report_node_execution(&self, _ctx: &ExecutionContext, _node: &ReportNode) {}

    async fn after_report_node_skeleton_creation(
        &self,
        _ctx: &ExecutionContext,
        _node: &ReportNode,
    ) {
    }

    async fn after_report_node_execution(&self, _ctx: &ExecutionContext, _node: &ReportNode) {}

    async fn before_function_execution(
        &self,
        _ctx: &ExecutionContext,
        _node: &ReportNode,
        _function: &Function,
    ) {
    }

    async fn after_function_execution(
        &self,
        _ctx: &ExecutionContext,
        _node: &ReportNode,
        _function: &Function,
        _output: &Output,
    ) {
    }

    /// A report node was removed from the store
    async fn rollback_report_node(&self, _ctx: &ExecutionContext, _node: &ReportNode) {}
}

/// Fans every hook out to the registered callbacks, in registration order
#[derive(Clone, Default)]
pub struct CallbackChain {
    callbacks: Vec<Arc<dyn ExecutionCallbacks>>,
}

impl CallbackChain {
    pub fn new(callbacks: Vec<Arc<dyn ExecutionCallbacks>>) -> Self {
        Self { callbacks }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[async_trait]
impl ExecutionCallbacks for CallbackChain {
    async fn before_report_node_execution(&self, ctx: &ExecutionContext, node: &ReportNode) {
        for callback in &self.callbacks {
            callback.before_report_node_execution(ctx, node).await;
        }
    }

    async fn after_report_node_skeleton_creation(&self, ctx: &ExecutionContext, node: &ReportNode) {
        for callback in &self.callbacks {
            callback.after_report_node_skeleton_creation(ctx, node).await;
        }
    }

    async fn after_report_node_execution(&self, ctx: &ExecutionContext, node: &ReportNode) {
        for callback in &self.callbacks {
            callback.after_report_node_execution(ctx, node).await;
        }
    }

    async fn before_function_execution(
        &self,
        ctx: &ExecutionContext,
        node: &ReportNode,
        function: &Function,
    ) {
        for callback in &self.callbacks {
            callback.before_function_execution(ctx, node, function).await;
        }
    }

    async fn after_function_execution(
        &self,
        ctx: &ExecutionContext,
        node: &ReportNode,
        function: &Function,
        output: &Output,
    ) {
        for callback in &self.callbacks {
            callback
                .after_function_execution(ctx, node, function, output)
                .await;
        }
    }

    async fn rollback_report_node(&self, ctx: &ExecutionContext, node: &ReportNode) {
        for callback in &self.callbacks {
            callback.rollback_report_node(ctx, node).await;
        }
    }
}
