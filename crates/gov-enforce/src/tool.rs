// tool.rs — Policy-gated tool execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use gov_policy::{PolicyCategory, PolicyEngine, PolicyEvaluationResult};

use crate::error::EnforceError;
use crate::guard::{Approvals, Enforcer, Outcome};
use crate::notify::NotificationDispatcher;

/// What a tool run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: serde_json::Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }
}

/// The wrapped tool runtime.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_id: &str,
        parameters: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput, EnforceError>;
}

/// Runs tools only when policy allows.
pub struct ToolGuard<E> {
    executor: E,
    enforcer: Enforcer,
}

impl<E: ToolExecutor> ToolGuard<E> {
    pub fn new(
        executor: E,
        engine: Arc<PolicyEngine>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            executor,
            enforcer: Enforcer::new(engine, notifier, PolicyCategory::Tools),
        }
    }

    /// Evaluate without executing or auditing.
    pub fn check_tool_policy(
        &self,
        tool_id: &str,
        action: &str,
    ) -> Result<PolicyEvaluationResult, EnforceError> {
        Ok(self.enforcer.engine.evaluate_tool(tool_id, action)?)
    }

    /// Check policy, then run the tool when allowed. The cancellation token
    /// is handed to the executor unchanged.
    pub async fn execute(
        &self,
        tool_id: &str,
        action: &str,
        parameters: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<Outcome<ToolOutput>, EnforceError> {
        let result = self.check_tool_policy(tool_id, action)?;
        let decision = match self.enforcer.gate(tool_id, action, result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };

        tracing::debug!(tool_id, action, decision = %decision.decision(), "executing tool");
        let output = self.executor.execute(tool_id, parameters, cancel).await?;
        Ok(Outcome::Completed { output, decision })
    }

    /// Session grants for tools.
    pub fn approvals(&self) -> &Approvals {
        &self.enforcer.approvals
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}
