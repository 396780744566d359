use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

pub mod calendar;
pub mod contacts;
pub mod email;
pub mod monitor;

/// A unit of capability the agent can pilot: it advertises tools and
/// executes calls against them.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Short name of the toolkit
    fn name(&self) -> &str;

    /// What the toolkit is for, included in the system prompt
    fn description(&self) -> &str;

    /// Usage guidance for the model
    fn instructions(&self) -> &str;

    /// The tools this toolkit advertises
    fn tools(&self) -> &[Tool];

    /// Execute a tool call. Implementations validate arguments with
    /// [`parse_args`] and never panic on malformed input.
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value>;
}

/// Deserialize tool arguments into a typed struct. Argument structs carry
/// `#[serde(deny_unknown_fields)]` so unknown or missing required fields are
/// rejected rather than silently accepted.
pub fn parse_args<T: DeserializeOwned>(arguments: Value) -> AgentResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| AgentError::InvalidParameters(e.to_string()))
}
