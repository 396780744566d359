//! The agent loop: turn a natural-language instruction into either a direct
//! answer or a sequence of tool invocations, with bounded retries against
//! transient provider failures.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::{AgentError, AgentResult, ProviderError};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::prompts;
use crate::providers::base::Provider;
use crate::toolkits::Toolkit;

const MAX_LLM_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 20;
const MAX_BACKOFF_SECS: u64 = 120;

/// Upper bound on chained tool-call rounds within one user turn. The model
/// can otherwise request tools forever.
const MAX_TOOL_DEPTH: usize = 5;

pub const FALLBACK_MESSAGE: &str = "I encountered an error. Please try again in a moment.";
const EMPTY_RESPONSE_MESSAGE: &str = "I'm sorry, I couldn't process that request.";
const TOOL_CHAIN_MESSAGE: &str =
    "I wasn't able to finish that request; it required too many tool operations in a row.";

/// Seam for the backoff sleep so tests can observe wait durations
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Exponential backoff for rate-limit-class failures: base 20s doubling per
/// consecutive failure, capped at 120s.
fn backoff_delay(consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.saturating_sub(1).min(16) as u64;
    Duration::from_secs((BASE_BACKOFF_SECS << exp).min(MAX_BACKOFF_SECS))
}

/// Agent integrates an LLM with the toolkits it needs to pilot.
///
/// The conversation history, the tool-result cache, and the
/// consecutive-failure counter are all owned by the agent instance, so
/// independent sessions cannot leak state into one another.
pub struct Agent {
    name: String,
    provider: Box<dyn Provider>,
    toolkits: Vec<Box<dyn Toolkit>>,
    system_prompt: Option<String>,
    messages: Vec<Message>,
    tool_cache: HashMap<(String, String), Value>,
    consecutive_failures: u32,
    sleeper: Box<dyn Sleeper>,
}

impl Agent {
    pub fn new(name: impl Into<String>, provider: Box<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            provider,
            toolkits: Vec::new(),
            system_prompt: None,
            messages: Vec::new(),
            tool_cache: HashMap::new(),
            consecutive_failures: 0,
            sleeper: Box::new(TokioSleeper),
        }
    }

    pub fn add_toolkit(&mut self, toolkit: Box<dyn Toolkit>) {
        self.toolkits.push(toolkit);
    }

    /// Replace the generated system prompt with a fixed one
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Clear conversation history and the tool-result cache
    pub fn reset(&mut self) {
        self.messages.clear();
        self.tool_cache.clear();
        self.consecutive_failures = 0;
    }

    fn all_tools(&self) -> Vec<Tool> {
        self.toolkits
            .iter()
            .flat_map(|toolkit| toolkit.tools().iter().cloned())
            .collect()
    }

    fn system_prompt(&self) -> String {
        match &self.system_prompt {
            Some(prompt) => prompt.clone(),
            None => prompts::assistant_prompt(&self.toolkits),
        }
    }

    /// Handle one user turn. Never propagates an error to the caller: every
    /// failure mode collapses into a plain-language message.
    pub async fn invoke(&mut self, text: &str) -> String {
        tracing::debug!(agent = %self.name, "handling user turn");
        self.messages.push(Message::user().with_text(text));
        self.execute().await
    }

    /// The reply loop: call the LLM, execute any requested tools, feed the
    /// results back, repeat until the model answers in plain text.
    async fn execute(&mut self) -> String {
        for _round in 0..MAX_TOOL_DEPTH {
            let response = match self.call_llm().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(agent = %self.name, error = %err, "LLM call failed");
                    return FALLBACK_MESSAGE.to_string();
                }
            };

            self.messages.push(response.clone());

            let requests: Vec<ToolRequest> =
                response.tool_requests().into_iter().cloned().collect();
            if requests.is_empty() {
                return response
                    .text()
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| EMPTY_RESPONSE_MESSAGE.to_string());
            }

            // Execute in the order the model returned them; side effects
            // must stay sequential so the audit trail is deterministic.
            for request in &requests {
                self.execute_tool(request).await;
            }
        }

        tracing::warn!(agent = %self.name, "tool-call chain exceeded max depth");
        TOOL_CHAIN_MESSAGE.to_string()
    }

    /// Run one requested tool call and append its outcome to the history.
    /// Failures are surfaced inline so the model can react to them.
    async fn execute_tool(&mut self, request: &ToolRequest) {
        let result = match &request.tool_call {
            Ok(call) => self.dispatch(call).await,
            Err(err) => Err(err.clone()),
        };

        if let Err(err) = &result {
            tracing::warn!(agent = %self.name, error = %err, "tool call failed");
        }

        self.messages
            .push(Message::user().with_tool_response(request.id.clone(), result));
    }

    async fn dispatch(&mut self, call: &ToolCall) -> AgentResult<Value> {
        let cache_key = (call.name.clone(), call.arguments.to_string());
        if let Some(hit) = self.tool_cache.get(&cache_key) {
            tracing::debug!(tool = %call.name, "tool cache hit");
            return Ok(hit.clone());
        }

        let toolkit = self
            .toolkits
            .iter()
            .find(|toolkit| toolkit.tools().iter().any(|tool| tool.name == call.name))
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tracing::info!(tool = %call.name, arguments = %call.arguments, "calling tool");
        let output = toolkit.call(call.clone()).await?;
        self.tool_cache.insert(cache_key, output.clone());
        Ok(output)
    }

    /// One completion against the provider, retried with exponential
    /// backoff for rate-limit-class failures only. The consecutive-failure
    /// counter carries across turns and resets on the first success.
    async fn call_llm(&mut self) -> Result<Message, ProviderError> {
        let tools = self.all_tools();
        let system = self.system_prompt();

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .provider
                .complete(&system, &self.messages, &tools)
                .await
            {
                Ok((message, usage)) => {
                    self.consecutive_failures = 0;
                    tracing::debug!(
                        total_tokens = ?usage.total_tokens,
                        "completion received"
                    );
                    return Ok(message);
                }
                Err(err) if err.is_transient() && attempt < MAX_LLM_ATTEMPTS => {
                    self.consecutive_failures += 1;
                    let wait = backoff_delay(self.consecutive_failures);
                    tracing::warn!(
                        wait_secs = wait.as_secs(),
                        attempt,
                        "transient provider failure, backing off"
                    );
                    self.sleeper.sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::providers::mock::{FlakyProvider, MockProvider};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct RecordingSleeper {
        waits: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    struct EchoToolkit {
        tools: Vec<Tool>,
        calls: Arc<AtomicUsize>,
    }

    impl EchoToolkit {
        fn new() -> Self {
            Self {
                tools: vec![Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                )],
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Toolkit for EchoToolkit {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "A toolkit for testing"
        }

        fn instructions(&self) -> &str {
            "Echo things"
        }

        fn tools(&self) -> &[Tool] {
            &self.tools
        }

        async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match tool_call.name.as_str() {
                "echo" => Ok(json!(tool_call.arguments["message"].as_str().unwrap_or(""))),
                _ => Err(AgentError::ToolNotFound(tool_call.name)),
            }
        }
    }

    #[tokio::test]
    async fn test_simple_response() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("Hello!")]);
        let mut agent = Agent::new("test", Box::new(provider));

        let reply = agent.invoke("Hi").await;
        assert_eq!(reply, "Hello!");
        assert_eq!(agent.messages().len(), 2);
        assert_eq!(agent.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request(
                "1",
                Ok(ToolCall::new("echo", json!({"message": "test"}))),
            ),
            Message::assistant().with_text("Done!"),
        ]);
        let mut agent = Agent::new("test", Box::new(provider));
        agent.add_toolkit(Box::new(EchoToolkit::new()));

        let reply = agent.invoke("Echo test").await;
        assert_eq!(reply, "Done!");

        // user, assistant request, tool response, assistant answer
        assert_eq!(agent.messages().len(), 4);
        let response = agent.messages()[2].content[0].as_tool_response().unwrap();
        assert_eq!(response.tool_result, Ok(json!("test")));
    }

    #[tokio::test]
    async fn test_unknown_tool_surfaced_in_history() {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", Ok(ToolCall::new("bogus_tool", json!({})))),
            Message::assistant().with_text("Recovered"),
        ]);
        let mut agent = Agent::new("test", Box::new(provider));
        agent.add_toolkit(Box::new(EchoToolkit::new()));

        let reply = agent.invoke("do something").await;
        assert_eq!(reply, "Recovered");

        let response = agent.messages()[2].content[0].as_tool_response().unwrap();
        assert_eq!(
            response.tool_result,
            Err(AgentError::ToolNotFound("bogus_tool".to_string()))
        );
    }

    #[tokio::test]
    async fn test_identical_calls_short_circuit_through_cache() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request(
                "1",
                Ok(ToolCall::new("echo", json!({"message": "same"}))),
            ),
            Message::assistant().with_text("first"),
            Message::assistant().with_tool_request(
                "2",
                Ok(ToolCall::new("echo", json!({"message": "same"}))),
            ),
            Message::assistant().with_text("second"),
        ]);
        let toolkit = EchoToolkit::new();
        let calls = toolkit.calls.clone();

        let mut agent = Agent::new("test", Box::new(provider));
        agent.add_toolkit(Box::new(toolkit));

        agent.invoke("first turn").await;
        agent.invoke("second turn").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_backoff_durations() {
        let provider = FlakyProvider::new(
            vec![
                ProviderError::RateLimited("slow down".to_string()),
                ProviderError::RateLimited("slow down".to_string()),
            ],
            vec![Message::assistant().with_text("finally")],
        );
        let waits = Arc::new(Mutex::new(Vec::new()));
        let mut agent = Agent::new("test", Box::new(provider))
            .with_sleeper(Box::new(RecordingSleeper {
                waits: waits.clone(),
            }));

        let reply = agent.invoke("hello").await;
        assert_eq!(reply, "finally");

        let waits = waits.lock().unwrap();
        assert_eq!(
            *waits,
            vec![Duration::from_secs(20), Duration::from_secs(40)]
        );
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_apology() {
        let provider = FlakyProvider::new(
            vec![
                ProviderError::RateLimited("1".to_string()),
                ProviderError::RateLimited("2".to_string()),
                ProviderError::RateLimited("3".to_string()),
            ],
            vec![],
        );
        let waits = Arc::new(Mutex::new(Vec::new()));
        let mut agent = Agent::new("test", Box::new(provider))
            .with_sleeper(Box::new(RecordingSleeper {
                waits: waits.clone(),
            }));

        let reply = agent.invoke("hello").await;
        assert_eq!(reply, FALLBACK_MESSAGE);
        // Only two backoff waits: the third failure exhausts the attempts
        assert_eq!(waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_failure_skips_retry() {
        let provider = FlakyProvider::new(
            vec![ProviderError::Api("bad request".to_string())],
            vec![],
        );
        let waits = Arc::new(Mutex::new(Vec::new()));
        let mut agent = Agent::new("test", Box::new(provider))
            .with_sleeper(Box::new(RecordingSleeper {
                waits: waits.clone(),
            }));

        let reply = agent.invoke("hello").await;
        assert_eq!(reply, FALLBACK_MESSAGE);
        assert!(waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_chain_depth_is_bounded() {
        // The model keeps asking for tools; the loop must cut it off
        let endless: Vec<Message> = (0..10)
            .map(|i| {
                Message::assistant().with_tool_request(
                    format!("{}", i),
                    Ok(ToolCall::new("echo", json!({"message": format!("{}", i)}))),
                )
            })
            .collect();
        let mut agent = Agent::new("test", Box::new(MockProvider::new(endless)));
        agent.add_toolkit(Box::new(EchoToolkit::new()));

        let reply = agent.invoke("loop forever").await;
        assert_eq!(reply, TOOL_CHAIN_MESSAGE);
    }

    #[test]
    fn test_backoff_delay_formula() {
        assert_eq!(backoff_delay(1), Duration::from_secs(20));
        assert_eq!(backoff_delay(2), Duration::from_secs(40));
        assert_eq!(backoff_delay(3), Duration::from_secs(80));
        assert_eq!(backoff_delay(4), Duration::from_secs(120));
        assert_eq!(backoff_delay(10), Duration::from_secs(120));
    }
}
