use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            Ok((responses.remove(0), Usage::default()))
        }
    }
}

/// A provider that fails a fixed number of times before handing off to a
/// wrapped provider. Used to exercise the retry policy.
pub struct FlakyProvider {
    failures: Mutex<Vec<ProviderError>>,
    inner: MockProvider,
}

impl FlakyProvider {
    pub fn new(failures: Vec<ProviderError>, then: Vec<Message>) -> Self {
        Self {
            failures: Mutex::new(failures),
            inner: MockProvider::new(then),
        }
    }
}

#[async_trait]
impl Provider for FlakyProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage), ProviderError> {
        let next_failure = self.failures.lock().unwrap().pop();
        match next_failure {
            Some(err) => Err(err),
            None => self.inner.complete(system, messages, tools).await,
        }
    }
}
