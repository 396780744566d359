use serde::Deserialize;

/// Temperature is pinned low for determinism unless explicitly overridden.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Configuration for any OpenAI-compatible chat-completions endpoint
/// (OpenAI itself, Groq, a local gateway, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
}
