use super::base::Provider;
use super::configs::ProviderConfig;
use super::openai::OpenAiProvider;
use crate::errors::ProviderError;

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    match config {
        ProviderConfig::OpenAi(openai_config) => {
            Ok(Box::new(OpenAiProvider::new(openai_config)?))
        }
    }
}
