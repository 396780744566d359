use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a dotted settings path back to the environment variable that sets it,
/// e.g. `provider.api_key` -> `OPSMATE_PROVIDER__API_KEY`
pub fn to_env_var(field: &str) -> String {
    format!("OPSMATE_{}", field.replace('.', "__").to_uppercase())
}
