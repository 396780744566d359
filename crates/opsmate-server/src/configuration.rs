use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use opsmate::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::MissingEnvVar {
                env_var: to_env_var("server.host"),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// Where the operational data lives on disk. The event file is optional:
/// without one the server falls back to the built-in synthetic events.
#[derive(Debug, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub events: Option<PathBuf>,
    #[serde(default = "default_schedule_path")]
    pub schedule: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            events: None,
            schedule: default_schedule_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub files: FileSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            .add_source(
                Environment::with_prefix("OPSMATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("configuration error: {:?}", &err);
                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_schedule_path() -> PathBuf {
    PathBuf::from("schedule.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("OPSMATE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("OPSMATE_PROVIDER__TYPE", "openai");
        env::set_var("OPSMATE_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert!(settings.files.events.is_none());
        assert_eq!(settings.files.schedule, PathBuf::from("schedule.json"));

        let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider;
        assert_eq!(host, "https://api.openai.com");
        assert_eq!(api_key, "test-key");
        assert_eq!(model, "gpt-4o");
        assert_eq!(temperature, None);
        assert_eq!(max_tokens, None);

        env::remove_var("OPSMATE_PROVIDER__TYPE");
        env::remove_var("OPSMATE_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_missing_api_key_names_the_env_var() {
        clean_env();
        env::set_var("OPSMATE_PROVIDER__TYPE", "openai");

        let err = Settings::new().unwrap_err();
        assert!(err.to_string().contains("API_KEY"));

        env::remove_var("OPSMATE_PROVIDER__TYPE");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("OPSMATE_SERVER__PORT", "8080");
        env::set_var("OPSMATE_PROVIDER__TYPE", "openai");
        env::set_var("OPSMATE_PROVIDER__API_KEY", "test-key");
        env::set_var("OPSMATE_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("OPSMATE_FILES__EVENTS", "/var/lib/opsmate/events.json");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(
            settings.files.events,
            Some(PathBuf::from("/var/lib/opsmate/events.json"))
        );
        let ProviderSettings::OpenAi { model, .. } = settings.provider;
        assert_eq!(model, "gpt-4o-mini");

        env::remove_var("OPSMATE_SERVER__PORT");
        env::remove_var("OPSMATE_PROVIDER__TYPE");
        env::remove_var("OPSMATE_PROVIDER__API_KEY");
        env::remove_var("OPSMATE_PROVIDER__MODEL");
        env::remove_var("OPSMATE_FILES__EVENTS");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
