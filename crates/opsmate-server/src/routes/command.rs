//! Stateless HTTP surface: one-shot commands and the startup report.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
struct CommandRequest {
    command: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommandResponse {
    response: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StartupResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

async fn process_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    let mut agent = match state.build_agent() {
        Ok(agent) => agent,
        Err(err) => {
            tracing::error!(error = %err, "could not build agent");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("agent unavailable: {}", err),
                }),
            )
                .into_response();
        }
    };

    let response = agent.invoke(&request.command).await;
    Json(CommandResponse { response }).into_response()
}

async fn startup_message(State(state): State<AppState>) -> Json<StartupResponse> {
    Json(StartupResponse {
        message: state.startup_message(),
    })
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/process_command", post(process_command))
        .route("/startup_message", get(startup_message))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use opsmate::providers::configs::{OpenAiProviderConfig, ProviderConfig};
    use std::io::Write;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(events: Option<&std::path::Path>) -> AppState {
        AppState {
            provider_config: ProviderConfig::OpenAi(OpenAiProviderConfig::new(
                "http://localhost:1",
                "test-key",
                "gpt-4o",
            )),
            events_path: events.map(Into::into),
            schedule_path: std::env::temp_dir().join("opsmate-test-schedule.json"),
            mailer: Arc::new(opsmate::toolkits::email::Outbox::new()),
        }
    }

    #[tokio::test]
    async fn test_startup_message_reports_synthetic_issues() {
        let app = routes(test_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/startup_message")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: StartupResponse = serde_json::from_slice(&body).unwrap();
        assert!(parsed.message.contains("=== CURRENT SITUATION ==="));
        assert!(parsed.message.contains("TRUCK123"));
    }

    #[tokio::test]
    async fn test_startup_message_all_clear_with_empty_event_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();

        let app = routes(test_state(Some(file.path())));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/startup_message")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: StartupResponse = serde_json::from_slice(&body).unwrap();
        assert!(parsed.message.contains("All operations are on track"));
    }
}
