//! Notification sending behind a `Mailer` seam.
//!
//! Actual SMTP delivery is an external collaborator; the default mailer
//! records messages to an in-memory outbox and logs them, which is what the
//! approval workflow and the tests count against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use super::{parse_args, Toolkit};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> AgentResult<()>;
}

/// Records sent mail instead of delivering it
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<EmailMessage>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, message: &EmailMessage) -> AgentResult<()> {
        tracing::info!(
            recipient = %message.recipient,
            subject = %message.subject,
            "sending notification"
        );
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EmailAction {
    Send,
    BatchSend,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EmailArgs {
    action: EmailAction,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    notifications: Option<Vec<EmailMessage>>,
}

/// Exposes the mailer to the model as a `send_email` tool
pub struct EmailToolkit {
    mailer: Arc<dyn Mailer>,
    tools: Vec<Tool>,
}

impl EmailToolkit {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        let tools = vec![Tool::new(
            "send_email",
            "Send a notification email to a contact",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["send", "batch_send"],
                        "description": "Send one message or a batch"
                    },
                    "recipient": {"type": "string", "description": "Recipient email address"},
                    "subject": {"type": "string", "description": "Subject line"},
                    "body": {"type": "string", "description": "Message body"},
                    "notifications": {
                        "type": "array",
                        "description": "For batch_send: list of {recipient, subject, body}",
                        "items": {
                            "type": "object",
                            "properties": {
                                "recipient": {"type": "string"},
                                "subject": {"type": "string"},
                                "body": {"type": "string"}
                            },
                            "required": ["recipient", "subject", "body"]
                        }
                    }
                },
                "required": ["action"]
            }),
        )];
        Self { mailer, tools }
    }
}

#[async_trait]
impl Toolkit for EmailToolkit {
    fn name(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends notification emails to affected teams"
    }

    fn instructions(&self) -> &str {
        "Resolve recipients through fetch_contacts first; never guess addresses."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let args: EmailArgs = parse_args(tool_call.arguments)?;
        match args.action {
            EmailAction::Send => {
                let message = EmailMessage {
                    recipient: args.recipient.ok_or_else(missing("recipient"))?,
                    subject: args.subject.ok_or_else(missing("subject"))?,
                    body: args.body.ok_or_else(missing("body"))?,
                };
                self.mailer.send(&message).await?;
                Ok(json!({"status": "sent", "to": message.recipient}))
            }
            EmailAction::BatchSend => {
                let notifications = args.notifications.ok_or_else(missing("notifications"))?;
                for message in &notifications {
                    self.mailer.send(message).await?;
                }
                Ok(json!({"status": "sent", "count": notifications.len()}))
            }
        }
    }
}

fn missing(field: &'static str) -> impl Fn() -> AgentError {
    move || AgentError::InvalidParameters(format!("{} is required for this action", field))
}
