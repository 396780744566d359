//! WebSocket sessions: each connection gets its own agent, conversation
//! history, and pending approval cycle. Frames are JSON envelopes tagged
//! with a `type` field; every failure mode becomes an `error` envelope
//! rather than a dropped connection.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use serde_json::json;

use opsmate::agent::Agent;
use opsmate::conversation::{ConversationManager, DEFAULT_MAX_HISTORY};
use opsmate::models::role::Role;
use opsmate::workflow::{
    parse_modify, ApprovalCycle, ApprovalState, Change, Decision, DetectedIssue,
};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Startup {
        content: String,
    },
    Response {
        content: String,
    },
    ChangeProposal {
        content: String,
        issues: Vec<DetectedIssue>,
        changes: Vec<Change>,
    },
    ChangesApplied {
        updates_applied: usize,
        notifications_sent: usize,
    },
    Error {
        content: String,
    },
}

/// Client frames tagged with a `type` field, mirroring the server side
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEvent {
    Command { content: String },
    UserResponse { user_response: String },
}

/// A typed envelope, a bare `{"command": ...}` object, or plain text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientFrame {
    Envelope(ClientEvent),
    Bare { command: String },
}

fn parse_command(raw: &str) -> String {
    match serde_json::from_str::<ClientFrame>(raw) {
        Ok(ClientFrame::Envelope(ClientEvent::Command { content })) => content,
        Ok(ClientFrame::Envelope(ClientEvent::UserResponse { user_response })) => user_response,
        Ok(ClientFrame::Bare { command }) => command,
        Err(_) => raw.to_string(),
    }
}

struct Session {
    state: AppState,
    agent: Agent,
    conversation: ConversationManager,
    cycle: Option<ApprovalCycle>,
}

impl Session {
    fn new(state: AppState, agent: Agent) -> Self {
        Self {
            state,
            agent,
            conversation: ConversationManager::new(DEFAULT_MAX_HISTORY),
            cycle: None,
        }
    }

    /// Events sent as soon as the connection opens
    fn greeting(&mut self) -> Vec<ServerEvent> {
        let mut events = vec![ServerEvent::Startup {
            content: self.state.startup_message(),
        }];
        if let Some(cycle) = ApprovalCycle::propose(&self.state.monitor()) {
            events.push(proposal_event(&cycle));
            self.cycle = Some(cycle);
        }
        self.sync_context();
        events
    }

    async fn handle(&mut self, input: &str) -> Vec<ServerEvent> {
        self.conversation.add_turn(Role::User, input);
        let events = if self.cycle.is_some() {
            self.handle_decision(input).await
        } else {
            self.handle_command(input).await
        };

        for event in &events {
            if let ServerEvent::Response { content } = event {
                self.conversation.add_turn(Role::Assistant, content.clone());
            }
        }
        self.sync_context();
        events
    }

    /// Mirror the pending cycle into the conversation context so later
    /// turns can look up what is on the table.
    fn sync_context(&mut self) {
        match &self.cycle {
            Some(cycle) => {
                self.conversation
                    .set_context("current_changes", json!(cycle.changes()));
                self.conversation
                    .set_context("current_issues", json!(cycle.issues()));
            }
            None => self.conversation.clear_context(),
        }
    }

    /// An approval cycle is pending; the input is read as a decision first.
    /// The cycle is taken out of the session and put back unless it was
    /// applied or cancelled.
    async fn handle_decision(&mut self, input: &str) -> Vec<ServerEvent> {
        let mut cycle = match self.cycle.take() {
            Some(cycle) => cycle,
            None => return self.handle_command(input).await,
        };

        // After a modify request, a bare "<event_id> <hours>" line amends
        // the pending changes and re-proposes.
        if cycle.state() == ApprovalState::ModifyRequested {
            if let Some((event_id, hours)) = parse_modify(input) {
                cycle.modify_change(event_id, hours);
                let events = vec![proposal_event(&cycle)];
                self.cycle = Some(cycle);
                return events;
            }
        }

        match cycle.decide(input) {
            Decision::Approve => {
                let schedule = self.state.schedule();
                let contacts = self.state.contacts();
                let result = cycle
                    .apply(&schedule, &contacts, self.state.mailer.as_ref())
                    .await;
                match result {
                    Ok(report) => vec![ServerEvent::ChangesApplied {
                        updates_applied: report.updates_applied,
                        notifications_sent: report.notifications_sent,
                    }],
                    Err(err) => {
                        tracing::error!(error = %err, "applying approved changes failed");
                        vec![ServerEvent::Error {
                            content: format!("Could not apply changes: {}", err),
                        }]
                    }
                }
            }
            Decision::Cancel => vec![ServerEvent::Response {
                content: "Understood. No changes were applied.".to_string(),
            }],
            Decision::Modify => {
                self.cycle = Some(cycle);
                vec![ServerEvent::Response {
                    content: "Which event should change, and by how many hours? \
                              Reply like \"TRUCK123 5\"."
                        .to_string(),
                }]
            }
            Decision::Explain => {
                let events = vec![ServerEvent::Response {
                    content: cycle.explanation(),
                }];
                self.cycle = Some(cycle);
                events
            }
            Decision::Unrecognized => {
                self.cycle = Some(cycle);
                vec![ServerEvent::Response {
                    content: "I didn't catch a decision. Reply yes, no, modify, or explain."
                        .to_string(),
                }]
            }
        }
    }

    async fn handle_command(&mut self, input: &str) -> Vec<ServerEvent> {
        let reply = self.agent.invoke(input).await;
        vec![ServerEvent::Response { content: reply }]
    }
}

fn proposal_event(cycle: &ApprovalCycle) -> ServerEvent {
    ServerEvent::ChangeProposal {
        content: cycle.summary(),
        issues: cycle.issues().to_vec(),
        changes: cycle.changes().to_vec(),
    }
}

async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, mut socket: WebSocket) {
    let agent = match state.build_agent() {
        Ok(agent) => agent,
        Err(err) => {
            tracing::error!(error = %err, "could not build agent for session");
            let event = ServerEvent::Error {
                content: format!("agent unavailable: {}", err),
            };
            let _ = send_event(&mut socket, &event).await;
            return;
        }
    };

    let mut session = Session::new(state, agent);
    tracing::info!("websocket session opened");

    for event in session.greeting() {
        if send_event(&mut socket, &event).await.is_err() {
            return;
        }
    }

    while let Some(frame) = socket.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "websocket read error");
                break;
            }
        };

        let raw = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let command = parse_command(&raw);
        for event in session.handle(&command).await {
            if send_event(&mut socket, &event).await.is_err() {
                return;
            }
        }
    }

    tracing::info!("websocket session closed");
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "could not encode server event");
            return Ok(());
        }
    };
    socket.send(Message::Text(payload)).await
}

pub fn routes(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}
