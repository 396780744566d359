//! Read-only query surface over the operational event table.
//!
//! Events come from a JSON side file written by the delay-detection producer,
//! or from a built-in synthetic table for demos and tests. File reads are
//! tolerant: a missing or half-written file is treated as an empty table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{parse_args, Toolkit};
use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Logistics,
    Production,
    EquipmentFailure,
    MaterialShortage,
    StockOut,
    ProductionDelay,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Logistics => "Logistics",
            EventKind::Production => "Production",
            EventKind::EquipmentFailure => "Equipment failure",
            EventKind::MaterialShortage => "Material shortage",
            EventKind::StockOut => "Stock out",
            EventKind::ProductionDelay => "Production delay",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Delayed,
    AtRisk,
    Critical,
    Warning,
    Breakdown,
    OnTrack,
}

impl EventStatus {
    /// The single place that decides which statuses count as open issues.
    /// Extend here when new statuses are added, not at call sites.
    pub fn needs_attention(self) -> bool {
        matches!(self, EventStatus::Delayed | EventStatus::AtRisk)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Delayed => "delayed",
            EventStatus::AtRisk => "at_risk",
            EventStatus::Critical => "critical",
            EventStatus::Warning => "warning",
            EventStatus::Breakdown => "breakdown",
            EventStatus::OnTrack => "on_track",
        };
        write!(f, "{}", s)
    }
}

/// One operational event, identified by a unique string key in the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: EventStatus,
    pub location: String,
    /// Affected-team identifiers, in reporting order
    #[serde(default)]
    pub impact: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub delay_hours: Option<i64>,
}

impl Event {
    fn describe(&self, id: &str) -> String {
        match &self.details {
            Some(details) => details.clone(),
            None => format!("{} event {} is {} at {}", self.kind, id, self.status, self.location),
        }
    }
}

/// Summary row returned by `check_all`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub id: String,
    pub kind: EventKind,
    pub status: EventStatus,
    pub details: String,
    pub impact: Vec<String>,
    pub delay_hours: Option<i64>,
}

/// Canned remediation proposal for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposed_actions: Vec<String>,
    pub requires_approval: bool,
}

impl Proposal {
    fn none() -> Self {
        Proposal {
            proposed_actions: Vec::new(),
            requires_approval: false,
        }
    }
}

enum EventSource {
    File(PathBuf),
    Static(BTreeMap<String, Event>),
}

pub struct EventMonitor {
    source: EventSource,
}

impl EventMonitor {
    /// Monitor backed by a JSON side file: `{ "<event_id>": { ... }, ... }`
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: EventSource::File(path.into()),
        }
    }

    pub fn from_table(table: BTreeMap<String, Event>) -> Self {
        Self {
            source: EventSource::Static(table),
        }
    }

    /// The synthetic table used when no event file is configured
    pub fn synthetic() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "TRUCK123".to_string(),
            Event {
                kind: EventKind::Logistics,
                status: EventStatus::Delayed,
                location: "checkpoint B".to_string(),
                impact: vec![
                    "Factory_X_Production".to_string(),
                    "Customer_Delivery_A".to_string(),
                ],
                details: None,
                delay_hours: Some(3),
            },
        );
        table.insert(
            "PROD456".to_string(),
            Event {
                kind: EventKind::MaterialShortage,
                status: EventStatus::AtRisk,
                location: "Factory_X".to_string(),
                impact: vec![
                    "Customer_Delivery_B".to_string(),
                    "Inventory_Level_C".to_string(),
                ],
                details: None,
                delay_hours: None,
            },
        );
        Self::from_table(table)
    }

    /// Load the current table. The producer may be rewriting the file while
    /// we read it, so any failure means "no events right now", not an error.
    fn load(&self) -> BTreeMap<String, Event> {
        match &self.source {
            EventSource::Static(table) => table.clone(),
            EventSource::File(path) => std::fs::read_to_string(path)
                .ok()
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default(),
        }
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        self.load().get(event_id).cloned()
    }

    /// All events whose status needs attention, in key order
    pub fn check_all(&self) -> Vec<IssueSummary> {
        self.load()
            .into_iter()
            .filter(|(_, event)| event.status.needs_attention())
            .map(|(id, event)| IssueSummary {
                details: event.describe(&id),
                id,
                kind: event.kind,
                status: event.status,
                impact: event.impact,
                delay_hours: event.delay_hours,
            })
            .collect()
    }

    pub fn check_status(&self, event_id: &str) -> (String, String) {
        match self.event(event_id) {
            Some(event) => (event.status.to_string(), event.describe(event_id)),
            None => (
                "normal".to_string(),
                "No issues detected".to_string(),
            ),
        }
    }

    /// Render the affected-team list for one event, one team per line in
    /// the order the event reports them
    pub fn analyze_impact(&self, event_id: &str) -> String {
        match self.event(event_id) {
            Some(event) => {
                let mut out = format!("Impact Analysis for {}:\n", event_id);
                out.push_str(&format!(
                    "- Primary Issue: {} at {}\n",
                    event.status, event.location
                ));
                out.push_str("- Affected Operations:\n");
                for team in &event.impact {
                    out.push_str(&format!("  * {}\n", team));
                }
                out
            }
            None => "No impact detected".to_string(),
        }
    }

    /// Canned action list keyed by event kind. Kinds without a playbook get
    /// an empty, non-approval-requiring proposal.
    pub fn propose_solution(&self, event_id: &str) -> Proposal {
        let event = match self.event(event_id) {
            Some(event) => event,
            None => return Proposal::none(),
        };

        let first = event.impact.first().cloned().unwrap_or_default();
        let second = event.impact.get(1).cloned().unwrap_or_default();
        let delay = event.delay_hours.unwrap_or(3);

        match event.kind {
            EventKind::Logistics => Proposal {
                proposed_actions: vec![
                    format!("Reschedule production at {} with {}-hour delay", first, delay),
                    format!("Update delivery time for {}", second),
                    "Notify affected teams".to_string(),
                ],
                requires_approval: true,
            },
            EventKind::Production | EventKind::MaterialShortage => Proposal {
                proposed_actions: vec![
                    "Check alternative material sources".to_string(),
                    format!("Adjust inventory allocation for {}", second),
                    "Alert procurement team".to_string(),
                ],
                requires_approval: true,
            },
            _ => Proposal::none(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MonitorAction {
    CheckAll,
    CheckStatus,
    AnalyzeImpact,
    ProposeSolution,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MonitorArgs {
    action: MonitorAction,
    #[serde(default)]
    event_id: Option<String>,
}

impl MonitorArgs {
    fn event_id(&self) -> AgentResult<&str> {
        self.event_id.as_deref().ok_or_else(|| {
            crate::errors::AgentError::InvalidParameters(
                "event_id is required for this action".to_string(),
            )
        })
    }
}

/// Exposes the event monitor to the model as a single `monitor_events` tool
pub struct MonitorToolkit {
    monitor: Arc<EventMonitor>,
    tools: Vec<Tool>,
}

impl MonitorToolkit {
    pub fn new(monitor: Arc<EventMonitor>) -> Self {
        let tools = vec![Tool::new(
            "monitor_events",
            "Monitor operational events and detect problems",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["check_all", "check_status", "analyze_impact", "propose_solution"],
                        "description": "Operation to perform"
                    },
                    "event_id": {
                        "type": "string",
                        "description": "Event to inspect; required for all actions except check_all"
                    }
                },
                "required": ["action"]
            }),
        )];
        Self { monitor, tools }
    }
}

#[async_trait]
impl Toolkit for MonitorToolkit {
    fn name(&self) -> &str {
        "monitor"
    }

    fn description(&self) -> &str {
        "Monitors operational events and detects logistics and production problems"
    }

    fn instructions(&self) -> &str {
        "Use check_all to scan for open issues, then analyze_impact and \
         propose_solution on a specific event_id before suggesting changes."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let args: MonitorArgs = parse_args(tool_call.arguments)?;
        match args.action {
            MonitorAction::CheckAll => Ok(json!(self.monitor.check_all())),
            MonitorAction::CheckStatus => {
                let (status, details) = self.monitor.check_status(args.event_id()?);
                Ok(json!({"status": status, "details": details}))
            }
            MonitorAction::AnalyzeImpact => {
                Ok(json!(self.monitor.analyze_impact(args.event_id()?)))
            }
            MonitorAction::ProposeSolution => {
                Ok(json!(self.monitor.propose_solution(args.event_id()?)))
            }
        }
    }
}
