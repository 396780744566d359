//! JSON-file-backed schedule store and its calendar toolkit.
//!
//! The schedule lives in a JSON file mapping entry id to entry. Like the
//! event table, reads tolerate concurrent writers: an unreadable file is an
//! empty schedule. Writes rewrite the whole file; callers are expected to be
//! the only writer (one session applies changes at a time).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{parse_args, Toolkit};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

/// One entry in a batched edit: delay an event by a number of hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEdit {
    pub event_id: String,
    pub delay_hours: i64,
}

pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store seeded with the synthetic demo schedule, anchored to
    /// today's date. Existing contents are replaced.
    pub fn seeded(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let store = Self::new(path);
        store.save(&synthetic_schedule())?;
        Ok(store)
    }

    fn load(&self) -> BTreeMap<String, ScheduleEntry> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn save(&self, entries: &BTreeMap<String, ScheduleEntry>) -> AgentResult<()> {
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        std::fs::write(&self.path, raw)
            .map_err(|e| AgentError::ExecutionError(format!("could not write schedule: {}", e)))
    }

    /// Render the schedule in start order
    pub fn view(&self) -> String {
        let entries = self.load();
        if entries.is_empty() {
            return "No upcoming events found.".to_string();
        }

        let mut rows: Vec<(&String, &ScheduleEntry)> = entries.iter().collect();
        rows.sort_by_key(|(_, entry)| entry.start);

        let mut out = "Upcoming events:\n".to_string();
        for (id, entry) in rows {
            out.push_str(&format!(
                "- {}: {} at {} (ID: {})\n",
                entry.start.format("%Y-%m-%d %H:%M"),
                entry.summary,
                entry.location,
                id
            ));
        }
        out
    }

    pub fn entry(&self, event_id: &str) -> Option<ScheduleEntry> {
        self.load().get(event_id).cloned()
    }

    pub fn create(&self, event_id: &str, entry: ScheduleEntry) -> AgentResult<String> {
        let mut entries = self.load();
        if entries.contains_key(event_id) {
            return Err(AgentError::ExecutionError(format!(
                "event {} already exists",
                event_id
            )));
        }
        entries.insert(event_id.to_string(), entry);
        self.save(&entries)?;
        Ok(format!("Event created successfully. Event ID: {}", event_id))
    }

    pub fn edit(&self, event_id: &str, delay_hours: i64) -> AgentResult<String> {
        let mut entries = self.load();
        let entry = entries
            .get_mut(event_id)
            .ok_or_else(|| AgentError::ExecutionError(format!("event {} not found", event_id)))?;
        entry.start += Duration::hours(delay_hours);
        entry.end += Duration::hours(delay_hours);
        let summary = entry.summary.clone();
        self.save(&entries)?;
        Ok(format!("Event updated successfully: {}", summary))
    }

    pub fn delete(&self, event_id: &str) -> AgentResult<String> {
        let mut entries = self.load();
        if entries.remove(event_id).is_none() {
            return Err(AgentError::ExecutionError(format!(
                "event {} not found",
                event_id
            )));
        }
        self.save(&entries)?;
        Ok("Event deleted successfully".to_string())
    }

    /// Apply a batch of delay edits in one read-modify-write pass. Unknown
    /// ids are skipped with a warning; returns the number actually applied.
    pub fn batch_edit(&self, edits: &[ScheduleEdit]) -> AgentResult<usize> {
        let mut entries = self.load();
        let mut applied = 0;
        for edit in edits {
            match entries.get_mut(&edit.event_id) {
                Some(entry) => {
                    entry.start += Duration::hours(edit.delay_hours);
                    entry.end += Duration::hours(edit.delay_hours);
                    applied += 1;
                }
                None => {
                    tracing::warn!(event_id = %edit.event_id, "skipping edit for unknown event");
                }
            }
        }
        if applied > 0 {
            self.save(&entries)?;
        }
        Ok(applied)
    }
}

/// The demo schedule: shipping routes, production runs, and maintenance,
/// keyed so that the synthetic monitor events line up with real entries.
pub fn synthetic_schedule() -> BTreeMap<String, ScheduleEntry> {
    let today = Utc::now().date_naive();
    let at = |hour: u32, len: i64| {
        let start = today
            .and_hms_opt(hour, 0, 0)
            .expect("valid hour")
            .and_utc();
        (start, start + Duration::hours(len))
    };

    let mut schedule = BTreeMap::new();
    let (start, end) = at(9, 2);
    schedule.insert(
        "TRUCK123".to_string(),
        ScheduleEntry {
            summary: "Truck Delivery: Raw Materials".to_string(),
            start,
            end,
            location: "Warehouse A".to_string(),
            description: "Daily raw materials delivery from supplier".to_string(),
        },
    );
    let (start, end) = at(14, 2);
    schedule.insert(
        "SHIP002".to_string(),
        ScheduleEntry {
            summary: "Container Shipment: Export Products".to_string(),
            start,
            end,
            location: "Port Terminal B".to_string(),
            description: "Weekly international shipping".to_string(),
        },
    );
    let (start, end) = at(7, 8);
    schedule.insert(
        "PROD456".to_string(),
        ScheduleEntry {
            summary: "Production Line A: Electronics Assembly".to_string(),
            start,
            end,
            location: "Factory X".to_string(),
            description: "Daily production run".to_string(),
        },
    );
    let (start, end) = at(16, 1);
    schedule.insert(
        "QC001".to_string(),
        ScheduleEntry {
            summary: "Quality Control Check".to_string(),
            start,
            end,
            location: "QC Lab".to_string(),
            description: "Daily quality inspection".to_string(),
        },
    );
    let (start, end) = at(6, 4);
    schedule.insert(
        "MAINT001".to_string(),
        ScheduleEntry {
            summary: "Equipment Maintenance: Line A".to_string(),
            start,
            end,
            location: "Factory X".to_string(),
            description: "Weekly preventive maintenance".to_string(),
        },
    );
    schedule
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CalendarAction {
    View,
    Create,
    Edit,
    Delete,
    BatchEdit,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CalendarArgs {
    action: CalendarAction,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event_name: Option<String>,
    #[serde(default)]
    event_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    event_description: Option<String>,
    #[serde(default)]
    delay_hours: Option<i64>,
    #[serde(default)]
    edits: Option<Vec<ScheduleEdit>>,
}

fn required<T>(value: Option<T>, field: &str) -> AgentResult<T> {
    value.ok_or_else(|| {
        AgentError::InvalidParameters(format!("{} is required for this action", field))
    })
}

/// Exposes the schedule store to the model as a `manage_calendar` tool
pub struct CalendarToolkit {
    store: Arc<ScheduleStore>,
    tools: Vec<Tool>,
}

impl CalendarToolkit {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        let tools = vec![Tool::new(
            "manage_calendar",
            "View and change the operations schedule",
            json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": ["view", "create", "edit", "delete", "batch_edit"],
                        "description": "Action to perform"
                    },
                    "event_id": {"type": "string", "description": "Event ID for edit or delete"},
                    "event_name": {"type": "string", "description": "Name of the event to create"},
                    "event_datetime": {"type": "string", "description": "RFC 3339 start time for create"},
                    "event_description": {"type": "string", "description": "Optional description"},
                    "delay_hours": {"type": "integer", "description": "Hours to delay the event"},
                    "edits": {
                        "type": "array",
                        "description": "For batch_edit: list of {event_id, delay_hours}",
                        "items": {
                            "type": "object",
                            "properties": {
                                "event_id": {"type": "string"},
                                "delay_hours": {"type": "integer"}
                            },
                            "required": ["event_id", "delay_hours"]
                        }
                    }
                },
                "required": ["action"]
            }),
        )];
        Self { store, tools }
    }
}

#[async_trait]
impl Toolkit for CalendarToolkit {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Manages the operations schedule: deliveries, production runs, maintenance"
    }

    fn instructions(&self) -> &str {
        "Use view before proposing changes. Prefer batch_edit when several \
         events move by the same cause."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let args: CalendarArgs = parse_args(tool_call.arguments)?;
        match args.action {
            CalendarAction::View => Ok(json!(self.store.view())),
            CalendarAction::Create => {
                let name = required(args.event_name, "event_name")?;
                let start = required(args.event_datetime, "event_datetime")?;
                let id = format!("EVT{}", start.timestamp());
                let entry = ScheduleEntry {
                    summary: name,
                    start,
                    end: start + Duration::hours(1),
                    location: String::new(),
                    description: args.event_description.unwrap_or_default(),
                };
                Ok(json!(self.store.create(&id, entry)?))
            }
            CalendarAction::Edit => {
                let id = required(args.event_id, "event_id")?;
                let delay = required(args.delay_hours, "delay_hours")?;
                Ok(json!(self.store.edit(&id, delay)?))
            }
            CalendarAction::Delete => {
                let id = required(args.event_id, "event_id")?;
                Ok(json!(self.store.delete(&id)?))
            }
            CalendarAction::BatchEdit => {
                let edits = required(args.edits, "edits")?;
                let applied = self.store.batch_edit(&edits)?;
                Ok(json!({"updates_applied": applied}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ScheduleStore) {
        let dir = TempDir::new().unwrap();
        let store = ScheduleStore::seeded(dir.path().join("schedule.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_view_lists_entries_in_start_order() {
        let (_dir, store) = store();
        let view = store.view();
        let maint = view.find("MAINT001").unwrap();
        let truck = view.find("TRUCK123").unwrap();
        let ship = view.find("SHIP002").unwrap();
        assert!(maint < truck && truck < ship);
    }

    #[test]
    fn test_edit_shifts_start_and_end() {
        let (_dir, store) = store();
        let before = store.entry("TRUCK123").unwrap();
        store.edit("TRUCK123", 3).unwrap();
        let after = store.entry("TRUCK123").unwrap();
        assert_eq!(after.start - before.start, Duration::hours(3));
        assert_eq!(after.end - before.end, Duration::hours(3));
    }

    #[test]
    fn test_edit_unknown_event_fails() {
        let (_dir, store) = store();
        assert!(store.edit("NOPE", 1).is_err());
    }

    #[test]
    fn test_batch_edit_skips_unknown_ids() {
        let (_dir, store) = store();
        let applied = store
            .batch_edit(&[
                ScheduleEdit {
                    event_id: "TRUCK123".to_string(),
                    delay_hours: 3,
                },
                ScheduleEdit {
                    event_id: "GHOST".to_string(),
                    delay_hours: 1,
                },
            ])
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = ScheduleStore::new(dir.path().join("missing.json"));
        assert_eq!(store.view(), "No upcoming events found.");
        assert_eq!(store.batch_edit(&[]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_toolkit_rejects_unknown_argument() {
        let (_dir, store) = store();
        let toolkit = CalendarToolkit::new(Arc::new(store));
        let err = toolkit
            .call(ToolCall::new(
                "manage_calendar",
                json!({"action": "view", "bogus": true}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_toolkit_batch_edit() {
        let (_dir, store) = store();
        let toolkit = CalendarToolkit::new(Arc::new(store));
        let result = toolkit
            .call(ToolCall::new(
                "manage_calendar",
                json!({"action": "batch_edit", "edits": [
                    {"event_id": "TRUCK123", "delay_hours": 3},
                    {"event_id": "PROD456", "delay_hours": 3}
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(result["updates_applied"], 2);
    }
}
