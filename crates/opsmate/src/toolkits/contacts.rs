//! Static department roster and the contacts toolkit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::{parse_args, Toolkit};
use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub role: String,
    pub emails: Vec<String>,
    pub priority: Priority,
}

impl Contact {
    fn new(name: &str, role: &str, email: &str, priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            role: role.to_string(),
            emails: vec![email.to_string()],
            priority,
        }
    }
}

/// Read-only department → contacts mapping, loaded once at process start
pub struct ContactDirectory {
    departments: BTreeMap<String, Vec<Contact>>,
}

impl Default for ContactDirectory {
    fn default() -> Self {
        let mut departments = BTreeMap::new();
        departments.insert(
            "Factory_X_Production".to_string(),
            vec![
                Contact::new(
                    "Bob Smith",
                    "Production Manager",
                    "production.manager@example.com",
                    Priority::High,
                ),
                Contact::new(
                    "Alice Chen",
                    "Line Supervisor",
                    "line.supervisor@example.com",
                    Priority::Medium,
                ),
            ],
        );
        departments.insert(
            "Quality_Control".to_string(),
            vec![Contact::new(
                "David Johnson",
                "QC Manager",
                "qc.manager@example.com",
                Priority::High,
            )],
        );
        departments.insert(
            "Logistics".to_string(),
            vec![Contact::new(
                "Sarah Williams",
                "Logistics Coordinator",
                "logistics@example.com",
                Priority::High,
            )],
        );
        departments.insert(
            "Procurement".to_string(),
            vec![Contact::new(
                "Mike Davis",
                "Procurement Manager",
                "procurement@example.com",
                Priority::High,
            )],
        );
        departments.insert(
            "Customer_Delivery".to_string(),
            vec![Contact::new(
                "Emma Rodriguez",
                "Delivery Manager",
                "delivery@example.com",
                Priority::High,
            )],
        );
        departments.insert(
            "Inventory_Management".to_string(),
            vec![Contact::new(
                "Tom Wilson",
                "Inventory Manager",
                "inventory@example.com",
                Priority::High,
            )],
        );
        Self { departments }
    }
}

impl ContactDirectory {
    pub fn from_table(departments: BTreeMap<String, Vec<Contact>>) -> Self {
        Self { departments }
    }

    pub fn department_contacts(&self, department: &str) -> Vec<Contact> {
        self.departments
            .get(department)
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve an affected-team identifier to a department. Event impact
    /// lists carry suffixed team names ("Customer_Delivery_A") against the
    /// roster's plain keys, so fall back to the longest key the team name
    /// starts with.
    pub fn resolve(&self, team: &str) -> Option<&str> {
        if let Some((key, _)) = self.departments.get_key_value(team) {
            return Some(key.as_str());
        }
        self.departments
            .keys()
            .filter(|key| team.starts_with(key.as_str()))
            .max_by_key(|key| key.len())
            .map(|key| key.as_str())
    }

    pub fn high_priority_contacts(&self, department: &str) -> Vec<Contact> {
        self.department_contacts(department)
            .into_iter()
            .filter(|contact| contact.priority == Priority::High)
            .collect()
    }

    /// All contacts across the given teams, de-duplicated by email address
    pub fn all_affected_contacts(&self, teams: &[String]) -> Vec<Contact> {
        let mut seen = HashSet::new();
        let mut contacts = Vec::new();
        for team in teams {
            let Some(department) = self.resolve(team) else {
                tracing::warn!(team = %team, "no contacts for affected team");
                continue;
            };
            for contact in self.department_contacts(department) {
                let key = contact.emails.first().cloned().unwrap_or_default();
                if seen.insert(key) {
                    contacts.push(contact);
                }
            }
        }
        contacts
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContactArgs {
    contact_name: String,
    #[serde(default)]
    high_priority_only: bool,
}

/// Exposes the roster to the model as a `fetch_contacts` tool
pub struct ContactsToolkit {
    directory: Arc<ContactDirectory>,
    tools: Vec<Tool>,
}

impl ContactsToolkit {
    pub fn new(directory: Arc<ContactDirectory>) -> Self {
        let tools = vec![Tool::new(
            "fetch_contacts",
            "Look up contacts for a team or department",
            json!({
                "type": "object",
                "properties": {
                    "contact_name": {
                        "type": "string",
                        "description": "Team or department name to search for"
                    },
                    "high_priority_only": {
                        "type": "boolean",
                        "description": "Only return high priority contacts"
                    }
                },
                "required": ["contact_name"]
            }),
        )];
        Self { directory, tools }
    }
}

#[async_trait]
impl Toolkit for ContactsToolkit {
    fn name(&self) -> &str {
        "contacts"
    }

    fn description(&self) -> &str {
        "Looks up team and department contacts for coordination and notifications"
    }

    fn instructions(&self) -> &str {
        "Search by the team identifiers reported in impact analyses."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        let args: ContactArgs = parse_args(tool_call.arguments)?;
        let contacts = match self.directory.resolve(&args.contact_name) {
            Some(department) if args.high_priority_only => {
                self.directory.high_priority_contacts(department)
            }
            Some(department) => self.directory.department_contacts(department),
            None => Vec::new(),
        };

        if contacts.is_empty() {
            Ok(json!({
                "error": format!("No contacts found for team/organization: {}", args.contact_name)
            }))
        } else {
            Ok(json!(contacts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exact_and_prefix() {
        let directory = ContactDirectory::default();
        assert_eq!(directory.resolve("Logistics"), Some("Logistics"));
        assert_eq!(
            directory.resolve("Customer_Delivery_A"),
            Some("Customer_Delivery")
        );
        assert_eq!(directory.resolve("Unknown_Team"), None);
    }

    #[test]
    fn test_all_affected_contacts_dedupe_by_email() {
        let mut departments = BTreeMap::new();
        departments.insert(
            "Team_A".to_string(),
            vec![Contact::new("Shared", "Manager", "shared@example.com", Priority::High)],
        );
        departments.insert(
            "Team_B".to_string(),
            vec![
                Contact::new("Shared", "Manager", "shared@example.com", Priority::High),
                Contact::new("Other", "Lead", "other@example.com", Priority::Medium),
            ],
        );
        let directory = ContactDirectory::from_table(departments);

        let contacts = directory
            .all_affected_contacts(&["Team_A".to_string(), "Team_B".to_string()]);
        assert_eq!(contacts.len(), 2);
        let emails: Vec<&str> = contacts
            .iter()
            .map(|c| c.emails[0].as_str())
            .collect();
        assert_eq!(emails, vec!["shared@example.com", "other@example.com"]);
    }

    #[test]
    fn test_high_priority_filter() {
        let directory = ContactDirectory::default();
        let contacts = directory.high_priority_contacts("Factory_X_Production");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "Bob Smith");
    }

    #[tokio::test]
    async fn test_toolkit_unknown_team_returns_error_payload() {
        let toolkit = ContactsToolkit::new(Arc::new(ContactDirectory::default()));
        let result = toolkit
            .call(ToolCall::new(
                "fetch_contacts",
                json!({"contact_name": "Nobody"}),
            ))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Nobody"));
    }
}
