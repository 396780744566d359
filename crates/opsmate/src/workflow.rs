//! Change-approval workflow: detected issues become a proposal, the operator
//! decides, and approved changes are applied as one schedule batch followed
//! by a notification fan-out.
//!
//! Schedule mutations never happen outside `ApprovalCycle::apply`, so every
//! applied change traces back to an explicit approval.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::AgentResult;
use crate::toolkits::calendar::{ScheduleEdit, ScheduleStore};
use crate::toolkits::contacts::ContactDirectory;
use crate::toolkits::email::{EmailMessage, Mailer};
use crate::toolkits::monitor::{EventKind, EventMonitor, IssueSummary, Proposal};

/// A concrete schedule change awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub event_id: String,
    pub delay_hours: i64,
}

/// How the operator answered a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Cancel,
    Modify,
    Explain,
    Unrecognized,
}

impl Decision {
    /// Keyword classification over the operator's free-text reply. Matching
    /// is on whole words so "now" does not read as "no".
    pub fn classify(input: &str) -> Self {
        let lowered = input.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |keywords: &[&str]| keywords.iter().any(|k| words.contains(k));

        if has(&["yes", "approve", "approved", "accept", "proceed", "ok", "okay"])
            || lowered.contains("go ahead")
            || lowered.contains("do it")
        {
            Decision::Approve
        } else if has(&["no", "cancel", "reject", "stop"]) {
            Decision::Cancel
        } else if has(&["modify", "change", "adjust", "different"]) {
            Decision::Modify
        } else if has(&["explain", "why", "details"]) {
            Decision::Explain
        } else {
            Decision::Unrecognized
        }
    }
}

/// Parse a modify amendment like "TRUCK123 5": the event to move and its
/// new delay in hours. Anything but exactly two tokens is rejected.
pub fn parse_modify(input: &str) -> Option<(String, i64)> {
    let mut parts = input.split_whitespace();
    let event_id = parts.next()?.to_string();
    let hours: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((event_id, hours))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    AwaitingDecision,
    Approved,
    ModifyRequested,
    Cancelled,
    Applied,
    ApplyFailed,
}

/// Outcome of applying an approved proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub updates_applied: usize,
    pub notifications_sent: usize,
}

/// One detected issue with its canned remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIssue {
    pub summary: IssueSummary,
    pub proposal: Proposal,
}

/// A pending proposal cycle: detected issues, the changes derived from them,
/// the affected teams, and where the operator's decision stands.
pub struct ApprovalCycle {
    issues: Vec<DetectedIssue>,
    changes: Vec<Change>,
    affected_teams: Vec<String>,
    state: ApprovalState,
}

impl ApprovalCycle {
    /// Scan the monitor and build a proposal from every open issue that
    /// warrants approval. Returns None when nothing needs attention.
    pub fn propose(monitor: &EventMonitor) -> Option<Self> {
        let mut issues = Vec::new();
        let mut changes = Vec::new();
        let mut affected_teams: Vec<String> = Vec::new();

        for summary in monitor.check_all() {
            let proposal = monitor.propose_solution(&summary.id);
            if !proposal.requires_approval {
                continue;
            }

            // Logistics issues move a concrete schedule entry; the rest are
            // advisory actions with no calendar counterpart.
            if summary.kind == EventKind::Logistics {
                changes.push(Change {
                    event_id: summary.id.clone(),
                    delay_hours: summary.delay_hours.unwrap_or(3),
                });
            }

            for team in &summary.impact {
                if !affected_teams.contains(team) {
                    affected_teams.push(team.clone());
                }
            }

            issues.push(DetectedIssue { summary, proposal });
        }

        if issues.is_empty() {
            return None;
        }

        Some(Self {
            issues,
            changes,
            affected_teams,
            state: ApprovalState::AwaitingDecision,
        })
    }

    pub fn state(&self) -> ApprovalState {
        self.state
    }

    pub fn issues(&self) -> &[DetectedIssue] {
        &self.issues
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn affected_teams(&self) -> &[String] {
        &self.affected_teams
    }

    /// Replace the pending change for an event, added as a new entry; the
    /// later entry wins when changes are applied.
    pub fn modify_change(&mut self, event_id: impl Into<String>, delay_hours: i64) {
        self.changes.push(Change {
            event_id: event_id.into(),
            delay_hours,
        });
        self.state = ApprovalState::AwaitingDecision;
    }

    /// Record the operator's reply. Explain and Unrecognized leave the cycle
    /// waiting; the caller decides what to print back.
    pub fn decide(&mut self, input: &str) -> Decision {
        let decision = Decision::classify(input);
        match decision {
            Decision::Approve => self.state = ApprovalState::Approved,
            Decision::Cancel => self.state = ApprovalState::Cancelled,
            Decision::Modify => self.state = ApprovalState::ModifyRequested,
            Decision::Explain | Decision::Unrecognized => {}
        }
        decision
    }

    /// The situation report shown to the operator before they decide
    pub fn summary(&self) -> String {
        let mut out = String::from("=== CURRENT SITUATION ===\n");
        out.push_str(&format!(
            "{} issue(s) need attention.\n",
            self.issues.len()
        ));

        out.push_str("\n=== DETECTED ISSUES ===\n");
        for issue in &self.issues {
            out.push_str(&format!(
                "- [{}] {}\n",
                issue.summary.id, issue.summary.details
            ));
            for action in &issue.proposal.proposed_actions {
                out.push_str(&format!("  * {}\n", action));
            }
        }

        out.push_str("\n=== PROPOSED CHANGES ===\n");
        if self.changes.is_empty() {
            out.push_str("- No schedule changes required.\n");
        }
        for change in &self.changes {
            out.push_str(&format!(
                "- Delay {} by {} hour(s)\n",
                change.event_id, change.delay_hours
            ));
        }

        out.push_str("\n=== NOTIFICATION PLAN ===\n");
        for team in &self.affected_teams {
            out.push_str(&format!("- {}\n", team));
        }

        out.push_str("\nApprove these changes? (yes / no / modify / explain)\n");
        out
    }

    /// Longer-form rationale for an "explain" reply
    pub fn explanation(&self) -> String {
        let mut out = String::from(
            "These changes keep downstream operations aligned with the delays we detected:\n",
        );
        for issue in &self.issues {
            out.push_str(&format!(
                "- {} is {} ({}); affected: {}\n",
                issue.summary.id,
                issue.summary.status,
                issue.summary.details,
                issue.summary.impact.join(", ")
            ));
        }
        out
    }

    /// Collapse pending changes to one edit per event. First-seen order is
    /// kept; the most recent delay for an event wins.
    fn deduplicated_edits(&self) -> Vec<ScheduleEdit> {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, i64> = HashMap::new();
        for change in &self.changes {
            if !latest.contains_key(change.event_id.as_str()) {
                order.push(&change.event_id);
            }
            latest.insert(&change.event_id, change.delay_hours);
        }
        order
            .into_iter()
            .map(|event_id| ScheduleEdit {
                event_id: event_id.to_string(),
                delay_hours: latest[event_id],
            })
            .collect()
    }

    /// Apply an approved proposal: one batched schedule write, then one
    /// notification per contact email across the affected teams.
    pub async fn apply(
        &mut self,
        store: &ScheduleStore,
        contacts: &ContactDirectory,
        mailer: &dyn Mailer,
    ) -> AgentResult<ApplyReport> {
        let edits = self.deduplicated_edits();
        let updates_applied = match store.batch_edit(&edits) {
            Ok(applied) => applied,
            Err(err) => {
                self.state = ApprovalState::ApplyFailed;
                return Err(err);
            }
        };
        tracing::info!(updates_applied, "schedule changes applied");

        let mut notifications_sent = 0;
        for contact in contacts.all_affected_contacts(&self.affected_teams) {
            for email in &contact.emails {
                let message = EmailMessage {
                    recipient: email.clone(),
                    subject: "Schedule change applied".to_string(),
                    body: self.notification_body(&contact.name),
                };
                match mailer.send(&message).await {
                    Ok(()) => notifications_sent += 1,
                    Err(err) => {
                        tracing::warn!(recipient = %email, error = %err, "notification failed");
                    }
                }
            }
        }

        self.state = ApprovalState::Applied;
        Ok(ApplyReport {
            updates_applied,
            notifications_sent,
        })
    }

    fn notification_body(&self, name: &str) -> String {
        let mut body = format!("Hello {},\n\nThe following schedule changes were applied:\n", name);
        for edit in self.deduplicated_edits() {
            body.push_str(&format!(
                "- {} delayed by {} hour(s)\n",
                edit.event_id, edit.delay_hours
            ));
        }
        body.push_str("\nReason:\n");
        for issue in &self.issues {
            body.push_str(&format!("- {}\n", issue.summary.details));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolkits::email::Outbox;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_classify_decisions() {
        assert_eq!(Decision::classify("Yes, please proceed"), Decision::Approve);
        assert_eq!(Decision::classify("go ahead"), Decision::Approve);
        assert_eq!(Decision::classify("no, cancel that"), Decision::Cancel);
        assert_eq!(Decision::classify("can you adjust the delay"), Decision::Modify);
        assert_eq!(Decision::classify("explain"), Decision::Explain);
        assert_eq!(Decision::classify("purple monkey"), Decision::Unrecognized);
    }

    #[test]
    fn test_classify_matches_whole_words_only() {
        // "now" must not match the cancel keyword "no"
        assert_eq!(Decision::classify("now what"), Decision::Unrecognized);
        assert_eq!(Decision::classify("notebook"), Decision::Unrecognized);
    }

    #[test]
    fn test_parse_modify() {
        assert_eq!(parse_modify("TRUCK123 5"), Some(("TRUCK123".to_string(), 5)));
        assert_eq!(parse_modify(" PROD456  -2 "), Some(("PROD456".to_string(), -2)));
        assert_eq!(parse_modify("TRUCK123"), None);
        assert_eq!(parse_modify("TRUCK123 five"), None);
        assert_eq!(parse_modify("TRUCK123 5 extra"), None);
    }

    #[test]
    fn test_propose_from_synthetic_events() {
        let cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();

        assert_eq!(cycle.issues().len(), 2);
        assert_eq!(
            cycle.changes(),
            &[Change {
                event_id: "TRUCK123".to_string(),
                delay_hours: 3,
            }]
        );
        assert_eq!(
            cycle.affected_teams(),
            &[
                "Factory_X_Production".to_string(),
                "Customer_Delivery_A".to_string(),
                "Customer_Delivery_B".to_string(),
                "Inventory_Level_C".to_string(),
            ]
        );
        assert_eq!(cycle.state(), ApprovalState::AwaitingDecision);
    }

    #[test]
    fn test_propose_with_no_open_issues() {
        let monitor = EventMonitor::from_table(Default::default());
        assert!(ApprovalCycle::propose(&monitor).is_none());
    }

    #[test]
    fn test_summary_sections() {
        let cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        let summary = cycle.summary();

        assert!(summary.contains("=== CURRENT SITUATION ==="));
        assert!(summary.contains("=== DETECTED ISSUES ==="));
        assert!(summary.contains("=== PROPOSED CHANGES ==="));
        assert!(summary.contains("=== NOTIFICATION PLAN ==="));
        assert!(summary.contains("Delay TRUCK123 by 3 hour(s)"));
        assert!(summary.contains("- Factory_X_Production"));
    }

    #[test]
    fn test_decision_drives_state() {
        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();

        assert_eq!(cycle.decide("explain"), Decision::Explain);
        assert_eq!(cycle.state(), ApprovalState::AwaitingDecision);

        assert_eq!(cycle.decide("purple monkey"), Decision::Unrecognized);
        assert_eq!(cycle.state(), ApprovalState::AwaitingDecision);

        assert_eq!(cycle.decide("yes"), Decision::Approve);
        assert_eq!(cycle.state(), ApprovalState::Approved);
    }

    #[test]
    fn test_cancel_closes_the_cycle() {
        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        cycle.decide("no");
        assert_eq!(cycle.state(), ApprovalState::Cancelled);
    }

    #[test]
    fn test_duplicate_changes_last_write_wins() {
        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        cycle.modify_change("TRUCK123", 5);
        cycle.modify_change("SHIP002", 1);

        let edits = cycle.deduplicated_edits();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].event_id, "TRUCK123");
        assert_eq!(edits[0].delay_hours, 5);
        assert_eq!(edits[1].event_id, "SHIP002");
    }

    #[tokio::test]
    async fn test_apply_batches_edits_and_notifies_once_per_email() {
        let dir = TempDir::new().unwrap();
        let store = ScheduleStore::seeded(dir.path().join("schedule.json")).unwrap();
        let contacts = ContactDirectory::default();
        let outbox = Arc::new(Outbox::new());

        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        cycle.decide("approve");
        let report = cycle.apply(&store, &contacts, outbox.as_ref()).await.unwrap();

        assert_eq!(report.updates_applied, 1);
        assert_eq!(cycle.state(), ApprovalState::Applied);

        // Factory_X_Production has two contacts; Customer_Delivery_A and _B
        // both resolve to the same department and must collapse to one mail;
        // Inventory_Level_C has no roster entry.
        let sent = outbox.sent();
        assert_eq!(report.notifications_sent, 3);
        assert_eq!(sent.len(), 3);
        let recipients: Vec<&str> = sent.iter().map(|m| m.recipient.as_str()).collect();
        assert_eq!(
            recipients,
            vec![
                "production.manager@example.com",
                "line.supervisor@example.com",
                "delivery@example.com",
            ]
        );
        assert!(sent[0].body.contains("TRUCK123 delayed by 3 hour(s)"));
    }

    #[tokio::test]
    async fn test_apply_failure_is_terminal_and_skips_notifications() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedule.json");
        let store = ScheduleStore::seeded(&path).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let outbox = Arc::new(Outbox::new());
        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        cycle.decide("yes");

        let result = cycle
            .apply(&store, &ContactDirectory::default(), outbox.as_ref())
            .await;
        assert!(result.is_err());
        assert_eq!(cycle.state(), ApprovalState::ApplyFailed);
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn test_apply_shifts_the_schedule() {
        let dir = TempDir::new().unwrap();
        let store = ScheduleStore::seeded(dir.path().join("schedule.json")).unwrap();
        let before = store.entry("TRUCK123").unwrap();

        let mut cycle = ApprovalCycle::propose(&EventMonitor::synthetic()).unwrap();
        cycle.decide("yes");
        cycle
            .apply(&store, &ContactDirectory::default(), &Outbox::new())
            .await
            .unwrap();

        let after = store.entry("TRUCK123").unwrap();
        assert_eq!(after.start - before.start, chrono::Duration::hours(3));
    }
}
