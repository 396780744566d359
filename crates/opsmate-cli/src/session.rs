//! Interactive terminal session: the startup situation report, the approval
//! loop for pending proposals, then a free-form command REPL.

use anyhow::Result;
use cliclack::{input, spinner};
use console::style;
use std::sync::Arc;

use opsmate::agent::Agent;
use opsmate::toolkits::calendar::ScheduleStore;
use opsmate::toolkits::contacts::ContactDirectory;
use opsmate::toolkits::email::Mailer;
use opsmate::toolkits::monitor::EventMonitor;
use opsmate::workflow::{parse_modify, ApprovalCycle, Decision};

pub struct CliSession {
    agent: Agent,
    monitor: Arc<EventMonitor>,
    schedule: Arc<ScheduleStore>,
    contacts: Arc<ContactDirectory>,
    mailer: Arc<dyn Mailer>,
}

impl CliSession {
    pub fn new(
        agent: Agent,
        monitor: Arc<EventMonitor>,
        schedule: Arc<ScheduleStore>,
        contacts: Arc<ContactDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            agent,
            monitor,
            schedule,
            contacts,
            mailer,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!(
            "opsmate {}",
            style("- type \"exit\" to end the session").dim()
        );
        println!();
        println!("{}", self.schedule.view());

        if let Some(mut cycle) = ApprovalCycle::propose(&self.monitor) {
            self.approval_loop(&mut cycle).await?;
        } else {
            println!("All operations are on track. No issues detected.");
        }

        loop {
            let text: String = input("Message:").placeholder("").interact()?;
            let trimmed = text.trim();
            if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
                break;
            }
            if trimmed.is_empty() {
                continue;
            }

            let spin = spinner();
            spin.start("awaiting reply");
            let reply = self.agent.invoke(trimmed).await;
            spin.stop("");
            println!("{}", reply);
            println!();
        }
        Ok(())
    }

    /// Walk the operator through a pending proposal until they approve,
    /// cancel, or amend it.
    async fn approval_loop(&self, cycle: &mut ApprovalCycle) -> Result<()> {
        println!("{}", cycle.summary());

        loop {
            let answer: String = input("Your decision:").placeholder("yes").interact()?;
            match cycle.decide(&answer) {
                Decision::Approve => {
                    let spin = spinner();
                    spin.start("applying changes");
                    let result = cycle
                        .apply(&self.schedule, &self.contacts, self.mailer.as_ref())
                        .await;
                    spin.stop("");
                    match result {
                        Ok(report) => {
                            println!(
                                "{} {} schedule update(s) applied, {} notification(s) sent.",
                                style("Done.").green(),
                                report.updates_applied,
                                report.notifications_sent
                            );
                        }
                        Err(err) => {
                            println!("{} {}", style("Failed to apply changes:").red(), err);
                        }
                    }
                    return Ok(());
                }
                Decision::Cancel => {
                    println!("Understood. No changes were applied.");
                    return Ok(());
                }
                Decision::Modify => {
                    let edit: String = input("Which event and new delay (e.g. \"TRUCK123 5\"):")
                        .placeholder("")
                        .interact()?;
                    match parse_modify(&edit) {
                        Some((event_id, hours)) => {
                            cycle.modify_change(event_id, hours);
                            println!("{}", cycle.summary());
                        }
                        None => {
                            println!("Could not read that. Reply like \"TRUCK123 5\".");
                        }
                    }
                }
                Decision::Explain => {
                    println!("{}", cycle.explanation());
                }
                Decision::Unrecognized => {
                    println!("Reply yes, no, modify, or explain.");
                }
            }
        }
    }
}
