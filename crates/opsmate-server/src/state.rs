use std::path::PathBuf;
use std::sync::Arc;

use opsmate::agent::Agent;
use opsmate::errors::ProviderError;
use opsmate::providers::configs::ProviderConfig;
use opsmate::providers::factory;
use opsmate::toolkits::calendar::{CalendarToolkit, ScheduleStore};
use opsmate::toolkits::contacts::{ContactDirectory, ContactsToolkit};
use opsmate::toolkits::email::{EmailToolkit, Mailer, Outbox};
use opsmate::toolkits::monitor::{EventMonitor, MonitorToolkit};
use opsmate::workflow::ApprovalCycle;

use crate::configuration::Settings;

/// Shared application state. Connections get their own agent; the stores
/// point at shared files so every session sees the same operational data.
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
    pub events_path: Option<PathBuf>,
    pub schedule_path: PathBuf,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            provider_config: settings.provider.into_config(),
            events_path: settings.files.events,
            schedule_path: settings.files.schedule,
            mailer: Arc::new(Outbox::new()),
        }
    }

    /// Monitor over the configured event file, or the synthetic table when
    /// no file is configured
    pub fn monitor(&self) -> Arc<EventMonitor> {
        Arc::new(match &self.events_path {
            Some(path) => EventMonitor::from_file(path.clone()),
            None => EventMonitor::synthetic(),
        })
    }

    pub fn schedule(&self) -> Arc<ScheduleStore> {
        Arc::new(ScheduleStore::new(self.schedule_path.clone()))
    }

    pub fn contacts(&self) -> Arc<ContactDirectory> {
        Arc::new(ContactDirectory::default())
    }

    /// A fresh agent wired to all four toolkits
    pub fn build_agent(&self) -> Result<Agent, ProviderError> {
        let provider = factory::get_provider(self.provider_config.clone())?;
        let mut agent = Agent::new("opsmate", provider);
        agent.add_toolkit(Box::new(MonitorToolkit::new(self.monitor())));
        agent.add_toolkit(Box::new(CalendarToolkit::new(self.schedule())));
        agent.add_toolkit(Box::new(ContactsToolkit::new(self.contacts())));
        agent.add_toolkit(Box::new(EmailToolkit::new(self.mailer.clone())));
        Ok(agent)
    }

    /// The situation report shown when a session starts: either the pending
    /// proposal or an all-clear, followed by the schedule.
    pub fn startup_message(&self) -> String {
        let mut message = match ApprovalCycle::propose(&self.monitor()) {
            Some(cycle) => cycle.summary(),
            None => "All operations are on track. No issues detected.\n".to_string(),
        };
        message.push('\n');
        message.push_str(&self.schedule().view());
        message
    }
}
