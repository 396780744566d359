mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use opsmate::agent::Agent;
use opsmate::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use opsmate::providers::factory;
use opsmate::toolkits::calendar::{CalendarToolkit, ScheduleStore};
use opsmate::toolkits::contacts::{ContactDirectory, ContactsToolkit};
use opsmate::toolkits::email::{EmailToolkit, Outbox};
use opsmate::toolkits::monitor::{EventMonitor, MonitorToolkit};

use session::CliSession;

#[derive(Parser)]
#[command(author, version, about = "Operations assistant for schedules, shipments, and alerts", long_about = None)]
struct Cli {
    /// OpenAI-compatible API host
    #[arg(long, default_value = "https://api.openai.com")]
    host: String,

    /// API key (can also be set via OPENAI_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long, default_value = "gpt-4o")]
    model: String,

    /// Event file written by the delay detector; omit to use built-in demo events
    #[arg(long)]
    events_file: Option<PathBuf>,

    /// Schedule file
    #[arg(long, default_value = "schedule.json")]
    schedule_file: PathBuf,

    /// Replace the schedule file with the demo schedule before starting
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| env::var("OPENAI_API_KEY").ok())
        .context("API key must be provided via --api-key or OPENAI_API_KEY environment variable")?;

    let provider_config = OpenAiProviderConfig::new(cli.host, api_key, cli.model);
    let provider = factory::get_provider(ProviderConfig::OpenAi(provider_config))?;

    let monitor = Arc::new(match cli.events_file {
        Some(path) => EventMonitor::from_file(path),
        None => EventMonitor::synthetic(),
    });
    let schedule = Arc::new(if cli.seed {
        ScheduleStore::seeded(&cli.schedule_file)?
    } else {
        ScheduleStore::new(&cli.schedule_file)
    });
    let contacts = Arc::new(ContactDirectory::default());
    let mailer = Arc::new(Outbox::new());

    let mut agent = Agent::new("opsmate", provider);
    agent.add_toolkit(Box::new(MonitorToolkit::new(monitor.clone())));
    agent.add_toolkit(Box::new(CalendarToolkit::new(schedule.clone())));
    agent.add_toolkit(Box::new(ContactsToolkit::new(contacts.clone())));
    agent.add_toolkit(Box::new(EmailToolkit::new(mailer.clone())));

    let mut session = CliSession::new(agent, monitor, schedule, contacts, mailer);
    session.run().await
}
