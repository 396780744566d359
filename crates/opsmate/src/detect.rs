//! Route-based delay detection for in-transit shipments.
//!
//! Compares the time a vehicle has spent traveling against the planned route
//! duration and the live remaining ETA from a routing service, and publishes
//! delayed shipments into the event file the monitor reads.

use chrono::Duration;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::toolkits::monitor::{Event, EventKind, EventStatus};

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("route request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("route service returned status {0}")]
    Status(u16),

    #[error("malformed route response")]
    MalformedResponse,

    #[error("could not write event file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Longitude/latitude pair, in the order routing services expect
pub type Coordinates = [f64; 2];

/// Render a duration as "Xh Ym Zs". Negative durations clamp to zero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

/// Snapshot of one trip: the planned route duration, the live remaining
/// ETA from the current position, and the time spent traveling so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayAssessment {
    pub planned_eta: Duration,
    pub current_eta: Duration,
    pub time_spent: Duration,
}

impl DelayAssessment {
    pub fn new(planned_eta: Duration, current_eta: Duration, time_spent: Duration) -> Self {
        Self {
            planned_eta,
            current_eta,
            time_spent,
        }
    }

    /// Deviation from the planned schedule at the current position: time
    /// spent minus the planned travel time to that position.
    pub fn planned_delay(&self) -> Duration {
        self.time_spent - (self.planned_eta - self.current_eta)
    }

    /// Deviation of the projected arrival from the planned arrival
    pub fn real_time_delay(&self) -> Duration {
        self.time_spent + self.current_eta - self.planned_eta
    }

    pub fn is_delayed(&self) -> bool {
        self.real_time_delay() > Duration::zero()
    }

    /// Projected delay rounded up to whole hours, for schedule edits
    pub fn delay_hours(&self) -> i64 {
        let seconds = self.real_time_delay().num_seconds().max(0);
        (seconds + 3599) / 3600
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Planned ETA: {}\n", format_duration(self.planned_eta)));
        out.push_str(&format!("Current ETA: {}\n", format_duration(self.current_eta)));
        out.push_str(&format!(
            "Time Spent Traveling: {}\n",
            format_duration(self.time_spent)
        ));
        if self.is_delayed() {
            out.push_str(&format!(
                "Real-Time Delay: {} behind schedule.\n",
                format_duration(self.real_time_delay())
            ));
        } else {
            out.push_str("On track with no real-time delay.\n");
        }
        out
    }
}

/// Client for an OpenRouteService-compatible directions endpoint
pub struct EtaClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl EtaClient {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    /// Route duration between two points
    pub async fn eta(&self, start: Coordinates, end: Coordinates) -> Result<Duration, DetectError> {
        let url = format!("{}/v2/directions/driving-car", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&json!({
                "coordinates": [start, end],
                "units": "m",
                "instructions": false
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let seconds = body["routes"][0]["summary"]["duration"]
            .as_f64()
            .ok_or(DetectError::MalformedResponse)?;
        Ok(Duration::seconds(seconds as i64))
    }

    /// Assess a trip in progress: planned route from origin to destination,
    /// live route from the current position.
    pub async fn assess(
        &self,
        origin: Coordinates,
        position: Coordinates,
        destination: Coordinates,
        time_spent: Duration,
    ) -> Result<DelayAssessment, DetectError> {
        let planned_eta = self.eta(origin, destination).await?;
        let current_eta = self.eta(position, destination).await?;
        Ok(DelayAssessment::new(planned_eta, current_eta, time_spent))
    }
}

/// Publish an assessment into the event file the monitor reads. Delayed
/// trips become open logistics events; on-track trips are recorded too so a
/// recovered shipment clears its earlier status.
pub fn record_assessment(
    path: impl AsRef<Path>,
    event_id: &str,
    location: &str,
    impact: Vec<String>,
    assessment: &DelayAssessment,
) -> Result<(), DetectError> {
    let path = path.as_ref();
    let mut events: BTreeMap<String, Event> = std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let status = if assessment.is_delayed() {
        EventStatus::Delayed
    } else {
        EventStatus::OnTrack
    };
    tracing::info!(event_id, %status, "recording delay assessment");

    events.insert(
        event_id.to_string(),
        Event {
            kind: EventKind::Logistics,
            status,
            location: location.to_string(),
            impact,
            details: Some(assessment.report()),
            delay_hours: assessment.is_delayed().then(|| assessment.delay_hours()),
        },
    );

    std::fs::write(path, serde_json::to_string_pretty(&events)?)?;
    Ok(())
}
