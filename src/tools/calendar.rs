//! Calendar event listing and creation over a remote calendar service.
//!
//! The service token lives in the secret store. Event payloads are a thin
//! pass-through: times go in as RFC3339 instants and come back as the
//! service formatted them.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    config::CalendarConfig,
    error::{ConnectError, ToolError, ToolResult},
    gate::{ConnectionFactory, GateStatus, InitGate},
    secrets::{SecretResolver, SecretValue},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub description: String,
    pub event_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub add_conference: bool,
}

fn default_duration_minutes() -> i64 {
    60
}

impl NewEvent {
    /// Explicit end wins; otherwise the duration is applied to the start.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end
            .unwrap_or(self.start + chrono::Duration::minutes(self.duration_minutes))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreatedEvent {
    pub event_id: String,
    pub event_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Native operations of a connected calendar service.
#[async_trait]
pub trait CalendarApi: Send + Sync + 'static {
    async fn list_events(&self, window: &EventWindow) -> ToolResult<Vec<EventSummary>>;

    async fn create_event(&self, event: &NewEvent) -> ToolResult<CreatedEvent>;
}

/// HTTP calendar handle.
pub struct HttpCalendar {
    http: reqwest::Client,
    endpoint: String,
    calendar_id: String,
}

impl HttpCalendar {
    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.endpoint.trim_end_matches('/'),
            self.calendar_id
        )
    }

    fn calendar_url(&self) -> String {
        format!(
            "{}/calendars/{}",
            self.endpoint.trim_end_matches('/'),
            self.calendar_id
        )
    }
}

#[async_trait]
impl CalendarApi for HttpCalendar {
    async fn list_events(&self, window: &EventWindow) -> ToolResult<Vec<EventSummary>> {
        let response = self
            .http
            .get(self.events_url())
            .query(&[
                ("timeMin", window.start.to_rfc3339()),
                ("timeMax", window.end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("list events: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "calendar service returned {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("events body: {e}")))?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items.iter().map(event_summary_from_value).collect())
    }

    async fn create_event(&self, event: &NewEvent) -> ToolResult<CreatedEvent> {
        let mut body = json!({
            "summary": event.title,
            "description": event.description,
            "start": {"dateTime": event.start.to_rfc3339()},
            "end": {"dateTime": event.end_time().to_rfc3339()},
        });
        if !event.attendees.is_empty() {
            body["attendees"] = event
                .attendees
                .iter()
                .map(|email| json!({"email": email}))
                .collect();
        }
        if event.add_conference {
            body["conferenceData"] = json!({
                "createRequest": {
                    "requestId": format!("{}-{}", event.title, event.start.timestamp()),
                }
            });
        }

        let response = self
            .http
            .post(self.events_url())
            .query(&[("conferenceDataVersion", if event.add_conference { "1" } else { "0" })])
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Backend(format!("create event: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "calendar service returned {}",
                response.status()
            )));
        }
        let created: Value = response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("created event body: {e}")))?;
        Ok(CreatedEvent {
            event_id: text_field(&created, "id"),
            event_link: text_field(&created, "htmlLink"),
            conference_link: conference_link(&created),
        })
    }
}

pub(crate) fn event_summary_from_value(item: &Value) -> EventSummary {
    EventSummary {
        title: item
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("No title")
            .to_string(),
        start_time: nested_time(item, "start"),
        end_time: nested_time(item, "end"),
        description: text_field(item, "description"),
        event_link: text_field(item, "htmlLink"),
        conference_link: conference_link(item),
    }
}

/// All-day events carry `date` instead of `dateTime`.
fn nested_time(item: &Value, key: &str) -> String {
    let slot = item.get(key);
    slot.and_then(|v| v.get("dateTime"))
        .or_else(|| slot.and_then(|v| v.get("date")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn text_field(item: &Value, key: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn conference_link(item: &Value) -> Option<String> {
    item.get("conferenceData")
        .and_then(|c| c.get("entryPoints"))
        .and_then(Value::as_array)
        .and_then(|points| points.first())
        .and_then(|p| p.get("uri"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Builds an [`HttpCalendar`] from a resolved service token.
pub struct CalendarFactory {
    endpoint: String,
    calendar_id: String,
}

impl CalendarFactory {
    pub fn new(endpoint: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            calendar_id: calendar_id.into(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for CalendarFactory {
    type Handle = Arc<dyn CalendarApi>;

    async fn build(&self, secret: &SecretValue) -> Result<Self::Handle, ConnectError> {
        let token = secret.expose().trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(ConnectError::MalformedSecret(
                "calendar token must be a single non-empty token".to_string(),
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}").parse().map_err(|e| {
                ConnectError::MalformedSecret(format!("token is not header-safe: {e}"))
            })?,
        );
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectError::ConnectionRefused(format!("build http client: {e}")))?;

        let calendar = HttpCalendar {
            http,
            endpoint: self.endpoint.clone(),
            calendar_id: self.calendar_id.clone(),
        };

        // Handshake: read the calendar metadata before serving operations.
        let response = calendar
            .http
            .get(calendar.calendar_url())
            .send()
            .await
            .map_err(|e| ConnectError::ConnectionRefused(format!("calendar handshake: {e}")))?;
        if !response.status().is_success() {
            return Err(ConnectError::ConnectionRefused(format!(
                "calendar service returned {}",
                response.status()
            )));
        }

        debug!(calendar = %calendar.calendar_id, "calendar service connected");
        Ok(Arc::new(calendar))
    }
}

/// Calendar tool; every operation passes through the gate.
pub struct CalendarAdapter {
    gate: InitGate<Arc<dyn CalendarApi>>,
}

impl CalendarAdapter {
    pub fn new(config: &CalendarConfig, resolver: Arc<dyn SecretResolver>) -> Self {
        let factory = CalendarFactory::new(&config.endpoint, &config.calendar_id);
        Self {
            gate: InitGate::provisioned("calendar", resolver, factory, config.credential.clone()),
        }
    }

    /// Adapter over an arbitrary factory; used by tests to inject mocks.
    pub fn with_factory<F>(
        resolver: Arc<dyn SecretResolver>,
        factory: F,
        credential: crate::config::CredentialSpec,
    ) -> Self
    where
        F: ConnectionFactory<Handle = Arc<dyn CalendarApi>>,
    {
        Self {
            gate: InitGate::provisioned("calendar", resolver, factory, credential),
        }
    }

    pub fn status(&self) -> GateStatus {
        self.gate.status()
    }

    pub async fn list_events(&self, window: EventWindow) -> ToolResult<Vec<EventSummary>> {
        if window.end <= window.start {
            return Err(ToolError::InvalidArguments(
                "end must be after start".to_string(),
            ));
        }
        let calendar = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        calendar.list_events(&window).await
    }

    pub async fn create_event(&self, event: NewEvent) -> ToolResult<CreatedEvent> {
        if event.title.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "title must not be empty".to_string(),
            ));
        }
        if event.duration_minutes <= 0 {
            return Err(ToolError::InvalidArguments(
                "duration_minutes must be positive".to_string(),
            ));
        }
        if event.end_time() <= event.start {
            return Err(ToolError::InvalidArguments(
                "event must end after it starts".to_string(),
            ));
        }
        let calendar = self
            .gate
            .ensure_ready()
            .await
            .map_err(ToolError::NotInitialized)?;
        calendar.create_event(&event).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn event(start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            title: "Team sync".to_string(),
            description: String::new(),
            start,
            end: None,
            duration_minutes: 60,
            attendees: vec![],
            add_conference: false,
        }
    }

    #[test]
    fn test_end_time_prefers_explicit_end() {
        let start = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        let mut e = event(start);
        assert_eq!(e.end_time(), start + chrono::Duration::minutes(60));

        let explicit = Utc.with_ymd_and_hms(2024, 5, 2, 9, 45, 0).unwrap();
        e.end = Some(explicit);
        assert_eq!(e.end_time(), explicit);
    }

    #[test]
    fn test_event_summary_from_value_maps_fields() {
        let item = serde_json::json!({
            "summary": "Standup",
            "start": {"dateTime": "2024-05-02T09:00:00Z"},
            "end": {"dateTime": "2024-05-02T09:15:00Z"},
            "htmlLink": "https://calendar.example.net/e/1",
            "conferenceData": {"entryPoints": [{"uri": "https://meet.example.net/abc"}]},
        });
        let summary = event_summary_from_value(&item);
        assert_eq!(summary.title, "Standup");
        assert_eq!(summary.start_time, "2024-05-02T09:00:00Z");
        assert_eq!(
            summary.conference_link.as_deref(),
            Some("https://meet.example.net/abc")
        );
    }

    #[test]
    fn test_event_summary_handles_all_day_and_missing_fields() {
        let item = serde_json::json!({
            "start": {"date": "2024-05-02"},
            "end": {"date": "2024-05-03"},
        });
        let summary = event_summary_from_value(&item);
        assert_eq!(summary.title, "No title");
        assert_eq!(summary.start_time, "2024-05-02");
        assert!(summary.conference_link.is_none());
        assert!(summary.event_link.is_empty());
    }
}
