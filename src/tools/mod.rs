//! Tool adapters and dispatch.
//!
//! One submodule per service. Adapters differ only in their credential,
//! target coordinates, and operations; every operation passes through the
//! adapter's initialization gate. The [`Toolbox`] maps MCP tool names onto
//! adapter operations and owns the tool declarations.

pub mod calendar;
pub mod documents;
pub mod playback;
pub mod weather;

use std::{borrow::Cow, sync::Arc};

use rmcp::model::Tool;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    config::AppConfig,
    error::{ToolError, ToolResult},
    secrets::SecretResolver,
};

pub use calendar::CalendarAdapter;
pub use documents::DocumentsAdapter;
pub use playback::PlaybackAdapter;
pub use weather::WeatherAdapter;

/// The set of registered tool adapters.
///
/// Unconfigured adapters are simply absent: their tools are not declared and
/// dispatching to them reports an unknown tool.
#[derive(Default)]
pub struct Toolbox {
    documents: Option<DocumentsAdapter>,
    calendar: Option<CalendarAdapter>,
    weather: Option<WeatherAdapter>,
    playback: Option<PlaybackAdapter>,
}

#[derive(Deserialize)]
struct GetDocumentArgs {
    doc_id: String,
}

#[derive(Deserialize)]
struct CurrentConditionsArgs {
    location: String,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AppConfig, resolver: Arc<dyn SecretResolver>) -> Self {
        let mut toolbox = Self::new();
        if let Some(documents) = &config.documents {
            toolbox.documents = Some(DocumentsAdapter::new(documents, Arc::clone(&resolver)));
        }
        if let Some(calendar) = &config.calendar {
            toolbox.calendar = Some(CalendarAdapter::new(calendar, Arc::clone(&resolver)));
        }
        if let Some(weather) = &config.weather {
            toolbox.weather = Some(WeatherAdapter::new(weather, Arc::clone(&resolver)));
        }
        if let Some(playback) = &config.playback {
            toolbox.playback = Some(PlaybackAdapter::new(playback));
        }
        toolbox
    }

    pub fn with_documents(mut self, adapter: DocumentsAdapter) -> Self {
        self.documents = Some(adapter);
        self
    }

    pub fn with_calendar(mut self, adapter: CalendarAdapter) -> Self {
        self.calendar = Some(adapter);
        self
    }

    pub fn with_weather(mut self, adapter: WeatherAdapter) -> Self {
        self.weather = Some(adapter);
        self
    }

    pub fn with_playback(mut self, adapter: PlaybackAdapter) -> Self {
        self.playback = Some(adapter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_none()
            && self.calendar.is_none()
            && self.weather.is_none()
            && self.playback.is_none()
    }

    /// Tool declarations for the registered adapters.
    pub fn declarations(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        if self.documents.is_some() {
            tools.push(declare(
                "get_document_by_id",
                "Fetch a document by id from the configured document store.",
                json!({
                    "type": "object",
                    "properties": {
                        "doc_id": {"type": "string", "description": "Document id"},
                    },
                    "required": ["doc_id"],
                }),
            ));
            tools.push(declare(
                "get_container_info",
                "Describe the configured document container.",
                empty_schema(),
            ));
        }
        if self.calendar.is_some() {
            tools.push(declare(
                "list_events",
                "List calendar events between two instants.",
                json!({
                    "type": "object",
                    "properties": {
                        "start": {"type": "string", "format": "date-time"},
                        "end": {"type": "string", "format": "date-time"},
                    },
                    "required": ["start", "end"],
                }),
            ));
            tools.push(declare(
                "create_event",
                "Create a calendar event.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "start": {"type": "string", "format": "date-time"},
                        "end": {"type": "string", "format": "date-time"},
                        "duration_minutes": {
                            "type": "integer",
                            "description": "Used when no end is given; defaults to 60",
                        },
                        "attendees": {"type": "array", "items": {"type": "string"}},
                        "add_conference": {"type": "boolean"},
                    },
                    "required": ["title", "start"],
                }),
            ));
        }
        if self.weather.is_some() {
            tools.push(declare(
                "current_conditions",
                "Current weather conditions for a location.",
                json!({
                    "type": "object",
                    "properties": {
                        "location": {"type": "string", "description": "City name"},
                    },
                    "required": ["location"],
                }),
            ));
        }
        if self.playback.is_some() {
            tools.push(declare(
                "play",
                "Play or resume the current track.",
                empty_schema(),
            ));
            tools.push(declare("pause", "Pause the current track.", empty_schema()));
            tools.push(declare(
                "next_track",
                "Skip to the next track.",
                empty_schema(),
            ));
            tools.push(declare(
                "previous_track",
                "Return to the previous track.",
                empty_schema(),
            ));
        }
        tools
    }

    /// Dispatch a named operation with its argument map.
    pub async fn dispatch(&self, name: &str, args: Map<String, Value>) -> ToolResult<Value> {
        match name {
            "get_document_by_id" => {
                let args: GetDocumentArgs = parse_args(name, args)?;
                let payload = self
                    .documents()?
                    .get_document_by_id(&args.doc_id)
                    .await?;
                to_payload(payload)
            }
            "get_container_info" => {
                let info = self.documents()?.container_info().await?;
                to_payload(info)
            }
            "list_events" => {
                let window = parse_args(name, args)?;
                let events = self.calendar()?.list_events(window).await?;
                Ok(json!({ "events": events }))
            }
            "create_event" => {
                let event = parse_args(name, args)?;
                let created = self.calendar()?.create_event(event).await?;
                to_payload(created)
            }
            "current_conditions" => {
                let args: CurrentConditionsArgs = parse_args(name, args)?;
                let report = self
                    .weather()?
                    .current_conditions(&args.location)
                    .await?;
                to_payload(report)
            }
            "play" => to_payload(self.playback()?.play().await?),
            "pause" => to_payload(self.playback()?.pause().await?),
            "next_track" => to_payload(self.playback()?.next_track().await?),
            "previous_track" => to_payload(self.playback()?.previous_track().await?),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    fn documents(&self) -> ToolResult<&DocumentsAdapter> {
        self.documents
            .as_ref()
            .ok_or_else(|| ToolError::UnknownTool("documents tools are not configured".to_string()))
    }

    fn calendar(&self) -> ToolResult<&CalendarAdapter> {
        self.calendar
            .as_ref()
            .ok_or_else(|| ToolError::UnknownTool("calendar tools are not configured".to_string()))
    }

    fn weather(&self) -> ToolResult<&WeatherAdapter> {
        self.weather
            .as_ref()
            .ok_or_else(|| ToolError::UnknownTool("weather tools are not configured".to_string()))
    }

    fn playback(&self) -> ToolResult<&PlaybackAdapter> {
        self.playback
            .as_ref()
            .ok_or_else(|| ToolError::UnknownTool("playback tools are not configured".to_string()))
    }
}

fn declare(name: &'static str, description: &'static str, input_schema: Value) -> Tool {
    let schema = match input_schema {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Map<String, Value>) -> ToolResult<T> {
    serde_json::from_value(Value::Object(args))
        .map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

fn to_payload<T: serde::Serialize>(value: T) -> ToolResult<Value> {
    serde_json::to_value(value).map_err(|e| ToolError::Backend(format!("encode payload: {e}")))
}
