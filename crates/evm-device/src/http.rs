//! HTTP adapter for a REST bridge in front of the controllers.
//!
//! Routes (relative to the configured base URL):
//! - `GET /device/{controller}/event/{index}` -> `{"event": {...}}`, `404` = empty slot
//! - `GET /device/{controller}/event-index` -> `{"event-index": n}`

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use evm_core::{ControllerId, Event};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::{DeviceError, DeviceGateway};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    /// `timeout` bounds each request; an expired request is a [`DeviceError::Timeout`].
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn device_url(&self, controller: ControllerId) -> String {
        format!("{}/device/{}", self.base_url.trim_end_matches('/'), controller)
    }

    async fn get(&self, url: String) -> Result<Option<reqwest::Response>, DeviceError> {
        let resp = self.http.get(url).send().await.map_err(map_reqwest_error)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DeviceError::Api {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        Ok(Some(resp))
    }
}

#[async_trait]
impl DeviceGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get_event(
        &self,
        controller: ControllerId,
        index: u32,
    ) -> Result<Option<Event>, DeviceError> {
        debug!(controller, index, "get-event");

        let url = format!("{}/event/{}", self.device_url(controller), index);
        let Some(resp) = self.get(url).await? else {
            return Ok(None);
        };

        let body: EventEnvelope = resp.json().await.map_err(map_reqwest_error)?;
        match body.event {
            Some(wire) => wire.into_event(controller).map(Some),
            None => Ok(None),
        }
    }

    async fn get_event_index(&self, controller: ControllerId) -> Result<u32, DeviceError> {
        debug!(controller, "get-event-index");

        let url = format!("{}/event-index", self.device_url(controller));
        let resp = self.get(url).await?.ok_or_else(|| DeviceError::Api {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: format!("unknown controller {controller}"),
        })?;

        let body: EventIndexEnvelope = resp.json().await.map_err(map_reqwest_error)?;
        Ok(body.event_index)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DeviceError {
    if e.is_timeout() {
        DeviceError::Timeout
    } else if e.is_decode() {
        DeviceError::Decode(e.to_string())
    } else {
        DeviceError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    event: Option<WireEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct EventIndexEnvelope {
    event_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct WireEvent {
    #[serde(default)]
    device_id: Option<u32>,
    event_id: u32,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    event_type: u8,
    #[serde(default)]
    access_granted: bool,
    #[serde(default)]
    door_id: u8,
    #[serde(default)]
    direction: u8,
    #[serde(default)]
    card_number: u32,
    #[serde(default)]
    event_reason: u8,
}

impl WireEvent {
    fn into_event(self, controller: ControllerId) -> Result<Event, DeviceError> {
        if let Some(id) = self.device_id {
            if id != controller {
                return Err(DeviceError::Decode(format!(
                    "event for controller {id} returned for {controller}"
                )));
            }
        }

        let timestamp = match self.timestamp.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(
                NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .map_err(|e| DeviceError::Decode(format!("timestamp '{s}': {e}")))?,
            ),
        };

        Ok(Event {
            controller_id: controller,
            index: self.event_id,
            timestamp,
            event_type: self.event_type,
            granted: self.access_granted,
            door: self.door_id,
            direction: self.direction,
            card_number: self.card_number,
            reason: self.event_reason,
        })
    }
}
