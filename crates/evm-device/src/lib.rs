//! Device gateway boundary for access-controller event logs.
//!
//! This crate owns the gateway trait and the concrete HTTP adapter. It does
//! **not** decide what to fetch (see `evm-core`) and does not touch the store.

pub mod http;

pub use http::HttpGateway;

use std::fmt;

use async_trait::async_trait;
use evm_core::{ControllerBounds, ControllerId, Event, INDEX_EARLIEST, INDEX_LATEST};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a [`DeviceGateway`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Network or transport failure.
    Transport(String),
    /// The request did not complete within the gateway timeout.
    Timeout,
    /// The gateway answered with an unexpected status.
    Api { status: u16, message: String },
    /// A response payload could not be decoded.
    Decode(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Transport(msg) => write!(f, "transport error: {msg}"),
            DeviceError::Timeout => write!(f, "device request timed out"),
            DeviceError::Api { status, message } if message.is_empty() => {
                write!(f, "device api error status={status}")
            }
            DeviceError::Api { status, message } => {
                write!(f, "device api error status={status}: {message}")
            }
            DeviceError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

/// Per-controller event access.
///
/// Object safe (`&dyn DeviceGateway`) and `Send + Sync` so one gateway can
/// serve concurrent per-controller passes.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Human-readable adapter name (e.g. `"http"`).
    fn name(&self) -> &'static str;

    /// Fetch the event stored at `index`.
    ///
    /// `Ok(None)` means the slot is empty. [`INDEX_EARLIEST`] and
    /// [`INDEX_LATEST`] query the oldest and newest retained events.
    async fn get_event(
        &self,
        controller: ControllerId,
        index: u32,
    ) -> Result<Option<Event>, DeviceError>;

    /// The controller's write cursor.
    async fn get_event_index(&self, controller: ControllerId) -> Result<u32, DeviceError>;

    /// Live buffer bounds: one query each for the oldest and newest event,
    /// plus the write cursor. An empty answer reads as `0`.
    async fn bounds(&self, controller: ControllerId) -> Result<ControllerBounds, DeviceError> {
        let first = self
            .get_event(controller, INDEX_EARLIEST)
            .await?
            .map_or(0, |e| e.index);
        let last = self
            .get_event(controller, INDEX_LATEST)
            .await?
            .map_or(0, |e| e.index);
        let current = self.get_event_index(controller).await?;

        Ok(ControllerBounds::new(first, last, current))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
