//! WeatherLink Live acquisition engine
//!
//! Two feeds deliver observation packets: a slow HTTP poll of
//! `current_conditions` and a fast UDP real-time broadcast that must be
//! re-requested periodically. A single [`Scheduler`] times every outbound
//! request, one [`DataHost`] per feed maps packets into records, and the
//! [`Driver`] merges both queues into one record stream.

pub mod broadcast;
pub mod driver;
pub mod host;
pub mod http;
pub mod scheduler;

pub use broadcast::*;
pub use driver::*;
pub use host::*;
pub use http::*;
pub use scheduler::*;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use wll_core::{ObservationPacket, PacketError};
use wll_mapping::{ConfigError, MappingError};

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Timeout waiting for device")]
    Timeout,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Device returned error {code}: {message}")]
    DeviceError { code: i64, message: String },

    #[error("Mapping error: {0}")]
    MappingError(#[from] MappingError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl IngestError {
    /// Transport and structural failures are retried; anything the device
    /// itself reported, or that is wrong on our side, is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::CommunicationError(_) | IngestError::Timeout | IngestError::InvalidPacket(_)
        )
    }
}

impl From<PacketError> for IngestError {
    fn from(e: PacketError) -> Self {
        match e {
            PacketError::Device { code, message } => IngestError::DeviceError { code, message },
            PacketError::Decode(msg) | PacketError::Malformed(msg) => IngestError::InvalidPacket(msg),
        }
    }
}

impl From<ConfigError> for IngestError {
    fn from(e: ConfigError) -> Self {
        IngestError::ConfigurationError(e.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Failures surfaced to whatever hosts the driver
#[derive(Debug, Error)]
pub enum DriverError {
    /// Startup failed; restarting with the same settings will not help
    #[error("Error while starting driver: {0}")]
    Initialization(String),

    /// The acquisition session died and must be torn down and rebuilt
    #[error("{0}")]
    Io(String),
}

/// Sticky error slot shared between a feed and the consumer
///
/// The first error wins and is never cleared; every later check re-raises it.
#[derive(Debug, Clone, Default)]
pub struct ErrorSlot {
    inner: Arc<Mutex<Option<IngestError>>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `error` unless one is already stored; returns whether it was stored
    pub fn set(&self, error: IngestError) -> bool {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(error);
        true
    }

    pub fn get(&self) -> Option<IngestError> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    pub fn raise(&self) -> IngestResult<()> {
        match self.get() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Target of a broadcast receiver
///
/// `on_packet_received` runs on the reception task. Returning an error ends
/// reception; the error is then handed to `on_packet_receive_error`.
pub trait PacketCallback: Send + Sync {
    fn on_packet_received(&self, packet: ObservationPacket) -> IngestResult<()>;

    fn on_packet_receive_error(&self, error: IngestError);
}

/// Scheduler hook for the HTTP poll
#[async_trait::async_trait]
pub trait PollTarget: Send + Sync {
    async fn poll(&self) -> IngestResult<()>;
}

/// Scheduler hook for broadcast lease renewal
#[async_trait::async_trait]
pub trait BroadcastTarget: Send + Sync {
    async fn refresh_broadcast(&self, duration: Duration) -> IngestResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_keeps_first_error() {
        let slot = ErrorSlot::new();
        assert!(slot.raise().is_ok());

        assert!(slot.set(IngestError::Timeout));
        assert!(!slot.set(IngestError::InvalidPacket("late".into())));

        let clone = slot.clone();
        assert!(matches!(clone.raise(), Err(IngestError::Timeout)));
        assert!(matches!(slot.raise(), Err(IngestError::Timeout)));
    }

    #[test]
    fn test_retry_classification() {
        assert!(IngestError::Timeout.is_retryable());
        assert!(IngestError::from(PacketError::Malformed("missing data".into())).is_retryable());

        let device = IngestError::from(PacketError::Device {
            code: 409,
            message: "busy".into(),
        });
        assert!(matches!(device, IngestError::DeviceError { code: 409, .. }));
        assert!(!device.is_retryable());
        assert!(!IngestError::ConfigurationError("bad".into()).is_retryable());
    }
}
