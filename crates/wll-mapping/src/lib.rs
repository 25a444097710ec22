//! Sensor-to-record mapping
//!
//! Turns [`ObservationPacket`](wll_core::ObservationPacket)s into flat output
//! records. Each configured mapper reserves its output fields once, at
//! construction, so no two mappers ever write the same field.

pub mod chain;
pub mod definition;
pub mod mapper;
pub mod reservation;
pub mod sensors;
pub mod targets;

pub use chain::*;
pub use definition::*;
pub use mapper::*;
pub use reservation::*;
pub use sensors::*;

use thiserror::Error;
use wll_core::LookupError;

/// Startup-time mapping configuration errors; never retried
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown mapper type: {0}")]
    UnknownMapperType(String),

    #[error("Invalid mapping definition: {0:?}")]
    InvalidDefinition(String),

    #[error("Mapping options for mapping {mapping} incomplete: expected at least {expected} parameters, got {got}")]
    MissingOption {
        mapping: String,
        expected: usize,
        got: usize,
    },

    #[error("Could not parse mapping option {index} for mapping {mapping}: {reason}")]
    InvalidOption {
        mapping: String,
        index: usize,
        reason: String,
    },

    #[error("Mapping {0} has all map targets used")]
    TargetsExhausted(String),

    #[error("Mapping {mapping} wants target {target}, which is already used")]
    TargetConflict { mapping: String, target: String },

    #[error("Unknown sensor key: {0}")]
    UnknownSensor(String),

    #[error("Invalid transmitter id {0}, expected 1..=8")]
    InvalidTransmitter(u8),
}

/// Per-packet mapping errors
///
/// A missing observation is not one of them: mappers skip silently in that
/// case.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Unexpected rain bucket size {0}")]
    UnknownRainBucketSize(f64),
}

/// Gates for the per-mapping success/failure debug messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFlags {
    pub success: bool,
    pub failure: bool,
}

impl Default for LogFlags {
    fn default() -> Self {
        Self {
            success: false,
            failure: true,
        }
    }
}
