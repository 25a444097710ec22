//! Observation packets as returned by the WeatherLink Live API
//!
//! The HTTP `current_conditions` endpoint, the UDP real-time broadcast and the
//! archive relay all deliver the same shape: a timestamp plus a list of
//! per-transmitter condition entries. An [`ObservationPacket`] is built once
//! per response or datagram and never mutated afterwards.

use crate::keys;
use crate::types::Timestamp;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while turning a raw payload into a packet
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PacketError {
    #[error("Device returned error {code}: {message}")]
    Device { code: i64, message: String },

    #[error("Could not decode packet JSON: {0}")]
    Decode(String),

    #[error("Could not extract main entries of packet: {0}")]
    Malformed(String),
}

/// Errors raised by observation lookups
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// Wanted observation isn't in the packet; mappers treat this as a skip
    #[error("{0}")]
    NotInPacket(String),

    #[error("Combination of type {dst:?} and tx id {tx:?} did not result in an unique sensor")]
    NotUnique {
        dst: Option<DataStructureType>,
        tx: Option<u8>,
    },
}

/// Kind of condition entry, as tagged by `data_structure_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataStructureType {
    Iss,
    LeafSoil,
    Baro,
    IndoorTh,
    Health,
    Other(i64),
}

impl DataStructureType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DataStructureType::Iss,
            2 => DataStructureType::LeafSoil,
            3 => DataStructureType::Baro,
            4 => DataStructureType::IndoorTh,
            15 => DataStructureType::Health,
            other => DataStructureType::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            DataStructureType::Iss => 1,
            DataStructureType::LeafSoil => 2,
            DataStructureType::Baro => 3,
            DataStructureType::IndoorTh => 4,
            DataStructureType::Health => 15,
            DataStructureType::Other(code) => *code,
        }
    }
}

impl fmt::Display for DataStructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataStructureType::Iss => write!(f, "ISS"),
            DataStructureType::LeafSoil => write!(f, "LEAF_SOIL"),
            DataStructureType::Baro => write!(f, "BARO"),
            DataStructureType::IndoorTh => write!(f, "INDOOR_TH"),
            DataStructureType::Health => write!(f, "HEALTH"),
            DataStructureType::Other(code) => write!(f, "TYPE_{code}"),
        }
    }
}

/// Provenance of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketSource {
    /// HTTP `current_conditions` poll
    Poll,
    /// UDP real-time broadcast
    Broadcast,
    /// Archive records relayed from the optional wl.com feed
    Relay,
}

impl PacketSource {
    /// Wind and rain are only reported from sources carrying instantaneous values
    pub fn is_realtime(&self) -> bool {
        matches!(self, PacketSource::Broadcast | PacketSource::Relay)
    }
}

impl fmt::Display for PacketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketSource::Poll => write!(f, "poll"),
            PacketSource::Broadcast => write!(f, "broadcast"),
            PacketSource::Relay => write!(f, "relay"),
        }
    }
}

/// One condition entry of a packet
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitterEntry {
    pub data_structure_type: DataStructureType,
    pub transmitter_id: Option<u8>,
    pub logical_sensor_id: Option<i64>,
    pub values: BTreeMap<String, Option<f64>>,
}

impl TransmitterEntry {
    pub fn from_json(value: &Value) -> Result<Self, PacketError> {
        let object = value
            .as_object()
            .ok_or_else(|| PacketError::Malformed("condition entry is not an object".into()))?;

        let data_structure_type = object
            .get(keys::DATA_STRUCTURE_TYPE)
            .and_then(Value::as_i64)
            .map(DataStructureType::from_code)
            .ok_or_else(|| {
                PacketError::Malformed(format!("condition entry without {}", keys::DATA_STRUCTURE_TYPE))
            })?;

        let transmitter_id = match object.get(keys::TRANSMITTER_ID) {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|id| u8::try_from(id).ok())
                    .ok_or_else(|| PacketError::Malformed(format!("invalid tx id {v}")))?,
            ),
        };

        let logical_sensor_id = object.get(keys::LOGICAL_SENSOR_ID).and_then(Value::as_i64);

        Ok(Self {
            data_structure_type,
            transmitter_id,
            logical_sensor_id,
            values: numeric_values(object),
        })
    }

    pub fn get(&self, key: &str) -> Option<Option<f64>> {
        self.values.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

fn numeric_values(object: &Map<String, Value>) -> BTreeMap<String, Option<f64>> {
    object
        .iter()
        .filter(|(k, _)| {
            !matches!(
                k.as_str(),
                keys::DATA_STRUCTURE_TYPE | keys::TRANSMITTER_ID | keys::LOGICAL_SENSOR_ID
            )
        })
        .filter_map(|(k, v)| match v {
            Value::Null => Some((k.clone(), None)),
            Value::Number(n) => Some((k.clone(), n.as_f64())),
            // strings and nested values are not observations
            _ => None,
        })
        .collect()
}

/// A single (observation, type, transmitter) lookup
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    pub key: &'a str,
    pub dst: Option<DataStructureType>,
    pub tx: Option<u8>,
}

/// Immutable per-arrival snapshot of device conditions
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPacket {
    pub device_id: Option<String>,
    pub timestamp: Timestamp,
    pub source: PacketSource,
    pub conditions: Vec<TransmitterEntry>,
}

impl ObservationPacket {
    /// Parse a `GET /v1/current_conditions` response body
    pub fn from_conditions_response(value: &Value) -> Result<Self, PacketError> {
        check_device_error(value)?;
        let data = value
            .get("data")
            .filter(|d| !d.is_null())
            .ok_or_else(|| PacketError::Malformed("missing data".into()))?;
        Self::from_body(data, PacketSource::Poll, true)
    }

    /// Parse a decoded UDP broadcast datagram
    pub fn from_broadcast(value: &Value) -> Result<Self, PacketError> {
        check_device_error(value)?;
        Self::from_body(value, PacketSource::Broadcast, true)
    }

    /// Decode and parse a raw UDP broadcast datagram
    pub fn from_broadcast_slice(datagram: &[u8]) -> Result<Self, PacketError> {
        let value: Value =
            serde_json::from_slice(datagram).map_err(|e| PacketError::Decode(e.to_string()))?;
        Self::from_broadcast(&value)
    }

    /// Parse an archive record relayed from the wl.com feed
    pub fn from_relay(value: &Value) -> Result<Self, PacketError> {
        check_device_error(value)?;
        Self::from_body(value, PacketSource::Relay, false)
    }

    fn from_body(
        body: &Value,
        source: PacketSource,
        require_device_id: bool,
    ) -> Result<Self, PacketError> {
        let device_id = match body.get(keys::DEVICE_ID) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        if require_device_id && device_id.is_none() {
            return Err(PacketError::Malformed(format!("missing {}", keys::DEVICE_ID)));
        }

        let timestamp = body
            .get(keys::TIMESTAMP)
            .and_then(Value::as_i64)
            .ok_or_else(|| PacketError::Malformed(format!("missing {}", keys::TIMESTAMP)))?;

        let conditions = body
            .get(keys::CONDITIONS)
            .and_then(Value::as_array)
            .ok_or_else(|| PacketError::Malformed(format!("missing {}", keys::CONDITIONS)))?
            .iter()
            .map(TransmitterEntry::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            device_id,
            timestamp,
            source,
            conditions,
        })
    }

    /// Find the value of an observation, filtered by entry type and transmitter
    ///
    /// Returns `Ok(None)` when the observation is present but null.
    pub fn get_observation(
        &self,
        key: &str,
        dst: Option<DataStructureType>,
        tx: Option<u8>,
    ) -> Result<Option<f64>, LookupError> {
        let entry = self.find_entry(dst, tx)?.ok_or_else(|| {
            LookupError::NotInPacket(format!(
                "No transmitter found for type {dst:?} and tx id {tx:?} in {} packet",
                self.source
            ))
        })?;

        entry.get(key).ok_or_else(|| {
            LookupError::NotInPacket(format!(
                "Observation {key} not found in {} packet",
                self.source
            ))
        })
    }

    /// Try each lookup in order and return the first observation found
    pub fn get_observation_from_multiple(
        &self,
        lookups: &[Lookup<'_>],
    ) -> Result<Option<f64>, LookupError> {
        for lookup in lookups {
            match self.get_observation(lookup.key, lookup.dst, lookup.tx) {
                Ok(value) => return Ok(value),
                Err(LookupError::NotInPacket(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LookupError::NotInPacket(format!(
            "Could not find observation using {} combinations",
            lookups.len()
        )))
    }

    /// Available (type, transmitter) combinations
    pub fn tx_list(&self) -> Vec<(DataStructureType, Option<u8>)> {
        self.conditions
            .iter()
            .map(|e| (e.data_structure_type, e.transmitter_id))
            .collect()
    }

    pub fn has_entry_of_type(&self, dst: DataStructureType) -> bool {
        self.conditions
            .iter()
            .any(|e| e.data_structure_type == dst)
    }

    /// Whether all keys exist for the uniquely identified entry
    pub fn has_observation_values(
        &self,
        keys: &[&str],
        dst: Option<DataStructureType>,
        tx: Option<u8>,
    ) -> Result<bool, LookupError> {
        let entry = self.find_entry(dst, tx)?.ok_or_else(|| {
            LookupError::NotInPacket(format!("TX type {dst:?} and id {tx:?} did not match any entry"))
        })?;
        Ok(keys.iter().all(|k| entry.contains(k)))
    }

    fn find_entry(
        &self,
        dst: Option<DataStructureType>,
        tx: Option<u8>,
    ) -> Result<Option<&TransmitterEntry>, LookupError> {
        let mut matches = self
            .conditions
            .iter()
            .filter(|e| dst.map_or(true, |d| e.data_structure_type == d))
            .filter(|e| tx.map_or(true, |t| e.transmitter_id == Some(t)));

        let first = matches.next();
        if matches.next().is_some() {
            return Err(LookupError::NotUnique { dst, tx });
        }
        Ok(first)
    }
}

/// Broadcast lease granted by `GET /v1/real_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastLease {
    pub broadcast_port: u16,
    pub duration: u64,
}

impl BroadcastLease {
    pub fn from_response(value: &Value) -> Result<Self, PacketError> {
        check_device_error(value)?;
        let data = value
            .get("data")
            .filter(|d| !d.is_null())
            .ok_or_else(|| PacketError::Malformed("missing data".into()))?;

        let broadcast_port = data
            .get("broadcast_port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| PacketError::Malformed("missing broadcast_port".into()))?;
        let duration = data
            .get("duration")
            .and_then(Value::as_u64)
            .ok_or_else(|| PacketError::Malformed("missing duration".into()))?;

        Ok(Self {
            broadcast_port,
            duration,
        })
    }
}

/// Fail with [`PacketError::Device`] when a response body carries a device error
pub fn check_device_error(value: &Value) -> Result<(), PacketError> {
    let error = match value.get("error") {
        None | Some(Value::Null) => return Ok(()),
        Some(error) => error,
    };

    let code = error.get("code").and_then(Value::as_i64);
    let message = error.get("message").and_then(Value::as_str);
    if code.is_none() && message.is_none() {
        return Ok(());
    }

    Err(PacketError::Device {
        code: code.unwrap_or(-1),
        message: message.unwrap_or_default().to_string(),
    })
}
