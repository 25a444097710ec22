//! Declarative sensor sets
//!
//! Instead of listing mapping definitions, a station can be described by
//! which sensors each transmitter carries; the mapper list is derived from
//! that.

use crate::{ConfigError, MapperKind, MAX_TRANSMITTER_ID};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorType {
    TemperatureHumidity,
    Wind,
    Rain,
    Solar,
    Uv,
    SoilTemperature(u8),
    SoilMoisture(u8),
    LeafWetness(u8),
}

impl SensorType {
    fn to_kind(self, tx: u8) -> MapperKind {
        match self {
            SensorType::TemperatureHumidity => MapperKind::TemperatureHumidity { tx },
            SensorType::Wind => MapperKind::Wind { tx },
            SensorType::Rain => MapperKind::Rain { tx },
            SensorType::Solar => MapperKind::Solar { tx },
            SensorType::Uv => MapperKind::Uv { tx },
            SensorType::SoilTemperature(port) => MapperKind::SoilTemperature { tx, port },
            SensorType::SoilMoisture(port) => MapperKind::SoilMoisture { tx, port },
            SensorType::LeafWetness(port) => MapperKind::LeafWetness { tx, port },
        }
    }
}

impl FromStr for SensorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sensor = match s.trim() {
            "th" => SensorType::TemperatureHumidity,
            "wind" => SensorType::Wind,
            "rain" => SensorType::Rain,
            "solar" => SensorType::Solar,
            "uv" => SensorType::Uv,
            "st1" => SensorType::SoilTemperature(1),
            "st2" => SensorType::SoilTemperature(2),
            "st3" => SensorType::SoilTemperature(3),
            "st4" => SensorType::SoilTemperature(4),
            "sm1" => SensorType::SoilMoisture(1),
            "sm2" => SensorType::SoilMoisture(2),
            "sm3" => SensorType::SoilMoisture(3),
            "sm4" => SensorType::SoilMoisture(4),
            "lw1" => SensorType::LeafWetness(1),
            "lw2" => SensorType::LeafWetness(2),
            other => return Err(ConfigError::UnknownSensor(other.to_string())),
        };
        Ok(sensor)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorType::TemperatureHumidity => write!(f, "th"),
            SensorType::Wind => write!(f, "wind"),
            SensorType::Rain => write!(f, "rain"),
            SensorType::Solar => write!(f, "solar"),
            SensorType::Uv => write!(f, "uv"),
            SensorType::SoilTemperature(port) => write!(f, "st{port}"),
            SensorType::SoilMoisture(port) => write!(f, "sm{port}"),
            SensorType::LeafWetness(port) => write!(f, "lw{port}"),
        }
    }
}

/// Transmitter id -> sensors attached to it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorSet {
    transmitters: BTreeMap<u8, BTreeSet<SensorType>>,
}

impl SensorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from short sensor keys per transmitter, e.g. `(1, ["th", "wind"])`
    pub fn from_keys<I, K, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (u8, K)>,
        K: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for (tx, keys) in entries {
            for key in keys {
                set.insert(tx, key.as_ref().parse()?)?;
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, tx: u8, sensor: SensorType) -> Result<(), ConfigError> {
        if tx == 0 || tx > MAX_TRANSMITTER_ID {
            return Err(ConfigError::InvalidTransmitter(tx));
        }
        self.transmitters.entry(tx).or_default().insert(sensor);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.transmitters.is_empty()
    }

    pub fn has_all(&self, tx: u8, sensors: &[SensorType]) -> bool {
        self.transmitters
            .get(&tx)
            .is_some_and(|present| sensors.iter().all(|s| present.contains(s)))
    }

    /// Mapper kinds in reservation order
    ///
    /// Per-sensor mappers by (transmitter, sensor); then THSW for each
    /// transmitter with TH, wind and solar; then THW and wind chill for each
    /// transmitter with TH and wind; then the built-in indoor and barometer
    /// sensors. THW/THSW ask for the shared apparent temperature, which only
    /// the first of them receives.
    pub fn mapper_kinds(&self) -> Vec<MapperKind> {
        use SensorType::*;

        let mut kinds: Vec<MapperKind> = self
            .transmitters
            .iter()
            .flat_map(|(tx, sensors)| sensors.iter().map(|s| s.to_kind(*tx)))
            .collect();

        let thsw: Vec<u8> = self
            .transmitters
            .keys()
            .copied()
            .filter(|tx| self.has_all(*tx, &[TemperatureHumidity, Wind, Solar]))
            .collect();
        debug!("{} transmitters with THSW metric: {:?}", thsw.len(), thsw);
        kinds.extend(thsw.into_iter().map(|tx| MapperKind::Thsw { tx, app_temp: true }));

        let thw: Vec<u8> = self
            .transmitters
            .keys()
            .copied()
            .filter(|tx| self.has_all(*tx, &[TemperatureHumidity, Wind]))
            .collect();
        debug!("{} transmitters with THW metric: {:?}", thw.len(), thw);
        for tx in thw {
            kinds.push(MapperKind::Thw { tx, app_temp: true });
            kinds.push(MapperKind::WindChill { tx });
        }

        kinds.push(MapperKind::IndoorTh);
        kinds.push(MapperKind::Barometer);
        kinds
    }
}
