//! Mapping definitions and the mapper-type registry
//!
//! A definition is written `type[:option...]`, e.g. `th:1` or
//! `battery:1:outTemp:rain`.

use crate::{targets, ConfigError, MapperKind};
use std::fmt;
use std::str::FromStr;

/// Highest transmitter id the WLL supports
pub const MAX_TRANSMITTER_ID: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapperType {
    Temperature,
    TemperatureHumidity,
    Wind,
    Rain,
    Solar,
    Uv,
    WindChill,
    Thw,
    Thsw,
    SoilTemperature,
    SoilMoisture,
    LeafWetness,
    IndoorTh,
    Barometer,
    Battery,
    Voltage,
    Comm,
}

const REGISTRY: &[(&str, MapperType)] = &[
    ("t", MapperType::Temperature),
    ("th", MapperType::TemperatureHumidity),
    ("wind", MapperType::Wind),
    ("rain", MapperType::Rain),
    ("solar", MapperType::Solar),
    ("uv", MapperType::Uv),
    ("windchill", MapperType::WindChill),
    ("thw", MapperType::Thw),
    ("thsw", MapperType::Thsw),
    ("soil_temp", MapperType::SoilTemperature),
    ("soil_moist", MapperType::SoilMoisture),
    ("leaf_wet", MapperType::LeafWetness),
    ("th_indoor", MapperType::IndoorTh),
    ("baro", MapperType::Barometer),
    ("battery", MapperType::Battery),
    ("voltage", MapperType::Voltage),
    ("comm", MapperType::Comm),
];

impl MapperType {
    pub fn from_key(key: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, mapper_type)| *mapper_type)
    }

    pub fn keys() -> impl Iterator<Item = &'static str> {
        REGISTRY.iter().map(|(k, _)| *k)
    }

    fn build(self, definition: &MappingDefinition) -> Result<MapperKind, ConfigError> {
        let kind = match self {
            MapperType::Temperature => MapperKind::Temperature {
                tx: definition.transmitter()?,
            },
            MapperType::TemperatureHumidity => MapperKind::TemperatureHumidity {
                tx: definition.transmitter()?,
            },
            MapperType::Wind => MapperKind::Wind {
                tx: definition.transmitter()?,
            },
            MapperType::Rain => MapperKind::Rain {
                tx: definition.transmitter()?,
            },
            MapperType::Solar => MapperKind::Solar {
                tx: definition.transmitter()?,
            },
            MapperType::Uv => MapperKind::Uv {
                tx: definition.transmitter()?,
            },
            MapperType::WindChill => MapperKind::WindChill {
                tx: definition.transmitter()?,
            },
            MapperType::Thw => MapperKind::Thw {
                tx: definition.transmitter()?,
                app_temp: definition.has_flag(targets::APPARENT_TEMPERATURE),
            },
            MapperType::Thsw => MapperKind::Thsw {
                tx: definition.transmitter()?,
                app_temp: definition.has_flag(targets::APPARENT_TEMPERATURE),
            },
            MapperType::SoilTemperature => MapperKind::SoilTemperature {
                tx: definition.transmitter()?,
                port: definition.port(targets::SOIL_TEMPERATURE.len())?,
            },
            MapperType::SoilMoisture => MapperKind::SoilMoisture {
                tx: definition.transmitter()?,
                port: definition.port(targets::SOIL_MOISTURE.len())?,
            },
            MapperType::LeafWetness => MapperKind::LeafWetness {
                tx: definition.transmitter()?,
                port: definition.port(targets::LEAF_WETNESS.len())?,
            },
            MapperType::IndoorTh => MapperKind::IndoorTh,
            MapperType::Barometer => MapperKind::Barometer,
            MapperType::Battery => MapperKind::Battery {
                tx: definition.transmitter()?,
                named: definition.battery_names()?,
            },
            MapperType::Voltage => MapperKind::Voltage {
                tx: definition.transmitter()?,
            },
            MapperType::Comm => MapperKind::Comm {
                tx: definition.transmitter()?,
            },
        };
        Ok(kind)
    }
}

/// User-declared mapping intent, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDefinition {
    mapper_type: String,
    options: Vec<String>,
}

impl MappingDefinition {
    pub fn new(mapper_type: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            mapper_type: mapper_type.into(),
            options,
        }
    }

    pub fn mapper_type(&self) -> &str {
        &self.mapper_type
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Resolve through the registry into a mapper kind
    pub fn to_kind(&self) -> Result<MapperKind, ConfigError> {
        MapperType::from_key(&self.mapper_type)
            .ok_or_else(|| ConfigError::UnknownMapperType(self.mapper_type.clone()))?
            .build(self)
    }

    fn int_option(&self, index: usize) -> Result<u8, ConfigError> {
        let raw = self
            .options
            .get(index)
            .ok_or_else(|| ConfigError::MissingOption {
                mapping: self.to_string(),
                expected: index + 1,
                got: self.options.len(),
            })?;

        raw.parse().map_err(|_| ConfigError::InvalidOption {
            mapping: self.to_string(),
            index: index + 1,
            reason: format!("expected an integer, got {raw:?}"),
        })
    }

    fn bounded_option(&self, index: usize, max: usize) -> Result<u8, ConfigError> {
        let value = self.int_option(index)?;
        if value == 0 || usize::from(value) > max {
            return Err(ConfigError::InvalidOption {
                mapping: self.to_string(),
                index: index + 1,
                reason: format!("expected 1..={max}, got {value}"),
            });
        }
        Ok(value)
    }

    fn transmitter(&self) -> Result<u8, ConfigError> {
        self.bounded_option(0, usize::from(MAX_TRANSMITTER_ID))
    }

    fn port(&self, ports: usize) -> Result<u8, ConfigError> {
        self.bounded_option(1, ports)
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(flag))
    }

    fn battery_names(&self) -> Result<Vec<&'static str>, ConfigError> {
        self.options
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, option)| {
                targets::BATTERY_STATUS_NAMED
                    .iter()
                    .find(|(key, _)| *key == option.as_str())
                    .map(|(key, _)| *key)
                    .ok_or_else(|| ConfigError::InvalidOption {
                        mapping: self.to_string(),
                        index: index + 1,
                        reason: format!("invalid battery remap target {option:?}"),
                    })
            })
            .collect()
    }
}

impl FromStr for MappingDefinition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':').map(str::trim);
        let mapper_type = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::InvalidDefinition(s.to_string()))?;

        let options: Vec<String> = parts.map(str::to_string).collect();
        if options.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidDefinition(s.to_string()));
        }

        Ok(Self::new(mapper_type, options))
    }
}

impl fmt::Display for MappingDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mapper_type)?;
        for option in &self.options {
            write!(f, ":{option}")?;
        }
        Ok(())
    }
}
