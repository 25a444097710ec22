//! Mapper variants
//!
//! A [`MapperKind`] describes what a mapper reads; a [`Mapper`] is a kind
//! bound to its reserved output fields, plus the rain counter state.

use crate::reservation::{TargetRequest, TargetSet};
use crate::{targets, LogFlags, MappingError};
use std::fmt;
use tracing::{debug, info};
use wll_core::{keys, DataStructureType, LookupError, ObservationPacket, PacketSource, Record};

/// Semantic roles of reserved targets, also used as labels in the mapping summary
pub mod role {
    pub const TEMPERATURE: &str = "Temperature";
    pub const HUMIDITY: &str = "Humidity";
    pub const DEW_POINT: &str = "Dew point";
    pub const HEAT_INDEX: &str = "Heat index";
    pub const WET_BULB: &str = "Wet bulb";
    pub const WIND_DIR: &str = "Wind direction";
    pub const WIND_SPEED: &str = "Wind speed";
    pub const GUST_DIR: &str = "Gust direction";
    pub const GUST_SPEED: &str = "Gust speed";
    pub const RAIN_AMOUNT: &str = "Rain amount";
    pub const RAIN_RATE: &str = "Rain rate";
    pub const RAIN_COUNT: &str = "Rain count";
    pub const RAIN_COUNT_RATE: &str = "Rain count rate";
    pub const RAIN_SIZE: &str = "Rain bucket size";
    pub const SOLAR_RADIATION: &str = "Solar radiation";
    pub const UV_INDEX: &str = "UV index";
    pub const WIND_CHILL: &str = "Wind chill";
    pub const THW_INDEX: &str = "THW index";
    pub const THSW_INDEX: &str = "THSW index";
    pub const SOIL_TEMPERATURE: &str = "Soil temperature";
    pub const SOIL_MOISTURE: &str = "Soil moisture";
    pub const LEAF_WETNESS: &str = "Leaf wetness";
    pub const INDOOR_TEMPERATURE: &str = "Indoor temperature";
    pub const INDOOR_HUMIDITY: &str = "Indoor humidity";
    pub const INDOOR_DEW_POINT: &str = "Indoor dew point";
    pub const INDOOR_HEAT_INDEX: &str = "Indoor heat index";
    pub const BARO_ABSOLUTE: &str = "Absolute pressure";
    pub const BARO_SEA_LEVEL: &str = "Sea level pressure";
    pub const BATTERY_STATUS: &str = "Battery status";
    pub const WLL_BATTERY: &str = "WLL battery voltage";
    pub const WLL_SUPPLY: &str = "WLL supply voltage";
}

/// What a mapper reads, parsed from a mapping definition or derived from a sensor set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapperKind {
    Temperature { tx: u8 },
    TemperatureHumidity { tx: u8 },
    Wind { tx: u8 },
    Rain { tx: u8 },
    Solar { tx: u8 },
    Uv { tx: u8 },
    WindChill { tx: u8 },
    Thw { tx: u8, app_temp: bool },
    Thsw { tx: u8, app_temp: bool },
    SoilTemperature { tx: u8, port: u8 },
    SoilMoisture { tx: u8, port: u8 },
    LeafWetness { tx: u8, port: u8 },
    IndoorTh,
    Barometer,
    /// `named` holds option keys of [`targets::BATTERY_STATUS_NAMED`]
    Battery { tx: u8, named: Vec<&'static str> },
    Voltage { tx: u8 },
    Comm { tx: u8 },
}

impl MapperKind {
    pub fn transmitter(&self) -> Option<u8> {
        match self {
            MapperKind::IndoorTh | MapperKind::Barometer => None,
            MapperKind::Temperature { tx }
            | MapperKind::TemperatureHumidity { tx }
            | MapperKind::Wind { tx }
            | MapperKind::Rain { tx }
            | MapperKind::Solar { tx }
            | MapperKind::Uv { tx }
            | MapperKind::WindChill { tx }
            | MapperKind::Thw { tx, .. }
            | MapperKind::Thsw { tx, .. }
            | MapperKind::SoilTemperature { tx, .. }
            | MapperKind::SoilMoisture { tx, .. }
            | MapperKind::LeafWetness { tx, .. }
            | MapperKind::Battery { tx, .. }
            | MapperKind::Voltage { tx }
            | MapperKind::Comm { tx } => Some(*tx),
        }
    }

    /// Registry key of this kind's mapper type
    pub fn type_key(&self) -> &'static str {
        match self {
            MapperKind::Temperature { .. } => "t",
            MapperKind::TemperatureHumidity { .. } => "th",
            MapperKind::Wind { .. } => "wind",
            MapperKind::Rain { .. } => "rain",
            MapperKind::Solar { .. } => "solar",
            MapperKind::Uv { .. } => "uv",
            MapperKind::WindChill { .. } => "windchill",
            MapperKind::Thw { .. } => "thw",
            MapperKind::Thsw { .. } => "thsw",
            MapperKind::SoilTemperature { .. } => "soil_temp",
            MapperKind::SoilMoisture { .. } => "soil_moist",
            MapperKind::LeafWetness { .. } => "leaf_wet",
            MapperKind::IndoorTh => "th_indoor",
            MapperKind::Barometer => "baro",
            MapperKind::Battery { .. } => "battery",
            MapperKind::Voltage { .. } => "voltage",
            MapperKind::Comm { .. } => "comm",
        }
    }

    pub fn target_request(&self) -> TargetRequest {
        use role::*;

        let request = TargetRequest::new();
        match self {
            MapperKind::Temperature { .. } => request.slot(TEMPERATURE, targets::TEMPERATURE),
            MapperKind::TemperatureHumidity { .. } => request
                .slot(TEMPERATURE, targets::TEMPERATURE)
                .slot(HUMIDITY, targets::HUMIDITY)
                .slot(DEW_POINT, targets::DEW_POINT)
                .slot(HEAT_INDEX, targets::HEAT_INDEX)
                .slot(WET_BULB, targets::WET_BULB),
            MapperKind::Wind { .. } => request
                .slot(WIND_DIR, targets::WIND_DIR)
                .slot(WIND_SPEED, targets::WIND_SPEED)
                .slot(GUST_DIR, targets::WIND_GUST_DIR)
                .slot(GUST_SPEED, targets::WIND_GUST_SPEED),
            MapperKind::Rain { .. } => request
                .slot(RAIN_AMOUNT, targets::RAIN_AMOUNT)
                .slot(RAIN_RATE, targets::RAIN_RATE)
                .slot(RAIN_COUNT, targets::RAIN_COUNT)
                .slot(RAIN_COUNT_RATE, targets::RAIN_COUNT_RATE)
                .slot(RAIN_SIZE, targets::RAIN_SIZE),
            MapperKind::Solar { .. } => request.slot(SOLAR_RADIATION, targets::SOLAR_RADIATION),
            MapperKind::Uv { .. } => request.slot(UV_INDEX, targets::UV),
            MapperKind::WindChill { .. } => request.slot(WIND_CHILL, targets::WINDCHILL),
            MapperKind::Thw { app_temp, .. } => {
                let request = request.slot(THW_INDEX, targets::THW);
                if *app_temp {
                    request.shared(THW_INDEX, targets::APPARENT_TEMPERATURE)
                } else {
                    request
                }
            }
            MapperKind::Thsw { app_temp, .. } => {
                let request = request.slot(THSW_INDEX, targets::THSW);
                if *app_temp {
                    request.shared(THSW_INDEX, targets::APPARENT_TEMPERATURE)
                } else {
                    request
                }
            }
            MapperKind::SoilTemperature { .. } => {
                request.slot(SOIL_TEMPERATURE, targets::SOIL_TEMPERATURE)
            }
            MapperKind::SoilMoisture { .. } => request.slot(SOIL_MOISTURE, targets::SOIL_MOISTURE),
            MapperKind::LeafWetness { .. } => request.slot(LEAF_WETNESS, targets::LEAF_WETNESS),
            MapperKind::IndoorTh => request
                .slot(INDOOR_TEMPERATURE, targets::INDOOR_TEMPERATURE)
                .slot(INDOOR_HUMIDITY, targets::INDOOR_HUMIDITY)
                .slot(INDOOR_DEW_POINT, targets::INDOOR_DEW_POINT)
                .slot(INDOOR_HEAT_INDEX, targets::INDOOR_HEAT_INDEX),
            MapperKind::Barometer => request
                .slot(BARO_ABSOLUTE, targets::BARO_ABSOLUTE)
                .slot(BARO_SEA_LEVEL, targets::BARO_SEA_LEVEL),
            MapperKind::Battery { named, .. } => named
                .iter()
                .filter_map(|key| targets::battery_named(key))
                .fold(request.slot(BATTERY_STATUS, targets::BATTERY_STATUS), |r, t| {
                    r.fixed(BATTERY_STATUS, t)
                }),
            MapperKind::Voltage { .. } => targets::VOLTAGE_NAMED
                .iter()
                .fold(request, |r, (obs, t)| r.fixed(*obs, *t))
                .fixed(WLL_BATTERY, targets::VOLTAGE_WLL_BATTERY)
                .fixed(WLL_SUPPLY, targets::VOLTAGE_WLL_SUPPLY),
            MapperKind::Comm { .. } => targets::COMM_TRANSMITTER
                .iter()
                .chain(targets::COMM_HEALTH)
                .fold(request, |r, (obs, t)| r.fixed(*obs, *t)),
        }
    }
}

/// Renders the kind in mapping definition syntax, e.g. `soil_temp:2:1`
impl fmt::Display for MapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_key())?;
        match self {
            MapperKind::IndoorTh | MapperKind::Barometer => Ok(()),
            MapperKind::Thw { tx, app_temp } | MapperKind::Thsw { tx, app_temp } => {
                write!(f, ":{tx}")?;
                if *app_temp {
                    write!(f, ":{}", targets::APPARENT_TEMPERATURE)?;
                }
                Ok(())
            }
            MapperKind::SoilTemperature { tx, port }
            | MapperKind::SoilMoisture { tx, port }
            | MapperKind::LeafWetness { tx, port } => write!(f, ":{tx}:{port}"),
            MapperKind::Battery { tx, named } => {
                write!(f, ":{tx}")?;
                for key in named {
                    write!(f, ":{key}")?;
                }
                Ok(())
            }
            other => match other.transmitter() {
                Some(tx) => write!(f, ":{tx}"),
                None => Ok(()),
            },
        }
    }
}

/// Writes values to every field reserved for a role, with gated logging
struct Writer<'a> {
    name: &'a str,
    targets: &'a TargetSet,
    log: LogFlags,
}

impl Writer<'_> {
    fn set(&self, record: &mut Record, role: &str, value: Option<f64>) {
        for field in self.targets.all(role) {
            record.set(field, value);
            if self.log.success {
                debug!("{}: Mapped: {}={:?}", self.name, field, value);
            }
        }
    }

    fn success(&self, message: &str) {
        if self.log.success {
            debug!("{}: {}", self.name, message);
        }
    }

    fn failure(&self, message: &str) {
        if self.log.failure {
            debug!("{}: {}", self.name, message);
        }
    }
}

/// A mapper kind bound to its reserved output fields
#[derive(Debug, Clone)]
pub struct Mapper {
    name: String,
    kind: MapperKind,
    targets: TargetSet,
    log: LogFlags,
    last_daily_rain_count: Option<f64>,
}

impl Mapper {
    pub fn new(kind: MapperKind, targets: TargetSet, log: LogFlags) -> Self {
        // a shared appTemp that went to an earlier mapper is not part of this one
        let app_temp_granted = targets.contains_field(crate::targets::APPARENT_TEMPERATURE);
        let kind = match kind {
            MapperKind::Thw { tx, app_temp } => MapperKind::Thw {
                tx,
                app_temp: app_temp && app_temp_granted,
            },
            MapperKind::Thsw { tx, app_temp } => MapperKind::Thsw {
                tx,
                app_temp: app_temp && app_temp_granted,
            },
            other => other,
        };
        let name = kind.to_string();
        if log.success {
            debug!("{}: Mapping targets: {:?}", name, targets.entries());
        }
        Self {
            name,
            kind,
            targets,
            log,
            last_daily_rain_count: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &MapperKind {
        &self.kind
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// Output fields this mapper may write; fixed for its lifetime
    pub fn declared_targets(&self) -> Vec<&str> {
        self.targets.fields().collect()
    }

    /// Where the mapped values come from, for the mapping summary
    pub fn source_label(&self) -> String {
        match self.kind {
            MapperKind::IndoorTh => "WLL indoor sensor".to_string(),
            MapperKind::Barometer => "WLL barometer".to_string(),
            _ => match self.kind.transmitter() {
                Some(tx) => format!("TX {tx}"),
                None => "WLL".to_string(),
            },
        }
    }

    /// Label -> output field
    pub fn map_table(&self) -> Vec<(&'static str, &str)> {
        self.targets
            .entries()
            .iter()
            .map(|(role, field)| (*role, field.as_str()))
            .collect()
    }

    /// Last daily rain counter seen, once a baseline exists
    pub fn last_daily_rain_count(&self) -> Option<f64> {
        self.last_daily_rain_count
    }

    /// Copy this mapper's observations from `packet` into `record`
    ///
    /// An observation missing from the packet stops this mapper for this
    /// packet without error.
    pub fn apply(
        &mut self,
        packet: &ObservationPacket,
        record: &mut Record,
    ) -> Result<(), MappingError> {
        let writer = Writer {
            name: &self.name,
            targets: &self.targets,
            log: self.log,
        };

        let result = match &self.kind {
            MapperKind::Rain { tx } => map_rain(
                *tx,
                &mut self.last_daily_rain_count,
                &writer,
                packet,
                record,
            ),
            kind => map_stateless(kind, &writer, packet, record),
        };

        match result {
            Err(MappingError::Lookup(LookupError::NotInPacket(reason))) => {
                writer.success(&format!("Observation not found in packet: {reason}"));
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Display for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn map_stateless(
    kind: &MapperKind,
    writer: &Writer<'_>,
    packet: &ObservationPacket,
    record: &mut Record,
) -> Result<(), MappingError> {
    use role::*;
    use DataStructureType::*;

    let iss = |key: &str, tx: u8| packet.get_observation(key, Some(Iss), Some(tx));

    match kind {
        MapperKind::Temperature { tx } => {
            writer.set(record, TEMPERATURE, iss(keys::TEMPERATURE, *tx)?);
        }
        MapperKind::TemperatureHumidity { tx } => {
            writer.set(record, TEMPERATURE, iss(keys::TEMPERATURE, *tx)?);
            writer.set(record, HUMIDITY, iss(keys::HUMIDITY, *tx)?);
            writer.set(record, DEW_POINT, iss(keys::DEW_POINT, *tx)?);
            writer.set(record, HEAT_INDEX, iss(keys::HEAT_INDEX, *tx)?);
            writer.set(record, WET_BULB, iss(keys::WET_BULB, *tx)?);
        }
        MapperKind::Wind { tx } => {
            if !packet.source.is_realtime() {
                writer.success("Mapping not responsible: Not a broadcast packet");
                return Ok(());
            }
            writer.set(record, WIND_DIR, iss(keys::WIND_DIR, *tx)?);
            writer.set(record, WIND_SPEED, iss(keys::WIND_SPEED, *tx)?);

            if packet.source == PacketSource::Relay {
                writer.set(record, GUST_DIR, iss(keys::GUST_DIR, *tx)?);
                writer.set(record, GUST_SPEED, iss(keys::GUST_SPEED, *tx)?);
            }
        }
        MapperKind::Solar { tx } => {
            writer.set(record, SOLAR_RADIATION, iss(keys::SOLAR_RADIATION, *tx)?);
        }
        MapperKind::Uv { tx } => {
            writer.set(record, UV_INDEX, iss(keys::UV_INDEX, *tx)?);
        }
        MapperKind::WindChill { tx } => {
            writer.set(record, WIND_CHILL, iss(keys::WIND_CHILL, *tx)?);
        }
        // the shared appTemp field, when granted, is reserved under the same role
        MapperKind::Thw { tx, .. } => {
            writer.set(record, THW_INDEX, iss(keys::THW_INDEX, *tx)?);
        }
        MapperKind::Thsw { tx, .. } => {
            writer.set(record, THSW_INDEX, iss(keys::THSW_INDEX, *tx)?);
        }
        MapperKind::SoilTemperature { tx, port } => {
            let key = keys::leaf_soil_temperature(*port);
            let value = packet.get_observation(&key, Some(LeafSoil), Some(*tx))?;
            writer.set(record, SOIL_TEMPERATURE, value);
        }
        MapperKind::SoilMoisture { tx, port } => {
            let key = keys::soil_moisture(*port);
            let value = packet.get_observation(&key, Some(LeafSoil), Some(*tx))?;
            writer.set(record, SOIL_MOISTURE, value);
        }
        MapperKind::LeafWetness { tx, port } => {
            let key = keys::leaf_wetness(*port);
            let value = packet.get_observation(&key, Some(LeafSoil), Some(*tx))?;
            writer.set(record, LEAF_WETNESS, value);
        }
        MapperKind::IndoorTh => {
            let indoor = |key: &str| packet.get_observation(key, Some(IndoorTh), None);
            writer.set(record, INDOOR_TEMPERATURE, indoor(keys::TEMPERATURE_INDOOR)?);
            writer.set(record, INDOOR_HUMIDITY, indoor(keys::HUMIDITY_INDOOR)?);
            writer.set(record, INDOOR_DEW_POINT, indoor(keys::DEW_POINT_INDOOR)?);
            writer.set(record, INDOOR_HEAT_INDEX, indoor(keys::HEAT_INDEX_INDOOR)?);
        }
        MapperKind::Barometer => {
            let baro = |key: &str| packet.get_observation(key, Some(Baro), None);
            writer.set(record, BARO_ABSOLUTE, baro(keys::BARO_ABSOLUTE)?);
            writer.set(record, BARO_SEA_LEVEL, baro(keys::BARO_SEA_LEVEL)?);
        }
        MapperKind::Battery { tx, .. } => {
            let flag = packet.get_observation(keys::BATTERY_FLAG, None, Some(*tx))?;
            writer.set(record, BATTERY_STATUS, flag);
        }
        MapperKind::Voltage { tx } => {
            for (obs, _) in targets::VOLTAGE_NAMED {
                writer.set(record, obs, packet.get_observation(obs, None, Some(*tx))?);
            }
            if packet.has_entry_of_type(Health) {
                let health = |key: &str| packet.get_observation(key, Some(Health), None);
                writer.set(record, WLL_BATTERY, health(keys::WLL_BATTERY)?);
                writer.set(record, WLL_SUPPLY, health(keys::WLL_SUPPLY)?);
            }
        }
        MapperKind::Comm { tx } => {
            for (obs, _) in targets::COMM_TRANSMITTER {
                writer.set(record, obs, packet.get_observation(obs, None, Some(*tx))?);
            }
            if packet.has_entry_of_type(Health) {
                for (obs, _) in targets::COMM_HEALTH {
                    writer.set(record, obs, packet.get_observation(obs, Some(Health), None)?);
                }
            }
        }
        MapperKind::Rain { .. } => {}
    }
    Ok(())
}

/// Inches per bucket tip for a device-reported `rain_size` code
pub fn rain_bucket_factor(size_code: f64) -> Result<f64, MappingError> {
    if size_code.fract() != 0.0 {
        return Err(MappingError::UnknownRainBucketSize(size_code));
    }
    match size_code as i64 {
        1 => Ok(0.01),
        2 => Ok(0.2 / 25.4),
        3 => Ok(0.1 / 25.4),
        4 => Ok(0.001),
        _ => Err(MappingError::UnknownRainBucketSize(size_code)),
    }
}

fn multiply(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? * b?)
}

fn map_rain(
    tx: u8,
    last_daily_rain_count: &mut Option<f64>,
    writer: &Writer<'_>,
    packet: &ObservationPacket,
    record: &mut Record,
) -> Result<(), MappingError> {
    use role::*;

    if !packet.source.is_realtime() {
        writer.success("Mapping not responsible: Not a broadcast or archive packet");
        return Ok(());
    }

    let iss = |key: &str| packet.get_observation(key, Some(DataStructureType::Iss), Some(tx));

    let factor = iss(keys::RAIN_SIZE)?
        .map(rain_bucket_factor)
        .transpose()?;
    writer.set(record, RAIN_SIZE, factor);

    if packet.source == PacketSource::Relay {
        let count = iss(keys::RAIN_AMOUNT)?;
        writer.set(record, RAIN_COUNT, count);
        writer.set(record, RAIN_AMOUNT, multiply(count, factor));
        return Ok(());
    }

    let rate_count = iss(keys::RAIN_RATE)?;
    writer.set(record, RAIN_COUNT_RATE, rate_count);
    writer.set(record, RAIN_RATE, multiply(rate_count, factor));

    let Some(current) = iss(keys::RAIN_AMOUNT_DAILY)? else {
        writer.failure("Daily rain count not in packet. Skipping diff calculation");
        return Ok(());
    };

    match *last_daily_rain_count {
        None => {
            if writer.log.success {
                info!("{}: First daily rain value", writer.name);
            }
        }
        Some(last) if last > current => {
            if writer.log.success {
                info!(
                    "{}: Last daily rain ({}) larger than current ({}). Probably reset",
                    writer.name, last, current
                );
            }
            writer.set(record, RAIN_COUNT, Some(current));
            writer.set(record, RAIN_AMOUNT, multiply(Some(current), factor));
        }
        Some(last) => {
            let diff = current - last;
            writer.set(record, RAIN_COUNT, Some(diff));
            writer.set(record, RAIN_AMOUNT, multiply(Some(diff), factor));
        }
    }

    *last_daily_rain_count = Some(current);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reservation;
    use serde_json::{json, Value};

    fn mapper(kind: MapperKind) -> Mapper {
        let targets = Reservation::new()
            .allocate(&kind.to_string(), &kind.target_request())
            .unwrap();
        Mapper::new(kind, targets, LogFlags::default())
    }

    fn iss_body(values: Value) -> Value {
        let mut entry = json!({"data_structure_type": 1, "txid": 1});
        if let (Some(entry), Some(values)) = (entry.as_object_mut(), values.as_object()) {
            entry.extend(values.clone());
        }
        json!({"did": "001D0A700002", "ts": 1700000000, "conditions": [entry]})
    }

    fn broadcast(values: Value) -> ObservationPacket {
        ObservationPacket::from_broadcast(&iss_body(values)).unwrap()
    }

    fn poll(values: Value) -> ObservationPacket {
        let body = json!({"data": iss_body(values), "error": null});
        ObservationPacket::from_conditions_response(&body).unwrap()
    }

    fn relay(values: Value) -> ObservationPacket {
        ObservationPacket::from_relay(&iss_body(values)).unwrap()
    }

    #[test]
    fn test_th_mapping() {
        let mut th = mapper(MapperKind::TemperatureHumidity { tx: 1 });
        let packet = poll(json!({
            "temp": 62.7, "hum": 1.1, "dew_point": -0.3, "heat_index": 5.5, "wet_bulb": null
        }));

        let mut record = Record::new();
        th.apply(&packet, &mut record).unwrap();

        assert_eq!(record.value("outTemp"), Some(62.7));
        assert_eq!(record.value("outHumidity"), Some(1.1));
        assert_eq!(record.value("dewpoint"), Some(-0.3));
        assert_eq!(record.value("heatindex"), Some(5.5));
        assert_eq!(record.get("wetbulb"), Some(None));
    }

    #[test]
    fn test_missing_observation_is_skipped() {
        let mut th = mapper(MapperKind::TemperatureHumidity { tx: 2 });
        let packet = poll(json!({"temp": 62.7}));

        let mut record = Record::new();
        th.apply(&packet, &mut record).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_wind_ignores_poll_packets() {
        let values = json!({
            "wind_dir_last": 270.0, "wind_speed_last": 4.0,
            "wind_speed_hi": 9.0, "wind_speed_hi_dir": 260.0
        });
        let mut wind = mapper(MapperKind::Wind { tx: 1 });

        let mut record = Record::new();
        wind.apply(&poll(values.clone()), &mut record).unwrap();
        assert!(record.is_empty());

        wind.apply(&broadcast(values.clone()), &mut record).unwrap();
        assert_eq!(record.value("windDir"), Some(270.0));
        assert_eq!(record.value("windSpeed"), Some(4.0));
        assert!(!record.contains("windGust"));

        let mut record = Record::new();
        wind.apply(&relay(values), &mut record).unwrap();
        assert_eq!(record.value("windGust"), Some(9.0));
        assert_eq!(record.value("windGustDir"), Some(260.0));
    }

    #[test]
    fn test_rain_delta_sequence() {
        let mut rain = mapper(MapperKind::Rain { tx: 1 });
        let mut outputs = Vec::new();

        for daily in [5.0, 5.0, 12.0, 3.0, 9.0] {
            let packet = broadcast(json!({
                "rain_size": 1, "rain_rate_last": 0, "rainfall_daily": daily
            }));
            let mut record = Record::new();
            rain.apply(&packet, &mut record).unwrap();
            outputs.push((record.value("rainCount"), record.value("rain")));
        }

        assert_eq!(outputs[0], (None, None));
        let counts: Vec<_> = outputs[1..].iter().map(|(c, _)| c.unwrap()).collect();
        assert_eq!(counts, vec![0.0, 7.0, 3.0, 6.0]);

        for (count, amount) in &outputs[1..] {
            let expected = count.unwrap() * 0.01;
            assert!((amount.unwrap() - expected).abs() < 1e-9);
        }
        assert_eq!(rain.last_daily_rain_count(), Some(9.0));
    }

    #[test]
    fn test_rain_rate_and_size() {
        let mut rain = mapper(MapperKind::Rain { tx: 1 });
        let packet = broadcast(json!({
            "rain_size": 2, "rain_rate_last": 10, "rainfall_daily": 0
        }));

        let mut record = Record::new();
        rain.apply(&packet, &mut record).unwrap();

        let factor = 0.2 / 25.4;
        assert_eq!(record.value("rainSize"), Some(factor));
        assert_eq!(record.value("rainCountRate"), Some(10.0));
        assert_eq!(record.value("rainRate"), Some(10.0 * factor));
    }

    #[test]
    fn test_rain_without_daily_count_keeps_baseline() {
        let mut rain = mapper(MapperKind::Rain { tx: 1 });
        let packet = broadcast(json!({
            "rain_size": 1, "rain_rate_last": 0, "rainfall_daily": null
        }));

        let mut record = Record::new();
        rain.apply(&packet, &mut record).unwrap();
        assert_eq!(rain.last_daily_rain_count(), None);
        assert!(!record.contains("rainCount"));
    }

    #[test]
    fn test_rain_relay_copies_interval_count() {
        let mut rain = mapper(MapperKind::Rain { tx: 1 });
        let mut record = Record::new();
        rain.apply(&relay(json!({"rain_size": 1, "rainfall": 3})), &mut record)
            .unwrap();

        assert_eq!(record.value("rainCount"), Some(3.0));
        assert!((record.value("rain").unwrap() - 0.03).abs() < 1e-9);
        assert_eq!(rain.last_daily_rain_count(), None);
    }

    #[test]
    fn test_unknown_rain_bucket_is_an_error() {
        let mut rain = mapper(MapperKind::Rain { tx: 1 });
        let packet = broadcast(json!({"rain_size": 7, "rain_rate_last": 0, "rainfall_daily": 1}));

        let err = rain.apply(&packet, &mut Record::new()).unwrap_err();
        assert_eq!(err, MappingError::UnknownRainBucketSize(7.0));
    }

    #[test]
    fn test_rain_bucket_factor_table() {
        assert_eq!(rain_bucket_factor(1.0).unwrap(), 0.01);
        assert_eq!(rain_bucket_factor(4.0).unwrap(), 0.001);
        assert_eq!(rain_bucket_factor(3.0).unwrap(), 0.1 / 25.4);
        assert!(rain_bucket_factor(0.0).is_err());
        assert!(rain_bucket_factor(1.5).is_err());
    }

    #[test]
    fn test_thw_writes_app_temp_when_granted() {
        let mut thw = mapper(MapperKind::Thw {
            tx: 1,
            app_temp: true,
        });
        let mut record = Record::new();
        thw.apply(&broadcast(json!({"thw_index": 55.0})), &mut record)
            .unwrap();

        assert_eq!(record.value("thw"), Some(55.0));
        assert_eq!(record.value("appTemp"), Some(55.0));
    }

    #[test]
    fn test_battery_named_targets() {
        let mut battery = mapper(MapperKind::Battery {
            tx: 1,
            named: vec!["outTemp", "wind"],
        });
        let mut record = Record::new();
        battery
            .apply(&poll(json!({"trans_battery_flag": 0})), &mut record)
            .unwrap();

        assert_eq!(record.value("batteryStatus1"), Some(0.0));
        assert_eq!(record.value("outTempBatteryStatus"), Some(0.0));
        assert_eq!(record.value("windBatteryStatus"), Some(0.0));
    }

    #[test]
    fn test_voltage_reads_health_entry() {
        let body = json!({
            "did": "x",
            "ts": 1,
            "conditions": [
                {"data_structure_type": 1, "txid": 1, "trans_battery": 3.1,
                 "solar_volt_last": 4.2, "supercap_volt_last": 2.5},
                {"data_structure_type": 15, "battery_voltage": 4.1, "input_voltage": 5.0}
            ]
        });
        let packet = ObservationPacket::from_broadcast(&body).unwrap();
        let mut voltage = mapper(MapperKind::Voltage { tx: 1 });

        let mut record = Record::new();
        voltage.apply(&packet, &mut record).unwrap();

        assert_eq!(record.value("supplyVoltage"), Some(3.1));
        assert_eq!(record.value("heatingVoltage"), Some(4.2));
        assert_eq!(record.value("referenceVoltage"), Some(2.5));
        assert_eq!(record.value("consBatteryVoltage"), Some(4.1));
        assert_eq!(record.value("consSupplyVoltage"), Some(5.0));
    }

    #[test]
    fn test_kind_display_and_labels() {
        let kind = MapperKind::SoilTemperature { tx: 2, port: 1 };
        assert_eq!(kind.to_string(), "soil_temp:2:1");
        assert_eq!(MapperKind::Barometer.to_string(), "baro");

        let soil = mapper(kind);
        assert_eq!(soil.source_label(), "TX 2");
        assert_eq!(soil.map_table(), vec![(role::SOIL_TEMPERATURE, "soilTemp1")]);
    }
}
