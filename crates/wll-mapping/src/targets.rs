//! Candidate output field names per semantic slot
//!
//! The n-th mapper of a kind gets the n-th free candidate of each of its
//! slots; see [`crate::reservation`].

use wll_core::keys;

pub const TEMPERATURE: &[&str] = &[
    "outTemp",
    "extraTemp1",
    "extraTemp2",
    "extraTemp3",
    "extraTemp4",
    "extraTemp5",
    "extraTemp6",
    "extraTemp7",
    "extraTemp8",
];

pub const HUMIDITY: &[&str] = &[
    "outHumidity",
    "extraHumid1",
    "extraHumid2",
    "extraHumid3",
    "extraHumid4",
    "extraHumid5",
    "extraHumid6",
    "extraHumid7",
    "extraHumid8",
];

pub const DEW_POINT: &[&str] = &[
    "dewpoint",
    "dewpoint1",
    "dewpoint2",
    "dewpoint3",
    "dewpoint4",
    "dewpoint5",
    "dewpoint6",
    "dewpoint7",
    "dewpoint8",
];

pub const HEAT_INDEX: &[&str] = &[
    "heatindex",
    "heatindex1",
    "heatindex2",
    "heatindex3",
    "heatindex4",
    "heatindex5",
    "heatindex6",
    "heatindex7",
    "heatindex8",
];

pub const WET_BULB: &[&str] = &[
    "wetbulb",
    "wetbulb1",
    "wetbulb2",
    "wetbulb3",
    "wetbulb4",
    "wetbulb5",
    "wetbulb6",
    "wetbulb7",
    "wetbulb8",
];

// Wind
pub const WIND_DIR: &[&str] = &["windDir"];
pub const WIND_SPEED: &[&str] = &["windSpeed"];
pub const WIND_GUST_DIR: &[&str] = &["windGustDir"];
pub const WIND_GUST_SPEED: &[&str] = &["windGust"];

// Rain
pub const RAIN_AMOUNT: &[&str] = &["rain"];
pub const RAIN_RATE: &[&str] = &["rainRate"];
pub const RAIN_COUNT: &[&str] = &["rainCount"];
pub const RAIN_COUNT_RATE: &[&str] = &["rainCountRate"];
pub const RAIN_SIZE: &[&str] = &["rainSize"];

pub const SOLAR_RADIATION: &[&str] = &["radiation"];
pub const UV: &[&str] = &["UV"];
pub const WINDCHILL: &[&str] = &["windchill"];
pub const THW: &[&str] = &["thw"];
pub const THSW: &[&str] = &["thsw"];

/// Shared between THW and THSW; only the first mapper asking for it gets it
pub const APPARENT_TEMPERATURE: &str = "appTemp";

pub const SOIL_TEMPERATURE: &[&str] = &["soilTemp1", "soilTemp2", "soilTemp3", "soilTemp4"];
pub const SOIL_MOISTURE: &[&str] = &["soilMoist1", "soilMoist2", "soilMoist3", "soilMoist4"];
pub const LEAF_WETNESS: &[&str] = &["leafWet1", "leafWet2"];

// Built-in sensors
pub const INDOOR_TEMPERATURE: &[&str] = &["inTemp"];
pub const INDOOR_HUMIDITY: &[&str] = &["inHumidity"];
pub const INDOOR_DEW_POINT: &[&str] = &["inDewpoint"];
pub const INDOOR_HEAT_INDEX: &[&str] = &["inHeatindex"];
pub const BARO_ABSOLUTE: &[&str] = &["pressure"];
// the WLL doesn't use temperature to reduce to sea level
pub const BARO_SEA_LEVEL: &[&str] = &["altimeter"];

pub const BATTERY_STATUS: &[&str] = &[
    "batteryStatus1",
    "batteryStatus2",
    "batteryStatus3",
    "batteryStatus4",
    "batteryStatus5",
    "batteryStatus6",
    "batteryStatus7",
    "batteryStatus8",
];

/// Option name -> extra battery field
pub const BATTERY_STATUS_NAMED: &[(&str, &str)] = &[
    ("outTemp", "outTempBatteryStatus"),
    ("rain", "rainBatteryStatus"),
    ("tx", "txBatteryStatus"),
    ("uv", "uvBatteryStatus"),
    ("wind", "windBatteryStatus"),
];

/// Transmitter observation -> voltage field
pub const VOLTAGE_NAMED: &[(&str, &str)] = &[
    (keys::ISS_BATTERY, "supplyVoltage"),
    (keys::ISS_PANEL, "heatingVoltage"),
    (keys::ISS_SUPERCAP, "referenceVoltage"),
];

pub const VOLTAGE_WLL_BATTERY: &str = "consBatteryVoltage";
pub const VOLTAGE_WLL_SUPPLY: &str = "consSupplyVoltage";

/// Per-transmitter reception diagnostics
pub const COMM_TRANSMITTER: &[(&str, &str)] = &[
    (keys::RECEPTION, "reception"),
    (keys::RSSI, "rssi"),
    (keys::ERROR_PACKETS, "errorPackets"),
    (keys::RESYNCHS, "resyncs"),
    (keys::GOOD_PACKETS_STREAK, "goodPacketsStreaks"),
];

/// Device health counters
pub const COMM_HEALTH: &[(&str, &str)] = &[
    (keys::UPTIME, "uptime"),
    (keys::RX_BYTES, "rxBytes"),
    (keys::TX_BYTES, "txBytes"),
    (keys::LOCAL_API_QUERIES, "localApiQueries"),
    (keys::RAPID_RECORDS_SENT, "rapidRecordsSent"),
    (keys::WIFI_RSSI, "wifiRssi"),
    (keys::LINK_UPTIME, "linkUptime"),
    (keys::NETWORK_ERROR, "networkError"),
    (keys::TOUCHPAD_WAKEUPS, "touchpadWakeups"),
];

pub fn battery_named(option: &str) -> Option<&'static str> {
    BATTERY_STATUS_NAMED
        .iter()
        .find(|(key, _)| *key == option)
        .map(|(_, target)| *target)
}
