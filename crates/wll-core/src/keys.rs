//! Observation key names used by the WeatherLink Live local API

pub const DEVICE_ID: &str = "did";
pub const TIMESTAMP: &str = "ts";
pub const CONDITIONS: &str = "conditions";
pub const DATA_STRUCTURE_TYPE: &str = "data_structure_type";
pub const TRANSMITTER_ID: &str = "txid";
pub const LOGICAL_SENSOR_ID: &str = "lsid";

// ISS
pub const TEMPERATURE: &str = "temp";
pub const HUMIDITY: &str = "hum";
pub const DEW_POINT: &str = "dew_point";
pub const WET_BULB: &str = "wet_bulb";
pub const HEAT_INDEX: &str = "heat_index";
pub const WIND_CHILL: &str = "wind_chill";
pub const THW_INDEX: &str = "thw_index";
pub const THSW_INDEX: &str = "thsw_index";
pub const WIND_SPEED: &str = "wind_speed_last";
pub const WIND_DIR: &str = "wind_dir_last";
pub const GUST_SPEED: &str = "wind_speed_hi";
pub const GUST_DIR: &str = "wind_speed_hi_dir";
pub const RAIN_SIZE: &str = "rain_size";
pub const RAIN_RATE: &str = "rain_rate_last";
pub const RAIN_AMOUNT_DAILY: &str = "rainfall_daily";
pub const RAIN_AMOUNT: &str = "rainfall";
pub const SOLAR_RADIATION: &str = "solar_rad";
pub const UV_INDEX: &str = "uv_index";
pub const BATTERY_FLAG: &str = "trans_battery_flag";
pub const ISS_BATTERY: &str = "trans_battery";
pub const ISS_PANEL: &str = "solar_volt_last";
pub const ISS_SUPERCAP: &str = "supercap_volt_last";

// Reception diagnostics per transmitter
pub const RECEPTION: &str = "reception";
pub const RSSI: &str = "rssi";
pub const ERROR_PACKETS: &str = "error_packets";
pub const RESYNCHS: &str = "resynchs";
pub const GOOD_PACKETS_STREAK: &str = "good_packets_streak";

// Leaf/soil, indexed by sensor port
pub fn leaf_soil_temperature(port: u8) -> String {
    format!("temp_{port}")
}

pub fn soil_moisture(port: u8) -> String {
    format!("moist_soil_{port}")
}

pub fn leaf_wetness(port: u8) -> String {
    format!("wet_leaf_{port}")
}

// Built-in indoor sensor
pub const TEMPERATURE_INDOOR: &str = "temp_in";
pub const HUMIDITY_INDOOR: &str = "hum_in";
pub const DEW_POINT_INDOOR: &str = "dew_point_in";
pub const HEAT_INDEX_INDOOR: &str = "heat_index_in";

// Built-in barometer
pub const BARO_ABSOLUTE: &str = "bar_absolute";
pub const BARO_SEA_LEVEL: &str = "bar_sea_level";

// Device health
pub const WLL_BATTERY: &str = "battery_voltage";
pub const WLL_SUPPLY: &str = "input_voltage";
pub const UPTIME: &str = "uptime";
pub const RX_BYTES: &str = "rx_bytes";
pub const TX_BYTES: &str = "tx_bytes";
pub const LOCAL_API_QUERIES: &str = "local_api_queries";
pub const RAPID_RECORDS_SENT: &str = "rapid_records_sent";
pub const WIFI_RSSI: &str = "wifi_rssi";
pub const LINK_UPTIME: &str = "link_uptime";
pub const NETWORK_ERROR: &str = "network_error";
pub const TOUCHPAD_WAKEUPS: &str = "touchpad_wakeups";
