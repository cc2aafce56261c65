//! Wire protocol for tap → collector messages
//!
//! Two-frame ZMQ messages: a topic frame and a msgpack map payload. Every
//! field is present in every message, null when unknown, so receivers never
//! key-check. Adding fields is non-breaking; receivers ignore unknown keys.
//! Type changes or removals bump `protocol_version`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bumped only on breaking changes
pub const PROTOCOL_VERSION: u8 = 1;

pub const TOPIC_UAV: &[u8] = b"uav";
pub const TOPIC_HEARTBEAT: &[u8] = b"heartbeat";
/// Reserved for future tap-side alerting
pub const TOPIC_ALERT: &[u8] = b"alert";

pub const MSG_UAV_REPORT: &str = "uav_report";
pub const MSG_TAP_HEARTBEAT: &str = "tap_heartbeat";

/// Full per-update airframe report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UavReport {
    #[serde(rename = "type")]
    pub kind: String,
    pub protocol_version: u8,
    pub tap_uuid: String,
    /// ISO-8601 UTC
    pub timestamp: String,
    /// Lowercase colon-separated source MAC
    pub mac: String,
    /// Best identifier under the serial > registration > UTM > operator >
    /// MAC-hash precedence; never empty
    pub identifier: String,
    pub detection_source: String,
    // Position
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_geodetic: Option<f64>,
    pub altitude_pressure: Option<f64>,
    pub height: Option<f64>,
    pub height_type: Option<u8>,
    // Movement
    pub ground_track: Option<f64>,
    pub speed: Option<f64>,
    pub vertical_speed: Option<f64>,
    // Identity
    pub id_serial: Option<String>,
    pub id_registration: Option<String>,
    pub id_utm: Option<String>,
    pub id_session: Option<String>,
    pub uav_type: String,
    pub operational_status: Option<String>,
    // Operator
    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub operator_altitude: Option<f64>,
    pub operator_id: Option<String>,
    pub operator_location_type: Option<u8>,
    // Signal
    pub rssi: Option<f64>,
    pub ssid: Option<String>,
    // Accuracy (meters / m/s)
    pub accuracy_horizontal: Option<f64>,
    pub accuracy_vertical: Option<f64>,
    pub accuracy_barometer: Option<f64>,
    pub accuracy_speed: Option<f64>,
    // EU classification
    pub category_eu: Option<u8>,
    pub class_eu: Option<u8>,
    // Operating area
    pub area_count: Option<u16>,
    pub area_radius: Option<f64>,
    pub area_ceiling: Option<f64>,
    pub area_floor: Option<f64>,
    // Security
    pub spoof_flags: Vec<String>,
    pub trust_score: u8,
    pub auth_type: Option<u8>,
    pub auth_data: Option<String>,
    // Enrichment
    pub designation: Option<String>,
    pub message_types_seen: Vec<u8>,
    pub self_id_description: Option<String>,
    pub self_id_type: Option<u8>,
    /// Dissector fields verbatim, full fidelity
    pub raw_fields: HashMap<String, String>,
}

/// Periodic tap health and pipeline telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapHeartbeat {
    #[serde(rename = "type")]
    pub kind: String,
    pub protocol_version: u8,
    pub tap_uuid: String,
    pub tap_name: String,
    pub timestamp: String,
    pub version: String,
    pub interface: String,
    pub channel: u16,
    pub cpu_load: f64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_percent: f64,
    /// Degrees Celsius, null when no thermal sensor is present
    pub temperature: Option<f64>,
    pub disk_free: Option<u64>,
    /// Cumulative bytes written, SD-wear proxy
    pub disk_writes_total: Option<u64>,
    pub latitude: f64,
    pub longitude: f64,
    pub frames_total: u64,
    pub frames_parsed: u64,
    pub tshark_running: bool,
    pub tap_uptime: f64,
    pub channels: Vec<u16>,
    pub capture_errors: u64,
}

/// Encode a message for the wire: a self-describing msgpack map with field
/// names, binary-safe strings.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(msg)
}
