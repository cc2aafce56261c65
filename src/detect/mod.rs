//! Detection pipeline
//!
//! Routes captured frames through payload decoding, per-airframe state
//! tracking, and spoof heuristics.

pub mod correlator;
pub mod designation;
pub mod fingerprint;
pub mod parser;
pub mod spoof;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::frame::MacAddr;
use crate::remoteid::types::{OperationalStatus, UaType};

/// How an airframe was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    /// Standard ASTM F3411 broadcast
    RemoteIdWiFi,
    /// DJI vendor element, present even without Remote-ID compliance
    #[serde(rename = "DJIProprietaryDroneID")]
    DjiProprietaryDroneId,
    /// SSID / OUI heuristics only: presence and signal, no telemetry
    WiFiFingerprint,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::RemoteIdWiFi => "RemoteIdWiFi",
            DetectionSource::DjiProprietaryDroneId => "DJIProprietaryDroneID",
            DetectionSource::WiFiFingerprint => "WiFiFingerprint",
        }
    }
}

/// Every protocol field an observation can carry. All optional; the
/// correlator fuses these into [`correlator::UavState`] under the
/// non-null overwrite rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UavFields {
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
    pub ua_type: Option<UaType>,
    pub operational_status: Option<OperationalStatus>,
    // Operator
    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub operator_altitude: Option<f64>,
    pub operator_id: Option<String>,
    pub operator_location_type: Option<u8>,
    // Signal
    pub rssi: Option<f64>,
    pub ssid: Option<String>,
    // Accuracy
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
    // Authentication
    pub auth_type: Option<u8>,
    pub auth_data: Option<String>,
    // Self-ID
    pub self_id_description: Option<String>,
    pub self_id_type: Option<u8>,
}

/// Overwrite only when the incoming value is present.
fn fuse<T: Clone>(current: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *current = incoming.clone();
    }
}

impl UavFields {
    /// Merge a newer observation in: non-null fields overwrite, null fields
    /// never regress an already-known value.
    pub fn merge(&mut self, other: &UavFields) {
        fuse(&mut self.latitude, &other.latitude);
        fuse(&mut self.longitude, &other.longitude);
        fuse(&mut self.altitude_geodetic, &other.altitude_geodetic);
        fuse(&mut self.altitude_pressure, &other.altitude_pressure);
        fuse(&mut self.height, &other.height);
        fuse(&mut self.height_type, &other.height_type);
        fuse(&mut self.ground_track, &other.ground_track);
        fuse(&mut self.speed, &other.speed);
        fuse(&mut self.vertical_speed, &other.vertical_speed);
        fuse(&mut self.id_serial, &other.id_serial);
        fuse(&mut self.id_registration, &other.id_registration);
        fuse(&mut self.id_utm, &other.id_utm);
        fuse(&mut self.id_session, &other.id_session);
        fuse(&mut self.ua_type, &other.ua_type);
        fuse(&mut self.operational_status, &other.operational_status);
        fuse(&mut self.operator_latitude, &other.operator_latitude);
        fuse(&mut self.operator_longitude, &other.operator_longitude);
        fuse(&mut self.operator_altitude, &other.operator_altitude);
        fuse(&mut self.operator_id, &other.operator_id);
        fuse(&mut self.operator_location_type, &other.operator_location_type);
        fuse(&mut self.rssi, &other.rssi);
        fuse(&mut self.ssid, &other.ssid);
        fuse(&mut self.accuracy_horizontal, &other.accuracy_horizontal);
        fuse(&mut self.accuracy_vertical, &other.accuracy_vertical);
        fuse(&mut self.accuracy_barometer, &other.accuracy_barometer);
        fuse(&mut self.accuracy_speed, &other.accuracy_speed);
        fuse(&mut self.category_eu, &other.category_eu);
        fuse(&mut self.class_eu, &other.class_eu);
        fuse(&mut self.area_count, &other.area_count);
        fuse(&mut self.area_radius, &other.area_radius);
        fuse(&mut self.area_ceiling, &other.area_ceiling);
        fuse(&mut self.area_floor, &other.area_floor);
        fuse(&mut self.auth_type, &other.auth_type);
        fuse(&mut self.auth_data, &other.auth_data);
        fuse(&mut self.self_id_description, &other.self_id_description);
        fuse(&mut self.self_id_type, &other.self_id_type);
    }
}

/// One successfully decoded observation, ready for the correlator.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub mac: MacAddr,
    pub timestamp: DateTime<Utc>,
    pub source: DetectionSource,
    pub channel: Option<u16>,
    pub fields: UavFields,
    /// ASTM message types this observation carried
    pub message_types: Vec<u8>,
    /// Model hint from the payload itself (DJI product type, SSID model)
    pub model_hint: Option<String>,
    /// Dissector fields verbatim, for full-fidelity forwarding
    pub raw_fields: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_no_regression() {
        let mut state = UavFields {
            latitude: Some(47.0),
            id_serial: Some("ABC".into()),
            ..Default::default()
        };
        let update = UavFields {
            latitude: None,
            longitude: Some(-122.0),
            id_serial: None,
            ..Default::default()
        };
        state.merge(&update);
        assert_eq!(state.latitude, Some(47.0));
        assert_eq!(state.longitude, Some(-122.0));
        assert_eq!(state.id_serial.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_merge_overwrites_with_newer_value() {
        let mut state = UavFields {
            speed: Some(3.0),
            ..Default::default()
        };
        let update = UavFields {
            speed: Some(9.5),
            ..Default::default()
        };
        state.merge(&update);
        assert_eq!(state.speed, Some(9.5));
    }
}
