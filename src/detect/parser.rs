//! Frame payload parser
//!
//! Turns one [`FrameRecord`] into at most one [`DetectionEvent`]. Decoding
//! cases in order: ASTM Remote-ID vendor element, DJI proprietary element,
//! WiFi fingerprint fallback. Malformed payloads are reported as such so
//! the processor can count them; they never propagate as errors.

use std::sync::Arc;

use crate::capture::frame::FrameRecord;
use crate::remoteid::astm::{self, REMOTE_ID_OUI, REMOTE_ID_VENDOR_TYPE};
use crate::remoteid::dji;
use crate::remoteid::types::{IdType, RemoteIdMessage};

use super::fingerprint::FingerprintMatcher;
use super::{DetectionEvent, DetectionSource, UavFields};

/// Outcome of parsing one frame.
#[derive(Debug)]
pub enum ParseOutcome {
    /// The frame yielded a detection
    Detection(DetectionEvent),
    /// Ordinary WiFi traffic, nothing drone-related
    Ignored,
    /// A drone-protocol payload that failed to decode
    Malformed,
}

pub struct FrameParser {
    fingerprints: Arc<FingerprintMatcher>,
}

impl FrameParser {
    pub fn new(fingerprints: Arc<FingerprintMatcher>) -> Self {
        Self { fingerprints }
    }

    pub fn parse(&self, record: &FrameRecord) -> ParseOutcome {
        if let Some(payload) = record.vendor_payload.as_deref() {
            if payload.len() > 4 && payload[..3] == REMOTE_ID_OUI {
                return self.parse_remote_id(record, payload);
            }
            if dji::is_dji_payload(payload) {
                return self.parse_dji(record, payload);
            }
        }
        self.parse_fingerprint(record)
    }

    fn parse_remote_id(&self, record: &FrameRecord, payload: &[u8]) -> ParseOutcome {
        if payload[3] != REMOTE_ID_VENDOR_TYPE {
            return ParseOutcome::Malformed;
        }
        let messages = match astm::decode_broadcast(&payload[4..]) {
            Some(m) => m,
            None => return ParseOutcome::Malformed,
        };

        let (mut fields, message_types) = fields_from_messages(&messages);
        fields.rssi = record.rssi;
        fields.ssid = record.ssid.clone();

        // A Remote-ID detection with no identity and no position carries
        // nothing the collector can use
        if fields.id_serial.is_none()
            && fields.id_registration.is_none()
            && fields.latitude.is_none()
        {
            return ParseOutcome::Malformed;
        }

        ParseOutcome::Detection(DetectionEvent {
            mac: record.source,
            timestamp: record.timestamp,
            source: DetectionSource::RemoteIdWiFi,
            channel: record.channel,
            fields,
            message_types,
            model_hint: None,
            raw_fields: record.fields.clone(),
        })
    }

    fn parse_dji(&self, record: &FrameRecord, payload: &[u8]) -> ParseOutcome {
        let info = match dji::decode_flight_info(&payload[3..]) {
            Some(i) => i,
            None => return ParseOutcome::Malformed,
        };
        let model_hint = info.product_name().map(str::to_string);

        let serial = if info.serial.is_empty() {
            dji::placeholder_serial(&record.source)
        } else {
            info.serial.clone()
        };

        let fields = UavFields {
            id_serial: Some(serial),
            latitude: info.latitude,
            longitude: info.longitude,
            altitude_geodetic: info.altitude,
            height: info.height,
            height_type: info.height.map(|_| 0),
            speed: info.speed,
            ground_track: info.ground_track,
            vertical_speed: info.vertical_speed,
            operator_latitude: info.pilot_latitude,
            operator_longitude: info.pilot_longitude,
            rssi: record.rssi,
            ssid: record.ssid.clone(),
            ..Default::default()
        };

        ParseOutcome::Detection(DetectionEvent {
            mac: record.source,
            timestamp: record.timestamp,
            source: DetectionSource::DjiProprietaryDroneId,
            channel: record.channel,
            fields,
            message_types: Vec::new(),
            model_hint,
            raw_fields: record.fields.clone(),
        })
    }

    fn parse_fingerprint(&self, record: &FrameRecord) -> ParseOutcome {
        let ssid_hit = record
            .ssid
            .as_deref()
            .and_then(|s| self.fingerprints.match_ssid(s));
        let oui_hit = self.fingerprints.match_oui(&record.source);

        let model_hint = match (&ssid_hit, oui_hit) {
            (Some(hit), _) => hit.model.clone(),
            (None, Some(_)) => None,
            (None, None) => return ParseOutcome::Ignored,
        };

        let fields = UavFields {
            rssi: record.rssi,
            ssid: record.ssid.clone(),
            ..Default::default()
        };

        ParseOutcome::Detection(DetectionEvent {
            mac: record.source,
            timestamp: record.timestamp,
            source: DetectionSource::WiFiFingerprint,
            channel: record.channel,
            fields,
            message_types: Vec::new(),
            model_hint,
            raw_fields: record.fields.clone(),
        })
    }
}

/// Flatten decoded ASTM messages into the field set, collecting the
/// message types seen.
fn fields_from_messages(messages: &[RemoteIdMessage]) -> (UavFields, Vec<u8>) {
    let mut fields = UavFields::default();
    let mut types = Vec::new();

    for msg in messages {
        types.push(msg.message_type());
        match msg {
            RemoteIdMessage::BasicId {
                id_type,
                ua_type,
                id,
            } => {
                if !id.is_empty() {
                    match id_type {
                        IdType::SerialNumber => fields.id_serial = Some(id.clone()),
                        IdType::CaaRegistration => fields.id_registration = Some(id.clone()),
                        IdType::UtmAssigned => fields.id_utm = Some(id.clone()),
                        IdType::SpecificSession => fields.id_session = Some(id.clone()),
                        IdType::None | IdType::Reserved(_) => {}
                    }
                }
                fields.ua_type = Some(*ua_type);
            }
            RemoteIdMessage::Location {
                status,
                height_type,
                ground_track,
                speed,
                vertical_speed,
                latitude,
                longitude,
                altitude_pressure,
                altitude_geodetic,
                height,
                accuracy_horizontal,
                accuracy_vertical,
                accuracy_barometer,
                accuracy_speed,
            } => {
                fields.operational_status = Some(*status);
                fields.height_type = Some(*height_type);
                fields.ground_track = *ground_track;
                fields.speed = *speed;
                fields.vertical_speed = *vertical_speed;
                fields.latitude = *latitude;
                fields.longitude = *longitude;
                fields.altitude_pressure = *altitude_pressure;
                fields.altitude_geodetic = *altitude_geodetic;
                fields.height = *height;
                fields.accuracy_horizontal = *accuracy_horizontal;
                fields.accuracy_vertical = *accuracy_vertical;
                fields.accuracy_barometer = *accuracy_barometer;
                fields.accuracy_speed = *accuracy_speed;
            }
            RemoteIdMessage::Authentication {
                auth_type, data, ..
            } => {
                fields.auth_type = Some(*auth_type);
                let page_hex = hex_string(data);
                fields.auth_data = Some(match fields.auth_data.take() {
                    Some(existing) => existing + &page_hex,
                    None => page_hex,
                });
            }
            RemoteIdMessage::SelfId {
                desc_type,
                description,
            } => {
                fields.self_id_type = Some(*desc_type);
                if !description.is_empty() {
                    fields.self_id_description = Some(description.clone());
                }
            }
            RemoteIdMessage::System {
                operator_location_type,
                operator_latitude,
                operator_longitude,
                operator_altitude,
                area_count,
                area_radius,
                area_ceiling,
                area_floor,
                category_eu,
                class_eu,
            } => {
                fields.operator_location_type = Some(*operator_location_type);
                fields.operator_latitude = *operator_latitude;
                fields.operator_longitude = *operator_longitude;
                fields.operator_altitude = *operator_altitude;
                fields.area_count = *area_count;
                fields.area_radius = *area_radius;
                fields.area_ceiling = *area_ceiling;
                fields.area_floor = *area_floor;
                fields.category_eu = *category_eu;
                fields.class_eu = *class_eu;
            }
            RemoteIdMessage::OperatorId { operator_id, .. } => {
                if !operator_id.is_empty() {
                    fields.operator_id = Some(operator_id.clone());
                }
            }
        }
    }

    (fields, types)
}

fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
