//! Per-airframe state tracking
//!
//! Single owner of the UAV table, keyed by source MAC. Fuses multi-message
//! observations, elects the best identifier, runs the spoof detector, and
//! produces one full report per update. Tracks not heard from within the
//! starvation window are evicted silently; downstream handles staleness.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::capture::frame::MacAddr;
use crate::protocol::{UavReport, MSG_UAV_REPORT, PROTOCOL_VERSION};

use super::designation::designate;
use super::fingerprint::FingerprintMatcher;
use super::spoof::{self, PositionFix, PriorView, SpoofFlag};
use super::{DetectionEvent, DetectionSource, UavFields};

/// Most-recent distinct position fixes retained per track
const HISTORY_CAP: usize = 8;

/// Long-lived state for one airframe.
#[derive(Debug, Clone)]
pub struct UavState {
    pub mac: MacAddr,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub detection_source: DetectionSource,
    pub fields: UavFields,
    pub message_types_seen: BTreeSet<u8>,
    pub spoof_flags: BTreeSet<SpoofFlag>,
    pub trust_score: u8,
    pub identifier: String,
    pub designation: Option<String>,
    pub model_hint: Option<String>,
    pub history: VecDeque<PositionFix>,
    pub channel: Option<u16>,
    pub raw_fields: HashMap<String, String>,
}

impl UavState {
    fn new(event: &DetectionEvent) -> Self {
        Self {
            mac: event.mac,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            detection_source: event.source,
            fields: UavFields::default(),
            message_types_seen: BTreeSet::new(),
            spoof_flags: BTreeSet::new(),
            trust_score: 100,
            identifier: String::new(),
            designation: None,
            model_hint: None,
            history: VecDeque::with_capacity(HISTORY_CAP),
            channel: None,
            raw_fields: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CorrelatorStats {
    pub events_processed: u64,
    pub tracks_created: u64,
    pub tracks_evicted: u64,
}

/// The UAV state table and its update logic.
pub struct Correlator {
    tracks: HashMap<MacAddr, UavState>,
    fingerprints: Arc<FingerprintMatcher>,
    tap_uuid: String,
    stale_after: Duration,
    stats: CorrelatorStats,
}

impl Correlator {
    pub fn new(tap_uuid: String, stale_after_s: u64, fingerprints: Arc<FingerprintMatcher>) -> Self {
        Self {
            tracks: HashMap::new(),
            fingerprints,
            tap_uuid,
            stale_after: Duration::seconds(stale_after_s as i64),
            stats: CorrelatorStats::default(),
        }
    }

    /// Apply one detection event and produce the resulting report.
    pub fn apply(&mut self, event: DetectionEvent) -> UavReport {
        self.stats.events_processed += 1;

        let state = self.tracks.entry(event.mac).or_insert_with(|| {
            self.stats.tracks_created += 1;
            debug!("new track for {}", event.mac);
            UavState::new(&event)
        });

        // Spoof checks run against the pre-update state
        let prior = PriorView {
            last_fix: state.history.back(),
            id_serial: state.fields.id_serial.as_deref(),
            operator_position: match (
                state.fields.operator_latitude,
                state.fields.operator_longitude,
            ) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            },
        };
        let new_flags = spoof::evaluate(&prior, event.timestamp, &event.fields);

        state.spoof_flags.extend(new_flags);
        state.trust_score = spoof::trust_score(&state.spoof_flags);

        state.fields.merge(&event.fields);
        state.last_seen = event.timestamp;
        state.detection_source = event.source;
        state.message_types_seen.extend(event.message_types.iter());
        if event.channel.is_some() {
            state.channel = event.channel;
        }
        if event.model_hint.is_some() {
            state.model_hint = event.model_hint.clone();
        }
        if !event.raw_fields.is_empty() {
            state.raw_fields = event.raw_fields;
        }

        // Append to the fix history only when the position is new
        if let (Some(lat), Some(lon)) = (event.fields.latitude, event.fields.longitude) {
            let same_as_tail = state
                .history
                .back()
                .map(|f| f.latitude == lat && f.longitude == lon)
                .unwrap_or(false);
            if !same_as_tail {
                if state.history.len() == HISTORY_CAP {
                    state.history.pop_front();
                }
                state.history.push_back(PositionFix {
                    timestamp: event.timestamp,
                    latitude: lat,
                    longitude: lon,
                    altitude: event.fields.altitude_geodetic,
                });
            }
        }

        state.identifier = elect_identifier(&state.fields, &state.mac);
        state.designation = designate(
            &state.fields,
            state.model_hint.as_deref(),
            &state.mac,
            &self.fingerprints,
        );

        build_report(&self.tap_uuid, state)
    }

    /// Remove tracks not heard from within the starvation window.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.stale_after;
        let before = self.tracks.len();
        self.tracks.retain(|mac, state| {
            let keep = state.last_seen > cutoff;
            if !keep {
                debug!("evicting stale track {}", mac);
            }
            keep
        });
        let removed = before - self.tracks.len();
        self.stats.tracks_evicted += removed as u64;
        removed
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&UavState> {
        self.tracks.get(mac)
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

/// Best-identifier election: serial, then registration, then UTM, then
/// operator ID, then a stable MAC hash (first 8 hex of SHA-256 over the
/// canonical lowercase address).
pub fn elect_identifier(fields: &UavFields, mac: &MacAddr) -> String {
    fields
        .id_serial
        .clone()
        .or_else(|| fields.id_registration.clone())
        .or_else(|| fields.id_utm.clone())
        .or_else(|| fields.operator_id.clone())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| mac_hash(mac))
}

fn mac_hash(mac: &MacAddr) -> String {
    let digest = Sha256::digest(mac.to_string().as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

fn build_report(tap_uuid: &str, state: &UavState) -> UavReport {
    let f = &state.fields;
    UavReport {
        kind: MSG_UAV_REPORT.to_string(),
        protocol_version: PROTOCOL_VERSION,
        tap_uuid: tap_uuid.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        mac: state.mac.to_string(),
        identifier: state.identifier.clone(),
        detection_source: state.detection_source.as_str().to_string(),
        latitude: f.latitude,
        longitude: f.longitude,
        altitude_geodetic: f.altitude_geodetic,
        altitude_pressure: f.altitude_pressure,
        height: f.height,
        height_type: f.height_type,
        ground_track: f.ground_track,
        speed: f.speed,
        vertical_speed: f.vertical_speed,
        id_serial: f.id_serial.clone(),
        id_registration: f.id_registration.clone(),
        id_utm: f.id_utm.clone(),
        id_session: f.id_session.clone(),
        uav_type: f.ua_type.map(|t| t.name()).unwrap_or("OTHER").to_string(),
        operational_status: f.operational_status.map(|s| s.name().to_string()),
        operator_latitude: f.operator_latitude,
        operator_longitude: f.operator_longitude,
        operator_altitude: f.operator_altitude,
        operator_id: f.operator_id.clone(),
        operator_location_type: f.operator_location_type,
        rssi: f.rssi,
        ssid: f.ssid.clone(),
        accuracy_horizontal: f.accuracy_horizontal,
        accuracy_vertical: f.accuracy_vertical,
        accuracy_barometer: f.accuracy_barometer,
        accuracy_speed: f.accuracy_speed,
        category_eu: f.category_eu,
        class_eu: f.class_eu,
        area_count: f.area_count,
        area_radius: f.area_radius,
        area_ceiling: f.area_ceiling,
        area_floor: f.area_floor,
        spoof_flags: state.spoof_flags.iter().map(|f| f.tag().to_string()).collect(),
        trust_score: state.trust_score,
        auth_type: f.auth_type,
        auth_data: f.auth_data.clone(),
        designation: state.designation.clone(),
        message_types_seen: state.message_types_seen.iter().copied().collect(),
        self_id_description: f.self_id_description.clone(),
        self_id_type: f.self_id_type,
        raw_fields: state.raw_fields.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn matcher() -> Arc<FingerprintMatcher> {
        Arc::new(FingerprintMatcher::new())
    }

    fn event(mac: &str, fields: UavFields, types: &[u8]) -> DetectionEvent {
        DetectionEvent {
            mac: mac.parse().unwrap(),
            timestamp: Utc::now(),
            source: DetectionSource::RemoteIdWiFi,
            channel: Some(6),
            fields,
            message_types: types.to_vec(),
            model_hint: None,
            raw_fields: HashMap::new(),
        }
    }

    #[test]
    fn test_identifier_precedence() {
        let mac: MacAddr = "aa:bb:cc:00:00:01".parse().unwrap();
        let mut fields = UavFields {
            id_serial: Some("SER".into()),
            id_registration: Some("REG".into()),
            id_utm: Some("UTM".into()),
            operator_id: Some("OP".into()),
            ..Default::default()
        };
        assert_eq!(elect_identifier(&fields, &mac), "SER");
        fields.id_serial = None;
        assert_eq!(elect_identifier(&fields, &mac), "REG");
        fields.id_registration = None;
        assert_eq!(elect_identifier(&fields, &mac), "UTM");
        fields.id_utm = None;
        assert_eq!(elect_identifier(&fields, &mac), "OP");
        fields.operator_id = None;
        let hash = elect_identifier(&fields, &mac);
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across calls
        assert_eq!(hash, elect_identifier(&fields, &mac));
    }

    #[test]
    fn test_message_types_grow_monotonically() {
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        let mac = "aa:bb:cc:00:00:01";

        let r1 = correlator.apply(event(
            mac,
            UavFields {
                id_serial: Some("S1".into()),
                ..Default::default()
            },
            &[0],
        ));
        assert_eq!(r1.message_types_seen, vec![0]);

        let r2 = correlator.apply(event(
            mac,
            UavFields {
                latitude: Some(47.0),
                longitude: Some(-122.0),
                ..Default::default()
            },
            &[1],
        ));
        assert_eq!(r2.message_types_seen, vec![0, 1]);

        // Repeating a type does not shrink or duplicate
        let r3 = correlator.apply(event(mac, UavFields::default(), &[0]));
        assert_eq!(r3.message_types_seen, vec![0, 1]);
    }

    #[test]
    fn test_field_fusion_no_regression() {
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        let mac = "aa:bb:cc:00:00:02";

        correlator.apply(event(
            mac,
            UavFields {
                id_serial: Some("KEEP".into()),
                speed: Some(5.0),
                ..Default::default()
            },
            &[0, 1],
        ));
        let report = correlator.apply(event(mac, UavFields::default(), &[1]));
        assert_eq!(report.id_serial.as_deref(), Some("KEEP"));
        assert_eq!(report.speed, Some(5.0));
        assert_eq!(report.identifier, "KEEP");
    }

    #[test]
    fn test_history_distinct_fixes_only() {
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        let mac = "aa:bb:cc:00:00:03";
        let position = UavFields {
            latitude: Some(47.0),
            longitude: Some(-122.0),
            ..Default::default()
        };
        correlator.apply(event(mac, position.clone(), &[1]));
        correlator.apply(event(mac, position, &[1]));
        let state = correlator.get(&mac.parse().unwrap()).unwrap();
        assert_eq!(state.history.len(), 1);

        // Ring stays bounded
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        for i in 0..20 {
            correlator.apply(event(
                mac,
                UavFields {
                    latitude: Some(47.0 + i as f64 * 0.0001),
                    longitude: Some(-122.0),
                    ..Default::default()
                },
                &[1],
            ));
        }
        let state = correlator.get(&mac.parse().unwrap()).unwrap();
        assert_eq!(state.history.len(), HISTORY_CAP);
    }

    #[test]
    fn test_spoof_flags_persist() {
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        let mac = "aa:bb:cc:00:00:04";

        correlator.apply(event(
            mac,
            UavFields {
                id_serial: Some("A".into()),
                ..Default::default()
            },
            &[0],
        ));
        let churned = correlator.apply(event(
            mac,
            UavFields {
                id_serial: Some("B".into()),
                ..Default::default()
            },
            &[0],
        ));
        assert!(churned.spoof_flags.contains(&"identity_churn".to_string()));
        assert_eq!(churned.trust_score, 60);

        // Flag stays on later clean updates
        let later = correlator.apply(event(mac, UavFields::default(), &[0]));
        assert!(later.spoof_flags.contains(&"identity_churn".to_string()));
        assert_eq!(later.trust_score, 60);
    }

    #[test]
    fn test_eviction() {
        let mut correlator = Correlator::new("tap".into(), 30, matcher());
        correlator.apply(event(
            "aa:bb:cc:00:00:05",
            UavFields {
                id_serial: Some("S".into()),
                ..Default::default()
            },
            &[0],
        ));
        assert_eq!(correlator.track_count(), 1);
        assert_eq!(correlator.evict_stale(Utc::now() + Duration::seconds(31)), 1);
        assert_eq!(correlator.track_count(), 0);
    }

    #[test]
    fn test_report_identifier_matches_election() {
        let mut correlator = Correlator::new("tap".into(), 60, matcher());
        let report = correlator.apply(event(
            "aa:bb:cc:00:00:06",
            UavFields {
                id_registration: Some("N123UAV".into()),
                ..Default::default()
            },
            &[0],
        ));
        assert!(!report.identifier.is_empty());
        assert_eq!(report.identifier, "N123UAV");
        assert_eq!(report.kind, "uav_report");
        assert_eq!(report.protocol_version, 1);
    }
}
