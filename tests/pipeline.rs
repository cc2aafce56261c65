//! End-to-end pipeline scenarios: dissector EK lines through frame
//! decoding, payload parsing, correlation, and spoof scoring.

use std::sync::Arc;

use dronetap::capture::frame::FrameRecord;
use dronetap::detect::correlator::Correlator;
use dronetap::detect::fingerprint::FingerprintMatcher;
use dronetap::detect::parser::{FrameParser, ParseOutcome};
use dronetap::protocol::UavReport;

// --- ASTM message builders -------------------------------------------------

fn encode_altitude(alt: f64) -> u16 {
    ((alt + 1000.0) / 0.5) as u16
}

fn basic_id_message(id_type: u8, ua_type: u8, id: &str) -> [u8; 25] {
    let mut buf = [0u8; 25];
    buf[0] = 0x00; // Basic ID, version 0
    buf[1] = (id_type << 4) | (ua_type & 0x0f);
    buf[2..2 + id.len()].copy_from_slice(id.as_bytes());
    buf
}

fn location_message(lat: f64, lon: f64, alt: f64, speed: f64) -> [u8; 25] {
    let mut buf = [0u8; 25];
    buf[0] = 0x10; // Location, version 0
    buf[1] = 2 << 4; // Airborne, height above takeoff, east, mult 0
    buf[2] = 90; // ground track 90 deg
    buf[3] = (speed / 0.25) as u8;
    buf[4] = 2; // 1 m/s climb
    buf[5..9].copy_from_slice(&((lat / 1e-7) as i32).to_le_bytes());
    buf[9..13].copy_from_slice(&((lon / 1e-7) as i32).to_le_bytes());
    buf[13..15].copy_from_slice(&encode_altitude(alt - 5.0).to_le_bytes());
    buf[15..17].copy_from_slice(&encode_altitude(alt).to_le_bytes());
    buf[17..19].copy_from_slice(&encode_altitude(alt - 2.0).to_le_bytes());
    buf[19] = (4 << 4) | 10; // <10 m vertical, <10 m horizontal
    buf[20] = (4 << 4) | 3; // <10 m baro, <1 m/s speed
    buf
}

/// Remote-ID vendor element payload: OUI, vendor type, counter, pack.
fn remote_id_payload(messages: &[[u8; 25]]) -> Vec<u8> {
    let mut out = vec![0xfa, 0x0b, 0xbc, 0x0d, 0x00, 0xf0, 25, messages.len() as u8];
    for m in messages {
        out.extend_from_slice(m);
    }
    out
}

/// DJI vendor element payload: OUI then the flight-info frame.
fn dji_payload(serial: &str, lat: f64, lon: f64, alt: i16) -> Vec<u8> {
    const RAD_SCALE: f64 = 174_533.0;
    let mut frame = vec![0u8; 88];
    frame[0] = 0x10; // flight info
    frame[1] = 2;
    frame[6..6 + serial.len()].copy_from_slice(serial.as_bytes());
    frame[22..26].copy_from_slice(&((lon * RAD_SCALE) as i32).to_le_bytes());
    frame[26..30].copy_from_slice(&((lat * RAD_SCALE) as i32).to_le_bytes());
    frame[30..32].copy_from_slice(&alt.to_le_bytes());
    frame[32..34].copy_from_slice(&30i16.to_le_bytes());
    frame[34..36].copy_from_slice(&200i16.to_le_bytes());
    frame[36..38].copy_from_slice(&0i16.to_le_bytes());
    frame[38..40].copy_from_slice(&50i16.to_le_bytes());
    frame[66] = 51; // Mini 2

    let mut out = vec![0x60, 0x60, 0x1f];
    out.extend_from_slice(&frame);
    out
}

// --- EK line builder -------------------------------------------------------

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

fn ek_line(mac: &str, ts_ms: i64, payload: &[u8]) -> String {
    format!(
        concat!(
            "{{\"timestamp\":\"{}\",\"layers\":{{",
            "\"wlan\":{{\"wlan_wlan_sa\":[\"{}\"],\"wlan_wlan_fc_type_subtype\":[\"0x0008\"],",
            "\"wlan_wlan_tag_vendor_data\":[\"{}\"]}},",
            "\"radiotap\":{{\"radiotap_radiotap_dbm_antsignal\":[\"-58\"],",
            "\"radiotap_radiotap_channel_freq\":[\"2437\"]}}}}}}"
        ),
        ts_ms,
        mac,
        hex(payload)
    )
}

// --- harness ---------------------------------------------------------------

struct Pipeline {
    parser: FrameParser,
    correlator: Correlator,
}

impl Pipeline {
    fn new() -> Self {
        let fingerprints = Arc::new(FingerprintMatcher::new());
        Self {
            parser: FrameParser::new(Arc::clone(&fingerprints)),
            correlator: Correlator::new("test-tap".into(), 30, fingerprints),
        }
    }

    fn feed(&mut self, line: &str) -> Option<UavReport> {
        let record = FrameRecord::from_ek_line(line)?;
        match self.parser.parse(&record) {
            ParseOutcome::Detection(event) => Some(self.correlator.apply(event)),
            _ => None,
        }
    }
}

// --- scenarios -------------------------------------------------------------

#[test]
fn basic_remote_id_beacon() {
    let mut pipeline = Pipeline::new();
    let payload = remote_id_payload(&[
        basic_id_message(1, 2, "1596F3BCDE000001"),
        location_message(47.6062, -122.3321, 120.0, 8.0),
    ]);
    let report = pipeline
        .feed(&ek_line("aa:bb:cc:00:00:01", 1_700_000_000_000, &payload))
        .expect("detection expected");

    assert_eq!(report.identifier, "1596F3BCDE000001");
    assert_eq!(report.detection_source, "RemoteIdWiFi");
    assert_eq!(report.mac, "aa:bb:cc:00:00:01");
    assert!(report.spoof_flags.is_empty());
    assert_eq!(report.trust_score, 100);
    assert_eq!(report.message_types_seen, vec![0, 1]);

    assert!((report.latitude.unwrap() - 47.6062).abs() < 1e-6);
    assert!((report.longitude.unwrap() + 122.3321).abs() < 1e-6);
    assert_eq!(report.altitude_geodetic, Some(120.0));
    assert_eq!(report.speed, Some(8.0));
    assert_eq!(report.ground_track, Some(90.0));
    assert_eq!(report.id_serial.as_deref(), Some("1596F3BCDE000001"));
    assert_eq!(report.uav_type, "HELICOPTER_OR_MULTIROTOR");
    assert_eq!(report.operational_status.as_deref(), Some("Airborne"));
    assert_eq!(report.accuracy_horizontal, Some(10.0));
    assert_eq!(report.rssi, Some(-58.0));
    assert!(!report.raw_fields.is_empty());
    // The serial prefix resolves to a manufacturer
    assert_eq!(report.designation.as_deref(), Some("DJI UAV"));
}

#[test]
fn teleportation_detection() {
    let mut pipeline = Pipeline::new();
    let mac = "aa:bb:cc:00:00:02";
    let t0: i64 = 1_700_000_000_000;

    let first = pipeline
        .feed(&ek_line(
            mac,
            t0,
            &remote_id_payload(&[location_message(47.0, -122.0, 100.0, 5.0)]),
        ))
        .expect("first detection");
    assert!(first.spoof_flags.is_empty());
    assert_eq!(first.trust_score, 100);

    // One degree of latitude in one second
    let second = pipeline
        .feed(&ek_line(
            mac,
            t0 + 1_000,
            &remote_id_payload(&[location_message(48.0, -122.0, 100.0, 5.0)]),
        ))
        .expect("second detection");
    assert!(second.spoof_flags.contains(&"teleportation".to_string()));
    assert_eq!(second.trust_score, 50);
}

#[test]
fn teleportation_interval_boundary() {
    // Same jump but over 2.1 s: plausible enough to stay unflagged
    let mut pipeline = Pipeline::new();
    let mac = "aa:bb:cc:00:00:07";
    let t0: i64 = 1_700_000_000_000;

    pipeline.feed(&ek_line(
        mac,
        t0,
        &remote_id_payload(&[location_message(47.0, -122.0, 100.0, 5.0)]),
    ));
    let report = pipeline
        .feed(&ek_line(
            mac,
            t0 + 2_100,
            &remote_id_payload(&[location_message(48.0, -122.0, 100.0, 5.0)]),
        ))
        .expect("detection");
    assert!(report.spoof_flags.is_empty());
    assert_eq!(report.trust_score, 100);
}

#[test]
fn identity_churn() {
    let mut pipeline = Pipeline::new();
    let mac = "aa:bb:cc:00:00:03";
    let t0: i64 = 1_700_000_000_000;

    pipeline.feed(&ek_line(
        mac,
        t0,
        &remote_id_payload(&[basic_id_message(1, 2, "SERIAL-AAAA")]),
    ));
    let second = pipeline
        .feed(&ek_line(
            mac,
            t0 + 5_000,
            &remote_id_payload(&[basic_id_message(1, 2, "SERIAL-BBBB")]),
        ))
        .expect("detection");

    assert!(second.spoof_flags.contains(&"identity_churn".to_string()));
    assert_eq!(second.trust_score, 60);
    assert_eq!(second.id_serial.as_deref(), Some("SERIAL-BBBB"));
}

#[test]
fn dji_proprietary_detection() {
    let mut pipeline = Pipeline::new();
    let report = pipeline
        .feed(&ek_line(
            "60:60:1f:aa:bb:01",
            1_700_000_000_000,
            &dji_payload("3N3BJ7R0010XYZ", 47.61, -122.33, 90),
        ))
        .expect("detection");

    assert_eq!(report.detection_source, "DJIProprietaryDroneID");
    assert_eq!(report.identifier, "3N3BJ7R0010XYZ");
    assert!((report.latitude.unwrap() - 47.61).abs() < 1e-3);
    assert!((report.longitude.unwrap() + 122.33).abs() < 1e-3);
    assert_eq!(report.altitude_geodetic, Some(90.0));
    assert_eq!(report.designation.as_deref(), Some("DJI Mini 2"));
    assert_eq!(report.trust_score, 100);
}

#[test]
fn duplicate_frame_is_idempotent() {
    let mut pipeline = Pipeline::new();
    let line = ek_line(
        "aa:bb:cc:00:00:04",
        1_700_000_000_000,
        &remote_id_payload(&[
            basic_id_message(1, 2, "1596F3BCDE000002"),
            location_message(47.0, -122.0, 80.0, 3.0),
        ]),
    );

    let first = pipeline.feed(&line).expect("first");
    let second = pipeline.feed(&line).expect("second");

    let mut a = serde_json::to_value(&first).unwrap();
    let mut b = serde_json::to_value(&second).unwrap();
    a.as_object_mut().unwrap().remove("timestamp");
    b.as_object_mut().unwrap().remove("timestamp");
    assert_eq!(a, b);
}

#[test]
fn fingerprint_only_detection() {
    let mut pipeline = Pipeline::new();
    let line = format!(
        concat!(
            "{{\"timestamp\":\"1700000000000\",\"layers\":{{",
            "\"wlan\":{{\"wlan_wlan_sa\":[\"aa:bb:cc:00:00:05\"],",
            "\"wlan_wlan_fc_type_subtype\":[\"0x0008\"],",
            "\"wlan_wlan_ssid\":[\"{}\"]}},",
            "\"radiotap\":{{\"radiotap_radiotap_dbm_antsignal\":[\"-70\"]}}}}}}"
        ),
        "TELLO-C4D2E1"
    );
    let report = pipeline.feed(&line).expect("detection");

    assert_eq!(report.detection_source, "WiFiFingerprint");
    assert_eq!(report.ssid.as_deref(), Some("TELLO-C4D2E1"));
    assert_eq!(report.rssi, Some(-70.0));
    assert!(report.latitude.is_none());
    // No broadcast identity: identifier falls back to the MAC hash
    assert_eq!(report.identifier.len(), 8);
    assert!(report.identifier.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn identifier_matches_precedence_in_every_report() {
    let mut pipeline = Pipeline::new();
    let mac = "aa:bb:cc:00:00:06";
    let t0: i64 = 1_700_000_000_000;

    // Operator ID only first, then a serial arrives
    let mut operator_msg = [0u8; 25];
    operator_msg[0] = 0x50;
    operator_msg[2..12].copy_from_slice(b"FIN87ASTRD");
    // Needs position to be a reportable Remote-ID event
    let first = pipeline
        .feed(&ek_line(
            mac,
            t0,
            &remote_id_payload(&[operator_msg, location_message(47.0, -122.0, 50.0, 2.0)]),
        ))
        .expect("first");
    assert_eq!(first.identifier, "FIN87ASTRD");
    assert_eq!(first.identifier, first.operator_id.clone().unwrap());

    let second = pipeline
        .feed(&ek_line(
            mac,
            t0 + 1_000,
            &remote_id_payload(&[basic_id_message(1, 2, "1596F3BCDE000003")]),
        ))
        .expect("second");
    // Serial now outranks the operator ID
    assert_eq!(second.identifier, "1596F3BCDE000003");
    // And the earlier operator ID did not regress to null
    assert_eq!(second.operator_id.as_deref(), Some("FIN87ASTRD"));
}

#[test]
fn message_types_accumulate_across_reports() {
    let mut pipeline = Pipeline::new();
    let mac = "aa:bb:cc:00:00:08";
    let t0: i64 = 1_700_000_000_000;

    let r1 = pipeline
        .feed(&ek_line(
            mac,
            t0,
            &remote_id_payload(&[basic_id_message(1, 2, "1596F3BCDE000004")]),
        ))
        .expect("r1");
    assert_eq!(r1.message_types_seen, vec![0]);

    let r2 = pipeline
        .feed(&ek_line(
            mac,
            t0 + 500,
            &remote_id_payload(&[location_message(47.0, -122.0, 60.0, 4.0)]),
        ))
        .expect("r2");
    // Superset of the earlier report's set
    assert!(r1
        .message_types_seen
        .iter()
        .all(|t| r2.message_types_seen.contains(t)));
    assert_eq!(r2.message_types_seen, vec![0, 1]);
}
