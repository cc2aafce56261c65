//! ASTM F3411 broadcast decoder
//!
//! Remote-ID broadcasts ride in an 802.11 vendor-specific element: OUI
//! `FA:0B:BC`, vendor type 0x0D, a one-byte message counter, then either a
//! single 25-byte message or a Message Pack (type 0xF) wrapping several.
//!
//! Every message is 25 bytes: a header byte (`type << 4 | version`) and 24
//! bytes of fixed-layout body. Sentinel values decode to `None` rather than
//! being propagated (0 for positions, -1000 m for altitudes, 255 m/s for
//! speed, 63 m/s for vertical speed).

use super::types::*;

/// Remote-ID vendor OUI (ASTM / Open Drone ID)
pub const REMOTE_ID_OUI: [u8; 3] = [0xfa, 0x0b, 0xbc];
/// Vendor-specific element type for Remote-ID broadcasts
pub const REMOTE_ID_VENDOR_TYPE: u8 = 0x0d;

const MESSAGE_SIZE: usize = 25;

/// Decode the vendor element payload that follows the OUI and vendor type:
/// `[counter, header, body...]`.
///
/// Returns the decoded messages, or `None` when the payload is malformed.
/// Unknown message types inside a pack are skipped, not fatal.
pub fn decode_broadcast(data: &[u8]) -> Option<Vec<RemoteIdMessage>> {
    // Skip the message counter byte
    let data = data.get(1..)?;
    decode_pack_or_message(data)
}

fn decode_pack_or_message(data: &[u8]) -> Option<Vec<RemoteIdMessage>> {
    let header = *data.first()?;
    let msg_type = header >> 4;

    if msg_type == MSG_MESSAGE_PACK {
        // Pack: header, message size, message count, then N fixed messages
        if data.len() < 3 {
            return None;
        }
        let size = data[1] as usize;
        let count = data[2] as usize;
        if size != MESSAGE_SIZE || count == 0 {
            return None;
        }
        let body = data.get(3..3 + size * count)?;
        let messages: Vec<RemoteIdMessage> = body
            .chunks_exact(MESSAGE_SIZE)
            .filter_map(decode_message)
            .collect();
        if messages.is_empty() {
            return None;
        }
        Some(messages)
    } else {
        let msg = decode_message(data.get(..MESSAGE_SIZE)?)?;
        Some(vec![msg])
    }
}

/// Decode one 25-byte ASTM message.
pub fn decode_message(buf: &[u8]) -> Option<RemoteIdMessage> {
    if buf.len() < MESSAGE_SIZE {
        return None;
    }
    let msg_type = buf[0] >> 4;
    match msg_type {
        MSG_BASIC_ID => decode_basic_id(buf),
        MSG_LOCATION => decode_location(buf),
        MSG_AUTH => decode_auth(buf),
        MSG_SELF_ID => decode_self_id(buf),
        MSG_SYSTEM => decode_system(buf),
        MSG_OPERATOR_ID => decode_operator_id(buf),
        _ => None,
    }
}

fn decode_basic_id(buf: &[u8]) -> Option<RemoteIdMessage> {
    let id_type = IdType::from(buf[1] >> 4);
    let ua_type = UaType::from(buf[1] & 0x0f);
    let id = ascii_field(&buf[2..22]);
    Some(RemoteIdMessage::BasicId {
        id_type,
        ua_type,
        id,
    })
}

fn decode_location(buf: &[u8]) -> Option<RemoteIdMessage> {
    let status = OperationalStatus::from(buf[1] >> 4);
    let height_type = (buf[1] >> 2) & 0x01;
    let ew_direction = (buf[1] >> 1) & 0x01;
    let speed_mult = buf[1] & 0x01;

    let track_raw = buf[2] as u16 + ew_direction as u16 * 180;
    let ground_track = (track_raw <= 359).then_some(track_raw as f64);

    let speed = decode_speed(buf[3], speed_mult);
    let vertical_speed = decode_vertical_speed(buf[4] as i8);

    let latitude = decode_coordinate(&buf[5..9], 90.0);
    let longitude = decode_coordinate(&buf[9..13], 180.0);

    let altitude_pressure = decode_altitude(u16::from_le_bytes([buf[13], buf[14]]));
    let altitude_geodetic = decode_altitude(u16::from_le_bytes([buf[15], buf[16]]));
    let height = decode_altitude(u16::from_le_bytes([buf[17], buf[18]]));

    let accuracy_vertical = vertical_accuracy_m(buf[19] >> 4);
    let accuracy_horizontal = horizontal_accuracy_m(buf[19] & 0x0f);
    let accuracy_barometer = vertical_accuracy_m(buf[20] >> 4);
    let accuracy_speed = speed_accuracy_ms(buf[20] & 0x0f);

    Some(RemoteIdMessage::Location {
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
    })
}

fn decode_auth(buf: &[u8]) -> Option<RemoteIdMessage> {
    let auth_type = buf[1] >> 4;
    let page = buf[1] & 0x0f;
    // Page 0 carries header fields before the data; later pages are all data
    let data = if page == 0 {
        buf[8..25].to_vec()
    } else {
        buf[2..25].to_vec()
    };
    Some(RemoteIdMessage::Authentication {
        auth_type,
        page,
        data,
    })
}

fn decode_self_id(buf: &[u8]) -> Option<RemoteIdMessage> {
    Some(RemoteIdMessage::SelfId {
        desc_type: buf[1],
        description: ascii_field(&buf[2..25]),
    })
}

fn decode_system(buf: &[u8]) -> Option<RemoteIdMessage> {
    let operator_location_type = buf[1] & 0x03;
    let classification_type = (buf[1] >> 2) & 0x07;

    let operator_latitude = decode_coordinate(&buf[2..6], 90.0);
    let operator_longitude = decode_coordinate(&buf[6..10], 180.0);

    let area_count_raw = u16::from_le_bytes([buf[10], buf[11]]);
    let area_count = (area_count_raw > 0).then_some(area_count_raw);
    let area_radius = (buf[12] > 0).then_some(buf[12] as f64 * 10.0);
    let area_ceiling = decode_altitude(u16::from_le_bytes([buf[13], buf[14]]));
    let area_floor = decode_altitude(u16::from_le_bytes([buf[15], buf[16]]));

    // EU category/class only declared under classification type 1
    let (category_eu, class_eu) = if classification_type == 1 {
        let cat = buf[17] >> 4;
        let class = buf[17] & 0x0f;
        ((cat > 0).then_some(cat), (class > 0).then_some(class))
    } else {
        (None, None)
    };

    let operator_altitude = decode_altitude(u16::from_le_bytes([buf[18], buf[19]]));

    Some(RemoteIdMessage::System {
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
    })
}

fn decode_operator_id(buf: &[u8]) -> Option<RemoteIdMessage> {
    Some(RemoteIdMessage::OperatorId {
        id_type: buf[1],
        operator_id: ascii_field(&buf[2..22]),
    })
}

/// Decode a scaled i32 coordinate (1e-7 degrees). Zero and out-of-range
/// values are the "unknown" sentinels.
fn decode_coordinate(bytes: &[u8], limit: f64) -> Option<f64> {
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if raw == 0 {
        return None;
    }
    let value = raw as f64 * 1e-7;
    (value.abs() <= limit).then_some(value)
}

/// Decode the biased altitude encoding: `raw * 0.5 - 1000`, unknown at -1000.
fn decode_altitude(raw: u16) -> Option<f64> {
    let value = raw as f64 * 0.5 - 1000.0;
    (value != -1000.0).then_some(value)
}

/// Horizontal speed: multiplier 0 is `raw * 0.25`, multiplier 1 is
/// `raw * 0.75 + 63.75`. Raw 255 is the unknown sentinel regardless of
/// multiplier.
fn decode_speed(raw: u8, mult: u8) -> Option<f64> {
    if raw == 255 {
        None
    } else if mult == 0 {
        Some(raw as f64 * 0.25)
    } else {
        Some(raw as f64 * 0.75 + 63.75)
    }
}

/// Vertical speed: `raw * 0.5` m/s signed, unknown at 63 m/s.
fn decode_vertical_speed(raw: i8) -> Option<f64> {
    let value = raw as f64 * 0.5;
    (value.abs() != 63.0).then_some(value)
}

fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}
