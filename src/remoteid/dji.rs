//! DJI proprietary DroneID decoder
//!
//! DJI aircraft broadcast a vendor-specific element (OUI `60:60:1F`) with
//! telemetry that predates standardized Remote-ID and stays on even when
//! Remote-ID is disabled. Layout follows the community flight-info frame:
//! coordinates are radians scaled by 1e7, velocities cm/s.

use crate::capture::frame::MacAddr;

/// DJI vendor OUI
pub const DJI_OUI: [u8; 3] = [0x60, 0x60, 0x1f];
/// Vendor element type carrying flight info
const FLIGHT_INFO_TYPE: u8 = 0x10;
/// Fixed part of the flight-info frame, before the UUID tail
const MIN_FRAME_LEN: usize = 68;

/// Radians * 1e7 per degree
const RAD_SCALE: f64 = 174_533.0;

/// Decoded DJI flight-info telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct DjiFlightInfo {
    pub serial: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Geodetic altitude in meters
    pub altitude: Option<f64>,
    /// Height above takeoff in meters
    pub height: Option<f64>,
    /// Horizontal ground speed in m/s
    pub speed: Option<f64>,
    /// Ground track 0-359 degrees
    pub ground_track: Option<f64>,
    /// Vertical speed in m/s, up positive
    pub vertical_speed: Option<f64>,
    pub pilot_latitude: Option<f64>,
    pub pilot_longitude: Option<f64>,
    pub product_type: u8,
}

impl DjiFlightInfo {
    /// Marketing name for the product type code, when known.
    pub fn product_name(&self) -> Option<&'static str> {
        match self.product_type {
            1 => Some("DJI Inspire 1"),
            16 => Some("DJI Mavic Pro"),
            24 => Some("DJI Phantom 4 Pro"),
            41 => Some("DJI Mavic 2"),
            51 => Some("DJI Mini 2"),
            58 => Some("DJI Mavic Air 2"),
            63 => Some("DJI Mini SE"),
            68 => Some("DJI Mavic 3"),
            _ => None,
        }
    }
}

/// Decode a DJI vendor element payload (bytes after the OUI).
///
/// Returns `None` when the frame is not flight info or too short.
pub fn decode_flight_info(data: &[u8]) -> Option<DjiFlightInfo> {
    if data.len() < MIN_FRAME_LEN || data[0] != FLIGHT_INFO_TYPE {
        return None;
    }

    let serial = {
        let raw = &data[6..22];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).trim().to_string()
    };

    let longitude = decode_rad_coord(&data[22..26], 180.0);
    let latitude = decode_rad_coord(&data[26..30], 90.0);

    let altitude = nonzero_i16(&data[30..32]).map(f64::from);
    let height = nonzero_i16(&data[32..34]).map(f64::from);

    let v_north = i16::from_le_bytes([data[34], data[35]]) as f64 / 100.0;
    let v_east = i16::from_le_bytes([data[36], data[37]]) as f64 / 100.0;
    let v_up = i16::from_le_bytes([data[38], data[39]]) as f64 / 100.0;

    let speed = Some((v_north * v_north + v_east * v_east).sqrt());
    let ground_track = if v_north != 0.0 || v_east != 0.0 {
        let deg = v_east.atan2(v_north).to_degrees();
        Some(deg.rem_euclid(360.0))
    } else {
        None
    };

    let pilot_latitude = decode_rad_coord(&data[50..54], 90.0);
    let pilot_longitude = decode_rad_coord(&data[54..58], 180.0);

    Some(DjiFlightInfo {
        serial,
        latitude,
        longitude,
        altitude,
        height,
        speed,
        ground_track,
        vertical_speed: Some(v_up),
        pilot_latitude,
        pilot_longitude,
        product_type: data[66],
    })
}

/// True when the vendor payload (OUI-prefixed) is a DJI element.
pub fn is_dji_payload(payload: &[u8]) -> bool {
    payload.len() > 3 && payload[..3] == DJI_OUI
}

/// Fallback serial when the broadcast carries none: derived from the MAC so
/// the identifier stays stable per airframe.
pub fn placeholder_serial(mac: &MacAddr) -> String {
    format!("DJI-{}", mac.to_string().replace(':', ""))
}

fn decode_rad_coord(bytes: &[u8], limit: f64) -> Option<f64> {
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if raw == 0 {
        return None;
    }
    let deg = raw as f64 / RAD_SCALE;
    (deg.abs() <= limit).then_some(deg)
}

fn nonzero_i16(bytes: &[u8]) -> Option<i16> {
    let raw = i16::from_le_bytes([bytes[0], bytes[1]]);
    (raw != 0).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn flight_info_frame(serial: &str, lat: f64, lon: f64, alt: i16) -> Vec<u8> {
        let mut buf = vec![0u8; 88];
        buf[0] = FLIGHT_INFO_TYPE;
        buf[1] = 2; // version
        buf[6..6 + serial.len()].copy_from_slice(serial.as_bytes());
        buf[22..26].copy_from_slice(&((lon * RAD_SCALE) as i32).to_le_bytes());
        buf[26..30].copy_from_slice(&((lat * RAD_SCALE) as i32).to_le_bytes());
        buf[30..32].copy_from_slice(&alt.to_le_bytes());
        buf[32..34].copy_from_slice(&40i16.to_le_bytes());
        buf[34..36].copy_from_slice(&300i16.to_le_bytes()); // 3 m/s north
        buf[36..38].copy_from_slice(&400i16.to_le_bytes()); // 4 m/s east
        buf[38..40].copy_from_slice(&(-150i16).to_le_bytes()); // 1.5 m/s down
        buf[50..54].copy_from_slice(&((lat * RAD_SCALE) as i32).to_le_bytes());
        buf[54..58].copy_from_slice(&((lon * RAD_SCALE) as i32).to_le_bytes());
        buf[66] = 51; // Mini 2
        buf
    }

    #[test]
    fn test_flight_info_decode() {
        let frame = flight_info_frame("3N3BJ7R0010ABC", 47.6062, -122.3321, 95);
        let info = decode_flight_info(&frame).unwrap();
        assert_eq!(info.serial, "3N3BJ7R0010ABC");
        assert!((info.latitude.unwrap() - 47.6062).abs() < 1e-4);
        assert!((info.longitude.unwrap() + 122.3321).abs() < 1e-4);
        assert_eq!(info.altitude, Some(95.0));
        assert_eq!(info.height, Some(40.0));
        assert!((info.speed.unwrap() - 5.0).abs() < 1e-9);
        assert!((info.ground_track.unwrap() - 53.13).abs() < 0.01);
        assert_eq!(info.vertical_speed, Some(-1.5));
        assert_eq!(info.product_type, 51);
        assert_eq!(info.product_name(), Some("DJI Mini 2"));
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(decode_flight_info(&[0x10; 20]).is_none());
        let mut frame = flight_info_frame("X", 1.0, 1.0, 10);
        frame[0] = 0x22; // not flight info
        assert!(decode_flight_info(&frame).is_none());
    }

    #[test]
    fn test_oui_check() {
        assert!(is_dji_payload(&[0x60, 0x60, 0x1f, 0x10, 0x00]));
        assert!(!is_dji_payload(&[0xfa, 0x0b, 0xbc, 0x0d]));
        assert!(!is_dji_payload(&[0x60, 0x60]));
    }
}
