//! Captured frame records
//!
//! Turns one dissector output line (tshark `-T ek`, one JSON document per
//! line) into a typed [`FrameRecord`]. EK output wraps scalar values in
//! single-element arrays and spells field names several ways across tshark
//! versions, so extraction tries each known spelling in order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::channels::freq_to_channel;

/// MAC address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// First three octets, the vendor OUI
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// OUI formatted as uppercase `XX:XX:XX` for lookup tables
    pub fn oui_string(&self) -> String {
        format!("{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = ();

    /// Parse `aa:bb:cc:dd:ee:ff` (also accepts `-` separators)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut count = 0;
        for part in s.split([':', '-']) {
            if count >= 6 || part.len() != 2 {
                return Err(());
            }
            bytes[count] = u8::from_str_radix(part, 16).map_err(|_| ())?;
            count += 1;
        }
        if count == 6 {
            Ok(Self(bytes))
        } else {
            Err(())
        }
    }
}

/// Management frame subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSubtype {
    ProbeResponse,
    Beacon,
    Action,
    Other(u8),
}

impl FrameSubtype {
    pub fn from_raw(subtype: u8) -> Self {
        match subtype & 0x0f {
            0x05 => FrameSubtype::ProbeResponse,
            0x08 => FrameSubtype::Beacon,
            0x0d => FrameSubtype::Action,
            other => FrameSubtype::Other(other),
        }
    }

    pub fn as_raw(&self) -> u8 {
        match self {
            FrameSubtype::ProbeResponse => 0x05,
            FrameSubtype::Beacon => 0x08,
            FrameSubtype::Action => 0x0d,
            FrameSubtype::Other(v) => *v,
        }
    }
}

/// One captured 802.11 management frame, immutable after creation.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Frame subtype (beacon, probe response, action)
    pub subtype: FrameSubtype,
    /// Transmitter MAC
    pub source: MacAddr,
    /// Channel derived from the radiotap frequency
    pub channel: Option<u16>,
    /// Signal strength in dBm
    pub rssi: Option<f64>,
    /// Decoded SSID, when the frame carries one
    pub ssid: Option<String>,
    /// All dissector-supplied fields, full fidelity
    pub fields: HashMap<String, String>,
    /// Vendor-specific element payload (OUI-prefixed), for Remote-ID / DJI decoding
    pub vendor_payload: Option<Vec<u8>>,
}

impl FrameRecord {
    /// Decode one EK NDJSON line into a frame record.
    ///
    /// Returns `None` for index lines, non-JSON noise, and frames with no
    /// usable transmitter address.
    pub fn from_ek_line(line: &str) -> Option<FrameRecord> {
        let line = line.trim();
        if !line.starts_with('{') || line.starts_with("{\"index\"") {
            return None;
        }

        let doc: Value = serde_json::from_str(line).ok()?;
        let layers = doc.get("layers")?.as_object()?;

        let mut fields = HashMap::new();
        for (_, layer) in layers {
            flatten_into(&mut fields, layer);
        }

        let source: MacAddr = first_field(
            &fields,
            &[
                "wlan_wlan_sa",
                "wlan_sa",
                "wlan.sa",
                "wlan_wlan_ta",
                "wlan_ta",
                "wlan.ta",
            ],
        )?
        .parse()
        .ok()?;

        let timestamp = doc
            .get("timestamp")
            .and_then(ek_scalar)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let subtype = first_field(
            &fields,
            &[
                "wlan_wlan_fc_type_subtype",
                "wlan_fc_type_subtype",
                "wlan.fc.type_subtype",
            ],
        )
        .and_then(parse_int)
        .map(|v| FrameSubtype::from_raw(v as u8))
        .unwrap_or(FrameSubtype::Other(0));

        let rssi = first_field(
            &fields,
            &[
                "radiotap_radiotap_dbm_antsignal",
                "radiotap_dbm_antsignal",
                "radiotap.dbm_antsignal",
            ],
        )
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite());

        let channel = first_field(
            &fields,
            &[
                "radiotap_radiotap_channel_freq",
                "radiotap_channel_freq",
                "radiotap.channel.freq",
            ],
        )
        .and_then(parse_int)
        .and_then(|f| freq_to_channel(f as u32));

        let ssid = first_field(
            &fields,
            &[
                "wlan_wlan_ssid",
                "wlan_mgt_wlan_mgt_ssid",
                "wlan_mgt_ssid",
                "wlan.ssid",
            ],
        )
        .map(decode_ssid)
        .filter(|s| !s.is_empty());

        let vendor_payload = first_field(
            &fields,
            &[
                "opendroneid_opendroneid_message_pack",
                "opendroneid_opendroneid_message",
                "wlan_wlan_tag_vendor_data",
                "wlan_tag_vendor_data",
                "wlan.tag.vendor.data",
            ],
        )
        .and_then(parse_hex_bytes);

        Some(FrameRecord {
            timestamp,
            subtype,
            source,
            channel,
            rssi,
            ssid,
            fields,
            vendor_payload,
        })
    }
}

/// Flatten an EK layer object into the field map. EK keys already carry the
/// full dotted path joined with underscores; nested objects just get their
/// inner keys merged in.
fn flatten_into(out: &mut HashMap<String, String>, value: &Value) {
    if let Value::Object(map) = value {
        for (key, inner) in map {
            match inner {
                Value::Object(_) => flatten_into(out, inner),
                Value::Array(items) => {
                    if let Some(first) = items.iter().find_map(scalar_string) {
                        out.insert(key.clone(), first);
                    }
                }
                other => {
                    if let Some(s) = scalar_string(other) {
                        out.insert(key.clone(), s);
                    }
                }
            }
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Unwrap an EK value, which may be a scalar or a single-element array.
fn ek_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(scalar_string),
        other => scalar_string(other),
    }
}

fn first_field<'a>(fields: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| fields.get(*k))
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
}

/// Parse a decimal or `0x`-prefixed integer field.
fn parse_int(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Decode hex bytes in either `aa:bb:cc` or `aabbcc` form.
fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| *c != ':').collect();
    if cleaned.is_empty() || cleaned.len() % 2 != 0 {
        return None;
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).ok())
        .collect()
}

/// Decode a tshark 4.x hex-encoded SSID (`48:69:6c:74:6f:6e`); plain SSIDs
/// pass through unchanged.
fn decode_ssid(raw: &str) -> String {
    let looks_hex = raw.contains(':') && raw.split(':').all(|b| b.len() == 2);
    if looks_hex {
        if let Some(bytes) = parse_hex_bytes(raw) {
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    raw.to_string()
}
