//! Best-effort airframe designation
//!
//! Resolves a human-readable model name from whatever identity material an
//! airframe has shown: an explicit model hint from the payload (DJI product
//! type, SSID model code), the CTA-2063-A serial manufacturer prefix, or
//! the transmitter OUI.

use crate::capture::frame::MacAddr;

use super::fingerprint::FingerprintMatcher;
use super::UavFields;

/// CTA-2063-A manufacturer codes (first four serial characters).
const SERIAL_PREFIXES: &[(&str, &str)] = &[
    ("1596", "DJI"),
    ("1581", "DJI"),
    ("1787", "Parrot"),
    ("1788", "Autel Robotics"),
    ("1790", "Skydio"),
    ("1791", "Yuneec"),
];

/// Derive the designation for an airframe.
///
/// Precedence: payload model hint, then serial prefix manufacturer, then
/// OUI manufacturer. Returns `None` when nothing is known.
pub fn designate(
    fields: &UavFields,
    model_hint: Option<&str>,
    mac: &MacAddr,
    fingerprints: &FingerprintMatcher,
) -> Option<String> {
    if let Some(hint) = model_hint {
        return Some(hint.to_string());
    }

    if let Some(serial) = fields.id_serial.as_deref() {
        if serial.len() >= 4 {
            let prefix = &serial[..4];
            if let Some((_, mfr)) = SERIAL_PREFIXES.iter().find(|(p, _)| *p == prefix) {
                return Some(format!("{} UAV", mfr));
            }
        }
    }

    if let Some(ssid) = fields.ssid.as_deref() {
        if let Some(hit) = fingerprints.match_ssid(ssid) {
            return Some(hit.model.unwrap_or_else(|| format!("{} UAV", hit.manufacturer)));
        }
    }

    fingerprints.match_oui(mac).map(|mfr| format!("{} UAV", mfr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddr {
        "aa:bb:cc:00:00:01".parse().unwrap()
    }

    #[test]
    fn test_model_hint_wins() {
        let fields = UavFields {
            id_serial: Some("1596F3BCDE000001".into()),
            ..Default::default()
        };
        let fp = FingerprintMatcher::new();
        assert_eq!(
            designate(&fields, Some("DJI Mini 2"), &mac(), &fp).as_deref(),
            Some("DJI Mini 2")
        );
    }

    #[test]
    fn test_serial_prefix() {
        let fields = UavFields {
            id_serial: Some("1596F3BCDE000001".into()),
            ..Default::default()
        };
        let fp = FingerprintMatcher::new();
        assert_eq!(
            designate(&fields, None, &mac(), &fp).as_deref(),
            Some("DJI UAV")
        );
    }

    #[test]
    fn test_oui_fallback() {
        let fields = UavFields::default();
        let fp = FingerprintMatcher::new();
        let dji_mac: MacAddr = "60:60:1f:00:00:02".parse().unwrap();
        assert_eq!(
            designate(&fields, None, &dji_mac, &fp).as_deref(),
            Some("DJI UAV")
        );
        assert_eq!(designate(&fields, None, &mac(), &fp), None);
    }
}
