//! WiFi fingerprint tables
//!
//! Third detection layer beyond Remote-ID and DJI DroneID: beacon/probe
//! SSID patterns and manufacturer OUI prefixes that strongly indicate a UAV
//! with no telemetry broadcast. Works on any drone with a WiFi radio, but
//! yields presence and RSSI only.
//!
//! Patterns are compiled once at startup and tested in order; first match
//! wins. Controller SSIDs are matched too so a pilot's remote shows up
//! distinctly from the airframe.

use std::collections::HashMap;

use regex::Regex;
use tracing::debug;

use crate::capture::frame::MacAddr;

/// A positive fingerprint match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub manufacturer: &'static str,
    pub model: Option<String>,
    pub is_controller: bool,
}

/// SSID pattern table: (regex, manufacturer, model hint, is_controller).
/// Order matters; more specific entries first.
const SSID_PATTERNS: &[(&str, &str, &str, bool)] = &[
    (r"^DJI[-_ ]?RC", "DJI", "DJI Controller", true),
    (r"^DJI[-_ ]", "DJI", "", false),
    (r"^TELLO-", "Ryze", "Tello", false),
    (r"^(MAVIC|PHANTOM|INSPIRE|MATRICE|AVATA)", "DJI", "", false),
    (r"^ANAFI", "Parrot", "Anafi", false),
    (r"^(Parrot|Bebop|DISCO)", "Parrot", "", false),
    (r"^SkyController", "Parrot", "SkyController", true),
    (r"^(Autel|EVO[-_ ])", "Autel Robotics", "", false),
    (r"^Skydio", "Skydio", "", false),
    (r"^(Yuneec|Typhoon|Mantis|Breeze|H520)", "Yuneec", "", false),
    (r"^FIMI", "FIMI", "", false),
    (r"^Hubsan", "Hubsan", "", false),
    (r"^(PowerEgg|PowerVision|PowerEye)", "PowerVision", "", false),
    (r"^(Potensic|Ruko|Syma|Snaptain|DEERC|Holy[ ]?Stone)", "Consumer", "", false),
    (r"^HOVERAir", "Zero Zero Robotics", "HoverAir", false),
    (r"^(Wingtra|senseFly|eBee)", "AgEagle", "", false),
    (r"^EHang", "EHang", "", false),
    (r"^ESP-DRONE", "Espressif", "ESP-Drone", false),
    (r"^(ArduPilot|PX4)", "Open Source FC", "", false),
    (r"^RID-", "RemoteID", "", false),
];

/// Known drone manufacturer OUI prefixes (uppercase `XX:XX:XX`).
const OUI_TABLE: &[(&str, &str)] = &[
    ("60:60:1F", "DJI"),
    ("34:D2:62", "DJI"),
    ("48:1C:B9", "DJI"),
    ("A0:14:3D", "Parrot"),
    ("90:03:B7", "Parrot"),
    ("00:26:7E", "Parrot"),
    ("E0:B6:F5", "Yuneec"),
    ("38:E2:6E", "Skydio"),
    ("EC:3D:FD", "Autel Robotics"),
];

/// DJI SSID model codes, for precise model extraction from SSIDs like
/// `DJI-MINI4PRO-726`.
const DJI_SSID_MODELS: &[(&str, &str)] = &[
    ("MINI4PRO", "DJI Mini 4 Pro"),
    ("MINI3PRO", "DJI Mini 3 Pro"),
    ("MINI2", "DJI Mini 2"),
    ("MAVIC3", "DJI Mavic 3"),
    ("MAVIC2", "DJI Mavic 2"),
    ("AVATA2", "DJI Avata 2"),
    ("AVATA", "DJI Avata"),
    ("AIR3", "DJI Air 3"),
    ("AIR2S", "DJI Air 2S"),
    ("PHANTOM4", "DJI Phantom 4"),
];

/// Compiled fingerprint matcher. Built once at startup.
pub struct FingerprintMatcher {
    ssid_patterns: Vec<(Regex, &'static str, &'static str, bool)>,
    oui_map: HashMap<&'static str, &'static str>,
    dji_model_re: Option<Regex>,
    dji_models: HashMap<&'static str, &'static str>,
}

impl FingerprintMatcher {
    pub fn new() -> Self {
        let ssid_patterns = SSID_PATTERNS
            .iter()
            .filter_map(|(pattern, mfr, model, ctrl)| {
                match Regex::new(&format!("(?i){}", pattern)) {
                    Ok(re) => Some((re, *mfr, *model, *ctrl)),
                    Err(e) => {
                        debug!("invalid SSID pattern '{}': {}", pattern, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            ssid_patterns,
            oui_map: OUI_TABLE.iter().copied().collect(),
            dji_model_re: Regex::new(r"(?i)^DJI[-_ ]([A-Z0-9]+?)(?:[-_ ]\w+)?$").ok(),
            dji_models: DJI_SSID_MODELS.iter().copied().collect(),
        }
    }

    /// Match an SSID against the pattern table.
    pub fn match_ssid(&self, ssid: &str) -> Option<FingerprintMatch> {
        for (re, manufacturer, model, is_controller) in &self.ssid_patterns {
            if re.is_match(ssid) {
                let model = if *manufacturer == "DJI" && model.is_empty() {
                    self.dji_model_from_ssid(ssid)
                } else if model.is_empty() {
                    None
                } else {
                    Some(model.to_string())
                };
                return Some(FingerprintMatch {
                    manufacturer,
                    model,
                    is_controller: *is_controller,
                });
            }
        }
        None
    }

    /// Look up the manufacturer for a drone OUI.
    pub fn match_oui(&self, mac: &MacAddr) -> Option<&'static str> {
        self.oui_map.get(mac.oui_string().as_str()).copied()
    }

    /// Extract a specific DJI model from SSIDs like `DJI-MINI4PRO-726`.
    fn dji_model_from_ssid(&self, ssid: &str) -> Option<String> {
        let code = self
            .dji_model_re
            .as_ref()?
            .captures(ssid)?
            .get(1)?
            .as_str()
            .to_uppercase();
        self.dji_models.get(code.as_str()).map(|m| m.to_string())
    }
}

impl Default for FingerprintMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dji_ssid_with_model() {
        let m = FingerprintMatcher::new();
        let hit = m.match_ssid("DJI-MINI4PRO-726").unwrap();
        assert_eq!(hit.manufacturer, "DJI");
        assert_eq!(hit.model.as_deref(), Some("DJI Mini 4 Pro"));
        assert!(!hit.is_controller);
    }

    #[test]
    fn test_controller_ssid() {
        let m = FingerprintMatcher::new();
        let hit = m.match_ssid("DJI_RCN1_9F2A").unwrap();
        assert!(hit.is_controller);
    }

    #[test]
    fn test_various_manufacturers() {
        let m = FingerprintMatcher::new();
        assert_eq!(m.match_ssid("TELLO-AB12CD").unwrap().manufacturer, "Ryze");
        assert_eq!(m.match_ssid("ANAFI-0042").unwrap().manufacturer, "Parrot");
        assert_eq!(
            m.match_ssid("Skydio-X10D").unwrap().manufacturer,
            "Skydio"
        );
        assert!(m.match_ssid("CoffeeShopGuest").is_none());
        assert!(m.match_ssid("").is_none());
    }

    #[test]
    fn test_oui_lookup() {
        let m = FingerprintMatcher::new();
        let dji: MacAddr = "60:60:1f:12:34:56".parse().unwrap();
        let other: MacAddr = "aa:bb:cc:00:00:01".parse().unwrap();
        assert_eq!(m.match_oui(&dji), Some("DJI"));
        assert_eq!(m.match_oui(&other), None);
    }
}
