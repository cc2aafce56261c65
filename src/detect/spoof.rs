//! Spoof heuristics
//!
//! Physics and consistency checks over successive observations of one
//! airframe. Pure functions: the correlator passes the previous state and
//! the incoming observation, gets back a flag set, and keeps the union for
//! the lifetime of the track.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remoteid::types::OperationalStatus;

use super::UavFields;

/// Teleportation: consecutive fixes farther apart than this...
const TELEPORT_DISTANCE_M: f64 = 1_000.0;
/// ...within less than this interval (implied ground speed > 500 m/s).
const TELEPORT_WINDOW_S: f64 = 2.0;
/// Well above any civilian multirotor.
const MAX_PLAUSIBLE_SPEED_MS: f64 = 100.0;
const MAX_PLAUSIBLE_ALTITUDE_M: f64 = 10_000.0;
const MIN_PLAUSIBLE_ALTITUDE_M: f64 = -500.0;
/// Operator position jump that cannot be a walking pilot.
const OPERATOR_JUMP_M: f64 = 10_000.0;

/// One retained position fix.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Spoof indicator flags. Once raised on a track they stay raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofFlag {
    Teleportation,
    ImpossibleSpeed,
    ImpossibleAltitude,
    IdentityChurn,
    OperatorTeleport,
    MissingRequired,
}

impl SpoofFlag {
    /// Wire tag carried in reports
    pub fn tag(&self) -> &'static str {
        match self {
            SpoofFlag::Teleportation => "teleportation",
            SpoofFlag::ImpossibleSpeed => "impossible_speed",
            SpoofFlag::ImpossibleAltitude => "impossible_altitude",
            SpoofFlag::IdentityChurn => "identity_churn",
            SpoofFlag::OperatorTeleport => "operator_teleport",
            SpoofFlag::MissingRequired => "missing_required",
        }
    }

    /// Trust-score penalty for this flag
    pub fn weight(&self) -> u8 {
        match self {
            SpoofFlag::Teleportation => 50,
            SpoofFlag::ImpossibleSpeed => 30,
            SpoofFlag::ImpossibleAltitude => 20,
            SpoofFlag::IdentityChurn => 40,
            SpoofFlag::OperatorTeleport => 20,
            SpoofFlag::MissingRequired => 10,
        }
    }
}

/// What the detector needs to know about the track before this update.
#[derive(Debug, Default)]
pub struct PriorView<'a> {
    pub last_fix: Option<&'a PositionFix>,
    pub id_serial: Option<&'a str>,
    pub operator_position: Option<(f64, f64)>,
}

/// Evaluate one incoming observation against the prior track state.
pub fn evaluate(prior: &PriorView<'_>, timestamp: DateTime<Utc>, update: &UavFields) -> BTreeSet<SpoofFlag> {
    let mut flags = BTreeSet::new();

    if let (Some(fix), Some(lat), Some(lon)) = (prior.last_fix, update.latitude, update.longitude) {
        let dt = (timestamp - fix.timestamp).num_milliseconds() as f64 / 1000.0;
        let dist = haversine_m(fix.latitude, fix.longitude, lat, lon);
        if dist > TELEPORT_DISTANCE_M && dt < TELEPORT_WINDOW_S {
            flags.insert(SpoofFlag::Teleportation);
        }
    }

    if let Some(speed) = update.speed {
        if speed > MAX_PLAUSIBLE_SPEED_MS {
            flags.insert(SpoofFlag::ImpossibleSpeed);
        }
    }

    if let Some(alt) = update.altitude_geodetic {
        if alt > MAX_PLAUSIBLE_ALTITUDE_M || alt < MIN_PLAUSIBLE_ALTITUDE_M {
            flags.insert(SpoofFlag::ImpossibleAltitude);
        }
    }

    if let (Some(prev), Some(next)) = (prior.id_serial, update.id_serial.as_deref()) {
        if !prev.is_empty() && !next.is_empty() && prev != next {
            flags.insert(SpoofFlag::IdentityChurn);
        }
    }

    if let (Some((plat, plon)), Some(olat), Some(olon)) = (
        prior.operator_position,
        update.operator_latitude,
        update.operator_longitude,
    ) {
        if haversine_m(plat, plon, olat, olon) > OPERATOR_JUMP_M {
            flags.insert(SpoofFlag::OperatorTeleport);
        }
    }

    if update.operational_status == Some(OperationalStatus::Airborne)
        && (update.latitude.is_none() || update.longitude.is_none())
    {
        flags.insert(SpoofFlag::MissingRequired);
    }

    flags
}

/// Trust score: 100 minus the penalties of every flag present, floored at 0.
pub fn trust_score(flags: &BTreeSet<SpoofFlag>) -> u8 {
    let penalty: u32 = flags.iter().map(|f| f.weight() as u32).sum();
    100u32.saturating_sub(penalty) as u8
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}
