//! Remote-ID message types and enums
//!
//! Typed views of the ASTM F3411 broadcast vocabulary: message types,
//! UA types, operational status, and the per-message decoded fields.

/// ASTM F3411 message type codes
pub const MSG_BASIC_ID: u8 = 0;
pub const MSG_LOCATION: u8 = 1;
pub const MSG_AUTH: u8 = 2;
pub const MSG_SELF_ID: u8 = 3;
pub const MSG_SYSTEM: u8 = 4;
pub const MSG_OPERATOR_ID: u8 = 5;
pub const MSG_MESSAGE_PACK: u8 = 0xF;

/// UA type (ASTM F3411 Table 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UaType {
    None,
    Aeroplane,
    HelicopterOrMultirotor,
    Gyroplane,
    HybridLift,
    Ornithopter,
    Glider,
    Kite,
    FreeBalloon,
    CaptiveBalloon,
    Airship,
    FreeFallParachute,
    Rocket,
    TetheredPoweredAircraft,
    GroundObstacle,
    Other,
}

impl From<u8> for UaType {
    fn from(val: u8) -> Self {
        match val & 0x0f {
            0 => UaType::None,
            1 => UaType::Aeroplane,
            2 => UaType::HelicopterOrMultirotor,
            3 => UaType::Gyroplane,
            4 => UaType::HybridLift,
            5 => UaType::Ornithopter,
            6 => UaType::Glider,
            7 => UaType::Kite,
            8 => UaType::FreeBalloon,
            9 => UaType::CaptiveBalloon,
            10 => UaType::Airship,
            11 => UaType::FreeFallParachute,
            12 => UaType::Rocket,
            13 => UaType::TetheredPoweredAircraft,
            14 => UaType::GroundObstacle,
            _ => UaType::Other,
        }
    }
}

impl UaType {
    pub fn as_raw(&self) -> u8 {
        match self {
            UaType::None => 0,
            UaType::Aeroplane => 1,
            UaType::HelicopterOrMultirotor => 2,
            UaType::Gyroplane => 3,
            UaType::HybridLift => 4,
            UaType::Ornithopter => 5,
            UaType::Glider => 6,
            UaType::Kite => 7,
            UaType::FreeBalloon => 8,
            UaType::CaptiveBalloon => 9,
            UaType::Airship => 10,
            UaType::FreeFallParachute => 11,
            UaType::Rocket => 12,
            UaType::TetheredPoweredAircraft => 13,
            UaType::GroundObstacle => 14,
            UaType::Other => 15,
        }
    }

    /// Wire name carried in UAV reports
    pub fn name(&self) -> &'static str {
        match self {
            UaType::None | UaType::Other => "OTHER",
            UaType::Aeroplane => "AEROPLANE",
            UaType::HelicopterOrMultirotor => "HELICOPTER_OR_MULTIROTOR",
            UaType::Gyroplane => "GYROPLANE",
            UaType::HybridLift => "HYBRID_LIFT",
            UaType::Ornithopter => "ORNITHOPTER",
            UaType::Glider => "GLIDER",
            UaType::Kite => "KITE",
            UaType::FreeBalloon => "FREE_BALLOON",
            UaType::CaptiveBalloon => "CAPTIVE_BALLOON",
            UaType::Airship => "AIRSHIP",
            UaType::FreeFallParachute => "FREE_FALL_PARACHUTE",
            UaType::Rocket => "ROCKET",
            UaType::TetheredPoweredAircraft => "TETHERED_POWERED_AIRCRAFT",
            UaType::GroundObstacle => "GROUND_OBSTACLE",
        }
    }
}

/// Basic-ID identity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    None,
    SerialNumber,
    CaaRegistration,
    UtmAssigned,
    SpecificSession,
    Reserved(u8),
}

impl From<u8> for IdType {
    fn from(val: u8) -> Self {
        match val & 0x0f {
            0 => IdType::None,
            1 => IdType::SerialNumber,
            2 => IdType::CaaRegistration,
            3 => IdType::UtmAssigned,
            4 => IdType::SpecificSession,
            other => IdType::Reserved(other),
        }
    }
}

impl IdType {
    pub fn as_raw(&self) -> u8 {
        match self {
            IdType::None => 0,
            IdType::SerialNumber => 1,
            IdType::CaaRegistration => 2,
            IdType::UtmAssigned => 3,
            IdType::SpecificSession => 4,
            IdType::Reserved(v) => *v,
        }
    }
}

/// Operational status from the Location message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalStatus {
    Undeclared,
    Ground,
    Airborne,
    Emergency,
    RemoteIdFailure,
    Reserved(u8),
}

impl From<u8> for OperationalStatus {
    fn from(val: u8) -> Self {
        match val & 0x0f {
            0 => OperationalStatus::Undeclared,
            1 => OperationalStatus::Ground,
            2 => OperationalStatus::Airborne,
            3 => OperationalStatus::Emergency,
            4 => OperationalStatus::RemoteIdFailure,
            other => OperationalStatus::Reserved(other),
        }
    }
}

impl OperationalStatus {
    pub fn as_raw(&self) -> u8 {
        match self {
            OperationalStatus::Undeclared => 0,
            OperationalStatus::Ground => 1,
            OperationalStatus::Airborne => 2,
            OperationalStatus::Emergency => 3,
            OperationalStatus::RemoteIdFailure => 4,
            OperationalStatus::Reserved(v) => *v,
        }
    }

    /// Wire name carried in UAV reports
    pub fn name(&self) -> &'static str {
        match self {
            OperationalStatus::Undeclared | OperationalStatus::Reserved(_) => "UNKNOWN",
            OperationalStatus::Ground => "Ground",
            OperationalStatus::Airborne => "Airborne",
            OperationalStatus::Emergency => "Emergency",
            OperationalStatus::RemoteIdFailure => "RemoteIDFailure",
        }
    }
}

/// Height reference: 0 = above takeoff, 1 = AGL
pub type HeightType = u8;

/// Operator location type: 0 = takeoff, 1 = live GNSS, 2 = fixed
pub type OperatorLocationType = u8;

/// One decoded ASTM F3411 message.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteIdMessage {
    BasicId {
        id_type: IdType,
        ua_type: UaType,
        id: String,
    },
    Location {
        status: OperationalStatus,
        height_type: HeightType,
        ground_track: Option<f64>,
        speed: Option<f64>,
        vertical_speed: Option<f64>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        altitude_pressure: Option<f64>,
        altitude_geodetic: Option<f64>,
        height: Option<f64>,
        accuracy_horizontal: Option<f64>,
        accuracy_vertical: Option<f64>,
        accuracy_barometer: Option<f64>,
        accuracy_speed: Option<f64>,
    },
    Authentication {
        auth_type: u8,
        page: u8,
        data: Vec<u8>,
    },
    SelfId {
        desc_type: u8,
        description: String,
    },
    System {
        operator_location_type: OperatorLocationType,
        operator_latitude: Option<f64>,
        operator_longitude: Option<f64>,
        operator_altitude: Option<f64>,
        area_count: Option<u16>,
        area_radius: Option<f64>,
        area_ceiling: Option<f64>,
        area_floor: Option<f64>,
        category_eu: Option<u8>,
        class_eu: Option<u8>,
    },
    OperatorId {
        id_type: u8,
        operator_id: String,
    },
}

impl RemoteIdMessage {
    /// ASTM message type code for this variant
    pub fn message_type(&self) -> u8 {
        match self {
            RemoteIdMessage::BasicId { .. } => MSG_BASIC_ID,
            RemoteIdMessage::Location { .. } => MSG_LOCATION,
            RemoteIdMessage::Authentication { .. } => MSG_AUTH,
            RemoteIdMessage::SelfId { .. } => MSG_SELF_ID,
            RemoteIdMessage::System { .. } => MSG_SYSTEM,
            RemoteIdMessage::OperatorId { .. } => MSG_OPERATOR_ID,
        }
    }
}

/// Horizontal accuracy category to meters (ASTM F3411 Table 9; nautical-mile
/// tiers converted). 0 and out-of-range decode as unknown.
pub fn horizontal_accuracy_m(category: u8) -> Option<f64> {
    match category {
        1 => Some(18_520.0),
        2 => Some(7_408.0),
        3 => Some(3_704.0),
        4 => Some(1_852.0),
        5 => Some(926.0),
        6 => Some(555.6),
        7 => Some(185.2),
        8 => Some(92.6),
        9 => Some(30.0),
        10 => Some(10.0),
        11 => Some(3.0),
        12 => Some(1.0),
        _ => None,
    }
}

/// Vertical / barometric accuracy category to meters (ASTM F3411 Table 10)
pub fn vertical_accuracy_m(category: u8) -> Option<f64> {
    match category {
        1 => Some(150.0),
        2 => Some(45.0),
        3 => Some(25.0),
        4 => Some(10.0),
        5 => Some(3.0),
        6 => Some(1.0),
        _ => None,
    }
}

/// Speed accuracy category to m/s (ASTM F3411 Table 11)
pub fn speed_accuracy_ms(category: u8) -> Option<f64> {
    match category {
        1 => Some(10.0),
        2 => Some(3.0),
        3 => Some(1.0),
        4 => Some(0.3),
        _ => None,
    }
}
