//! Remote-ID payload decoding
//!
//! ASTM F3411 broadcast messages and the DJI proprietary DroneID format.

pub mod astm;
pub mod dji;
pub mod types;

pub use astm::{decode_broadcast, REMOTE_ID_OUI};
pub use dji::{decode_flight_info, DjiFlightInfo, DJI_OUI};
pub use types::*;
