//! Frame capture
//!
//! The dissector subprocess driver, its output decoding, channel tables,
//! and the channel hopper.

pub mod channels;
pub mod frame;
pub mod hopper;
pub mod netlink;
pub mod tshark;

pub use frame::{FrameRecord, FrameSubtype, MacAddr};
pub use tshark::TsharkConfig;
