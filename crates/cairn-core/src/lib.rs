//! cairn-core — shared types and wire format for the Cairn relay hub.
//! All other Cairn crates depend on this one.

pub mod config;
pub mod frame;
pub mod ids;
pub mod wire;

pub use frame::{ClientFrame, DeviceKind, FileMeta, ServerFrame};
