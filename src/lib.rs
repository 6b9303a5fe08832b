//! A virtual USB/IP server: a TCP endpoint speaking the USB/IP wire protocol
//! so a remote kernel can attach in-process "virtual" USB devices.
//!
//! The hard parts live in [`wire`] (byte-exact USB/IP framing), [`usb`]
//! (little-endian USB descriptors), [`worker`] (the URB lifecycle/unlink-race
//! state machine), and [`handler`]/[`server`] (the connection state machine
//! and bounded accept loop). [`device`] is the contract every pluggable
//! device honors; [`devices`] ships two reference implementations.

pub mod device;
pub mod devices;
pub mod error;
pub mod handler;
pub mod registrar;
pub mod server;
pub mod stream;
pub mod usb;
pub mod wire;
pub mod worker;
