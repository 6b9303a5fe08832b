//! USB descriptor types and control-transfer setup packets. Everything in
//! this module is **little-endian**, per USB 2.0 chapter 9 — in contrast to
//! the big-endian USB/IP frames in [`crate::wire`].

pub mod descriptor;
pub mod hid;
pub mod setup;

pub use descriptor::{
    ConfigurationBundle, ConfigurationDescriptor, DescriptorType, DeviceDescriptor,
    EndpointDescriptor, InterfaceDescriptor, StringDescriptor,
};
pub use setup::SetupPacket;
