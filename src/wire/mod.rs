//! USB/IP wire records. Frames in this module are **big-endian**, in
//! contrast to the little-endian USB descriptors in [`crate::usb`].

pub mod cmd;
pub mod op;

pub use cmd::{CmdHeader, CmdSubmit, CmdUnlink, Direction, IsoPacketDescriptor, RetSubmit, RetUnlink};
pub use op::{DeviceInfo, DeviceInfoTruncated, DeviceInterface, OpHeader, OpRepDevList, OpRepImport};

/// USB/IP protocol version spoken by this server (`0x0111`).
pub const USBIP_VERSION: u16 = 0x0111;

pub const OP_REQ_DEVLIST: u16 = 0x8005;
pub const OP_REP_DEVLIST: u16 = 0x0005;
pub const OP_REQ_IMPORT: u16 = 0x8003;
pub const OP_REP_IMPORT: u16 = 0x0003;

pub const OP_STATUS_OK: u32 = 0;
pub const OP_STATUS_ERROR: u32 = 1;

pub const CMD_SUBMIT: u32 = 1;
pub const CMD_UNLINK: u32 = 2;
pub const RET_SUBMIT: u32 = 3;
pub const RET_UNLINK: u32 = 4;

/// Sentinel `RetSubmit.status` a device uses to signal an internal failure.
/// Opaque to the core; see the open-question note in `DESIGN.md`.
pub const DEVICE_PROCESSING_FAILURE_STATUS: i32 = 99;

/// `-ECONNRESET`, used as `RetUnlink.status` when the unlinked URB was
/// actually in flight.
pub const ECONNRESET: i32 = -104;

/// `DeviceInfoTruncated.speed` values, matching the kernel's `usb_device_speed`
/// enumeration as used by the USB/IP wire protocol.
pub const SPEED_USB1_LOW: u32 = 0;
pub const SPEED_USB1_FULL: u32 = 1;
pub const SPEED_USB2_HIGH: u32 = 2;
pub const SPEED_USB2_WIRELESS: u32 = 3;
pub const SPEED_USB3_SUPER: u32 = 4;
pub const SPEED_USB3_SUPER_PLUS: u32 = 5;

/// `BDeviceClass` value meaning "class info lives on the interface descriptors".
pub const CLASS_BASED_ON_INTERFACE: u8 = 0;
/// HID interface class.
pub const CLASS_HID: u8 = 0x03;
pub const SUBCLASS_NONE: u8 = 0x00;
pub const PROTOCOL_NONE: u8 = 0x00;
/// HID boot-protocol subclass/protocol codes (USB HID 1.11 §4.2/§4.3).
pub const HID_SUBCLASS_BOOT_INTERFACE: u8 = 0x01;
pub const HID_PROTOCOL_MOUSE: u8 = 0x02;
