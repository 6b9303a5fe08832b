//! Error taxonomy for the USB/IP transport engine.
//!
//! Every fallible operation in this crate returns a [`UsbIpError`] variant
//! rather than a boxed trait object, so callers can match on the kind of
//! failure instead of inspecting a message string.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UsbIpError {
    /// The peer closed the connection cleanly at a frame boundary.
    #[error("end of stream")]
    EndOfStream,

    /// The underlying socket or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read returned fewer bytes than the record requires.
    #[error("incomplete read: expected {expected} bytes, got {actual}")]
    IncompleteRead { expected: usize, actual: usize },

    /// A write accepted fewer bytes than were given to it.
    #[error("incomplete write: expected {expected} bytes, wrote {actual}")]
    IncompleteWrite { expected: usize, actual: usize },

    /// `OpHeader.version` did not match the USB/IP version this crate speaks.
    #[error("unsupported USB/IP protocol version: expected {expected:#06x}, got {actual:#06x}")]
    ProtocolVersion { expected: u16, actual: u16 },

    /// A command or operation code outside the known set.
    #[error("unknown command/operation code: {0:#x}")]
    UnknownCommand(u32),

    /// An encode-time precondition from the wire format was violated.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The registrar is full.
    #[error("maximum device count reached")]
    CapacityReached,

    /// IMPORT referenced a BusId with no registered device.
    #[error("device not found")]
    DeviceNotFound,

    /// The peer reused a SeqNum that is still in flight.
    #[error("duplicate in-flight SeqNum: {0}")]
    DuplicateSeqNum(u32),

    /// One or more devices failed to close; the registrar still attempts
    /// every device before returning this.
    #[error("device(s) failed to close: {0:?}")]
    AggregateError(Vec<UsbIpError>),
}

pub type Result<T> = std::result::Result<T, UsbIpError>;
