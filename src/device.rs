//! The device contract every pluggable device must honor (§4.8).

use crate::error::Result;
use crate::wire::cmd::{CmdSubmit, RetSubmit};
use crate::wire::op::{BusId, DeviceInfo, Path};

/// Per-device worker pool sizing (§4.6). Setting any field to 1 serializes
/// that stage; larger values permit parallel execution and therefore
/// unordered replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolProfile {
    pub max_proc_workers: usize,
    pub max_reply_workers: usize,
    pub max_unlink_reply_workers: usize,
}

impl Default for WorkerPoolProfile {
    fn default() -> Self {
        Self {
            max_proc_workers: 1,
            max_reply_workers: 1,
            max_unlink_reply_workers: 1,
        }
    }
}

/// A pluggable USB device. Implementations must be safe to call `process`
/// from multiple worker threads concurrently when `max_proc_workers > 1`
/// (§6.4); devices that need serialization should request profile `{1,1,1}`.
pub trait Device: Send + Sync {
    /// Called once by the registrar at registration time.
    fn set_bus_id(&self, bus_num: u32, dev_num: u32, bus_id: BusId, path: Path);

    fn bus_id(&self) -> BusId;

    fn device_info(&self) -> DeviceInfo;

    fn worker_pool_profile(&self) -> WorkerPoolProfile;

    /// Dispatches by `EndpointNumber`: endpoint 0 is the control endpoint
    /// (decodes the `Setup` field); other endpoints are device-specific
    /// IN/OUT transfers. Pure with respect to the wire protocol; may block.
    fn process(&self, submit: CmdSubmit) -> RetSubmit;

    /// Called by the registrar at shutdown. Implementations that hold no
    /// closeable resource can simply return `Ok(())`.
    fn close(&self) -> Result<()>;
}
