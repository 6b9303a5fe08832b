//! Sample devices (§10.5): a HID mouse and a vendor HID echo device, wired
//! into the demo binary as concrete proof of the `Device` contract (§4.8).

pub mod echo;
pub mod mouse;

use std::sync::Mutex;

use packed_struct::prelude::PackedStruct;

use crate::error::Result;
use crate::usb::descriptor::{ConfigurationBundle, DescriptorType, DeviceDescriptor, StringDescriptor};
use crate::usb::setup::{Recipient, SetupPacket};
use crate::wire::cmd::{CmdSubmit, RetSubmit};
use crate::wire::op::{BusId, Path};

/// Endpoint 0 is always the control endpoint; both sample devices agree on
/// endpoint 1 as the device-to-host (IN) data endpoint.
pub const ENDPOINT_CONTROL: u32 = 0;
pub const ENDPOINT_DEV_TO_HOST: u32 = 1;
pub const ENDPOINT_HOST_TO_DEV: u32 = 2;

/// Splits `GET_DESCRIPTOR`'s `wValue` into `(DescriptorType, index)`: high
/// byte is the type, low byte the index, per USB 2.0 §9.4.3.
pub fn descriptor_type_and_index(w_value: u16) -> (Option<DescriptorType>, u8) {
    let descriptor_type = DescriptorType::from_primitive((w_value >> 8) as u8);
    (descriptor_type, (w_value & 0xFF) as u8)
}

/// Shared bus-id storage every sample device embeds: set once at
/// registration time, read on every `device_info()`/`bus_id()` call.
pub struct BusIdentity {
    pub bus_id: Mutex<BusId>,
    pub path: Mutex<Path>,
    pub bus_num: Mutex<u32>,
    pub dev_num: Mutex<u32>,
}

impl BusIdentity {
    pub fn new() -> Self {
        Self {
            bus_id: Mutex::new([0; 32]),
            path: Mutex::new([0; 256]),
            bus_num: Mutex::new(0),
            dev_num: Mutex::new(0),
        }
    }

    pub fn set(&self, bus_num: u32, dev_num: u32, bus_id: BusId, path: Path) {
        *self.bus_id.lock().unwrap() = bus_id;
        *self.path.lock().unwrap() = path;
        *self.bus_num.lock().unwrap() = bus_num;
        *self.dev_num.lock().unwrap() = dev_num;
    }

    pub fn bus_id(&self) -> BusId {
        *self.bus_id.lock().unwrap()
    }
}

impl Default for BusIdentity {
    fn default() -> Self {
        Self::new()
    }
}

pub fn error_ret_submit(submit: &CmdSubmit) -> RetSubmit {
    RetSubmit::device_failure(reply_header(submit))
}

pub fn success_ret_submit(submit: &CmdSubmit, payload: Vec<u8>) -> RetSubmit {
    RetSubmit::success(reply_header(submit), payload)
}

/// Control-transfer responses are returned in a buffer exactly
/// `transfer_buffer_length` (the requested `WLength`) bytes long: longer
/// data is truncated, shorter data is zero-padded. This is how a two-phase
/// `GET_DESCRIPTOR(CONFIGURATION)` read (9 bytes, then the full
/// `WTotalLength`) gets the short answer on the first call.
pub fn fit_to_transfer_buffer(mut data: Vec<u8>, transfer_buffer_length: u32) -> Vec<u8> {
    let want = transfer_buffer_length as usize;
    data.resize(want, 0);
    data
}

fn reply_header(submit: &CmdSubmit) -> crate::wire::cmd::CmdHeader {
    let mut header = submit.header;
    header.command = crate::wire::RET_SUBMIT;
    header
}

pub fn decode_setup(submit: &CmdSubmit) -> Result<SetupPacket> {
    SetupPacket::from_bytes(submit.setup)
        .map_err(|e| crate::error::UsbIpError::InvariantViolation(e.to_string()))
}

/// Builds the `GET_DESCRIPTOR` reply body, shared by every sample device:
/// only the string table and the HID report bytes are device-specific.
pub fn get_descriptor(
    descriptor_type: DescriptorType,
    index: u8,
    id_vendor: u16,
    id_product: u16,
    bundle: impl Fn() -> ConfigurationBundle,
    hid_report: &[u8],
    strings: impl Fn(u8) -> Option<String>,
) -> Result<Vec<u8>> {
    match descriptor_type {
        DescriptorType::Device => {
            let desc = DeviceDescriptor::new(id_vendor, id_product);
            Ok(desc
                .pack()
                .map_err(|e| crate::error::UsbIpError::InvariantViolation(e.to_string()))?
                .to_vec())
        }
        DescriptorType::Configuration => bundle().get_descriptor_bytes(),
        DescriptorType::String => {
            let descriptor = match index {
                0 => StringDescriptor::langids(),
                other => match strings(other) {
                    Some(s) => StringDescriptor::from_str(&s),
                    None => {
                        log::warn!("unknown string descriptor index {other}");
                        StringDescriptor { content: Vec::new() }
                    }
                },
            };
            Ok(descriptor.encode())
        }
        DescriptorType::HidReport => Ok(hid_report.to_vec()),
        other => Err(crate::error::UsbIpError::InvariantViolation(format!(
            "unimplemented descriptor type: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_to_transfer_buffer_truncates_when_longer_than_requested() {
        let data = vec![1, 2, 3, 4, 5];
        let fitted = fit_to_transfer_buffer(data, 3);
        assert_eq!(fitted, vec![1, 2, 3]);
    }

    #[test]
    fn fit_to_transfer_buffer_zero_pads_when_shorter_than_requested() {
        let data = vec![1, 2, 3];
        let fitted = fit_to_transfer_buffer(data, 6);
        assert_eq!(fitted, vec![1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn fit_to_transfer_buffer_is_a_no_op_on_exact_match() {
        let data = vec![1, 2, 3];
        let fitted = fit_to_transfer_buffer(data.clone(), 3);
        assert_eq!(fitted, data);
    }
}
