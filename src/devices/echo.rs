//! A vendor-specific HID "echo" device: bytes written to the host-to-device
//! endpoint are read back from the device-to-host endpoint. Exercises a
//! non-trivial [`WorkerPoolProfile`] (`{8,8,8}`) and a bounded
//! device-internal buffer. Grounded on `original_source/sample/echo/echo.go`.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;

use crate::device::{Device, WorkerPoolProfile};
use crate::usb::descriptor::{ConfigurationBundle, DescriptorType, EndpointDescriptor, InterfaceDescriptor};
use crate::usb::hid::HidDescriptor;
use crate::usb::setup::{Recipient, StandardRequest};
use crate::wire::cmd::{CmdSubmit, RetSubmit};
use crate::wire::op::{BusId, DeviceInfo, DeviceInfoTruncated, DeviceInterface, Path};
use crate::wire::{CLASS_BASED_ON_INTERFACE, CLASS_HID, PROTOCOL_NONE, SPEED_USB2_HIGH, SUBCLASS_NONE};

use super::{
    decode_setup, descriptor_type_and_index, error_ret_submit, fit_to_transfer_buffer, get_descriptor,
    success_ret_submit, BusIdentity, ENDPOINT_CONTROL, ENDPOINT_DEV_TO_HOST, ENDPOINT_HOST_TO_DEV,
};

/// Matches `original_source/sample/echo/echo.go`'s `echoHIDReport`: a vendor
/// usage page exposing a 64-byte input report and a 64-byte output report.
const ECHO_HID_REPORT: &[u8] = &[
    0x06, 0xA0, 0xFF, // Usage Page (0xFFA0)
    0x09, 0x01, // Usage (0x01)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x03, //   Usage (0x03)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    0x81, 0x08, //   Input (Data, Array, Absolute, Wrap)
    0x09, 0x04, //   Usage (0x04)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    0x91, 0x08, //   Output (Data, Array, Absolute, Wrap)
    0xC0, //       End Collection
];

/// Bound on the internal echo queue, matching the original's `make(chan
/// string, 128)` — the USB/IP layer already provides backpressure upstream,
/// but the device itself never buffers unboundedly (§9 open question #3).
const ECHO_QUEUE_CAPACITY: usize = 128;

pub struct HidEchoDevice {
    identity: BusIdentity,
    echo_tx: SyncSender<Vec<u8>>,
    echo_rx: Mutex<Receiver<Vec<u8>>>,
}

impl HidEchoDevice {
    pub fn new() -> Self {
        let (echo_tx, echo_rx) = sync_channel(ECHO_QUEUE_CAPACITY);
        Self {
            identity: BusIdentity::new(),
            echo_tx,
            echo_rx: Mutex::new(echo_rx),
        }
    }

    fn bundle(&self) -> ConfigurationBundle {
        ConfigurationBundle {
            interface: InterfaceDescriptor {
                b_num_endpoints: 2,
                b_interface_class: CLASS_HID,
                b_interface_subclass: SUBCLASS_NONE,
                b_interface_protocol: PROTOCOL_NONE,
                i_interface: 5,
                ..InterfaceDescriptor::new()
            },
            hid: HidDescriptor::new(),
            hid_reports: vec![crate::usb::hid::HidReportDescriptor::new(ECHO_HID_REPORT.len() as u16)],
            endpoints: vec![
                EndpointDescriptor::interrupt(1, true, 64, 128),
                EndpointDescriptor::interrupt(2, false, 64, 128),
            ],
        }
    }

    fn strings(index: u8) -> Option<String> {
        match index {
            1 => Some("ntch.dev".into()),
            2 => Some("String echo device".into()),
            3 => Some("NTCHDEV0002".into()),
            4 => Some("Default Configuration".into()),
            5 => Some("Default Interface".into()),
            _ => None,
        }
    }

    fn get_descriptor(&self, descriptor_type: DescriptorType, index: u8) -> crate::error::Result<Vec<u8>> {
        get_descriptor(
            descriptor_type,
            index,
            0xecc0,
            0x0001,
            || self.bundle(),
            ECHO_HID_REPORT,
            Self::strings,
        )
    }

    fn process_control(&self, submit: &CmdSubmit) -> RetSubmit {
        let setup = match decode_setup(submit) {
            Ok(setup) => setup,
            Err(_) => return error_ret_submit(submit),
        };

        let body = match (setup.recipient, setup.standard_request()) {
            (Recipient::Device, Some(StandardRequest::GetDescriptor))
            | (Recipient::Interface, Some(StandardRequest::GetDescriptor)) => {
                let (descriptor_type, index) = descriptor_type_and_index(setup.w_value.into());
                descriptor_type.and_then(|t| self.get_descriptor(t, index).ok())
            }
            (Recipient::Device, Some(StandardRequest::GetStatus)) => Some(vec![0x01, 0x00]),
            (Recipient::Device, Some(StandardRequest::SetConfiguration)) => Some(Vec::new()),
            (Recipient::Interface, _) => Some(Vec::new()), // HID SET_IDLE / SET_PROTOCOL: no-op
            _ => None,
        };

        match body {
            Some(payload) => success_ret_submit(submit, fit_to_transfer_buffer(payload, submit.transfer_buffer_length)),
            None => error_ret_submit(submit),
        }
    }

    /// Non-blocking dequeue, mirroring the Go original's `select`/`default`:
    /// returns an empty payload if nothing is queued rather than blocking
    /// the worker thread.
    fn release_echo(&self) -> Vec<u8> {
        self.echo_rx.lock().unwrap().try_recv().unwrap_or_default()
    }

    fn queue_echo(&self, data: Vec<u8>) {
        let trimmed: Vec<u8> = data.into_iter().take_while(|&b| b != 0).collect();
        if self.echo_tx.try_send(trimmed).is_err() {
            log::warn!("echo device: queue full, dropping payload");
        }
    }
}

impl Default for HidEchoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HidEchoDevice {
    fn set_bus_id(&self, bus_num: u32, dev_num: u32, bus_id: BusId, path: Path) {
        self.identity.set(bus_num, dev_num, bus_id, path);
    }

    fn bus_id(&self) -> BusId {
        self.identity.bus_id()
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            truncated: DeviceInfoTruncated {
                path: *self.identity.path.lock().unwrap(),
                bus_id: self.identity.bus_id(),
                bus_num: *self.identity.bus_num.lock().unwrap(),
                dev_num: *self.identity.dev_num.lock().unwrap(),
                speed: SPEED_USB2_HIGH,
                id_vendor: 0xecc0,
                id_product: 0x0001,
                bcd_device: 1,
                b_device_class: CLASS_BASED_ON_INTERFACE,
                b_device_subclass: SUBCLASS_NONE,
                b_device_protocol: PROTOCOL_NONE,
                b_configuration_value: 1,
                b_num_configurations: 1,
                b_num_interfaces: 1,
            },
            interfaces: vec![DeviceInterface {
                b_interface_class: CLASS_HID,
                b_interface_subclass: SUBCLASS_NONE,
                b_interface_protocol: PROTOCOL_NONE,
                padding: 0,
            }],
        }
    }

    fn worker_pool_profile(&self) -> WorkerPoolProfile {
        // This echo content does not guarantee to echo strings in the order
        // they were received, because more than one submit worker may be
        // processing concurrently — matches the original's own comment.
        WorkerPoolProfile {
            max_proc_workers: 8,
            max_reply_workers: 8,
            max_unlink_reply_workers: 8,
        }
    }

    fn process(&self, submit: CmdSubmit) -> RetSubmit {
        match submit.header.endpoint_number {
            ENDPOINT_CONTROL => self.process_control(&submit),
            ENDPOINT_DEV_TO_HOST => {
                let mut payload = self.release_echo();
                if payload.len() > submit.transfer_buffer_length as usize {
                    payload.truncate(submit.transfer_buffer_length as usize);
                }
                success_ret_submit(&submit, payload)
            }
            ENDPOINT_HOST_TO_DEV => {
                self.queue_echo(submit.transfer_buffer.clone());
                success_ret_submit(&submit, Vec::new())
            }
            other => {
                log::error!("echo device: unknown endpoint {other}");
                error_ret_submit(&submit)
            }
        }
    }

    fn close(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::cmd::{CmdHeader, Direction};
    use crate::wire::CMD_SUBMIT;

    fn submit(endpoint: u32, direction: Direction, transfer_buffer: Vec<u8>, transfer_buffer_length: u32) -> CmdSubmit {
        CmdSubmit {
            header: CmdHeader {
                command: CMD_SUBMIT,
                seq_num: 1,
                dev_id: 1,
                direction: direction as u32,
                endpoint_number: endpoint,
            },
            transfer_flags: 0,
            transfer_buffer_length,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            interval: 0,
            setup: [0; 8],
            transfer_buffer,
            iso_packet_descriptors: Vec::new(),
        }
    }

    #[test]
    fn echoes_back_queued_bytes() {
        let device = HidEchoDevice::new();
        device.set_bus_id(1, 1, [0; 32], [0; 256]);

        let out = submit(ENDPOINT_HOST_TO_DEV, Direction::Out, b"hello".to_vec(), 5);
        let ret = device.process(out);
        assert_eq!(ret.status, 0);

        let back = submit(ENDPOINT_DEV_TO_HOST, Direction::In, Vec::new(), 64);
        let ret = device.process(back);
        assert_eq!(ret.status, 0);
        assert_eq!(ret.transfer_buffer, b"hello");
    }

    #[test]
    fn empty_queue_returns_empty_payload_without_blocking() {
        let device = HidEchoDevice::new();
        device.set_bus_id(1, 1, [0; 32], [0; 256]);

        let back = submit(ENDPOINT_DEV_TO_HOST, Direction::In, Vec::new(), 64);
        let ret = device.process(back);
        assert_eq!(ret.status, 0);
        assert!(ret.transfer_buffer.is_empty());
    }

    #[test]
    fn worker_pool_profile_is_eight_eight_eight() {
        let device = HidEchoDevice::new();
        let profile = device.worker_pool_profile();
        assert_eq!(profile.max_proc_workers, 8);
        assert_eq!(profile.max_reply_workers, 8);
        assert_eq!(profile.max_unlink_reply_workers, 8);
    }
}
