//! A generic HID mouse: a reference fixture exercising the [`Device`]
//! contract with a device-to-host interrupt endpoint only. Grounded on
//! `original_source/usb/mouse.go`.

use crate::device::{Device, WorkerPoolProfile};
use crate::usb::descriptor::{ConfigurationBundle, DescriptorType, EndpointDescriptor, InterfaceDescriptor};
use crate::usb::hid::{HidDescriptor, HidReportDescriptor};
use crate::usb::setup::{Recipient, StandardRequest};
use crate::wire::cmd::{CmdSubmit, RetSubmit};
use crate::wire::op::{BusId, DeviceInfo, DeviceInfoTruncated, DeviceInterface, Path};
use crate::wire::{
    CLASS_BASED_ON_INTERFACE, CLASS_HID, HID_PROTOCOL_MOUSE, HID_SUBCLASS_BOOT_INTERFACE, PROTOCOL_NONE,
    SPEED_USB2_HIGH, SUBCLASS_NONE,
};

use super::{
    decode_setup, descriptor_type_and_index, error_ret_submit, get_descriptor, success_ret_submit, BusIdentity,
    ENDPOINT_CONTROL, ENDPOINT_DEV_TO_HOST,
};

/// Report descriptor for a 3-button relative-motion mouse, byte-identical to
/// the original Go sample's `mouseHIDReport`.
const MOUSE_HID_REPORT: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x02, // Usage (Mouse)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x01, //   Usage (Pointer)
    0xA1, 0x00, //   Collection (Physical)
    0x05, 0x09, //     Usage Page (Buttons)
    0x19, 0x01, //     Usage Minimum (1)
    0x29, 0x03, //     Usage Maximum (3)
    0x15, 0x00, //     Logical Minimum (0)
    0x25, 0x01, //     Logical Maximum (1)
    0x95, 0x03, //     Report Count (3)
    0x75, 0x01, //     Report Size (1)
    0x81, 0x02, //     Input (Data, Variable, Absolute) ; 3 button bits
    0x95, 0x01, //     Report Count (1)
    0x75, 0x05, //     Report Size (5)
    0x81, 0x01, //     Input (Constant) ; 5 bit padding
    0x05, 0x01, //     Usage Page (Generic Desktop)
    0x09, 0x30, //     Usage (X)
    0x09, 0x31, //     Usage (Y)
    0x15, 0x81, //     Logical Minimum (-127)
    0x25, 0x7F, //     Logical Maximum (127)
    0x75, 0x08, //     Report Size (8)
    0x95, 0x02, //     Report Count (2)
    0x81, 0x06, //     Input (Data, Variable, Relative) ; 2 position bytes
    0xC0, //         End Collection
    0xC0, //       End Collection
];

pub struct HidMouseDevice {
    identity: BusIdentity,
}

impl HidMouseDevice {
    pub fn new() -> Self {
        Self {
            identity: BusIdentity::new(),
        }
    }

    fn bundle(&self) -> ConfigurationBundle {
        ConfigurationBundle {
            interface: InterfaceDescriptor {
                b_interface_number: 1,
                b_num_endpoints: 1,
                b_interface_class: CLASS_HID,
                b_interface_subclass: HID_SUBCLASS_BOOT_INTERFACE,
                b_interface_protocol: HID_PROTOCOL_MOUSE,
                i_interface: 5,
                ..InterfaceDescriptor::new()
            },
            hid: HidDescriptor::new(),
            hid_reports: vec![HidReportDescriptor::new(MOUSE_HID_REPORT.len() as u16)],
            endpoints: vec![EndpointDescriptor::interrupt(1, true, 128, 255)],
        }
    }

    fn strings(index: u8) -> Option<String> {
        match index {
            1 => Some("ntch.dev".into()),
            2 => Some("Virtual Mouse".into()),
            3 => Some("1ABBA1BABA1".into()),
            4 => Some("Default Configuration".into()),
            5 => Some("Default Interface".into()),
            _ => None,
        }
    }

    fn process_control(&self, submit: &CmdSubmit) -> RetSubmit {
        let setup = match decode_setup(submit) {
            Ok(setup) => setup,
            Err(_) => return error_ret_submit(submit),
        };

        let body = match (setup.recipient, setup.standard_request()) {
            (Recipient::Device, Some(StandardRequest::GetDescriptor)) => {
                let (descriptor_type, index) = descriptor_type_and_index(setup.w_value.into());
                descriptor_type.and_then(|t| self.get_descriptor(t, index).ok())
            }
            (Recipient::Device, Some(StandardRequest::GetStatus)) => Some(vec![0x01, 0x00]),
            (Recipient::Device, Some(StandardRequest::SetConfiguration)) => Some(Vec::new()),
            (Recipient::Interface, Some(StandardRequest::GetDescriptor)) => {
                let (descriptor_type, index) = descriptor_type_and_index(setup.w_value.into());
                descriptor_type.and_then(|t| self.get_descriptor(t, index).ok())
            }
            (Recipient::Interface, _) => Some(Vec::new()), // HID SET_IDLE / SET_PROTOCOL: no-op
            _ => None,
        };

        match body {
            Some(payload) => success_ret_submit(
                submit,
                super::fit_to_transfer_buffer(payload, submit.transfer_buffer_length),
            ),
            None => error_ret_submit(submit),
        }
    }

    fn get_descriptor(&self, descriptor_type: DescriptorType, index: u8) -> crate::error::Result<Vec<u8>> {
        get_descriptor(
            descriptor_type,
            index,
            0x0ff0,
            0x0123,
            || self.bundle(),
            MOUSE_HID_REPORT,
            Self::strings,
        )
    }

    fn mouse_report(&self) -> Vec<u8> {
        vec![0, 5, 5, 0]
    }
}

impl Default for HidMouseDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for HidMouseDevice {
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
                id_vendor: 0x0ff0,
                id_product: 0x0123,
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
                b_interface_protocol: HID_PROTOCOL_MOUSE,
                padding: 0,
            }],
        }
    }

    fn worker_pool_profile(&self) -> WorkerPoolProfile {
        WorkerPoolProfile::default()
    }

    fn process(&self, submit: CmdSubmit) -> RetSubmit {
        match submit.header.endpoint_number {
            ENDPOINT_CONTROL => self.process_control(&submit),
            ENDPOINT_DEV_TO_HOST => success_ret_submit(&submit, self.mouse_report()),
            other => {
                log::error!("mouse device: unknown endpoint {other}");
                error_ret_submit(&submit)
            }
        }
    }

    fn close(&self) -> crate::error::Result<()> {
        Ok(())
    }
}
