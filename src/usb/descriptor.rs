//! USB descriptor records (device, configuration, interface, endpoint,
//! string) and the composite "configuration bundle" builder. All descriptors
//! are **little-endian**, per USB 2.0 chapter 9.

use packed_struct::prelude::*;

use crate::error::{Result, UsbIpError};
use crate::usb::hid::{HidDescriptor, HidReportDescriptor};

/// Descriptor type (`bDescriptorType`, high byte of `GET_DESCRIPTOR`'s `wValue`).
#[derive(PrimitiveEnum, Debug, Copy, Clone, PartialEq)]
pub enum DescriptorType {
    Device = 1,
    Configuration = 2,
    String = 3,
    Interface = 4,
    Endpoint = 5,
    DeviceQualifier = 6,
    Hid = 0x21,
    HidReport = 0x22,
}

pub const DEVICE_DESCRIPTOR_LEN: usize = 18;
pub const CONFIGURATION_DESCRIPTOR_LEN: usize = 9;
pub const INTERFACE_DESCRIPTOR_LEN: usize = 9;
pub const ENDPOINT_DESCRIPTOR_LEN: usize = 7;

/// The root descriptor of a device: 18 bytes, identifies vendor/product.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "18")]
pub struct DeviceDescriptor {
    #[packed_field(bytes = "0")]
    pub b_length: u8,
    #[packed_field(bytes = "1")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "2..=3", endian = "lsb")]
    pub bcd_usb: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "4")]
    pub b_device_class: u8,
    #[packed_field(bytes = "5")]
    pub b_device_sub_class: u8,
    #[packed_field(bytes = "6")]
    pub b_device_protocol: u8,
    #[packed_field(bytes = "7")]
    pub b_max_packet_size_0: u8,
    #[packed_field(bytes = "8..=9", endian = "lsb")]
    pub id_vendor: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "10..=11", endian = "lsb")]
    pub id_product: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "12..=13", endian = "lsb")]
    pub bcd_device: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "14")]
    pub i_manufacturer: u8,
    #[packed_field(bytes = "15")]
    pub i_product: u8,
    #[packed_field(bytes = "16")]
    pub i_serial_number: u8,
    #[packed_field(bytes = "17")]
    pub b_num_configurations: u8,
}

impl DeviceDescriptor {
    pub fn new(id_vendor: u16, id_product: u16) -> Self {
        Self {
            b_length: DEVICE_DESCRIPTOR_LEN as u8,
            b_descriptor_type: DescriptorType::Device as u8,
            bcd_usb: Integer::from_primitive(0x0110),
            b_device_class: 0x00,
            b_device_sub_class: 0x00,
            b_device_protocol: 0x00,
            b_max_packet_size_0: 0x08,
            id_vendor: Integer::from_primitive(id_vendor),
            id_product: Integer::from_primitive(id_product),
            bcd_device: Integer::from_primitive(0x0100),
            i_manufacturer: 0,
            i_product: 0,
            i_serial_number: 0,
            b_num_configurations: 1,
        }
    }
}

/// The configuration head: 9 bytes. `w_total_length` is filled in by
/// [`ConfigurationBundle::build`] once every sub-descriptor is known.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct ConfigurationDescriptor {
    #[packed_field(bytes = "0")]
    pub b_length: u8,
    #[packed_field(bytes = "1")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "2..=3", endian = "lsb")]
    pub w_total_length: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "4")]
    pub b_num_interfaces: u8,
    #[packed_field(bytes = "5")]
    pub b_configuration_value: u8,
    #[packed_field(bytes = "6")]
    pub i_configuration: u8,
    #[packed_field(bytes = "7")]
    pub bm_attributes: u8,
    #[packed_field(bytes = "8")]
    pub b_max_power: u8,
}

impl ConfigurationDescriptor {
    pub fn new() -> Self {
        Self {
            b_length: CONFIGURATION_DESCRIPTOR_LEN as u8,
            b_descriptor_type: DescriptorType::Configuration as u8,
            w_total_length: Integer::from_primitive(CONFIGURATION_DESCRIPTOR_LEN as u16),
            b_num_interfaces: 1,
            b_configuration_value: 1,
            i_configuration: 0,
            bm_attributes: 0x80, // bus powered, D7 reserved set per spec
            b_max_power: 50,     // 100mA
        }
    }
}

impl Default for ConfigurationDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct InterfaceDescriptor {
    #[packed_field(bytes = "0")]
    pub b_length: u8,
    #[packed_field(bytes = "1")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "2")]
    pub b_interface_number: u8,
    #[packed_field(bytes = "3")]
    pub b_alternate_setting: u8,
    #[packed_field(bytes = "4")]
    pub b_num_endpoints: u8,
    #[packed_field(bytes = "5")]
    pub b_interface_class: u8,
    #[packed_field(bytes = "6")]
    pub b_interface_subclass: u8,
    #[packed_field(bytes = "7")]
    pub b_interface_protocol: u8,
    #[packed_field(bytes = "8")]
    pub i_interface: u8,
}

impl InterfaceDescriptor {
    pub fn new() -> Self {
        Self {
            b_length: INTERFACE_DESCRIPTOR_LEN as u8,
            b_descriptor_type: DescriptorType::Interface as u8,
            b_interface_number: 0,
            b_alternate_setting: 0,
            b_num_endpoints: 0,
            b_interface_class: 0x03, // HID
            b_interface_subclass: 0,
            b_interface_protocol: 0,
            i_interface: 0,
        }
    }
}

impl Default for InterfaceDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "7")]
pub struct EndpointDescriptor {
    #[packed_field(bytes = "0")]
    pub b_length: u8,
    #[packed_field(bytes = "1")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "2")]
    pub b_endpoint_address: u8,
    #[packed_field(bytes = "3")]
    pub bm_attributes: u8,
    #[packed_field(bytes = "4..=5", endian = "lsb")]
    pub w_max_packet_size: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "6")]
    pub b_interval: u8,
}

/// Transfer type occupying bits 1..0 of `bm_attributes`.
pub const TRANSFER_TYPE_INTERRUPT: u8 = 0b11;

impl EndpointDescriptor {
    pub fn interrupt(endpoint_number: u8, direction_in: bool, max_packet_size: u16, interval: u8) -> Self {
        let mut address = endpoint_number & 0x0F;
        if direction_in {
            address |= 0x80;
        }
        Self {
            b_length: ENDPOINT_DESCRIPTOR_LEN as u8,
            b_descriptor_type: DescriptorType::Endpoint as u8,
            b_endpoint_address: address,
            bm_attributes: TRANSFER_TYPE_INTERRUPT,
            w_max_packet_size: Integer::from_primitive(max_packet_size),
            b_interval: interval,
        }
    }
}

/// A UTF-16LE string descriptor. `b_length = 2 + 2*len(content_utf16)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StringDescriptor {
    pub content: Vec<u16>,
}

impl StringDescriptor {
    /// String index 0: the list of supported LANGIDs (here, just US English).
    pub fn langids() -> Self {
        Self {
            content: vec![0x0409],
        }
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            content: s.encode_utf16().collect(),
        }
    }

    pub fn b_length(&self) -> usize {
        2 + 2 * self.content.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.b_length());
        out.push(self.b_length() as u8);
        out.push(DescriptorType::String as u8);
        for unit in &self.content {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }
}

/// The concatenation `[config(9) | interface(9) | hid(>=9) | endpoint(7)*N]`
/// returned for `GET_DESCRIPTOR(CONFIGURATION)`, per §4.2/§4.3.
pub struct ConfigurationBundle {
    pub interface: InterfaceDescriptor,
    pub hid: HidDescriptor,
    pub hid_reports: Vec<HidReportDescriptor>,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl ConfigurationBundle {
    /// Build the composite body (without the duplicated leading configuration
    /// descriptor) and return it along with the configuration descriptor
    /// whose `w_total_length` matches the full composite.
    pub fn build(&self) -> Result<(ConfigurationDescriptor, Vec<u8>)> {
        let mut body = Vec::new();
        body.extend_from_slice(
            &self
                .interface
                .pack()
                .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?,
        );
        body.extend_from_slice(
            &self
                .hid
                .pack()
                .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?,
        );
        for report in &self.hid_reports {
            body.extend_from_slice(
                &report
                    .pack()
                    .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?,
            );
        }
        for endpoint in &self.endpoints {
            body.extend_from_slice(
                &endpoint
                    .pack()
                    .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?,
            );
        }

        let mut config = ConfigurationDescriptor::new();
        config.b_num_interfaces = 1;
        let total_len = CONFIGURATION_DESCRIPTOR_LEN + body.len();
        if total_len > u16::MAX as usize {
            return Err(UsbIpError::InvariantViolation(
                "composite configuration descriptor exceeds u16::MAX".into(),
            ));
        }
        config.w_total_length = Integer::from_primitive(total_len as u16);

        Ok((config, body))
    }

    /// `get_descriptor(CONFIGURATION, _)`: the configuration descriptor
    /// appears twice by design (see §4.3) — the caller reads 9 bytes, then
    /// the full `w_total_length`.
    pub fn get_descriptor_bytes(&self) -> Result<Vec<u8>> {
        let (config, body) = self.build()?;
        let config_bytes = config
            .pack()
            .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?;
        let mut out = Vec::with_capacity(config_bytes.len() + body.len());
        out.extend_from_slice(&config_bytes);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::hid::HidReportDescriptor;

    #[test]
    fn device_descriptor_has_standard_length() {
        let desc = DeviceDescriptor::new(0x0ff0, 0x0123);
        assert_eq!(desc.pack().unwrap().len(), DEVICE_DESCRIPTOR_LEN);
    }

    #[test]
    fn string_descriptor_length_matches_formula() {
        let s = StringDescriptor::from_str("hi");
        assert_eq!(s.b_length(), 2 + 2 * 2);
        assert_eq!(s.encode().len(), s.b_length());
    }

    #[test]
    fn configuration_bundle_composes_to_expected_length() {
        // One interface, one HID descriptor (6-byte head + one 3-byte report
        // descriptor pair = 9 bytes), two endpoints:
        // 2*9 + 9 + 9 + 2*7 = 50, per the descriptor-composition testable
        // property; WTotalLength (without the duplicated prefix) is 41.
        let bundle = ConfigurationBundle {
            interface: InterfaceDescriptor::new(),
            hid: HidDescriptor::new(),
            hid_reports: vec![HidReportDescriptor::new(50)],
            endpoints: vec![
                EndpointDescriptor::interrupt(1, true, 4, 10),
                EndpointDescriptor::interrupt(2, false, 4, 10),
            ],
        };
        let bytes = bundle.get_descriptor_bytes().unwrap();
        assert_eq!(bytes.len(), 2 * 9 + 9 + 9 + 2 * 7);

        let (config, _) = bundle.build().unwrap();
        assert_eq!(u16::from(config.w_total_length) as usize, 41);
        assert_eq!(u16::from(config.w_total_length) as usize, bytes.len() - 9);
    }
}
