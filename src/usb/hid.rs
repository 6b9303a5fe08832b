//! HID (Human Interface Device) class descriptors and requests.
//! https://www.usb.org/sites/default/files/hid1_11.pdf

use packed_struct::prelude::*;

use crate::usb::descriptor::DescriptorType;

/// HID class-specific descriptor request type (high byte of `wValue`).
#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq)]
pub enum HidDescriptorType {
    Hid = 0x21,
    Report = 0x22,
    Physical = 0x23,
}

/// HID class-specific request type (`bRequest`).
#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq)]
pub enum HidRequestType {
    GetReport = 0x01,
    GetIdle = 0x02,
    GetProtocol = 0x03,
    SetReport = 0x09,
    SetIdle = 0x0a,
    SetProtocol = 0x0b,
}

/// Subclass codes for HID interface descriptors.
pub enum HidSubclass {
    None = 0x00,
    Boot = 0x01,
}

/// Protocol codes, meaningful only when the subclass is `Boot`.
pub enum InterfaceProtocol {
    None = 0x00,
    Keyboard = 0x01,
    Mouse = 0x02,
}

/// The 6-byte HID class descriptor head. Each subordinate class descriptor
/// (almost always exactly one report descriptor) is a further 3-byte
/// [`HidReportDescriptor`] appended after the head, per `b_num_descriptors`
/// — so a device with one report descriptor has a 9-byte HID descriptor
/// overall, matching the `hid(>=9)` composite term in §4.2.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "6")]
pub struct HidDescriptor {
    #[packed_field(bytes = "0")]
    pub b_length: u8,
    #[packed_field(bytes = "1")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "2..=3", endian = "lsb")]
    pub bcd_hid: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "4")]
    pub b_country_code: u8,
    #[packed_field(bytes = "5")]
    pub b_num_descriptors: u8,
}

impl HidDescriptor {
    pub fn new() -> Self {
        Self {
            b_length: 6,
            b_descriptor_type: DescriptorType::Hid as u8,
            bcd_hid: Integer::from_primitive(0x0111),
            b_country_code: 0,
            b_num_descriptors: 1,
        }
    }
}

impl Default for HidDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Three-byte (type, length) pair describing one subordinate class
/// descriptor (almost always the report descriptor).
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "3")]
pub struct HidReportDescriptor {
    #[packed_field(bytes = "0")]
    pub b_descriptor_type: u8,
    #[packed_field(bytes = "1..=2", endian = "lsb")]
    pub w_descriptor_length: Integer<u16, packed_bits::Bits<16>>,
}

impl HidReportDescriptor {
    pub fn new(length: u16) -> Self {
        Self {
            b_descriptor_type: DescriptorType::HidReport as u8,
            w_descriptor_length: Integer::from_primitive(length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hid_descriptor_head_is_six_bytes() {
        let hid = HidDescriptor::new();
        assert_eq!(hid.pack().unwrap().len(), 6);
    }

    #[test]
    fn hid_report_descriptor_is_three_bytes() {
        let report = HidReportDescriptor::new(52);
        assert_eq!(report.pack().unwrap().len(), 3);
    }
}
