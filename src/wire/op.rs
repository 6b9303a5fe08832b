use std::io::{Read, Write};

use packed_struct::prelude::*;

use crate::error::{Result, UsbIpError};
use crate::stream::{read_exact, write_all};

use super::{OP_REP_DEVLIST, OP_REP_IMPORT, OP_STATUS_OK, USBIP_VERSION};

/// 8-byte operation header, big-endian, common to every OP-level request/reply.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8", endian = "msb")]
pub struct OpHeader {
    #[packed_field(bytes = "0..=1")]
    pub version: u16,
    #[packed_field(bytes = "2..=3")]
    pub code: u16,
    #[packed_field(bytes = "4..=7")]
    pub status: u32,
}

impl OpHeader {
    pub fn new(code: u16, status: u32) -> Self {
        Self {
            version: USBIP_VERSION,
            code,
            status,
        }
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &self.pack().map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?)
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 8)?;
        let header =
            OpHeader::unpack(buf.as_slice().try_into().unwrap()).map_err(|e| {
                UsbIpError::InvariantViolation(e.to_string())
            })?;
        if header.version != USBIP_VERSION {
            return Err(UsbIpError::ProtocolVersion {
                expected: USBIP_VERSION,
                actual: header.version,
            });
        }
        Ok(header)
    }
}

/// 32-byte NUL-padded textual BusId, e.g. `"1-1"`.
pub type BusId = [u8; 32];

/// 256-byte NUL-padded sysfs-like textual path.
pub type Path = [u8; 256];

pub fn text_to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

/// 312-octet record describing a device, without its interface records.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "312", endian = "msb")]
pub struct DeviceInfoTruncated {
    #[packed_field(bytes = "0..=255", element_size_bytes = "1")]
    pub path: Path,
    #[packed_field(bytes = "256..=287", element_size_bytes = "1")]
    pub bus_id: BusId,
    #[packed_field(bytes = "288..=291")]
    pub bus_num: u32,
    #[packed_field(bytes = "292..=295")]
    pub dev_num: u32,
    #[packed_field(bytes = "296..=299")]
    pub speed: u32,
    #[packed_field(bytes = "300..=301")]
    pub id_vendor: u16,
    #[packed_field(bytes = "302..=303")]
    pub id_product: u16,
    #[packed_field(bytes = "304..=305")]
    pub bcd_device: u16,
    #[packed_field(bytes = "306")]
    pub b_device_class: u8,
    #[packed_field(bytes = "307")]
    pub b_device_subclass: u8,
    #[packed_field(bytes = "308")]
    pub b_device_protocol: u8,
    #[packed_field(bytes = "309")]
    pub b_configuration_value: u8,
    #[packed_field(bytes = "310")]
    pub b_num_configurations: u8,
    #[packed_field(bytes = "311")]
    pub b_num_interfaces: u8,
}

impl DeviceInfoTruncated {
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &self.pack().map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?)
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 312)?;
        DeviceInfoTruncated::unpack(buf.as_slice().try_into().unwrap())
            .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))
    }
}

/// 4-octet interface record, repeated `b_num_interfaces` times after a
/// [`DeviceInfoTruncated`].
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4", endian = "msb")]
pub struct DeviceInterface {
    #[packed_field(bytes = "0")]
    pub b_interface_class: u8,
    #[packed_field(bytes = "1")]
    pub b_interface_subclass: u8,
    #[packed_field(bytes = "2")]
    pub b_interface_protocol: u8,
    #[packed_field(bytes = "3")]
    pub padding: u8,
}

impl DeviceInterface {
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &self.pack().map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?)
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 4)?;
        DeviceInterface::unpack(buf.as_slice().try_into().unwrap())
            .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))
    }
}

/// A device and its interfaces, as returned from the registrar.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub truncated: DeviceInfoTruncated,
    pub interfaces: Vec<DeviceInterface>,
}

impl DeviceInfo {
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.truncated.encode(writer)?;
        for iface in &self.interfaces {
            iface.encode(writer)?;
        }
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let truncated = DeviceInfoTruncated::decode(reader)?;
        let mut interfaces = Vec::with_capacity(truncated.b_num_interfaces as usize);
        for _ in 0..truncated.b_num_interfaces {
            interfaces.push(DeviceInterface::decode(reader)?);
        }
        Ok(Self {
            truncated,
            interfaces,
        })
    }
}

/// `OP_REQ_IMPORT` request body: the header plus the requested `BusId`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpReqImport {
    pub bus_id: BusId,
}

impl OpReqImport {
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 32)?;
        let mut bus_id = [0u8; 32];
        bus_id.copy_from_slice(&buf);
        Ok(Self { bus_id })
    }
}

/// `OP_REP_IMPORT` reply body: the device info of the imported device (only
/// present when the reply header's status is `OK`).
#[derive(Debug, Clone, PartialEq)]
pub struct OpRepImport {
    pub device_info: DeviceInfoTruncated,
}

impl OpRepImport {
    pub fn header(status: u32) -> OpHeader {
        OpHeader::new(OP_REP_IMPORT, status)
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.device_info.encode(writer)
    }
}

/// `OP_REP_DEVLIST` reply body: a device count followed by that many
/// [`DeviceInfo`] records.
#[derive(Debug, Clone, PartialEq)]
pub struct OpRepDevList {
    pub devices: Vec<DeviceInfo>,
}

impl OpRepDevList {
    pub fn header() -> OpHeader {
        OpHeader::new(OP_REP_DEVLIST, OP_STATUS_OK)
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &(self.devices.len() as u32).to_be_bytes())?;
        for device in &self.devices {
            device.encode(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_header_byte_exact_encoding() {
        let header = OpHeader::new(0x8005, 1);
        let bytes = header.pack().unwrap();
        assert_eq!(bytes.as_slice(), &[0x01, 0x11, 0x80, 0x05, 0x00, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn op_header_round_trips() {
        let header = OpHeader::new(0x0005, 0);
        let mut buf = Vec::new();
        header.encode(&mut buf).unwrap();
        let decoded = OpHeader::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn op_header_rejects_wrong_version() {
        let mut buf = vec![0x02, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00];
        let err = OpHeader::decode(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, UsbIpError::ProtocolVersion { .. }));
        buf.clear();
    }

    #[test]
    fn devlist_reply_is_empty_for_empty_registrar() {
        let reply = OpRepDevList { devices: vec![] };
        let mut buf = Vec::new();
        OpRepDevList::header().encode(&mut buf).unwrap();
        reply.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![0x01, 0x11, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }
}
