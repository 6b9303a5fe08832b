use std::io::{Read, Write};

use packed_struct::prelude::*;

use crate::error::{Result, UsbIpError};
use crate::stream::{read_exact, write_all};

use super::{CMD_SUBMIT, CMD_UNLINK, RET_SUBMIT, RET_UNLINK};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Out = 0,
    In = 1,
}

impl Direction {
    fn from_u32(v: u32) -> Result<Self> {
        match v {
            0 => Ok(Direction::Out),
            1 => Ok(Direction::In),
            other => Err(UsbIpError::InvariantViolation(format!(
                "unknown URB direction: {other}"
            ))),
        }
    }
}

/// 20-octet URB command header, big-endian, shared by SUBMIT/UNLINK requests
/// and replies.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "20", endian = "msb")]
pub struct CmdHeader {
    #[packed_field(bytes = "0..=3")]
    pub command: u32,
    #[packed_field(bytes = "4..=7")]
    pub seq_num: u32,
    #[packed_field(bytes = "8..=11")]
    pub dev_id: u32,
    #[packed_field(bytes = "12..=15")]
    pub direction: u32,
    #[packed_field(bytes = "16..=19")]
    pub endpoint_number: u32,
}

impl CmdHeader {
    pub fn direction(&self) -> Result<Direction> {
        Direction::from_u32(self.direction)
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &self.pack().map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?)
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 20)?;
        let header = CmdHeader::unpack(buf.as_slice().try_into().unwrap())
            .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?;
        match header.command {
            CMD_SUBMIT | CMD_UNLINK | RET_SUBMIT | RET_UNLINK => Ok(header),
            other => Err(UsbIpError::UnknownCommand(other)),
        }
    }
}

/// A single ISO packet descriptor (16 octets, big-endian).
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "16", endian = "msb")]
pub struct IsoPacketDescriptor {
    #[packed_field(bytes = "0..=3")]
    pub offset: u32,
    #[packed_field(bytes = "4..=7")]
    pub length: u32,
    #[packed_field(bytes = "8..=11")]
    pub actual_length: u32,
    #[packed_field(bytes = "12..=15")]
    pub status: i32,
}

impl IsoPacketDescriptor {
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_all(writer, &self.pack().map_err(|e| UsbIpError::InvariantViolation(e.to_string()))?)
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let buf = read_exact(reader, 16)?;
        IsoPacketDescriptor::unpack(buf.as_slice().try_into().unwrap())
            .map_err(|e| UsbIpError::InvariantViolation(e.to_string()))
    }
}

/// ISO descriptors are suppressed entirely when the count is one of these.
fn iso_count_suppressed(number_of_packets: u32) -> bool {
    matches!(number_of_packets, 0 | 0xFFFF_FFFF)
}

fn decode_iso_descriptors<R: Read>(
    reader: &mut R,
    number_of_packets: u32,
) -> Result<Vec<IsoPacketDescriptor>> {
    if iso_count_suppressed(number_of_packets) {
        return Ok(Vec::new());
    }
    let mut descriptors = Vec::with_capacity(number_of_packets as usize);
    for _ in 0..number_of_packets {
        descriptors.push(IsoPacketDescriptor::decode(reader)?);
    }
    Ok(descriptors)
}

fn encode_iso_descriptors<W: Write>(
    writer: &mut W,
    number_of_packets: u32,
    descriptors: &[IsoPacketDescriptor],
) -> Result<()> {
    if iso_count_suppressed(number_of_packets) {
        return Ok(());
    }
    if descriptors.len() as u32 != number_of_packets {
        return Err(UsbIpError::InvariantViolation(format!(
            "number_of_packets={number_of_packets} but {} ISO descriptors supplied",
            descriptors.len()
        )));
    }
    for descriptor in descriptors {
        descriptor.encode(writer)?;
    }
    Ok(())
}

/// `CMD_SUBMIT`: header + 28 static octets + optional `TransferBuffer` +
/// optional ISO descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct CmdSubmit {
    pub header: CmdHeader,
    pub transfer_flags: u32,
    pub transfer_buffer_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub interval: u32,
    pub setup: [u8; 8],
    pub transfer_buffer: Vec<u8>,
    pub iso_packet_descriptors: Vec<IsoPacketDescriptor>,
}

impl CmdSubmit {
    pub fn decode<R: Read>(reader: &mut R, header: CmdHeader) -> Result<Self> {
        let static_buf = read_exact(reader, 28)?;
        let transfer_flags = u32::from_be_bytes(static_buf[0..4].try_into().unwrap());
        let transfer_buffer_length = u32::from_be_bytes(static_buf[4..8].try_into().unwrap());
        let start_frame = u32::from_be_bytes(static_buf[8..12].try_into().unwrap());
        let number_of_packets = u32::from_be_bytes(static_buf[12..16].try_into().unwrap());
        let interval = u32::from_be_bytes(static_buf[16..20].try_into().unwrap());
        let mut setup = [0u8; 8];
        setup.copy_from_slice(&static_buf[20..28]);

        let transfer_buffer = if header.direction()? == Direction::Out && transfer_buffer_length > 0
        {
            read_exact(reader, transfer_buffer_length as usize)?
        } else {
            Vec::new()
        };

        let iso_packet_descriptors = decode_iso_descriptors(reader, number_of_packets)?;

        Ok(Self {
            header,
            transfer_flags,
            transfer_buffer_length,
            start_frame,
            number_of_packets,
            interval,
            setup,
            transfer_buffer,
            iso_packet_descriptors,
        })
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode(writer)?;
        let mut static_buf = Vec::with_capacity(28);
        static_buf.extend_from_slice(&self.transfer_flags.to_be_bytes());
        static_buf.extend_from_slice(&self.transfer_buffer_length.to_be_bytes());
        static_buf.extend_from_slice(&self.start_frame.to_be_bytes());
        static_buf.extend_from_slice(&self.number_of_packets.to_be_bytes());
        static_buf.extend_from_slice(&self.interval.to_be_bytes());
        static_buf.extend_from_slice(&self.setup);
        write_all(writer, &static_buf)?;

        if self.header.direction()? == Direction::Out {
            if self.transfer_buffer.len() as u32 != self.transfer_buffer_length {
                return Err(UsbIpError::InvariantViolation(
                    "CmdSubmit: transfer_buffer length does not match transfer_buffer_length"
                        .into(),
                ));
            }
            write_all(writer, &self.transfer_buffer)?;
        }

        encode_iso_descriptors(writer, self.number_of_packets, &self.iso_packet_descriptors)
    }
}

/// `RET_SUBMIT`: header + 28 static octets + optional `TransferBuffer` +
/// optional ISO descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct RetSubmit {
    pub header: CmdHeader,
    pub status: i32,
    pub actual_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub error_count: u32,
    pub transfer_buffer: Vec<u8>,
    pub iso_packet_descriptors: Vec<IsoPacketDescriptor>,
}

impl RetSubmit {
    /// Build a success reply: `status=0`, `actual_length` taken from the
    /// payload length.
    pub fn success(header: CmdHeader, transfer_buffer: Vec<u8>) -> Self {
        Self {
            actual_length: transfer_buffer.len() as u32,
            header,
            status: 0,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            error_count: 0,
            transfer_buffer,
            iso_packet_descriptors: Vec::new(),
        }
    }

    /// Build the device-side failure reply per §4.8: `Status=99`, no payload.
    pub fn device_failure(header: CmdHeader) -> Self {
        Self {
            header,
            status: crate::wire::DEVICE_PROCESSING_FAILURE_STATUS,
            actual_length: 0,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            error_count: 0,
            transfer_buffer: Vec::new(),
            iso_packet_descriptors: Vec::new(),
        }
    }

    pub fn decode<R: Read>(reader: &mut R, header: CmdHeader) -> Result<Self> {
        let static_buf = read_exact(reader, 28)?;
        let status = i32::from_be_bytes(static_buf[0..4].try_into().unwrap());
        let actual_length = u32::from_be_bytes(static_buf[4..8].try_into().unwrap());
        let start_frame = u32::from_be_bytes(static_buf[8..12].try_into().unwrap());
        let number_of_packets = u32::from_be_bytes(static_buf[12..16].try_into().unwrap());
        let error_count = u32::from_be_bytes(static_buf[16..20].try_into().unwrap());
        // remaining 8 octets are the zero padding field.

        let transfer_buffer = if header.direction()? == Direction::In && actual_length > 0 {
            read_exact(reader, actual_length as usize)?
        } else {
            Vec::new()
        };

        let iso_packet_descriptors = decode_iso_descriptors(reader, number_of_packets)?;

        Ok(Self {
            header,
            status,
            actual_length,
            start_frame,
            number_of_packets,
            error_count,
            transfer_buffer,
            iso_packet_descriptors,
        })
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode(writer)?;
        let mut static_buf = Vec::with_capacity(28);
        static_buf.extend_from_slice(&self.status.to_be_bytes());
        static_buf.extend_from_slice(&self.actual_length.to_be_bytes());
        static_buf.extend_from_slice(&self.start_frame.to_be_bytes());
        static_buf.extend_from_slice(&self.number_of_packets.to_be_bytes());
        static_buf.extend_from_slice(&self.error_count.to_be_bytes());
        static_buf.extend_from_slice(&0u64.to_be_bytes());
        write_all(writer, &static_buf)?;

        if self.header.direction()? == Direction::In {
            if self.transfer_buffer.len() as u32 != self.actual_length {
                return Err(UsbIpError::InvariantViolation(
                    "RetSubmit: transfer_buffer length does not match actual_length".into(),
                ));
            }
            write_all(writer, &self.transfer_buffer)?;
        }

        encode_iso_descriptors(writer, self.number_of_packets, &self.iso_packet_descriptors)
    }
}

/// `CMD_UNLINK`: header + `UnlinkSeqNum:u32` + 24 zero octets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmdUnlink {
    pub header: CmdHeader,
    pub unlink_seq_num: u32,
}

impl CmdUnlink {
    pub fn decode<R: Read>(reader: &mut R, header: CmdHeader) -> Result<Self> {
        let buf = read_exact(reader, 28)?;
        let unlink_seq_num = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        Ok(Self {
            header,
            unlink_seq_num,
        })
    }
}

/// `RET_UNLINK`: header + `Status:i32` + 24 zero octets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetUnlink {
    pub header: CmdHeader,
    pub status: i32,
}

impl RetUnlink {
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode(writer)?;
        let mut buf = Vec::with_capacity(28);
        buf.extend_from_slice(&self.status.to_be_bytes());
        buf.extend_from_slice(&[0u8; 24]);
        write_all(writer, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::RET_SUBMIT;

    #[test]
    fn cmd_header_byte_exact_encoding() {
        let header = CmdHeader {
            command: RET_SUBMIT,
            seq_num: 0x1234_5678,
            dev_id: 0x0001_000A,
            direction: Direction::In as u32,
            endpoint_number: 0x0000_000A,
        };
        let bytes = header.pack().unwrap();
        assert_eq!(
            bytes.as_slice(),
            &[
                0x00, 0x00, 0x00, 0x03, 0x12, 0x34, 0x56, 0x78, 0x00, 0x01, 0x00, 0x0A, 0x00, 0x00,
                0x00, 0x01, 0x00, 0x00, 0x00, 0x0A,
            ]
        );
    }

    fn header(command: u32, direction: Direction) -> CmdHeader {
        CmdHeader {
            command,
            seq_num: 1,
            dev_id: 1,
            direction: direction as u32,
            endpoint_number: 1,
        }
    }

    #[test]
    fn ret_submit_round_trips_with_payload() {
        let ret = RetSubmit::success(header(RET_SUBMIT, Direction::In), vec![1, 2, 3]);
        let mut buf = Vec::new();
        ret.encode(&mut buf).unwrap();

        let mut cursor = buf.as_slice();
        let decoded_header = CmdHeader::decode(&mut cursor).unwrap();
        let decoded = RetSubmit::decode(&mut cursor, decoded_header).unwrap();
        assert_eq!(decoded.transfer_buffer, vec![1, 2, 3]);
        assert_eq!(decoded.actual_length, 3);
        assert_eq!(decoded.status, 0);
    }

    #[test]
    fn cmd_submit_suppresses_iso_descriptors_when_count_is_sentinel() {
        let submit = CmdSubmit {
            header: header(CMD_SUBMIT, Direction::Out),
            transfer_flags: 0,
            transfer_buffer_length: 2,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            interval: 0,
            setup: [0; 8],
            transfer_buffer: vec![9, 9],
            iso_packet_descriptors: Vec::new(),
        };
        let mut buf = Vec::new();
        submit.encode(&mut buf).unwrap();

        let mut cursor = buf.as_slice();
        let decoded_header = CmdHeader::decode(&mut cursor).unwrap();
        let decoded = CmdSubmit::decode(&mut cursor, decoded_header).unwrap();
        assert_eq!(decoded.transfer_buffer, vec![9, 9]);
        assert!(decoded.iso_packet_descriptors.is_empty());
    }
}
