//! Control-transfer setup packet (USB 2.0 §9.3). Little-endian, unlike the
//! USB/IP frames in [`crate::wire`].

use packed_struct::prelude::*;

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    HostToDevice = 0,
    DeviceToHost = 1,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestType {
    Standard = 0,
    Class = 1,
    Vendor = 2,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Recipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
}

#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
}

/// 8-octet `SetupPacket`. `bm_request_type` packs direction (bit 7), request
/// type (bits 6-5), and recipient (bits 4-0) per USB 2.0 §9.3.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct SetupPacket {
    #[packed_field(bits = "0", ty = "enum")]
    pub direction: Direction,
    #[packed_field(bits = "1..=2", ty = "enum")]
    pub request_type: RequestType,
    #[packed_field(bits = "3..=7", ty = "enum")]
    pub recipient: Recipient,
    #[packed_field(bytes = "1")]
    pub b_request: u8,
    #[packed_field(bytes = "2..=3", endian = "lsb")]
    pub w_value: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "4..=5", endian = "lsb")]
    pub w_index: Integer<u16, packed_bits::Bits<16>>,
    #[packed_field(bytes = "6..=7", endian = "lsb")]
    pub w_length: Integer<u16, packed_bits::Bits<16>>,
}

impl SetupPacket {
    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self, packed_struct::PackingError> {
        Self::unpack(&bytes)
    }

    pub fn standard_request(&self) -> Option<StandardRequest> {
        if self.request_type != RequestType::Standard {
            return None;
        }
        StandardRequest::from_primitive(self.b_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_packet_byte_exact_little_endian_encoding() {
        let packet = SetupPacket {
            direction: Direction::DeviceToHost,
            request_type: RequestType::Vendor,
            recipient: Recipient::Other,
            b_request: 0xFF,
            w_value: 0x1234.into(),
            w_index: 0x1234.into(),
            w_length: 0x1234.into(),
        };
        let bytes = packet.pack().unwrap();
        assert_eq!(
            bytes.as_slice(),
            &[0xFF, 0xFF, 0x34, 0x12, 0x34, 0x12, 0x34, 0x12]
        );
    }

    #[test]
    fn get_descriptor_configuration_setup_decodes_standard_request() {
        // BmRequestType=0x80, BRequest=0x06 (GET_DESCRIPTOR), WValue=0x0200,
        // WIndex=0, WLength=9, matching scenario S5.
        let bytes: [u8; 8] = [0x80, 0x06, 0x00, 0x02, 0x00, 0x00, 0x09, 0x00];
        let setup = SetupPacket::from_bytes(bytes).unwrap();
        assert_eq!(setup.direction, Direction::DeviceToHost);
        assert_eq!(setup.standard_request(), Some(StandardRequest::GetDescriptor));
        assert_eq!(u16::from(setup.w_value), 0x0200);
        assert_eq!(u16::from(setup.w_length), 9);
    }
}
