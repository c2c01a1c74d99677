//! Shared protocol definitions.
//!
//! Sizes are measured in 32-bit words. The packet limit comes from the
//! 1500-byte Ethernet MTU minus IP and UDP headers: 1472 bytes, 368 words.

/// Size of one protocol word in bytes.
pub const WORD_SIZE: usize = 4;

/// Maximum number of words in one request or response packet.
pub const MAX_PACKET_WORDS: usize = 368;

/// Maximum packet size in bytes.
pub const MAX_PACKET_BYTES: usize = MAX_PACKET_WORDS * WORD_SIZE;

/// Protocol version carried in every packet and transaction header.
pub const PROTOCOL_VERSION: u8 = 2;

/// Byte-order qualifier placed in packet headers.
pub const BYTE_ORDER_QUALIFIER: u8 = 0xF;

/// Largest word count a single transaction header can declare.
pub const MAX_TRANSACTION_WORDS: usize = u8::MAX as usize;

/// Largest transaction ID (12-bit field).
pub const MAX_TRANSACTION_ID: u16 = 0x0FFF;

/// Info code: the transaction succeeded.
pub const INFO_SUCCESS: u8 = 0x0;
/// Info code: the target could not parse the transaction header.
pub const INFO_BAD_HEADER: u8 = 0x1;
/// Info code: bus error while reading.
pub const INFO_READ_ERROR: u8 = 0x4;
/// Info code: bus error while writing.
pub const INFO_WRITE_ERROR: u8 = 0x5;
/// Info code: bus timeout while reading.
pub const INFO_READ_TIMEOUT: u8 = 0x6;
/// Info code: bus timeout while writing.
pub const INFO_WRITE_TIMEOUT: u8 = 0x7;
/// Info code carried by outbound requests.
pub const INFO_REQUEST: u8 = 0xF;

/// Packet type field of a packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Carries transactions, both directions.
    Control = 0x0,
    /// Status request/response.
    Status = 0x1,
    /// Resend request (request direction only).
    Resend = 0x2,
}

impl PacketType {
    /// Decode a 4-bit packet type. Reserved values return `None`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x0 => Some(Self::Control),
            0x1 => Some(Self::Status),
            0x2 => Some(Self::Resend),
            _ => None,
        }
    }
}

/// Returns a human-readable description of a transaction info code.
pub fn info_code_message(code: u8) -> String {
    match code {
        INFO_SUCCESS => "successful request".to_string(),
        INFO_BAD_HEADER => "bad header".to_string(),
        INFO_READ_ERROR => "bus read error".to_string(),
        INFO_WRITE_ERROR => "bus write error".to_string(),
        INFO_READ_TIMEOUT => "bus read timeout".to_string(),
        INFO_WRITE_TIMEOUT => "bus write timeout".to_string(),
        INFO_REQUEST => "outbound request".to_string(),
        other => format!("unspecified target error (info code 0x{other:X})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_packet_fits_ethernet_mtu() {
        // 20-byte IPv4 header + 8-byte UDP header.
        assert_eq!(MAX_PACKET_BYTES + 28, 1500);
    }

    #[test]
    fn known_info_codes_have_messages() {
        assert_eq!(info_code_message(INFO_BAD_HEADER), "bad header");
        assert_eq!(info_code_message(INFO_WRITE_TIMEOUT), "bus write timeout");
        assert_eq!(info_code_message(INFO_REQUEST), "outbound request");
    }

    #[test]
    fn unknown_info_code_carries_raw_value() {
        let msg = info_code_message(0x9);
        assert!(msg.starts_with("unspecified target error"));
        assert!(msg.contains("0x9"));
    }

    #[test]
    fn packet_type_bits() {
        assert_eq!(PacketType::from_bits(0), Some(PacketType::Control));
        assert_eq!(PacketType::from_bits(1), Some(PacketType::Status));
        assert_eq!(PacketType::from_bits(2), Some(PacketType::Resend));
        assert_eq!(PacketType::from_bits(7), None);
    }
}
