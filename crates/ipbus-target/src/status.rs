//! Status exchange.
//!
//! The status packet is a fixed 16-word diagnostic exchange, sent big-endian
//! regardless of the byte order used for control packets:
//!
//! ```text
//! word 0      packet header 0x200000F1
//! word 1      MTU
//! word 2      number of response buffers
//! word 3      next expected packet header
//! words 4-7   traffic history (16 bytes)
//! words 8-15  control history
//! ```

use bytes::BytesMut;
use ipbus_packet::codec::{get_words_be, put_words_be, PacketHeader};
use ipbus_packet::{encode_packet_header, PacketType};

/// Words in a status request or reply.
pub const STATUS_WORDS: usize = 16;

/// Bytes in a status request or reply.
pub const STATUS_BYTES: usize = STATUS_WORDS * 4;

/// First word of every status packet.
pub fn status_header() -> u32 {
    encode_packet_header(PacketType::Status, 0)
}

/// The status header as it appears on the wire.
pub fn status_header_bytes() -> [u8; 4] {
    status_header().to_be_bytes()
}

/// True when `datagram` starts like a status packet of the expected size.
pub fn is_status_datagram(datagram: &[u8]) -> bool {
    datagram.len() == STATUS_BYTES && datagram[..4] == status_header_bytes()
}

/// Serialized status request: the header followed by zeroed fields.
pub fn status_request() -> BytesMut {
    StatusReport::default().encode()
}

/// Decoded status reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Largest packet the target accepts, in bytes.
    pub mtu: u32,
    /// Number of reply buffers the target keeps for resends.
    pub response_buffers: u32,
    /// Header the target expects on the next control packet.
    pub next_packet_header: u32,
    pub traffic_history: [u8; 16],
    pub control_history: [u32; 8],
}

impl StatusReport {
    /// Decode a status reply; `None` unless it is exactly 64 bytes and
    /// starts with the status header.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if !is_status_datagram(datagram) {
            return None;
        }
        let mut words = [0u32; STATUS_WORDS];
        get_words_be(datagram, &mut words);

        let mut traffic_history = [0u8; 16];
        traffic_history.copy_from_slice(&datagram[16..32]);
        let mut control_history = [0u32; 8];
        control_history.copy_from_slice(&words[8..]);

        Some(Self {
            mtu: words[1],
            response_buffers: words[2],
            next_packet_header: words[3],
            traffic_history,
            control_history,
        })
    }

    /// Serialize with the status header in front.
    pub fn encode(&self) -> BytesMut {
        let mut words = [0u32; STATUS_WORDS];
        words[0] = status_header();
        words[1] = self.mtu;
        words[2] = self.response_buffers;
        words[3] = self.next_packet_header;
        get_words_be(&self.traffic_history, &mut words[4..8]);
        words[8..].copy_from_slice(&self.control_history);

        let mut buf = BytesMut::with_capacity(STATUS_BYTES);
        put_words_be(&words, &mut buf);
        buf
    }

    /// Packet ID the target expects next.
    pub fn next_packet_id(&self) -> u16 {
        PacketHeader::decode(self.next_packet_header).packet_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_64_bytes_big_endian() {
        let request = status_request();
        assert_eq!(request.len(), 64);
        assert_eq!(&request[..4], &[0x20, 0x00, 0x00, 0xF1]);
        assert!(request[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_reply_fields() {
        let report = StatusReport {
            mtu: 1472,
            response_buffers: 4,
            next_packet_header: 0x2000_01F0,
            traffic_history: [3; 16],
            control_history: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        let wire = report.encode();
        assert_eq!(&wire[4..8], &[0x00, 0x00, 0x05, 0xC0]);

        let decoded = StatusReport::decode(&wire).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.next_packet_id(), 1);
    }

    #[test]
    fn wrong_size_or_header_is_rejected() {
        let wire = status_request();
        assert!(StatusReport::decode(&wire[..60]).is_none());

        let mut control = wire.clone();
        control[3] = 0xF0;
        assert!(StatusReport::decode(&control).is_none());
        assert!(!is_status_datagram(&control));
    }
}
