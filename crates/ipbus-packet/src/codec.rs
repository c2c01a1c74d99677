use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::PacketError;
use crate::protocol::{
    PacketType, BYTE_ORDER_QUALIFIER, INFO_REQUEST, MAX_TRANSACTION_ID, PROTOCOL_VERSION,
    WORD_SIZE,
};

/// The eight transaction kinds, with their wire type IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransactionKind {
    Read = 0,
    Write = 1,
    NonIncrementingRead = 2,
    NonIncrementingWrite = 3,
    ReadModifyWriteBits = 4,
    ReadModifyWriteSum = 5,
    ConfigurationRead = 6,
    ConfigurationWrite = 7,
}

impl TransactionKind {
    /// The 4-bit type ID used on the wire.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Read, non-incrementing read and configuration read.
    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::Read | Self::NonIncrementingRead | Self::ConfigurationRead
        )
    }

    /// Write, non-incrementing write and configuration write.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::Write | Self::NonIncrementingWrite | Self::ConfigurationWrite
        )
    }

    /// Either read-modify-write kind.
    pub fn is_rmw(self) -> bool {
        matches!(self, Self::ReadModifyWriteBits | Self::ReadModifyWriteSum)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::NonIncrementingRead => "non-incrementing read",
            Self::NonIncrementingWrite => "non-incrementing write",
            Self::ReadModifyWriteBits => "RMW bits",
            Self::ReadModifyWriteSum => "RMW sum",
            Self::ConfigurationRead => "configuration read",
            Self::ConfigurationWrite => "configuration write",
        }
    }
}

impl TryFrom<u8> for TransactionKind {
    type Error = PacketError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::NonIncrementingRead),
            3 => Ok(Self::NonIncrementingWrite),
            4 => Ok(Self::ReadModifyWriteBits),
            5 => Ok(Self::ReadModifyWriteSum),
            6 => Ok(Self::ConfigurationRead),
            7 => Ok(Self::ConfigurationWrite),
            other => Err(PacketError::UnknownTransactionKind(other)),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packet header, one word.
///
/// ```text
/// 31      28 27    24 23                 8 7        4 3       0
/// ┌─────────┬────────┬────────────────────┬──────────┬─────────┐
/// │ version │  rsvd  │     packet ID      │ byte ord │  type   │
/// └─────────┴────────┴────────────────────┴──────────┴─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version: u8,
    pub packet_id: u16,
    pub byte_order: u8,
    /// Raw 4-bit type; see [`PacketType::from_bits`].
    pub packet_type: u8,
}

impl PacketHeader {
    /// Header for an outbound packet of the given type.
    pub fn new(packet_type: PacketType, packet_id: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_id,
            byte_order: BYTE_ORDER_QUALIFIER,
            packet_type: packet_type as u8,
        }
    }

    pub fn encode(&self) -> u32 {
        (u32::from(self.version & 0xF) << 28)
            | (u32::from(self.packet_id) << 8)
            | (u32::from(self.byte_order & 0xF) << 4)
            | u32::from(self.packet_type & 0xF)
    }

    pub fn decode(word: u32) -> Self {
        Self {
            version: (word >> 28) as u8,
            packet_id: (word >> 8) as u16,
            byte_order: ((word >> 4) & 0xF) as u8,
            packet_type: (word & 0xF) as u8,
        }
    }
}

/// Transaction header, one word.
///
/// ```text
/// 31      28 27               16 15         8 7        4 3       0
/// ┌─────────┬───────────────────┬────────────┬──────────┬─────────┐
/// │ version │  transaction ID   │   words    │ type ID  │  info   │
/// └─────────┴───────────────────┴────────────┴──────────┴─────────┘
/// ```
///
/// Decoding never validates; the raw type ID is kept so that unknown kinds in
/// a reply can still be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    pub version: u8,
    pub transaction_id: u16,
    pub words: u8,
    pub type_id: u8,
    pub info_code: u8,
}

impl TransactionHeader {
    /// Header for an outbound request (info code 0xF).
    pub fn request(kind: TransactionKind, words: u8, transaction_id: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            transaction_id: transaction_id & MAX_TRANSACTION_ID,
            words,
            type_id: kind.id(),
            info_code: INFO_REQUEST,
        }
    }

    /// The transaction kind, if the type ID is a known one.
    pub fn kind(&self) -> Option<TransactionKind> {
        TransactionKind::try_from(self.type_id).ok()
    }

    pub fn encode(&self) -> u32 {
        (u32::from(self.version & 0xF) << 28)
            | (u32::from(self.transaction_id & MAX_TRANSACTION_ID) << 16)
            | (u32::from(self.words) << 8)
            | (u32::from(self.type_id & 0xF) << 4)
            | u32::from(self.info_code & 0xF)
    }

    pub fn decode(word: u32) -> Self {
        Self {
            version: (word >> 28) as u8,
            transaction_id: ((word >> 16) as u16) & MAX_TRANSACTION_ID,
            words: (word >> 8) as u8,
            type_id: ((word >> 4) & 0xF) as u8,
            info_code: (word & 0xF) as u8,
        }
    }
}

/// Encode the header word of an outbound packet.
pub fn encode_packet_header(packet_type: PacketType, packet_id: u16) -> u32 {
    PacketHeader::new(packet_type, packet_id).encode()
}

/// Encode the header word of an outbound transaction.
pub fn encode_transaction_header(kind: TransactionKind, words: u8, transaction_id: u16) -> u32 {
    TransactionHeader::request(kind, words, transaction_id).encode()
}

/// Split a transaction header word into its fields.
pub fn decode_transaction_header(word: u32) -> TransactionHeader {
    TransactionHeader::decode(word)
}

/// Append words to `dst` as little-endian bytes (control packet byte order).
pub fn put_words_le(words: &[u32], dst: &mut BytesMut) {
    dst.reserve(words.len() * WORD_SIZE);
    for &word in words {
        dst.put_u32_le(word);
    }
}

/// Decode little-endian words from `src` into `dst`.
///
/// Returns the number of whole words copied; trailing partial words and
/// words beyond `dst.len()` are ignored.
pub fn get_words_le(mut src: &[u8], dst: &mut [u32]) -> usize {
    let mut count = 0;
    while src.remaining() >= WORD_SIZE && count < dst.len() {
        dst[count] = src.get_u32_le();
        count += 1;
    }
    count
}

/// Append words to `dst` as big-endian bytes (status packet byte order).
pub fn put_words_be(words: &[u32], dst: &mut BytesMut) {
    dst.reserve(words.len() * WORD_SIZE);
    for &word in words {
        dst.put_u32(word);
    }
}

/// Decode big-endian words from `src` into `dst`; see [`get_words_le`].
pub fn get_words_be(mut src: &[u8], dst: &mut [u32]) -> usize {
    let mut count = 0;
    while src.remaining() >= WORD_SIZE && count < dst.len() {
        dst[count] = src.get_u32();
        count += 1;
    }
    count
}
