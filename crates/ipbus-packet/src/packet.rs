use std::fmt;

use bytes::BytesMut;

use crate::codec::{encode_packet_header, encode_transaction_header, put_words_le, TransactionKind};
use crate::error::{PacketError, Result};
use crate::protocol::{PacketType, MAX_PACKET_WORDS, MAX_TRANSACTION_WORDS};

/// Payload handed to [`Packet::add_transaction`].
///
/// Borrowed destinations live as long as the packet; read results are copied
/// into them when the response is processed.
#[derive(Debug)]
pub enum TransactionData<'a> {
    /// Destination for read results. `None` discards the words.
    Read(Option<&'a mut [u32]>),
    /// Words to write, at least as many as the declared count.
    Write(&'a [u32]),
    /// AND term (bits to keep) and OR term (bits to set) of a bit RMW,
    /// with an optional slot for the word the target returns.
    Masks {
        and: u32,
        or: u32,
        result: Option<&'a mut u32>,
    },
    /// Addend of a sum RMW, with an optional slot for the returned word.
    Addend {
        addend: u32,
        result: Option<&'a mut u32>,
    },
}

/// Correlation record for one transaction.
///
/// Holds positions into the packet's request and response buffers; the
/// buffers themselves belong to the [`Packet`].
#[derive(Debug)]
pub struct Transaction<'a> {
    pub(crate) kind: TransactionKind,
    pub(crate) words: u8,
    pub(crate) request_header: usize,
    pub(crate) address: usize,
    pub(crate) data: Option<usize>,
    pub(crate) response_header: usize,
    pub(crate) destination: Option<&'a mut [u32]>,
}

impl Transaction<'_> {
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Declared word count.
    pub fn words(&self) -> u8 {
        self.words
    }

    /// Position of the request header word.
    pub fn request_header_index(&self) -> usize {
        self.request_header
    }

    /// Position of the address word in the request.
    pub fn address_index(&self) -> usize {
        self.address
    }

    /// Position of the first data word in the request (writes and RMW only).
    pub fn data_index(&self) -> Option<usize> {
        self.data
    }

    /// Position reserved for the response header word.
    pub fn response_header_index(&self) -> usize {
        self.response_header
    }
}

/// One outbound control packet and the buffer its reply is read into.
///
/// Word 0 of both buffers is the packet header; both cursors start at 1.
/// Transactions are numbered from 0 in the order they are added.
pub struct Packet<'a> {
    request: [u32; MAX_PACKET_WORDS],
    response: [u32; MAX_PACKET_WORDS],
    request_size: usize,
    response_size: usize,
    transactions: Vec<Transaction<'a>>,
}

impl<'a> Packet<'a> {
    /// An empty control packet with packet ID 0.
    pub fn new() -> Self {
        Self::with_packet_id(0)
    }

    /// An empty control packet with an explicit packet ID.
    pub fn with_packet_id(packet_id: u16) -> Self {
        let header = encode_packet_header(PacketType::Control, packet_id);
        let mut request = [0u32; MAX_PACKET_WORDS];
        let mut response = [0u32; MAX_PACKET_WORDS];
        request[0] = header;
        response[0] = header;
        Self {
            request,
            response,
            request_size: 1,
            response_size: 1,
            transactions: Vec::new(),
        }
    }

    /// Append one transaction.
    ///
    /// Word counts are checked before anything is written, so a rejected
    /// transaction leaves the packet untouched. Returns the transaction ID.
    pub fn add_transaction(
        &mut self,
        kind: TransactionKind,
        address: u32,
        data: TransactionData<'a>,
        words: u8,
    ) -> Result<u16> {
        let count = usize::from(words);
        let (payload, response_words, destination): (&[u32], usize, Option<&'a mut [u32]>) =
            match data {
                TransactionData::Read(destination) if kind.is_read() => {
                    if let Some(dest) = &destination {
                        if dest.len() < count {
                            return Err(PacketError::InsufficientData {
                                kind,
                                words: count,
                                available: dest.len(),
                            });
                        }
                    }
                    (&[][..], count, destination)
                }
                TransactionData::Write(source) if kind.is_write() => {
                    if source.len() < count {
                        return Err(PacketError::InsufficientData {
                            kind,
                            words: count,
                            available: source.len(),
                        });
                    }
                    (&source[..count], 0, None)
                }
                TransactionData::Masks { and, or, result }
                    if kind == TransactionKind::ReadModifyWriteBits =>
                {
                    check_rmw_words(kind, words)?;
                    self.check_capacity(2 + 2, 1 + 1)?;
                    let result = result.map(std::slice::from_mut);
                    return Ok(self.append(kind, address, &[and, or], 1, words, result));
                }
                TransactionData::Addend { addend, result }
                    if kind == TransactionKind::ReadModifyWriteSum =>
                {
                    check_rmw_words(kind, words)?;
                    self.check_capacity(2 + 1, 1 + 1)?;
                    let result = result.map(std::slice::from_mut);
                    return Ok(self.append(kind, address, &[addend], 1, words, result));
                }
                _ => return Err(PacketError::PayloadMismatch { kind }),
            };

        self.check_capacity(2 + payload.len(), 1 + response_words)?;
        Ok(self.append(kind, address, payload, response_words, words, destination))
    }

    /// Read `words` words starting at `address`.
    pub fn add_read(
        &mut self,
        kind: TransactionKind,
        address: u32,
        words: u8,
        destination: Option<&'a mut [u32]>,
    ) -> Result<u16> {
        self.add_transaction(kind, address, TransactionData::Read(destination), words)
    }

    /// Write every word of `data` starting at `address`.
    pub fn add_write(
        &mut self,
        kind: TransactionKind,
        address: u32,
        data: &'a [u32],
    ) -> Result<u16> {
        if data.len() > MAX_TRANSACTION_WORDS {
            return Err(PacketError::TooManyWords(data.len()));
        }
        self.add_transaction(kind, address, TransactionData::Write(data), data.len() as u8)
    }

    /// Single-word write.
    pub fn add_register_write(&mut self, address: u32, value: u32) -> Result<u16> {
        self.check_capacity(2 + 1, 1)?;
        Ok(self.append(TransactionKind::Write, address, &[value], 0, 1, None))
    }

    /// Replace `nbits` bits at `shift` with the low bits of `value`.
    ///
    /// A full 32-bit field is a plain write; anything narrower becomes a
    /// bit RMW with AND = !(mask << shift) and OR = (value & mask) << shift.
    pub fn add_bit_field_write(
        &mut self,
        address: u32,
        value: u32,
        nbits: u8,
        shift: u8,
    ) -> Result<u16> {
        let (and, or) = bit_field_masks(value, nbits, shift)?;
        if nbits == 32 {
            return self.add_register_write(address, value);
        }
        self.add_rmw_bits(address, and, or, None)
    }

    /// Set bit `n` of the register at `address`.
    pub fn add_set_bit(&mut self, n: u8, address: u32) -> Result<u16> {
        let bit = bit_mask(n)?;
        self.add_rmw_bits(address, u32::MAX, bit, None)
    }

    /// Clear bit `n` of the register at `address`.
    pub fn add_clear_bit(&mut self, n: u8, address: u32) -> Result<u16> {
        let bit = bit_mask(n)?;
        self.add_rmw_bits(address, !bit, 0, None)
    }

    /// Bit RMW: `reg = (reg & and) | or`.
    pub fn add_rmw_bits(
        &mut self,
        address: u32,
        and: u32,
        or: u32,
        result: Option<&'a mut u32>,
    ) -> Result<u16> {
        self.add_transaction(
            TransactionKind::ReadModifyWriteBits,
            address,
            TransactionData::Masks { and, or, result },
            1,
        )
    }

    /// Sum RMW: `reg = reg + addend`.
    pub fn add_rmw_sum(
        &mut self,
        address: u32,
        addend: u32,
        result: Option<&'a mut u32>,
    ) -> Result<u16> {
        self.add_transaction(
            TransactionKind::ReadModifyWriteSum,
            address,
            TransactionData::Addend { addend, result },
            1,
        )
    }

    /// Return to the freshly constructed state, keeping the packet ID.
    pub fn reset(&mut self) {
        self.transactions.clear();
        self.request[1..].fill(0);
        self.response[1..].fill(0);
        self.response[0] = self.request[0];
        self.request_size = 1;
        self.response_size = 1;
    }

    /// Copy a received datagram into the response buffer and trim the
    /// response size to the words actually received.
    ///
    /// The caller validates the datagram length first; surplus bytes beyond
    /// the buffer and a trailing partial word are dropped.
    pub fn load_response(&mut self, datagram: &[u8]) -> usize {
        let received = crate::codec::get_words_le(datagram, &mut self.response);
        self.response_size = received;
        received
    }

    /// Serialize the request words for the wire.
    pub fn encode_request(&self, dst: &mut BytesMut) {
        put_words_le(self.request_words(), dst);
    }

    /// The packet header word.
    pub fn header(&self) -> u32 {
        self.request[0]
    }

    /// Words written so far, including the header.
    pub fn request_size(&self) -> usize {
        self.request_size
    }

    /// Words reserved for the reply, or received once a reply is loaded.
    pub fn response_size(&self) -> usize {
        self.response_size
    }

    pub fn request_words(&self) -> &[u32] {
        &self.request[..self.request_size]
    }

    pub fn response_words(&self) -> &[u32] {
        &self.response[..self.response_size]
    }

    pub fn transactions(&self) -> &[Transaction<'a>] {
        &self.transactions
    }

    /// Number of transactions added.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True when only the header is present.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Address word of a transaction.
    pub fn address_of(&self, transaction: &Transaction<'_>) -> u32 {
        self.request[transaction.address]
    }

    /// Request, response, received size and transactions, borrowed together
    /// for validation.
    pub(crate) fn parts_mut(&mut self) -> (&[u32], &[u32], usize, &mut [Transaction<'a>]) {
        (
            &self.request[..],
            &self.response[..],
            self.response_size,
            &mut self.transactions[..],
        )
    }

    fn check_capacity(&self, request_words: usize, response_words: usize) -> Result<()> {
        let request_total = self.request_size + request_words;
        let response_total = self.response_size + response_words;
        if request_total > MAX_PACKET_WORDS || response_total > MAX_PACKET_WORDS {
            return Err(PacketError::SizeExceeded {
                request_words: request_total,
                response_words: response_total,
                max: MAX_PACKET_WORDS,
            });
        }
        Ok(())
    }

    fn append(
        &mut self,
        kind: TransactionKind,
        address: u32,
        payload: &[u32],
        response_words: usize,
        words: u8,
        destination: Option<&'a mut [u32]>,
    ) -> u16 {
        let transaction_id = self.transactions.len() as u16;

        let request_header = self.request_size;
        self.request[request_header] = encode_transaction_header(kind, words, transaction_id);
        self.request[request_header + 1] = address;
        let data_start = request_header + 2;
        self.request[data_start..data_start + payload.len()].copy_from_slice(payload);
        self.request_size = data_start + payload.len();

        let response_header = self.response_size;
        self.response_size += 1 + response_words;

        self.transactions.push(Transaction {
            kind,
            words,
            request_header,
            address: request_header + 1,
            data: (!payload.is_empty()).then_some(data_start),
            response_header,
            destination,
        });
        transaction_id
    }
}

impl Default for Packet<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("header", &format_args!("{:08X}", self.header()))
            .field("request_size", &self.request_size)
            .field("response_size", &self.response_size)
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

/// Hex listing of packet words, eight digits per word.
pub struct WordDump<'w>(pub &'w [u32]);

impl fmt::Display for WordDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{word:08X}")?;
        }
        Ok(())
    }
}

/// AND/OR masks that replace `nbits` bits at `shift` with `value`.
pub fn bit_field_masks(value: u32, nbits: u8, shift: u8) -> Result<(u32, u32)> {
    if nbits == 0 || u32::from(nbits) + u32::from(shift) > 32 {
        return Err(PacketError::InvalidBitField { nbits, shift });
    }
    if nbits == 32 {
        return Ok((0, value));
    }
    let mask = (1u32 << nbits) - 1;
    Ok((!(mask << shift), (value & mask) << shift))
}

fn bit_mask(n: u8) -> Result<u32> {
    if n >= 32 {
        return Err(PacketError::InvalidBitIndex(n));
    }
    Ok(1u32 << n)
}

fn check_rmw_words(kind: TransactionKind, words: u8) -> Result<()> {
    if words != 1 {
        return Err(PacketError::InvalidRmwWords { kind, words });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_transaction_header;
    use crate::protocol::INFO_REQUEST;

    #[test]
    fn fresh_packet_holds_only_header() {
        let packet = Packet::new();
        assert_eq!(packet.request_size(), 1);
        assert_eq!(packet.response_size(), 1);
        assert!(packet.is_empty());
        assert_eq!(packet.request_words(), &[0x2000_00F0]);
        assert_eq!(packet.response_words(), &[0x2000_00F0]);
    }

    #[test]
    fn write_kinds_copy_address_and_data() {
        let data = [0xDEAD_BEEF, 0x0000_0001, 0xFFFF_FFFF];
        for kind in [
            TransactionKind::Write,
            TransactionKind::NonIncrementingWrite,
            TransactionKind::ConfigurationWrite,
        ] {
            let mut packet = Packet::new();
            packet.add_write(kind, 0x1234, &data).unwrap();

            let words = packet.request_words();
            assert_eq!(words.len(), 1 + 2 + 3);
            let header = decode_transaction_header(words[1]);
            assert_eq!(header.kind(), Some(kind));
            assert_eq!(header.words, 3);
            assert_eq!(header.info_code, INFO_REQUEST);
            assert_eq!(words[2], 0x1234);
            assert_eq!(&words[3..], &data);
            assert_eq!(packet.response_size(), 2, "write reserves only a header");

            let tx = &packet.transactions()[0];
            assert_eq!(tx.data_index(), Some(3));
            assert_eq!(packet.address_of(tx), 0x1234);
        }
    }

    #[test]
    fn read_reserves_response_words_without_request_data() {
        let mut out = [0u32; 4];
        let mut packet = Packet::new();
        packet
            .add_read(TransactionKind::Read, 0x1000, 4, Some(&mut out))
            .unwrap();

        assert_eq!(packet.request_size(), 3);
        assert_eq!(packet.response_size(), 1 + 1 + 4);
        let tx = &packet.transactions()[0];
        assert_eq!(tx.response_header_index(), 1);
        assert_eq!(tx.data_index(), None);
    }

    #[test]
    fn rmw_bits_writes_two_masks_and_reserves_one_word() {
        let mut packet = Packet::new();
        packet.add_rmw_bits(0x30, 0xFFFF_F0FF, 0x0000_0F00, None).unwrap();

        let words = packet.request_words();
        assert_eq!(words.len(), 5);
        assert_eq!(&words[2..], &[0x30, 0xFFFF_F0FF, 0x0000_0F00]);
        assert_eq!(packet.response_size(), 3);
    }

    #[test]
    fn rmw_sum_writes_addend_and_reserves_one_word() {
        let mut packet = Packet::new();
        packet.add_rmw_sum(0x40, 5, None).unwrap();

        assert_eq!(&packet.request_words()[2..], &[0x40, 5]);
        assert_eq!(packet.response_size(), 3);
    }

    #[test]
    fn transaction_ids_follow_call_order() {
        let mut packet = Packet::new();
        let ids = [
            packet.add_register_write(0x1, 1).unwrap(),
            packet.add_read(TransactionKind::ConfigurationRead, 0x2, 1, None).unwrap(),
            packet.add_set_bit(3, 0x3).unwrap(),
            packet.add_rmw_sum(0x4, 1, None).unwrap(),
            packet.add_read(TransactionKind::NonIncrementingRead, 0x5, 2, None).unwrap(),
        ];
        assert_eq!(ids, [0, 1, 2, 3, 4]);

        for (position, tx) in packet.transactions().iter().enumerate() {
            let word = packet.request_words()[tx.request_header_index()];
            let header = decode_transaction_header(word);
            assert_eq!(usize::from(header.transaction_id), position);
        }
    }

    #[test]
    fn bit_field_masks_select_field() {
        let mut packet = Packet::new();
        packet.add_bit_field_write(0x30, 0xF, 4, 8).unwrap();

        assert_eq!(packet.len(), 1);
        let tx = &packet.transactions()[0];
        assert_eq!(tx.kind(), TransactionKind::ReadModifyWriteBits);
        assert_eq!(
            &packet.request_words()[2..],
            &[0x30, 0xFFFF_F0FF, 0x0000_0F00]
        );
    }

    #[test]
    fn bit_field_value_is_masked_to_width() {
        assert_eq!(bit_field_masks(0xFF, 4, 0).unwrap(), (0xFFFF_FFF0, 0x0000_000F));
        assert_eq!(bit_field_masks(0xAB, 8, 24).unwrap(), (0x00FF_FFFF, 0xAB00_0000));
    }

    #[test]
    fn full_width_bit_field_is_plain_write() {
        let mut packet = Packet::new();
        packet.add_bit_field_write(0x30, 0x1234_5678, 32, 0).unwrap();

        let tx = &packet.transactions()[0];
        assert_eq!(tx.kind(), TransactionKind::Write);
        assert_eq!(&packet.request_words()[2..], &[0x30, 0x1234_5678]);
    }

    #[test]
    fn invalid_bit_ranges_are_logic_errors() {
        let mut packet = Packet::new();
        for (nbits, shift) in [(0, 0), (33, 0), (8, 25), (32, 1)] {
            let err = packet.add_bit_field_write(0, 0, nbits, shift).unwrap_err();
            assert_eq!(err, PacketError::InvalidBitField { nbits, shift });
            assert_eq!(err.category(), crate::event::ErrorCategory::Logic);
        }
        assert_eq!(
            packet.add_set_bit(32, 0).unwrap_err(),
            PacketError::InvalidBitIndex(32)
        );
        assert!(packet.is_empty());
    }

    #[test]
    fn set_and_clear_bit_masks() {
        let mut packet = Packet::new();
        packet.add_set_bit(5, 0x10).unwrap();
        packet.add_clear_bit(5, 0x10).unwrap();

        let words = packet.request_words();
        assert_eq!(&words[3..5], &[0xFFFF_FFFF, 0x20]);
        assert_eq!(&words[7..9], &[0xFFFF_FFDF, 0x0]);
    }

    #[test]
    fn mismatched_payload_is_rejected_without_mutation() {
        let mut packet = Packet::new();
        let err = packet
            .add_transaction(TransactionKind::Read, 0, TransactionData::Write(&[1]), 1)
            .unwrap_err();
        assert_eq!(
            err,
            PacketError::PayloadMismatch {
                kind: TransactionKind::Read
            }
        );
        assert_eq!(err.category(), crate::event::ErrorCategory::Logic);
        assert_eq!(packet.request_size(), 1);
        assert!(packet.is_empty());
    }

    #[test]
    fn short_write_source_is_rejected() {
        let mut packet = Packet::new();
        let err = packet
            .add_transaction(TransactionKind::Write, 0, TransactionData::Write(&[1, 2]), 3)
            .unwrap_err();
        assert!(matches!(err, PacketError::InsufficientData { words: 3, available: 2, .. }));
    }

    #[test]
    fn short_read_destination_is_rejected() {
        let mut out = [0u32; 1];
        let mut packet = Packet::new();
        let err = packet
            .add_read(TransactionKind::Read, 0, 2, Some(&mut out))
            .unwrap_err();
        assert!(matches!(err, PacketError::InsufficientData { words: 2, available: 1, .. }));
    }

    #[test]
    fn rmw_must_declare_one_word() {
        let mut packet = Packet::new();
        let err = packet
            .add_transaction(
                TransactionKind::ReadModifyWriteSum,
                0,
                TransactionData::Addend { addend: 1, result: None },
                2,
            )
            .unwrap_err();
        assert!(matches!(err, PacketError::InvalidRmwWords { words: 2, .. }));
    }

    #[test]
    fn write_of_more_than_255_words_is_rejected() {
        let data = vec![0u32; 256];
        let mut packet = Packet::new();
        assert_eq!(
            packet.add_write(TransactionKind::Write, 0, &data).unwrap_err(),
            PacketError::TooManyWords(256)
        );
    }

    #[test]
    fn request_limit_is_exact() {
        // 1 header + 2 writes of (2 + 181) words = 367; one more word fits, two do not.
        let data = vec![7u32; 181];
        let mut packet = Packet::new();
        packet.add_write(TransactionKind::Write, 0, &data).unwrap();
        packet.add_write(TransactionKind::Write, 0, &data).unwrap();
        assert_eq!(packet.request_size(), 367);

        let err = packet.add_register_write(0, 0).unwrap_err();
        assert!(matches!(err, PacketError::SizeExceeded { request_words: 370, .. }));
        assert_eq!(err.category(), crate::event::ErrorCategory::Protocol);
        assert_eq!(packet.request_size(), 367);
        assert_eq!(packet.len(), 2);

        // A zero-word read still needs header + address: 369 > 368.
        assert!(packet.add_read(TransactionKind::Read, 0, 0, None).is_err());
    }

    #[test]
    fn response_limit_is_exact() {
        // Each read reserves 1 + 255 response words; the second overflows.
        let mut packet = Packet::new();
        packet.add_read(TransactionKind::Read, 0, 255, None).unwrap();
        assert_eq!(packet.response_size(), 257);
        assert!(matches!(
            packet.add_read(TransactionKind::Read, 0, 255, None),
            Err(PacketError::SizeExceeded { response_words: 513, .. })
        ));

        // Exactly filling the response buffer is allowed: 257 + 1 + 110 = 368.
        packet.add_read(TransactionKind::Read, 0, 110, None).unwrap();
        assert_eq!(packet.response_size(), 368);
        assert!(packet.add_read(TransactionKind::Read, 0, 0, None).is_err());
        assert_eq!(packet.len(), 2);
    }

    #[test]
    fn boundary_grid_for_single_word_writes() {
        // Each single-word write costs 3 request words: 1 + 3n <= 368 → n <= 122.
        let mut packet = Packet::new();
        for i in 0..122 {
            packet.add_register_write(i, i).unwrap();
        }
        assert_eq!(packet.request_size(), 367);
        assert!(packet.add_register_write(0, 0).is_err());
        assert_eq!(packet.len(), 122);
    }

    #[test]
    fn reset_restores_fresh_state() {
        let fresh = Packet::with_packet_id(9);
        let mut out = [0u32; 3];
        let mut packet = Packet::with_packet_id(9);
        packet.add_register_write(0x10, 0xAA).unwrap();
        packet.add_read(TransactionKind::Read, 0x20, 3, Some(&mut out)).unwrap();
        packet.load_response(&[0xF9, 0x09, 0x00, 0x20, 1, 0, 0, 0]);

        packet.reset();
        assert_eq!(packet.request_size(), 1);
        assert_eq!(packet.response_size(), 1);
        assert!(packet.is_empty());
        assert_eq!(packet.request[..], fresh.request[..]);
        assert_eq!(packet.response[..], fresh.response[..]);

        packet.reset();
        assert_eq!(packet.request[..], fresh.request[..]);
        assert_eq!(packet.response[..], fresh.response[..]);
        assert!(packet.is_empty());
    }

    #[test]
    fn encode_request_is_little_endian() {
        let mut packet = Packet::new();
        packet.add_register_write(0x0000_0001, 0x0A0B_0C0D).unwrap();
        let mut buf = BytesMut::new();
        packet.encode_request(&mut buf);
        assert_eq!(buf.len(), 4 * 4);
        assert_eq!(&buf[..4], &[0xF0, 0x00, 0x00, 0x20]);
        assert_eq!(&buf[12..], &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn word_dump_format() {
        assert_eq!(WordDump(&[0x2000_00F0, 1]).to_string(), "200000F0 00000001");
    }
}
