//! Response validation.
//!
//! Transactions are checked in the order they were added and processing
//! stops at the first problem. Read results are copied into the destinations
//! supplied when the packet was built.

use tracing::debug;

use crate::codec::decode_transaction_header;
use crate::error::{PacketError, Result};
use crate::event::{Event, Notifier};
use crate::packet::{Packet, WordDump};
use crate::protocol::{info_code_message, INFO_SUCCESS, PROTOCOL_VERSION};

impl Packet<'_> {
    /// Validate a loaded response against the request.
    ///
    /// Emits `SuccessfulRead`/`SuccessfulWrite` per transaction and an error
    /// event for the first failure, before the error is returned. On failure
    /// both buffers are dumped at debug level.
    pub fn process_response(&mut self, notifier: &Notifier) -> Result<()> {
        let result = self.validate(notifier);
        if let Err(err) = &result {
            notifier.error(err.to_string(), err.category());
            debug!(
                request = %WordDump(self.request_words()),
                response = %WordDump(self.response_words()),
                "packet dump"
            );
        }
        result
    }

    fn validate(&mut self, notifier: &Notifier) -> Result<()> {
        let (request, response, response_size, transactions) = self.parts_mut();

        for (position, tx) in transactions.iter_mut().enumerate() {
            let header_pos = tx.response_header;
            if header_pos >= response_size {
                return Err(PacketError::MissingResponse {
                    transaction_id: position,
                });
            }

            let got = response[header_pos];
            let header = decode_transaction_header(got);
            if header.version != PROTOCOL_VERSION
                || usize::from(header.transaction_id) != position
                || header.type_id != tx.kind.id()
            {
                return Err(PacketError::UnexpectedHeader {
                    got,
                    expected: request[tx.request_header] & !0xF,
                });
            }

            let declared = usize::from(header.words);
            let available = response_size - (header_pos + 1);
            let body = &response[header_pos + 1..header_pos + 1 + available];
            let address = request[tx.address];

            if declared > 0 {
                if tx.kind.is_read() {
                    let received = declared.min(available);
                    if let Some(dest) = tx.destination.as_deref_mut() {
                        let n = received.min(dest.len());
                        dest[..n].copy_from_slice(&body[..n]);
                    }
                    notifier.emit(Event::SuccessfulRead(received));
                    if received < declared {
                        return Err(PacketError::Truncated {
                            address,
                            received,
                            declared,
                        });
                    }
                } else if tx.kind.is_rmw() {
                    if declared != 1 {
                        return Err(PacketError::WrongRmw { words: declared });
                    }
                    let Some(&value) = body.first() else {
                        return Err(PacketError::Truncated {
                            address,
                            received: 0,
                            declared,
                        });
                    };
                    if let Some(dest) = tx.destination.as_deref_mut() {
                        dest[0] = value;
                    }
                    notifier.emit(Event::SuccessfulRead(1));
                    notifier.emit(Event::SuccessfulWrite(declared));
                } else {
                    notifier.emit(Event::SuccessfulWrite(declared));
                }
            }

            if header.info_code != INFO_SUCCESS {
                return Err(PacketError::Target {
                    code: header.info_code,
                    message: info_code_message(header.info_code),
                    address,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::Receiver;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{put_words_le, TransactionHeader, TransactionKind};
    use crate::event::ErrorCategory;
    use crate::protocol::INFO_READ_ERROR;

    fn reply_header(kind: TransactionKind, words: u8, tid: u16, info: u8) -> u32 {
        TransactionHeader {
            info_code: info,
            ..TransactionHeader::request(kind, words, tid)
        }
        .encode()
    }

    fn load(packet: &mut Packet<'_>, words: &[u32]) {
        let mut buf = BytesMut::new();
        put_words_le(words, &mut buf);
        packet.load_response(&buf);
    }

    fn drain(rx: &Receiver<Event>) -> Vec<Event> {
        rx.try_iter().collect()
    }

    #[test]
    fn read_of_four_words_fills_destination() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut out = [0u32; 4];
        {
            let mut packet = Packet::new();
            packet
                .add_read(TransactionKind::Read, 0x1000, 4, Some(&mut out))
                .unwrap();
            load(
                &mut packet,
                &[0x2000_00F0, reply_header(TransactionKind::Read, 4, 0, 0), 1, 2, 3, 4],
            );
            packet.process_response(&notifier).unwrap();
        }
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(drain(&rx), vec![Event::SuccessfulRead(4)]);
    }

    #[test]
    fn writes_report_declared_words() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let data = [5u32, 6, 7];
        let mut packet = Packet::new();
        packet.add_write(TransactionKind::Write, 0x10, &data).unwrap();
        packet.add_register_write(0x20, 1).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::Write, 3, 0, 0),
                reply_header(TransactionKind::Write, 1, 1, 0),
            ],
        );

        packet.process_response(&notifier).unwrap();
        assert_eq!(
            drain(&rx),
            vec![Event::SuccessfulWrite(3), Event::SuccessfulWrite(1)]
        );
    }

    #[test]
    fn rmw_reports_read_then_write_and_returns_value() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut previous = 0u32;
        {
            let mut packet = Packet::new();
            packet.add_rmw_sum(0x40, 2, Some(&mut previous)).unwrap();
            load(
                &mut packet,
                &[
                    0x2000_00F0,
                    reply_header(TransactionKind::ReadModifyWriteSum, 1, 0, 0),
                    0x99,
                ],
            );
            packet.process_response(&notifier).unwrap();
        }
        assert_eq!(previous, 0x99);
        assert_eq!(
            drain(&rx),
            vec![Event::SuccessfulRead(1), Event::SuccessfulWrite(1)]
        );
    }

    #[test]
    fn rmw_with_wrong_word_count_fails() {
        let notifier = Notifier::new();
        let mut packet = Packet::new();
        packet.add_set_bit(0, 0x40).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::ReadModifyWriteBits, 2, 0, 0),
                0,
                0,
            ],
        );

        let err = packet.process_response(&notifier).unwrap_err();
        assert_eq!(err, PacketError::WrongRmw { words: 2 });
        assert!(err.to_string().starts_with("wrong RMW transaction"));
    }

    #[test]
    fn wrong_transaction_id_is_protocol_error() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut packet = Packet::new();
        packet.add_register_write(0x1, 1).unwrap();
        packet.add_register_write(0x2, 2).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::Write, 1, 0, 0),
                reply_header(TransactionKind::Write, 1, 5, 0),
            ],
        );

        let err = packet.process_response(&notifier).unwrap_err();
        assert!(matches!(err, PacketError::UnexpectedHeader { .. }));
        assert_eq!(err.category(), ErrorCategory::Protocol);
        assert_eq!(
            err.to_string(),
            "unexpected transaction header: 20050110, expected: 20010110"
        );

        let events = drain(&rx);
        assert_eq!(events[0], Event::SuccessfulWrite(1));
        assert_eq!(
            events[1],
            Event::Error {
                message: err.to_string(),
                category: ErrorCategory::Protocol
            }
        );
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn wrong_version_or_kind_is_rejected() {
        let notifier = Notifier::new();
        for got in [
            reply_header(TransactionKind::Read, 1, 0, 0) & 0x0FFF_FFFF | 0x1000_0000,
            reply_header(TransactionKind::ConfigurationRead, 1, 0, 0),
        ] {
            let mut packet = Packet::new();
            packet.add_read(TransactionKind::Read, 0, 1, None).unwrap();
            load(&mut packet, &[0x2000_00F0, got, 0]);
            assert!(matches!(
                packet.process_response(&notifier),
                Err(PacketError::UnexpectedHeader { .. })
            ));
        }
    }

    #[test]
    fn truncated_read_copies_what_arrived() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut out = [0u32; 4];
        let err = {
            let mut packet = Packet::new();
            packet
                .add_read(TransactionKind::Read, 0x1000, 4, Some(&mut out))
                .unwrap();
            load(
                &mut packet,
                &[0x2000_00F0, reply_header(TransactionKind::Read, 4, 0, 0), 1, 2],
            );
            packet.process_response(&notifier).unwrap_err()
        };

        assert_eq!(out, [1, 2, 0, 0]);
        assert_eq!(
            err,
            PacketError::Truncated {
                address: 0x1000,
                received: 2,
                declared: 4
            }
        );
        let events = drain(&rx);
        assert_eq!(events[0], Event::SuccessfulRead(2));
        assert!(matches!(events[1], Event::Error { category: ErrorCategory::Protocol, .. }));
    }

    #[test]
    fn exactly_enough_words_is_complete() {
        let notifier = Notifier::new();
        let mut packet = Packet::new();
        packet.add_read(TransactionKind::NonIncrementingRead, 0, 2, None).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::NonIncrementingRead, 2, 0, 0),
                8,
                9,
            ],
        );
        assert!(packet.process_response(&notifier).is_ok());

        // One word short of the declared count must not pass.
        let mut packet = Packet::new();
        packet.add_read(TransactionKind::NonIncrementingRead, 0, 2, None).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::NonIncrementingRead, 2, 0, 0),
                8,
            ],
        );
        assert!(packet.process_response(&notifier).is_err());
    }

    #[test]
    fn nonzero_info_code_fails_after_bookkeeping() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut packet = Packet::new();
        packet.add_read(TransactionKind::Read, 0xABCD, 1, None).unwrap();
        load(
            &mut packet,
            &[
                0x2000_00F0,
                reply_header(TransactionKind::Read, 1, 0, INFO_READ_ERROR),
                0,
            ],
        );

        let err = packet.process_response(&notifier).unwrap_err();
        assert_eq!(err.to_string(), "bus read error, address: 0000ABCD");
        assert_eq!(drain(&rx)[0], Event::SuccessfulRead(1));
    }

    #[test]
    fn unknown_info_code_is_described() {
        let notifier = Notifier::new();
        let mut packet = Packet::new();
        packet.add_register_write(0x8, 0).unwrap();
        load(
            &mut packet,
            &[0x2000_00F0, reply_header(TransactionKind::Write, 1, 0, 0xC)],
        );

        let err = packet.process_response(&notifier).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unspecified target error (info code 0xC), address: 00000008"
        );
    }

    #[test]
    fn reply_shorter_than_transaction_list_fails() {
        let notifier = Notifier::new();
        let mut packet = Packet::new();
        packet.add_register_write(0x1, 1).unwrap();
        packet.add_register_write(0x2, 2).unwrap();
        load(
            &mut packet,
            &[0x2000_00F0, reply_header(TransactionKind::Write, 1, 0, 0)],
        );

        assert_eq!(
            packet.process_response(&notifier).unwrap_err(),
            PacketError::MissingResponse { transaction_id: 1 }
        );
    }

    #[test]
    fn zero_word_transactions_skip_bookkeeping() {
        let notifier = Notifier::new();
        let rx = notifier.channel();
        let mut packet = Packet::new();
        packet.add_read(TransactionKind::Read, 0, 0, None).unwrap();
        load(
            &mut packet,
            &[0x2000_00F0, reply_header(TransactionKind::Read, 0, 0, 0)],
        );

        packet.process_response(&notifier).unwrap();
        assert!(drain(&rx).is_empty());
    }
}
