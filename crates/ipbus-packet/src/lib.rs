//! IPbus control packets.
//!
//! This is the protocol layer of ipbus. A [`Packet`] collects transactions
//! into one datagram's worth of words:
//! - word 0 is the packet header, identical in request and response
//! - each transaction adds a header word and an address word to the request,
//!   followed by its write data or RMW operands
//! - the response reserves a header word per transaction plus its read words
//!
//! Buffers never grow past [`MAX_PACKET_WORDS`]. Responses are checked by
//! [`Packet::process_response`], which reports through a [`Notifier`].

pub mod codec;
pub mod error;
pub mod event;
pub mod packet;
pub mod protocol;
mod validator;

pub use codec::{
    decode_transaction_header, encode_packet_header, encode_transaction_header, PacketHeader,
    TransactionHeader, TransactionKind,
};
pub use error::{PacketError, Result};
pub use event::{ErrorCategory, Event, Notifier};
pub use packet::{bit_field_masks, Packet, Transaction, TransactionData, WordDump};
pub use protocol::{info_code_message, PacketType, MAX_PACKET_BYTES, MAX_PACKET_WORDS};
