use crate::codec::TransactionKind;
use crate::event::ErrorCategory;

/// Errors raised while building a packet or validating its response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    /// A transaction type ID outside the eight defined kinds.
    #[error("unknown transaction kind {0}")]
    UnknownTransactionKind(u8),

    /// The payload variant does not belong to the transaction kind.
    #[error("payload does not match a {kind} transaction")]
    PayloadMismatch { kind: TransactionKind },

    /// A write source or read destination is shorter than the declared count.
    #[error("{kind} transaction declares {words} words but the buffer holds {available}")]
    InsufficientData {
        kind: TransactionKind,
        words: usize,
        available: usize,
    },

    /// More words than one transaction header can declare.
    #[error("transaction of {0} words exceeds the 255-word header limit")]
    TooManyWords(usize),

    /// Read-modify-write transactions always carry exactly one word.
    #[error("{kind} transaction must declare 1 word, got {words}")]
    InvalidRmwWords { kind: TransactionKind, words: u8 },

    /// A bit index outside a 32-bit register.
    #[error("bit index {0} is outside a 32-bit register")]
    InvalidBitIndex(u8),

    /// A bit field that does not fit in a 32-bit register.
    #[error("bit field of {nbits} bits at shift {shift} does not fit a 32-bit register")]
    InvalidBitField { nbits: u8, shift: u8 },

    /// Adding the transaction would push the request or response past the packet limit.
    #[error("packet size exceeded: request {request_words} words, response {response_words} words (max {max})")]
    SizeExceeded {
        request_words: usize,
        response_words: usize,
        max: usize,
    },

    /// A response transaction header disagrees with its request.
    #[error("unexpected transaction header: {got:08X}, expected: {expected:08X}")]
    UnexpectedHeader { got: u32, expected: u32 },

    /// The response ended before this transaction's header.
    #[error("response ends before transaction {transaction_id}")]
    MissingResponse { transaction_id: usize },

    /// A read (or RMW) reply holds fewer words than its header declares.
    #[error("read transaction from {address:08X} truncated: {received}/{declared} words received")]
    Truncated {
        address: u32,
        received: usize,
        declared: usize,
    },

    /// A read-modify-write reply declared a word count other than one.
    #[error("wrong RMW transaction: {words} words declared")]
    WrongRmw { words: usize },

    /// The target reported a nonzero info code.
    #[error("{message}, address: {address:08X}")]
    Target {
        code: u8,
        message: String,
        address: u32,
    },
}

impl PacketError {
    /// Classify the error as a caller mistake or a protocol violation.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownTransactionKind(_)
            | Self::PayloadMismatch { .. }
            | Self::InsufficientData { .. }
            | Self::TooManyWords(_)
            | Self::InvalidRmwWords { .. }
            | Self::InvalidBitIndex(_)
            | Self::InvalidBitField { .. } => ErrorCategory::Logic,
            Self::SizeExceeded { .. }
            | Self::UnexpectedHeader { .. }
            | Self::MissingResponse { .. }
            | Self::Truncated { .. }
            | Self::WrongRmw { .. }
            | Self::Target { .. } => ErrorCategory::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, PacketError>;
