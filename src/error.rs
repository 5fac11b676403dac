//! Error types for the arithmetic codec.

use thiserror::Error;

/// Error variants for codec operations.
///
/// None of these are recoverable: the coder and models make no attempt to
/// resume after a failure, and callers are expected to abandon the current
/// operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Alphabet size outside the supported range of 2 to 2048 symbols.
    #[error("invalid number of data symbols: {0}")]
    InvalidAlphabetSize(u32),

    /// A symbol probability fell outside [0.0001, 0.9999].
    #[error("invalid symbol probability: {0}")]
    InvalidProbability(f64),

    /// The probability vector does not sum to 1 within tolerance.
    #[error("probabilities sum to {0}, expected 1.0")]
    InvalidDistribution(f64),

    /// Code buffer size outside the supported range of 16 bytes to 16 MiB.
    #[error("invalid codec buffer size: {0}")]
    InvalidBufferSize(usize),

    /// The coder was asked to start or stop in the wrong mode.
    #[error("coder state error: {0}")]
    CoderState(&'static str),

    /// Encoding produced more bytes than the code buffer can hold.
    #[error("code buffer overflow: {code_bytes} bytes into a {capacity}-byte buffer")]
    BufferOverflow {
        /// Bytes the encoder produced.
        code_bytes: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// A block header declared more code bytes than the buffer can hold.
    #[error("compressed block of {code_bytes} bytes exceeds buffer capacity {capacity}")]
    BlockTooLarge {
        /// Declared block length.
        code_bytes: usize,
        /// Configured buffer capacity.
        capacity: usize,
    },

    /// A block length header ran past its 4-byte limit.
    #[error("malformed block length header")]
    MalformedBlockHeader,

    /// The archive does not start with the expected file identifier.
    #[error("not a compressed archive (file id {0:#010x})")]
    BadFileId(u32),

    /// The input is too large for the archive's 32-bit byte count.
    #[error("input too large for archive format: {0} bytes")]
    InputTooLarge(u64),

    /// Decompressed data does not match the checksum stored in the header.
    #[error("checksum mismatch: archive says {expected:#010x}, data gives {found:#010x}")]
    ChecksumMismatch {
        /// Checksum recorded in the archive header.
        expected: u32,
        /// Checksum of the decompressed data.
        found: u32,
    },

    /// An I/O error occurred while reading or writing an archive.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
