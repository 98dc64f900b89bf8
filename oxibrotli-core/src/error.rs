//! Error types for OxiBrotli operations.
//!
//! Decoder failures are classified by fault class and reported without
//! recovery: a Brotli stream cannot be partially valid, so the first error
//! poisons the decode. Each variant corresponds to one class of the decoder
//! error taxonomy; [`BrotliError::code`] maps a variant to the conventional
//! small negative integer used by C-family Brotli embedders.

use thiserror::Error;

/// The main error type for OxiBrotli operations.
#[derive(Debug, Error)]
pub enum BrotliError {
    /// Invalid stream header (reserved bit set, bad window-bits encoding).
    #[error("Malformed stream header: {message}")]
    MalformedHeader {
        /// Description of the header error.
        message: String,
    },

    /// Invalid metablock header (reserved bits, MLEN nibble rules).
    #[error("Malformed metablock: {message}")]
    MalformedMetablock {
        /// Description of the metablock error.
        message: String,
    },

    /// Invalid context map (run overflows the map, bad symbols).
    #[error("Malformed context map: {message}")]
    MalformedContextMap {
        /// Description of the context-map error.
        message: String,
    },

    /// Invalid prefix code (code space under/over-subscribed, duplicate
    /// symbols, bad code-length code).
    #[error("Malformed prefix code: {message}")]
    MalformedHuffman {
        /// Description of the prefix-code error.
        message: String,
    },

    /// Back-reference distance of zero, beyond the window and attached
    /// dictionaries, or negative after short-code substitution.
    #[error("Invalid back-reference distance {distance} (maximum {max_distance})")]
    InvalidDistance {
        /// The offending distance value.
        distance: u64,
        /// Largest distance serviceable at this position.
        max_distance: u64,
    },

    /// Copy length exceeding the metablock remainder, or outside the
    /// dictionary word-length range for a dictionary reference.
    #[error("Invalid copy length {copy_length} ({message})")]
    InvalidCopyLength {
        /// The offending copy length.
        copy_length: usize,
        /// Why the length is invalid.
        message: String,
    },

    /// Non-zero bits discarded while aligning to a byte boundary.
    #[error("Non-zero padding bits at byte boundary")]
    NonZeroPadding,

    /// Read past the end of the compressed stream.
    #[error("Unexpected end of input: needed {bits_needed} more bits")]
    UnexpectedEof {
        /// Number of bits that were requested but not available.
        bits_needed: usize,
    },

    /// Decoded output would exceed the caller-imposed size limit.
    #[error("Decoded output exceeds the configured limit of {limit} bytes")]
    OutputTooLarge {
        /// The configured output ceiling.
        limit: usize,
    },

    /// The stream references the static dictionary but no dictionary
    /// payload has been installed in this process.
    #[error("Static dictionary referenced but not installed")]
    DictionaryUnavailable,

    /// Operation invoked in the wrong state (e.g. encoder reused after
    /// `finish`, too many dictionary chunks attached).
    #[error("API misuse: {message}")]
    ApiMisuse {
        /// Description of the misuse.
        message: String,
    },
}

/// Result type alias for OxiBrotli operations.
pub type Result<T> = std::result::Result<T, BrotliError>;

impl BrotliError {
    /// Create a malformed-header error.
    pub fn malformed_header(message: impl Into<String>) -> Self {
        Self::MalformedHeader {
            message: message.into(),
        }
    }

    /// Create a malformed-metablock error.
    pub fn malformed_metablock(message: impl Into<String>) -> Self {
        Self::MalformedMetablock {
            message: message.into(),
        }
    }

    /// Create a malformed-context-map error.
    pub fn malformed_context_map(message: impl Into<String>) -> Self {
        Self::MalformedContextMap {
            message: message.into(),
        }
    }

    /// Create a malformed-prefix-code error.
    pub fn malformed_huffman(message: impl Into<String>) -> Self {
        Self::MalformedHuffman {
            message: message.into(),
        }
    }

    /// Create an invalid-distance error.
    pub fn invalid_distance(distance: u64, max_distance: u64) -> Self {
        Self::InvalidDistance {
            distance,
            max_distance,
        }
    }

    /// Create an invalid-copy-length error.
    pub fn invalid_copy_length(copy_length: usize, message: impl Into<String>) -> Self {
        Self::InvalidCopyLength {
            copy_length,
            message: message.into(),
        }
    }

    /// Create an unexpected-EOF error.
    pub fn unexpected_eof(bits_needed: usize) -> Self {
        Self::UnexpectedEof { bits_needed }
    }

    /// Create an API-misuse error.
    pub fn api_misuse(message: impl Into<String>) -> Self {
        Self::ApiMisuse {
            message: message.into(),
        }
    }

    /// The conventional negative integer for this fault class.
    ///
    /// Embedders that expose the C-style exit-code taxonomy can return this
    /// directly; everyone else should match on the variant.
    pub fn code(&self) -> i32 {
        match self {
            Self::MalformedHeader { .. } => -1,
            Self::MalformedMetablock { .. } => -2,
            Self::MalformedContextMap { .. } => -3,
            Self::MalformedHuffman { .. } => -4,
            Self::NonZeroPadding => -5,
            Self::InvalidCopyLength { .. } => -8,
            Self::InvalidDistance { .. } => -9,
            Self::OutputTooLarge { .. } => -10,
            Self::DictionaryUnavailable => -12,
            Self::UnexpectedEof { .. } => -16,
            Self::ApiMisuse { .. } => -17,
        }
    }
}
