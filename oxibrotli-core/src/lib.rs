//! # OxiBrotli Core
//!
//! Core components for the OxiBrotli codec.
//!
//! This crate provides the bit-exact primitives underneath the Brotli
//! decoder and encoder:
//!
//! - [`bitstream`]: LSB-first bit reader/writer for the RFC 7932 wire format
//! - [`ringbuffer`]: the decoder's sliding window with over-copy slack
//! - [`error`]: the decoder/encoder fault taxonomy
//!
//! ## Architecture
//!
//! OxiBrotli is layered the same way as the other OxiArc codecs:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L2: Codec (oxibrotli)                                   │
//! │     metablocks, prefix codes, context maps, hashers     │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Primitives (this crate)                             │
//! │     BitReader/BitWriter, RingBuffer, errors             │
//! └─────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod error;
pub mod ringbuffer;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use error::{BrotliError, Result};
pub use ringbuffer::{RingBuffer, RING_SLACK};
