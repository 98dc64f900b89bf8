//! # OxiBrotli
//!
//! Pure Rust implementation of the Brotli compression format (RFC 7932).
//!
//! Brotli combines LZ77 over a sliding window with canonical prefix codes,
//! context modeling, a shared static dictionary and a compact metablock
//! framing. This crate implements both halves:
//!
//! - **Decoding**: all metablock types, simple and complex prefix codes,
//!   context maps, the distance cache, static- and compound-dictionary
//!   references, and the large-window extension.
//! - **Encoding**: qualities 0-11, from uncompressed framing through
//!   greedy match finding up to the two-pass Zopfli search, with block
//!   splitting and context modeling at the higher qualities.
//!
//! ## Example
//!
//! ```rust
//! use oxibrotli::{compress, decompress};
//!
//! let data = b"Hello, Brotli! Hello, Brotli!";
//! let encoded = compress(data).unwrap();
//! let decoded = decompress(&encoded).unwrap();
//! assert_eq!(&decoded, data);
//! ```
//!
//! ## Quality levels
//!
//! - 0: uncompressed metablock framing
//! - 1-4: fast single-pass matching (forgetful hasher)
//! - 5-9: chain hasher with block splitting and context modeling
//! - 10-11: Zopfli command search (11 runs a second, cost-remeasured pass)
//!
//! ## Static dictionary
//!
//! The RFC 7932 static dictionary payload (122,784 bytes) is not embedded.
//! Embedders that need to decode dictionary-referencing streams install it
//! once per process with [`install_static_dictionary`]; everything else
//! works without it.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod backref;
mod block_splitter;
mod cluster;
mod command;
mod context;
mod decode;
mod dictionary;
mod encode;
mod entropy;
mod hash;
mod histogram;
mod huffman;
mod metablock;
mod tables;
mod transforms;
mod zopfli;

// Re-exports
pub use decode::{decoded_size, decompress, decompress_with, BrotliDecoder, DecodeOptions};
pub use dictionary::{install_static_dictionary, STATIC_DICTIONARY_SIZE};
pub use encode::{compress, compress_with, BrotliEncoder, EncodeParams, Mode};
pub use oxibrotli_core::error::{BrotliError, Result};
