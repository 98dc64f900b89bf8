//! Static and compound dictionaries.
//!
//! Distances beyond the sliding window address two extra ranges: first the
//! caller-attached *compound* dictionary chunks, then the RFC 7932 *static*
//! dictionary of 122,784 bytes whose words are rewritten by the transform
//! table.
//!
//! The static dictionary payload is not embedded in this crate; an embedder
//! installs it once per process (typically after bootstrapping it from a
//! compressed blob) and every decoder instance shares the installed copy.

use crate::transforms::NUM_TRANSFORMS;
use oxibrotli_core::error::{BrotliError, Result};
use std::sync::OnceLock;

/// Valid static-dictionary word lengths.
pub const MIN_WORD_LENGTH: usize = 4;
/// Largest static-dictionary word length.
pub const MAX_WORD_LENGTH: usize = 24;

/// Index width per word length; zero marks lengths with no words.
pub const SIZE_BITS_BY_LENGTH: [u32; MAX_WORD_LENGTH + 1] = [
    0, 0, 0, 0, 10, 10, 11, 11, 10, 10, 10, 10, 10, 9, 9, 8, 7, 7, 8, 7, 7, 6, 6, 5, 5,
];

/// Byte offset of each length's word section in the dictionary payload.
pub const OFFSETS_BY_LENGTH: [usize; MAX_WORD_LENGTH + 2] = build_offsets();

const fn build_offsets() -> [usize; MAX_WORD_LENGTH + 2] {
    let mut offsets = [0usize; MAX_WORD_LENGTH + 2];
    let mut len = 0;
    while len <= MAX_WORD_LENGTH {
        offsets[len + 1] = offsets[len] + (len << SIZE_BITS_BY_LENGTH[len]);
        len += 1;
    }
    offsets
}

/// Exact size of the RFC 7932 dictionary payload.
pub const STATIC_DICTIONARY_SIZE: usize = OFFSETS_BY_LENGTH[MAX_WORD_LENGTH + 1];

static STATIC_DICTIONARY: OnceLock<StaticDictionary> = OnceLock::new();

/// The process-wide static dictionary.
#[derive(Debug)]
pub struct StaticDictionary {
    data: Box<[u8]>,
}

impl StaticDictionary {
    /// Fetch the word at `index` for the given length.
    pub fn word(&self, length: usize, index: usize) -> &[u8] {
        debug_assert!((MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&length));
        debug_assert!(index < (1 << SIZE_BITS_BY_LENGTH[length]));
        let offset = OFFSETS_BY_LENGTH[length] + index * length;
        &self.data[offset..offset + length]
    }
}

/// Install the 122,784-byte dictionary payload for this process.
///
/// One-shot: the payload becomes immutable and shared by all codec
/// instances. Installing twice is an error.
pub fn install_static_dictionary(data: Vec<u8>) -> Result<()> {
    if data.len() != STATIC_DICTIONARY_SIZE {
        return Err(BrotliError::api_misuse(format!(
            "static dictionary payload must be {} bytes, got {}",
            STATIC_DICTIONARY_SIZE,
            data.len()
        )));
    }
    STATIC_DICTIONARY
        .set(StaticDictionary {
            data: data.into_boxed_slice(),
        })
        .map_err(|_| BrotliError::api_misuse("static dictionary already installed"))
}

/// The installed dictionary, if any.
pub fn static_dictionary() -> Option<&'static StaticDictionary> {
    STATIC_DICTIONARY.get()
}

/// Split a static-dictionary address into `(word_index, transform_index)`
/// for a copy of `length` bytes, validating the length and transform range.
pub fn unpack_dictionary_reference(address: usize, length: usize) -> Result<(usize, usize)> {
    if !(MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&length)
        || SIZE_BITS_BY_LENGTH[length] == 0
    {
        return Err(BrotliError::invalid_copy_length(
            length,
            "no static dictionary words of this length",
        ));
    }
    let bits = SIZE_BITS_BY_LENGTH[length];
    let index = address & ((1 << bits) - 1);
    let transform = address >> bits;
    if transform >= NUM_TRANSFORMS {
        return Err(BrotliError::invalid_distance(
            address as u64,
            ((NUM_TRANSFORMS) << bits) as u64,
        ));
    }
    Ok((index, transform))
}

/// Maximum number of compound-dictionary chunks.
pub const MAX_COMPOUND_CHUNKS: usize = 15;

/// Caller-supplied dictionary chunks occupying the distance range just
/// beyond the window.
#[derive(Debug, Default)]
pub struct CompoundDictionary {
    chunks: Vec<Vec<u8>>,
    /// Cumulative byte offset of each chunk's start.
    offsets: Vec<usize>,
    total: usize,
}

impl CompoundDictionary {
    /// Create an empty compound dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach one chunk. At most [`MAX_COMPOUND_CHUNKS`] chunks may be
    /// attached, and attachment must happen before decoding starts.
    pub fn attach(&mut self, chunk: Vec<u8>) -> Result<()> {
        if self.chunks.len() >= MAX_COMPOUND_CHUNKS {
            return Err(BrotliError::api_misuse(format!(
                "at most {} compound dictionary chunks may be attached",
                MAX_COMPOUND_CHUNKS
            )));
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.offsets.push(self.total);
        self.total += chunk.len();
        self.chunks.push(chunk);
        Ok(())
    }

    /// Total attached bytes.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total
    }

    /// The chunk tail starting at absolute offset `offset`, for
    /// chunk-by-chunk copying.
    pub fn part_at(&self, offset: usize) -> &[u8] {
        debug_assert!(offset < self.total);
        let idx = self.offsets.partition_point(|&start| start <= offset) - 1;
        &self.chunks[idx][offset - self.offsets[idx]..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_table() {
        assert_eq!(OFFSETS_BY_LENGTH[4], 0);
        assert_eq!(OFFSETS_BY_LENGTH[5], 4 << 10);
        assert_eq!(STATIC_DICTIONARY_SIZE, 122_784);
    }

    #[test]
    fn test_unpack_reference() {
        // Length 4 has 10 index bits.
        let (index, transform) = unpack_dictionary_reference((3 << 10) | 7, 4).unwrap();
        assert_eq!(index, 7);
        assert_eq!(transform, 3);

        assert!(unpack_dictionary_reference(0, 3).is_err());
        assert!(unpack_dictionary_reference(0, 25).is_err());
        assert!(unpack_dictionary_reference(NUM_TRANSFORMS << 10, 4).is_err());
    }

    #[test]
    fn test_compound_chunks() {
        let mut dict = CompoundDictionary::new();
        dict.attach(b"hello".to_vec()).unwrap();
        dict.attach(Vec::new()).unwrap();
        dict.attach(b"world".to_vec()).unwrap();
        assert_eq!(dict.total_size(), 10);
        assert_eq!(dict.part_at(0), b"hello");
        assert_eq!(dict.part_at(3), b"lo");
        assert_eq!(dict.part_at(5), b"world");
        assert_eq!(dict.part_at(9), b"d");
    }

    #[test]
    fn test_chunk_limit() {
        let mut dict = CompoundDictionary::new();
        for _ in 0..MAX_COMPOUND_CHUNKS {
            dict.attach(vec![0u8; 8]).unwrap();
        }
        assert!(dict.attach(vec![0u8; 8]).is_err());
    }
}
