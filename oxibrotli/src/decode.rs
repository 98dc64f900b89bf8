//! Brotli stream decoding.
//!
//! The decoder walks the stream metablock by metablock: parse the header,
//! build the prefix-code tables and context maps, then run the fused
//! command loop that alternates between command, literal, distance and copy
//! phases. Output is assembled through the sliding-window ring buffer and
//! flushed to a plain `Vec<u8>`.
//!
//! Errors are never recovered: any malformed construct poisons the stream
//! and surfaces as the matching [`BrotliError`] class.

use crate::command::DistanceRing;
use crate::context::{literal_context, distance_context, ContextMode};
use crate::dictionary::{
    static_dictionary, unpack_dictionary_reference, CompoundDictionary,
};
use crate::huffman::{
    build_single_table, read_symbol, read_symbol_with_root, HuffmanScratch, HuffmanTreeGroup,
    CODE_LENGTH_TABLE_BITS,
};
use crate::tables::{
    distance_alphabet_size, read_block_type_count, BLOCK_LENGTH_BASE, BLOCK_LENGTH_EXTRA,
    CODE_LENGTH_CODES, CODE_LENGTH_CODE_ORDER, CODE_LENGTH_PREFIX_LENGTH,
    CODE_LENGTH_PREFIX_VALUE, COMMAND_LOOKUP, NUM_BLOCK_LENGTH_SYMBOLS, NUM_COMMAND_SYMBOLS,
    NUM_DISTANCE_SHORT_CODES, NUM_LITERAL_SYMBOLS,
};
use crate::transforms::{transform_word, TRANSFORMS};
use oxibrotli_core::bitstream::BitReader;
use oxibrotli_core::error::{BrotliError, Result};
use oxibrotli_core::ringbuffer::{RingBuffer, RING_SLACK};

/// Decoder options.
#[derive(Debug, Default)]
pub struct DecodeOptions {
    /// Reject streams whose decoded size would exceed this many bytes.
    pub max_output_size: Option<usize>,
    /// A compound dictionary chunk attached before decoding.
    pub custom_dictionary: Option<Vec<u8>>,
}

/// A reusable Brotli decoder.
///
/// Holds the compound dictionary and the per-instance scratch buffers that
/// keep prefix-table construction out of the allocator.
#[derive(Debug, Default)]
pub struct BrotliDecoder {
    max_output_size: Option<usize>,
    compound: CompoundDictionary,
    scratch: DecoderScratch,
}

/// Per-decoder scratch, reset on each call; owned by the decoder so the
/// inner loops stay free of allocation.
#[derive(Debug)]
struct DecoderScratch {
    huffman: HuffmanScratch,
    lengths: Vec<u8>,
    word: Vec<u8>,
    mtf: [u8; 256],
}

impl Default for DecoderScratch {
    fn default() -> Self {
        Self {
            huffman: HuffmanScratch::default(),
            lengths: Vec::new(),
            word: Vec::new(),
            mtf: [0; 256],
        }
    }
}

impl BrotliDecoder {
    /// Create a decoder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the decoded output size.
    pub fn set_max_output_size(&mut self, limit: usize) {
        self.max_output_size = Some(limit);
    }

    /// Attach a compound dictionary chunk. Must be called before
    /// [`Self::decompress`]; at most 15 chunks are accepted.
    pub fn attach_dictionary(&mut self, chunk: Vec<u8>) -> Result<()> {
        self.compound.attach(chunk)
    }

    /// Decode one complete Brotli stream.
    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut reader = BitReader::new(input);
        let (lgwin, large_window) = read_window_bits(&mut reader)?;
        let mut sink = OutputAssembler::new(1usize << lgwin, self.max_output_size);

        loop {
            let header = read_metablock_header(&mut reader)?;
            if header.is_metadata {
                reader.align_to_byte()?;
                skip_bytes(&mut reader, header.mlen)?;
                if header.is_last {
                    break;
                }
                continue;
            }
            if header.is_empty {
                break;
            }
            sink.reserve(header.mlen)?;
            if header.is_uncompressed {
                reader.align_to_byte()?;
                sink.copy_raw(&mut reader, header.mlen)?;
            } else {
                decode_metablock_body(
                    &mut reader,
                    &mut sink,
                    &mut self.scratch,
                    &self.compound,
                    header.mlen,
                    large_window,
                )?;
            }
            if header.is_last {
                break;
            }
        }

        reader.align_to_byte()?;
        if reader.unread_bytes() > 0 {
            return Err(BrotliError::malformed_metablock(
                "unused trailing bytes after final metablock",
            ));
        }
        sink.finish()
    }
}

/// Decode a complete Brotli stream with default options.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    BrotliDecoder::new().decompress(input)
}

/// Decode a complete Brotli stream with the given options.
pub fn decompress_with(input: &[u8], options: &DecodeOptions) -> Result<Vec<u8>> {
    let mut decoder = BrotliDecoder::new();
    if let Some(limit) = options.max_output_size {
        decoder.set_max_output_size(limit);
    }
    if let Some(dict) = &options.custom_dictionary {
        decoder.attach_dictionary(dict.clone())?;
    }
    decoder.decompress(input)
}

/// The exact decompressed size of a single-metablock stream.
///
/// Returns `Ok(None)` for multi-metablock or metadata-led streams, where
/// the size cannot be read off the header.
pub fn decoded_size(input: &[u8]) -> Result<Option<usize>> {
    let mut reader = BitReader::new(input);
    read_window_bits(&mut reader)?;
    let header = read_metablock_header(&mut reader)?;
    if header.is_metadata {
        return Ok(None);
    }
    if header.is_empty {
        return Ok(Some(0));
    }
    if !header.is_last {
        return Ok(None);
    }
    Ok(Some(header.mlen))
}

/// Parse the WBITS field, returning `(lgwin, large_window)`.
fn read_window_bits(reader: &mut BitReader<'_>) -> Result<(u32, bool)> {
    if !reader.read_bit()? {
        return Ok((16, false));
    }
    let n = reader.read_bits(3)?;
    if n != 0 {
        return Ok((17 + n, false));
    }
    let m = reader.read_bits(3)?;
    match m {
        0 => Ok((17, false)),
        1 => {
            // Large-window extension: 6 explicit bits of lgwin.
            let lgwin = reader.read_bits(6)?;
            if !(10..=30).contains(&lgwin) {
                return Err(BrotliError::malformed_header(format!(
                    "large-window lgwin {lgwin} out of range"
                )));
            }
            Ok((lgwin, true))
        }
        m => Ok((8 + m, false)),
    }
}

#[derive(Debug)]
struct MetablockHeader {
    is_last: bool,
    is_empty: bool,
    is_metadata: bool,
    is_uncompressed: bool,
    /// Content length, or bytes to skip for metadata.
    mlen: usize,
}

fn read_metablock_header(reader: &mut BitReader<'_>) -> Result<MetablockHeader> {
    let is_last = reader.read_bit()?;
    if is_last && reader.read_bit()? {
        return Ok(MetablockHeader {
            is_last,
            is_empty: true,
            is_metadata: false,
            is_uncompressed: false,
            mlen: 0,
        });
    }

    let nibble_code = reader.read_bits(2)?;
    if nibble_code == 3 {
        // Metadata: reserved bit, then a byte-count-prefixed skip length.
        if is_last {
            return Err(BrotliError::malformed_metablock(
                "metadata block flagged as last",
            ));
        }
        if reader.read_bit()? {
            return Err(BrotliError::malformed_metablock("reserved bit set"));
        }
        let size_bytes = reader.read_bits(2)? as usize;
        let mut skip = 0usize;
        for i in 0..size_bytes {
            let byte = reader.read_bits(8)? as usize;
            if byte == 0 && i + 1 == size_bytes && size_bytes > 1 {
                return Err(BrotliError::malformed_metablock("exuberant skip length"));
            }
            skip |= byte << (8 * i);
        }
        if size_bytes > 0 {
            skip += 1;
        }
        return Ok(MetablockHeader {
            is_last,
            is_empty: false,
            is_metadata: true,
            is_uncompressed: false,
            mlen: skip,
        });
    }

    let nibbles = 4 + nibble_code;
    let len_minus_one = reader.read_bits(4 * nibbles)? as usize;
    if nibbles > 4 && (len_minus_one >> (4 * (nibbles - 1))) == 0 {
        return Err(BrotliError::malformed_metablock("exuberant nibble"));
    }
    let is_uncompressed = if !is_last { reader.read_bit()? } else { false };
    Ok(MetablockHeader {
        is_last,
        is_empty: false,
        is_metadata: false,
        is_uncompressed,
        mlen: len_minus_one + 1,
    })
}

fn skip_bytes(reader: &mut BitReader<'_>, mut n: usize) -> Result<()> {
    let mut buf = [0u8; 512];
    while n > 0 {
        let take = n.min(buf.len());
        reader.copy_raw_bytes(&mut buf[..take])?;
        n -= take;
    }
    Ok(())
}

/// Output assembly through the sliding window.
///
/// `pos` is the ring-local write cursor; `[flush_from, pos)` is pending
/// output. Crossing the fence (`ring.size()`) flushes the pending span,
/// folds any over-copy slack back to the front and continues from there.
#[derive(Debug)]
struct OutputAssembler {
    ring: RingBuffer,
    pos: usize,
    flush_from: usize,
    total: u64,
    output: Vec<u8>,
    limit: Option<usize>,
}

impl OutputAssembler {
    fn new(window_size: usize, limit: Option<usize>) -> Self {
        Self {
            ring: RingBuffer::new(window_size),
            pos: 0,
            flush_from: 0,
            total: 0,
            output: Vec::new(),
            limit,
        }
    }

    /// Pre-size the ring for `additional` upcoming bytes and reject streams
    /// already known to exceed the output limit.
    fn reserve(&mut self, additional: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            if self.total + additional as u64 > limit as u64 {
                return Err(BrotliError::OutputTooLarge { limit });
            }
        }
        self.ring
            .ensure_capacity((self.total as usize).saturating_add(additional));
        Ok(())
    }

    #[inline]
    fn total(&self) -> u64 {
        self.total
    }

    /// The previous two output bytes (zero before the stream starts).
    #[inline]
    fn prev_bytes(&self) -> (u8, u8) {
        let mask = self.ring.mask();
        let data = self.ring.data();
        (
            data[self.pos.wrapping_sub(1) & mask],
            data[self.pos.wrapping_sub(2) & mask],
        )
    }

    fn flush_range(&mut self, end: usize) -> Result<()> {
        if end > self.flush_from {
            if let Some(limit) = self.limit {
                if self.output.len() + (end - self.flush_from) > limit {
                    return Err(BrotliError::OutputTooLarge { limit });
                }
            }
            self.output
                .extend_from_slice(&self.ring.data()[self.flush_from..end]);
        }
        self.flush_from = end;
        Ok(())
    }

    /// Flush up to the fence and fold the overshoot back to the front.
    fn wrap(&mut self) -> Result<()> {
        let size = self.ring.size();
        self.flush_range(size)?;
        let overshoot = self.pos - size;
        self.ring.fold_slack(overshoot);
        self.pos = overshoot;
        self.flush_from = 0;
        Ok(())
    }

    #[inline]
    fn push_byte(&mut self, byte: u8) -> Result<()> {
        let size = self.ring.size();
        self.ring.data_mut()[self.pos] = byte;
        self.pos += 1;
        self.total += 1;
        if self.pos >= size {
            self.wrap()?;
        }
        Ok(())
    }

    /// LZ77 copy of `len` bytes from `distance` back, in fence-bounded
    /// segments with the overlap fast paths.
    fn copy_match(&mut self, distance: usize, len: usize) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            let size = self.ring.size();
            let mask = size - 1;
            let src = (self.pos + size - distance) & mask;
            let n = remaining.min(size - self.pos).min(size - src);
            let pos = self.pos;
            let data = self.ring.data_mut();
            if distance == 1 {
                let byte = data[src];
                data[pos..pos + n].fill(byte);
            } else if distance >= n {
                data.copy_within(src..src + n, pos);
            } else {
                // Overlapping copy: seed one period, then double it.
                data.copy_within(src..src + distance, pos);
                let mut copied = distance;
                while copied < n {
                    let chunk = copied.min(n - copied);
                    data.copy_within(pos..pos + chunk, pos + copied);
                    copied += chunk;
                }
            }
            self.pos += n;
            self.total += n as u64;
            remaining -= n;
            if self.pos >= size {
                self.wrap()?;
            }
        }
        Ok(())
    }

    /// Append a transformed dictionary word. Words fit in the ring slack,
    /// so the write may overshoot the fence by up to [`RING_SLACK`] bytes.
    fn append_word(&mut self, bytes: &[u8]) -> Result<()> {
        debug_assert!(bytes.len() <= RING_SLACK);
        let size = self.ring.size();
        self.ring.data_mut()[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        self.total += bytes.len() as u64;
        if self.pos >= size {
            self.wrap()?;
        }
        Ok(())
    }

    /// Copy `len` raw bytes from the reader (uncompressed metablocks).
    fn copy_raw(&mut self, reader: &mut BitReader<'_>, mut len: usize) -> Result<()> {
        while len > 0 {
            let size = self.ring.size();
            let n = len.min(size - self.pos);
            let pos = self.pos;
            reader.copy_raw_bytes(&mut self.ring.data_mut()[pos..pos + n])?;
            self.pos += n;
            self.total += n as u64;
            len -= n;
            if self.pos >= size {
                self.wrap()?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let pos = self.pos;
        self.flush_range(pos)?;
        Ok(self.output)
    }
}

/// Block-type/block-length state for one of the three symbol streams.
#[derive(Debug)]
struct BlockSwitcher {
    num_types: u32,
    block_type: u32,
    prev_type: u32,
    block_length: u32,
    type_tree: Option<HuffmanTreeGroup>,
    length_tree: Option<HuffmanTreeGroup>,
}

impl BlockSwitcher {
    fn read(reader: &mut BitReader<'_>, scratch: &mut DecoderScratch) -> Result<Self> {
        let num_types = read_block_type_count(reader)?;
        if num_types >= 2 {
            let mut type_tree = HuffmanTreeGroup::new(1, num_types as usize + 2);
            read_huffman_code(num_types as usize + 2, &mut type_tree, 0, reader, scratch)?;
            let mut length_tree = HuffmanTreeGroup::new(1, NUM_BLOCK_LENGTH_SYMBOLS);
            read_huffman_code(NUM_BLOCK_LENGTH_SYMBOLS, &mut length_tree, 0, reader, scratch)?;
            let block_length = read_block_length(&length_tree, reader)?;
            Ok(Self {
                num_types,
                block_type: 0,
                prev_type: 1,
                block_length,
                type_tree: Some(type_tree),
                length_tree: Some(length_tree),
            })
        } else {
            Ok(Self {
                num_types: 1,
                block_type: 0,
                prev_type: 1,
                block_length: 1 << 24,
                type_tree: None,
                length_tree: None,
            })
        }
    }

    /// Consume a block-switch command: a type symbol and a length symbol.
    fn switch(&mut self, reader: &mut BitReader<'_>) -> Result<()> {
        let (Some(type_tree), Some(length_tree)) = (&self.type_tree, &self.length_tree) else {
            return Err(BrotliError::malformed_metablock(
                "block length exhausted with a single block type",
            ));
        };
        let code = read_symbol(type_tree.codes(), 0, reader)?;
        let new_type = match code {
            0 => self.prev_type,
            1 => (self.block_type + 1) % self.num_types,
            c => c - 2,
        };
        self.prev_type = self.block_type;
        self.block_type = new_type;
        self.block_length = read_block_length(length_tree, reader)?;
        Ok(())
    }
}

fn read_block_length(tree: &HuffmanTreeGroup, reader: &mut BitReader<'_>) -> Result<u32> {
    let code = read_symbol(tree.codes(), 0, reader)? as usize;
    let extra = reader.read_bits(BLOCK_LENGTH_EXTRA[code])?;
    Ok(BLOCK_LENGTH_BASE[code] + extra)
}

/// Width in bits of the symbols of an alphabet.
fn alphabet_width(alphabet_size: usize) -> u32 {
    debug_assert!(alphabet_size >= 2);
    32 - (alphabet_size as u32 - 1).leading_zeros()
}

/// Read one prefix code (RFC 7932 section 3.4/3.5) into tree `tree_idx` of
/// `group`.
fn read_huffman_code(
    alphabet_size: usize,
    group: &mut HuffmanTreeGroup,
    tree_idx: usize,
    reader: &mut BitReader<'_>,
    scratch: &mut DecoderScratch,
) -> Result<()> {
    let lengths = &mut scratch.lengths;
    lengths.clear();
    lengths.resize(alphabet_size, 0);

    let ident = reader.read_bits(2)?;
    if ident == 1 {
        // Simple code: 1-4 explicit symbols with fixed depth patterns.
        let num_symbols = reader.read_bits(2)? as usize + 1;
        let width = alphabet_width(alphabet_size);
        let mut symbols = [0usize; 4];
        for slot in symbols.iter_mut().take(num_symbols) {
            let symbol = reader.read_bits(width)? as usize;
            if symbol >= alphabet_size {
                return Err(BrotliError::malformed_huffman(format!(
                    "simple-code symbol {symbol} outside alphabet of {alphabet_size}"
                )));
            }
            *slot = symbol;
        }
        for i in 0..num_symbols {
            for j in (i + 1)..num_symbols {
                if symbols[i] == symbols[j] {
                    return Err(BrotliError::malformed_huffman(
                        "duplicate symbol in simple code",
                    ));
                }
            }
        }
        match num_symbols {
            1 => lengths[symbols[0]] = 1,
            2 => {
                lengths[symbols[0]] = 1;
                lengths[symbols[1]] = 1;
            }
            3 => {
                lengths[symbols[0]] = 1;
                lengths[symbols[1]] = 2;
                lengths[symbols[2]] = 2;
            }
            _ => {
                if reader.read_bit()? {
                    lengths[symbols[0]] = 1;
                    lengths[symbols[1]] = 2;
                    lengths[symbols[2]] = 3;
                    lengths[symbols[3]] = 3;
                } else {
                    for &s in &symbols {
                        lengths[s] = 2;
                    }
                }
            }
        }
    } else {
        // Complex code: code-length-code lengths via the fixed code, then
        // RLE-coded symbol lengths. `ident` is the number of leading
        // lengths skipped in stream order.
        let hskip = ident as usize;
        let mut cl_lengths = [0u8; CODE_LENGTH_CODES];
        let mut space = 32i32;
        let mut num_codes = 0;
        for &order in CODE_LENGTH_CODE_ORDER.iter().skip(hskip) {
            let peeked = reader.peek_bits(4) as usize;
            let bits = CODE_LENGTH_PREFIX_LENGTH[peeked] as u32;
            let value = CODE_LENGTH_PREFIX_VALUE[peeked];
            reader.skip_bits(bits)?;
            cl_lengths[order] = value;
            if value != 0 {
                space -= 32 >> value;
                num_codes += 1;
                if space <= 0 {
                    break;
                }
            }
        }
        if num_codes != 1 && space != 0 {
            return Err(BrotliError::malformed_huffman(
                "code-length code does not fill its code space",
            ));
        }

        let cl_table = build_single_table(CODE_LENGTH_TABLE_BITS, &cl_lengths, &mut scratch.huffman)?;

        let mut space = 32768i32;
        let mut i = 0usize;
        let mut prev_nonzero: u32 = 8;
        let mut repeat_symbol: u32 = 0;
        let mut repeat_total: u32 = 0;
        while i < alphabet_size && space > 0 {
            let symbol = read_symbol_with_root(&cl_table, CODE_LENGTH_TABLE_BITS, reader)?;
            match symbol {
                0..=15 => {
                    lengths[i] = symbol as u8;
                    i += 1;
                    if symbol != 0 {
                        prev_nonzero = symbol;
                        space -= 32768 >> symbol;
                    }
                    repeat_symbol = 0;
                }
                16 | 17 => {
                    let extra_width = if symbol == 16 { 2 } else { 3 };
                    let extra = reader.read_bits(extra_width)?;
                    let new_total = if repeat_symbol == symbol {
                        ((repeat_total - 2) << extra_width) + 3 + extra
                    } else {
                        3 + extra
                    };
                    let delta = if repeat_symbol == symbol {
                        new_total - repeat_total
                    } else {
                        new_total
                    };
                    repeat_symbol = symbol;
                    repeat_total = new_total;
                    if i + delta as usize > alphabet_size {
                        return Err(BrotliError::malformed_huffman(
                            "length repeat overruns the alphabet",
                        ));
                    }
                    let value = if symbol == 16 { prev_nonzero as u8 } else { 0 };
                    for _ in 0..delta {
                        lengths[i] = value;
                        i += 1;
                    }
                    if symbol == 16 {
                        space -= (delta as i32) * (32768 >> prev_nonzero);
                    }
                }
                _ => {
                    return Err(BrotliError::malformed_huffman("invalid code-length symbol"));
                }
            }
        }
        if space != 0 {
            return Err(BrotliError::malformed_huffman(if space < 0 {
                "over-subscribed prefix code"
            } else {
                "under-subscribed prefix code"
            }));
        }
    }

    // `lengths` and `scratch.huffman` are disjoint fields, but both live in
    // `scratch`; rebuild the borrow through locals.
    let lengths = std::mem::take(&mut scratch.lengths);
    let result = group.build(tree_idx, &lengths, &mut scratch.huffman);
    scratch.lengths = lengths;
    result
}

/// Decode a context map of `size` entries; returns the map and the number
/// of prefix trees it selects between.
fn read_context_map(
    size: usize,
    reader: &mut BitReader<'_>,
    scratch: &mut DecoderScratch,
) -> Result<(Vec<u8>, u32)> {
    let num_trees = read_block_type_count(reader)?;
    let mut map = vec![0u8; size];
    if num_trees < 2 {
        return Ok((map, num_trees));
    }

    let rle_max = if reader.read_bit()? {
        reader.read_bits(4)? + 1
    } else {
        0
    };
    let alphabet = num_trees as usize + rle_max as usize;
    let mut tree = HuffmanTreeGroup::new(1, alphabet);
    read_huffman_code(alphabet, &mut tree, 0, reader, scratch)?;

    let mut i = 0usize;
    while i < size {
        let symbol = read_symbol(tree.codes(), 0, reader)?;
        if symbol == 0 {
            i += 1;
        } else if symbol <= rle_max {
            let reps = (1usize << symbol) + reader.read_bits(symbol)? as usize;
            if i + reps > size {
                return Err(BrotliError::malformed_context_map(
                    "zero run exceeds the map size",
                ));
            }
            i += reps;
        } else {
            map[i] = (symbol - rle_max) as u8;
            i += 1;
        }
    }

    if reader.read_bit()? {
        inverse_move_to_front(&mut map, &mut scratch.mtf);
    }
    Ok((map, num_trees))
}

fn inverse_move_to_front(data: &mut [u8], mtf: &mut [u8; 256]) {
    for (i, slot) in mtf.iter_mut().enumerate() {
        *slot = i as u8;
    }
    for value in data.iter_mut() {
        let index = *value as usize;
        let decoded = mtf[index];
        *value = decoded;
        mtf.copy_within(0..index, 1);
        mtf[0] = decoded;
    }
}

/// Decode the body of one compressed metablock: entropy-code setup, then
/// the fused command loop.
fn decode_metablock_body(
    reader: &mut BitReader<'_>,
    sink: &mut OutputAssembler,
    scratch: &mut DecoderScratch,
    compound: &CompoundDictionary,
    mlen: usize,
    large_window: bool,
) -> Result<()> {
    let mut literal_blocks = BlockSwitcher::read(reader, scratch)?;
    let mut command_blocks = BlockSwitcher::read(reader, scratch)?;
    let mut distance_blocks = BlockSwitcher::read(reader, scratch)?;

    let npostfix = reader.read_bits(2)?;
    let ndirect = reader.read_bits(4)? << npostfix;
    let postfix_mask = (1u32 << npostfix) - 1;

    let mut context_modes = Vec::with_capacity(literal_blocks.num_types as usize);
    for _ in 0..literal_blocks.num_types {
        context_modes.push(ContextMode::from_bits(reader.read_bits(2)?));
    }

    let (literal_map, num_literal_trees) =
        read_context_map(64 * literal_blocks.num_types as usize, reader, scratch)?;
    let (distance_map, num_distance_trees) =
        read_context_map(4 * distance_blocks.num_types as usize, reader, scratch)?;

    let mut literal_trees = HuffmanTreeGroup::new(num_literal_trees as usize, NUM_LITERAL_SYMBOLS);
    for t in 0..num_literal_trees as usize {
        read_huffman_code(NUM_LITERAL_SYMBOLS, &mut literal_trees, t, reader, scratch)?;
    }
    let mut command_trees =
        HuffmanTreeGroup::new(command_blocks.num_types as usize, NUM_COMMAND_SYMBOLS);
    for t in 0..command_blocks.num_types as usize {
        read_huffman_code(NUM_COMMAND_SYMBOLS, &mut command_trees, t, reader, scratch)?;
    }
    let distance_alphabet = distance_alphabet_size(npostfix, ndirect, large_window);
    let mut distance_trees =
        HuffmanTreeGroup::new(num_distance_trees as usize, distance_alphabet);
    for t in 0..num_distance_trees as usize {
        read_huffman_code(distance_alphabet, &mut distance_trees, t, reader, scratch)?;
    }

    let mut dist_ring = DistanceRing::new();
    let window_size = sink.ring.window_size() as u64;

    // Hoisted literal-block state, rebuilt on every literal block switch.
    let mut lit_mode = context_modes[0];
    let mut lit_map_base = 0usize;
    let mut lit_trivial = is_trivial_slice(&literal_map[0..64]);
    let mut lit_tree = literal_map[0] as usize;

    let mut meta_remaining = mlen as i64;

    // The command loop: one iteration decodes a command, its literals, and
    // its copy.
    while meta_remaining > 0 {
        // Phase: command.
        if command_blocks.block_length == 0 {
            command_blocks.switch(reader)?;
        }
        command_blocks.block_length -= 1;
        let cmd_symbol =
            read_symbol(command_trees.codes(), command_blocks.block_type as usize, reader)?;
        let desc = &COMMAND_LOOKUP[cmd_symbol as usize];
        let insert_len =
            desc.insert_base as u64 + reader.read_bits(desc.insert_extra as u32)? as u64;
        let copy_len = desc.copy_base as u64 + reader.read_bits(desc.copy_extra as u32)? as u64;

        // Phase: literals.
        if insert_len as i64 > meta_remaining {
            return Err(BrotliError::malformed_metablock(
                "insert length exceeds metablock remainder",
            ));
        }
        let mut remaining_insert = insert_len as u32;
        while remaining_insert > 0 {
            if literal_blocks.block_length == 0 {
                literal_blocks.switch(reader)?;
                let btype = literal_blocks.block_type as usize;
                lit_mode = context_modes[btype];
                lit_map_base = btype * 64;
                lit_trivial = is_trivial_slice(&literal_map[lit_map_base..lit_map_base + 64]);
                lit_tree = literal_map[lit_map_base] as usize;
            }
            let batch = remaining_insert.min(literal_blocks.block_length);
            if lit_trivial {
                for _ in 0..batch {
                    let byte = read_symbol(literal_trees.codes(), lit_tree, reader)? as u8;
                    sink.push_byte(byte)?;
                }
            } else {
                for _ in 0..batch {
                    let (p1, p2) = sink.prev_bytes();
                    let ctx = literal_context(lit_mode, p1, p2);
                    let tree = literal_map[lit_map_base + ctx] as usize;
                    let byte = read_symbol(literal_trees.codes(), tree, reader)? as u8;
                    sink.push_byte(byte)?;
                }
            }
            literal_blocks.block_length -= batch;
            remaining_insert -= batch;
        }
        meta_remaining -= insert_len as i64;
        if meta_remaining <= 0 {
            break;
        }

        // Phase: distance.
        let max_distance = sink.total().min(window_size - 16);
        let distance: i64;
        let mut update_ring = false;
        if desc.distance_context < 0 {
            distance = dist_ring.last();
        } else {
            if distance_blocks.block_length == 0 {
                distance_blocks.switch(reader)?;
            }
            distance_blocks.block_length -= 1;
            let ctx = distance_context(copy_len as u32);
            let tree = distance_map[distance_blocks.block_type as usize * 4 + ctx] as usize;
            let dsym = read_symbol(distance_trees.codes(), tree, reader)? as usize;
            if dsym < NUM_DISTANCE_SHORT_CODES {
                distance = dist_ring.substitute(dsym);
                if distance <= 0 {
                    return Err(BrotliError::invalid_distance(distance.max(0) as u64, max_distance));
                }
            } else if dsym < NUM_DISTANCE_SHORT_CODES + ndirect as usize {
                distance = (dsym - 15) as i64;
            } else {
                let x = (dsym - NUM_DISTANCE_SHORT_CODES - ndirect as usize) as u32;
                let ndistbits = 1 + (x >> (npostfix + 1));
                let extra = reader.read_bits(ndistbits)? as i64;
                let hcode = x >> npostfix;
                let lcode = (x & postfix_mask) as i64;
                let offset = ((2 + (hcode & 1) as i64) << ndistbits) - 4;
                distance = ((offset + extra) << npostfix) + lcode + ndirect as i64 + 1;
            }
            update_ring = dsym != 0;
        }

        if copy_len as i64 > meta_remaining {
            return Err(BrotliError::invalid_copy_length(
                copy_len as usize,
                "exceeds metablock remainder",
            ));
        }

        if distance as u64 <= max_distance {
            if update_ring {
                dist_ring.push(distance as i32);
            }
            sink.copy_match(distance as usize, copy_len as usize)?;
            meta_remaining -= copy_len as i64;
        } else {
            // Phase: dictionary. Compound chunks sit just beyond the
            // window, the static dictionary beyond those.
            let address = (distance as u64 - max_distance - 1) as usize;
            let compound_total = compound.total_size();
            if address < compound_total {
                let rel = address + 1;
                if copy_len as usize > rel {
                    return Err(BrotliError::invalid_copy_length(
                        copy_len as usize,
                        "compound dictionary copy overruns the dictionary",
                    ));
                }
                let mut offset = compound_total - rel;
                let mut remaining = copy_len as usize;
                while remaining > 0 {
                    let part = compound.part_at(offset);
                    let take = part.len().min(remaining).min(RING_SLACK);
                    sink.append_word(&part[..take])?;
                    offset += take;
                    remaining -= take;
                }
                meta_remaining -= copy_len as i64;
            } else {
                let (index, transform) =
                    unpack_dictionary_reference(address - compound_total, copy_len as usize)?;
                let dict = static_dictionary().ok_or(BrotliError::DictionaryUnavailable)?;
                let word = dict.word(copy_len as usize, index);
                scratch.word.clear();
                let written = transform_word(&mut scratch.word, word, &TRANSFORMS[transform]);
                if written as i64 > meta_remaining {
                    return Err(BrotliError::invalid_copy_length(
                        written,
                        "dictionary word exceeds metablock remainder",
                    ));
                }
                sink.append_word(&scratch.word)?;
                meta_remaining -= written as i64;
            }
        }
    }
    Ok(())
}

#[inline]
fn is_trivial_slice(map: &[u8]) -> bool {
    map.iter().all(|&t| t == map[0])
}
