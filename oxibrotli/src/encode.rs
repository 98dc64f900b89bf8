//! Brotli stream encoding.
//!
//! The encoder frames the input into metablock-sized slabs and dispatches
//! on quality: 0 writes uncompressed metablocks, 1-4 match with the simple
//! hasher, 5-9 with the chain hasher plus block splitting and context
//! modeling, 10-11 with the Zopfli search. Distance-cache state and the
//! literal-context bytes carry across metablocks, exactly as the decoder's
//! do.

use crate::backref::{create_backward_references, DistanceParams};
use crate::command::DistanceRing;
use crate::hash::Hasher;
use crate::metablock::{
    store_empty_last_metablock, store_metablock, store_uncompressed_metablock, MetablockParams,
};
use crate::zopfli::zopfli_create_commands;
use oxibrotli_core::bitstream::BitWriter;
use oxibrotli_core::error::Result;

/// Input hint tuning the distance alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No assumptions about the input.
    #[default]
    Generic,
    /// UTF-8 text.
    Text,
    /// WOFF 2.0 font data: postfix-coded distances with twelve direct
    /// codes.
    Font,
}

/// Encoder parameters.
#[derive(Debug, Clone, Copy)]
pub struct EncodeParams {
    /// Quality 0-11; higher is denser and slower.
    pub quality: u32,
    /// Window size exponent, clamped to `[10, 24]`.
    pub lgwin: u32,
    /// Input mode hint.
    pub mode: Mode,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            quality: 11,
            lgwin: 22,
            mode: Mode::Generic,
        }
    }
}

/// Fully resolved encoding configuration.
#[derive(Debug, Clone, Copy)]
struct Config {
    quality: u32,
    lgwin: u32,
    npostfix: u32,
    ndirect: u32,
}

impl Config {
    fn from_params(params: &EncodeParams) -> Self {
        let quality = params.quality.min(11);
        let lgwin = params.lgwin.clamp(10, 24);
        let (npostfix, ndirect) = if params.mode == Mode::Font && quality >= 4 {
            (1, 12)
        } else {
            (0, 0)
        };
        Self {
            quality,
            lgwin,
            npostfix,
            ndirect,
        }
    }

    fn metablock_params(&self) -> MetablockParams {
        MetablockParams {
            quality: self.quality,
            npostfix: self.npostfix,
            ndirect: self.ndirect,
        }
    }

    fn distance_params(&self) -> DistanceParams {
        DistanceParams {
            npostfix: self.npostfix,
            ndirect: self.ndirect,
        }
    }

    fn max_backward(&self) -> usize {
        (1usize << self.lgwin) - 16
    }

    /// Slab framing: Zopfli keeps its node arrays bounded with smaller
    /// metablocks.
    fn slab_size(&self) -> usize {
        if self.quality >= 10 {
            1 << 20
        } else {
            1 << 22
        }
    }
}

/// Write the WBITS stream header.
fn write_stream_header(writer: &mut BitWriter, lgwin: u32) {
    match lgwin {
        16 => writer.write_bit(false),
        17 => writer.write_bits(1, 7),
        18..=24 => writer.write_bits((((lgwin - 17) << 1) | 1) as u64, 4),
        _ => writer.write_bits((((lgwin - 8) << 4) | 1) as u64, 7),
    }
}

/// Compress `data` with default parameters (quality 11, 4 MiB window).
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    compress_with(data, &EncodeParams::default())
}

/// Compress `data` with explicit parameters.
pub fn compress_with(data: &[u8], params: &EncodeParams) -> Result<Vec<u8>> {
    let config = Config::from_params(params);
    let mut writer = BitWriter::new();
    write_stream_header(&mut writer, config.lgwin);

    if data.is_empty() {
        store_empty_last_metablock(&mut writer);
        return Ok(writer.finish());
    }

    if config.quality == 0 {
        for chunk in data.chunks(config.slab_size()) {
            store_uncompressed_metablock(&mut writer, chunk)?;
        }
        store_empty_last_metablock(&mut writer);
        return Ok(writer.finish());
    }

    let mut ring = DistanceRing::new();
    let mut hasher = (config.quality <= 9).then(|| Hasher::for_quality(config.quality, data.len()));
    let slab = config.slab_size();
    let mut from = 0usize;
    while from < data.len() {
        let to = (from + slab).min(data.len());
        let commands = match &mut hasher {
            Some(h) => create_backward_references(
                data,
                from,
                to,
                config.max_backward(),
                config.distance_params(),
                h,
                &mut ring,
            ),
            None => zopfli_create_commands(
                data,
                from,
                to,
                config.max_backward(),
                config.distance_params(),
                config.quality,
                &mut ring,
            ),
        };
        let is_last = to == data.len();
        let p1 = if from >= 1 { data[from - 1] } else { 0 };
        let p2 = if from >= 2 { data[from - 2] } else { 0 };
        store_metablock(
            &mut writer,
            data,
            from,
            &commands,
            is_last,
            p1,
            p2,
            config.metablock_params(),
        )?;
        from = to;
    }
    Ok(writer.finish())
}

/// A chunked streaming encoder.
///
/// Buffers input until a full metablock slab is available, emits completed
/// metablocks from [`BrotliEncoder::update`], and closes the stream in
/// [`BrotliEncoder::finish`]. The concatenated output decodes to the
/// concatenated input.
#[derive(Debug)]
pub struct BrotliEncoder {
    config: Config,
    writer: BitWriter,
    buffer: Vec<u8>,
    ring: DistanceRing,
    prev1: u8,
    prev2: u8,
    header_written: bool,
}

impl BrotliEncoder {
    /// Create a streaming encoder.
    pub fn new(params: &EncodeParams) -> Self {
        Self {
            config: Config::from_params(params),
            writer: BitWriter::new(),
            buffer: Vec::new(),
            ring: DistanceRing::new(),
            prev1: 0,
            prev2: 0,
            header_written: false,
        }
    }

    fn ensure_header(&mut self) {
        if !self.header_written {
            write_stream_header(&mut self.writer, self.config.lgwin);
            self.header_written = true;
        }
    }

    /// Encode one buffered slab as a non-last (or final) metablock.
    fn encode_slab(&mut self, len: usize, is_last: bool) -> Result<()> {
        debug_assert!(len > 0 && len <= self.buffer.len());
        if self.config.quality == 0 {
            store_uncompressed_metablock(&mut self.writer, &self.buffer[..len])?;
        } else {
            let commands = if self.config.quality >= 10 {
                zopfli_create_commands(
                    &self.buffer,
                    0,
                    len,
                    self.config.max_backward(),
                    self.config.distance_params(),
                    self.config.quality,
                    &mut self.ring,
                )
            } else {
                // The hasher only sees the current buffer, so matches never
                // reach into already-flushed slabs.
                let mut hasher = Hasher::for_quality(self.config.quality, len);
                create_backward_references(
                    &self.buffer,
                    0,
                    len,
                    self.config.max_backward().min(len),
                    self.config.distance_params(),
                    &mut hasher,
                    &mut self.ring,
                )
            };
            store_metablock(
                &mut self.writer,
                &self.buffer,
                0,
                &commands,
                is_last,
                self.prev1,
                self.prev2,
                self.config.metablock_params(),
            )?;
        }
        match len {
            1 => {
                self.prev2 = self.prev1;
                self.prev1 = self.buffer[0];
            }
            _ => {
                self.prev1 = self.buffer[len - 1];
                self.prev2 = self.buffer[len - 2];
            }
        }
        self.buffer.drain(..len);
        Ok(())
    }

    /// Feed a chunk; returns any completed output bytes.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        self.ensure_header();
        let slab = self.config.slab_size();
        while self.buffer.len() >= slab {
            self.encode_slab(slab, false)?;
        }
        Ok(self.writer.take_bytes())
    }

    /// Close the stream and return the remaining output.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.ensure_header();
        if self.buffer.is_empty() {
            store_empty_last_metablock(&mut self.writer);
        } else if self.config.quality == 0 {
            let len = self.buffer.len();
            self.encode_slab(len, false)?;
            store_empty_last_metablock(&mut self.writer);
        } else {
            let len = self.buffer.len();
            self.encode_slab(len, true)?;
        }
        Ok(self.writer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decompress;

    #[test]
    fn test_empty_input_canonical_stream() {
        assert_eq!(compress(b"").unwrap(), vec![0x3B]);
    }

    #[test]
    fn test_quality_zero_roundtrip() {
        let data = b"uncompressed framing keeps the bytes as they are";
        let params = EncodeParams {
            quality: 0,
            ..EncodeParams::default()
        };
        let encoded = compress_with(data, &params).unwrap();
        assert_eq!(decompress(&encoded).unwrap(), data);
        // Raw framing: the payload appears verbatim in the stream.
        assert!(encoded.len() > data.len());
    }

    #[test]
    fn test_each_quality_roundtrips() {
        let mut data = Vec::new();
        for i in 0..64 {
            data.extend_from_slice(format!("block {i} of mixed sample data; ").as_bytes());
        }
        for quality in 0..=11 {
            let params = EncodeParams {
                quality,
                ..EncodeParams::default()
            };
            let encoded = compress_with(&data, &params).unwrap();
            assert_eq!(
                decompress(&encoded).unwrap(),
                data,
                "quality {quality} failed"
            );
        }
    }

    #[test]
    fn test_font_mode_distance_parameters() {
        let mut data = Vec::new();
        for i in 0..2048u32 {
            data.push((i % 64) as u8);
        }
        let params = EncodeParams {
            quality: 9,
            mode: Mode::Font,
            ..EncodeParams::default()
        };
        let encoded = compress_with(&data, &params).unwrap();
        assert_eq!(decompress(&encoded).unwrap(), data);
    }

    #[test]
    fn test_small_window_roundtrip() {
        let mut data = Vec::new();
        for i in 0..5000u32 {
            data.push((i * 7 % 251) as u8);
        }
        let params = EncodeParams {
            quality: 6,
            lgwin: 10,
            ..EncodeParams::default()
        };
        let encoded = compress_with(&data, &params).unwrap();
        assert_eq!(decompress(&encoded).unwrap(), data);
    }

    #[test]
    fn test_streaming_matches_one_shot_decode() {
        let mut data = Vec::new();
        for i in 0..500 {
            data.extend_from_slice(format!("chunk {i}: some streaming data\n").as_bytes());
        }
        for chunk_size in [1usize, 7, 256, 4096, data.len()] {
            let params = EncodeParams {
                quality: 5,
                ..EncodeParams::default()
            };
            let mut encoder = BrotliEncoder::new(&params);
            let mut encoded = Vec::new();
            for chunk in data.chunks(chunk_size) {
                encoded.extend(encoder.update(chunk).unwrap());
            }
            encoded.extend(encoder.finish().unwrap());
            assert_eq!(
                decompress(&encoded).unwrap(),
                data,
                "chunk size {chunk_size} failed"
            );
        }
    }

    #[test]
    fn test_streaming_empty() {
        let encoder = BrotliEncoder::new(&EncodeParams::default());
        let encoded = encoder.finish().unwrap();
        assert_eq!(decompress(&encoded).unwrap(), Vec::<u8>::new());
    }
}
