//! Hand-assembled wire-format vectors.
//!
//! These streams are built bit by bit against RFC 7932, independently of
//! the encoder, so they pin the decoder to the format rather than to this
//! crate's own output.

use oxibrotli::{
    decoded_size, decompress, decompress_with, BrotliError, DecodeOptions,
    install_static_dictionary, STATIC_DICTIONARY_SIZE,
};
use oxibrotli_core::bitstream::BitWriter;

/// Simple prefix code with a single symbol (decodes in zero bits).
fn write_single_symbol_tree(writer: &mut BitWriter, symbol: u64, width: u32) {
    writer.write_bits(1, 2); // simple code
    writer.write_bits(0, 2); // NSYM - 1
    writer.write_bits(symbol, width);
}

/// The common skeleton of the dictionary vectors: lgwin 16, one last
/// metablock of `mlen` bytes, four 'a' literals, then one copy command
/// whose distance symbol and extra bits are supplied by the caller.
fn dictionary_vector(
    mlen: u64,
    cmd_symbol: u64,
    copy_extra: Option<(u64, u32)>,
    dist_symbol: u64,
    dist_extra: Option<(u64, u32)>,
) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bit(false); // lgwin 16
    w.write_bit(true); // ISLAST
    w.write_bit(false); // ISEMPTY
    w.write_bits(0, 2); // MNIBBLES = 4
    w.write_bits(mlen - 1, 16);
    w.write_bit(false); // NBLTYPESL = 1
    w.write_bit(false); // NBLTYPESI = 1
    w.write_bit(false); // NBLTYPESD = 1
    w.write_bits(0, 2); // NPOSTFIX
    w.write_bits(0, 4); // NDIRECT
    w.write_bits(0, 2); // context mode LSB6
    w.write_bit(false); // NTREES_L = 1
    w.write_bit(false); // NTREES_D = 1
    write_single_symbol_tree(&mut w, b'a' as u64, 8); // literal tree
    write_single_symbol_tree(&mut w, cmd_symbol, 10); // command tree
    write_single_symbol_tree(&mut w, dist_symbol, 6); // distance tree
    // Body: command symbol and all prefix symbols cost zero bits.
    if let Some((value, bits)) = copy_extra {
        w.write_bits(value, bits);
    }
    if let Some((value, bits)) = dist_extra {
        w.write_bits(value, bits);
    }
    w.finish()
}

#[test]
fn test_canonical_empty_streams() {
    // lgwin 22 and lgwin 16 empty streams.
    assert_eq!(decompress(&[0x3B]).unwrap(), b"");
    assert_eq!(decompress(&[0x06]).unwrap(), b"");
    assert_eq!(decoded_size(&[0x3B]).unwrap(), Some(0));
}

#[test]
fn test_multi_metablock_uncompressed() {
    let mut w = BitWriter::new();
    w.write_bit(false); // lgwin 16
    for part in [b"hello " as &[u8], b"world"] {
        w.write_bit(false); // ISLAST
        w.write_bits(0, 2); // MNIBBLES = 4
        w.write_bits(part.len() as u64 - 1, 16);
        w.write_bit(true); // ISUNCOMPRESSED
        w.align_to_byte();
        w.write_bytes(part);
    }
    w.write_bit(true); // ISLAST
    w.write_bit(true); // ISEMPTY
    let stream = w.finish();

    assert_eq!(decoded_size(&stream).unwrap(), None);
    assert_eq!(decompress(&stream).unwrap(), b"hello world");
}

#[test]
fn test_metadata_block_is_skipped() {
    let mut w = BitWriter::new();
    w.write_bit(false); // lgwin 16
    w.write_bit(false); // ISLAST
    w.write_bits(3, 2); // MNIBBLES code 3: metadata
    w.write_bit(false); // reserved
    w.write_bits(1, 2); // MSKIPBYTES = 1
    w.write_bits(2, 8); // skip length - 1
    w.align_to_byte();
    w.write_bytes(&[0xDE, 0xAD, 0xBE]);
    w.write_bit(true); // ISLAST
    w.write_bit(true); // ISEMPTY
    let stream = w.finish();

    assert_eq!(decoded_size(&stream).unwrap(), None);
    assert_eq!(decompress(&stream).unwrap(), b"");
}

#[test]
fn test_large_window_stream() {
    let mut w = BitWriter::new();
    w.write_bits((26 << 8) | 0x11, 14); // large-window lgwin 26
    w.write_bit(false); // ISLAST
    w.write_bits(0, 2); // MNIBBLES = 4
    w.write_bits(1, 16); // MLEN - 1
    w.write_bit(true); // ISUNCOMPRESSED
    w.align_to_byte();
    w.write_bytes(b"hi");
    w.write_bit(true);
    w.write_bit(true);
    let stream = w.finish();
    assert_eq!(decompress(&stream).unwrap(), b"hi");
}

#[test]
fn test_compound_dictionary_reference() {
    // Command 162: insert 4, copy 4, explicit distance. Distance symbol 18
    // with extra 3 decodes to 8, which is four bytes past the window's
    // four decoded bytes and lands in the compound dictionary.
    let stream = dictionary_vector(8, 162, None, 18, Some((3, 2)));
    let options = DecodeOptions {
        custom_dictionary: Some(b"0123456789".to_vec()),
        ..DecodeOptions::default()
    };
    assert_eq!(decompress_with(&stream, &options).unwrap(), b"aaaa6789");
}

#[test]
fn test_compound_reference_tracks_attached_bytes() {
    // The same stream decodes against whatever dictionary is attached.
    let stream = dictionary_vector(8, 162, None, 18, Some((3, 2)));
    let options = DecodeOptions {
        custom_dictionary: Some(b"ABCDEFGHIJ".to_vec()),
        ..DecodeOptions::default()
    };
    assert_eq!(decompress_with(&stream, &options).unwrap(), b"aaaaGHIJ");
}

#[test]
fn test_static_dictionary_words_and_transforms() {
    // Synthetic payload: a repeating lowercase alphabet, installed once for
    // this process.
    let payload: Vec<u8> = (0..STATIC_DICTIONARY_SIZE)
        .map(|i| (i % 26) as u8 + b'a')
        .collect();
    install_static_dictionary(payload).unwrap();

    // Identity transform of length-4 word 7: address 7, distance 12
    // (symbol 19, extra 3).
    let stream = dictionary_vector(8, 162, None, 19, Some((3, 2)));
    assert_eq!(decompress(&stream).unwrap(), b"aaaacdef");

    // Transform 9 (uppercase first) of the same word: address
    // (9 << 10) | 7, distance 9228 (symbol 38, 12 extra bits 1039).
    let stream = dictionary_vector(8, 162, None, 38, Some((1039, 12)));
    assert_eq!(decompress(&stream).unwrap(), b"aaaaCdef");

    // A second install is refused.
    assert!(install_static_dictionary(vec![0; STATIC_DICTIONARY_SIZE]).is_err());
}

#[test]
fn test_nonzero_padding_rejected() {
    // The canonical empty stream with a poisoned padding bit.
    let err = decompress(&[0x7B]).unwrap_err();
    assert!(matches!(err, BrotliError::NonZeroPadding), "{err:?}");
}

#[test]
fn test_trailing_bytes_rejected() {
    let err = decompress(&[0x3B, 0x00]).unwrap_err();
    assert!(matches!(err, BrotliError::MalformedMetablock { .. }), "{err:?}");
}

#[test]
fn test_truncated_stream_rejected() {
    let data = b"some data to compress for truncation".repeat(4);
    let encoded = oxibrotli::compress_with(
        &data,
        &oxibrotli::EncodeParams {
            quality: 5,
            ..oxibrotli::EncodeParams::default()
        },
    )
    .unwrap();
    for cut in [1, encoded.len() / 2, encoded.len() - 1] {
        assert!(decompress(&encoded[..cut]).is_err(), "cut at {cut}");
    }
}

#[test]
fn test_distance_beyond_dictionaries_rejected() {
    // Distance symbol 63 with 24 zero extra bits decodes to ~50 million,
    // far past the window and both dictionary ranges.
    let stream = dictionary_vector(8, 162, None, 63, Some((0, 24)));
    let err = decompress(&stream).unwrap_err();
    assert!(matches!(err, BrotliError::InvalidDistance { .. }), "{err:?}");
}

#[test]
fn test_dictionary_copy_length_out_of_range() {
    // Command 228: insert 4, copy 25. No dictionary has 25-byte words.
    let stream = dictionary_vector(29, 228, Some((3, 3)), 18, Some((3, 2)));
    let err = decompress(&stream).unwrap_err();
    assert!(matches!(err, BrotliError::InvalidCopyLength { .. }), "{err:?}");
}

#[test]
fn test_copy_beyond_metablock_rejected() {
    // Command 148: insert 2, copy 6 inside a 4-byte metablock. Distance
    // symbol 16 with one zero extra bit decodes to 1.
    let stream = dictionary_vector(4, 148, None, 16, Some((0, 1)));
    let err = decompress(&stream).unwrap_err();
    assert!(matches!(err, BrotliError::InvalidCopyLength { .. }), "{err:?}");
}
