//! End-to-end round-trip coverage across qualities, sizes and patterns.

use oxibrotli::{
    compress, compress_with, decoded_size, decompress, decompress_with, BrotliEncoder,
    DecodeOptions, EncodeParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn params(quality: u32) -> EncodeParams {
    EncodeParams {
        quality,
        ..EncodeParams::default()
    }
}

fn roundtrip(data: &[u8], quality: u32) {
    let encoded = compress_with(data, &params(quality)).unwrap();
    let decoded = decompress(&encoded).unwrap();
    assert_eq!(decoded, data, "quality {quality}, len {}", data.len());
}

#[test]
fn test_empty_input() {
    let encoded = compress(b"").unwrap();
    assert!(encoded.len() <= 2, "empty stream should be 1-2 bytes");
    assert_eq!(decompress(&encoded).unwrap(), b"");
}

#[test]
fn test_hello_world_quality_5() {
    roundtrip(b"Hello, World!", 5);
}

#[test]
fn test_repetitive_text_compresses() {
    let data: Vec<u8> = b"abcdefghij".repeat(1000);
    let encoded = compress_with(&data, &params(5)).unwrap();
    assert_eq!(decompress(&encoded).unwrap(), data);
    assert!(
        encoded.len() * 5 < data.len(),
        "expected better than 5:1 on a period-10 repeat, got {} bytes",
        encoded.len()
    );
}

#[test]
fn test_byte_ramp_quality_11() {
    let data: Vec<u8> = (0..=255u8).collect();
    roundtrip(&data, 11);
}

#[test]
fn test_quickfox_all_qualities() {
    let data = b"The quick brown fox jumps over the lazy dog";
    for quality in 0..=11 {
        roundtrip(data, quality);
    }
}

#[test]
fn test_fuzz_matrix() {
    let sizes = [
        0usize, 1, 2, 3, 4, 7, 15, 31, 63, 64, 65, 127, 255, 256, 257, 511, 1024, 2048,
    ];
    let qualities = [1u32, 2, 4, 5, 7, 9, 10, 11];
    let mut rng = StdRng::seed_from_u64(0x0B07_11D5);
    for &size in &sizes {
        // Random bytes.
        let random: Vec<u8> = (0..size).map(|_| rng.gen()).collect();
        // Byte ramp.
        let ramp: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        for &quality in &qualities {
            roundtrip(&random, quality);
            roundtrip(&ramp, quality);
        }
    }
}

#[test]
fn test_varied_seeds_medium_quality() {
    for seed in 0..8u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let size = 512 + (seed as usize) * 97;
        // Compressible-ish data: bytes drawn from a narrow range with
        // occasional repeats of earlier slices.
        let mut data: Vec<u8> = Vec::with_capacity(size);
        while data.len() < size {
            if data.len() > 32 && rng.gen_bool(0.3) {
                let start = rng.gen_range(0..data.len() - 16);
                let len = rng.gen_range(4..16).min(size - data.len());
                let slice: Vec<u8> = data[start..start + len].to_vec();
                data.extend_from_slice(&slice);
            } else {
                data.push(rng.gen_range(b'a'..=b'p'));
            }
        }
        for quality in [2, 6, 10] {
            roundtrip(&data, quality);
        }
    }
}

#[test]
fn test_large_text_high_quality() {
    let mut data = Vec::new();
    for i in 0..3000 {
        data.extend_from_slice(
            format!("Paragraph {i}: it was the best of times, it was the worst of times. ")
                .as_bytes(),
        );
    }
    let encoded = compress_with(&data, &params(11)).unwrap();
    assert_eq!(decompress(&encoded).unwrap(), data);
    assert!(encoded.len() * 4 < data.len());
}

#[test]
fn test_one_megabyte_text() {
    // The suite's large canonical vector: more than a megabyte of text.
    let mut data = Vec::new();
    let mut article = 0u32;
    while data.len() <= 1 << 20 {
        data.extend_from_slice(
            format!(
                "Article {article}: compression corpora need more than a \
                 megabyte of prose to count as large.\n"
            )
            .as_bytes(),
        );
        article += 1;
    }
    assert!(data.len() > 1 << 20);

    let encoded = compress_with(&data, &params(9)).unwrap();
    // One slab, one metablock: the size oracle sees it whole.
    assert_eq!(decoded_size(&encoded).unwrap(), Some(data.len()));
    assert_eq!(decompress(&encoded).unwrap(), data);
    assert!(encoded.len() * 8 < data.len());
}

#[test]
fn test_multi_metablock_stream() {
    // Quality 0 always frames multiple metablocks (data + empty last).
    let data: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
    let encoded = compress_with(&data, &params(0)).unwrap();
    assert_eq!(decoded_size(&encoded).unwrap(), None);
    assert_eq!(decompress(&encoded).unwrap(), data);
}

#[test]
fn test_size_oracle_single_metablock() {
    let data = b"a modest single-metablock input".repeat(4);
    let encoded = compress_with(&data, &params(5)).unwrap();
    assert_eq!(decoded_size(&encoded).unwrap(), Some(data.len()));
    assert_eq!(decompress(&encoded).unwrap().len(), data.len());
}

#[test]
fn test_max_output_size_enforced() {
    let data = vec![b'x'; 1000];
    let encoded = compress_with(&data, &params(5)).unwrap();

    let tight = DecodeOptions {
        max_output_size: Some(10),
        ..DecodeOptions::default()
    };
    assert!(decompress_with(&encoded, &tight).is_err());

    let exact = DecodeOptions {
        max_output_size: Some(1000),
        ..DecodeOptions::default()
    };
    assert_eq!(decompress_with(&encoded, &exact).unwrap(), data);
}

#[test]
fn test_lgwin_values_clamp_and_roundtrip() {
    let data: Vec<u8> = (0..4096).map(|i| (i % 17) as u8 + b'a').collect();
    for lgwin in [5u32, 10, 16, 17, 18, 24, 30] {
        let p = EncodeParams {
            quality: 6,
            lgwin,
            ..EncodeParams::default()
        };
        let encoded = compress_with(&data, &p).unwrap();
        assert_eq!(decompress(&encoded).unwrap(), data, "lgwin {lgwin}");
    }
}

#[test]
fn test_custom_dictionary_does_not_disturb_plain_streams() {
    // The encoder emits no dictionary references, so attaching a compound
    // dictionary on the decode side must leave the result unchanged.
    let data = b"plain stream, dictionary attached but unused".repeat(8);
    let encoded = compress_with(&data, &params(7)).unwrap();
    let options = DecodeOptions {
        custom_dictionary: Some(b"some dictionary bytes that go unused".to_vec()),
        ..DecodeOptions::default()
    };
    assert_eq!(decompress_with(&encoded, &options).unwrap(), data);
}

#[test]
fn test_streaming_chunked_equivalence() {
    let mut data = Vec::new();
    for i in 0..2000 {
        data.extend_from_slice(format!("record {i};").as_bytes());
    }
    for chunk in [1usize, 13, 1000, 65536] {
        let mut encoder = BrotliEncoder::new(&params(6));
        let mut encoded = Vec::new();
        for piece in data.chunks(chunk) {
            encoded.extend(encoder.update(piece).unwrap());
        }
        encoded.extend(encoder.finish().unwrap());
        assert_eq!(decompress(&encoded).unwrap(), data, "chunk {chunk}");
    }
}

#[test]
fn test_worst_case_random_all_qualities() {
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<u8> = (0..4096).map(|_| rng.gen()).collect();
    for quality in [0u32, 1, 4, 5, 9, 10, 11] {
        roundtrip(&data, quality);
    }
}
