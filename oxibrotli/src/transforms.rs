//! Static-dictionary word transforms.
//!
//! Each dictionary reference names a word and one of 121 transforms
//! (RFC 7932 appendix B). A transform optionally drops bytes from the front
//! or back of the word, optionally "ferments" it (upper-cases ASCII and
//! toggles the C0/C1 continuation bits of multi-byte UTF-8 sequences), and
//! wraps the result in a fixed prefix and suffix.

/// How a transform rewrites the dictionary word itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Copy the word unchanged.
    Identity,
    /// Drop the first `n` bytes (1..=9).
    OmitFirst(u8),
    /// Drop the last `n` bytes (1..=9).
    OmitLast(u8),
    /// Ferment the first character.
    UppercaseFirst,
    /// Ferment every character.
    UppercaseAll,
}

/// One entry of the transform table.
#[derive(Debug, Clone, Copy)]
pub struct WordTransform {
    /// Bytes emitted before the transformed word.
    pub prefix: &'static [u8],
    /// Word rewrite rule.
    pub kind: TransformKind,
    /// Bytes emitted after the transformed word.
    pub suffix: &'static [u8],
}

/// Number of transforms.
pub const NUM_TRANSFORMS: usize = 121;

use TransformKind::{Identity, OmitFirst, OmitLast, UppercaseAll, UppercaseFirst};

macro_rules! xform {
    ($prefix:literal, $kind:expr, $suffix:literal) => {
        WordTransform {
            prefix: $prefix,
            kind: $kind,
            suffix: $suffix,
        }
    };
}

/// The RFC 7932 transform table, in symbol order.
pub const TRANSFORMS: [WordTransform; NUM_TRANSFORMS] = [
    xform!(b"", Identity, b""),
    xform!(b"", Identity, b" "),
    xform!(b" ", Identity, b" "),
    xform!(b"", OmitFirst(1), b""),
    xform!(b"", UppercaseFirst, b" "),
    xform!(b"", Identity, b" the "),
    xform!(b" ", Identity, b""),
    xform!(b"s ", Identity, b" "),
    xform!(b"", Identity, b" of "),
    xform!(b"", UppercaseFirst, b""),
    xform!(b"", Identity, b" and "),
    xform!(b"", OmitFirst(2), b""),
    xform!(b"", OmitLast(1), b""),
    xform!(b", ", Identity, b" "),
    xform!(b"", Identity, b", "),
    xform!(b" ", UppercaseFirst, b" "),
    xform!(b"", Identity, b" in "),
    xform!(b"", Identity, b" to "),
    xform!(b"e ", Identity, b" "),
    xform!(b"", Identity, b"\""),
    xform!(b"", Identity, b"."),
    xform!(b"", Identity, b"\">"),
    xform!(b"", Identity, b"\n"),
    xform!(b"", OmitLast(3), b""),
    xform!(b"", Identity, b"]"),
    xform!(b"", Identity, b" for "),
    xform!(b"", OmitFirst(3), b""),
    xform!(b"", OmitLast(2), b""),
    xform!(b"", Identity, b" a "),
    xform!(b"", Identity, b" that "),
    xform!(b" ", UppercaseFirst, b""),
    xform!(b"", Identity, b". "),
    xform!(b".", Identity, b""),
    xform!(b" ", Identity, b", "),
    xform!(b"", OmitFirst(4), b""),
    xform!(b"", Identity, b" with "),
    xform!(b"", Identity, b"'"),
    xform!(b"", Identity, b" from "),
    xform!(b"", Identity, b" by "),
    xform!(b"", OmitFirst(5), b""),
    xform!(b"", OmitFirst(6), b""),
    xform!(b" the ", Identity, b""),
    xform!(b"", OmitLast(4), b""),
    xform!(b"", Identity, b". The "),
    xform!(b"", UppercaseAll, b""),
    xform!(b"", Identity, b" on "),
    xform!(b"", Identity, b" as "),
    xform!(b"", Identity, b" is "),
    xform!(b"", OmitLast(7), b""),
    xform!(b"", OmitLast(1), b"ing "),
    xform!(b"", Identity, b"\n\t"),
    xform!(b"", Identity, b":"),
    xform!(b" ", Identity, b". "),
    xform!(b"", Identity, b"ed "),
    xform!(b"", OmitFirst(9), b""),
    xform!(b"", OmitFirst(7), b""),
    xform!(b"", OmitLast(6), b""),
    xform!(b"", Identity, b"("),
    xform!(b"", UppercaseFirst, b", "),
    xform!(b"", OmitLast(8), b""),
    xform!(b"", Identity, b" at "),
    xform!(b"", Identity, b"ly "),
    xform!(b" the ", Identity, b" of "),
    xform!(b"", OmitLast(5), b""),
    xform!(b"", OmitLast(9), b""),
    xform!(b" ", UppercaseFirst, b", "),
    xform!(b"", UppercaseFirst, b"\""),
    xform!(b".", Identity, b"("),
    xform!(b"", UppercaseAll, b" "),
    xform!(b"", UppercaseFirst, b"\">"),
    xform!(b"", Identity, b"=\""),
    xform!(b" ", Identity, b"."),
    xform!(b".com/", Identity, b""),
    xform!(b" the ", Identity, b" of the "),
    xform!(b"", UppercaseFirst, b"'"),
    xform!(b"", Identity, b". This "),
    xform!(b"", Identity, b","),
    xform!(b".", Identity, b" "),
    xform!(b"", UppercaseFirst, b"("),
    xform!(b"", UppercaseFirst, b"."),
    xform!(b"", Identity, b" not "),
    xform!(b" ", Identity, b"=\""),
    xform!(b"", Identity, b"er "),
    xform!(b" ", UppercaseAll, b" "),
    xform!(b"", Identity, b"al "),
    xform!(b" ", UppercaseAll, b""),
    xform!(b"", Identity, b"='"),
    xform!(b"", UppercaseAll, b"\""),
    xform!(b"", UppercaseFirst, b". "),
    xform!(b" ", Identity, b"("),
    xform!(b"", Identity, b"ful "),
    xform!(b" ", UppercaseFirst, b". "),
    xform!(b"", Identity, b"ive "),
    xform!(b"", Identity, b"less "),
    xform!(b"", UppercaseAll, b"'"),
    xform!(b"", Identity, b"est "),
    xform!(b" ", UppercaseFirst, b"."),
    xform!(b"", UppercaseAll, b"\">"),
    xform!(b" ", Identity, b"='"),
    xform!(b"", UppercaseFirst, b","),
    xform!(b"", Identity, b"ize "),
    xform!(b"", UppercaseAll, b"."),
    xform!(b"\xc2\xa0", Identity, b""),
    xform!(b" ", Identity, b","),
    xform!(b"", UppercaseFirst, b"=\""),
    xform!(b"", UppercaseAll, b"=\""),
    xform!(b"", Identity, b"ous "),
    xform!(b"", UppercaseAll, b", "),
    xform!(b"", UppercaseFirst, b"='"),
    xform!(b" ", UppercaseFirst, b","),
    xform!(b" ", UppercaseAll, b"=\""),
    xform!(b" ", UppercaseAll, b", "),
    xform!(b"", UppercaseAll, b","),
    xform!(b"", UppercaseAll, b"("),
    xform!(b"", UppercaseAll, b". "),
    xform!(b" ", UppercaseAll, b"."),
    xform!(b"", UppercaseAll, b"='"),
    xform!(b" ", UppercaseAll, b". "),
    xform!(b" ", UppercaseFirst, b"=\""),
    xform!(b" ", UppercaseAll, b"='"),
    xform!(b" ", UppercaseFirst, b"='"),
];

/// Ferment one character starting at `pos`; returns the number of bytes the
/// character occupies. ASCII lowercase toggles case; 2-byte sequences
/// toggle bit 5 of the continuation byte; longer sequences toggle the low
/// bits of the third byte.
fn ferment(buf: &mut [u8], pos: usize) -> usize {
    let b = buf[pos];
    if b < 192 {
        if b.is_ascii_lowercase() {
            buf[pos] ^= 0x20;
        }
        1
    } else if b < 224 {
        if pos + 1 < buf.len() {
            buf[pos + 1] ^= 0x20;
        }
        2
    } else {
        if pos + 2 < buf.len() {
            buf[pos + 2] ^= 5;
        }
        3
    }
}

/// Apply transform `transform` to `word`, appending the result to `dst`.
///
/// Returns the number of bytes produced.
pub fn transform_word(dst: &mut Vec<u8>, word: &[u8], transform: &WordTransform) -> usize {
    let start = dst.len();
    dst.extend_from_slice(transform.prefix);
    let body_start = dst.len();
    match transform.kind {
        Identity => dst.extend_from_slice(word),
        OmitFirst(n) => {
            let n = (n as usize).min(word.len());
            dst.extend_from_slice(&word[n..]);
        }
        OmitLast(n) => {
            let n = (n as usize).min(word.len());
            dst.extend_from_slice(&word[..word.len() - n]);
        }
        UppercaseFirst => {
            dst.extend_from_slice(word);
            if dst.len() > body_start {
                ferment(&mut dst[body_start..], 0);
            }
        }
        UppercaseAll => {
            dst.extend_from_slice(word);
            let mut pos = 0;
            while body_start + pos < dst.len() {
                pos += ferment(&mut dst[body_start..], pos);
            }
        }
    }
    dst.extend_from_slice(transform.suffix);
    dst.len() - start
}
