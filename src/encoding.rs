//! Decimal text encoding of group elements for the bulletin board.
//!
//! A point is written as the 48-byte big-endian words of its uncompressed
//! encoding, each printed as a decimal integer, joined by [`DELIMITER`].
//! G1 points therefore take two integers and G2 points four. Decimal digits
//! never contain the delimiter or the record separator.

use bls12_381::{G1Affine, G2Affine};
use num_bigint::BigUint;

use crate::error::{Error, Result};

pub const DELIMITER: char = ',';

/// Separates the value from the proof in an evaluation record line.
pub const RECORD_SEPARATOR: char = '#';

const WORD: usize = 48;

fn encode_words(bytes: &[u8]) -> String {
    bytes
        .chunks(WORD)
        .map(|w| BigUint::from_bytes_be(w).to_string())
        .collect::<Vec<_>>()
        .join(&DELIMITER.to_string())
}

fn decode_words<const N: usize>(s: &str) -> Result<[u8; N]> {
    let words: Vec<&str> = s.trim().split(DELIMITER).collect();
    if words.len() * WORD != N {
        return Err(Error::Decode(format!(
            "expected {} integers, found {}",
            N / WORD,
            words.len()
        )));
    }
    let mut out = [0u8; N];
    for (chunk, word) in out.chunks_mut(WORD).zip(words) {
        let value = BigUint::parse_bytes(word.trim().as_bytes(), 10)
            .ok_or_else(|| Error::Decode(format!("not a decimal integer: {word:?}")))?;
        let bytes = value.to_bytes_be();
        if bytes.len() > WORD {
            return Err(Error::Decode(format!("integer {word} exceeds {WORD} bytes")));
        }
        chunk[WORD - bytes.len()..].copy_from_slice(&bytes);
    }
    Ok(out)
}

pub fn encode_g1(point: &G1Affine) -> String {
    encode_words(&point.to_uncompressed())
}

pub fn decode_g1(s: &str) -> Result<G1Affine> {
    let bytes = decode_words::<96>(s)?;
    Option::from(G1Affine::from_uncompressed(&bytes))
        .ok_or_else(|| Error::Decode("integers do not encode a G1 point".into()))
}

pub fn encode_g2(point: &G2Affine) -> String {
    encode_words(&point.to_uncompressed())
}

pub fn decode_g2(s: &str) -> Result<G2Affine> {
    let bytes = decode_words::<192>(s)?;
    Option::from(G2Affine::from_uncompressed(&bytes))
        .ok_or_else(|| Error::Decode("integers do not encode a G2 point".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bls12_381::Scalar;
    use group::Curve;

    #[test]
    fn g1_text_form() {
        let p = (G1Affine::generator() * Scalar::from(42u64)).to_affine();
        let s = encode_g1(&p);
        assert_eq!(s.split(DELIMITER).count(), 2);
        assert!(!s.contains(RECORD_SEPARATOR));
        assert_eq!(decode_g1(&s).unwrap(), p);
    }

    #[test]
    fn identity_survives_encoding() {
        let s = encode_g1(&G1Affine::identity());
        assert_eq!(decode_g1(&s).unwrap(), G1Affine::identity());
    }

    #[test]
    fn g2_text_form() {
        let q = G2Affine::generator();
        let s = encode_g2(&q);
        assert_eq!(s.split(DELIMITER).count(), 4);
        assert_eq!(decode_g2(&s).unwrap(), q);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(decode_g1("1,2,3").is_err());
        assert!(decode_g1("1,x").is_err());
        // two integers, but not a curve point
        assert!(decode_g1("1,2").is_err());
    }
}
