//! Arithmetic over the BLS12-381 scalar field.
//!
//! [`FieldElement`] is an immutable value type; every operation returns a
//! fully reduced element of `[0, p)`. Uniform sampling goes through
//! `ff::Field::random`, which reduces 512 uniform bits mod p, leaving a bias
//! of at most 2^-256.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;
use std::sync::OnceLock;

use bls12_381::Scalar;
use ff::Field;
use num_bigint::BigUint;
use rand::RngCore;

use crate::error::{Error, Result};

/// Byte length of a serialized field element.
pub const FIELD_BYTES: usize = 32;

#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldElement(Scalar);

impl zeroize::DefaultIsZeroes for FieldElement {}

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement(Scalar::ZERO);
    pub const ONE: FieldElement = FieldElement(Scalar::ONE);

    /// The field order p as an integer.
    pub fn modulus() -> &'static BigUint {
        static MODULUS: OnceLock<BigUint> = OnceLock::new();
        MODULUS.get_or_init(|| (-FieldElement::ONE).to_biguint() + 1u32)
    }

    pub fn random(rng: impl RngCore) -> Self {
        FieldElement(Scalar::random(rng))
    }

    pub fn inv(&self) -> Result<Self> {
        Option::<Scalar>::from(self.0.invert())
            .map(FieldElement)
            .ok_or(Error::NotInvertible)
    }

    pub fn pow(&self, exponent: u64) -> Self {
        FieldElement(Field::pow_vartime(&self.0, [exponent]))
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// Canonical big-endian encoding.
    pub fn to_bytes_be(&self) -> [u8; FIELD_BYTES] {
        let mut bytes = self.0.to_bytes();
        bytes.reverse();
        bytes
    }

    /// Parses a canonical big-endian encoding; values `>= p` are rejected.
    pub fn from_bytes_be(bytes: &[u8; FIELD_BYTES]) -> Result<Self> {
        let mut le = *bytes;
        le.reverse();
        Option::<Scalar>::from(Scalar::from_bytes(&le))
            .map(FieldElement)
            .ok_or_else(|| Error::Decode("field element is not canonical".into()))
    }

    /// Reads 32 big-endian bytes as an integer and reduces it mod p.
    pub fn from_bytes_be_reduced(bytes: &[u8; FIELD_BYTES]) -> Self {
        // from_bytes_wide expects little-endian input
        let mut wide = [0u8; 64];
        for (dst, src) in wide.iter_mut().zip(bytes.iter().rev()) {
            *dst = *src;
        }
        FieldElement(Scalar::from_bytes_wide(&wide))
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.to_bytes_be())
    }

    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        let bytes = value.to_bytes_be();
        if bytes.len() > FIELD_BYTES {
            return Err(Error::Decode(format!("integer {value} exceeds field size")));
        }
        let mut padded = [0u8; FIELD_BYTES];
        padded[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
        Self::from_bytes_be(&padded)
    }

    pub(crate) fn as_scalar(&self) -> &Scalar {
        &self.0
    }
}

impl From<u64> for FieldElement {
    fn from(value: u64) -> Self {
        FieldElement(Scalar::from(value))
    }
}

impl Add for FieldElement {
    type Output = FieldElement;
    fn add(self, rhs: FieldElement) -> FieldElement {
        FieldElement(self.0 + rhs.0)
    }
}

impl Sub for FieldElement {
    type Output = FieldElement;
    fn sub(self, rhs: FieldElement) -> FieldElement {
        FieldElement(self.0 - rhs.0)
    }
}

impl Mul for FieldElement {
    type Output = FieldElement;
    fn mul(self, rhs: FieldElement) -> FieldElement {
        FieldElement(self.0 * rhs.0)
    }
}

impl Neg for FieldElement {
    type Output = FieldElement;
    fn neg(self) -> FieldElement {
        FieldElement(-self.0)
    }
}

// Decimal, as published on the bulletin board.
impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_biguint())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_biguint())
    }
}

impl FromStr for FieldElement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
            .ok_or_else(|| Error::Decode(format!("not a decimal integer: {s:?}")))?;
        FieldElement::from_biguint(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn inverse_of_zero_fails() {
        assert!(matches!(FieldElement::ZERO.inv(), Err(Error::NotInvertible)));
    }

    #[test]
    fn inverse_and_pow_agree() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let a = FieldElement::random(&mut rng);
        assert_eq!(a * a.inv().unwrap(), FieldElement::ONE);
        assert_eq!(a.pow(3), a * a * a);
        assert_eq!(a.pow(0), FieldElement::ONE);
    }

    #[test]
    fn subtraction_wraps_around_modulus() {
        let x = FieldElement::from(3) - FieldElement::from(5);
        assert_eq!(x + FieldElement::from(2), FieldElement::ZERO);
        assert_eq!(x.to_biguint(), FieldElement::modulus() - 2u32);
        assert_eq!(-FieldElement::ZERO, FieldElement::ZERO);
    }

    #[test]
    fn decimal_and_bytes() {
        let x: FieldElement = "53".parse().unwrap();
        assert_eq!(x, FieldElement::from(53));
        assert_eq!(x.to_string(), "53");
        assert_eq!(FieldElement::from_bytes_be(&x.to_bytes_be()).unwrap(), x);

        let too_big = FieldElement::modulus().to_string();
        assert!(too_big.parse::<FieldElement>().is_err());
        assert!("12a".parse::<FieldElement>().is_err());
    }

    #[test]
    fn reduction_matches_integer_mod() {
        let bytes = [0xffu8; 32];
        let expected = BigUint::from_bytes_be(&bytes) % FieldElement::modulus();
        assert_eq!(
            FieldElement::from_bytes_be_reduced(&bytes).to_biguint(),
            expected
        );
    }
}
