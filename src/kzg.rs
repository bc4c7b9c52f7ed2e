//! KZG polynomial commitments over BLS12-381.
//!
//! `setup` produces the structured key `{g1·τ^i}` and `{g2, g2·τ}`. The
//! trapdoor τ only lives inside [`setup`] / [`setup_with_toxic_secret`] and
//! is wiped before they return.

use std::fmt;
use std::str::FromStr;

use bls12_381::{G1Affine, G1Projective, G2Affine, G2Prepared, G2Projective, Gt, multi_miller_loop};
use group::Curve;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use zeroize::Zeroizing;

use crate::encoding::{decode_g1, decode_g2, encode_g1, encode_g2};
use crate::error::{Error, Result};
use crate::field::FieldElement;
use crate::polynomial::Polynomial;

/// Largest degree this backend will generate a key for.
pub const MAX_SETUP_DEGREE: usize = 1 << 20;

/// A fixed trapdoor for deterministic tests.
///
/// Keys built from a `ToxicSecret` are insecure: anyone who knows τ can
/// forge openings. Production code calls [`setup`], which samples τ itself.
pub struct ToxicSecret(Zeroizing<FieldElement>);

impl ToxicSecret {
    pub fn new(tau: FieldElement) -> Self {
        ToxicSecret(Zeroizing::new(tau))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentKey {
    g1: Vec<G1Affine>,
    g2: [G2Affine; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Commitment(G1Affine);

/// Commitment to the quotient `(f(x) - f(z)) / (x - z)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluationProof(G1Affine);

impl CommitmentKey {
    pub fn max_degree(&self) -> usize {
        self.g1.len() - 1
    }

    pub fn g1_powers(&self) -> &[G1Affine] {
        &self.g1
    }

    pub fn g2_powers(&self) -> &[G2Affine; 2] {
        &self.g2
    }

    /// Rebuilds a key from published powers.
    pub fn from_powers(g1: Vec<G1Affine>, g2: [G2Affine; 2]) -> Result<Self> {
        if g1.is_empty() {
            return Err(Error::MalformedKey("no G1 powers".into()));
        }
        if g1[0] != G1Affine::generator() || g2[0] != G2Affine::generator() {
            return Err(Error::MalformedKey(
                "first powers must be the group generators".into(),
            ));
        }
        if g1.len() - 1 > MAX_SETUP_DEGREE {
            return Err(Error::DegreeTooLarge {
                requested: g1.len() - 1,
                ceiling: MAX_SETUP_DEGREE,
            });
        }
        Ok(Self { g1, g2 })
    }

    /// Text form: the max degree, then one G1 power per line, then both G2
    /// powers.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n", self.max_degree());
        for p in &self.g1 {
            out.push_str(&encode_g1(p));
            out.push('\n');
        }
        for q in &self.g2 {
            out.push_str(&encode_g2(q));
            out.push('\n');
        }
        out
    }

    pub fn from_text(text: &str) -> Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let max_degree: usize = lines
            .next()
            .ok_or_else(|| Error::MalformedKey("empty key".into()))?
            .trim()
            .parse()
            .map_err(|_| Error::MalformedKey("max degree is not an integer".into()))?;
        if max_degree > MAX_SETUP_DEGREE {
            return Err(Error::DegreeTooLarge {
                requested: max_degree,
                ceiling: MAX_SETUP_DEGREE,
            });
        }
        let mut g1 = Vec::with_capacity(max_degree + 1);
        for _ in 0..=max_degree {
            let line = lines
                .next()
                .ok_or_else(|| Error::MalformedKey("missing G1 power".into()))?;
            g1.push(decode_g1(line).map_err(|e| Error::MalformedKey(e.to_string()))?);
        }
        let mut g2 = [G2Affine::identity(); 2];
        for slot in g2.iter_mut() {
            let line = lines
                .next()
                .ok_or_else(|| Error::MalformedKey("missing G2 power".into()))?;
            *slot = decode_g2(line).map_err(|e| Error::MalformedKey(e.to_string()))?;
        }
        if lines.next().is_some() {
            return Err(Error::MalformedKey("trailing data after G2 powers".into()));
        }
        Self::from_powers(g1, g2)
    }
}

macro_rules! g1_text {
    ($ty:ident) => {
        impl $ty {
            pub fn as_affine(&self) -> &G1Affine {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_g1(&self.0))
            }
        }

        impl FromStr for $ty {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self> {
                decode_g1(s).map($ty)
            }
        }
    };
}

g1_text!(Commitment);
g1_text!(EvaluationProof);

// Generate a key with a freshly sampled trapdoor that is dropped afterwards
pub fn setup<R: RngCore + CryptoRng>(max_degree: usize, rng: &mut R) -> Result<CommitmentKey> {
    let tau = Zeroizing::new(FieldElement::random(rng));
    setup_from_trapdoor(max_degree, &tau)
}

pub fn setup_with_toxic_secret(max_degree: usize, secret: ToxicSecret) -> Result<CommitmentKey> {
    // secret is wiped when it goes out of scope here
    setup_from_trapdoor(max_degree, &secret.0)
}

fn setup_from_trapdoor(max_degree: usize, tau: &FieldElement) -> Result<CommitmentKey> {
    if max_degree > MAX_SETUP_DEGREE {
        return Err(Error::DegreeTooLarge {
            requested: max_degree,
            ceiling: MAX_SETUP_DEGREE,
        });
    }

    // τ^0 .. τ^D, wiped on drop
    let mut powers = Zeroizing::new(Vec::with_capacity(max_degree + 1));
    let mut acc = Zeroizing::new(FieldElement::ONE);
    for _ in 0..=max_degree {
        powers.push(*acc);
        *acc = *acc * *tau;
    }

    let scalars: &[FieldElement] = &powers;
    let projective: Vec<G1Projective> = scalars
        .par_iter()
        .map(|p| G1Affine::generator() * p.as_scalar())
        .collect();
    let mut g1 = vec![G1Affine::identity(); projective.len()];
    G1Projective::batch_normalize(&projective, &mut g1);

    let g2 = [
        G2Affine::generator(),
        (G2Affine::generator() * tau.as_scalar()).to_affine(),
    ];
    Ok(CommitmentKey { g1, g2 })
}

// Σ coeff_i · g1[i]
fn msm(bases: &[G1Affine], scalars: &[FieldElement]) -> G1Projective {
    bases
        .par_iter()
        .zip(scalars.par_iter())
        .map(|(b, s)| b * s.as_scalar())
        .reduce(G1Projective::identity, |a, b| a + b)
}

fn check_degree(key: &CommitmentKey, poly: &Polynomial) -> Result<()> {
    if poly.degree() > key.max_degree() {
        return Err(Error::DegreeExceedsKey {
            degree: poly.degree(),
            max_degree: key.max_degree(),
        });
    }
    Ok(())
}

pub fn commit(key: &CommitmentKey, poly: &Polynomial) -> Result<Commitment> {
    check_degree(key, poly)?;
    Ok(Commitment(msm(&key.g1, poly.coefficients()).to_affine()))
}

/// Evaluates `poly` at `point` and proves the evaluation.
pub fn open(
    key: &CommitmentKey,
    poly: &Polynomial,
    point: &FieldElement,
) -> Result<(FieldElement, EvaluationProof)> {
    check_degree(key, poly)?;
    let value = poly.evaluate(point);
    // dividing f(x) - f(z) by (x - z) leaves no remainder
    let (quotient, remainder) = poly.divide_by_linear(point);
    debug_assert_eq!(remainder, value);
    let proof = msm(&key.g1, &quotient).to_affine();
    Ok((value, EvaluationProof(proof)))
}

/// Checks `e(proof, g2·τ - g2·z) · e(-(C - g1·y), g2) == 1`.
pub fn verify(
    key: &CommitmentKey,
    commitment: &Commitment,
    point: &FieldElement,
    value: &FieldElement,
    proof: &EvaluationProof,
) -> bool {
    let shifted_tau = (G2Projective::from(key.g2[1])
        - G2Projective::generator() * point.as_scalar())
    .to_affine();
    let residual = G1Projective::from(commitment.0) - G1Projective::generator() * value.as_scalar();
    let neg_residual = (-residual).to_affine();

    let shifted_tau = G2Prepared::from(shifted_tau);
    let g2 = G2Prepared::from(key.g2[0]);
    let result = multi_miller_loop(&[(&proof.0, &shifted_tau), (&neg_residual, &g2)])
        .final_exponentiation();
    result == Gt::identity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn test_key(max_degree: usize) -> CommitmentKey {
        setup_with_toxic_secret(max_degree, ToxicSecret::new(FieldElement::from(1234567))).unwrap()
    }

    #[test]
    fn toxic_key_is_deterministic() {
        assert_eq!(test_key(4), test_key(4));
        assert_eq!(test_key(4).max_degree(), 4);
    }

    #[test]
    fn random_setup_differs_between_runs() {
        let a = setup(2, &mut OsRng).unwrap();
        let b = setup(2, &mut OsRng).unwrap();
        assert_eq!(a.g1_powers()[0], b.g1_powers()[0]);
        assert_ne!(a.g1_powers()[1], b.g1_powers()[1]);
    }

    #[test]
    fn setup_rejects_degree_above_ceiling() {
        let err = setup(MAX_SETUP_DEGREE + 1, &mut OsRng).unwrap_err();
        assert!(matches!(err, Error::DegreeTooLarge { .. }));
    }

    #[test]
    fn key_text_form() {
        let key = test_key(3);
        let text = key.to_text();
        assert_eq!(text.lines().count(), 1 + 4 + 2);
        assert_eq!(CommitmentKey::from_text(&text).unwrap(), key);
    }

    #[test]
    fn truncated_key_is_malformed() {
        let text = test_key(3).to_text();
        let truncated: String = text.lines().take(4).map(|l| format!("{l}\n")).collect();
        assert!(matches!(
            CommitmentKey::from_text(&truncated),
            Err(Error::MalformedKey(_))
        ));
    }

    #[test]
    fn constant_polynomial_opens_with_identity_proof() {
        let key = test_key(2);
        let f = Polynomial::from_u64s(&[17]).unwrap();
        let c = commit(&key, &f).unwrap();
        let (y, w) = open(&key, &f, &FieldElement::from(5)).unwrap();
        assert_eq!(y, FieldElement::from(17));
        assert_eq!(*w.as_affine(), G1Affine::identity());
        assert!(verify(&key, &c, &FieldElement::from(5), &y, &w));
    }

    #[test]
    fn proof_text_form() {
        let key = test_key(2);
        let f = Polynomial::from_u64s(&[1, 2, 3]).unwrap();
        let (_, w) = open(&key, &f, &FieldElement::from(9)).unwrap();
        assert_eq!(w.to_string().parse::<EvaluationProof>().unwrap(), w);
    }
}
