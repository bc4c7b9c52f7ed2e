use rand::RngCore;

use crate::error::{Error, Result};
use crate::field::FieldElement;

/// Dense univariate polynomial, coefficient `i` multiplies `x^i`.
///
/// There is no mutable access to the coefficients. A polynomial committed
/// by the provider stays the polynomial its commitment binds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Polynomial {
    coeffs: Vec<FieldElement>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<FieldElement>) -> Result<Self> {
        if coeffs.is_empty() {
            return Err(Error::InvalidDegree(
                "a polynomial needs at least one coefficient".into(),
            ));
        }
        Ok(Self { coeffs })
    }

    pub fn from_u64s(coeffs: &[u64]) -> Result<Self> {
        Self::new(coeffs.iter().map(|&c| FieldElement::from(c)).collect())
    }

    /// Uniformly random polynomial with `degree + 1` coefficients.
    pub fn random(degree: usize, mut rng: impl RngCore) -> Self {
        let coeffs = (0..=degree)
            .map(|_| FieldElement::random(&mut rng))
            .collect();
        Self { coeffs }
    }

    /// Number of coefficients minus one.
    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn coefficients(&self) -> &[FieldElement] {
        &self.coeffs
    }

    // Horner's rule
    pub fn evaluate(&self, point: &FieldElement) -> FieldElement {
        self.coeffs
            .iter()
            .rev()
            .fold(FieldElement::ZERO, |acc, c| acc * *point + *c)
    }

    /// Synthetic division by `(x - point)`, returning the quotient
    /// coefficients and the remainder `self(point)`.
    pub fn divide_by_linear(&self, point: &FieldElement) -> (Vec<FieldElement>, FieldElement) {
        let n = self.coeffs.len();
        let mut quotient = vec![FieldElement::ZERO; n.saturating_sub(1)];
        let mut carry = FieldElement::ZERO;
        for i in (1..n).rev() {
            carry = carry * *point + self.coeffs[i];
            quotient[i - 1] = carry;
        }
        let remainder = carry * *point + self.coeffs[0];
        (quotient, remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_polynomial_is_rejected() {
        assert!(matches!(
            Polynomial::new(Vec::new()),
            Err(Error::InvalidDegree(_))
        ));
    }

    #[test]
    fn evaluates_linear_polynomial() {
        let f = Polynomial::from_u64s(&[3, 5]).unwrap();
        assert_eq!(f.degree(), 1);
        assert_eq!(f.evaluate(&FieldElement::from(10)), FieldElement::from(53));
    }

    #[test]
    fn division_reconstructs_polynomial() {
        // f(x) = 8 + 7x + 8x^2 + 6x^3
        let f = Polynomial::from_u64s(&[8, 7, 8, 6]).unwrap();
        let z = FieldElement::from(4);
        let (q, r) = f.divide_by_linear(&z);
        assert_eq!(r, f.evaluate(&z));
        assert_eq!(q.len(), 3);

        // q(x) * (x - z) + r == f(x) at an unrelated point
        let x = FieldElement::from(11);
        let q = Polynomial::new(q).unwrap();
        assert_eq!(q.evaluate(&x) * (x - z) + r, f.evaluate(&x));
    }

    #[test]
    fn constant_polynomial_has_empty_quotient() {
        let f = Polynomial::from_u64s(&[9]).unwrap();
        let (q, r) = f.divide_by_linear(&FieldElement::from(2));
        assert!(q.is_empty());
        assert_eq!(r, FieldElement::from(9));
    }
}
