//! Sample-size planning for the one-sided binomial test.
//!
//! The claim "win-rate is p0" is tested against an assumed true rate
//! `p1 < p0`. With the normal approximation, `n` samples are enough when
//! the upper bound around p1 stays below the lower bound around p0:
//!
//! ```text
//! p1 + z_power·sqrt(p1(1-p1)/n) <= p0 - z_conf·sqrt(p0(1-p0)/n)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CONFIDENCE: f64 = 0.95;
pub const DEFAULT_POWER: f64 = 0.80;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleSizePlan {
    /// Claimed probability p0.
    pub claimed: f64,
    /// Assumed true probability p1.
    pub assumed: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_power")]
    pub power: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

fn default_power() -> f64 {
    DEFAULT_POWER
}

fn check_probability(p: f64) -> Result<()> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidProbability(p))
    }
}

impl SampleSizePlan {
    pub fn new(claimed: f64, assumed: f64) -> Self {
        Self {
            claimed,
            assumed,
            confidence: DEFAULT_CONFIDENCE,
            power: DEFAULT_POWER,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for p in [self.claimed, self.assumed, self.confidence, self.power] {
            check_probability(p)?;
        }
        // NaN fails the comparison as well
        if !(self.assumed < self.claimed) {
            return Err(Error::InvalidProbabilityRange {
                p0: self.claimed,
                p1: self.assumed,
            });
        }
        Ok(())
    }

    /// Required number of samples.
    pub fn required_samples(&self) -> Result<usize> {
        self.validate()?;
        let (p0, p1) = (self.claimed, self.assumed);
        let z_conf = inverse_normal_cdf(self.confidence);
        let z_power = inverse_normal_cdf(self.power);

        let numerator = z_power * (p1 * (1.0 - p1)).sqrt() + z_conf * (p0 * (1.0 - p0)).sqrt();
        let n = (numerator / (p0 - p1)).powi(2).ceil();
        Ok(n as usize)
    }
}

/// `Plan(p0, p1, confidence, power)`.
pub fn plan(claimed: f64, assumed: f64, confidence: f64, power: f64) -> Result<usize> {
    SampleSizePlan {
        claimed,
        assumed,
        confidence,
        power,
    }
    .required_samples()
}

/// One-sided lower confidence bound around `p0` for a sample of `n`.
pub fn lower_confidence_bound(p0: f64, n: usize, confidence: f64) -> f64 {
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    p0 - inverse_normal_cdf(confidence) * (p0 * (1.0 - p0) / n as f64).sqrt()
}

/// Standard-normal quantile Φ⁻¹(p) for `0 < p < 1`.
///
/// Acklam's rational approximation, relative error below 1.2e-9.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn quantiles_match_tables() {
        assert!((inverse_normal_cdf(0.5)).abs() < 1e-12);
        assert!((inverse_normal_cdf(0.95) - 1.6448536269514715).abs() < 1e-8);
        assert!((inverse_normal_cdf(0.80) - 0.8416212335729144).abs() < 1e-8);
        assert!((inverse_normal_cdf(0.01) + 2.3263478740408408).abs() < 1e-8);
        assert!((inverse_normal_cdf(0.999) - 3.090232306167813).abs() < 1e-7);
    }

    #[test]
    fn known_sample_sizes() {
        // three-star draw claimed at 3%, suspected to be 1.5%
        assert_eq!(SampleSizePlan::new(0.03, 0.015).required_samples().unwrap(), 652);
        assert_eq!(SampleSizePlan::new(0.5, 0.4).required_samples().unwrap(), 153);
        assert_eq!(SampleSizePlan::new(0.5, 0.3).required_samples().unwrap(), 37);
        assert_eq!(plan(0.1, 0.05, 0.95, 0.8).unwrap(), 184);
    }

    #[test]
    fn plan_guarantees_non_overlapping_bounds() {
        let n = SampleSizePlan::new(0.03, 0.01).required_samples().unwrap();
        let upper = 0.01 + inverse_normal_cdf(0.8) * (0.01 * 0.99 / n as f64).sqrt();
        assert!(upper <= lower_confidence_bound(0.03, n, 0.95));
    }

    #[test]
    fn rejects_assumed_not_below_claimed() {
        assert!(matches!(
            SampleSizePlan::new(0.03, 0.03).required_samples(),
            Err(Error::InvalidProbabilityRange { .. })
        ));
        assert!(matches!(
            SampleSizePlan::new(0.03, 0.05).required_samples(),
            Err(Error::InvalidProbabilityRange { .. })
        ));
        assert!(matches!(
            plan(1.2, 0.5, 0.95, 0.8),
            Err(Error::InvalidProbability(_))
        ));
    }

    proptest! {
        #[test]
        fn shrinking_gap_never_needs_fewer_samples(p0 in 0.05f64..0.95, a in 0.01f64..1.0, b in 0.01f64..1.0) {
            let (wide, narrow) = if a > b { (a, b) } else { (b, a) };
            // gaps as fractions of p0
            let far = plan(p0, p0 * (1.0 - wide), 0.95, 0.8).unwrap();
            let near = plan(p0, p0 * (1.0 - narrow), 0.95, 0.8).unwrap();
            prop_assert!(near >= far);
        }
    }
}
