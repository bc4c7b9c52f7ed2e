//! Public classification of evaluated values.
//!
//! A [`WinningRule`] is published next to the commitment and depends on
//! the value alone, so the provider and every auditor tally the same wins.

use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::FieldElement;

const PROBABILITY_SCALE: u64 = 1_000_000_000_000_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WinningRule {
    /// Win iff `value mod modulus == 0`.
    Modulo { modulus: u64 },
    /// Win iff `value / p < probability`, i.e. the value falls in the lowest
    /// `probability` share of the field.
    Below { probability: f64 },
    /// Win iff `value == 1`.
    Flag,
}

impl Default for WinningRule {
    fn default() -> Self {
        WinningRule::Modulo { modulus: 2 }
    }
}

impl WinningRule {
    /// Modulo rule with `modulus = floor(1 / probability)`.
    pub fn from_probability(probability: f64) -> Result<Self> {
        if !(probability > 0.0 && probability < 1.0) {
            return Err(Error::InvalidProbability(probability));
        }
        let modulus = (1.0 / probability).floor() as u64;
        Ok(WinningRule::Modulo { modulus })
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            WinningRule::Modulo { modulus } if *modulus == 0 => {
                Err(Error::Config("winning modulus must be positive".into()))
            }
            WinningRule::Below { probability } if !(*probability > 0.0 && *probability < 1.0) => {
                Err(Error::InvalidProbability(*probability))
            }
            _ => Ok(()),
        }
    }

    pub fn is_winning(&self, value: &FieldElement) -> bool {
        match self {
            WinningRule::Modulo { modulus } => {
                *modulus != 0 && (value.to_biguint() % *modulus).is_zero()
            }
            WinningRule::Below { probability } => {
                let scaled = (probability.clamp(0.0, 1.0) * PROBABILITY_SCALE as f64).round() as u64;
                let threshold = FieldElement::modulus() * scaled / PROBABILITY_SCALE;
                value.to_biguint() < threshold
            }
            WinningRule::Flag => *value == FieldElement::ONE,
        }
    }
}

/// Position of a value in the field as a fraction in `[0, 1)`.
fn unit_interval(value: &FieldElement) -> f64 {
    let num = value.to_biguint().to_f64().unwrap_or(0.0);
    let den = FieldElement::modulus().to_f64().unwrap_or(f64::INFINITY);
    num / den
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RarityTier {
    pub name: String,
    pub probability: f64,
    pub cards: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draw {
    pub tier: String,
    pub card: usize,
}

/// Tiered card table. Tiers are checked in order; the last tier takes
/// whatever probability mass the others leave.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RarityTier>", into = "Vec<RarityTier>")]
pub struct RarityTable {
    tiers: Vec<RarityTier>,
}

impl RarityTable {
    pub fn new(tiers: Vec<RarityTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::Config("rarity table needs at least one tier".into()));
        }
        let mut cumulative = 0.0;
        for tier in &tiers[..tiers.len() - 1] {
            if !(tier.probability > 0.0) {
                return Err(Error::InvalidProbability(tier.probability));
            }
            cumulative += tier.probability;
        }
        if cumulative >= 1.0 {
            return Err(Error::Config(format!(
                "tier probabilities sum to {cumulative}, leaving nothing for the last tier"
            )));
        }
        if tiers.iter().any(|t| t.cards == 0) {
            return Err(Error::Config("every tier needs at least one card".into()));
        }
        Ok(Self { tiers })
    }

    /// 3 star: 3% over 10 cards, 2 star: 17% over 30 cards, 1 star: the rest
    /// over 100 cards.
    pub fn standard() -> Self {
        let tier = |name: &str, probability, cards| RarityTier {
            name: name.to_string(),
            probability,
            cards,
        };
        Self {
            tiers: vec![
                tier("3 star", 0.03, 10),
                tier("2 star", 0.17, 30),
                tier("1 star", 0.80, 100),
            ],
        }
    }

    pub fn tiers(&self) -> &[RarityTier] {
        &self.tiers
    }

    pub fn classify(&self, value: &FieldElement) -> Draw {
        let u = unit_interval(value);
        let mut lower = 0.0;
        let (last, rest) = match self.tiers.split_last() {
            Some(split) => split,
            None => return Draw { tier: String::new(), card: 0 },
        };
        for tier in rest {
            if u < lower + tier.probability {
                return pick(tier, u, lower, tier.probability);
            }
            lower += tier.probability;
        }
        pick(last, u, lower, 1.0 - lower)
    }

    /// The rule that counts a draw from tier `index` as a win.
    pub fn winning_rule_for(&self, index: usize) -> Result<WinningRule> {
        if index != 0 {
            return Err(Error::Config(
                "only the first tier maps onto a single threshold".into(),
            ));
        }
        Ok(WinningRule::Below {
            probability: self.tiers[0].probability,
        })
    }
}

fn pick(tier: &RarityTier, u: f64, lower: f64, width: f64) -> Draw {
    let card = (((u - lower) / width) * tier.cards as f64) as usize;
    Draw {
        tier: tier.name.clone(),
        card: card.min(tier.cards - 1),
    }
}

impl TryFrom<Vec<RarityTier>> for RarityTable {
    type Error = Error;

    fn try_from(tiers: Vec<RarityTier>) -> Result<Self> {
        RarityTable::new(tiers)
    }
}

impl From<RarityTable> for Vec<RarityTier> {
    fn from(table: RarityTable) -> Self {
        table.tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_rule_from_probability() {
        let rule = WinningRule::from_probability(0.5).unwrap();
        assert_eq!(rule, WinningRule::Modulo { modulus: 2 });
        assert!(rule.is_winning(&FieldElement::from(10)));
        assert!(!rule.is_winning(&FieldElement::from(53)));
        assert!(WinningRule::from_probability(0.0).is_err());
    }

    #[test]
    fn below_rule_uses_field_fraction() {
        let rule = WinningRule::Below { probability: 0.03 };
        assert!(rule.is_winning(&FieldElement::from(5)));
        assert!(!rule.is_winning(&-FieldElement::ONE));
        let half = FieldElement::from_biguint(&(FieldElement::modulus() / 2u32)).unwrap();
        assert!(!rule.is_winning(&half));
        assert!(WinningRule::Below { probability: 0.6 }.is_winning(&half));
    }

    #[test]
    fn flag_rule() {
        assert!(WinningRule::Flag.is_winning(&FieldElement::ONE));
        assert!(!WinningRule::Flag.is_winning(&FieldElement::ZERO));
    }

    #[test]
    fn standard_table_tiers() {
        let table = RarityTable::standard();
        let at = |fraction: f64| {
            let scaled = (fraction * 1e12) as u64;
            FieldElement::from_biguint(&(FieldElement::modulus() * scaled / 1_000_000_000_000u64))
                .unwrap()
        };
        assert_eq!(table.classify(&FieldElement::ZERO), Draw { tier: "3 star".into(), card: 0 });
        assert_eq!(table.classify(&at(0.016)), Draw { tier: "3 star".into(), card: 5 });
        assert_eq!(table.classify(&at(0.05)).tier, "2 star");
        assert_eq!(table.classify(&at(0.99)), Draw { tier: "1 star".into(), card: 98 });
        assert_eq!(table.classify(&-FieldElement::ONE).card, 99);
    }

    #[test]
    fn rejects_overfull_table() {
        let tier = |p| RarityTier { name: "t".into(), probability: p, cards: 1 };
        assert!(RarityTable::new(vec![tier(0.6), tier(0.5), tier(0.1)]).is_err());
        assert!(RarityTable::new(vec![tier(0.4), tier(0.5)]).is_ok());
        assert!(serde_json::from_str::<RarityTable>("[]").is_err());
    }
}
