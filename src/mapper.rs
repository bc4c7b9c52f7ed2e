//! Expands a protocol seed into an endless sequence of evaluation points.
//!
//! Both samplers are pure functions of the seed bytes: replaying from the
//! same seed reproduces the same sequence, element for element. There is
//! no way to seek; to reproduce a prefix, start over from the seed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::field::FieldElement;

const OFFER_CHAIN_DOMAIN: &[u8] = b"offer";

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Hashes arbitrary bytes into the field: the SHA-256 digest read as a
/// big-endian integer, reduced mod p.
pub fn hash_to_field(data: &[u8]) -> FieldElement {
    FieldElement::from_bytes_be_reduced(&sha256(data))
}

/// How evaluation points are derived from the seed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingKind {
    /// `seed = H(seed)`, point = seed mod p.
    #[default]
    Direct,
    /// Loot-box draws: a random string and an offer, hashed together.
    LootBox {
        #[serde(default)]
        offers: Vec<String>,
    },
}

/// Hash chain `seed_{i+1} = H(seed_i)`, yielding each state mod p.
#[derive(Clone, Debug)]
pub struct PointSampler {
    state: Vec<u8>,
}

impl PointSampler {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            state: seed.to_vec(),
        }
    }
}

impl Iterator for PointSampler {
    type Item = FieldElement;

    fn next(&mut self) -> Option<FieldElement> {
        let digest = sha256(&self.state);
        self.state = digest.to_vec();
        Some(FieldElement::from_bytes_be_reduced(&digest))
    }
}

/// One loot-box draw before it is mapped into the field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LootBoxInput {
    pub random: String,
    pub offer: String,
}

impl LootBoxInput {
    /// `H(random || offer)` reduced mod p. The order of concatenation is part
    /// of the public protocol.
    pub fn to_field(&self) -> FieldElement {
        let mut joined = Vec::with_capacity(self.random.len() + self.offer.len());
        joined.extend_from_slice(self.random.as_bytes());
        joined.extend_from_slice(self.offer.as_bytes());
        hash_to_field(&joined)
    }
}

/// Two independent chains: the random-string chain starts at the seed, the
/// offer chain at `H("offer" || seed)`. Each draw advances both, so the
/// first random string is `hex(H(seed))`.
#[derive(Clone, Debug)]
pub struct LootBoxSampler {
    random_chain: Vec<u8>,
    offer_chain: [u8; 32],
    offers: Vec<String>,
}

impl LootBoxSampler {
    pub fn new(seed: &[u8], offers: Vec<String>) -> Self {
        let mut tagged = OFFER_CHAIN_DOMAIN.to_vec();
        tagged.extend_from_slice(seed);
        Self {
            random_chain: seed.to_vec(),
            offer_chain: sha256(&tagged),
            offers,
        }
    }

    pub fn next_input(&mut self) -> LootBoxInput {
        let random_state = sha256(&self.random_chain);
        self.random_chain = random_state.to_vec();
        self.offer_chain = sha256(&self.offer_chain);

        let random = hex::encode(random_state);
        let offer = if self.offers.is_empty() {
            hex::encode(self.offer_chain)
        } else {
            let mut word = [0u8; 8];
            word.copy_from_slice(&self.offer_chain[..8]);
            let idx = u64::from_be_bytes(word) % self.offers.len() as u64;
            self.offers[idx as usize].clone()
        };
        LootBoxInput { random, offer }
    }
}

impl Iterator for LootBoxSampler {
    type Item = FieldElement;

    fn next(&mut self) -> Option<FieldElement> {
        Some(self.next_input().to_field())
    }
}

/// The first `count` points for `seed` under `kind`.
pub fn derive_points(kind: &MappingKind, seed: &[u8], count: usize) -> Vec<FieldElement> {
    match kind {
        MappingKind::Direct => PointSampler::new(seed).take(count).collect(),
        MappingKind::LootBox { offers } => {
            LootBoxSampler::new(seed, offers.clone()).take(count).collect()
        }
    }
}
