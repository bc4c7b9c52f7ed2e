//! Randomness beacon client contract and in-process implementations.
//!
//! A network beacon client lives outside this crate; anything that can
//! register entropy and hand back stage-bound randomness implements
//! [`RandomnessBeacon`].

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Handle returned when entropy is contributed to a beacon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: u64,
    pub stage: u64,
}

pub trait RandomnessBeacon: Send + Sync {
    fn contribute(&self, entropy: &[u8]) -> Result<Contribution>;

    /// Randomness attested by the beacon for `stage`. Blocks until available.
    fn get_verified_randomness(&self, contribution: &Contribution, stage: u64) -> Result<Vec<u8>>;
}

/// Fetches beacon output at `contribution.stage + stage_offset` and hashes
/// it into a 32-byte protocol seed.
pub fn derive_seed(
    beacon: &dyn RandomnessBeacon,
    contribution: &Contribution,
    stage_offset: u64,
) -> Result<[u8; 32]> {
    let stage = contribution
        .stage
        .checked_add(stage_offset)
        .ok_or_else(|| Error::Config("beacon stage overflow".into()))?;
    let randomness = beacon.get_verified_randomness(contribution, stage)?;
    debug!(stage, bytes = randomness.len(), "received beacon randomness");
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&Sha256::digest(&randomness));
    Ok(seed)
}

/// Returns the same randomness to every caller. Only useful for experiments
/// and tests, it proves nothing about unpredictability.
pub struct FakeBeacon {
    randomness: Vec<u8>,
}

impl FakeBeacon {
    pub fn new(randomness: impl Into<Vec<u8>>) -> Self {
        Self {
            randomness: randomness.into(),
        }
    }
}

impl RandomnessBeacon for FakeBeacon {
    fn contribute(&self, _entropy: &[u8]) -> Result<Contribution> {
        Ok(Contribution { id: 0, stage: 0 })
    }

    fn get_verified_randomness(&self, _contribution: &Contribution, _stage: u64) -> Result<Vec<u8>> {
        Ok(self.randomness.clone())
    }
}

const LOCAL_BEACON_DOMAIN: &[u8] = b"lootbox-local-beacon-v1";

/// In-process beacon: every contribution advances the stage, and the output
/// for a handle covers all contributions up to and including it.
#[derive(Default)]
pub struct LocalBeacon {
    digests: RwLock<Vec<[u8; 32]>>,
}

impl LocalBeacon {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RandomnessBeacon for LocalBeacon {
    fn contribute(&self, entropy: &[u8]) -> Result<Contribution> {
        let mut digests = self
            .digests
            .write()
            .map_err(|_| Error::Backend("beacon state poisoned".into()))?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(entropy));
        digests.push(digest);
        let id = (digests.len() - 1) as u64;
        Ok(Contribution { id, stage: id })
    }

    fn get_verified_randomness(&self, contribution: &Contribution, stage: u64) -> Result<Vec<u8>> {
        if stage < contribution.stage {
            return Err(Error::Backend(format!(
                "stage {stage} precedes contribution stage {}",
                contribution.stage
            )));
        }
        let digests = self
            .digests
            .read()
            .map_err(|_| Error::Backend("beacon state poisoned".into()))?;
        let upto = contribution.id as usize;
        if upto >= digests.len() {
            return Err(Error::Backend(format!("unknown contribution {}", contribution.id)));
        }

        let mut hasher = Sha256::new();
        hasher.update(LOCAL_BEACON_DOMAIN);
        hasher.update(stage.to_be_bytes());
        for d in &digests[..=upto] {
            hasher.update(d);
        }
        Ok(hasher.finalize().to_vec())
    }
}
