//! Commitment backends behind one four-operation contract.
//!
//! A provider-side backend owns the hidden function after `setup`; an
//! auditor-side backend of the same kind only verifies. One run uses one
//! backend kind throughout. Public parameters and proofs carry their kind,
//! and pairing them across kinds is rejected with `BackendMismatch`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoding::DELIMITER;
use crate::error::{Error, Result};
use crate::field::FieldElement;
use crate::kzg::{self, Commitment, CommitmentKey, EvaluationProof, MAX_SETUP_DEGREE, ToxicSecret};
use crate::polynomial::Polynomial;
use crate::pool::Workload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Kzg,
    ExternalProcess,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Kzg => "kzg",
            BackendKind::ExternalProcess => "external-process",
        })
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "kzg" => Ok(BackendKind::Kzg),
            "external-process" => Ok(BackendKind::ExternalProcess),
            other => Err(Error::Decode(format!("unknown backend kind {other:?}"))),
        }
    }
}

/// The hidden function a provider commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunctionSpec {
    /// Fixed coefficients, lowest degree first.
    Coefficients { coefficients: Vec<u64> },
    /// Uniformly random coefficients.
    Random { degree: usize },
}

impl Default for FunctionSpec {
    fn default() -> Self {
        FunctionSpec::Coefficients {
            coefficients: vec![8, 7, 8],
        }
    }
}

impl FunctionSpec {
    pub fn degree(&self) -> Result<usize> {
        match self {
            FunctionSpec::Coefficients { coefficients } => coefficients
                .len()
                .checked_sub(1)
                .ok_or_else(|| Error::InvalidDegree("no coefficients given".into())),
            FunctionSpec::Random { degree } => Ok(*degree),
        }
    }

    pub fn build(&self, rng: impl rand::RngCore) -> Result<Polynomial> {
        match self {
            FunctionSpec::Coefficients { coefficients } => Polynomial::from_u64s(coefficients),
            FunctionSpec::Random { degree } => Ok(Polynomial::random(*degree, rng)),
        }
    }
}

/// Everything an auditor needs to check proofs for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicParams {
    Kzg {
        key: Arc<CommitmentKey>,
        commitment: Commitment,
    },
    External {
        verifying_key: PathBuf,
        function_proof: PathBuf,
    },
}

impl PublicParams {
    pub fn kind(&self) -> BackendKind {
        match self {
            PublicParams::Kzg { .. } => BackendKind::Kzg,
            PublicParams::External { .. } => BackendKind::ExternalProcess,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProofHandle {
    Kzg(EvaluationProof),
    /// Proof written by an external program.
    File(PathBuf),
}

fn looks_like_integer_list(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit() || c == DELIMITER)
}

impl ProofHandle {
    pub fn kind(&self) -> BackendKind {
        match self {
            ProofHandle::Kzg(_) => BackendKind::Kzg,
            ProofHandle::File(_) => BackendKind::ExternalProcess,
        }
    }

    /// Parses the proof half of a record line for a run of backend `kind`.
    pub fn decode(kind: BackendKind, s: &str) -> Result<Self> {
        let s = s.trim();
        match kind {
            BackendKind::Kzg if !looks_like_integer_list(s) => Err(Error::BackendMismatch {
                expected: BackendKind::Kzg.to_string(),
                found: BackendKind::ExternalProcess.to_string(),
            }),
            BackendKind::Kzg => s.parse().map(ProofHandle::Kzg),
            BackendKind::ExternalProcess if looks_like_integer_list(s) && s.contains(DELIMITER) => {
                Err(Error::BackendMismatch {
                    expected: BackendKind::ExternalProcess.to_string(),
                    found: BackendKind::Kzg.to_string(),
                })
            }
            BackendKind::ExternalProcess => Ok(ProofHandle::File(PathBuf::from(s))),
        }
    }
}

impl fmt::Display for ProofHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofHandle::Kzg(proof) => write!(f, "{proof}"),
            ProofHandle::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One opened point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationRecord {
    pub point: FieldElement,
    pub value: FieldElement,
    pub proof: ProofHandle,
}

pub(crate) fn mismatch(expected: BackendKind, found: BackendKind) -> Error {
    Error::BackendMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

pub trait CommitmentBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn workload(&self) -> Workload;

    /// Commits to `function`. A backend commits at most once.
    fn setup(&mut self, function: &FunctionSpec) -> Result<PublicParams>;

    /// Evaluates the committed function at `point` and proves it. `index` is
    /// the point's position in the batch.
    fn open(&self, index: usize, point: &FieldElement) -> Result<(FieldElement, ProofHandle)>;

    /// `Ok(false)` for a proof that does not check out, `Err` only when the
    /// check itself could not run.
    fn verify(
        &self,
        params: &PublicParams,
        point: &FieldElement,
        value: &FieldElement,
        proof: &ProofHandle,
    ) -> Result<bool>;
}

struct CommittedFunction {
    key: Arc<CommitmentKey>,
    polynomial: Polynomial,
}

/// Native KZG backend.
pub struct KzgBackend {
    ceiling: usize,
    toxic: Option<ToxicSecret>,
    committed: Option<CommittedFunction>,
}

impl KzgBackend {
    /// Production backend: the trapdoor is sampled from the OS and dropped.
    pub fn new(max_supported_degree: usize) -> Self {
        Self {
            ceiling: max_supported_degree.min(MAX_SETUP_DEGREE),
            toxic: None,
            committed: None,
        }
    }

    /// Test-mode backend with a known trapdoor. Its commitments are not
    /// binding against anyone who knows `secret`.
    pub fn with_toxic_secret(max_supported_degree: usize, secret: ToxicSecret) -> Self {
        Self {
            toxic: Some(secret),
            ..Self::new(max_supported_degree)
        }
    }

    /// Verify-only backend for auditors.
    pub fn auditor() -> Self {
        Self::new(MAX_SETUP_DEGREE)
    }

    pub fn key(&self) -> Option<&Arc<CommitmentKey>> {
        self.committed.as_ref().map(|c| &c.key)
    }
}

impl CommitmentBackend for KzgBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Kzg
    }

    fn workload(&self) -> Workload {
        Workload::CpuBound
    }

    fn setup(&mut self, function: &FunctionSpec) -> Result<PublicParams> {
        if self.committed.is_some() {
            return Err(Error::Backend("a function is already committed".into()));
        }
        let degree = function.degree()?;
        if degree > self.ceiling {
            return Err(Error::DegreeTooLarge {
                requested: degree,
                ceiling: self.ceiling,
            });
        }

        let key = match self.toxic.take() {
            Some(secret) => kzg::setup_with_toxic_secret(degree, secret)?,
            None => kzg::setup(degree, &mut OsRng)?,
        };
        let polynomial = function.build(OsRng)?;
        let commitment = kzg::commit(&key, &polynomial)?;
        info!(degree, "committed polynomial");

        let key = Arc::new(key);
        self.committed = Some(CommittedFunction {
            key: Arc::clone(&key),
            polynomial,
        });
        Ok(PublicParams::Kzg { key, commitment })
    }

    fn open(&self, _index: usize, point: &FieldElement) -> Result<(FieldElement, ProofHandle)> {
        let committed = self
            .committed
            .as_ref()
            .ok_or_else(|| Error::Backend("no committed function to open".into()))?;
        let (value, proof) = kzg::open(&committed.key, &committed.polynomial, point)?;
        Ok((value, ProofHandle::Kzg(proof)))
    }

    fn verify(
        &self,
        params: &PublicParams,
        point: &FieldElement,
        value: &FieldElement,
        proof: &ProofHandle,
    ) -> Result<bool> {
        match (params, proof) {
            (PublicParams::Kzg { key, commitment }, ProofHandle::Kzg(proof)) => {
                Ok(kzg::verify(key, commitment, point, value, proof))
            }
            (PublicParams::Kzg { .. }, other) => Err(mismatch(BackendKind::Kzg, other.kind())),
            (other, _) => Err(mismatch(BackendKind::Kzg, other.kind())),
        }
    }
}
