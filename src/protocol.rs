//! Provider and auditor sides of a run.
//!
//! ```text
//! SETUP --setup--> CONTRIBUTED --eval--> EVALUATED --publish--> PUBLISHED
//!                                                    auditor: --verify--> VERIFIED | FAILED
//! ```
//!
//! The auditor reuses the provider's published [`Contribution`] and asks
//! the beacon for the randomness itself. The provider contributes only
//! after its commitment is published, so it cannot steer the points toward
//! a function chosen afterwards.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::backend::{CommitmentBackend, EvaluationRecord, PublicParams};
use crate::beacon::{Contribution, RandomnessBeacon, derive_seed};
use crate::bulletin::{self, BulletinBoard, CONTRIBUTION_ENTRY, RECORDS_ENTRY, RULE_ENTRY};
use crate::config::ProtocolConfig;
use crate::error::{Error, Phase, PhaseContext, Result};
use crate::field::FieldElement;
use crate::mapper::derive_points;
use crate::outcome::WinningRule;
use crate::planner::lower_confidence_bound;
use crate::pool::{CancelToken, WorkerPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolPhase {
    Setup,
    Contributed,
    Evaluated,
    Published,
    Verified,
    Failed,
}

impl fmt::Display for ProtocolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolPhase::Setup => "SETUP",
            ProtocolPhase::Contributed => "CONTRIBUTED",
            ProtocolPhase::Evaluated => "EVALUATED",
            ProtocolPhase::Published => "PUBLISHED",
            ProtocolPhase::Verified => "VERIFIED",
            ProtocolPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn expect_phase(actual: ProtocolPhase, expected: ProtocolPhase) -> Result<()> {
    if actual != expected {
        return Err(Error::InvalidPhase {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

pub struct Provider {
    config: ProtocolConfig,
    backend: Box<dyn CommitmentBackend>,
    beacon: Arc<dyn RandomnessBeacon>,
    board: Arc<dyn BulletinBoard>,
    phase: ProtocolPhase,
    contribution: Option<Contribution>,
    records: Vec<EvaluationRecord>,
}

impl Provider {
    pub fn new(
        config: ProtocolConfig,
        backend: Box<dyn CommitmentBackend>,
        beacon: Arc<dyn RandomnessBeacon>,
        board: Arc<dyn BulletinBoard>,
    ) -> Self {
        Self {
            config,
            backend,
            beacon,
            board,
            phase: ProtocolPhase::Setup,
            contribution: None,
            records: Vec::new(),
        }
    }

    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    pub fn contribution(&self) -> Option<&Contribution> {
        self.contribution.as_ref()
    }

    /// Records of the last evaluation, in point order.
    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    /// Commits to the configured function, publishes the public parameters
    /// and winning rule, then contributes entropy to the beacon.
    ///
    /// A failure after the backend has committed leaves the provider in
    /// FAILED: the backend commits only once and the board may hold part of
    /// the run, so a new run needs a fresh provider, backend and board.
    pub fn setup(&mut self) -> Result<()> {
        expect_phase(self.phase, ProtocolPhase::Setup).phase(Phase::Setup)?;
        self.config.validate().phase(Phase::Setup)?;

        let params = self.backend.setup(&self.config.function).phase(Phase::Setup)?;
        let contribution = match self.publish_setup(&params) {
            Ok(contribution) => contribution,
            Err(e) => {
                warn!(error = %e, "setup failed after commitment");
                self.phase = ProtocolPhase::Failed;
                return Err(e);
            }
        };

        info!(backend = %self.backend.kind(), stage = contribution.stage, "provider setup complete");
        self.contribution = Some(contribution);
        self.phase = ProtocolPhase::Contributed;
        Ok(())
    }

    fn publish_setup(&self, params: &PublicParams) -> Result<Contribution> {
        bulletin::publish_params(&*self.board, params).phase(Phase::Publish)?;
        bulletin::publish_json(&*self.board, RULE_ENTRY, &self.config.winning).phase(Phase::Publish)?;

        let mut entropy = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *entropy);
        let contribution = self.beacon.contribute(&*entropy).phase(Phase::Setup)?;
        bulletin::publish_json(&*self.board, CONTRIBUTION_ENTRY, &contribution)
            .phase(Phase::Publish)?;
        Ok(contribution)
    }

    /// Opens the committed function at `sample_count` beacon-derived points
    /// and publishes every record in one entry.
    ///
    /// A cancelled or failed batch leaves the phase at CONTRIBUTED and the
    /// board without records.
    pub fn eval(&mut self, sample_count: usize, cancel: &CancelToken) -> Result<()> {
        expect_phase(self.phase, ProtocolPhase::Contributed).phase(Phase::Eval)?;
        let contribution = self
            .contribution
            .as_ref()
            .ok_or_else(|| Error::Backend("no beacon contribution".into()))
            .phase(Phase::Eval)?;
        let seed = derive_seed(&*self.beacon, contribution, self.config.stage_offset)
            .phase(Phase::Eval)?;
        let points = derive_points(&self.config.mapping, &seed, sample_count);

        let pool = WorkerPool::new(self.backend.workload(), self.config.workers).phase(Phase::Eval)?;
        let backend = &*self.backend;
        let records = pool
            .run_indexed(&points, cancel, |i, point| {
                let (value, proof) = backend.open(i, point)?;
                Ok(EvaluationRecord {
                    point: *point,
                    value,
                    proof,
                })
            })
            .phase(Phase::Eval)?;
        info!(records = records.len(), "evaluation complete");

        self.records = records;
        self.phase = ProtocolPhase::Evaluated;
        self.publish()
    }

    /// Publishes the evaluated records. Called by [`Provider::eval`]; only
    /// needed directly to retry after a failed publish.
    pub fn publish(&mut self) -> Result<()> {
        expect_phase(self.phase, ProtocolPhase::Evaluated).phase(Phase::Publish)?;
        bulletin::publish_records(&*self.board, &self.records).phase(Phase::Publish)?;
        self.phase = ProtocolPhase::Published;
        Ok(())
    }
}

/// Outcome of an audit.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditReport {
    pub sample_count: usize,
    /// Every index whose proof failed, ascending.
    pub failed_indices: Vec<usize>,
    /// Wins among records whose proofs verified.
    pub wins: usize,
    pub win_rate: f64,
    pub claimed: f64,
    /// Lowest win-rate consistent with the claim at the configured confidence.
    pub lower_bound: f64,
    pub required_samples: usize,
    pub claim_consistent: bool,
}

impl AuditReport {
    pub fn proofs_valid(&self) -> bool {
        self.failed_indices.is_empty()
    }

    /// Whether the run was large enough for the plan's power guarantee.
    pub fn sufficient_samples(&self) -> bool {
        self.sample_count >= self.required_samples
    }

    pub fn passed(&self) -> bool {
        self.proofs_valid() && self.claim_consistent
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if !self.proofs_valid() {
            return Err(Error::PairingVerificationFailure {
                indices: self.failed_indices.clone(),
            }
            .in_phase(Phase::Verify));
        }
        Ok(())
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "amount: {}, #winning: {}, sample winning probability: {:.4} (claimed {}, lower bound {:.4}, required n {})",
            self.sample_count, self.wins, self.win_rate, self.claimed, self.lower_bound, self.required_samples
        )?;
        if !self.proofs_valid() {
            write!(f, ", failed proofs at {:?}", self.failed_indices)?;
        }
        Ok(())
    }
}

pub struct Auditor {
    config: ProtocolConfig,
    backend: Box<dyn CommitmentBackend>,
    beacon: Arc<dyn RandomnessBeacon>,
    board: Arc<dyn BulletinBoard>,
    phase: ProtocolPhase,
}

impl Auditor {
    pub fn new(
        config: ProtocolConfig,
        backend: Box<dyn CommitmentBackend>,
        beacon: Arc<dyn RandomnessBeacon>,
        board: Arc<dyn BulletinBoard>,
    ) -> Self {
        Self {
            config,
            backend,
            beacon,
            board,
            phase: ProtocolPhase::Published,
        }
    }

    pub fn phase(&self) -> ProtocolPhase {
        self.phase
    }

    /// Recomputes `sample_count` points and checks every published record
    /// against them.
    ///
    /// Returns `Err` when the audit could not run (invalid plan, count
    /// mismatch, unreadable board, backend failure); failing proofs are listed
    /// in the report. The auditor ends in VERIFIED only when the report
    /// passes.
    pub fn verify(&mut self, sample_count: usize, cancel: &CancelToken) -> Result<AuditReport> {
        expect_phase(self.phase, ProtocolPhase::Published).phase(Phase::Verify)?;
        let result = self.run_audit(sample_count, cancel);
        self.phase = match &result {
            Ok(report) if report.passed() => ProtocolPhase::Verified,
            _ => ProtocolPhase::Failed,
        };
        result.phase(Phase::Verify)
    }

    fn run_audit(&self, sample_count: usize, cancel: &CancelToken) -> Result<AuditReport> {
        self.config.validate()?;
        let plan = &self.config.plan;
        let required_samples = plan.required_samples()?;

        let board = &*self.board;
        let kind = bulletin::read_backend_kind(board)?;
        if kind != self.backend.kind() {
            return Err(Error::BackendMismatch {
                expected: self.backend.kind().to_string(),
                found: kind.to_string(),
            });
        }
        let contribution: Contribution = bulletin::read_json(board, CONTRIBUTION_ENTRY)?;
        let records_text = board.read(RECORDS_ENTRY)?;

        // count before decoding anything
        let published = bulletin::count_records(&records_text);
        let seed = derive_seed(&*self.beacon, &contribution, self.config.stage_offset)?;
        let points = derive_points(&self.config.mapping, &seed, sample_count);
        if published != points.len() {
            warn!(published, expected = points.len(), "record count mismatch");
            return Err(Error::CardinalityMismatch {
                published,
                expected: points.len(),
            });
        }

        let params = bulletin::read_params(board)?;
        let rule: WinningRule = bulletin::read_json(board, RULE_ENTRY)?;
        if rule != self.config.winning {
            warn!(published = ?rule, configured = ?self.config.winning, "using the published winning rule");
        }
        let records = bulletin::decode_records(kind, &records_text)?;

        let units: Vec<(&FieldElement, _)> = points.iter().zip(records.iter()).collect();
        let pool = WorkerPool::new(self.backend.workload(), self.config.workers)?;
        let backend = &*self.backend;
        let verdicts = pool.run_indexed(&units, cancel, |_, (point, record)| {
            backend.verify(&params, point, &record.value, &record.proof)
        })?;

        let failed_indices: Vec<usize> = verdicts
            .iter()
            .enumerate()
            .filter(|(_, ok)| !**ok)
            .map(|(i, _)| i)
            .collect();
        for i in &failed_indices {
            warn!(index = i, "verification failed on input");
        }
        let wins = records
            .iter()
            .zip(&verdicts)
            .filter(|(record, ok)| **ok && rule.is_winning(&record.value))
            .count();

        let win_rate = if sample_count == 0 {
            0.0
        } else {
            wins as f64 / sample_count as f64
        };
        let lower_bound = lower_confidence_bound(plan.claimed, sample_count, plan.confidence);
        let report = AuditReport {
            sample_count,
            failed_indices,
            wins,
            win_rate,
            claimed: plan.claimed,
            lower_bound,
            required_samples,
            claim_consistent: win_rate >= lower_bound,
        };
        info!(%report, "verification done");
        Ok(report)
    }
}

/// Runs setup, evaluation and an independent audit end to end.
pub fn run_protocol(
    config: &ProtocolConfig,
    provider_backend: Box<dyn CommitmentBackend>,
    auditor_backend: Box<dyn CommitmentBackend>,
    beacon: Arc<dyn RandomnessBeacon>,
    board: Arc<dyn BulletinBoard>,
) -> Result<AuditReport> {
    let sample_count = config.sample_count().phase(Phase::Setup)?;
    let cancel = CancelToken::new();

    let mut provider = Provider::new(
        config.clone(),
        provider_backend,
        Arc::clone(&beacon),
        Arc::clone(&board),
    );
    provider.setup()?;
    provider.eval(sample_count, &cancel)?;

    let mut auditor = Auditor::new(config.clone(), auditor_backend, beacon, board);
    auditor.verify(sample_count, &cancel)
}
