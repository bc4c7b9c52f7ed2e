//! Publicly auditable loot-box drop rates.
//!
//! A provider commits to a hidden polynomial, evaluates it at points drawn
//! from a public randomness beacon and publishes one proof per point. An
//! auditor recomputes the points, checks every proof against the commitment
//! and compares the observed win rate with the claimed one.

pub mod backend;
pub mod beacon;
pub mod bulletin;
pub mod config;
pub mod encoding;
pub mod error;
pub mod external;
pub mod field;
pub mod kzg;
pub mod mapper;
pub mod outcome;
pub mod planner;
pub mod polynomial;
pub mod pool;
pub mod protocol;

pub use backend::{
    BackendKind, CommitmentBackend, EvaluationRecord, FunctionSpec, KzgBackend, ProofHandle,
    PublicParams,
};
pub use beacon::{Contribution, FakeBeacon, LocalBeacon, RandomnessBeacon, derive_seed};
pub use bulletin::{BulletinBoard, DirectoryBoard, MemoryBoard};
pub use config::ProtocolConfig;
pub use error::{Error, Phase, Result};
pub use external::{ExternalProcessBackend, ExternalPrograms, ProgramSpec};
pub use field::FieldElement;
pub use kzg::{Commitment, CommitmentKey, EvaluationProof, ToxicSecret};
pub use mapper::{MappingKind, derive_points, hash_to_field};
pub use outcome::{RarityTable, WinningRule};
pub use planner::{SampleSizePlan, plan};
pub use polynomial::Polynomial;
pub use pool::{CancelToken, WorkerPool, Workload};
pub use protocol::{AuditReport, Auditor, ProtocolPhase, Provider, run_protocol};
