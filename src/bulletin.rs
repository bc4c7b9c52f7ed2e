//! Publish-once storage for a run's public data.
//!
//! Only the provider writes; auditors only read. Each entry is written
//! exactly once and in a single step, so a reader either sees the whole
//! entry or nothing.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{BackendKind, EvaluationRecord, ProofHandle, PublicParams};
use crate::error::{Error, Result};
use crate::field::FieldElement;
use crate::kzg::{Commitment, CommitmentKey};
use crate::encoding::RECORD_SEPARATOR;

pub const BACKEND_ENTRY: &str = "backend.txt";
pub const COMMITMENT_ENTRY: &str = "commitment.txt";
pub const KEY_ENTRY: &str = "commitment_key.txt";
pub const RULE_ENTRY: &str = "winning_rule.json";
pub const CONTRIBUTION_ENTRY: &str = "contribution.json";
pub const RECORDS_ENTRY: &str = "evaluation_proofs.txt";

pub trait BulletinBoard: Send + Sync {
    /// Fails with [`Error::AlreadyPublished`] if `entry` exists.
    fn publish(&self, entry: &str, contents: &str) -> Result<()>;

    /// Fails with [`Error::NotPublished`] if `entry` does not exist.
    fn read(&self, entry: &str) -> Result<String>;

    fn contains(&self, entry: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct MemoryBoard {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::Io(io::Error::other("bulletin board lock poisoned"))
}

impl BulletinBoard for MemoryBoard {
    fn publish(&self, entry: &str, contents: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.contains_key(entry) {
            return Err(Error::AlreadyPublished(entry.to_string()));
        }
        entries.insert(entry.to_string(), contents.to_string());
        Ok(())
    }

    fn read(&self, entry: &str) -> Result<String> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        entries
            .get(entry)
            .cloned()
            .ok_or_else(|| Error::NotPublished(entry.to_string()))
    }

    fn contains(&self, entry: &str) -> Result<bool> {
        Ok(self.entries.read().map_err(|_| poisoned())?.contains_key(entry))
    }
}

/// One directory per run, one file per entry.
pub struct DirectoryBoard {
    root: PathBuf,
}

impl DirectoryBoard {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, entry: &str) -> Result<PathBuf> {
        if entry.is_empty() || entry.contains(['/', '\\']) || entry.starts_with('.') {
            return Err(Error::Config(format!("invalid bulletin board entry name {entry:?}")));
        }
        Ok(self.root.join(entry))
    }
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn write_staging(path: &Path, contents: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

impl BulletinBoard for DirectoryBoard {
    fn publish(&self, entry: &str, contents: &str) -> Result<()> {
        let target = self.path(entry)?;
        let staging = self.root.join(format!(
            ".{entry}.{}.{}.partial",
            std::process::id(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        // hard_link refuses an existing target, so the entry appears whole or not at all
        let linked = write_staging(&staging, contents).and_then(|()| fs::hard_link(&staging, &target));
        let _ = fs::remove_file(&staging);
        match linked {
            Ok(()) => {
                debug!(entry, bytes = contents.len(), "published bulletin board entry");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::AlreadyPublished(entry.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, entry: &str) -> Result<String> {
        match fs::read_to_string(self.path(entry)?) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::NotPublished(entry.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, entry: &str) -> Result<bool> {
        Ok(self.path(entry)?.exists())
    }
}

pub fn publish_json<T: Serialize>(board: &dyn BulletinBoard, entry: &str, value: &T) -> Result<()> {
    board.publish(entry, &serde_json::to_string_pretty(value)?)
}

pub fn read_json<T: DeserializeOwned>(board: &dyn BulletinBoard, entry: &str) -> Result<T> {
    Ok(serde_json::from_str(&board.read(entry)?)?)
}

/// Publishes the backend kind, then the commitment (and key, for KZG).
pub fn publish_params(board: &dyn BulletinBoard, params: &PublicParams) -> Result<()> {
    board.publish(BACKEND_ENTRY, &params.kind().to_string())?;
    match params {
        PublicParams::Kzg { key, commitment } => {
            board.publish(KEY_ENTRY, &key.to_text())?;
            board.publish(COMMITMENT_ENTRY, &commitment.to_string())
        }
        PublicParams::External {
            verifying_key,
            function_proof,
        } => board.publish(
            COMMITMENT_ENTRY,
            &format!(
                "{}{RECORD_SEPARATOR}{}",
                verifying_key.display(),
                function_proof.display()
            ),
        ),
    }
}

pub fn read_backend_kind(board: &dyn BulletinBoard) -> Result<BackendKind> {
    board.read(BACKEND_ENTRY)?.parse()
}

pub fn read_params(board: &dyn BulletinBoard) -> Result<PublicParams> {
    let commitment = board.read(COMMITMENT_ENTRY)?;
    match read_backend_kind(board)? {
        BackendKind::Kzg => {
            let key = CommitmentKey::from_text(&board.read(KEY_ENTRY)?)?;
            let commitment: Commitment = commitment.trim().parse()?;
            Ok(PublicParams::Kzg {
                key: key.into(),
                commitment,
            })
        }
        BackendKind::ExternalProcess => {
            let (vk, tft) = commitment
                .trim()
                .split_once(RECORD_SEPARATOR)
                .ok_or_else(|| Error::Decode("external commitment needs <vk>#<tft>".into()))?;
            Ok(PublicParams::External {
                verifying_key: PathBuf::from(vk),
                function_proof: PathBuf::from(tft),
            })
        }
    }
}

/// A record line as the auditor reads it; the point is recomputed locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedEvaluation {
    pub value: FieldElement,
    pub proof: ProofHandle,
}

pub fn encode_records(records: &[EvaluationRecord]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format!("{}{RECORD_SEPARATOR}{}\n", r.value, r.proof));
    }
    out
}

fn record_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|l| !l.trim().is_empty())
}

/// Number of records in a published stream, without decoding any of them.
pub fn count_records(text: &str) -> usize {
    record_lines(text).count()
}

pub fn decode_records(kind: BackendKind, text: &str) -> Result<Vec<PublishedEvaluation>> {
    record_lines(text)
        .enumerate()
        .map(|(i, line)| {
            let (value, proof) = line.trim().split_once(RECORD_SEPARATOR).ok_or_else(|| {
                Error::Decode(format!("record {i} has no '{RECORD_SEPARATOR}' separator"))
            })?;
            Ok(PublishedEvaluation {
                value: value.parse()?,
                proof: ProofHandle::decode(kind, proof)?,
            })
        })
        .collect()
}

/// Publishes the full record stream as one entry.
pub fn publish_records(board: &dyn BulletinBoard, records: &[EvaluationRecord]) -> Result<()> {
    board.publish(RECORDS_ENTRY, &encode_records(records))
}

pub fn read_records(board: &dyn BulletinBoard, kind: BackendKind) -> Result<Vec<PublishedEvaluation>> {
    decode_records(kind, &board.read(RECORDS_ENTRY)?)
}
