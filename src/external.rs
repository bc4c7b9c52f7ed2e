//! Backend that delegates to external prover/verifier programs.
//!
//! Three programs exchange data through files:
//!
//! * `commit <vk> <tft>` writes the verifying key and function proof,
//! * `open <proof> <a> <b>` writes a proof and prints `Win!` on a win,
//! * `verify <proof> <vk> <tft> <a> <b> <y>` prints `Verify Success!`.
//!
//! `a` and `b` are the low two 3-bit groups of the evaluation point.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendKind, CommitmentBackend, FunctionSpec, ProofHandle, PublicParams, mismatch};
use crate::error::{Error, Result};
use crate::field::{FIELD_BYTES, FieldElement};
use crate::pool::Workload;

pub const WIN_TOKEN: &str = "Win!";
pub const VERIFY_SUCCESS_TOKEN: &str = "Verify Success!";

/// A program plus the leading arguments it is always called with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProgramSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    // Run to completion, returning trimmed stdout
    fn run(&self, extra: &[String]) -> Result<String> {
        debug!(program = %self.program.display(), ?extra, "invoking external backend");
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(extra)
            .output()
            .map_err(|e| Error::Backend(format!("cannot run {}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(Error::Backend(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPrograms {
    pub commit: ProgramSpec,
    pub open: ProgramSpec,
    pub verify: ProgramSpec,
}

pub struct ExternalProcessBackend {
    programs: ExternalPrograms,
    work_dir: PathBuf,
    committed: bool,
}

/// The two 3-bit inputs the external circuit takes.
pub fn circuit_inputs(point: &FieldElement) -> (u8, u8) {
    let low = point.to_bytes_be()[FIELD_BYTES - 1];
    (low & 0b111, (low >> 3) & 0b111)
}

impl ExternalProcessBackend {
    pub fn new(programs: ExternalPrograms, work_dir: impl AsRef<Path>) -> Self {
        Self {
            programs,
            work_dir: work_dir.as_ref().to_path_buf(),
            committed: false,
        }
    }

    fn proof_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!("proof{index}.bin"))
    }
}

impl CommitmentBackend for ExternalProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalProcess
    }

    fn workload(&self) -> Workload {
        Workload::ProcessBound
    }

    fn setup(&mut self, function: &FunctionSpec) -> Result<PublicParams> {
        if self.committed {
            return Err(Error::Backend("a function is already committed".into()));
        }
        // the committed circuit is fixed inside the external program
        debug!(?function, "external backend commits its built-in circuit");
        std::fs::create_dir_all(&self.work_dir)?;
        let verifying_key = self.work_dir.join("vk.bin");
        let function_proof = self.work_dir.join("tft.bin");
        self.programs.commit.run(&[
            verifying_key.display().to_string(),
            function_proof.display().to_string(),
        ])?;
        self.committed = true;
        Ok(PublicParams::External {
            verifying_key,
            function_proof,
        })
    }

    fn open(&self, index: usize, point: &FieldElement) -> Result<(FieldElement, ProofHandle)> {
        if !self.committed {
            return Err(Error::Backend("no committed function to open".into()));
        }
        let (a, b) = circuit_inputs(point);
        let proof = self.proof_path(index);
        let stdout = self
            .programs
            .open
            .run(&[proof.display().to_string(), a.to_string(), b.to_string()])?;
        let value = if stdout == WIN_TOKEN {
            FieldElement::ONE
        } else {
            FieldElement::ZERO
        };
        Ok((value, ProofHandle::File(proof)))
    }

    fn verify(
        &self,
        params: &PublicParams,
        point: &FieldElement,
        value: &FieldElement,
        proof: &ProofHandle,
    ) -> Result<bool> {
        let (verifying_key, function_proof) = match params {
            PublicParams::External {
                verifying_key,
                function_proof,
            } => (verifying_key, function_proof),
            other => return Err(mismatch(BackendKind::ExternalProcess, other.kind())),
        };
        let proof = match proof {
            ProofHandle::File(path) => path,
            other => return Err(mismatch(BackendKind::ExternalProcess, other.kind())),
        };

        let (a, b) = circuit_inputs(point);
        let stdout = self.programs.verify.run(&[
            proof.display().to_string(),
            verifying_key.display().to_string(),
            function_proof.display().to_string(),
            a.to_string(),
            b.to_string(),
            value.to_string(),
        ])?;
        if stdout != VERIFY_SUCCESS_TOKEN {
            warn!(proof = %proof.display(), output = %stdout, "external verifier rejected proof");
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProgramSpec {
        // `sh -c script name args...` binds the appended args to $1..
        ProgramSpec::new("sh").with_args(["-c", script, "backend"])
    }

    fn scripted(dir: &Path) -> ExternalProcessBackend {
        let programs = ExternalPrograms {
            commit: sh(r#"touch "$1" "$2""#),
            open: sh(r#"touch "$1"; if [ "$2" = "$3" ]; then echo 'Win!'; else echo 'Lose'; fi"#),
            verify: sh(r#"if [ -f "$1" ] && [ "$6" = "$( [ "$4" = "$5" ] && echo 1 || echo 0 )" ]; then echo 'Verify Success!'; else echo 'Verify Failed!'; fi"#),
        };
        ExternalProcessBackend::new(programs, dir)
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lootbox-external-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn circuit_inputs_take_low_bits() {
        // 0b101_011 -> a = 0b011, b = 0b101
        assert_eq!(circuit_inputs(&FieldElement::from(0b101_011)), (3, 5));
        assert_eq!(circuit_inputs(&FieldElement::from(256 + 9)), (1, 1));
    }

    #[test]
    fn scripted_round_trip() {
        let dir = temp_dir("round-trip");
        let mut backend = scripted(&dir);
        let params = backend.setup(&FunctionSpec::default()).unwrap();

        // a == b wins
        let winning = FieldElement::from(0b010_010);
        let (value, proof) = backend.open(0, &winning).unwrap();
        assert_eq!(value, FieldElement::ONE);
        assert!(backend.verify(&params, &winning, &value, &proof).unwrap());

        let losing = FieldElement::from(0b001_010);
        let (value, proof) = backend.open(1, &losing).unwrap();
        assert_eq!(value, FieldElement::ZERO);
        assert!(backend.verify(&params, &losing, &value, &proof).unwrap());
        // claiming a win for a losing draw is rejected, not an error
        assert!(!backend.verify(&params, &losing, &FieldElement::ONE, &proof).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failing_program_is_a_backend_error() {
        let dir = temp_dir("failing");
        let mut backend = ExternalProcessBackend::new(
            ExternalPrograms {
                commit: sh("exit 3"),
                open: sh("exit 0"),
                verify: sh("exit 0"),
            },
            &dir,
        );
        assert!(matches!(
            backend.setup(&FunctionSpec::default()),
            Err(Error::Backend(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_program_is_a_backend_error() {
        let programs = ExternalPrograms {
            commit: ProgramSpec::new("/nonexistent/commit_function"),
            open: ProgramSpec::new("/nonexistent/make_proof"),
            verify: ProgramSpec::new("/nonexistent/verify"),
        };
        let mut backend = ExternalProcessBackend::new(programs, temp_dir("missing"));
        assert!(matches!(
            backend.setup(&FunctionSpec::default()),
            Err(Error::Backend(_))
        ));
    }
}
