use std::fmt;

use thiserror::Error;

/// Protocol phase an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Eval,
    Publish,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Eval => "eval",
            Phase::Publish => "publish",
            Phase::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid degree: {0}")]
    InvalidDegree(String),

    #[error("setup degree {requested} exceeds backend ceiling {ceiling}")]
    DegreeTooLarge { requested: usize, ceiling: usize },

    #[error("malformed commitment key: {0}")]
    MalformedKey(String),

    #[error("polynomial degree {degree} exceeds key max degree {max_degree}")]
    DegreeExceedsKey { degree: usize, max_degree: usize },

    #[error("zero has no multiplicative inverse")]
    NotInvertible,

    #[error("published {published} evaluation records but recomputed {expected} points")]
    CardinalityMismatch { published: usize, expected: usize },

    #[error("pairing check failed at indices {indices:?}")]
    PairingVerificationFailure { indices: Vec<usize> },

    #[error("assumed probability {p1} must be strictly below claimed probability {p0}")]
    InvalidProbabilityRange { p0: f64, p1: f64 },

    #[error("probability {0} outside the open interval (0, 1)")]
    InvalidProbability(f64),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend mismatch: expected {expected}, found {found}")]
    BackendMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("bulletin board entry {0} is already published")]
    AlreadyPublished(String),

    #[error("bulletin board entry {0} is not published")]
    NotPublished(String),

    #[error("operation requires phase {expected}, protocol is in {actual}")]
    InvalidPhase { expected: String, actual: String },

    #[error("batch cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{phase} phase failed: {source}")]
    InPhase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attaches the phase the error surfaced in. Already-attributed errors keep
    /// their innermost phase.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Error::InPhase { .. } => self,
            other => Error::InPhase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with any phase context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::InPhase { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::InPhase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extension used by the orchestrator to tag results with their phase.
pub(crate) trait PhaseContext<T> {
    fn phase(self, phase: Phase) -> Result<T>;
}

impl<T> PhaseContext<T> for Result<T> {
    fn phase(self, phase: Phase) -> Result<T> {
        self.map_err(|e| e.in_phase(phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_context_is_not_nested() {
        let err = Error::NotInvertible
            .in_phase(Phase::Eval)
            .in_phase(Phase::Publish);
        assert_eq!(err.phase(), Some(Phase::Eval));
        assert!(matches!(err.root(), Error::NotInvertible));
        assert_eq!(
            err.to_string(),
            "eval phase failed: zero has no multiplicative inverse"
        );
    }
}
