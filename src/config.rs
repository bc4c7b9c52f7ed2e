use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::FunctionSpec;
use crate::error::{Error, Result};
use crate::kzg::MAX_SETUP_DEGREE;
use crate::mapper::MappingKind;
use crate::outcome::WinningRule;
use crate::planner::SampleSizePlan;

/// Beacon stages between a contribution and the randomness used for it.
pub const DEFAULT_STAGE_OFFSET: u64 = 5;

pub const DEFAULT_MAX_SUPPORTED_DEGREE: usize = 1024;

/// Parameters shared by the provider and every auditor of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub function: FunctionSpec,
    pub max_supported_degree: usize,
    pub mapping: MappingKind,
    pub winning: WinningRule,
    pub plan: SampleSizePlan,
    /// Overrides the plan's required sample count.
    pub sample_count: Option<usize>,
    pub workers: Option<usize>,
    pub stage_offset: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            function: FunctionSpec::default(),
            max_supported_degree: DEFAULT_MAX_SUPPORTED_DEGREE,
            mapping: MappingKind::Direct,
            winning: WinningRule::Modulo { modulus: 2 },
            plan: SampleSizePlan::new(0.5, 0.3),
            sample_count: None,
            workers: None,
            stage_offset: DEFAULT_STAGE_OFFSET,
        }
    }
}

impl ProtocolConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_supported_degree > MAX_SETUP_DEGREE {
            return Err(Error::Config(format!(
                "max_supported_degree {} exceeds {MAX_SETUP_DEGREE}",
                self.max_supported_degree
            )));
        }
        let degree = self.function.degree()?;
        if degree > self.max_supported_degree {
            return Err(Error::DegreeTooLarge {
                requested: degree,
                ceiling: self.max_supported_degree,
            });
        }
        self.plan.validate()?;
        self.winning.validate()?;
        if self.workers == Some(0) {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Explicit `sample_count`, else the plan's required n.
    pub fn sample_count(&self) -> Result<usize> {
        match self.sample_count {
            Some(n) => Ok(n),
            None => self.plan.required_samples(),
        }
    }
}
