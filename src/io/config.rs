//! YAML run configuration.
//!
//! ```yaml
//! num_ranks: 4
//! num_gvec: 2000
//! num_wf: 64
//! basis_size: 48
//! processing_unit: cpu
//! full_potential:
//!   atom_sizes: [25, 25, 16]
//! seed: 42
//! print_checksum: true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::ProcessingUnit;
use crate::distribution::BlockDistribution;
use crate::error::{WfError, WfResult};

/// Muffin-tin part of a full-potential run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MuffinTinConfig {
    /// Muffin-tin basis size of every atom
    pub atom_sizes: Vec<usize>,
}

/// Parameters of a run of the kernel driver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of ranks
    #[serde(default = "default_num_ranks")]
    pub num_ranks: usize,
    /// Number of plane-wave coefficients per wave function
    pub num_gvec: usize,
    /// Number of wave functions
    pub num_wf: usize,
    /// Number of source wave functions combined by the transform
    pub basis_size: usize,
    #[serde(default)]
    pub processing_unit: ProcessingUnit,
    /// Present for full-potential runs
    #[serde(default)]
    pub full_potential: Option<MuffinTinConfig>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub print_checksum: bool,
}

fn default_num_ranks() -> usize {
    1
}

impl RunConfig {
    pub fn from_yaml_str(text: &str) -> WfResult<Self> {
        let config: RunConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no run can satisfy.
    pub fn validate(&self) -> WfResult<()> {
        if self.num_ranks == 0 {
            return Err(WfError::Invalid("num_ranks must be positive".into()));
        }
        if self.num_wf == 0 {
            return Err(WfError::Invalid("num_wf must be positive".into()));
        }
        if self.basis_size == 0 || self.basis_size > self.num_wf {
            return Err(WfError::Invalid(format!(
                "basis_size {} must be in 1..={}",
                self.basis_size, self.num_wf
            )));
        }
        if let Some(mt) = &self.full_potential {
            if mt.atom_sizes.is_empty() {
                return Err(WfError::Invalid("full_potential needs at least one atom".into()));
            }
        }
        Ok(())
    }

    pub fn pw_distribution(&self) -> BlockDistribution {
        BlockDistribution::new(self.num_gvec, self.num_ranks)
    }

    pub fn mt_distribution(&self) -> Option<BlockDistribution> {
        self.full_potential
            .as_ref()
            .map(|mt| BlockDistribution::from_atom_partition(&mt.atom_sizes, self.num_ranks))
    }
}

/// Read and validate a YAML run configuration.
pub fn read_run_config<P: AsRef<Path>>(path: P) -> WfResult<RunConfig> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let config: RunConfig = serde_yaml::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}
