//! Device module - processing units, memory residency and the accelerator
//! memory space.

mod buffer;
mod backend;

pub use buffer::{live_allocations, DeviceBuffer};
pub use backend::Backend;

use serde::{Deserialize, Serialize};

/// Where the kernels execute.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingUnit {
    #[default]
    Cpu,
    Accelerator,
}

/// Memory space holding a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Host,
    Device,
}

impl ProcessingUnit {
    /// Memory space the kernels of this processing unit read and write.
    pub fn residency(self) -> Residency {
        match self {
            ProcessingUnit::Cpu => Residency::Host,
            ProcessingUnit::Accelerator => Residency::Device,
        }
    }
}
