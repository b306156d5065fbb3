//! Rust WFC - distributed wave-function containers and their linear-algebra
//! kernels for plane-wave and full-potential electronic-structure codes.
//!
//! A set of wave functions is stored as the local row blocks of a plane-wave
//! coefficient array and, in full-potential mode, a muffin-tin coefficient
//! array. The two kernels acting on it are the basis transformation
//! (communication free) and the inner product (all-reduce over ranks).

pub mod comm;
pub mod device;
pub mod diagnostics;
pub mod distribution;
pub mod error;
pub mod io;
pub mod kernels;
pub mod storage;
pub mod wavefunction;

// Re-export commonly used types at crate root
pub use comm::{Communicator, SerialComm, ThreadComm};
#[cfg(feature = "mpi")]
pub use comm::MpiComm;
pub use device::{Backend, DeviceBuffer, ProcessingUnit, Residency};
pub use diagnostics::{report_checksum, Checksum};
pub use distribution::BlockDistribution;
pub use error::{WfError, WfResult};
pub use io::{read_run_config, MuffinTinConfig, RunConfig};
pub use kernels::{InnerProduct, InnerScratch};
pub use storage::CoeffSlab;
pub use wavefunction::WaveFunctions;
