//! Communication module - collective operations across ranks.

mod traits;
mod serial;
mod threaded;
#[cfg(feature = "mpi")]
mod mpi_comm;

pub use traits::Communicator;
pub use serial::SerialComm;
pub use threaded::ThreadComm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
