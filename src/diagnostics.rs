//! Checksum reporting for regression runs.

use log::info;
use num_complex::Complex64;

use crate::comm::Communicator;

/// Sum of all elements of a (distributed) array.
pub type Checksum = Complex64;

/// Sum the local checksums of all ranks and print the total on rank 0.
///
/// Every rank must call this; every rank gets the global checksum back.
pub fn report_checksum<C: Communicator + ?Sized>(comm: &C, label: &str, local: Checksum) -> Checksum {
    let mut buf = [local.re, local.im];
    comm.allreduce_sum(&mut buf);
    let total = Complex64::new(buf[0], buf[1]);
    if comm.is_root() {
        info!("checksum({}) : {:.12e} {:.12e}", label, total.re, total.im);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};

    #[test]
    fn test_serial_checksum() {
        let cs = report_checksum(&SerialComm, "psi", Complex64::new(1.5, -2.0));
        assert_eq!(cs, Complex64::new(1.5, -2.0));
    }

    #[test]
    fn test_checksum_is_global() {
        let totals = ThreadComm::run(3, |comm| {
            report_checksum(comm, "psi", Complex64::new(comm.rank() as f64, 1.0))
        });
        for total in totals {
            assert_eq!(total, Complex64::new(3.0, 3.0));
        }
    }
}
