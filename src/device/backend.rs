//! Execution backend selected once per kernel call.

use log::trace;

use super::{DeviceBuffer, ProcessingUnit, Residency};
use crate::error::{WfError, WfResult};

/// Execution strategy of a kernel.
///
/// Whichever variant runs, the caller observes the same post-condition: the
/// scratch result is in host memory and no device memory is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Host,
    Device,
}

impl Backend {
    /// Select the backend for `pu`.
    ///
    /// Fails with [`WfError::AcceleratorUnavailable`] when the accelerator is
    /// requested but the crate was built without the `accelerator` feature.
    pub fn select(pu: ProcessingUnit) -> WfResult<Self> {
        match pu {
            ProcessingUnit::Cpu => Ok(Backend::Host),
            ProcessingUnit::Accelerator => {
                if cfg!(feature = "accelerator") {
                    Ok(Backend::Device)
                } else {
                    Err(WfError::AcceleratorUnavailable)
                }
            }
        }
    }

    /// Memory space the kernels of this backend operate on.
    pub fn residency(self) -> Residency {
        match self {
            Backend::Host => Residency::Host,
            Backend::Device => Residency::Device,
        }
    }

    /// Run `f` on a scratch region resident on this backend and leave the
    /// result in `host`.
    ///
    /// The device variant allocates the scratch on the device, runs `f`
    /// there, copies the result back and frees the device scratch before
    /// returning.
    pub fn stage_scratch<F>(self, host: &mut [f64], f: F)
    where
        F: FnOnce(&mut [f64]),
    {
        match self {
            Backend::Host => f(host),
            Backend::Device => {
                let mut dev = DeviceBuffer::<f64>::zeros(host.len());
                f(dev.as_mut_slice());
                dev.copy_to_host(host);
                trace!("staged {} doubles from device scratch", host.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::live_allocations;

    #[test]
    fn test_select_cpu() {
        assert_eq!(Backend::select(ProcessingUnit::Cpu).unwrap(), Backend::Host);
        assert_eq!(Backend::Host.residency(), Residency::Host);
    }

    #[cfg(feature = "accelerator")]
    #[test]
    fn test_select_accelerator() {
        let backend = Backend::select(ProcessingUnit::Accelerator).unwrap();
        assert_eq!(backend, Backend::Device);
        assert_eq!(backend.residency(), ProcessingUnit::Accelerator.residency());
    }

    #[cfg(not(feature = "accelerator"))]
    #[test]
    fn test_select_accelerator_unavailable() {
        assert!(matches!(
            Backend::select(ProcessingUnit::Accelerator),
            Err(WfError::AcceleratorUnavailable)
        ));
    }

    #[test]
    fn test_device_staging_releases_memory() {
        let before = live_allocations();
        let mut host = vec![0.0; 3];
        Backend::Device.stage_scratch(&mut host, |dev| {
            assert_eq!(live_allocations(), before + 1);
            dev.copy_from_slice(&[1.0, 2.0, 3.0]);
        });
        assert_eq!(host, vec![1.0, 2.0, 3.0]);
        assert_eq!(live_allocations(), before);
    }

    #[test]
    fn test_host_staging_writes_in_place() {
        let mut host = vec![0.0; 2];
        Backend::Host.stage_scratch(&mut host, |buf| buf[1] = 5.0);
        assert_eq!(host, vec![0.0, 5.0]);
    }
}
