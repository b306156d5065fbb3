//! Accelerator memory.
//!
//! A [`DeviceBuffer`] lives in the accelerator memory space. Data only moves
//! between host and device through the explicit `copy_*` calls. The in-tree
//! runtime backs device allocations with separate host allocations; pinned
//! memory and streams belong to the vendor runtime.

use std::cell::Cell;

thread_local! {
    static LIVE: Cell<usize> = const { Cell::new(0) };
}

/// Number of device buffers allocated by the current thread and not yet freed.
pub fn live_allocations() -> usize {
    LIVE.with(|c| c.get())
}

/// Buffer resident in accelerator memory.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    data: Vec<T>,
}

impl<T: Copy + Default> DeviceBuffer<T> {
    /// Allocate `len` zero-initialized elements on the device.
    pub fn zeros(len: usize) -> Self {
        LIVE.with(|c| c.set(c.get() + 1));
        Self {
            data: vec![T::default(); len],
        }
    }

    /// Allocate a device buffer holding a copy of `host`.
    pub fn from_host(host: &[T]) -> Self {
        let mut buf = Self::zeros(host.len());
        buf.copy_from_host(host);
        buf
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Host to device transfer of `host.len()` elements to the start of the buffer.
    ///
    /// # Panics
    /// If `host` is longer than the buffer.
    pub fn copy_from_host(&mut self, host: &[T]) {
        self.check_transfer(host.len());
        self.data[..host.len()].copy_from_slice(host);
    }

    /// Device to host transfer of the first `host.len()` elements.
    ///
    /// # Panics
    /// If `host` is longer than the buffer.
    pub fn copy_to_host(&self, host: &mut [T]) {
        self.check_transfer(host.len());
        host.copy_from_slice(&self.data[..host.len()]);
    }

    fn check_transfer(&self, count: usize) {
        assert!(
            count <= self.len(),
            "transfer of {} elements exceeds a device buffer of {}",
            count,
            self.len()
        );
    }

    pub fn as_ptr(&self) -> *const T {
        self.data.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_mut_ptr()
    }

    /// Device-side view used by the accelerator kernels.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        LIVE.with(|c| c.set(c.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_transfer() {
        let host = vec![1.0, 2.0, 3.0, 4.0];
        let dev = DeviceBuffer::from_host(&host);
        let mut back = vec![0.0; 4];
        dev.copy_to_host(&mut back);
        assert_eq!(back, host);
    }

    #[test]
    fn test_partial_copy_to_host() {
        let dev = DeviceBuffer::from_host(&[5.0, 6.0, 7.0]);
        let mut back = vec![0.0; 2];
        dev.copy_to_host(&mut back);
        assert_eq!(back, vec![5.0, 6.0]);
    }

    #[test]
    fn test_empty_buffer() {
        let dev = DeviceBuffer::<f64>::zeros(0);
        assert!(dev.is_empty());
        dev.copy_to_host(&mut []);
        assert_eq!(DeviceBuffer::from_host(&[1.0, 2.0]).len(), 2);
    }

    #[test]
    #[should_panic(expected = "exceeds a device buffer of 2")]
    fn test_oversized_transfer_panics() {
        let mut dev = DeviceBuffer::<f64>::zeros(2);
        dev.copy_from_host(&[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_allocation_tracking() {
        let before = live_allocations();
        {
            let _a = DeviceBuffer::<f64>::zeros(8);
            let _b = DeviceBuffer::<f64>::zeros(2);
            assert_eq!(live_allocations(), before + 2);
        }
        assert_eq!(live_allocations(), before);
    }
}
