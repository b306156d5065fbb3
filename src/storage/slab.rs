//! Local block of a distributed coefficient array.
//!
//! Rows are the basis functions of one representation owned by this rank,
//! columns are wave functions. Storage is column-major, so the columns
//! `i0..i0 + n` form one contiguous run of `num_rows_loc * n` elements.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::device::{DeviceBuffer, Residency};

/// Coefficients of one representation on one rank, with an optional mirror
/// in accelerator memory.
#[derive(Debug)]
pub struct CoeffSlab {
    host: DMatrix<Complex64>,
    device: Option<DeviceBuffer<Complex64>>,
}

impl CoeffSlab {
    /// Zeroed slab of `num_rows_loc x num_cols` in host memory.
    pub fn new(num_rows_loc: usize, num_cols: usize) -> Self {
        Self {
            host: DMatrix::zeros(num_rows_loc, num_cols),
            device: None,
        }
    }

    pub fn num_rows_loc(&self) -> usize {
        self.host.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.host.ncols()
    }

    pub fn host(&self) -> &DMatrix<Complex64> {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut DMatrix<Complex64> {
        &mut self.host
    }

    /// Host columns `i0..i0 + n` as one contiguous column-major slice.
    pub fn columns(&self, i0: usize, n: usize) -> &[Complex64] {
        self.columns_in(Residency::Host, i0, n)
    }

    /// Mutable host columns `i0..i0 + n`, used by producers for bulk writes.
    pub fn columns_mut(&mut self, i0: usize, n: usize) -> &mut [Complex64] {
        self.columns_in_mut(Residency::Host, i0, n)
    }

    /// Columns `i0..i0 + n` of the buffer in `residency`.
    pub fn columns_in(&self, residency: Residency, i0: usize, n: usize) -> &[Complex64] {
        let range = self.column_range(i0, n);
        &self.as_slice(residency)[range]
    }

    pub fn columns_in_mut(&mut self, residency: Residency, i0: usize, n: usize) -> &mut [Complex64] {
        let range = self.column_range(i0, n);
        &mut self.as_mut_slice(residency)[range]
    }

    fn column_range(&self, i0: usize, n: usize) -> std::ops::Range<usize> {
        assert!(
            i0 + n <= self.num_cols(),
            "column window {}..{} exceeds {} columns",
            i0,
            i0 + n,
            self.num_cols()
        );
        let rows = self.num_rows_loc();
        rows * i0..rows * (i0 + n)
    }

    /// Whole local buffer in `residency`.
    ///
    /// # Panics
    /// If `residency` is [`Residency::Device`] and no device buffer was
    /// allocated with [`CoeffSlab::allocate_on_device`].
    pub fn as_slice(&self, residency: Residency) -> &[Complex64] {
        match residency {
            Residency::Host => self.host.as_slice(),
            Residency::Device => self.device_buffer().as_slice(),
        }
    }

    pub fn as_mut_slice(&mut self, residency: Residency) -> &mut [Complex64] {
        match residency {
            Residency::Host => self.host.as_mut_slice(),
            Residency::Device => self.device_buffer_mut().as_mut_slice(),
        }
    }

    /// Raw pointer to the start of the local storage in `residency`.
    pub fn raw_ptr(&self, residency: Residency) -> *const Complex64 {
        match residency {
            Residency::Host => self.host.as_ptr(),
            Residency::Device => self.device_buffer().as_ptr(),
        }
    }

    pub fn raw_mut_ptr(&mut self, residency: Residency) -> *mut Complex64 {
        match residency {
            Residency::Host => self.host.as_mut_ptr(),
            Residency::Device => self.device_buffer_mut().as_mut_ptr(),
        }
    }

    /// Interleaved real view of the buffer in `residency`.
    ///
    /// Element `(r, j)` of the complex slab becomes rows `2r` (real part) and
    /// `2r + 1` (imaginary part) of a real column of length `2 * num_rows_loc`.
    pub fn real_view(&self, residency: Residency) -> &[f64] {
        bytemuck::cast_slice(self.as_slice(residency))
    }

    pub fn real_view_mut(&mut self, residency: Residency) -> &mut [f64] {
        bytemuck::cast_slice_mut(self.as_mut_slice(residency))
    }

    fn device_buffer(&self) -> &DeviceBuffer<Complex64> {
        self.device
            .as_ref()
            .expect("device buffer is not allocated; call allocate_on_device first")
    }

    fn device_buffer_mut(&mut self) -> &mut DeviceBuffer<Complex64> {
        self.device
            .as_mut()
            .expect("device buffer is not allocated; call allocate_on_device first")
    }

    /// Ensure a device mirror of the slab exists. Contents are not copied.
    pub fn allocate_on_device(&mut self) {
        if self.device.is_none() {
            self.device = Some(DeviceBuffer::zeros(self.host.len()));
        }
        debug_assert_eq!(self.device_buffer().len(), self.host.len());
    }

    pub fn deallocate_on_device(&mut self) {
        self.device = None;
    }

    pub fn on_device(&self) -> bool {
        self.device.is_some()
    }

    /// Host to device transfer of the whole slab.
    pub fn copy_to_device(&mut self) {
        let host = self.host.as_slice();
        self.device
            .as_mut()
            .expect("device buffer is not allocated; call allocate_on_device first")
            .copy_from_host(host);
    }

    /// Device to host transfer of the whole slab.
    pub fn copy_to_host(&mut self) {
        let host = self.host.as_mut_slice();
        self.device
            .as_ref()
            .expect("device buffer is not allocated; call allocate_on_device first")
            .copy_to_host(host);
    }

    /// Copy `n` columns starting at `i0` into `dst` starting at column `j0`,
    /// within one memory space.
    ///
    /// # Panics
    /// If the local row counts differ or either window is out of range.
    pub fn copy_window(&self, dst: &mut CoeffSlab, i0: usize, n: usize, j0: usize, residency: Residency) {
        assert_eq!(
            self.num_rows_loc(),
            dst.num_rows_loc(),
            "copy between slabs with different local row counts"
        );
        let src = self.columns_in(residency, i0, n);
        dst.columns_in_mut(residency, j0, n).copy_from_slice(src);
    }

    /// Sum of all local host elements.
    pub fn checksum(&self) -> Complex64 {
        self.host.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(rows: usize, cols: usize) -> CoeffSlab {
        let mut slab = CoeffSlab::new(rows, cols);
        for j in 0..cols {
            for r in 0..rows {
                slab.host_mut()[(r, j)] = Complex64::new(r as f64, j as f64);
            }
        }
        slab
    }

    #[test]
    fn test_shape() {
        let slab = CoeffSlab::new(7, 3);
        assert_eq!(slab.num_rows_loc(), 7);
        assert_eq!(slab.num_cols(), 3);
        assert_eq!(slab.as_slice(Residency::Host).len(), 21);
    }

    #[test]
    fn test_columns_are_contiguous() {
        let slab = filled(3, 4);
        let cols = slab.columns(1, 2);
        assert_eq!(cols.len(), 6);
        assert_eq!(cols[0], Complex64::new(0.0, 1.0));
        assert_eq!(cols[3], Complex64::new(0.0, 2.0));
        assert_eq!(cols[5], Complex64::new(2.0, 2.0));
    }

    #[test]
    fn test_copy_window_host() {
        let src = filled(4, 5);
        let mut dst = CoeffSlab::new(4, 3);
        src.copy_window(&mut dst, 2, 2, 1, Residency::Host);
        for r in 0..4 {
            assert_eq!(dst.host()[(r, 0)], Complex64::new(0.0, 0.0));
            assert_eq!(dst.host()[(r, 1)], src.host()[(r, 2)]);
            assert_eq!(dst.host()[(r, 2)], src.host()[(r, 3)]);
        }
    }

    #[test]
    fn test_copy_window_device_leaves_host_untouched() {
        let mut src = filled(2, 3);
        src.allocate_on_device();
        src.copy_to_device();
        let mut dst = CoeffSlab::new(2, 3);
        dst.allocate_on_device();
        src.copy_window(&mut dst, 0, 3, 0, Residency::Device);
        assert_eq!(dst.checksum(), Complex64::new(0.0, 0.0));
        dst.copy_to_host();
        assert_eq!(dst.host(), src.host());
    }

    #[test]
    #[should_panic]
    fn test_copy_window_row_mismatch() {
        let src = CoeffSlab::new(3, 2);
        let mut dst = CoeffSlab::new(4, 2);
        src.copy_window(&mut dst, 0, 1, 0, Residency::Host);
    }

    #[test]
    #[should_panic]
    fn test_copy_window_out_of_range() {
        let src = CoeffSlab::new(3, 2);
        let mut dst = CoeffSlab::new(3, 2);
        src.copy_window(&mut dst, 1, 2, 0, Residency::Host);
    }

    #[test]
    #[should_panic]
    fn test_device_pointer_without_allocation() {
        let slab = CoeffSlab::new(3, 2);
        let _ = slab.raw_ptr(Residency::Device);
    }

    #[test]
    fn test_real_view_interleaves() {
        let slab = filled(2, 2);
        let re = slab.real_view(Residency::Host);
        assert_eq!(re.len(), 8);
        // column 1, row 1 = (1, 1)
        assert_eq!(&re[4..8], &[0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_device_pointer_distinct_from_host() {
        let mut slab = filled(2, 2);
        slab.allocate_on_device();
        assert!(slab.on_device());
        assert_ne!(slab.raw_ptr(Residency::Host), slab.raw_ptr(Residency::Device));
        slab.deallocate_on_device();
        assert!(!slab.on_device());
    }

    #[test]
    fn test_checksum() {
        let slab = filled(2, 3);
        // rows 0 + 1 = 1 per column, columns 0 + 1 + 2 = 3 per row
        assert_eq!(slab.checksum(), Complex64::new(3.0, 6.0));
    }
}
