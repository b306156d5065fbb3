//! Basis transformation of wave functions.
//!
//! The change-of-basis matrix is replicated on every rank and acts on the
//! column (wave-function) index, which is never distributed. Every rank
//! therefore multiplies its own row block by the full matrix and no
//! communication is needed.

use log::debug;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};
use num_complex::Complex64;
use rayon::prelude::*;

use super::WaveFunctions;
use crate::device::{Backend, Residency};
use crate::error::{WfError, WfResult};
use crate::storage::CoeffSlab;

impl WaveFunctions {
    /// Set the first `n` wave functions to `src[:, 0..nwf] * mtrx[0..nwf, 0..n]`.
    ///
    /// Applied to the plane-wave part and, in full-potential mode, to the
    /// muffin-tin part.
    ///
    /// # Panics
    /// If `src` is not compatible with `self`, or the sizes do not fit.
    pub fn transform_from(
        &mut self,
        src: &WaveFunctions,
        nwf: usize,
        mtrx: &DMatrix<Complex64>,
        n: usize,
    ) -> WfResult<()> {
        self.check_transform(src, nwf, mtrx.shape(), n);
        let backend = Backend::select(self.processing_unit())?;
        let residency = backend.residency();
        debug!("complex transform of {} -> {} wave functions on {:?}", nwf, n, backend);

        let mtrx = mtrx.view((0, 0), (nwf, n));
        transform_slab(src.pw_coeffs(), self.pw_coeffs_mut(), nwf, &mtrx, n, residency);
        if let (Some(src_mt), Some(mt)) = (src.mt_coeffs(), self.mt_coeffs_mut()) {
            transform_slab(src_mt, mt, nwf, &mtrx, n, residency);
        }
        Ok(())
    }

    /// Real change-of-basis matrix variant of [`WaveFunctions::transform_from`].
    ///
    /// The interleaved complex coefficients are multiplied as a real array
    /// with twice the rows, which applies `mtrx` to the real and imaginary
    /// channels independently. Not available for full-potential wave
    /// functions: the muffin-tin layout has no such doubling and the call
    /// fails with [`WfError::NotImplemented`] before touching any data.
    pub fn transform_from_real(
        &mut self,
        src: &WaveFunctions,
        nwf: usize,
        mtrx: &DMatrix<f64>,
        n: usize,
    ) -> WfResult<()> {
        self.check_transform(src, nwf, mtrx.shape(), n);
        if self.full_potential() {
            return Err(WfError::NotImplemented(
                "real change-of-basis transform of full-potential wave functions",
            ));
        }
        let backend = Backend::select(self.processing_unit())?;
        let residency = backend.residency();
        debug!("real transform of {} -> {} wave functions on {:?}", nwf, n, backend);

        let rows2 = 2 * src.pw_coeffs().num_rows_loc();
        let mtrx = mtrx.view((0, 0), (nwf, n));
        let a = &src.pw_coeffs().real_view(residency)[..rows2 * nwf];
        let out = &mut self.pw_coeffs_mut().real_view_mut(residency)[..rows2 * n];
        for_each_column_block(out, rows2, |j0, block| {
            let ncols = block.len() / rows2;
            let a = DMatrixView::from_slice(a, rows2, nwf);
            let mut c = DMatrixViewMut::from_slice(block, rows2, ncols);
            c.gemm(1.0, &a, &mtrx.columns(j0, ncols), 0.0);
        });
        Ok(())
    }

    fn check_transform(&self, src: &WaveFunctions, nwf: usize, shape: (usize, usize), n: usize) {
        self.assert_compatible(src);
        assert!(nwf <= src.num_wf(), "basis size {} exceeds {} source wave functions", nwf, src.num_wf());
        assert!(n <= self.num_wf(), "{} output wave functions exceed {} columns", n, self.num_wf());
        assert!(
            shape.0 >= nwf && shape.1 >= n,
            "change-of-basis matrix {:?} is smaller than {}x{}",
            shape,
            nwf,
            n
        );
    }
}

fn transform_slab(
    src: &CoeffSlab,
    dst: &mut CoeffSlab,
    nwf: usize,
    mtrx: &DMatrixView<Complex64>,
    n: usize,
    residency: Residency,
) {
    let rows = src.num_rows_loc();
    let a = src.columns_in(residency, 0, nwf);
    let out = dst.columns_in_mut(residency, 0, n);
    for_each_column_block(out, rows, |j0, block| {
        let ncols = block.len() / rows;
        let a = DMatrixView::from_slice(a, rows, nwf);
        let mut c = DMatrixViewMut::from_slice(block, rows, ncols);
        c.gemm(Complex64::new(1.0, 0.0), &a, &mtrx.columns(j0, ncols), Complex64::new(0.0, 0.0));
    });
}

/// Split a column-major buffer with `rows` rows into blocks of whole columns
/// and run `f(first_column, block)` on the blocks in parallel.
fn for_each_column_block<T, F>(out: &mut [T], rows: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if rows == 0 || out.is_empty() {
        return;
    }
    let ncols = out.len() / rows;
    let cols_per_block = ncols.div_ceil(rayon::current_num_threads()).max(1);
    out.par_chunks_mut(rows * cols_per_block)
        .enumerate()
        .for_each(|(k, block)| f(k * cols_per_block, block));
}
