//! Inner products of distributed wave functions.
//!
//! Computes blocks of the Gram matrix `<bra_i|ket_j>`. Every rank contracts
//! its own rows; the partial blocks are then summed over the communicator.
//!
//! Dispatch:
//! - one rank on the host backend: the GEMM writes straight into the
//!   caller's result block, no scratch and no reduction;
//! - otherwise: the GEMM writes into the [`InnerScratch`] (through a device
//!   scratch on the accelerator backend), the scratch is all-reduced on the
//!   host and its columns are copied into the result block.

use log::trace;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector};
use num_complex::Complex64;

use super::scratch::InnerScratch;
use crate::comm::Communicator;
use crate::device::{Backend, ProcessingUnit, Residency};
use crate::error::{WfError, WfResult};
use crate::wavefunction::WaveFunctions;

/// Inner-product engine bound to a communicator and a processing unit.
///
/// Owns the scratch buffer reused across calls. Inner products running
/// concurrently must use separate engines.
pub struct InnerProduct<'c, C: Communicator + ?Sized> {
    comm: &'c C,
    pu: ProcessingUnit,
    scratch: InnerScratch,
}

impl<'c, C: Communicator + ?Sized> InnerProduct<'c, C> {
    pub fn new(comm: &'c C, pu: ProcessingUnit) -> Self {
        Self::with_scratch(comm, pu, InnerScratch::new())
    }

    /// Engine reusing an existing scratch buffer.
    pub fn with_scratch(comm: &'c C, pu: ProcessingUnit, scratch: InnerScratch) -> Self {
        Self { comm, pu, scratch }
    }

    pub fn scratch(&self) -> &InnerScratch {
        &self.scratch
    }

    pub fn into_scratch(self) -> InnerScratch {
        self.scratch
    }

    fn is_direct(&self, backend: Backend) -> bool {
        self.comm.size() == 1 && backend == Backend::Host
    }

    /// Complex Gram block: `result[irow + a, icol + b] = <bra_{i0+a}|ket_{j0+b}>`
    /// for `a < m`, `b < n`.
    ///
    /// Sums the plane-wave and, in full-potential mode, the muffin-tin
    /// contraction. Entries of `result` outside the block are not touched.
    ///
    /// # Panics
    /// If `bra` and `ket` are not compatible, do not belong to this rank of
    /// the communicator, or a window is out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn inner(
        &mut self,
        bra: &WaveFunctions,
        i0: usize,
        m: usize,
        ket: &WaveFunctions,
        j0: usize,
        n: usize,
        result: &mut DMatrix<Complex64>,
        irow: usize,
        icol: usize,
    ) -> WfResult<()> {
        self.check_operands(bra, i0, m, ket, j0, n, result.shape(), (irow, icol));
        let backend = Backend::select(self.pu)?;

        if self.is_direct(backend) {
            trace!("inner: direct {}x{} block", m, n);
            let mut block = result.view_mut((irow, icol), (m, n));
            complex_partial(bra, i0, m, ket, j0, n, Residency::Host, &mut block);
            return Ok(());
        }

        trace!("inner: reduced {}x{} block over {} ranks on {:?}", m, n, self.comm.size(), backend);
        let residency = backend.residency();
        let buf = self.scratch.reserve(2 * m * n);
        backend.stage_scratch(buf, |dst| {
            let dst: &mut [Complex64] = bytemuck::cast_slice_mut(dst);
            let mut block = DMatrixViewMut::from_slice(dst, m, n);
            complex_partial(bra, i0, m, ket, j0, n, residency, &mut block);
        });
        self.comm.allreduce_sum(buf);

        let reduced: &[Complex64] = bytemuck::cast_slice(buf);
        for j in 0..n {
            result
                .column_mut(icol + j)
                .rows_mut(irow, m)
                .copy_from_slice(&reduced[j * m..(j + 1) * m]);
        }
        Ok(())
    }

    /// Real Gram block for wave functions with conjugate-symmetric
    /// plane-wave coefficients (only half of the G sphere is stored):
    /// `result = 2 Re(bra^H ket) - bra(G=0) ket(G=0)`.
    ///
    /// The G=0 row is counted twice by the doubling, so the rank owning it
    /// subtracts it once before the reduction.
    ///
    /// Fails with [`WfError::NotImplemented`] for full-potential wave
    /// functions.
    ///
    /// # Panics
    /// Besides the operand checks of [`InnerProduct::inner`], if rank 0 of
    /// the plane-wave distribution stores no rows while others do.
    #[allow(clippy::too_many_arguments)]
    pub fn inner_real(
        &mut self,
        bra: &WaveFunctions,
        i0: usize,
        m: usize,
        ket: &WaveFunctions,
        j0: usize,
        n: usize,
        result: &mut DMatrix<f64>,
        irow: usize,
        icol: usize,
    ) -> WfResult<()> {
        self.check_operands(bra, i0, m, ket, j0, n, result.shape(), (irow, icol));
        if bra.full_potential() {
            return Err(WfError::NotImplemented(
                "real-valued inner product of full-potential wave functions",
            ));
        }
        let pw_distr = bra.pw_distribution();
        assert!(
            pw_distr.holds_first_row(),
            "G=0 row must be stored on rank {}, counts are {:?}",
            pw_distr.first_row_rank(),
            pw_distr.counts()
        );
        let backend = Backend::select(self.pu)?;
        let owns_g0 = self.comm.rank() == pw_distr.first_row_rank();

        if self.is_direct(backend) {
            trace!("inner_real: direct {}x{} block", m, n);
            let mut block = result.view_mut((irow, icol), (m, n));
            real_partial(bra, i0, m, ket, j0, n, Residency::Host, owns_g0, &mut block);
            return Ok(());
        }

        trace!("inner_real: reduced {}x{} block over {} ranks on {:?}", m, n, self.comm.size(), backend);
        let residency = backend.residency();
        let buf = self.scratch.reserve(m * n);
        backend.stage_scratch(buf, |dst| {
            let mut block = DMatrixViewMut::from_slice(dst, m, n);
            real_partial(bra, i0, m, ket, j0, n, residency, owns_g0, &mut block);
        });
        self.comm.allreduce_sum(buf);

        for j in 0..n {
            result
                .column_mut(icol + j)
                .rows_mut(irow, m)
                .copy_from_slice(&buf[j * m..(j + 1) * m]);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_operands(
        &self,
        bra: &WaveFunctions,
        i0: usize,
        m: usize,
        ket: &WaveFunctions,
        j0: usize,
        n: usize,
        shape: (usize, usize),
        at: (usize, usize),
    ) {
        bra.assert_compatible(ket);
        assert_eq!(bra.rank(), self.comm.rank(), "wave functions belong to another rank");
        assert_eq!(
            bra.pw_distribution().num_ranks(),
            self.comm.size(),
            "row distribution does not match the communicator size"
        );
        assert!(i0 + m <= bra.num_wf(), "bra window {}..{} out of range", i0, i0 + m);
        assert!(j0 + n <= ket.num_wf(), "ket window {}..{} out of range", j0, j0 + n);
        assert!(
            at.0 + m <= shape.0 && at.1 + n <= shape.1,
            "{}x{} block at {:?} does not fit a {:?} result",
            m,
            n,
            at,
            shape
        );
    }
}

/// Local `bra^H ket` over all representations, written into `block`.
#[allow(clippy::too_many_arguments)]
fn complex_partial(
    bra: &WaveFunctions,
    i0: usize,
    m: usize,
    ket: &WaveFunctions,
    j0: usize,
    n: usize,
    residency: Residency,
    block: &mut DMatrixViewMut<Complex64>,
) {
    let mut beta = Complex64::new(0.0, 0.0);
    for (bra_slab, ket_slab) in bra.slabs().zip(ket.slabs()) {
        let rows = bra_slab.num_rows_loc();
        let a = DMatrixView::from_slice(bra_slab.columns_in(residency, i0, m), rows, m);
        let b = DMatrixView::from_slice(ket_slab.columns_in(residency, j0, n), rows, n);
        block.gemm_ad(Complex64::new(1.0, 0.0), &a, &b, beta);
        // the muffin-tin contraction accumulates onto the plane-wave one
        beta = Complex64::new(1.0, 0.0);
    }
}

/// Local `2 Re(bra^H ket)` of the plane-wave part, minus the G=0 term on the
/// rank that owns it, written into `block`.
#[allow(clippy::too_many_arguments)]
fn real_partial(
    bra: &WaveFunctions,
    i0: usize,
    m: usize,
    ket: &WaveFunctions,
    j0: usize,
    n: usize,
    residency: Residency,
    owns_g0: bool,
    block: &mut DMatrixViewMut<f64>,
) {
    let rows2 = 2 * bra.pw_coeffs().num_rows_loc();
    let a = &bra.pw_coeffs().real_view(residency)[rows2 * i0..rows2 * (i0 + m)];
    let b = &ket.pw_coeffs().real_view(residency)[rows2 * j0..rows2 * (j0 + n)];
    block.gemm_tr(
        2.0,
        &DMatrixView::from_slice(a, rows2, m),
        &DMatrixView::from_slice(b, rows2, n),
        0.0,
    );
    if owns_g0 && rows2 > 0 {
        // Re of the G=0 coefficient heads every real column
        let x = DVector::from_iterator(m, a.iter().step_by(rows2).copied());
        let y = DVector::from_iterator(n, b.iter().step_by(rows2).copied());
        block.ger(-1.0, &x, &y, 1.0);
    }
}
