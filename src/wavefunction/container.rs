//! Distributed set of wave functions.
//!
//! Every wave function has a plane-wave part and, in full-potential mode, a
//! muffin-tin part. The two parts are stored in separate slabs with
//! independent row distributions but a shared column index: column `j` of
//! both slabs together is wave function `j`.

use num_complex::Complex64;

use crate::device::ProcessingUnit;
use crate::distribution::BlockDistribution;
use crate::storage::CoeffSlab;

#[derive(Debug)]
struct MuffinTin {
    distr: BlockDistribution,
    coeffs: CoeffSlab,
}

/// Wave functions of one rank: the local rows of both representations.
#[derive(Debug)]
pub struct WaveFunctions {
    rank: usize,
    num_wf: usize,
    pu: ProcessingUnit,
    pw_distr: BlockDistribution,
    pw_coeffs: CoeffSlab,
    mt: Option<MuffinTin>,
}

impl WaveFunctions {
    /// Plane-wave only wave functions.
    ///
    /// # Arguments
    /// * `pw_distr` - Distribution of the plane-wave (G+k vector) rows
    /// * `rank` - Rank owning this block
    /// * `num_wf` - Number of wave functions (columns)
    /// * `pu` - Processing unit the kernels run on
    pub fn new(pw_distr: &BlockDistribution, rank: usize, num_wf: usize, pu: ProcessingUnit) -> Self {
        let pw_coeffs = CoeffSlab::new(pw_distr.count(rank), num_wf);
        Self {
            rank,
            num_wf,
            pu,
            pw_distr: pw_distr.clone(),
            pw_coeffs,
            mt: None,
        }
    }

    /// Full-potential wave functions with plane-wave and muffin-tin parts.
    pub fn new_full_potential(
        pw_distr: &BlockDistribution,
        mt_distr: &BlockDistribution,
        rank: usize,
        num_wf: usize,
        pu: ProcessingUnit,
    ) -> Self {
        assert_eq!(
            pw_distr.num_ranks(),
            mt_distr.num_ranks(),
            "plane-wave and muffin-tin distributions span different rank counts"
        );
        let mut wf = Self::new(pw_distr, rank, num_wf, pu);
        wf.mt = Some(MuffinTin {
            distr: mt_distr.clone(),
            coeffs: CoeffSlab::new(mt_distr.count(rank), num_wf),
        });
        wf
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_wf(&self) -> usize {
        self.num_wf
    }

    pub fn processing_unit(&self) -> ProcessingUnit {
        self.pu
    }

    /// True if the wave functions carry a muffin-tin part.
    pub fn full_potential(&self) -> bool {
        self.mt.is_some()
    }

    pub fn pw_distribution(&self) -> &BlockDistribution {
        &self.pw_distr
    }

    pub fn mt_distribution(&self) -> Option<&BlockDistribution> {
        self.mt.as_ref().map(|mt| &mt.distr)
    }

    pub fn pw_coeffs(&self) -> &CoeffSlab {
        &self.pw_coeffs
    }

    pub fn pw_coeffs_mut(&mut self) -> &mut CoeffSlab {
        &mut self.pw_coeffs
    }

    pub fn mt_coeffs(&self) -> Option<&CoeffSlab> {
        self.mt.as_ref().map(|mt| &mt.coeffs)
    }

    pub fn mt_coeffs_mut(&mut self) -> Option<&mut CoeffSlab> {
        self.mt.as_mut().map(|mt| &mut mt.coeffs)
    }

    /// Both slabs, muffin-tin last if present.
    pub(crate) fn slabs(&self) -> impl Iterator<Item = &CoeffSlab> {
        std::iter::once(&self.pw_coeffs).chain(self.mt_coeffs())
    }

    fn slabs_mut(&mut self) -> impl Iterator<Item = &mut CoeffSlab> {
        std::iter::once(&mut self.pw_coeffs).chain(self.mt.as_mut().map(|mt| &mut mt.coeffs))
    }

    pub fn allocate_on_device(&mut self) {
        self.slabs_mut().for_each(CoeffSlab::allocate_on_device);
    }

    pub fn deallocate_on_device(&mut self) {
        self.slabs_mut().for_each(CoeffSlab::deallocate_on_device);
    }

    pub fn copy_to_device(&mut self) {
        self.slabs_mut().for_each(CoeffSlab::copy_to_device);
    }

    pub fn copy_to_host(&mut self) {
        self.slabs_mut().for_each(CoeffSlab::copy_to_host);
    }

    /// Panics unless `other` has the same mode, processing unit and row
    /// distributions as `self`.
    pub(crate) fn assert_compatible(&self, other: &WaveFunctions) {
        assert_eq!(
            self.full_potential(),
            other.full_potential(),
            "wave functions constructed with different full-potential modes"
        );
        assert_eq!(self.pu, other.pu, "wave functions live on different processing units");
        assert_eq!(self.rank, other.rank, "wave functions belong to different ranks");
        assert_eq!(
            self.pw_distr, other.pw_distr,
            "wave functions have different plane-wave distributions"
        );
        assert_eq!(
            self.mt_distribution(),
            other.mt_distribution(),
            "wave functions have different muffin-tin distributions"
        );
    }

    /// Copy `n` wave functions starting at `i0` of `src` into columns
    /// starting at `j0`.
    ///
    /// The same window is applied to the plane-wave and the muffin-tin slab,
    /// so both parts of every copied wave function stay column-aligned.
    /// The copy happens in the memory space of the processing unit.
    pub fn copy_from(&mut self, src: &WaveFunctions, i0: usize, n: usize, j0: usize) {
        self.assert_compatible(src);
        let residency = self.pu.residency();
        src.pw_coeffs.copy_window(&mut self.pw_coeffs, i0, n, j0, residency);
        if let (Some(src_mt), Some(mt)) = (src.mt.as_ref(), self.mt.as_mut()) {
            src_mt.coeffs.copy_window(&mut mt.coeffs, i0, n, j0, residency);
        }
    }

    /// Copy `n` wave functions starting at `i0` into the same columns.
    pub fn copy_from_same(&mut self, src: &WaveFunctions, i0: usize, n: usize) {
        self.copy_from(src, i0, n, i0);
    }

    /// Local sum of all host coefficients of both representations.
    pub fn checksum(&self) -> Complex64 {
        self.slabs().map(CoeffSlab::checksum).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(wf: &mut WaveFunctions, shift: f64) {
        let offset = wf.pw_distribution().offset(wf.rank());
        let pw = wf.pw_coeffs_mut().host_mut();
        for j in 0..pw.ncols() {
            for r in 0..pw.nrows() {
                pw[(r, j)] = Complex64::new((offset + r) as f64 + shift, j as f64);
            }
        }
        if let Some(mt) = wf.mt_coeffs_mut() {
            let mt = mt.host_mut();
            for j in 0..mt.ncols() {
                for r in 0..mt.nrows() {
                    mt[(r, j)] = Complex64::new(-(r as f64), j as f64 + shift);
                }
            }
        }
    }

    #[test]
    fn test_local_rows_follow_distributions() {
        let pw = BlockDistribution::new(10, 3);
        let mt = BlockDistribution::from_atom_partition(&[3, 3, 2], 3);
        let wf = WaveFunctions::new_full_potential(&pw, &mt, 1, 4, ProcessingUnit::Cpu);
        assert_eq!(wf.pw_coeffs().num_rows_loc(), 3);
        assert_eq!(wf.mt_coeffs().unwrap().num_rows_loc(), 3);
        assert_eq!(wf.pw_coeffs().num_cols(), wf.mt_coeffs().unwrap().num_cols());
        assert!(wf.full_potential());
    }

    #[test]
    fn test_copy_from_keeps_columns_aligned() {
        let pw = BlockDistribution::new(6, 1);
        let mt = BlockDistribution::new(4, 1);
        let mut src = WaveFunctions::new_full_potential(&pw, &mt, 0, 5, ProcessingUnit::Cpu);
        fill(&mut src, 0.5);
        let mut dst = WaveFunctions::new_full_potential(&pw, &mt, 0, 5, ProcessingUnit::Cpu);
        dst.copy_from(&src, 1, 3, 2);
        for k in 0..3 {
            for r in 0..6 {
                assert_eq!(dst.pw_coeffs().host()[(r, 2 + k)], src.pw_coeffs().host()[(r, 1 + k)]);
            }
            for r in 0..4 {
                assert_eq!(
                    dst.mt_coeffs().unwrap().host()[(r, 2 + k)],
                    src.mt_coeffs().unwrap().host()[(r, 1 + k)]
                );
            }
        }
        // columns outside the window are untouched
        assert_eq!(dst.pw_coeffs().host()[(3, 0)], Complex64::new(0.0, 0.0));
        assert_eq!(dst.mt_coeffs().unwrap().host()[(3, 1)], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_copy_from_same_window() {
        let pw = BlockDistribution::new(4, 1);
        let mut src = WaveFunctions::new(&pw, 0, 3, ProcessingUnit::Cpu);
        fill(&mut src, 1.0);
        let mut dst = WaveFunctions::new(&pw, 0, 3, ProcessingUnit::Cpu);
        dst.copy_from_same(&src, 1, 2);
        assert_eq!(dst.pw_coeffs().columns(1, 2), src.pw_coeffs().columns(1, 2));
    }

    #[test]
    #[should_panic]
    fn test_copy_from_mode_mismatch() {
        let pw = BlockDistribution::new(4, 1);
        let mt = BlockDistribution::new(2, 1);
        let src = WaveFunctions::new(&pw, 0, 2, ProcessingUnit::Cpu);
        let mut dst = WaveFunctions::new_full_potential(&pw, &mt, 0, 2, ProcessingUnit::Cpu);
        dst.copy_from(&src, 0, 1, 0);
    }

    #[test]
    fn test_copy_from_on_device() {
        let pw = BlockDistribution::new(5, 1);
        let mt = BlockDistribution::new(3, 1);
        let mut src = WaveFunctions::new_full_potential(&pw, &mt, 0, 4, ProcessingUnit::Accelerator);
        fill(&mut src, 2.0);
        src.allocate_on_device();
        src.copy_to_device();
        let mut dst = WaveFunctions::new_full_potential(&pw, &mt, 0, 4, ProcessingUnit::Accelerator);
        dst.allocate_on_device();
        dst.copy_from(&src, 0, 4, 0);
        // nothing reaches the host until an explicit transfer
        assert_eq!(dst.checksum(), Complex64::new(0.0, 0.0));
        dst.copy_to_host();
        assert_eq!(dst.checksum(), src.checksum());
        dst.deallocate_on_device();
        assert!(!dst.pw_coeffs().on_device());
    }

    #[test]
    fn test_checksum_sums_both_parts() {
        let pw = BlockDistribution::new(2, 1);
        let mt = BlockDistribution::new(1, 1);
        let mut wf = WaveFunctions::new_full_potential(&pw, &mt, 0, 1, ProcessingUnit::Cpu);
        wf.pw_coeffs_mut().host_mut().fill(Complex64::new(1.0, 0.0));
        wf.mt_coeffs_mut().unwrap().host_mut().fill(Complex64::new(0.0, 2.0));
        assert_eq!(wf.checksum(), Complex64::new(2.0, 2.0));
    }
}
