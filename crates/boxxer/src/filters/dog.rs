//! Difference-of-Gaussian filters.
//!
//! The excitatory Gaussian runs at `sigma`, the inhibitory one at
//! `sigma * sigma_ratio` with the same kernel half-widths; the response is
//! `excite - inhibit`.

use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};

use super::FirFilterBase;
use crate::error::{Error, Result};
use crate::fir::{
    fir_2d_x, fir_2d_x_small, fir_2d_y, fir_2d_y_small, fir_3d_x, fir_3d_x_small, fir_3d_y,
    fir_3d_y_small, fir_3d_z, fir_3d_z_small,
};
use crate::kernels::gauss_fir_kernel;
use crate::stack::{fslice, fslice_mut, Real};
use crate::tuning::FilterTuning;

/// 2D DoG filter with per-axis excite/inhibit kernels and two scratch images.
#[derive(Debug, Clone)]
pub struct DoGFilter2D<F: Real> {
    base: FirFilterBase<F>,
    sigma_ratio: F,
    excite_kernels: Vec<Vec<F>>,
    inhibit_kernels: Vec<Vec<F>>,
    temp0: Vec<F>,
    temp1: Vec<F>,
}

impl<F: Real> DoGFilter2D<F> {
    pub fn new(size: [usize; 2], sigma: [F; 2], sigma_ratio: F) -> Result<Self> {
        Self::with_tuning(size, sigma, sigma_ratio, FilterTuning::default())
    }

    pub fn with_tuning(
        size: [usize; 2],
        sigma: [F; 2],
        sigma_ratio: F,
        tuning: FilterTuning,
    ) -> Result<Self> {
        check_sigma_ratio(sigma_ratio)?;
        let base = FirFilterBase::new(2, &size, &sigma, tuning)?;
        let temp0 = vec![F::zero(); base.n_elem()];
        let temp1 = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            sigma_ratio,
            excite_kernels: Vec::new(),
            inhibit_kernels: Vec::new(),
            temp0,
            temp1,
        };
        filter.recompute_kernels()?;
        Ok(filter)
    }

    pub fn set_kernel_hw(&mut self, kernel_hw: [usize; 2]) -> Result<()> {
        self.base.set_hw(&kernel_hw)?;
        self.recompute_kernels()
    }

    /// Replaces the inhibitory sigma ratio and rebuilds the inhibit kernels.
    pub fn set_sigma_ratio(&mut self, sigma_ratio: F) -> Result<()> {
        check_sigma_ratio(sigma_ratio)?;
        self.sigma_ratio = sigma_ratio;
        self.recompute_kernels()
    }

    fn recompute_kernels(&mut self) -> Result<()> {
        let dims = 0..self.base.dim;
        self.excite_kernels = dims
            .clone()
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        self.inhibit_kernels = dims
            .map(|d| gauss_fir_kernel(self.base.sigma[d] * self.sigma_ratio, self.base.hw[d]))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn sigma_ratio(&self) -> F {
        self.sigma_ratio
    }

    pub fn size(&self) -> [usize; 2] {
        [self.base.size[0], self.base.size[1]]
    }

    pub fn filter(&mut self, im: ArrayView2<'_, F>, mut out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.base.check_shape_2d("input image", im.dim())?;
        self.base.check_shape_2d("output image", out.dim())?;
        let (sx, sy) = im.dim();
        let im_s = fslice("input image", &im)?;
        let out_s = fslice_mut("output image", &mut out)?;
        fir_2d_x(sx, sy, im_s, &mut self.temp0, &self.excite_kernels[0]);
        fir_2d_y(sx, sy, &self.temp0, out_s, &self.excite_kernels[1]);
        fir_2d_x(sx, sy, im_s, &mut self.temp1, &self.inhibit_kernels[0]);
        fir_2d_y(sx, sy, &self.temp1, &mut self.temp0, &self.inhibit_kernels[1]);
        for (o, i) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o - *i;
        }
        Ok(())
    }

    /// Reference composition through the `_small` axis passes.
    pub fn filter_reference(
        &mut self,
        im: ArrayView2<'_, F>,
        mut out: ArrayViewMut2<'_, F>,
    ) -> Result<()> {
        self.base.check_shape_2d("input image", im.dim())?;
        self.base.check_shape_2d("output image", out.dim())?;
        let (sx, sy) = im.dim();
        let im_s = fslice("input image", &im)?;
        let out_s = fslice_mut("output image", &mut out)?;
        fir_2d_x_small(sx, sy, im_s, &mut self.temp0, &self.excite_kernels[0]);
        fir_2d_y_small(sx, sy, &self.temp0, out_s, &self.excite_kernels[1]);
        fir_2d_x_small(sx, sy, im_s, &mut self.temp1, &self.inhibit_kernels[0]);
        fir_2d_y_small(sx, sy, &self.temp1, &mut self.temp0, &self.inhibit_kernels[1]);
        for (o, i) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o - *i;
        }
        Ok(())
    }
}

/// 3D DoG filter, folded through two scratch volumes.
#[derive(Debug, Clone)]
pub struct DoGFilter3D<F: Real> {
    base: FirFilterBase<F>,
    sigma_ratio: F,
    excite_kernels: Vec<Vec<F>>,
    inhibit_kernels: Vec<Vec<F>>,
    temp0: Vec<F>,
    temp1: Vec<F>,
}

impl<F: Real> DoGFilter3D<F> {
    pub fn new(size: [usize; 3], sigma: [F; 3], sigma_ratio: F) -> Result<Self> {
        Self::with_tuning(size, sigma, sigma_ratio, FilterTuning::default())
    }

    pub fn with_tuning(
        size: [usize; 3],
        sigma: [F; 3],
        sigma_ratio: F,
        tuning: FilterTuning,
    ) -> Result<Self> {
        check_sigma_ratio(sigma_ratio)?;
        let base = FirFilterBase::new(3, &size, &sigma, tuning)?;
        let temp0 = vec![F::zero(); base.n_elem()];
        let temp1 = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            sigma_ratio,
            excite_kernels: Vec::new(),
            inhibit_kernels: Vec::new(),
            temp0,
            temp1,
        };
        filter.recompute_kernels()?;
        Ok(filter)
    }

    pub fn set_kernel_hw(&mut self, kernel_hw: [usize; 3]) -> Result<()> {
        self.base.set_hw(&kernel_hw)?;
        self.recompute_kernels()
    }

    pub fn set_sigma_ratio(&mut self, sigma_ratio: F) -> Result<()> {
        check_sigma_ratio(sigma_ratio)?;
        self.sigma_ratio = sigma_ratio;
        self.recompute_kernels()
    }

    fn recompute_kernels(&mut self) -> Result<()> {
        let dims = 0..self.base.dim;
        self.excite_kernels = dims
            .clone()
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        self.inhibit_kernels = dims
            .map(|d| gauss_fir_kernel(self.base.sigma[d] * self.sigma_ratio, self.base.hw[d]))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn sigma_ratio(&self) -> F {
        self.sigma_ratio
    }

    pub fn size(&self) -> [usize; 3] {
        [self.base.size[0], self.base.size[1], self.base.size[2]]
    }

    pub fn filter(&mut self, im: ArrayView3<'_, F>, mut out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.base.check_shape_3d("input volume", im.dim())?;
        self.base.check_shape_3d("output volume", out.dim())?;
        let (sx, sy, sz) = im.dim();
        let im_s = fslice("input volume", &im)?;
        let out_s = fslice_mut("output volume", &mut out)?;
        fir_3d_x(sx, sy, sz, im_s, &mut self.temp0, &self.excite_kernels[0]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.excite_kernels[1]);
        fir_3d_z(sx, sy, sz, &self.temp1, out_s, &self.excite_kernels[2]);
        fir_3d_x(sx, sy, sz, im_s, &mut self.temp0, &self.inhibit_kernels[0]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.inhibit_kernels[1]);
        fir_3d_z(sx, sy, sz, &self.temp1, &mut self.temp0, &self.inhibit_kernels[2]);
        for (o, i) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o - *i;
        }
        Ok(())
    }

    /// Reference composition through the `_small` axis passes.
    pub fn filter_reference(
        &mut self,
        im: ArrayView3<'_, F>,
        mut out: ArrayViewMut3<'_, F>,
    ) -> Result<()> {
        self.base.check_shape_3d("input volume", im.dim())?;
        self.base.check_shape_3d("output volume", out.dim())?;
        let (sx, sy, sz) = im.dim();
        let im_s = fslice("input volume", &im)?;
        let out_s = fslice_mut("output volume", &mut out)?;
        fir_3d_x_small(sx, sy, sz, im_s, &mut self.temp0, &self.excite_kernels[0]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.excite_kernels[1]);
        fir_3d_z_small(sx, sy, sz, &self.temp1, out_s, &self.excite_kernels[2]);
        fir_3d_x_small(sx, sy, sz, im_s, &mut self.temp0, &self.inhibit_kernels[0]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.inhibit_kernels[1]);
        fir_3d_z_small(sx, sy, sz, &self.temp1, &mut self.temp0, &self.inhibit_kernels[2]);
        for (o, i) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o - *i;
        }
        Ok(())
    }
}

fn check_sigma_ratio<F: Real>(sigma_ratio: F) -> Result<()> {
    if !(sigma_ratio > F::one()) {
        return Err(Error::ParameterValue(format!(
            "sigma_ratio must be > 1, got {sigma_ratio}"
        )));
    }
    Ok(())
}
