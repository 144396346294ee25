//! Laplacian-of-Gaussian filters.
//!
//! A separable LoG is the sum over axes of the one-axis second-derivative
//! kernel smoothed by Gaussians along the remaining axes:
//! `LoG(in) = Gx(LoGy(in)) + LoGx(Gy(in))` in 2D, and the three-term
//! analogue in 3D.

use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};

use super::FirFilterBase;
use crate::error::Result;
use crate::fir::{
    fir_2d_x, fir_2d_x_small, fir_2d_y, fir_2d_y_small, fir_3d_x, fir_3d_x_small, fir_3d_y,
    fir_3d_y_small, fir_3d_z, fir_3d_z_small,
};
use crate::kernels::{gauss_fir_kernel, log_fir_kernel};
use crate::stack::{fslice, fslice_mut, Real};
use crate::tuning::FilterTuning;

/// 2D LoG filter with per-axis Gaussian and LoG kernels.
#[derive(Debug, Clone)]
pub struct LoGFilter2D<F: Real> {
    base: FirFilterBase<F>,
    gauss_kernels: Vec<Vec<F>>,
    log_kernels: Vec<Vec<F>>,
    temp0: Vec<F>,
    temp1: Vec<F>,
}

impl<F: Real> LoGFilter2D<F> {
    pub fn new(size: [usize; 2], sigma: [F; 2]) -> Result<Self> {
        Self::with_tuning(size, sigma, FilterTuning::default())
    }

    pub fn with_tuning(size: [usize; 2], sigma: [F; 2], tuning: FilterTuning) -> Result<Self> {
        let base = FirFilterBase::new(2, &size, &sigma, tuning)?;
        let temp0 = vec![F::zero(); base.n_elem()];
        let temp1 = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            gauss_kernels: Vec::new(),
            log_kernels: Vec::new(),
            temp0,
            temp1,
        };
        filter.recompute_kernels()?;
        Ok(filter)
    }

    pub fn with_kernel_hw(size: [usize; 2], sigma: [F; 2], kernel_hw: [usize; 2]) -> Result<Self> {
        let mut filter = Self::new(size, sigma)?;
        filter.set_kernel_hw(kernel_hw)?;
        Ok(filter)
    }

    pub fn set_kernel_hw(&mut self, kernel_hw: [usize; 2]) -> Result<()> {
        self.base.set_hw(&kernel_hw)?;
        self.recompute_kernels()
    }

    fn recompute_kernels(&mut self) -> Result<()> {
        let zero_sum = self.base.tuning.log_zero_sum;
        let dims = 0..self.base.dim;
        self.gauss_kernels = dims
            .clone()
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        self.log_kernels = dims
            .map(|d| log_fir_kernel(self.base.sigma[d], self.base.hw[d], zero_sum))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn size(&self) -> [usize; 2] {
        [self.base.size[0], self.base.size[1]]
    }

    pub fn sigma(&self) -> [F; 2] {
        [self.base.sigma[0], self.base.sigma[1]]
    }

    pub fn filter(&mut self, im: ArrayView2<'_, F>, mut out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.base.check_shape_2d("input image", im.dim())?;
        self.base.check_shape_2d("output image", out.dim())?;
        let (sx, sy) = im.dim();
        let im_s = fslice("input image", &im)?;
        let out_s = fslice_mut("output image", &mut out)?;
        fir_2d_y(sx, sy, im_s, &mut self.temp0, &self.log_kernels[1]);
        fir_2d_x(sx, sy, &self.temp0, out_s, &self.gauss_kernels[0]);
        fir_2d_y(sx, sy, im_s, &mut self.temp0, &self.gauss_kernels[1]);
        fir_2d_x(sx, sy, &self.temp0, &mut self.temp1, &self.log_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp1) {
            *o = *o + *t;
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
        fir_2d_y_small(sx, sy, im_s, &mut self.temp0, &self.log_kernels[1]);
        fir_2d_x_small(sx, sy, &self.temp0, out_s, &self.gauss_kernels[0]);
        fir_2d_y_small(sx, sy, im_s, &mut self.temp0, &self.gauss_kernels[1]);
        fir_2d_x_small(sx, sy, &self.temp0, &mut self.temp1, &self.log_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp1) {
            *o = *o + *t;
        }
        Ok(())
    }
}

/// 3D LoG filter: `LoGx(Gy(Gz)) + Gx(LoGy(Gz)) + Gx(Gy(LoGz))`.
#[derive(Debug, Clone)]
pub struct LoGFilter3D<F: Real> {
    base: FirFilterBase<F>,
    gauss_kernels: Vec<Vec<F>>,
    log_kernels: Vec<Vec<F>>,
    temp0: Vec<F>,
    temp1: Vec<F>,
}

impl<F: Real> LoGFilter3D<F> {
    pub fn new(size: [usize; 3], sigma: [F; 3]) -> Result<Self> {
        Self::with_tuning(size, sigma, FilterTuning::default())
    }

    pub fn with_tuning(size: [usize; 3], sigma: [F; 3], tuning: FilterTuning) -> Result<Self> {
        let base = FirFilterBase::new(3, &size, &sigma, tuning)?;
        let temp0 = vec![F::zero(); base.n_elem()];
        let temp1 = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            gauss_kernels: Vec::new(),
            log_kernels: Vec::new(),
            temp0,
            temp1,
        };
        filter.recompute_kernels()?;
        Ok(filter)
    }

    pub fn with_kernel_hw(size: [usize; 3], sigma: [F; 3], kernel_hw: [usize; 3]) -> Result<Self> {
        let mut filter = Self::new(size, sigma)?;
        filter.set_kernel_hw(kernel_hw)?;
        Ok(filter)
    }

    pub fn set_kernel_hw(&mut self, kernel_hw: [usize; 3]) -> Result<()> {
        self.base.set_hw(&kernel_hw)?;
        self.recompute_kernels()
    }

    fn recompute_kernels(&mut self) -> Result<()> {
        let zero_sum = self.base.tuning.log_zero_sum;
        let dims = 0..self.base.dim;
        self.gauss_kernels = dims
            .clone()
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        self.log_kernels = dims
            .map(|d| log_fir_kernel(self.base.sigma[d], self.base.hw[d], zero_sum))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn size(&self) -> [usize; 3] {
        [self.base.size[0], self.base.size[1], self.base.size[2]]
    }

    pub fn sigma(&self) -> [F; 3] {
        [self.base.sigma[0], self.base.sigma[1], self.base.sigma[2]]
    }

    pub fn filter(&mut self, im: ArrayView3<'_, F>, mut out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.base.check_shape_3d("input volume", im.dim())?;
        self.base.check_shape_3d("output volume", out.dim())?;
        let (sx, sy, sz) = im.dim();
        let im_s = fslice("input volume", &im)?;
        let out_s = fslice_mut("output volume", &mut out)?;

        fir_3d_z(sx, sy, sz, im_s, &mut self.temp0, &self.gauss_kernels[2]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.gauss_kernels[1]);
        fir_3d_x(sx, sy, sz, &self.temp1, out_s, &self.log_kernels[0]);

        fir_3d_z(sx, sy, sz, im_s, &mut self.temp0, &self.gauss_kernels[2]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.log_kernels[1]);
        fir_3d_x(sx, sy, sz, &self.temp1, &mut self.temp0, &self.gauss_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o + *t;
        }

        fir_3d_z(sx, sy, sz, im_s, &mut self.temp0, &self.log_kernels[2]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.gauss_kernels[1]);
        fir_3d_x(sx, sy, sz, &self.temp1, &mut self.temp0, &self.gauss_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o + *t;
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

        fir_3d_z_small(sx, sy, sz, im_s, &mut self.temp0, &self.gauss_kernels[2]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.gauss_kernels[1]);
        fir_3d_x_small(sx, sy, sz, &self.temp1, out_s, &self.log_kernels[0]);

        fir_3d_z_small(sx, sy, sz, im_s, &mut self.temp0, &self.gauss_kernels[2]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.log_kernels[1]);
        fir_3d_x_small(sx, sy, sz, &self.temp1, &mut self.temp0, &self.gauss_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o + *t;
        }

        fir_3d_z_small(sx, sy, sz, im_s, &mut self.temp0, &self.log_kernels[2]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.gauss_kernels[1]);
        fir_3d_x_small(sx, sy, sz, &self.temp1, &mut self.temp0, &self.gauss_kernels[0]);
        for (o, t) in out_s.iter_mut().zip(&self.temp0) {
            *o = *o + *t;
        }
        Ok(())
    }
}
