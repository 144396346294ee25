//! Separable Gaussian smoothing filters.

use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3};

use super::FirFilterBase;
use crate::error::Result;
use crate::fir::{
    fir_2d_x, fir_2d_x_small, fir_2d_y, fir_2d_y_small, fir_3d_x, fir_3d_x_small, fir_3d_y,
    fir_3d_y_small, fir_3d_z, fir_3d_z_small,
};
use crate::kernels::gauss_fir_kernel;
use crate::stack::{fslice, fslice_mut, Real};
use crate::tuning::FilterTuning;

/// 2D Gaussian filter: `out = Gx(Gy(in))` through one scratch image.
#[derive(Debug, Clone)]
pub struct GaussFilter2D<F: Real> {
    base: FirFilterBase<F>,
    kernels: Vec<Vec<F>>,
    temp: Vec<F>,
}

impl<F: Real> GaussFilter2D<F> {
    pub fn new(size: [usize; 2], sigma: [F; 2]) -> Result<Self> {
        Self::with_tuning(size, sigma, FilterTuning::default())
    }

    pub fn with_tuning(size: [usize; 2], sigma: [F; 2], tuning: FilterTuning) -> Result<Self> {
        let base = FirFilterBase::new(2, &size, &sigma, tuning)?;
        let temp = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            kernels: Vec::new(),
            temp,
        };
        filter.recompute_kernels()?;
        Ok(filter)
    }

    pub fn with_kernel_hw(size: [usize; 2], sigma: [F; 2], kernel_hw: [usize; 2]) -> Result<Self> {
        let mut filter = Self::new(size, sigma)?;
        filter.set_kernel_hw(kernel_hw)?;
        Ok(filter)
    }

    /// Recomputes both axis kernels for new half-widths; the frame shape is
    /// unchanged.
    pub fn set_kernel_hw(&mut self, kernel_hw: [usize; 2]) -> Result<()> {
        self.base.set_hw(&kernel_hw)?;
        self.recompute_kernels()
    }

    fn recompute_kernels(&mut self) -> Result<()> {
        self.kernels = (0..self.base.dim)
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn size(&self) -> [usize; 2] {
        [self.base.size[0], self.base.size[1]]
    }

    pub fn sigma(&self) -> [F; 2] {
        [self.base.sigma[0], self.base.sigma[1]]
    }

    pub fn kernel_hw(&self) -> [usize; 2] {
        [self.base.hw[0], self.base.hw[1]]
    }

    pub fn filter(&mut self, im: ArrayView2<'_, F>, mut out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.base.check_shape_2d("input image", im.dim())?;
        self.base.check_shape_2d("output image", out.dim())?;
        let (sx, sy) = im.dim();
        let im_s = fslice("input image", &im)?;
        let out_s = fslice_mut("output image", &mut out)?;
        fir_2d_x(sx, sy, im_s, &mut self.temp, &self.kernels[0]);
        fir_2d_y(sx, sy, &self.temp, out_s, &self.kernels[1]);
        Ok(())
    }

    /// Same composition through the reference axis passes; used to validate
    /// the fast sweeps.
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
        fir_2d_x_small(sx, sy, im_s, &mut self.temp, &self.kernels[0]);
        fir_2d_y_small(sx, sy, &self.temp, out_s, &self.kernels[1]);
        Ok(())
    }
}

/// 3D Gaussian filter: `out = Gx(Gy(Gz(in)))` through two scratch volumes.
#[derive(Debug, Clone)]
pub struct GaussFilter3D<F: Real> {
    base: FirFilterBase<F>,
    kernels: Vec<Vec<F>>,
    temp0: Vec<F>,
    temp1: Vec<F>,
}

impl<F: Real> GaussFilter3D<F> {
    pub fn new(size: [usize; 3], sigma: [F; 3]) -> Result<Self> {
        Self::with_tuning(size, sigma, FilterTuning::default())
    }

    pub fn with_tuning(size: [usize; 3], sigma: [F; 3], tuning: FilterTuning) -> Result<Self> {
        let base = FirFilterBase::new(3, &size, &sigma, tuning)?;
        let temp0 = vec![F::zero(); base.n_elem()];
        let temp1 = vec![F::zero(); base.n_elem()];
        let mut filter = Self {
            base,
            kernels: Vec::new(),
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
        self.kernels = (0..self.base.dim)
            .map(|d| gauss_fir_kernel(self.base.sigma[d], self.base.hw[d]))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn size(&self) -> [usize; 3] {
        [self.base.size[0], self.base.size[1], self.base.size[2]]
    }

    pub fn sigma(&self) -> [F; 3] {
        [self.base.sigma[0], self.base.sigma[1], self.base.sigma[2]]
    }

    pub fn kernel_hw(&self) -> [usize; 3] {
        [self.base.hw[0], self.base.hw[1], self.base.hw[2]]
    }

    pub fn filter(&mut self, im: ArrayView3<'_, F>, mut out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.base.check_shape_3d("input volume", im.dim())?;
        self.base.check_shape_3d("output volume", out.dim())?;
        let (sx, sy, sz) = im.dim();
        let im_s = fslice("input volume", &im)?;
        let out_s = fslice_mut("output volume", &mut out)?;
        fir_3d_x(sx, sy, sz, im_s, &mut self.temp0, &self.kernels[0]);
        fir_3d_y(sx, sy, sz, &self.temp0, &mut self.temp1, &self.kernels[1]);
        fir_3d_z(sx, sy, sz, &self.temp1, out_s, &self.kernels[2]);
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
        fir_3d_x_small(sx, sy, sz, im_s, &mut self.temp0, &self.kernels[0]);
        fir_3d_y_small(sx, sy, sz, &self.temp0, &mut self.temp1, &self.kernels[1]);
        fir_3d_z_small(sx, sy, sz, &self.temp1, out_s, &self.kernels[2]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stack;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_image(rng: &mut StdRng, size: [usize; 2]) -> stack::Image<f64> {
        let mut im = stack::image::<f64>(size);
        for v in im.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        im
    }

    #[test]
    fn impulse_response_is_the_kernel_outer_product() {
        let mut f = GaussFilter2D::<f64>::with_kernel_hw([17, 17], [1.0, 1.5], [3, 3]).unwrap();
        let mut im = stack::image::<f64>([17, 17]);
        im[[8, 8]] = 1.0;
        let mut out = stack::image::<f64>([17, 17]);
        f.filter(im.view(), out.view_mut()).unwrap();

        let kx = gauss_fir_kernel::<f64>(1.0, 3).unwrap();
        let ky = gauss_fir_kernel::<f64>(1.5, 3).unwrap();
        for dx in 0..=3usize {
            for dy in 0..=3usize {
                let expected = kx[dx] * ky[dy];
                let got = out[[8 + dx, 8 + dy]];
                assert!(
                    (got - expected).abs() <= 4.0 * f64::EPSILON,
                    "offset ({dx},{dy}): {got} vs {expected}"
                );
                assert_eq!(got, out[[8 - dx, 8 - dy]], "response must be symmetric");
            }
        }
    }

    #[test]
    fn gauss_is_a_nonnegative_operator() {
        let mut rng = StdRng::seed_from_u64(41);
        let mut f = GaussFilter2D::<f64>::new([24, 19], [1.2, 0.9]).unwrap();
        let im = random_image(&mut rng, [24, 19]);
        let mut out = stack::image::<f64>([24, 19]);
        f.filter(im.view(), out.view_mut()).unwrap();
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn fast_matches_reference_2d() {
        let mut rng = StdRng::seed_from_u64(42);
        let size = [21, 17];
        let mut f = GaussFilter2D::<f64>::new(size, [1.1, 1.4]).unwrap();
        let im = random_image(&mut rng, size);
        let mut fast = stack::image::<f64>(size);
        let mut reference = stack::image::<f64>(size);
        f.filter(im.view(), fast.view_mut()).unwrap();
        f.filter_reference(im.view(), reference.view_mut()).unwrap();
        for (a, b) in fast.iter().zip(reference.iter()) {
            assert!((a - b).abs() <= 4.0 * f64::EPSILON);
        }
    }

    #[test]
    fn fast_matches_reference_3d() {
        let mut rng = StdRng::seed_from_u64(43);
        let size = [12, 11, 9];
        let mut f = GaussFilter3D::<f64>::with_kernel_hw(size, [1.0, 1.0, 1.2], [2, 2, 2]).unwrap();
        let mut im = stack::volume::<f64>(size);
        for v in im.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        let mut fast = stack::volume::<f64>(size);
        let mut reference = stack::volume::<f64>(size);
        f.filter(im.view(), fast.view_mut()).unwrap();
        f.filter_reference(im.view(), reference.view_mut()).unwrap();
        for (a, b) in fast.iter().zip(reference.iter()) {
            assert!((a - b).abs() <= 4.0 * f64::EPSILON);
        }
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut f = GaussFilter2D::<f32>::new([16, 16], [1.0, 1.0]).unwrap();
        let im = stack::image::<f32>([16, 15]);
        let mut out = stack::image::<f32>([16, 16]);
        let err = f.filter(im.view(), out.view_mut()).unwrap_err();
        assert!(matches!(err, Error::ParameterShape(_)));
    }

    #[test]
    fn set_kernel_hw_changes_support() {
        let mut f = GaussFilter2D::<f64>::new([32, 32], [1.0, 1.0]).unwrap();
        assert_eq!(f.kernel_hw(), [3, 3]);
        f.set_kernel_hw([5, 4]).unwrap();
        assert_eq!(f.kernel_hw(), [5, 4]);
        assert!(f.set_kernel_hw([0, 4]).is_err());

        // Row-major arrays are refused at the seam rather than misread.
        let im = Array2::<f64>::zeros((32, 32));
        let mut out = stack::image::<f64>([32, 32]);
        assert!(matches!(
            f.filter(im.view(), out.view_mut()),
            Err(Error::Logical(_))
        ));
    }
}
