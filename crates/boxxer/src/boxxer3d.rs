//! 3D scale-space orchestrator for hyper-spectral / volumetric stacks.
//!
//! A frame here is a full `(x, y, z)` volume; a stack is `(x, y, z, t)`.
//! Scaled filtering of one volume runs scales in parallel; the scale-space
//! maxima path parallelizes over frames with per-worker filter vectors, as
//! in the 2D case.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView3, ArrayView4, ArrayViewMut3, Axis};

use crate::error::{Error, Result};
use crate::filters::{DoGFilter3D, GaussFilter3D, LoGFilter3D};
use crate::maxima::{validate_boxsize, Maxima3D};
use crate::stack::{
    combine_frame_tables, maxima_table, scaled_volume, Real, ScaledVolume, Volume, VolumeStack,
};
use crate::tuning::FilterTuning;

/// One per-scale filter inside a worker's filter vector.
trait ScaleFilter<F: Real>: Send {
    fn apply(&mut self, im: ArrayView3<'_, F>, out: ArrayViewMut3<'_, F>) -> Result<()>;
}

impl<F: Real> ScaleFilter<F> for LoGFilter3D<F> {
    fn apply(&mut self, im: ArrayView3<'_, F>, out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

impl<F: Real> ScaleFilter<F> for DoGFilter3D<F> {
    fn apply(&mut self, im: ArrayView3<'_, F>, out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

impl<F: Real> ScaleFilter<F> for GaussFilter3D<F> {
    fn apply(&mut self, im: ArrayView3<'_, F>, out: ArrayViewMut3<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

/// Multi-scale blob detector for stacks of 3D volumes.
#[derive(Debug, Clone)]
pub struct Boxxer3D<F: Real> {
    imsize: [usize; 3],
    sigma: Array2<F>,
    n_scales: usize,
    sigma_ratio: F,
    tuning: FilterTuning,
}

impl<F: Real> Boxxer3D<F> {
    /// `sigma` holds one column per scale:
    /// `[sigma_x; sigma_y; sigma_z] x nScales`, rows matching the `imsize`
    /// axis order.
    pub fn new(imsize: [usize; 3], sigma: Array2<F>) -> Result<Self> {
        Self::with_tuning(imsize, sigma, FilterTuning::default())
    }

    pub fn with_tuning(imsize: [usize; 3], sigma: Array2<F>, tuning: FilterTuning) -> Result<Self> {
        tuning.validate()?;
        let n_scales = sigma.ncols();
        if n_scales < 1 {
            return Err(Error::ParameterValue(
                "sigma matrix must have at least one scale column".into(),
            ));
        }
        if sigma.nrows() != 3 {
            return Err(Error::ParameterShape(format!(
                "sigma matrix has {} rows, expected 3",
                sigma.nrows()
            )));
        }
        if let Some(bad) = sigma.iter().find(|s| !(**s > F::zero())) {
            return Err(Error::ParameterValue(format!(
                "scale sigmas must be positive, got {bad}"
            )));
        }
        if imsize.contains(&0) {
            return Err(Error::ParameterValue(format!(
                "volume size must be positive, got {}x{}x{}",
                imsize[0], imsize[1], imsize[2]
            )));
        }
        Ok(Self {
            imsize,
            sigma,
            n_scales,
            sigma_ratio: F::from_f64(tuning.dog_sigma_ratio),
            tuning,
        })
    }

    pub fn imsize(&self) -> [usize; 3] {
        self.imsize
    }

    pub fn n_scales(&self) -> usize {
        self.n_scales
    }

    pub fn sigma(&self) -> &Array2<F> {
        &self.sigma
    }

    pub fn sigma_ratio(&self) -> F {
        self.sigma_ratio
    }

    pub fn set_dog_sigma_ratio(&mut self, sigma_ratio: F) -> Result<()> {
        if !(sigma_ratio > F::one()) {
            return Err(Error::ParameterValue(format!(
                "sigma_ratio must be > 1, got {sigma_ratio}"
            )));
        }
        self.sigma_ratio = sigma_ratio;
        Ok(())
    }

    pub fn make_volume_stack(&self, n_frames: usize) -> VolumeStack<F> {
        crate::stack::volume_stack(self.imsize, n_frames)
    }

    pub fn make_scaled_volume(&self) -> ScaledVolume<F> {
        scaled_volume(self.imsize, self.n_scales)
    }

    fn scale_sigma(&self, s: usize) -> [F; 3] {
        [self.sigma[[0, s]], self.sigma[[1, s]], self.sigma[[2, s]]]
    }

    fn make_log_filters(&self) -> Result<Vec<LoGFilter3D<F>>> {
        (0..self.n_scales)
            .map(|s| LoGFilter3D::with_tuning(self.imsize, self.scale_sigma(s), self.tuning))
            .collect()
    }

    fn make_dog_filters(&self) -> Result<Vec<DoGFilter3D<F>>> {
        (0..self.n_scales)
            .map(|s| {
                DoGFilter3D::with_tuning(
                    self.imsize,
                    self.scale_sigma(s),
                    self.sigma_ratio,
                    self.tuning,
                )
            })
            .collect()
    }

    /// LoG-filters one volume at every scale into `fim[.., .., .., s]`,
    /// scales running in parallel.
    pub fn filter_scaled_log(&self, im: &Volume<F>, fim: &mut ScaledVolume<F>) -> Result<()> {
        self.filter_scaled_with(im, fim, |boxxer, s| {
            LoGFilter3D::with_tuning(boxxer.imsize, boxxer.scale_sigma(s), boxxer.tuning)
        })
    }

    /// DoG-filters one volume at every scale into `fim[.., .., .., s]`.
    pub fn filter_scaled_dog(&self, im: &Volume<F>, fim: &mut ScaledVolume<F>) -> Result<()> {
        self.filter_scaled_with(im, fim, |boxxer, s| {
            DoGFilter3D::with_tuning(
                boxxer.imsize,
                boxxer.scale_sigma(s),
                boxxer.sigma_ratio,
                boxxer.tuning,
            )
        })
    }

    fn filter_scaled_with<T, MK>(
        &self,
        im: &Volume<F>,
        fim: &mut ScaledVolume<F>,
        make_filter: MK,
    ) -> Result<()>
    where
        T: ScaleFilter<F>,
        MK: Fn(&Self, usize) -> Result<T> + Sync,
    {
        self.check_volume_shape("input volume", im.dim())?;
        let (sx, sy, sz) = im.dim();
        if fim.dim() != (sx, sy, sz, self.n_scales) {
            return Err(Error::ParameterShape(format!(
                "scaled volume has shape {:?}, expected ({sx}, {sy}, {sz}, {})",
                fim.dim(),
                self.n_scales
            )));
        }
        // Each scale is one job; the filter with its scratch volumes lives
        // on the worker's stack.
        let results: Vec<Result<()>> = fim
            .axis_iter_mut(Axis(3))
            .into_par_iter()
            .enumerate()
            .map(|(s, fim_s)| -> Result<()> {
                let mut filter = make_filter(self, s)?;
                filter.apply(im.view(), fim_s)
            })
            .collect();
        drain_worker_results(results.into_iter())
    }

    /// Scale-space LoG maxima over a whole volume stack.
    ///
    /// Returns a `4 x N` coordinate table with rows `[x, y, z, frame]`; the
    /// scale index is consumed by the cross-scale rejection and dropped from
    /// the global output.
    pub fn scale_space_log_maxima(
        &self,
        im: &VolumeStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        self.scale_space_maxima_with(im, neighborhood, scale_neighborhood, || {
            self.make_log_filters()
        })
    }

    /// Scale-space DoG maxima over a whole volume stack; layout as
    /// [`scale_space_log_maxima`](Self::scale_space_log_maxima).
    pub fn scale_space_dog_maxima(
        &self,
        im: &VolumeStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        self.scale_space_maxima_with(im, neighborhood, scale_neighborhood, || {
            self.make_dog_filters()
        })
    }

    fn scale_space_maxima_with<T, MK>(
        &self,
        im: &VolumeStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
        make_filters: MK,
    ) -> Result<(Array2<u32>, Array1<F>)>
    where
        T: ScaleFilter<F>,
        MK: Fn() -> Result<Vec<T>> + Sync,
    {
        let (sx, sy, sz, n_t) = im.dim();
        self.check_volume_shape("input stack", (sx, sy, sz))?;
        validate_boxsize(&self.imsize, neighborhood)?;
        check_scale_neighborhood(scale_neighborhood)?;

        let results: Vec<Result<(Vec<[u32; 4]>, Vec<F>)>> = (0..n_t)
            .into_par_iter()
            .map_init(
                || -> Result<(Vec<T>, ScaledVolume<F>, Maxima3D<F>)> {
                    Ok((
                        make_filters()?,
                        self.make_scaled_volume(),
                        Maxima3D::new(self.imsize, neighborhood)?,
                    ))
                },
                |state, n| {
                    let (filters, sim, finder) = state.as_mut().map_err(|e| e.clone())?;
                    let frame = im.index_axis(Axis(3), n);
                    for (s, filter) in filters.iter_mut().enumerate() {
                        filter.apply(frame, sim.index_axis_mut(Axis(3), s))?;
                    }
                    let view = sim.view();
                    let (coords, vals) = frame_scale_maxima(&view, finder)?;
                    Ok(reject_scale_overlaps(
                        &view,
                        coords,
                        vals,
                        scale_neighborhood,
                    ))
                },
            )
            .collect();
        let frames = results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(combine_frame_tables(&frames, 3))
    }

    /// Maxima of a single already-filtered scale hyper-rectangle.
    ///
    /// Unlike the global table, the returned `4 x N` coordinates retain the
    /// scale index as their last row.
    pub fn scale_space_frame_maxima(
        &self,
        sim: &ScaledVolume<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        if sim.dim() != (self.imsize[0], self.imsize[1], self.imsize[2], self.n_scales) {
            return Err(Error::ParameterShape(format!(
                "scaled volume has shape {:?}, expected ({}, {}, {}, {})",
                sim.dim(),
                self.imsize[0],
                self.imsize[1],
                self.imsize[2],
                self.n_scales
            )));
        }
        validate_boxsize(&self.imsize, neighborhood)?;
        check_scale_neighborhood(scale_neighborhood)?;
        let mut finder = Maxima3D::new(self.imsize, neighborhood)?;
        let view = sim.view();
        let (coords, vals) = frame_scale_maxima(&view, &mut finder)?;
        let (coords, vals) = reject_scale_overlaps(&view, coords, vals, scale_neighborhood);
        Ok(maxima_table(&coords, &vals))
    }

    fn check_volume_shape(&self, what: &str, shape: (usize, usize, usize)) -> Result<()> {
        if shape != (self.imsize[0], self.imsize[1], self.imsize[2]) {
            return Err(Error::ParameterShape(format!(
                "{what} volumes are {}x{}x{}, detector expects {}x{}x{}",
                shape.0, shape.1, shape.2, self.imsize[0], self.imsize[1], self.imsize[2]
            )));
        }
        Ok(())
    }
}

/// Gauss-filters every volume of a stack, one worker-owned filter per thread.
pub fn filter_gauss<F: Real>(
    im: &VolumeStack<F>,
    fim: &mut VolumeStack<F>,
    sigma: [F; 3],
) -> Result<()> {
    let imsize = stack_volume_size(im, fim)?;
    filter_frames_with(im, fim, || GaussFilter3D::new(imsize, sigma))
}

/// LoG-filters every volume of a stack.
pub fn filter_log<F: Real>(
    im: &VolumeStack<F>,
    fim: &mut VolumeStack<F>,
    sigma: [F; 3],
) -> Result<()> {
    let imsize = stack_volume_size(im, fim)?;
    filter_frames_with(im, fim, || LoGFilter3D::new(imsize, sigma))
}

/// DoG-filters every volume of a stack.
pub fn filter_dog<F: Real>(
    im: &VolumeStack<F>,
    fim: &mut VolumeStack<F>,
    sigma: [F; 3],
    sigma_ratio: F,
) -> Result<()> {
    let imsize = stack_volume_size(im, fim)?;
    filter_frames_with(im, fim, || DoGFilter3D::new(imsize, sigma, sigma_ratio))
}

/// Strict local maxima of every volume in a stack, in parallel.
///
/// Returns a `4 x N` table with rows `[x, y, z, frame]` plus the values.
pub fn enumerate_image_maxima<F: Real>(
    im: &VolumeStack<F>,
    neighborhood: usize,
) -> Result<(Array2<u32>, Array1<F>)> {
    let (sx, sy, sz, n_t) = im.dim();
    let imsize = [sx, sy, sz];
    validate_boxsize(&imsize, neighborhood)?;
    let results: Vec<Result<(Vec<[u32; 3]>, Vec<F>)>> = (0..n_t)
        .into_par_iter()
        .map_init(
            || Maxima3D::<F>::new(imsize, neighborhood),
            |finder, n| {
                let finder = finder.as_mut().map_err(|e| e.clone())?;
                finder.find(&im.index_axis(Axis(3), n))?;
                Ok((finder.coords().to_vec(), finder.values().to_vec()))
            },
        )
        .collect();
    let frames = results.into_iter().collect::<Result<Vec<_>>>()?;
    Ok(combine_frame_tables(&frames, 3))
}

fn stack_volume_size<F: Real>(im: &VolumeStack<F>, fim: &VolumeStack<F>) -> Result<[usize; 3]> {
    if im.dim() != fim.dim() {
        return Err(Error::ParameterShape(format!(
            "filtered stack has shape {:?}, input is {:?}",
            fim.dim(),
            im.dim()
        )));
    }
    let (sx, sy, sz, _) = im.dim();
    Ok([sx, sy, sz])
}

fn filter_frames_with<F, T, MK>(
    im: &VolumeStack<F>,
    fim: &mut VolumeStack<F>,
    make: MK,
) -> Result<()>
where
    F: Real,
    T: ScaleFilter<F>,
    MK: Fn() -> Result<T> + Sync,
{
    let results: Vec<Result<()>> = fim
        .axis_iter_mut(Axis(3))
        .into_par_iter()
        .enumerate()
        .map_init(
            || make(),
            |filter, (n, fim_n)| -> Result<()> {
                let filter = filter.as_mut().map_err(|e| e.clone())?;
                filter.apply(im.index_axis(Axis(3), n), fim_n)
            },
        )
        .collect();
    drain_worker_results(results.into_iter())
}

/// Surfaces the first captured worker failure after the join.
fn drain_worker_results(results: impl Iterator<Item = Result<()>>) -> Result<()> {
    for r in results {
        r?;
    }
    Ok(())
}

/// Maxima of every scale slice, tagged with their scale index.
fn frame_scale_maxima<F: Real>(
    sim: &ArrayView4<'_, F>,
    finder: &mut Maxima3D<F>,
) -> Result<(Vec<[u32; 4]>, Vec<F>)> {
    let n_scales = sim.dim().3;
    let mut coords = Vec::new();
    let mut vals = Vec::new();
    for s in 0..n_scales {
        let slice = sim.index_axis(Axis(3), s);
        finder.find(&slice)?;
        for (c, &v) in finder.coords().iter().zip(finder.values()) {
            coords.push([c[0], c[1], c[2], s as u32]);
            vals.push(v);
        }
    }
    Ok((coords, vals))
}

/// Cross-scale non-maximum rejection over the clipped spatial box at every
/// scale; ties do not reject.
fn reject_scale_overlaps<F: Real>(
    sim: &ArrayView4<'_, F>,
    coords: Vec<[u32; 4]>,
    vals: Vec<F>,
    scale_neighborhood: usize,
) -> (Vec<[u32; 4]>, Vec<F>) {
    let delta = (scale_neighborhood - 1) / 2;
    let (sx, sy, sz, n_scales) = sim.dim();
    let mut kept_coords = Vec::with_capacity(coords.len());
    let mut kept_vals = Vec::with_capacity(vals.len());
    for (c, v) in coords.into_iter().zip(vals) {
        let (mx, my, mz) = (c[0] as usize, c[1] as usize, c[2] as usize);
        let x_lo = mx.saturating_sub(delta);
        let x_hi = (mx + delta).min(sx - 1);
        let y_lo = my.saturating_sub(delta);
        let y_hi = (my + delta).min(sy - 1);
        let z_lo = mz.saturating_sub(delta);
        let z_hi = (mz + delta).min(sz - 1);
        let mut dominated = false;
        'scan: for s in 0..n_scales {
            for z in z_lo..=z_hi {
                for y in y_lo..=y_hi {
                    for x in x_lo..=x_hi {
                        if sim[[x, y, z, s]] > v {
                            dominated = true;
                            break 'scan;
                        }
                    }
                }
            }
        }
        if !dominated {
            kept_coords.push(c);
            kept_vals.push(v);
        }
    }
    (kept_coords, kept_vals)
}

fn check_scale_neighborhood(scale_neighborhood: usize) -> Result<()> {
    if scale_neighborhood == 0 || scale_neighborhood % 2 == 0 {
        return Err(Error::ParameterValue(format!(
            "scale neighborhood size must be odd and >= 1, got {scale_neighborhood}"
        )));
    }
    Ok(())
}
