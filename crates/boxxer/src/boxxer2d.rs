//! 2D scale-space orchestrator.
//!
//! Images are column-major with x as the fastest axis; a stack is
//! `(x, y, t)`. For every frame the orchestrator filters at each configured
//! scale, extracts strict maxima per scale, and rejects maxima dominated by
//! any nearby cell at any scale. Frames are processed by a rayon pool with
//! per-worker filter instances and scratch cubes; per-frame tables are
//! concatenated after the join.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, ArrayViewMut2, Axis};

use crate::error::{Error, Result};
use crate::filters::{DoGFilter2D, GaussFilter2D, LoGFilter2D};
use crate::maxima::{validate_boxsize, Maxima2D};
use crate::stack::{
    combine_frame_tables, maxima_table, scaled_image, ImageStack, Real, ScaledImage,
    ScaledImageStack,
};
use crate::tuning::FilterTuning;

/// One per-scale filter inside a worker's filter vector.
trait ScaleFilter<F: Real>: Send {
    fn apply(&mut self, im: ArrayView2<'_, F>, out: ArrayViewMut2<'_, F>) -> Result<()>;
}

impl<F: Real> ScaleFilter<F> for LoGFilter2D<F> {
    fn apply(&mut self, im: ArrayView2<'_, F>, out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

impl<F: Real> ScaleFilter<F> for DoGFilter2D<F> {
    fn apply(&mut self, im: ArrayView2<'_, F>, out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

impl<F: Real> ScaleFilter<F> for GaussFilter2D<F> {
    fn apply(&mut self, im: ArrayView2<'_, F>, out: ArrayViewMut2<'_, F>) -> Result<()> {
        self.filter(im, out)
    }
}

/// Multi-scale blob detector for stacks of 2D frames.
///
/// Immutable after construction except for the DoG sigma ratio.
#[derive(Debug, Clone)]
pub struct Boxxer2D<F: Real> {
    imsize: [usize; 2],
    sigma: Array2<F>,
    n_scales: usize,
    sigma_ratio: F,
    tuning: FilterTuning,
}

impl<F: Real> Boxxer2D<F> {
    /// `sigma` holds one column per scale: `[sigma_x; sigma_y] x nScales`.
    pub fn new(imsize: [usize; 2], sigma: Array2<F>) -> Result<Self> {
        Self::with_tuning(imsize, sigma, FilterTuning::default())
    }

    pub fn with_tuning(imsize: [usize; 2], sigma: Array2<F>, tuning: FilterTuning) -> Result<Self> {
        tuning.validate()?;
        let n_scales = sigma.ncols();
        if n_scales < 1 {
            return Err(Error::ParameterValue(
                "sigma matrix must have at least one scale column".into(),
            ));
        }
        if sigma.nrows() != 2 {
            return Err(Error::ParameterShape(format!(
                "sigma matrix has {} rows, expected 2",
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
                "image size must be positive, got {}x{}",
                imsize[0], imsize[1]
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

    pub fn imsize(&self) -> [usize; 2] {
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

    pub fn make_image_stack(&self, n_frames: usize) -> ImageStack<F> {
        crate::stack::image_stack(self.imsize, n_frames)
    }

    pub fn make_scaled_image(&self) -> ScaledImage<F> {
        scaled_image(self.imsize, self.n_scales)
    }

    pub fn make_scaled_image_stack(&self, n_frames: usize) -> ScaledImageStack<F> {
        crate::stack::scaled_image_stack(self.imsize, self.n_scales, n_frames)
    }

    fn scale_sigma(&self, s: usize) -> [F; 2] {
        [self.sigma[[0, s]], self.sigma[[1, s]]]
    }

    fn make_log_filters(&self) -> Result<Vec<LoGFilter2D<F>>> {
        (0..self.n_scales)
            .map(|s| LoGFilter2D::with_tuning(self.imsize, self.scale_sigma(s), self.tuning))
            .collect()
    }

    fn make_dog_filters(&self) -> Result<Vec<DoGFilter2D<F>>> {
        (0..self.n_scales)
            .map(|s| {
                DoGFilter2D::with_tuning(
                    self.imsize,
                    self.scale_sigma(s),
                    self.sigma_ratio,
                    self.tuning,
                )
            })
            .collect()
    }

    /// LoG-filters every frame at every scale into `fim[.., .., s, n]`.
    pub fn filter_scaled_log(
        &self,
        im: &ImageStack<F>,
        fim: &mut ScaledImageStack<F>,
    ) -> Result<()> {
        self.filter_scaled_with(im, fim, || self.make_log_filters())
    }

    /// DoG-filters every frame at every scale into `fim[.., .., s, n]`.
    pub fn filter_scaled_dog(
        &self,
        im: &ImageStack<F>,
        fim: &mut ScaledImageStack<F>,
    ) -> Result<()> {
        self.filter_scaled_with(im, fim, || self.make_dog_filters())
    }

    fn filter_scaled_with<T, MK>(
        &self,
        im: &ImageStack<F>,
        fim: &mut ScaledImageStack<F>,
        make_filters: MK,
    ) -> Result<()>
    where
        T: ScaleFilter<F>,
        MK: Fn() -> Result<Vec<T>> + Sync,
    {
        let (sx, sy, n_t) = im.dim();
        self.check_frame_shape("input stack", sx, sy)?;
        if fim.dim() != (sx, sy, self.n_scales, n_t) {
            return Err(Error::ParameterShape(format!(
                "scaled stack has shape {:?}, expected ({sx}, {sy}, {}, {n_t})",
                fim.dim(),
                self.n_scales
            )));
        }
        // Filter objects carry scratch storage, so every worker builds its
        // own vector, one filter per scale.
        let results: Vec<Result<()>> = fim
            .axis_iter_mut(Axis(3))
            .into_par_iter()
            .enumerate()
            .map_init(
                || make_filters(),
                |filters, (n, mut fim_n)| -> Result<()> {
                    let filters = filters.as_mut().map_err(|e| e.clone())?;
                    let frame = im.index_axis(Axis(2), n);
                    for (s, filter) in filters.iter_mut().enumerate() {
                        filter.apply(frame, fim_n.index_axis_mut(Axis(2), s))?;
                    }
                    Ok(())
                },
            )
            .collect();
        drain_worker_results(results.into_iter())
    }

    /// Scale-space LoG maxima over a whole stack.
    ///
    /// Returns a `3 x N` coordinate table with rows `[x, y, frame]` plus the
    /// filter responses; the scale index is consumed by the cross-scale
    /// rejection and dropped from the global output.
    pub fn scale_space_log_maxima(
        &self,
        im: &ImageStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        self.scale_space_maxima_with(im, neighborhood, scale_neighborhood, || {
            self.make_log_filters()
        })
    }

    /// Scale-space DoG maxima over a whole stack; layout as
    /// [`scale_space_log_maxima`](Self::scale_space_log_maxima).
    pub fn scale_space_dog_maxima(
        &self,
        im: &ImageStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        self.scale_space_maxima_with(im, neighborhood, scale_neighborhood, || {
            self.make_dog_filters()
        })
    }

    fn scale_space_maxima_with<T, MK>(
        &self,
        im: &ImageStack<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
        make_filters: MK,
    ) -> Result<(Array2<u32>, Array1<F>)>
    where
        T: ScaleFilter<F>,
        MK: Fn() -> Result<Vec<T>> + Sync,
    {
        let (sx, sy, n_t) = im.dim();
        self.check_frame_shape("input stack", sx, sy)?;
        validate_boxsize(&self.imsize, neighborhood)?;
        check_scale_neighborhood(scale_neighborhood)?;

        let results: Vec<Result<(Vec<[u32; 3]>, Vec<F>)>> = (0..n_t)
            .into_par_iter()
            .map_init(
                || -> Result<(Vec<T>, ScaledImage<F>, Maxima2D<F>)> {
                    Ok((
                        make_filters()?,
                        self.make_scaled_image(),
                        Maxima2D::new(self.imsize, neighborhood)?,
                    ))
                },
                |state, n| {
                    let (filters, sim, finder) = state.as_mut().map_err(|e| e.clone())?;
                    let frame = im.index_axis(Axis(2), n);
                    for (s, filter) in filters.iter_mut().enumerate() {
                        filter.apply(frame, sim.index_axis_mut(Axis(2), s))?;
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
        Ok(combine_frame_tables(&frames, 2))
    }

    /// Maxima of a single already-filtered scale cube.
    ///
    /// Unlike the global table, the returned `3 x N` coordinates retain the
    /// scale index as their last row.
    pub fn scale_space_frame_maxima(
        &self,
        sim: &ScaledImage<F>,
        neighborhood: usize,
        scale_neighborhood: usize,
    ) -> Result<(Array2<u32>, Array1<F>)> {
        if sim.dim() != (self.imsize[0], self.imsize[1], self.n_scales) {
            return Err(Error::ParameterShape(format!(
                "scaled image has shape {:?}, expected ({}, {}, {})",
                sim.dim(),
                self.imsize[0],
                self.imsize[1],
                self.n_scales
            )));
        }
        validate_boxsize(&self.imsize, neighborhood)?;
        check_scale_neighborhood(scale_neighborhood)?;
        let mut finder = Maxima2D::new(self.imsize, neighborhood)?;
        let view = sim.view();
        let (coords, vals) = frame_scale_maxima(&view, &mut finder)?;
        let (coords, vals) = reject_scale_overlaps(&view, coords, vals, scale_neighborhood);
        Ok(maxima_table(&coords, &vals))
    }

    fn check_frame_shape(&self, what: &str, sx: usize, sy: usize) -> Result<()> {
        if (sx, sy) != (self.imsize[0], self.imsize[1]) {
            return Err(Error::ParameterShape(format!(
                "{what} frames are {sx}x{sy}, detector expects {}x{}",
                self.imsize[0], self.imsize[1]
            )));
        }
        Ok(())
    }
}

/// Gauss-filters every frame of a stack, one worker-owned filter per thread.
pub fn filter_gauss<F: Real>(
    im: &ImageStack<F>,
    fim: &mut ImageStack<F>,
    sigma: [F; 2],
) -> Result<()> {
    let imsize = stack_frame_size(im, fim)?;
    filter_frames_with(im, fim, || GaussFilter2D::new(imsize, sigma))
}

/// LoG-filters every frame of a stack.
pub fn filter_log<F: Real>(
    im: &ImageStack<F>,
    fim: &mut ImageStack<F>,
    sigma: [F; 2],
) -> Result<()> {
    let imsize = stack_frame_size(im, fim)?;
    filter_frames_with(im, fim, || LoGFilter2D::new(imsize, sigma))
}

/// DoG-filters every frame of a stack.
pub fn filter_dog<F: Real>(
    im: &ImageStack<F>,
    fim: &mut ImageStack<F>,
    sigma: [F; 2],
    sigma_ratio: F,
) -> Result<()> {
    let imsize = stack_frame_size(im, fim)?;
    filter_frames_with(im, fim, || DoGFilter2D::new(imsize, sigma, sigma_ratio))
}

/// Strict local maxima of every frame in a stack, in parallel.
///
/// Returns a `3 x N` table with rows `[x, y, frame]` plus the values.
pub fn enumerate_image_maxima<F: Real>(
    im: &ImageStack<F>,
    neighborhood: usize,
) -> Result<(Array2<u32>, Array1<F>)> {
    let (sx, sy, n_t) = im.dim();
    let imsize = [sx, sy];
    validate_boxsize(&imsize, neighborhood)?;
    let results: Vec<Result<(Vec<[u32; 2]>, Vec<F>)>> = (0..n_t)
        .into_par_iter()
        .map_init(
            || Maxima2D::<F>::new(imsize, neighborhood),
            |finder, n| {
                let finder = finder.as_mut().map_err(|e| e.clone())?;
                finder.find(&im.index_axis(Axis(2), n))?;
                Ok((finder.coords().to_vec(), finder.values().to_vec()))
            },
        )
        .collect();
    let frames = results.into_iter().collect::<Result<Vec<_>>>()?;
    Ok(combine_frame_tables(&frames, 2))
}

fn stack_frame_size<F: Real>(im: &ImageStack<F>, fim: &ImageStack<F>) -> Result<[usize; 2]> {
    if im.dim() != fim.dim() {
        return Err(Error::ParameterShape(format!(
            "filtered stack has shape {:?}, input is {:?}",
            fim.dim(),
            im.dim()
        )));
    }
    let (sx, sy, _) = im.dim();
    Ok([sx, sy])
}

fn filter_frames_with<F, T, MK>(im: &ImageStack<F>, fim: &mut ImageStack<F>, make: MK) -> Result<()>
where
    F: Real,
    T: ScaleFilter<F>,
    MK: Fn() -> Result<T> + Sync,
{
    let results: Vec<Result<()>> = fim
        .axis_iter_mut(Axis(2))
        .into_par_iter()
        .enumerate()
        .map_init(
            || make(),
            |filter, (n, fim_n)| -> Result<()> {
                let filter = filter.as_mut().map_err(|e| e.clone())?;
                filter.apply(im.index_axis(Axis(2), n), fim_n)
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
    sim: &ArrayView3<'_, F>,
    finder: &mut Maxima2D<F>,
) -> Result<(Vec<[u32; 3]>, Vec<F>)> {
    let n_scales = sim.dim().2;
    let mut coords = Vec::new();
    let mut vals = Vec::new();
    for s in 0..n_scales {
        let slice = sim.index_axis(Axis(2), s);
        finder.find(&slice)?;
        for (c, &v) in finder.coords().iter().zip(finder.values()) {
            coords.push([c[0], c[1], s as u32]);
            vals.push(v);
        }
    }
    Ok((coords, vals))
}

/// Cross-scale non-maximum rejection: a maximum survives only if no cell in
/// the clipped spatial box around it, at any scale, strictly exceeds it.
fn reject_scale_overlaps<F: Real>(
    sim: &ArrayView3<'_, F>,
    coords: Vec<[u32; 3]>,
    vals: Vec<F>,
    scale_neighborhood: usize,
) -> (Vec<[u32; 3]>, Vec<F>) {
    let delta = (scale_neighborhood - 1) / 2;
    let (sx, sy, n_scales) = sim.dim();
    let mut kept_coords = Vec::with_capacity(coords.len());
    let mut kept_vals = Vec::with_capacity(vals.len());
    for (c, v) in coords.into_iter().zip(vals) {
        let (mx, my) = (c[0] as usize, c[1] as usize);
        let x_lo = mx.saturating_sub(delta);
        let x_hi = (mx + delta).min(sx - 1);
        let y_lo = my.saturating_sub(delta);
        let y_hi = (my + delta).min(sy - 1);
        let mut dominated = false;
        'scan: for s in 0..n_scales {
            for y in y_lo..=y_hi {
                for x in x_lo..=x_hi {
                    if sim[[x, y, s]] > v {
                        dominated = true;
                        break 'scan;
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
