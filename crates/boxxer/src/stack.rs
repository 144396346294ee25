//! Column-major image, volume and stack types shared by the whole crate.
//!
//! Axis 0 is always the fastest-varying axis. Every array produced here is
//! laid out in Fortran (column-major) order so that per-axis filter passes can
//! run over contiguous or constant-stride memory, matching the storage the
//! host adapter hands in.

use core::fmt;

use ndarray::{Array1, Array2, Array3, Array4, ArrayView, ArrayViewMut, Dimension, ShapeBuilder};
use num_traits::Float;

use crate::error::{Error, Result};

/// Element type of all image data: exactly the two IEEE-754 widths.
///
/// The trait keeps the generic surface small; inner loops are monomorphized
/// and never dispatch at runtime.
pub trait Real: Float + fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn from_f64(v: f64) -> Self;
    fn as_f64(self) -> f64;
}

impl Real for f32 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

/// A single 2D frame, shape `(x, y)`.
pub type Image<F> = Array2<F>;
/// A time series of 2D frames, shape `(x, y, t)`.
pub type ImageStack<F> = Array3<F>;
/// One 2D frame filtered at every scale, shape `(x, y, s)`.
pub type ScaledImage<F> = Array3<F>;
/// A time series of scale cubes, shape `(x, y, s, t)`.
pub type ScaledImageStack<F> = Array4<F>;

/// A single 3D frame (hyper-spectral or volumetric), shape `(x, y, z)`.
pub type Volume<F> = Array3<F>;
/// A time series of volumes, shape `(x, y, z, t)`.
pub type VolumeStack<F> = Array4<F>;
/// One volume filtered at every scale, shape `(x, y, z, s)`.
pub type ScaledVolume<F> = Array4<F>;

pub fn image<F: Real>(imsize: [usize; 2]) -> Image<F> {
    Array2::zeros((imsize[0], imsize[1]).f())
}

pub fn image_stack<F: Real>(imsize: [usize; 2], n_frames: usize) -> ImageStack<F> {
    Array3::zeros((imsize[0], imsize[1], n_frames).f())
}

pub fn scaled_image<F: Real>(imsize: [usize; 2], n_scales: usize) -> ScaledImage<F> {
    Array3::zeros((imsize[0], imsize[1], n_scales).f())
}

pub fn scaled_image_stack<F: Real>(
    imsize: [usize; 2],
    n_scales: usize,
    n_frames: usize,
) -> ScaledImageStack<F> {
    Array4::zeros((imsize[0], imsize[1], n_scales, n_frames).f())
}

pub fn volume<F: Real>(imsize: [usize; 3]) -> Volume<F> {
    Array3::zeros((imsize[0], imsize[1], imsize[2]).f())
}

pub fn volume_stack<F: Real>(imsize: [usize; 3], n_frames: usize) -> VolumeStack<F> {
    Array4::zeros((imsize[0], imsize[1], imsize[2], n_frames).f())
}

pub fn scaled_volume<F: Real>(imsize: [usize; 3], n_scales: usize) -> ScaledVolume<F> {
    Array4::zeros((imsize[0], imsize[1], imsize[2], n_scales).f())
}

/// Builds a 2D frame stack from a column-major flat buffer without copying.
///
/// This is the host-adapter entry point: the adapter hands over a pointer
/// plus an explicit shape, and the length check happens here.
pub fn image_stack_from_vec<F: Real>(
    imsize: [usize; 2],
    n_frames: usize,
    data: Vec<F>,
) -> Result<ImageStack<F>> {
    Array3::from_shape_vec((imsize[0], imsize[1], n_frames).f(), data).map_err(|e| {
        Error::ParameterShape(format!(
            "stack buffer does not match shape {}x{}x{}: {e}",
            imsize[0], imsize[1], n_frames
        ))
    })
}

/// Builds a 3D volume stack from a column-major flat buffer without copying.
pub fn volume_stack_from_vec<F: Real>(
    imsize: [usize; 3],
    n_frames: usize,
    data: Vec<F>,
) -> Result<VolumeStack<F>> {
    Array4::from_shape_vec((imsize[0], imsize[1], imsize[2], n_frames).f(), data).map_err(|e| {
        Error::ParameterShape(format!(
            "stack buffer does not match shape {}x{}x{}x{}: {e}",
            imsize[0], imsize[1], imsize[2], n_frames
        ))
    })
}

/// Borrows the column-major contiguous memory behind a view.
///
/// Interior passes index this slice manually with explicit strides, so the
/// layout must be exactly Fortran-contiguous. Arrays built by this crate
/// always are; anything else is a broken interior invariant.
pub(crate) fn fslice<'v, F, D>(what: &str, v: &'v ArrayView<'_, F, D>) -> Result<&'v [F]>
where
    D: Dimension,
{
    if v.t().is_standard_layout() {
        if let Some(s) = v.as_slice_memory_order() {
            return Ok(s);
        }
    }
    Err(Error::Logical(format!(
        "{what} buffer is not column-major contiguous"
    )))
}

/// Mutable counterpart of [`fslice`].
pub(crate) fn fslice_mut<'v, F, D>(
    what: &str,
    v: &'v mut ArrayViewMut<'_, F, D>,
) -> Result<&'v mut [F]>
where
    D: Dimension,
{
    if !v.t().is_standard_layout() {
        return Err(Error::Logical(format!(
            "{what} buffer is not column-major contiguous"
        )));
    }
    v.as_slice_memory_order_mut().ok_or_else(|| {
        Error::Logical(format!("{what} buffer is not column-major contiguous"))
    })
}

/// Packs parallel coordinate/value vectors into the caller-facing table pair:
/// a `D x N` column-major coordinate matrix and an `N` value vector.
pub(crate) fn maxima_table<F: Real, const D: usize>(
    coords: &[[u32; D]],
    vals: &[F],
) -> (Array2<u32>, Array1<F>) {
    debug_assert_eq!(coords.len(), vals.len());
    let mut flat = Vec::with_capacity(D * coords.len());
    for c in coords {
        flat.extend_from_slice(c);
    }
    let table = Array2::from_shape_vec((D, coords.len()).f(), flat)
        .expect("coordinate table dimensions are consistent by construction");
    (table, Array1::from_vec(vals.to_vec()))
}

/// Concatenates per-frame maxima tables into the global table.
///
/// Keeps the first `keep_rows` coordinate rows of each entry and appends the
/// frame index as the final row. The row count comes from `keep_rows`, never
/// from the first frame, so a run with zero maxima still yields a well-formed
/// `(keep_rows + 1) x 0` table.
pub(crate) fn combine_frame_tables<F: Real, const D: usize>(
    frames: &[(Vec<[u32; D]>, Vec<F>)],
    keep_rows: usize,
) -> (Array2<u32>, Array1<F>) {
    debug_assert!(keep_rows <= D);
    let total: usize = frames.iter().map(|(coords, _)| coords.len()).sum();
    let rows = keep_rows + 1;
    let mut flat = Vec::with_capacity(rows * total);
    let mut vals = Vec::with_capacity(total);
    for (n, (coords, frame_vals)) in frames.iter().enumerate() {
        debug_assert_eq!(coords.len(), frame_vals.len());
        for c in coords {
            flat.extend_from_slice(&c[..keep_rows]);
            flat.push(n as u32);
        }
        vals.extend_from_slice(frame_vals);
    }
    let table = Array2::from_shape_vec((rows, total).f(), flat)
        .expect("combined table dimensions are consistent by construction");
    (table, Array1::from_vec(vals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacks_are_column_major() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let stack = image_stack_from_vec([2, 3], 4, data).expect("matching buffer");

        // Axis 0 is fastest-varying.
        assert_eq!(stack[[0, 0, 0]], 0.0);
        assert_eq!(stack[[1, 0, 0]], 1.0);
        assert_eq!(stack[[0, 1, 0]], 2.0);
        assert_eq!(stack[[0, 0, 1]], 6.0);
    }

    #[test]
    fn from_vec_rejects_wrong_length() {
        let err = image_stack_from_vec([4, 4], 2, vec![0.0f64; 31]).unwrap_err();
        assert!(matches!(err, Error::ParameterShape(_)));
    }

    #[test]
    fn fslice_roundtrip() {
        let stack = image_stack::<f64>([3, 2], 2);
        let frame = stack.index_axis(ndarray::Axis(2), 1);
        let s = fslice("frame", &frame).expect("frame slices are contiguous");
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn fslice_rejects_row_major() {
        let arr = Array2::<f32>::zeros((3, 4));
        let view = arr.view();
        assert!(fslice("c-order", &view).is_err());
    }

    #[test]
    fn combine_drops_trailing_rows_and_appends_frames() {
        let frames = vec![
            (vec![[1u32, 2, 9], [3, 4, 8]], vec![0.5f64, 0.25]),
            (vec![], vec![]),
            (vec![[5, 6, 7]], vec![0.125]),
        ];
        let (table, vals) = combine_frame_tables(&frames, 2);
        assert_eq!(table.shape(), &[3, 3]);
        // Scale row (index 2) is dropped, frame index appended.
        assert_eq!(
            (0..3).map(|n| [table[[0, n]], table[[1, n]], table[[2, n]]]).collect::<Vec<_>>(),
            vec![[1, 2, 0], [3, 4, 0], [5, 6, 2]]
        );
        assert_eq!(vals.to_vec(), vec![0.5, 0.25, 0.125]);
    }

    #[test]
    fn combine_handles_all_empty_frames() {
        let frames: Vec<(Vec<[u32; 3]>, Vec<f32>)> = vec![(vec![], vec![]), (vec![], vec![])];
        let (table, vals) = combine_frame_tables(&frames, 2);
        assert_eq!(table.shape(), &[3, 0]);
        assert!(vals.is_empty());
    }

    #[test]
    fn maxima_table_layout() {
        let coords = [[1u32, 2, 0], [3, 4, 1]];
        let vals = [0.5f32, 0.25];
        let (table, v) = maxima_table(&coords, &vals);
        assert_eq!(table.shape(), &[3, 2]);
        assert_eq!(table[[0, 0]], 1);
        assert_eq!(table[[2, 1]], 1);
        assert_eq!(v[1], 0.25);
    }
}
