//! boxxer: scale-space Gaussian blob detection for single-molecule
//! microscopy stacks.
//!
//! Given a time series of 2D frames or 3D volumes and a set of
//! characteristic blob widths, the detector returns the integer coordinates
//! and filter responses of candidate emitters. The pipeline stages are:
//!
//! 1. **Kernels** – Gaussian and Laplacian-of-Gaussian FIR half-kernels.
//! 2. **FIR** – per-axis separable convolution over column-major buffers
//!    with mirrored boundaries, fast three-region sweeps plus reference
//!    variants.
//! 3. **Filters** – per-scale Gauss/DoG/LoG filter objects owning kernels
//!    and scratch buffers.
//! 4. **Maxima** – strict local-maxima finders with a skip-table fast core,
//!    boundary enumeration and arbitrary odd-neighborhood refinement.
//! 5. **Scale space** – [`Boxxer2D`] / [`Boxxer3D`] filter every frame at
//!    every scale, extract per-scale maxima, reject across scales and merge
//!    per-frame tables over a rayon worker pool.
//!
//! All image data is dense column-major (`ndarray` Fortran layout) with axis
//! 0 the fastest-varying; element types are `f32` or `f64` via the [`Real`]
//! trait. Nothing here performs I/O: the host adapter hands in typed,
//! shape-checked arrays and receives coordinate tables back.
//!
//! # Example
//!
//! ```
//! use boxxer::Boxxer2D;
//! use ndarray::{Array2, ShapeBuilder};
//!
//! // Three scales, the same sigma for both image axes.
//! let sigma = Array2::from_shape_vec(
//!     (2, 3).f(),
//!     vec![1.0f32, 1.0, 1.5, 1.5, 2.0, 2.0],
//! )
//! .unwrap();
//! let boxxer = Boxxer2D::new([64, 64], sigma).unwrap();
//! let frames = boxxer.make_image_stack(8);
//! let (coords, values) = boxxer.scale_space_log_maxima(&frames, 3, 3).unwrap();
//! assert_eq!(coords.nrows(), 3); // rows are [x, y, frame]
//! assert_eq!(coords.ncols(), values.len());
//! ```

mod error;
mod filters;
mod fir;
mod kernels;
mod maxima;
mod tuning;

pub mod boxxer2d;
pub mod boxxer3d;
pub mod stack;

pub use boxxer2d::Boxxer2D;
pub use boxxer3d::Boxxer3D;
pub use error::{Error, Result};
pub use filters::{
    DoGFilter2D, DoGFilter3D, GaussFilter2D, GaussFilter3D, LoGFilter2D, LoGFilter3D,
};
pub use fir::{
    fir_1d, fir_1d_inplace, fir_1d_small, fir_2d_x, fir_2d_x_small, fir_2d_y, fir_2d_y_small,
    fir_3d_x, fir_3d_x_small, fir_3d_y, fir_3d_y_small, fir_3d_z, fir_3d_z_small,
};
pub use kernels::{
    gauss_fir_kernel, log_fir_kernel, DEFAULT_DOG_SIGMA_RATIO, DEFAULT_SIGMA_HW_RATIO,
    MAX_KERNEL_HW,
};
pub use maxima::{Maxima2D, Maxima3D};
pub use stack::{
    Image, ImageStack, Real, ScaledImage, ScaledImageStack, ScaledVolume, Volume, VolumeStack,
};
pub use tuning::FilterTuning;
