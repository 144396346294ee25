//! Per-scale separable filter objects.
//!
//! Each filter owns its kernels and scratch buffers sized for one frame, so a
//! single instance is cheap to keep per worker thread but must not be shared
//! across concurrent invocations.

mod base;
mod dog;
mod gauss;
mod log;

pub(crate) use base::FirFilterBase;
pub use dog::{DoGFilter2D, DoGFilter3D};
pub use gauss::{GaussFilter2D, GaussFilter3D};
pub use log::{LoGFilter2D, LoGFilter3D};
