//! Shared validated state of every FIR filter object.

use crate::error::{Error, Result};
use crate::stack::Real;
use crate::tuning::FilterTuning;

/// Dimensionality, frame shape, per-axis sigmas and half-widths.
///
/// Validation happens here once; the concrete filter types only add kernels
/// and scratch buffers on top.
#[derive(Debug, Clone)]
pub(crate) struct FirFilterBase<F: Real> {
    pub dim: usize,
    pub size: Vec<usize>,
    pub sigma: Vec<F>,
    pub hw: Vec<usize>,
    pub tuning: FilterTuning,
}

impl<F: Real> FirFilterBase<F> {
    pub fn new(dim: usize, size: &[usize], sigma: &[F], tuning: FilterTuning) -> Result<Self> {
        tuning.validate()?;
        if !(1..=3).contains(&dim) {
            return Err(Error::ParameterValue(format!(
                "filter dimensionality must be 1, 2 or 3, got {dim}"
            )));
        }
        if size.len() != dim {
            return Err(Error::ParameterShape(format!(
                "size has {} elements, expected {dim}",
                size.len()
            )));
        }
        if let Some(&bad) = size.iter().find(|&&s| s == 0) {
            return Err(Error::ParameterValue(format!(
                "size axes must be positive, got {bad}"
            )));
        }
        if sigma.len() != dim {
            return Err(Error::ParameterShape(format!(
                "sigma has {} elements, expected {dim}",
                sigma.len()
            )));
        }
        if let Some(bad) = sigma.iter().find(|s| !(**s > F::zero())) {
            return Err(Error::ParameterValue(format!(
                "sigma must be positive, got {bad}"
            )));
        }
        let mut base = Self {
            dim,
            size: size.to_vec(),
            sigma: sigma.to_vec(),
            hw: Vec::new(),
            tuning,
        };
        let hw: Vec<usize> = base
            .sigma
            .iter()
            .map(|s| tuning.default_hw(s.as_f64()))
            .collect();
        base.set_hw(&hw)?;
        Ok(base)
    }

    pub fn set_hw(&mut self, hw: &[usize]) -> Result<()> {
        if hw.len() != self.dim {
            return Err(Error::ParameterShape(format!(
                "kernel half-width has {} elements, expected {}",
                hw.len(),
                self.dim
            )));
        }
        for &h in hw {
            if h < 1 {
                return Err(Error::ParameterValue(
                    "kernel half-width must be at least 1".into(),
                ));
            }
            if h > self.tuning.max_kernel_hw {
                return Err(Error::ParameterValue(format!(
                    "kernel half-width {h} exceeds max_kernel_hw {}",
                    self.tuning.max_kernel_hw
                )));
            }
        }
        self.hw = hw.to_vec();
        Ok(())
    }

    pub fn n_elem(&self) -> usize {
        self.size.iter().product()
    }

    /// Checks a 2D buffer shape against the filter's frame shape.
    pub fn check_shape_2d(&self, what: &str, shape: (usize, usize)) -> Result<()> {
        if shape != (self.size[0], self.size[1]) {
            return Err(Error::ParameterShape(format!(
                "{what} has shape {}x{}, filter expects {}x{}",
                shape.0, shape.1, self.size[0], self.size[1]
            )));
        }
        Ok(())
    }

    /// Checks a 3D buffer shape against the filter's frame shape.
    pub fn check_shape_3d(&self, what: &str, shape: (usize, usize, usize)) -> Result<()> {
        if shape != (self.size[0], self.size[1], self.size[2]) {
            return Err(Error::ParameterShape(format!(
                "{what} has shape {}x{}x{}, filter expects {}x{}x{}",
                shape.0, shape.1, shape.2, self.size[0], self.size[1], self.size[2]
            )));
        }
        Ok(())
    }
}
