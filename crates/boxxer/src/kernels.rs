//! Half-kernel builders for the separable FIR filter bank.
//!
//! A half-kernel stores coefficients for offsets `0..=hw` of a symmetric
//! filter; the implied full kernel of width `2*hw + 1` reads index `|r|`.
//! Coefficients are accumulated in `f64` and narrowed once at the end, so the
//! `f32` instantiation sees correctly rounded values.

use crate::error::{Error, Result};
use crate::stack::Real;

/// Hard ceiling on kernel half-widths.
pub const MAX_KERNEL_HW: usize = 64;

/// Default ratio between kernel half-width and sigma (`hw = ceil(3 * sigma)`).
pub const DEFAULT_SIGMA_HW_RATIO: f64 = 3.0;

/// Default inhibitory/excitatory sigma ratio for DoG filters.
pub const DEFAULT_DOG_SIGMA_RATIO: f64 = 1.1;

fn check_kernel_params(sigma: f64, hw: usize) -> Result<()> {
    if !(sigma > 0.0) {
        return Err(Error::ParameterValue(format!(
            "kernel sigma must be positive, got {sigma}"
        )));
    }
    if hw < 1 {
        return Err(Error::ParameterValue(
            "kernel half-width must be at least 1".into(),
        ));
    }
    if hw > MAX_KERNEL_HW {
        return Err(Error::ParameterValue(format!(
            "kernel half-width {hw} exceeds the ceiling {MAX_KERNEL_HW}"
        )));
    }
    Ok(())
}

/// Gaussian half-kernel at `sigma` with half-width `hw`.
///
/// Normalized so that the implied full kernel sums to one:
/// `k[0] + 2 * sum(k[1..]) == 1`.
pub fn gauss_fir_kernel<F: Real>(sigma: F, hw: usize) -> Result<Vec<F>> {
    let s = sigma.as_f64();
    check_kernel_params(s, hw)?;
    let exp_norm = -0.5 / (s * s);
    let mut kernel = vec![0.0f64; hw + 1];
    kernel[0] = 1.0;
    let mut sum = 1.0;
    for (r, k) in kernel.iter_mut().enumerate().skip(1) {
        let val = ((r * r) as f64 * exp_norm).exp();
        *k = val;
        sum += 2.0 * val;
    }
    Ok(kernel.iter().map(|&k| F::from_f64(k / sum)).collect())
}

/// Laplacian-of-Gaussian half-kernel at `sigma` with half-width `hw`.
///
/// `k[r] = N * (1 - r^2/sigma^2) * exp(-r^2 / (2 sigma^2))` with
/// `N = 1 / (sigma^2 * sqrt(2 pi))`, i.e. the sigma-normalized negated second
/// derivative of a Gaussian, positive at the center.
///
/// With `zero_sum` the center coefficient is shifted so the implied full
/// kernel sums to zero, removing the DC response.
pub fn log_fir_kernel<F: Real>(sigma: F, hw: usize, zero_sum: bool) -> Result<Vec<F>> {
    let s = sigma.as_f64();
    check_kernel_params(s, hw)?;
    let sigma_norm = 1.0 / (s * s);
    let norm = sigma_norm / (2.0 * std::f64::consts::PI).sqrt();
    let exp_norm = -0.5 * sigma_norm;
    let mut kernel = vec![0.0f64; hw + 1];
    kernel[0] = norm;
    let mut sum = norm;
    for (r, k) in kernel.iter_mut().enumerate().skip(1) {
        let rsq = (r * r) as f64;
        let val = norm * (1.0 - rsq * sigma_norm) * (rsq * exp_norm).exp();
        *k = val;
        sum += 2.0 * val;
    }
    if zero_sum {
        kernel[0] -= sum;
    }
    Ok(kernel.iter().map(|&k| F::from_f64(k)).collect())
}
