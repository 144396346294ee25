//! Separable FIR convolution passes over column-major buffers.
//!
//! Every pass convolves one axis of a 1D/2D/3D buffer against a symmetric
//! half-kernel with half-sample mirrored boundaries and writes into a
//! distinct output buffer. The fast variants sweep an axis of length
//! `L > 2*hw + 1` in three regions (leading mirror, interior, trailing
//! mirror); the `_small` variants enumerate every kernel offset with explicit
//! mirror clamping and double as the validation reference.
//!
//! Boundary policy is half-sample symmetric reflection without endpoint
//! repetition: `in[-1] == in[0]`, `in[-2] == in[1]`, `in[L] == in[L-1]`.

mod dim2;
mod dim3;

pub use dim2::{fir_2d_x, fir_2d_x_small, fir_2d_y, fir_2d_y_small};
pub use dim3::{fir_3d_x, fir_3d_x_small, fir_3d_y, fir_3d_y_small, fir_3d_z, fir_3d_z_small};

use crate::error::{Error, Result};
use crate::stack::Real;

/// Convolves a 1D signal against a half-kernel, mirrored boundaries.
///
/// Dispatches to [`fir_1d_small`] when the signal is too short for the
/// three-region sweep.
pub fn fir_1d<F: Real>(data: &[F], out: &mut [F], kernel: &[F]) {
    let hw = kernel.len() - 1;
    let size = data.len();
    assert_eq!(out.len(), size, "output length must match input");
    if size <= 2 * hw + 1 {
        return fir_1d_small(data, out, kernel);
    }
    // Leading boundary: indices below zero reflect to r - x - 1.
    for x in 0..hw {
        let mut val = kernel[0] * data[x];
        for r in 1..=x {
            val = val + kernel[r] * (data[x - r] + data[x + r]);
        }
        for r in (x + 1)..=hw {
            val = val + kernel[r] * (data[x + r] + data[r - x - 1]);
        }
        out[x] = val;
    }
    for x in hw..size - hw {
        let mut val = kernel[0] * data[x];
        for r in 1..=hw {
            val = val + kernel[r] * (data[x - r] + data[x + r]);
        }
        out[x] = val;
    }
    // Trailing boundary: indices past the end reflect to 2L - r - x - 1.
    for x in (size - hw)..size {
        let mut val = kernel[0] * data[x];
        for r in 1..=(size - x - 1) {
            val = val + kernel[r] * (data[x - r] + data[x + r]);
        }
        for r in (size - x)..=hw {
            val = val + kernel[r] * (data[x - r] + data[2 * size - r - x - 1]);
        }
        out[x] = val;
    }
}

/// Reference 1D pass: full offset enumeration with mirror clamping.
///
/// Valid for any signal length; contributions beyond double mirroring are
/// skipped.
pub fn fir_1d_small<F: Real>(data: &[F], out: &mut [F], kernel: &[F]) {
    let hw = kernel.len() as isize - 1;
    let size = data.len() as isize;
    assert_eq!(out.len(), data.len(), "output length must match input");
    for x in 0..size {
        let mut val = F::zero();
        for r in -hw..=hw {
            let i = x + r;
            if i < -size || i >= 2 * size {
                continue;
            }
            let j = if i < 0 {
                (-i - 1) as usize
            } else if i >= size {
                (2 * size - r - x - 1) as usize
            } else {
                i as usize
            };
            val = val + kernel[r.unsigned_abs()] * data[j];
        }
        out[x as usize] = val;
    }
}

/// In-place 1D pass using an `(hw+1) x hw` rolling buffer.
///
/// Avoids the second signal-sized allocation; produces exactly the same
/// values as [`fir_1d`] on signals long enough for the fast sweep.
pub fn fir_1d_inplace<F: Real>(data: &mut [F], kernel: &[F]) -> Result<()> {
    let hw = kernel.len() - 1;
    let size = data.len();
    if hw < 1 {
        return Err(Error::ParameterValue(
            "kernel half-width must be at least 1".into(),
        ));
    }
    if size < 2 * hw + 1 {
        return Err(Error::Logical(format!(
            "axis length {size} is too short for in-place half-width {hw}"
        )));
    }
    let nr = hw + 1;
    // buf column x holds kernel[j] * original(x) for the hw most recent
    // unconsumed input values.
    let mut buf = vec![F::zero(); nr * hw];
    for x in 0..hw {
        for j in 0..=hw {
            buf[j + nr * x] = kernel[j] * data[x];
        }
    }
    // Initial hw outputs, mirrored at the low edge.
    for x in 0..hw {
        let mut val = kernel[0] * data[x];
        let mut r = 1;
        while r <= x && x + r < hw {
            val = val + buf[r + nr * (x + r)] + buf[r + nr * (x - r)];
            r += 1;
        }
        while r <= x {
            val = val + kernel[r] * data[x + r] + buf[r + nr * (x - r)];
            r += 1;
        }
        while x + r < hw {
            val = val + buf[r + nr * (x + r)] + buf[r + nr * (r - x - 1)];
            r += 1;
        }
        while r <= hw {
            val = val + kernel[r] * data[x + r] + buf[r + nr * (r - x - 1)];
            r += 1;
        }
        data[x] = val;
    }
    // Seed x = hw..2*hw-1 with the partial sums the main loop expects.
    for x in hw..2 * hw {
        let mut val = F::zero();
        for r in (x - hw + 1)..=hw {
            val = val + buf[r + nr * ((x - r) % hw)];
        }
        for r in 0..=hw {
            buf[r + nr * (x % hw)] = kernel[r] * data[x];
        }
        data[x] = val;
    }
    for x in hw..size - hw {
        let x_idx = x % hw;
        let x_hw_val = buf[hw + nr * x_idx];
        let mut x_val = buf[nr * x_idx];
        for z in (x + 1)..(x + hw) {
            data[z] = data[z] + buf[(z - x) + nr * x_idx];
        }
        for j in 0..=hw {
            buf[j + nr * x_idx] = kernel[j] * data[x + hw];
        }
        data[x + hw] = x_hw_val;
        for j in 1..=hw {
            x_val = x_val + buf[j + nr * ((x + j) % hw)];
        }
        data[x] = data[x] + x_val;
    }
    // Final hw outputs, mirrored at the high edge.
    for x in (size - hw)..size {
        let x_idx = x % hw;
        let mut x_val = buf[nr * x_idx];
        let mut r = 1;
        while x + r < size {
            x_val = x_val + buf[r + nr * ((x + r) % hw)];
            r += 1;
        }
        while r <= hw {
            x_val = x_val + buf[r + nr * ((2 * size - r - x - 1) % hw)];
            r += 1;
        }
        for z in (x + 1)..size {
            data[z] = data[z] + buf[(z - x) + nr * x_idx];
        }
        data[x] = data[x] + x_val;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::gauss_fir_kernel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_signal(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.gen_range(0.0..1.0)).collect()
    }

    #[test]
    fn impulse_response_is_symmetric_bell_with_unit_sum() {
        let kernel = gauss_fir_kernel::<f64>(1.0, 3).unwrap();
        let data = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let mut out = [0.0; 7];
        fir_1d(&data, &mut out, &kernel);

        assert!(out[3] > out[2] && out[2] > out[1] && out[1] > out[0]);
        for r in 0..=3 {
            assert_eq!(out[3 - r], out[3 + r], "bell must be even about the impulse");
        }
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() <= 4.0 * f64::EPSILON);
    }

    #[test]
    fn mirror_boundary_at_the_low_edge() {
        // With half-sample mirroring, in[-1] == in[0] = 1 and in[-2] == in[1] = 0,
        // so out[0] = k0*1 + k1*(0 + 1) + k2*(0 + 0).
        let kernel = gauss_fir_kernel::<f64>(1.0, 2).unwrap();
        let data = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut out = [0.0; 6];
        fir_1d(&data, &mut out, &kernel);
        let expected = kernel[0] + kernel[1];
        assert!((out[0] - expected).abs() <= 4.0 * f64::EPSILON);
    }

    #[test]
    fn fast_matches_small_on_random_signals() {
        let mut rng = StdRng::seed_from_u64(11);
        for &n in &[8usize, 9, 16, 33, 64] {
            for hw in 1..=3usize {
                let kernel = gauss_fir_kernel::<f64>(0.5 * hw as f64 + 0.3, hw).unwrap();
                let data = random_signal(&mut rng, n);
                let mut fast = vec![0.0; n];
                let mut small = vec![0.0; n];
                fir_1d(&data, &mut fast, &kernel);
                fir_1d_small(&data, &mut small, &kernel);
                for x in 0..n {
                    assert!(
                        (fast[x] - small[x]).abs() <= 4.0 * f64::EPSILON,
                        "n={n} hw={hw} x={x}: {} != {}",
                        fast[x],
                        small[x]
                    );
                }
            }
        }
    }

    #[test]
    fn fast_matches_small_f32() {
        let mut rng = StdRng::seed_from_u64(12);
        let kernel = gauss_fir_kernel::<f32>(1.2f32, 3).unwrap();
        let data: Vec<f32> = (0..40).map(|_| rng.gen_range(0.0f32..1.0)).collect();
        let mut fast = vec![0.0f32; 40];
        let mut small = vec![0.0f32; 40];
        fir_1d(&data, &mut fast, &kernel);
        fir_1d_small(&data, &mut small, &kernel);
        for x in 0..40 {
            assert!((fast[x] - small[x]).abs() <= 4.0 * f32::EPSILON);
        }
    }

    #[test]
    fn short_signal_dispatches_to_reference() {
        let kernel = gauss_fir_kernel::<f64>(2.0, 4).unwrap();
        // size == 2*hw + 1 must take the reference path, not index out of range.
        let data = [0.3, 0.1, 0.8, 0.2, 0.9, 0.4, 0.5, 0.6, 0.7];
        let mut via_dispatch = [0.0; 9];
        let mut via_small = [0.0; 9];
        fir_1d(&data, &mut via_dispatch, &kernel);
        fir_1d_small(&data, &mut via_small, &kernel);
        assert_eq!(via_dispatch, via_small);
    }

    #[test]
    fn inplace_matches_two_buffer_variant() {
        let mut rng = StdRng::seed_from_u64(13);
        for &n in &[9usize, 17, 32, 61] {
            for hw in 1..=4usize {
                if n < 2 * hw + 2 {
                    continue;
                }
                let kernel = gauss_fir_kernel::<f64>(0.4 * hw as f64 + 0.5, hw).unwrap();
                let data = random_signal(&mut rng, n);
                let mut expected = vec![0.0; n];
                fir_1d(&data, &mut expected, &kernel);
                let mut inplace = data.clone();
                fir_1d_inplace(&mut inplace, &kernel).unwrap();
                for x in 0..n {
                    assert!(
                        (inplace[x] - expected[x]).abs() <= 4.0 * f64::EPSILON,
                        "n={n} hw={hw} x={x}: {} != {}",
                        inplace[x],
                        expected[x]
                    );
                }
            }
        }
    }

    #[test]
    fn inplace_rejects_short_signal() {
        let kernel = gauss_fir_kernel::<f64>(1.0, 3).unwrap();
        let mut data = [0.0; 6];
        assert!(matches!(
            fir_1d_inplace(&mut data, &kernel),
            Err(crate::error::Error::Logical(_))
        ));
    }
}
