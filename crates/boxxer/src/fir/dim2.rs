//! 2D per-axis FIR passes over column-major `(x, y)` buffers.
//!
//! Axis 0 (x) runs down contiguous columns, so the x pass reuses the 1D
//! sweep per column. The y pass walks rows at stride `size_x` with the same
//! three-region structure.

use super::{fir_1d, fir_1d_small};
use crate::stack::Real;

/// Filters along axis 0 of a column-major `size_x x size_y` buffer.
pub fn fir_2d_x<F: Real>(size_x: usize, size_y: usize, data: &[F], out: &mut [F], kernel: &[F]) {
    let hw = kernel.len() - 1;
    debug_assert_eq!(data.len(), size_x * size_y);
    debug_assert_eq!(out.len(), size_x * size_y);
    if size_x <= 2 * hw + 1 {
        return fir_2d_x_small(size_x, size_y, data, out, kernel);
    }
    for y in 0..size_y {
        let col = y * size_x;
        fir_1d(&data[col..col + size_x], &mut out[col..col + size_x], kernel);
    }
}

/// Reference variant of [`fir_2d_x`]: full enumeration per column.
pub fn fir_2d_x_small<F: Real>(
    size_x: usize,
    size_y: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    debug_assert_eq!(data.len(), size_x * size_y);
    debug_assert_eq!(out.len(), size_x * size_y);
    for y in 0..size_y {
        let col = y * size_x;
        fir_1d_small(&data[col..col + size_x], &mut out[col..col + size_x], kernel);
    }
}

/// Filters along axis 1 of a column-major `size_x x size_y` buffer.
pub fn fir_2d_y<F: Real>(size_x: usize, size_y: usize, data: &[F], out: &mut [F], kernel: &[F]) {
    let hw = kernel.len() - 1;
    debug_assert_eq!(data.len(), size_x * size_y);
    debug_assert_eq!(out.len(), size_x * size_y);
    if size_y <= 2 * hw + 1 {
        return fir_2d_y_small(size_x, size_y, data, out, kernel);
    }
    for y in 0..hw {
        let col = y * size_x;
        for x in 0..size_x {
            let mut val = kernel[0] * data[col + x];
            for r in 1..=y {
                val = val + kernel[r] * (data[col + x + size_x * r] + data[col + x - size_x * r]);
            }
            for r in (y + 1)..=hw {
                // Rows below zero reflect to r - y - 1.
                val = val + kernel[r] * (data[col + x + size_x * r] + data[x + size_x * (r - y - 1)]);
            }
            out[col + x] = val;
        }
    }
    for y in hw..size_y - hw {
        let col = y * size_x;
        for x in 0..size_x {
            let mut val = kernel[0] * data[col + x];
            for r in 1..=hw {
                val = val + kernel[r] * (data[col + x - size_x * r] + data[col + x + size_x * r]);
            }
            out[col + x] = val;
        }
    }
    for y in (size_y - hw)..size_y {
        let col = y * size_x;
        for x in 0..size_x {
            let mut val = kernel[0] * data[col + x];
            for r in 1..=(size_y - y - 1) {
                val = val + kernel[r] * (data[col + x - size_x * r] + data[col + x + size_x * r]);
            }
            for r in (size_y - y)..=hw {
                // Rows past the end reflect to 2*size_y - r - y - 1.
                val = val
                    + kernel[r]
                        * (data[col + x - size_x * r] + data[x + size_x * (2 * size_y - r - y - 1)]);
            }
            out[col + x] = val;
        }
    }
}

/// Reference variant of [`fir_2d_y`]: full enumeration with mirror clamping.
pub fn fir_2d_y_small<F: Real>(
    size_x: usize,
    size_y: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    let hw = kernel.len() as isize - 1;
    let sy = size_y as isize;
    debug_assert_eq!(data.len(), size_x * size_y);
    debug_assert_eq!(out.len(), size_x * size_y);
    for y in 0..sy {
        for x in 0..size_x {
            let mut val = F::zero();
            for r in -hw..=hw {
                let j = y + r;
                if j < -sy || j >= 2 * sy {
                    continue;
                }
                let row = if j < 0 {
                    (-j - 1) as usize
                } else if j >= sy {
                    (2 * sy - r - y - 1) as usize
                } else {
                    j as usize
                };
                val = val + kernel[r.unsigned_abs()] * data[x + size_x * row];
            }
            out[x + size_x * y as usize] = val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::gauss_fir_kernel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_image(rng: &mut StdRng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.gen_range(0.0..1.0)).collect()
    }

    #[test]
    fn x_pass_spreads_along_axis0_only() {
        let kernel = gauss_fir_kernel::<f64>(0.8, 1).unwrap();
        let (sx, sy) = (5usize, 3usize);
        let mut data = vec![0.0; sx * sy];
        data[2 + sx] = 1.0; // impulse at (2, 1)
        let mut out = vec![0.0; sx * sy];
        fir_2d_x(sx, sy, &data, &mut out, &kernel);

        assert!((out[2 + sx] - kernel[0]).abs() <= f64::EPSILON);
        assert!((out[1 + sx] - kernel[1]).abs() <= f64::EPSILON);
        assert!((out[3 + sx] - kernel[1]).abs() <= f64::EPSILON);
        // Neighboring columns stay untouched.
        assert_eq!(out[2], 0.0);
        assert_eq!(out[2 + 2 * sx], 0.0);
    }

    #[test]
    fn y_pass_spreads_along_axis1_only() {
        let kernel = gauss_fir_kernel::<f64>(0.8, 1).unwrap();
        let (sx, sy) = (3usize, 5usize);
        let mut data = vec![0.0; sx * sy];
        data[1 + sx * 2] = 1.0; // impulse at (1, 2)
        let mut out = vec![0.0; sx * sy];
        fir_2d_y(sx, sy, &data, &mut out, &kernel);

        assert!((out[1 + sx * 2] - kernel[0]).abs() <= f64::EPSILON);
        assert!((out[1 + sx] - kernel[1]).abs() <= f64::EPSILON);
        assert!((out[1 + sx * 3] - kernel[1]).abs() <= f64::EPSILON);
        assert_eq!(out[sx * 2], 0.0);
        assert_eq!(out[2 + sx * 2], 0.0);
    }

    #[test]
    fn fast_matches_small_on_random_images() {
        let mut rng = StdRng::seed_from_u64(21);
        for &(sx, sy) in &[(9usize, 9usize), (16, 7), (7, 16), (25, 25)] {
            for hw in 1..=3usize {
                let kernel = gauss_fir_kernel::<f64>(0.4 * hw as f64 + 0.4, hw).unwrap();
                let data = random_image(&mut rng, sx * sy);
                let mut fast = vec![0.0; sx * sy];
                let mut small = vec![0.0; sx * sy];

                fir_2d_x(sx, sy, &data, &mut fast, &kernel);
                fir_2d_x_small(sx, sy, &data, &mut small, &kernel);
                for i in 0..sx * sy {
                    assert!(
                        (fast[i] - small[i]).abs() <= 4.0 * f64::EPSILON,
                        "x pass {sx}x{sy} hw={hw} i={i}"
                    );
                }

                fir_2d_y(sx, sy, &data, &mut fast, &kernel);
                fir_2d_y_small(sx, sy, &data, &mut small, &kernel);
                for i in 0..sx * sy {
                    assert!(
                        (fast[i] - small[i]).abs() <= 4.0 * f64::EPSILON,
                        "y pass {sx}x{sy} hw={hw} i={i}"
                    );
                }
            }
        }
    }

    #[test]
    fn mirrored_boundary_preserves_constant_images() {
        let kernel = gauss_fir_kernel::<f64>(1.5, 4).unwrap();
        let (sx, sy) = (12usize, 10usize);
        let data = vec![0.75; sx * sy];
        let mut out = vec![0.0; sx * sy];
        fir_2d_y(sx, sy, &data, &mut out, &kernel);
        for (i, v) in out.iter().enumerate() {
            assert!(
                (v - 0.75).abs() <= 4.0 * f64::EPSILON,
                "unit-sum kernel with mirroring must keep constants, i={i} v={v}"
            );
        }
    }
}
