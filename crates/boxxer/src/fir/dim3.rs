//! 3D per-axis FIR passes over column-major `(x, y, z)` buffers.
//!
//! The x pass reuses the 1D sweep over contiguous runs, the y pass reuses the
//! 2D strided pass per z-slab, and the z pass walks stride
//! `size_x * size_y` directly.

use super::{fir_1d, fir_1d_small, fir_2d_y, fir_2d_y_small};
use crate::stack::Real;

/// Filters along axis 0 of a column-major `size_x x size_y x size_z` buffer.
pub fn fir_3d_x<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    let hw = kernel.len() - 1;
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    if size_x <= 2 * hw + 1 {
        return fir_3d_x_small(size_x, size_y, size_z, data, out, kernel);
    }
    for z in 0..size_z {
        for y in 0..size_y {
            let run = size_x * (y + z * size_y);
            fir_1d(&data[run..run + size_x], &mut out[run..run + size_x], kernel);
        }
    }
}

/// Reference variant of [`fir_3d_x`].
pub fn fir_3d_x_small<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    for z in 0..size_z {
        for y in 0..size_y {
            let run = size_x * (y + z * size_y);
            fir_1d_small(&data[run..run + size_x], &mut out[run..run + size_x], kernel);
        }
    }
}

/// Filters along axis 1, one z-slab at a time.
pub fn fir_3d_y<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    let hw = kernel.len() - 1;
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    if size_y <= 2 * hw + 1 {
        return fir_3d_y_small(size_x, size_y, size_z, data, out, kernel);
    }
    let slab = size_x * size_y;
    for z in 0..size_z {
        let base = z * slab;
        fir_2d_y(
            size_x,
            size_y,
            &data[base..base + slab],
            &mut out[base..base + slab],
            kernel,
        );
    }
}

/// Reference variant of [`fir_3d_y`].
pub fn fir_3d_y_small<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    let slab = size_x * size_y;
    for z in 0..size_z {
        let base = z * slab;
        fir_2d_y_small(
            size_x,
            size_y,
            &data[base..base + slab],
            &mut out[base..base + slab],
            kernel,
        );
    }
}

/// Filters along axis 2 at stride `size_x * size_y`.
pub fn fir_3d_z<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    let hw = kernel.len() - 1;
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    if size_z <= 2 * hw + 1 {
        return fir_3d_z_small(size_x, size_y, size_z, data, out, kernel);
    }
    let slab = size_x * size_y;
    for y in 0..size_y {
        for x in 0..size_x {
            let base = x + size_x * y;
            for z in 0..hw {
                let mut val = kernel[0] * data[base + slab * z];
                for r in 1..=z {
                    val = val + kernel[r] * (data[base + slab * (z + r)] + data[base + slab * (z - r)]);
                }
                for r in (z + 1)..=hw {
                    // Planes below zero reflect to r - z - 1.
                    val = val + kernel[r] * (data[base + slab * (z + r)] + data[base + slab * (r - z - 1)]);
                }
                out[base + slab * z] = val;
            }
            for z in hw..size_z - hw {
                let mut val = kernel[0] * data[base + slab * z];
                for r in 1..=hw {
                    val = val + kernel[r] * (data[base + slab * (z - r)] + data[base + slab * (z + r)]);
                }
                out[base + slab * z] = val;
            }
            for z in (size_z - hw)..size_z {
                let mut val = kernel[0] * data[base + slab * z];
                for r in 1..=(size_z - z - 1) {
                    val = val + kernel[r] * (data[base + slab * (z - r)] + data[base + slab * (z + r)]);
                }
                for r in (size_z - z)..=hw {
                    // Planes past the end reflect to 2*size_z - r - z - 1.
                    val = val
                        + kernel[r]
                            * (data[base + slab * (z - r)]
                                + data[base + slab * (2 * size_z - r - z - 1)]);
                }
                out[base + slab * z] = val;
            }
        }
    }
}

/// Reference variant of [`fir_3d_z`].
pub fn fir_3d_z_small<F: Real>(
    size_x: usize,
    size_y: usize,
    size_z: usize,
    data: &[F],
    out: &mut [F],
    kernel: &[F],
) {
    let hw = kernel.len() as isize - 1;
    let sz = size_z as isize;
    debug_assert_eq!(data.len(), size_x * size_y * size_z);
    debug_assert_eq!(out.len(), size_x * size_y * size_z);
    let slab = size_x * size_y;
    for z in 0..sz {
        for y in 0..size_y {
            for x in 0..size_x {
                let base = x + size_x * y;
                let mut val = F::zero();
                for r in -hw..=hw {
                    let k = z + r;
                    if k < -sz || k >= 2 * sz {
                        continue;
                    }
                    let plane = if k < 0 {
                        (-k - 1) as usize
                    } else if k >= sz {
                        (2 * sz - r - z - 1) as usize
                    } else {
                        k as usize
                    };
                    val = val + kernel[r.unsigned_abs()] * data[base + slab * plane];
                }
                out[base + slab * z as usize] = val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::gauss_fir_kernel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn z_pass_spreads_along_axis2_only() {
        let kernel = gauss_fir_kernel::<f64>(0.8, 1).unwrap();
        let (sx, sy, sz) = (3usize, 3usize, 5usize);
        let slab = sx * sy;
        let mut data = vec![0.0; sx * sy * sz];
        data[1 + sx + slab * 2] = 1.0; // impulse at (1, 1, 2)
        let mut out = vec![0.0; sx * sy * sz];
        fir_3d_z(sx, sy, sz, &data, &mut out, &kernel);

        assert!((out[1 + sx + slab * 2] - kernel[0]).abs() <= f64::EPSILON);
        assert!((out[1 + sx + slab] - kernel[1]).abs() <= f64::EPSILON);
        assert!((out[1 + sx + slab * 3] - kernel[1]).abs() <= f64::EPSILON);
        assert_eq!(out[sx + slab * 2], 0.0);
        assert_eq!(out[2 + sx + slab * 2], 0.0);
    }

    #[test]
    fn fast_matches_small_on_random_volumes() {
        let mut rng = StdRng::seed_from_u64(31);
        let (sx, sy, sz) = (9usize, 8usize, 10usize);
        let n = sx * sy * sz;
        for hw in 1..=3usize {
            let kernel = gauss_fir_kernel::<f64>(0.4 * hw as f64 + 0.4, hw).unwrap();
            let data: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
            let mut fast = vec![0.0; n];
            let mut small = vec![0.0; n];

            fir_3d_x(sx, sy, sz, &data, &mut fast, &kernel);
            fir_3d_x_small(sx, sy, sz, &data, &mut small, &kernel);
            for i in 0..n {
                assert!((fast[i] - small[i]).abs() <= 4.0 * f64::EPSILON, "x i={i} hw={hw}");
            }

            fir_3d_y(sx, sy, sz, &data, &mut fast, &kernel);
            fir_3d_y_small(sx, sy, sz, &data, &mut small, &kernel);
            for i in 0..n {
                assert!((fast[i] - small[i]).abs() <= 4.0 * f64::EPSILON, "y i={i} hw={hw}");
            }

            fir_3d_z(sx, sy, sz, &data, &mut fast, &kernel);
            fir_3d_z_small(sx, sy, sz, &data, &mut small, &kernel);
            for i in 0..n {
                assert!((fast[i] - small[i]).abs() <= 4.0 * f64::EPSILON, "z i={i} hw={hw}");
            }
        }
    }

    #[test]
    fn axis_passes_commute_on_separable_input() {
        // Gaussian smoothing along x then z must equal z then x.
        let kx = gauss_fir_kernel::<f64>(1.0, 2).unwrap();
        let kz = gauss_fir_kernel::<f64>(1.3, 2).unwrap();
        let (sx, sy, sz) = (8usize, 6usize, 7usize);
        let n = sx * sy * sz;
        let mut rng = StdRng::seed_from_u64(32);
        let data: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();

        let mut tmp = vec![0.0; n];
        let mut xz = vec![0.0; n];
        fir_3d_x(sx, sy, sz, &data, &mut tmp, &kx);
        fir_3d_z(sx, sy, sz, &tmp, &mut xz, &kz);

        let mut zx = vec![0.0; n];
        fir_3d_z(sx, sy, sz, &data, &mut tmp, &kz);
        fir_3d_x(sx, sy, sz, &tmp, &mut zx, &kx);

        for i in 0..n {
            assert!((xz[i] - zx[i]).abs() <= 16.0 * f64::EPSILON, "i={i}");
        }
    }
}
