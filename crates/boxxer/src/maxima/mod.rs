//! Strict local-maxima finders for 2D images and 3D volumes.
//!
//! A point is a maximum iff its value strictly exceeds every other value in
//! the axis-aligned box of the configured odd size centered on it, clipped to
//! the image domain. Ties never count. The fast finders exploit monotone
//! runs along axis 0 plus skip tables; boundary cells are enumerated
//! separately against the clipped 3-neighborhood.

mod dim2;
mod dim3;

pub use dim2::Maxima2D;
pub use dim3::Maxima3D;

use crate::error::{Error, Result};
use crate::stack::Real;

pub(crate) const MIN_BOXSIZE: usize = 3;

pub(crate) fn validate_boxsize(size: &[usize], boxsize: usize) -> Result<()> {
    if boxsize < MIN_BOXSIZE || boxsize % 2 == 0 {
        return Err(Error::ParameterValue(format!(
            "neighborhood size must be odd and >= {MIN_BOXSIZE}, got {boxsize}"
        )));
    }
    if let Some(&short) = size.iter().find(|&&s| s < boxsize) {
        return Err(Error::ParameterValue(format!(
            "neighborhood size {boxsize} exceeds image axis length {short}"
        )));
    }
    Ok(())
}

/// Strict-maximum test over the clipped box of half-width `k`, 2D.
pub(crate) fn is_strict_max_2d<F: Real>(
    data: &[F],
    size: [usize; 2],
    cx: usize,
    cy: usize,
    k: usize,
) -> bool {
    let [sx, sy] = size;
    let val = data[cx + sx * cy];
    let x_lo = cx.saturating_sub(k);
    let x_hi = (cx + k).min(sx - 1);
    let y_lo = cy.saturating_sub(k);
    let y_hi = (cy + k).min(sy - 1);
    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            if (x, y) != (cx, cy) && data[x + sx * y] >= val {
                return false;
            }
        }
    }
    true
}

/// Strict-maximum test over the clipped box of half-width `k`, 3D.
pub(crate) fn is_strict_max_3d<F: Real>(
    data: &[F],
    size: [usize; 3],
    cx: usize,
    cy: usize,
    cz: usize,
    k: usize,
) -> bool {
    let [sx, sy, sz] = size;
    let slab = sx * sy;
    let val = data[cx + sx * cy + slab * cz];
    let x_lo = cx.saturating_sub(k);
    let x_hi = (cx + k).min(sx - 1);
    let y_lo = cy.saturating_sub(k);
    let y_hi = (cy + k).min(sy - 1);
    let z_lo = cz.saturating_sub(k);
    let z_hi = (cz + k).min(sz - 1);
    for z in z_lo..=z_hi {
        for y in y_lo..=y_hi {
            for x in x_lo..=x_hi {
                if (x, y, z) != (cx, cy, cz) && data[x + sx * y + slab * z] >= val {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxsize_validation() {
        assert!(validate_boxsize(&[16, 16], 3).is_ok());
        assert!(validate_boxsize(&[16, 16], 5).is_ok());
        assert!(validate_boxsize(&[16, 16], 4).is_err());
        assert!(validate_boxsize(&[16, 16], 1).is_err());
        assert!(validate_boxsize(&[16, 4], 5).is_err());
    }

    #[test]
    fn strict_max_rejects_ties() {
        // 3x3 image, center and corner share the maximum value.
        let data = [0.0f64, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert!(!is_strict_max_2d(&data, [3, 3], 1, 1, 1));
        assert!(!is_strict_max_2d(&data, [3, 3], 2, 2, 1));
    }

    #[test]
    fn strict_max_clips_at_boundaries() {
        let data = [1.0f64, 0.0, 0.0, 0.0];
        assert!(is_strict_max_2d(&data, [2, 2], 0, 0, 1));
        assert!(!is_strict_max_2d(&data, [2, 2], 1, 1, 1));
    }
}
