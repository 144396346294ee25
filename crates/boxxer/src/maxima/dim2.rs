//! 2D strict local-maxima finder.

use ndarray::{Array1, Array2, ArrayView2};

use super::{is_strict_max_2d, validate_boxsize};
use crate::error::{Error, Result};
use crate::stack::{fslice, maxima_table, Real};

/// Finds strict local maxima of a 2D image over an odd neighborhood.
///
/// Owns preallocated candidate storage and the row skip tables, so one
/// instance per worker amortizes allocations across frames. Not shareable
/// across concurrent calls.
#[derive(Debug, Clone)]
pub struct Maxima2D<F: Real> {
    size: [usize; 2],
    boxsize: usize,
    max_maxima: usize,
    coords: Vec<[u32; 2]>,
    vals: Vec<F>,
    skip: Vec<u8>,
    skip_next: Vec<u8>,
}

impl<F: Real> Maxima2D<F> {
    pub fn new(size: [usize; 2], boxsize: usize) -> Result<Self> {
        validate_boxsize(&size, boxsize)?;
        // A strict maximum excludes its 8-neighborhood, so density is
        // bounded by one per 2x2 block.
        let max_maxima = size[0] * size[1] / 4;
        Ok(Self {
            size,
            boxsize,
            max_maxima,
            coords: Vec::with_capacity(max_maxima),
            vals: Vec::with_capacity(max_maxima),
            skip: vec![0; size[0]],
            skip_next: vec![0; size[0]],
        })
    }

    pub fn size(&self) -> [usize; 2] {
        self.size
    }

    pub fn boxsize(&self) -> usize {
        self.boxsize
    }

    /// Runs the fast finder; results stay in the internal buffers.
    pub fn find(&mut self, im: &ArrayView2<'_, F>) -> Result<usize> {
        let data = self.checked_slice(im)?;
        self.coords.clear();
        self.vals.clear();
        self.maxima_3x3(data)?;
        if self.boxsize == 5 {
            self.refine_shell5(data);
        } else if self.boxsize > 3 {
            self.refine_box(data);
        }
        Ok(self.vals.len())
    }

    /// Reference finder: full nested-loop 3-core plus the same refinement.
    ///
    /// Retained to validate the skip-table fast path; every fast result must
    /// also be produced here.
    pub fn find_reference(&mut self, im: &ArrayView2<'_, F>) -> Result<usize> {
        let data = self.checked_slice(im)?;
        self.coords.clear();
        self.vals.clear();
        self.maxima_3x3_slow(data)?;
        if self.boxsize == 5 {
            self.refine_shell5(data);
        } else if self.boxsize > 3 {
            self.refine_box(data);
        }
        Ok(self.vals.len())
    }

    /// Coordinates of the last `find` call, in emission order.
    pub fn coords(&self) -> &[[u32; 2]] {
        &self.coords
    }

    /// Values of the last `find` call, parallel to [`coords`](Self::coords).
    pub fn values(&self) -> &[F] {
        &self.vals
    }

    /// Convenience wrapper: find and copy out a `2 x N` table plus values.
    pub fn find_maxima(&mut self, im: &ArrayView2<'_, F>) -> Result<(Array2<u32>, Array1<F>)> {
        self.find(im)?;
        Ok(maxima_table(&self.coords, &self.vals))
    }

    fn checked_slice<'v>(&self, im: &'v ArrayView2<'_, F>) -> Result<&'v [F]> {
        if im.dim() != (self.size[0], self.size[1]) {
            return Err(Error::ParameterShape(format!(
                "image has shape {}x{}, finder expects {}x{}",
                im.dim().0,
                im.dim().1,
                self.size[0],
                self.size[1]
            )));
        }
        fslice("image", im)
    }

    fn push(&mut self, x: usize, y: usize, val: F) -> Result<()> {
        if self.vals.len() >= self.max_maxima {
            return Err(Error::Logical(format!(
                "maxima capacity {} exceeded",
                self.max_maxima
            )));
        }
        self.coords.push([x as u32, y as u32]);
        self.vals.push(val);
        Ok(())
    }

    /// Fast 3x3 core: boundary enumeration, then interior sweep with
    /// monotone-run skipping and a skip table for the following row.
    fn maxima_3x3(&mut self, data: &[F]) -> Result<()> {
        self.maxima_3x3_edges(data)?;
        let [sx, sy] = self.size;
        self.skip.fill(0);
        self.skip_next.fill(0);
        for y in 1..sy - 1 {
            let row = sx * y;
            let mut x = 1;
            while x < sx - 1 {
                if self.skip[x] != 0 {
                    x += 1;
                    continue;
                }
                let mut val = data[row + x];
                if val <= data[row + x + 1] {
                    // Non-decreasing run: only its last element can be a 1D max.
                    loop {
                        x += 1;
                        val = data[row + x];
                        if x >= sx - 1 || val > data[row + x + 1] {
                            break;
                        }
                    }
                    if x >= sx - 1 {
                        break;
                    }
                } else if val <= data[row + x - 1] {
                    x += 1;
                    continue;
                }
                // A 1D max; its right neighbor cannot be one.
                self.skip[x + 1] = 1;

                // Next row: mark dominated cells skippable, reject on the
                // first non-dominated one.
                let next = row + sx;
                let mut is_max = true;
                for nx in [x - 1, x, x + 1] {
                    if val <= data[next + nx] {
                        is_max = false;
                        break;
                    }
                    self.skip_next[nx] = 1;
                }
                if is_max {
                    let prev = row - sx;
                    if val > data[prev + x - 1] && val > data[prev + x] && val > data[prev + x + 1]
                    {
                        self.push(x, y, val)?;
                    }
                }
                x += 1;
            }
            self.skip.fill(0);
            std::mem::swap(&mut self.skip, &mut self.skip_next);
        }
        Ok(())
    }

    /// Straight nested-loop 3x3 core over the interior.
    fn maxima_3x3_slow(&mut self, data: &[F]) -> Result<()> {
        self.maxima_3x3_edges(data)?;
        let [sx, sy] = self.size;
        for y in 1..sy - 1 {
            for x in 1..sx - 1 {
                let val = data[x + sx * y];
                let prev = x + sx * (y - 1);
                let here = x + sx * y;
                let next = x + sx * (y + 1);
                if val > data[prev - 1]
                    && val > data[prev]
                    && val > data[prev + 1]
                    && val > data[here - 1]
                    && val > data[here + 1]
                    && val > data[next - 1]
                    && val > data[next]
                    && val > data[next + 1]
                {
                    self.push(x, y, val)?;
                }
            }
        }
        Ok(())
    }

    /// Maxima on the image border: 4 corners and 4 edges, each checked
    /// against its clipped 3-neighborhood.
    fn maxima_3x3_edges(&mut self, data: &[F]) -> Result<()> {
        let [sx, sy] = self.size;
        for y in [0, sy - 1] {
            for x in 0..sx {
                self.try_boundary(data, x, y)?;
            }
        }
        for y in 1..sy - 1 {
            for x in [0, sx - 1] {
                self.try_boundary(data, x, y)?;
            }
        }
        Ok(())
    }

    fn try_boundary(&mut self, data: &[F], x: usize, y: usize) -> Result<()> {
        if is_strict_max_2d(data, self.size, x, y, 1) {
            self.push(x, y, data[x + self.size[0] * y])?;
        }
        Ok(())
    }

    /// Keeps 3-core candidates that also dominate the clipped box of the
    /// configured size; the inner 3x3 is already proven and skipped.
    fn refine_box(&mut self, data: &[F]) {
        let k = (self.boxsize - 1) / 2;
        let [sx, sy] = self.size;
        let mut kept = 0usize;
        for n in 0..self.vals.len() {
            let [mx, my] = self.coords[n];
            let (mx, my) = (mx as usize, my as usize);
            let val = self.vals[n];
            let x_lo = mx.saturating_sub(k);
            let x_hi = (mx + k).min(sx - 1);
            let y_lo = my.saturating_sub(k);
            let y_hi = (my + k).min(sy - 1);
            let mut is_max = true;
            'scan: for y in y_lo..=y_hi {
                let in_band = my.abs_diff(y) <= 1;
                for x in x_lo..=x_hi {
                    if in_band && mx.abs_diff(x) <= 1 {
                        continue;
                    }
                    if data[x + sx * y] > val {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                self.coords[kept] = self.coords[n];
                self.vals[kept] = val;
                kept += 1;
            }
        }
        self.coords.truncate(kept);
        self.vals.truncate(kept);
    }

    /// 5x5 specialization: only the ring at Chebyshev distance 2 needs
    /// checking on top of the proven 3x3 core.
    fn refine_shell5(&mut self, data: &[F]) {
        let [sx, sy] = self.size;
        let mut kept = 0usize;
        for n in 0..self.vals.len() {
            let [mx, my] = self.coords[n];
            let (mx, my) = (mx as usize, my as usize);
            let val = self.vals[n];
            let x_lo = mx.saturating_sub(2);
            let x_hi = (mx + 2).min(sx - 1);
            let y_lo = my.saturating_sub(2);
            let y_hi = (my + 2).min(sy - 1);
            let mut is_max = true;
            'ring: for y in y_lo..=y_hi {
                for x in x_lo..=x_hi {
                    if mx.abs_diff(x).max(my.abs_diff(y)) != 2 {
                        continue;
                    }
                    if data[x + sx * y] > val {
                        is_max = false;
                        break 'ring;
                    }
                }
            }
            if is_max {
                self.coords[kept] = self.coords[n];
                self.vals[kept] = val;
                kept += 1;
            }
        }
        self.coords.truncate(kept);
        self.vals.truncate(kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_image(seed: u64, size: [usize; 2]) -> stack::Image<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut im = stack::image::<f64>(size);
        for v in im.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        im
    }

    #[test]
    fn single_interior_peak() {
        let mut im = stack::image::<f64>([9, 7]);
        im[[4, 3]] = 2.0;
        let mut finder = Maxima2D::new([9, 7], 3).unwrap();
        let n = finder.find(&im.view()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(finder.coords(), &[[4, 3]]);
        assert_eq!(finder.values(), &[2.0]);
    }

    #[test]
    fn corner_and_edge_peaks_use_clipped_neighborhoods() {
        let mut im = stack::image::<f64>([8, 8]);
        im[[0, 0]] = 3.0;
        im[[7, 4]] = 2.0;
        let mut finder = Maxima2D::new([8, 8], 3).unwrap();
        let n = finder.find(&im.view()).unwrap();
        assert_eq!(n, 2);
        let coords = finder.coords().to_vec();
        assert!(coords.contains(&[0, 0]));
        assert!(coords.contains(&[7, 4]));
    }

    #[test]
    fn plateau_produces_no_maxima() {
        // 5x5 constant region surrounded by zeros: strictness rejects all of it.
        let mut im = stack::image::<f64>([13, 13]);
        for y in 4..9 {
            for x in 4..9 {
                im[[x, y]] = 1.0;
            }
        }
        let mut finder = Maxima2D::new([13, 13], 3).unwrap();
        assert_eq!(finder.find(&im.view()).unwrap(), 0);
        assert_eq!(finder.find_reference(&im.view()).unwrap(), 0);
    }

    #[test]
    fn fast_matches_reference_on_random_images() {
        for seed in 0..5u64 {
            let im = random_image(seed, [32, 24]);
            let mut finder = Maxima2D::new([32, 24], 3).unwrap();
            finder.find(&im.view()).unwrap();
            let fast: Vec<_> = finder.coords().to_vec();
            let fast_vals: Vec<_> = finder.values().to_vec();
            finder.find_reference(&im.view()).unwrap();
            assert_eq!(fast, finder.coords(), "seed {seed}");
            assert_eq!(fast_vals, finder.values(), "seed {seed}");
        }
    }

    #[test]
    fn values_match_the_image_exactly() {
        let im = random_image(77, [21, 19]);
        let mut finder = Maxima2D::new([21, 19], 3).unwrap();
        finder.find(&im.view()).unwrap();
        for (c, &v) in finder.coords().iter().zip(finder.values()) {
            assert_eq!(im[[c[0] as usize, c[1] as usize]], v);
        }
    }

    #[test]
    fn boxsize5_matches_brute_force() {
        for seed in 10..14u64 {
            let size = [20, 17];
            let im = random_image(seed, size);
            let mut flat = vec![0.0; size[0] * size[1]];
            for ((x, y), &v) in im.indexed_iter() {
                flat[x + size[0] * y] = v;
            }
            let mut finder = Maxima2D::new(size, 5).unwrap();
            finder.find(&im.view()).unwrap();
            let mut expected = Vec::new();
            for y in 0..size[1] {
                for x in 0..size[0] {
                    if super::is_strict_max_2d(&flat, size, x, y, 2) {
                        expected.push([x as u32, y as u32]);
                    }
                }
            }
            let mut got = finder.coords().to_vec();
            got.sort_unstable();
            expected.sort_unstable();
            assert_eq!(got, expected, "seed {seed}");
        }
    }

    #[test]
    fn boxsize7_matches_brute_force() {
        let size = [24, 21];
        let im = random_image(99, size);
        let mut flat = vec![0.0; size[0] * size[1]];
        for ((x, y), &v) in im.indexed_iter() {
            flat[x + size[0] * y] = v;
        }
        let mut finder = Maxima2D::new(size, 7).unwrap();
        finder.find(&im.view()).unwrap();
        let mut expected = Vec::new();
        for y in 0..size[1] {
            for x in 0..size[0] {
                if super::is_strict_max_2d(&flat, size, x, y, 3) {
                    expected.push([x as u32, y as u32]);
                }
            }
        }
        let mut got = finder.coords().to_vec();
        got.sort_unstable();
        expected.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn invalid_boxsize_is_rejected() {
        assert!(Maxima2D::<f32>::new([16, 16], 2).is_err());
        assert!(Maxima2D::<f32>::new([16, 16], 4).is_err());
        assert!(Maxima2D::<f32>::new([4, 16], 5).is_err());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let im = stack::image::<f32>([8, 9]);
        let mut finder = Maxima2D::<f32>::new([8, 8], 3).unwrap();
        assert!(matches!(
            finder.find(&im.view()),
            Err(Error::ParameterShape(_))
        ));
    }
}
