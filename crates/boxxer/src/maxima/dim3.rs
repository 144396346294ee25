//! 3D strict local-maxima finder.

use ndarray::{Array1, Array2, ArrayView3};

use super::{is_strict_max_3d, validate_boxsize};
use crate::error::{Error, Result};
use crate::stack::{fslice, maxima_table, Real};

/// Finds strict local maxima of a 3D volume over an odd cubic neighborhood.
///
/// Extends the 2D scheme with a pair of plane-sized skip tables: a candidate
/// that dominates its 3x3 footprint in plane `z+1` marks those cells as
/// non-maxima before the sweep reaches them.
#[derive(Debug, Clone)]
pub struct Maxima3D<F: Real> {
    size: [usize; 3],
    boxsize: usize,
    max_maxima: usize,
    coords: Vec<[u32; 3]>,
    vals: Vec<F>,
    skip: Vec<u8>,
    skip_next: Vec<u8>,
    skip_plane: Vec<u8>,
    skip_plane_next: Vec<u8>,
}

impl<F: Real> Maxima3D<F> {
    pub fn new(size: [usize; 3], boxsize: usize) -> Result<Self> {
        validate_boxsize(&size, boxsize)?;
        let max_maxima = size[0] * size[1] * size[2] / 8;
        Ok(Self {
            size,
            boxsize,
            max_maxima,
            coords: Vec::with_capacity(max_maxima),
            vals: Vec::with_capacity(max_maxima),
            skip: vec![0; size[0]],
            skip_next: vec![0; size[0]],
            skip_plane: vec![0; size[0] * size[1]],
            skip_plane_next: vec![0; size[0] * size[1]],
        })
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn boxsize(&self) -> usize {
        self.boxsize
    }

    /// Runs the fast finder; results stay in the internal buffers.
    pub fn find(&mut self, im: &ArrayView3<'_, F>) -> Result<usize> {
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

    /// Reference finder: sextuple-nested strict comparison plus the same
    /// refinement; validates the skip-table fast path.
    pub fn find_reference(&mut self, im: &ArrayView3<'_, F>) -> Result<usize> {
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
    pub fn coords(&self) -> &[[u32; 3]] {
        &self.coords
    }

    /// Values of the last `find` call, parallel to [`coords`](Self::coords).
    pub fn values(&self) -> &[F] {
        &self.vals
    }

    /// Convenience wrapper: find and copy out a `3 x N` table plus values.
    pub fn find_maxima(&mut self, im: &ArrayView3<'_, F>) -> Result<(Array2<u32>, Array1<F>)> {
        self.find(im)?;
        Ok(maxima_table(&self.coords, &self.vals))
    }

    fn checked_slice<'v>(&self, im: &'v ArrayView3<'_, F>) -> Result<&'v [F]> {
        if im.dim() != (self.size[0], self.size[1], self.size[2]) {
            return Err(Error::ParameterShape(format!(
                "volume has shape {}x{}x{}, finder expects {}x{}x{}",
                im.dim().0,
                im.dim().1,
                im.dim().2,
                self.size[0],
                self.size[1],
                self.size[2]
            )));
        }
        fslice("volume", im)
    }

    fn push(&mut self, x: usize, y: usize, z: usize, val: F) -> Result<()> {
        if self.vals.len() >= self.max_maxima {
            return Err(Error::Logical(format!(
                "maxima capacity {} exceeded",
                self.max_maxima
            )));
        }
        self.coords.push([x as u32, y as u32, z as u32]);
        self.vals.push(val);
        Ok(())
    }

    /// Fast 3x3x3 core with row and plane skip tables.
    fn maxima_3x3(&mut self, data: &[F]) -> Result<()> {
        self.maxima_3x3_edges(data)?;
        let [sx, sy, sz] = self.size;
        let slab = sx * sy;
        self.skip.fill(0);
        self.skip_next.fill(0);
        self.skip_plane.fill(0);
        self.skip_plane_next.fill(0);
        for z in 1..sz - 1 {
            for y in 1..sy - 1 {
                let row = slab * z + sx * y;
                let mut x = 1;
                while x < sx - 1 {
                    if self.skip[x] != 0 || self.skip_plane[y * sx + x] != 0 {
                        x += 1;
                        continue;
                    }
                    let mut val = data[row + x];
                    if val <= data[row + x + 1] {
                        // Non-decreasing run along the row.
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
                    self.skip[x + 1] = 1;

                    // Next row in this plane.
                    let next_row = row + sx;
                    let mut is_max = true;
                    for nx in [x - 1, x, x + 1] {
                        if val <= data[next_row + nx] {
                            is_max = false;
                            break;
                        }
                        self.skip_next[nx] = 1;
                    }

                    // Next plane: 3x3 footprint, dominated cells are marked.
                    if is_max {
                        'next_plane: for py in [y - 1, y, y + 1] {
                            let pbase = slab * (z + 1) + sx * py;
                            for nx in [x - 1, x, x + 1] {
                                if val <= data[pbase + nx] {
                                    is_max = false;
                                    break 'next_plane;
                                }
                                self.skip_plane_next[py * sx + nx] = 1;
                            }
                        }
                    }

                    // Previous row, then previous plane.
                    if is_max {
                        let prev_row = row - sx;
                        if val <= data[prev_row + x - 1]
                            || val <= data[prev_row + x]
                            || val <= data[prev_row + x + 1]
                        {
                            is_max = false;
                        }
                    }
                    if is_max {
                        'prev_plane: for py in [y - 1, y, y + 1] {
                            let pbase = slab * (z - 1) + sx * py;
                            for nx in [x - 1, x, x + 1] {
                                if val <= data[pbase + nx] {
                                    is_max = false;
                                    break 'prev_plane;
                                }
                            }
                        }
                    }
                    if is_max {
                        self.push(x, y, z, val)?;
                    }
                    x += 1;
                }
                self.skip.fill(0);
                std::mem::swap(&mut self.skip, &mut self.skip_next);
            }
            self.skip_plane.fill(0);
            std::mem::swap(&mut self.skip_plane, &mut self.skip_plane_next);
            self.skip.fill(0);
        }
        Ok(())
    }

    /// Straight nested-loop 27-neighborhood core over the interior.
    fn maxima_3x3_slow(&mut self, data: &[F]) -> Result<()> {
        self.maxima_3x3_edges(data)?;
        let [sx, sy, sz] = self.size;
        for z in 1..sz - 1 {
            for y in 1..sy - 1 {
                for x in 1..sx - 1 {
                    if is_strict_max_3d(data, self.size, x, y, z, 1) {
                        let val = data[x + sx * y + sx * sy * z];
                        self.push(x, y, z, val)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Maxima on the volume boundary: 8 corners, 12 edges and 6 faces, each
    /// cell checked against its clipped 3-neighborhood exactly once.
    fn maxima_3x3_edges(&mut self, data: &[F]) -> Result<()> {
        let [sx, sy, sz] = self.size;
        for z in [0, sz - 1] {
            for y in 0..sy {
                for x in 0..sx {
                    self.try_boundary(data, x, y, z)?;
                }
            }
        }
        for z in 1..sz - 1 {
            for y in [0, sy - 1] {
                for x in 0..sx {
                    self.try_boundary(data, x, y, z)?;
                }
            }
            for y in 1..sy - 1 {
                for x in [0, sx - 1] {
                    self.try_boundary(data, x, y, z)?;
                }
            }
        }
        Ok(())
    }

    fn try_boundary(&mut self, data: &[F], x: usize, y: usize, z: usize) -> Result<()> {
        if is_strict_max_3d(data, self.size, x, y, z, 1) {
            let val = data[x + self.size[0] * (y + self.size[1] * z)];
            self.push(x, y, z, val)?;
        }
        Ok(())
    }

    /// Keeps 3-core candidates that also dominate the clipped cube of the
    /// configured size; the inner 3x3x3 is already proven and skipped.
    fn refine_box(&mut self, data: &[F]) {
        let k = (self.boxsize - 1) / 2;
        let [sx, sy, sz] = self.size;
        let slab = sx * sy;
        let mut kept = 0usize;
        for n in 0..self.vals.len() {
            let [mx, my, mz] = self.coords[n];
            let (mx, my, mz) = (mx as usize, my as usize, mz as usize);
            let val = self.vals[n];
            let x_lo = mx.saturating_sub(k);
            let x_hi = (mx + k).min(sx - 1);
            let y_lo = my.saturating_sub(k);
            let y_hi = (my + k).min(sy - 1);
            let z_lo = mz.saturating_sub(k);
            let z_hi = (mz + k).min(sz - 1);
            let mut is_max = true;
            'scan: for z in z_lo..=z_hi {
                let z_core = mz.abs_diff(z) <= 1;
                for y in y_lo..=y_hi {
                    let in_core = z_core && my.abs_diff(y) <= 1;
                    for x in x_lo..=x_hi {
                        if in_core && mx.abs_diff(x) <= 1 {
                            continue;
                        }
                        if data[x + sx * y + slab * z] > val {
                            is_max = false;
                            break 'scan;
                        }
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

    /// 5x5x5 specialization: only the cube shell at Chebyshev distance 2.
    fn refine_shell5(&mut self, data: &[F]) {
        let [sx, sy, sz] = self.size;
        let slab = sx * sy;
        let mut kept = 0usize;
        for n in 0..self.vals.len() {
            let [mx, my, mz] = self.coords[n];
            let (mx, my, mz) = (mx as usize, my as usize, mz as usize);
            let val = self.vals[n];
            let x_lo = mx.saturating_sub(2);
            let x_hi = (mx + 2).min(sx - 1);
            let y_lo = my.saturating_sub(2);
            let y_hi = (my + 2).min(sy - 1);
            let z_lo = mz.saturating_sub(2);
            let z_hi = (mz + 2).min(sz - 1);
            let mut is_max = true;
            'shell: for z in z_lo..=z_hi {
                for y in y_lo..=y_hi {
                    for x in x_lo..=x_hi {
                        let cheb = mx.abs_diff(x).max(my.abs_diff(y)).max(mz.abs_diff(z));
                        if cheb != 2 {
                            continue;
                        }
                        if data[x + sx * y + slab * z] > val {
                            is_max = false;
                            break 'shell;
                        }
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

    fn random_volume(seed: u64, size: [usize; 3]) -> stack::Volume<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut im = stack::volume::<f64>(size);
        for v in im.iter_mut() {
            *v = rng.gen_range(0.0..1.0);
        }
        im
    }

    fn flat(im: &stack::Volume<f64>, size: [usize; 3]) -> Vec<f64> {
        let mut out = vec![0.0; size[0] * size[1] * size[2]];
        for ((x, y, z), &v) in im.indexed_iter() {
            out[x + size[0] * (y + size[1] * z)] = v;
        }
        out
    }

    #[test]
    fn single_interior_peak() {
        let mut im = stack::volume::<f64>([9, 8, 7]);
        im[[4, 3, 3]] = 2.0;
        let mut finder = Maxima3D::new([9, 8, 7], 3).unwrap();
        assert_eq!(finder.find(&im.view()).unwrap(), 1);
        assert_eq!(finder.coords(), &[[4, 3, 3]]);
        assert_eq!(finder.values(), &[2.0]);
    }

    #[test]
    fn corners_edges_and_faces_are_enumerated() {
        let mut im = stack::volume::<f64>([8, 8, 6]);
        im[[0, 0, 0]] = 3.0; // corner
        im[[4, 0, 2]] = 2.0; // face y=0
        im[[7, 7, 3]] = 2.5; // edge x=7,y=7
        let mut finder = Maxima3D::new([8, 8, 6], 3).unwrap();
        assert_eq!(finder.find(&im.view()).unwrap(), 3);
        let coords = finder.coords().to_vec();
        assert!(coords.contains(&[0, 0, 0]));
        assert!(coords.contains(&[4, 0, 2]));
        assert!(coords.contains(&[7, 7, 3]));
    }

    #[test]
    fn plateau_produces_no_maxima() {
        let mut im = stack::volume::<f64>([9, 9, 9]);
        for z in 3..6 {
            for y in 3..6 {
                for x in 3..6 {
                    im[[x, y, z]] = 1.0;
                }
            }
        }
        let mut finder = Maxima3D::new([9, 9, 9], 3).unwrap();
        assert_eq!(finder.find(&im.view()).unwrap(), 0);
        assert_eq!(finder.find_reference(&im.view()).unwrap(), 0);
    }

    #[test]
    fn fast_matches_reference_on_random_volumes() {
        for seed in 0..4u64 {
            let size = [14, 12, 10];
            let im = random_volume(seed, size);
            let mut finder = Maxima3D::new(size, 3).unwrap();
            finder.find(&im.view()).unwrap();
            let fast = finder.coords().to_vec();
            let fast_vals = finder.values().to_vec();
            finder.find_reference(&im.view()).unwrap();
            assert_eq!(fast, finder.coords(), "seed {seed}");
            assert_eq!(fast_vals, finder.values(), "seed {seed}");
        }
    }

    #[test]
    fn boxsize5_matches_brute_force() {
        for seed in 20..23u64 {
            let size = [12, 10, 9];
            let im = random_volume(seed, size);
            let data = flat(&im, size);
            let mut finder = Maxima3D::new(size, 5).unwrap();
            finder.find(&im.view()).unwrap();
            let mut expected = Vec::new();
            for z in 0..size[2] {
                for y in 0..size[1] {
                    for x in 0..size[0] {
                        if super::is_strict_max_3d(&data, size, x, y, z, 2) {
                            expected.push([x as u32, y as u32, z as u32]);
                        }
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
        let size = [13, 11, 9];
        let im = random_volume(55, size);
        let data = flat(&im, size);
        let mut finder = Maxima3D::new(size, 7).unwrap();
        finder.find(&im.view()).unwrap();
        let mut expected = Vec::new();
        for z in 0..size[2] {
            for y in 0..size[1] {
                for x in 0..size[0] {
                    if super::is_strict_max_3d(&data, size, x, y, z, 3) {
                        expected.push([x as u32, y as u32, z as u32]);
                    }
                }
            }
        }
        let mut got = finder.coords().to_vec();
        got.sort_unstable();
        expected.sort_unstable();
        assert_eq!(got, expected);
    }

    #[test]
    fn values_match_the_volume_exactly() {
        let size = [11, 10, 8];
        let im = random_volume(7, size);
        let mut finder = Maxima3D::new(size, 3).unwrap();
        finder.find(&im.view()).unwrap();
        assert!(!finder.coords().is_empty());
        for (c, &v) in finder.coords().iter().zip(finder.values()) {
            assert_eq!(im[[c[0] as usize, c[1] as usize, c[2] as usize]], v);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Maxima3D::<f32>::new([8, 8, 8], 4).is_err());
        assert!(Maxima3D::<f32>::new([8, 8, 2], 3).is_err());
        let im = stack::volume::<f32>([8, 8, 9]);
        let mut finder = Maxima3D::<f32>::new([8, 8, 8], 3).unwrap();
        assert!(matches!(
            finder.find(&im.view()),
            Err(Error::ParameterShape(_))
        ));
    }
}
