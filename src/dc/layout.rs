//! Slab-buffered volumetric grid for Dual Contouring
//!
//! The full grid of corner samples, edge samples, and cube vertices can be
//! much larger than RAM for fine resolutions, so only `buf_rows` z-rows are
//! held at a time.  [`CubeLayout::shift`] slides the buffer down the z axis,
//! keeping the last two rows for edge continuity.
//!
//! Within a cube, corners are laid out like so:
//!
//! ```text
//! 0 --------- 1
//! |\          |\
//! | \         | \
//! |  2 --------- 3
//! 4 -|------ 5   |
//!  \ |        \  |
//!   \|         \ |
//!    6 --------- 7
//! ```
//!
//! with 0 at (0, 0, 0), 1 at (1, 0, 0), 2 at (0, 1, 0), and 4 at (0, 0, 1)
//! in XYZ terms.  Edge slots are stored grouped by axis per z-row
//! (`XYZXYZ...XYZXY`), so the bottom four edges of a cube row are the top
//! four of the next one.

use crate::geom::Vec3;

/// Deterministic jitter factor, relative to the grid spacing
///
/// Offsetting the axis values slightly keeps cube corners off the
/// axis-aligned faces of boxy solids, where membership flips are
/// pathological for normal estimation.
pub(crate) const JITTER_FACTOR: f64 = 0.012923982;

#[derive(Clone, Default)]
pub(crate) struct Corner {
    pub populated: bool,
    pub value: bool,
    pub coord: Vec3,
}

#[derive(Clone, Default)]
pub(crate) struct Cube {
    pub populated: bool,
    pub vertex: Vec3,
}

/// Hermite data on one axis-aligned grid edge
#[derive(Clone, Default)]
pub(crate) struct EdgeSlot {
    pub populated: bool,
    pub active: bool,
    pub triangulated: bool,
    pub coord: Vec3,
    pub normal: Vec3,
}

/// Grid dimensions, cheap to copy into parallel workers
#[derive(Copy, Clone)]
pub(crate) struct Dims {
    pub nx: usize,
    pub ny: usize,
    pub buf_rows: usize,
}

impl Dims {
    /// Per-z-row counts of x-, y-, and z-aligned edge slots
    pub fn edge_counts(&self) -> (usize, usize, usize) {
        (
            (self.nx - 1) * self.ny,
            (self.ny - 1) * self.nx,
            self.nx * self.ny,
        )
    }

    pub fn corner_idx(&self, x: usize, y: usize, z: usize) -> usize {
        x + (y + z * self.ny) * self.nx
    }

    fn x_edge_idx(&self, x: usize, y: usize, z: usize) -> usize {
        let (xc, yc, zc) = self.edge_counts();
        z * (xc + yc + zc) + (self.nx - 1) * y + x
    }

    fn y_edge_idx(&self, x: usize, y: usize, z: usize) -> usize {
        let (xc, yc, zc) = self.edge_counts();
        z * (xc + yc + zc) + xc + self.nx * y + x
    }

    fn z_edge_idx(&self, x: usize, y: usize, z: usize) -> usize {
        let (xc, yc, zc) = self.edge_counts();
        z * (xc + yc + zc) + xc + yc + self.nx * y + x
    }

    fn cube_coord(&self, c: usize) -> (usize, usize, usize) {
        let x = c % (self.nx - 1);
        let c = c / (self.nx - 1);
        let y = c % (self.ny - 1);
        (x, y, c / (self.ny - 1))
    }

    pub fn cube_corners(&self, c: usize) -> [usize; 8] {
        let (x, y, z) = self.cube_coord(c);
        let mut result = [0; 8];
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    result[k + j * 2 + i * 4] = self.corner_idx(x + k, y + j, z + i);
                }
            }
        }
        result
    }

    pub fn cube_edges(&self, c: usize) -> [usize; 12] {
        let (x, y, z) = self.cube_coord(c);
        [
            self.x_edge_idx(x, y, z),
            self.y_edge_idx(x, y, z),
            self.y_edge_idx(x + 1, y, z),
            self.x_edge_idx(x, y + 1, z),
            self.z_edge_idx(x, y, z),
            self.z_edge_idx(x + 1, y, z),
            self.z_edge_idx(x, y + 1, z),
            self.z_edge_idx(x + 1, y + 1, z),
            self.x_edge_idx(x, y, z + 1),
            self.y_edge_idx(x, y, z + 1),
            self.y_edge_idx(x + 1, y, z + 1),
            self.x_edge_idx(x, y + 1, z + 1),
        ]
    }

    pub fn edge_corners(&self, e: usize) -> [usize; 2] {
        let (xc, yc, zc) = self.edge_counts();
        let z = e / (xc + yc + zc);
        let mut e = e % (xc + yc + zc);
        if e < xc {
            let x = e % (self.nx - 1);
            let y = e / (self.nx - 1);
            [self.corner_idx(x, y, z), self.corner_idx(x + 1, y, z)]
        } else if e < xc + yc {
            e -= xc;
            let x = e % self.nx;
            let y = e / self.nx;
            [self.corner_idx(x, y, z), self.corner_idx(x, y + 1, z)]
        } else {
            e -= xc + yc;
            let x = e % self.nx;
            let y = e / self.nx;
            [self.corner_idx(x, y, z), self.corner_idx(x, y, z + 1)]
        }
    }

    /// The four cubes around an edge, in clockwise order looking down the
    /// edge axis; `None` marks a cube outside the buffered slab
    pub fn edge_cubes(&self, e: usize) -> [Option<usize>; 4] {
        let (xc, yc, zc) = self.edge_counts();
        let cube_at = |x: isize, y: isize, z: isize| -> Option<usize> {
            if x < 0
                || y < 0
                || z < 0
                || x >= self.nx as isize - 1
                || y >= self.ny as isize - 1
                || z >= self.buf_rows as isize - 1
            {
                return None;
            }
            Some(x as usize + (y as usize + z as usize * (self.ny - 1)) * (self.nx - 1))
        };

        let z = (e / (xc + yc + zc)) as isize;
        let mut e = e % (xc + yc + zc);
        if e < xc {
            let x = (e % (self.nx - 1)) as isize;
            let y = (e / (self.nx - 1)) as isize;
            [
                cube_at(x, y - 1, z - 1),
                cube_at(x, y, z - 1),
                cube_at(x, y - 1, z),
                cube_at(x, y, z),
            ]
        } else if e < xc + yc {
            e -= xc;
            let x = (e % self.nx) as isize;
            let y = (e / self.nx) as isize;
            [
                cube_at(x - 1, y, z - 1),
                cube_at(x, y, z - 1),
                cube_at(x - 1, y, z),
                cube_at(x, y, z),
            ]
        } else {
            e -= xc + yc;
            let x = (e % self.nx) as isize;
            let y = (e / self.nx) as isize;
            [
                cube_at(x - 1, y - 1, z),
                cube_at(x, y - 1, z),
                cube_at(x - 1, y, z),
                cube_at(x, y, z),
            ]
        }
    }
}

pub(crate) struct CubeLayout {
    /// Axis values of grid vertices; one longer than the cube count per
    /// axis
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub zs: Vec<f64>,

    /// Index of the slab's first row within the full grid
    pub z_offset: usize,
    pub buf_rows: usize,
    pub corners: Vec<Corner>,
    pub cubes: Vec<Cube>,
    pub edges: Vec<EdgeSlot>,
}

impl CubeLayout {
    pub fn new(min: Vec3, max: Vec3, delta: f64, no_jitter: bool, buf_size: usize) -> Self {
        let jitter = if no_jitter { 0.0 } else { delta * JITTER_FACTOR };

        let min = min.add_scalar(-delta);
        let max = max.add_scalar(delta);
        let count = (max - min) / delta;
        let nx = count.x.round() as usize + 1;
        let ny = count.y.round() as usize + 1;
        let nz = count.z.round() as usize + 1;

        let axis = |origin: f64, n: usize| -> Vec<f64> {
            (0..n).map(|i| origin + i as f64 * delta + jitter).collect()
        };
        let xs = axis(min.x, nx);
        let ys = axis(min.y, ny);
        let zs = axis(min.z, nz);

        let buf_rows = (buf_size / (nx * ny)).max(4).min(nz);

        let mut corners = Vec::with_capacity(nx * ny * buf_rows);
        for z in zs.iter().take(buf_rows) {
            for y in &ys {
                for x in &xs {
                    corners.push(Corner {
                        coord: Vec3::new(*x, *y, *z),
                        ..Corner::default()
                    });
                }
            }
        }

        let cubes = vec![Cube::default(); (nx - 1) * (ny - 1) * (buf_rows - 1)];
        let xc = (nx - 1) * ny;
        let yc = (ny - 1) * nx;
        let zc = nx * ny;
        let edges = vec![EdgeSlot::default(); (xc + yc) * buf_rows + zc * (buf_rows - 1)];

        CubeLayout { xs, ys, zs, z_offset: 0, buf_rows, corners, cubes, edges }
    }

    pub fn dims(&self) -> Dims {
        Dims { nx: self.xs.len(), ny: self.ys.len(), buf_rows: self.buf_rows }
    }

    /// Number of z-rows beyond the end of the current slab
    pub fn remaining(&self) -> usize {
        self.zs.len() - (self.buf_rows + self.z_offset)
    }

    /// Slides the slab down the z axis, keeping the last two rows
    pub fn shift(&mut self) {
        let rows = self.remaining().min(self.buf_rows - 2);
        let dims = self.dims();
        let (xc, yc, zc) = dims.edge_counts();
        let cube_row = (dims.nx - 1) * (dims.ny - 1);
        let corner_row = dims.nx * dims.ny;
        let edge_row = xc + yc + zc;

        shift_front(&mut self.cubes, rows * cube_row);
        shift_front(&mut self.corners, rows * corner_row);
        shift_front(&mut self.edges, rows * edge_row);

        self.z_offset += rows;

        let n_cubes = self.cubes.len();
        for c in &mut self.cubes[n_cubes - rows * cube_row..] {
            *c = Cube::default();
        }
        let n_edges = self.edges.len();
        for e in &mut self.edges[n_edges - rows * edge_row..] {
            *e = EdgeSlot::default();
        }
        let n_corners = self.corners.len();
        for i in n_corners - rows * corner_row..n_corners {
            let x = i % dims.nx;
            let y = (i / dims.nx) % dims.ny;
            let z = (i / dims.nx) / dims.ny;
            self.corners[i] = Corner {
                coord: Vec3::new(self.xs[x], self.ys[y], self.zs[z + self.z_offset]),
                ..Corner::default()
            };
        }
    }

    /// Edge slots whose four surrounding cubes are all populated
    ///
    /// When more rows are coming, the top-layer x/y edges belong to cubes
    /// of the next slab and are deferred.
    pub fn usable_edges(&self) -> usize {
        let at_bottom = self.z_offset + self.buf_rows == self.zs.len();
        let (xc, yc, _) = self.dims().edge_counts();
        let mut end = self.edges.len();
        if !at_bottom {
            end -= xc + yc;
        }
        end
    }

    pub fn cube_active(&self, c: usize) -> bool {
        let corners = self.dims().cube_corners(c);
        let first = self.corners[corners[0]].value;
        corners[1..].iter().any(|&i| self.corners[i].value != first)
    }

    pub fn cube_min_max(&self, c: usize) -> (Vec3, Vec3) {
        let corners = self.dims().cube_corners(c);
        let mut min = self.corners[corners[0]].coord;
        let mut max = min;
        for &i in &corners[1..] {
            let coord = self.corners[i].coord;
            min = min.min(coord);
            max = max.max(coord);
        }
        (min, max)
    }

    /// Bounds of the (full-grid) cube containing `c`
    pub fn point_cube_min_max(&self, c: Vec3) -> (Vec3, Vec3) {
        let lookup = |arr: &[f64], v: f64| -> usize {
            let idx = arr.partition_point(|&x| x < v);
            idx.clamp(1, arr.len() - 1) - 1
        };
        let xi = lookup(&self.xs, c.x);
        let yi = lookup(&self.ys, c.y);
        let zi = lookup(&self.zs, c.z);
        (
            Vec3::new(self.xs[xi], self.ys[yi], self.zs[zi]),
            Vec3::new(self.xs[xi + 1], self.ys[yi + 1], self.zs[zi + 1]),
        )
    }
}

/// Moves the tail of a buffer to its front
fn shift_front<T: Clone>(v: &mut [T], offset: usize) {
    for i in 0..v.len() - offset {
        v[i] = v[i + offset].clone();
    }
}
