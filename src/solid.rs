//! Solid-membership oracles
//!
//! A [`Solid`] answers "is this point inside?" together with a bounding box;
//! it is the input to the Dual Contouring engine and the hierarchy
//! extractor.  [`MeshSolid`] turns a closed triangle shell back into a solid
//! through even-odd ray casting over a bounding-box tree, and [`MeshSdf`]
//! extends it with signed distances.

use crate::geom::{Triangle, Vec3};

/// A solid region of 3D space, described by membership
///
/// `contains` must be deterministic and safe to call from multiple threads.
pub trait Solid: Sync {
    /// Minimum corner of a box enclosing the solid
    fn min(&self) -> Vec3;
    /// Maximum corner of a box enclosing the solid
    fn max(&self) -> Vec3;
    /// Returns true if `p` is inside the solid
    fn contains(&self, p: Vec3) -> bool;
}

impl<S: Solid + ?Sized> Solid for &S {
    fn min(&self) -> Vec3 {
        (**self).min()
    }
    fn max(&self) -> Vec3 {
        (**self).max()
    }
    fn contains(&self, p: Vec3) -> bool {
        (**self).contains(p)
    }
}

/// A solid that also reports signed distance to its surface
///
/// Positive values are inside, negative outside.
pub trait Sdf: Solid {
    fn sdf(&self, p: Vec3) -> f64;
}

/// Checks that a solid's bounding box is finite and non-inverted
pub fn bounds_valid(s: &(impl Solid + ?Sized)) -> bool {
    let (min, max) = (s.min(), s.max());
    min.is_finite() && max.is_finite() && min.x <= max.x && min.y <= max.y && min.z <= max.z
}

/// A ball around a center point
#[derive(Copy, Clone, Debug)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
}

impl Solid for Sphere {
    fn min(&self) -> Vec3 {
        self.center.add_scalar(-self.radius)
    }
    fn max(&self) -> Vec3 {
        self.center.add_scalar(self.radius)
    }
    fn contains(&self, p: Vec3) -> bool {
        p.dist(self.center) <= self.radius
    }
}

impl Sdf for Sphere {
    fn sdf(&self, p: Vec3) -> f64 {
        self.radius - p.dist(self.center)
    }
}

/// A capped cylinder between two points
#[derive(Copy, Clone, Debug)]
pub struct Cylinder {
    pub p1: Vec3,
    pub p2: Vec3,
    pub radius: f64,
}

impl Solid for Cylinder {
    fn min(&self) -> Vec3 {
        self.p1.min(self.p2).add_scalar(-self.radius)
    }
    fn max(&self) -> Vec3 {
        self.p1.max(self.p2).add_scalar(self.radius)
    }
    fn contains(&self, p: Vec3) -> bool {
        let axis = self.p2 - self.p1;
        let len_sq = axis.norm_squared();
        let t = (p - self.p1).dot(axis) / len_sq;
        if !(0.0..=1.0).contains(&t) {
            return false;
        }
        (self.p1 + axis * t).dist(p) <= self.radius
    }
}

/// An axis-aligned box
#[derive(Copy, Clone, Debug)]
pub struct Rect {
    pub min: Vec3,
    pub max: Vec3,
}

impl Solid for Rect {
    fn min(&self) -> Vec3 {
        self.min
    }
    fn max(&self) -> Vec3 {
        self.max
    }
    fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x <= self.max.x
            && p.y <= self.max.y
            && p.z <= self.max.z
    }
}

/// Wraps a membership closure and explicit bounds into a [`Solid`]
pub struct SolidFn<F> {
    pub min: Vec3,
    pub max: Vec3,
    pub f: F,
}

impl<F: Fn(Vec3) -> bool + Sync> Solid for SolidFn<F> {
    fn min(&self) -> Vec3 {
        self.min
    }
    fn max(&self) -> Vec3 {
        self.max
    }
    fn contains(&self, p: Vec3) -> bool {
        (self.f)(p)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Ray direction used for containment tests
///
/// Deliberately far from any axis so that rays through mesh vertices and
/// edges (which would double-count intersections) are vanishingly rare.
const RAY_DIR: Vec3 = Vec3 {
    x: 0.5224891381590512,
    y: 0.10561753737305725,
    z: 0.8460722843408535,
};

const LEAF_SIZE: usize = 8;

struct BvhNode {
    min: Vec3,
    max: Vec3,
    kind: BvhKind,
}

enum BvhKind {
    Leaf(Vec<Triangle>),
    Split(Box<[BvhNode; 2]>),
}

impl BvhNode {
    fn build(mut tris: Vec<Triangle>) -> Self {
        let mut min = tris[0].min();
        let mut max = tris[0].max();
        for t in &tris {
            min = min.min(t.min());
            max = max.max(t.max());
        }
        if tris.len() <= LEAF_SIZE {
            return BvhNode { min, max, kind: BvhKind::Leaf(tris) };
        }

        // Median split along the longest bounding-box axis.
        let size = max - min;
        let axis = if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        };
        let mid = tris.len() / 2;
        tris.select_nth_unstable_by(mid, |a, b| {
            a.centroid()[axis].total_cmp(&b.centroid()[axis])
        });
        let right = tris.split_off(mid);
        BvhNode {
            min,
            max,
            kind: BvhKind::Split(Box::new([Self::build(tris), Self::build(right)])),
        }
    }

    fn ray_may_hit(&self, origin: Vec3, inv_dir: Vec3) -> bool {
        let mut t_min = 0.0f64;
        let mut t_max = f64::INFINITY;
        for axis in 0..3 {
            let t1 = (self.min[axis] - origin[axis]) * inv_dir[axis];
            let t2 = (self.max[axis] - origin[axis]) * inv_dir[axis];
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }
        t_min <= t_max
    }

    fn count_ray_hits(&self, origin: Vec3, dir: Vec3, inv_dir: Vec3) -> usize {
        if !self.ray_may_hit(origin, inv_dir) {
            return 0;
        }
        match &self.kind {
            BvhKind::Leaf(tris) => tris
                .iter()
                .filter(|t| ray_triangle(origin, dir, t).is_some())
                .count(),
            BvhKind::Split(children) => children
                .iter()
                .map(|c| c.count_ray_hits(origin, dir, inv_dir))
                .sum(),
        }
    }

    fn point_bound_sq(&self, p: Vec3) -> f64 {
        let clamped = p.max(self.min).min(self.max);
        clamped.dist(p).powi(2)
    }

    fn nearest_sq(&self, p: Vec3, best: &mut f64) {
        if self.point_bound_sq(p) >= *best {
            return;
        }
        match &self.kind {
            BvhKind::Leaf(tris) => {
                for t in tris {
                    let d = point_triangle_dist_sq(p, t);
                    if d < *best {
                        *best = d;
                    }
                }
            }
            BvhKind::Split(children) => {
                // Descend into the closer child first to tighten the bound.
                let d0 = children[0].point_bound_sq(p);
                let d1 = children[1].point_bound_sq(p);
                if d0 <= d1 {
                    children[0].nearest_sq(p, best);
                    children[1].nearest_sq(p, best);
                } else {
                    children[1].nearest_sq(p, best);
                    children[0].nearest_sq(p, best);
                }
            }
        }
    }
}

/// Möller–Trumbore intersection; returns the ray parameter of the hit
fn ray_triangle(origin: Vec3, dir: Vec3, t: &Triangle) -> Option<f64> {
    const EPS: f64 = 1e-12;
    let e1 = t.0[1] - t.0[0];
    let e2 = t.0[2] - t.0[0];
    let h = dir.cross(e2);
    let a = e1.dot(h);
    if a.abs() < EPS {
        return None;
    }
    let f = 1.0 / a;
    let s = origin - t.0[0];
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = f * dir.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let hit = f * e2.dot(q);
    (hit > EPS).then_some(hit)
}

fn point_triangle_dist_sq(p: Vec3, t: &Triangle) -> f64 {
    let normal = (t.0[1] - t.0[0]).cross(t.0[2] - t.0[0]);
    let n_sq = normal.norm_squared();
    if n_sq > 0.0 {
        // Project onto the triangle plane and test barycentric containment.
        let rel = p - t.0[0];
        let proj = p - normal * (rel.dot(normal) / n_sq);
        let v0 = t.0[1] - t.0[0];
        let v1 = t.0[2] - t.0[0];
        let v2 = proj - t.0[0];
        let d00 = v0.dot(v0);
        let d01 = v0.dot(v1);
        let d11 = v1.dot(v1);
        let d20 = v2.dot(v0);
        let d21 = v2.dot(v1);
        let denom = d00 * d11 - d01 * d01;
        if denom > 0.0 {
            let b1 = (d11 * d20 - d01 * d21) / denom;
            let b2 = (d00 * d21 - d01 * d20) / denom;
            if b1 >= 0.0 && b2 >= 0.0 && b1 + b2 <= 1.0 {
                return proj.dist(p).powi(2);
            }
        }
    }
    t.segments()
        .iter()
        .map(|s| s.dist(p).powi(2))
        .fold(f64::INFINITY, f64::min)
}

/// A solid backed by a closed triangle mesh
///
/// Containment uses the even-odd rule along a fixed ray direction, so the
/// shell must be closed (every edge shared by exactly two faces) for results
/// to be meaningful.
pub struct MeshSolid {
    root: BvhNode,
}

impl MeshSolid {
    /// Builds the bounding-box tree for a set of shell triangles
    ///
    /// # Panics
    /// If `tris` is empty
    pub fn new(tris: Vec<Triangle>) -> Self {
        assert!(!tris.is_empty(), "mesh solid requires at least one triangle");
        Self { root: BvhNode::build(tris) }
    }

    /// Distance from `p` to the closest point on the shell
    pub fn surface_dist(&self, p: Vec3) -> f64 {
        let mut best = f64::INFINITY;
        self.root.nearest_sq(p, &mut best);
        best.sqrt()
    }
}

impl Solid for MeshSolid {
    fn min(&self) -> Vec3 {
        self.root.min
    }
    fn max(&self) -> Vec3 {
        self.root.max
    }
    fn contains(&self, p: Vec3) -> bool {
        let inv_dir = Vec3::new(1.0 / RAY_DIR.x, 1.0 / RAY_DIR.y, 1.0 / RAY_DIR.z);
        self.root.count_ray_hits(p, RAY_DIR, inv_dir) % 2 == 1
    }
}

/// Signed distance field over a closed triangle mesh
pub struct MeshSdf(pub MeshSolid);

impl Solid for MeshSdf {
    fn min(&self) -> Vec3 {
        self.0.min()
    }
    fn max(&self) -> Vec3 {
        self.0.max()
    }
    fn contains(&self, p: Vec3) -> bool {
        self.0.contains(p)
    }
}

impl Sdf for MeshSdf {
    fn sdf(&self, p: Vec3) -> f64 {
        let d = self.0.surface_dist(p);
        if self.0.contains(p) {
            d
        } else {
            -d
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn unit_cube_shell() -> Vec<Triangle> {
        let mut tris = Vec::new();
        let v = |x: f64, y: f64, z: f64| Vec3::new(x, y, z);
        // Two triangles per face; winding is irrelevant for even-odd tests.
        let quads = [
            [v(0., 0., 0.), v(1., 0., 0.), v(1., 1., 0.), v(0., 1., 0.)],
            [v(0., 0., 1.), v(1., 0., 1.), v(1., 1., 1.), v(0., 1., 1.)],
            [v(0., 0., 0.), v(1., 0., 0.), v(1., 0., 1.), v(0., 0., 1.)],
            [v(0., 1., 0.), v(1., 1., 0.), v(1., 1., 1.), v(0., 1., 1.)],
            [v(0., 0., 0.), v(0., 1., 0.), v(0., 1., 1.), v(0., 0., 1.)],
            [v(1., 0., 0.), v(1., 1., 0.), v(1., 1., 1.), v(1., 0., 1.)],
        ];
        for q in quads {
            tris.push(Triangle::new(q[0], q[1], q[2]));
            tris.push(Triangle::new(q[0], q[2], q[3]));
        }
        tris
    }

    #[test]
    fn mesh_solid_contains() {
        let solid = MeshSolid::new(unit_cube_shell());
        assert!(solid.contains(Vec3::new(0.5, 0.5, 0.5)));
        assert!(solid.contains(Vec3::new(0.1, 0.9, 0.2)));
        assert!(!solid.contains(Vec3::new(1.5, 0.5, 0.5)));
        assert!(!solid.contains(Vec3::new(-0.1, -0.1, -0.1)));
    }

    #[test]
    fn mesh_sdf_sign_and_magnitude() {
        let sdf = MeshSdf(MeshSolid::new(unit_cube_shell()));
        assert!((sdf.sdf(Vec3::new(0.5, 0.5, 0.5)) - 0.5).abs() < 1e-12);
        assert!((sdf.sdf(Vec3::new(0.5, 0.5, 1.25)) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn solid_fn_wraps_closures() {
        // A hemisphere as a plain closure.
        let s = SolidFn {
            min: Vec3::new(-1.0, -1.0, 0.0),
            max: Vec3::new(1.0, 1.0, 1.0),
            f: |p: Vec3| p.norm() <= 1.0 && p.z >= 0.0,
        };
        assert!(bounds_valid(&s));
        assert!(s.contains(Vec3::new(0.0, 0.0, 0.5)));
        assert!(!s.contains(Vec3::new(0.0, 0.0, -0.5)));
        assert!(!s.contains(Vec3::new(1.0, 1.0, 0.5)));
    }

    #[test]
    fn primitive_bounds() {
        let s = Sphere { center: Vec3::new(1.0, 0.0, 0.0), radius: 2.0 };
        assert!(bounds_valid(&s));
        assert!(s.contains(Vec3::new(2.5, 0.0, 0.0)));
        assert!(!s.contains(Vec3::new(3.5, 0.0, 0.0)));

        let c = Cylinder {
            p1: Vec3::new(0.0, 0.0, -1.0),
            p2: Vec3::new(0.0, 0.0, 1.0),
            radius: 0.5,
        };
        assert!(c.contains(Vec3::new(0.4, 0.0, 0.0)));
        assert!(!c.contains(Vec3::new(0.0, 0.6, 0.0)));
        assert!(!c.contains(Vec3::new(0.0, 0.0, 1.1)));
    }
}
