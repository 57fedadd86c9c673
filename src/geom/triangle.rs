//! Triangles and undirected line segments

use super::Vec3;

/// An unordered pair of coordinates
///
/// The endpoints are stored with the lexicographically smaller one first, so
/// a `Segment` hashes the same regardless of the orientation it was built
/// from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Segment(pub [Vec3; 2]);

impl Segment {
    pub fn new(a: Vec3, b: Vec3) -> Self {
        if a.lex_cmp(b) == std::cmp::Ordering::Greater {
            Segment([b, a])
        } else {
            Segment([a, b])
        }
    }

    pub fn mid(&self) -> Vec3 {
        self.0[0].mid(self.0[1])
    }

    pub fn length(&self) -> f64 {
        self.0[0].dist(self.0[1])
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.0[0] == p || self.0[1] == p
    }

    /// Returns the vertex of `t` that is not an endpoint of this segment
    ///
    /// # Panics
    /// If every vertex of `t` is an endpoint of the segment
    pub fn other(&self, t: &Triangle) -> Vec3 {
        for &p in &t.0 {
            if !self.contains(p) {
                return p;
            }
        }
        panic!("triangle has no vertex off the segment");
    }

    /// Distance from `p` to the closest point on the segment
    pub fn dist(&self, p: Vec3) -> f64 {
        let d = self.0[1] - self.0[0];
        let len_sq = d.norm_squared();
        if len_sq == 0.0 {
            return self.0[0].dist(p);
        }
        let t = ((p - self.0[0]).dot(d) / len_sq).clamp(0.0, 1.0);
        (self.0[0] + d * t).dist(p)
    }
}

/// An ordered triple of coordinates
///
/// Counter-clockwise winding, seen from outside a solid, corresponds to an
/// outward-facing [`normal`](Triangle::normal).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Triangle(pub [Vec3; 3]);

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Triangle([a, b, c])
    }

    /// Unit normal following the right-hand rule over the two leading edges
    pub fn normal(&self) -> Vec3 {
        self.cross_product().normalize()
    }

    fn cross_product(&self) -> Vec3 {
        (self.0[1] - self.0[0]).cross(self.0[2] - self.0[0])
    }

    pub fn area(&self) -> f64 {
        self.cross_product().norm() / 2.0
    }

    pub fn segments(&self) -> [Segment; 3] {
        [
            Segment::new(self.0[0], self.0[1]),
            Segment::new(self.0[1], self.0[2]),
            Segment::new(self.0[2], self.0[0]),
        ]
    }

    pub fn contains_vertex(&self, p: Vec3) -> bool {
        self.0.contains(&p)
    }

    /// True if the two triangles share exactly one edge (two vertices)
    pub fn shares_edge(&self, other: &Triangle) -> bool {
        let shared = self
            .0
            .iter()
            .filter(|p| other.0.contains(p))
            .count();
        shared == 2
    }

    /// Reverses the winding (and therefore the normal)
    pub fn flipped(&self) -> Triangle {
        Triangle([self.0[2], self.0[1], self.0[0]])
    }

    pub fn at_barycentric(&self, b: [f64; 3]) -> Vec3 {
        self.0[0] * b[0] + self.0[1] * b[1] + self.0[2] * b[2]
    }

    pub fn min(&self) -> Vec3 {
        self.0[0].min(self.0[1]).min(self.0[2])
    }

    pub fn max(&self) -> Vec3 {
        self.0[0].max(self.0[1]).max(self.0[2])
    }

    pub fn centroid(&self) -> Vec3 {
        (self.0[0] + self.0[1] + self.0[2]) / 3.0
    }

    /// Signed volume of the tetrahedron spanned with the origin
    ///
    /// Summed over a closed, outward-oriented mesh this yields the enclosed
    /// volume.
    pub fn signed_volume(&self) -> f64 {
        self.0[0].dot(self.0[1].cross(self.0[2])) / 6.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn segment_is_orientation_independent() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-1.0, 0.0, 5.0);
        assert_eq!(Segment::new(a, b), Segment::new(b, a));
    }

    #[test]
    fn segment_dist() {
        let s = Segment::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        assert!((s.dist(Vec3::new(1.0, 1.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((s.dist(Vec3::new(3.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normal_follows_winding() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        );
        assert!(t.normal().dist(Vec3::new(0.0, 0.0, 1.0)) < 1e-12);
        assert!(t.flipped().normal().dist(Vec3::new(0.0, 0.0, -1.0)) < 1e-12);
        assert!((t.area() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn shares_edge() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 1.0, 0.0);
        let d = Vec3::new(1.0, 1.0, 0.0);
        assert!(Triangle::new(a, b, c).shares_edge(&Triangle::new(b, d, c)));
        assert!(!Triangle::new(a, b, c).shares_edge(&Triangle::new(a, d, Vec3::new(2.0, 0.0, 0.0))));
    }
}
