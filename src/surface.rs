//! Surface search over a solid oracle
//!
//! Estimates collision points and normals on the boundary of a [`Solid`]
//! using only membership queries: bisection along a crossing segment for
//! points, and either a pair of tangent-plane bisections or an evolution
//! strategy for normals.

use crate::geom::Vec3;
use crate::solid::Solid;

pub const DEFAULT_BISECT_COUNT: usize = 32;
pub const DEFAULT_NORMAL_SAMPLES: usize = 40;
pub const DEFAULT_NORMAL_BISECT_EPSILON: f64 = 1e-4;
pub const DEFAULT_NORMAL_NOISE_EPSILON: f64 = 1e-4;

/// Estimates surface points and normals of a solid using search
#[derive(Copy, Clone)]
pub struct SurfaceEstimator<'a, S: Solid + ?Sized> {
    /// The solid to estimate the surface of
    pub solid: &'a S,

    /// Number of bisection steps used by [`bisect`](Self::bisect);
    /// 0 means [`DEFAULT_BISECT_COUNT`]
    pub bisect_count: usize,

    /// Number of samples used to approximate normals;
    /// 0 means [`DEFAULT_NORMAL_SAMPLES`]
    pub normal_samples: usize,

    /// Estimate normals with an evolution strategy over random samples
    /// instead of the default bisection search
    pub random_search_normals: bool,

    /// Sampling distance for the bisection normal search; must be larger
    /// than the distance between the query point and the true surface.
    /// 0 means [`DEFAULT_NORMAL_BISECT_EPSILON`]
    pub normal_bisect_epsilon: f64,

    /// Sampling distance for the evolution-strategy normal search; must be
    /// larger than the distance between the query point and the true
    /// surface.  0 means [`DEFAULT_NORMAL_NOISE_EPSILON`]
    pub normal_noise_epsilon: f64,
}

impl<'a, S: Solid + ?Sized> SurfaceEstimator<'a, S> {
    pub fn new(solid: &'a S) -> Self {
        Self {
            solid,
            bisect_count: 0,
            normal_samples: 0,
            random_search_normals: false,
            normal_bisect_epsilon: 0.0,
            normal_noise_epsilon: 0.0,
        }
    }

    /// Returns alpha in `[min, max]` minimizing the surface's distance to
    /// `p1 + alpha * (p2 - p1)`
    ///
    /// Assumes `p1` is outside the solid, `p2` is inside, and `min < max`.
    pub fn bisect_interp(&self, p1: Vec3, p2: Vec3, mut min: f64, mut max: f64) -> f64 {
        let d = p2 - p1;
        for _ in 0..self.bisect_count() {
            let f = (min + max) / 2.0;
            if self.solid.contains(p1 + d * f) {
                max = f;
            } else {
                min = f;
            }
        }
        (min + max) / 2.0
    }

    /// Finds the point between `p1` and `p2` closest to the surface,
    /// provided the endpoints are on different sides of it
    pub fn bisect(&self, p1: Vec3, p2: Vec3) -> Vec3 {
        let alpha = if self.solid.contains(p1) {
            1.0 - self.bisect_interp(p2, p1, 0.0, 1.0)
        } else {
            self.bisect_interp(p1, p2, 0.0, 1.0)
        };
        p1 + (p2 - p1) * alpha
    }

    /// Computes the outward normal at a point on the surface
    ///
    /// The point must lie on the boundary of the solid (within the
    /// configured epsilon), e.g. a result of [`bisect`](Self::bisect).
    pub fn normal(&self, c: Vec3) -> Vec3 {
        if self.random_search_normals {
            self.es_normal(c)
        } else {
            self.bisect_normal(c)
        }
    }

    fn es_normal(&self, c: Vec3) -> Vec3 {
        let eps = self.normal_noise_epsilon();
        let count = self.normal_samples();
        assert!(count >= 1, "need at least one sample to estimate a normal");

        let mut rng = rand::thread_rng();
        let mut normal_sum = Vec3::ZERO;
        for _ in 0..count {
            let delta = Vec3::random_unit(&mut rng);
            if self.solid.contains(c + delta * eps) {
                normal_sum -= delta;
            } else {
                normal_sum += delta;
            }
        }
        normal_sum.normalize()
    }

    fn bisect_normal(&self, c: Vec3) -> Vec3 {
        let count = self.normal_samples();
        let eps = self.normal_bisect_epsilon();
        assert!(count >= 6, "need at least 6 samples to bisect a normal");

        // Three fixed, randomly chosen orthogonal directions.
        let axis1 = Vec3::new(-0.7107294727984605, -0.12934902142019175, 0.6914712193238857);
        let axis2 = Vec3::new(0.09870891687574183, -0.9915624053549226, -0.08402705526185106);
        let axis3 = Vec3::new(0.696505682837434, 0.008533870423146774, 0.7175005274080017);
        let mut axes = [axis1 * eps, axis2 * eps, axis3 * eps];
        let mut contains = [false; 3];
        for (i, axis) in axes.iter().enumerate() {
            contains[i] = self.solid.contains(c + *axis);
        }

        let mut plane_axes = [Vec3::ZERO; 2];
        for i in 0..2 {
            // Move two sample vectors towards each other until both are
            // tangent to the surface plane.
            let (mut v1, c1) = (axes[i], contains[i]);
            let (mut v2, c2) = (axes[i + 1], contains[i + 1]);
            if !c1 {
                v1 = -v1;
            }
            if c2 {
                v2 = -v2;
            }
            for _ in 0..(count - 4) / 2 {
                let mut mp = v1 + v2;
                mp = mp * (eps / mp.norm());
                if self.solid.contains(c + mp) {
                    v1 = mp;
                } else {
                    v2 = mp;
                }
            }
            plane_axes[i] = v1 + v2;
            if i == 0
                && plane_axes[0].dot(axes[1]).abs() > plane_axes[0].dot(axes[0]).abs()
            {
                // axes[1] is nearly tangent to the surface; swapping it out
                // keeps the second bisection well-conditioned.  This relies
                // on the solid being smooth near c.
                axes.swap(0, 1);
                contains.swap(0, 1);
            }
        }
        let res = plane_axes[0].cross(plane_axes[1]).normalize();

        // Outward means stepping along the normal exits the solid.
        if self.solid.contains(c + res * eps) {
            -res
        } else {
            res
        }
    }

    fn bisect_count(&self) -> usize {
        if self.bisect_count == 0 {
            DEFAULT_BISECT_COUNT
        } else {
            self.bisect_count
        }
    }

    fn normal_samples(&self) -> usize {
        if self.normal_samples == 0 {
            DEFAULT_NORMAL_SAMPLES
        } else {
            self.normal_samples
        }
    }

    fn normal_bisect_epsilon(&self) -> f64 {
        if self.normal_bisect_epsilon == 0.0 {
            DEFAULT_NORMAL_BISECT_EPSILON
        } else {
            self.normal_bisect_epsilon
        }
    }

    fn normal_noise_epsilon(&self) -> f64 {
        if self.normal_noise_epsilon == 0.0 {
            DEFAULT_NORMAL_NOISE_EPSILON
        } else {
            self.normal_noise_epsilon
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solid::Sphere;

    #[test]
    fn bisect_hits_sphere_surface() {
        let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
        let est = SurfaceEstimator::new(&sphere);

        let p = est.bisect(Vec3::new(2.0, 0.3, -0.1), Vec3::new(0.0, 0.1, 0.0));
        assert!((p.norm() - 1.0).abs() < 1e-6);

        // Swapped sides must land on the same surface.
        let p = est.bisect(Vec3::new(0.0, 0.1, 0.0), Vec3::new(2.0, 0.3, -0.1));
        assert!((p.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bisection_normals_on_sphere() {
        let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
        let est = SurfaceEstimator::new(&sphere);
        for dir in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.3, -0.8, 0.52).normalize(),
            Vec3::new(-0.2, 0.4, 0.9).normalize(),
        ] {
            let n = est.normal(dir);
            assert!(n.dist(dir) < 0.05, "normal {n:?} should be near {dir:?}");
        }
    }

    #[test]
    fn es_normals_on_sphere() {
        let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
        let mut est = SurfaceEstimator::new(&sphere);
        est.random_search_normals = true;
        est.normal_samples = 400;
        let dir = Vec3::new(0.6, 0.8, 0.0);
        let n = est.normal(dir);
        assert!(n.dist(dir) < 0.3, "normal {n:?} should be near {dir:?}");
    }
}
