//! 3D coordinates with bitwise equality
//!
//! Mesh algorithms in this crate identify vertices by their exact floating
//! point representation, so [`Vec3`] implements `Eq` and `Hash` over the
//! IEEE-754 bit patterns of its components.  `+0.0` and `-0.0` are distinct
//! keys, and NaN keys are allowed (they never compare equal to themselves
//! through `PartialEq` on `f64`, but do here, since comparison is bitwise).

use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Div, Index, Mul, Neg, Sub, SubAssign};

/// A point or direction in 3D space
#[derive(Copy, Clone, Debug, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Builds a vector with all three components set to `v`
    pub fn splat(v: f64) -> Self {
        Self::new(v, v, v)
    }

    pub fn from_array(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    pub fn array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns a 64-bit fingerprint of the bit representation
    ///
    /// This is the hash used by every coordinate-keyed container in the
    /// crate; it mixes the three IEEE-754 encodings with an FNV-style
    /// multiply and rotate.
    pub fn fast_hash64(self) -> u64 {
        let mut h = 0xcbf2_9ce4_8422_2325u64;
        for b in [self.x.to_bits(), self.y.to_bits(), self.z.to_bits()] {
            h ^= b;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
            h = h.rotate_left(23);
        }
        h
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm_squared(self) -> f64 {
        self.dot(self)
    }

    pub fn norm(self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn normalize(self) -> Vec3 {
        self / self.norm()
    }

    pub fn dist(self, other: Vec3) -> f64 {
        (self - other).norm()
    }

    pub fn mid(self, other: Vec3) -> Vec3 {
        (self + other) * 0.5
    }

    /// Componentwise minimum
    pub fn min(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Componentwise maximum
    pub fn max(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn abs(self) -> Vec3 {
        Vec3::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    pub fn max_component(self) -> f64 {
        self.x.max(self.y).max(self.z)
    }

    pub fn add_scalar(self, s: f64) -> Vec3 {
        Vec3::new(self.x + s, self.y + s, self.z + s)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Returns two unit vectors that, together with `self`, form an
    /// orthonormal right-handed basis
    ///
    /// `self` must already be normalized.
    pub fn ortho_basis(self) -> (Vec3, Vec3) {
        // Pick the axis least aligned with self to seed the basis.
        let seed = if self.x.abs() < self.y.abs().min(self.z.abs()) {
            Vec3::new(1.0, 0.0, 0.0)
        } else if self.y.abs() < self.z.abs() {
            Vec3::new(0.0, 1.0, 0.0)
        } else {
            Vec3::new(0.0, 0.0, 1.0)
        };
        let b1 = self.cross(seed).normalize();
        let b2 = self.cross(b1);
        (b1, b2)
    }

    /// Samples a uniformly random unit vector
    pub fn random_unit<R: rand::Rng>(rng: &mut R) -> Vec3 {
        loop {
            let v = Vec3::new(
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
                rng.gen::<f64>() * 2.0 - 1.0,
            );
            let n = v.norm_squared();
            if n > 1e-8 && n <= 1.0 {
                return v / n.sqrt();
            }
        }
    }

    /// Total order over the bit-exact component values, used to pick
    /// canonical segment endpoints
    pub fn lex_cmp(self, other: Vec3) -> std::cmp::Ordering {
        self.x
            .total_cmp(&other.x)
            .then(self.y.total_cmp(&other.y))
            .then(self.z.total_cmp(&other.z))
    }

    pub fn to_na(self) -> nalgebra::Vector3<f64> {
        nalgebra::Vector3::new(self.x, self.y, self.z)
    }

    pub fn from_na(v: nalgebra::Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl PartialEq for Vec3 {
    fn eq(&self, other: &Self) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.z.to_bits() == other.z.to_bits()
    }
}

impl Eq for Vec3 {}

impl Hash for Vec3 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fast_hash64());
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        *self = *self - rhs;
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("axis index {i} out of range"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn bitwise_equality() {
        assert_eq!(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 3.0));
        assert_ne!(Vec3::new(0.0, 0.0, 0.0), Vec3::new(-0.0, 0.0, 0.0));

        let nan = Vec3::new(f64::NAN, 0.0, 0.0);
        assert_eq!(nan, nan);
    }

    #[test]
    fn hash_is_usable_as_key() {
        let mut m = HashMap::new();
        m.insert(Vec3::new(1.0, 2.0, 3.0), 1);
        m.insert(Vec3::new(1.0, 2.0, 3.0), 2);
        m.insert(Vec3::new(-0.0, 0.0, 0.0), 3);
        m.insert(Vec3::new(0.0, 0.0, 0.0), 4);
        assert_eq!(m.len(), 3);
        assert_eq!(m[&Vec3::new(1.0, 2.0, 3.0)], 2);
    }

    #[test]
    fn ortho_basis_is_orthonormal() {
        for v in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, -2.0, 3.0).normalize(),
        ] {
            let (a, b) = v.ortho_basis();
            assert!(a.dot(v).abs() < 1e-12);
            assert!(b.dot(v).abs() < 1e-12);
            assert!(a.dot(b).abs() < 1e-12);
            assert!((a.norm() - 1.0).abs() < 1e-12);
            assert!((b.norm() - 1.0).abs() < 1e-12);
        }
    }
}
