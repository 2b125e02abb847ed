use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// 3D vector for world positions and directions.
///
/// The ground plane is X/Z; Y is up. Most gameplay math (aggro radius, bot
/// steering) is planar and ignores Y.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };
    pub const UP: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
    pub const FORWARD: Vec3 = Vec3 { x: 0.0, y: 0.0, z: -1.0 };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Point on the ground plane
    #[inline]
    pub fn ground(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    /// Unit direction on the ground plane for a yaw angle (radians)
    #[inline]
    pub fn from_yaw(yaw: f32) -> Self {
        Self {
            x: -yaw.sin(),
            y: 0.0,
            z: -yaw.cos(),
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            *self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn distance_to(&self, other: Vec3) -> f32 {
        (*self - other).length()
    }

    /// Projection onto the ground plane (Y dropped)
    #[inline]
    pub fn planar(&self) -> Self {
        Self {
            x: self.x,
            y: 0.0,
            z: self.z,
        }
    }

    /// Distance on the ground plane, ignoring height
    #[inline]
    pub fn planar_distance_to(&self, other: Vec3) -> f32 {
        (*self - other).planar().length()
    }

    /// Yaw angle (radians) that faces from this point toward `other`
    pub fn yaw_to(&self, other: Vec3) -> f32 {
        let d = other - *self;
        (-d.x).atan2(-d.z)
    }

    /// Step toward `target` by at most `max_step`, never overshooting
    pub fn move_towards(&self, target: Vec3, max_step: f32) -> Self {
        let delta = target - *self;
        let dist = delta.length();
        if dist <= max_step || dist == 0.0 {
            target
        } else {
            *self + delta * (max_step / dist)
        }
    }

    pub fn lerp(&self, other: Vec3, t: f32) -> Self {
        *self + (other - *self) * t
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Check if vector is approximately equal to another
    pub fn approx_eq(&self, other: Vec3, epsilon: f32) -> bool {
        (self.x - other.x).abs() < epsilon
            && (self.y - other.y).abs() < epsilon
            && (self.z - other.z).abs() < epsilon
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Vec3 {
        rhs * self
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl MulAssign<f32> for Vec3 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
        self.z *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_length() {
        let v = Vec3::new(2.0, 3.0, 6.0);
        assert!(approx_eq(v.length(), 7.0));
        assert!(approx_eq(v.length_sq(), 49.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = Vec3::new(0.0, 10.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert!(approx_eq(a.planar_distance_to(b), 5.0));
        assert!(a.distance_to(b) > 5.0);
    }

    #[test]
    fn test_move_towards_no_overshoot() {
        let a = Vec3::ZERO;
        let b = Vec3::ground(10.0, 0.0);
        let step = a.move_towards(b, 4.0);
        assert!(step.approx_eq(Vec3::ground(4.0, 0.0), EPSILON));

        let arrive = a.move_towards(b, 25.0);
        assert_eq!(arrive, b);
    }

    #[test]
    fn test_yaw_to_matches_from_yaw() {
        let origin = Vec3::ZERO;
        let target = Vec3::ground(5.0, -5.0);
        let yaw = origin.yaw_to(target);
        let dir = Vec3::from_yaw(yaw);
        assert!(dir.approx_eq((target - origin).normalize(), 1e-4));
    }

    #[test]
    fn test_lerp() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 10.0, 10.0);
        assert!(a.lerp(b, 0.5).approx_eq(Vec3::new(5.0, 5.0, 5.0), EPSILON));
    }

    #[test]
    fn test_ops() {
        let mut a = Vec3::new(1.0, 2.0, 3.0);
        a += Vec3::ONE;
        assert_eq!(a, Vec3::new(2.0, 3.0, 4.0));
        a -= Vec3::ONE;
        a *= 2.0;
        assert_eq!(a, Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(-a, Vec3::new(-2.0, -4.0, -6.0));
        assert_eq!(0.5 * a, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_serde_missing_height_defaults_to_ground() {
        let v: Vec3 = serde_json::from_str(r#"{"x":1.5,"z":-2.0}"#).unwrap();
        assert_eq!(v, Vec3::ground(1.5, -2.0));
    }
}
