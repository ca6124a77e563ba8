use serde::{Deserialize, Serialize};

// Basic 2D vector type shared between the engine and its collaborators.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[inline(always)]
    pub fn new(x: f32, y: f32) -> Self { Self { x, y } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0) }
    #[inline(always)]
    pub fn length_squared(self) -> f32 { self.x * self.x + self.y * self.y }
    #[inline(always)]
    pub fn length(self) -> f32 { self.length_squared().sqrt() }
    #[inline(always)]
    pub fn add(self, other: Self) -> Self { Self::new(self.x + other.x, self.y + other.y) }
    #[inline(always)]
    pub fn sub(self, other: Self) -> Self { Self::new(self.x - other.x, self.y - other.y) }
    #[inline(always)]
    pub fn scale(self, scalar: f32) -> Self { Self::new(self.x * scalar, self.y * scalar) }
    #[inline(always)]
    pub fn dot(self, other: Self) -> f32 { self.x * other.x + self.y * other.y }

    /// Rotates the vector by `theta` radians (counter-clockwise).
    #[inline(always)]
    pub fn rotate(self, theta: f32) -> Self {
        let (s, c) = theta.sin_cos();
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }
}

#[inline(always)]
pub fn angle_to_vec(theta: f32) -> Vec2 { Vec2::new(theta.cos(), theta.sin()) }

#[inline(always)]
pub fn vec_to_angle(v: Vec2) -> f32 { v.y.atan2(v.x) }

/// Maps an angle into `[0, 2*pi)`.
#[inline(always)]
pub fn wrap_angle(theta: f32) -> f32 {
    theta.rem_euclid(2.0 * std::f32::consts::PI)
}
