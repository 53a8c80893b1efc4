#[derive(Clone, Copy, PartialEq, PartialOrd, Debug)]
pub(crate) struct V {
    pub x: f64,
    pub y: f64,
}

impl V {
    #[inline(always)]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `theta` radians, counter-clockwise from +X.
    #[inline(always)]
    pub fn from_angle(theta: f64) -> Self {
        let (sin, cos) = libm::sincos(theta);
        Self { x: cos, y: sin }
    }

    #[inline(always)]
    pub fn magnitude(&self) -> f64 {
        libm::hypot(self.x, self.y)
    }

    #[inline(always)]
    pub fn euclidean_distance(self, rhs: Self) -> f64 {
        let d = self - rhs;
        d.magnitude()
    }

    /// Angle of the vector from `self` to `rhs`, in (-π, π].
    #[inline(always)]
    pub fn angle_to(self, rhs: Self) -> f64 {
        let d = rhs - self;
        libm::atan2(d.y, d.x)
    }
}

impl std::ops::Sub<Self> for V {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Add<Self> for V {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Mul<f64> for V {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;
    use crate::tests::assert_nearly_eq;

    #[test]
    fn test_geometry() {
        assert_nearly_eq(V::new(-1.0, 0.0).euclidean_distance(V::new(2.0, 4.0)), 5.0);
        assert_nearly_eq(V::new(0.0, 0.0).angle_to(V::new(0.0, 3.0)), PI / 2.0);
        assert_nearly_eq(V::new(1.0, 1.0).angle_to(V::new(-1.0, 1.0)), PI);
        let unit = V::from_angle(PI / 2.0);
        assert_nearly_eq(unit.x, 0.0);
        assert_nearly_eq(unit.y, 1.0);
        assert_nearly_eq((V::new(3.0, 4.0) * 2.0).magnitude(), 10.0);
    }
}
