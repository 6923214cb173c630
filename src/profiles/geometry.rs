use serde::{Deserialize, Serialize};

/// Radii are floored at this value so every profile is finite at its centre
pub const GRID_RADIUS_MIN: f64 = 1e-8;

/// Reduced representation of axis ratio and position angle
///
/// The position angle is `0.5 * atan2(e2, e1)` counter-clockwise from the
/// positive x axis, and the axis ratio is `(1 - f) / (1 + f)` with
/// `f = sqrt(e1^2 + e2^2)`. `(0, 0)` is exactly the circular case.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipticalComponents {
    pub e1: f64,
    pub e2: f64,
}

impl EllipticalComponents {
    pub fn new(e1: f64, e2: f64) -> Self {
        Self { e1, e2 }
    }

    pub fn spherical() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Build from an axis ratio `q` in (0, 1] and position angle in radians
    pub fn from_axis_ratio_and_angle(axis_ratio: f64, angle: f64) -> Self {
        let f = (1.0 - axis_ratio) / (1.0 + axis_ratio);
        Self::new(f * (2.0 * angle).cos(), f * (2.0 * angle).sin())
    }

    pub fn axis_ratio(&self) -> f64 {
        let f = self.e1.hypot(self.e2);
        // axis ratios below 0.05 are unphysical and break the deflection
        // integrals, clamp like the original does
        ((1.0 - f) / (1.0 + f)).max(0.05)
    }

    pub fn angle(&self) -> f64 {
        0.5 * self.e2.atan2(self.e1)
    }

    pub fn is_spherical(&self) -> bool {
        self.e1 == 0.0 && self.e2 == 0.0
    }
}

/// Centre shift and major-axis rotation shared by every elliptical profile
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileGeometry {
    pub centre: (f64, f64),
    pub ell: EllipticalComponents,
}

impl ProfileGeometry {
    pub fn new(centre: (f64, f64), ell: EllipticalComponents) -> Self {
        Self { centre, ell }
    }

    pub fn spherical(centre: (f64, f64)) -> Self {
        Self::new(centre, EllipticalComponents::spherical())
    }

    /// Transform a `(y, x)` coordinate into the profile's major-axis frame,
    /// returning `(x1, x2)` with `x1` along the major axis
    pub fn transformed(&self, y: f64, x: f64) -> (f64, f64) {
        let dy = y - self.centre.0;
        let dx = x - self.centre.1;
        let phi = self.ell.angle();
        let (sin, cos) = phi.sin_cos();
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }

    /// Rotate a deflection from the major-axis frame back to `(y, x)`
    pub fn rotated_back(&self, a1: f64, a2: f64) -> (f64, f64) {
        let phi = self.ell.angle();
        let (sin, cos) = phi.sin_cos();
        (a1 * sin + a2 * cos, a1 * cos - a2 * sin)
    }

    /// Circular radius from the centre, floored at [GRID_RADIUS_MIN]
    pub fn radius(&self, y: f64, x: f64) -> f64 {
        let (x1, x2) = self.transformed(y, x);
        x1.hypot(x2).max(GRID_RADIUS_MIN)
    }

    /// Elliptical radius `sqrt(x1^2 + (x2 / q)^2)`, floored at [GRID_RADIUS_MIN]
    pub fn elliptical_radius(&self, y: f64, x: f64) -> f64 {
        let (x1, x2) = self.transformed(y, x);
        let q = self.ell.axis_ratio();
        (x1 * x1 + (x2 / q).powi(2)).sqrt().max(GRID_RADIUS_MIN)
    }
}
