use crate::error::ProfileError;
use crate::grid::Grid2D;
use crate::profiles::geometry::{EllipticalComponents, ProfileGeometry};

use enum_dispatch::enum_dispatch;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Capability of emitting a surface-brightness image on a grid
#[enum_dispatch]
pub trait LightProfileTrait {
    /// Intensity at every slim coordinate of the grid
    fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError>;
}

/// All light profile families as variants of this enum
#[enum_dispatch(LightProfileTrait)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LightProfile {
    Sersic,
    Exponential,
    GaussianLight,
}

fn checked_image(
    profile: &'static str,
    grid: &Grid2D,
    intensity_at: impl Fn(f64, f64) -> f64,
) -> Result<Array1<f64>, ProfileError> {
    let mut image = Array1::zeros(grid.len());
    for (s, coord) in grid.slim().rows().into_iter().enumerate() {
        let (y, x) = (coord[0], coord[1]);
        let value = intensity_at(y, x);
        if !value.is_finite() {
            return Err(ProfileError::NonFiniteValue {
                profile,
                quantity: "image",
                y,
                x,
            });
        }
        image[s] = value;
    }
    Ok(image)
}

/// Sersic profile `I(r) = I_e exp(-b_n ((r / R_e)^(1/n) - 1))`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sersic {
    pub geometry: ProfileGeometry,
    pub intensity: f64,
    pub effective_radius: f64,
    pub sersic_index: f64,
}

impl Sersic {
    pub fn new(
        centre: (f64, f64),
        ell: EllipticalComponents,
        intensity: f64,
        effective_radius: f64,
        sersic_index: f64,
    ) -> Self {
        Self {
            geometry: ProfileGeometry::new(centre, ell),
            intensity,
            effective_radius,
            sersic_index,
        }
    }

    /// Ciotti & Bertin (1999) series for the Sersic normalization constant
    pub fn sersic_constant(&self) -> f64 {
        let n = self.sersic_index;
        2.0 * n - 1.0 / 3.0 + 4.0 / (405.0 * n) + 46.0 / (25515.0 * n * n)
            + 131.0 / (1148175.0 * n.powi(3))
            - 2194697.0 / (30690717750.0 * n.powi(4))
    }

    fn intensity_at_radius(&self, r: f64) -> f64 {
        let b = self.sersic_constant();
        self.intensity
            * f64::exp(-b * ((r / self.effective_radius).powf(1.0 / self.sersic_index) - 1.0))
    }
}

impl LightProfileTrait for Sersic {
    fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        checked_image("Sersic", grid, |y, x| {
            self.intensity_at_radius(self.geometry.elliptical_radius(y, x))
        })
    }
}

/// Exponential disk, a Sersic profile with index fixed to 1
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Exponential {
    pub geometry: ProfileGeometry,
    pub intensity: f64,
    pub effective_radius: f64,
}

impl Exponential {
    pub fn new(
        centre: (f64, f64),
        ell: EllipticalComponents,
        intensity: f64,
        effective_radius: f64,
    ) -> Self {
        Self {
            geometry: ProfileGeometry::new(centre, ell),
            intensity,
            effective_radius,
        }
    }

    fn as_sersic(&self) -> Sersic {
        Sersic {
            geometry: self.geometry,
            intensity: self.intensity,
            effective_radius: self.effective_radius,
            sersic_index: 1.0,
        }
    }
}

impl LightProfileTrait for Exponential {
    fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        self.as_sersic().image_from(grid)
    }
}

/// Elliptical Gaussian `I(r) = I_0 exp(-r^2 / (2 sigma^2))`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianLight {
    pub geometry: ProfileGeometry,
    pub intensity: f64,
    pub sigma: f64,
}

impl GaussianLight {
    pub fn new(centre: (f64, f64), ell: EllipticalComponents, intensity: f64, sigma: f64) -> Self {
        Self {
            geometry: ProfileGeometry::new(centre, ell),
            intensity,
            sigma,
        }
    }
}

impl LightProfileTrait for GaussianLight {
    fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        checked_image("GaussianLight", grid, |y, x| {
            let r = self.geometry.elliptical_radius(y, x);
            self.intensity * f64::exp(-0.5 * (r / self.sigma).powi(2))
        })
    }
}
