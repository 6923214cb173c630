//! Galaxies: redshift plus collections of profiles and optional attachments

use crate::error::ProfileError;
use crate::grid::Grid2D;
use crate::pixelization::Rectangular;
use crate::profiles::{LightProfile, LightProfileTrait, MassProfile, MassProfileTrait};
use crate::regularization::Regularization;
use crate::settings::SettingsProfile;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Noise-scaling recipe attached to a galaxy
///
/// The contribution map weights pixels where this galaxy dominates the
/// model; its noise contribution is `noise_factor * (noise * contribution)
/// ^ noise_power`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperGalaxy {
    pub contribution_factor: f64,
    pub noise_factor: f64,
    pub noise_power: f64,
    /// Contributions below this value after normalization are zeroed
    pub minimum_value: f64,
}

impl HyperGalaxy {
    pub fn new(contribution_factor: f64, noise_factor: f64, noise_power: f64) -> Self {
        Self {
            contribution_factor,
            noise_factor,
            noise_power,
            minimum_value: 0.0,
        }
    }

    /// Fraction of the model attributed to this galaxy, normalized to a
    /// unit maximum and floored at `minimum_value`
    pub fn contribution_map_from(
        &self,
        hyper_model_image: &Array1<f64>,
        hyper_galaxy_image: &Array1<f64>,
    ) -> Array1<f64> {
        // a vanishing denominator marks a pixel with no reference flux; it
        // contributes nothing instead of poisoning the map with NaN
        let mut contribution = Array1::from_iter(
            hyper_galaxy_image
                .iter()
                .zip(hyper_model_image.iter())
                .map(|(&g, &m)| {
                    let ratio = g / (m + self.contribution_factor);
                    if ratio.is_finite() { ratio } else { 0.0 }
                }),
        );
        let max = contribution.iter().cloned().fold(0.0_f64, f64::max);
        if max > 0.0 {
            contribution.mapv_inplace(|v| {
                let v = v / max;
                if v < self.minimum_value { 0.0 } else { v }
            });
        } else {
            contribution.fill(0.0);
        }
        contribution
    }

    pub fn hyper_noise_map_from(
        &self,
        noise_map: &Array1<f64>,
        contribution_map: &Array1<f64>,
    ) -> Array1<f64> {
        Array1::from_iter(
            noise_map
                .iter()
                .zip(contribution_map.iter())
                .map(|(&n, &c)| self.noise_factor * (n * c).powf(self.noise_power)),
        )
    }
}

/// Uniform additive rescaling of the image's sky background
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperImageSky {
    pub sky_scale: f64,
}

impl HyperImageSky {
    pub fn new(sky_scale: f64) -> Self {
        Self { sky_scale }
    }

    pub fn hyper_image_from(&self, image: &Array1<f64>) -> Array1<f64> {
        image + self.sky_scale
    }
}

/// Uniform additive rescaling of the background noise level
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperBackgroundNoise {
    pub noise_scale: f64,
}

impl HyperBackgroundNoise {
    pub fn new(noise_scale: f64) -> Self {
        Self { noise_scale }
    }

    pub fn hyper_noise_map_from(&self, noise_map: &Array1<f64>) -> Array1<f64> {
        noise_map + self.noise_scale
    }
}

/// A redshift plus light and mass profiles, with optional pixelization and
/// hyper-scaling attachments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub redshift: f64,
    pub light_profiles: Vec<LightProfile>,
    pub mass_profiles: Vec<MassProfile>,
    pub pixelization: Option<Rectangular>,
    pub regularization: Option<Regularization>,
    pub hyper_galaxy: Option<HyperGalaxy>,
    /// Reference model image driving the contribution map
    pub hyper_model_image: Option<Array1<f64>>,
    /// Reference image of this galaxy alone driving the contribution map
    pub hyper_galaxy_image: Option<Array1<f64>>,
}

impl Galaxy {
    pub fn new(redshift: f64) -> Self {
        Self {
            redshift,
            light_profiles: Vec::new(),
            mass_profiles: Vec::new(),
            pixelization: None,
            regularization: None,
            hyper_galaxy: None,
            hyper_model_image: None,
            hyper_galaxy_image: None,
        }
    }

    pub fn with_light_profile(mut self, profile: impl Into<LightProfile>) -> Self {
        self.light_profiles.push(profile.into());
        self
    }

    pub fn with_mass_profile(mut self, profile: impl Into<MassProfile>) -> Self {
        self.mass_profiles.push(profile.into());
        self
    }

    pub fn with_pixelization(
        mut self,
        pixelization: Rectangular,
        regularization: Regularization,
    ) -> Self {
        self.pixelization = Some(pixelization);
        self.regularization = Some(regularization);
        self
    }

    pub fn with_hyper_galaxy(
        mut self,
        hyper_galaxy: HyperGalaxy,
        hyper_model_image: Array1<f64>,
        hyper_galaxy_image: Array1<f64>,
    ) -> Self {
        self.hyper_galaxy = Some(hyper_galaxy);
        self.hyper_model_image = Some(hyper_model_image);
        self.hyper_galaxy_image = Some(hyper_galaxy_image);
        self
    }

    #[inline]
    pub fn has_light_profiles(&self) -> bool {
        !self.light_profiles.is_empty()
    }

    #[inline]
    pub fn has_mass_profiles(&self) -> bool {
        !self.mass_profiles.is_empty()
    }

    #[inline]
    pub fn has_pixelization(&self) -> bool {
        self.pixelization.is_some()
    }

    /// Summed surface brightness of this galaxy's light profiles
    pub fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        let mut image = Array1::zeros(grid.len());
        for profile in &self.light_profiles {
            image += &profile.image_from(grid)?;
        }
        Ok(image)
    }

    pub fn convergence_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        let mut convergence = Array1::zeros(grid.len());
        for profile in &self.mass_profiles {
            convergence += &profile.convergence_from(grid)?;
        }
        Ok(convergence)
    }

    pub fn potential_from(
        &self,
        grid: &Grid2D,
        settings: &SettingsProfile,
    ) -> Result<Array1<f64>, ProfileError> {
        let mut potential = Array1::zeros(grid.len());
        for profile in &self.mass_profiles {
            potential += &profile.potential_from(grid, settings)?;
        }
        Ok(potential)
    }

    pub fn deflections_from(
        &self,
        grid: &Grid2D,
        settings: &SettingsProfile,
    ) -> Result<Array2<f64>, ProfileError> {
        let mut deflections = Array2::zeros((grid.len(), 2));
        for profile in &self.mass_profiles {
            deflections += &profile.deflections_from(grid, settings)?;
        }
        Ok(deflections)
    }

    /// This galaxy's noise-scaling term, zero without a hyper attachment
    pub fn hyper_noise_map_from(&self, noise_map: &Array1<f64>) -> Array1<f64> {
        match (&self.hyper_galaxy, &self.hyper_model_image, &self.hyper_galaxy_image) {
            (Some(hyper), Some(model), Some(galaxy)) => {
                let contribution = hyper.contribution_map_from(model, galaxy);
                hyper.hyper_noise_map_from(noise_map, &contribution)
            }
            _ => Array1::zeros(noise_map.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Mask2D;
    use crate::profiles::{EllipticalComponents, Sersic};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    #[test]
    fn contribution_map_has_unit_maximum() {
        let hyper = HyperGalaxy::new(0.5, 1.0, 1.0);
        let model = array![1.0, 2.0, 3.0];
        let galaxy = array![0.5, 1.0, 1.5];
        let contribution = hyper.contribution_map_from(&model, &galaxy);
        let max = contribution.iter().cloned().fold(0.0, f64::max);
        assert_abs_diff_eq!(max, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn contribution_floor_zeroes_faint_pixels() {
        let mut hyper = HyperGalaxy::new(0.0, 1.0, 1.0);
        hyper.minimum_value = 0.8;
        let model = array![1.0, 1.0];
        let galaxy = array![1.0, 0.5];
        let contribution = hyper.contribution_map_from(&model, &galaxy);
        assert_abs_diff_eq!(contribution[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(contribution[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_reference_images_give_a_finite_zero_contribution() {
        // zero model image and zero contribution factor divide by zero
        let hyper = HyperGalaxy::new(0.0, 1.0, 1.0);
        let model = array![0.0, 0.0, 0.0];
        let galaxy_image = array![0.0, 1.0, 2.0];
        let contribution = hyper.contribution_map_from(&model, &galaxy_image);
        for v in contribution.iter() {
            assert!(v.is_finite());
            assert_abs_diff_eq!(*v, 0.0);
        }
        let noise = array![1.0, 2.0, 3.0];
        let scaled = hyper.hyper_noise_map_from(&noise, &contribution);
        for v in scaled.iter() {
            assert!(v.is_finite());
        }
    }

    #[test]
    fn unit_factors_double_the_noise_map() {
        // equal hyper images give a unit contribution map, so factor one and
        // power one add the noise map onto itself
        let hyper = HyperGalaxy::new(0.0, 1.0, 1.0);
        let image = array![2.0, 2.0, 2.0];
        let galaxy = Galaxy::new(0.5).with_hyper_galaxy(hyper, image.clone(), image.clone());
        let noise = array![2.0, 2.0, 2.0];
        let scaled = &noise + &galaxy.hyper_noise_map_from(&noise);
        for v in scaled.iter() {
            assert_relative_eq!(*v, 4.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn galaxy_without_hyper_attachment_adds_no_noise() {
        let galaxy = Galaxy::new(0.5);
        let noise = array![1.0, 2.0];
        let extra = galaxy.hyper_noise_map_from(&noise);
        assert_abs_diff_eq!(extra[0], 0.0);
        assert_abs_diff_eq!(extra[1], 0.0);
    }

    #[test]
    fn galaxy_image_sums_its_light_profiles() {
        let grid = Grid2D::from_mask(&Mask2D::all_unmasked((5, 5), 1.0), 1);
        let sersic = Sersic::new((0.0, 0.0), EllipticalComponents::spherical(), 1.0, 1.0, 2.0);
        let single = Galaxy::new(0.5).with_light_profile(sersic.clone());
        let double = Galaxy::new(0.5)
            .with_light_profile(sersic.clone())
            .with_light_profile(sersic);
        let a = single.image_from(&grid).unwrap();
        let b = double.image_from(&grid).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(2.0 * x, *y, max_relative = 1e-12);
        }
    }

    #[test]
    fn galaxy_serialization_round_trips() {
        let galaxy = Galaxy::new(0.5)
            .with_light_profile(Sersic::new(
                (0.1, -0.2),
                EllipticalComponents::new(0.1, 0.05),
                1.5,
                0.8,
                2.5,
            ))
            .with_hyper_galaxy(
                HyperGalaxy::new(0.5, 2.0, 1.5),
                array![1.0, 2.0],
                array![0.5, 1.0],
            );
        let json = serde_json::to_string(&galaxy).unwrap();
        let restored: Galaxy = serde_json::from_str(&json).unwrap();
        assert_eq!(galaxy, restored);
    }

    #[test]
    fn hyper_sky_and_background_noise_are_additive() {
        let image = array![1.0, 2.0];
        assert_abs_diff_eq!(
            HyperImageSky::new(0.5).hyper_image_from(&image)[0],
            1.5,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            HyperBackgroundNoise::new(0.25).hyper_noise_map_from(&image)[1],
            2.25,
            epsilon = 1e-12
        );
    }
}
