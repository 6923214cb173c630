//! A plane aggregates galaxies sharing a redshift

use crate::convolution::Convolver;
use crate::error::ProfileError;
use crate::galaxy::Galaxy;
use crate::grid::Grid2D;
use crate::settings::SettingsProfile;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Ordered collection of galaxies at one redshift
///
/// Light and mass profiles contribute additively to every summed quantity;
/// a galaxy's pixelization attachment does not enter the sums and instead
/// drives the inversion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub redshift: f64,
    pub galaxies: Vec<Galaxy>,
}

impl Plane {
    pub fn new(redshift: f64, galaxies: Vec<Galaxy>) -> Self {
        Self { redshift, galaxies }
    }

    pub fn has_pixelization(&self) -> bool {
        self.galaxies.iter().any(Galaxy::has_pixelization)
    }

    pub fn has_hyper_galaxy(&self) -> bool {
        self.galaxies.iter().any(|g| g.hyper_galaxy.is_some())
    }

    /// Galaxies carrying a pixelization, in plane order
    pub fn pixelization_galaxies(&self) -> Vec<&Galaxy> {
        self.galaxies.iter().filter(|g| g.has_pixelization()).collect()
    }

    /// Summed image of all profile-bearing galaxies
    pub fn image_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        let mut image = Array1::zeros(grid.len());
        for galaxy in &self.galaxies {
            image += &galaxy.image_from(grid)?;
        }
        Ok(image)
    }

    /// Per-galaxy images, in plane order
    pub fn image_of_galaxies_from(&self, grid: &Grid2D) -> Result<Vec<Array1<f64>>, ProfileError> {
        self.galaxies
            .iter()
            .map(|galaxy| galaxy.image_from(grid))
            .collect()
    }

    /// Per-galaxy images binned and blurred through the convolver, in
    /// plane order
    pub fn blurred_image_of_galaxies_from(
        &self,
        grid: &Grid2D,
        blurring_grid: &Grid2D,
        convolver: &Convolver,
    ) -> Result<Vec<Array1<f64>>, ProfileError> {
        self.galaxies
            .iter()
            .map(|galaxy| {
                let sub = galaxy.image_from(grid)?;
                let blurring = galaxy.image_from(blurring_grid)?;
                Ok(convolver.convolve(&grid.bin(&sub), &blurring))
            })
            .collect()
    }

    pub fn convergence_from(&self, grid: &Grid2D) -> Result<Array1<f64>, ProfileError> {
        let mut convergence = Array1::zeros(grid.len());
        for galaxy in &self.galaxies {
            convergence += &galaxy.convergence_from(grid)?;
        }
        Ok(convergence)
    }

    pub fn potential_from(
        &self,
        grid: &Grid2D,
        settings: &SettingsProfile,
    ) -> Result<Array1<f64>, ProfileError> {
        let mut potential = Array1::zeros(grid.len());
        for galaxy in &self.galaxies {
            potential += &galaxy.potential_from(grid, settings)?;
        }
        Ok(potential)
    }

    pub fn deflections_from(
        &self,
        grid: &Grid2D,
        settings: &SettingsProfile,
    ) -> Result<Array2<f64>, ProfileError> {
        let mut deflections = Array2::zeros((grid.len(), 2));
        for galaxy in &self.galaxies {
            deflections += &galaxy.deflections_from(grid, settings)?;
        }
        Ok(deflections)
    }

    /// Summed hyper-galaxy noise contributions across the plane
    pub fn hyper_noise_map_from(&self, noise_map: &Array1<f64>) -> Array1<f64> {
        let mut hyper_noise = Array1::zeros(noise_map.len());
        for galaxy in &self.galaxies {
            hyper_noise += &galaxy.hyper_noise_map_from(noise_map);
        }
        hyper_noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::Psf;
    use crate::galaxy::HyperGalaxy;
    use crate::grid::Mask2D;
    use crate::pixelization::Rectangular;
    use crate::profiles::{EllipticalComponents, IsothermalSph, Sersic};
    use crate::regularization::{Constant, Regularization};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    fn test_grid() -> Grid2D {
        Grid2D::from_mask(&Mask2D::all_unmasked((5, 5), 1.0), 1)
    }

    #[test]
    fn plane_image_is_the_sum_of_galaxy_images() {
        let grid = test_grid();
        let g0 = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.0, 0.0),
            EllipticalComponents::spherical(),
            1.0,
            1.0,
            2.0,
        ));
        let g1 = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.4, -0.2),
            EllipticalComponents::spherical(),
            2.0,
            0.5,
            1.0,
        ));
        let plane = Plane::new(0.5, vec![g0.clone(), g1.clone()]);
        let summed = plane.image_from(&grid).unwrap();
        let separate = plane.image_of_galaxies_from(&grid).unwrap();
        for s in 0..grid.len() {
            assert_relative_eq!(
                summed[s],
                separate[0][s] + separate[1][s],
                max_relative = 1e-12
            );
        }
    }

    #[test]
    fn blurred_galaxy_images_sum_to_the_blurred_plane_image() {
        let mask = Mask2D::circular((7, 7), 1.0, 2.5);
        let grid = Grid2D::from_mask(&mask, 1);
        let psf = Psf::new(array![[0.0, 0.2, 0.0], [0.2, 0.2, 0.2], [0.0, 0.2, 0.0]]).unwrap();
        let blurring_grid = Grid2D::blurring_grid_from(&mask, psf.shape());
        let convolver = Convolver::new(&mask, &psf);
        let g0 = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.0, 0.0),
            EllipticalComponents::spherical(),
            1.0,
            1.0,
            2.0,
        ));
        let g1 = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.4, -0.2),
            EllipticalComponents::spherical(),
            2.0,
            0.5,
            1.0,
        ));
        let plane = Plane::new(0.5, vec![g0, g1]);

        let per_galaxy = plane
            .blurred_image_of_galaxies_from(&grid, &blurring_grid, &convolver)
            .unwrap();
        let sub_image = plane.image_from(&grid).unwrap();
        let blurring_image = plane.image_from(&blurring_grid).unwrap();
        let summed = convolver.convolve(&grid.bin(&sub_image), &blurring_image);
        assert_eq!(per_galaxy.len(), 2);
        for s in 0..mask.pixels_in_mask() {
            assert_relative_eq!(
                per_galaxy[0][s] + per_galaxy[1][s],
                summed[s],
                max_relative = 1e-10
            );
        }
    }

    #[test]
    fn deflections_sum_over_mass_profiles() {
        let grid = test_grid();
        let settings = SettingsProfile::default();
        let sis = IsothermalSph::new((0.0, 0.0), 1.0);
        let one = Plane::new(
            0.5,
            vec![Galaxy::new(0.5).with_mass_profile(sis.clone())],
        );
        let two = Plane::new(
            0.5,
            vec![
                Galaxy::new(0.5).with_mass_profile(sis.clone()),
                Galaxy::new(0.5).with_mass_profile(sis),
            ],
        );
        let a = one.deflections_from(&grid, &settings).unwrap();
        let b = two.deflections_from(&grid, &settings).unwrap();
        for s in 0..grid.len() {
            assert_abs_diff_eq!(2.0 * a[(s, 0)], b[(s, 0)], epsilon = 1e-12);
            assert_abs_diff_eq!(2.0 * a[(s, 1)], b[(s, 1)], epsilon = 1e-12);
        }
    }

    #[test]
    fn pixelization_galaxies_are_detected() {
        let plain = Galaxy::new(0.5);
        let inversion = Galaxy::new(0.5).with_pixelization(
            Rectangular::new((3, 3)),
            Regularization::Constant(Constant::new(1.0)),
        );
        let plane = Plane::new(0.5, vec![plain, inversion]);
        assert!(plane.has_pixelization());
        assert_eq!(plane.pixelization_galaxies().len(), 1);
    }

    #[test]
    fn hyper_noise_sums_across_galaxies() {
        let image = array![1.0, 1.0];
        let hyper = HyperGalaxy::new(0.0, 1.0, 1.0);
        let galaxy =
            Galaxy::new(0.5).with_hyper_galaxy(hyper, image.clone(), image.clone());
        let plane = Plane::new(0.5, vec![galaxy.clone(), galaxy]);
        let noise = array![2.0, 3.0];
        let extra = plane.hyper_noise_map_from(&noise);
        assert_relative_eq!(extra[0], 4.0, max_relative = 1e-12);
        assert_relative_eq!(extra[1], 6.0, max_relative = 1e-12);
    }
}
