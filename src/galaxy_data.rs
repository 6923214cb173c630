//! Fitting a derived galaxy quantity (image, convergence, potential or one
//! deflection component) as if it were data
//!
//! Used to initialize model galaxies against quantities computed from a
//! previous fit rather than against an observed image; no PSF blurring is
//! involved.

use crate::error::{ConfigurationError, FitError, ProfileError};
use crate::fit::{
    chi_squared_map_from, log_likelihood_from, noise_normalization_from,
    normalized_residual_map_from, residual_map_from,
};
use crate::galaxy::Galaxy;
use crate::grid::Grid2D;
use crate::settings::SettingsProfile;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GalaxyQuantity {
    Image,
    Convergence,
    Potential,
    DeflectionsY,
    DeflectionsX,
}

/// A quantity map treated as data, with the grid it was evaluated on
#[derive(Clone, Debug)]
pub struct GalaxyFitData {
    data: Array1<f64>,
    noise_map: Array1<f64>,
    grid: Grid2D,
    quantity: GalaxyQuantity,
}

impl GalaxyFitData {
    /// Exactly one quantity flag must be set
    pub fn new(
        data: Array1<f64>,
        noise_map: Array1<f64>,
        grid: Grid2D,
        use_image: bool,
        use_convergence: bool,
        use_potential: bool,
        use_deflections_y: bool,
        use_deflections_x: bool,
    ) -> Result<Self, ConfigurationError> {
        let flags = [
            (use_image, GalaxyQuantity::Image),
            (use_convergence, GalaxyQuantity::Convergence),
            (use_potential, GalaxyQuantity::Potential),
            (use_deflections_y, GalaxyQuantity::DeflectionsY),
            (use_deflections_x, GalaxyQuantity::DeflectionsX),
        ];
        let selected: Vec<GalaxyQuantity> = flags
            .into_iter()
            .filter_map(|(flag, quantity)| flag.then_some(quantity))
            .collect();
        let quantity = match selected.as_slice() {
            [] => return Err(ConfigurationError::NoQuantitySelected),
            [one] => *one,
            many => return Err(ConfigurationError::MultipleQuantitiesSelected(many.len())),
        };
        assert_eq!(data.len(), grid.pixels());
        assert_eq!(noise_map.len(), grid.pixels());
        Ok(Self {
            data,
            noise_map,
            grid,
            quantity,
        })
    }

    #[inline]
    pub fn data(&self) -> &Array1<f64> {
        &self.data
    }

    #[inline]
    pub fn noise_map(&self) -> &Array1<f64> {
        &self.noise_map
    }

    #[inline]
    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    #[inline]
    pub fn quantity(&self) -> GalaxyQuantity {
        self.quantity
    }

    /// The selected quantity summed over `galaxies` and binned to pixels
    pub fn profile_quantity_from(
        &self,
        galaxies: &[Galaxy],
        settings: &SettingsProfile,
    ) -> Result<Array1<f64>, ProfileError> {
        let sum_scalar = |values: Result<Vec<Array1<f64>>, ProfileError>| {
            values.map(|arrays| {
                let mut total = Array1::zeros(self.grid.len());
                for a in arrays {
                    total += &a;
                }
                self.grid.bin(&total)
            })
        };
        match self.quantity {
            GalaxyQuantity::Image => {
                sum_scalar(galaxies.iter().map(|g| g.image_from(&self.grid)).collect())
            }
            GalaxyQuantity::Convergence => sum_scalar(
                galaxies
                    .iter()
                    .map(|g| g.convergence_from(&self.grid))
                    .collect(),
            ),
            GalaxyQuantity::Potential => sum_scalar(
                galaxies
                    .iter()
                    .map(|g| g.potential_from(&self.grid, settings))
                    .collect(),
            ),
            GalaxyQuantity::DeflectionsY => {
                Ok(self.binned_deflections(galaxies, settings)?.column(0).to_owned())
            }
            GalaxyQuantity::DeflectionsX => {
                Ok(self.binned_deflections(galaxies, settings)?.column(1).to_owned())
            }
        }
    }

    fn binned_deflections(
        &self,
        galaxies: &[Galaxy],
        settings: &SettingsProfile,
    ) -> Result<Array2<f64>, ProfileError> {
        let mut total = Array2::zeros((self.grid.len(), 2));
        for galaxy in galaxies {
            total += &galaxy.deflections_from(&self.grid, settings)?;
        }
        Ok(self.grid.bin_2d(&total))
    }
}

/// Scored fit of galaxies against a quantity map
#[derive(Clone, Debug)]
pub struct FitGalaxy {
    model_data: Array1<f64>,
    residual_map: Array1<f64>,
    chi_squared_map: Array1<f64>,
    chi_squared: f64,
    noise_normalization: f64,
    log_likelihood: f64,
}

impl FitGalaxy {
    pub fn new(
        data: &GalaxyFitData,
        galaxies: &[Galaxy],
        settings: &SettingsProfile,
    ) -> Result<Self, FitError> {
        let model_data = data.profile_quantity_from(galaxies, settings)?;
        let residual_map = residual_map_from(data.data(), &model_data);
        let normalized = normalized_residual_map_from(&residual_map, data.noise_map());
        let chi_squared_map = chi_squared_map_from(&normalized);
        let chi_squared = chi_squared_map.sum();
        let noise_normalization = noise_normalization_from(data.noise_map());
        Ok(Self {
            model_data,
            residual_map,
            chi_squared_map,
            chi_squared,
            noise_normalization,
            log_likelihood: log_likelihood_from(chi_squared, noise_normalization),
        })
    }

    #[inline]
    pub fn model_data(&self) -> &Array1<f64> {
        &self.model_data
    }

    #[inline]
    pub fn residual_map(&self) -> &Array1<f64> {
        &self.residual_map
    }

    #[inline]
    pub fn chi_squared_map(&self) -> &Array1<f64> {
        &self.chi_squared_map
    }

    #[inline]
    pub fn chi_squared(&self) -> f64 {
        self.chi_squared
    }

    #[inline]
    pub fn noise_normalization(&self) -> f64 {
        self.noise_normalization
    }

    #[inline]
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Mask2D;
    use crate::profiles::{EllipticalComponents, IsothermalSph, Sersic};
    use approx::assert_relative_eq;

    fn unit_grid() -> Grid2D {
        Grid2D::from_mask(&Mask2D::all_unmasked((5, 5), 1.0), 2)
    }

    fn flat_data(grid: &Grid2D) -> (Array1<f64>, Array1<f64>) {
        (Array1::zeros(grid.pixels()), Array1::ones(grid.pixels()))
    }

    #[test]
    fn zero_selected_quantities_are_rejected() {
        let grid = unit_grid();
        let (data, noise) = flat_data(&grid);
        let err =
            GalaxyFitData::new(data, noise, grid, false, false, false, false, false).unwrap_err();
        assert_eq!(err, ConfigurationError::NoQuantitySelected);
    }

    #[test]
    fn multiple_selected_quantities_are_rejected() {
        let grid = unit_grid();
        let (data, noise) = flat_data(&grid);
        let err =
            GalaxyFitData::new(data, noise, grid, true, true, false, true, false).unwrap_err();
        assert_eq!(err, ConfigurationError::MultipleQuantitiesSelected(3));
    }

    #[test]
    fn image_quantity_matches_binned_galaxy_image() {
        let grid = unit_grid();
        let (data, noise) = flat_data(&grid);
        let fit_data = GalaxyFitData::new(
            data,
            noise,
            grid.clone(),
            true,
            false,
            false,
            false,
            false,
        )
        .unwrap();
        let galaxy = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.0, 0.0),
            EllipticalComponents::spherical(),
            1.0,
            1.0,
            2.0,
        ));
        let settings = SettingsProfile::default();
        let quantity = fit_data
            .profile_quantity_from(std::slice::from_ref(&galaxy), &settings)
            .unwrap();
        let expected = grid.bin(&galaxy.image_from(&grid).unwrap());
        for (a, b) in quantity.iter().zip(expected.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-12);
        }
    }

    #[test]
    fn deflection_components_select_the_right_column() {
        let grid = unit_grid();
        let (data, noise) = flat_data(&grid);
        let settings = SettingsProfile::default();
        let galaxy = Galaxy::new(0.5).with_mass_profile(IsothermalSph::new((0.0, 0.0), 1.0));
        let binned = grid.bin_2d(&galaxy.deflections_from(&grid, &settings).unwrap());

        let data_y = GalaxyFitData::new(
            data.clone(),
            noise.clone(),
            grid.clone(),
            false,
            false,
            false,
            true,
            false,
        )
        .unwrap();
        let y = data_y
            .profile_quantity_from(std::slice::from_ref(&galaxy), &settings)
            .unwrap();
        let data_x =
            GalaxyFitData::new(data, noise, grid, false, false, false, false, true).unwrap();
        let x = data_x
            .profile_quantity_from(std::slice::from_ref(&galaxy), &settings)
            .unwrap();
        for s in 0..y.len() {
            assert_relative_eq!(y[s], binned[(s, 0)], max_relative = 1e-12);
            assert_relative_eq!(x[s], binned[(s, 1)], max_relative = 1e-12);
        }
    }

    #[test]
    fn perfect_model_scores_zero_chi_squared() {
        let grid = unit_grid();
        let galaxy = Galaxy::new(0.5).with_light_profile(Sersic::new(
            (0.0, 0.0),
            EllipticalComponents::spherical(),
            2.0,
            0.8,
            1.0,
        ));
        let settings = SettingsProfile::default();
        let model = grid.bin(&galaxy.image_from(&grid).unwrap());
        let noise = Array1::ones(grid.pixels());
        let fit_data = GalaxyFitData::new(
            model,
            noise,
            grid.clone(),
            true,
            false,
            false,
            false,
            false,
        )
        .unwrap();
        let fit = FitGalaxy::new(&fit_data, std::slice::from_ref(&galaxy), &settings).unwrap();
        assert_relative_eq!(fit.chi_squared(), 0.0, epsilon = 1e-16);
        assert_relative_eq!(
            fit.log_likelihood(),
            -0.5 * fit.noise_normalization(),
            max_relative = 1e-12
        );
    }
}
