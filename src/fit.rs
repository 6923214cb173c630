//! Fit scorer: dataset plus plane to residuals, likelihood and evidence

use crate::dataset::Imaging;
use crate::error::FitError;
use crate::galaxy::{HyperBackgroundNoise, HyperImageSky};
use crate::inversion::{Inversion, WTilde};
use crate::plane::Plane;
use crate::settings::SettingsInversion;

use ndarray::{Array1, Array2};

/// Ceiling applied to hyper-scaled noise maps; runaway noise factors clamp
/// here instead of propagating infinities
pub const NOISE_CEILING: f64 = 1e8;

pub fn residual_map_from(image: &Array1<f64>, model_image: &Array1<f64>) -> Array1<f64> {
    image - model_image
}

pub fn normalized_residual_map_from(
    residual_map: &Array1<f64>,
    noise_map: &Array1<f64>,
) -> Array1<f64> {
    residual_map / noise_map
}

pub fn chi_squared_map_from(normalized_residual_map: &Array1<f64>) -> Array1<f64> {
    normalized_residual_map.mapv(|v| v * v)
}

pub fn noise_normalization_from(noise_map: &Array1<f64>) -> f64 {
    noise_map
        .iter()
        .map(|&n| (2.0 * std::f64::consts::PI * n * n).ln())
        .sum()
}

pub fn log_likelihood_from(chi_squared: f64, noise_normalization: f64) -> f64 {
    -0.5 * (chi_squared + noise_normalization)
}

/// A scored fit of a plane against an imaging dataset; immutable once built
#[derive(Clone, Debug)]
pub struct FitImaging {
    image: Array1<f64>,
    noise_map: Array1<f64>,
    model_image: Array1<f64>,
    residual_map: Array1<f64>,
    normalized_residual_map: Array1<f64>,
    chi_squared_map: Array1<f64>,
    chi_squared: f64,
    noise_normalization: f64,
    log_likelihood: f64,
    log_likelihood_with_regularization: Option<f64>,
    log_evidence: Option<f64>,
    model_images_of_galaxies: Vec<Array1<f64>>,
    inversion: Option<Inversion>,
}

impl FitImaging {
    /// Score `plane` against `dataset`
    ///
    /// Hyper scalings apply only when `use_hyper_scalings` is set; with it
    /// cleared the fit reproduces the un-scaled dataset exactly, whatever
    /// hyper attachments are present.
    pub fn new(
        dataset: &Imaging,
        plane: &Plane,
        hyper_image_sky: Option<&HyperImageSky>,
        hyper_background_noise: Option<&HyperBackgroundNoise>,
        use_hyper_scalings: bool,
        settings_inversion: &SettingsInversion,
    ) -> Result<Self, FitError> {
        let grid = dataset.grid();
        let convolver = dataset.convolver();

        let image = match (use_hyper_scalings, hyper_image_sky) {
            (true, Some(sky)) => sky.hyper_image_from(dataset.image()),
            _ => dataset.image().clone(),
        };

        let mut noise_map = dataset.noise_map().clone();
        if use_hyper_scalings {
            let hyper_noise = plane.hyper_noise_map_from(dataset.noise_map());
            noise_map += &hyper_noise;
            if let Some(background) = hyper_background_noise {
                noise_map = background.hyper_noise_map_from(&noise_map);
            }
            noise_map.mapv_inplace(|n| n.min(NOISE_CEILING));
        }

        // blurred image of every profile-bearing galaxy
        let sub_image = plane.image_from(grid)?;
        let blurring_image = plane.image_from(dataset.blurring_grid())?;
        let blurred_profile_image = convolver.convolve(&grid.bin(&sub_image), &blurring_image);

        let inversion = if plane.has_pixelization() {
            let pixelization_galaxies = plane.pixelization_galaxies();
            let mut mappers = Vec::with_capacity(pixelization_galaxies.len());
            let mut regularizations = Vec::with_capacity(pixelization_galaxies.len());
            for galaxy in &pixelization_galaxies {
                let pixelization = galaxy.pixelization.expect("checked by has_pixelization");
                mappers.push(pixelization.mapper_from(grid, settings_inversion.use_border));
                regularizations.push(
                    galaxy
                        .regularization
                        .expect("pixelization always paired with regularization"),
                );
            }
            let data = &image - &blurred_profile_image;
            // the dataset-level shortcut is only valid for the unscaled
            // noise map; hyper fits rebuild it from the scaled one
            let w_tilde_rebuilt = (settings_inversion.use_w_tilde
                && (use_hyper_scalings || dataset.w_tilde().is_none()))
                .then(|| WTilde::from(convolver, &noise_map));
            let w_tilde = if settings_inversion.use_w_tilde {
                w_tilde_rebuilt.as_ref().or_else(|| dataset.w_tilde())
            } else {
                None
            };
            Some(Inversion::solve(
                &mappers,
                &regularizations,
                &data,
                &noise_map,
                convolver,
                w_tilde,
                &image,
            )?)
        } else {
            None
        };

        let model_image = match &inversion {
            Some(inv) => &blurred_profile_image + inv.mapped_reconstructed_image(),
            None => blurred_profile_image,
        };

        let residual_map = residual_map_from(&image, &model_image);
        let normalized_residual_map = normalized_residual_map_from(&residual_map, &noise_map);
        let chi_squared_map = chi_squared_map_from(&normalized_residual_map);
        let chi_squared = chi_squared_map.sum();
        let noise_normalization = noise_normalization_from(&noise_map);
        let log_likelihood = log_likelihood_from(chi_squared, noise_normalization);

        let (log_likelihood_with_regularization, log_evidence) = match &inversion {
            Some(inv) => (
                Some(log_likelihood_from(
                    chi_squared + inv.regularization_term(),
                    noise_normalization,
                )),
                Some(log_likelihood_from(
                    chi_squared
                        + inv.regularization_term()
                        + inv.log_det_curvature_reg()
                        - inv.log_det_regularization(),
                    noise_normalization,
                )),
            ),
            None => (None, None),
        };

        let blurred_of_galaxies =
            plane.blurred_image_of_galaxies_from(grid, dataset.blurring_grid(), convolver)?;
        let model_images_of_galaxies = plane
            .galaxies
            .iter()
            .zip(blurred_of_galaxies)
            .map(|(galaxy, blurred)| {
                if galaxy.has_pixelization() {
                    let inv = inversion
                        .as_ref()
                        .expect("inversion present when a galaxy has a pixelization");
                    inv.mapped_reconstructed_image().clone()
                } else {
                    blurred
                }
            })
            .collect();

        Ok(Self {
            image,
            noise_map,
            model_image,
            residual_map,
            normalized_residual_map,
            chi_squared_map,
            chi_squared,
            noise_normalization,
            log_likelihood,
            log_likelihood_with_regularization,
            log_evidence,
            model_images_of_galaxies,
            inversion,
        })
    }

    /// Image after hyper sky scaling, the one the fit is scored against
    #[inline]
    pub fn image(&self) -> &Array1<f64> {
        &self.image
    }

    /// Noise map after hyper scaling and the ceiling clamp
    #[inline]
    pub fn noise_map(&self) -> &Array1<f64> {
        &self.noise_map
    }

    #[inline]
    pub fn model_image(&self) -> &Array1<f64> {
        &self.model_image
    }

    #[inline]
    pub fn residual_map(&self) -> &Array1<f64> {
        &self.residual_map
    }

    #[inline]
    pub fn normalized_residual_map(&self) -> &Array1<f64> {
        &self.normalized_residual_map
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

    #[inline]
    pub fn log_likelihood_with_regularization(&self) -> Option<f64> {
        self.log_likelihood_with_regularization
    }

    #[inline]
    pub fn log_evidence(&self) -> Option<f64> {
        self.log_evidence
    }

    /// Per-galaxy blurred model images, in plane order; a pixelization
    /// galaxy is attributed the inversion's mapped image
    #[inline]
    pub fn model_images_of_galaxies(&self) -> &[Array1<f64>] {
        &self.model_images_of_galaxies
    }

    #[inline]
    pub fn inversion(&self) -> Option<&Inversion> {
        self.inversion.as_ref()
    }

    /// `log_evidence` with an inversion present, `log_likelihood` otherwise
    pub fn figure_of_merit(&self) -> f64 {
        self.log_evidence.unwrap_or(self.log_likelihood)
    }
}

/// Single entry point for the external search driver
pub fn score(
    dataset: &Imaging,
    plane: &Plane,
    hyper_image_sky: Option<&HyperImageSky>,
    hyper_background_noise: Option<&HyperBackgroundNoise>,
    use_hyper_scalings: bool,
    settings_inversion: &SettingsInversion,
) -> Result<f64, FitError> {
    Ok(FitImaging::new(
        dataset,
        plane,
        hyper_image_sky,
        hyper_background_noise,
        use_hyper_scalings,
        settings_inversion,
    )?
    .figure_of_merit())
}

/// Full fit products for diagnostics and visualization
///
/// Same evaluation as [score], returning the fit object with its model
/// image, residual and chi-squared maps, per-galaxy model images and the
/// inversion when one was performed.
pub fn fit_products(
    dataset: &Imaging,
    plane: &Plane,
    hyper_image_sky: Option<&HyperImageSky>,
    hyper_background_noise: Option<&HyperBackgroundNoise>,
    use_hyper_scalings: bool,
    settings_inversion: &SettingsInversion,
) -> Result<FitImaging, FitError> {
    FitImaging::new(
        dataset,
        plane,
        hyper_image_sky,
        hyper_background_noise,
        use_hyper_scalings,
        settings_inversion,
    )
}

/// Blurred plane image free of mask truncation, for display and
/// consistency checks; never used for scoring
pub fn unmasked_blurred_image_from(
    dataset: &Imaging,
    plane: &Plane,
) -> Result<Array2<f64>, FitError> {
    let padded_grid = dataset.padded_grid();
    let sub_image = plane.image_from(&padded_grid)?;
    let native = padded_grid.native_from_binned(&padded_grid.bin(&sub_image));
    let convolved = dataset.psf().convolve_native(&native);
    Ok(dataset
        .psf()
        .trim_padded(&convolved, dataset.mask().shape()))
}
