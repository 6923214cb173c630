#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

pub mod convolution;
pub mod cosmology;
pub mod dataset;

mod error;
pub use error::{ConfigurationError, FitError, InversionError, ProfileError};

pub mod fit;
pub use fit::{FitImaging, NOISE_CEILING, fit_products, score};

pub mod galaxy;
pub use galaxy::{Galaxy, HyperBackgroundNoise, HyperGalaxy, HyperImageSky};

pub mod galaxy_data;
pub mod grid;
pub mod inversion;
pub mod pixelization;

pub mod plane;
pub use plane::Plane;

pub mod prelude;
pub mod profiles;
pub mod quadrature;
pub mod regularization;

pub mod settings;
pub use settings::{DeflectionStrategy, SettingsInversion, SettingsProfile};

pub use ndarray;
