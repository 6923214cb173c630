//! Convenient non-conflicting imports for typical usage

pub use crate::convolution::{Convolver, Psf};
pub use crate::cosmology::CosmologyTerms;
pub use crate::dataset::Imaging;
pub use crate::error::{ConfigurationError, FitError, InversionError, ProfileError};
pub use crate::fit::{FitImaging, fit_products, score, unmasked_blurred_image_from};
pub use crate::galaxy::{Galaxy, HyperBackgroundNoise, HyperGalaxy, HyperImageSky};
pub use crate::galaxy_data::{FitGalaxy, GalaxyFitData, GalaxyQuantity};
pub use crate::grid::{Grid2D, Mask2D};
pub use crate::inversion::{Inversion, WTilde};
pub use crate::pixelization::{Mapper, Rectangular};
pub use crate::plane::Plane;
pub use crate::profiles::{
    EllipticalComponents, Exponential, GaussianLight, Isothermal, IsothermalSph, LightProfile,
    LightProfileTrait, MassProfile, MassProfileTrait, Nfw, NfwMcr, NfwSph, ProfileGeometry,
    Sersic,
};
pub use crate::regularization::{AdaptiveBrightness, Constant, Regularization};
pub use crate::settings::{DeflectionStrategy, SettingsInversion, SettingsProfile};
