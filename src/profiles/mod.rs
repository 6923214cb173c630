//! Light and mass profiles evaluated on masked grids

pub mod decomposition;
pub mod geometry;
pub mod light;
pub mod mass;

pub use geometry::{EllipticalComponents, GRID_RADIUS_MIN, ProfileGeometry};
pub use light::{Exponential, GaussianLight, LightProfile, LightProfileTrait, Sersic};
pub use mass::{
    Isothermal, IsothermalSph, MassProfile, MassProfileTrait, Nfw, NfwMcr, NfwSph,
};
