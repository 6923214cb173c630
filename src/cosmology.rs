//! Background-cosmology terms needed to give dark-matter profiles physical units
//!
//! The terms are plain numbers evaluated at the relevant redshifts by the
//! caller; no distance integrals are performed here.

use crate::error::ProfileError;

use serde::{Deserialize, Serialize};

/// Scatter of the mass-concentration relation, in dex of concentration
pub const CONCENTRATION_SCATTER_DEX: f64 = 0.15;

/// Physical conversion factors between angular and mass units
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CosmologyTerms {
    /// kpc subtended by one arcsecond at the object redshift
    pub kpc_per_arcsec: f64,
    /// Critical surface density for lensing, in Msun / kpc^2
    pub critical_surface_density: f64,
    /// Mean matter density of the universe at the object redshift, Msun / kpc^3
    pub cosmic_average_density: f64,
}

impl CosmologyTerms {
    /// All conversion factors equal to one; angular and physical units coincide
    pub fn unity() -> Self {
        Self {
            kpc_per_arcsec: 1.0,
            critical_surface_density: 1.0,
            cosmic_average_density: 1.0,
        }
    }
}

#[inline]
fn nfw_mass_shape(c: f64) -> f64 {
    (1.0 + c).ln() - c / (1.0 + c)
}

/// Overdensity of an NFW halo of concentration `c` relative to the mean density
#[inline]
pub fn delta_concentration_of(c: f64) -> f64 {
    (200.0 / 3.0) * c.powi(3) / nfw_mass_shape(c)
}

/// Invert `delta_concentration_of` by bisection
///
/// The overdensity is strictly increasing in the concentration, so the root
/// is unique whenever it is bracketed.
pub fn concentration_from_delta(delta: f64) -> Result<f64, ProfileError> {
    let (mut lo, mut hi) = (1e-6, 1e6);
    if !(delta_concentration_of(lo) <= delta && delta <= delta_concentration_of(hi)) {
        return Err(ProfileError::ConcentrationNotBracketed(delta));
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if delta_concentration_of(mid) < delta {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo) < 1e-12 * hi {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// Duffy et al. (2008) mean mass-concentration relation, full halo sample
pub fn duffy_concentration(mass_at_200: f64, redshift: f64) -> f64 {
    5.71 * (mass_at_200 / 2e12).powf(-0.084) * (1.0 + redshift).powf(-0.47)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn delta_concentration_round_trip() {
        for &c in &[0.01, 0.5, 5.0, 50.0] {
            let delta = delta_concentration_of(c);
            assert_relative_eq!(concentration_from_delta(delta).unwrap(), c, max_relative = 1e-9);
        }
    }

    #[test]
    fn unit_overdensity_concentration() {
        // the reference value for delta_concentration = 1
        let c = concentration_from_delta(1.0).unwrap();
        assert_relative_eq!(c, 0.0074263, max_relative = 1e-4);
    }

    #[test]
    fn out_of_bracket_delta_is_an_error() {
        assert!(matches!(
            concentration_from_delta(1e-30),
            Err(ProfileError::ConcentrationNotBracketed(_))
        ));
    }

    #[test]
    fn duffy_relation_decreases_with_mass_and_redshift() {
        let base = duffy_concentration(1e12, 0.5);
        assert!(duffy_concentration(1e13, 0.5) < base);
        assert!(duffy_concentration(1e12, 1.0) < base);
        assert_relative_eq!(
            duffy_concentration(2e12, 0.0),
            5.71,
            max_relative = 1e-12
        );
    }
}
