//! Decomposition of radial convergence profiles into analytic bases
//!
//! A dimensionless radial profile is fitted by linear least squares with
//! log-spaced component scales, either as circular Gaussians (MGE) or as
//! cored steep ellipsoids (CSE). Each basis admits closed-form deflections,
//! so a decomposition turns an expensive radial profile into a fast sum.

use crate::error::ProfileError;

use nalgebra::{DMatrix, DVector};

/// One basis component: `amplitude * basis(r, scale)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RadialTerm {
    pub amplitude: f64,
    pub scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadialBasis {
    /// `exp(-r^2 / (2 s^2))`
    Gaussian,
    /// `1 / (2 (s^2 + r^2)^(3/2))`
    CoredSteep,
}

impl RadialBasis {
    #[inline]
    pub fn value(&self, r: f64, s: f64) -> f64 {
        match self {
            Self::Gaussian => f64::exp(-0.5 * (r / s).powi(2)),
            Self::CoredSteep => 0.5 / (s * s + r * r).powf(1.5),
        }
    }

    /// Magnitude of the circular deflection of one unit-amplitude component
    #[inline]
    pub fn circular_deflection(&self, r: f64, s: f64) -> f64 {
        match self {
            // alpha = (2 / r) int_0^r kappa(r') r' dr'
            Self::Gaussian => 2.0 * s * s / r * (1.0 - f64::exp(-0.5 * (r / s).powi(2))),
            Self::CoredSteep => (1.0 / s - 1.0 / (s * s + r * r).sqrt()) / r,
        }
    }

    /// Circular potential of one unit-amplitude component, up to a constant
    /// zero-point; only potential differences are comparable across bases
    #[inline]
    pub fn circular_potential(&self, r: f64, s: f64) -> f64 {
        match self {
            Self::Gaussian => {
                // int alpha dr = 2 s^2 (ln r + E1(r^2 / 2 s^2) / 2)
                2.0 * s * s * (r.ln() + 0.5 * exp_integral_e1(0.5 * (r / s).powi(2)))
            }
            Self::CoredSteep => (s + (s * s + r * r).sqrt()).ln() / s,
        }
    }
}

/// Exponential integral E1 via series (small x) and continued fraction (large x)
fn exp_integral_e1(x: f64) -> f64 {
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    if x <= 0.0 {
        return f64::INFINITY;
    }
    if x <= 1.0 {
        let mut sum = 0.0;
        let mut term = 1.0;
        for k in 1..=40 {
            term *= -x / k as f64;
            sum += term / k as f64;
        }
        -EULER_GAMMA - x.ln() - sum
    } else {
        // Lentz continued fraction for E1
        let mut b = x + 1.0;
        let mut c = 1e308;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=80 {
            let a = -(i as f64) * (i as f64);
            b += 2.0;
            d = 1.0 / (a * d + b);
            c = b + a / c;
            let del = c * d;
            h *= del;
            if (del - 1.0).abs() < 1e-15 {
                break;
            }
        }
        h * f64::exp(-x)
    }
}

const SAMPLE_RADIUS_MIN: f64 = 1e-3;
const SAMPLE_RADIUS_MAX: f64 = 1e3;
const SAMPLES_PER_TERM: usize = 3;

/// Fit `n_terms` components to a dimensionless radial profile
///
/// Sample radii and component scales are log-spaced over
/// `[1e-3, 1e3]`; rows are weighted by the inverse profile value so the fit
/// minimizes relative error. The least-squares solve uses SVD with a rank
/// cutoff, which tolerates the strong overlap between neighbouring scales.
pub fn decompose_radial(
    radial: impl Fn(f64) -> f64,
    basis: RadialBasis,
    n_terms: usize,
) -> Result<Vec<RadialTerm>, ProfileError> {
    let n_samples = SAMPLES_PER_TERM * n_terms;
    let log_span = f64::log10(SAMPLE_RADIUS_MAX / SAMPLE_RADIUS_MIN);
    let radius_at = |i: usize, n: usize| {
        SAMPLE_RADIUS_MIN * 10f64.powf(log_span * i as f64 / (n - 1) as f64)
    };

    let scales: Vec<f64> = (0..n_terms).map(|j| radius_at(j, n_terms)).collect();
    let mut design = DMatrix::zeros(n_samples, n_terms);
    let rhs = DVector::from_element(n_samples, 1.0);
    for i in 0..n_samples {
        let r = radius_at(i, n_samples);
        let target = radial(r);
        if !target.is_finite() || target <= 0.0 {
            return Err(ProfileError::DecompositionFailed(
                "radial profile is not positive and finite over the sample range",
            ));
        }
        for (j, &s) in scales.iter().enumerate() {
            design[(i, j)] = basis.value(r, s) / target;
        }
    }

    let svd = design.svd(true, true);
    let amplitudes = svd
        .solve(&rhs, 1e-10)
        .map_err(|_| ProfileError::DecompositionFailed("SVD least-squares solve failed"))?;
    if amplitudes.iter().any(|a| !a.is_finite()) {
        return Err(ProfileError::DecompositionFailed(
            "least-squares amplitudes are non-finite",
        ));
    }

    Ok(scales
        .iter()
        .zip(amplitudes.iter())
        .map(|(&scale, &amplitude)| RadialTerm { amplitude, scale })
        .collect())
}

/// Evaluate the decomposed profile at radius `r`
pub fn radial_from_terms(terms: &[RadialTerm], basis: RadialBasis, r: f64) -> f64 {
    terms
        .iter()
        .map(|t| t.amplitude * basis.value(r, t.scale))
        .sum()
}

/// Circular deflection magnitude of the decomposed profile at radius `r`
pub fn circular_deflection_from_terms(terms: &[RadialTerm], basis: RadialBasis, r: f64) -> f64 {
    terms
        .iter()
        .map(|t| t.amplitude * basis.circular_deflection(r, t.scale))
        .sum()
}

/// Circular potential of the decomposed profile, arbitrary zero-point
pub fn circular_potential_from_terms(terms: &[RadialTerm], basis: RadialBasis, r: f64) -> f64 {
    terms
        .iter()
        .map(|t| t.amplitude * basis.circular_potential(r, t.scale))
        .sum()
}
