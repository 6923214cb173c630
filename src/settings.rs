use serde::{Deserialize, Serialize};

/// How mass profiles without fully closed-form deflections evaluate them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeflectionStrategy {
    /// Direct numerical integration, slow but strategy-independent
    Integral,
    /// Multi-Gaussian expansion of the radial convergence
    Mge,
    /// Cored-steep-ellipsoid expansion of the radial convergence
    #[default]
    Cse,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingsProfile {
    pub deflection_strategy: DeflectionStrategy,
    /// Absolute tolerance of the adaptive quadrature
    pub integral_tolerance: f64,
    /// Number of components used by the decomposition strategies
    pub decomposition_terms: usize,
}

impl Default for SettingsProfile {
    fn default() -> Self {
        Self {
            deflection_strategy: DeflectionStrategy::default(),
            integral_tolerance: 1e-8,
            decomposition_terms: 30,
        }
    }
}

impl SettingsProfile {
    pub fn with_strategy(strategy: DeflectionStrategy) -> Self {
        Self {
            deflection_strategy: strategy,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsInversion {
    /// Build the curvature matrix from precomputed w-tilde terms instead of
    /// blurring the mapping matrix column by column
    pub use_w_tilde: bool,
    /// Relocate traced coordinates that leave the source-pixel border
    pub use_border: bool,
}

impl Default for SettingsInversion {
    fn default() -> Self {
        Self {
            use_w_tilde: false,
            use_border: true,
        }
    }
}
