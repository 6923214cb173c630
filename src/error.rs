/// Error returned when a profile cannot produce a finite value
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProfileError {
    #[error("{profile} produced a non-finite {quantity} at (y, x) = ({y}, {x})")]
    NonFiniteValue {
        profile: &'static str,
        quantity: &'static str,
        y: f64,
        x: f64,
    },

    #[error("concentration solve did not bracket a root for delta_concentration = {0}")]
    ConcentrationNotBracketed(f64),

    #[error("radial decomposition least-squares failed: {0}")]
    DecompositionFailed(&'static str),
}

/// Error returned when the regularized linear system cannot be solved
///
/// This is the one legitimate rejection path of a model evaluation; the
/// external search driver is expected to translate it into a very low
/// likelihood rather than crash.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InversionError {
    #[error("regularized curvature matrix is singular, Cholesky factorization failed")]
    SingularCurvature,

    #[error("regularization matrix is singular, Cholesky factorization failed")]
    SingularRegularization,

    #[error("inversion reconstruction contains non-finite values")]
    NonFiniteReconstruction,

    #[error("log-determinant of the {0} matrix is non-finite")]
    NonFiniteLogDet(&'static str),
}

/// Programmer error raised at construction time for contradictory inputs
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("galaxy fit data was constructed with no quantity selected to fit")]
    NoQuantitySelected,

    #[error("galaxy fit data must select exactly one quantity, {0} were selected")]
    MultipleQuantitiesSelected(usize),

    #[error("{mappers} mapper(s) supplied with {regularizations} regularization(s)")]
    MapperRegularizationMismatch {
        mappers: usize,
        regularizations: usize,
    },

    #[error("PSF kernel dimensions must be odd, got ({0}, {1})")]
    EvenPsfKernel(usize, usize),
}

/// Any fault the fitting core can raise
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Inversion(#[from] InversionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
