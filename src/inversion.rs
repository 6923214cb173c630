//! Linear inversion of pixelized sources against a masked, blurred image
//!
//! Solves the regularized normal equations (F + R) s = A' N^-1 d, where A is
//! the PSF-blurred mapping matrix, N the diagonal noise covariance and R the
//! block-diagonal regularization matrix. The reconstruction is a plain
//! linear solve; negative source pixels are permitted.

use crate::convolution::Convolver;
use crate::error::{ConfigurationError, FitError, InversionError};
use crate::pixelization::Mapper;
use crate::regularization::Regularization;

use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, Array2};

/// Precomputed curvature shortcut for a fixed PSF and noise map
///
/// `operator` is the dense blur matrix B over mask pixels; `curvature` is
/// B' N^-1 B, so the mapping-matrix curvature becomes M' (B' N^-1 B) M
/// without re-blurring M per evaluation.
#[derive(Clone, Debug)]
pub struct WTilde {
    operator: DMatrix<f64>,
    curvature: DMatrix<f64>,
}

impl WTilde {
    pub fn from(convolver: &Convolver, noise_map: &Array1<f64>) -> Self {
        let n = noise_map.len();
        let blurred_identity = convolver.convolve_mapping_matrix(&Array2::eye(n));
        let operator = DMatrix::from_fn(n, n, |i, j| blurred_identity[(i, j)]);
        let weighted =
            DMatrix::from_fn(n, n, |i, j| operator[(i, j)] / noise_map[i].powi(2));
        let curvature = operator.transpose() * weighted;
        Self {
            operator,
            curvature,
        }
    }

    #[inline]
    pub fn curvature(&self) -> &DMatrix<f64> {
        &self.curvature
    }
}

/// A solved inversion; immutable once constructed
#[derive(Clone, Debug)]
pub struct Inversion {
    reconstruction: Array1<f64>,
    mapped_reconstructed_image: Array1<f64>,
    regularization_term: f64,
    log_det_curvature_reg: f64,
    log_det_regularization: f64,
}

impl Inversion {
    /// Build and solve the regularized system
    ///
    /// `data` is the profile-subtracted image, `signal_image` feeds adaptive
    /// regularization weights. With `w_tilde` the curvature comes from the
    /// precomputed shortcut; the result is identical either way.
    pub fn solve(
        mappers: &[Mapper],
        regularizations: &[Regularization],
        data: &Array1<f64>,
        noise_map: &Array1<f64>,
        convolver: &Convolver,
        w_tilde: Option<&WTilde>,
        signal_image: &Array1<f64>,
    ) -> Result<Self, FitError> {
        if mappers.len() != regularizations.len() || mappers.is_empty() {
            return Err(ConfigurationError::MapperRegularizationMismatch {
                mappers: mappers.len(),
                regularizations: regularizations.len(),
            }
            .into());
        }

        let n_data = data.len();
        let total_pixels: usize = mappers.iter().map(Mapper::pixels).sum();

        let mut stacked = Array2::zeros((n_data, total_pixels));
        let mut offset = 0;
        for mapper in mappers {
            stacked
                .slice_mut(ndarray::s![.., offset..offset + mapper.pixels()])
                .assign(mapper.mapping_matrix());
            offset += mapper.pixels();
        }
        let mapping = DMatrix::from_fn(n_data, total_pixels, |i, j| stacked[(i, j)]);

        // blurred mapping matrix A, needed for the mapped image regardless
        // of which curvature path is taken
        let blurred = match w_tilde {
            Some(wt) => &wt.operator * &mapping,
            None => {
                let a = convolver.convolve_mapping_matrix(&stacked);
                DMatrix::from_fn(n_data, total_pixels, |i, j| a[(i, j)])
            }
        };

        let noise_inv_sq = DVector::from_fn(n_data, |i, _| 1.0 / noise_map[i].powi(2));
        let curvature = match w_tilde {
            Some(wt) => mapping.transpose() * wt.curvature() * &mapping,
            None => {
                let mut weighted = blurred.clone();
                for (mut row, &w) in weighted.row_iter_mut().zip(noise_inv_sq.iter()) {
                    row *= w;
                }
                blurred.transpose() * weighted
            }
        };

        let weighted_data = DVector::from_fn(n_data, |i, _| data[i] * noise_inv_sq[i]);
        let data_vector = blurred.transpose() * weighted_data;

        let mut regularization = DMatrix::zeros(total_pixels, total_pixels);
        let mut offset = 0;
        for (mapper, descriptor) in mappers.iter().zip(regularizations) {
            let block = descriptor.matrix_for(mapper, signal_image);
            regularization
                .view_mut((offset, offset), (mapper.pixels(), mapper.pixels()))
                .copy_from(&block);
            offset += mapper.pixels();
        }

        let curvature_reg = &curvature + &regularization;
        let curvature_chol =
            Cholesky::new(curvature_reg).ok_or(InversionError::SingularCurvature)?;
        let solution = curvature_chol.solve(&data_vector);
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(InversionError::NonFiniteReconstruction.into());
        }

        let log_det_curvature_reg = log_det_from(&curvature_chol, "curvature_reg")?;
        let regularization_chol = Cholesky::new(regularization.clone())
            .ok_or(InversionError::SingularRegularization)?;
        let log_det_regularization = log_det_from(&regularization_chol, "regularization")?;

        let regularization_term = (&regularization * &solution).dot(&solution);
        let mapped = &blurred * &solution;

        Ok(Self {
            reconstruction: Array1::from_iter(solution.iter().cloned()),
            mapped_reconstructed_image: Array1::from_iter(mapped.iter().cloned()),
            regularization_term,
            log_det_curvature_reg,
            log_det_regularization,
        })
    }

    /// Reconstructed source vector, stacked over mappers
    #[inline]
    pub fn reconstruction(&self) -> &Array1<f64> {
        &self.reconstruction
    }

    /// The reconstruction mapped and blurred back into the data frame
    #[inline]
    pub fn mapped_reconstructed_image(&self) -> &Array1<f64> {
        &self.mapped_reconstructed_image
    }

    /// `s' R s`
    #[inline]
    pub fn regularization_term(&self) -> f64 {
        self.regularization_term
    }

    /// `ln |F + R|`
    #[inline]
    pub fn log_det_curvature_reg(&self) -> f64 {
        self.log_det_curvature_reg
    }

    /// `ln |R|`
    #[inline]
    pub fn log_det_regularization(&self) -> f64 {
        self.log_det_regularization
    }
}

fn log_det_from(
    cholesky: &Cholesky<f64, nalgebra::Dyn>,
    which: &'static str,
) -> Result<f64, InversionError> {
    let log_det: f64 = 2.0 * cholesky.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    if log_det.is_finite() {
        Ok(log_det)
    } else {
        Err(InversionError::NonFiniteLogDet(which))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolution::Psf;
    use crate::grid::{Grid2D, Mask2D};
    use crate::pixelization::Rectangular;
    use crate::regularization::Constant;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::prelude::*;

    fn fixture() -> (Mask2D, Convolver, Mapper, Array1<f64>, Array1<f64>) {
        let mask = Mask2D::circular((7, 7), 1.0, 2.5);
        let psf = Psf::new(array![[0.0, 0.1, 0.0], [0.1, 0.6, 0.1], [0.0, 0.1, 0.0]])
            .unwrap()
            .normalized();
        let convolver = Convolver::new(&mask, &psf);
        let grid = Grid2D::from_mask(&mask, 1);
        let mapper = Rectangular::new((3, 3)).mapper_from(&grid, false);

        let mut rng = StdRng::seed_from_u64(7);
        let data = Array1::from_iter((0..mask.pixels_in_mask()).map(|_| rng.random::<f64>()));
        let noise = Array1::from_iter(
            (0..mask.pixels_in_mask()).map(|_| 0.5 + rng.random::<f64>()),
        );
        (mask, convolver, mapper, data, noise)
    }

    #[test]
    fn w_tilde_curvature_matches_blurred_mapping_curvature() {
        let (_, convolver, mapper, data, noise) = fixture();
        let regs = [Regularization::Constant(Constant::new(1.0))];
        let signal = data.clone();

        let direct = Inversion::solve(
            std::slice::from_ref(&mapper),
            &regs,
            &data,
            &noise,
            &convolver,
            None,
            &signal,
        )
        .unwrap();
        let w_tilde = WTilde::from(&convolver, &noise);
        let shortcut = Inversion::solve(
            std::slice::from_ref(&mapper),
            &regs,
            &data,
            &noise,
            &convolver,
            Some(&w_tilde),
            &signal,
        )
        .unwrap();

        for (a, b) in direct
            .reconstruction()
            .iter()
            .zip(shortcut.reconstruction().iter())
        {
            assert_relative_eq!(a, b, max_relative = 1e-8, epsilon = 1e-10);
        }
        assert_relative_eq!(
            direct.log_det_curvature_reg(),
            shortcut.log_det_curvature_reg(),
            max_relative = 1e-8
        );
        assert_relative_eq!(
            direct.regularization_term(),
            shortcut.regularization_term(),
            max_relative = 1e-8
        );
    }

    #[test]
    fn uniform_data_reconstructs_a_uniform_source() {
        // an identity PSF and uniform data make every source pixel equal
        let mask = Mask2D::all_unmasked((5, 5), 1.0);
        let psf = Psf::identity((3, 3)).unwrap();
        let convolver = Convolver::new(&mask, &psf);
        let grid = Grid2D::from_mask(&mask, 1);
        let mapper = Rectangular::new((5, 5)).mapper_from(&grid, false);
        let data = Array1::from_elem(25, 3.0);
        let noise = Array1::ones(25);
        let regs = [Regularization::Constant(Constant::new(0.1))];
        let inversion = Inversion::solve(
            std::slice::from_ref(&mapper),
            &regs,
            &data,
            &noise,
            &convolver,
            None,
            &data,
        )
        .unwrap();
        for v in inversion.reconstruction().iter() {
            assert_relative_eq!(*v, 3.0, max_relative = 1e-6);
        }
        for v in inversion.mapped_reconstructed_image().iter() {
            assert_relative_eq!(*v, 3.0, max_relative = 1e-6);
        }
    }

    #[test]
    fn normal_equations_hold_for_an_identity_mapping() {
        // 3x3 unmasked grid with an identity PSF and unit noise: the blurred
        // mapping matrix is the identity, so (I + R) s = d entry by entry
        let mask = Mask2D::all_unmasked((3, 3), 1.0);
        let psf = Psf::identity((3, 3)).unwrap();
        let convolver = Convolver::new(&mask, &psf);
        let grid = Grid2D::from_mask(&mask, 1);
        let mapper = Rectangular::new((3, 3)).mapper_from(&grid, false);
        let data = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let noise = Array1::ones(9);
        let reg = Constant::new(0.5);
        let inversion = Inversion::solve(
            std::slice::from_ref(&mapper),
            &[Regularization::Constant(reg)],
            &data,
            &noise,
            &convolver,
            None,
            &data,
        )
        .unwrap();

        let matrix = reg.matrix_from(mapper.neighbors());
        let s = DVector::from_iterator(9, inversion.reconstruction().iter().cloned());
        let lhs = &s + &matrix * &s;
        for (p, v) in lhs.iter().enumerate() {
            assert_relative_eq!(*v, data[p], max_relative = 1e-10);
        }
    }

    #[test]
    fn regularization_term_is_quadratic_form() {
        let (_, convolver, mapper, data, noise) = fixture();
        let reg = Constant::new(2.0);
        let regs = [Regularization::Constant(reg)];
        let inversion = Inversion::solve(
            std::slice::from_ref(&mapper),
            &regs,
            &data,
            &noise,
            &convolver,
            None,
            &data,
        )
        .unwrap();
        let matrix = reg.matrix_from(mapper.neighbors());
        let s = DVector::from_iterator(
            inversion.reconstruction().len(),
            inversion.reconstruction().iter().cloned(),
        );
        assert_relative_eq!(
            inversion.regularization_term(),
            (&matrix * &s).dot(&s),
            max_relative = 1e-10
        );
    }

    #[test]
    fn mapper_regularization_count_mismatch_is_rejected() {
        let (_, convolver, mapper, data, noise) = fixture();
        let err = Inversion::solve(
            std::slice::from_ref(&mapper),
            &[],
            &data,
            &noise,
            &convolver,
            None,
            &data,
        )
        .unwrap_err();
        assert_eq!(
            err,
            FitError::Configuration(ConfigurationError::MapperRegularizationMismatch {
                mappers: 1,
                regularizations: 0,
            })
        );
    }

    #[test]
    fn non_finite_data_fails_the_solve() {
        let (_, convolver, mapper, mut data, noise) = fixture();
        data[0] = f64::NAN;
        let regs = [Regularization::Constant(Constant::new(1.0))];
        let err = Inversion::solve(
            std::slice::from_ref(&mapper),
            &regs,
            &data,
            &noise,
            &convolver,
            None,
            &data,
        )
        .unwrap_err();
        assert!(matches!(err, FitError::Inversion(_)));
    }
}
