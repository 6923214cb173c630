//! Masked imaging dataset and its derived structures

use crate::convolution::{Convolver, Psf};
use crate::grid::{Grid2D, Mask2D};
use crate::inversion::WTilde;

use ndarray::{Array1, Array2};

/// An image, its noise map and PSF, with the grids and convolver derived
/// from the mask
///
/// Everything here is fixed across model evaluations; per-evaluation state
/// lives in the fit.
#[derive(Clone, Debug)]
pub struct Imaging {
    image: Array1<f64>,
    noise_map: Array1<f64>,
    psf: Psf,
    grid: Grid2D,
    blurring_grid: Grid2D,
    convolver: Convolver,
    w_tilde: Option<WTilde>,
}

impl Imaging {
    pub fn new(
        image_native: &Array2<f64>,
        noise_map_native: &Array2<f64>,
        psf: Psf,
        mask: Mask2D,
        sub_size: usize,
    ) -> Self {
        assert_eq!(image_native.dim(), mask.shape());
        assert_eq!(noise_map_native.dim(), mask.shape());
        let native = mask.native_index_for_slim();
        let image = Array1::from_iter(native.iter().map(|&(i, j)| image_native[(i, j)]));
        let noise_map = Array1::from_iter(native.iter().map(|&(i, j)| noise_map_native[(i, j)]));
        let grid = Grid2D::from_mask(&mask, sub_size);
        let blurring_grid = Grid2D::blurring_grid_from(&mask, psf.shape());
        let convolver = Convolver::new(&mask, &psf);
        Self {
            image,
            noise_map,
            psf,
            grid,
            blurring_grid,
            convolver,
            w_tilde: None,
        }
    }

    /// Precompute the w-tilde curvature shortcut for this dataset's noise map
    ///
    /// The shortcut depends only on the convolver and the unscaled noise map,
    /// so it stays valid across model evaluations. Fits rebuild it themselves
    /// when hyper scalings alter the noise map.
    pub fn with_w_tilde(mut self) -> Self {
        self.w_tilde = Some(WTilde::from(&self.convolver, &self.noise_map));
        self
    }

    #[inline]
    pub fn image(&self) -> &Array1<f64> {
        &self.image
    }

    #[inline]
    pub fn noise_map(&self) -> &Array1<f64> {
        &self.noise_map
    }

    #[inline]
    pub fn psf(&self) -> &Psf {
        &self.psf
    }

    #[inline]
    pub fn mask(&self) -> &Mask2D {
        self.grid.mask()
    }

    #[inline]
    pub fn grid(&self) -> &Grid2D {
        &self.grid
    }

    #[inline]
    pub fn blurring_grid(&self) -> &Grid2D {
        &self.blurring_grid
    }

    #[inline]
    pub fn convolver(&self) -> &Convolver {
        &self.convolver
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.image.len()
    }

    /// Padded grid for convolving models free of mask truncation
    pub fn padded_grid(&self) -> Grid2D {
        Grid2D::padded_grid_from(self.grid.mask(), self.psf.shape())
    }

    #[inline]
    pub fn w_tilde(&self) -> Option<&WTilde> {
        self.w_tilde.as_ref()
    }
}
