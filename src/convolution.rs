use crate::error::ConfigurationError;
use crate::grid::Mask2D;

use ndarray::{Array1, Array2};

/// Point-spread-function kernel with odd dimensions
#[derive(Clone, Debug, PartialEq)]
pub struct Psf {
    kernel: Array2<f64>,
}

impl Psf {
    pub fn new(kernel: Array2<f64>) -> Result<Self, ConfigurationError> {
        let (kh, kw) = kernel.dim();
        if kh % 2 == 0 || kw % 2 == 0 {
            return Err(ConfigurationError::EvenPsfKernel(kh, kw));
        }
        Ok(Self { kernel })
    }

    /// Delta-function kernel, convolution with it is the identity
    pub fn identity(shape: (usize, usize)) -> Result<Self, ConfigurationError> {
        let mut kernel = Array2::zeros(shape);
        kernel[(shape.0 / 2, shape.1 / 2)] = 1.0;
        Self::new(kernel)
    }

    /// Rescale the kernel to unit sum
    pub fn normalized(&self) -> Self {
        let sum: f64 = self.kernel.sum();
        Self {
            kernel: &self.kernel / sum,
        }
    }

    #[inline]
    pub fn kernel(&self) -> &Array2<f64> {
        &self.kernel
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.kernel.dim()
    }

    /// Full 2D convolution of a native image, output the same shape as the
    /// input with zero padding outside it
    pub fn convolve_native(&self, image: &Array2<f64>) -> Array2<f64> {
        let (ny, nx) = image.dim();
        let (kh, kw) = self.kernel.dim();
        let (ph, pw) = (kh / 2, kw / 2);
        let mut out = Array2::zeros((ny, nx));
        for i in 0..ny {
            for j in 0..nx {
                let mut sum = 0.0;
                for ki in 0..kh {
                    for kj in 0..kw {
                        let ii = i as isize + ki as isize - ph as isize;
                        let jj = j as isize + kj as isize - pw as isize;
                        if ii >= 0 && ii < ny as isize && jj >= 0 && jj < nx as isize {
                            sum += image[(ii as usize, jj as usize)] * self.kernel[(ki, kj)];
                        }
                    }
                }
                out[(i, j)] = sum;
            }
        }
        out
    }

    /// Trim a padded native image back to the original mask shape
    pub fn trim_padded(&self, padded: &Array2<f64>, shape: (usize, usize)) -> Array2<f64> {
        let (ph, pw) = (self.kernel.nrows() / 2, self.kernel.ncols() / 2);
        padded
            .slice(ndarray::s![ph..ph + shape.0, pw..pw + shape.1])
            .to_owned()
    }
}

/// Mask-aware convolution operator
///
/// Reproduces full 2D convolution truncated to the mask interior: flux that
/// blurs in from the blurring region just outside the mask is included via
/// the second slim input, flux that blurs out of the mask is dropped.
#[derive(Clone, Debug)]
pub struct Convolver {
    kernel: Array2<f64>,
    image_native: Vec<(usize, usize)>,
    blurring_native: Vec<(usize, usize)>,
    slim_lookup: Array2<Option<usize>>,
}

impl Convolver {
    pub fn new(mask: &Mask2D, psf: &Psf) -> Self {
        let blurring_mask = mask.blurring_mask_from(psf.shape());
        Self {
            kernel: psf.kernel().clone(),
            image_native: mask.native_index_for_slim(),
            blurring_native: blurring_mask.native_index_for_slim(),
            slim_lookup: mask.slim_index_for_native(),
        }
    }

    #[inline]
    pub fn image_pixels(&self) -> usize {
        self.image_native.len()
    }

    #[inline]
    pub fn blurring_pixels(&self) -> usize {
        self.blurring_native.len()
    }

    fn scatter(
        &self,
        out: &mut Array1<f64>,
        source_native: &[(usize, usize)],
        values: &Array1<f64>,
    ) {
        let (kh, kw) = self.kernel.dim();
        let (ph, pw) = (kh / 2, kw / 2);
        let (ny, nx) = self.slim_lookup.dim();
        for (&(a, b), &v) in source_native.iter().zip(values.iter()) {
            if v == 0.0 {
                continue;
            }
            for ki in 0..kh {
                for kj in 0..kw {
                    let i = a as isize + ph as isize - ki as isize;
                    let j = b as isize + pw as isize - kj as isize;
                    if i < 0 || i >= ny as isize || j < 0 || j >= nx as isize {
                        continue;
                    }
                    if let Some(slim) = self.slim_lookup[(i as usize, j as usize)] {
                        out[slim] += v * self.kernel[(ki, kj)];
                    }
                }
            }
        }
    }

    /// Blur a slim model image together with its blurring-region companion
    pub fn convolve(&self, image: &Array1<f64>, blurring_image: &Array1<f64>) -> Array1<f64> {
        assert_eq!(image.len(), self.image_native.len());
        assert_eq!(blurring_image.len(), self.blurring_native.len());
        let mut out = Array1::zeros(self.image_native.len());
        self.scatter(&mut out, &self.image_native, image);
        self.scatter(&mut out, &self.blurring_native, blurring_image);
        out
    }

    /// Blur every column of a mapping matrix
    ///
    /// Source pixels map only to the mask interior, so the blurring-region
    /// contribution of each column is zero.
    pub fn convolve_mapping_matrix(&self, mapping: &Array2<f64>) -> Array2<f64> {
        let mut blurred = Array2::zeros(mapping.dim());
        let zero_blurring = Array1::zeros(self.blurring_native.len());
        for (s, column) in mapping.columns().into_iter().enumerate() {
            let out = self.convolve(&column.to_owned(), &zero_blurring);
            blurred.column_mut(s).assign(&out);
        }
        blurred
    }
}
