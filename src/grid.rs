use itertools::Itertools;
use ndarray::{Array1, Array2};

/// 2D boolean mask tagged with a pixel scale
///
/// `true` entries are masked out; the fit operates on the `false` (interior)
/// pixels only. Arcsecond coordinates are defined with the origin at the mask
/// centre, y decreasing with row index and x increasing with column index.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask2D {
    array: Array2<bool>,
    pixel_scale: f64,
}

impl Mask2D {
    pub fn new(array: Array2<bool>, pixel_scale: f64) -> Self {
        assert!(pixel_scale > 0.0, "pixel_scale should be positive");
        Self { array, pixel_scale }
    }

    /// Mask with every pixel unmasked
    pub fn all_unmasked(shape: (usize, usize), pixel_scale: f64) -> Self {
        Self::new(Array2::from_elem(shape, false), pixel_scale)
    }

    /// Circular aperture mask: pixels whose centre lies beyond `radius` arcsec
    /// from the origin are masked out
    pub fn circular(shape: (usize, usize), pixel_scale: f64, radius: f64) -> Self {
        let mut mask = Self::all_unmasked(shape, pixel_scale);
        for i in 0..shape.0 {
            for j in 0..shape.1 {
                let (y, x) = mask.scaled_at(i, j);
                mask.array[(i, j)] = y.hypot(x) > radius;
            }
        }
        mask
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.array.dim()
    }

    #[inline]
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    #[inline]
    pub fn is_masked(&self, i: usize, j: usize) -> bool {
        self.array[(i, j)]
    }

    /// Number of unmasked pixels
    pub fn pixels_in_mask(&self) -> usize {
        self.array.iter().filter(|&&m| !m).count()
    }

    /// Arcsecond coordinates of the centre of native pixel `(i, j)`
    pub fn scaled_at(&self, i: usize, j: usize) -> (f64, f64) {
        let (ny, nx) = self.shape();
        let cy = (ny as f64 - 1.0) / 2.0;
        let cx = (nx as f64 - 1.0) / 2.0;
        (
            (cy - i as f64) * self.pixel_scale,
            (j as f64 - cx) * self.pixel_scale,
        )
    }

    /// Native `(i, j)` index of every unmasked pixel, row-major
    pub fn native_index_for_slim(&self) -> Vec<(usize, usize)> {
        let (ny, nx) = self.shape();
        (0..ny)
            .cartesian_product(0..nx)
            .filter(|&(i, j)| !self.is_masked(i, j))
            .collect()
    }

    /// Inverse lookup: slim index of each native pixel, `None` where masked
    pub fn slim_index_for_native(&self) -> Array2<Option<usize>> {
        let mut lookup = Array2::from_elem(self.shape(), None);
        for (slim, (i, j)) in self.native_index_for_slim().into_iter().enumerate() {
            lookup[(i, j)] = Some(slim);
        }
        lookup
    }

    /// Mask of the blurring region: pixels outside the mask interior whose
    /// light leaks into it under convolution with a kernel of the given shape
    pub fn blurring_mask_from(&self, kernel_shape: (usize, usize)) -> Mask2D {
        let (ny, nx) = self.shape();
        let (kh, kw) = kernel_shape;
        let mut blurring = Array2::from_elem((ny, nx), true);
        for i in 0..ny {
            for j in 0..nx {
                if self.is_masked(i, j) {
                    continue;
                }
                for di in 0..kh {
                    for dj in 0..kw {
                        let bi = i as isize + di as isize - (kh / 2) as isize;
                        let bj = j as isize + dj as isize - (kw / 2) as isize;
                        if bi < 0 || bi >= ny as isize || bj < 0 || bj >= nx as isize {
                            continue;
                        }
                        let (bi, bj) = (bi as usize, bj as usize);
                        if self.is_masked(bi, bj) {
                            blurring[(bi, bj)] = false;
                        }
                    }
                }
            }
        }
        Mask2D::new(blurring, self.pixel_scale)
    }
}

/// Masked (y, x) coordinate grid with sub-pixel sampling
///
/// The slim representation is an `(n, 2)` array holding one coordinate pair
/// per sub-pixel of every unmasked native pixel, row-major over native pixels
/// and row-major over the `sub_size x sub_size` cells within each pixel. Every
/// slim index therefore maps to exactly one native cell, and consecutive
/// chunks of `sub_size^2` entries bin down to one native pixel.
#[derive(Clone, Debug)]
pub struct Grid2D {
    slim: Array2<f64>,
    mask: Mask2D,
    sub_size: usize,
}

impl Grid2D {
    pub fn from_mask(mask: &Mask2D, sub_size: usize) -> Self {
        assert!(sub_size >= 1, "sub_size should be at least 1");
        let sub_scale = mask.pixel_scale() / sub_size as f64;
        let native = mask.native_index_for_slim();
        let mut slim = Array2::zeros((native.len() * sub_size * sub_size, 2));
        let mut row = 0;
        for (i, j) in native {
            let (yc, xc) = mask.scaled_at(i, j);
            let y_top = yc + mask.pixel_scale() / 2.0;
            let x_left = xc - mask.pixel_scale() / 2.0;
            for p in 0..sub_size {
                for q in 0..sub_size {
                    slim[(row, 0)] = y_top - (p as f64 + 0.5) * sub_scale;
                    slim[(row, 1)] = x_left + (q as f64 + 0.5) * sub_scale;
                    row += 1;
                }
            }
        }
        Self {
            slim,
            mask: mask.clone(),
            sub_size,
        }
    }

    /// Grid over the blurring region of the mask, always without sub-sampling
    pub fn blurring_grid_from(mask: &Mask2D, kernel_shape: (usize, usize)) -> Self {
        Self::from_mask(&mask.blurring_mask_from(kernel_shape), 1)
    }

    /// Unmasked grid padded by half the kernel size on every edge, used for
    /// convolving a model image free of mask truncation
    pub fn padded_grid_from(mask: &Mask2D, kernel_shape: (usize, usize)) -> Self {
        let (ny, nx) = mask.shape();
        let padded = Mask2D::all_unmasked(
            (ny + kernel_shape.0 - 1, nx + kernel_shape.1 - 1),
            mask.pixel_scale(),
        );
        Self::from_mask(&padded, 1)
    }

    /// Slim coordinates, shape `(len, 2)` as `(y, x)` pairs
    #[inline]
    pub fn slim(&self) -> &Array2<f64> {
        &self.slim
    }

    #[inline]
    pub fn mask(&self) -> &Mask2D {
        &self.mask
    }

    #[inline]
    pub fn sub_size(&self) -> usize {
        self.sub_size
    }

    /// Number of sub-pixel coordinates
    #[inline]
    pub fn len(&self) -> usize {
        self.slim.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of native (binned) pixels
    #[inline]
    pub fn pixels(&self) -> usize {
        self.len() / (self.sub_size * self.sub_size)
    }

    /// Average sub-pixel values down to one value per native pixel
    pub fn bin(&self, sub_values: &Array1<f64>) -> Array1<f64> {
        assert_eq!(sub_values.len(), self.len());
        let sub2 = self.sub_size * self.sub_size;
        let norm = 1.0 / sub2 as f64;
        Array1::from_iter(
            sub_values
                .as_slice()
                .expect("slim arrays are contiguous")
                .chunks_exact(sub2)
                .map(|chunk| chunk.iter().sum::<f64>() * norm),
        )
    }

    /// Bin an `(n, 2)` field such as deflection angles
    pub fn bin_2d(&self, sub_values: &Array2<f64>) -> Array2<f64> {
        assert_eq!(sub_values.nrows(), self.len());
        let sub2 = self.sub_size * self.sub_size;
        let norm = 1.0 / sub2 as f64;
        let mut binned = Array2::zeros((self.pixels(), 2));
        for (row, value) in sub_values.rows().into_iter().enumerate() {
            let pixel = row / sub2;
            binned[(pixel, 0)] += value[0] * norm;
            binned[(pixel, 1)] += value[1] * norm;
        }
        binned
    }

    /// Embed binned slim values into the full native 2D array, zero elsewhere
    pub fn native_from_binned(&self, values: &Array1<f64>) -> Array2<f64> {
        let native_index = self.mask.native_index_for_slim();
        assert_eq!(values.len(), native_index.len());
        let mut native = Array2::zeros(self.mask.shape());
        for (&v, (i, j)) in values.iter().zip(native_index) {
            native[(i, j)] = v;
        }
        native
    }
}
