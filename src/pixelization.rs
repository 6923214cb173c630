//! Rectangular source pixelization and the mapper it produces
//!
//! A pixelization overlays a regular grid of source pixels on the traced
//! coordinates and records which source pixel every sub-coordinate lands in.
//! The mapper is rebuilt per evaluation; geometry changes with every
//! parameter vector so nothing is cached across fits.

use crate::grid::Grid2D;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Rectangular overlay pixelization, sized to the extent of the grid it maps
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangular {
    pub shape: (usize, usize),
}

impl Rectangular {
    pub fn new(shape: (usize, usize)) -> Self {
        Self { shape }
    }

    /// Overlay the pixelization on a grid and build the mapper
    ///
    /// With `use_border` set, sub-coordinates outside the circle through the
    /// outermost binned pixel are pulled radially onto it first, so stray
    /// coordinates cannot stretch the overlay.
    pub fn mapper_from(&self, grid: &Grid2D, use_border: bool) -> Mapper {
        let sub = grid.slim();
        let coords = if use_border {
            relocated_within_border(sub, &grid.bin_2d(sub))
        } else {
            sub.to_owned()
        };

        let (rows, cols) = self.shape;
        let buffer = 1e-8;
        let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for row in coords.rows() {
            y_min = y_min.min(row[0]);
            y_max = y_max.max(row[0]);
            x_min = x_min.min(row[1]);
            x_max = x_max.max(row[1]);
        }
        y_min -= buffer;
        y_max += buffer;
        x_min -= buffer;
        x_max += buffer;
        let scale_y = (y_max - y_min) / rows as f64;
        let scale_x = (x_max - x_min) / cols as f64;

        let sub_area = grid.sub_size() * grid.sub_size();
        let n_image = coords.nrows() / sub_area;
        let weight = 1.0 / sub_area as f64;
        let mut mapping = Array2::zeros((n_image, rows * cols));
        for (s, coord) in coords.rows().into_iter().enumerate() {
            let row = (((y_max - coord[0]) / scale_y) as usize).min(rows - 1);
            let col = (((coord[1] - x_min) / scale_x) as usize).min(cols - 1);
            mapping[(s / sub_area, row * cols + col)] += weight;
        }

        Mapper {
            shape: self.shape,
            mapping,
            neighbors: rectangular_neighbors(rows, cols),
        }
    }
}

/// Pull coordinates outside the border circle of the binned grid onto it
fn relocated_within_border(sub: &Array2<f64>, binned: &Array2<f64>) -> Array2<f64> {
    let n = binned.nrows() as f64;
    let cy = binned.column(0).sum() / n;
    let cx = binned.column(1).sum() / n;
    let border_radius = binned
        .rows()
        .into_iter()
        .map(|row| (row[0] - cy).hypot(row[1] - cx))
        .fold(0.0, f64::max);

    let mut out = sub.to_owned();
    for mut row in out.rows_mut() {
        let r = (row[0] - cy).hypot(row[1] - cx);
        if r > border_radius {
            let scale = border_radius / r;
            row[0] = cy + scale * (row[0] - cy);
            row[1] = cx + scale * (row[1] - cx);
        }
    }
    out
}

fn rectangular_neighbors(rows: usize, cols: usize) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::with_capacity(4); rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            let p = i * cols + j;
            if i > 0 {
                neighbors[p].push(p - cols);
            }
            if i + 1 < rows {
                neighbors[p].push(p + cols);
            }
            if j > 0 {
                neighbors[p].push(p - 1);
            }
            if j + 1 < cols {
                neighbors[p].push(p + 1);
            }
        }
    }
    neighbors
}

/// Sub-pixel to source-pixel mapping over a rectangular pixelization
#[derive(Clone, Debug)]
pub struct Mapper {
    shape: (usize, usize),
    mapping: Array2<f64>,
    neighbors: Vec<Vec<usize>>,
}

impl Mapper {
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    #[inline]
    pub fn pixels(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    /// `(image_pixels, source_pixels)` matrix of sub-fractions; rows sum to one
    #[inline]
    pub fn mapping_matrix(&self) -> &Array2<f64> {
        &self.mapping
    }

    #[inline]
    pub fn neighbors(&self) -> &[Vec<usize>] {
        &self.neighbors
    }

    /// Mean mapped image value per source pixel, normalized to a unit
    /// maximum and raised to `signal_scale`; drives adaptive regularization
    pub fn pixel_signals_from(&self, image: &Array1<f64>, signal_scale: f64) -> Array1<f64> {
        let mut signals = Array1::zeros(self.pixels());
        for p in 0..self.pixels() {
            let column = self.mapping.column(p);
            let coverage: f64 = column.sum();
            if coverage > 0.0 {
                signals[p] = column.dot(image) / coverage;
            }
        }
        let max = signals.iter().cloned().fold(0.0, f64::max);
        if max > 0.0 {
            signals.mapv_inplace(|v| (v / max).max(0.0).powf(signal_scale));
        }
        signals
    }
}
