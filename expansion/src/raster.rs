//! Raster geometry shared by every object of one image.
#![allow(missing_docs)]

use geo::{coord, Intersects};
use ndarray::{s, Array2};
use roi::Contour;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterShape {
    pub nrows: usize,
    pub ncols: usize,
}

impl RasterShape {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        RasterShape { nrows, ncols }
    }
    pub fn dim(self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }
}

impl fmt::Display for RasterShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nrows, self.ncols)
    }
}

impl From<(usize, usize)> for RasterShape {
    fn from((nrows, ncols): (usize, usize)) -> Self {
        RasterShape { nrows, ncols }
    }
}

/// A rectangular pixel range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelRange {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl PixelRange {
    pub fn full(shape: RasterShape) -> Self {
        PixelRange {
            rows: 0..shape.nrows,
            cols: 0..shape.ncols,
        }
    }
    pub fn empty() -> Self {
        PixelRange {
            rows: 0..0,
            cols: 0..0,
        }
    }
    pub fn nrows(&self) -> usize {
        self.rows.end.saturating_sub(self.rows.start)
    }
    pub fn ncols(&self) -> usize {
        self.cols.end.saturating_sub(self.cols.start)
    }
    pub fn is_empty(&self) -> bool {
        self.nrows() == 0 || self.ncols() == 0
    }
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.contains(&row) && self.cols.contains(&col)
    }
    /// Grow by `by` pixels on every side, clamped to the raster.
    pub fn pad(&self, by: usize, shape: RasterShape) -> Self {
        PixelRange {
            rows: self.rows.start.saturating_sub(by)..self.rows.end.saturating_add(by).min(shape.nrows),
            cols: self.cols.start.saturating_sub(by)..self.cols.end.saturating_add(by).min(shape.ncols),
        }
    }
    pub fn intersect(&self, other: &PixelRange) -> Self {
        let rows = self.rows.start.max(other.rows.start)..self.rows.end.min(other.rows.end);
        let cols = self.cols.start.max(other.cols.start)..self.cols.end.min(other.cols.end);
        PixelRange { rows, cols }
    }
    fn relative_index(&self, row: usize, col: usize) -> [usize; 2] {
        [row - self.rows.start, col - self.cols.start]
    }
}

/// Boolean mask over a full raster. Only the window that can hold true
/// pixels is stored; everything outside it is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMask {
    shape: RasterShape,
    window: PixelRange,
    cells: Array2<bool>,
}

impl OwnershipMask {
    pub fn empty(shape: RasterShape) -> Self {
        OwnershipMask {
            shape,
            window: PixelRange::empty(),
            cells: Array2::from_elem((0, 0), false),
        }
    }

    pub(crate) fn from_window(shape: RasterShape, window: PixelRange, cells: Array2<bool>) -> Self {
        debug_assert_eq!(cells.dim(), (window.nrows(), window.ncols()));
        OwnershipMask {
            shape,
            window,
            cells,
        }
    }

    pub fn from_dense(cells: Array2<bool>) -> Self {
        let shape = RasterShape::from(cells.dim());
        OwnershipMask {
            shape,
            window: PixelRange::full(shape),
            cells,
        }
    }

    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    pub fn window(&self) -> &PixelRange {
        &self.window
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.window.contains(row, col) && self.cells[self.window.relative_index(row, col)]
    }

    /// Number of true pixels
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&v| v)
    }

    /// Raster coordinates (row, col) of every true pixel, in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let (row0, col0) = (self.window.rows.start, self.window.cols.start);
        self.cells
            .indexed_iter()
            .filter(|(_, v)| **v)
            .map(move |((r, c), _)| (row0 + r, col0 + c))
    }

    /// Keep only the true pixels for which `keep(row, col)` holds.
    pub fn retain(mut self, keep: impl Fn(usize, usize) -> bool) -> Self {
        let (row0, col0) = (self.window.rows.start, self.window.cols.start);
        for ((r, c), v) in self.cells.indexed_iter_mut() {
            if *v && !keep(row0 + r, col0 + c) {
                *v = false;
            }
        }
        self
    }

    pub fn to_dense(&self) -> Array2<bool> {
        let mut dense = Array2::from_elem(self.shape.dim(), false);
        if !self.window.is_empty() {
            dense
                .slice_mut(s![
                    self.window.rows.clone(),
                    self.window.cols.clone()
                ])
                .assign(&self.cells);
        }
        dense
    }

    /// Number of pixels true in both masks.
    pub fn intersection_count(&self, other: &OwnershipMask) -> usize {
        let overlap = self.window.intersect(&other.window);
        if overlap.is_empty() {
            return 0;
        }
        overlap
            .rows
            .clone()
            .flat_map(|row| overlap.cols.clone().map(move |col| (row, col)))
            .filter(|&(row, col)| self.get(row, col) && other.get(row, col))
            .count()
    }

    pub fn is_disjoint(&self, other: &OwnershipMask) -> bool {
        self.intersection_count(other) == 0
    }
}

/// Fill a contour onto the raster. A pixel is inside when its center, at
/// integer (x = col, y = row) coordinates, lies inside or on the polygon.
pub fn rasterize(contour: &Contour, shape: RasterShape) -> OwnershipMask {
    let Some(bbox) = contour.bounding_box() else {
        return OwnershipMask::empty(shape);
    };
    let clamp = |v: f64, len: usize| (v.max(0.0) as usize).min(len);
    let window = PixelRange {
        rows: clamp(bbox.min().y.ceil(), shape.nrows)..clamp(bbox.max().y.floor() + 1.0, shape.nrows),
        cols: clamp(bbox.min().x.ceil(), shape.ncols)..clamp(bbox.max().x.floor() + 1.0, shape.ncols),
    };
    if window.is_empty() {
        return OwnershipMask::empty(shape);
    }

    let polygon = contour.polygon();
    let cells = Array2::from_shape_fn((window.nrows(), window.ncols()), |(r, c)| {
        let (row, col) = (window.rows.start + r, window.cols.start + c);
        polygon.intersects(&coord! {x: col as f64, y: row as f64})
    });
    OwnershipMask::from_window(shape, window, cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rasterize_square_includes_boundary() {
        let contour = Contour::from_points([(2.0, 1.0), (5.0, 1.0), (5.0, 3.0), (2.0, 3.0)]);
        let mask = rasterize(&contour, RasterShape::new(6, 8));
        assert_eq!(mask.count(), 4 * 3);
        assert!(mask.get(1, 2));
        assert!(mask.get(3, 5));
        assert!(!mask.get(0, 2));
        assert!(!mask.get(1, 6));
        let pixels: Vec<_> = mask.pixels().take(4).collect();
        assert_eq!(pixels, vec![(1, 2), (1, 3), (1, 4), (1, 5)]);
    }

    #[test]
    fn test_rasterize_clips_to_raster() {
        let contour = Contour::from_points([(-3.0, -3.0), (2.0, -3.0), (2.0, 2.0), (-3.0, 2.0)]);
        let mask = rasterize(&contour, RasterShape::new(10, 10));
        assert_eq!(mask.count(), 9);
        assert_eq!(mask.window().rows, 0..3);
    }

    #[test]
    fn test_rasterize_outside_raster_is_empty() {
        let contour =
            Contour::from_points([(20.0, 20.0), (25.0, 20.0), (25.0, 25.0), (20.0, 25.0)]);
        let mask = rasterize(&contour, RasterShape::new(10, 10));
        assert!(mask.is_empty());
        assert_eq!(mask.to_dense().dim(), (10, 10));
    }

    #[test]
    fn test_mask_intersection() {
        let shape = RasterShape::new(5, 5);
        let mut a = Array2::from_elem((5, 5), false);
        let mut b = Array2::from_elem((5, 5), false);
        a[[1, 1]] = true;
        a[[2, 2]] = true;
        b[[2, 2]] = true;
        b[[3, 3]] = true;
        let a = OwnershipMask::from_dense(a);
        let b = OwnershipMask::from_dense(b);
        assert_eq!(a.intersection_count(&b), 1);
        assert!(!a.is_disjoint(&b));
        let a = a.retain(|row, _| row < 2);
        assert!(a.is_disjoint(&b));
        assert!(a.is_disjoint(&OwnershipMask::empty(shape)));
    }
}
