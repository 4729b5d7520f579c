//! Expansion of a single object outward by distance thresholds.
//!
//! Distances are measured from pixel centers to the nearest pixel of the
//! filled object, so interior pixels sit at distance 0. Bounds are compared
//! on squared distances, which keeps every comparison exact.

use crate::distance::{squared_distance_transform, UNREACHED};
use crate::raster::{rasterize, OwnershipMask, PixelRange, RasterShape};
use ndarray::Array2;
use roi::Contour;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a distance band. Band 0 is the interior, band `b >= 1` the
/// annulus `((b - 1) * step, b * step]` around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpansionBand(pub usize);

impl ExpansionBand {
    /// The object itself.
    pub const INTERIOR: ExpansionBand = ExpansionBand(0);

    /// Band index
    pub fn index(self) -> usize {
        self.0
    }

    /// Exclusive inner edge in pixels (0 for the interior).
    pub fn lower_bound(self, step: u32) -> u64 {
        self.0.saturating_sub(1) as u64 * step as u64
    }

    /// Inclusive outer edge in pixels.
    pub fn upper_bound(self, step: u32) -> u64 {
        self.0 as u64 * step as u64
    }

    /// Squared distances covered by this band.
    pub fn sq_range(self, step: u32) -> SqDistanceRange {
        if self.0 == 0 {
            return SqDistanceRange { min: 0, max: 0 };
        }
        SqDistanceRange {
            min: self.lower_bound(step).pow(2) + 1,
            max: self.upper_bound(step).pow(2),
        }
    }
}

impl fmt::Display for ExpansionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of squared distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqDistanceRange {
    /// smallest squared distance included
    pub min: u64,
    /// largest squared distance included
    pub max: u64,
}

impl SqDistanceRange {
    /// Squared range of distances `d` with `lower <= d <= upper`. `None` when
    /// no distance qualifies, including when `upper < lower`.
    pub fn from_bounds(lower: f64, upper: f64) -> Option<Self> {
        if lower.is_nan() || upper.is_nan() || upper < lower || upper < 0.0 {
            return None;
        }
        let lower = lower.max(0.0);
        let range = SqDistanceRange {
            min: (lower * lower).ceil() as u64,
            max: (upper * upper).floor() as u64,
        };
        (range.min <= range.max).then_some(range)
    }

    /// Squared distances `d` with `lower < d <= upper`, for whole-pixel bounds.
    pub fn between(lower: u64, upper: u64) -> Option<Self> {
        let range = SqDistanceRange {
            min: lower.saturating_mul(lower).saturating_add(1),
            max: upper.saturating_mul(upper),
        };
        (range.min <= range.max).then_some(range)
    }

    /// Whether a squared distance falls in the range. Unreached pixels never do.
    pub fn contains(&self, sq_distance: u64) -> bool {
        sq_distance != UNREACHED && (self.min..=self.max).contains(&sq_distance)
    }

    /// Upper bound as a distance in pixels.
    pub fn reach(&self) -> f64 {
        (self.max as f64).sqrt()
    }
}

/// Squared distance of every pixel near an object to the object.
///
/// Only a window around the object, padded by the reach, is stored; pixels
/// outside it are farther than the reach.
#[derive(Debug, Clone)]
pub struct DistanceField {
    shape: RasterShape,
    window: PixelRange,
    sq_distance: Array2<u64>,
}

impl DistanceField {
    /// Distances to the true pixels of `object`, out to at least `reach` pixels.
    pub fn compute(object: &OwnershipMask, reach: f64) -> Self {
        let shape = object.shape();
        if object.is_empty() {
            return DistanceField {
                shape,
                window: PixelRange::empty(),
                sq_distance: Array2::zeros((0, 0)),
            };
        }
        let pad = if reach.is_finite() {
            reach.max(0.0).ceil() as usize
        } else {
            usize::MAX
        };
        let window = object.window().pad(pad, shape);
        let features = Array2::from_shape_fn((window.nrows(), window.ncols()), |(r, c)| {
            object.get(window.rows.start + r, window.cols.start + c)
        });
        DistanceField {
            shape,
            sq_distance: squared_distance_transform(features.view()),
            window,
        }
    }

    /// Squared distance at a raster pixel, [`UNREACHED`] outside the window.
    pub fn get(&self, row: usize, col: usize) -> u64 {
        if self.window.contains(row, col) {
            self.sq_distance[[row - self.window.rows.start, col - self.window.cols.start]]
        } else {
            UNREACHED
        }
    }

    /// Pixels whose squared distance lies in `range`.
    pub fn threshold(&self, range: SqDistanceRange) -> OwnershipMask {
        OwnershipMask::from_window(
            self.shape,
            self.window.clone(),
            self.sq_distance.mapv(|d| range.contains(d)),
        )
    }
}

/// Pixels whose distance to the filled contour lies in `[lower_bound, upper_bound]`.
///
/// A `lower_bound` above 0 leaves the object itself out. The result does not
/// depend on any other object and is empty when `upper_bound < lower_bound`.
pub fn expand(
    contour: &Contour,
    shape: RasterShape,
    lower_bound: f64,
    upper_bound: f64,
) -> OwnershipMask {
    let Some(range) = SqDistanceRange::from_bounds(lower_bound, upper_bound) else {
        return OwnershipMask::empty(shape);
    };
    let interior = rasterize(contour, shape);
    DistanceField::compute(&interior, range.reach()).threshold(range)
}
