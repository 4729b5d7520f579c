//! Exact Euclidean distance transforms on integer pixel grids.
//!
//! Distances are kept squared so that every value is an exact integer. The
//! labelled transform tracks which object the nearest object pixel belongs
//! to, which gives the nearest-object partition of a raster in two separable
//! passes: a column scan followed by a lower envelope of parabolas per row.
//! When several objects are equally near, the smallest label wins.

use ndarray::{Array2, ArrayView2};
use std::cmp::Ordering;

/// Label of pixels that belong to no object.
pub const NO_OBJECT: u32 = 0;

/// Squared distance reported when a raster holds no object pixel at all.
pub const UNREACHED: u64 = u64::MAX;

/// Result of the labelled distance transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearestObject {
    /// Squared distance of each pixel to the nearest labelled pixel.
    pub sq_distance: Array2<u64>,
    /// Label of that nearest pixel, or [`NO_OBJECT`] when nothing is reachable.
    pub label: Array2<u32>,
}

/// Squared distance of every pixel to the nearest `true` pixel.
pub fn squared_distance_transform(features: ArrayView2<'_, bool>) -> Array2<u64> {
    let labels = features.mapv(|f| if f { 1 } else { NO_OBJECT });
    nearest_object_transform(labels.view()).sq_distance
}

/// Labelled distance transform. Non-zero entries of `labels` are object pixels.
pub fn nearest_object_transform(labels: ArrayView2<'_, u32>) -> NearestObject {
    let (nrows, ncols) = labels.dim();

    // Column pass: distance in rows to the nearest object pixel of the same column
    let mut col_distance = Array2::<u64>::from_elem((nrows, ncols), UNREACHED);
    let mut col_label = Array2::<u32>::from_elem((nrows, ncols), NO_OBJECT);
    for col in 0..ncols {
        let mut above = None;
        for row in 0..nrows {
            let label = labels[[row, col]];
            if label != NO_OBJECT {
                above = Some((row, label));
            }
            if let Some((source_row, source_label)) = above {
                col_distance[[row, col]] = (row - source_row) as u64;
                col_label[[row, col]] = source_label;
            }
        }
        let mut below = None;
        for row in (0..nrows).rev() {
            let label = labels[[row, col]];
            if label != NO_OBJECT {
                below = Some((row, label));
            }
            if let Some((source_row, source_label)) = below {
                let d = (source_row - row) as u64;
                let current = col_distance[[row, col]];
                if d < current || (d == current && source_label < col_label[[row, col]]) {
                    col_distance[[row, col]] = d;
                    col_label[[row, col]] = source_label;
                }
            }
        }
    }

    // Row pass
    let mut sq_distance = Array2::<u64>::from_elem((nrows, ncols), UNREACHED);
    let mut label = Array2::<u32>::from_elem((nrows, ncols), NO_OBJECT);
    let mut envelope = LowerEnvelope::with_capacity(ncols);
    for row in 0..nrows {
        envelope.clear();
        for col in 0..ncols {
            let g = col_distance[[row, col]];
            if g != UNREACHED {
                envelope.push(Parabola {
                    vertex: col as i64,
                    height: (g * g) as i64,
                    label: col_label[[row, col]],
                });
            }
        }
        envelope.sample(ncols, |col, value, nearest| {
            sq_distance[[row, col]] = value;
            label[[row, col]] = nearest;
        });
    }

    NearestObject { sq_distance, label }
}

/// f(x) = (x - vertex)^2 + height
#[derive(Debug, Clone, Copy)]
struct Parabola {
    vertex: i64,
    height: i64,
    label: u32,
}

impl Parabola {
    fn at(&self, x: i64) -> u64 {
        ((x - self.vertex).pow(2) + self.height) as u64
    }

    /// Abscissa where `self` and a parabola with a larger vertex are equal.
    fn meets(&self, right: &Parabola) -> Fraction {
        Fraction {
            num: (right.height + right.vertex * right.vertex)
                - (self.height + self.vertex * self.vertex),
            den: 2 * (right.vertex - self.vertex),
        }
    }
}

/// Exact rational `num / den` with `den > 0`.
#[derive(Debug, Clone, Copy)]
struct Fraction {
    num: i64,
    den: i64,
}

impl Fraction {
    fn cmp_fraction(self, other: Fraction) -> Ordering {
        (self.num as i128 * other.den as i128).cmp(&(other.num as i128 * self.den as i128))
    }
    fn cmp_int(self, x: i64) -> Ordering {
        (self.num as i128).cmp(&(x as i128 * self.den as i128))
    }
}

/// Lower envelope of parabolas with strictly increasing vertices.
///
/// `starts[k]` is where `parabolas[k]` becomes minimal. Parabolas that are
/// minimal at a single point are kept so that ties remain visible.
struct LowerEnvelope {
    parabolas: Vec<Parabola>,
    starts: Vec<Fraction>,
}

impl LowerEnvelope {
    fn with_capacity(n: usize) -> Self {
        LowerEnvelope {
            parabolas: Vec::with_capacity(n),
            starts: Vec::with_capacity(n),
        }
    }

    fn clear(&mut self) {
        self.parabolas.clear();
        self.starts.clear();
    }

    fn push(&mut self, parabola: Parabola) {
        loop {
            let Some(top) = self.parabolas.last() else {
                self.parabolas.push(parabola);
                // never read: the first parabola starts at minus infinity
                self.starts.push(Fraction { num: 0, den: 1 });
                return;
            };
            let start = top.meets(&parabola);
            let k = self.parabolas.len() - 1;
            if k > 0 && start.cmp_fraction(self.starts[k]) == Ordering::Less {
                self.parabolas.pop();
                self.starts.pop();
            } else {
                self.parabolas.push(parabola);
                self.starts.push(start);
                return;
            }
        }
    }

    /// Visit x in `0..width` with the minimum value and its label. Among
    /// equal minima the smallest label is reported.
    fn sample(&self, width: usize, mut visit: impl FnMut(usize, u64, u32)) {
        let n = self.parabolas.len();
        if n == 0 {
            return;
        }
        let mut k = 0;
        for col in 0..width {
            let x = col as i64;
            while k + 1 < n && self.starts[k + 1].cmp_int(x) == Ordering::Less {
                k += 1;
            }
            let mut best = &self.parabolas[k];
            for (start, parabola) in self.starts[k + 1..].iter().zip(&self.parabolas[k + 1..]) {
                if start.cmp_int(x) != Ordering::Equal {
                    break;
                }
                if parabola.label < best.label {
                    best = parabola;
                }
            }
            visit(col, best.at(x), best.label);
        }
    }
}
