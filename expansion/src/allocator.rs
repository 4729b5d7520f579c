//! Competitive allocation of pixels to the objects of one image.
//!
//! Every pixel belongs to the zone of the object nearest to it, with ties
//! going to the object listed first. Each object is expanded on its own and
//! its bands are then cut down to its zone, so no two objects ever own the
//! same pixel in the same band.
#![allow(missing_docs)]

use crate::distance::{nearest_object_transform, NearestObject, NO_OBJECT};
use crate::expander::{DistanceField, ExpansionBand, SqDistanceRange};
use crate::raster::{rasterize, OwnershipMask, RasterShape};
use anyhow::{ensure, Result};
use log::{debug, warn};
use ndarray::Array2;
use roi::{Contour, GeometryError};
use serde::{Deserialize, Serialize};

/// Geometry of the expansion bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpansionParams {
    /// Width of each band in pixels.
    pub pixel_interval: u32,
    /// Number of bands including the interior, so bands run `0..n_bands`.
    pub n_bands: usize,
    /// Non-Vascular Space of band `b` extends out to this band's outer edge.
    pub max_background_band: usize,
    /// Contours with a smaller polygon area are skipped.
    pub minimum_contour_area: f64,
}

impl Default for ExpansionParams {
    fn default() -> Self {
        ExpansionParams {
            pixel_interval: 5,
            n_bands: 11,
            max_background_band: 10,
            minimum_contour_area: 0.0,
        }
    }
}

impl ExpansionParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.pixel_interval > 0, "pixel_interval must be positive");
        ensure!(
            self.n_bands >= 1,
            "n_bands must count at least the interior band"
        );
        ensure!(
            self.minimum_contour_area.is_finite() && self.minimum_contour_area >= 0.0,
            "minimum_contour_area must be a non-negative number, got {}",
            self.minimum_contour_area
        );
        Ok(())
    }

    /// All bands, interior first.
    pub fn bands(&self) -> impl Iterator<Item = ExpansionBand> {
        (0..self.n_bands).map(ExpansionBand)
    }

    /// Bands that carry a Non-Vascular Space region.
    pub fn background_bands(&self) -> impl Iterator<Item = ExpansionBand> {
        (0..self.n_bands.min(self.max_background_band)).map(ExpansionBand)
    }

    /// Farthest distance in pixels any region reaches.
    pub fn max_reach(&self) -> u64 {
        let outermost = self.n_bands.saturating_sub(1).max(self.max_background_band);
        ExpansionBand(outermost).upper_bound(self.pixel_interval)
    }

    /// Squared distances of the Non-Vascular Space at `band`.
    pub fn background_range(&self, band: ExpansionBand) -> Option<SqDistanceRange> {
        SqDistanceRange::between(
            band.upper_bound(self.pixel_interval),
            ExpansionBand(self.max_background_band).upper_bound(self.pixel_interval),
        )
    }
}

/// Regions owned by one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRegions {
    /// Position of the contour in the input list
    pub object_id: usize,
    interior: OwnershipMask,
    // band b at index b - 1
    vascular: Vec<OwnershipMask>,
    // band b at index b
    background: Vec<OwnershipMask>,
}

impl ObjectRegions {
    /// Interior pixels (band 0).
    pub fn interior(&self) -> &OwnershipMask {
        &self.interior
    }

    /// Number of interior pixels.
    pub fn area(&self) -> usize {
        self.interior.count()
    }

    /// Ownership mask of a band: the interior for band 0, the annulus otherwise.
    pub fn ownership(&self, band: ExpansionBand) -> Option<&OwnershipMask> {
        match band.index() {
            0 => Some(&self.interior),
            b => self.vascular.get(b - 1),
        }
    }

    /// Annulus of a band >= 1.
    pub fn vascular(&self, band: ExpansionBand) -> Option<&OwnershipMask> {
        band.index()
            .checked_sub(1)
            .and_then(|i| self.vascular.get(i))
    }

    /// Non-Vascular Space of a band below the background cap.
    pub fn non_vascular(&self, band: ExpansionBand) -> Option<&OwnershipMask> {
        self.background.get(band.index())
    }
}

/// An object that received no regions.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedObject {
    pub object_id: usize,
    pub reason: GeometryError,
}

/// Result of allocating the objects of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAllocation {
    shape: RasterShape,
    params: ExpansionParams,
    nearest: NearestObject,
    objects: Vec<ObjectRegions>,
    skipped: Vec<SkippedObject>,
}

impl ImageAllocation {
    pub fn shape(&self) -> RasterShape {
        self.shape
    }

    /// Band geometry the regions were built with.
    pub fn params(&self) -> &ExpansionParams {
        &self.params
    }

    /// Allocated objects in input order.
    pub fn objects(&self) -> &[ObjectRegions] {
        &self.objects
    }

    pub fn skipped(&self) -> &[SkippedObject] {
        &self.skipped
    }

    /// Squared distance of every pixel to the object whose zone it is in.
    pub fn zone_sq_distance(&self) -> &Array2<u64> {
        &self.nearest.sq_distance
    }

    /// Label raster of every pixel owned by an object up to its outermost
    /// band. Pixels carry object id + 1 and 0 when unowned.
    pub fn owned_label_mask(&self, include_interior: bool) -> Array2<u32> {
        let mut labels = Array2::from_elem(self.shape.dim(), NO_OBJECT);
        for object in &self.objects {
            let label = object_label(object.object_id);
            let interior = include_interior.then_some(&object.interior);
            for mask in interior.into_iter().chain(&object.vascular) {
                for (row, col) in mask.pixels() {
                    labels[[row, col]] = label;
                }
            }
        }
        labels
    }
}

fn object_label(object_id: usize) -> u32 {
    object_id as u32 + 1
}

/// Splits an image between its objects.
#[derive(Debug, Clone)]
pub struct RegionAllocator {
    params: ExpansionParams,
}

impl RegionAllocator {
    pub fn new(params: ExpansionParams) -> Result<Self> {
        params.validate()?;
        Ok(RegionAllocator { params })
    }

    pub fn params(&self) -> &ExpansionParams {
        &self.params
    }

    /// Allocate every object of one image. Degenerate contours and contours
    /// whose interior is entirely claimed by earlier objects are skipped.
    pub fn allocate(&self, contours: &[Contour], shape: RasterShape) -> ImageAllocation {
        let mut skipped = Vec::new();
        let mut skip = |object_id: usize, reason: GeometryError| {
            warn!("skipping object {object_id}: {reason}");
            skipped.push(SkippedObject { object_id, reason });
        };

        // Objects listed first keep the pixels where interiors overlap
        let mut labels = Array2::from_elem(shape.dim(), NO_OBJECT);
        let mut interiors = Vec::with_capacity(contours.len());
        for (object_id, contour) in contours.iter().enumerate() {
            if let Err(reason) = self.check(contour) {
                skip(object_id, reason);
                continue;
            }
            let label = object_label(object_id);
            let mut claimed = 0;
            let interior = rasterize(contour, shape);
            for (row, col) in interior.pixels() {
                if labels[[row, col]] == NO_OBJECT {
                    labels[[row, col]] = label;
                    claimed += 1;
                }
            }
            if claimed == 0 {
                skip(object_id, GeometryError::EmptyInterior);
            } else {
                interiors.push((object_id, interior));
            }
        }

        let nearest = nearest_object_transform(labels.view());
        let objects: Vec<_> = interiors
            .into_iter()
            .map(|(object_id, interior)| self.object_regions(object_id, interior, &nearest))
            .collect();
        debug!(
            "allocated {} objects on a {shape} raster, skipped {}",
            objects.len(),
            skipped.len()
        );

        ImageAllocation {
            shape,
            params: self.params.clone(),
            nearest,
            objects,
            skipped,
        }
    }

    fn check(&self, contour: &Contour) -> Result<(), GeometryError> {
        contour.validate()?;
        let area = contour.area();
        if area < self.params.minimum_contour_area {
            return Err(GeometryError::BelowMinimumArea {
                area,
                minimum: self.params.minimum_contour_area,
            });
        }
        Ok(())
    }

    fn object_regions(
        &self,
        object_id: usize,
        interior: OwnershipMask,
        nearest: &NearestObject,
    ) -> ObjectRegions {
        let label = object_label(object_id);
        let in_zone = |row: usize, col: usize| nearest.label[[row, col]] == label;

        let interior = interior.retain(in_zone);
        let field = DistanceField::compute(&interior, self.params.max_reach() as f64);
        let vascular = self
            .params
            .bands()
            .skip(1)
            .map(|band| {
                field
                    .threshold(band.sq_range(self.params.pixel_interval))
                    .retain(in_zone)
            })
            .collect();
        let background = self
            .params
            .background_bands()
            .map(|band| match self.params.background_range(band) {
                Some(range) => field.threshold(range).retain(in_zone),
                None => OwnershipMask::empty(interior.shape()),
            })
            .collect();

        ObjectRegions {
            object_id,
            interior,
            vascular,
            background,
        }
    }
}
