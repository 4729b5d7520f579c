//! Reduction of multi-channel intensities over owned regions.
#![allow(missing_docs)]

use crate::region::{RegionKind, RowKey};
use anyhow::{ensure, Result};
use expansion::{ExpansionBand, ImageAllocation, OwnershipMask, RasterShape};
use log::warn;
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The intensity stack does not match the raster or the channel names it
/// is paired with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeMismatchError {
    #[error("intensity stack has {found} channels but {expected} channel names were given")]
    ChannelCount { expected: usize, found: usize },
    #[error("intensity raster is {found} but the contours were traced on a {expected} raster")]
    RasterShape {
        expected: RasterShape,
        found: RasterShape,
    },
}

/// One raster per channel, channels along the first axis.
#[derive(Debug, Clone)]
pub struct IntensityStack {
    values: Array3<f32>,
    channels: Vec<String>,
}

impl IntensityStack {
    pub fn new(values: Array3<f32>, channels: Vec<String>) -> Result<Self, ShapeMismatchError> {
        let found = values.len_of(Axis(0));
        if found != channels.len() {
            return Err(ShapeMismatchError::ChannelCount {
                expected: channels.len(),
                found,
            });
        }
        Ok(IntensityStack { values, channels })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }

    pub fn shape(&self) -> RasterShape {
        let (_, nrows, ncols) = self.values.dim();
        RasterShape::new(nrows, ncols)
    }

    pub fn check_shape(&self, expected: RasterShape) -> Result<(), ShapeMismatchError> {
        let found = self.shape();
        if found != expected {
            return Err(ShapeMismatchError::RasterShape { expected, found });
        }
        Ok(())
    }

    /// Mean of every channel over the true pixels of `mask`, `None` when the
    /// mask is empty.
    pub fn mean_over(
        &self,
        mask: &OwnershipMask,
    ) -> Result<Vec<Option<f64>>, ShapeMismatchError> {
        self.check_shape(mask.shape())?;
        let mut sums = vec![0.0f64; self.channels.len()];
        let mut n = 0usize;
        for (row, col) in mask.pixels() {
            for (sum, channel) in sums.iter_mut().zip(self.values.outer_iter()) {
                *sum += f64::from(channel[[row, col]]);
            }
            n += 1;
        }
        if n == 0 {
            return Ok(vec![None; sums.len()]);
        }
        Ok(sums.into_iter().map(|s| Some(s / n as f64)).collect())
    }

    /// Mean of one channel over the true pixels of `mask`.
    pub fn channel_mean_over(
        &self,
        channel: usize,
        mask: &OwnershipMask,
    ) -> Result<Option<f64>, ShapeMismatchError> {
        self.check_shape(mask.shape())?;
        let values = self.values.index_axis(Axis(0), channel);
        let (sum, n) = mask
            .pixels()
            .fold((0.0f64, 0usize), |(sum, n), (row, col)| {
                (sum + f64::from(values[[row, col]]), n + 1)
            });
        Ok(match n {
            0 => None,
            n => Some(sum / n as f64),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    Small,
    Large,
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeClass::Small => "Small",
            SizeClass::Large => "Large",
        })
    }
}

/// Per-object values repeated on every row of the object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Interior pixel count
    pub area: usize,
    pub size: SizeClass,
    /// Mean of the positivity channel inside the object reaches the threshold
    pub positive: bool,
}

/// Thresholds for the per-object metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationParams {
    /// Objects with at least this many interior pixels are `Large`.
    pub size_threshold: usize,
    pub positivity_channel: String,
    pub positivity_threshold: f64,
}

impl Default for AggregationParams {
    fn default() -> Self {
        AggregationParams {
            size_threshold: 500,
            positivity_channel: "SMA".to_string(),
            positivity_threshold: 0.1,
        }
    }
}

impl AggregationParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.positivity_threshold.is_finite(),
            "positivity_threshold must be a finite number"
        );
        Ok(())
    }
}

/// One summarized region: its key, the object metadata and one value per
/// channel. `None` marks a region without pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRow {
    pub key: RowKey,
    pub metadata: ObjectMetadata,
    pub values: Vec<Option<f64>>,
}

impl ExpressionRow {
    /// Whether every channel is missing.
    pub fn is_no_data(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

/// Summarizes owned regions of one image.
pub struct BandAggregator<'a> {
    params: &'a AggregationParams,
    stack: &'a IntensityStack,
    positivity_channel: Option<usize>,
}

impl<'a> BandAggregator<'a> {
    pub fn new(params: &'a AggregationParams, stack: &'a IntensityStack) -> Self {
        BandAggregator {
            params,
            stack,
            positivity_channel: stack.channel_index(&params.positivity_channel),
        }
    }

    /// Whether the positivity channel is present in the stack.
    pub fn has_positivity_channel(&self) -> bool {
        self.positivity_channel.is_some()
    }

    /// Area, size class and positivity of an object from its interior.
    pub fn object_metadata(
        &self,
        interior: &OwnershipMask,
    ) -> Result<ObjectMetadata, ShapeMismatchError> {
        self.stack.check_shape(interior.shape())?;
        let area = interior.count();
        let size = if area >= self.params.size_threshold {
            SizeClass::Large
        } else {
            SizeClass::Small
        };
        let positive = match self.positivity_channel {
            Some(c) => self
                .stack
                .channel_mean_over(c, interior)?
                .is_some_and(|mean| mean >= self.params.positivity_threshold),
            None => false,
        };
        Ok(ObjectMetadata {
            area,
            size,
            positive,
        })
    }

    pub fn aggregate(
        &self,
        image_id: &str,
        object_id: usize,
        band: ExpansionBand,
        kind: RegionKind,
        mask: &OwnershipMask,
        metadata: ObjectMetadata,
    ) -> Result<ExpressionRow, ShapeMismatchError> {
        Ok(ExpressionRow {
            key: RowKey::new(image_id, object_id, band, kind),
            metadata,
            values: self.stack.mean_over(mask)?,
        })
    }
}

/// Rows of every allocated object of one image: Data at band 0, Vascular
/// Space at every later band and Non-Vascular Space below the background cap,
/// with the bands the allocation was built with.
pub fn aggregate_image(
    image_id: &str,
    allocation: &ImageAllocation,
    stack: &IntensityStack,
    params: &AggregationParams,
) -> Result<Vec<ExpressionRow>, ShapeMismatchError> {
    stack.check_shape(allocation.shape())?;
    let aggregator = BandAggregator::new(params, stack);
    if !aggregator.has_positivity_channel() {
        warn!(
            "image {image_id} has no {} channel, every object is reported negative",
            params.positivity_channel
        );
    }

    let expansion = allocation.params();
    let mut rows = Vec::new();
    for object in allocation.objects() {
        let metadata = aggregator.object_metadata(object.interior())?;
        let row = |band: ExpansionBand, kind: RegionKind, mask: &OwnershipMask| {
            aggregator.aggregate(image_id, object.object_id, band, kind, mask, metadata)
        };
        rows.push(row(
            ExpansionBand::INTERIOR,
            RegionKind::Data,
            object.interior(),
        )?);
        for band in expansion.bands().skip(1) {
            if let Some(mask) = object.vascular(band) {
                rows.push(row(band, RegionKind::VascularSpace, mask)?);
            }
        }
        for band in expansion.background_bands() {
            if let Some(mask) = object.non_vascular(band) {
                rows.push(row(band, RegionKind::NonVascularSpace, mask)?);
            }
        }
    }
    Ok(rows)
}
