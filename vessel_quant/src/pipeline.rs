//! Quantify every image of a manifest.
//!
//! Images are independent and run in parallel. Their rows are merged into
//! the table afterwards by a single owner, in manifest order, so a failing
//! image never leaves partial rows behind.
#![allow(missing_docs)]

use crate::manifest::{LoadedImage, Manifest};
use anyhow::{Context, Result};
use expansion::{ImageAllocation, RegionAllocator, SkippedObject};
use expression::{aggregate_image, normalize, ExpressionRow, ExpressionTable};
use log::{debug, info, warn};
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;
use parameters_toml::Parameters;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Rows and bookkeeping of one processed image.
#[derive(Debug)]
pub struct ImageResult {
    pub image_id: String,
    pub rows: Vec<ExpressionRow>,
    pub n_objects: usize,
    pub skipped: Vec<SkippedObject>,
}

/// What happened to one image.
#[derive(Debug)]
pub struct ImageSummary {
    pub image_id: String,
    pub n_objects: usize,
    pub skipped: Vec<SkippedObject>,
}

/// The finished table plus per-image outcomes.
#[derive(Debug)]
pub struct RunSummary {
    pub table: ExpressionTable,
    pub images: Vec<ImageSummary>,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl RunSummary {
    pub fn n_skipped(&self) -> usize {
        self.images.iter().map(|image| image.skipped.len()).sum()
    }
}

/// Label rasters of every owned pixel, with and without object interiors.
pub fn write_expanded_masks(
    allocation: &ImageAllocation,
    image_id: &str,
    dir: &Path,
) -> Result<[PathBuf; 2]> {
    let write = |mask: Array2<u32>, name: String| -> Result<PathBuf> {
        let path = dir.join(name);
        let writer = BufWriter::new(
            File::create(&path).with_context(|| format!("While creating {path:?}"))?,
        );
        mask.write_npy(writer)
            .with_context(|| format!("While writing {path:?}"))?;
        Ok(path)
    };
    Ok([
        write(
            allocation.owned_label_mask(true),
            format!("{image_id}_expanded_masks.npy"),
        )?,
        write(
            allocation.owned_label_mask(false),
            format!("{image_id}_expanded_masks_without_interior.npy"),
        )?,
    ])
}

/// Allocate and aggregate one image, then optionally export its masks.
/// An image that fails writes no masks.
pub fn process_image(
    image: &LoadedImage,
    allocator: &RegionAllocator,
    params: &Parameters,
    masks_dir: Option<&Path>,
) -> Result<ImageResult> {
    let start = Instant::now();
    image
        .stack
        .check_shape(image.shape)
        .with_context(|| format!("Image {}", image.id))?;
    let allocation = allocator.allocate(&image.contours, image.shape);
    let rows = aggregate_image(&image.id, &allocation, &image.stack, &params.aggregation)
        .with_context(|| format!("While aggregating image {}", image.id))?;
    if let Some(dir) = masks_dir {
        write_expanded_masks(&allocation, &image.id, dir)?;
    }
    debug!(
        "image {}: {} objects, {} rows in {:.2?}",
        image.id,
        allocation.objects().len(),
        rows.len(),
        start.elapsed()
    );
    Ok(ImageResult {
        image_id: image.id.clone(),
        rows,
        n_objects: allocation.objects().len(),
        skipped: allocation.skipped().to_vec(),
    })
}

/// Process every image of the manifest and build the finished table.
///
/// An image that fails is reported in [`RunSummary::failures`] and
/// contributes no rows. The table is finalized with the configured fill
/// policy and normalized once.
pub fn run(manifest: &Manifest, params: &Parameters, masks_dir: Option<&Path>) -> Result<RunSummary> {
    let allocator = RegionAllocator::new(params.expansion.clone())?;
    if let Some(dir) = masks_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("While creating {dir:?}"))?;
    }

    let results: Vec<(String, Result<ImageResult>)> = manifest
        .images
        .par_iter()
        .map(|input| {
            let result = input
                .load()
                .and_then(|image| process_image(&image, &allocator, params, masks_dir));
            (input.id.clone(), result)
        })
        .collect();

    let channels = manifest.channels().to_vec();
    let mut table = ExpressionTable::new(channels.clone());
    let mut images = Vec::new();
    let mut failures = Vec::new();
    for (image_id, result) in results {
        match result {
            Ok(result) => {
                table.extend(result.rows)?;
                images.push(ImageSummary {
                    image_id,
                    n_objects: result.n_objects,
                    skipped: result.skipped,
                });
            }
            Err(error) => {
                warn!("image {image_id} failed: {error:#}");
                failures.push((image_id, error));
            }
        }
    }

    let table = table.finalize(params.output.fill_policy);
    let table = normalize(table, &channels, &params.normalization)?;
    info!(
        "quantified {} images into {} rows, {} objects skipped, {} images failed",
        images.len(),
        table.len(),
        images.iter().map(|image| image.skipped.len()).sum::<usize>(),
        failures.len()
    );
    Ok(RunSummary {
        table,
        images,
        failures,
    })
}
