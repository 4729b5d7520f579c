//!
//! Crate for quantifying marker expression around segmented vessels
//!
//! Reads a manifest of images, allocates expansion bands to every object and
//! writes one expression table for the whole run.
//!
#![deny(missing_docs)]

pub mod manifest;
pub mod pipeline;

pub use manifest::{ImageInput, LoadedImage, Manifest};
pub use pipeline::{process_image, run, write_expanded_masks, ImageResult, RunSummary};
