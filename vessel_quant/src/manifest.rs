//! The list of images to quantify.
#![allow(missing_docs)]

use anyhow::{bail, ensure, Context, Result};
use expansion::RasterShape;
use expression::IntensityStack;
use itertools::Itertools;
use ndarray::Array3;
use ndarray_npy::ReadNpyExt;
use roi::Contour;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// One image: its contours, its intensity stack and the channel names.
///
/// Relative paths are resolved against the directory holding the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageInput {
    pub id: String,
    /// GeoJSON FeatureCollection of polygons
    pub contours: PathBuf,
    /// NPY array of f32, channels x rows x cols
    pub intensities: PathBuf,
    pub channels: Vec<String>,
    /// Shape of the raster the contours were traced on, when it differs
    /// from the intensity raster.
    #[serde(default)]
    pub raster_shape: Option<[usize; 2]>,
}

/// An image with every input in memory.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub id: String,
    pub contours: Vec<Contour>,
    pub stack: IntensityStack,
    pub shape: RasterShape,
}

impl ImageInput {
    pub fn load(&self) -> Result<LoadedImage> {
        let contours = Contour::load_geojson_collection(&self.contours)
            .with_context(|| format!("While loading contours of image {}", self.id))?;
        let values = Array3::<f32>::read_npy(
            File::open(&self.intensities)
                .with_context(|| format!("While opening {:?}", self.intensities))?,
        )
        .with_context(|| format!("While reading {:?}", self.intensities))?;
        let stack = IntensityStack::new(values, self.channels.clone())
            .with_context(|| format!("Image {}", self.id))?;
        let shape = self
            .raster_shape
            .map_or_else(|| stack.shape(), |[nrows, ncols]| RasterShape::new(nrows, ncols));
        Ok(LoadedImage {
            id: self.id.clone(),
            contours,
            stack,
            shape,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub images: Vec<ImageInput>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("While opening {path:?}"))?;
        let mut manifest: Manifest = serde_json::from_reader(file)
            .with_context(|| format!("While parsing {path:?} as an image manifest"))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for image in &mut manifest.images {
            image.contours = base.join(&image.contours);
            image.intensities = base.join(&image.intensities);
        }
        manifest.validate()?;
        Ok(manifest)
    }

    /// Image ids are unique and every image has the same channels.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.images.is_empty(), "the manifest lists no images");
        if let Some(id) = self.images.iter().map(|image| &image.id).duplicates().next() {
            bail!("image id {id:?} appears more than once in the manifest");
        }
        let channels = self.channels();
        for image in &self.images {
            ensure!(
                image.channels == channels,
                "image {} has channels {:?}, expected {:?}",
                image.id,
                image.channels,
                channels
            );
        }
        Ok(())
    }

    /// Channel names shared by every image.
    pub fn channels(&self) -> &[String] {
        match self.images.first() {
            Some(image) => &image.channels,
            None => &[],
        }
    }
}
