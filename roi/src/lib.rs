//!
//! Crate for object contours (regions of interest) traced on an image
//!
//! Contours arrive as GeoJSON polygon collections, one collection per image.
//!
#![deny(missing_docs)]

pub mod contour;
mod error;

pub use contour::Contour;
pub use error::GeometryError;
