//!
//! Crate for growing objects outward in fixed-distance bands and splitting
//! the grown regions between neighbouring objects
//!
//! Objects are contours rasterized onto a shared pixel grid. Each object is
//! expanded on its own, then every pixel is handed to the nearest object so
//! that two objects never own the same pixel in the same band.
//!
#![deny(missing_docs)]

pub mod allocator;
pub mod distance;
pub mod expander;
pub mod raster;

pub use allocator::{ExpansionParams, ImageAllocation, ObjectRegions, RegionAllocator, SkippedObject};
pub use expander::{expand, DistanceField, ExpansionBand, SqDistanceRange};
pub use raster::{rasterize, OwnershipMask, PixelRange, RasterShape};
