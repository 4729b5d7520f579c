//!
//! Crate for per-object, per-band expression summaries
//!
//! Owned regions from the allocator are reduced to per-channel means, gathered
//! into an [`ExpressionTable`] keyed by image, object, band and region kind,
//! normalized and exported as CSV.
//!
#![deny(missing_docs)]

pub mod aggregate;
pub mod io;
pub mod normalize;
pub mod region;
pub mod table;

pub use aggregate::{
    aggregate_image, AggregationParams, BandAggregator, ExpressionRow, IntensityStack,
    ObjectMetadata, ShapeMismatchError, SizeClass,
};
pub use io::{save_expression_csv, write_expression_csv, OutputParams};
pub use normalize::{normalize, NormalizationParams, Scaling, Transform};
pub use region::{RegionKind, RowKey};
pub use table::{ExpressionTable, FillPolicy, KeyFilter, TableError};
