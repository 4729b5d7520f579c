use thiserror::Error;

/// Reasons a contour cannot be used as an object outline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Fewer than three distinct vertices.
    #[error("contour has {points} distinct points, at least 3 are required")]
    TooFewPoints {
        /// number of distinct vertices found
        points: usize,
    },
    /// A vertex is NaN or infinite.
    #[error("contour has a non-finite coordinate at vertex {vertex}")]
    NonFinite {
        /// index of the offending vertex
        vertex: usize,
    },
    /// The polygon encloses no area.
    #[error("contour encloses zero area")]
    ZeroArea,
    /// Two non-adjacent edges cross or touch.
    #[error("contour edges {first} and {second} intersect")]
    SelfIntersecting {
        /// index of the first edge
        first: usize,
        /// index of the second edge
        second: usize,
    },
    /// The polygon covers no pixel center of the raster it is drawn on.
    #[error("contour covers no pixel of the raster")]
    EmptyInterior,
    /// Area below the configured minimum.
    #[error("contour area {area:.1} is below the minimum of {minimum:.1}")]
    BelowMinimumArea {
        /// polygon area in square pixels
        area: f64,
        /// configured minimum
        minimum: f64,
    },
}
