#![allow(missing_docs)]
use crate::GeometryError;
use anyhow::{bail, Context, Result};
use geo::{Area, BoundingRect, Intersects};
use geo_types::{coord, Coord, Line, LineString, Polygon, Rect};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fs::{read_to_string, write};
use std::path::Path;

/// Parts of a multipolygon smaller than this are treated as tracing debris.
const MIN_AREA: f64 = 16.0;

/// One closed object outline in pixel coordinates, x along columns and y along rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    #[serde(
        deserialize_with = "geojson::de::deserialize_geometry",
        serialize_with = "geojson::ser::serialize_geometry"
    )]
    geometry: Polygon<f64>,
}

impl From<Polygon<f64>> for Contour {
    fn from(geometry: Polygon<f64>) -> Self {
        Contour { geometry }
    }
}

impl Contour {
    /// Build a contour from its vertices. The ring is closed automatically.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let exterior: LineString<f64> = points
            .into_iter()
            .map(|(x, y)| coord! {x: x, y: y})
            .collect();
        Contour {
            geometry: Polygon::new(exterior, vec![]),
        }
    }

    /// Regular polygon inscribed in the circle of `radius` around `center`.
    pub fn regular_polygon(center: (f64, f64), radius: f64, vertices: usize) -> Self {
        let (cx, cy) = center;
        Contour::from_points((0..vertices).map(|i| {
            let theta = TAU * i as f64 / vertices as f64;
            (cx + radius * theta.cos(), cy + radius * theta.sin())
        }))
    }

    pub fn polygon(&self) -> &Polygon<f64> {
        &self.geometry
    }

    /// Vertices of the outer ring without the closing vertex.
    pub fn vertices(&self) -> &[Coord<f64>] {
        let coords = &self.geometry.exterior().0;
        match coords.as_slice() {
            [first, .., last] if first == last => &coords[..coords.len() - 1],
            all => all,
        }
    }

    /// Area enclosed by the outer ring, in square pixels.
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// Check that the contour describes a simple polygon with positive area.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if let Some(vertex) = self
            .vertices()
            .iter()
            .position(|c| !(c.x.is_finite() && c.y.is_finite()))
        {
            return Err(GeometryError::NonFinite { vertex });
        }

        let ring = self.ring_without_repeats();
        let distinct = ring
            .iter()
            .map(|c| (c.x.to_bits(), c.y.to_bits()))
            .unique()
            .count();
        if distinct < 3 {
            return Err(GeometryError::TooFewPoints { points: distinct });
        }
        if self.area() == 0.0 {
            return Err(GeometryError::ZeroArea);
        }

        let n = ring.len();
        let edges: Vec<Line<f64>> = (0..n)
            .map(|i| Line::new(ring[i], ring[(i + 1) % n]))
            .collect();
        for (first, second) in (0..n).tuple_combinations() {
            let adjacent = second == first + 1 || (first == 0 && second == n - 1);
            if !adjacent && edges[first].intersects(&edges[second]) {
                return Err(GeometryError::SelfIntersecting { first, second });
            }
        }
        Ok(())
    }

    /// Outer ring with consecutive duplicate vertices collapsed.
    fn ring_without_repeats(&self) -> Vec<Coord<f64>> {
        let mut ring = self.vertices().to_vec();
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        ring
    }

    /// Load every polygon of a GeoJSON feature collection, in file order.
    pub fn load_geojson_collection(fname: &Path) -> Result<Vec<Self>> {
        #[derive(Deserialize)]
        struct Feature {
            #[serde(deserialize_with = "geojson::de::deserialize_geometry")]
            geometry: geo_types::Geometry<f64>,
        }

        let collection: Vec<Feature> = geojson::de::deserialize_feature_collection_str_to_vec(
            &read_to_string(fname).with_context(|| format!("While reading {fname:?}"))?,
        )
        .with_context(|| format!("While parsing {fname:?} as a GeoJSON feature collection"))?;

        collection
            .into_iter()
            .enumerate()
            .map(|(ind, feature)| match feature.geometry {
                geo_types::Geometry::Polygon(p) => Ok(Contour::from(p)),
                geo_types::Geometry::MultiPolygon(m) => m
                    .into_iter()
                    .filter(|p| p.unsigned_area() > MIN_AREA)
                    .exactly_one()
                    .map(Contour::from)
                    .map_err(|parts| {
                        anyhow::anyhow!(
                            "feature {ind} in {fname:?} is a multipolygon with {} parts above {MIN_AREA} px^2",
                            parts.count()
                        )
                    }),
                other => bail!("feature {ind} in {fname:?} has unexpected geometry {other:?}"),
            })
            .collect()
    }
}

/// Writes contours as a feature collection with sequential object ids starting from 0
pub fn write_geojson_collection(contours: &[Contour], fname: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct Feature {
        #[serde(serialize_with = "geojson::ser::serialize_geometry")]
        geometry: Polygon<f64>,
        object_id: usize,
    }
    let collection = geojson::ser::to_feature_collection_string(
        &contours
            .iter()
            .enumerate()
            .map(|(object_id, contour)| Feature {
                geometry: contour.geometry.clone(),
                object_id,
            })
            .collect::<Vec<_>>(),
    )?;

    write(fname, collection).with_context(|| format!("While writing {fname:?}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn square(side: f64) -> Contour {
        Contour::from_points([(0.0, 0.0), (side, 0.0), (side, side), (0.0, side)])
    }

    #[test]
    fn test_square_is_valid() {
        let contour = square(4.0);
        assert_eq!(contour.validate(), Ok(()));
        assert_eq!(contour.area(), 16.0);
        assert_eq!(contour.vertices().len(), 4);
    }

    #[test]
    fn test_too_few_points() {
        let contour = Contour::from_points([(0.0, 0.0), (3.0, 3.0), (3.0, 3.0), (0.0, 0.0)]);
        assert_eq!(
            contour.validate(),
            Err(GeometryError::TooFewPoints { points: 2 })
        );
    }

    #[test]
    fn test_collinear_is_zero_area() {
        let contour = Contour::from_points([(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(contour.validate(), Err(GeometryError::ZeroArea));
    }

    #[test]
    fn test_bow_tie_self_intersects() {
        let contour = Contour::from_points([(0.0, 0.0), (6.0, 4.0), (6.0, 0.0), (0.0, 2.0)]);
        assert!(matches!(
            contour.validate(),
            Err(GeometryError::SelfIntersecting { .. })
        ));
    }

    #[test]
    fn test_non_finite() {
        let contour = Contour::from_points([(0.0, 0.0), (f64::NAN, 1.0), (2.0, 0.0)]);
        assert_eq!(
            contour.validate(),
            Err(GeometryError::NonFinite { vertex: 1 })
        );
    }

    #[test]
    fn test_regular_polygon_area() {
        let contour = Contour::regular_polygon((10.0, 10.0), 5.0, 256);
        assert_eq!(contour.validate(), Ok(()));
        let circle = std::f64::consts::PI * 25.0;
        assert!((contour.area() - circle).abs() < 0.1);
        let bbox = contour.bounding_box().unwrap();
        assert!((bbox.min().x - 5.0).abs() < 1e-9);
        assert!((bbox.max().x - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_load_and_save_geojson() -> Result<()> {
        let contours = vec![
            square(3.0),
            Contour::regular_polygon((20.0, 20.0), 4.0, 12),
        ];
        let dir = tempdir()?;
        let file_path = dir.path().join("contours.geojson");
        write_geojson_collection(&contours, &file_path)?;

        let reloaded = Contour::load_geojson_collection(&file_path)?;
        assert_eq!(reloaded.len(), 2);
        for (contour, contour_reloaded) in contours.iter().zip(&reloaded) {
            assert_eq!(contour.polygon(), contour_reloaded.polygon());
        }

        dir.close()?;
        Ok(())
    }

    #[test]
    fn test_multipolygon_debris_is_dropped() -> Result<()> {
        let collection = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]],
                        [[[20, 20], [21, 20], [21, 21], [20, 20]]]
                    ]
                }
            }]
        }"#;
        let dir = tempdir()?;
        let file_path = dir.path().join("multi.geojson");
        write(&file_path, collection)?;
        let contours = Contour::load_geojson_collection(&file_path)?;
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 100.0);
        Ok(())
    }

    #[test]
    fn test_point_geometry_is_rejected() -> Result<()> {
        let collection = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [1, 2]}
            }]
        }"#;
        let dir = tempdir()?;
        let file_path = dir.path().join("point.geojson");
        write(&file_path, collection)?;
        assert!(Contour::load_geojson_collection(&file_path).is_err());
        Ok(())
    }
}
