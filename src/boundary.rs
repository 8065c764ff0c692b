use crate::crs::Crs;
use crate::types::PointRecord;
use anyhow::{Context, Result};
use geo::bounding_rect::BoundingRect;
use geo::{BooleanOps, Centroid, Contains, Coord, MultiPolygon, Point, Polygon};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

pub struct BoundaryPolygon(Polygon<f64>);

impl RTreeObject for BoundaryPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        match self.0.bounding_rect() {
            Some(bbox) => {
                AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y])
            }
            // empty polygons never contain anything
            None => AABB::from_corners([f64::MAX, f64::MAX], [f64::MAX, f64::MAX]),
        }
    }
}

/// Keeps points strictly inside the union of a set of boundary polygons.
pub struct BoundaryFilter {
    crs: Crs,
    union: MultiPolygon<f64>,
    tree: RTree<BoundaryPolygon>,
}

impl BoundaryFilter {
    pub fn new<'a>(boundaries: impl IntoIterator<Item = &'a MultiPolygon<f64>>, crs: Crs) -> Self {
        let union = boundaries
            .into_iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, mp| acc.union(mp));

        info!("Building spatial index for {} boundary polygons...", union.0.len());
        let tree = RTree::bulk_load(union.0.iter().cloned().map(BoundaryPolygon).collect());

        Self { crs, union, tree }
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Whether `coord`, already in the boundary CRS, lies in the interior.
    pub fn contains(&self, coord: Coord<f64>) -> bool {
        let point = Point::from(coord);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([coord.x, coord.y]))
            .any(|candidate| candidate.0.contains(&point))
    }

    /// Retains the points inside the boundary, in order.
    ///
    /// Points given in another CRS are reprojected first; a CRS pair without a
    /// known transformation is an error rather than an empty result.
    pub fn retain_within(&self, points: Vec<PointRecord>, points_crs: &Crs) -> Result<Vec<PointRecord>> {
        let total = points.len();
        let projected = points
            .iter()
            .map(|p| {
                points_crs.transform(
                    &self.crs,
                    Coord {
                        x: p.longitude,
                        y: p.latitude,
                    },
                )
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| {
                format!(
                    "Points ({}) and boundaries ({}) use different coordinate systems",
                    points_crs, self.crs
                )
            })?;

        let keep: Vec<bool> = projected.par_iter().map(|&c| self.contains(c)).collect();
        let kept: Vec<PointRecord> = points
            .into_iter()
            .zip(keep)
            .filter_map(|(p, inside)| inside.then_some(p))
            .collect();

        info!("{} of {} points lie within the boundary", kept.len(), total);
        Ok(kept)
    }

    /// Centroid of the unioned boundary in its own CRS.
    pub fn centroid(&self) -> Option<Point<f64>> {
        self.union.centroid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(min: f64, max: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max)
        ]])
    }

    fn at(id: &str, lat: f64, lon: f64) -> PointRecord {
        PointRecord {
            id: id.to_string(),
            latitude: lat,
            longitude: lon,
            category: None,
        }
    }

    fn ids(points: &[PointRecord]) -> Vec<&str> {
        points.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn keeps_only_interior_points() {
        let squares = [square(0.0, 10.0)];
        let filter = BoundaryFilter::new(&squares, Crs::Wgs84);
        let kept = filter
            .retain_within(
                vec![at("in", 5.0, 5.0), at("out", 15.0, 15.0), at("edge", 0.0, 5.0)],
                &Crs::Wgs84,
            )
            .unwrap();
        assert_eq!(ids(&kept), vec!["in"]);
    }

    #[test]
    fn shared_edges_are_inside_the_union() {
        let halves = [
            MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 10.0), (x: 0.0, y: 10.0)
            ]]),
            MultiPolygon::new(vec![polygon![
                (x: 5.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 5.0, y: 10.0)
            ]]),
        ];
        let filter = BoundaryFilter::new(&halves, Crs::Wgs84);
        assert!(filter.contains(Coord { x: 5.0, y: 5.0 }));
        assert!(!filter.contains(Coord { x: 10.0, y: 5.0 }));
    }

    #[test]
    fn filtering_is_idempotent() {
        let squares = [square(0.0, 10.0), square(20.0, 30.0)];
        let filter = BoundaryFilter::new(&squares, Crs::Wgs84);
        let points = vec![
            at("a", 5.0, 5.0),
            at("b", 25.0, 25.0),
            at("c", 15.0, 15.0),
            at("d", 1.0, 9.0),
        ];
        let once = filter.retain_within(points, &Crs::Wgs84).unwrap();
        assert_eq!(ids(&once), vec!["a", "b", "d"]);
        let twice = filter.retain_within(once.clone(), &Crs::Wgs84).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn reprojects_points_into_boundary_crs() {
        let wgs84 = square(0.0, 10.0);
        let mercator = Crs::Wgs84.transform_geometry(&Crs::WebMercator, wgs84).unwrap();
        let filter = BoundaryFilter::new([&mercator], Crs::WebMercator);
        let kept = filter
            .retain_within(vec![at("in", 5.0, 5.0), at("out", 15.0, 5.0)], &Crs::Wgs84)
            .unwrap();
        assert_eq!(ids(&kept), vec!["in"]);
    }

    #[test]
    fn unknown_crs_mismatch_is_reported() {
        let squares = [square(0.0, 10.0)];
        let filter = BoundaryFilter::new(&squares, Crs::parse("EPSG:32644"));
        let err = filter
            .retain_within(vec![at("a", 5.0, 5.0)], &Crs::Wgs84)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("EPSG:32644"));
    }

    #[test]
    fn empty_boundary_keeps_nothing() {
        let filter = BoundaryFilter::new(std::iter::empty(), Crs::Wgs84);
        let kept = filter.retain_within(vec![at("a", 1.0, 1.0)], &Crs::Wgs84).unwrap();
        assert!(kept.is_empty());
        assert!(filter.centroid().is_none());
    }
}
