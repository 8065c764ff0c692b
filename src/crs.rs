use anyhow::{bail, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use std::f64::consts::PI;
use std::fmt;

const EARTH_RADIUS: f64 = 6_378_137.0;

/// Coordinate reference systems the pipelines can reproject between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    WebMercator,
    Other(String),
}

impl Crs {
    /// Parses `EPSG:4326`, `urn:ogc:def:crs:EPSG::3857`, `OGC:CRS84` and friends.
    pub fn parse(name: &str) -> Self {
        let code = name
            .trim()
            .rsplit(':')
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_ascii_uppercase();
        match code.as_str() {
            "4326" | "CRS84" | "WGS84" => Crs::Wgs84,
            "3857" | "3785" | "900913" | "102100" | "102113" => Crs::WebMercator,
            _ => Crs::Other(name.trim().to_string()),
        }
    }

    /// Reads the projection out of an ESRI `.prj` WKT string.
    pub fn from_wkt(wkt: &str) -> Self {
        let wkt = wkt.trim();
        let name = wkt.split('"').nth(1).unwrap_or(wkt).to_string();
        if wkt.starts_with("PROJCS") {
            if ["Mercator_Auxiliary_Sphere", "Pseudo-Mercator", "Pseudo_Mercator"]
                .iter()
                .any(|m| wkt.contains(m))
            {
                return Crs::WebMercator;
            }
            return Crs::Other(name);
        }
        if wkt.starts_with("GEOGCS") && (wkt.contains("WGS_1984") || wkt.contains("WGS 84")) {
            return Crs::Wgs84;
        }
        Crs::Other(name)
    }

    /// Moves `coord` from `self` into `target`. `x` is longitude/easting.
    pub fn transform(&self, target: &Crs, coord: Coord<f64>) -> Result<Coord<f64>> {
        match (self, target) {
            (a, b) if a == b => Ok(coord),
            (Crs::Wgs84, Crs::WebMercator) => Ok(to_web_mercator(coord)),
            (Crs::WebMercator, Crs::Wgs84) => Ok(from_web_mercator(coord)),
            (a, b) => bail!(
                "No reprojection from {} to {}; convert the data or set the CRS explicitly",
                a,
                b
            ),
        }
    }

    pub fn transform_geometry(
        &self,
        target: &Crs,
        geometry: MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>> {
        if self == target {
            return Ok(geometry);
        }
        // fail before walking the coordinates
        self.transform(target, Coord { x: 0.0, y: 0.0 })?;
        geometry.try_map_coords(|c| self.transform(target, c))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
            Crs::Other(name) => write!(f, "{}", name),
        }
    }
}

fn to_web_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-85.051_128_78, 85.051_128_78).to_radians();
    Coord {
        x: EARTH_RADIUS * c.x.to_radians(),
        y: EARTH_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln(),
    }
}

fn from_web_mercator(c: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (c.x / EARTH_RADIUS).to_degrees(),
        y: (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
    }
}
