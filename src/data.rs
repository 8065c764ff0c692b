use crate::config::{ChoroplethConfig, Encoding, HeatmapConfig};
use crate::crs::Crs;
use crate::join::normalize_key;
use crate::types::{MetricRow, RawPoint, RegionPolygon};
use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use geo::MultiPolygon;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Polygons read from a boundary file, in the CRS the file declares.
#[derive(Debug, Clone)]
pub struct Boundaries {
    pub crs: Crs,
    pub features: Vec<BoundaryFeature>,
}

#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub name: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

impl Boundaries {
    pub fn geometries(&self) -> impl Iterator<Item = &MultiPolygon<f64>> {
        self.features.iter().map(|f| &f.geometry)
    }

    /// Reprojects every feature to longitude/latitude for display.
    pub fn into_wgs84(self) -> Result<Boundaries> {
        let crs = self.crs;
        let features = self
            .features
            .into_iter()
            .map(|f| {
                Ok(BoundaryFeature {
                    name: f.name,
                    geometry: crs.transform_geometry(&Crs::Wgs84, f.geometry)?,
                })
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to reproject boundaries from {}", crs))?;
        Ok(Boundaries {
            crs: Crs::Wgs84,
            features,
        })
    }
}

fn read_text(path: &Path, encoding: Encoding) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    match encoding {
        Encoding::Utf8 => {
            String::from_utf8(bytes).with_context(|| format!("CSV file is not UTF-8: {:?}", path))
        }
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| anyhow!("Column '{}' not found in CSV {:?}", name, path))
}

fn optional_field(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

pub fn load_points(config: &HeatmapConfig) -> Result<Vec<RawPoint>> {
    let path = &config.points_csv;
    let text = read_text(path, Encoding::Utf8)?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .clone();

    let lat_idx = column_index(&headers, &config.latitude_column, path)?;
    let lon_idx = column_index(&headers, &config.longitude_column, path)?;
    let category_idx = config
        .category_column
        .as_deref()
        .map(|c| column_index(&headers, c, path))
        .transpose()?;
    let id_idx = config
        .id_column
        .as_deref()
        .map(|c| column_index(&headers, c, path))
        .transpose()?;

    let mut points = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        points.push(RawPoint {
            id: optional_field(&record, id_idx).unwrap_or_else(|| (row + 1).to_string()),
            latitude: record.get(lat_idx).unwrap_or("").to_string(),
            longitude: record.get(lon_idx).unwrap_or("").to_string(),
            category: optional_field(&record, category_idx),
        });
    }

    info!("Loaded {} point rows from {:?}", points.len(), path);
    Ok(points)
}

/// Reads a metric table keeping only `region_column` and `metrics`.
pub fn load_metric_table(
    path: &Path,
    encoding: Encoding,
    region_column: &str,
    metrics: &[String],
) -> Result<Vec<MetricRow>> {
    let text = read_text(path, encoding)?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .clone();

    let region_idx = column_index(&headers, region_column, path)?;
    let metric_indices = metrics
        .iter()
        .map(|m| Ok((m.as_str(), column_index(&headers, m, path)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut quarantined = 0usize;

    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        let mut values = HashMap::new();
        for &(metric, idx) in &metric_indices {
            let cell = record.get(idx).unwrap_or("").trim();
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) if v.is_finite() => {
                    values.insert(metric.to_string(), v);
                }
                _ => {
                    debug!("Non-numeric '{}' in column '{}' of {:?}", cell, metric, path);
                    quarantined += 1;
                }
            }
        }
        rows.push(MetricRow {
            region: record.get(region_idx).unwrap_or("").to_string(),
            values,
        });
    }

    if quarantined > 0 {
        warn!(
            "{} non-numeric metric cells in {:?} treated as missing",
            quarantined, path
        );
    }
    info!("Loaded {} metric rows from {:?}", rows.len(), path);
    Ok(rows)
}

/// Loads polygon boundaries from a Shapefile or GeoJSON file.
pub fn load_boundaries(
    path: &Path,
    name_property: Option<&str>,
    crs_override: Option<&str>,
) -> Result<Boundaries> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary file has no extension: {:?}", path))?;

    let mut boundaries = match extension.as_str() {
        "shp" => load_shapefile(path, name_property)?,
        "json" | "geojson" => load_geojson(path, name_property)?,
        _ => bail!("Unsupported geometry format: {}", extension),
    };

    if let Some(name) = crs_override {
        boundaries.crs = Crs::parse(name);
    } else if let Crs::Other(name) = &boundaries.crs {
        if name.is_empty() {
            bail!(
                "Cannot determine the CRS of {:?}; add a .prj file or set boundary_crs",
                path
            );
        }
    }

    info!(
        "Loaded {} boundary polygons from {:?} ({})",
        boundaries.features.len(),
        path,
        boundaries.crs
    );
    Ok(boundaries)
}

fn load_shapefile(path: &Path, name_property: Option<&str>) -> Result<Boundaries> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let prj = path.with_extension("prj");
    let crs = match fs::read_to_string(&prj) {
        Ok(wkt) => Crs::from_wkt(&wkt),
        Err(_) => Crs::Other(String::new()),
    };

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) =
            result.with_context(|| format!("Failed to read Shapefile record: {:?}", path))?;

        let name = match name_property {
            Some(field) => match record.get(field) {
                Some(shapefile::dbase::FieldValue::Character(s)) => s.clone(),
                Some(shapefile::dbase::FieldValue::Numeric(n)) => n.map(|n| n.to_string()),
                Some(_) => bail!("Shapefile field '{}' must be text or numeric", field),
                None => bail!("Field '{}' not found in Shapefile {:?}", field, path),
            },
            None => None,
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            other => {
                warn!("Skipping non-polygon shape {:?}", other.shapetype());
                continue;
            }
        };

        features.push(BoundaryFeature { name, geometry });
    }

    Ok(Boundaries { crs, features })
}

fn load_geojson(path: &Path, name_property: Option<&str>) -> Result<Boundaries> {
    use geojson::GeoJson;

    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => bail!("GeoJSON must be a FeatureCollection: {:?}", path),
    };

    // legacy (pre RFC 7946) files name their CRS; everything else is WGS84
    let crs = collection
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(|n| n.as_str())
        .map(Crs::parse)
        .unwrap_or(Crs::Wgs84);

    let mut features = Vec::new();
    let mut skipped = 0usize;

    for feature in collection.features {
        let name = name_property.and_then(|prop| {
            match feature.properties.as_ref().and_then(|p| p.get(prop)) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        });

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match value {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        features.push(BoundaryFeature { name, geometry });
    }

    if skipped > 0 {
        warn!("Skipped {} features without polygon geometry in {:?}", skipped, path);
    }

    Ok(Boundaries { crs, features })
}

/// Loads the choropleth regions, keyed by normalized name and in WGS84.
pub fn load_regions(config: &ChoroplethConfig) -> Result<Vec<RegionPolygon>> {
    let boundaries = load_boundaries(
        &config.boundaries,
        Some(config.region_property.as_str()),
        config.boundary_crs.as_deref(),
    )?
    .into_wgs84()?;

    let regions: Vec<RegionPolygon> = boundaries
        .features
        .into_iter()
        .map(|f| RegionPolygon {
            key: normalize_key(f.name.as_deref()),
            name: f.name.unwrap_or_default(),
            geometry: f.geometry,
        })
        .collect();

    check_unique_keys(&regions)
        .with_context(|| format!("Invalid region boundaries in {:?}", config.boundaries))?;
    Ok(regions)
}

/// Two regions normalizing to the same name cannot be told apart by the join.
pub fn check_unique_keys(regions: &[RegionPolygon]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut unnamed = 0usize;
    for region in regions {
        if region.key.is_empty() {
            unnamed += 1;
        } else if !seen.insert(region.key.as_str()) {
            bail!("Duplicate region name after normalization: '{}'", region.key);
        }
    }
    if unnamed > 0 {
        warn!("{} regions have no name and will not match any row", unnamed);
    }
    Ok(())
}
