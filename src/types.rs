use geo::MultiPolygon;
use std::collections::HashMap;

/// A CSV point row before coordinate coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub id: String,
    pub latitude: String,
    pub longitude: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegionPolygon {
    /// Trimmed, lower-cased region name.
    pub key: String,
    /// Region name as it appears in the boundary file.
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    /// Region name as entered in the table, before normalization.
    pub region: String,
    // Map<MetricName, Value>; absent cells are left out
    pub values: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct JoinedRegion {
    pub region: RegionPolygon,
    pub values: Option<HashMap<String, f64>>,
}

impl JoinedRegion {
    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.as_ref().and_then(|v| v.get(metric).copied())
    }
}
