use crate::types::{PointRecord, RawPoint};
use std::collections::HashMap;
use tracing::debug;

pub const UNKNOWN_CATEGORY: &str = "Unknown";

fn parse_coordinate(raw: &str, limit: f64) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
}

/// Coerces coordinates to numbers, silently dropping rows that do not parse.
pub fn validate_coordinates(raw: Vec<RawPoint>) -> Vec<PointRecord> {
    let total = raw.len();
    let points: Vec<PointRecord> = raw
        .into_iter()
        .filter_map(|p| {
            let latitude = parse_coordinate(&p.latitude, 90.0)?;
            let longitude = parse_coordinate(&p.longitude, 180.0)?;
            Some(PointRecord {
                id: p.id,
                latitude,
                longitude,
                category: p.category,
            })
        })
        .collect();

    if points.len() < total {
        debug!("Dropped {} rows with invalid coordinates", total - points.len());
    }
    points
}

pub fn category_label(point: &PointRecord) -> &str {
    point.category.as_deref().unwrap_or(UNKNOWN_CATEGORY)
}

/// Groups points by category in first-seen order.
pub fn group_by_category(points: Vec<PointRecord>) -> Vec<(String, Vec<PointRecord>)> {
    let mut groups: Vec<(String, Vec<PointRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for point in points {
        let label = category_label(&point).to_string();
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            groups.push((label, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(point);
    }

    groups
}
