use crate::types::{JoinedRegion, MetricRow, RegionPolygon};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Trimmed, lower-cased join key. Absent keys become the empty string.
pub fn normalize_key(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

/// Left-joins `rows` onto `regions` by normalized region name.
///
/// Every region is kept, in order. When several rows share a key the first one
/// wins; rows with an empty key or no matching region are dropped.
pub fn join_regions(regions: &[RegionPolygon], rows: Vec<MetricRow>) -> Vec<JoinedRegion> {
    let mut by_key: HashMap<String, MetricRow> = HashMap::new();
    let mut duplicates = 0usize;

    for row in rows {
        let key = normalize_key(Some(&row.region));
        if key.is_empty() {
            continue;
        }
        if by_key.contains_key(&key) {
            debug!("Ignoring repeated row for '{}'", key);
            duplicates += 1;
            continue;
        }
        by_key.insert(key, row);
    }

    if duplicates > 0 {
        warn!("{} repeated region rows ignored (first occurrence wins)", duplicates);
    }

    let joined: Vec<JoinedRegion> = regions
        .iter()
        .map(|region| {
            let values = if region.key.is_empty() {
                None
            } else {
                by_key.remove(&region.key).map(|row| row.values)
            };
            JoinedRegion {
                region: region.clone(),
                values,
            }
        })
        .collect();

    if !by_key.is_empty() {
        let mut unmatched: Vec<&String> = by_key.keys().collect();
        unmatched.sort();
        info!(
            "{} rows matched no region and were discarded: {:?}",
            unmatched.len(),
            unmatched
        );
    }

    joined
}
