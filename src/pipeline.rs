use crate::boundary::BoundaryFilter;
use crate::config::{AppConfig, ChoroplethConfig, HeatmapConfig, MapConfig};
use crate::crs::Crs;
use crate::data;
use crate::join::join_regions;
use crate::layers::{self, ChoroplethLayers, DensityOptions};
use crate::map::MapDocument;
use crate::processing;
use crate::render;
use crate::types::{JoinedRegion, PointRecord};
use anyhow::{anyhow, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{info, warn};

pub const BOUNDARY_LAYER: &str = "District Boundaries";

fn mean_center(points: &[PointRecord]) -> Option<[f64; 2]> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let lat = points.iter().map(|p| p.latitude).sum::<f64>() / n;
    let lon = points.iter().map(|p| p.longitude).sum::<f64>() / n;
    Some([lat, lon])
}

pub fn build_heatmap(map: &MapConfig, config: &HeatmapConfig) -> Result<MapDocument> {
    // 1. Load and validate points
    let raw = data::load_points(config)?;
    let points = processing::validate_coordinates(raw);

    // 2. Keep points inside the district boundaries
    let boundaries = data::load_boundaries(&config.boundaries, None, config.boundary_crs.as_deref())?;
    let filter = BoundaryFilter::new(boundaries.geometries(), boundaries.crs.clone());
    let filtered = filter.retain_within(points, &Crs::Wgs84)?;
    let display = boundaries.into_wgs84()?;

    let center = match mean_center(&filtered) {
        Some(center) => center,
        None => {
            warn!("No point lies within the boundaries; centering on the districts instead");
            filter
                .centroid()
                .map(|c| filter.crs().transform(&Crs::Wgs84, c.0))
                .transpose()?
                .map(|c| [c.y, c.x])
                .unwrap_or([0.0, 0.0])
        }
    };

    // 3. Assemble layers
    let mut doc = MapDocument::new(center, map.zoom_start);
    doc.add_tiles(&map.tiles);
    doc.add_layer(layers::outline_layer(BOUNDARY_LAYER, display.geometries()));

    let total = filtered.len();
    let markers = layers::marker_layer(&config.marker_layer, &filtered);
    let groups = processing::group_by_category(filtered);
    info!("{} points in {} categories", total, groups.len());

    let options = DensityOptions {
        radius: config.radius,
        blur: config.blur,
    };
    doc.add_layers(layers::density_layers(&groups, options));
    doc.add_layer(markers);
    doc.add_legend(layers::intensity_scale(total));

    Ok(doc)
}

pub fn build_choropleth(map: &MapConfig, config: &ChoroplethConfig) -> Result<MapDocument> {
    let regions = data::load_regions(config)?;
    let selections = config.effective_selections();

    // Each dataset is read and joined once, with just the metrics selected from it
    let mut joined: HashMap<&str, Vec<JoinedRegion>> = HashMap::new();
    for selection in &selections {
        if joined.contains_key(selection.dataset.as_str()) {
            continue;
        }
        let dataset = config
            .dataset(&selection.dataset)
            .ok_or_else(|| anyhow!("Unknown dataset '{}'", selection.dataset))?;
        let mut metrics: Vec<String> = Vec::new();
        for s in selections.iter().filter(|s| s.dataset == selection.dataset) {
            if !metrics.contains(&s.metric) {
                metrics.push(s.metric.clone());
            }
        }

        let rows = data::load_metric_table(
            &dataset.path,
            config.encoding,
            &config.region_column,
            &metrics,
        )?;
        joined.insert(selection.dataset.as_str(), join_regions(&regions, rows));
    }

    let built: Vec<ChoroplethLayers> = selections
        .par_iter()
        .enumerate()
        .map(|(i, s)| {
            layers::build_choropleth(&joined[s.dataset.as_str()], &s.dataset, &s.metric, i == 0)
        })
        .collect();

    let mut doc = MapDocument::new(config.center, map.zoom_start);
    doc.add_tiles(&map.tiles);
    for ChoroplethLayers {
        choropleth,
        tooltip,
        legend,
    } in built
    {
        doc.add_layer(choropleth);
        doc.add_layer(tooltip);
        if let Some(legend) = legend {
            doc.add_legend(legend);
        }
    }

    Ok(doc)
}

pub fn run_heatmap(config: &AppConfig) -> Result<()> {
    let heatmap = config.heatmap()?;
    let doc = build_heatmap(&config.map, heatmap)?;
    render::write_html(&doc, "Heatmap", &heatmap.output)
}

pub fn run_choropleth(config: &AppConfig) -> Result<()> {
    let choropleth = config.choropleth()?;
    let doc = build_choropleth(&config.map, choropleth)?;
    render::write_html(&doc, "District Map", &choropleth.output)
}
