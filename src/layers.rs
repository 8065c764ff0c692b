//! Renderer-agnostic layer descriptions and the functions that build them.
//!
//! Styles are plain values computed up front; the rendering surface never
//! calls back into this crate.

use crate::processing::category_label;
use crate::types::{JoinedRegion, PointRecord};
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::json;

/// colorbrewer YlOrRd, six classes
pub const YL_OR_RD: [&str; 6] = ["#ffffb2", "#fed976", "#feb24c", "#fd8d3c", "#f03b20", "#bd0026"];
pub const NO_DATA_COLOR: &str = "#bdbdbd";
pub const HEAT_COLORS: [&str; 3] = ["yellow", "orange", "red"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Density,
    Marker,
    Choropleth,
    Tooltip,
    Outline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerData {
    /// `[latitude, longitude]` pairs.
    Coordinates { points: Vec<[f64; 2]> },
    Markers { markers: Vec<Marker> },
    Regions { features: FeatureCollection },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub location: [f64; 2],
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerStyle {
    Density {
        radius: u32,
        blur: u32,
        gradient: Vec<GradientStop>,
    },
    Marker,
    Region(RegionStyle),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientStop {
    pub stop: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
    /// `None` means each feature carries its own `fill_color` property.
    pub fill_color: Option<String>,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
    /// Whether the layer starts visible.
    pub show: bool,
    pub data: LayerData,
    pub style: LayerStyle,
}

/// Legend descriptor. With `thresholds` the scale is stepped, otherwise linear.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorScale {
    pub caption: String,
    pub colors: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub thresholds: Option<Vec<f64>>,
    /// Layer the legend belongs to; shown only while that layer is.
    pub layer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityOptions {
    pub radius: u32,
    pub blur: u32,
}

pub fn density_style(options: DensityOptions) -> LayerStyle {
    LayerStyle::Density {
        radius: options.radius,
        blur: options.blur,
        gradient: [0.2, 0.4, 0.6]
            .iter()
            .zip(HEAT_COLORS)
            .map(|(&stop, color)| GradientStop {
                stop,
                color: color.to_string(),
            })
            .collect(),
    }
}

pub fn outline_style() -> RegionStyle {
    RegionStyle {
        color: "black".to_string(),
        weight: 1.0,
        opacity: 1.0,
        fill_color: Some("black".to_string()),
        fill_opacity: 0.1,
    }
}

pub fn choropleth_style() -> RegionStyle {
    RegionStyle {
        color: "black".to_string(),
        weight: 1.0,
        opacity: 0.2,
        fill_color: None,
        fill_opacity: 0.7,
    }
}

pub fn tooltip_style() -> RegionStyle {
    RegionStyle {
        color: "transparent".to_string(),
        weight: 0.0,
        opacity: 0.0,
        fill_color: Some("transparent".to_string()),
        fill_opacity: 0.0,
    }
}

/// One density layer per category group, in group order.
pub fn density_layers(groups: &[(String, Vec<PointRecord>)], options: DensityOptions) -> Vec<LayerSpec> {
    groups
        .iter()
        .map(|(label, points)| LayerSpec {
            name: format!("{} Heatmap", label),
            kind: LayerKind::Density,
            show: true,
            data: LayerData::Coordinates {
                points: points.iter().map(|p| [p.latitude, p.longitude]).collect(),
            },
            style: density_style(options),
        })
        .collect()
}

pub fn marker_layer(name: &str, points: &[PointRecord]) -> LayerSpec {
    LayerSpec {
        name: name.to_string(),
        kind: LayerKind::Marker,
        show: true,
        data: LayerData::Markers {
            markers: points
                .iter()
                .map(|p| Marker {
                    location: [p.latitude, p.longitude],
                    tooltip: category_label(p).to_string(),
                })
                .collect(),
        },
        style: LayerStyle::Marker,
    }
}

/// Heat legend fixed to `[0, total]` filtered points, whatever the per-category density.
pub fn intensity_scale(total: usize) -> ColorScale {
    ColorScale {
        caption: "Heatmap Intensity".to_string(),
        colors: HEAT_COLORS.iter().map(|c| c.to_string()).collect(),
        min: 0.0,
        max: total as f64,
        thresholds: None,
        layer: None,
    }
}

fn region_feature(geometry: &MultiPolygon<f64>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Plain boundary overlay; `geometries` must be longitude/latitude.
pub fn outline_layer<'a>(
    name: &str,
    geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>,
) -> LayerSpec {
    let features = geometries
        .into_iter()
        .map(|g| region_feature(g, JsonObject::new()))
        .collect();
    LayerSpec {
        name: name.to_string(),
        kind: LayerKind::Outline,
        show: true,
        data: LayerData::Regions { features },
        style: LayerStyle::Region(outline_style()),
    }
}

/// Equal-width bins over the observed range of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRamp {
    pub min: f64,
    pub max: f64,
}

impl ColorRamp {
    /// `None` when there is no value to scale.
    pub fn fit(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(ColorRamp { min: v, max: v }),
            Some(r) => Some(ColorRamp {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }

    pub fn color_for(&self, value: Option<f64>) -> &'static str {
        let Some(v) = value else {
            return NO_DATA_COLOR;
        };
        let span = self.max - self.min;
        if span <= 0.0 {
            return YL_OR_RD[0];
        }
        let bins = YL_OR_RD.len();
        let idx = ((v - self.min) / span * bins as f64).floor() as usize;
        YL_OR_RD[idx.min(bins - 1)]
    }

    pub fn thresholds(&self) -> Vec<f64> {
        let bins = YL_OR_RD.len();
        let step = (self.max - self.min) / bins as f64;
        (0..=bins).map(|i| self.min + step * i as f64).collect()
    }

    pub fn legend(&self, caption: &str, layer: &str) -> ColorScale {
        ColorScale {
            caption: caption.to_string(),
            colors: YL_OR_RD.iter().map(|c| c.to_string()).collect(),
            min: self.min,
            max: self.max,
            thresholds: Some(self.thresholds()),
            layer: Some(layer.to_string()),
        }
    }
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        None => "No data".to_string(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{:.0}", v),
        Some(v) => v.to_string(),
    }
}

/// The filled layer, its tooltip overlay and its legend for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoroplethLayers {
    pub choropleth: LayerSpec,
    pub tooltip: LayerSpec,
    pub legend: Option<ColorScale>,
}

pub fn build_choropleth(
    joined: &[JoinedRegion],
    dataset: &str,
    metric: &str,
    show: bool,
) -> ChoroplethLayers {
    let ramp = ColorRamp::fit(joined.iter().filter_map(|j| j.value(metric)));
    let name = format!("{}: {}", dataset, metric);

    let mut filled = Vec::with_capacity(joined.len());
    let mut tooltips = Vec::with_capacity(joined.len());

    for region in joined {
        let value = region.value(metric);
        let fill = match &ramp {
            Some(r) => r.color_for(value),
            None => NO_DATA_COLOR,
        };

        let mut props = JsonObject::new();
        props.insert("name".to_string(), json!(region.region.name));
        props.insert("key".to_string(), json!(region.region.key));
        props.insert("value".to_string(), json!(value));
        props.insert("fill_color".to_string(), json!(fill));
        filled.push(region_feature(&region.region.geometry, props));

        let mut tip = JsonObject::new();
        tip.insert(
            "tooltip".to_string(),
            json!([
                ["District: ", region.region.name],
                [format!("{}: ", metric), format_value(value)]
            ]),
        );
        tooltips.push(region_feature(&region.region.geometry, tip));
    }

    ChoroplethLayers {
        legend: ramp.map(|r| r.legend(metric, &name)),
        tooltip: LayerSpec {
            name: format!("{} (tooltips)", name),
            kind: LayerKind::Tooltip,
            show,
            data: LayerData::Regions {
                features: tooltips.into_iter().collect(),
            },
            style: LayerStyle::Region(tooltip_style()),
        },
        choropleth: LayerSpec {
            name,
            kind: LayerKind::Choropleth,
            show,
            data: LayerData::Regions {
                features: filled.into_iter().collect(),
            },
            style: LayerStyle::Region(choropleth_style()),
        },
    }
}
