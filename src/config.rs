use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const OSM_TILES: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
pub const OSM_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub map: MapConfig,
    pub heatmap: Option<HeatmapConfig>,
    pub choropleth: Option<ChoroplethConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_zoom")]
    pub zoom_start: u8,
    /// Extra base layers offered after OpenStreetMap.
    #[serde(default)]
    pub tiles: Vec<TileConfig>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom_start: default_zoom(),
            tiles: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TileConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub attribution: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeatmapConfig {
    pub points_csv: PathBuf,
    pub boundaries: PathBuf,
    #[serde(default = "default_heatmap_output")]
    pub output: PathBuf,
    #[serde(default = "default_latitude_column")]
    pub latitude_column: String,
    #[serde(default = "default_longitude_column")]
    pub longitude_column: String,
    pub category_column: Option<String>,
    pub id_column: Option<String>,
    pub boundary_crs: Option<String>,
    #[serde(default = "default_radius")]
    pub radius: u32,
    #[serde(default = "default_blur")]
    pub blur: u32,
    #[serde(default = "default_marker_layer")]
    pub marker_layer: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChoroplethConfig {
    pub boundaries: PathBuf,
    pub region_property: String,
    pub region_column: String,
    /// `[latitude, longitude]`
    pub center: [f64; 2],
    #[serde(default = "default_choropleth_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub encoding: Encoding,
    pub boundary_crs: Option<String>,
    pub metrics: Vec<String>,
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub selections: Vec<SelectionConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DatasetConfig {
    pub label: String,
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SelectionConfig {
    pub dataset: String,
    pub metric: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    #[serde(alias = "iso-8859-1")]
    Latin1,
}

fn default_zoom() -> u8 {
    6
}
fn default_heatmap_output() -> PathBuf {
    PathBuf::from("heatmap.html")
}
fn default_choropleth_output() -> PathBuf {
    PathBuf::from("choropleth.html")
}
fn default_latitude_column() -> String {
    "Latitude".to_string()
}
fn default_longitude_column() -> String {
    "Longitude".to_string()
}
fn default_radius() -> u32 {
    10
}
fn default_blur() -> u32 {
    15
}
fn default_marker_layer() -> String {
    "Waterbody Locations".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        if let Some(choropleth) = &config.choropleth {
            choropleth.validate()?;
        }
        Ok(config)
    }

    pub fn heatmap(&self) -> Result<&HeatmapConfig> {
        self.heatmap
            .as_ref()
            .ok_or_else(|| anyhow!("Configuration has no [heatmap] section"))
    }

    pub fn choropleth(&self) -> Result<&ChoroplethConfig> {
        self.choropleth
            .as_ref()
            .ok_or_else(|| anyhow!("Configuration has no [choropleth] section"))
    }

    /// Makes relative input and output paths relative to `base`.
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(h) = &mut self.heatmap {
            resolve(&mut h.points_csv);
            resolve(&mut h.boundaries);
            resolve(&mut h.output);
        }
        if let Some(c) = &mut self.choropleth {
            resolve(&mut c.boundaries);
            resolve(&mut c.output);
            for d in &mut c.datasets {
                resolve(&mut d.path);
            }
        }
    }
}

impl ChoroplethConfig {
    fn validate(&self) -> Result<()> {
        if self.datasets.is_empty() {
            bail!("[choropleth] declares no datasets");
        }
        if self.metrics.is_empty() {
            bail!("[choropleth] declares no metrics");
        }
        for s in &self.selections {
            if self.dataset(&s.dataset).is_none() {
                bail!("Selection refers to unknown dataset '{}'", s.dataset);
            }
            if !self.metrics.contains(&s.metric) {
                bail!("Selection refers to unknown metric '{}'", s.metric);
            }
        }
        Ok(())
    }

    pub fn dataset(&self, label: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.label == label)
    }

    /// Configured selections, or the first dataset with the first metric.
    pub fn effective_selections(&self) -> Vec<SelectionConfig> {
        if !self.selections.is_empty() {
            return self.selections.clone();
        }
        match (self.datasets.first(), self.metrics.first()) {
            (Some(d), Some(m)) => vec![SelectionConfig {
                dataset: d.label.clone(),
                metric: m.clone(),
            }],
            _ => Vec::new(),
        }
    }
}
