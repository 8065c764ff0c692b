use crate::config::{TileConfig, OSM_ATTRIBUTION, OSM_TILES};
use crate::layers::{ColorScale, LayerSpec};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub name: String,
    pub url: String,
    pub attribution: String,
}

impl From<&TileConfig> for TileLayer {
    fn from(tile: &TileConfig) -> Self {
        Self {
            name: tile.name.clone(),
            url: tile.url.clone(),
            attribution: tile.attribution.clone(),
        }
    }
}

/// Everything the rendering surface needs to draw one map.
///
/// A pipeline owns one document, passes it by `&mut` to each stage that adds
/// to it, then hands it to [`crate::render::write_html`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDocument {
    /// `[latitude, longitude]`
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles: Vec<TileLayer>,
    pub layers: Vec<LayerSpec>,
    pub legends: Vec<ColorScale>,
}

impl MapDocument {
    /// A document with OpenStreetMap as the default base layer.
    pub fn new(center: [f64; 2], zoom: u8) -> Self {
        Self {
            center,
            zoom,
            tiles: vec![TileLayer {
                name: "OpenStreetMap".to_string(),
                url: OSM_TILES.to_string(),
                attribution: OSM_ATTRIBUTION.to_string(),
            }],
            layers: Vec::new(),
            legends: Vec::new(),
        }
    }

    pub fn add_tiles<'a>(&mut self, tiles: impl IntoIterator<Item = &'a TileConfig>) {
        self.tiles.extend(tiles.into_iter().map(TileLayer::from));
    }

    pub fn add_layer(&mut self, layer: LayerSpec) {
        self.layers.push(layer);
    }

    pub fn add_layers(&mut self, layers: impl IntoIterator<Item = LayerSpec>) {
        self.layers.extend(layers);
    }

    pub fn add_legend(&mut self, legend: ColorScale) {
        self.legends.push(legend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{intensity_scale, marker_layer};

    #[test]
    fn keeps_layers_in_insertion_order() {
        let mut doc = MapDocument::new([27.0, 80.0], 6);
        doc.add_tiles(&[TileConfig {
            name: "Google Maps".into(),
            url: "https://mt1.google.com/vt/lyrs=m&x={x}&y={y}&z={z}".into(),
            attribution: "Google Maps".into(),
        }]);
        doc.add_layer(marker_layer("second", &[]));
        doc.add_layers([marker_layer("third", &[]), marker_layer("fourth", &[])]);
        doc.layers.insert(0, marker_layer("first", &[]));
        doc.add_legend(intensity_scale(0));

        let names: Vec<&str> = doc.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third", "fourth"]);
        assert_eq!(doc.tiles[0].name, "OpenStreetMap");
        assert_eq!(doc.tiles[1].name, "Google Maps");
        assert_eq!(doc.legends.len(), 1);
    }
}
