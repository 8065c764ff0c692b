use district_maps::config::AppConfig;
use district_maps::layers::{LayerData, LayerKind, LayerSpec, NO_DATA_COLOR, YL_OR_RD};
use district_maps::pipeline;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

const DISTRICTS: &str = r#"{"type":"FeatureCollection","features":[
    {"type":"Feature","properties":{"district":"A"},
     "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
    {"type":"Feature","properties":{"district":" B "},
     "geometry":{"type":"Polygon","coordinates":[[[20,20],[30,20],[30,30],[20,30],[20,20]]]}}
]}"#;

const POINTS: &str = "\
Id,Latitude,Longitude,Waterbody
p1,5,5,Pond
p2,25,25,Lake
p3,15,15,Pond
p4,bad,5,Pond
p5,5,0,Lake
p6,6,6,
";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn names(layers: &[LayerSpec]) -> Vec<&str> {
    layers.iter().map(|l| l.name.as_str()).collect()
}

fn property(layer: &LayerSpec, feature: usize, key: &str) -> Value {
    match &layer.data {
        LayerData::Regions { features } => features.features[feature]
            .property(key)
            .cloned()
            .unwrap_or(Value::Null),
        other => panic!("expected regions, got {:?}", other),
    }
}

fn heatmap_fixture(dir: &Path, extra: &str) -> AppConfig {
    write(dir, "up_districts.geojson", DISTRICTS);
    write(dir, "Book1.csv", POINTS);
    write(
        dir,
        "config.toml",
        &format!(
            r#"
[map]
zoom_start = 7

[[map.tiles]]
name = "Google Maps"
url = "https://mt1.google.com/vt/lyrs=m&x={{x}}&y={{y}}&z={{z}}"
attribution = "Google Maps"

[heatmap]
points_csv = "Book1.csv"
boundaries = "up_districts.geojson"
output = "out/heatmap.html"
category_column = "Waterbody"
id_column = "Id"
{extra}
"#
        ),
    );
    AppConfig::load_from_file(&dir.join("config.toml")).unwrap()
}

#[test]
fn heatmap_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = heatmap_fixture(dir.path(), "");

    let doc = pipeline::build_heatmap(&config.map, config.heatmap().unwrap()).unwrap();

    assert_eq!(doc.zoom, 7);
    assert_eq!(doc.tiles.len(), 2);
    assert_eq!(
        names(&doc.layers),
        vec![
            "District Boundaries",
            "Pond Heatmap",
            "Lake Heatmap",
            "Unknown Heatmap",
            "Waterbody Locations"
        ]
    );
    assert_eq!(doc.center, [12.0, 12.0]);

    match &doc.layers[1].data {
        LayerData::Coordinates { points } => assert_eq!(points, &vec![[5.0, 5.0]]),
        other => panic!("unexpected data {:?}", other),
    }
    match &doc.layers[4].data {
        LayerData::Markers { markers } => {
            let tips: Vec<&str> = markers.iter().map(|m| m.tooltip.as_str()).collect();
            assert_eq!(tips, vec!["Pond", "Lake", "Unknown"]);
        }
        other => panic!("unexpected data {:?}", other),
    }

    assert_eq!(doc.legends.len(), 1);
    assert_eq!(doc.legends[0].max, 3.0);

    pipeline::run_heatmap(&config).unwrap();
    let html = fs::read_to_string(dir.path().join("out/heatmap.html")).unwrap();
    assert!(html.contains("Pond Heatmap"));
    assert!(html.contains("leaflet-heat.js"));
}

#[test]
fn heatmap_reprojects_points_for_mercator_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    // same districts in EPSG:3857
    let r = 6_378_137.0_f64;
    let merc = |lon: f64, lat: f64| {
        [
            r * lon.to_radians(),
            r * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
        ]
    };
    let ring = |min: f64, max: f64| {
        json!([[
            merc(min, min),
            merc(max, min),
            merc(max, max),
            merc(min, max),
            merc(min, min)
        ]])
    };
    let districts = json!({
        "type": "FeatureCollection",
        "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
        "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": ring(0.0, 10.0)}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": ring(20.0, 30.0)}}
        ]
    });

    let config = heatmap_fixture(dir.path(), "");
    write(dir.path(), "up_districts.geojson", &districts.to_string());

    let doc = pipeline::build_heatmap(&config.map, config.heatmap().unwrap()).unwrap();
    match &doc.layers.last().unwrap().data {
        LayerData::Markers { markers } => assert_eq!(markers.len(), 3),
        other => panic!("unexpected data {:?}", other),
    }
    // outline drawn back in longitude/latitude
    let outline = serde_json::to_value(&doc.layers[0]).unwrap();
    let first = &outline["data"]["features"]["features"][0]["geometry"]["coordinates"][0][0][0];
    let x = first[0].as_f64().unwrap();
    assert!(x.abs() < 1e-6 || (x - 10.0).abs() < 1e-6);
}

#[test]
fn heatmap_with_unknown_crs_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = heatmap_fixture(dir.path(), r#"boundary_crs = "EPSG:32644""#);

    let err = pipeline::run_heatmap(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("EPSG:32644"));
    assert!(!dir.path().join("out/heatmap.html").exists());
}

#[test]
fn missing_points_file_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = heatmap_fixture(dir.path(), "");
    fs::remove_file(dir.path().join("Book1.csv")).unwrap();

    let err = pipeline::run_heatmap(&config).unwrap_err();
    assert!(format!("{:#}", err).contains("Book1.csv"));
}

fn choropleth_fixture(dir: &Path, selections: &str) -> AppConfig {
    write(dir, "up_districts.geojson", DISTRICTS);
    write(dir, "dataa.csv", "District,Fire Hazard,Drowning\na,5,1\nc,7,2\n");
    write(dir, "datab.csv", "District,Fire Hazard,Drowning\n b,3,\n");
    write(
        dir,
        "config.toml",
        &format!(
            r#"
[choropleth]
boundaries = "up_districts.geojson"
region_property = "district"
region_column = "District"
center = [27.0, 80.0]
output = "up_district_map_with_tooltips.html"
metrics = ["Fire Hazard", "Drowning"]

[[choropleth.datasets]]
label = "Data A"
path = "dataa.csv"

[[choropleth.datasets]]
label = "Data B"
path = "datab.csv"
{selections}
"#
        ),
    );
    AppConfig::load_from_file(&dir.join("config.toml")).unwrap()
}

#[test]
fn choropleth_left_join_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let config = choropleth_fixture(dir.path(), "");

    let doc = pipeline::build_choropleth(&config.map, config.choropleth().unwrap()).unwrap();

    assert_eq!(doc.center, [27.0, 80.0]);
    assert_eq!(
        names(&doc.layers),
        vec!["Data A: Fire Hazard", "Data A: Fire Hazard (tooltips)"]
    );
    let filled = &doc.layers[0];
    assert_eq!(filled.kind, LayerKind::Choropleth);
    assert_eq!(property(filled, 0, "value"), json!(5.0));
    assert_eq!(property(filled, 1, "value"), Value::Null);
    assert_eq!(property(filled, 0, "fill_color"), json!(YL_OR_RD[0]));
    assert_eq!(property(filled, 1, "fill_color"), json!(NO_DATA_COLOR));
    assert_eq!(
        property(&doc.layers[1], 1, "tooltip"),
        json!([["District: ", " B "], ["Fire Hazard: ", "No data"]])
    );

    pipeline::run_choropleth(&config).unwrap();
    assert!(dir.path().join("up_district_map_with_tooltips.html").exists());
}

#[test]
fn choropleth_builds_every_selection_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = choropleth_fixture(
        dir.path(),
        r#"
[[choropleth.selections]]
dataset = "Data B"
metric = "Fire Hazard"

[[choropleth.selections]]
dataset = "Data A"
metric = "Drowning"

[[choropleth.selections]]
dataset = "Data B"
metric = "Drowning"
"#,
    );

    let doc = pipeline::build_choropleth(&config.map, config.choropleth().unwrap()).unwrap();

    let choropleths: Vec<&LayerSpec> = doc
        .layers
        .iter()
        .filter(|l| l.kind == LayerKind::Choropleth)
        .collect();
    assert_eq!(
        names(&doc.layers),
        vec![
            "Data B: Fire Hazard",
            "Data B: Fire Hazard (tooltips)",
            "Data A: Drowning",
            "Data A: Drowning (tooltips)",
            "Data B: Drowning",
            "Data B: Drowning (tooltips)"
        ]
    );
    let shown: Vec<bool> = doc.layers.iter().map(|l| l.show).collect();
    assert_eq!(shown, vec![true, true, false, false, false, false]);

    assert_eq!(property(choropleths[0], 0, "value"), Value::Null);
    assert_eq!(property(choropleths[0], 1, "value"), json!(3.0));
    assert_eq!(property(choropleths[1], 0, "value"), json!(1.0));

    // Data B has no Drowning values, so it has no legend
    let captions: Vec<(&str, Option<&str>)> = doc
        .legends
        .iter()
        .map(|l| (l.caption.as_str(), l.layer.as_deref()))
        .collect();
    assert_eq!(
        captions,
        vec![
            ("Fire Hazard", Some("Data B: Fire Hazard")),
            ("Drowning", Some("Data A: Drowning"))
        ]
    );
}

#[test]
fn choropleth_rejects_duplicate_region_names() {
    let dir = tempfile::tempdir().unwrap();
    let config = choropleth_fixture(dir.path(), "");
    write(
        dir.path(),
        "up_districts.geojson",
        &DISTRICTS.replace("\" B \"", "\"a\""),
    );

    let err = pipeline::build_choropleth(&config.map, config.choropleth().unwrap()).unwrap_err();
    assert!(format!("{:#}", err).contains("Duplicate region name"));
}

#[test]
fn subcommand_needs_its_section() {
    let dir = tempfile::tempdir().unwrap();
    let config = choropleth_fixture(dir.path(), "");
    let err = pipeline::run_heatmap(&config).unwrap_err();
    assert!(err.to_string().contains("[heatmap]"));
}
