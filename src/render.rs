use crate::map::MapDocument;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const LEAFLET_HEAT_JS: &str = "https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{TITLE}}</title>
<link rel="stylesheet" href="{{LEAFLET_CSS}}">
<script src="{{LEAFLET_JS}}"></script>
<script src="{{LEAFLET_HEAT_JS}}"></script>
<style>
html, body, #map { height: 100%; margin: 0; }
.legend { background: white; padding: 6px 8px; font: 12px sans-serif; border-radius: 4px; }
.legend .bar { height: 10px; width: 240px; }
.legend .steps { display: flex; }
.legend .steps span { flex: 1; height: 10px; }
.legend .ticks { display: flex; justify-content: space-between; }
.legend-entry + .legend-entry { margin-top: 6px; }
</style>
</head>
<body>
<div id="map"></div>
<script>
const doc = {{DOCUMENT}};
const map = L.map("map").setView(doc.center, doc.zoom);

const escape = (s) => String(s).replace(/[&<>"']/g, (c) =>
  ({ "&": "&amp;", "<": "&lt;", ">": "&gt;", '"': "&quot;", "'": "&#39;" })[c]);
const fmt = (v) => Number(v).toLocaleString(undefined, { maximumFractionDigits: 2 });

const bases = {};
doc.tiles.forEach((t, i) => {
  const layer = L.tileLayer(t.url, { attribution: t.attribution, maxZoom: 19 });
  if (i === 0) layer.addTo(map);
  bases[t.name] = layer;
});

const regionStyle = (style) => (feature) => ({
  color: style.color,
  weight: style.weight,
  opacity: style.opacity,
  fillColor: style.fillColor || feature.properties.fill_color,
  fillOpacity: style.fillOpacity,
});

function build(spec) {
  switch (spec.kind) {
    case "density": {
      const gradient = {};
      spec.style.gradient.forEach((g) => { gradient[g.stop] = g.color; });
      return L.layerGroup([L.heatLayer(spec.data.points,
        { radius: spec.style.radius, blur: spec.style.blur, gradient: gradient })]);
    }
    case "marker":
      return L.layerGroup(spec.data.markers.map((m) =>
        L.marker(m.location).bindTooltip(escape(m.tooltip))));
    case "tooltip":
      return L.geoJSON(spec.data.features, {
        style: regionStyle(spec.style),
        onEachFeature: (feature, layer) => layer.bindTooltip("<table>" +
          feature.properties.tooltip.map(([k, v]) =>
            "<tr><th>" + escape(k) + "</th><td>" + escape(v) + "</td></tr>").join("") +
          "</table>", { sticky: true }),
      });
    default:
      return L.geoJSON(spec.data.features, { style: regionStyle(spec.style) });
  }
}

const overlays = {};
doc.layers.forEach((spec) => {
  const layer = build(spec);
  if (spec.show) layer.addTo(map);
  overlays[spec.name] = layer;
});
L.control.layers(bases, overlays, { collapsed: false }).addTo(map);

const legendEntries = doc.legends.map((scale) => {
  const div = L.DomUtil.create("div", "legend-entry");
  let body;
  if (scale.thresholds) {
    body = '<div class="steps">' +
      scale.colors.map((c) => '<span style="background:' + c + '"></span>').join("") +
      '</div><div class="ticks">' +
      scale.thresholds.map((t) => "<span>" + fmt(t) + "</span>").join("") + "</div>";
  } else {
    body = '<div class="bar" style="background:linear-gradient(to right,' +
      scale.colors.join(",") + ')"></div><div class="ticks"><span>' + fmt(scale.min) +
      "</span><span>" + fmt(scale.max) + "</span></div>";
  }
  div.innerHTML = "<b>" + escape(scale.caption) + "</b>" + body;
  const owner = scale.layer ? overlays[scale.layer] : null;
  div.style.display = !owner || map.hasLayer(owner) ? "" : "none";
  return { div: div, layer: scale.layer };
});

if (legendEntries.length > 0) {
  const legend = L.control({ position: "bottomright" });
  legend.onAdd = () => {
    const box = L.DomUtil.create("div", "legend");
    legendEntries.forEach((e) => box.appendChild(e.div));
    return box;
  };
  legend.addTo(map);
  const toggle = (name, visible) => legendEntries
    .filter((e) => e.layer === name)
    .forEach((e) => { e.div.style.display = visible ? "" : "none"; });
  map.on("overlayadd", (e) => toggle(e.name, true));
  map.on("overlayremove", (e) => toggle(e.name, false));
}
</script>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders `doc` as a standalone Leaflet page.
pub fn render_html(doc: &MapDocument, title: &str) -> Result<String> {
    let json = serde_json::to_string(doc).context("Failed to serialize map document")?;
    // keep the embedded JSON from closing the <script> element
    let json = json.replace("</", "<\\/");

    Ok(TEMPLATE
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{LEAFLET_CSS}}", LEAFLET_CSS)
        .replace("{{LEAFLET_JS}}", LEAFLET_JS)
        .replace("{{LEAFLET_HEAT_JS}}", LEAFLET_HEAT_JS)
        .replace("{{DOCUMENT}}", &json))
}

pub fn write_html(doc: &MapDocument, title: &str, path: &Path) -> Result<()> {
    let html = render_html(doc, title)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {:?}", dir))?;
    }
    fs::write(path, html).with_context(|| format!("Failed to write map to {:?}", path))?;
    info!(
        "Map with {} layers saved as {:?}; open it in a browser to view it",
        doc.layers.len(),
        path
    );
    Ok(())
}
