//! Conversions of a query result into downloadable formats.

use serde_json::{json, Map, Value};
use shared::types::QueryResult;

/// Export format accepted by the query endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    GeoJson,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::GeoJson => "application/geo+json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

pub fn to_json(result: &QueryResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}

/// One GeoJSON Feature per ArcGIS feature, attributes as properties.
pub fn to_geojson(result: &QueryResult) -> Value {
    let features: Vec<Value> = result
        .features
        .iter()
        .map(|feature| {
            json!({
                "type": "Feature",
                "properties": Value::Object(feature.attributes.clone()),
                "geometry": feature.geometry.as_ref().map_or(Value::Null, esri_to_geojson),
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Map an Esri JSON geometry onto the matching GeoJSON type. Ring orientation
/// and hole assignment are left as the server sent them.
fn esri_to_geojson(geometry: &Value) -> Value {
    let Some(obj) = geometry.as_object() else {
        return Value::Null;
    };

    if let (Some(x), Some(y)) = (obj.get("x"), obj.get("y")) {
        if x.is_null() || y.is_null() {
            return Value::Null;
        }
        return json!({"type": "Point", "coordinates": [x, y]});
    }

    if let Some(points) = obj.get("points") {
        return json!({"type": "MultiPoint", "coordinates": points});
    }

    if let Some(Value::Array(paths)) = obj.get("paths") {
        return match paths.as_slice() {
            [single] => json!({"type": "LineString", "coordinates": single}),
            _ => json!({"type": "MultiLineString", "coordinates": paths}),
        };
    }

    if let Some(rings) = obj.get("rings") {
        return json!({"type": "Polygon", "coordinates": rings});
    }

    Value::Null
}

/// CSV with one column per attribute name, in first-seen order.
pub fn to_csv(result: &QueryResult) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for feature in &result.features {
        for key in feature.attributes.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut out = String::new();
    push_row(&mut out, columns.iter().map(|c| c.to_string()));
    for feature in &result.features {
        push_row(
            &mut out,
            columns.iter().map(|c| cell(&feature.attributes, c)),
        );
    }
    out
}

fn cell(attributes: &Map<String, Value>, column: &str) -> String {
    match attributes.get(column) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let row: Vec<String> = cells.map(|c| escape(&c)).collect();
    out.push_str(&row.join(","));
    out.push_str("\r\n");
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
