use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::protocol::{CATALOG_KEY_PREFIX, LAYER_KEY_PREFIX, QUERY_KEY_PREFIX, SERVICE_KEY_PREFIX};
use shared::types::QueryOptions;

const PREFIXES: [&str; 4] = [
    CATALOG_KEY_PREFIX,
    SERVICE_KEY_PREFIX,
    LAYER_KEY_PREFIX,
    QUERY_KEY_PREFIX,
];

pub fn catalog_key(base_url: &str) -> String {
    format!("{}{}", CATALOG_KEY_PREFIX, base_url)
}

pub fn service_key(service_url: &str) -> String {
    format!("{}{}", SERVICE_KEY_PREFIX, service_url)
}

pub fn layer_key(service_url: &str, id: i64) -> String {
    format!("{}{}:{}", LAYER_KEY_PREFIX, service_url, id)
}

pub fn query_key(service_url: &str, id: i64, options: &QueryOptions) -> String {
    format!("{}{}:{}:{}", QUERY_KEY_PREFIX, service_url, id, fingerprint(options))
}

/// Hashed view of the query parameters; surrounding whitespace is ignored.
#[derive(Serialize)]
struct QueryView<'a> {
    where_clause: &'a str,
    out_fields: &'a str,
    return_geometry: bool,
    result_record_count: u32,
}

/// SHA-256 of the serialized query parameters, hex encoded.
pub fn fingerprint(options: &QueryOptions) -> String {
    let view = QueryView {
        where_clause: options.where_clause.trim(),
        out_fields: options.out_fields.trim(),
        return_geometry: options.return_geometry,
        result_record_count: options.result_record_count,
    };

    // a struct of strings, bools and integers always serializes
    let json = serde_json::to_string(&view).unwrap_or_default();

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}

/// Whether a cache key was derived from a URL under `base_url`.
pub fn belongs_to(key: &str, base_url: &str) -> bool {
    // derived URLs put segments before the base's query string
    let base_path = base_url.split('?').next().unwrap_or(base_url);
    PREFIXES
        .iter()
        .find_map(|prefix| key.strip_prefix(prefix))
        .is_some_and(|rest| rest.starts_with(base_path))
}
