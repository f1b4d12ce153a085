#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use catalog_explorerd::cache::memory::MemoryCache;
use catalog_explorerd::config::Config;
use catalog_explorerd::token::MemoryTokenStore;
use catalog_explorerd::{Explorer, ProgressCallback};
use shared::types::Progress;

pub const SERVICES_PATH: &str = "/arcgis/rest/services";

pub fn base_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), SERVICES_PATH)
}

pub fn services_path(rest: &str) -> String {
    format!("{}/{}", SERVICES_PATH, rest)
}

pub fn explorer() -> Arc<Explorer> {
    explorer_with(Config::default())
}

pub fn explorer_with(config: Config) -> Arc<Explorer> {
    let tokens = Arc::new(MemoryTokenStore::new(&config.tokens));
    Arc::new(Explorer::new(&config, Arc::new(MemoryCache::new()), tokens).unwrap())
}

/// Mount a GET returning `body` as JSON
pub async fn mount_json(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub fn listing(services: &[(&str, &str)], folders: &[&str]) -> Value {
    json!({
        "currentVersion": 11.1,
        "folders": folders,
        "services": services
            .iter()
            .map(|(name, kind)| json!({"name": name, "type": kind}))
            .collect::<Vec<_>>(),
    })
}

pub fn service_body(layers: &[(i64, &str)], tables: &[(i64, &str)]) -> Value {
    let refs = |items: &[(i64, &str)]| {
        items
            .iter()
            .map(|(id, name)| json!({"id": id, "name": name}))
            .collect::<Vec<_>>()
    };
    json!({
        "description": "Test service",
        "capabilities": "Map,Query,Data",
        "layers": refs(layers),
        "tables": refs(tables),
    })
}

/// Progress callback recording every report
pub fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<Progress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: ProgressCallback = Arc::new(move |p: &Progress| sink.lock().unwrap().push(p.clone()));
    (callback, seen)
}
