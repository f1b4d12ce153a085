mod common;

use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use tokio::sync::Notify;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use catalog_explorerd::config::Config;
use catalog_explorerd::{ExplorerError, ProgressCallback};
use shared::types::{Progress, ResourceKind, ServiceType, WalkPhase};

use common::*;

#[tokio::test]
async fn test_single_root_service_without_folders() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("Basemap", "MapServer")], &[])).await;
    mount_json(
        &server,
        &services_path("Basemap/MapServer"),
        service_body(&[(0, "Roads"), (1, "Parcels")], &[(2, "Owners")]),
    )
    .await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();

    assert_eq!(services.len(), 1);
    let svc = &services[0];
    assert_eq!(svc.folder, "root");
    assert_eq!(svc.service_type, ServiceType::MapServer);
    assert_eq!(svc.url, format!("{}/Basemap/MapServer", base_url(&server)));
    assert_eq!(svc.layer_count, Some(2));
    assert_eq!(svc.table_count, Some(1));
    assert_eq!(svc.capabilities.as_deref(), Some("Map,Query,Data"));
    assert!(!svc.requires_auth && !svc.is_empty && svc.error.is_none());
    assert!(svc.response_time_ms.is_some());
}

#[tokio::test]
async fn test_empty_folder_emits_one_placeholder() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[], &["Empty", "Hydro"])).await;
    mount_json(&server, &services_path("Empty"), listing(&[], &[])).await;
    mount_json(&server, &services_path("Hydro"), listing(&[("Hydro/Rivers", "FeatureServer")], &[])).await;
    mount_json(
        &server,
        &services_path("Hydro/Rivers/FeatureServer"),
        service_body(&[(0, "Rivers")], &[]),
    )
    .await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    assert_eq!(services.len(), 2);

    let empty: Vec<_> = services.iter().filter(|s| s.folder == "Empty").collect();
    assert_eq!(empty.len(), 1);
    assert_eq!(empty[0].service_type, ServiceType::Folder);
    assert!(empty[0].is_empty);
    assert!(empty[0].layer_count.is_none() && empty[0].table_count.is_none());

    let rivers = services.iter().find(|s| s.name == "Hydro/Rivers").unwrap();
    assert_eq!(rivers.folder, "Hydro");
    assert_eq!(rivers.layer_count, Some(1));
}

#[tokio::test]
async fn test_root_services_precede_folder_services() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("A", "MapServer"), ("B", "MapServer")], &["F"])).await;
    mount_json(&server, &services_path("F"), listing(&[("F/C", "MapServer")], &[])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/arcgis/rest/services/(A|B|F/C)/MapServer$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body(&[(0, "L")], &[])))
        .mount(&server)
        .await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    let folders: Vec<&str> = services.iter().map(|s| s.folder.as_str()).collect();
    assert_eq!(folders, vec!["root", "root", "F"]);
}

#[tokio::test]
async fn test_failed_folder_listing_is_isolated() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[], &["Broken", "Good"])).await;
    Mock::given(method("GET"))
        .and(path(services_path("Broken")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_json(&server, &services_path("Good"), listing(&[("Good/Svc", "MapServer")], &[])).await;
    mount_json(&server, &services_path("Good/Svc/MapServer"), service_body(&[(0, "L")], &[])).await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    assert_eq!(services.len(), 2);

    let broken = services.iter().find(|s| s.folder == "Broken").unwrap();
    assert_eq!(broken.service_type, ServiceType::Folder);
    assert!(!broken.is_empty);
    assert!(broken.error.is_some());

    assert!(services.iter().any(|s| s.name == "Good/Svc" && s.layer_count == Some(1)));
}

#[tokio::test]
async fn test_auth_walled_services_are_flagged_not_dropped() {
    let server = MockServer::start().await;
    mount_json(
        &server,
        SERVICES_PATH,
        listing(&[("Token", "MapServer"), ("Forbidden", "MapServer"), ("Login", "MapServer")], &[]),
    )
    .await;
    mount_json(
        &server,
        &services_path("Token/MapServer"),
        json!({"error": {"code": 499, "message": "Token Required", "details": []}}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(services_path("Forbidden/MapServer")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(services_path("Login/MapServer")))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/login", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in</html>"))
        .mount(&server)
        .await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    assert_eq!(services.len(), 3);

    for svc in &services {
        assert!(svc.requires_auth, "{} should require auth", svc.name);
        assert!(svc.error.is_some());
        assert!(svc.layer_count.is_none());
        assert!(!svc.is_empty);
    }
}

#[tokio::test]
async fn test_empty_service_body_marks_service_empty() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("Hollow", "MapServer")], &[])).await;
    Mock::given(method("GET"))
        .and(path(services_path("Hollow/MapServer")))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    assert!(services[0].is_empty);
    assert!(services[0].error.is_none());
    assert!(!services[0].requires_auth);
}

#[tokio::test]
async fn test_keyless_service_object_marks_service_empty() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("Blank", "MapServer")], &[])).await;
    mount_json(&server, &services_path("Blank/MapServer"), json!({})).await;

    let services = explorer().get_catalog(&base_url(&server), false, None).await.unwrap();
    let svc = &services[0];
    assert!(svc.is_empty);
    assert!(svc.error.is_none());
    assert!(svc.layer_count.is_none() && svc.table_count.is_none());
}

#[tokio::test]
async fn test_base_url_query_survives_path_joins() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[], &["Hydro"])).await;
    mount_json(&server, &services_path("Hydro"), listing(&[("Hydro/Rivers", "FeatureServer")], &[])).await;
    mount_json(
        &server,
        &services_path("Hydro/Rivers/FeatureServer"),
        service_body(&[(0, "Rivers")], &[]),
    )
    .await;

    let base = format!("{}?foo=bar", base_url(&server));
    let services = explorer().get_catalog(&base, false, None).await.unwrap();

    assert_eq!(services.len(), 1);
    let rivers = &services[0];
    assert_eq!(rivers.folder, "Hydro");
    assert_eq!(rivers.url, format!("{}/Hydro/Rivers/FeatureServer?foo=bar", base_url(&server)));
    assert_eq!(rivers.layer_count, Some(1));
}

#[tokio::test]
async fn test_root_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SERVICES_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = explorer().get_catalog(&base_url(&server), false, None).await.unwrap_err();
    assert!(matches!(err, ExplorerError::Status(503)));
}

#[tokio::test]
async fn test_malformed_root_is_protocol_error() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, json!({"services": {"name": "not a list"}})).await;

    let err = explorer().get_catalog(&base_url(&server), false, None).await.unwrap_err();
    assert!(matches!(err, ExplorerError::Protocol(_)));
}

#[tokio::test]
async fn test_cached_catalog_fetches_root_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SERVICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[("A", "MapServer")], &[])))
        .expect(1)
        .mount(&server)
        .await;
    mount_json(&server, &services_path("A/MapServer"), service_body(&[(0, "L")], &[])).await;

    let explorer = explorer();
    let first = explorer.get_catalog(&base_url(&server), true, None).await.unwrap();
    let second = explorer.get_catalog(&base_url(&server), true, None).await.unwrap();

    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SERVICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], &[])))
        .expect(2)
        .mount(&server)
        .await;

    let explorer = explorer();
    let base = base_url(&server);
    explorer.get_catalog(&base, true, None).await.unwrap();
    assert_eq!(explorer.clear_cache(Some(&base)).await.unwrap(), 1);
    explorer.get_catalog(&base, true, None).await.unwrap();
}

#[tokio::test]
async fn test_cancel_after_root_fetch_resolves_cancelled() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[], &["Slow1", "Slow2"])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/arcgis/rest/services/Slow\d$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(&[], &[]))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let explorer = explorer();
    let root_listed = Arc::new(Notify::new());
    let notify = root_listed.clone();
    let callback: ProgressCallback = Arc::new(move |p: &Progress| {
        if p.completed == 1 {
            notify.notify_one();
        }
    });

    let walk = {
        let explorer = explorer.clone();
        let base = base_url(&server);
        tokio::spawn(async move { explorer.get_catalog(&base, true, Some(callback)).await })
    };

    root_listed.notified().await;
    explorer.cancel_discovery();

    let result = tokio::time::timeout(Duration::from_secs(5), walk)
        .await
        .expect("cancelled walk should finish promptly")
        .unwrap();
    assert!(matches!(result, Err(ExplorerError::Cancelled)));

    // a cancelled walk leaves nothing behind in the cache
    assert_eq!(explorer.clear_cache(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_new_walk_cancels_previous() {
    let slow = MockServer::start().await;
    mount_json(&slow, SERVICES_PATH, listing(&[], &["Slow"])).await;
    Mock::given(method("GET"))
        .and(path(services_path("Slow")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(&[], &[]))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    mount_json(&fast, SERVICES_PATH, listing(&[], &["Empty"])).await;
    mount_json(&fast, &services_path("Empty"), listing(&[], &[])).await;

    let explorer = explorer();
    let first = {
        let explorer = explorer.clone();
        let base = base_url(&slow);
        tokio::spawn(async move { explorer.get_catalog(&base, false, None).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = explorer.get_catalog(&base_url(&fast), false, None).await.unwrap();
    assert_eq!(second.len(), 1);

    let first = tokio::time::timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
    assert!(matches!(first, Err(ExplorerError::Cancelled)));
}

#[tokio::test]
async fn test_catalog_progress_is_monotonic() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[], &["A", "B", "C"])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/arcgis/rest/services/[ABC]$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], &[])))
        .mount(&server)
        .await;

    let (callback, seen) = recorder();
    explorer().get_catalog(&base_url(&server), false, Some(callback)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.windows(2).all(|w| w[0].completed <= w[1].completed));
    assert_eq!(seen.last().unwrap().completed, 4);
    assert!(seen.iter().all(|p| p.total == 4 && p.phase == WalkPhase::Catalog));
}

#[tokio::test]
async fn test_resource_walk_reports_per_batch() {
    let server = MockServer::start().await;
    let names: Vec<String> = (0..25).map(|i| format!("S{}", i)).collect();
    let refs: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "MapServer")).collect();
    mount_json(&server, SERVICES_PATH, listing(&refs, &[])).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/arcgis/rest/services/S\d+/MapServer$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(service_body(&[(0, "Roads")], &[])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/arcgis/rest/services/S\d+/MapServer/0$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 0,
            "name": "Roads",
            "type": "Feature Layer",
            "geometryType": "esriGeometryPolyline",
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID", "alias": "OBJECTID"},
                {"name": "NAME", "type": "esriFieldTypeString", "length": 50, "nullable": true}
            ],
            "editFieldsInfo": {"creationDateField": "created", "editorField": "editor"}
        })))
        .mount(&server)
        .await;

    let (callback, seen) = recorder();
    let resources = explorer()
        .get_resource_catalog(&base_url(&server), false, Some(callback))
        .await
        .unwrap();

    assert_eq!(resources.len(), 25);
    let r = &resources[0];
    assert_eq!(r.kind, ResourceKind::Layer);
    assert_eq!(r.field_count, Some(2));
    assert_eq!(r.geometry_type.as_deref(), Some("esriGeometryPolyline"));
    assert_eq!(r.url, format!("{}/0", r.service_url));
    assert_eq!(
        r.edit_fields_info.as_ref().unwrap().creation_date_field.as_deref(),
        Some("created")
    );

    let batches: Vec<usize> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|p| p.phase == WalkPhase::Resources)
        .map(|p| p.completed)
        .collect();
    assert_eq!(batches, vec![10, 20, 25]);
}

#[tokio::test]
async fn test_failed_resource_detail_still_emitted() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("Mixed", "FeatureServer"), ("Empty", "MapServer")], &[])).await;
    mount_json(
        &server,
        &services_path("Mixed/FeatureServer"),
        service_body(&[(0, "Points")], &[(1, "Owners")]),
    )
    .await;
    mount_json(&server, &services_path("Empty/MapServer"), service_body(&[], &[])).await;
    mount_json(
        &server,
        &services_path("Mixed/FeatureServer/0"),
        json!({"id": 0, "name": "Points", "geometryType": "esriGeometryPoint", "fields": []}),
    )
    .await;
    mount_json(
        &server,
        &services_path("Mixed/FeatureServer/1"),
        json!({"error": {"code": 499, "message": "Token Required"}}),
    )
    .await;

    let resources = explorer().get_resource_catalog(&base_url(&server), false, None).await.unwrap();
    assert_eq!(resources.len(), 2);

    let table = resources.iter().find(|r| r.kind == ResourceKind::Table).unwrap();
    assert_eq!(table.id, 1);
    assert_eq!(table.error.as_deref(), Some("Could not fetch details"));
    assert!(table.requires_auth);
    assert!(table.fields.is_none());

    let layer = resources.iter().find(|r| r.kind == ResourceKind::Layer).unwrap();
    assert!(layer.error.is_none());
    assert_eq!(layer.field_count, Some(0));
}

#[tokio::test]
async fn test_service_listed_twice_yields_resources_once() {
    let server = MockServer::start().await;
    mount_json(&server, SERVICES_PATH, listing(&[("Dup", "MapServer"), ("Dup", "MapServer")], &[])).await;
    mount_json(&server, &services_path("Dup/MapServer"), service_body(&[(0, "Roads")], &[])).await;
    mount_json(&server, &services_path("Dup/MapServer/0"), json!({"id": 0, "name": "Roads", "fields": []})).await;

    let resources = explorer().get_resource_catalog(&base_url(&server), false, None).await.unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].key(), (format!("{}/Dup/MapServer", base_url(&server)), 0));
}

#[tokio::test]
async fn test_token_from_config_and_url_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SERVICES_PATH))
        .and(query_param("token", "from-url"))
        .and(query_param("f", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], &[])))
        .expect(1)
        .mount(&server)
        .await;

    let explorer = explorer();
    let services = explorer
        .get_catalog(&format!("{}?token=from-url", base_url(&server)), false, None)
        .await
        .unwrap();
    assert!(services.is_empty());

    let configured = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SERVICES_PATH))
        .and(query_param("token", "from-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], &[])))
        .expect(1)
        .mount(&configured)
        .await;

    let mut config = Config::default();
    config.tokens.insert(configured.uri(), "from-config".to_string());
    explorer_with(config)
        .get_catalog(&base_url(&configured), false, None)
        .await
        .unwrap();
}
