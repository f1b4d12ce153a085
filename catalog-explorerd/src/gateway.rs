use std::sync::Arc;
use std::time::Duration;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::protocol::{FORMAT_PARAM, TOKEN_PARAM};
use shared::types::{EditFieldsInfo, Field, LayerRef, QueryOptions, QueryResult, ServiceType};
use crate::config::GatewayConfig;
use crate::error::{ExplorerError, Result};
use crate::token::TokenStore;
use crate::urls;

/// One `{name, type}` entry of a catalog listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
}

/// Response of a catalog root or folder listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogListing {
    #[serde(default)]
    pub services: Vec<ServiceRef>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub current_version: Option<f64>,
}

/// Response of a service endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    #[serde(default)]
    pub layers: Vec<LayerRef>,
    #[serde(default)]
    pub tables: Vec<LayerRef>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub service_description: Option<String>,
    #[serde(default)]
    pub capabilities: Option<String>,
}

impl ServiceDescriptor {
    /// `description`, falling back to `serviceDescription` which MapServers fill instead
    pub fn summary(&self) -> Option<String> {
        self.description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.service_description.clone().filter(|d| !d.trim().is_empty()))
    }
}

/// Response of a layer or table endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<Field>>,
    #[serde(default)]
    pub geometry_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub edit_fields_info: Option<EditFieldsInfo>,
}

/// Read-only client for the ArcGIS REST Services Directory.
///
/// Every request is a GET with `f=json` and, when one is known for the host, a
/// `token` parameter. Nothing is retried here.
pub struct Gateway {
    client: Client,
    tokens: Arc<dyn TokenStore>,
    catalog_timeout: Duration,
    query_timeout: Duration,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ExplorerError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            tokens,
            catalog_timeout: Duration::from_secs(config.catalog_timeout_secs),
            query_timeout: Duration::from_secs(config.query_timeout_secs),
        })
    }

    /// List the services and subfolders of the catalog root (empty `folder`) or of a folder.
    pub async fn fetch_catalog_level(&self, base_url: &str, folder: &str) -> Result<CatalogListing> {
        let url = urls::join(base_url, &[folder]);
        self.get_json(&url, &[], self.catalog_timeout).await
    }

    pub async fn fetch_service_detail(&self, service_url: &str) -> Result<ServiceDescriptor> {
        let value: Value = self.get_json(service_url, &[], self.catalog_timeout).await?;
        service_descriptor(value)
    }

    pub async fn fetch_resource_detail(
        &self,
        service_url: &str,
        resource_id: i64,
    ) -> Result<ResourceDescriptor> {
        let url = urls::join(service_url, &[&resource_id.to_string()]);
        self.get_json(&url, &[], self.catalog_timeout).await
    }

    pub async fn query_resource(
        &self,
        service_url: &str,
        resource_id: i64,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let url = urls::join(service_url, &[&resource_id.to_string(), "query"]);
        let params = [
            ("where", options.where_clause.clone()),
            ("outFields", options.out_fields.clone()),
            ("returnGeometry", options.return_geometry.to_string()),
            ("resultRecordCount", options.result_record_count.to_string()),
        ];
        self.get_json(&url, &params, self.query_timeout).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T> {
        let mut req = self
            .client
            .get(url)
            .timeout(timeout)
            .query(&[FORMAT_PARAM])
            .query(params);
        if let Some(token) = self.tokens.get_token(url) {
            req = req.query(&[(TOKEN_PARAM, token)]);
        }

        tracing::debug!("GET {}", url);
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_body(&body)
    }
}

/// Parse an ArcGIS JSON body into `T`, surfacing an embedded error object as
/// `Remote` and any shape mismatch as `Protocol`.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ExplorerError::Protocol(format!("Response is not valid JSON: {}", e)))?;

    if let Some((code, message)) = embedded_error(&value) {
        return Err(ExplorerError::Remote { code, message });
    }

    serde_json::from_value(value)
        .map_err(|e| ExplorerError::Protocol(format!("Unexpected response shape: {}", e)))
}

/// A service body must carry at least one key; `{}` says nothing about the service.
fn service_descriptor(value: Value) -> Result<ServiceDescriptor> {
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Err(ExplorerError::Protocol("Service response has no keys".to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| ExplorerError::Protocol(format!("Unexpected response shape: {}", e)))
}

/// Extract `(code, message)` from an ArcGIS `{"error": {...}}` body.
pub fn embedded_error(value: &Value) -> Option<(i64, String)> {
    let error = value.get("error")?.as_object()?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    Some((code, message))
}
