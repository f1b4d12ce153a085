use std::fmt;
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::protocol::{DEFAULT_OUT_FIELDS, DEFAULT_RESULT_COUNT, DEFAULT_WHERE};

/// Kind of ArcGIS service endpoint.
/// Server types not listed here are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceType {
    MapServer,
    FeatureServer,
    GeocodeServer,
    GeometryServer,
    ImageServer,
    GPServer,
    Folder,
    Other(String),
}

impl ServiceType {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::MapServer => "MapServer",
            ServiceType::FeatureServer => "FeatureServer",
            ServiceType::GeocodeServer => "GeocodeServer",
            ServiceType::GeometryServer => "GeometryServer",
            ServiceType::ImageServer => "ImageServer",
            ServiceType::GPServer => "GPServer",
            ServiceType::Folder => "Folder",
            ServiceType::Other(s) => s,
        }
    }
}

impl From<String> for ServiceType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "MapServer" => ServiceType::MapServer,
            "FeatureServer" => ServiceType::FeatureServer,
            "GeocodeServer" => ServiceType::GeocodeServer,
            "GeometryServer" => ServiceType::GeometryServer,
            "ImageServer" => ServiceType::ImageServer,
            "GPServer" => ServiceType::GPServer,
            "Folder" => ServiceType::Folder,
            _ => ServiceType::Other(s),
        }
    }
}

impl From<ServiceType> for String {
    fn from(t: ServiceType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A layer or table entry as listed inside a service descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRef {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "geometryType", skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
}

/// One ArcGIS service or folder node discovered during a walk.
///
/// A resolved service is in exactly one of three states: it carries layer/table
/// counts, it is an empty folder, or it carries an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub service_type: ServiceType,
    pub url: String,
    /// Folder the service was listed in, `root` for top-level services
    pub folder: String,
    pub layer_count: Option<usize>,
    pub table_count: Option<usize>,
    pub requires_auth: bool,
    pub is_empty: bool,
    pub error: Option<String>,
    pub description: Option<String>,
    pub capabilities: Option<String>,
    pub layers: Option<Vec<LayerRef>>,
    pub tables: Option<Vec<LayerRef>>,
    pub response_time_ms: Option<u64>,
}

impl Service {
    fn bare(name: String, service_type: ServiceType, url: String, folder: String) -> Self {
        Self {
            name,
            service_type,
            url,
            folder,
            layer_count: None,
            table_count: None,
            requires_auth: false,
            is_empty: false,
            error: None,
            description: None,
            capabilities: None,
            layers: None,
            tables: None,
            response_time_ms: None,
        }
    }

    /// Service whose descriptor was fetched successfully.
    #[allow(clippy::too_many_arguments)]
    pub fn resolved(
        name: String,
        service_type: ServiceType,
        url: String,
        folder: String,
        layers: Vec<LayerRef>,
        tables: Vec<LayerRef>,
        description: Option<String>,
        capabilities: Option<String>,
        response_time_ms: u64,
    ) -> Self {
        Self {
            layer_count: Some(layers.len()),
            table_count: Some(tables.len()),
            layers: Some(layers),
            tables: Some(tables),
            description,
            capabilities,
            response_time_ms: Some(response_time_ms),
            ..Self::bare(name, service_type, url, folder)
        }
    }

    /// Service whose descriptor could not be fetched.
    /// Carries an error unless the node turned out to be empty.
    #[allow(clippy::too_many_arguments)]
    pub fn unresolved(
        name: String,
        service_type: ServiceType,
        url: String,
        folder: String,
        requires_auth: bool,
        is_empty: bool,
        error: Option<String>,
        response_time_ms: Option<u64>,
    ) -> Self {
        let error = if is_empty {
            None
        } else {
            Some(error.unwrap_or_else(|| "Could not fetch service details".to_string()))
        };
        Self {
            requires_auth,
            is_empty,
            error,
            response_time_ms,
            ..Self::bare(name, service_type, url, folder)
        }
    }

    /// Placeholder standing for a folder itself: either empty, or with a failed listing.
    pub fn folder_placeholder(folder: &str, url: String, error: Option<String>) -> Self {
        let is_empty = error.is_none();
        Self {
            is_empty,
            error,
            ..Self::bare(folder.to_string(), ServiceType::Folder, url, folder.to_string())
        }
    }

    pub fn layer_refs(&self) -> &[LayerRef] {
        self.layers.as_deref().unwrap_or_default()
    }

    pub fn table_refs(&self) -> &[LayerRef] {
        self.tables.as_deref().unwrap_or_default()
    }

    /// Whether the service exposes at least one layer or table.
    pub fn has_resources(&self) -> bool {
        self.layer_count.unwrap_or(0) + self.table_count.unwrap_or(0) > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Layer,
    Table,
}

/// One attribute field of a layer or table, as described by ArcGIS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    /// Opaque coded-value or range domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Value>,
}

/// Names of the editor-tracking fields of a layer, when enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFieldsInfo {
    #[serde(default)]
    pub creation_date_field: Option<String>,
    #[serde(default)]
    pub creator_field: Option<String>,
    #[serde(default)]
    pub edit_date_field: Option<String>,
    #[serde(default)]
    pub editor_field: Option<String>,
}

/// A layer or table of a service, expanded with field detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub name: String,
    pub kind: ResourceKind,
    pub service_name: String,
    pub service_type: ServiceType,
    pub service_url: String,
    /// `service_url/id`
    pub url: String,
    pub folder: String,
    pub geometry_type: Option<String>,
    pub field_count: Option<usize>,
    pub fields: Option<Vec<Field>>,
    pub edit_fields_info: Option<EditFieldsInfo>,
    pub description: Option<String>,
    pub error: Option<String>,
    pub requires_auth: bool,
}

impl Resource {
    /// `(service_url, id)`, unique per resource within a walk
    pub fn key(&self) -> (String, i64) {
        (self.service_url.clone(), self.id)
    }
}

/// Parameters of an attribute query against one layer or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub where_clause: String,
    pub out_fields: String,
    pub return_geometry: bool,
    pub result_record_count: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            where_clause: DEFAULT_WHERE.to_string(),
            out_fields: DEFAULT_OUT_FIELDS.to_string(),
            return_geometry: true,
            result_record_count: DEFAULT_RESULT_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

/// Response of an ArcGIS feature query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub features: Vec<Feature>,
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

impl QueryResult {
    /// Warning shown when the server capped the result size.
    /// Remaining records are not paged in.
    pub fn warning(&self) -> Option<String> {
        self.exceeded_transfer_limit.then(|| {
            format!(
                "Server transfer limit exceeded: only the first {} features were returned",
                self.features.len()
            )
        })
    }
}

/// Which pass of a discovery a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkPhase {
    #[default]
    Idle,
    Catalog,
    Resources,
}

/// Snapshot of discovery progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: WalkPhase,
    pub completed: usize,
    pub total: usize,
    pub message: String,
}
