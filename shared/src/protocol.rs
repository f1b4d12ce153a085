/// Folder label used for services listed at the catalog root
pub const ROOT_FOLDER: &str = "root";

/// Response format parameter sent with every ArcGIS REST request
pub const FORMAT_PARAM: (&str, &str) = ("f", "json");

/// Query parameter carrying an ArcGIS token
pub const TOKEN_PARAM: &str = "token";

/// ArcGIS error codes meaning "token required" / "invalid token"
pub const TOKEN_REQUIRED_CODE: i64 = 499;
pub const INVALID_TOKEN_CODE: i64 = 498;

/// Cache key prefixes
pub const CATALOG_KEY_PREFIX: &str = "catalog:";
pub const SERVICE_KEY_PREFIX: &str = "service:";
pub const LAYER_KEY_PREFIX: &str = "layer:";
pub const QUERY_KEY_PREFIX: &str = "query:";

/// TTL classes, in seconds
pub const SHORT_TTL_SECS: u64 = 5 * 60;
pub const MEDIUM_TTL_SECS: u64 = 30 * 60;
pub const LONG_TTL_SECS: u64 = 24 * 60 * 60;

/// Query defaults
pub const DEFAULT_WHERE: &str = "1=1";
pub const DEFAULT_OUT_FIELDS: &str = "*";
pub const DEFAULT_RESULT_COUNT: u32 = 1000;

/// Resource-mode discovery batch size
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// API path prefix
pub const API_PREFIX: &str = "/v1";
