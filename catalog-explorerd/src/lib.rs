pub mod api;
pub mod cache;
pub mod cache_manager;
pub mod config;
pub mod error;
pub mod explorer;
pub mod export;
pub mod gateway;
pub mod prober;
pub mod token;
pub mod urls;
pub mod walker;

pub use error::{ExplorerError, Result};
pub use explorer::Explorer;
pub use walker::ProgressCallback;
