use std::collections::HashMap;
use std::sync::RwLock;
use crate::urls::origin_key;

/// Token lookup keyed by `scheme://host[:port]`.
pub trait TokenStore: Send + Sync {
    fn get_token(&self, url: &str) -> Option<String>;
    fn set_token(&self, url: &str, token: String);
}

/// In-memory token store, seeded from the `[tokens]` config table.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new(seed: &HashMap<String, String>) -> Self {
        let tokens = seed
            .iter()
            .filter_map(|(host, token)| match origin_key(host) {
                Ok(key) => Some((key, token.clone())),
                Err(e) => {
                    tracing::warn!("Ignoring token for invalid host {}: {}", host, e);
                    None
                }
            })
            .collect();
        Self {
            tokens: RwLock::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self, url: &str) -> Option<String> {
        let key = origin_key(url).ok()?;
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        tokens.get(&key).cloned()
    }

    fn set_token(&self, url: &str, token: String) {
        if let Ok(key) = origin_key(url) {
            let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
            tokens.insert(key, token);
        }
    }
}
