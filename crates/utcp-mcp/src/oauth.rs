//! OAuth2 client-credentials token cache for MCP HTTP servers, keyed by
//! `(token_url, client_id, scope)`.
//!
//! A per-key lock is held across the fetch itself, not just the cache read,
//! so that N concurrent callers racing for an absent token produce exactly
//! one `fetch_client_credentials_token` call rather than a stampede.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use utcp_core::{fetch_client_credentials_token, Result, TokenInfo};

/// Tokens with less than this much life left are treated as expired.
const REFRESH_MARGIN: Duration = Duration::from_secs(30);

type CacheKey = (String, String, Option<String>);

struct CachedToken {
    info: TokenInfo,
    fetched_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        match self.info.expires_in {
            Some(secs) => self.fetched_at.elapsed() + REFRESH_MARGIN < Duration::from_secs(secs),
            None => true,
        }
    }
}

#[derive(Default)]
pub struct TokenCache {
    entries: Mutex<HashMap<CacheKey, Arc<Mutex<Option<CachedToken>>>>>,
}

impl TokenCache {
    /// Returns a valid bearer token for `(token_url, client_id, scope)`,
    /// fetching (and caching) a fresh one if absent or near expiry.
    pub async fn get_or_fetch(
        &self,
        http_client: &reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        scope: Option<&str>,
    ) -> Result<String> {
        let key: CacheKey = (token_url.to_string(), client_id.to_string(), scope.map(str::to_string));
        let slot = {
            let mut entries = self.entries.lock().await;
            entries.entry(key).or_insert_with(|| Arc::new(Mutex::new(None))).clone()
        };

        let mut guard = slot.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.info.access_token.clone());
            }
        }

        let info = fetch_client_credentials_token(http_client, token_url, client_id, client_secret, scope).await?;
        let token = info.access_token.clone();
        *guard = Some(CachedToken { info, fetched_at: Instant::now() });
        Ok(token)
    }
}
