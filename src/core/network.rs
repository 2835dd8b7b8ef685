//! Network reachability and environment classification.
//!
//! The probe decides which registry the host talks to: the intranet mirror
//! when it answers, the public registry otherwise. The classification is
//! memoized in the cache so most runs skip the probe entirely.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cache::CacheStore;
use super::config::{Settings, NET_ENV_CACHE_KEY};

/// Check whether `url` answers within `timeout`.
///
/// Any response below 500 counts as reachable (an auth wall still means the
/// host is up). Never waits past the timeout.
pub async fn check_net_status(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(_) => return false,
    };

    match tokio::time::timeout(timeout, client.head(url).send()).await {
        Ok(Ok(response)) => response.status().as_u16() < 500,
        Ok(Err(e)) => {
            tracing::debug!(url, error = %e, "network probe failed");
            false
        }
        Err(_) => {
            tracing::debug!(url, ?timeout, "network probe timed out");
            false
        }
    }
}

/// Network environment of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    /// Inside the network that hosts the intranet registry.
    Intranet,
    /// Public internet only.
    Extranet,
}

/// Environment probe: network classification and registry selection.
#[derive(Debug)]
pub struct EnvProbe {
    cache: Arc<CacheStore>,
    public_registry: String,
    intranet_registry: Option<String>,
    timeout: Duration,
    cache_ttl: Duration,
    forced: Mutex<Option<EnvType>>,
}

impl EnvProbe {
    /// Create a probe from the host settings.
    pub fn new(settings: &Settings, cache: Arc<CacheStore>) -> Self {
        Self {
            cache,
            public_registry: settings.registry.url.clone(),
            intranet_registry: settings.registry.intranet_url.clone(),
            timeout: settings.check.net_timeout(),
            cache_ttl: settings.check.default_expires(),
            forced: Mutex::new(None),
        }
    }

    /// Whether the intranet registry is reachable.
    pub async fn is_intranet(&self) -> bool {
        if let Some(env) = *self.forced.lock() {
            return env == EnvType::Intranet;
        }

        let Some(url) = self.intranet_registry.as_deref() else {
            return false;
        };

        if let Some(cached) = self.cache.get_as::<bool>(NET_ENV_CACHE_KEY) {
            return cached;
        }

        let reachable = check_net_status(url, self.timeout).await;
        self.cache.set_as(NET_ENV_CACHE_KEY, &reachable, Some(self.cache_ttl));
        reachable
    }

    /// Whether `host` (or the intranet registry when `None`) is reachable.
    pub async fn is_intranet_host(&self, host: Option<&str>) -> bool {
        let url = match host {
            Some(h) if h.contains("://") => h.to_string(),
            Some(h) => format!("https://{h}"),
            None => match self.intranet_registry.as_deref() {
                Some(url) => url.to_string(),
                None => return false,
            },
        };
        check_net_status(&url, self.timeout).await
    }

    /// Registry base URL for the current environment.
    pub async fn get_registry(&self) -> String {
        if self.is_intranet().await {
            if let Some(ref url) = self.intranet_registry {
                return url.clone();
            }
        }
        self.public_registry.clone()
    }

    /// Current classification without probing.
    pub fn current(&self) -> Option<EnvType> {
        if let Some(env) = *self.forced.lock() {
            return Some(env);
        }
        self.cache.get_as::<bool>(NET_ENV_CACHE_KEY).map(|intranet| {
            if intranet {
                EnvType::Intranet
            } else {
                EnvType::Extranet
            }
        })
    }

    /// Force a classification for this process.
    pub fn set_env(&self, env: EnvType) {
        *self.forced.lock() = Some(env);
    }

    /// Drop the forced classification and the cached probe result.
    pub fn reset_env(&self) {
        *self.forced.lock() = None;
        self.cache.remove(NET_ENV_CACHE_KEY);
    }
}
