//! Core infrastructure for Kithost.
//!
//! This module contains the process-wide building blocks every other
//! component is constructed with: the cache, the home layout, configuration
//! and the environment probe.

mod cache;
mod config;
mod home;
mod network;

pub use cache::{CacheEntry, CacheStore, Clock, ManualClock, SystemClock};
pub use config::{
    CheckSettings, KitConfig, PackageSettings, RegistrySettings, Settings, BASE_CACHE_KEY,
    CLI_CACHE_KEY, CONFIG_FILE_NAME, CORE_CACHE_KEY, MODULE_UPDATE_PRE, NET_ENV_CACHE_KEY,
    ONLINE_MODULE_CACHE_KEY, PROJECT_CONFIG_FILE,
};
pub use home::Home;
pub use network::{check_net_status, EnvProbe, EnvType};
