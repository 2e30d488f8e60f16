// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod storageclass;

use rustfs_utils::envs::{get_env_millis, get_env_secs, get_env_usize};
use std::time::Duration;

pub const ENV_MONITOR_INTERVAL: &str = "RUSTFS_MONITOR_INTERVAL";
pub const ENV_QUORUM_RETRY_INTERVAL_MS: &str = "RUSTFS_QUORUM_RETRY_INTERVAL_MS";
pub const ENV_WALK_POOL_IDLE_TIMEOUT: &str = "RUSTFS_WALK_POOL_IDLE_TIMEOUT";
pub const ENV_STALE_UPLOADS_EXPIRY: &str = "RUSTFS_STALE_UPLOADS_EXPIRY";
pub const ENV_STALE_UPLOADS_CLEANUP_INTERVAL: &str = "RUSTFS_STALE_UPLOADS_CLEANUP_INTERVAL";
pub const ENV_LIST_CHANNEL_SIZE: &str = "RUSTFS_LIST_CHANNEL_SIZE";
pub const ENV_HEAL_QUEUE_SIZE: &str = "RUSTFS_HEAL_QUEUE_SIZE";

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_QUORUM_RETRY_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_WALK_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STALE_UPLOADS_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_STALE_UPLOADS_CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_LIST_CHANNEL_SIZE: usize = 100;
pub const DEFAULT_HEAL_QUEUE_SIZE: usize = 1000;

/// Runtime tuning of the storage core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcConfig {
    /// How often the monitor retries offline drives.
    pub monitor_interval: Duration,
    /// Pause between startup passes while waiting for drive quorum.
    pub quorum_retry_interval: Duration,
    /// Idle time after which a cached listing walk is dropped.
    pub walk_pool_idle_timeout: Duration,
    pub stale_uploads_expiry: Duration,
    pub stale_uploads_cleanup_interval: Duration,
    pub list_channel_size: usize,
    pub heal_queue_size: usize,
    /// Standard-class parity. `None` uses the storage class default.
    pub parity: Option<usize>,
}

impl Default for EcConfig {
    fn default() -> Self {
        Self {
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            quorum_retry_interval: DEFAULT_QUORUM_RETRY_INTERVAL,
            walk_pool_idle_timeout: DEFAULT_WALK_POOL_IDLE_TIMEOUT,
            stale_uploads_expiry: DEFAULT_STALE_UPLOADS_EXPIRY,
            stale_uploads_cleanup_interval: DEFAULT_STALE_UPLOADS_CLEANUP_INTERVAL,
            list_channel_size: DEFAULT_LIST_CHANNEL_SIZE,
            heal_queue_size: DEFAULT_HEAL_QUEUE_SIZE,
            parity: None,
        }
    }
}

impl EcConfig {
    /// Defaults overridden by `RUSTFS_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            monitor_interval: get_env_secs(ENV_MONITOR_INTERVAL, DEFAULT_MONITOR_INTERVAL),
            quorum_retry_interval: get_env_millis(ENV_QUORUM_RETRY_INTERVAL_MS, DEFAULT_QUORUM_RETRY_INTERVAL),
            walk_pool_idle_timeout: get_env_secs(ENV_WALK_POOL_IDLE_TIMEOUT, DEFAULT_WALK_POOL_IDLE_TIMEOUT),
            stale_uploads_expiry: get_env_secs(ENV_STALE_UPLOADS_EXPIRY, DEFAULT_STALE_UPLOADS_EXPIRY),
            stale_uploads_cleanup_interval: get_env_secs(
                ENV_STALE_UPLOADS_CLEANUP_INTERVAL,
                DEFAULT_STALE_UPLOADS_CLEANUP_INTERVAL,
            ),
            list_channel_size: get_env_usize(ENV_LIST_CHANNEL_SIZE, DEFAULT_LIST_CHANNEL_SIZE).max(1),
            heal_queue_size: get_env_usize(ENV_HEAL_QUEUE_SIZE, DEFAULT_HEAL_QUEUE_SIZE).max(1),
            parity: None,
        }
    }

    pub fn with_parity(mut self, parity: Option<usize>) -> Self {
        self.parity = parity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var(ENV_MONITOR_INTERVAL, "3");
        std::env::set_var(ENV_QUORUM_RETRY_INTERVAL_MS, "250");
        std::env::set_var(ENV_LIST_CHANNEL_SIZE, "0");

        let cfg = EcConfig::from_env();
        assert_eq!(cfg.monitor_interval, Duration::from_secs(3));
        assert_eq!(cfg.quorum_retry_interval, Duration::from_millis(250));
        assert_eq!(cfg.list_channel_size, 1);
        assert_eq!(cfg.walk_pool_idle_timeout, DEFAULT_WALK_POOL_IDLE_TIMEOUT);

        std::env::remove_var(ENV_MONITOR_INTERVAL);
        std::env::remove_var(ENV_QUORUM_RETRY_INTERVAL_MS);
        std::env::remove_var(ENV_LIST_CHANNEL_SIZE);

        assert_eq!(EcConfig::from_env(), EcConfig::default());
    }
}
