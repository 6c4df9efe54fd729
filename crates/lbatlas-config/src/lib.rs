// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration of an lbatlas instance, loaded from one YAML file with
//! `database`, `collector`, `web` and `metaweb` sections. All fields carry
//! defaults so a minimal file only needs to list the devices to poll.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub metaweb: MetaWebConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "DatabaseConfig::default_host")]
    pub host: String,
    #[serde(default = "DatabaseConfig::default_port")]
    pub port: u16,
    #[serde(default = "DatabaseConfig::default_database")]
    pub database: String,
    #[serde(default = "DatabaseConfig::default_username")]
    pub username: String,
    #[serde(default = "DatabaseConfig::default_password")]
    pub password: String,
}

impl DatabaseConfig {
    fn default_host() -> String {
        "localhost".into()
    }
    fn default_port() -> u16 {
        5432
    }
    fn default_database() -> String {
        "lbatlas".into()
    }
    fn default_username() -> String {
        "lbatlas".into()
    }
    fn default_password() -> String {
        "lbatlas".into()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: Self::default_host(),
            port: Self::default_port(),
            database: Self::default_database(),
            username: Self::default_username(),
            password: Self::default_password(),
        }
    }
}

/// One device entry: either a read community, or a `[read, write]` pair.
/// Actions are only available on devices configured with a write community.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Community {
    Read(String),
    ReadWrite(String, String),
}

impl Community {
    pub fn read(&self) -> &str {
        match self {
            Community::Read(ro) => ro,
            Community::ReadWrite(ro, _) => ro,
        }
    }

    pub fn write(&self) -> Option<&str> {
        match self {
            Community::Read(_) => None,
            Community::ReadWrite(_, rw) => Some(rw),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CollectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Use GETBULK when the device speaks v2c; otherwise emulate walks with
    /// GETNEXT.
    #[serde(default = "default_true")]
    pub bulk: bool,
    /// Devices to poll, keyed by DNS name or IP address.
    #[serde(default)]
    pub lb: BTreeMap<String, Community>,
    /// Close load balancers not refreshed for this many days.
    #[serde(default = "CollectorConfig::default_expire")]
    pub expire: u32,
    /// Seconds between fleet-wide refreshes; 0 disables the periodic sweep
    /// and leaves refreshes on-demand.
    #[serde(default)]
    pub interval: u64,
}

impl CollectorConfig {
    fn default_expire() -> u32 {
        1
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bulk: true,
            lb: BTreeMap::new(),
            expire: Self::default_expire(),
            interval: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "WebConfig::default_interface")]
    pub interface: String,
    #[serde(default = "WebConfig::default_port")]
    pub port: u16,
}

impl WebConfig {
    fn default_interface() -> String {
        "127.0.0.1".into()
    }
    fn default_port() -> u16 {
        8089
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interface: Self::default_interface(),
            port: Self::default_port(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MetaWebConfig {
    #[serde(default = "WebConfig::default_interface")]
    pub interface: String,
    #[serde(default = "MetaWebConfig::default_port")]
    pub port: u16,
    /// Backend collector instances to federate. The federation tier only
    /// starts when this list is not empty.
    #[serde(default)]
    pub proxy: Vec<String>,
    /// Per-request timeout in seconds for fleet-map refreshes and fan-outs.
    #[serde(default = "MetaWebConfig::default_timeout")]
    pub timeout: u64,
    /// Maximum number of concurrent backend requests.
    #[serde(default = "MetaWebConfig::default_parallel")]
    pub parallel: usize,
    /// Fleet maps older than this many seconds are refreshed; maps older
    /// than four times this are dropped.
    #[serde(default = "MetaWebConfig::default_expire")]
    pub expire: u64,
}

impl MetaWebConfig {
    fn default_port() -> u16 {
        8090
    }
    fn default_timeout() -> u64 {
        2
    }
    fn default_parallel() -> usize {
        10
    }
    fn default_expire() -> u64 {
        30
    }
}

impl Default for MetaWebConfig {
    fn default() -> Self {
        Self {
            interface: WebConfig::default_interface(),
            port: Self::default_port(),
            proxy: Vec::new(),
            timeout: Self::default_timeout(),
            parallel: Self::default_parallel(),
            expire: Self::default_expire(),
        }
    }
}

fn default_true() -> bool {
    true
}
