// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the server configuration file.
//!
//! The configuration is a single JSON object:
//!
//! ```json
//! {
//!     "local-addr": "203.0.113.1",
//!     "tsig-secret": {
//!         "update.example.com.": "c2VjcmV0",
//!         "xfer.example.com.": {
//!             "secret": "c2VjcmV0",
//!             "algorithm": "hmac-sha1"
//!         }
//!     },
//!     "zones": [
//!         {
//!             "db-file": "example.com.json",
//!             "zone-name": "example.com",
//!             "ns-name": "ns.example.com",
//!             "allow-cidr": "203.0.113.0/24"
//!         }
//!     ]
//! }
//! ```
//!
//! `local-addr` is the public IPv4 address served for each zone's name
//! server. A TSIG secret is base64; the short string form uses
//! HMAC-SHA256. `allow-cidr` is optional; without it, updates are
//! restricted by TSIG only.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use ipnet::IpNet;
use serde::Deserialize;

use dyndns::message::tsig;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        serde_json::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // Database file paths are interpreted relative to the configuration
    // file's directory.
    for zone_config in &mut config.zones {
        if zone_config.db_file.is_relative() {
            zone_config.db_file = dir.join(&zone_config.db_file);
        }
    }
    Ok(config)
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION STRUCTURES                                           //
////////////////////////////////////////////////////////////////////////

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "local-addr")]
    pub local_addr: Ipv4Addr,

    #[serde(rename = "tsig-secret", default)]
    pub tsig_secret: std::collections::HashMap<String, TsigSecretConfig>,

    pub zones: Vec<ZoneConfig>,
}

/// A configured TSIG secret: either a bare base64 string (HMAC-SHA256)
/// or an object naming the algorithm.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TsigSecretConfig {
    Secret(String),
    Full {
        secret: String,
        algorithm: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    #[serde(rename = "db-file")]
    pub db_file: PathBuf,

    #[serde(rename = "zone-name")]
    pub zone_name: String,

    #[serde(rename = "ns-name")]
    pub ns_name: String,

    #[serde(rename = "allow-cidr")]
    pub allow_cidr: Option<IpNet>,
}

impl Config {
    /// Builds the TSIG key map from the configured secrets.
    pub fn tsig_keys(&self) -> Result<tsig::KeyMap> {
        let mut keys = tsig::KeyMap::new();
        for (name, secret_config) in &self.tsig_secret {
            let key_name = name
                .parse()
                .map_err(|e| anyhow!("invalid TSIG key name {}: {}", name, e))?;
            let (secret, algorithm) = match secret_config {
                TsigSecretConfig::Secret(secret) => (secret, tsig::Algorithm::HmacSha256),
                TsigSecretConfig::Full { secret, algorithm } => {
                    (secret, parse_algorithm(algorithm)?)
                }
            };
            let secret = base64::engine::general_purpose::STANDARD
                .decode(secret)
                .with_context(|| format!("invalid base64 secret for TSIG key {}", name))?;
            keys.insert(
                key_name,
                tsig::Key {
                    algorithm,
                    secret: secret.into(),
                },
            );
        }
        Ok(keys)
    }
}

fn parse_algorithm(s: &str) -> Result<tsig::Algorithm> {
    match s.to_ascii_lowercase().as_str() {
        "hmac-sha1" => Ok(tsig::Algorithm::HmacSha1),
        "hmac-sha256" => Ok(tsig::Algorithm::HmacSha256),
        _ => Err(anyhow!("unsupported TSIG algorithm {}", s)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
