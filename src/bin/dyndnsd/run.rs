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

//! Implements running the server.

use std::fmt::Write;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use dyndns::name::Name;
use dyndns::server::{net, Server};
use dyndns::zone::Zone;

use crate::args::Args;
use crate::config::{self, Config};

/// The port served when neither `--bind` nor `--port` is given.
const DEFAULT_PORT: u16 = 1053;

/// How long running tasks are given to finish once shutdown begins.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the server.
pub fn run(args: Args) {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(args: Args) -> Result<()> {
    info!(
        "dyndns daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    info!("Loading the configuration from {}.", args.config.display());
    let config = config::load(&args.config).context("failed to load the configuration")?;
    let bind = args.bind.unwrap_or_else(|| {
        SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            args.port.unwrap_or(DEFAULT_PORT),
        )
    });

    let tsig_keys = config
        .tsig_keys()
        .context("failed to load the TSIG keys")?;
    if tsig_keys.is_empty() {
        info!("No TSIG keys configured; updates and transfers will be refused.");
    }

    let zones = load_zones(&config)?;
    let server = Arc::new(Server::new(zones, tsig_keys));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(async {
        tokio::select! {
            result = net::run(server, bind) => result.context("server I/O failed"),
            result = shutdown_signal() => {
                info!("Shutdown signal received.");
                result.context("failed to wait for shutdown signals")
            }
        }
    })?;
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    Ok(())
}

fn load_zones(config: &Config) -> Result<Vec<Zone>> {
    if config.zones.len() == 1 {
        info!("Beginning to load 1 zone.");
    } else {
        info!("Beginning to load {} zones.", config.zones.len());
    }
    let mut zones = Vec::with_capacity(config.zones.len());
    for zone_config in &config.zones {
        let name: Name = zone_config
            .zone_name
            .parse()
            .with_context(|| format!("invalid zone name {}", zone_config.zone_name))?;
        let ns_name: Name = zone_config
            .ns_name
            .parse()
            .with_context(|| format!("invalid NS name for zone {}", name))?;
        let zone = Zone::load(
            name.clone(),
            ns_name,
            config.local_addr,
            zone_config.allow_cidr,
            zone_config.db_file.clone(),
        )
        .with_context(|| format!("failed to load zone {}", name))?;
        zones.push(zone);
    }
    Ok(zones)
}

async fn shutdown_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await
}
