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

mod config;

use clap::Parser;
use rustfs_ecstore::config::EcConfig;
use rustfs_ecstore::endpoints::PoolEndpoints;
use rustfs_ecstore::error::Result;
use rustfs_ecstore::store_api::ObjectLayer;
use rustfs_ecstore::Sets;
use std::io::IsTerminal;
use tracing::{debug, error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn setup_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let enable_color = std::io::stdout().is_terminal();

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_ansi(enable_color)
        .finish()
        .with(ErrorLayer::default());

    if let Err(e) = subscriber.try_init() {
        eprintln!("failed to set global default subscriber: {e}");
    }
}

fn main() -> Result<()> {
    let opt = config::Opt::parse();

    setup_tracing();

    run(opt)
}

#[tokio::main]
async fn run(opt: config::Opt) -> Result<()> {
    debug!("opt: {:?}", &opt);

    let pool = PoolEndpoints::from_volumes(&opt.volumes, opt.set_drive_count)?;
    debug!(
        "created endpoints, set_count: {}, drives_per_set: {}, cmd: {:?}",
        pool.set_count, pool.drives_per_set, pool.cmd_line
    );

    let config = EcConfig::from_env().with_parity(opt.parity);
    let store = Sets::new(pool, config).await?;

    let info = store.storage_info().await;
    let (online, offline) = info.disk_counts();
    info!(
        "storage ready: {} set(s) of {} drive(s), {online} online, {offline} offline, parity {}",
        store.set_count, store.set_drive_count, store.default_parity_count
    );
    match serde_json::to_string(&info.backend) {
        Ok(backend) => debug!("backend: {backend}"),
        Err(e) => error!("encode backend info: {e}"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    store.shutdown().await;

    Ok(())
}
