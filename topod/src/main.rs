// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use signal_hook::consts::signal::*;
use signal_hook::iterator::Signals;
use slog::info;
use slog::warn;
use structopt::StructOpt;

pub use errors::TopodError;
pub use types::TopodResult;

mod collector;
mod debug;
mod errors;
mod journal;
mod poller;
mod resolver;
mod store;
mod transport;
mod types;

#[derive(Debug, StructOpt)]
#[structopt(name = "topod", about = "Network topology journal daemon")]
struct Opt {
    #[structopt(long, help = "log file")]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        default_value = "human",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: common::LogFormat,

    #[structopt(
        long,
        env = "GRAPHQL_ENDPOINT",
        help = "GraphQL endpoint holding the device directory and journal"
    )]
    endpoint: String,

    #[structopt(long, env = "GRAPHQL_ADMIN_SECRET", hide_env_values = true)]
    admin_secret: Option<String>,

    #[structopt(long, env = "GRAPHQL_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    #[structopt(long, default_value = "10", help = "concurrent device polls")]
    workers: usize,

    #[structopt(long, default_value = "16", help = "concurrent DNS lookups")]
    resolvers: usize,

    #[structopt(
        long,
        default_value = "1024",
        help = "outstanding DNS requests before callers block"
    )]
    resolve_slots: usize,

    #[structopt(
        long,
        default_value = "1800",
        help = "seconds between poll cycles"
    )]
    poll_interval: u64,

    #[structopt(
        long,
        help = "directory for per-device and per-cycle JSON dumps"
    )]
    debug_dir: Option<PathBuf>,
}

fn watch_signals(log: slog::Logger) -> tokio::sync::watch::Receiver<bool> {
    let (tx, rx) = tokio::sync::watch::channel(false);
    std::thread::spawn(move || {
        let mut signals = Signals::new([SIGTERM, SIGQUIT, SIGINT])
            .expect("installing signal handlers");
        if let Some(signal) = signals.forever().next() {
            info!(log, "caught signal {signal} - exiting");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run(log: &slog::Logger, opt: Opt) -> TopodResult<()> {
    let dns = resolver::Dns::system()
        .map_err(|e| TopodError::Resolution(e.to_string()))?;
    let resolver = Arc::new(resolver::Service::new(
        dns,
        opt.resolvers,
        opt.resolve_slots,
    ));
    let store = store::Store::new(
        log,
        &opt.endpoint,
        opt.admin_secret.clone(),
        opt.api_secret.clone(),
    )?;
    let connector = Arc::new(transport::NetSnmp::new());
    let sink =
        opt.debug_dir.clone().map(|d| Arc::new(debug::Sink::new(d)));

    info!(log, "using device directory at {}", opt.endpoint);
    let mut shutdown = watch_signals(log.clone());

    loop {
        match store.read_devices().await {
            Err(e) => warn!(log, "unable to read device directory: {e}"),
            Ok(devices) => {
                info!(log, "polling {} devices", devices.len());
                let snapshot = poller::poll(
                    log,
                    Arc::clone(&connector),
                    Arc::clone(&resolver),
                    devices,
                    opt.workers,
                    sink.clone(),
                )
                .await;

                let journal = journal::translate(&snapshot);
                let variables = journal.variables();
                if let Some(sink) = &sink {
                    if let Err(e) = sink.write_payload(&variables) {
                        warn!(log, "could not write journal payload: {e}");
                    }
                }
                match store.insert_journal(variables).await {
                    Ok(rows) => {
                        info!(log, "journal inserted"; "rows" => rows)
                    }
                    Err(e) => warn!(log, "unable to insert journal: {e}"),
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(opt.poll_interval)) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
    }

    info!(log, "exiting");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    let log = common::logging::init("topod", &opt.log_file, opt.log_format)?;
    run(&log, opt).await?;
    Ok(())
}
