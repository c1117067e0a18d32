// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::sync::Arc;

use slog::warn;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use protocol::Connector;

use crate::collector;
use crate::debug;
use crate::resolver;
use crate::types::Device;
use crate::types::Snapshot;

/// Poll a batch of devices with a fixed number of concurrent collectors
/// and concatenate their snapshots.
///
/// Workers pull from a shared queue, so device order is whatever the
/// queue yields.  A device that fails is logged and skipped; it never
/// aborts the batch.  Each successful snapshot reaches the single
/// aggregator as one unit, and the aggregate is returned only after every
/// worker has finished.
pub async fn poll<C>(
    log: &slog::Logger,
    connector: Arc<C>,
    resolver: Arc<resolver::Service>,
    devices: Vec<Device>,
    workers: usize,
    debug: Option<Arc<debug::Sink>>,
) -> Snapshot
where
    C: Connector + 'static,
{
    let workers = workers.max(1);

    let (work_tx, work_rx) = mpsc::channel(devices.len().max(1));
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (agg_tx, mut agg_rx) = mpsc::channel::<Snapshot>(workers);

    let aggregator = tokio::task::spawn(async move {
        let mut all = Snapshot::default();
        while let Some(snapshot) = agg_rx.recv().await {
            all.absorb(snapshot);
        }
        all
    });

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let work = Arc::clone(&work_rx);
        let agg = agg_tx.clone();
        let connector = Arc::clone(&connector);
        let resolver = Arc::clone(&resolver);
        let debug = debug.clone();
        let log = log.clone();
        handles.push(tokio::task::spawn(async move {
            loop {
                let device = work.lock().await.recv().await;
                let Some(device) = device else { break };
                match collector::collect(
                    connector.as_ref(),
                    &resolver,
                    &device,
                )
                .await
                {
                    Ok(snapshot) => {
                        if let Some(sink) = &debug {
                            if let Err(e) = sink
                                .write_snapshot(&device.hostname, &snapshot)
                            {
                                warn!(
                                    log,
                                    "could not write snapshot for {}: {e}",
                                    device.hostname
                                );
                            }
                        }
                        if agg.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(
                        log,
                        "unable to read device {}:{}: {e}",
                        device.hostname,
                        device.port
                    ),
                }
            }
        }));
    }
    drop(agg_tx);

    for device in devices {
        let _ = work_tx.send(device).await;
    }
    drop(work_tx);

    for handle in handles {
        let _ = handle.await;
    }
    aggregator.await.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::collector::tests::device_walks;
    use crate::collector::tests::profile;
    use crate::collector::tests::FakeConnector;
    use crate::collector::tests::StaticLookup;

    fn quiet_log() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[tokio::test]
    async fn test_failed_device_skipped() {
        // five devices, one of which refuses its connection
        let mut devices = HashMap::new();
        for i in [1u8, 2, 4, 5] {
            devices.insert(format!("sw{i}"), device_walks(i));
        }
        let connector = Arc::new(FakeConnector { devices });
        let resolver = Arc::new(resolver::Service::new(StaticLookup, 2, 8));

        let batch: Vec<Device> = (1..=5u8)
            .map(|i| Device {
                hostname: format!("sw{i}"),
                port: 161,
                connection: profile(),
            })
            .collect();

        let snapshot = poll(
            &quiet_log(),
            connector,
            resolver,
            batch,
            3,
            None,
        )
        .await;

        assert_eq!(snapshot.ports.len(), 4);
        assert_eq!(snapshot.arps.len(), 4);
        let mut systems: Vec<&str> = snapshot
            .ports
            .iter()
            .map(|p| p.system_name.as_str())
            .collect();
        systems.sort_unstable();
        assert_eq!(systems, vec!["sw1", "sw2", "sw4", "sw5"]);
        assert!(!systems.contains(&"sw3"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let connector =
            Arc::new(FakeConnector { devices: HashMap::new() });
        let resolver = Arc::new(resolver::Service::new(StaticLookup, 1, 1));
        let snapshot = poll(
            &quiet_log(),
            connector,
            resolver,
            Vec::new(),
            4,
            None,
        )
        .await;
        assert!(snapshot.ports.is_empty());
        assert!(snapshot.resolves.is_empty());
    }
}
