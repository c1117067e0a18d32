// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Bounded-concurrency forward and reverse DNS resolution, shared by every
//! device poll in flight.
//!
//! A fixed set of resolver tasks drains one request queue, so the lookup
//! concurrency is capped no matter how many devices are being polled.  A
//! caller first takes a reusable reply slot from a pre-allocated pool,
//! submits its request tagged with that slot, blocks on the slot for the
//! answer, and hands the slot back.  When every slot is taken, new callers
//! wait for one to free up: saturation is backpressure, never an error and
//! never a dropped request.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::error::ResolveError;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Why a lookup produced no usable answer.  These are per-address
/// conditions; the affected resolution is simply absent from the poll.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LookupError {
    /// The name exists but has no records of the requested kind, or a
    /// reverse lookup returned an empty set.
    #[error("no records")]
    NoRecords,
    #[error("lookup failed: {0}")]
    Failed(String),
}

/// What actually performs lookups.  Split out so tests can substitute a
/// deterministic implementation.
#[async_trait]
pub trait Lookup: Send + Sync + 'static {
    async fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError>;
    async fn reverse(&self, addr: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// The system-configured resolver.
pub struct Dns {
    resolver: TokioAsyncResolver,
}

impl Dns {
    pub fn system() -> Result<Dns, LookupError> {
        TokioAsyncResolver::tokio_from_system_conf()
            .map(|resolver| Dns { resolver })
            .map_err(|e| LookupError::Failed(e.to_string()))
    }
}

fn resolve_err(e: ResolveError) -> LookupError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => LookupError::NoRecords,
        _ => LookupError::Failed(e.to_string()),
    }
}

#[async_trait]
impl Lookup for Dns {
    async fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        let lookup =
            self.resolver.lookup_ip(hostname).await.map_err(resolve_err)?;
        Ok(lookup.iter().collect())
    }

    async fn reverse(&self, addr: IpAddr) -> Result<Vec<String>, LookupError> {
        let lookup =
            self.resolver.reverse_lookup(addr).await.map_err(resolve_err)?;
        Ok(lookup.iter().map(|ptr| ptr.to_string()).collect())
    }
}

enum Resolved {
    Addrs(Vec<IpAddr>),
    Name(String),
}

type Answer = Result<Resolved, LookupError>;

enum Request {
    Forward {
        hostname: String,
        reply: mpsc::Sender<Answer>,
    },
    Reverse {
        addr: IpAddr,
        reply: mpsc::Sender<Answer>,
    },
}

/// A reusable reply channel.  Both halves travel together through the free
/// pool so the receiving end comes back for the next caller.
struct Slot {
    tx: mpsc::Sender<Answer>,
    rx: mpsc::Receiver<Answer>,
}

/// Shared resolution service.  `workers` bounds in-flight lookups; the
/// slot count bounds outstanding requests.
pub struct Service {
    requests: mpsc::Sender<Request>,
    free: Mutex<mpsc::Receiver<Slot>>,
    handback: mpsc::Sender<Slot>,
}

impl Service {
    pub fn new(lookup: impl Lookup, workers: usize, slots: usize) -> Service {
        let workers = workers.max(1);
        let slots = slots.max(1);

        let (requests, queue) = mpsc::channel(slots);
        let queue = Arc::new(Mutex::new(queue));
        let lookup: Arc<dyn Lookup> = Arc::new(lookup);
        for _ in 0..workers {
            let lookup = Arc::clone(&lookup);
            let queue = Arc::clone(&queue);
            tokio::task::spawn(async move { serve(lookup, queue).await });
        }

        let (handback, free) = mpsc::channel(slots);
        for _ in 0..slots {
            let (tx, rx) = mpsc::channel(1);
            handback
                .try_send(Slot { tx, rx })
                .expect("slot pool sized to hold every slot");
        }

        Service {
            requests,
            free: Mutex::new(free),
            handback,
        }
    }

    /// Resolve a hostname to its addresses.
    pub async fn lookup_ip(
        &self,
        hostname: &str,
    ) -> Result<Vec<IpAddr>, LookupError> {
        let request = |reply| Request::Forward {
            hostname: hostname.to_string(),
            reply,
        };
        match self.submit(request).await? {
            Resolved::Addrs(addrs) => Ok(addrs),
            Resolved::Name(_) => {
                Err(LookupError::Failed("mismatched answer kind".to_string()))
            }
        }
    }

    /// Reverse-resolve an address to a single hostname.
    pub async fn lookup_addr(&self, addr: IpAddr) -> Result<String, LookupError> {
        let request = |reply| Request::Reverse { addr, reply };
        match self.submit(request).await? {
            Resolved::Name(name) => Ok(name),
            Resolved::Addrs(_) => {
                Err(LookupError::Failed("mismatched answer kind".to_string()))
            }
        }
    }

    async fn submit(
        &self,
        request: impl FnOnce(mpsc::Sender<Answer>) -> Request,
    ) -> Answer {
        // Blocks until a slot frees up when the pool is exhausted.
        let mut slot = {
            self.free.lock().await.recv().await.ok_or_else(|| {
                LookupError::Failed("reply-slot pool closed".to_string())
            })?
        };

        if self.requests.send(request(slot.tx.clone())).await.is_err() {
            self.release(slot);
            return Err(LookupError::Failed(
                "resolver queue closed".to_string(),
            ));
        }

        let answer = slot.rx.recv().await;
        self.release(slot);
        answer.unwrap_or_else(|| {
            Err(LookupError::Failed("resolver exited".to_string()))
        })
    }

    fn release(&self, slot: Slot) {
        // the pool is sized to hold every slot, so this cannot fill up
        let _ = self.handback.try_send(slot);
    }
}

async fn serve(lookup: Arc<dyn Lookup>, queue: Arc<Mutex<mpsc::Receiver<Request>>>) {
    loop {
        let request = queue.lock().await.recv().await;
        let Some(request) = request else { return };
        match request {
            Request::Forward { hostname, reply } => {
                let answer = lookup.forward(&hostname).await.map(|addrs| {
                    Resolved::Addrs(
                        addrs.into_iter().filter(IpAddr::is_ipv4).collect(),
                    )
                });
                let _ = reply.send(answer).await;
            }
            Request::Reverse { addr, reply } => {
                let answer =
                    lookup.reverse(addr).await.and_then(|names| {
                        let name = names
                            .into_iter()
                            .find(|n| !n.is_empty())
                            .ok_or(LookupError::NoRecords)?;
                        // resolvers hand back fully-qualified names; the
                        // trailing separator is noise downstream
                        Ok(Resolved::Name(match name.strip_suffix('.') {
                            Some(stripped) => stripped.to_string(),
                            None => name,
                        }))
                    });
                let _ = reply.send(answer).await;
            }
        }
    }
}
