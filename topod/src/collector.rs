// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::net::IpAddr;
use std::sync::Arc;

use protocol::arp;
use protocol::mac_table;
use protocol::neighbor;
use protocol::port;
use protocol::Connector;
use protocol::Pdu;
use protocol::Session;
use protocol::Value;

use crate::errors::TopodError;
use crate::resolver;
use crate::types::Device;
use crate::types::ResolveEntry;
use crate::types::Snapshot;
use crate::types::TopodResult;

const SYSTEM_NAME: &str = ".1.3.6.1.2.1.1.5.0";

async fn walk<S: Session>(
    session: &mut S,
    oid: &str,
    what: &'static str,
) -> TopodResult<Vec<Pdu>> {
    session
        .walk(oid)
        .await
        .map_err(|e| TopodError::Session(format!("walking {what}: {e}")))
}

/// Poll one device and assemble its snapshot.  Table order matters: the
/// neighbor cache goes first so its addresses can resolve while the
/// remaining tables are walked, and the interface table must precede the
/// tables that link records to ports.  Any decode failure aborts the whole
/// device; a partial snapshot is never published.
pub async fn collect<C: Connector>(
    connector: &C,
    resolver: &Arc<resolver::Service>,
    device: &Device,
) -> TopodResult<Snapshot> {
    let mut session = connector
        .connect(&device.hostname, device.port, &device.connection)
        .await
        .map_err(|e| {
            TopodError::Connection(format!(
                "opening session to {}:{}: {e}",
                device.hostname, device.port
            ))
        })?;

    let arps = arp::decode(
        &walk(&mut session, arp::PHYS_ADDRESS, "arp table").await?,
    )?;

    // Reverse resolution proceeds while the remaining tables are walked;
    // the join at the bottom waits for it.
    let ips: Vec<IpAddr> = arps.iter().map(|a| a.ip_address).collect();
    let svc = Arc::clone(resolver);
    let resolves =
        tokio::task::spawn(async move { resolve_all(svc, ips).await });

    let scalars = session.get(&[SYSTEM_NAME]).await.map_err(|e| {
        TopodError::Session(format!("getting system name: {e}"))
    })?;
    let system_name = scalars
        .get(SYSTEM_NAME)
        .and_then(Value::to_text)
        .unwrap_or_default();

    let ports = port::decode(
        &system_name,
        &walk(&mut session, port::MAC_ADDRESS, "port addresses").await?,
        &walk(&mut session, port::NAME, "port names").await?,
        &walk(&mut session, port::DESCRIPTION, "port descriptions").await?,
        &walk(&mut session, port::LINK_STATUS, "port link statuses").await?,
        &walk(&mut session, port::SPEED, "port speeds").await?,
    )?;

    let neighbors = neighbor::decode(
        &ports,
        &walk(&mut session, neighbor::SYSTEM_NAME, "neighbor systems").await?,
        &walk(&mut session, neighbor::PORT_NAME, "neighbor ports").await?,
        &walk(&mut session, neighbor::PORT_ID_SUBTYPE, "neighbor subtypes")
            .await?,
        &walk(&mut session, neighbor::MAC_ADDRESS, "neighbor addresses")
            .await?,
    )?;

    let mac_addresses = mac_table::decode(
        &walk(&mut session, mac_table::PORT, "mac table").await?,
        &ports,
    )?;

    let resolves = resolves
        .await
        .map_err(|e| TopodError::Resolution(format!("resolve join: {e}")))?;

    Ok(Snapshot {
        ports: ports.into_values().collect(),
        neighbors,
        mac_addresses,
        arps,
        resolves,
    })
}

async fn resolve_all(
    svc: Arc<resolver::Service>,
    ips: Vec<IpAddr>,
) -> Vec<ResolveEntry> {
    let lookups = ips.into_iter().map(|ip| {
        let svc = Arc::clone(&svc);
        async move {
            svc.lookup_addr(ip).await.ok().map(|hostname| ResolveEntry {
                ip_address: ip,
                hostname,
            })
        }
    });
    futures::future::join_all(lookups)
        .await
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use protocol::ConnectionProfile;
    use protocol::SessionError;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use crate::resolver::Lookup;
    use crate::resolver::LookupError;

    pub(crate) fn profile() -> ConnectionProfile {
        ConnectionProfile {
            transport: "udp".to_string(),
            community: String::new(),
            timeout: 2,
            retries: 1,
            max_oids: 60,
            max_repetitions: 50,
            msg_flags: 3,
            security_model: 3,
            auth_protocol: 2,
            username: "poller".to_string(),
            password: "secret".to_string(),
            priv_protocol: 2,
            priv_password: "secret".to_string(),
        }
    }

    /// Serves canned walk results keyed by OID prefix.
    pub(crate) struct FakeSession {
        pub walks: HashMap<String, Vec<Pdu>>,
        pub system_name: String,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn get(
            &mut self,
            oids: &[&str],
        ) -> Result<HashMap<String, Value>, SessionError> {
            let mut res = HashMap::new();
            for oid in oids {
                if *oid == SYSTEM_NAME {
                    res.insert(
                        oid.to_string(),
                        Value::Bytes(self.system_name.as_bytes().to_vec()),
                    );
                }
            }
            Ok(res)
        }

        async fn walk(&mut self, oid: &str) -> Result<Vec<Pdu>, SessionError> {
            Ok(self.walks.get(oid).cloned().unwrap_or_default())
        }
    }

    /// One fake device per hostname; unknown hostnames refuse the
    /// connection.
    pub(crate) struct FakeConnector {
        pub devices: HashMap<String, HashMap<String, Vec<Pdu>>>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Session = FakeSession;

        async fn connect(
            &self,
            host: &str,
            _port: u16,
            _profile: &ConnectionProfile,
        ) -> Result<FakeSession, SessionError> {
            match self.devices.get(host) {
                Some(walks) => Ok(FakeSession {
                    walks: walks.clone(),
                    system_name: host.to_string(),
                }),
                None => Err(SessionError(format!("{host}: no route"))),
            }
        }
    }

    pub(crate) struct StaticLookup;

    #[async_trait]
    impl Lookup for StaticLookup {
        async fn forward(
            &self,
            _hostname: &str,
        ) -> Result<Vec<IpAddr>, LookupError> {
            Err(LookupError::NoRecords)
        }

        async fn reverse(
            &self,
            addr: IpAddr,
        ) -> Result<Vec<String>, LookupError> {
            match addr {
                IpAddr::V4(v4) if v4 == Ipv4Addr::new(10, 0, 0, 5) => {
                    Ok(vec!["host1.".to_string()])
                }
                _ => Err(LookupError::NoRecords),
            }
        }
    }

    pub(crate) fn device_walks(
        mac_last_octet: u8,
    ) -> HashMap<String, Vec<Pdu>> {
        let mut walks = HashMap::new();
        walks.insert(
            port::MAC_ADDRESS.to_string(),
            vec![Pdu::new(
                format!("{}.1", port::MAC_ADDRESS),
                Value::Bytes(vec![0xaa, 0xbb, 0xcc, 0, 0, mac_last_octet]),
            )],
        );
        walks.insert(
            port::NAME.to_string(),
            vec![Pdu::new(
                format!("{}.1", port::NAME),
                Value::Bytes(b"Gi0/1".to_vec()),
            )],
        );
        walks.insert(
            port::LINK_STATUS.to_string(),
            vec![Pdu::new(format!("{}.1", port::LINK_STATUS), Value::Int(1))],
        );
        walks.insert(
            arp::PHYS_ADDRESS.to_string(),
            vec![Pdu::new(
                format!("{}.1.1.4.10.0.0.5", arp::PHYS_ADDRESS),
                Value::Bytes(vec![0xaa, 0xbb, 0xcc, 0, 0, mac_last_octet]),
            )],
        );
        walks
    }

    #[tokio::test]
    async fn test_collect() {
        let connector = FakeConnector {
            devices: HashMap::from([("sw1".to_string(), device_walks(1))]),
        };
        let resolver = Arc::new(resolver::Service::new(StaticLookup, 2, 4));
        let device = Device {
            hostname: "sw1".to_string(),
            port: 161,
            connection: profile(),
        };

        let snapshot =
            collect(&connector, &resolver, &device).await.unwrap();
        assert_eq!(snapshot.ports.len(), 1);
        assert_eq!(snapshot.ports[0].system_name, "sw1");
        assert_eq!(snapshot.ports[0].name, "Gi0/1");
        assert_eq!(snapshot.arps.len(), 1);
        assert_eq!(snapshot.resolves.len(), 1);
        assert_eq!(snapshot.resolves[0].hostname, "host1");
        assert_eq!(
            snapshot.resolves[0].ip_address,
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[tokio::test]
    async fn test_decode_failure_aborts_device() {
        let mut walks = device_walks(1);
        walks.insert(
            arp::PHYS_ADDRESS.to_string(),
            vec![Pdu::new(
                // family tag 9 is not IPv4
                format!("{}.1.9.4.10.0.0.5", arp::PHYS_ADDRESS),
                Value::Bytes(vec![0xaa, 0xbb, 0xcc, 0, 0, 1]),
            )],
        );
        let connector = FakeConnector {
            devices: HashMap::from([("sw1".to_string(), walks)]),
        };
        let resolver = Arc::new(resolver::Service::new(StaticLookup, 1, 1));
        let device = Device {
            hostname: "sw1".to_string(),
            port: 161,
            connection: profile(),
        };

        let err = collect(&connector, &resolver, &device).await.unwrap_err();
        assert!(matches!(err, TopodError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = FakeConnector { devices: HashMap::new() };
        let resolver = Arc::new(resolver::Service::new(StaticLookup, 1, 1));
        let device = Device {
            hostname: "unreachable".to_string(),
            port: 161,
            connection: profile(),
        };

        let err = collect(&connector, &resolver, &device).await.unwrap_err();
        assert!(matches!(err, TopodError::Connection(_)));
    }
}
