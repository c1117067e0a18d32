// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Translation of one poll cycle's snapshot into the upsert graph the
//! persistence backend consumes.
//!
//! Entity nodes live in per-type arenas and are addressed by handle, so a
//! node discovered through several tables exists exactly once and every
//! journal row referencing it shares it.  The one mutation the build makes
//! after creating a node is the hostname upgrade: when an ARP entry ties an
//! IP to a system we polled and a resolution later names that IP, the
//! system node gains the hostname link and a conflict clause that also
//! overwrites it.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

use protocol::MacAddr;

use crate::types::Snapshot;

/// A SQL upsert clause: which uniqueness constraint identifies an existing
/// row, and which columns the new data overwrites on conflict.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Upsert {
    pub constraint: &'static str,
    pub update_columns: &'static [&'static str],
}

const HOSTNAME_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_hostname",
    update_columns: &["hostname"],
};
const SYSTEM_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_system_name",
    update_columns: &["name"],
};
const SYSTEM_ON_CONFLICT_HOSTNAME: Upsert = Upsert {
    constraint: "unique_system_name",
    update_columns: &["name", "hostname_id"],
};
const MAC_ADDRESS_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_mac_address",
    update_columns: &["mac_address"],
};
// Ports we observed directly carry their address and description; ports
// synthesized from a neighbor advertisement carry neither, so they must
// not overwrite those columns.
const PORT_ON_CONFLICT_FULL: Upsert = Upsert {
    constraint: "unique_port_system_name",
    update_columns: &["system_id", "name", "mac_address_id", "description"],
};
const PORT_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_port_system_name",
    update_columns: &["system_id", "name"],
};
const NEIGHBOR_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_lldp",
    update_columns: &["local_port_id", "remote_port_id"],
};
const IP_ADDRESS_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_ip_address",
    update_columns: &["ip_address"],
};
const ARP_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_arp",
    update_columns: &["mac_address_id", "ip_address_id"],
};
const RESOLVE_ON_CONFLICT: Upsert = Upsert {
    constraint: "unique_resolve",
    update_columns: &["ip_address_id", "hostname_id"],
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SystemId(usize);
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MacId(usize);
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IpId(usize);
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostnameId(usize);
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PortId(usize);

#[derive(Clone, Debug)]
pub struct SystemNode {
    pub name: String,
    pub hostname: Option<HostnameId>,
    pub on_conflict: Upsert,
}

#[derive(Clone, Debug)]
pub struct PortNode {
    pub system: SystemId,
    pub mac_address: MacId,
    pub name: String,
    pub description: String,
    pub on_conflict: Upsert,
}

#[derive(Clone, Debug)]
pub struct PortRow {
    pub port: PortId,
    pub status: String,
    pub speed: u64,
}

#[derive(Clone, Debug)]
pub struct NeighborRow {
    pub local_port: PortId,
    pub remote_port: PortId,
}

#[derive(Clone, Debug)]
pub struct MacRow {
    pub mac_address: MacId,
    pub port: Option<PortId>,
    pub vlan: i32,
}

#[derive(Clone, Debug)]
pub struct ArpRow {
    pub mac_address: MacId,
    pub ip_address: IpId,
}

#[derive(Clone, Debug)]
pub struct ResolveRow {
    pub ip_address: IpId,
    pub hostname: HostnameId,
}

/// One build's worth of journal rows plus the entity arenas they point
/// into.  Built fresh every cycle and discarded after submission.
#[derive(Debug)]
pub struct Journal {
    pub time: DateTime<Utc>,

    systems: Vec<SystemNode>,
    macs: Vec<MacAddr>,
    ips: Vec<IpAddr>,
    hostnames: Vec<String>,
    ports: Vec<PortNode>,

    pub port_rows: Vec<PortRow>,
    pub neighbor_rows: Vec<NeighborRow>,
    pub mac_rows: Vec<MacRow>,
    pub arp_rows: Vec<ArpRow>,
    pub resolve_rows: Vec<ResolveRow>,
}

struct Builder {
    journal: Journal,

    // Arena lookups, keyed by the identity each node type dedups on.
    systems_by_mac: HashMap<MacAddr, SystemId>,
    ports_by_key: HashMap<(String, String), PortId>,
    macs_by_value: HashMap<MacAddr, MacId>,
    ips_by_value: HashMap<IpAddr, IpId>,
    hostnames_by_value: HashMap<String, HostnameId>,

    // IPs whose hardware address matched a polled system, remembered so a
    // later resolution can name that system.
    systems_by_ip: HashMap<IpAddr, SystemId>,
}

impl Builder {
    fn new(time: DateTime<Utc>) -> Builder {
        Builder {
            journal: Journal {
                time,
                systems: Vec::new(),
                macs: Vec::new(),
                ips: Vec::new(),
                hostnames: Vec::new(),
                ports: Vec::new(),
                port_rows: Vec::new(),
                neighbor_rows: Vec::new(),
                mac_rows: Vec::new(),
                arp_rows: Vec::new(),
                resolve_rows: Vec::new(),
            },
            systems_by_mac: HashMap::new(),
            ports_by_key: HashMap::new(),
            macs_by_value: HashMap::new(),
            ips_by_value: HashMap::new(),
            hostnames_by_value: HashMap::new(),
            systems_by_ip: HashMap::new(),
        }
    }

    fn system(&mut self, mac: MacAddr, name: &str) -> SystemId {
        if let Some(&id) = self.systems_by_mac.get(&mac) {
            return id;
        }
        let id = SystemId(self.journal.systems.len());
        self.journal.systems.push(SystemNode {
            name: name.to_string(),
            hostname: None,
            on_conflict: SYSTEM_ON_CONFLICT,
        });
        self.systems_by_mac.insert(mac, id);
        id
    }

    fn mac(&mut self, mac: MacAddr) -> MacId {
        if let Some(&id) = self.macs_by_value.get(&mac) {
            return id;
        }
        let id = MacId(self.journal.macs.len());
        self.journal.macs.push(mac);
        self.macs_by_value.insert(mac, id);
        id
    }

    fn ip(&mut self, ip: IpAddr) -> IpId {
        if let Some(&id) = self.ips_by_value.get(&ip) {
            return id;
        }
        let id = IpId(self.journal.ips.len());
        self.journal.ips.push(ip);
        self.ips_by_value.insert(ip, id);
        id
    }

    fn hostname(&mut self, name: &str) -> HostnameId {
        if let Some(&id) = self.hostnames_by_value.get(name) {
            return id;
        }
        let id = HostnameId(self.journal.hostnames.len());
        self.journal.hostnames.push(name.to_string());
        self.hostnames_by_value.insert(name.to_string(), id);
        id
    }

    fn port(&mut self, key: (String, String), node: PortNode) -> PortId {
        let id = PortId(self.journal.ports.len());
        self.journal.ports.push(node);
        self.ports_by_key.insert(key, id);
        id
    }
}

/// Build the journal for one aggregated snapshot.  Every row shares the
/// build time; per-row clocks would smear one cycle's facts across
/// distinct timestamps.
pub fn translate(snapshot: &Snapshot) -> Journal {
    let mut b = Builder::new(Utc::now());

    // Locally-observed ports first: everything else links to them.
    for port in &snapshot.ports {
        let system = b.system(port.mac_address, &port.system_name);
        let mac_address = b.mac(port.mac_address);
        let id = b.port(
            (port.system_name.clone(), port.name.clone()),
            PortNode {
                system,
                mac_address,
                name: port.name.clone(),
                description: port.description.clone(),
                on_conflict: PORT_ON_CONFLICT_FULL,
            },
        );
        b.journal.port_rows.push(PortRow {
            port: id,
            status: port.link_status.to_string(),
            speed: port.speed,
        });
    }

    for n in &snapshot.neighbors {
        let local_key = (
            n.local_port.system_name.clone(),
            n.local_port.port_name.clone(),
        );
        let Some(&local_port) = b.ports_by_key.get(&local_key) else {
            continue;
        };
        let remote_key = (n.remote_system.clone(), n.remote_port.clone());
        let remote_port = match b.ports_by_key.get(&remote_key) {
            Some(&id) => id,
            None => {
                let system = b.system(n.remote_mac, &n.remote_system);
                let mac_address = b.mac(n.remote_mac);
                b.port(
                    remote_key,
                    PortNode {
                        system,
                        mac_address,
                        name: n.remote_port.clone(),
                        description: String::new(),
                        on_conflict: PORT_ON_CONFLICT,
                    },
                )
            }
        };
        b.journal.neighbor_rows.push(NeighborRow {
            local_port,
            remote_port,
        });
    }

    for m in &snapshot.mac_addresses {
        let mac_address = b.mac(m.mac_address);
        let port = m.port.as_ref().and_then(|r| {
            b.ports_by_key
                .get(&(r.system_name.clone(), r.port_name.clone()))
                .copied()
        });
        b.journal.mac_rows.push(MacRow {
            mac_address,
            port,
            vlan: m.vlan,
        });
    }

    for a in &snapshot.arps {
        let mac_address = b.mac(a.mac_address);
        let ip_address = b.ip(a.ip_address);
        b.journal.arp_rows.push(ArpRow {
            mac_address,
            ip_address,
        });
        if let Some(&system) = b.systems_by_mac.get(&a.mac_address) {
            b.systems_by_ip.insert(a.ip_address, system);
        }
    }

    for r in &snapshot.resolves {
        let ip_address = b.ip(r.ip_address);
        let hostname = b.hostname(&r.hostname);
        if let Some(&SystemId(idx)) = b.systems_by_ip.get(&r.ip_address) {
            // The one in-place mutation of the build: attach the hostname
            // and widen the conflict clause to overwrite it too.
            let system = &mut b.journal.systems[idx];
            system.hostname = Some(hostname);
            system.on_conflict = SYSTEM_ON_CONFLICT_HOSTNAME;
        }
        b.journal.resolve_rows.push(ResolveRow {
            ip_address,
            hostname,
        });
    }

    b.journal
}

impl Journal {
    pub fn system(&self, id: SystemId) -> &SystemNode {
        &self.systems[id.0]
    }

    pub fn systems(&self) -> &[SystemNode] {
        &self.systems
    }

    pub fn port(&self, id: PortId) -> &PortNode {
        &self.ports[id.0]
    }

    pub fn hostname(&self, id: HostnameId) -> &str {
        &self.hostnames[id.0]
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    pub fn is_empty(&self) -> bool {
        self.port_rows.is_empty()
            && self.neighbor_rows.is_empty()
            && self.mac_rows.is_empty()
            && self.arp_rows.is_empty()
            && self.resolve_rows.is_empty()
    }

    fn hostname_value(&self, id: HostnameId) -> Value {
        json!({
            "data": { "hostname": self.hostnames[id.0] },
            "on_conflict": HOSTNAME_ON_CONFLICT,
        })
    }

    fn system_value(&self, id: SystemId) -> Value {
        let system = &self.systems[id.0];
        let mut data = json!({ "name": system.name });
        if let Some(hostname) = system.hostname {
            data["hostname"] = self.hostname_value(hostname);
        }
        json!({ "data": data, "on_conflict": system.on_conflict })
    }

    fn mac_value(&self, id: MacId) -> Value {
        json!({
            "data": { "mac_address": self.macs[id.0] },
            "on_conflict": MAC_ADDRESS_ON_CONFLICT,
        })
    }

    fn ip_value(&self, id: IpId) -> Value {
        json!({
            "data": { "ip_address": self.ips[id.0] },
            "on_conflict": IP_ADDRESS_ON_CONFLICT,
        })
    }

    fn port_value(&self, id: PortId) -> Value {
        let port = &self.ports[id.0];
        json!({
            "data": {
                "system": self.system_value(port.system),
                "mac_address": self.mac_value(port.mac_address),
                "name": port.name,
                "description": port.description,
            },
            "on_conflict": port.on_conflict,
        })
    }

    /// Render the five row lists as mutation variables.  A node referenced
    /// from several rows renders identically at every site, reflecting any
    /// hostname upgrade that happened after the referencing row was
    /// emitted.
    pub fn variables(&self) -> Value {
        let ports: Vec<Value> = self
            .port_rows
            .iter()
            .map(|r| {
                json!({
                    "port": self.port_value(r.port),
                    "time": self.time,
                    "status": r.status,
                    "speed": r.speed,
                })
            })
            .collect();

        let lldps: Vec<Value> = self
            .neighbor_rows
            .iter()
            .map(|r| {
                json!({
                    "lldp": {
                        "data": {
                            "local_port": self.port_value(r.local_port),
                            "remote_port": self.port_value(r.remote_port),
                        },
                        "on_conflict": NEIGHBOR_ON_CONFLICT,
                    },
                    "time": self.time,
                })
            })
            .collect();

        let mac_addresses: Vec<Value> = self
            .mac_rows
            .iter()
            .map(|r| {
                json!({
                    "mac_address": self.mac_value(r.mac_address),
                    "port": r.port.map(|p| self.port_value(p)),
                    "time": self.time,
                    "vlan": r.vlan,
                })
            })
            .collect();

        let arps: Vec<Value> = self
            .arp_rows
            .iter()
            .map(|r| {
                json!({
                    "arp": {
                        "data": {
                            "mac_address": self.mac_value(r.mac_address),
                            "ip_address": self.ip_value(r.ip_address),
                        },
                        "on_conflict": ARP_ON_CONFLICT,
                    },
                    "time": self.time,
                })
            })
            .collect();

        let resolves: Vec<Value> = self
            .resolve_rows
            .iter()
            .map(|r| {
                json!({
                    "resolve": {
                        "data": {
                            "ip_address": self.ip_value(r.ip_address),
                            "hostname": self.hostname_value(r.hostname),
                        },
                        "on_conflict": RESOLVE_ON_CONFLICT,
                    },
                    "time": self.time,
                })
            })
            .collect();

        json!({
            "ports": ports,
            "lldps": lldps,
            "mac_addresses": mac_addresses,
            "arps": arps,
            "resolves": resolves,
        })
    }
}
