// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::net::IpAddr;

use serde::Deserialize;
use serde::Serialize;

use protocol::arp::ArpEntry;
use protocol::mac_table::MacTableEntry;
use protocol::neighbor::NeighborRecord;
use protocol::port::Port;
use protocol::ConnectionProfile;

use crate::errors;

pub type TopodResult<T> = Result<T, errors::TopodError>;

/// One device to poll, as read from the device directory.
#[derive(Clone, Debug, Deserialize)]
pub struct Device {
    pub hostname: String,
    pub port: u16,
    pub connection: ConnectionProfile,
}

/// A hostname found for an IP discovered in a device's neighbor cache.
#[derive(Clone, Debug, Serialize)]
pub struct ResolveEntry {
    pub ip_address: IpAddr,
    pub hostname: String,
}

/// Everything learned from the network in one poll: built per device by
/// the collector, then concatenated across devices by the aggregator.
/// Cross-device deduplication is the journal builder's job, not this
/// struct's.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Snapshot {
    pub ports: Vec<Port>,
    pub neighbors: Vec<NeighborRecord>,
    pub mac_addresses: Vec<MacTableEntry>,
    pub arps: Vec<ArpEntry>,
    pub resolves: Vec<ResolveEntry>,
}

impl Snapshot {
    /// Fold another device's results in, as one atomic unit.
    pub fn absorb(&mut self, other: Snapshot) {
        self.ports.extend(other.ports);
        self.neighbors.extend(other.neighbors);
        self.mac_addresses.extend(other.mac_addresses);
        self.arps.extend(other.arps);
        self.resolves.extend(other.resolves);
    }
}
