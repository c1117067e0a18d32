// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::HashMap;

use serde::Serialize;

use crate::index_suffix;
use crate::macaddr::MacAddr;
use crate::port::PortRef;
use crate::port::PortTable;
use crate::session::Pdu;
use crate::DecodeError;
use crate::Result;

// The prefixes absorb the time-mark index component, leaving a
// ".<local port>.<neighbor>" suffix on every walked OID.
pub const SYSTEM_NAME: &str = ".1.0.8802.1.1.2.1.4.1.1.9.0";
pub const PORT_NAME: &str = ".1.0.8802.1.1.2.1.4.1.1.8.0";
pub const PORT_ID_SUBTYPE: &str = ".1.0.8802.1.1.2.1.4.1.1.6.0";
pub const MAC_ADDRESS: &str = ".1.0.8802.1.1.2.1.4.1.1.7.0";

/// The port-id subtype code meaning the remote port identifier is a
/// hardware address.  Any other subtype (interface name, network address,
/// ...) means the identifier bytes are not an address and must not be
/// treated as one.
const SUBTYPE_MAC_ADDRESS: i64 = 3;

const TABLE: &str = "neighbor";

/// A neighbor advertisement heard on a local port.  The remote descriptor
/// is synthesized from the advertisement; the remote device itself was
/// never polled.
#[derive(Clone, Debug, Serialize)]
pub struct NeighborRecord {
    pub local_port: PortRef,
    pub remote_system: String,
    pub remote_port: String,
    pub remote_mac: MacAddr,
}

#[derive(Default)]
struct Pending {
    local_port: PortRef,
    remote_system: String,
    remote_port: String,
    id_is_mac: bool,
    remote_mac: Option<MacAddr>,
}

/// Join the four neighbor sub-tables.  A record is kept only once its
/// remote system name, remote port name, and a valid hardware address are
/// all present, and the advertised port-id subtype says the identifier is
/// a hardware address.
pub fn decode(
    ports: &PortTable,
    system_names: &[Pdu],
    port_names: &[Pdu],
    subtypes: &[Pdu],
    macs: &[Pdu],
) -> Result<Vec<NeighborRecord>> {
    let mut cache: HashMap<String, Pending> = HashMap::new();
    let mut order = Vec::new();

    for pdu in system_names {
        let index = index_suffix(&pdu.oid, SYSTEM_NAME);
        let parts: Vec<&str> = index.split('.').collect();
        if parts.len() != 3 {
            return Err(DecodeError::IndexShape {
                table: TABLE,
                index: index.to_string(),
                want: 3,
                found: parts.len(),
            });
        }
        let local: u32 =
            parts[1].parse().map_err(|_| DecodeError::IndexComponent {
                table: TABLE,
                index: index.to_string(),
                component: parts[1].to_string(),
            })?;
        // guard against empty duplicates
        let Some(remote_system) =
            pdu.value.to_text().filter(|s| !s.is_empty())
        else {
            continue;
        };
        // an advertisement heard on a port we dropped has nothing to hang
        // off of
        let Some(local_port) = ports.get(&local) else {
            continue;
        };
        cache.insert(
            index.to_string(),
            Pending {
                local_port: local_port.to_ref(),
                remote_system,
                ..Default::default()
            },
        );
        order.push(index.to_string());
    }

    for pdu in port_names {
        let index = index_suffix(&pdu.oid, PORT_NAME);
        if let Some(pending) = cache.get_mut(index) {
            if let Some(name) = pdu.value.to_text().filter(|s| !s.is_empty())
            {
                pending.remote_port = name;
            }
        }
    }

    for pdu in subtypes {
        let index = index_suffix(&pdu.oid, PORT_ID_SUBTYPE);
        if let Some(pending) = cache.get_mut(index) {
            if pdu.value.as_int() == Some(SUBTYPE_MAC_ADDRESS) {
                pending.id_is_mac = true;
            }
        }
    }

    for pdu in macs {
        let index = index_suffix(&pdu.oid, MAC_ADDRESS);
        if let Some(pending) = cache.get_mut(index) {
            pending.remote_mac =
                pdu.value.as_bytes().and_then(MacAddr::from_bytes);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|index| cache.remove(&index))
        .filter_map(|pending| {
            if pending.remote_port.is_empty() || !pending.id_is_mac {
                return None;
            }
            let mac = pending.remote_mac.filter(|m| !m.is_null())?;
            Some(NeighborRecord {
                local_port: pending.local_port,
                remote_system: pending.remote_system,
                remote_port: pending.remote_port,
                remote_mac: mac,
            })
        })
        .collect())
}
