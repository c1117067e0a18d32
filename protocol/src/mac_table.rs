// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use serde::Serialize;

use crate::index_suffix;
use crate::macaddr::MacAddr;
use crate::port::PortRef;
use crate::port::PortTable;
use crate::session::Pdu;
use crate::DecodeError;
use crate::Result;

pub const PORT: &str = ".1.3.6.1.2.1.17.7.1.2.2.1.2";

const TABLE: &str = "mac-table";

/// One learned forwarding-table entry.  `port` is the local port the
/// address was learned on, when that port survived interface-table
/// decoding.
#[derive(Clone, Debug, Serialize)]
pub struct MacTableEntry {
    pub mac_address: MacAddr,
    pub vlan: i32,
    pub port: Option<PortRef>,
}

/// Decode the forwarding table.  The index encodes ".<vlan>.<o1>...<o6>"
/// where the six decimal octets are the learned hardware address; the
/// walked value is the local interface index the address was seen on.
pub fn decode(pdus: &[Pdu], ports: &PortTable) -> Result<Vec<MacTableEntry>> {
    let mut entries = Vec::with_capacity(pdus.len());

    for pdu in pdus {
        let index = index_suffix(&pdu.oid, PORT);
        let parts: Vec<&str> = index.split('.').collect();
        if parts.len() != 8 {
            return Err(DecodeError::IndexShape {
                table: TABLE,
                index: index.to_string(),
                want: 8,
                found: parts.len(),
            });
        }
        let vlan: i32 =
            parts[1].parse().map_err(|_| DecodeError::IndexComponent {
                table: TABLE,
                index: index.to_string(),
                component: parts[1].to_string(),
            })?;
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(&parts[2..]) {
            *slot = part.parse().map_err(|_| DecodeError::AddressOctet {
                table: TABLE,
                index: index.to_string(),
            })?;
        }
        let mac = MacAddr::from(octets);
        if mac.is_null() {
            continue;
        }

        let ifindex = pdu.value.as_int().ok_or_else(|| {
            DecodeError::ValueType {
                table: TABLE,
                oid: pdu.oid.clone(),
            }
        })?;
        let port = u32::try_from(ifindex)
            .ok()
            .and_then(|id| ports.get(&id))
            .map(|p| p.to_ref());

        entries.push(MacTableEntry {
            mac_address: mac,
            vlan,
            port,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port;
    use crate::session::Value;

    fn port_table() -> PortTable {
        port::decode(
            "sw1",
            &[Pdu::new(
                format!("{}.3", port::MAC_ADDRESS),
                Value::Bytes(vec![0, 0, 0, 0, 0, 0x33]),
            )],
            &[Pdu::new(
                format!("{}.3", port::NAME),
                Value::Bytes(b"Gi0/3".to_vec()),
            )],
            &[],
            &[],
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_decode() {
        let entries = decode(
            &[Pdu::new(format!("{PORT}.10.0.1.2.3.4.5"), Value::Int(3))],
            &port_table(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].vlan, 10);
        assert_eq!(entries[0].mac_address.to_string(), "00:01:02:03:04:05");
        let port = entries[0].port.as_ref().unwrap();
        assert_eq!(port.system_name, "sw1");
        assert_eq!(port.port_name, "Gi0/3");
    }

    #[test]
    fn test_unknown_port_kept() {
        let entries = decode(
            &[Pdu::new(format!("{PORT}.10.0.1.2.3.4.5"), Value::Int(99))],
            &port_table(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].port.is_none());
    }

    #[test]
    fn test_sentinel_skipped() {
        let entries = decode(
            &[Pdu::new(format!("{PORT}.10.0.0.0.0.0.0"), Value::Int(3))],
            &port_table(),
        )
        .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_bad_index() {
        let err = decode(
            &[Pdu::new(format!("{PORT}.10.0.1.2.3.4"), Value::Int(3))],
            &port_table(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IndexShape { want: 8, found: 7, .. }
        ));

        let err = decode(
            &[Pdu::new(format!("{PORT}.x.0.1.2.3.4.5"), Value::Int(3))],
            &port_table(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::IndexComponent { .. }));

        let err = decode(
            &[Pdu::new(format!("{PORT}.10.0.1.2.3.4.256"), Value::Int(3))],
            &port_table(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::AddressOctet { .. }));
    }
}
