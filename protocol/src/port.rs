// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::index_suffix;
use crate::macaddr::MacAddr;
use crate::session::Pdu;
use crate::DecodeError;
use crate::Result;

pub const MAC_ADDRESS: &str = ".1.3.6.1.2.1.2.2.1.6";
pub const NAME: &str = ".1.3.6.1.2.1.2.2.1.2";
pub const DESCRIPTION: &str = ".1.3.6.1.2.1.31.1.1.1.18";
pub const LINK_STATUS: &str = ".1.3.6.1.2.1.2.2.1.8";
pub const SPEED: &str = ".1.3.6.1.2.1.31.1.1.1.15";

const TABLE: &str = "port";

/// Operational state of a port, as reported by the interface table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub enum LinkStatus {
    Up,
    Down,
    Testing,
    #[default]
    Unknown,
    Dormant,
    NotPresent,
    LowerLayerDown,
}

impl From<i64> for LinkStatus {
    fn from(v: i64) -> Self {
        match v {
            1 => LinkStatus::Up,
            2 => LinkStatus::Down,
            3 => LinkStatus::Testing,
            5 => LinkStatus::Dormant,
            6 => LinkStatus::NotPresent,
            7 => LinkStatus::LowerLayerDown,
            _ => LinkStatus::Unknown,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            LinkStatus::Up => "Up",
            LinkStatus::Down => "Down",
            LinkStatus::Testing => "Testing",
            LinkStatus::Unknown => "Unknown",
            LinkStatus::Dormant => "Dormant",
            LinkStatus::NotPresent => "NotPresent",
            LinkStatus::LowerLayerDown => "LowerLayerDown",
        };
        f.write_str(s)
    }
}

/// One switch port, assembled from the interface sub-tables.
#[derive(Clone, Debug, Serialize)]
pub struct Port {
    pub system_name: String,
    pub mac_address: MacAddr,
    pub name: String,
    pub description: String,
    pub link_status: LinkStatus,
    pub speed: u64,
}

/// Identifies a port by the key other records link it with.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize)]
pub struct PortRef {
    pub system_name: String,
    pub port_name: String,
}

impl Port {
    pub fn to_ref(&self) -> PortRef {
        PortRef {
            system_name: self.system_name.clone(),
            port_name: self.name.clone(),
        }
    }
}

/// The decoded interface table, keyed by local interface index.
pub type PortTable = BTreeMap<u32, Port>;

/// Parse the single-component interface index that keys every interface
/// sub-table.
fn ifindex(oid: &str, prefix: &str) -> Result<u32> {
    let index = index_suffix(oid, prefix);
    let mut parts = index.split('.');
    // A valid suffix is ".N": one empty component, then the index.
    match (parts.next(), parts.next(), parts.next()) {
        (Some(""), Some(n), None) => {
            n.parse().map_err(|_| DecodeError::IndexComponent {
                table: TABLE,
                index: index.to_string(),
                component: n.to_string(),
            })
        }
        _ => Err(DecodeError::IndexShape {
            table: TABLE,
            index: index.to_string(),
            want: 2,
            found: index.split('.').count(),
        }),
    }
}

/// Join the five interface sub-tables into one port table.  Entries whose
/// hardware address is the "no entry" sentinel are dropped before the other
/// sub-tables are applied, so values arriving for a dropped index have no
/// target and are ignored.  Interfaces that report no hardware address at
/// all (loopbacks and the like) are skipped the same way.
pub fn decode(
    system_name: &str,
    macs: &[Pdu],
    names: &[Pdu],
    descriptions: &[Pdu],
    statuses: &[Pdu],
    speeds: &[Pdu],
) -> Result<PortTable> {
    let mut tbl = PortTable::new();

    for pdu in macs {
        let id = ifindex(&pdu.oid, MAC_ADDRESS)?;
        let Some(bytes) = pdu.value.as_bytes() else {
            return Err(DecodeError::ValueType {
                table: TABLE,
                oid: pdu.oid.clone(),
            });
        };
        let Some(mac) = MacAddr::from_bytes(bytes) else {
            continue;
        };
        if mac.is_null() {
            continue;
        }
        tbl.insert(
            id,
            Port {
                system_name: system_name.to_string(),
                mac_address: mac,
                name: String::new(),
                description: String::new(),
                link_status: LinkStatus::default(),
                speed: 0,
            },
        );
    }

    for pdu in names {
        let id = ifindex(&pdu.oid, NAME)?;
        if let Some(port) = tbl.get_mut(&id) {
            port.name = pdu.value.to_text().ok_or_else(|| {
                DecodeError::ValueType {
                    table: TABLE,
                    oid: pdu.oid.clone(),
                }
            })?;
        }
    }
    for pdu in descriptions {
        let id = ifindex(&pdu.oid, DESCRIPTION)?;
        if let Some(port) = tbl.get_mut(&id) {
            port.description = pdu.value.to_text().ok_or_else(|| {
                DecodeError::ValueType {
                    table: TABLE,
                    oid: pdu.oid.clone(),
                }
            })?;
        }
    }
    for pdu in statuses {
        let id = ifindex(&pdu.oid, LINK_STATUS)?;
        if let Some(port) = tbl.get_mut(&id) {
            let v = pdu.value.as_int().ok_or_else(|| {
                DecodeError::ValueType {
                    table: TABLE,
                    oid: pdu.oid.clone(),
                }
            })?;
            port.link_status = v.into();
        }
    }
    for pdu in speeds {
        let id = ifindex(&pdu.oid, SPEED)?;
        if let Some(port) = tbl.get_mut(&id) {
            let v = pdu.value.as_int().ok_or_else(|| {
                DecodeError::ValueType {
                    table: TABLE,
                    oid: pdu.oid.clone(),
                }
            })?;
            port.speed = v.max(0) as u64;
        }
    }

    Ok(tbl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Value;

    fn mac_pdu(idx: u32, mac: [u8; 6]) -> Pdu {
        Pdu::new(format!("{MAC_ADDRESS}.{idx}"), Value::Bytes(mac.to_vec()))
    }

    fn text_pdu(prefix: &str, idx: u32, s: &str) -> Pdu {
        Pdu::new(
            format!("{prefix}.{idx}"),
            Value::Bytes(s.as_bytes().to_vec()),
        )
    }

    fn int_pdu(prefix: &str, idx: u32, v: i64) -> Pdu {
        Pdu::new(format!("{prefix}.{idx}"), Value::Int(v))
    }

    #[test]
    fn test_join() {
        let tbl = decode(
            "sw1",
            &[mac_pdu(1, [0, 0, 0, 0, 0, 0x11]), mac_pdu(2, [0; 6])],
            &[text_pdu(NAME, 1, "Gi0/1"), text_pdu(NAME, 2, "Gi0/2")],
            &[text_pdu(DESCRIPTION, 1, "uplink")],
            &[int_pdu(LINK_STATUS, 1, 1)],
            &[int_pdu(SPEED, 1, 1000)],
        )
        .unwrap();

        // index 2 carried the sentinel address and must not survive, even
        // though a name arrived for it
        assert_eq!(tbl.len(), 1);
        let port = &tbl[&1];
        assert_eq!(port.system_name, "sw1");
        assert_eq!(port.name, "Gi0/1");
        assert_eq!(port.description, "uplink");
        assert_eq!(port.link_status, LinkStatus::Up);
        assert_eq!(port.speed, 1000);
    }

    #[test]
    fn test_join_order_independent() {
        let macs = [
            mac_pdu(3, [0, 0, 0, 0, 0, 3]),
            mac_pdu(1, [0, 0, 0, 0, 0, 1]),
            mac_pdu(2, [0; 6]),
        ];
        let names = [
            text_pdu(NAME, 2, "drop-me"),
            text_pdu(NAME, 3, "Gi0/3"),
            text_pdu(NAME, 1, "Gi0/1"),
        ];
        let forward =
            decode("sw1", &macs, &names, &[], &[], &[]).unwrap();

        let mut macs_rev = macs.to_vec();
        macs_rev.reverse();
        let mut names_rev = names.to_vec();
        names_rev.reverse();
        let reversed =
            decode("sw1", &macs_rev, &names_rev, &[], &[], &[]).unwrap();

        assert_eq!(forward.len(), 2);
        assert_eq!(forward.keys().collect::<Vec<_>>(), vec![&1, &3]);
        for (id, port) in &forward {
            assert_eq!(port.name, reversed[id].name);
            assert_eq!(port.mac_address, reversed[id].mac_address);
        }
    }

    #[test]
    fn test_partial_rows_tolerated() {
        let tbl = decode(
            "sw1",
            &[mac_pdu(4, [0, 0, 0, 0, 0, 4])],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap();
        let port = &tbl[&4];
        assert_eq!(port.name, "");
        assert_eq!(port.description, "");
        assert_eq!(port.link_status, LinkStatus::Unknown);
        assert_eq!(port.speed, 0);
    }

    #[test]
    fn test_bad_index() {
        let err = decode(
            "sw1",
            &[Pdu::new(
                format!("{MAC_ADDRESS}.1.2"),
                Value::Bytes(vec![0, 0, 0, 0, 0, 1]),
            )],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::IndexShape { .. }));

        let err = decode(
            "sw1",
            &[Pdu::new(
                format!("{MAC_ADDRESS}.x"),
                Value::Bytes(vec![0, 0, 0, 0, 0, 1]),
            )],
            &[],
            &[],
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::IndexComponent { .. }));
    }
}
