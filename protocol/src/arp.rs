// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::net::IpAddr;

use serde::Serialize;

use crate::index_suffix;
use crate::macaddr::MacAddr;
use crate::session::Pdu;
use crate::DecodeError;
use crate::Result;

pub const PHYS_ADDRESS: &str = ".1.3.6.1.2.1.4.35.1.4";

/// The address-family tag for IPv4 in the table index.  Nothing else is
/// supported.
const FAMILY_IPV4: &str = "1";

const TABLE: &str = "arp";

/// One IP-to-hardware-address mapping from a device's neighbor cache.
#[derive(Clone, Debug, Serialize)]
pub struct ArpEntry {
    pub mac_address: MacAddr,
    pub ip_address: IpAddr,
}

/// Decode the neighbor cache.  The index encodes
/// "<ifindex>.<family>.<length>.<ip octets...>"; the walked value is the
/// hardware address.
pub fn decode(pdus: &[Pdu]) -> Result<Vec<ArpEntry>> {
    let mut entries = Vec::with_capacity(pdus.len());

    for pdu in pdus {
        let index = index_suffix(&pdu.oid, PHYS_ADDRESS)
            .trim_start_matches('.')
            .to_string();
        let parts: Vec<&str> = index.split('.').collect();
        if parts.len() != 7 {
            return Err(DecodeError::IndexShape {
                table: TABLE,
                want: 7,
                found: parts.len(),
                index,
            });
        }
        if parts[1] != FAMILY_IPV4 {
            return Err(DecodeError::AddressFamily {
                table: TABLE,
                family: parts[1].to_string(),
                index,
            });
        }
        let literal = parts[3..].join(".");
        let ip: IpAddr =
            literal.parse().map_err(|_| DecodeError::IpAddress {
                table: TABLE,
                index: index.clone(),
                ip: literal.clone(),
            })?;

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

        entries.push(ArpEntry {
            mac_address: mac,
            ip_address: ip,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Value;

    fn pdu(suffix: &str, mac: [u8; 6]) -> Pdu {
        Pdu::new(
            format!("{PHYS_ADDRESS}.{suffix}"),
            Value::Bytes(mac.to_vec()),
        )
    }

    #[test]
    fn test_decode() {
        let entries =
            decode(&[pdu("2.1.4.10.0.0.5", [0xaa, 0xbb, 0xcc, 0, 0, 1])])
                .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ip_address.to_string(), "10.0.0.5");
        assert_eq!(
            entries[0].mac_address.to_string(),
            "aa:bb:cc:00:00:01"
        );
    }

    #[test]
    fn test_sentinel_skipped() {
        let entries = decode(&[pdu("2.1.4.10.0.0.5", [0; 6])]).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_unsupported_family() {
        let err = decode(&[pdu("2.2.16.10.0.0.5", [0xaa, 0, 0, 0, 0, 1])])
            .unwrap_err();
        match err {
            DecodeError::AddressFamily { family, .. } => {
                assert_eq!(family, "2")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_index() {
        let err =
            decode(&[pdu("2.1.4.10.0.0", [0xaa, 0, 0, 0, 0, 1])]).unwrap_err();
        assert!(matches!(err, DecodeError::IndexShape { .. }));

        let err = decode(&[pdu("2.1.4.10.0.0.999", [0xaa, 0, 0, 0, 0, 1])])
            .unwrap_err();
        assert!(matches!(err, DecodeError::IpAddress { .. }));
    }
}
