// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! Typed decoding of the management-protocol tables polled from network
//! devices.  Each table module turns the raw (index, value) pairs of a bulk
//! walk into typed records, cross-referencing them through the local
//! interface index where the tables share one.

use thiserror::Error;

pub mod arp;
pub mod mac_table;
pub mod macaddr;
pub mod neighbor;
pub mod port;
pub mod session;

pub use macaddr::MacAddr;
pub use session::{ConnectionProfile, Connector, Pdu, Session, SessionError, Value};

/// A malformed table index or value.  Any of these aborts the poll of the
/// device that produced it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{table} index {index:?}: expected {want} components, found {found}")]
    IndexShape {
        table: &'static str,
        index: String,
        want: usize,
        found: usize,
    },
    #[error("{table} index {index:?}: component {component:?} is not an integer")]
    IndexComponent {
        table: &'static str,
        index: String,
        component: String,
    },
    #[error("{table} index {index:?}: hardware address octet out of range")]
    AddressOctet { table: &'static str, index: String },
    #[error("{table} index {index:?}: unsupported address family {family:?}")]
    AddressFamily {
        table: &'static str,
        index: String,
        family: String,
    },
    #[error("{table} index {index:?}: {ip:?} is not an IP address")]
    IpAddress {
        table: &'static str,
        index: String,
        ip: String,
    },
    #[error("{table}: unexpected value type at {oid}")]
    ValueType { table: &'static str, oid: String },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Strip a table prefix from a walked OID, leaving the index suffix
/// (including its leading separator).
fn index_suffix<'a>(oid: &'a str, prefix: &str) -> &'a str {
    oid.strip_prefix(prefix).unwrap_or(oid)
}
