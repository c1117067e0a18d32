// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The capability boundary to the management-protocol transport.  The
//! decoders in this crate consume [`Pdu`]s; how they travel over the wire is
//! the transport implementation's business.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// A single value returned from a get or a table walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Int(_) => None,
            Value::Bytes(b) => Some(b),
        }
    }

    /// A byte value interpreted as text.
    pub fn to_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// One (OID, value) pair from a table walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pdu {
    pub oid: String,
    pub value: Value,
}

impl Pdu {
    pub fn new(oid: impl ToString, value: Value) -> Self {
        Pdu {
            oid: oid.to_string(),
            value,
        }
    }
}

/// An error raised by the transport, not by table decoding.
#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct SessionError(pub String);

/// Version-3 connection parameters for one device, as stored in the device
/// directory.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConnectionProfile {
    pub transport: String,
    pub community: String,
    /// Per-request timeout, in seconds.
    pub timeout: u64,
    pub retries: u32,
    pub max_oids: u32,
    pub max_repetitions: u32,
    pub msg_flags: u8,
    pub security_model: u8,
    pub auth_protocol: u8,
    pub username: String,
    pub password: String,
    pub priv_protocol: u8,
    pub priv_password: String,
}

/// An open management session with one device.  Dropping the session
/// releases the underlying connection.
#[async_trait]
pub trait Session: Send {
    /// Scalar get of the named OIDs, keyed by OID in the result.
    async fn get(
        &mut self,
        oids: &[&str],
    ) -> Result<HashMap<String, Value>, SessionError>;

    /// Bulk-walk the table rooted at `oid`.
    async fn walk(&mut self, oid: &str) -> Result<Vec<Pdu>, SessionError>;
}

/// Opens [`Session`]s from directory-provided connection parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        profile: &ConnectionProfile,
    ) -> Result<Self::Session, SessionError>;
}
