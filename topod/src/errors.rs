// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::convert;

#[derive(Debug, thiserror::Error)]
pub enum TopodError {
    /// Could not open a management session; the device contributes nothing
    /// to this cycle.
    #[error("connection error: {0}")]
    Connection(String),
    /// A walk or get failed mid-poll.
    #[error("session error: {0}")]
    Session(String),
    /// A table produced a malformed index or value.
    #[error("decode error: {0}")]
    Decode(#[from] protocol::DecodeError),
    #[error("resolution error: {0}")]
    Resolution(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("error: {0}")]
    Other(String),
}

impl convert::From<String> for TopodError {
    fn from(err: String) -> Self {
        TopodError::Other(err)
    }
}

impl convert::From<&str> for TopodError {
    fn from(err: &str) -> Self {
        TopodError::Other(err.to_string())
    }
}
