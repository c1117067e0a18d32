// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fmt;
use std::str::FromStr;

use serde::Serializer;
use thiserror::Error;

/// An EUI-48 hardware address, as reported in table values and encoded in
/// table indices.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MacAddr {
    a: [u8; 6],
}

impl MacAddr {
    /// The all-zero address the protocol reports to mean "no entry".
    pub const UNKNOWN: Self = MacAddr { a: [0u8; 6] };

    /// Build an address from a table value, which must be exactly six
    /// octets.  Agents report zero-length values for interfaces with no
    /// layer-2 address.
    pub fn from_bytes(b: &[u8]) -> Option<MacAddr> {
        let a: [u8; 6] = b.try_into().ok()?;
        Some(MacAddr { a })
    }

    /// Return `true` if `self` is the all-zero "no entry" address.
    pub fn is_null(self) -> bool {
        self == MacAddr::UNKNOWN
    }

    pub fn octets(self) -> [u8; 6] {
        self.a
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(a: [u8; 6]) -> Self {
        Self { a }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacError {
    /// Not six colon-separated octets
    #[error("Expected 6 octets")]
    Length,
    /// Found an octet with a non-hexadecimal character
    #[error("Invalid octet")]
    InvalidOctet,
}

impl FromStr for MacAddr {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Self, MacError> {
        let mut a = [0u8; 6];
        let mut octets = s.split(':');
        for slot in a.iter_mut() {
            let octet = octets.next().ok_or(MacError::Length)?;
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| MacError::InvalidOctet)?;
        }
        if octets.next().is_some() {
            return Err(MacError::Length);
        }
        Ok(MacAddr { a })
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.a[0], self.a[1], self.a[2], self.a[3], self.a[4], self.a[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl serde::Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let mac: MacAddr = "aa:bb:cc:00:00:01".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0xcc, 0, 0, 1]);
        assert_eq!(mac.to_string(), "aa:bb:cc:00:00:01");

        assert_eq!("aa:bb:cc:00:01".parse::<MacAddr>(), Err(MacError::Length));
        assert_eq!(
            "aa:bb:cc:00:00:01:02".parse::<MacAddr>(),
            Err(MacError::Length)
        );
        assert_eq!(
            "aa:bb:cc:00:00:zz".parse::<MacAddr>(),
            Err(MacError::InvalidOctet)
        );
    }

    #[test]
    fn test_null_sentinel() {
        assert!(MacAddr::from([0; 6]).is_null());
        assert!(!MacAddr::from([0, 0, 0, 0, 0, 1]).is_null());
        assert_eq!(MacAddr::from_bytes(&[0xde, 0xad]), None);
        assert_eq!(
            MacAddr::from_bytes(&[1, 2, 3, 4, 5, 6]),
            Some(MacAddr::from([1, 2, 3, 4, 5, 6]))
        );
    }
}
