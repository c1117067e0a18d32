// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! A transport backed by the net-snmp command-line tools.  Gets and walks
//! exec `snmpget`/`snmpbulkwalk` with the device's version-3 credentials
//! and parse their output; nothing here understands the wire encoding.

use std::collections::HashMap;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use protocol::ConnectionProfile;
use protocol::Connector;
use protocol::Pdu;
use protocol::Session;
use protocol::SessionError;
use protocol::Value;

const SYSTEM_UPTIME: &str = ".1.3.6.1.2.1.1.3.0";

pub struct NetSnmp;

impl NetSnmp {
    pub fn new() -> NetSnmp {
        NetSnmp
    }
}

fn security_level(msg_flags: u8) -> &'static str {
    match msg_flags & 0x3 {
        3 => "authPriv",
        1 => "authNoPriv",
        _ => "noAuthNoPriv",
    }
}

fn auth_protocol(code: u8) -> &'static str {
    match code {
        2 => "MD5",
        _ => "SHA",
    }
}

fn priv_protocol(code: u8) -> &'static str {
    match code {
        2 => "DES",
        _ => "AES",
    }
}

pub struct NetSnmpSession {
    target: String,
    args: Vec<String>,
    max_repetitions: u32,
}

impl NetSnmpSession {
    fn new(host: &str, port: u16, profile: &ConnectionProfile) -> Self {
        let target = if profile.transport.is_empty() {
            format!("{host}:{port}")
        } else {
            format!("{}:{host}:{port}", profile.transport)
        };
        let args = vec![
            "-v3".to_string(),
            "-l".to_string(),
            security_level(profile.msg_flags).to_string(),
            "-u".to_string(),
            profile.username.clone(),
            "-a".to_string(),
            auth_protocol(profile.auth_protocol).to_string(),
            "-A".to_string(),
            profile.password.clone(),
            "-x".to_string(),
            priv_protocol(profile.priv_protocol).to_string(),
            "-X".to_string(),
            profile.priv_password.clone(),
            "-t".to_string(),
            profile.timeout.to_string(),
            "-r".to_string(),
            profile.retries.to_string(),
            // numeric OIDs, numeric enums, hex octet strings
            "-On".to_string(),
            "-Oe".to_string(),
            "-Ox".to_string(),
        ];
        NetSnmpSession {
            target,
            args,
            max_repetitions: profile.max_repetitions,
        }
    }

    async fn run(&self, tool: &str, extra: &[String]) -> Result<String, SessionError> {
        let output: Output = Command::new(tool)
            .args(&self.args)
            .args(extra)
            .arg(&self.target)
            .output()
            .await
            .map_err(|e| SessionError(format!("exec {tool}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError(format!(
                "{tool} {}: {}",
                self.target,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse one "<oid> = <TYPE>: <value>" output line.  Lines for value types
/// the decoders never consume are dropped here.
fn parse_line(line: &str) -> Option<Pdu> {
    let (oid, rest) = line.split_once(" = ")?;
    if !oid.starts_with('.') {
        return None;
    }
    if rest == "\"\"" {
        return Some(Pdu::new(oid, Value::Bytes(Vec::new())));
    }
    let (kind, val) = rest.split_once(':')?;
    let val = val.trim();
    let value = match kind {
        "INTEGER" | "Gauge32" | "Counter32" | "Counter64" => {
            Value::Int(val.parse().ok()?)
        }
        "Hex-STRING" => Value::Bytes(
            val.split_whitespace()
                .map(|pair| u8::from_str_radix(pair, 16))
                .collect::<Result<Vec<u8>, _>>()
                .ok()?,
        ),
        "STRING" => {
            Value::Bytes(val.trim_matches('"').as_bytes().to_vec())
        }
        _ => return None,
    };
    Some(Pdu::new(oid, value))
}

#[async_trait]
impl Session for NetSnmpSession {
    async fn get(
        &mut self,
        oids: &[&str],
    ) -> Result<HashMap<String, Value>, SessionError> {
        let extra: Vec<String> =
            oids.iter().map(|o| o.to_string()).collect();
        let stdout = self.run("snmpget", &extra).await?;
        Ok(stdout
            .lines()
            .filter_map(parse_line)
            .map(|pdu| (pdu.oid, pdu.value))
            .collect())
    }

    async fn walk(&mut self, oid: &str) -> Result<Vec<Pdu>, SessionError> {
        let extra = vec![
            format!("-Cr{}", self.max_repetitions.max(1)),
            oid.to_string(),
        ];
        let stdout = self.run("snmpbulkwalk", &extra).await?;
        Ok(stdout.lines().filter_map(parse_line).collect())
    }
}

#[async_trait]
impl Connector for NetSnmp {
    type Session = NetSnmpSession;

    async fn connect(
        &self,
        host: &str,
        port: u16,
        profile: &ConnectionProfile,
    ) -> Result<NetSnmpSession, SessionError> {
        let session = NetSnmpSession::new(host, port, profile);
        // one scalar get to establish the agent is actually there and the
        // credentials work
        session
            .run("snmpget", &[SYSTEM_UPTIME.to_string()])
            .await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let pdu = parse_line(
            ".1.3.6.1.2.1.2.2.1.6.1 = Hex-STRING: AA BB CC 00 00 01",
        )
        .unwrap();
        assert_eq!(pdu.oid, ".1.3.6.1.2.1.2.2.1.6.1");
        assert_eq!(
            pdu.value,
            Value::Bytes(vec![0xaa, 0xbb, 0xcc, 0, 0, 1])
        );

        let pdu =
            parse_line(".1.3.6.1.2.1.2.2.1.8.1 = INTEGER: 1").unwrap();
        assert_eq!(pdu.value, Value::Int(1));

        let pdu = parse_line(
            ".1.3.6.1.2.1.31.1.1.1.15.1 = Gauge32: 1000",
        )
        .unwrap();
        assert_eq!(pdu.value, Value::Int(1000));

        let pdu =
            parse_line(".1.3.6.1.2.1.2.2.1.2.1 = STRING: \"Gi0/1\"")
                .unwrap();
        assert_eq!(pdu.value, Value::Bytes(b"Gi0/1".to_vec()));

        let pdu = parse_line(".1.3.6.1.2.1.2.2.1.2.99 = \"\"").unwrap();
        assert_eq!(pdu.value, Value::Bytes(Vec::new()));

        // types the decoders never consume
        assert!(parse_line(
            ".1.3.6.1.2.1.1.3.0 = Timeticks: (1234) 0:00:12.34"
        )
        .is_none());
        assert!(parse_line("garbage").is_none());
    }

    #[test]
    fn test_v3_argument_mapping() {
        assert_eq!(security_level(3), "authPriv");
        assert_eq!(security_level(1), "authNoPriv");
        assert_eq!(security_level(0), "noAuthNoPriv");
        assert_eq!(auth_protocol(2), "MD5");
        assert_eq!(auth_protocol(3), "SHA");
        assert_eq!(priv_protocol(2), "DES");
        assert_eq!(priv_protocol(3), "AES");
    }
}
