// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

//! The GraphQL persistence collaborator: the device directory is read from
//! it, and each cycle's journal is submitted to it.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use slog::warn;
use tokio::sync::Mutex;

use crate::errors::TopodError;
use crate::types::Device;
use crate::types::TopodResult;

const READ_DEVICES: &str = r#"
query read_devices {
  system(where: {connection_id: {_is_null: false}, hostname: {hostname: {_neq: ""}}, port: {_neq: 0}}) {
    hostname {
      hostname
    }
    port
    connection {
      transport
      community
      timeout
      retries
      max_oids
      max_repetitions
      msg_flags
      security_model
      auth_protocol
      username
      password
      priv_protocol
      priv_password
    }
  }
}
"#;

const INSERT_JOURNAL: &str = r#"
mutation insert_journals(
  $ports: [port_journal_insert_input!]!,
  $lldps: [lldp_journal_insert_input!]!,
  $mac_addresses: [mac_address_journal_insert_input!]!,
  $arps: [arp_journal_insert_input!]!,
  $resolves: [resolve_journal_insert_input!]!
) {
  insert_port_journal(objects: $ports) {
    affected_rows
  }
  insert_lldp_journal(objects: $lldps) {
    affected_rows
  }
  insert_mac_address_journal(objects: $mac_addresses) {
    affected_rows
  }
  insert_arp_journal(objects: $arps) {
    affected_rows
  }
  insert_resolve_journal(objects: $resolves) {
    affected_rows
  }
}
"#;

// On a transport failure the submission is retried in place; the backend
// itself reconciles duplicate rows through the upsert clauses.
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

pub struct Store {
    log: slog::Logger,
    client: reqwest::Client,
    endpoint: String,
    admin_secret: Option<String>,
    api_secret: Option<String>,
    // one submission or directory read at a time, including its retries
    lock: Mutex<()>,
}

impl Store {
    pub fn new(
        log: &slog::Logger,
        endpoint: &str,
        admin_secret: Option<String>,
        api_secret: Option<String>,
    ) -> TopodResult<Store> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TopodError::Persistence(e.to_string()))?;
        Ok(Store {
            log: log.new(slog::o!("unit" => "store")),
            client,
            endpoint: endpoint.to_string(),
            admin_secret,
            api_secret,
            lock: Mutex::new(()),
        })
    }

    async fn post(&self, body: &Value) -> Result<GraphQlResponse, String> {
        let mut req = self.client.post(&self.endpoint).json(body);
        if let Some(secret) = &self.admin_secret {
            req = req.header("X-Hasura-Admin-Secret", secret);
        } else if let Some(secret) = &self.api_secret {
            req = req
                .header("Authorization", format!("Bearer {secret}"))
                .header("X-Authorization-Type", "API-Key");
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let resp = resp.error_for_status().map_err(|e| e.to_string())?;
        resp.json().await.map_err(|e| e.to_string())
    }

    /// Execute one query, holding the submission lock.  Transport failures
    /// retry with a fixed delay; errors reported by the backend do not.
    async fn execute(&self, query: &str, variables: Value) -> TopodResult<Value> {
        let body = json!({ "query": query, "variables": variables });

        let _serialized = self.lock.lock().await;
        let mut attempt = 0;
        let payload = loop {
            attempt += 1;
            match self.post(&body).await {
                Ok(payload) => break payload,
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    warn!(
                        self.log,
                        "request failed (attempt {attempt}): {e}"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(TopodError::Persistence(e)),
            }
        };

        if let Some(errors) = payload.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> =
                errors.into_iter().map(|e| e.message).collect();
            return Err(TopodError::Persistence(messages.join("; ")));
        }
        payload.data.ok_or_else(|| {
            TopodError::Persistence("response carried no data".to_string())
        })
    }

    /// Read the device directory.
    pub async fn read_devices(&self) -> TopodResult<Vec<Device>> {
        #[derive(Deserialize)]
        struct HostnameRow {
            hostname: String,
        }
        #[derive(Deserialize)]
        struct SystemRow {
            hostname: HostnameRow,
            port: u16,
            connection: protocol::ConnectionProfile,
        }
        #[derive(Deserialize)]
        struct Response {
            system: Vec<SystemRow>,
        }

        let data = self.execute(READ_DEVICES, json!({})).await?;
        let resp: Response = serde_json::from_value(data)
            .map_err(|e| TopodError::Persistence(e.to_string()))?;

        Ok(resp
            .system
            .into_iter()
            .map(|row| Device {
                hostname: row.hostname.hostname,
                port: row.port,
                connection: row.connection,
            })
            .collect())
    }

    /// Submit one cycle's journal, pre-rendered as mutation variables.
    /// Returns the total number of rows the backend touched.
    pub async fn insert_journal(&self, variables: Value) -> TopodResult<usize> {
        #[derive(Deserialize)]
        struct Affected {
            affected_rows: usize,
        }
        #[derive(Deserialize)]
        struct Response {
            insert_port_journal: Affected,
            insert_lldp_journal: Affected,
            insert_mac_address_journal: Affected,
            insert_arp_journal: Affected,
            insert_resolve_journal: Affected,
        }

        let data = self.execute(INSERT_JOURNAL, variables).await?;
        let resp: Response = serde_json::from_value(data)
            .map_err(|e| TopodError::Persistence(e.to_string()))?;

        Ok(resp.insert_port_journal.affected_rows
            + resp.insert_lldp_journal.affected_rows
            + resp.insert_mac_address_journal.affected_rows
            + resp.insert_arp_journal.affected_rows
            + resp.insert_resolve_journal.affected_rows)
    }
}
