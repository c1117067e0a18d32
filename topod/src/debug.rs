// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::errors::TopodError;
use crate::types::Snapshot;
use crate::types::TopodResult;

/// Writes raw snapshots and outgoing journal payloads as JSON files for
/// inspection.  Purely a side channel: nothing reads these back.
pub struct Sink {
    dir: PathBuf,
}

impl Sink {
    pub fn new(dir: impl Into<PathBuf>) -> Sink {
        Sink { dir: dir.into() }
    }

    pub fn write_snapshot(
        &self,
        host: &str,
        snapshot: &Snapshot,
    ) -> TopodResult<()> {
        write(&self.dir.join(format!("{host}.json")), snapshot)
    }

    pub fn write_payload(&self, variables: &serde_json::Value) -> TopodResult<()> {
        write(&self.dir.join("journal.json"), variables)
    }
}

fn write<T: Serialize>(path: &Path, value: &T) -> TopodResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer(file, value)
        .map_err(|e| TopodError::Other(format!("writing {path:?}: {e}")))
}
