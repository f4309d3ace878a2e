// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entry value logs.
//!
//! A [`ValueSink`] attached to a subscription records every accepted
//! change of that key. Logging is toggled per key at runtime through
//! [`SubscriptionRegistry::enable_value_log`].
//!
//! [`SubscriptionRegistry::enable_value_log`]: super::SubscriptionRegistry::enable_value_log

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

/// One logged change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Subscription key.
    pub key: String,
    /// Formatted value.
    pub value: String,
    /// When the value was observed.
    pub at: DateTime<Utc>,
}

/// Destination for logged changes.
///
/// `record` is called on the dispatch path, after the entry was updated and
/// before the callback runs. A failure is logged and does not stop dispatch.
pub trait ValueSink: Send + Sync {
    /// Records one change.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the record cannot be stored.
    fn record(&self, key: &str, value: &str, at: DateTime<Utc>) -> Result<(), SinkError>;
}

/// Appends changes as JSON lines, one file per key.
///
/// The file for key `plant/line1/temp` is `<dir>/plant_line1_temp.jsonl`.
#[derive(Debug)]
pub struct JsonLinesSink {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    /// Creates a sink writing into `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory cannot be created.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file that records for `key` go to.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize_file_stem(key)))
    }
}

impl ValueSink for JsonLinesSink {
    fn record(&self, key: &str, value: &str, at: DateTime<Utc>) -> Result<(), SinkError> {
        let record = ValueRecord {
            key: key.to_string(),
            value: value.to_string(),
            at,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(key))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Keeps changes in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ValueRecord>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn records(&self) -> Vec<ValueRecord> {
        self.records.lock().clone()
    }

    /// Returns the recorded values for one key, oldest first.
    #[must_use]
    pub fn values_for(&self, key: &str) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.key == key)
            .map(|r| r.value.clone())
            .collect()
    }
}

impl ValueSink for MemorySink {
    fn record(&self, key: &str, value: &str, at: DateTime<Utc>) -> Result<(), SinkError> {
        self.records.lock().push(ValueRecord {
            key: key.to_string(),
            value: value.to_string(),
            at,
        });
        Ok(())
    }
}

fn sanitize_file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}
