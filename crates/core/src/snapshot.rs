//! Persisted ledger of past results, keyed by test name
//!
//! The file is `{"lastUpdate": "...", "cases": [...]}`. A bare array of cases
//! is accepted on read. Merging replaces entries with the same name in place
//! and appends unseen ones; entries absent from the run are kept.
//! Unrecognized statuses read as `Unknown`, which is neither passing nor
//! failing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::TestResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pass,
    Fail,
    Timeout,
    #[serde(other)]
    Unknown,
}

/// One recorded test outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCase {
    pub name: String,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub suite: Option<String>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub status: Option<CaseStatus>,
    #[serde(default)]
    pub latency: Option<f64>,
}

impl SnapshotCase {
    pub fn from_result(result: &TestResult) -> Self {
        let status = if result.timed_out {
            CaseStatus::Timeout
        } else if result.passed {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        };

        Self {
            name: result.test_name.clone(),
            operation_id: Some(result.operation_id.clone()),
            suite: result.suite_name.clone(),
            request: result
                .request
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok()),
            response: result
                .response
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok()),
            status: Some(status),
            latency: Some(result.latency as f64),
        }
    }

    pub fn is_failing(&self) -> bool {
        matches!(self.status, Some(CaseStatus::Fail | CaseStatus::Timeout))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub last_update: String,
    #[serde(default)]
    pub cases: Vec<SnapshotCase>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Cases(Vec<SnapshotCase>),
    Full(Snapshot),
}

impl Snapshot {
    /// Read a snapshot file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let parsed: SnapshotFile = serde_json::from_str(&raw)
            .map_err(|e| Error::Snapshot(format!("{}: {e}", path.display())))?;
        Ok(Some(match parsed {
            SnapshotFile::Cases(cases) => Snapshot {
                last_update: String::new(),
                cases,
            },
            SnapshotFile::Full(snapshot) => snapshot,
        }))
    }

    /// Names of cases recorded with a non-passing status
    pub fn failing_names(&self) -> HashSet<String> {
        self.cases
            .iter()
            .filter(|case| case.is_failing())
            .map(|case| case.name.clone())
            .collect()
    }

    /// Fold `results` in, last write wins per name.
    pub fn merge(&mut self, results: &[TestResult], timestamp: DateTime<Utc>) {
        for result in results {
            let case = SnapshotCase::from_result(result);
            match self.cases.iter_mut().find(|c| c.name == case.name) {
                Some(existing) => *existing = case,
                None => self.cases.push(case),
            }
        }
        self.last_update = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Merge `results` into the snapshot at `path` and write it back.
///
/// An unreadable existing file is replaced by a fresh ledger.
pub fn merge_into(path: &Path, results: &[TestResult]) -> Result<Snapshot> {
    let mut snapshot = match Snapshot::load(path) {
        Ok(existing) => existing.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read existing snapshot, starting fresh: {}", e);
            Snapshot::default()
        }
    };
    snapshot.merge(results, Utc::now());
    snapshot.save(path)?;
    debug!("Snapshot saved: {} ({} cases)", path.display(), snapshot.cases.len());
    Ok(snapshot)
}
