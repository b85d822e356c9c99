//! Contract for the process that serves the API under test

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// A captured output line of the target process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub stream: LogStream,
    pub message: String,
}

impl LogEntry {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            message: message.into(),
        }
    }
}

/// Lifecycle of the system under test. `start` failing aborts the run.
#[async_trait]
pub trait TargetProcess: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn is_running(&self) -> bool;
    fn logs(&self) -> Vec<LogEntry>;
}

/// Target managed outside the runner; nothing to start or capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExternalTarget;

#[async_trait]
impl TargetProcess for ExternalTarget {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn is_running(&self) -> bool {
        true
    }

    fn logs(&self) -> Vec<LogEntry> {
        Vec::new()
    }
}

/// Log lines whose message contains `request_id`
pub fn logs_for_request(logs: &[LogEntry], request_id: Option<&str>) -> Vec<LogEntry> {
    match request_id {
        Some(id) => logs
            .iter()
            .filter(|entry| entry.message.contains(id))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}
