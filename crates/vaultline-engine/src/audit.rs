//! Durable record of every terminal operation outcome
//!
//! Records carry scope names, counts and sanitized error text. They never
//! carry secret values or fingerprints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::security::sanitize_error;
use crate::types::OperationContext;

/// Operations that produce audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    SyncSecret,
    SyncAllSecrets,
    RemoveSecret,
    ProvisionEnvironment,
}

/// One structured audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub actor_id: String,
    pub operation: AuditOperation,
    /// Secret name or environment name the record is about
    pub subject: Option<String>,
    pub affected_scopes: Vec<String>,
    pub status: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub correlation_id: Uuid,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditRecord {
    /// Start a record for `operation` on `project`
    pub fn new(ctx: &OperationContext, project: &str, operation: AuditOperation) -> Self {
        Self {
            timestamp: Utc::now(),
            project_id: project.to_string(),
            actor_id: ctx.actor.clone(),
            operation,
            subject: None,
            affected_scopes: Vec::new(),
            status: String::new(),
            success_count: 0,
            failure_count: 0,
            correlation_id: ctx.correlation_id,
            duration_ms: 0,
            error_message: None,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.affected_scopes = scopes.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn status(mut self, status: impl ToString) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn counts(mut self, success: usize, failure: usize) -> Self {
        self.success_count = success;
        self.failure_count = failure;
        self
    }

    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Attach an error; the text is sanitized first
    pub fn error(mut self, message: impl AsRef<str>) -> Self {
        self.error_message = Some(sanitize_error(message.as_ref()));
        self
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Append-only JSONL audit log
///
/// Each append takes an exclusive file lock and syncs before returning, so
/// several processes can share one log.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    path: PathBuf,
}

impl JsonlAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every record back, oldest first
    pub fn read_all(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path).map_err(|e| Error::Audit(e.to_string()))?;
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::Audit(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line).map_err(|e| Error::Audit(e.to_string()))?);
        }
        Ok(records)
    }

    fn append(path: &std::path::Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        // Released when `file` is dropped
        file.lock_exclusive()?;
        writeln!(file, "{}", line)?;
        file.sync_all()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| Error::Audit(e.to_string()))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || Self::append(&path, &line))
            .await
            .map_err(|e| Error::Audit(e.to_string()))?
            .map_err(|e| Error::Audit(format!("failed to append to audit log: {}", e)))
    }
}

/// Audit sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| Error::Audit(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(ctx: &OperationContext) -> AuditRecord {
        AuditRecord::new(ctx, "web", AuditOperation::SyncSecret)
            .subject("API_KEY")
            .scopes(["actions", "dependabot"])
            .status("failed")
            .counts(1, 1)
            .duration(Duration::from_millis(42))
            .error("HTTP 401: token=ghp_abcdefghijklmnopqrstuvwxyz")
    }

    #[tokio::test]
    async fn test_jsonl_append_and_read_back() {
        let dir = tempdir().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("logs").join("audit.jsonl"));
        let ctx = OperationContext::new("alice");

        log.record(&sample(&ctx)).await.unwrap();
        log.record(&sample(&ctx).status("synced")).await.unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].correlation_id, ctx.correlation_id);
        assert_eq!(records[1].status, "synced");
        assert_eq!(records[0].affected_scopes, vec!["actions", "dependabot"]);
    }

    #[test]
    fn test_error_text_is_sanitized() {
        let record = sample(&OperationContext::new("alice"));
        let message = record.error_message.unwrap();
        assert!(!message.contains("ghp_"));
        assert!(message.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        sink.record(&sample(&OperationContext::new("bob")))
            .await
            .unwrap();
        assert_eq!(sink.records()[0].actor_id, "bob");
    }
}
