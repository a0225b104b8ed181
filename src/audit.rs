//! audit.rs: append-only in-memory log of every decision, with an optional
//! JSON-lines mirror on disk.
//!
//! Records are never mutated or removed while the process lives; only a
//! restart clears the in-memory log. Mirror writes run on the blocking pool
//! so the request task never does file I/O itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::decision::{Category, Decision, Provenance};

pub const ENV_AUDIT_LOG_PATH: &str = "AUDIT_LOG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ticket_id: String,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub category: Option<Category>,
    pub confidence: Option<f32>,
    pub source: Provenance,
    pub needs_human: bool,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn from_decision(ticket_id: &str, user_id: &str, message: &str, d: &Decision) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            response: d.response_text.clone(),
            category: d.category,
            confidence: d.confidence,
            source: d.provenance,
            needs_human: d.needs_human,
            solution_steps: d.solution_steps.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    inner: Mutex<Vec<AuditRecord>>,
    mirror: Option<Arc<Mutex<File>>>,
    mirror_path: Option<PathBuf>,
}

impl AuditLog {
    /// Purely in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory log that also appends one JSON line per record to `path`.
    pub fn with_mirror(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating audit directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening audit mirror {}", path.display()))?;
        Ok(Self {
            inner: Mutex::new(Vec::new()),
            mirror: Some(Arc::new(Mutex::new(file))),
            mirror_path: Some(path.to_path_buf()),
        })
    }

    /// $AUDIT_LOG_PATH set → mirrored log, otherwise in-memory only.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(ENV_AUDIT_LOG_PATH) {
            Ok(p) if !p.trim().is_empty() => Self::with_mirror(Path::new(p.trim())),
            _ => Ok(Self::new()),
        }
    }

    /// Append one record. The in-memory log is updated first; mirror
    /// failures are logged and do not affect it.
    pub async fn append(&self, record: AuditRecord) {
        let line = self.mirror.as_ref().map(|_| serde_json::to_string(&record));
        let ticket_id = record.ticket_id.clone();
        {
            let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            v.push(record);
        }

        let (Some(mirror), Some(line)) = (self.mirror.as_ref(), line) else {
            return;
        };
        let result = match line {
            Ok(line) => {
                let mirror = Arc::clone(mirror);
                tokio::task::spawn_blocking(move || write_line(&mirror, line))
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|r| r)
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(
                %ticket_id,
                path = ?self.mirror_path,
                error = %e,
                "audit mirror write failed"
            );
        }
    }

    /// Ordered copy, oldest first.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<AuditRecord> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_line(mirror: &Mutex<File>, mut line: String) -> anyhow::Result<()> {
    line.push('\n');
    let mut f = mirror.lock().unwrap_or_else(|p| p.into_inner());
    f.write_all(line.as_bytes())?;
    Ok(())
}
