use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;

use crate::validate::Reason;

/// Whether the reported item was dropped or kept with nulled fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Drop,
    Repair,
}

impl RejectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "DROP",
            Self::Repair => "REPAIR",
        }
    }
}

/// Sink for per-item validation failures. Purely observational: the
/// validator never reads anything back, and implementations must not let a
/// logging failure escape into the validation path.
pub trait RejectionSink {
    fn record(&self, kind: RejectionKind, reason: &Reason, payload: &Value);
}

impl<S: RejectionSink> RejectionSink for std::sync::Arc<S> {
    fn record(&self, kind: RejectionKind, reason: &Reason, payload: &Value) {
        (**self).record(kind, reason, payload);
    }
}

/// File-backed sink writing `<log_dir>/validation.log`, truncated on open so
/// each run keeps only its own rejections.
pub struct ValidationLog {
    file: Mutex<File>,
}

impl ValidationLog {
    pub fn open(log_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let file = File::create(log_dir.join("validation.log"))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl RejectionSink for ValidationLog {
    fn record(&self, kind: RejectionKind, reason: &Reason, payload: &Value) {
        let line = format!(
            "{} [{}] {}: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            kind.as_str(),
            reason,
            payload
        );
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(_) => return,
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "could not write validation log entry");
        }
    }
}

/// In-memory sink for asserting on reported rejections.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    pub entries: Mutex<Vec<(RejectionKind, Reason, Value)>>,
}

#[cfg(test)]
impl RejectionSink for MemorySink {
    fn record(&self, kind: RejectionKind, reason: &Reason, payload: &Value) {
        self.entries
            .lock()
            .unwrap()
            .push((kind, reason.clone(), payload.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_log_truncates_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let payload = serde_json::json!({"lti_user_id": "u1"});

        let log = ValidationLog::open(dir.path()).unwrap();
        log.record(RejectionKind::Drop, &Reason::FieldSetMismatch, &payload);
        log.record(RejectionKind::Repair, &Reason::SourcedIdUnmatched, &payload);
        drop(log);

        let path = dir.path().join("validation.log");
        let first_run = fs::read_to_string(&path).unwrap();
        assert_eq!(first_run.lines().count(), 2);
        assert!(first_run.contains("[DROP] field set mismatch"));
        assert!(first_run.contains("[REPAIR]"));

        let log = ValidationLog::open(dir.path()).unwrap();
        log.record(RejectionKind::Drop, &Reason::InvalidUserId, &payload);
        drop(log);

        let second_run = fs::read_to_string(&path).unwrap();
        assert_eq!(second_run.lines().count(), 1);
        assert!(second_run.contains("invalid user id"));
    }
}
