use crate::channels::{ChannelMask, SeriesLabel};
use crate::error::SrkfError;
use crate::filter_bank::{FilterRunResult, SeriesFailure};
use crate::spectral::WelchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// All four series succeeded
    Completed,
    /// At least one series succeeded and at least one failed
    PartiallyFailed,
    /// Rejected before filtering, cancelled, or no series succeeded
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::PartiallyFailed | RunStatus::Failed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::PartiallyFailed => write!(f, "partially_failed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one series as shown in reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStatus {
    pub label: SeriesLabel,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything known about one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// Variant as requested, canonicalized when it parsed
    pub algorithm_name: String,
    pub mask: Option<ChannelMask>,
    pub status: RunStatus,
    /// Wall-clock filtering + spectral time; 0.0 when rejected before filtering
    pub processing_time_secs: f64,
    pub samples: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Run-level reason for a `Failed` session
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub series: Vec<SeriesStatus>,
    pub result: Option<FilterRunResult>,
    pub welch: Option<WelchResult>,
}

impl SessionRecord {
    pub fn pending(session_id: impl Into<String>, algorithm_name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            algorithm_name: algorithm_name.into(),
            mask: None,
            status: RunStatus::Pending,
            processing_time_secs: 0.0,
            samples: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            error_kind: None,
            series: Vec::new(),
            result: None,
            welch: None,
        }
    }

    /// Terminal failure with a run-level reason.
    pub fn fail(&mut self, err: &SrkfError) {
        self.status = RunStatus::Failed;
        self.error = Some(err.to_string());
        self.error_kind = Some(err.kind().to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Attach a filter run and derive the terminal status from its outcomes.
    pub fn finish(&mut self, result: FilterRunResult, welch: Option<WelchResult>, elapsed_secs: f64) {
        self.series = SeriesLabel::ALL
            .iter()
            .map(|&label| match result.failure(label) {
                Some(SeriesFailure { kind, reason, .. }) => SeriesStatus {
                    label,
                    succeeded: false,
                    error_kind: Some(kind.clone()),
                    reason: Some(reason.clone()),
                },
                None => SeriesStatus {
                    label,
                    succeeded: true,
                    error_kind: None,
                    reason: None,
                },
            })
            .collect();

        let cancelled = result.failures.iter().find(|f| f.is_cancellation());
        self.status = if let Some(c) = cancelled {
            self.error = Some(c.reason.clone());
            self.error_kind = Some(c.kind.clone());
            RunStatus::Failed
        } else if result.failures.is_empty() {
            RunStatus::Completed
        } else if result.series.is_empty() {
            self.error = Some("No series completed".to_string());
            RunStatus::Failed
        } else {
            RunStatus::PartiallyFailed
        };

        self.samples = result.time.len();
        self.processing_time_secs = elapsed_secs;
        self.result = Some(result);
        self.welch = welch;
        self.completed_at = Some(Utc::now());
    }

    pub fn failed_series(&self) -> Vec<SeriesLabel> {
        self.series
            .iter()
            .filter(|s| !s.succeeded)
            .map(|s| s.label)
            .collect()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            algorithm_name: self.algorithm_name.clone(),
            status: self.status,
            processing_time_secs: self.processing_time_secs,
            completed_at: self.completed_at,
        }
    }
}

/// Listing row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub algorithm_name: String,
    pub status: RunStatus,
    pub processing_time_secs: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-memory session registry, shared between runner and callers
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a record.
    pub fn put(&self, record: SessionRecord) {
        self.write().insert(record.session_id.clone(), record);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.read().get(session_id).cloned()
    }

    pub fn status(&self, session_id: &str) -> Option<RunStatus> {
        self.read().get(session_id).map(|r| r.status)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionRecord> {
        self.write().remove(session_id)
    }

    /// Summaries, most recently created first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let guard = self.read();
        let mut records: Vec<&SessionRecord> = guard.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.iter().map(|r| r.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
