use crate::channels::{ChannelMask, ChannelMatrix, SeriesLabel};
use crate::error::{Result, SrkfError};
use crate::filter_bank::{CancellationFlag, FilterBank, FilterRunResult, StepHook};
use crate::reader::{parse_channel_csv, read_channel_csv};
use crate::spectral::{SpectralAnalyzer, WelchResult};
use crate::store::{RunStatus, SessionRecord, SessionStore};
use crate::types::EngineConfig;
use crate::update::FilterState;
use crate::variants::VariantId;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Where a session's recording comes from
#[derive(Debug, Clone)]
pub enum RecordingSource {
    Matrix(ChannelMatrix),
    CsvFile(PathBuf),
    CsvBytes(Vec<u8>),
}

/// One session: a recording, a variant name and a channel mask.
///
/// Variant and mask are kept as text so that malformed values are reported
/// through the session record like any other validation failure.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub session_id: String,
    pub source: RecordingSource,
    pub variant: String,
    pub mask: String,
}

impl SessionRequest {
    pub fn new(source: RecordingSource, variant: impl Into<String>, mask: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            source,
            variant: variant.into(),
            mask: mask.into(),
        }
    }

    pub fn from_matrix(matrix: ChannelMatrix, variant: VariantId, mask: ChannelMask) -> Self {
        Self::new(RecordingSource::Matrix(matrix), variant.name(), mask.to_string())
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Validated inputs, ready to filter
struct PreparedSession {
    matrix: ChannelMatrix,
    variant: VariantId,
    mask: ChannelMask,
}

type SharedHook = Arc<dyn Fn(SeriesLabel, usize, &mut FilterState) + Send + Sync>;

/// Session Runner
///
/// Validates a request, runs the filter bank and the spectral analysis, and
/// keeps every session's record in a [`SessionStore`].
#[derive(Clone)]
pub struct SessionRunner {
    config: EngineConfig,
    store: SessionStore,
    hook: Option<SharedHook>,
}

impl SessionRunner {
    /// Create a runner with its own empty store
    ///
    /// # Arguments
    /// * `config` - Engine configuration, validated here
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_store(config, SessionStore::new())
    }

    /// Create a runner that records sessions in an existing store
    pub fn with_store(config: EngineConfig, store: SessionStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            hook: None,
        })
    }

    /// Install a per-sample hook, called between prediction and update of
    /// every filtered series. Used for fault injection.
    pub fn with_step_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(SeriesLabel, usize, &mut FilterState) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Run a session on a blocking thread
    ///
    /// # Arguments
    /// * `request` - Recording, variant and mask
    ///
    /// # Returns
    /// The terminal session record. Failures are reported through its status,
    /// never as an `Err`.
    pub async fn run(&self, request: SessionRequest) -> SessionRecord {
        self.run_with_cancel(request, CancellationFlag::new()).await
    }

    /// Like [`SessionRunner::run`], stoppable through `cancel`.
    pub async fn run_with_cancel(&self, request: SessionRequest, cancel: CancellationFlag) -> SessionRecord {
        let session_id = request.session_id.clone();
        let variant = request.variant.clone();
        let runner = self.clone();
        let task_cancel = cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || runner.execute(request, &task_cancel));

        let joined = match self.config.timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!(
                        "Session {} exceeded {:.1}s, cancelling",
                        session_id,
                        limit.as_secs_f64()
                    );
                    cancel.cancel();
                    let joined = handle.await;
                    return self.timed_out(joined, &session_id, &variant, limit.as_secs_f64());
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(record) => record,
            Err(e) => self.task_failed(&session_id, &variant, e),
        }
    }

    /// Run a session on the current thread.
    pub fn run_blocking(&self, request: SessionRequest) -> SessionRecord {
        self.execute(request, &CancellationFlag::new())
    }

    fn execute(&self, request: SessionRequest, cancel: &CancellationFlag) -> SessionRecord {
        let mut record = SessionRecord::pending(&request.session_id, request.variant.trim());
        self.store.put(record.clone());

        let prepared = match self.prepare(&request) {
            Ok(p) => p,
            Err(e) => {
                log::error!("Session {} rejected: {}", request.session_id, e);
                record.fail(&e);
                self.store.put(record.clone());
                return record;
            }
        };

        record.algorithm_name = prepared.variant.name();
        record.mask = Some(prepared.mask);
        record.samples = prepared.matrix.len();
        record.status = RunStatus::Running;
        self.store.put(record.clone());

        log::info!(
            "Session {}: {} on {} samples, {} winning channels",
            record.session_id,
            record.algorithm_name,
            record.samples,
            prepared.mask.count()
        );

        let start = Instant::now();
        let (result, welch) = match self.process(&prepared, cancel) {
            Ok(out) => out,
            Err(e) => {
                log::error!("Session {} failed: {}", record.session_id, e);
                record.processing_time_secs = start.elapsed().as_secs_f64();
                record.fail(&e);
                self.store.put(record.clone());
                return record;
            }
        };
        record.finish(result, welch, start.elapsed().as_secs_f64());

        log::info!(
            "Session {} {} in {:.3}s",
            record.session_id,
            record.status,
            record.processing_time_secs
        );
        self.store.put(record.clone());
        record
    }

    fn prepare(&self, request: &SessionRequest) -> Result<PreparedSession> {
        let variant: VariantId = request.variant.parse()?;
        let mask: ChannelMask = request.mask.parse()?;
        let fs = self.config.sampling_rate;
        let matrix = match &request.source {
            RecordingSource::Matrix(m) => m.clone(),
            RecordingSource::CsvFile(path) => read_channel_csv(path, fs)?,
            RecordingSource::CsvBytes(bytes) => parse_channel_csv(bytes, fs)?,
        };
        Ok(PreparedSession {
            matrix,
            variant,
            mask,
        })
    }

    fn process(
        &self,
        prepared: &PreparedSession,
        cancel: &CancellationFlag,
    ) -> Result<(FilterRunResult, Option<WelchResult>)> {
        if cancel.is_cancelled() {
            return Err(SrkfError::Cancelled("cancelled before filtering".to_string()));
        }
        let bank = FilterBank::new(prepared.variant, self.config.filter.clone())?;
        let noop = |_: SeriesLabel, _: usize, _: &mut FilterState| {};
        let hook: &StepHook<'_> = match &self.hook {
            Some(h) => h.as_ref(),
            None => &noop,
        };
        let result = bank.run_with(&prepared.matrix, &prepared.mask, cancel, hook);

        let welch = if result.series.is_empty() {
            None
        } else {
            let analyzer =
                SpectralAnalyzer::new(self.config.spectral.clone(), prepared.matrix.sampling_rate())?;
            Some(analyzer.analyze(&result)?)
        };
        Ok((result, welch))
    }

    fn timed_out(
        &self,
        joined: std::result::Result<SessionRecord, tokio::task::JoinError>,
        session_id: &str,
        variant: &str,
        limit_secs: f64,
    ) -> SessionRecord {
        let mut record = match joined {
            Ok(record) => record,
            Err(_) => SessionRecord::pending(session_id, variant),
        };
        // The run may have finished in the window between timeout and cancel.
        if record.status == RunStatus::Completed || record.status == RunStatus::PartiallyFailed {
            return record;
        }
        record.fail(&SrkfError::Cancelled(format!(
            "timed out after {:.1}s",
            limit_secs
        )));
        self.store.put(record.clone());
        record
    }

    fn task_failed(&self, session_id: &str, variant: &str, err: tokio::task::JoinError) -> SessionRecord {
        log::error!("Session {} task failed: {}", session_id, err);
        let mut record = self
            .store
            .get(session_id)
            .unwrap_or_else(|| SessionRecord::pending(session_id, variant));
        record.fail(&SrkfError::Cancelled(format!("worker task failed: {}", err)));
        self.store.put(record.clone());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{CHANNEL_COUNT, CHANNEL_NAMES};

    fn matrix(n: usize) -> ChannelMatrix {
        let rows = (0..n)
            .map(|t| {
                let mut r = [0.0; CHANNEL_COUNT];
                for (c, v) in r.iter_mut().enumerate() {
                    *v = ((t + c) as f64 * 0.1).sin();
                }
                r
            })
            .collect();
        ChannelMatrix::from_rows(rows, 128.0).unwrap()
    }

    #[test]
    fn test_unknown_variant_fails_without_processing() {
        let runner = SessionRunner::new(EngineConfig::default()).unwrap();
        let request = SessionRequest::new(
            RecordingSource::Matrix(matrix(10)),
            "Joseph_Givens",
            ChannelMask::all().to_string(),
        );
        let record = runner.run_blocking(request);
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.processing_time_secs, 0.0);
        assert_eq!(record.error_kind.as_deref(), Some("validation"));
        assert!(record.result.is_none());
    }

    #[test]
    fn test_oversized_timeout_rejected_at_construction() {
        let config = EngineConfig {
            timeout_secs: Some(1e300),
            ..EngineConfig::default()
        };
        let err = SessionRunner::new(config).err().unwrap();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_bad_mask_length_fails() {
        let runner = SessionRunner::new(EngineConfig::default()).unwrap();
        let request = SessionRequest::new(RecordingSource::Matrix(matrix(10)), "Potter_Givens", "1,0,1");
        let record = runner.run_blocking(request);
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.error.unwrap().contains("14 entries"));
    }

    #[test]
    fn test_csv_bytes_source() {
        let mut csv = CHANNEL_NAMES.join(",");
        csv.push('\n');
        for t in 0..64 {
            let row: Vec<String> = (0..CHANNEL_COUNT).map(|c| ((t * c) % 7).to_string()).collect();
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        let runner = SessionRunner::new(EngineConfig::default()).unwrap();
        let request = SessionRequest::new(
            RecordingSource::CsvBytes(csv.into_bytes()),
            "carlson_householder",
            "1,1,1,1,1,1,1,0,0,0,0,0,0,0",
        )
        .with_session_id("csv-session");
        let record = runner.run_blocking(request);
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.algorithm_name, "Carlson_Householder");
        assert_eq!(record.samples, 64);
        assert_eq!(runner.store().status("csv-session"), Some(RunStatus::Completed));
    }

    #[test]
    fn test_hook_forces_partial_failure() {
        let runner = SessionRunner::new(EngineConfig::default())
            .unwrap()
            .with_step_hook(|label, t, state| {
                if label == SeriesLabel::NonWinning && t == 3 {
                    state.s[(0, 0)] = f64::NAN;
                }
            });
        let request = SessionRequest::from_matrix(
            matrix(50),
            "Bierman_Givens".parse().unwrap(),
            "1,0,1,0,1,0,1,0,1,0,1,0,1,0".parse().unwrap(),
        );
        let record = runner.run_blocking(request);
        assert_eq!(record.status, RunStatus::PartiallyFailed);
        assert_eq!(record.failed_series(), vec![SeriesLabel::NonWinning]);
        assert_eq!(record.welch.unwrap().power.len(), 3);
    }
}
