//! Runs one variant over a recording and produces the four series.
//!
//! Original is the raw per-sample amplitude. All, WC and NWC each run an
//! independent filter over the full state, observing all channels, the
//! mask=true channels and the mask=false channels respectively. The series
//! share no mutable state, so they run in parallel and a numerical failure in
//! one does not affect the others.

use crate::channels::{mean_amplitude, ChannelMask, ChannelMatrix, SeriesLabel, CHANNEL_COUNT};
use crate::error::{Result, SrkfError};
use crate::process::{initial_state, ProcessModel};
use crate::profile_scope;
use crate::types::FilterConfig;
use crate::update::{FilterState, Measurement};
use crate::variants::VariantId;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Series loops check for cancellation every this many samples.
const CANCEL_POLL_INTERVAL: usize = 64;

/// Shared flag used to stop running series early.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Called for each filtered series between prediction and update, with the
/// sample index and the predicted state.
pub type StepHook<'a> = dyn Fn(SeriesLabel, usize, &mut FilterState) + Sync + 'a;

/// Per-sample output of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesOutput {
    pub label: SeriesLabel,
    /// Filtered amplitude (raw amplitude for Original), one value per sample
    pub amplitude: Vec<f64>,
    /// Mean of the assimilated observation per sample; absent for Original
    pub observations: Option<Vec<f64>>,
}

/// Why a series produced no output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFailure {
    pub label: SeriesLabel,
    pub kind: String,
    pub reason: String,
}

impl SeriesFailure {
    fn from_error(label: SeriesLabel, err: &SrkfError) -> Self {
        Self {
            label,
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind == "cancelled"
    }
}

/// Result of running a variant over one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRunResult {
    pub variant: VariantId,
    pub time: Vec<f64>,
    /// Successful series in canonical order
    pub series: Vec<SeriesOutput>,
    pub failures: Vec<SeriesFailure>,
}

impl FilterRunResult {
    pub fn get(&self, label: SeriesLabel) -> Option<&SeriesOutput> {
        self.series.iter().find(|s| s.label == label)
    }

    pub fn failure(&self, label: SeriesLabel) -> Option<&SeriesFailure> {
        self.failures.iter().find(|f| f.label == label)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn labels(&self) -> Vec<SeriesLabel> {
        self.series.iter().map(|s| s.label).collect()
    }

    pub fn amplitudes(&self) -> BTreeMap<SeriesLabel, &[f64]> {
        self.series
            .iter()
            .map(|s| (s.label, s.amplitude.as_slice()))
            .collect()
    }

    pub fn observations(&self) -> BTreeMap<SeriesLabel, &[f64]> {
        self.series
            .iter()
            .filter_map(|s| s.observations.as_deref().map(|o| (s.label, o)))
            .collect()
    }
}

pub struct FilterBank {
    variant: VariantId,
    config: FilterConfig,
}

impl FilterBank {
    pub fn new(variant: VariantId, config: FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { variant, config })
    }

    /// Run all four series to completion.
    pub fn run(&self, matrix: &ChannelMatrix, mask: &ChannelMask) -> FilterRunResult {
        self.run_with(matrix, mask, &CancellationFlag::new(), &|_, _, _| {})
    }

    /// Run all four series, honoring `cancel` and calling `hook` before every update.
    pub fn run_with(
        &self,
        matrix: &ChannelMatrix,
        mask: &ChannelMask,
        cancel: &CancellationFlag,
        hook: &StepHook<'_>,
    ) -> FilterRunResult {
        profile_scope!(format!("filter_bank {} ({} samples)", self.variant, matrix.len()));
        log::info!(
            "Running {} over {} samples, mask {}",
            self.variant,
            matrix.len(),
            mask
        );

        let outcomes: Vec<(SeriesLabel, Result<SeriesOutput>)> = SeriesLabel::ALL
            .par_iter()
            .map(|&label| (label, self.run_series(label, matrix, mask, cancel, hook)))
            .collect();

        let mut series = Vec::new();
        let mut failures = Vec::new();
        for (label, outcome) in outcomes {
            match outcome {
                Ok(output) => series.push(output),
                Err(e) => {
                    log::warn!("{} series failed: {}", label, e);
                    failures.push(SeriesFailure::from_error(label, &e));
                }
            }
        }

        FilterRunResult {
            variant: self.variant,
            time: matrix.time().to_vec(),
            series,
            failures,
        }
    }

    /// Run a single series.
    pub fn run_series(
        &self,
        label: SeriesLabel,
        matrix: &ChannelMatrix,
        mask: &ChannelMask,
        cancel: &CancellationFlag,
        hook: &StepHook<'_>,
    ) -> Result<SeriesOutput> {
        if label == SeriesLabel::Original {
            if cancel.is_cancelled() {
                return Err(SrkfError::Cancelled("before Original series".to_string()));
            }
            return Ok(SeriesOutput {
                label,
                amplitude: matrix.rows().iter().map(|r| mean_amplitude(r)).collect(),
                observations: None,
            });
        }

        profile_scope!(format!("{} series", label));
        let rule = self.variant.rule;
        let kernel = self.variant.kernel;
        let channels = mask.channels_for(label);
        log::debug!("{} series observes {} channels", label, channels.len());

        let process = ProcessModel::new(&self.config, CHANNEL_COUNT, matrix.sampling_rate());
        let mut state = initial_state(matrix, &self.config, kernel, CHANNEL_COUNT);

        let n = matrix.len();
        let mut amplitude = Vec::with_capacity(n);
        let mut observations = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(channels.len());

        for t in 0..n {
            if t % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(SrkfError::Cancelled(format!(
                    "{} series stopped at sample {}",
                    label, t
                )));
            }

            let mut predicted = process.predict(kernel, &state).map_err(|e| e.at(label, t))?;
            amplitude.push(mean_amplitude(predicted.x.as_slice()));
            hook(label, t, &mut predicted);

            let row = matrix.row(t);
            values.clear();
            values.extend(channels.iter().map(|&c| row[c]));
            observations.push(mean_amplitude(&values));

            let measurement = Measurement {
                channels: &channels,
                values: &values,
                noise_var: self.config.measurement_noise_var,
            };
            state = rule
                .update(kernel, &predicted, &measurement)
                .map_err(|e| e.at(label, t))?;
        }

        Ok(SeriesOutput {
            label,
            amplitude,
            observations: Some(observations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelKind;
    use crate::update::UpdateRule;

    fn recording(n: usize) -> ChannelMatrix {
        let rows = (0..n)
            .map(|t| {
                let mut r = [0.0; CHANNEL_COUNT];
                for (c, v) in r.iter_mut().enumerate() {
                    *v = 10.0 * ((t as f64 * 0.05) + c as f64).sin() + c as f64;
                }
                r
            })
            .collect();
        ChannelMatrix::from_rows(rows, 128.0).unwrap()
    }

    fn bank(rule: UpdateRule, kernel: KernelKind) -> FilterBank {
        FilterBank::new(VariantId::new(rule, kernel), FilterConfig::default()).unwrap()
    }

    #[test]
    fn test_four_series_same_length() {
        let m = recording(300);
        let mask: ChannelMask = "1,0,1,0,1,0,1,0,1,0,1,0,1,0".parse().unwrap();
        let result = bank(UpdateRule::Potter, KernelKind::GramSchmidt).run(&m, &mask);
        assert!(result.is_complete());
        assert_eq!(result.labels(), SeriesLabel::ALL.to_vec());
        for s in &result.series {
            assert_eq!(s.amplitude.len(), 300);
            assert!(s.amplitude.iter().all(|v| v.is_finite()));
        }
        assert!(result.get(SeriesLabel::Original).unwrap().observations.is_none());
        assert_eq!(result.time.len(), 300);
    }

    #[test]
    fn test_original_is_row_mean() {
        let m = recording(10);
        let result = bank(UpdateRule::Carlson, KernelKind::Givens).run(&m, &ChannelMask::all());
        let original = result.get(SeriesLabel::Original).unwrap();
        for t in 0..10 {
            assert_eq!(original.amplitude[t], mean_amplitude(m.row(t)));
        }
    }

    #[test]
    fn test_all_ones_mask_matches_all() {
        let m = recording(200);
        let result = bank(UpdateRule::Bierman, KernelKind::Householder).run(&m, &ChannelMask::all());
        let all = result.get(SeriesLabel::All).unwrap();
        let wc = result.get(SeriesLabel::Winning).unwrap();
        assert_eq!(all.amplitude, wc.amplitude);
        // NWC observes nothing: prediction only from a zero state.
        let nwc = result.get(SeriesLabel::NonWinning).unwrap();
        assert!(nwc.amplitude.iter().all(|&v| v == 0.0));
        assert!(nwc.observations.as_ref().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_first_prediction_is_zero() {
        let m = recording(5);
        let result = bank(UpdateRule::Potter, KernelKind::Givens).run(&m, &ChannelMask::all());
        for label in SeriesLabel::FILTERED {
            assert_eq!(result.get(label).unwrap().amplitude[0], 0.0);
        }
    }

    #[test]
    fn test_hook_failure_isolated_to_one_series() {
        let m = recording(100);
        let mask = ChannelMask::all();
        let hook = |label: SeriesLabel, t: usize, state: &mut FilterState| {
            if label == SeriesLabel::Winning && t == 40 {
                state.s[(3, 3)] = -1.0;
            }
        };
        let result = bank(UpdateRule::Carlson, KernelKind::GramSchmidt).run_with(
            &m,
            &mask,
            &CancellationFlag::new(),
            &hook,
        );
        assert_eq!(result.series.len(), 3);
        let failure = result.failure(SeriesLabel::Winning).unwrap();
        assert_eq!(failure.kind, "numerical_instability");
        assert!(failure.reason.contains("sample 40"));
        assert!(result.get(SeriesLabel::All).is_some());
    }

    #[test]
    fn test_cancelled_before_start() {
        let m = recording(100);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = bank(UpdateRule::Potter, KernelKind::Householder).run_with(
            &m,
            &ChannelMask::all(),
            &cancel,
            &|_, _, _| {},
        );
        assert!(result.series.is_empty());
        assert_eq!(result.failures.len(), 4);
        assert!(result.failures.iter().all(|f| f.is_cancellation()));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = FilterConfig {
            process_noise_std: -1.0,
            ..FilterConfig::default()
        };
        assert!(FilterBank::new(VariantId::new(UpdateRule::Potter, KernelKind::Givens), config).is_err());
    }
}
