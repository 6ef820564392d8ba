//! Welch power spectral density of each series.

use crate::channels::SeriesLabel;
use crate::error::{Result, SrkfError};
use crate::filter_bank::FilterRunResult;
use crate::types::{Detrend, PowerScale, SpectralConfig, WindowFunction};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Power values are floored here before conversion to decibels.
pub const POWER_FLOOR: f64 = 1e-30;

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Welch spectra of every successful series on a shared frequency grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelchResult {
    pub frequencies: Vec<f64>,
    pub power: BTreeMap<SeriesLabel, Vec<f64>>,
    /// Segment length actually used (shrinks for short series)
    pub segment_length: usize,
    pub scale: PowerScale,
}

impl WelchResult {
    pub fn get(&self, label: SeriesLabel) -> Option<&[f64]> {
        self.power.get(&label).map(|v| v.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct SpectralAnalyzer {
    config: SpectralConfig,
    sampling_rate: f64,
}

impl SpectralAnalyzer {
    pub fn new(config: SpectralConfig, sampling_rate: f64) -> Result<Self> {
        config.validate()?;
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(SrkfError::Validation(format!(
                "Sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        Ok(Self {
            config,
            sampling_rate,
        })
    }

    /// Segment length used for a series of `len` samples.
    pub fn segment_length_for(&self, len: usize) -> usize {
        self.config.segment_length.min(len)
    }

    /// One-sided Welch PSD of `series`. Returns `(frequencies, power)`.
    pub fn psd(&self, series: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        if series.is_empty() {
            return Err(SrkfError::Validation(
                "Cannot compute a spectrum of an empty series".to_string(),
            ));
        }

        let nperseg = self.segment_length_for(series.len());
        let noverlap = (nperseg as f64 * self.config.overlap).floor() as usize;
        let starts = segment_starts(series.len(), nperseg, noverlap);
        let window = window(self.config.window, nperseg);
        let win_norm: f64 = window.iter().map(|w| w * w).sum();
        let n_freq = nperseg / 2 + 1;

        let fft = FFT_PLANNER.with(|p| p.borrow_mut().plan_fft_forward(nperseg));
        let mut buf = vec![Complex::new(0.0, 0.0); nperseg];
        let mut accum = vec![0.0; n_freq];

        for &start in &starts {
            let segment = &series[start..start + nperseg];
            let offset = match self.config.detrend {
                Detrend::Constant => segment.iter().sum::<f64>() / nperseg as f64,
                Detrend::None => 0.0,
            };
            for ((dst, &x), &w) in buf.iter_mut().zip(segment).zip(&window) {
                *dst = Complex::new((x - offset) * w, 0.0);
            }
            fft.process(&mut buf);

            for (k, a) in accum.iter_mut().enumerate() {
                let mut v = buf[k].norm_sqr() / (self.sampling_rate * win_norm);
                let nyquist = nperseg % 2 == 0 && k == nperseg / 2;
                if k != 0 && !nyquist {
                    v *= 2.0;
                }
                *a += v;
            }
        }

        let inv = 1.0 / starts.len() as f64;
        let power = accum
            .into_iter()
            .map(|p| {
                let p = p * inv;
                match self.config.scale {
                    PowerScale::Decibel => 10.0 * p.max(POWER_FLOOR).log10(),
                    PowerScale::Linear => p,
                }
            })
            .collect();

        let frequencies = (0..n_freq)
            .map(|k| k as f64 * self.sampling_rate / nperseg as f64)
            .collect();
        Ok((frequencies, power))
    }

    /// Spectra of every successful series in `run`.
    pub fn analyze(&self, run: &FilterRunResult) -> Result<WelchResult> {
        let spectra: Vec<(SeriesLabel, (Vec<f64>, Vec<f64>))> = run
            .series
            .par_iter()
            .map(|s| self.psd(&s.amplitude).map(|r| (s.label, r)))
            .collect::<Result<_>>()?;

        let segment_length = self.segment_length_for(run.time.len());
        let mut frequencies = Vec::new();
        let mut power = BTreeMap::new();
        for (label, (freqs, pxx)) in spectra {
            if frequencies.is_empty() {
                frequencies = freqs;
            }
            power.insert(label, pxx);
        }

        log::debug!(
            "Welch: {} series, {} bins, segment length {}",
            power.len(),
            frequencies.len(),
            segment_length
        );

        Ok(WelchResult {
            frequencies,
            power,
            segment_length,
            scale: self.config.scale,
        })
    }
}

fn window(kind: WindowFunction, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    // Periodic windows, the spectral-analysis convention.
    let n_f = n as f64;
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / n_f;
            match kind {
                WindowFunction::Hann => 0.5 - 0.5 * phase.cos(),
                WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowFunction::Rectangular => 1.0,
            }
        })
        .collect()
}

fn segment_starts(len: usize, nperseg: usize, noverlap: usize) -> Vec<usize> {
    let hop = nperseg - noverlap;
    let mut starts = Vec::new();
    let mut start = 0usize;
    while start + nperseg <= len {
        starts.push(start);
        start += hop;
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_bank::SeriesOutput;
    use crate::kernel::KernelKind;
    use crate::update::UpdateRule;
    use crate::variants::VariantId;

    fn analyzer(config: SpectralConfig) -> SpectralAnalyzer {
        SpectralAnalyzer::new(config, 128.0).unwrap()
    }

    fn sine(freq: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| (2.0 * PI * freq * t as f64 / 128.0).sin())
            .collect()
    }

    #[test]
    fn test_frequency_grid() {
        let (freqs, power) = analyzer(SpectralConfig::default()).psd(&sine(10.0, 1000)).unwrap();
        assert_eq!(freqs.len(), 65);
        assert_eq!(power.len(), 65);
        assert_eq!(freqs[0], 0.0);
        assert_eq!(freqs[64], 64.0);
        assert_eq!(freqs[1], 1.0);
    }

    #[test]
    fn test_sine_peak_location() {
        let (freqs, power) = analyzer(SpectralConfig::default()).psd(&sine(16.0, 2048)).unwrap();
        let peak = power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(freqs[peak], 16.0);
    }

    #[test]
    fn test_nyquist_tone_integrates_to_variance() {
        // Linear density of a unit-variance alternating signal integrates to its variance.
        let config = SpectralConfig {
            scale: PowerScale::Linear,
            window: WindowFunction::Rectangular,
            detrend: Detrend::None,
            ..SpectralConfig::default()
        };
        let x: Vec<f64> = (0..1024).map(|t| if t % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (freqs, power) = analyzer(config).psd(&x).unwrap();
        let df = freqs[1] - freqs[0];
        let total: f64 = power.iter().sum::<f64>() * df;
        assert!((total - 1.0).abs() < 1e-9, "total {}", total);
    }

    #[test]
    fn test_short_series_shrinks_segment() {
        let a = analyzer(SpectralConfig::default());
        let (freqs, power) = a.psd(&sine(5.0, 50)).unwrap();
        assert_eq!(freqs.len(), 26);
        assert_eq!(power.len(), 26);
        assert_eq!(a.segment_length_for(50), 50);
    }

    #[test]
    fn test_zero_series_hits_floor() {
        let (_, power) = analyzer(SpectralConfig::default()).psd(&[0.0; 256]).unwrap();
        assert!(power.iter().all(|&p| (p + 300.0).abs() < 1e-9));
    }

    #[test]
    fn test_single_sample_series() {
        let (freqs, power) = analyzer(SpectralConfig::default()).psd(&[3.0]).unwrap();
        assert_eq!(freqs, vec![0.0]);
        assert_eq!(power.len(), 1);
        assert!(power[0].is_finite());
    }

    #[test]
    fn test_empty_series_rejected() {
        assert!(analyzer(SpectralConfig::default()).psd(&[]).is_err());
    }

    #[test]
    fn test_analyze_shared_grid() {
        let run = FilterRunResult {
            variant: VariantId::new(UpdateRule::Potter, KernelKind::Givens),
            time: (0..400).map(|t| t as f64 / 128.0).collect(),
            series: vec![
                SeriesOutput {
                    label: SeriesLabel::Original,
                    amplitude: sine(8.0, 400),
                    observations: None,
                },
                SeriesOutput {
                    label: SeriesLabel::All,
                    amplitude: sine(20.0, 400),
                    observations: Some(vec![0.0; 400]),
                },
            ],
            failures: Vec::new(),
        };
        let welch = analyzer(SpectralConfig::default()).analyze(&run).unwrap();
        assert_eq!(welch.frequencies.len(), 65);
        assert_eq!(welch.power.len(), 2);
        assert!(welch.get(SeriesLabel::Winning).is_none());
        assert_eq!(welch.get(SeriesLabel::All).unwrap().len(), 65);
        assert_eq!(welch.segment_length, 128);
    }
}
