use crate::error::{Result, SrkfError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Emotiv EPOC sampling rate used when the input has no explicit rate.
pub const DEFAULT_SAMPLING_RATE: f64 = 128.0;

fn default_sampling_rate() -> f64 {
    DEFAULT_SAMPLING_RATE
}

fn default_noise() -> f64 {
    1.0
}

fn default_segment_length() -> usize {
    128
}

fn default_overlap() -> f64 {
    0.5
}

/// State transition model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionModel {
    /// Truncated Taylor expansion, `F[k, k+i] = 1 / (fs^i * i!)`
    #[default]
    Taylor,
    /// Random walk, `F = I`
    Identity,
}

/// Source of the initial covariance factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialCovariance {
    /// Sample covariance of the first second of signal
    #[default]
    SampleCovariance,
    /// `initial_variance * I`
    Identity,
}

/// Noise and model parameters for every filtered series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub transition: TransitionModel,
    /// Standard deviation of the process noise, `sqrt(Q) = q * I`
    #[serde(default = "default_noise")]
    pub process_noise_std: f64,
    /// Variance of the measurement noise, `R = r * I`
    #[serde(default = "default_noise")]
    pub measurement_noise_var: f64,
    #[serde(default)]
    pub initial_covariance: InitialCovariance,
    /// Only used with `InitialCovariance::Identity`
    #[serde(default = "default_noise")]
    pub initial_variance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            transition: TransitionModel::default(),
            process_noise_std: default_noise(),
            measurement_noise_var: default_noise(),
            initial_covariance: InitialCovariance::default(),
            initial_variance: default_noise(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        positive("process_noise_std", self.process_noise_std)?;
        positive("measurement_noise_var", self.measurement_noise_var)?;
        if self.initial_covariance == InitialCovariance::Identity {
            positive("initial_variance", self.initial_variance)?;
        }
        Ok(())
    }
}

/// Window applied to each Welch segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// Periodic Hann
    #[default]
    Hann,
    /// Periodic Hamming
    Hamming,
    Rectangular,
}

/// Per-segment detrending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Detrend {
    /// Subtract the segment mean
    #[default]
    Constant,
    None,
}

/// Units of the reported power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PowerScale {
    /// `10 * log10(power)`
    #[default]
    Decibel,
    Linear,
}

/// Welch PSD parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralConfig {
    #[serde(default = "default_segment_length")]
    pub segment_length: usize,
    /// Fraction of a segment shared with the next one, in `[0, 1)`
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default)]
    pub detrend: Detrend,
    #[serde(default)]
    pub scale: PowerScale,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            segment_length: default_segment_length(),
            overlap: default_overlap(),
            window: WindowFunction::default(),
            detrend: Detrend::default(),
            scale: PowerScale::default(),
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<()> {
        if self.segment_length < 2 {
            return Err(SrkfError::Validation(format!(
                "segment_length must be at least 2, got {}",
                self.segment_length
            )));
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(SrkfError::Validation(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub spectral: SpectralConfig,
    /// Wall-clock limit for one session run; unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            filter: FilterConfig::default(),
            spectral: SpectralConfig::default(),
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SrkfError::Validation(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        positive("sampling_rate", self.sampling_rate)?;
        if let Some(t) = self.timeout_secs {
            positive("timeout_secs", t)?;
            Duration::try_from_secs_f64(t).map_err(|e| {
                SrkfError::Validation(format!("timeout_secs {} is out of range: {}", t, e))
            })?;
        }
        self.filter.validate()?;
        self.spectral.validate()
    }

    /// Run limit; `None` when unset or not representable as a `Duration`.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SrkfError::Validation(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sampling_rate, 128.0);
        assert_eq!(config.spectral.segment_length, 128);
        assert_eq!(config.filter.transition, TransitionModel::Taylor);
        assert!(config.timeout().is_none());
    }

    #[test]
    fn test_partial_json_overrides() {
        let json = r#"{
            "sampling_rate": 256,
            "filter": { "process_noise_std": 0.25, "transition": "identity" },
            "spectral": { "window": "hamming", "scale": "linear" },
            "timeout_secs": 30
        }"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        assert_eq!(config.sampling_rate, 256.0);
        assert_eq!(config.filter.process_noise_std, 0.25);
        assert_eq!(config.filter.measurement_noise_var, 1.0);
        assert_eq!(config.filter.transition, TransitionModel::Identity);
        assert_eq!(config.spectral.window, WindowFunction::Hamming);
        assert_eq!(config.spectral.overlap, 0.5);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_rejects_non_positive_noise() {
        let json = r#"{ "filter": { "measurement_noise_var": 0.0 } }"#;
        let err = EngineConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("measurement_noise_var"));
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let err = EngineConfig::from_json_str(r#"{"timeout_secs": 1e300}"#).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));

        let config = EngineConfig {
            timeout_secs: Some(1e300),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_rejects_full_overlap() {
        let mut config = EngineConfig::default();
        config.spectral.overlap = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_enum_value_is_error() {
        let json = r#"{ "spectral": { "window": "kaiser" } }"#;
        assert!(matches!(
            EngineConfig::from_json_str(json),
            Err(SrkfError::JsonError(_))
        ));
    }
}
