//! Recording containers: the fixed 14-channel montage, the channel mask that
//! splits it into winning / non-winning combinations, and the labels of the
//! four series a run produces.

use crate::error::{Result, SrkfError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of EEG channels in every recording.
pub const CHANNEL_COUNT: usize = 14;

/// Channel names in storage order. The order is fixed and never permuted.
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = [
    "AF3", "F7", "F3", "FC5", "T7", "P7", "O1", "O2", "P8", "T8", "FC6", "F4", "F8", "AF4",
];

/// Index of a channel name (case-insensitive) in [`CHANNEL_NAMES`].
pub fn channel_index(name: &str) -> Option<usize> {
    let name = name.trim();
    CHANNEL_NAMES
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
}

/// One of the four series produced per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeriesLabel {
    Original,
    All,
    #[serde(rename = "WC")]
    Winning,
    #[serde(rename = "NWC")]
    NonWinning,
}

impl SeriesLabel {
    /// Canonical order used for tables and exports.
    pub const ALL: [SeriesLabel; 4] = [
        SeriesLabel::Original,
        SeriesLabel::All,
        SeriesLabel::Winning,
        SeriesLabel::NonWinning,
    ];

    /// Series that run a filter (everything but Original).
    pub const FILTERED: [SeriesLabel; 3] =
        [SeriesLabel::All, SeriesLabel::Winning, SeriesLabel::NonWinning];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesLabel::Original => "Original",
            SeriesLabel::All => "All",
            SeriesLabel::Winning => "WC",
            SeriesLabel::NonWinning => "NWC",
        }
    }
}

impl fmt::Display for SeriesLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeriesLabel {
    type Err = SrkfError;

    fn from_str(s: &str) -> Result<Self> {
        SeriesLabel::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SrkfError::Validation(format!("Unknown series label '{}'", s)))
    }
}

/// Winning-combination mask, one flag per channel in [`CHANNEL_NAMES`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMask([bool; CHANNEL_COUNT]);

impl ChannelMask {
    pub fn new(flags: [bool; CHANNEL_COUNT]) -> Self {
        Self(flags)
    }

    pub fn all() -> Self {
        Self([true; CHANNEL_COUNT])
    }

    pub fn none() -> Self {
        Self([false; CHANNEL_COUNT])
    }

    /// Build a mask from a slice of 0/1 integers; the slice must hold exactly 14 values.
    pub fn from_bits(bits: &[u8]) -> Result<Self> {
        if bits.len() != CHANNEL_COUNT {
            return Err(SrkfError::Validation(format!(
                "Channel mask must have {} entries, got {}",
                CHANNEL_COUNT,
                bits.len()
            )));
        }
        let mut flags = [false; CHANNEL_COUNT];
        for (i, &b) in bits.iter().enumerate() {
            flags[i] = match b {
                0 => false,
                1 => true,
                other => {
                    return Err(SrkfError::Validation(format!(
                        "Channel mask entry {} must be 0 or 1, got {}",
                        i, other
                    )))
                }
            };
        }
        Ok(Self(flags))
    }

    /// Indices of mask=true channels (the WC subset).
    pub fn selected(&self) -> Vec<usize> {
        (0..CHANNEL_COUNT).filter(|&i| self.0[i]).collect()
    }

    /// Indices of mask=false channels (the NWC subset).
    pub fn unselected(&self) -> Vec<usize> {
        (0..CHANNEL_COUNT).filter(|&i| !self.0[i]).collect()
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&f| f).count()
    }

    /// Channel subset observed by a filtered series. `Original` has no observation set.
    pub fn channels_for(&self, label: SeriesLabel) -> Vec<usize> {
        match label {
            SeriesLabel::All => (0..CHANNEL_COUNT).collect(),
            SeriesLabel::Winning => self.selected(),
            SeriesLabel::NonWinning => self.unselected(),
            SeriesLabel::Original => Vec::new(),
        }
    }

    pub fn to_bits(&self) -> Vec<u8> {
        self.0.iter().map(|&f| f as u8).collect()
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: Vec<String> = self.to_bits().iter().map(|b| b.to_string()).collect();
        f.write_str(&bits.join(","))
    }
}

impl FromStr for ChannelMask {
    type Err = SrkfError;

    /// Accepts `1,0,1,...` and the JSON list form `[1, 0, 1, ...]`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);

        let bits = body
            .split(',')
            .map(|part| {
                let part = part.trim();
                part.parse::<u8>().map_err(|_| {
                    SrkfError::Validation(format!("Invalid channel mask entry '{}'", part))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        Self::from_bits(&bits)
    }
}

/// One EEG recording: N rows of 14 channel readings plus the sample-aligned time vector.
///
/// Immutable once built. Rows are always stored in [`CHANNEL_NAMES`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMatrix {
    rows: Vec<[f64; CHANNEL_COUNT]>,
    time: Vec<f64>,
    sampling_rate: f64,
}

impl ChannelMatrix {
    /// Build a matrix with an explicit time vector.
    pub fn new(rows: Vec<[f64; CHANNEL_COUNT]>, time: Vec<f64>, sampling_rate: f64) -> Result<Self> {
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(SrkfError::Validation(format!(
                "Sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        if rows.is_empty() {
            return Err(SrkfError::Validation("Recording has no samples".to_string()));
        }
        if time.len() != rows.len() {
            return Err(SrkfError::Validation(format!(
                "Time vector has {} entries but recording has {} rows",
                time.len(),
                rows.len()
            )));
        }
        if let Some(i) = time.windows(2).position(|w| !(w[1] > w[0])) {
            return Err(SrkfError::Validation(format!(
                "Time vector must be strictly increasing (row {})",
                i + 1
            )));
        }
        for (r, row) in rows.iter().enumerate() {
            if let Some(c) = row.iter().position(|v| !v.is_finite()) {
                return Err(SrkfError::Validation(format!(
                    "Non-finite value in row {}, channel {}",
                    r, CHANNEL_NAMES[c]
                )));
            }
        }

        Ok(Self {
            rows,
            time,
            sampling_rate,
        })
    }

    /// Build a matrix whose time vector is `i / sampling_rate` seconds.
    pub fn from_rows(rows: Vec<[f64; CHANNEL_COUNT]>, sampling_rate: f64) -> Result<Self> {
        let time = (0..rows.len()).map(|i| i as f64 / sampling_rate).collect();
        Self::new(rows, time, sampling_rate)
    }

    pub fn rows(&self) -> &[[f64; CHANNEL_COUNT]] {
        &self.rows
    }

    pub fn row(&self, t: usize) -> &[f64; CHANNEL_COUNT] {
        &self.rows[t]
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Samples of one channel, in time order.
    pub fn channel(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[index]).collect()
    }

    /// Sample covariance (unbiased) of the first `n` rows, 14 x 14 row-major.
    pub fn head_covariance(&self, n: usize) -> Vec<[f64; CHANNEL_COUNT]> {
        let n = n.clamp(1, self.rows.len());
        let head = &self.rows[..n];

        let mut mean = [0.0; CHANNEL_COUNT];
        for row in head {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n as f64;
        }

        let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };
        let mut cov = vec![[0.0; CHANNEL_COUNT]; CHANNEL_COUNT];
        for row in head {
            for i in 0..CHANNEL_COUNT {
                let di = row[i] - mean[i];
                for j in 0..CHANNEL_COUNT {
                    cov[i][j] += di * (row[j] - mean[j]) / denom;
                }
            }
        }
        cov
    }
}

/// Per-sample amplitude: arithmetic mean across the given values.
///
/// An empty slice aggregates to 0.0.
pub fn mean_amplitude(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
