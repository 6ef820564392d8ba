//! Wilcoxon signed-rank comparison of Welch spectra across sessions.
//!
//! Two spectra on the same frequency grid are paired bin by bin. Zero
//! differences are dropped before ranking. Samples of at most
//! [`EXACT_LIMIT`] pairs without tied magnitudes use the exact null
//! distribution; everything else falls back to the tie-corrected normal
//! approximation.

use crate::channels::SeriesLabel;
use crate::error::{Result, SrkfError};
use crate::spectral::WelchResult;
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Largest sample for which the exact null distribution is enumerated.
pub const EXACT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignedRankMethod {
    Exact,
    Normal,
    /// Every pair was identical; nothing to rank
    NoDifferences,
}

/// Two-sided signed-rank test result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignedRankTest {
    /// `min(R+, R-)`; NaN when every difference is zero
    pub statistic: f64,
    pub p_value: f64,
    /// Number of non-zero differences
    pub n: usize,
    pub method: SignedRankMethod,
}

/// Two-sided Wilcoxon signed-rank test of paired samples `x` and `y`.
pub fn signed_rank(x: &[f64], y: &[f64]) -> Result<SignedRankTest> {
    if x.len() != y.len() {
        return Err(SrkfError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
            context: "paired sample length".to_string(),
        });
    }

    let mut diffs = Vec::with_capacity(x.len());
    for (i, (a, b)) in x.iter().zip(y).enumerate() {
        let d = a - b;
        if !d.is_finite() {
            return Err(SrkfError::Validation(format!(
                "Non-finite difference at pair {}",
                i
            )));
        }
        if d != 0.0 {
            diffs.push(d);
        }
    }

    let n = diffs.len();
    if n == 0 {
        return Ok(SignedRankTest {
            statistic: f64::NAN,
            p_value: 1.0,
            n: 0,
            method: SignedRankMethod::NoDifferences,
        });
    }

    let (ranks, tie_groups) = average_ranks(&diffs);
    let r_plus: f64 = diffs
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let total = (n * (n + 1)) as f64 / 2.0;
    let statistic = r_plus.min(total - r_plus);

    let (p_value, method) = if n <= EXACT_LIMIT && tie_groups.is_empty() {
        (exact_p_value(n, statistic), SignedRankMethod::Exact)
    } else {
        (normal_p_value(n, statistic, &tie_groups), SignedRankMethod::Normal)
    };

    Ok(SignedRankTest {
        statistic,
        p_value,
        n,
        method,
    })
}

/// Average ranks of `|d|` plus the sizes of tie groups longer than one.
fn average_ranks(diffs: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..diffs.len()).collect();
    order.sort_by(|&a, &b| diffs[a].abs().total_cmp(&diffs[b].abs()));

    let mut ranks = vec![0.0; diffs.len()];
    let mut ties = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let magnitude = diffs[order[start]].abs();
        let mut end = start + 1;
        while end < order.len() && diffs[order[end]].abs() == magnitude {
            end += 1;
        }
        // ranks start..end are 1-based start+1 ..= end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        if end - start > 1 {
            ties.push(end - start);
        }
        start = end;
    }
    (ranks, ties)
}

/// `min(1, 2 * P(W <= t))` under the exact null distribution.
fn exact_p_value(n: usize, t: f64) -> f64 {
    let max_sum = n * (n + 1) / 2;
    // counts[s] = number of subsets of {1..n} whose ranks sum to s
    let mut counts = vec![0.0f64; max_sum + 1];
    counts[0] = 1.0;
    for k in 1..=n {
        let reach = k * (k + 1) / 2;
        for s in (k..=reach).rev() {
            counts[s] += counts[s - k];
        }
    }
    let t = t.floor() as usize;
    let below: f64 = counts[..=t.min(max_sum)].iter().sum();
    let p = 2.0 * below / 2f64.powi(n as i32);
    p.min(1.0)
}

fn normal_p_value(n: usize, t: f64, tie_groups: &[usize]) -> f64 {
    let n = n as f64;
    let mean = n * (n + 1.0) / 4.0;
    let tie_term: f64 = tie_groups
        .iter()
        .map(|&g| {
            let g = g as f64;
            g * g * g - g
        })
        .sum();
    let var = (n * (n + 1.0) * (2.0 * n + 1.0) - 0.5 * tie_term) / 24.0;
    if var <= 0.0 {
        return 1.0;
    }
    let z = (t - mean) / var.sqrt();
    erfc(z.abs() / SQRT_2).min(1.0)
}

/// Complementary error function; Chebyshev fit with relative error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let r = t * poly.exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}

/// Signed-rank test between the `label` power columns of two spectra.
pub fn compare_spectra(
    from: &WelchResult,
    to: &WelchResult,
    label: SeriesLabel,
) -> Result<SignedRankTest> {
    if from.frequencies.len() != to.frequencies.len() {
        return Err(SrkfError::DimensionMismatch {
            expected: from.frequencies.len(),
            actual: to.frequencies.len(),
            context: "frequency bins".to_string(),
        });
    }
    let missing = || SrkfError::Validation(format!("Spectrum has no Power_{} column", label));
    let a = from.get(label).ok_or_else(missing)?;
    let b = to.get(label).ok_or_else(missing)?;
    signed_rank(a, b)
}

/// One row of a session-to-session comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionComparison {
    pub from_session: String,
    pub to_session: String,
    pub statistic: f64,
    pub p_value: f64,
}

/// Compare each session with the next one, and the last with the first.
///
/// Sessions are taken in the order given.
pub fn consecutive_comparisons(
    sessions: &[(String, WelchResult)],
    label: SeriesLabel,
) -> Result<Vec<SessionComparison>> {
    if sessions.len() < 2 {
        return Err(SrkfError::Validation(format!(
            "At least two sessions are needed for a comparison, got {}",
            sessions.len()
        )));
    }
    let mut rows = Vec::with_capacity(sessions.len());
    for (i, (from_id, from)) in sessions.iter().enumerate() {
        let (to_id, to) = &sessions[(i + 1) % sessions.len()];
        let test = compare_spectra(from, to, label)?;
        log::debug!(
            "{} -> {}: W={} p={:.4} ({:?}, n={})",
            from_id,
            to_id,
            test.statistic,
            test.p_value,
            test.method,
            test.n
        );
        rows.push(SessionComparison {
            from_session: from_id.clone(),
            to_session: to_id.clone(),
            statistic: test.statistic,
            p_value: test.p_value,
        });
    }
    Ok(rows)
}
