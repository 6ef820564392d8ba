//! Square-root measurement updates.
//!
//! Three update rules share one contract: given the prior state and factor and
//! an observation of a subset of state components, return the posterior state
//! and a factor whose outer product is the Kalman posterior covariance. The
//! observation model is a channel selection `H` (rows of the identity) with
//! noise `r·I`, so observations are assimilated one scalar at a time.
//!
//! - Potter works on the lower factor directly and re-triangularizes at the end.
//! - Carlson keeps an upper-triangular factor `W` (`P = W·Wᵀ`) triangular throughout.
//! - Bierman works on the `U·D·Uᵀ` form with unit upper `U`.
//!
//! The kernel decides how factors are (re-)triangularized, so every rule is
//! paired with every kernel.

use crate::error::{Result, SrkfError};
use crate::kernel::KernelKind;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State estimate plus lower-triangular covariance factor (`P = S·Sᵀ`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub x: DVector<f64>,
    pub s: DMatrix<f64>,
}

impl FilterState {
    pub fn new(x: DVector<f64>, s: DMatrix<f64>) -> Result<Self> {
        let n = x.len();
        if s.shape() != (n, n) {
            return Err(SrkfError::DimensionMismatch {
                expected: n,
                actual: if s.nrows() != n { s.nrows() } else { s.ncols() },
                context: "covariance factor must be square and match the state".to_string(),
            });
        }
        Ok(Self { x, s })
    }

    pub(crate) fn from_parts(x: DVector<f64>, s: DMatrix<f64>) -> Self {
        Self { x, s }
    }

    pub fn dim(&self) -> usize {
        self.x.len()
    }

    pub fn covariance(&self) -> DMatrix<f64> {
        &self.s * self.s.transpose()
    }

    /// Factor diagonal must be strictly positive and finite.
    pub fn check_factor(&self, which: &str) -> Result<()> {
        for i in 0..self.s.nrows().min(self.s.ncols()) {
            let d = self.s[(i, i)];
            if !(d > 0.0 && d.is_finite()) {
                return Err(SrkfError::instability(format!(
                    "{} factor diagonal entry {} is {}",
                    which, i, d
                )));
            }
        }
        if let Some(i) = self.x.iter().position(|v| !v.is_finite()) {
            return Err(SrkfError::instability(format!(
                "{} state component {} is not finite",
                which, i
            )));
        }
        Ok(())
    }
}

/// Observation of a subset of state components.
#[derive(Debug, Clone, Copy)]
pub struct Measurement<'a> {
    /// State components observed, one per value.
    pub channels: &'a [usize],
    pub values: &'a [f64],
    /// Scalar measurement noise variance (R = r·I).
    pub noise_var: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateRule {
    Potter,
    Carlson,
    Bierman,
}

impl UpdateRule {
    pub const ALL: [UpdateRule; 3] = [UpdateRule::Potter, UpdateRule::Carlson, UpdateRule::Bierman];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateRule::Potter => "Potter",
            UpdateRule::Carlson => "Carlson",
            UpdateRule::Bierman => "Bierman",
        }
    }

    pub fn documentation(&self) -> &'static str {
        match self {
            UpdateRule::Potter => {
                "Potter scalar update on the covariance square root, re-triangularized after assimilation."
            }
            UpdateRule::Carlson => {
                "Carlson update that keeps an upper-triangular square root triangular without re-factoring."
            }
            UpdateRule::Bierman => {
                "Bierman U-D update: unit upper-triangular U and diagonal D, no square roots inside the update."
            }
        }
    }

    /// Assimilate `measurement` into `prior`.
    ///
    /// Pure: the prior is not modified. Fails with `DimensionMismatch` when the
    /// observation does not fit the state, and `NumericalInstability` when the
    /// prior or posterior factor has a non-positive or non-finite diagonal.
    pub fn update(
        &self,
        kernel: KernelKind,
        prior: &FilterState,
        measurement: &Measurement<'_>,
    ) -> Result<FilterState> {
        let n = prior.dim();
        if prior.s.shape() != (n, n) {
            return Err(SrkfError::DimensionMismatch {
                expected: n,
                actual: prior.s.nrows(),
                context: "prior covariance factor".to_string(),
            });
        }
        if measurement.values.len() != measurement.channels.len() {
            return Err(SrkfError::DimensionMismatch {
                expected: measurement.channels.len(),
                actual: measurement.values.len(),
                context: "observation vector length".to_string(),
            });
        }
        if let Some(&c) = measurement.channels.iter().find(|&&c| c >= n) {
            return Err(SrkfError::DimensionMismatch {
                expected: n,
                actual: c + 1,
                context: "observed component outside the state".to_string(),
            });
        }
        if !(measurement.noise_var > 0.0 && measurement.noise_var.is_finite()) {
            return Err(SrkfError::Validation(format!(
                "Measurement noise variance must be positive, got {}",
                measurement.noise_var
            )));
        }

        prior.check_factor("prior")?;
        if measurement.channels.is_empty() {
            return Ok(prior.clone());
        }

        let posterior = match self {
            UpdateRule::Potter => potter(kernel, prior, measurement),
            UpdateRule::Carlson => carlson(kernel, prior, measurement),
            UpdateRule::Bierman => bierman(kernel, prior, measurement)?,
        };
        posterior.check_factor("posterior")?;
        Ok(posterior)
    }
}

impl fmt::Display for UpdateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateRule {
    type Err = SrkfError;

    fn from_str(s: &str) -> Result<Self> {
        UpdateRule::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SrkfError::Validation(format!(
                    "Unknown update rule '{}'. Valid rules: Potter, Carlson, Bierman",
                    s
                ))
            })
    }
}

fn potter(kernel: KernelKind, prior: &FilterState, m: &Measurement<'_>) -> FilterState {
    let r = m.noise_var;
    let mut x = prior.x.clone();
    let mut s = prior.s.clone();

    for (&c, &z) in m.channels.iter().zip(m.values) {
        // phi = Sᵀ·hᵀ is row c of S for a selection row h.
        let phi: DVector<f64> = s.row(c).transpose();
        let alpha = phi.dot(&phi) + r;
        let gamma = 1.0 / (1.0 + (r / alpha).sqrt());
        let gain = &s * &phi / alpha;

        let innovation = z - x[c];
        x.axpy(innovation, &gain, 1.0);
        s -= (&gain * phi.transpose()) * gamma;
    }

    let s = kernel.lower_factor(&s.transpose());
    FilterState { x, s }
}

fn carlson(kernel: KernelKind, prior: &FilterState, m: &Measurement<'_>) -> FilterState {
    let n = prior.dim();
    let r = m.noise_var;
    let mut x = prior.x.clone();
    let mut w = kernel.upper_factor(&prior.s);
    let mut e = DVector::<f64>::zeros(n);

    for (&c, &z) in m.channels.iter().zip(m.values) {
        let f: DVector<f64> = w.row(c).transpose();
        e.fill(0.0);
        let mut alpha = r;

        for j in 0..n {
            let alpha_prev = alpha;
            alpha += f[j] * f[j];
            let b = (alpha_prev / alpha).sqrt();
            let coupling = f[j] / (alpha_prev * alpha).sqrt();
            for i in 0..=j {
                let wij = w[(i, j)];
                w[(i, j)] = b * wij - coupling * e[i];
                e[i] += wij * f[j];
            }
        }

        let innovation = z - x[c];
        x.axpy(innovation / alpha, &e, 1.0);
    }

    FilterState { x, s: w }
}

fn bierman(kernel: KernelKind, prior: &FilterState, m: &Measurement<'_>) -> Result<FilterState> {
    let n = prior.dim();
    let r = m.noise_var;
    let mut x = prior.x.clone();

    let w = kernel.upper_factor(&prior.s);
    let mut d: Vec<f64> = (0..n).map(|j| w[(j, j)] * w[(j, j)]).collect();
    if let Some(j) = d.iter().position(|&v| !(v > 0.0)) {
        return Err(SrkfError::instability(format!(
            "U-D factorization has zero pivot at {}",
            j
        )));
    }
    let mut u = DMatrix::from_fn(n, n, |i, j| if i <= j { w[(i, j)] / w[(j, j)] } else { 0.0 });

    let mut f = vec![0.0; n];
    let mut v = vec![0.0; n];
    let mut b = vec![0.0; n];

    for (&c, &z) in m.channels.iter().zip(m.values) {
        for j in 0..n {
            f[j] = u[(c, j)];
            v[j] = d[j] * f[j];
        }

        let mut alpha = r + v[0] * f[0];
        let mut gamma = 1.0 / alpha;
        d[0] *= r * gamma;
        b[0] = v[0];

        for j in 1..n {
            let beta = alpha;
            alpha += v[j] * f[j];
            let lambda = -f[j] * gamma;
            gamma = 1.0 / alpha;
            d[j] *= beta * gamma;
            for i in 0..j {
                let uij = u[(i, j)];
                u[(i, j)] = uij + b[i] * lambda;
                b[i] += v[j] * uij;
            }
            b[j] = v[j];
        }

        let innovation = z - x[c];
        for i in 0..n {
            x[i] += b[i] * gamma * innovation;
        }
    }

    if let Some(j) = d.iter().position(|&v| !(v > 0.0 && v.is_finite())) {
        return Err(SrkfError::instability(format!(
            "posterior D entry {} is {}",
            j, d[j]
        )));
    }
    let s = DMatrix::from_fn(n, n, |i, j| u[(i, j)] * d[j].sqrt());
    Ok(FilterState { x, s })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior(n: usize) -> FilterState {
        let s = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.5 + 0.1 * i as f64
            } else if i > j {
                0.3 * ((i * 7 + j) as f64).sin()
            } else {
                0.0
            }
        });
        let x = DVector::from_fn(n, |i, _| (i as f64 * 0.5).cos());
        FilterState::new(x, s).unwrap()
    }

    /// Dense covariance-form Kalman update for a selection observation.
    fn reference(prior: &FilterState, channels: &[usize], values: &[f64], r: f64) -> (DVector<f64>, DMatrix<f64>) {
        let n = prior.dim();
        let m = channels.len();
        let h = DMatrix::from_fn(m, n, |i, j| if channels[i] == j { 1.0 } else { 0.0 });
        let p = prior.covariance();
        let s = &h * &p * h.transpose() + DMatrix::identity(m, m) * r;
        let k = &p * h.transpose() * s.try_inverse().unwrap();
        let z = DVector::from_column_slice(values);
        let x = &prior.x + &k * (z - &h * &prior.x);
        let p_post = (DMatrix::identity(n, n) - &k * &h) * p;
        (x, p_post)
    }

    #[test]
    fn test_all_variants_match_dense_kalman() {
        let p = prior(6);
        let channels = [0, 2, 3, 5];
        let values = [1.0, -0.5, 2.0, 0.25];
        let (x_ref, p_ref) = reference(&p, &channels, &values, 0.8);
        let meas = Measurement {
            channels: &channels,
            values: &values,
            noise_var: 0.8,
        };

        for rule in UpdateRule::ALL {
            for kernel in KernelKind::ALL {
                let post = rule.update(kernel, &p, &meas).unwrap();
                let dx = (&post.x - &x_ref).abs().max();
                let dp = (post.covariance() - &p_ref).abs().max();
                assert!(dx < 1e-9, "{} {} state diff {}", rule, kernel, dx);
                assert!(dp < 1e-9, "{} {} covariance diff {}", rule, kernel, dp);
            }
        }
    }

    #[test]
    fn test_posterior_factor_shapes() {
        let p = prior(5);
        let channels = [1, 4];
        let meas = Measurement {
            channels: &channels,
            values: &[0.3, 0.7],
            noise_var: 1.0,
        };
        for kernel in KernelKind::ALL {
            let potter = UpdateRule::Potter.update(kernel, &p, &meas).unwrap();
            let carlson = UpdateRule::Carlson.update(kernel, &p, &meas).unwrap();
            let bierman = UpdateRule::Bierman.update(kernel, &p, &meas).unwrap();
            for i in 0..5 {
                for j in 0..5 {
                    if j > i {
                        assert_eq!(potter.s[(i, j)], 0.0);
                    }
                    if j < i {
                        assert_eq!(carlson.s[(i, j)], 0.0);
                        assert_eq!(bierman.s[(i, j)], 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_selection_is_identity() {
        let p = prior(4);
        let meas = Measurement {
            channels: &[],
            values: &[],
            noise_var: 1.0,
        };
        for rule in UpdateRule::ALL {
            let post = rule.update(KernelKind::Householder, &p, &meas).unwrap();
            assert_eq!(post, p);
        }
    }

    #[test]
    fn test_repeated_updates_converge() {
        let mut state = FilterState::new(DVector::zeros(3), DMatrix::identity(3, 3) * 10.0).unwrap();
        let channels = [0, 1, 2];
        let values = [4.0, -2.0, 1.0];
        let meas = Measurement {
            channels: &channels,
            values: &values,
            noise_var: 0.5,
        };
        for _ in 0..200 {
            state = UpdateRule::Carlson.update(KernelKind::Givens, &state, &meas).unwrap();
        }
        for (i, v) in values.iter().enumerate() {
            assert!((state.x[i] - v).abs() < 1e-2);
        }
    }

    #[test]
    fn test_observation_length_mismatch() {
        let p = prior(4);
        let meas = Measurement {
            channels: &[0, 1],
            values: &[1.0],
            noise_var: 1.0,
        };
        let err = UpdateRule::Potter.update(KernelKind::GramSchmidt, &p, &meas).unwrap_err();
        assert!(matches!(err, SrkfError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_observed_component_out_of_range() {
        let p = prior(4);
        let meas = Measurement {
            channels: &[4],
            values: &[1.0],
            noise_var: 1.0,
        };
        let err = UpdateRule::Bierman.update(KernelKind::Givens, &p, &meas).unwrap_err();
        assert!(matches!(err, SrkfError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_negative_prior_diagonal_rejected() {
        let mut p = prior(4);
        p.s[(2, 2)] = -1.0;
        let meas = Measurement {
            channels: &[0],
            values: &[1.0],
            noise_var: 1.0,
        };
        for rule in UpdateRule::ALL {
            let err = rule.update(KernelKind::Householder, &p, &meas).unwrap_err();
            assert!(matches!(err, SrkfError::NumericalInstability { .. }), "{}", rule);
        }
    }

    #[test]
    fn test_nan_prior_rejected() {
        let mut p = prior(3);
        p.s[(0, 0)] = f64::NAN;
        let meas = Measurement {
            channels: &[],
            values: &[],
            noise_var: 1.0,
        };
        let err = UpdateRule::Potter.update(KernelKind::Givens, &p, &meas).unwrap_err();
        assert_eq!(err.kind(), "numerical_instability");
    }

    #[test]
    fn test_rule_from_str() {
        assert_eq!("potter".parse::<UpdateRule>().unwrap(), UpdateRule::Potter);
        assert_eq!("BIERMAN".parse::<UpdateRule>().unwrap(), UpdateRule::Bierman);
        assert!("Joseph".parse::<UpdateRule>().is_err());
    }
}
