//! Process model shared by every variant: transition matrix, process noise
//! and the square-root time update.

use crate::channels::ChannelMatrix;
use crate::error::{Result, SrkfError};
use crate::kernel::KernelKind;
use crate::types::{FilterConfig, InitialCovariance, TransitionModel};
use crate::update::FilterState;
use nalgebra::{DMatrix, DVector};

/// Pivots below this are clamped when factoring the initial covariance.
pub const MIN_PIVOT: f64 = 1e-12;

/// Taylor-series transition matrix: `F[k, k+i] = 1 / (fs^i * i!)`.
///
/// Upper-triangular Toeplitz with a unit diagonal.
pub fn taylor_transition(dim: usize, sampling_rate: f64) -> DMatrix<f64> {
    let mut coeffs = vec![1.0; dim];
    for i in 1..dim {
        coeffs[i] = coeffs[i - 1] / (sampling_rate * i as f64);
    }
    DMatrix::from_fn(dim, dim, |r, c| if c >= r { coeffs[c - r] } else { 0.0 })
}

#[derive(Debug, Clone)]
pub struct ProcessModel {
    transition: DMatrix<f64>,
    process_noise_std: f64,
}

impl ProcessModel {
    pub fn new(config: &FilterConfig, dim: usize, sampling_rate: f64) -> Self {
        let transition = match config.transition {
            TransitionModel::Taylor => taylor_transition(dim, sampling_rate),
            TransitionModel::Identity => DMatrix::identity(dim, dim),
        };
        Self {
            transition,
            process_noise_std: config.process_noise_std,
        }
    }

    pub fn transition(&self) -> &DMatrix<f64> {
        &self.transition
    }

    pub fn dim(&self) -> usize {
        self.transition.nrows()
    }

    /// One-step prediction `x⁻ = F·x`, `S⁻ = Rᵀ` of the pre-array `[(F·S)ᵀ ; sqrt(Q)ᵀ]`.
    pub fn predict(&self, kernel: KernelKind, state: &FilterState) -> Result<FilterState> {
        let n = self.dim();
        if state.dim() != n {
            return Err(SrkfError::DimensionMismatch {
                expected: n,
                actual: state.dim(),
                context: "state vector in time update".to_string(),
            });
        }

        let x = &self.transition * &state.x;
        let propagated = &self.transition * &state.s;

        let mut pre = DMatrix::zeros(2 * n, n);
        pre.view_mut((0, 0), (n, n))
            .copy_from(&propagated.transpose());
        for i in 0..n {
            pre[(n + i, i)] = self.process_noise_std;
        }

        Ok(FilterState::from_parts(x, kernel.lower_factor(&pre)))
    }
}

/// Lower-triangular `L·D^{1/2}` from an LDLᵀ factorization of `p`.
///
/// The input is symmetrized first. Pivots that fall below [`MIN_PIVOT`] are
/// clamped and their column of `L` is zeroed, so semi-definite input
/// (flat channels, too few rows) still yields a valid factor.
pub fn ldl_factor(p: &DMatrix<f64>) -> DMatrix<f64> {
    let n = p.nrows();
    let sym = (p + p.transpose()) * 0.5;
    let mut l = DMatrix::<f64>::identity(n, n);
    let mut d = vec![0.0; n];

    for j in 0..n {
        let mut pivot = sym[(j, j)];
        for k in 0..j {
            pivot -= l[(j, k)] * l[(j, k)] * d[k];
        }
        let degenerate = !(pivot >= MIN_PIVOT);
        d[j] = if degenerate { MIN_PIVOT } else { pivot };

        for i in (j + 1)..n {
            if degenerate {
                l[(i, j)] = 0.0;
                continue;
            }
            let mut v = sym[(i, j)];
            for k in 0..j {
                v -= l[(i, k)] * l[(j, k)] * d[k];
            }
            l[(i, j)] = v / d[j];
        }
    }

    for j in 0..n {
        let scale = d[j].sqrt();
        l.column_mut(j).scale_mut(scale);
    }
    l
}

/// Initial filter state: zero mean, factor from the configured covariance.
pub fn initial_state(
    matrix: &ChannelMatrix,
    config: &FilterConfig,
    kernel: KernelKind,
    dim: usize,
) -> FilterState {
    let s = match config.initial_covariance {
        InitialCovariance::SampleCovariance => {
            // One second of signal, or the whole recording if shorter.
            let head = (matrix.sampling_rate().round() as usize).max(1);
            let cov = matrix.head_covariance(head);
            let p = DMatrix::from_fn(dim, dim, |i, j| cov[i][j]);
            let l = ldl_factor(&p);
            kernel.lower_factor(&l.transpose())
        }
        InitialCovariance::Identity => {
            DMatrix::<f64>::identity(dim, dim) * config.initial_variance.sqrt()
        }
    };
    FilterState::from_parts(DVector::zeros(dim), s)
}
