//! Orthogonalization kernels used to keep covariance factors triangular.
//!
//! Every kernel computes the `R` of a thin QR decomposition `A = Q·R` without
//! forming `Q`. The result is normalized to a non-negative diagonal, which makes
//! it unique for full-rank input: the three kernels are different paths to the
//! same `R`, and `RᵀR = AᵀA` holds for all of them.

use crate::error::{Result, SrkfError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelKind {
    GramSchmidt,
    Givens,
    Householder,
}

impl KernelKind {
    pub const ALL: [KernelKind; 3] = [
        KernelKind::GramSchmidt,
        KernelKind::Givens,
        KernelKind::Householder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KernelKind::GramSchmidt => "GramSchmidt",
            KernelKind::Givens => "Givens",
            KernelKind::Householder => "Householder",
        }
    }

    pub fn documentation(&self) -> &'static str {
        match self {
            KernelKind::GramSchmidt => {
                "Modified Gram-Schmidt: each column is orthogonalized against the already updated basis."
            }
            KernelKind::Givens => {
                "Givens rotations: 2x2 plane rotations zero one entry at a time, touching O(n) entries per step."
            }
            KernelKind::Householder => {
                "Householder reflections: one reflection zeros a whole sub-column; most accurate, most work."
            }
        }
    }

    /// Upper-triangular `R` (n x n, non-negative diagonal) with `RᵀR = AᵀA`.
    ///
    /// `a` is m x n. Inputs with fewer rows than columns are padded with zero rows.
    pub fn triangularize(&self, a: &DMatrix<f64>) -> DMatrix<f64> {
        let n = a.ncols();
        let padded;
        let a = if a.nrows() < n {
            padded = a.clone().resize_vertically(n, 0.0);
            &padded
        } else {
            a
        };

        let mut r = match self {
            KernelKind::GramSchmidt => modified_gram_schmidt(a),
            KernelKind::Givens => givens(a),
            KernelKind::Householder => householder(a),
        };
        normalize_signs(&mut r);
        r
    }

    /// Lower-triangular factor `L = Rᵀ` with `L·Lᵀ = AᵀA`.
    pub fn lower_factor(&self, a: &DMatrix<f64>) -> DMatrix<f64> {
        self.triangularize(a).transpose()
    }

    /// Upper-triangular square root `W` with `W·Wᵀ = S·Sᵀ`, for any square factor `S`.
    ///
    /// Uses the exchange permutation `J`: triangularizing `Sᵀ·J` gives
    /// `J·P·J = RᵀR`, so `W = J·Rᵀ·J` is upper triangular.
    pub fn upper_factor(&self, s: &DMatrix<f64>) -> DMatrix<f64> {
        let n = s.nrows();
        let reversed = DMatrix::from_fn(n, s.ncols().max(n), |i, j| {
            if i < s.ncols() && j < n {
                s[(n - 1 - j, i)]
            } else {
                0.0
            }
        });
        let r = self.triangularize(&reversed);
        DMatrix::from_fn(n, n, |i, j| r[(n - 1 - j, n - 1 - i)])
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelKind {
    type Err = SrkfError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "gramschmidt" | "gramshmidt" | "gs" => Ok(KernelKind::GramSchmidt),
            "givens" => Ok(KernelKind::Givens),
            "householder" => Ok(KernelKind::Householder),
            _ => Err(SrkfError::Validation(format!(
                "Unknown orthogonalization kernel '{}'. Valid kernels: GramSchmidt, Givens, Householder",
                s
            ))),
        }
    }
}

fn modified_gram_schmidt(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.ncols();
    let mut v = a.clone();
    let mut r = DMatrix::zeros(n, n);

    for k in 0..n {
        let norm = v.column(k).norm();
        r[(k, k)] = norm;
        if norm == 0.0 {
            continue;
        }
        v.column_mut(k).unscale_mut(norm);
        let q = v.column(k).clone_owned();

        // Project the remaining columns against the updated q, not the original column.
        for j in (k + 1)..n {
            let dot = q.dot(&v.column(j));
            r[(k, j)] = dot;
            v.column_mut(j).axpy(-dot, &q, 1.0);
        }
    }
    r
}

fn givens(a: &DMatrix<f64>) -> DMatrix<f64> {
    let (m, n) = a.shape();
    let mut w = a.clone();

    for j in 0..n {
        for i in ((j + 1)..m).rev() {
            let b = w[(i, j)];
            if b == 0.0 {
                continue;
            }
            let top = w[(i - 1, j)];
            let radius = top.hypot(b);
            let c = top / radius;
            let s = b / radius;

            // Rows i-1 and i are already zero left of column j.
            for k in j..n {
                let t1 = w[(i - 1, k)];
                let t2 = w[(i, k)];
                w[(i - 1, k)] = c * t1 + s * t2;
                w[(i, k)] = -s * t1 + c * t2;
            }
            w[(i, j)] = 0.0;
        }
    }
    upper_block(&w, n)
}

fn householder(a: &DMatrix<f64>) -> DMatrix<f64> {
    let (m, n) = a.shape();
    let mut w = a.clone();
    let mut v = vec![0.0; m];

    for k in 0..n {
        let len = m - k;
        let norm = (k..m).map(|i| w[(i, k)] * w[(i, k)]).sum::<f64>().sqrt();
        if norm == 0.0 {
            continue;
        }
        let alpha = if w[(k, k)] > 0.0 { -norm } else { norm };

        for (off, slot) in v.iter_mut().take(len).enumerate() {
            *slot = w[(k + off, k)];
        }
        v[0] -= alpha;
        let v_norm2: f64 = v[..len].iter().map(|x| x * x).sum();
        if v_norm2 == 0.0 {
            continue;
        }

        for j in k..n {
            let dot: f64 = (0..len).map(|off| v[off] * w[(k + off, j)]).sum();
            let f = 2.0 * dot / v_norm2;
            for off in 0..len {
                w[(k + off, j)] -= f * v[off];
            }
        }
        for i in (k + 1)..m {
            w[(i, k)] = 0.0;
        }
    }
    upper_block(&w, n)
}

fn upper_block(w: &DMatrix<f64>, n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| if i <= j { w[(i, j)] } else { 0.0 })
}

fn normalize_signs(r: &mut DMatrix<f64>) {
    for i in 0..r.nrows() {
        if r[(i, i)] < 0.0 {
            r.row_mut(i).neg_mut();
        }
    }
}
