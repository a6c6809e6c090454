use super::CmaEsConfiguration;
use crate::error::{Result, TunerError};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Eigen decomposition `C = B diag(λ) Bᵀ` of a covariance matrix.
///
/// Negative eigenvalues caused by rounding are clamped to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenDecomposition {
    /// Columns are the eigenvectors `b_i`
    pub eigenvectors: DMatrix<f64>,
    pub eigenvalues: DVector<f64>,
}

impl EigenDecomposition {
    pub fn new(covariances: &DMatrix<f64>) -> Self {
        let n = covariances.nrows();
        let is_diagonal = (0..n).all(|i| (0..n).all(|j| i == j || covariances[(i, j)] == 0.0));

        // A diagonal matrix is its own decomposition.
        let (eigenvectors, eigenvalues) = if is_diagonal {
            (DMatrix::identity(n, n), covariances.diagonal())
        } else {
            let eigen = SymmetricEigen::new(covariances.clone());
            (eigen.eigenvectors, eigen.eigenvalues)
        };

        Self {
            eigenvectors,
            eigenvalues: eigenvalues.map(|v| if v.is_nan() { 0.0 } else { v.max(0.0) }),
        }
    }

    pub fn dimension(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn max_eigenvalue(&self) -> f64 {
        self.eigenvalues.max()
    }

    pub fn min_eigenvalue(&self) -> f64 {
        self.eigenvalues.min()
    }

    /// Standard deviations along the principal axes
    pub fn sqrt_eigenvalues(&self) -> DVector<f64> {
        self.eigenvalues.map(f64::sqrt)
    }

    /// `B diag(√λ)`, maps standard normal samples onto N(0, C)
    pub fn transformation(&self) -> DMatrix<f64> {
        &self.eigenvectors * DMatrix::from_diagonal(&self.sqrt_eigenvalues())
    }

    /// `C^{-1/2} = B diag(1/√λ) Bᵀ`
    pub fn inverse_sqrt(&self) -> DMatrix<f64> {
        let inverse = self.eigenvalues.map(|v| 1.0 / v.max(1e-20).sqrt());
        &self.eigenvectors * DMatrix::from_diagonal(&inverse) * self.eigenvectors.transpose()
    }
}

/// Complete state of a CMA-ES run.
///
/// Fields are optional so that partially restored or hand-built states can be
/// inspected by termination criteria, which report missing fields as
/// [`TunerError::Precondition`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmaEsElements {
    pub configuration: Option<CmaEsConfiguration>,
    pub generation: usize,
    pub distribution_mean: Option<DVector<f64>>,
    pub step_size: Option<f64>,
    pub covariances: Option<DMatrix<f64>>,
    pub covariances_decomposition: Option<EigenDecomposition>,
    pub evolution_path: Option<DVector<f64>>,
    pub conjugate_evolution_path: Option<DVector<f64>>,
}

impl CmaEsElements {
    pub fn configuration(&self) -> Result<&CmaEsConfiguration> {
        self.configuration.as_ref().ok_or_else(|| missing("configuration"))
    }

    pub fn distribution_mean(&self) -> Result<&DVector<f64>> {
        self.distribution_mean.as_ref().ok_or_else(|| missing("distribution mean"))
    }

    pub fn step_size(&self) -> Result<f64> {
        self.step_size.ok_or_else(|| missing("step size"))
    }

    pub fn covariances(&self) -> Result<&DMatrix<f64>> {
        self.covariances.as_ref().ok_or_else(|| missing("covariance matrix"))
    }

    pub fn covariances_decomposition(&self) -> Result<&EigenDecomposition> {
        self.covariances_decomposition
            .as_ref()
            .ok_or_else(|| missing("covariance decomposition"))
    }

    pub fn evolution_path(&self) -> Result<&DVector<f64>> {
        self.evolution_path.as_ref().ok_or_else(|| missing("evolution path"))
    }

    pub fn conjugate_evolution_path(&self) -> Result<&DVector<f64>> {
        self.conjugate_evolution_path
            .as_ref()
            .ok_or_else(|| missing("conjugate evolution path"))
    }

    /// Every field is set and all vectors and matrices share one dimension
    pub fn is_consistent(&self) -> bool {
        let (Ok(mean), Ok(covariances), Ok(decomposition), Ok(p_c), Ok(p_sigma), Ok(_), Ok(_)) = (
            self.distribution_mean(),
            self.covariances(),
            self.covariances_decomposition(),
            self.evolution_path(),
            self.conjugate_evolution_path(),
            self.configuration(),
            self.step_size(),
        ) else {
            return false;
        };
        let n = mean.len();
        covariances.nrows() == n
            && covariances.ncols() == n
            && decomposition.dimension() == n
            && p_c.len() == n
            && p_sigma.len() == n
    }
}

fn missing(field: &str) -> TunerError {
    TunerError::Precondition(format!("CMA-ES state has no {}", field))
}
