use kalman_linalg::CholeskyError;

/// What is wrong with a covariance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CovarianceDefect {
    #[error("it contains non-finite entries")]
    NonFinite,
    #[error("it is not symmetric")]
    NotSymmetric,
    #[error("it is not positive semi-definite")]
    NotPositiveSemiDefinite,
    /// Positive semi-definite but rank deficient. The belief can still be
    /// sampled from, but has no density.
    #[error("it is singular, so the log-density is undefined")]
    Singular,
}

impl From<CholeskyError> for CovarianceDefect {
    fn from(value: CholeskyError) -> Self {
        match value {
            CholeskyError::NonFinite => Self::NonFinite,
            // a non-square matrix can not be symmetric, and shapes are checked before
            // any factorisation anyway
            CholeskyError::NotSquare(..) => Self::NotSymmetric,
            CholeskyError::NotPositiveSemiDefinite => Self::NotPositiveSemiDefinite,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BeliefError {
    #[error("{tensor} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        /// Which input had the wrong shape, e.g. "mean" or "noise"
        tensor:   &'static str,
        expected: Vec<usize>,
        actual:   Vec<usize>,
    },
    #[error("the covariance matrix at batch index {batch_index:?} is invalid: {reason}")]
    InvalidCovariance {
        /// Multi-index into the batch shape, empty for an un-batched belief
        batch_index: Vec<usize>,
        reason:      CovarianceDefect,
    },
    #[error("`{operation}` is not implemented for Gaussian beliefs")]
    NotImplemented { operation: &'static str },
    #[error("failed to reshape a batched array: {0}")]
    Reshape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, BeliefError>;
