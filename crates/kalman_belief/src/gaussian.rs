use kalman_linalg::prelude::*;
use ndarray::{s, Array2, Array3, ArrayBase, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Data, Dimension, Ix2, IxDyn};
use ndarray_rand::{rand_distr::StandardNormal, RandomExt};
use once_cell::sync::OnceCell;
use rand::{distributions::Distribution, Rng};

use crate::{
    config::BeliefConfig,
    distribution::KalmanFilterDistribution,
    error::{BeliefError, CovarianceDefect, Result},
};

/// A batch of multivariate normal distributions, parameterised by mean and
/// covariance.
///
/// The mean has shape `batch_shape + [event_dim]` and the covariance
/// `batch_shape + [event_dim, event_dim]`. A belief is immutable; the lower
/// triangular Cholesky factor of the covariance is computed the first time it
/// is needed and then shared by [`Self::log_prob`] and the sampling methods.
///
/// Beliefs with `event_dim == 1` are validated, scored and sampled without a
/// factorisation, using the closed-form scalar expressions instead.
#[derive(Debug, Clone)]
pub struct GaussianBelief<T: KalmanFloat> {
    batch_shape:   Vec<usize>,
    event_dim:     usize,
    /// `batch_shape + [event_dim]`, standard layout
    mean:          ArrayD<T>,
    /// `batch_shape + [event_dim, event_dim]`, standard layout
    covariance:    ArrayD<T>,
    validated:     bool,
    psd_tolerance: T,
    /// `[batch_size, event_dim, event_dim]`
    scale_tril:    OnceCell<Array3<T>>,
}

impl<T: KalmanFloat> GaussianBelief<T> {
    /// Create a new (batched) belief from its mean and covariance.
    ///
    /// The batch parts of `mean` (all axes but the last) and `covariance` (all
    /// axes but the last two) are broadcast against each other. Shapes are
    /// always checked. With `validate` set, every covariance matrix must
    /// additionally be finite, symmetric and positive semi-definite.
    ///
    /// # Errors
    /// - [`BeliefError::ShapeMismatch`] if the shapes are incompatible
    /// - [`BeliefError::InvalidCovariance`] if `validate` is set and a covariance
    ///   matrix is invalid
    ///
    /// # Example:
    /// ```
    /// use kalman_belief::{GaussianBelief, Result};
    /// use ndarray::array;
    /// fn main() -> Result<()> {
    ///     // a batch of two 2-dimensional beliefs sharing their covariance
    ///     let mean = array![[0.0, 1.0], [2.0, 3.0]];
    ///     let covariance = array![[1.0, 0.5], [0.5, 2.0]];
    ///     let belief = GaussianBelief::new(&mean, &covariance, true)?;
    ///     assert_eq!(belief.batch_shape(), &[2]);
    ///     assert_eq!(belief.covariance().shape(), &[2, 2, 2]);
    ///     Ok(())
    /// }
    /// ```
    pub fn new<S1, D1, S2, D2>(
        mean: &ArrayBase<S1, D1>,
        covariance: &ArrayBase<S2, D2>,
        validate: bool,
    ) -> Result<Self>
    where
        S1: Data<Elem = T>,
        D1: Dimension,
        S2: Data<Elem = T>,
        D2: Dimension,
    {
        let config = BeliefConfig {
            validate_args: validate,
            ..BeliefConfig::default()
        };
        Self::with_config(mean, covariance, &config)
    }

    /// Create a new belief, taking the validation mode and tolerances from
    /// `config`. See [`Self::new`].
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_config<S1, D1, S2, D2>(
        mean: &ArrayBase<S1, D1>,
        covariance: &ArrayBase<S2, D2>,
        config: &BeliefConfig,
    ) -> Result<Self>
    where
        S1: Data<Elem = T>,
        D1: Dimension,
        S2: Data<Elem = T>,
        D2: Dimension,
    {
        let (batch_shape, event_dim) = check_shapes(mean.shape(), covariance.shape())?;

        let mut mean_shape = batch_shape.clone();
        mean_shape.push(event_dim);
        let mut covariance_shape = mean_shape.clone();
        covariance_shape.push(event_dim);

        let belief = Self {
            mean: expand("mean", mean, &mean_shape)?,
            covariance: expand("covariance", covariance, &covariance_shape)?,
            batch_shape,
            event_dim,
            validated: config.validate_args,
            psd_tolerance: T::from_f64_lossy(config.psd_tolerance),
            scale_tril: OnceCell::new(),
        };

        if config.validate_args {
            belief.validate(T::from_f64_lossy(config.symmetry_tolerance))?;
        }

        tracing::debug!(
            "constructed gaussian belief with batch shape {:?}, event dim {}, validated: {}",
            belief.batch_shape,
            belief.event_dim,
            belief.validated
        );
        Ok(belief)
    }

    /// Create a single, un-batched belief from a mean vector and covariance
    /// matrix. The covariance is validated.
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn from_mean_and_covariance(mean: Vector<T>, covariance: Matrix<T>) -> Result<Self> {
        Self::new(&mean, &covariance, true)
    }

    /// The independent, differently parameterised instances this belief
    /// stacks.
    #[inline(always)]
    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    /// The length of the random vector of each instance.
    #[inline(always)]
    pub const fn event_dim(&self) -> usize {
        self.event_dim
    }

    #[inline(always)]
    pub fn event_shape(&self) -> [usize; 1] {
        [self.event_dim]
    }

    /// Whether every instance is a scalar Gaussian.
    #[inline(always)]
    pub const fn is_univariate(&self) -> bool {
        self.event_dim == 1
    }

    /// Whether the covariance was checked on construction.
    #[inline(always)]
    pub const fn is_validated(&self) -> bool {
        self.validated
    }

    /// Number of instances, the product of the batch shape.
    fn batch_size(&self) -> usize {
        self.batch_shape.iter().product()
    }

    /// Get the mean, of shape `batch_shape + [event_dim]`
    #[inline(always)]
    pub fn mean(&self) -> ArrayViewD<'_, T> {
        self.mean.view()
    }

    /// Get the covariance, of shape `batch_shape + [event_dim, event_dim]`
    #[inline(always)]
    pub fn covariance(&self) -> ArrayViewD<'_, T> {
        self.covariance.view()
    }

    /// The diagonal of the covariance, of shape `batch_shape + [event_dim]`
    pub fn variance(&self) -> ArrayD<T> {
        ArrayD::from_shape_fn(self.mean.raw_dim(), |index| {
            let mut position = index.slice().to_vec();
            if let Some(&i) = position.last() {
                position.push(i);
            }
            self.covariance[position.as_slice()]
        })
    }

    /// The lower triangular factor `L` with `L·Lᵗ = covariance`, of shape
    /// `batch_shape + [event_dim, event_dim]`.
    ///
    /// # Errors
    /// Returns [`BeliefError::InvalidCovariance`] if a covariance matrix can not
    /// be factorised, which can only happen for beliefs constructed without
    /// validation.
    pub fn scale_tril(&self) -> Result<ArrayD<T>> {
        let factor = self.factor()?;
        Ok(factor.clone().into_shape(self.covariance.raw_dim())?)
    }

    /// Evaluate the log-density of `value` under every instance of the batch.
    /// `value` must have shape `batch_shape + [event_dim]`, the result has
    /// shape `batch_shape`.
    ///
    /// # Errors
    /// - [`BeliefError::ShapeMismatch`] if `value` has the wrong shape
    /// - [`BeliefError::InvalidCovariance`] if the covariance can not be
    ///   factorised, or is singular so that no density exists
    pub fn log_prob<S, D>(&self, value: &ArrayBase<S, D>) -> Result<ArrayD<T>>
    where
        S: Data<Elem = T>,
        D: Dimension,
    {
        self.check_event_shaped("value", value.shape())?;
        let value = collapse_batch(value, 1)?.into_dimensionality::<Ix2>()?;
        let mean = self.flat_mean()?;

        let log_prob: Vec<T> = if self.is_univariate() {
            let covariance = self.flat_covariance()?;
            let mut log_prob = Vec::with_capacity(self.batch_size());
            for (b, ((&x, &mu), &var)) in value
                .column(0)
                .iter()
                .zip(mean.column(0))
                .zip(covariance.slice(s![.., 0, 0]))
                .enumerate()
            {
                self.check_variance(b, var, true)?;
                log_prob.push(univariate_log_prob(x, mu, var));
            }
            log_prob
        } else {
            let factor = self.factor()?;
            #[allow(clippy::cast_precision_loss)]
            let normalisation = T::from_f64_lossy(self.event_dim as f64) * T::half() * T::two_pi().ln();

            let mut log_prob = Vec::with_capacity(self.batch_size());
            for (b, l) in factor.outer_iter().enumerate() {
                let residual = &value.row(b) - &mean.row(b);
                // z = L⁻¹(x - μ), so the quadratic form (x - μ)ᵗΣ⁻¹(x - μ) is zᵗz
                let z = solve_lower_triangular(&l, &residual).ok_or_else(|| {
                    BeliefError::InvalidCovariance {
                        batch_index: unravel_index(b, &self.batch_shape),
                        reason:      CovarianceDefect::Singular,
                    }
                })?;
                log_prob.push(-T::half() * z.dot(&z) - lower_log_diagonal_sum(&l) - normalisation);
            }
            log_prob
        };

        Ok(ArrayD::from_shape_vec(IxDyn(&self.batch_shape), log_prob)?)
    }

    /// The differential entropy of every instance, of shape `batch_shape`.
    ///
    /// # Errors
    /// Returns [`BeliefError::InvalidCovariance`] if the covariance can not be
    /// factorised.
    pub fn entropy(&self) -> Result<ArrayD<T>> {
        let entropy: Vec<T> = if self.is_univariate() {
            let covariance = self.flat_covariance()?;
            let mut entropy = Vec::with_capacity(self.batch_size());
            for (b, &var) in covariance.slice(s![.., 0, 0]).iter().enumerate() {
                self.check_variance(b, var, false)?;
                entropy.push(T::half() * (T::one() + (T::two_pi() * var).ln()));
            }
            entropy
        } else {
            #[allow(clippy::cast_precision_loss)]
            let constant = T::from_f64_lossy(self.event_dim as f64) * T::half() * (T::one() + T::two_pi().ln());
            self.factor()?
                .outer_iter()
                .map(|l| constant + lower_log_diagonal_sum(&l))
                .collect()
        };
        Ok(ArrayD::from_shape_vec(IxDyn(&self.batch_shape), entropy)?)
    }

    /// The cached factor, computing it on first use.
    /// Concurrent first uses wait for a single computation. A failed
    /// factorisation is not cached.
    fn factor(&self) -> Result<&Array3<T>> {
        self.scale_tril.get_or_try_init(|| self.factorise())
    }

    fn factorise(&self) -> Result<Array3<T>> {
        let covariance = self.flat_covariance()?;
        let mut factor = Array3::zeros(covariance.raw_dim());
        for (b, (matrix, mut out)) in covariance
            .outer_iter()
            .zip(factor.outer_iter_mut())
            .enumerate()
        {
            let l = matrix.cholesky_lower(self.psd_tolerance).map_err(|err| {
                let batch_index = unravel_index(b, &self.batch_shape);
                tracing::warn!("covariance at batch index {:?} can not be factorised: {}", batch_index, err);
                BeliefError::InvalidCovariance {
                    batch_index,
                    reason: err.into(),
                }
            })?;
            out.assign(&l);
        }
        tracing::trace!(
            "factorised {} covariance matrices of size {}x{}",
            self.batch_size(),
            self.event_dim,
            self.event_dim
        );
        Ok(factor)
    }

    /// Check symmetry and positive semi-definiteness of every covariance. The
    /// factor computed along the way is kept. Univariate covariances are
    /// checked entry by entry instead.
    fn validate(&self, symmetry_tolerance: T) -> Result<()> {
        let covariance = self.flat_covariance()?;
        for (b, matrix) in covariance.outer_iter().enumerate() {
            let defect = if matrix.iter().any(|x| !x.is_finite()) {
                Some(CovarianceDefect::NonFinite)
            } else if !matrix.is_symmetric(symmetry_tolerance) {
                Some(CovarianceDefect::NotSymmetric)
            } else {
                None
            };
            if let Some(reason) = defect {
                return Err(BeliefError::InvalidCovariance {
                    batch_index: unravel_index(b, &self.batch_shape),
                    reason,
                });
            }
        }

        if self.is_univariate() {
            for (b, &var) in covariance.slice(s![.., 0, 0]).iter().enumerate() {
                self.check_variance(b, var, false)?;
            }
            Ok(())
        } else {
            self.factor().map(|_| ())
        }
    }

    /// The defects the factorisation reports, for the `1x1` covariance at flat
    /// batch index `b`. A zero variance is only a defect when a density is
    /// needed.
    fn check_variance(&self, b: usize, variance: T, needs_density: bool) -> Result<()> {
        let reason = if !variance.is_finite() {
            CovarianceDefect::NonFinite
        } else if variance < T::zero() {
            CovarianceDefect::NotPositiveSemiDefinite
        } else if needs_density && variance.is_zero() {
            CovarianceDefect::Singular
        } else {
            return Ok(());
        };
        Err(BeliefError::InvalidCovariance {
            batch_index: unravel_index(b, &self.batch_shape),
            reason,
        })
    }

    fn flat_mean(&self) -> Result<ArrayView2<'_, T>> {
        Ok(self.mean.view().into_shape((self.batch_size(), self.event_dim))?)
    }

    fn flat_covariance(&self) -> Result<ArrayView3<'_, T>> {
        Ok(self
            .covariance
            .view()
            .into_shape((self.batch_size(), self.event_dim, self.event_dim))?)
    }

    /// `batch_shape + [event_dim]`
    pub fn expected_noise_shape(&self) -> Vec<usize> {
        self.mean.shape().to_vec()
    }

    fn check_event_shaped(&self, tensor: &'static str, shape: &[usize]) -> Result<()> {
        if shape == self.mean.shape() {
            Ok(())
        } else {
            Err(BeliefError::ShapeMismatch {
                tensor,
                expected: self.expected_noise_shape(),
                actual: shape.to_vec(),
            })
        }
    }
}

impl<T: KalmanFloat> GaussianBelief<T>
where
    StandardNormal: Distribution<T>,
{
    /// Draw a reparameterised sample, `mean + L·noise`.
    ///
    /// If `noise` is given it must have shape `batch_shape + [event_dim]` and
    /// the result is a deterministic function of it. Otherwise standard normal
    /// noise of that shape is drawn from `rng`.
    ///
    /// # Errors
    /// - [`BeliefError::ShapeMismatch`] if `noise` has the wrong shape
    /// - [`BeliefError::InvalidCovariance`] if a covariance can not be
    ///   factorised
    pub fn sample_given_noise_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        noise: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>> {
        let noise: Array2<T> = match noise {
            Some(noise) => {
                self.check_event_shaped("noise", noise.shape())?;
                collapse_batch(noise, 1)?.into_dimensionality::<Ix2>()?
            }
            None => Array2::random_using((self.batch_size(), self.event_dim), StandardNormal, rng),
        };
        let mean = self.flat_mean()?;

        let sample = if self.is_univariate() {
            let covariance = self.flat_covariance()?;
            let variance = covariance.slice(s![.., .., 0]);
            for (b, &var) in variance.iter().enumerate() {
                self.check_variance(b, var, false)?;
            }
            variance.mapv(T::sqrt) * noise + mean
        } else {
            let factor = self.factor()?;
            batch_mv(factor.view(), noise.view()) + mean
        };

        Ok(sample.into_shape(self.mean.raw_dim())?)
    }

    /// Draw `n` independent samples from every instance, of shape
    /// `[n] + batch_shape + [event_dim]`.
    ///
    /// # Errors
    /// Returns [`BeliefError::InvalidCovariance`] if a multivariate covariance
    /// can not be factorised.
    pub fn sample_n<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<ArrayD<T>> {
        let mut shape = Vec::with_capacity(self.mean.ndim() + 1);
        shape.push(n);
        shape.extend_from_slice(self.mean.shape());

        let mut samples = Vec::with_capacity(shape.iter().product());
        for _ in 0..n {
            samples.extend(self.sample_given_noise_with_rng(rng, None)?.iter().copied());
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), samples)?)
    }
}

impl<T: KalmanFloat> KalmanFilterDistribution<T> for GaussianBelief<T> {
    fn expected_noise_shape(&self) -> Vec<usize> {
        Self::expected_noise_shape(self)
    }

    fn log_prob(&self, value: &ArrayD<T>) -> Result<ArrayD<T>> {
        Self::log_prob(self, value)
    }

    fn sample_given_noise_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        noise: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>>
    where
        StandardNormal: Distribution<T>,
    {
        Self::sample_given_noise_with_rng(self, rng, noise)
    }
}

fn univariate_log_prob<T: KalmanFloat>(x: T, mean: T, variance: T) -> T {
    let diff = x - mean;
    -(diff * diff) / (variance + variance) - T::half() * (T::two_pi() * variance).ln()
}

/// Validate the shapes of a mean and covariance, returning the broadcast batch
/// shape and the event dimension.
fn check_shapes(mean: &[usize], covariance: &[usize]) -> Result<(Vec<usize>, usize)> {
    let Some((&event_dim, mean_batch)) = mean.split_last() else {
        return Err(BeliefError::ShapeMismatch {
            tensor:   "mean",
            expected: covariance.last().map_or_else(|| vec![1], |&k| vec![k]),
            actual:   mean.to_vec(),
        });
    };

    let square = |batch: &[usize]| {
        let mut shape = batch.to_vec();
        shape.extend([event_dim, event_dim]);
        shape
    };

    if covariance.len() < 2 {
        return Err(BeliefError::ShapeMismatch {
            tensor:   "covariance",
            expected: square(&[]),
            actual:   covariance.to_vec(),
        });
    }
    let (covariance_batch, matrix) = covariance.split_at(covariance.len() - 2);
    if matrix != [event_dim, event_dim] {
        return Err(BeliefError::ShapeMismatch {
            tensor:   "covariance",
            expected: square(covariance_batch),
            actual:   covariance.to_vec(),
        });
    }

    if event_dim == 0 {
        let mut expected = mean_batch.to_vec();
        expected.push(1);
        return Err(BeliefError::ShapeMismatch {
            tensor: "mean",
            expected,
            actual: mean.to_vec(),
        });
    }

    let Some(batch_shape) = broadcast_shapes(mean_batch, covariance_batch) else {
        let mut expected = covariance_batch.to_vec();
        expected.push(event_dim);
        return Err(BeliefError::ShapeMismatch {
            tensor: "mean",
            expected,
            actual: mean.to_vec(),
        });
    };

    Ok((batch_shape, event_dim))
}

/// Broadcast `array` to `shape` and copy it into a standard layout array.
fn expand<T, S, D>(tensor: &'static str, array: &ArrayBase<S, D>, shape: &[usize]) -> Result<ArrayD<T>>
where
    T: KalmanFloat,
    S: Data<Elem = T>,
    D: Dimension,
{
    let Some(view) = array.broadcast(IxDyn(shape)) else {
        return Err(BeliefError::ShapeMismatch {
            tensor,
            expected: shape.to_vec(),
            actual:   array.shape().to_vec(),
        });
    };
    Ok(ArrayD::from_shape_vec(IxDyn(shape), view.iter().copied().collect())?)
}
