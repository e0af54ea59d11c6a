use kalman_linalg::KalmanFloat;
use ndarray::ArrayD;
use ndarray_rand::rand_distr::StandardNormal;
use rand::{distributions::Distribution, Rng};

use crate::error::{BeliefError, Result};

/// Capabilities a Kalman filter needs from a belief over its state: scoring
/// measurements, and producing samples as a deterministic function of
/// standard normal noise so the noise can be controlled or replayed.
pub trait KalmanFilterDistribution<T: KalmanFloat> {
    /// Shape of the noise accepted by [`Self::sample_given_noise_with_rng`],
    /// which is also the shape of a sample.
    fn expected_noise_shape(&self) -> Vec<usize>;

    /// Log-density of `value` under every instance of the batch.
    ///
    /// # Errors
    /// Fails if `value` does not have the shape of a sample.
    fn log_prob(&self, value: &ArrayD<T>) -> Result<ArrayD<T>>;

    /// Map `noise` to a sample, drawing standard normal noise from `rng` if none
    /// is given.
    ///
    /// # Errors
    /// Fails if `noise` does not have the shape [`Self::expected_noise_shape`].
    fn sample_given_noise_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        noise: Option<&ArrayD<T>>,
    ) -> Result<ArrayD<T>>
    where
        StandardNormal: Distribution<T>;

    /// [`Self::sample_given_noise_with_rng`] with the thread local rng.
    ///
    /// # Errors
    /// See [`Self::sample_given_noise_with_rng`].
    fn sample_given_noise(&self, noise: Option<&ArrayD<T>>) -> Result<ArrayD<T>>
    where
        StandardNormal: Distribution<T>,
    {
        self.sample_given_noise_with_rng(&mut rand::thread_rng(), noise)
    }

    /// Cumulative distribution function. Not available, a general dimensional
    /// Gaussian CDF has no closed form.
    ///
    /// # Errors
    /// Always fails with [`BeliefError::NotImplemented`].
    fn cdf(&self, _value: &ArrayD<T>) -> Result<ArrayD<T>> {
        Err(BeliefError::NotImplemented { operation: "cdf" })
    }

    /// Inverse cumulative distribution function.
    ///
    /// # Errors
    /// Always fails with [`BeliefError::NotImplemented`].
    fn icdf(&self, _value: &ArrayD<T>) -> Result<ArrayD<T>> {
        Err(BeliefError::NotImplemented { operation: "icdf" })
    }

    /// Enumerate the support of a discrete distribution, which a belief over a
    /// continuous state does not have.
    ///
    /// # Errors
    /// Always fails with [`BeliefError::NotImplemented`].
    fn enumerate_support(&self, _expand: bool) -> Result<ArrayD<T>> {
        Err(BeliefError::NotImplemented {
            operation: "enumerate_support",
        })
    }
}
