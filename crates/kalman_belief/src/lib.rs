//! Gaussian beliefs over the state of a Kalman filter.
//!
//! A [`GaussianBelief`] is a batch of multivariate normal distributions that
//! can score values with [`GaussianBelief::log_prob`] and turn standard normal
//! noise into samples with
//! [`KalmanFilterDistribution::sample_given_noise`].

pub mod config;
pub mod distribution;
pub mod error;
pub mod gaussian;

pub use config::{read_config, BeliefConfig};
pub use distribution::KalmanFilterDistribution;
pub use error::{BeliefError, CovarianceDefect, Result};
pub use gaussian::GaussianBelief;

pub mod prelude {
    pub use super::{BeliefConfig, BeliefError, GaussianBelief, KalmanFilterDistribution};
}
