//! Configuration of how beliefs are constructed and sampled.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Error type for [`read_config`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigReaderError {
    /// No config file found among the default locations or the one given as
    /// input
    #[error("No config file found")]
    NoConfigFile,
    /// Config parse error. See [`ParseError`]
    #[error("Parse error {0}")]
    Parse(#[from] ParseError),
}

/// **Belief Config**
/// Parameters shared by every belief a filter constructs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BeliefConfig {
    /// Check symmetry and positive semi-definiteness of every covariance on
    /// construction. When false, the covariance is trusted and only its shape
    /// is checked.
    pub validate_args: bool,
    /// Largest allowed `|a_ij - a_ji|`, relative to the largest absolute entry
    /// of the covariance.
    pub symmetry_tolerance: f64,
    /// An eigenvalue or Cholesky pivot within this distance of zero, relative to the largest
    /// diagonal entry, is treated as an exact zero.
    pub psd_tolerance: f64,
    /// The seed at which the random number generator returned by
    /// [`BeliefConfig::rng`] is seeded, to get reproducible samples.
    /// Seeded from system entropy when absent.
    pub prng_seed: Option<u64>,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            validate_args:      false,
            symmetry_tolerance: 1e-6,
            psd_tolerance:      1e-10,
            prng_seed:          None,
        }
    }
}

impl BeliefConfig {
    /// Parse a config from a TOML string.
    /// Missing keys take their default value.
    ///
    /// # Errors
    /// Returns a [`ParseError::Toml`] if the string is not a valid config.
    pub fn parse(contents: &str) -> Result<Self, ParseError> {
        let config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Parse a config file.
    ///
    /// # Errors
    /// Returns a `ParseError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self, ParseError> {
        Self::parse(std::fs::read_to_string(file_path)?.as_str())
    }

    /// The same config with validation turned on.
    pub fn validated(self) -> Self {
        Self {
            validate_args: true,
            ..self
        }
    }

    /// A random number generator seeded with [`Self::prng_seed`].
    pub fn rng(&self) -> ChaCha8Rng {
        self.prng_seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64)
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![];

    if let Some(base_dirs) = BaseDirs::new() {
        paths.push(
            base_dirs
                .config_dir()
                .join("kalman_belief")
                .join("config.toml"),
        );
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("config/config.toml"));
    }

    paths
}

/// Read the config from `path`, falling back to the default locations
/// `<config dir>/kalman_belief/config.toml` and `./config/config.toml`.
///
/// # Errors
/// Returns [`ConfigReaderError::NoConfigFile`] if none of the candidates exist,
/// or [`ConfigReaderError::Parse`] if the first existing one is invalid.
pub fn read_config<P: AsRef<Path>>(path: Option<P>) -> Result<BeliefConfig, ConfigReaderError> {
    let Some(path) = path
        .map(|p| p.as_ref().to_path_buf())
        .into_iter()
        .chain(default_paths())
        .find(|p| p.exists())
    else {
        return Err(ConfigReaderError::NoConfigFile);
    };

    tracing::debug!("reading belief config from {}", path.display());
    Ok(BeliefConfig::from_file(path)?)
}
