use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::transport::config::NetworkConfig;
use crate::{Error, Parameters, Transform};

/// Run configuration shared by the role binaries. Every field has a default,
/// and command-line flags override what the file sets.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub transform: Transform,
    /// Ring width L, 32 or 64.
    pub ring_bits: u32,
    pub signal_bits: u32,
    pub segment_bits: u32,
    /// Number of evaluations (and bundles).
    pub count: usize,
    /// Worker pool size. Defaults to the available parallelism.
    pub threads: Option<usize>,
    /// Intercept table, raw little-endian `u64` entries.
    pub intercepts: Option<PathBuf>,
    /// Slope table for the biorthogonal transform.
    pub slopes: Option<PathBuf>,
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transform: Transform::Haar,
            ring_bits: 64,
            signal_bits: 32,
            segment_bits: 22,
            count: 1,
            threads: None,
            intercepts: None,
            slopes: None,
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> io::Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn parameters(&self) -> Result<Parameters, Error> {
        Parameters::with_ring_bits(self.ring_bits, self.signal_bits, self.segment_bits)
    }

    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
