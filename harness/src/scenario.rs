use std::path::{Path, PathBuf};

use serde_derive::{Serialize, Deserialize};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Scenarios run one after another, each over a fresh group.
#[derive(Serialize, Deserialize)]
pub struct Execution(pub Vec<Scenario>);

impl Execution {
    /// Reads an execution file: a JSON list of scenarios.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct Scenario {
    /// Label printed before the run
    #[serde(default)]
    pub name: String,

    /// Number of participants
    pub participants: usize,

    /// Receive timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Coordinator crash probabilities
    #[serde(default)]
    pub faults: threepc::FaultInjection,

    /// Default probability that local work fails
    #[serde(default)]
    pub failure_rate: f64,

    /// Join indices of participants whose local work always fails
    #[serde(default)]
    pub failing: Vec<usize>,

    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_timeout() -> u64 {
    1000
}

impl Scenario {
    pub fn config(&self) -> threepc::Config {
        let mut config = threepc::Config::new(self.participants)
            .with_timeout(std::time::Duration::from_millis(self.timeout_ms))
            .with_faults(self.faults)
            .with_failure_rate(self.failure_rate);
        for index in &self.failing {
            config = config.with_failing(*index);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}
