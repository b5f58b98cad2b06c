//! Configuration for the evaluation example.

use std::path::Path;

use anyhow::{ensure, Result};
use burn::config::Config;
use segmetric::IouMetricConfig;

/// Configuration of a data-parallel evaluation run.
#[derive(Config, Debug)]
pub struct EvalConfig {
    /// Metric configuration shared by every worker.
    #[config(default = "IouMetricConfig::lapa()")]
    pub metric: IouMetricConfig,

    /// Number of worker threads the batches are sharded over.
    #[config(default = 1)]
    pub world_size: usize,

    /// Number of passes over the batches. Counts are reset between passes.
    #[config(default = 1)]
    pub epochs: usize,
}

impl EvalConfig {
    /// Loads an evaluation configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e:?}", path.display()))
    }

    /// Checks the run parameters and the metric configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.world_size > 0, "world_size must be positive");
        ensure!(self.epochs > 0, "epochs must be positive");
        self.metric.validate()?;
        Ok(())
    }
}
