pub mod callbacks;
pub mod trainer;

use crate::utils::validation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of full-graph training epochs
    pub epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Random seed for weight initialization
    pub seed: u64,
    /// Log the loss every N epochs (0 = never)
    pub log_every: usize,
    /// Render the embedding every N epochs (0 = never)
    pub snapshot_every: usize,
    /// Save a checkpoint every N epochs (0 = never)
    pub checkpoint_frequency: usize,
    /// Periodic checkpoints kept on disk, oldest removed first
    pub keep_checkpoints: usize,
    /// Show a progress bar on stderr
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 2000,
            learning_rate: 0.01,
            seed: 1234,
            log_every: 10,
            snapshot_every: 0,
            checkpoint_frequency: 0,
            keep_checkpoints: 5,
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            epochs: 20,
            log_every: 0,
            show_progress: false,
            ..Default::default()
        }
    }

    /// Load a (possibly partial) configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config {:?}", path))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse training config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings training cannot run with
    pub fn validate(&self) -> Result<()> {
        validation::positive(self.epochs, "epochs")?;
        validation::positive(self.learning_rate, "learning rate")?;
        Ok(())
    }
}

/// Training state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    /// Completed epochs
    pub epoch: usize,
    /// Lowest training loss seen
    pub best_loss: f64,
    /// Loss per epoch
    pub loss_history: Vec<f64>,
    /// Accuracy on labeled nodes per epoch
    pub accuracy_history: Vec<f64>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self {
            epoch: 0,
            best_loss: f64::INFINITY,
            loss_history: Vec::new(),
            accuracy_history: Vec::new(),
        }
    }

    /// Update after epoch
    pub fn update_epoch(&mut self, loss: f64, accuracy: f64) {
        self.epoch += 1;
        self.loss_history.push(loss);
        self.accuracy_history.push(accuracy);
        self.best_loss = self.best_loss.min(loss);
    }

    /// Loss of the most recent epoch
    pub fn last_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final training state
    pub state: TrainingState,
    /// Path of the saved model, if an output directory was set
    pub model_path: Option<std::path::PathBuf>,
    /// Metrics of the final model on the labeled nodes
    pub final_metrics: crate::model::checkpoint::Metrics,
    /// Training duration in seconds
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_tracking() {
        let mut state = TrainingState::new();
        state.update_epoch(0.7, 0.5);
        state.update_epoch(0.4, 0.75);
        state.update_epoch(0.5, 0.75);

        assert_eq!(state.epoch, 3);
        assert_eq!(state.best_loss, 0.4);
        assert_eq!(state.last_loss(), Some(0.5));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("training.json");
        std::fs::write(&path, r#"{"epochs": 50, "learning_rate": 0.05}"#).unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 50);
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.seed, 1234);
        assert_eq!(config.log_every, 10);

        std::fs::write(&path, r#"{"learning_rate": 0.0}"#).unwrap();
        assert!(TrainingConfig::load(&path).is_err());
    }
}
