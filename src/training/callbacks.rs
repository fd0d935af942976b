use crate::model::checkpoint::Metrics;
use crate::training::TrainingState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Training callback trait
///
/// Callbacks allow custom actions to be performed at various points during training.
pub trait TrainingCallback {
    /// Called at the start of training
    fn on_train_begin(&mut self) {}

    /// Called at the end of training
    fn on_train_end(&mut self, _state: &TrainingState) {}

    /// Called at the end of each epoch (`epoch` is 0-based)
    fn on_epoch_end(&mut self, _epoch: usize, _state: &TrainingState, _metrics: &Metrics) {}
}

/// Callback manager that handles multiple callbacks
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add_callback<C: TrainingCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn on_train_begin(&mut self) {
        for callback in &mut self.callbacks {
            callback.on_train_begin();
        }
    }

    pub fn on_train_end(&mut self, state: &TrainingState) {
        for callback in &mut self.callbacks {
            callback.on_train_end(state);
        }
    }

    pub fn on_epoch_end(&mut self, epoch: usize, state: &TrainingState, metrics: &Metrics) {
        for callback in &mut self.callbacks {
            callback.on_epoch_end(epoch, state, metrics);
        }
    }
}

/// Logs the loss every `log_frequency` epochs
pub struct ProgressLoggerCallback {
    log_frequency: usize,
}

impl ProgressLoggerCallback {
    /// Create new progress logger
    pub fn new(log_frequency: usize) -> Self {
        Self { log_frequency }
    }

    fn should_log(&self, epoch: usize) -> bool {
        self.log_frequency > 0 && epoch % self.log_frequency == 0
    }
}

impl TrainingCallback for ProgressLoggerCallback {
    fn on_epoch_end(&mut self, epoch: usize, _state: &TrainingState, metrics: &Metrics) {
        if self.should_log(epoch) {
            tracing::info!(
                "Loss after {} epochs: {:.4} (accuracy {:.4}, F1 {:.4})",
                epoch,
                metrics.loss,
                metrics.accuracy,
                metrics.f1
            );
        }
    }
}

/// One line of `training_history.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// Collects per-epoch metrics and writes them as a JSON array when training ends
pub struct HistoryCallback {
    path: PathBuf,
    records: Vec<EpochRecord>,
}

impl HistoryCallback {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            records: Vec::new(),
        }
    }

    fn write(&self) -> anyhow::Result<()> {
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.records)?;
        Ok(())
    }
}

impl TrainingCallback for HistoryCallback {
    fn on_epoch_end(&mut self, epoch: usize, _state: &TrainingState, metrics: &Metrics) {
        self.records.push(EpochRecord {
            epoch,
            metrics: metrics.clone(),
        });
    }

    fn on_train_end(&mut self, _state: &TrainingState) {
        match self.write() {
            Ok(()) => tracing::info!("Saved training history to {:?}", self.path),
            Err(e) => tracing::warn!(
                "Training history {:?} was not written, the per-epoch metrics are lost: {}",
                self.path, e
            ),
        }
    }
}

/// Reports wall-clock time when training ends
#[derive(Default)]
pub struct TimerCallback {
    started: Option<Instant>,
    epochs: u32,
}

impl TimerCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean wall-clock time per finished epoch
    pub fn average_epoch_time(&self) -> Option<Duration> {
        let started = self.started?;
        (self.epochs > 0).then(|| started.elapsed() / self.epochs)
    }
}

impl TrainingCallback for TimerCallback {
    fn on_train_begin(&mut self) {
        self.started = Some(Instant::now());
        self.epochs = 0;
    }

    fn on_epoch_end(&mut self, _epoch: usize, _state: &TrainingState, _metrics: &Metrics) {
        self.epochs += 1;
    }

    fn on_train_end(&mut self, state: &TrainingState) {
        let Some(started) = self.started else {
            return;
        };
        tracing::info!(
            "Training completed in {} ({} epochs, {:.2?} per epoch)",
            crate::utils::format_duration(started.elapsed().as_secs_f64()),
            state.epoch,
            self.average_epoch_time().unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logging_frequency() {
        let logger = ProgressLoggerCallback::new(10);
        assert!(logger.should_log(0));
        assert!(!logger.should_log(5));
        assert!(logger.should_log(20));
        assert!(!ProgressLoggerCallback::new(0).should_log(0));
    }

    #[test]
    fn test_callback_manager() {
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.json");

        let mut manager = CallbackManager::new();
        manager.add_callback(ProgressLoggerCallback::new(1));
        manager.add_callback(HistoryCallback::new(&history));
        manager.add_callback(TimerCallback::new());
        assert_eq!(manager.len(), 3);

        let mut state = TrainingState::new();
        manager.on_train_begin();
        for epoch in 0..3 {
            let metrics = Metrics {
                loss: 1.0 / (epoch + 1) as f64,
                ..Metrics::default()
            };
            state.update_epoch(metrics.loss, 0.0);
            manager.on_epoch_end(epoch, &state, &metrics);
        }
        manager.on_train_end(&state);

        let saved: Vec<EpochRecord> =
            serde_json::from_str(&std::fs::read_to_string(&history).unwrap()).unwrap();
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[2].epoch, 2);
        assert!((saved[1].metrics.loss - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_timer_records_epochs() {
        let mut timer = TimerCallback::new();
        assert!(timer.average_epoch_time().is_none());

        timer.on_train_begin();
        assert!(timer.average_epoch_time().is_none());
        timer.on_epoch_end(0, &TrainingState::new(), &Metrics::default());
        timer.on_epoch_end(1, &TrainingState::new(), &Metrics::default());
        assert_eq!(timer.epochs, 2);
        assert!(timer.average_epoch_time().is_some());
    }
}
