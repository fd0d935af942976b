use crate::data::graph::{AssemblerConfig, GeneGraph};
use crate::data::MAPPING_FILE;
use crate::model::architecture::{init_model, GcnOutput, GeneGcn};
use crate::model::checkpoint::{CheckpointManager, CheckpointMetadata, Metrics, ModelStore};
use crate::model::gcn_conv::Propagation;
use crate::model::loss::{mask_indices, masked_cross_entropy, metrics as loss_metrics};
use crate::model::GcnConfig;
use crate::training::callbacks::{CallbackManager, HistoryCallback, ProgressLoggerCallback, TimerCallback};
use crate::training::{TrainingConfig, TrainingResult, TrainingState};
use anyhow::{bail, Result};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Saved model file name inside the output directory
pub const MODEL_FILE: &str = "model.mpk";
/// Per-epoch metrics file name inside the output directory
pub const HISTORY_FILE: &str = "training_history.json";

/// Metrics of a forward pass on the labeled nodes
pub fn labeled_metrics<B: Backend>(
    output: &GcnOutput<B>,
    mask: Tensor<B, 1, Int>,
    targets: Tensor<B, 1, Int>,
    loss: f64,
) -> Metrics {
    let predictions = output.predictions().select(0, mask);

    Metrics {
        loss,
        accuracy: loss_metrics::accuracy(predictions.clone(), targets.clone()) as f64,
        precision: loss_metrics::precision(predictions.clone(), targets.clone()) as f64,
        recall: loss_metrics::recall(predictions.clone(), targets.clone()) as f64,
        f1: loss_metrics::f1_score(predictions, targets) as f64,
    }
}

/// Full-graph trainer for the gene classifier
pub struct Trainer<B: AutodiffBackend> {
    /// Training configuration
    config: TrainingConfig,
    /// Model configuration; `input_size` follows the graph
    model_config: GcnConfig,
    /// Assembly settings recorded in the model metadata
    assembler: AssemblerConfig,
    /// Device
    device: B::Device,
    /// Directory for the final model, mapping and history
    output_dir: Option<PathBuf>,
    /// Directory for embedding snapshots
    snapshot_dir: Option<PathBuf>,
    /// Checkpoint manager
    checkpoint_manager: Option<CheckpointManager>,
    /// Epoch callbacks
    callbacks: CallbackManager,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create new trainer
    pub fn new(config: TrainingConfig, model_config: GcnConfig, device: B::Device) -> Self {
        let mut callbacks = CallbackManager::new();
        callbacks.add_callback(ProgressLoggerCallback::new(config.log_every));
        callbacks.add_callback(TimerCallback::new());

        Self {
            config,
            model_config,
            assembler: AssemblerConfig::default(),
            device,
            output_dir: None,
            snapshot_dir: None,
            checkpoint_manager: None,
            callbacks,
        }
    }

    /// Record the assembly settings of the training graph
    pub fn with_assembler_config(mut self, assembler: AssemblerConfig) -> Self {
        self.assembler = assembler;
        self
    }

    /// Write model, mapping, history and checkpoints under `dir`
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self> {
        let dir = crate::utils::ensure_dir(dir)?;
        self.callbacks.add_callback(HistoryCallback::new(dir.join(HISTORY_FILE)));
        if self.config.checkpoint_frequency > 0 {
            let manager = CheckpointManager::new(dir.join("checkpoints"))?
                .with_max_checkpoints(self.config.keep_checkpoints);
            self.checkpoint_manager = Some(manager);
        }
        self.output_dir = Some(dir);
        Ok(self)
    }

    /// Render embedding snapshots under `dir` every `snapshot_every` epochs
    pub fn with_snapshot_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self> {
        self.snapshot_dir = Some(crate::utils::ensure_dir(dir)?);
        Ok(self)
    }

    /// Train on every labeled node of `graph`
    pub fn train(&mut self, graph: &GeneGraph) -> Result<(GeneGcn<B>, TrainingResult)> {
        self.config.validate()?;
        let labeled = graph.labeled_indices().len();
        if labeled == 0 {
            bail!("Training mask is empty: no gene is labeled driver or passenger");
        }
        if graph.num_edges() == 0 {
            warn!("Graph has no edges; nodes only see their own features");
        }

        info!(
            "Training on {} labeled of {} genes for {} epochs (lr {}, seed {})",
            labeled,
            graph.num_nodes(),
            self.config.epochs,
            self.config.learning_rate,
            self.config.seed
        );

        let start_time = Instant::now();
        let mut state = TrainingState::new();

        B::seed(self.config.seed);
        let model_config = self.model_config.clone().with_input_size(graph.num_features);
        let mut model = init_model::<B>(&model_config, &self.device);
        let mut optim = AdamConfig::new().init::<B, GeneGcn<B>>();

        let x = graph.features_tensor::<B>(&self.device);
        let propagation = Propagation::<B>::from_graph(graph, &self.device);
        let labels = graph.labels_tensor::<B>(&self.device);
        let mask = mask_indices::<B>(&graph.train_mask, &self.device);
        let targets = labels.clone().select(0, mask.clone());

        let progress = self.progress_bar()?;
        self.callbacks.on_train_begin();

        for epoch in 0..self.config.epochs {
            let output = model.forward(x.clone(), &propagation);
            let loss = masked_cross_entropy(output.logits.clone(), mask.clone(), labels.clone());
            let loss_value = loss.clone().into_scalar().elem::<f64>();

            if !loss_value.is_finite() {
                bail!("Loss diverged at epoch {}: {}", epoch, loss_value);
            }

            let metrics = labeled_metrics(&output, mask.clone(), targets.clone(), loss_value);
            self.snapshot(epoch, &output, graph, loss_value)?;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(self.config.learning_rate, model, grads);

            state.update_epoch(metrics.loss, metrics.accuracy);
            self.callbacks.on_epoch_end(epoch, &state, &metrics);

            if let Some(manager) = &self.checkpoint_manager {
                if (epoch + 1) % self.config.checkpoint_frequency == 0 {
                    let metadata = self.metadata(&model_config, graph, state.epoch, metrics);
                    manager.save_checkpoint(&model, &metadata)?;
                }
            }

            progress.set_message(format!("loss {:.4}", loss_value));
            progress.inc(1);
        }

        progress.finish_and_clear();
        self.callbacks.on_train_end(&state);

        let final_metrics = self.evaluate(&model, graph, &propagation, mask, labels, targets);
        info!(
            "Final metrics on labeled genes: loss {:.4}, accuracy {:.4}, F1 {:.4}",
            final_metrics.loss, final_metrics.accuracy, final_metrics.f1
        );

        let model_path = match &self.output_dir {
            Some(dir) => {
                let path = dir.join(MODEL_FILE);
                let metadata = self.metadata(&model_config, graph, state.epoch, final_metrics.clone());
                ModelStore::save(&model, &path, &metadata)?;
                graph.mapping.save_json(dir.join(MAPPING_FILE))?;
                Some(path)
            }
            None => None,
        };

        let result = TrainingResult {
            state,
            model_path,
            final_metrics,
            duration_secs: start_time.elapsed().as_secs_f64(),
        };

        Ok((model, result))
    }

    fn evaluate(
        &self,
        model: &GeneGcn<B>,
        graph: &GeneGraph,
        propagation: &Propagation<B>,
        mask: Tensor<B, 1, Int>,
        labels: Tensor<B, 1, Int>,
        targets: Tensor<B, 1, Int>,
    ) -> Metrics {
        let x = graph.features_tensor::<B>(&self.device);
        let output = model.forward(x, propagation);
        let loss = masked_cross_entropy(output.logits.clone(), mask.clone(), labels)
            .into_scalar()
            .elem::<f64>();
        labeled_metrics(&output, mask, targets, loss)
    }

    fn snapshot(&self, epoch: usize, output: &GcnOutput<B>, graph: &GeneGraph, loss: f64) -> Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        let every = self.config.snapshot_every;
        if every == 0 || epoch % every != 0 {
            return Ok(());
        }

        let points = crate::viz::embedding_points(output.embedding.clone());
        let path = dir.join(format!("embedding_epoch_{:05}.svg", epoch));
        let caption = format!("Epoch: {}, Loss: {:.4}", epoch, loss);
        crate::viz::render_embedding(&path, &points, &graph.labels, Some(caption.as_str()))?;
        debug!("Saved embedding snapshot: {:?}", path);
        Ok(())
    }

    fn metadata(
        &self,
        model_config: &GcnConfig,
        graph: &GeneGraph,
        epoch: usize,
        metrics: Metrics,
    ) -> CheckpointMetadata {
        CheckpointMetadata {
            version: crate::VERSION.to_string(),
            epoch,
            metrics,
            model_config: model_config.clone(),
            training: self.config.clone(),
            assembler: self.assembler,
            num_nodes: graph.num_nodes(),
            feature_stats: graph.feature_stats.clone(),
            created_at: chrono::Utc::now(),
        }
    }

    fn progress_bar(&self) -> Result<ProgressBar> {
        if !self.config.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?;
        Ok(ProgressBar::new(self.config.epochs as u64).with_style(style))
    }
}

/// Train with default settings, optionally writing artifacts to `output_dir`
pub fn train_model<B: AutodiffBackend>(
    graph: &GeneGraph,
    model_config: GcnConfig,
    training_config: TrainingConfig,
    output_dir: Option<&Path>,
) -> Result<(GeneGcn<B>, TrainingResult)> {
    let device = B::Device::default();
    let mut trainer = Trainer::<B>::new(training_config, model_config, device);

    if let Some(dir) = output_dir {
        trainer = trainer.with_output_dir(dir)?;
    }

    trainer.train(graph)
}
