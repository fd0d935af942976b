//! Model persistence.
//!
//! Weights go through burn's `CompactRecorder` (`<name>.mpk`); a JSON
//! side-file with the same stem (`<name>.json`) records everything needed to
//! rebuild the network and the graph it was trained on.

use anyhow::{Context, Result};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::data::graph::AssemblerConfig;
use crate::data::preprocessing::FeatureStats;
use crate::model::architecture::{init_model, GeneGcn};
use crate::model::GcnConfig;
use crate::training::TrainingConfig;

const CHECKPOINT_PREFIX: &str = "epoch_";

/// Classification metrics on the labeled genes
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Metrics {
    /// Masked cross-entropy
    pub loss: f64,
    pub accuracy: f64,
    /// Driver as the positive class
    pub precision: f64,
    /// Driver as the positive class
    pub recall: f64,
    pub f1: f64,
}

/// JSON side-file written next to every saved model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Crate version that wrote the file
    pub version: String,
    /// Completed epochs
    pub epoch: usize,
    pub metrics: Metrics,
    /// Network dimensions; `input_size` is the feature width of the graph
    pub model_config: GcnConfig,
    pub training: TrainingConfig,
    /// Graph assembly settings the model was trained with
    pub assembler: AssemblerConfig,
    /// Number of genes in the training graph
    pub num_nodes: usize,
    /// Column statistics the training features were standardized with
    #[serde(default)]
    pub feature_stats: Option<FeatureStats>,
    pub created_at: DateTime<Utc>,
}

fn metadata_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("json")
}

/// Save and restore a [`GeneGcn`] with its metadata
pub struct ModelStore;

impl ModelStore {
    /// Write `path` (weights) and its JSON metadata
    pub fn save<B: Backend, P: AsRef<Path>>(
        model: &GeneGcn<B>,
        path: P,
        metadata: &CheckpointMetadata,
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        CompactRecorder::new()
            .record(model.clone().into_record(), path.to_path_buf())
            .with_context(|| format!("Failed to write model weights to {:?}", path))?;

        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(metadata_path(path), json)
            .with_context(|| format!("Failed to write metadata for {:?}", path))?;

        info!("Saved model: {:?}", path);
        Ok(())
    }

    /// Read only the metadata of a saved model
    pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<CheckpointMetadata> {
        let meta_path = metadata_path(path.as_ref());
        let json = fs::read_to_string(&meta_path)
            .with_context(|| format!("Failed to read metadata file {:?}", meta_path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse metadata file {:?}", meta_path))
    }

    /// Rebuild the network described by the metadata and load its weights
    pub fn load<B: Backend, P: AsRef<Path>>(
        path: P,
        device: &B::Device,
    ) -> Result<(GeneGcn<B>, CheckpointMetadata)> {
        let path = path.as_ref();
        let metadata = Self::read_metadata(path)?;

        let record = CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| format!("Failed to load model weights from {:?}", path))?;
        let model = init_model::<B>(&metadata.model_config, device).load_record(record);

        info!("Loaded model trained for {} epochs from {:?}", metadata.epoch, path);
        Ok((model, metadata))
    }
}

/// Periodic snapshots in one directory, oldest pruned first
pub struct CheckpointManager {
    dir: PathBuf,
    keep: usize,
}

impl CheckpointManager {
    /// Use (and create) `dir`; keeps the last 5 checkpoints
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create checkpoint directory {:?}", dir))?;
        Ok(Self { dir, keep: 5 })
    }

    /// Number of checkpoints to keep (at least one)
    pub fn with_max_checkpoints(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    /// Save a snapshot named after `metadata.epoch`
    pub fn save_checkpoint<B: Backend>(
        &self,
        model: &GeneGcn<B>,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}{:06}.mpk", CHECKPOINT_PREFIX, metadata.epoch));
        ModelStore::save(model, &path, metadata)?;
        self.prune()?;
        Ok(path)
    }

    /// `(epoch, path)` of every snapshot, oldest first
    pub fn list_checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read checkpoint directory {:?}", self.dir))?;

        let mut checkpoints: Vec<(usize, PathBuf)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "mpk"))
            .filter_map(|path| {
                let epoch = path.file_stem()?
                    .to_str()?
                    .strip_prefix(CHECKPOINT_PREFIX)?
                    .parse::<usize>()
                    .ok()?;
                Some((epoch, path))
            })
            .collect();

        checkpoints.sort_by_key(|(epoch, _)| *epoch);
        Ok(checkpoints)
    }

    fn prune(&self) -> Result<()> {
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(self.keep);

        for (_, path) in checkpoints.into_iter().take(excess) {
            debug!("Removing old checkpoint: {:?}", path);
            for file in [path.clone(), metadata_path(&path)] {
                if let Err(e) = fs::remove_file(&file) {
                    warn!("Failed to remove old checkpoint file {:?}, it stays on disk: {}", file, e);
                }
            }
        }
        Ok(())
    }
}
