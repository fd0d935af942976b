use crate::data::graph::{AssemblerConfig, GeneGraph, GraphAssembler};
use crate::data::mapping::GeneMapping;
use crate::model::architecture::GeneGcn;
use crate::model::checkpoint::{CheckpointMetadata, ModelStore};
use crate::model::gcn_conv::Propagation;
use crate::model::loss::{mask_indices, masked_cross_entropy};
use crate::predict::{BatchPredictionResult, GenePrediction};
use crate::training::trainer::labeled_metrics;
use anyhow::{bail, Result};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use std::path::Path;
use tracing::{debug, info};

/// Runs a trained classifier over a whole gene graph
pub struct Predictor<B: Backend> {
    model: GeneGcn<B>,
    metadata: Option<CheckpointMetadata>,
    mapping: Option<GeneMapping>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load a model saved by training (`model.mpk` + `model.json`)
    pub fn from_checkpoint<P: AsRef<Path>>(path: P, device: B::Device) -> Result<Self> {
        let (model, metadata) = ModelStore::load::<B, _>(path, &device)?;
        Ok(Self {
            model,
            metadata: Some(metadata),
            mapping: None,
            device,
        })
    }

    /// Wrap an in-memory model
    pub fn from_model(model: GeneGcn<B>, device: B::Device) -> Self {
        Self {
            model,
            metadata: None,
            mapping: None,
            device,
        }
    }

    /// Require graphs to use this gene mapping
    pub fn with_mapping(mut self, mapping: GeneMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Metadata of the loaded checkpoint
    pub fn metadata(&self) -> Option<&CheckpointMetadata> {
        self.metadata.as_ref()
    }

    /// Assembler that scales features the way the training graph was scaled
    ///
    /// Standardization follows the checkpoint rather than `config`, and reuses
    /// the training statistics so a new cohort is not refitted onto itself.
    pub fn graph_assembler(&self, mut config: AssemblerConfig) -> GraphAssembler {
        let Some(metadata) = &self.metadata else {
            return GraphAssembler::new(config);
        };

        config.standardize = metadata.feature_stats.is_some();
        let assembler = GraphAssembler::new(config);
        match &metadata.feature_stats {
            Some(stats) => assembler.with_feature_stats(stats.clone()),
            None => assembler,
        }
    }

    fn check_compatible(&self, graph: &GeneGraph) -> Result<()> {
        if let Some(metadata) = &self.metadata {
            let expected = metadata.model_config.input_size;
            if graph.num_features != expected {
                bail!(
                    "Graph has {} features per gene but the model expects {}",
                    graph.num_features, expected
                );
            }
            match (&metadata.feature_stats, &graph.feature_stats) {
                (None, None) => {}
                (Some(trained), Some(used)) if trained == used => {}
                (Some(_), _) => bail!("Graph features were not standardized with the training statistics"),
                (None, Some(_)) => bail!("Model was trained on unstandardized features"),
            }
        }

        if let Some(mapping) = &self.mapping {
            if mapping.len() != graph.num_nodes() {
                bail!(
                    "Gene mapping has {} genes but the graph has {}",
                    mapping.len(),
                    graph.num_nodes()
                );
            }
            if let Some((idx, id)) = graph.mapping.iter().find(|(idx, id)| mapping.id_of(*idx) != Some(*id)) {
                bail!(
                    "Gene mapping disagrees at index {}: graph has {:?}, mapping has {:?}",
                    idx,
                    id,
                    mapping.id_of(idx)
                );
            }
        }

        Ok(())
    }

    /// Predict every gene in the graph
    pub fn predict(&self, graph: &GeneGraph) -> Result<BatchPredictionResult> {
        self.check_compatible(graph)?;

        let num_nodes = graph.num_nodes();
        info!("Predicting {} genes", num_nodes);

        let propagation = Propagation::<B>::from_graph(graph, &self.device);
        let output = self.model.forward(graph.features_tensor::<B>(&self.device), &propagation);

        let [_, num_classes] = output.logits.dims();
        let [_, embedding_size] = output.embedding.dims();
        let probabilities: Vec<f32> = output.probabilities().into_data().iter::<f32>().collect();
        let embedding: Vec<f32> = output.embedding.clone().into_data().iter::<f32>().collect();

        let predictions: Vec<GenePrediction> = graph.mapping.iter()
            .map(|(idx, id)| {
                let driver_probability = probabilities[idx * num_classes + 1] as f64;
                let coords = embedding[idx * embedding_size..(idx + 1) * embedding_size].to_vec();
                GenePrediction::new(id.to_string(), idx, graph.labels[idx], driver_probability)
                    .with_embedding(coords)
            })
            .collect();

        let metrics = if graph.labeled_indices().is_empty() {
            debug!("No labeled genes; skipping metrics");
            None
        } else {
            let mask = mask_indices::<B>(&graph.train_mask, &self.device);
            let labels = graph.labels_tensor::<B>(&self.device);
            let targets = labels.clone().select(0, mask.clone());
            let loss = masked_cross_entropy(output.logits.clone(), mask.clone(), labels)
                .into_scalar()
                .elem::<f64>();
            Some(labeled_metrics(&output, mask, targets, loss))
        };

        Ok(BatchPredictionResult::new(predictions, metrics))
    }
}

/// Writers for prediction results
pub mod utils {
    use super::*;
    use anyhow::Context;

    /// Save predictions to a CSV file
    pub fn save_predictions_to_csv<P: AsRef<Path>>(
        result: &BatchPredictionResult,
        path: P,
    ) -> Result<()> {
        let path = path.as_ref();
        let csv = result.to_csv()?;
        std::fs::write(path, csv)
            .with_context(|| format!("Failed to write predictions to {:?}", path))?;
        info!("Saved {} predictions to {:?}", result.gene_predictions.len(), path);
        Ok(())
    }

    /// Save predictions and summary to a JSON file
    pub fn save_predictions_to_json<P: AsRef<Path>>(
        result: &BatchPredictionResult,
        path: P,
    ) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write predictions to {:?}", path))?;
        info!("Saved {} predictions to {:?}", result.gene_predictions.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::graph::tests::{feature_row, link};
    use crate::data::{GeneLabel, GeneTables};
    use crate::model::architecture::init_model;
    use crate::model::GcnConfig;
    use crate::training::trainer::train_model;
    use crate::training::TrainingConfig;
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn small_graph() -> GeneGraph {
        let tables = GeneTables {
            features: vec![
                feature_row("g1", &[0.1, 0.2], 1),
                feature_row("g2", &[0.3, 0.4], 2),
                feature_row("g3", &[0.5, 0.6], 3),
            ],
            links: vec![link("g1", "g2", 1), link("g2", "g3", 2)],
            drivers: vec!["g2".to_string()],
            passengers: vec!["g3".to_string()],
        };
        GraphAssembler::default().assemble(&tables).unwrap()
    }

    #[test]
    fn test_predict_every_gene() {
        let device = <TestBackend as Backend>::Device::default();
        let graph = small_graph();
        let model = init_model::<TestBackend>(&GcnConfig::for_features(2), &device);

        let result = Predictor::from_model(model, device).predict(&graph).unwrap();

        assert_eq!(result.gene_predictions.len(), 3);
        for (idx, pred) in result.gene_predictions.iter().enumerate() {
            assert_eq!(pred.index, idx);
            assert!((0.0..=1.0).contains(&pred.driver_probability));
            assert_eq!(pred.embedding.len(), 2);
        }
        assert_eq!(result.gene_predictions[0].known_label, GeneLabel::Unknown);
        assert_eq!(result.summary.labeled_genes, 2);
        assert!(result.summary.labeled_metrics.is_some());
    }

    #[test]
    fn test_mapping_mismatch_is_rejected() {
        let device = <TestBackend as Backend>::Device::default();
        let graph = small_graph();
        let model = init_model::<TestBackend>(&GcnConfig::for_features(2), &device);

        let mapping = GeneMapping::from_ids(["g1", "g3", "g2"]);
        let err = Predictor::from_model(model, device)
            .with_mapping(mapping)
            .predict(&graph)
            .unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_training_standardization_is_reused() {
        let cohort = |offset: f32| GeneTables {
            features: vec![
                feature_row("g1", &[offset, 1.0], 1),
                feature_row("g2", &[offset + 10.0, 2.0], 2),
                feature_row("g3", &[offset + 5.0, 4.0], 3),
            ],
            links: vec![link("g1", "g2", 1), link("g2", "g3", 2)],
            drivers: vec!["g2".to_string()],
            passengers: vec!["g3".to_string()],
        };
        let config = AssemblerConfig {
            standardize: true,
            ..AssemblerConfig::default()
        };

        let dir = TempDir::new().unwrap();
        let train_graph = GraphAssembler::new(config).assemble(&cohort(0.0)).unwrap();
        let (_, training) = train_model::<Autodiff<TestBackend>>(
            &train_graph,
            GcnConfig::new(),
            TrainingConfig { epochs: 2, ..TrainingConfig::quick_test() },
            Some(dir.path()),
        )
        .unwrap();

        let device = <TestBackend as Backend>::Device::default();
        let predictor = Predictor::<TestBackend>::from_checkpoint(training.model_path.unwrap(), device).unwrap();
        let trained_stats = predictor.metadata().and_then(|m| m.feature_stats.clone());
        assert_eq!(trained_stats, train_graph.feature_stats);

        // the flag on the prediction side does not matter, the checkpoint decides
        let shifted = predictor
            .graph_assembler(AssemblerConfig::default())
            .assemble(&cohort(100.0))
            .unwrap();
        assert_eq!(shifted.feature_stats, train_graph.feature_stats);
        assert_ne!(shifted.features, train_graph.features);
        assert!(predictor.predict(&shifted).is_ok());

        let refit = GraphAssembler::new(config).assemble(&cohort(100.0)).unwrap();
        let err = predictor.predict(&refit).unwrap_err();
        assert!(err.to_string().contains("training statistics"));

        let raw = GraphAssembler::default().assemble(&cohort(100.0)).unwrap();
        assert!(predictor.predict(&raw).is_err());
    }

    #[test]
    fn test_predict_from_trained_checkpoint() {
        let dir = TempDir::new().unwrap();
        let graph = small_graph();
        let config = TrainingConfig {
            epochs: 3,
            ..TrainingConfig::quick_test()
        };
        let (_, training) = train_model::<Autodiff<TestBackend>>(
            &graph,
            GcnConfig::new(),
            config,
            Some(dir.path()),
        )
        .unwrap();

        let device = <TestBackend as Backend>::Device::default();
        let model_path = training.model_path.unwrap();
        let predictor = Predictor::<TestBackend>::from_checkpoint(&model_path, device).unwrap();
        assert_eq!(predictor.metadata().map(|m| m.epoch), Some(3));

        let result = predictor.predict(&graph).unwrap();
        assert_eq!(result.summary.total_genes, 3);

        let out = dir.path().join("predictions.json");
        utils::save_predictions_to_json(&result, &out).unwrap();
        let saved: BatchPredictionResult =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(saved.gene_predictions.len(), 3);

        // a graph with a different feature width cannot be scored
        let mut wide = graph.clone();
        wide.num_features = 3;
        assert!(predictor.predict(&wide).is_err());
    }
}
