//! # drivergcn: Driver Gene Classification
//!
//! drivergcn builds a gene interaction graph from TCGA cohort tables and
//! trains a graph convolutional network that separates cancer driver genes
//! from passenger genes.
//!
//! ## Features
//!
//! - Dense gene identifier mapping with JSON export
//! - Graph assembly (edge index, feature matrix, labels, training mask)
//! - Three-layer GCN with a 2-D embedding and linear classifier head
//! - Graph and embedding plots (SVG or PNG)
//! - Support for CSV, TSV and gzipped inputs
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use drivergcn::data::graph::AssemblerConfig;
//! use drivergcn::data::{CancerType, DatasetPaths};
//! use drivergcn::model::GcnConfig;
//! use drivergcn::training::{trainer::Trainer, TrainingConfig};
//! use drivergcn::TrainBackend;
//!
//! let paths = DatasetPaths::for_cancer("data", CancerType::Blca);
//! let graph = drivergcn::prepare_graph(&paths, AssemblerConfig::default()).unwrap();
//! graph.mapping.save_json("gene_mapping.json").unwrap();
//!
//! let device = Default::default();
//! let mut trainer = Trainer::<TrainBackend>::new(TrainingConfig::default(), GcnConfig::new(), device);
//! let (model, result) = trainer.train(&graph).unwrap();
//! ```

pub mod cli;
pub mod data;
pub mod model;
pub mod predict;
pub mod training;
pub mod utils;
pub mod viz;

use anyhow::Result;
use burn::backend::{Autodiff, NdArray};
use data::graph::{AssemblerConfig, GeneGraph, GraphAssembler};
use data::loader::TableLoader;
use data::DatasetPaths;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use data::mapping::GeneMapping;
pub use data::GeneLabel;
pub use model::{architecture::GeneGcn, GcnConfig};
pub use predict::{BatchPredictionResult, GenePrediction};
pub use training::{TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - driver gene classification with graph convolutional networks",
        NAME, VERSION
    )
}

/// Load a cohort's tables and assemble its graph
pub fn prepare_graph(paths: &DatasetPaths, config: AssemblerConfig) -> Result<GeneGraph> {
    let tables = TableLoader::new().load_tables(paths)?;
    GraphAssembler::new(config).assemble(&tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("drivergcn"));
        assert!(info_str.contains(VERSION));
    }

    #[test]
    fn test_prepare_graph_from_files() {
        let dir = TempDir::new().unwrap();
        let cohort = dir.path().join("blca");
        std::fs::create_dir_all(&cohort).unwrap();
        std::fs::write(cohort.join("gene_features"), "g1,0.1,0.2\ng2,0.3,0.4\ng3,0.5,0.6\n").unwrap();
        std::fs::write(cohort.join("links"), "g1,g2\ng2,g3\n").unwrap();
        std::fs::write(cohort.join("drivers"), "g2\n").unwrap();
        std::fs::write(cohort.join("passengers"), "g3\n").unwrap();

        let paths = DatasetPaths::for_cancer(dir.path(), data::CancerType::Blca);
        let graph = prepare_graph(&paths, AssemblerConfig::default()).unwrap();

        assert_eq!(graph.label_values(), vec![-1, 1, 0]);
        assert_eq!(graph.train_mask, vec![false, true, true]);
        assert_eq!(graph.to_string(), "GeneGraph(x=[3, 2], edge_index=[2, 2], y=[3], train_mask=[3])");

        let err = prepare_graph(&DatasetPaths::in_dir(dir.path()), AssemblerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Missing input files"));
    }

    #[test]
    fn test_exported_mapping_indexes_feature_rows() {
        let dir = TempDir::new().unwrap();
        let source = [
            ("g7", [1.0f32, 2.0]),
            ("g3", [3.0, 4.0]),
            ("g9", [5.0, 6.0]),
        ];
        // g3 appears twice; the first row wins
        std::fs::write(
            dir.path().join("gene_features"),
            "g7,1,2\ng3,3,4\n\ng9,5,6\ng3,8,8\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("links"), "g7,g3\ng9,g7\n").unwrap();
        std::fs::write(dir.path().join("drivers"), "g9\n").unwrap();
        std::fs::write(dir.path().join("passengers"), "g3\n").unwrap();

        let graph = prepare_graph(&DatasetPaths::in_dir(dir.path()), AssemblerConfig::default()).unwrap();
        let mapping_path = dir.path().join(data::MAPPING_FILE);
        graph.mapping.save_json(&mapping_path).unwrap();

        let reloaded = GeneMapping::load_json(&mapping_path).unwrap();
        assert_eq!(reloaded, graph.mapping);
        assert_eq!(reloaded.len(), source.len());

        for (id, row) in &source {
            let idx = reloaded.index_of(id).unwrap();
            assert_eq!(reloaded.id_of(idx), Some(*id));
            assert_eq!(graph.feature_row(idx), row.as_slice());
        }
        let mut indices: Vec<usize> = reloaded.iter().map(|(idx, _)| idx).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
