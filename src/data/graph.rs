//! Graph assembly from the raw cohort tables.
//!
//! The feature table fixes the node set and its indices; drivers, passengers
//! and links are translated into that index space. With standardization the
//! fitted column statistics travel with the graph so that a trained model can
//! later be applied to another cohort on the same scale.

use crate::data::mapping::{GeneMapping, UnmappedPolicy};
use crate::data::preprocessing::{standardize_features, FeatureStats};
use crate::data::{GeneLabel, GeneTables, DEFAULT_MAX_LINKS};
use anyhow::{bail, Result};
use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Graph assembly configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Number of link rows to keep (0 = unlimited)
    pub max_links: usize,
    /// Add the reverse of every link
    pub undirected: bool,
    /// Z-score standardize feature columns
    pub standardize: bool,
    /// Handling of identifiers missing from the feature table
    #[serde(skip)]
    pub unmapped: UnmappedPolicy,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            undirected: false,
            standardize: false,
            unmapped: UnmappedPolicy::Error,
        }
    }
}

/// Label totals over all nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelCounts {
    pub drivers: usize,
    pub passengers: usize,
    pub unknown: usize,
}

/// Gene interaction graph in node-index space
#[derive(Debug, Clone)]
pub struct GeneGraph {
    /// Gene identifier <-> node index
    pub mapping: GeneMapping,
    /// Row-major `[num_nodes, num_features]` feature matrix
    pub features: Vec<f32>,
    /// Number of feature columns
    pub num_features: usize,
    /// Edge sources (first row of the edge index)
    pub sources: Vec<usize>,
    /// Edge targets (second row of the edge index)
    pub targets: Vec<usize>,
    /// Label per node
    pub labels: Vec<GeneLabel>,
    /// True for nodes with a driver/passenger label
    pub train_mask: Vec<bool>,
    /// Standardization statistics, if applied
    pub feature_stats: Option<FeatureStats>,
}

impl GeneGraph {
    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.mapping.len()
    }

    /// Number of directed edges
    pub fn num_edges(&self) -> usize {
        self.sources.len()
    }

    /// Edges as `(source, target)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sources.iter().copied().zip(self.targets.iter().copied())
    }

    /// Numeric labels (driver = 1, passenger = 0, unknown = -1)
    pub fn label_values(&self) -> Vec<i64> {
        self.labels.iter().map(GeneLabel::value).collect()
    }

    /// Node indices selected by the training mask
    pub fn labeled_indices(&self) -> Vec<usize> {
        self.train_mask.iter()
            .enumerate()
            .filter_map(|(i, &m)| m.then_some(i))
            .collect()
    }

    /// Count nodes per label
    pub fn label_counts(&self) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for label in &self.labels {
            match label {
                GeneLabel::Driver => counts.drivers += 1,
                GeneLabel::Passenger => counts.passengers += 1,
                GeneLabel::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Feature row of a node
    pub fn feature_row(&self, node: usize) -> &[f32] {
        &self.features[node * self.num_features..(node + 1) * self.num_features]
    }

    /// Feature matrix `[num_nodes, num_features]`
    pub fn features_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data = TensorData::new(self.features.clone(), [self.num_nodes(), self.num_features]);
        Tensor::from_data(data, device)
    }

    /// Edge index `[2, num_edges]`
    pub fn edge_index_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        let values: Vec<i64> = self.sources.iter()
            .chain(self.targets.iter())
            .map(|&i| i as i64)
            .collect();
        let data = TensorData::new(values, [2, self.num_edges()]);
        Tensor::from_data(data, device)
    }

    /// Label vector `[num_nodes]`
    pub fn labels_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        let data = TensorData::new(self.label_values(), [self.num_nodes()]);
        Tensor::from_data(data, device)
    }
}

impl fmt::Display for GeneGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeneGraph(x=[{}, {}], edge_index=[2, {}], y=[{}], train_mask=[{}])",
            self.num_nodes(),
            self.num_features,
            self.num_edges(),
            self.labels.len(),
            self.train_mask.len()
        )
    }
}

/// Builds a [`GeneGraph`] from the raw cohort tables
pub struct GraphAssembler {
    config: AssemblerConfig,
    fitted: Option<FeatureStats>,
}

impl GraphAssembler {
    /// Create assembler
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config, fitted: None }
    }

    /// Standardize with previously fitted statistics instead of refitting
    pub fn with_feature_stats(mut self, stats: FeatureStats) -> Self {
        self.fitted = Some(stats);
        self
    }

    /// Assemble mapping, features, edge index, labels and training mask
    pub fn assemble(&self, tables: &GeneTables) -> Result<GeneGraph> {
        let Some(first) = tables.features.first() else {
            bail!("Gene feature table is empty");
        };
        let num_features = first.features.len();
        let policy = self.config.unmapped;

        let mut mapping = GeneMapping::default();
        let mut features = Vec::with_capacity(tables.features.len() * num_features);
        let mut duplicates = 0usize;

        for row in &tables.features {
            if mapping.contains(&row.gene_id) {
                debug!("Duplicate gene {:?} at line {}", row.gene_id, row.line);
                duplicates += 1;
                continue;
            }
            if row.features.len() != num_features {
                bail!(
                    "Gene {:?} at line {} has {} features, expected {}",
                    row.gene_id, row.line, row.features.len(), num_features
                );
            }
            mapping.insert(&row.gene_id);
            features.extend_from_slice(&row.features);
        }

        if duplicates > 0 {
            warn!("Ignored {} duplicate row(s) in the feature table", duplicates);
        }

        let num_nodes = mapping.len();
        info!("Mapped {} genes with {} features each", num_nodes, num_features);

        let mut labels = vec![GeneLabel::Unknown; num_nodes];
        for idx in mapping.translate_all(&tables.drivers, "drivers", policy)? {
            labels[idx] = GeneLabel::Driver;
        }
        // Passengers are written last, so a gene in both lists ends up a passenger
        for idx in mapping.translate_all(&tables.passengers, "passengers", policy)? {
            labels[idx] = GeneLabel::Passenger;
        }
        let train_mask: Vec<bool> = labels.iter().map(GeneLabel::is_known).collect();

        let (sources, targets) = self.translate_links(tables, &mapping)?;

        let feature_stats = match &self.fitted {
            Some(stats) => {
                if stats.num_features() != num_features {
                    bail!(
                        "Standardization statistics cover {} features, the feature table has {}",
                        stats.num_features(),
                        num_features
                    );
                }
                stats.standardize(&mut features);
                Some(stats.clone())
            }
            None if self.config.standardize => Some(standardize_features(&mut features, num_features)),
            None => None,
        };

        let graph = GeneGraph {
            mapping,
            features,
            num_features,
            sources,
            targets,
            labels,
            train_mask,
            feature_stats,
        };

        let counts = graph.label_counts();
        info!(
            "Labels: {} drivers, {} passengers, {} unknown",
            counts.drivers, counts.passengers, counts.unknown
        );
        info!("{}", graph);
        Ok(graph)
    }

    fn translate_links(&self, tables: &GeneTables, mapping: &GeneMapping) -> Result<(Vec<usize>, Vec<usize>)> {
        let policy = self.config.unmapped;
        let limit = if self.config.max_links == 0 {
            tables.links.len()
        } else {
            self.config.max_links.min(tables.links.len())
        };

        if limit < tables.links.len() {
            info!("Using the first {} of {} links", limit, tables.links.len());
        }

        let mut sources = Vec::with_capacity(limit);
        let mut targets = Vec::with_capacity(limit);
        let mut skipped = 0usize;

        for link in &tables.links[..limit] {
            let source = mapping.translate(&link.source, "links", policy)?;
            let target = mapping.translate(&link.target, "links", policy)?;
            match (source, target) {
                (Some(s), Some(t)) => {
                    sources.push(s);
                    targets.push(t);
                }
                _ => {
                    debug!("Skipping link at line {}", link.line);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("Skipped {} link(s) with unmapped genes", skipped);
        }

        if self.config.undirected {
            let reversed: Vec<(usize, usize)> = sources.iter()
                .zip(&targets)
                .filter(|(s, t)| s != t)
                .map(|(&s, &t)| (t, s))
                .collect();
            for (s, t) in reversed {
                sources.push(s);
                targets.push(t);
            }
        }

        Ok((sources, targets))
    }
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::{FeatureRow, GeneLink};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    pub(crate) fn feature_row(id: &str, values: &[f32], line: usize) -> FeatureRow {
        FeatureRow {
            gene_id: id.to_string(),
            features: values.to_vec(),
            line,
        }
    }

    pub(crate) fn link(source: &str, target: &str, line: usize) -> GeneLink {
        GeneLink {
            source: source.to_string(),
            target: target.to_string(),
            line,
        }
    }

    fn scenario_tables() -> GeneTables {
        GeneTables {
            features: vec![
                feature_row("g1", &[0.1, 0.2], 1),
                feature_row("g2", &[0.3, 0.4], 2),
                feature_row("g3", &[0.5, 0.6], 3),
            ],
            links: vec![link("g1", "g2", 1), link("g2", "g3", 2)],
            drivers: vec!["g2".to_string()],
            passengers: vec!["g3".to_string()],
        }
    }

    #[test]
    fn test_three_gene_scenario() {
        let graph = GraphAssembler::default().assemble(&scenario_tables()).unwrap();

        assert_eq!(graph.mapping.index_of("g1"), Some(0));
        assert_eq!(graph.mapping.index_of("g2"), Some(1));
        assert_eq!(graph.mapping.index_of("g3"), Some(2));
        assert_eq!(graph.label_values(), vec![-1, 1, 0]);
        assert_eq!(graph.train_mask, vec![false, true, true]);
        assert_eq!(graph.sources, vec![0, 1]);
        assert_eq!(graph.targets, vec![1, 2]);
        assert_eq!(graph.feature_row(2), &[0.5, 0.6]);
    }

    #[test]
    fn test_mask_matches_labeled_union() {
        let mut tables = scenario_tables();
        tables.features.push(feature_row("g4", &[1.0, 1.0], 4));
        tables.features.push(feature_row("g5", &[1.0, 1.0], 5));
        tables.drivers.push("g5".to_string());

        let graph = GraphAssembler::default().assemble(&tables).unwrap();
        let labeled: Vec<&String> = tables.drivers.iter().chain(&tables.passengers).collect();

        for (idx, id) in graph.mapping.iter() {
            let listed = labeled.iter().any(|l| l.as_str() == id);
            assert_eq!(graph.train_mask[idx], listed);
            assert_eq!(graph.labels[idx].is_known(), listed);
        }
        assert_eq!(graph.labeled_indices(), vec![1, 2, 4]);
    }

    #[test]
    fn test_passenger_overrides_driver() {
        let mut tables = scenario_tables();
        tables.passengers.push("g2".to_string());

        let graph = GraphAssembler::default().assemble(&tables).unwrap();
        assert_eq!(graph.labels[1], GeneLabel::Passenger);
    }

    #[test]
    fn test_duplicate_feature_rows_keep_first() {
        let mut tables = scenario_tables();
        tables.features.push(feature_row("g1", &[9.0, 9.0], 4));

        let graph = GraphAssembler::default().assemble(&tables).unwrap();
        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.feature_row(0), &[0.1, 0.2]);
    }

    #[test]
    fn test_unmapped_genes() {
        let mut tables = scenario_tables();
        tables.links.push(link("g1", "gX", 3));
        tables.drivers.push("gY".to_string());

        let err = GraphAssembler::default().assemble(&tables).unwrap_err();
        assert!(err.to_string().contains("gY"));

        let config = AssemblerConfig {
            unmapped: UnmappedPolicy::Skip,
            ..AssemblerConfig::default()
        };
        let graph = GraphAssembler::new(config).assemble(&tables).unwrap();
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.label_counts().drivers, 1);
    }

    #[test]
    fn test_link_limit_and_undirected() {
        let mut tables = scenario_tables();
        tables.links.push(link("g3", "g3", 3));

        let config = AssemblerConfig {
            max_links: 2,
            undirected: true,
            ..AssemblerConfig::default()
        };
        let graph = GraphAssembler::new(config).assemble(&tables).unwrap();
        assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(0, 1), (1, 2), (1, 0), (2, 1)]);

        let unlimited = AssemblerConfig {
            max_links: 0,
            ..AssemblerConfig::default()
        };
        let graph = GraphAssembler::new(unlimited).assemble(&tables).unwrap();
        assert_eq!(graph.num_edges(), 3);
    }

    #[test]
    fn test_fitted_stats_keep_cohorts_apart() {
        let cohort = |offset: f32| GeneTables {
            features: vec![
                feature_row("g1", &[offset], 1),
                feature_row("g2", &[offset + 10.0], 2),
            ],
            ..GeneTables::default()
        };
        let config = AssemblerConfig {
            standardize: true,
            ..AssemblerConfig::default()
        };

        let train = GraphAssembler::new(config).assemble(&cohort(0.0)).unwrap();
        let stats = train.feature_stats.clone().unwrap();
        assert!((train.features[0] + 0.7071).abs() < 1e-3);

        let shifted = GraphAssembler::new(config)
            .with_feature_stats(stats.clone())
            .assemble(&cohort(100.0))
            .unwrap();
        assert_eq!(shifted.feature_stats.as_ref(), Some(&stats));
        assert!((shifted.features[0] - (100.0 - stats.means[0]) / stats.stds[0]).abs() < 1e-3);
        assert_ne!(shifted.features, train.features);

        // refitting would erase the shift
        let refit = GraphAssembler::new(config).assemble(&cohort(100.0)).unwrap();
        assert_eq!(refit.features, train.features);

        let wide = GeneTables {
            features: vec![feature_row("g1", &[1.0, 2.0], 1)],
            ..GeneTables::default()
        };
        assert!(GraphAssembler::new(config).with_feature_stats(stats).assemble(&wide).is_err());
    }

    #[test]
    fn test_empty_feature_table() {
        assert!(GraphAssembler::default().assemble(&GeneTables::default()).is_err());
    }

    #[test]
    fn test_tensors() {
        let device = <TestBackend as Backend>::Device::default();
        let graph = GraphAssembler::default().assemble(&scenario_tables()).unwrap();

        assert_eq!(graph.features_tensor::<TestBackend>(&device).dims(), [3, 2]);

        let edge_index = graph.edge_index_tensor::<TestBackend>(&device);
        assert_eq!(edge_index.dims(), [2, 2]);
        let values: Vec<i64> = edge_index.into_data().iter::<i64>().collect();
        assert_eq!(values, vec![0, 1, 1, 2]);

        let labels: Vec<i64> = graph.labels_tensor::<TestBackend>(&device).into_data().iter::<i64>().collect();
        assert_eq!(labels, vec![-1, 1, 0]);
    }
}
