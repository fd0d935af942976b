pub mod predictor;

use crate::data::GeneLabel;
use crate::model::checkpoint::Metrics;
use serde::{Deserialize, Serialize};

/// Prediction result for a single gene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenePrediction {
    /// Gene identifier
    pub gene_id: String,
    /// Node index in the gene mapping
    pub index: usize,
    /// Label from the driver/passenger lists
    pub known_label: GeneLabel,
    /// Predicted class
    pub predicted: GeneLabel,
    /// Softmax probability of the driver class
    pub driver_probability: f64,
    /// Final-layer embedding
    pub embedding: Vec<f32>,
}

impl GenePrediction {
    /// Create a prediction from the driver probability; ties go to passenger
    pub fn new(gene_id: String, index: usize, known_label: GeneLabel, driver_probability: f64) -> Self {
        let predicted = if driver_probability > 0.5 {
            GeneLabel::Driver
        } else {
            GeneLabel::Passenger
        };

        Self {
            gene_id,
            index,
            known_label,
            predicted,
            driver_probability,
            embedding: Vec::new(),
        }
    }

    /// Attach the embedding coordinates
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Check if the gene is predicted to be a driver
    pub fn is_driver(&self) -> bool {
        self.predicted == GeneLabel::Driver
    }
}

/// Flat row written to CSV
#[derive(Debug, Serialize)]
struct PredictionRow<'a> {
    gene_id: &'a str,
    index: usize,
    known_label: GeneLabel,
    predicted: GeneLabel,
    driver_probability: f64,
    embedding_x: Option<f32>,
    embedding_y: Option<f32>,
}

impl<'a> From<&'a GenePrediction> for PredictionRow<'a> {
    fn from(pred: &'a GenePrediction) -> Self {
        Self {
            gene_id: &pred.gene_id,
            index: pred.index,
            known_label: pred.known_label,
            predicted: pred.predicted,
            driver_probability: pred.driver_probability,
            embedding_x: pred.embedding.first().copied(),
            embedding_y: pred.embedding.get(1).copied(),
        }
    }
}

/// Predictions for every gene of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictionResult {
    /// Gene-level predictions in node-index order
    pub gene_predictions: Vec<GenePrediction>,
    /// Summary statistics
    pub summary: PredictionSummary,
}

impl BatchPredictionResult {
    /// Create new batch prediction result
    pub fn new(gene_predictions: Vec<GenePrediction>, labeled_metrics: Option<Metrics>) -> Self {
        let summary = PredictionSummary::from_predictions(&gene_predictions, labeled_metrics);
        Self {
            gene_predictions,
            summary,
        }
    }

    /// Genes predicted as drivers, most confident first
    pub fn top_drivers(&self, n: usize) -> Vec<&GenePrediction> {
        let mut drivers: Vec<&GenePrediction> = self.gene_predictions.iter()
            .filter(|p| p.is_driver())
            .collect();
        drivers.sort_by(|a, b| b.driver_probability.total_cmp(&a.driver_probability));
        drivers.truncate(n);
        drivers
    }

    /// Export as CSV text
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for pred in &self.gene_predictions {
            writer.serialize(PredictionRow::from(pred))?;
        }
        let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Prediction summary statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PredictionSummary {
    /// Total number of genes
    pub total_genes: usize,
    /// Genes with a known label
    pub labeled_genes: usize,
    /// Genes predicted as drivers
    pub predicted_drivers: usize,
    /// Genes predicted as passengers
    pub predicted_passengers: usize,
    /// Unlabeled genes predicted as drivers
    pub novel_drivers: usize,
    /// Average driver probability
    pub avg_driver_probability: f64,
    /// Metrics on the labeled genes
    pub labeled_metrics: Option<Metrics>,
}

impl PredictionSummary {
    /// Create summary from predictions
    pub fn from_predictions(predictions: &[GenePrediction], labeled_metrics: Option<Metrics>) -> Self {
        let total = predictions.len();
        let drivers = predictions.iter().filter(|p| p.is_driver()).count();
        let novel = predictions.iter()
            .filter(|p| p.is_driver() && !p.known_label.is_known())
            .count();

        let avg_prob = if total > 0 {
            predictions.iter().map(|p| p.driver_probability).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Self {
            total_genes: total,
            labeled_genes: predictions.iter().filter(|p| p.known_label.is_known()).count(),
            predicted_drivers: drivers,
            predicted_passengers: total - drivers,
            novel_drivers: novel,
            avg_driver_probability: avg_prob,
            labeled_metrics,
        }
    }

    /// Log the summary
    pub fn print(&self) {
        tracing::info!("=== Prediction Summary ===");
        tracing::info!("Genes: {} ({} labeled)", self.total_genes, self.labeled_genes);
        tracing::info!(
            "Predicted drivers: {} ({} without a label)",
            self.predicted_drivers,
            self.novel_drivers
        );
        tracing::info!("Predicted passengers: {}", self.predicted_passengers);
        tracing::info!("Average driver probability: {:.4}", self.avg_driver_probability);
        if let Some(m) = &self.labeled_metrics {
            tracing::info!(
                "Labeled genes: loss {:.4}, accuracy {:.4}, precision {:.4}, recall {:.4}, F1 {:.4}",
                m.loss, m.accuracy, m.precision, m.recall, m.f1
            );
        }
    }
}
