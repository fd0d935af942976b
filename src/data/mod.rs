pub mod graph;
pub mod loader;
pub mod mapping;
pub mod preprocessing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of link rows used to build the edge index
pub const DEFAULT_MAX_LINKS: usize = 500;

/// Driver gene list file name
pub const DRIVERS_FILE: &str = "drivers";

/// Gene feature table file name
pub const GENE_FEATURES_FILE: &str = "gene_features";

/// Gene-gene link table file name
pub const LINKS_FILE: &str = "links";

/// Passenger gene list file name
pub const PASSENGERS_FILE: &str = "passengers";

/// Default file name for the exported identifier mapping
pub const MAPPING_FILE: &str = "gene_mapping.json";

/// TCGA cancer cohorts with prepared driver/passenger tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CancerType {
    Blca,
    Brca,
    Coad,
    Hnsc,
    Ucec,
}

impl CancerType {
    /// Directory name of the cohort
    pub fn as_str(&self) -> &'static str {
        match self {
            CancerType::Blca => "blca",
            CancerType::Brca => "brca",
            CancerType::Coad => "coad",
            CancerType::Hnsc => "hnsc",
            CancerType::Ucec => "ucec",
        }
    }
}

impl Default for CancerType {
    fn default() -> Self {
        CancerType::Blca
    }
}

impl std::fmt::Display for CancerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node label used for supervision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneLabel {
    /// Not listed as driver or passenger
    Unknown,
    /// Incidental, non-causal gene
    Passenger,
    /// Gene causally implicated in cancer
    Driver,
}

impl GeneLabel {
    /// Numeric class value (driver = 1, passenger = 0, unknown = -1)
    pub fn value(&self) -> i64 {
        match self {
            GeneLabel::Unknown => -1,
            GeneLabel::Passenger => 0,
            GeneLabel::Driver => 1,
        }
    }

    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneLabel::Unknown => "unknown",
            GeneLabel::Passenger => "passenger",
            GeneLabel::Driver => "driver",
        }
    }

    /// Whether the label carries ground truth
    pub fn is_known(&self) -> bool {
        !matches!(self, GeneLabel::Unknown)
    }
}

impl std::fmt::Display for GeneLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the gene feature table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Gene identifier (first column)
    pub gene_id: String,
    /// Remaining numeric columns
    pub features: Vec<f32>,
    /// 1-based line number in the source file
    pub line: usize,
}

/// One row of the link table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneLink {
    /// Source gene identifier
    pub source: String,
    /// Target gene identifier
    pub target: String,
    /// 1-based line number in the source file
    pub line: usize,
}

/// Raw input tables for one cohort
#[derive(Debug, Clone, Default)]
pub struct GeneTables {
    /// Gene feature rows, in file order
    pub features: Vec<FeatureRow>,
    /// Gene-gene links, in file order
    pub links: Vec<GeneLink>,
    /// Driver gene identifiers
    pub drivers: Vec<String>,
    /// Passenger gene identifiers
    pub passengers: Vec<String>,
}

/// Locations of the four input tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub drivers: PathBuf,
    pub gene_features: PathBuf,
    pub links: PathBuf,
    pub passengers: PathBuf,
}

impl DatasetPaths {
    /// Tables for a cohort laid out as `<data_dir>/<cancer>/<table>`
    pub fn for_cancer<P: AsRef<Path>>(data_dir: P, cancer: CancerType) -> Self {
        Self::in_dir(data_dir.as_ref().join(cancer.as_str()))
    }

    /// Tables stored directly inside `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            drivers: dir.join(DRIVERS_FILE),
            gene_features: dir.join(GENE_FEATURES_FILE),
            links: dir.join(LINKS_FILE),
            passengers: dir.join(PASSENGERS_FILE),
        }
    }

    /// Paths that do not exist on disk
    pub fn missing(&self) -> Vec<&Path> {
        [&self.drivers, &self.gene_features, &self.links, &self.passengers]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|p| !p.is_file())
            .collect()
    }
}
